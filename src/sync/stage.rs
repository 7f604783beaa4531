//! Run stages.
//!
//! A synchronization run walks a fixed sequence of stages. `Failed` is
//! absorbing and reachable from every non-terminal stage; there is no
//! resume transition, a failed run starts over from `Idle`.

use serde::{Deserialize, Serialize};

/// One stage of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Preflight,
    BackingUpDest,
    ExportingSource,
    Transferring,
    Importing,
    RewritingUrls,
    CleaningUp,
    Done,
    Failed,
}

impl Stage {
    /// Stages of a complete run, in order.
    pub const SEQUENCE: [Stage; 9] = [
        Stage::Idle,
        Stage::Preflight,
        Stage::BackingUpDest,
        Stage::ExportingSource,
        Stage::Transferring,
        Stage::Importing,
        Stage::RewritingUrls,
        Stage::CleaningUp,
        Stage::Done,
    ];

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The stage that follows this one on success.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        let idx = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// Legal: the successor in [`Stage::SEQUENCE`], `Failed` from any
    /// non-terminal stage, and `Preflight → Done` for dry runs.
    #[must_use]
    pub fn can_transition_to(self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Stage::Failed
            || self.next() == Some(to)
            || (self == Stage::Preflight && to == Stage::Done)
    }

    /// Lowercase label used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preflight => "preflight",
            Self::BackingUpDest => "backing_up_dest",
            Self::ExportingSource => "exporting_source",
            Self::Transferring => "transferring",
            Self::Importing => "importing",
            Self::RewritingUrls => "rewriting_urls",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
