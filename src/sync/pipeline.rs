//! The synchronization pipeline.
//!
//! One run moves the source environment's database onto the destination:
//!
//! ```text
//! IDLE → PREFLIGHT → BACKING_UP_DEST → EXPORTING_SOURCE → TRANSFERRING
//!      → IMPORTING → REWRITING_URLS → CLEANING_UP → DONE
//! ```
//!
//! Each stage returns a `Result`; the first error moves the run to `FAILED`
//! and no later stage executes. Nothing is removed on failure: the
//! destination backup and any snapshot files stay for manual recovery and
//! are listed in the report.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{Environment, Snapshot, UrlMapping};
use crate::site::Site;
use crate::sync::retention::fresh_backup;
use crate::sync::stage::Stage;
use crate::sync::transfer::Transport;
use crate::sync::types::{Outcome, RewriteRecord, RunReport, StepRecord, SyncError, SyncResult};

/// Everything a run will do, fixed before it starts.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub route: String,
    pub source: String,
    pub destination: String,
    pub mappings: Vec<UrlMapping>,
    pub created_at: DateTime<Utc>,
    /// Export of the source, on the source host.
    pub export: Snapshot,
    /// Transferred copy, on the destination host.
    pub incoming: Snapshot,
    /// Destination backup taken before import.
    pub backup: Snapshot,
}

impl SyncPlan {
    #[must_use]
    pub fn new(
        route: &str,
        source: &Environment,
        dest: &Environment,
        mappings: Vec<UrlMapping>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            route: route.to_string(),
            source: source.name.clone(),
            destination: dest.name.clone(),
            mappings,
            created_at,
            export: Snapshot::export(source, created_at),
            incoming: Snapshot::incoming(source, dest, created_at),
            backup: Snapshot::backup(dest, created_at),
        }
    }
}

/// Run switches.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Compare SHA-256 of the export and the transferred copy.
    pub verify_checksums: bool,
    /// Stop after the preflight; write nothing.
    pub dry_run: bool,
    /// Leave the export and incoming copy in place after success.
    pub keep_snapshots: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            dry_run: false,
            keep_snapshots: false,
        }
    }
}

/// Orchestrates one source → destination run.
pub struct SyncPipeline<'a> {
    source: &'a dyn Site,
    dest: &'a dyn Site,
    transport: &'a dyn Transport,
    options: PipelineOptions,
}

/// Mutable bookkeeping of a run in progress.
struct RunState {
    stage: Stage,
    stage_started: Instant,
    stage_started_at: DateTime<Utc>,
    report: RunReport,
    /// Snapshots whose stage was entered, with the site index (0 = source, 1 = dest).
    touched: Vec<(usize, Snapshot)>,
}

impl RunState {
    fn enter(&mut self, to: Stage) -> SyncResult<()> {
        if !self.stage.can_transition_to(to) {
            return Err(SyncError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        debug!(from = %self.stage, to = %to, "Stage transition");
        self.stage = to;
        self.stage_started = Instant::now();
        self.stage_started_at = Utc::now();
        Ok(())
    }

    fn complete(&mut self, detail: Option<String>) {
        let duration_ms = u64::try_from(self.stage_started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(stage = %self.stage, duration_ms, "Stage complete");
        self.report.steps.push(StepRecord {
            stage: self.stage,
            started_at: self.stage_started_at,
            duration_ms,
            detail,
        });
    }
}

impl<'a> SyncPipeline<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn Site,
        dest: &'a dyn Site,
        transport: &'a dyn Transport,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            dest,
            transport,
            options,
        }
    }

    /// Execute the plan and report what happened.
    ///
    /// Never returns an error: failures are recorded in the report's
    /// outcome so the caller can journal every run.
    #[must_use]
    pub fn run(&self, plan: &SyncPlan) -> RunReport {
        let now = Utc::now();
        let mut state = RunState {
            stage: Stage::Idle,
            stage_started: Instant::now(),
            stage_started_at: now,
            report: RunReport {
                id: format!("run_{}", &uuid::Uuid::new_v4().to_string()[..12]),
                route: plan.route.clone(),
                source: plan.source.clone(),
                destination: plan.destination.clone(),
                started_at: now,
                finished_at: None,
                dry_run: self.options.dry_run,
                outcome: Outcome::Running,
                steps: Vec::new(),
                backup: None,
                retained: Vec::new(),
                rewrites: Vec::new(),
            },
            touched: Vec::new(),
        };

        info!(
            run = %state.report.id,
            route = %plan.route,
            source = %plan.source,
            destination = %plan.destination,
            dry_run = self.options.dry_run,
            "Starting sync"
        );

        match self.execute(plan, &mut state) {
            Ok(()) => {
                state.report.outcome = if self.options.dry_run {
                    Outcome::DryRun
                } else {
                    Outcome::Completed
                };
                info!(run = %state.report.id, "Sync finished");
            }
            Err(err) => self.fail(&mut state, &err),
        }

        state.report.finished_at = Some(Utc::now());
        state.report
    }

    fn execute(&self, plan: &SyncPlan, state: &mut RunState) -> SyncResult<()> {
        state.enter(Stage::Preflight)?;
        state.report.rewrites = self.preflight(plan)?;
        let total: u64 = state.report.rewrites.iter().map(|r| r.expected).sum();
        state.complete(Some(format!(
            "{} mapping(s), {total} occurrence(s) in {}",
            plan.mappings.len(),
            plan.source
        )));

        if self.options.dry_run {
            return state.enter(Stage::Done);
        }

        state.enter(Stage::BackingUpDest)?;
        let backup = fresh_backup(self.dest, plan.backup.created_at)?;
        state.touched.push((1, backup.clone()));
        self.back_up_destination(&backup)?;
        state.complete(Some(backup.path.clone()));
        state.report.backup = Some(backup);

        state.enter(Stage::ExportingSource)?;
        state.touched.push((0, plan.export.clone()));
        let checksum = self.export_source(&plan.export)?;
        state.complete(Some(match &checksum {
            Some(sum) => format!("{} (sha256 {})", plan.export.path, &sum[..12]),
            None => plan.export.path.clone(),
        }));

        state.enter(Stage::Transferring)?;
        state.touched.push((1, plan.incoming.clone()));
        self.transfer(&plan.export, &plan.incoming, checksum.as_deref())?;
        state.complete(Some(format!(
            "{} → {}",
            self.source.host().label(),
            self.dest.host().label()
        )));

        state.enter(Stage::Importing)?;
        self.import(&plan.incoming, &state.report.rewrites)?;
        state.complete(Some(plan.incoming.path.clone()));

        state.enter(Stage::RewritingUrls)?;
        let mut rewrites = std::mem::take(&mut state.report.rewrites);
        let result = self.rewrite(&mut rewrites);
        state.report.rewrites = rewrites;
        let replaced = result?;
        state.complete(Some(format!("{replaced} replacement(s)")));

        state.enter(Stage::CleaningUp)?;
        self.clean_up(plan, state)?;
        state.complete(None);

        state.enter(Stage::Done)
    }

    fn site(&self, index: usize) -> &'a dyn Site {
        if index == 0 { self.source } else { self.dest }
    }

    fn preflight(&self, plan: &SyncPlan) -> SyncResult<Vec<RewriteRecord>> {
        if plan.source == plan.destination {
            return Err(SyncError::Preflight(format!(
                "source and destination are both '{}'",
                plan.source
            )));
        }
        if self.source.engine() != self.dest.engine() {
            return Err(SyncError::Unsupported(format!(
                "cannot move a {} snapshot into a {} site",
                self.source.engine(),
                self.dest.engine()
            )));
        }
        if plan.mappings.is_empty() {
            return Err(SyncError::Preflight("route has no URL mappings".to_string()));
        }
        for mapping in &plan.mappings {
            mapping.validate().map_err(SyncError::Preflight)?;
            if !mapping.is_idempotent() {
                warn!(
                    from = %mapping.from,
                    to = %mapping.to,
                    "Replacement contains the search string; re-running this mapping is not idempotent"
                );
            }
        }

        self.source.probe()?;
        self.dest.probe()?;

        plan.mappings
            .iter()
            .map(|mapping| {
                let expected = self.source.count_occurrences(mapping)?;
                info!(mapping = %mapping, expected, "Occurrences in source");
                Ok(RewriteRecord {
                    mapping: mapping.clone(),
                    expected,
                    replaced: None,
                    residual: None,
                })
            })
            .collect()
    }

    fn back_up_destination(&self, backup: &Snapshot) -> SyncResult<()> {
        let env = self.dest.environment();
        self.dest.host().ensure_dir(&env.backup_dir())?;
        self.dest.export(&backup.path)?;
        if !self.dest.host().file_exists(&backup.path)? {
            return Err(SyncError::Verification(format!(
                "backup {} was not written on {}",
                backup.path, env.name
            )));
        }
        info!(env = %env.name, path = %backup.path, "Destination backed up");
        Ok(())
    }

    fn export_source(&self, export: &Snapshot) -> SyncResult<Option<String>> {
        let env = self.source.environment();
        self.source.host().ensure_dir(&env.snapshot_dir())?;
        self.source.export(&export.path)?;
        if self.options.verify_checksums {
            let sum = self.source.host().checksum(&export.path)?;
            debug!(path = %export.path, sha256 = %sum, "Export checksum");
            Ok(Some(sum))
        } else {
            Ok(None)
        }
    }

    fn transfer(&self, export: &Snapshot, incoming: &Snapshot, expected: Option<&str>) -> SyncResult<()> {
        self.transport
            .copy(self.source, &export.path, self.dest, &incoming.path)?;

        match expected {
            Some(expected) => {
                let actual = self.dest.host().checksum(&incoming.path)?;
                if actual != expected {
                    return Err(SyncError::ChecksumMismatch {
                        path: incoming.path.clone(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
                debug!(path = %incoming.path, "Transfer checksum verified");
            }
            None => {
                if !self.dest.host().file_exists(&incoming.path)? {
                    return Err(SyncError::FileNotFound(incoming.path.clone()));
                }
            }
        }
        Ok(())
    }

    fn import(&self, incoming: &Snapshot, rewrites: &[RewriteRecord]) -> SyncResult<()> {
        self.dest.import(&incoming.path)?;

        for record in rewrites {
            let found = self.dest.count_occurrences(&record.mapping)?;
            if found != record.expected {
                return Err(SyncError::Verification(format!(
                    "'{}' occurs {found} time(s) in {} after import, the source had {}",
                    record.mapping.from,
                    self.dest.name(),
                    record.expected
                )));
            }
        }
        Ok(())
    }

    fn rewrite(&self, rewrites: &mut [RewriteRecord]) -> SyncResult<u64> {
        let mut total = 0;
        for record in rewrites.iter_mut() {
            let replaced = self.dest.search_replace(&record.mapping)?;
            record.replaced = Some(replaced);
            total += replaced;
            info!(mapping = %record.mapping, replaced, "URLs rewritten");

            if record.mapping.is_idempotent() {
                let residual = self.dest.count_occurrences(&record.mapping)?;
                record.residual = Some(residual);
                if residual != 0 {
                    return Err(SyncError::Verification(format!(
                        "{residual} occurrence(s) of '{}' left in {} after the rewrite",
                        record.mapping.from,
                        self.dest.name()
                    )));
                }
            }
        }
        Ok(total)
    }

    fn clean_up(&self, plan: &SyncPlan, state: &mut RunState) -> SyncResult<()> {
        if self.options.keep_snapshots {
            state.report.retained = vec![plan.export.clone(), plan.incoming.clone()];
            info!("Keeping snapshots");
            return Ok(());
        }
        self.source.host().remove_file(&plan.export.path)?;
        self.dest.host().remove_file(&plan.incoming.path)?;
        debug!(export = %plan.export.path, incoming = %plan.incoming.path, "Snapshots removed");
        Ok(())
    }

    fn fail(&self, state: &mut RunState, err: &SyncError) {
        let failed_at = state.stage;
        let kind = err.kind();
        warn!(stage = %failed_at, error = %err, "Sync failed");

        state.complete(Some(format!("failed: {err}")));
        if let Err(transition) = state.enter(Stage::Failed) {
            warn!(error = %transition, "Could not record failure stage");
        }

        state.report.outcome = Outcome::Failed {
            stage: failed_at,
            kind,
            message: err.to_string(),
        };

        // Keep whatever was written; an unreachable host is assumed to still hold its files.
        state.report.retained = state
            .touched
            .iter()
            .filter(|(site, snapshot)| {
                self.site(*site)
                    .host()
                    .file_exists(&snapshot.path)
                    .unwrap_or(true)
            })
            .map(|(_, snapshot)| snapshot.clone())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::runner::testing::RecordingRunner;
    use crate::host::Host;
    use crate::model::{Access, DatabaseEngine};
    use crate::site::{open_site, SqliteSite};
    use crate::sync::transfer::ScpTransport;
    use crate::sync::types::FailureKind;
    use rusqlite::Connection;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    const SCHEMA: &str = r"
        CREATE TABLE wp_options (option_name TEXT PRIMARY KEY, option_value TEXT);
        CREATE TABLE wp_posts (ID INTEGER PRIMARY KEY, post_content TEXT);
    ";

    fn env(dir: &Path, name: &str, url: &str) -> Environment {
        Environment {
            name: name.into(),
            base_url: url.into(),
            root_path: dir.join(name).join("public").display().to_string(),
            access: Access::Local,
            database: DatabaseEngine::Sqlite {
                path: dir.join(format!("{name}.db")).display().to_string(),
            },
            work_dir: None,
            protected: false,
        }
    }

    fn db(env: &Environment) -> String {
        match &env.database {
            DatabaseEngine::Sqlite { path } => path.clone(),
            DatabaseEngine::WpCli { .. } => unreachable!(),
        }
    }

    fn seed(env: &Environment, siteurl: &str, content: &str) {
        let conn = Connection::open(db(env)).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO wp_options VALUES ('siteurl', ?1)",
            rusqlite::params![siteurl],
        )
        .unwrap();
        conn.execute("INSERT INTO wp_posts VALUES (1, ?1)", rusqlite::params![content])
            .unwrap();
    }

    /// (siteurl, post content) of a sqlite site.
    fn state_of(path: &str) -> (String, String) {
        let conn = Connection::open(path).unwrap();
        let siteurl = conn
            .query_row(
                "SELECT option_value FROM wp_options WHERE option_name = 'siteurl'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let content = conn
            .query_row("SELECT post_content FROM wp_posts WHERE ID = 1", [], |r| r.get(0))
            .unwrap();
        (siteurl, content)
    }

    fn files_in(dir: &str) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    struct Fixture {
        _dir: TempDir,
        local: Environment,
        staging: Environment,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let local = env(dir.path(), "local", "http://a.local");
        let staging = env(dir.path(), "staging", "https://staging.example.com");
        seed(&local, "http://a.local", "visit http://a.local/page");
        seed(&staging, "https://staging.example.com", "old staging post");
        Fixture {
            _dir: dir,
            local,
            staging,
        }
    }

    fn plan(f: &Fixture) -> SyncPlan {
        SyncPlan::new(
            "local-to-staging",
            &f.local,
            &f.staging,
            vec![UrlMapping::new("a.local", "staging.example.com")],
            Utc::now(),
        )
    }

    #[test]
    fn test_end_to_end_local_to_staging() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let source = open_site(&f.local, &runner, 10).unwrap();
        let dest = open_site(&f.staging, &runner, 10).unwrap();
        let transport = ScpTransport::new(&runner);
        let pipeline = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, PipelineOptions::default());

        let before = state_of(&db(&f.staging));
        let plan = plan(&f);
        let report = pipeline.run(&plan);

        assert_eq!(report.outcome, Outcome::Completed, "{report:?}");
        assert_eq!(
            state_of(&db(&f.staging)),
            (
                "http://staging.example.com".to_string(),
                "visit http://staging.example.com/page".to_string()
            )
        );
        assert_eq!(
            report.stages(),
            vec![
                Stage::Preflight,
                Stage::BackingUpDest,
                Stage::ExportingSource,
                Stage::Transferring,
                Stage::Importing,
                Stage::RewritingUrls,
                Stage::CleaningUp,
            ]
        );
        assert_eq!(report.rewrites[0].expected, 2);
        assert_eq!(report.rewrites[0].replaced, Some(2));
        assert_eq!(report.rewrites[0].residual, Some(0));

        // The backup equals the destination state immediately before import.
        let backup = report.backup.clone().unwrap();
        let restored = f.staging.work_dir() + "/restored.db";
        Connection::open(&restored)
            .unwrap()
            .execute_batch("PRAGMA user_version = 1;")
            .unwrap();
        let scratch = Environment {
            database: DatabaseEngine::Sqlite {
                path: restored.clone(),
            },
            ..f.staging.clone()
        };
        let scratch_site = SqliteSite::new(&scratch, Host::new(crate::host::Location::Local, &runner), &restored);
        scratch_site.import(&backup.path).unwrap();
        assert_eq!(state_of(&restored), before);

        // Nothing but the backup is left behind, and no command was spawned.
        assert!(files_in(&f.local.snapshot_dir()).is_empty());
        assert!(files_in(&f.staging.snapshot_dir()).is_empty());
        assert_eq!(files_in(&f.staging.backup_dir()), vec![backup.file_name().to_string()]);
        assert!(report.retained.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_rewrite_is_idempotent_across_runs() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let dest = open_site(&f.staging, &runner, 10).unwrap();
        let mapping = UrlMapping::new("staging.example.com", "b.example.org");

        let first = dest.search_replace(&mapping).unwrap();
        let after_once = state_of(&db(&f.staging));
        let second = dest.search_replace(&mapping).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(state_of(&db(&f.staging)), after_once);
    }

    #[test]
    fn test_keep_snapshots() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let source = open_site(&f.local, &runner, 10).unwrap();
        let dest = open_site(&f.staging, &runner, 10).unwrap();
        let transport = ScpTransport::new(&runner);
        let options = PipelineOptions {
            keep_snapshots: true,
            ..PipelineOptions::default()
        };
        let plan = plan(&f);
        let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, options).run(&plan);

        assert!(report.is_success());
        assert_eq!(report.retained.len(), 2);
        assert!(Path::new(&plan.export.path).exists());
        assert!(Path::new(&plan.incoming.path).exists());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let source = open_site(&f.local, &runner, 10).unwrap();
        let dest = open_site(&f.staging, &runner, 10).unwrap();
        let transport = ScpTransport::new(&runner);
        let options = PipelineOptions {
            dry_run: true,
            ..PipelineOptions::default()
        };
        let before = state_of(&db(&f.staging));
        let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, options).run(&plan(&f));

        assert_eq!(report.outcome, Outcome::DryRun);
        assert_eq!(report.id.len(), "run_".len() + 12);
        assert!(report.id.starts_with("run_"));
        assert_eq!(report.stages(), vec![Stage::Preflight]);
        assert_eq!(report.rewrites[0].expected, 2);
        assert_eq!(state_of(&db(&f.staging)), before);
        assert!(!Path::new(&f.staging.work_dir()).exists());
        assert!(!Path::new(&f.local.work_dir()).exists());
    }

    #[test]
    fn test_invalid_mapping_stops_at_preflight() {
        let f = fixture();
        let runner = RecordingRunner::new();
        let source = open_site(&f.local, &runner, 10).unwrap();
        let dest = open_site(&f.staging, &runner, 10).unwrap();
        let transport = ScpTransport::new(&runner);
        let plan = SyncPlan::new(
            "local-to-staging",
            &f.local,
            &f.staging,
            vec![UrlMapping::new("a.local", "a.local")],
            Utc::now(),
        );
        let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, PipelineOptions::default())
            .run(&plan);

        assert!(matches!(
            report.outcome,
            Outcome::Failed { stage: Stage::Preflight, kind: FailureKind::Preflight, .. }
        ));
        assert!(report.backup.is_none());
        assert!(!Path::new(&f.staging.work_dir()).exists());
    }

    /// Wraps a site, records the operations it receives and fails one of them.
    struct ScriptedSite<'a> {
        inner: Box<dyn Site + 'a>,
        fail_on: Option<&'static str>,
        log: &'a RefCell<Vec<String>>,
    }

    impl ScriptedSite<'_> {
        fn record(&self, op: &'static str) -> SyncResult<()> {
            self.log.borrow_mut().push(format!("{}:{op}", self.inner.name()));
            if self.fail_on == Some(op) {
                return Err(SyncError::CommandFailed {
                    command: format!("wp db {op}"),
                    status: "1".into(),
                    message: "simulated failure".into(),
                });
            }
            Ok(())
        }
    }

    impl Site for ScriptedSite<'_> {
        fn environment(&self) -> &Environment {
            self.inner.environment()
        }
        fn host(&self) -> &Host<'_> {
            self.inner.host()
        }
        fn engine(&self) -> &'static str {
            self.inner.engine()
        }
        fn probe(&self) -> SyncResult<()> {
            self.inner.probe()
        }
        fn export(&self, path: &str) -> SyncResult<()> {
            self.record("export")?;
            self.inner.export(path)
        }
        fn import(&self, path: &str) -> SyncResult<()> {
            self.record("import")?;
            self.inner.import(path)
        }
        fn count_occurrences(&self, mapping: &UrlMapping) -> SyncResult<u64> {
            self.inner.count_occurrences(mapping)
        }
        fn search_replace(&self, mapping: &UrlMapping) -> SyncResult<u64> {
            self.record("search_replace")?;
            self.inner.search_replace(mapping)
        }
    }

    struct LoggingTransport<'a> {
        inner: ScpTransport<'a>,
        log: &'a RefCell<Vec<String>>,
    }

    impl Transport for LoggingTransport<'_> {
        fn copy(&self, from: &dyn Site, from_path: &str, to: &dyn Site, to_path: &str) -> SyncResult<()> {
            self.log.borrow_mut().push("transfer".to_string());
            self.inner.copy(from, from_path, to, to_path)
        }
    }

    fn scripted_run(
        f: &Fixture,
        source_fails: Option<&'static str>,
        dest_fails: Option<&'static str>,
    ) -> (RunReport, Vec<String>, SyncPlan) {
        let runner = RecordingRunner::new();
        let log = RefCell::new(Vec::new());
        let source = ScriptedSite {
            inner: open_site(&f.local, &runner, 10).unwrap(),
            fail_on: source_fails,
            log: &log,
        };
        let dest = ScriptedSite {
            inner: open_site(&f.staging, &runner, 10).unwrap(),
            fail_on: dest_fails,
            log: &log,
        };
        let transport = LoggingTransport {
            inner: ScpTransport::new(&runner),
            log: &log,
        };
        let plan = plan(f);
        let report =
            SyncPipeline::new(&source, &dest, &transport, PipelineOptions::default()).run(&plan);
        drop((source, dest, transport));
        (report, log.into_inner(), plan)
    }

    #[test]
    fn test_backup_precedes_import() {
        let f = fixture();
        let (report, log, _) = scripted_run(&f, None, None);
        assert!(report.is_success());
        assert_eq!(
            log,
            vec![
                "staging:export",
                "local:export",
                "transfer",
                "staging:import",
                "staging:search_replace",
            ]
        );
    }

    #[test]
    fn test_export_failure_stops_the_run() {
        let f = fixture();
        let before = state_of(&db(&f.staging));
        let (report, log, plan) = scripted_run(&f, Some("export"), None);

        assert_eq!(log, vec!["staging:export", "local:export"]);
        match &report.outcome {
            Outcome::Failed { stage, kind, message } => {
                assert_eq!(*stage, Stage::ExportingSource);
                assert_eq!(*kind, FailureKind::CommandFailed);
                assert!(message.contains("simulated failure"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(state_of(&db(&f.staging)), before);
        assert_eq!(report.backup.as_ref().unwrap().path, plan.backup.path);
        assert_eq!(report.retained, vec![plan.backup.clone()]);
        assert!(Path::new(&plan.backup.path).exists());
    }

    #[test]
    fn test_import_failure_keeps_backup_and_snapshots() {
        let f = fixture();
        let (report, log, plan) = scripted_run(&f, None, Some("import"));

        assert!(!log.contains(&"staging:search_replace".to_string()));
        assert!(matches!(report.outcome, Outcome::Failed { stage: Stage::Importing, .. }));
        assert_eq!(report.retained.len(), 3);
        assert!(Path::new(&plan.export.path).exists());
        assert!(Path::new(&plan.incoming.path).exists());
        assert_eq!(report.stages().last(), Some(&Stage::Importing));
    }

    #[test]
    fn test_backup_failure_touches_nothing_else() {
        let f = fixture();
        let (report, log, _) = scripted_run(&f, None, Some("export"));
        assert_eq!(log, vec!["staging:export"]);
        assert!(matches!(report.outcome, Outcome::Failed { stage: Stage::BackingUpDest, .. }));
        assert!(report.backup.is_none());
        assert!(report.retained.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_fails_transfer() {
        struct CorruptingTransport;
        impl Transport for CorruptingTransport {
            fn copy(&self, _: &dyn Site, from_path: &str, _: &dyn Site, to_path: &str) -> SyncResult<()> {
                let content = std::fs::read(from_path)?;
                std::fs::create_dir_all(Path::new(to_path).parent().unwrap())?;
                std::fs::write(to_path, &content[..content.len() / 2])?;
                Ok(())
            }
        }

        let f = fixture();
        let runner = RecordingRunner::new();
        let source = open_site(&f.local, &runner, 10).unwrap();
        let dest = open_site(&f.staging, &runner, 10).unwrap();
        let before = state_of(&db(&f.staging));
        let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &CorruptingTransport, PipelineOptions::default())
            .run(&plan(&f));

        assert!(matches!(
            report.outcome,
            Outcome::Failed { stage: Stage::Transferring, kind: FailureKind::Verification, .. }
        ));
        assert_eq!(state_of(&db(&f.staging)), before);
    }

    fn remote_env(name: &str, host: &str, url: &str) -> Environment {
        Environment {
            name: name.into(),
            base_url: url.into(),
            root_path: format!("/var/www/{name}/public"),
            access: Access::Ssh {
                host: host.into(),
                user: Some("deploy".into()),
                port: None,
                identity_file: None,
            },
            database: DatabaseEngine::default(),
            work_dir: None,
            protected: false,
        }
    }

    /// Answers for a WP-CLI run between two ssh hosts, up to and including scp.
    fn script_remote_run(runner: &RecordingRunner, scp_status: i32) {
        let digest = format!("{}  /var/www/staging/wpsync/snapshots/x.sql\n", "ab".repeat(32));
        runner
            .respond(0, "", "") // source: ssh true
            .respond(0, "", "") // source: wp core is-installed
            .respond(0, "", "") // dest: ssh true
            .respond(0, "", "") // dest: wp core is-installed
            .respond(0, "3\n", "") // source: count
            .respond(1, "", "") // dest: backup name is free
            .respond(0, "", "") // dest: mkdir -p backups
            .respond(0, "", "") // dest: wp db export
            .respond(0, "", "") // dest: backup exists
            .respond(0, "", "") // source: mkdir -p snapshots
            .respond(0, "", "") // source: wp db export
            .respond(0, &digest, "") // source: sha256sum
            .respond(0, "", "") // dest: mkdir -p snapshots
            .respond(scp_status, "", if scp_status == 0 { "" } else { "lost connection" });
        if scp_status == 0 {
            runner
                .respond(0, &digest, "") // dest: sha256sum
                .respond(0, "", "") // dest: wp db import
                .respond(0, "3\n", "") // dest: count after import
                .respond(0, "3\n", "") // dest: search-replace
                .respond(0, "0\n", ""); // dest: residual count
        }
    }

    fn remote_plan(source: &Environment, dest: &Environment) -> SyncPlan {
        SyncPlan::new(
            "staging-to-production",
            source,
            dest,
            vec![UrlMapping::new("staging.example.com", "www.example.com")],
            Utc::now(),
        )
    }

    /// Index of the first call at or after `from` containing every fragment.
    fn position(lines: &[String], from: usize, fragments: &[&str]) -> usize {
        lines[from..]
            .iter()
            .position(|line| fragments.iter().all(|f| line.contains(f)))
            .map(|i| from + i)
            .unwrap_or_else(|| panic!("no call with {fragments:?} after #{from} in {lines:#?}"))
    }

    #[test]
    fn test_remote_wp_cli_run_command_order() {
        let source_env = remote_env("staging", "staging-host", "https://staging.example.com");
        let dest_env = remote_env("production", "production-host", "https://www.example.com");
        let runner = RecordingRunner::new();
        script_remote_run(&runner, 0);
        let source = open_site(&source_env, &runner, 10).unwrap();
        let dest = open_site(&dest_env, &runner, 10).unwrap();
        let transport = ScpTransport::new(&runner);
        let plan = remote_plan(&source_env, &dest_env);

        let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, PipelineOptions::default())
            .run(&plan);
        assert_eq!(report.outcome, Outcome::Completed, "{report:?}");

        let backup = report.backup.clone().unwrap();
        assert_eq!(backup.path, plan.backup.path);

        let lines = runner.lines();
        let prod = "deploy@production-host";
        let stage = "deploy@staging-host";
        let mkdir = position(&lines, 0, &["ssh", prod, "mkdir -p /var/www/production/wpsync/backups"]);
        let backed_up = position(&lines, mkdir, &["ssh", prod, "db export", &backup.path]);
        let exported = position(&lines, backed_up, &["ssh", stage, "db export", &plan.export.path]);
        let summed = position(&lines, exported, &["ssh", stage, "sha256sum"]);
        let copied = position(&lines, summed, &["scp -3", &plan.incoming.path]);
        let imported = position(&lines, copied, &["ssh", prod, "db import", &plan.incoming.path]);
        let rewritten = position(
            &lines,
            imported,
            &["ssh", prod, "search-replace staging.example.com www.example.com --all-tables --format=count"],
        );
        assert!(!lines[rewritten].contains("--dry-run"));

        let removed_export = position(&lines, rewritten, &["ssh", stage, "rm -f", &plan.export.path]);
        let removed_incoming = position(&lines, rewritten, &["ssh", prod, "rm -f", &plan.incoming.path]);
        assert!(removed_export > rewritten && removed_incoming > rewritten);
        assert_eq!(lines.len(), removed_export.max(removed_incoming) + 1);
        assert!(report.retained.is_empty());
    }

    #[test]
    fn test_remote_scp_failure_stops_before_import() {
        let source_env = remote_env("staging", "staging-host", "https://staging.example.com");
        let dest_env = remote_env("production", "production-host", "https://www.example.com");
        let runner = RecordingRunner::new();
        script_remote_run(&runner, 1);
        let source = open_site(&source_env, &runner, 10).unwrap();
        let dest = open_site(&dest_env, &runner, 10).unwrap();
        let transport = ScpTransport::new(&runner);
        let plan = remote_plan(&source_env, &dest_env);

        let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, PipelineOptions::default())
            .run(&plan);

        match &report.outcome {
            Outcome::Failed { stage, kind, message } => {
                assert_eq!(*stage, Stage::Transferring);
                assert_eq!(*kind, FailureKind::CommandFailed);
                assert!(message.contains("lost connection"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let lines = runner.lines();
        assert!(lines.iter().any(|l| l.starts_with("scp -3")));
        assert!(!lines.iter().any(|l| l.contains("db import")));
        assert!(!lines.iter().any(|l| l.contains("search-replace") && !l.contains("--dry-run")));
        assert!(!lines.iter().any(|l| l.contains("rm -f")));
        assert_eq!(report.backup.as_ref().unwrap().path, plan.backup.path);
        assert_eq!(report.retained.len(), 3);
    }
}
