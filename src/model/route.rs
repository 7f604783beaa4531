//! Routes: named synchronization directions.

use serde::{Deserialize, Serialize};

use super::environment::Environment;

/// The three standard directions of the workflow, in `(name, from, to)` form.
pub const STANDARD_ROUTES: [(&str, &str, &str); 3] = [
    ("local-to-staging", "local", "staging"),
    ("staging-to-production", "staging", "production"),
    ("production-to-local", "production", "local"),
];

/// A find/replace pair applied to the destination after import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub from: String,
    pub to: String,
}

impl UrlMapping {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Validate the pair: `from` must be non-empty and differ from `to`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.from.is_empty() {
            return Err("mapping has an empty search string".to_string());
        }
        if self.from == self.to {
            return Err(format!("mapping replaces '{}' with itself", self.from));
        }
        Ok(())
    }

    /// Re-running a mapping whose replacement contains the search string
    /// replaces again, so it is not idempotent.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        !self.to.contains(&self.from)
    }
}

impl std::fmt::Display for UrlMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}

/// A named direction between two environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub from: String,
    pub to: String,
    /// Explicit mappings; empty means "source domain → destination domain".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<UrlMapping>,
}

impl Route {
    #[must_use]
    pub fn new(name: &str, from: &str, to: &str) -> Self {
        Self {
            name: name.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            mappings: Vec::new(),
        }
    }

    /// Mappings applied by this route for the given environments.
    #[must_use]
    pub fn effective_mappings(&self, source: &Environment, dest: &Environment) -> Vec<UrlMapping> {
        if self.mappings.is_empty() {
            vec![UrlMapping::new(source.domain(), dest.domain())]
        } else {
            self.mappings.clone()
        }
    }
}

/// Standard routes for whichever of `local`/`staging`/`production` exist.
#[must_use]
pub fn standard_routes<F>(has_environment: F) -> Vec<Route>
where
    F: Fn(&str) -> bool,
{
    STANDARD_ROUTES
        .iter()
        .filter(|(_, from, to)| has_environment(from) && has_environment(to))
        .map(|(name, from, to)| Route::new(name, from, to))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::environment::{Access, DatabaseEngine};

    fn env(name: &str, url: &str) -> Environment {
        Environment {
            name: name.into(),
            base_url: url.into(),
            root_path: "/srv/site".into(),
            access: Access::Local,
            database: DatabaseEngine::default(),
            work_dir: None,
            protected: false,
        }
    }

    #[test]
    fn test_default_mapping_uses_domains() {
        let route = Route::new("local-to-staging", "local", "staging");
        let mappings = route.effective_mappings(
            &env("local", "http://a.local"),
            &env("staging", "https://staging.example.com/"),
        );
        assert_eq!(mappings, vec![UrlMapping::new("a.local", "staging.example.com")]);
    }

    #[test]
    fn test_explicit_mappings_win() {
        let mut route = Route::new("r", "local", "staging");
        route.mappings = vec![UrlMapping::new("http://a.local", "https://b.example.com")];
        let mappings =
            route.effective_mappings(&env("local", "http://a.local"), &env("staging", "x"));
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].to, "https://b.example.com");
    }

    #[test]
    fn test_standard_routes_only_for_known_environments() {
        let routes = standard_routes(|name| name == "local" || name == "staging");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "local-to-staging");

        let all = standard_routes(|_| true);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_mapping_validation() {
        assert!(UrlMapping::new("", "x").validate().is_err());
        assert!(UrlMapping::new("a", "a").validate().is_err());
        assert!(UrlMapping::new("a.local", "b.com").validate().is_ok());
        assert!(!UrlMapping::new("example.com", "staging.example.com").is_idempotent());
        assert!(UrlMapping::new("staging.example.com", "example.com").is_idempotent());
    }
}
