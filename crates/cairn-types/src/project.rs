//! Project identity and isolation policy.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A project's declared policy for separating its memory from other projects.
///
/// `Strict` and `Loose` filter identically (exact project id); any relaxation
/// for `Loose` is left to callers. `None` makes context queries global.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    #[default]
    Strict,
    Loose,
    None,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Loose => "loose",
            Self::None => "none",
        }
    }

    /// Whether reads under this level are filtered by project id.
    pub fn filters_by_project(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown isolation level '{0}' (expected strict, loose or none)")]
pub struct ParseIsolationError(pub String);

impl FromStr for IsolationLevel {
    type Err = ParseIsolationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "loose" => Ok(Self::Loose),
            "none" => Ok(Self::None),
            _ => Err(ParseIsolationError(s.to_string())),
        }
    }
}

/// Which records a read may see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "project", rename_all = "lowercase")]
pub enum ProjectScope {
    /// Only records whose `project_path` equals the key.
    Project(String),
    /// No project filter.
    Global,
}

impl ProjectScope {
    pub fn project(key: impl Into<String>) -> Self {
        Self::Project(key.into())
    }

    /// The project key, if this scope filters.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Project(key) => Some(key),
            Self::Global => None,
        }
    }

    /// Whether a record tagged with `project_path` is visible in this scope.
    pub fn admits(&self, project_path: &str) -> bool {
        match self {
            Self::Project(key) => key == project_path,
            Self::Global => true,
        }
    }
}

impl fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project(key) => write!(f, "project:{key}"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// The resolved identity of the project a path belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    /// Key written into every record's `project_path`.
    pub key: String,
    pub isolation: IsolationLevel,
    /// Directory holding the project marker, when one was found.
    pub root: Option<PathBuf>,
    pub name: Option<String>,
}

impl ProjectIdentity {
    /// Identity for a path with no marker: the path is the key, strict isolation.
    pub fn unmarked(path: impl Into<String>) -> Self {
        Self {
            key: path.into(),
            isolation: IsolationLevel::Strict,
            root: None,
            name: None,
        }
    }

    /// Scope to use for context reads issued from this project.
    pub fn scope(&self) -> ProjectScope {
        if self.isolation.filters_by_project() {
            ProjectScope::Project(self.key.clone())
        } else {
            ProjectScope::Global
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_parse() {
        assert_eq!("STRICT".parse::<IsolationLevel>().unwrap(), IsolationLevel::Strict);
        assert_eq!("loose".parse::<IsolationLevel>().unwrap(), IsolationLevel::Loose);
        assert_eq!("none".parse::<IsolationLevel>().unwrap(), IsolationLevel::None);
        assert!("relaxed".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_loose_scopes_like_strict() {
        let mut identity = ProjectIdentity::unmarked("proj-a");
        identity.isolation = IsolationLevel::Loose;
        assert_eq!(identity.scope(), ProjectScope::project("proj-a"));
    }

    #[test]
    fn test_none_scopes_globally() {
        let mut identity = ProjectIdentity::unmarked("proj-a");
        identity.isolation = IsolationLevel::None;
        assert_eq!(identity.scope(), ProjectScope::Global);
        assert!(identity.scope().admits("anything"));
    }

    #[test]
    fn test_project_scope_admits_exact_match_only() {
        let scope = ProjectScope::project("/work/a");
        assert!(scope.admits("/work/a"));
        assert!(!scope.admits("/work/a/sub"));
        assert!(!scope.admits("/work/b"));
    }
}
