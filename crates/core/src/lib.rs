//! Core types and utilities shared by the daggerverse module crates

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for daggerverse operations
#[derive(Error, Debug)]
pub enum Error {
    /// A module was configured inconsistently, e.g. an operation was invoked
    /// before a required input was supplied.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied value failed to parse.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A Dagger API call failed. Carries the underlying error text verbatim.
    #[error("Dagger error: {0}")]
    Dagger(String),
}

impl Error {
    /// Build a [`Error::Configuration`] from any message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Build a [`Error::Validation`] from any message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a [`Error::Dagger`] from any displayable API failure.
    pub fn dagger(err: impl fmt::Display) -> Self {
        Error::Dagger(err.to_string())
    }
}

/// Result type alias for daggerverse operations
pub type Result<T> = std::result::Result<T, Error>;

/// An environment-variable pair in `KEY=VALUE` form.
///
/// The value may contain `=` characters; only the first one separates the
/// name from the value. An empty value (`KEY=`) is allowed, a missing `=`
/// is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name, never empty.
    pub name: String,
    /// Variable value, possibly empty.
    pub value: String,
}

impl EnvVar {
    /// Create a pair from already-separated parts.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a list of `KEY=VALUE` strings, failing on the first bad entry.
    pub fn parse_all<S: AsRef<str>>(pairs: &[S]) -> Result<Vec<Self>> {
        pairs.iter().map(|p| p.as_ref().parse()).collect()
    }
}

impl FromStr for EnvVar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| Error::validation(format!("expected KEY=VALUE, got {s:?}")))?;

        if name.is_empty() {
            return Err(Error::validation(format!(
                "environment variable name is empty in {s:?}"
            )));
        }

        Ok(Self::new(name, value))
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_parses_simple_pair() {
        let var: EnvVar = "DL_DIR=/downloads".parse().unwrap();
        assert_eq!(var.name, "DL_DIR");
        assert_eq!(var.value, "/downloads");
    }

    #[test]
    fn test_env_var_keeps_equals_in_value() {
        let var: EnvVar = "BB_ENV=a=b=c".parse().unwrap();
        assert_eq!(var.name, "BB_ENV");
        assert_eq!(var.value, "a=b=c");
    }

    #[test]
    fn test_env_var_allows_empty_value() {
        let var: EnvVar = "MARKER=".parse().unwrap();
        assert_eq!(var.name, "MARKER");
        assert_eq!(var.value, "");
    }

    #[test]
    fn test_env_var_rejects_missing_separator() {
        let err = "JUST_A_NAME".parse::<EnvVar>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_env_var_rejects_empty_name() {
        let err = "=value".parse::<EnvVar>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_parse_all_collects_pairs() {
        let vars = EnvVar::parse_all(&["A=1", "B=2"]).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[1], EnvVar::new("B", "2"));
    }

    #[test]
    fn test_parse_all_fails_on_first_bad_entry() {
        assert!(EnvVar::parse_all(&["A=1", "oops"]).is_err());
    }

    #[test]
    fn test_env_var_display_round_trips() {
        let var = EnvVar::new("KAS_BUILD_DIR", "/build");
        assert_eq!(var.to_string(), "KAS_BUILD_DIR=/build");
    }

    #[test]
    fn test_error_helper_constructors() {
        assert!(matches!(
            Error::configuration("x"),
            Error::Configuration(_)
        ));
        assert!(matches!(Error::validation("x"), Error::Validation(_)));
        assert!(matches!(Error::dagger("boom"), Error::Dagger(_)));
    }

    #[test]
    fn test_dagger_error_keeps_message_text() {
        let err = Error::dagger("engine unreachable");
        assert_eq!(err.to_string(), "Dagger error: engine unreachable");
    }
}
