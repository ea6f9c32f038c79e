//! Container abstractions shared by the with-function helpers.
//!
//! Dagger containers are immutable: every `with_*` call derives a new value
//! and leaves the input untouched. [`EnvVariableExt`] captures the one
//! wither this crate needs, so helpers can be written once and applied both
//! to a live [`dagger_sdk::Container`] and to the plain [`ContainerSpec`]
//! value used in tests and plan assembly.

use daggerverse_core::EnvVar;
use serde::{Deserialize, Serialize};

/// Anything that can derive a copy of itself with one more environment
/// variable set.
///
/// Implementations must overwrite an existing variable of the same name
/// rather than duplicating it, matching Dagger's `WithEnvVariable`
/// semantics.
pub trait EnvVariableExt: Sized {
    /// Return a new value with `name` set to `value`, all else unchanged.
    #[must_use]
    fn with_env_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self;
}

impl EnvVariableExt for dagger_sdk::Container {
    fn with_env_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        dagger_sdk::Container::with_env_variable(&self, name, value)
    }
}

/// A cache-volume mount within a [`ContainerSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMount {
    /// Mount point inside the container.
    pub path: String,
    /// Name of the cache volume.
    pub volume: String,
}

/// An immutable, inspectable container description.
///
/// Mirrors the copy-on-write surface of a Dagger container for the fields
/// this workspace cares about: every wither returns a new value and never
/// mutates in place. Useful for assembling a container plan without a live
/// Dagger session and for asserting on the result in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    image: Option<String>,
    env: Vec<EnvVar>,
    mounts: Vec<CacheMount>,
    exec: Vec<Vec<String>>,
}

impl ContainerSpec {
    /// Create an empty spec with no image, environment, mounts or commands.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new spec based on `image`.
    #[must_use]
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::default()
        }
    }

    /// The base image reference, if one was set.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// All environment variables, in insertion order.
    #[must_use]
    pub fn env_variables(&self) -> &[EnvVar] {
        &self.env
    }

    /// Look up a single environment variable by name.
    #[must_use]
    pub fn env_variable(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|var| var.name == name)
            .map(|var| var.value.as_str())
    }

    /// All cache mounts, in insertion order.
    #[must_use]
    pub fn mounts(&self) -> &[CacheMount] {
        &self.mounts
    }

    /// All recorded exec steps, in insertion order.
    #[must_use]
    pub fn exec_steps(&self) -> &[Vec<String>] {
        &self.exec
    }

    /// Return a new spec with a cache volume mounted at `path`.
    #[must_use]
    pub fn with_mounted_cache(
        mut self,
        path: impl Into<String>,
        volume: impl Into<String>,
    ) -> Self {
        self.mounts.push(CacheMount {
            path: path.into(),
            volume: volume.into(),
        });
        self
    }

    /// Return a new spec with an exec step appended.
    #[must_use]
    pub fn with_exec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec.push(args.into_iter().map(Into::into).collect());
        self
    }

    /// Return a new spec with `name` set to `value`, overwriting any
    /// existing variable of the same name.
    #[must_use]
    pub fn with_env_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.env.retain(|var| var.name != name);
        self.env.push(EnvVar::new(name, value));
        self
    }
}

impl EnvVariableExt for ContainerSpec {
    fn with_env_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        ContainerSpec::with_env_variable(self, name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_spec_is_empty() {
        let spec = ContainerSpec::new();
        assert!(spec.image().is_none());
        assert!(spec.env_variables().is_empty());
        assert!(spec.mounts().is_empty());
        assert!(spec.exec_steps().is_empty());
    }

    #[test]
    fn test_from_image_sets_only_the_image() {
        let spec = ContainerSpec::from_image("alpine:3.20");
        assert_eq!(spec.image(), Some("alpine:3.20"));
        assert!(spec.env_variables().is_empty());
    }

    #[test]
    fn test_with_env_variable_returns_new_value() {
        let base = ContainerSpec::new();
        let derived = base.clone().with_env_variable("DL_DIR", "/downloads");

        assert!(base.env_variables().is_empty());
        assert_eq!(derived.env_variable("DL_DIR"), Some("/downloads"));
    }

    #[test]
    fn test_with_env_variable_overwrites_same_name() {
        let spec = ContainerSpec::new()
            .with_env_variable("KEY", "old")
            .with_env_variable("KEY", "new");

        assert_eq!(spec.env_variables().len(), 1);
        assert_eq!(spec.env_variable("KEY"), Some("new"));
    }

    #[test]
    fn test_withers_preserve_unrelated_fields() {
        let spec = ContainerSpec::from_image("ghcr.io/siemens/kas/kas:4.8")
            .with_mounted_cache("/sstate-cache", "sstate-cache")
            .with_exec(["kas", "--version"])
            .with_env_variable("SSTATE_DIR", "/sstate-cache");

        assert_eq!(spec.image(), Some("ghcr.io/siemens/kas/kas:4.8"));
        assert_eq!(spec.mounts().len(), 1);
        assert_eq!(spec.mounts()[0].path, "/sstate-cache");
        assert_eq!(spec.exec_steps(), [vec!["kas", "--version"]]);
    }

    #[test]
    fn test_spec_serializes_round_trip() {
        let spec = ContainerSpec::from_image("alpine")
            .with_env_variable("A", "1")
            .with_mounted_cache("/cache", "cache");

        let json = serde_json::to_string(&spec).unwrap();
        let back: ContainerSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
