//! Dagger module for [pre-commit](https://pre-commit.com).
//!
//! [`PreCommit`] assembles an alpine-based container with pre-commit
//! installed via pipx and runs the configured hooks against a mounted
//! source tree. The hook environments are cached in a shared Dagger cache
//! volume, matching pre-commit's managed-CI-cache recommendation.

use dagger_sdk::{Container, Directory, Query};
use daggerverse_core::{Error, Result};
use tracing::debug;

/// Default base image for the hook container.
pub const DEFAULT_BASE_IMAGE: &str = "alpine";

/// Default pre-commit version installed via pipx.
pub const DEFAULT_PRE_COMMIT_VERSION: &str = "3.6.2";

/// Mount point of the source tree under test.
pub const SRC_DIR: &str = "/src";

const XDG_CACHE_HOME_DIR: &str = "/var/cache/xdg_cache_home";
const HOOK_CACHE_KEY: &str = "pre-commit-home-cache";

/// Build the `pre-commit run` command line.
#[must_use]
pub fn run_command(hook_stage: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = ["pre-commit", "run", "--all-files", "--verbose"]
        .iter()
        .map(ToString::to_string)
        .collect();

    if let Some(stage) = hook_stage {
        args.push("--hook-stage".to_string());
        args.push(stage.to_string());
    }

    args
}

/// The pre-commit Dagger module.
#[derive(Clone)]
pub struct PreCommit {
    client: Query,
    ctr: Container,
    src: Option<Directory>,
    pre_commit_version: String,
}

impl PreCommit {
    /// Create a module instance with the default pre-commit version.
    #[must_use]
    pub fn new(client: &Query) -> Self {
        Self::with_version(client, DEFAULT_PRE_COMMIT_VERSION)
    }

    /// Create a module instance installing a specific pre-commit version.
    #[must_use]
    pub fn with_version(client: &Query, pre_commit_version: impl Into<String>) -> Self {
        let pre_commit_version = pre_commit_version.into();
        let ctr = base(client, &pre_commit_version);
        Self {
            client: client.clone(),
            ctr,
            src: None,
            pre_commit_version,
        }
    }

    /// The installed pre-commit version.
    #[must_use]
    pub fn pre_commit_version(&self) -> &str {
        &self.pre_commit_version
    }

    /// The current container state.
    #[must_use]
    pub fn container(&self) -> Container {
        self.ctr.clone()
    }

    /// Replace the current container state.
    #[must_use]
    pub fn with_container(mut self, ctr: Container) -> Self {
        self.ctr = ctr;
        self
    }

    /// The source tree as seen by the current container.
    #[must_use]
    pub fn source(&self) -> Directory {
        self.container().directory(SRC_DIR)
    }

    /// Set the source tree the hooks run against.
    #[must_use]
    pub fn with_source(mut self, src: Directory) -> Self {
        self.src = Some(src);
        self
    }

    /// Record a hook run on the current container.
    #[must_use]
    pub fn with_run(self, hook_stage: Option<&str>) -> Self {
        let ctr = self.container().with_exec(run_command(hook_stage));
        self.with_container(ctr)
    }

    /// Run the hooks against the configured source and return their output.
    ///
    /// Fails with a configuration error when no source was set.
    pub async fn run(self, hook_stage: Option<&str>) -> Result<String> {
        debug!(?hook_stage, "Running pre-commit hooks");
        self.prepare()?
            .with_exec(run_command(hook_stage))
            .stdout()
            .await
            .map_err(Error::dagger)
    }

    /// Mount the hook cache and the source tree onto the current container.
    fn prepare(&self) -> Result<Container> {
        let src = self.src.clone().ok_or_else(|| {
            Error::configuration("pre-commit requires a source directory; call with_source first")
        })?;

        // See https://pre-commit.com/#managing-ci-caches
        Ok(self
            .container()
            .with_mounted_cache(
                format!("{XDG_CACHE_HOME_DIR}/pre-commit"),
                self.client.cache_volume(HOOK_CACHE_KEY),
            )
            .with_env_variable("XDG_CACHE_HOME", XDG_CACHE_HOME_DIR)
            .with_directory(SRC_DIR, src)
            .with_workdir(SRC_DIR))
    }
}

fn base(client: &Query, pre_commit_version: &str) -> Container {
    client
        .container()
        .from(DEFAULT_BASE_IMAGE)
        // Build dependencies for hook environments
        .with_exec(strings(&["apk", "add", "alpine-sdk", "python3", "python3-dev"]))
        // pipx puts the pre-commit entrypoint on PATH
        .with_env_variable("PIPX_HOME", "/opt/pipx")
        .with_env_variable("PIPX_BIN_DIR", "/usr/local/bin")
        .with_exec(strings(&["apk", "add", "--no-cache", "pipx"]))
        .with_exec(vec![
            "pipx".to_string(),
            "install".to_string(),
            format!("pre-commit=={pre_commit_version}"),
        ])
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_without_stage() {
        assert_eq!(
            run_command(None),
            vec!["pre-commit", "run", "--all-files", "--verbose"]
        );
    }

    #[test]
    fn test_run_command_with_stage() {
        assert_eq!(
            run_command(Some("manual")),
            vec![
                "pre-commit",
                "run",
                "--all-files",
                "--verbose",
                "--hook-stage",
                "manual",
            ]
        );
    }

    #[test]
    fn test_default_version_is_pinned() {
        assert_eq!(DEFAULT_PRE_COMMIT_VERSION, "3.6.2");
    }
}
