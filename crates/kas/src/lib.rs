//! Dagger module for the [kas](https://kas.readthedocs.io) build tool.
//!
//! [`Kas`] wraps a kas container image and exposes the kas CLI operations
//! (`checkout`, `dump`, `build`, `shell`, `for-all-repos`, `lock`) as
//! container transformations. Each operation comes in two forms:
//!
//! - a `with_*` wither that records the command on the current container
//!   and returns the module for further chaining, and
//! - a terminal form that prepares a fresh build container from a source
//!   directory and resolves the operation's output.
//!
//! Yocto builds are heavyweight, so [`Kas::with_prepare`] mounts persistent
//! cache volumes for repository refs, downloads, and shared state, and
//! keeps the build directory out of the container filesystem.

use dagger_sdk::{
    CacheSharingMode, Container, ContainerWithMountedCacheOpts,
    ContainerWithMountedCacheOptsBuilder, ContainerWithMountedDirectoryOpts,
    ContainerWithMountedDirectoryOptsBuilder, ContainerWithMountedSecretOpts,
    ContainerWithMountedSecretOptsBuilder, Directory, Query, Secret,
};
use daggerverse_core::{EnvVar, Error, Result};
use daggerverse_utils::bust_cache;
use tracing::debug;

pub mod command;

pub use command::{
    BuildArgs, CheckoutArgs, DumpArgs, DumpFormat, ForAllReposArgs, LockArgs, ShellArgs,
};

/// Default kas container image.
pub const DEFAULT_BASE_IMAGE_REF: &str = "ghcr.io/siemens/kas/kas:4.8";

/// Mount point of the project source.
pub const KAS_WORK_DIR: &str = "/workdir";
/// Mount point of the repository reference cache.
pub const KAS_REPO_REF_DIR: &str = "/repos";
/// Mount point of the build directory.
pub const KAS_BUILD_DIR: &str = "/build";
/// Mount point of the bitbake download cache.
pub const DL_DIR: &str = "/downloads";
/// Mount point of the bitbake shared-state cache.
pub const SSTATE_DIR: &str = "/sstate-cache";

const CACHE_CACHE_KEY: &str = "kas-cache-cache";
const DOWNLOADS_CACHE_KEY: &str = "kas-downloads-cache";
const SSTATE_CACHE_KEY: &str = "kas-sstate-cache";
const REPO_REF_CACHE_KEY: &str = "kas-repo-ref-cache";

const NETRC_MOUNT_PATH: &str = "/run/secrets/NETRC_FILE";
const GITCONFIG_FILE: &str = "/tmp/.daggerverse-kas-gitconfig";

/// The kas Dagger module.
///
/// Holds the current container state plus the inputs (source directory,
/// credentials) the prepare step consumes. All methods are withers: they
/// consume the module and return a derived one, mirroring the immutability
/// of the underlying Dagger values.
#[derive(Clone)]
pub struct Kas {
    client: Query,
    base_image_ref: String,
    ctr: Container,
    src: Directory,
    netrc: Option<Secret>,
}

impl Kas {
    /// Create a module instance on the default kas image.
    #[must_use]
    pub fn new(client: &Query) -> Self {
        Self::with_base_image_ref(client, DEFAULT_BASE_IMAGE_REF)
    }

    /// Create a module instance on a custom kas image.
    #[must_use]
    pub fn with_base_image_ref(client: &Query, base_image_ref: impl Into<String>) -> Self {
        let base_image_ref = base_image_ref.into();
        let ctr = client.container().from(base_image_ref.clone());
        Self {
            client: client.clone(),
            base_image_ref,
            ctr,
            src: client.directory(),
            netrc: None,
        }
    }

    /// The configured base image reference.
    #[must_use]
    pub fn base_image_ref(&self) -> &str {
        &self.base_image_ref
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

    /// The project source as seen by the current container.
    #[must_use]
    pub fn source(&self) -> Directory {
        self.container().directory(KAS_WORK_DIR)
    }

    /// Set the project source directory.
    #[must_use]
    pub fn with_source(mut self, src: Directory) -> Self {
        self.src = src;
        self
    }

    /// Mount a netrc file for authenticated repository access.
    #[must_use]
    pub fn with_netrc(mut self, netrc: Secret) -> Self {
        self.netrc = Some(netrc);
        self
    }

    /// The build directory of the current container.
    #[must_use]
    pub fn build_dir(&self) -> Directory {
        self.container().directory(KAS_BUILD_DIR)
    }

    /// Set an environment variable on the current container.
    #[must_use]
    pub fn with_env_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let ctr = self.container().with_env_variable(name, value);
        self.with_container(ctr)
    }

    /// Force a rebuild of all container layers after this point.
    ///
    /// Injects a uniquely named environment variable so the definition is
    /// never byte-identical to a previously memoized one.
    #[must_use]
    pub fn with_invalidate_layer_cache(self) -> Self {
        let bust = bust_cache();
        let ctr = bust(self.container());
        self.with_container(ctr)
    }

    /// Assemble the build container on top of the current container state.
    ///
    /// Mounts credentials, the build directory, the four persistent cache
    /// volumes, and finally the project source; exports the matching kas
    /// and bitbake environment variables; applies `extra_env_variables`
    /// last so callers can override any default. Every mount is owned by
    /// the container's active user; the repo-ref and build caches are
    /// mounted privately so concurrent builds cannot corrupt each other.
    pub async fn with_prepare(self, extra_env_variables: &[EnvVar]) -> Result<Self> {
        let mut ctr = self.container();

        // The kas image runs as a non-root user; this expects that user to
        // be installed and currently active.
        let non_root_user = ctr.user().await.map_err(Error::dagger)?;

        // Credentials
        if let Some(netrc) = &self.netrc {
            ctr = ctr
                .with_mounted_secret_opts(
                    NETRC_MOUNT_PATH,
                    netrc.clone(),
                    netrc_secret_opts(&non_root_user)?,
                )
                .with_env_variable("NETRC_FILE", NETRC_MOUNT_PATH);
        }

        // Make Git trust any directory as otherwise git refuses to run
        // commands from the container's non-root user. Using git-config
        // instead of a plain file to allow for easier extension in other
        // modules.
        ctr = ctr
            .with_env_variable("GITCONFIG_FILE", GITCONFIG_FILE)
            .with_exec(argv(&[
                "git",
                "config",
                "--file",
                GITCONFIG_FILE,
                "--add",
                "safe.directory",
                "*",
            ]));

        // Mounted so that the build tree is not stored in the container
        // filesystem.
        ctr = ctr
            .with_mounted_directory_opts(
                KAS_BUILD_DIR,
                self.client.directory(),
                owned_dir_opts(&non_root_user)?,
            )
            .with_env_variable("KAS_BUILD_DIR", KAS_BUILD_DIR);

        // Persistent caches. Repo refs and the build cache are per-build
        // state, so they get private sharing; downloads and sstate are
        // safe to share across builds.
        ctr = ctr
            .with_mounted_cache_opts(
                KAS_REPO_REF_DIR,
                self.client.cache_volume(REPO_REF_CACHE_KEY),
                private_cache_opts(&non_root_user)?,
            )
            .with_env_variable("KAS_REPO_REF_DIR", KAS_REPO_REF_DIR)
            .with_mounted_cache_opts(
                format!("{KAS_BUILD_DIR}/cache"),
                self.client.cache_volume(CACHE_CACHE_KEY),
                private_cache_opts(&non_root_user)?,
            )
            .with_mounted_cache_opts(
                DL_DIR,
                self.client.cache_volume(DOWNLOADS_CACHE_KEY),
                owned_cache_opts(&non_root_user)?,
            )
            .with_env_variable("DL_DIR", DL_DIR)
            .with_mounted_cache_opts(
                SSTATE_DIR,
                self.client.cache_volume(SSTATE_CACHE_KEY),
                owned_cache_opts(&non_root_user)?,
            )
            .with_env_variable("SSTATE_DIR", SSTATE_DIR);

        // Mount the project source last to improve layer caching
        ctr = ctr
            .with_env_variable("KAS_WORK_DIR", KAS_WORK_DIR)
            .with_mounted_directory_opts(
                KAS_WORK_DIR,
                self.src.clone(),
                owned_dir_opts(&non_root_user)?,
            )
            .with_workdir(KAS_WORK_DIR);

        for var in extra_env_variables {
            ctr = ctr.with_env_variable(var.name.clone(), var.value.clone());
        }

        Ok(self.with_container(ctr))
    }

    /// Reset to the base image, set the source, and assemble the build
    /// container in one step.
    pub async fn prepare(self, src: Directory, extra_env_variables: &[EnvVar]) -> Result<Self> {
        let base = self.client.container().from(self.base_image_ref.clone());
        self.with_container(base)
            .with_source(src)
            .with_prepare(extra_env_variables)
            .await
    }

    /// Record a kas invocation on the current container.
    #[must_use]
    pub fn with_kas(self, args: Vec<String>) -> Self {
        debug!(?args, "Recording kas invocation");
        let mut command = vec!["kas".to_string()];
        command.extend(args);
        let ctr = self.container().with_exec(command);
        self.with_container(ctr)
    }

    /// Run an arbitrary kas command against `src` and return its stdout.
    pub async fn kas(
        self,
        src: Directory,
        args: Vec<String>,
        extra_env_variables: &[EnvVar],
    ) -> Result<String> {
        self.prepare(src, extra_env_variables)
            .await?
            .with_kas(args)
            .stdout()
            .await
    }

    /// Record a `kas checkout` on the current container.
    #[must_use]
    pub fn with_checkout(self, args: &CheckoutArgs) -> Self {
        self.with_kas(args.to_argv())
    }

    /// Check out all repositories of `src` and return the resulting tree.
    pub async fn checkout(
        self,
        src: Directory,
        args: &CheckoutArgs,
        extra_env_variables: &[EnvVar],
    ) -> Result<Directory> {
        Ok(self
            .prepare(src, extra_env_variables)
            .await?
            .with_checkout(args)
            .source())
    }

    /// Record a `kas dump` on the current container.
    #[must_use]
    pub fn with_dump(self, args: &DumpArgs) -> Self {
        self.with_kas(args.to_argv())
    }

    /// Dump the flattened configuration of `src`.
    pub async fn dump(
        self,
        src: Directory,
        args: &DumpArgs,
        extra_env_variables: &[EnvVar],
    ) -> Result<String> {
        self.prepare(src, extra_env_variables)
            .await?
            .with_dump(args)
            .stdout()
            .await
    }

    /// Record a `kas build` on the current container.
    #[must_use]
    pub fn with_build(self, args: &BuildArgs) -> Self {
        self.with_kas(args.to_argv())
    }

    /// Build `src` and return the build directory.
    pub async fn build(
        self,
        src: Directory,
        args: &BuildArgs,
        extra_env_variables: &[EnvVar],
    ) -> Result<Directory> {
        Ok(self
            .prepare(src, extra_env_variables)
            .await?
            .with_build(args)
            .build_dir())
    }

    /// Record a `kas shell -c` on the current container.
    #[must_use]
    pub fn with_shell(self, args: &ShellArgs) -> Self {
        self.with_kas(args.to_argv())
    }

    /// Run a shell command in the kas environment of `src` and return the
    /// resulting container.
    pub async fn shell(
        self,
        src: Directory,
        args: &ShellArgs,
        extra_env_variables: &[EnvVar],
    ) -> Result<Container> {
        Ok(self
            .prepare(src, extra_env_variables)
            .await?
            .with_shell(args)
            .container())
    }

    /// Record a `kas for-all-repos` on the current container.
    #[must_use]
    pub fn with_for_all_repos(self, args: &ForAllReposArgs) -> Self {
        self.with_kas(args.to_argv())
    }

    /// Run a command in every repository of `src` and return the resulting
    /// container.
    pub async fn for_all_repos(
        self,
        src: Directory,
        args: &ForAllReposArgs,
        extra_env_variables: &[EnvVar],
    ) -> Result<Container> {
        Ok(self
            .prepare(src, extra_env_variables)
            .await?
            .with_for_all_repos(args)
            .container())
    }

    /// Record a `kas lock` on the current container.
    #[must_use]
    pub fn with_lock(self, args: &LockArgs) -> Self {
        self.with_kas(args.to_argv())
    }

    /// Create a lockfile for `src` and return the lockfile content.
    pub async fn lock(
        self,
        src: Directory,
        args: &LockArgs,
        extra_env_variables: &[EnvVar],
    ) -> Result<String> {
        self.prepare(src, extra_env_variables)
            .await?
            .with_lock(args)
            .stdout()
            .await
    }

    async fn stdout(self) -> Result<String> {
        self.container().stdout().await.map_err(Error::dagger)
    }
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

fn netrc_secret_opts(owner: &str) -> Result<ContainerWithMountedSecretOpts<'_>> {
    ContainerWithMountedSecretOptsBuilder::default()
        .owner(owner)
        .mode(0o600isize)
        .build()
        .map_err(|err| Error::configuration(err.to_string()))
}

fn owned_dir_opts(owner: &str) -> Result<ContainerWithMountedDirectoryOpts<'_>> {
    ContainerWithMountedDirectoryOptsBuilder::default()
        .owner(owner)
        .build()
        .map_err(|err| Error::configuration(err.to_string()))
}

fn owned_cache_opts(owner: &str) -> Result<ContainerWithMountedCacheOpts<'_>> {
    ContainerWithMountedCacheOptsBuilder::default()
        .owner(owner)
        .build()
        .map_err(|err| Error::configuration(err.to_string()))
}

fn private_cache_opts(owner: &str) -> Result<ContainerWithMountedCacheOpts<'_>> {
    ContainerWithMountedCacheOptsBuilder::default()
        .owner(owner)
        .sharing(CacheSharingMode::Private)
        .build()
        .map_err(|err| Error::configuration(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image_is_pinned() {
        assert_eq!(DEFAULT_BASE_IMAGE_REF, "ghcr.io/siemens/kas/kas:4.8");
    }

    #[test]
    fn test_well_known_paths_are_distinct() {
        let paths = [KAS_WORK_DIR, KAS_REPO_REF_DIR, KAS_BUILD_DIR, DL_DIR, SSTATE_DIR];
        for (i, a) in paths.iter().enumerate() {
            assert!(a.starts_with('/'));
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_argv_copies_in_order() {
        assert_eq!(
            argv(&["git", "config"]),
            vec!["git".to_string(), "config".to_string()]
        );
    }

    #[test]
    fn test_netrc_mount_is_owner_restricted() {
        let opts = netrc_secret_opts("builder").unwrap();
        assert_eq!(opts.owner, Some("builder"));
        assert_eq!(opts.mode, Some(0o600));
    }

    #[test]
    fn test_directory_mounts_carry_the_container_user() {
        let opts = owned_dir_opts("builder").unwrap();
        assert_eq!(opts.owner, Some("builder"));
    }

    #[test]
    fn test_repo_ref_and_build_caches_are_private() {
        let opts = private_cache_opts("builder").unwrap();
        assert_eq!(opts.owner, Some("builder"));
        assert_eq!(opts.sharing, Some(CacheSharingMode::Private));
    }

    #[test]
    fn test_download_and_sstate_caches_stay_shared() {
        let opts = owned_cache_opts("builder").unwrap();
        assert_eq!(opts.owner, Some("builder"));
        assert_eq!(opts.sharing, None);
    }
}
