//! Dagger module turning a Yocto SDK installer into a devcontainer image.
//!
//! OpenEmbedded builds can deploy a self-extracting SDK installer
//! (`*toolchain*.sh`). [`OpenembeddedSdkBuilder`] runs that installer
//! inside a builder image, captures the installed SDK tree, and layers it
//! onto a devcontainer base image. The SDK environment is baked in at
//! build time — `SDK_HOME`, `OECORE_NATIVE_SYSROOT`, and `SDK_ENV_SETUP`
//! — so native SDK tools work without sourcing the setup script first,
//! e.g. when the image backs a devcontainer.

use dagger_sdk::{
    Container, ContainerWithExecOpts, ContainerWithExecOptsBuilder, ContainerWithFileOpts,
    ContainerWithFileOptsBuilder, Directory, File, Platform, Query, QueryContainerOptsBuilder,
};
use daggerverse_core::{Error, Result};
use tracing::debug;

/// Default image the SDK installer runs in.
pub const DEFAULT_BUILDER_IMAGE_REF: &str = "python:3.13-bookworm";
/// Default devcontainer base image the SDK is layered onto.
pub const DEFAULT_BASE_IMAGE_REF: &str = "mcr.microsoft.com/devcontainers/cpp:bookworm";
/// Install location of the SDK inside the final image.
pub const SDK_INSTALL_DIR: &str = "/sdk";

const SDK_INSTALLER_GLOB: &str = "**/tmp*/deploy/sdk/*toolchain*.sh";
const ENV_SETUP_GLOB: &str = "environment-setup-*";
const ENTRYPOINT_PATH: &str = "/usr/bin/entrypoint";

const ENTRYPOINT_SCRIPT: &str = r#"#!/bin/sh
# Load the SDK environment before handing over to CMD
. "$(find "${SDK_HOME}" -maxdepth 1 -type f -name 'environment-setup-*')"

exec "$@"
"#;

/// The OpenEmbedded SDK builder Dagger module.
///
/// Feed it a deploy-binaries source via one of the `with_sdk_dir_from_*`
/// methods, then call [`OpenembeddedSdkBuilder::container`] to get the
/// finished devcontainer image.
#[derive(Clone)]
pub struct OpenembeddedSdkBuilder {
    client: Query,
    base_image_ref: String,
    sdk_dir: Directory,
    entrypoint: Option<File>,
}

impl OpenembeddedSdkBuilder {
    /// Create a module instance on the default devcontainer base image.
    #[must_use]
    pub fn new(client: &Query) -> Self {
        Self::with_base_image_ref(client, DEFAULT_BASE_IMAGE_REF)
    }

    /// Create a module instance on a custom devcontainer base image.
    #[must_use]
    pub fn with_base_image_ref(client: &Query, base_image_ref: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            base_image_ref: base_image_ref.into(),
            sdk_dir: client.directory(),
            entrypoint: None,
        }
    }

    /// The configured devcontainer base image reference.
    #[must_use]
    pub fn base_image_ref(&self) -> &str {
        &self.base_image_ref
    }

    /// The installed SDK tree.
    #[must_use]
    pub fn sdk_dir(&self) -> Directory {
        self.sdk_dir.clone()
    }

    /// Set an already-installed SDK tree directly.
    #[must_use]
    pub fn with_sdk_dir(mut self, sdk_dir: Directory) -> Self {
        self.sdk_dir = sdk_dir;
        self
    }

    /// Replace the generated entrypoint script.
    #[must_use]
    pub fn with_entrypoint_file(mut self, entrypoint: File) -> Self {
        self.entrypoint = Some(entrypoint);
        self
    }

    /// Install the SDK from an image containing deploy binaries.
    pub async fn with_sdk_dir_from_deploy_bin_ref(
        self,
        address: impl Into<String>,
        builder_image_ref: Option<&str>,
        platform: Option<Platform>,
    ) -> Result<Self> {
        let ctr = container_on(&self.client, platform.clone())?.from(address);
        self.with_sdk_dir_from_deploy_bin_ctr(ctr, builder_image_ref, platform)
            .await
    }

    /// Install the SDK from a container holding deploy binaries at `/`.
    pub async fn with_sdk_dir_from_deploy_bin_ctr(
        self,
        ctr: Container,
        builder_image_ref: Option<&str>,
        platform: Option<Platform>,
    ) -> Result<Self> {
        let platform = match platform {
            Some(platform) => platform,
            None => ctr.platform().await.map_err(Error::dagger)?,
        };
        let directory = ctr.directory("/");
        self.with_sdk_dir_from_deploy_bin_dir(directory, builder_image_ref, Some(platform))
            .await
    }

    /// Install the SDK from a directory of deploy binaries.
    ///
    /// Locates the toolchain installer under the deploy tree, runs it
    /// inside the builder image, and captures the installed SDK. Fails
    /// with a validation error unless exactly one installer matches.
    pub async fn with_sdk_dir_from_deploy_bin_dir(
        mut self,
        directory: Directory,
        builder_image_ref: Option<&str>,
        platform: Option<Platform>,
    ) -> Result<Self> {
        let installers = directory
            .glob(SDK_INSTALLER_GLOB)
            .await
            .map_err(Error::dagger)?;
        let installer = exactly_one(&installers, "SDK installer")?;
        debug!(installer, "Installing SDK in builder image");

        self.sdk_dir = container_on(&self.client, platform)?
            .from(builder_image_ref.unwrap_or(DEFAULT_BUILDER_IMAGE_REF))
            .with_mounted_directory("/src", directory)
            .with_exec(install_command(installer))
            .directory(SDK_INSTALL_DIR);

        Ok(self)
    }

    /// Assemble the devcontainer image with the SDK environment baked in.
    pub async fn container(&self, platform: Option<Platform>) -> Result<Container> {
        let entrypoint = match &self.entrypoint {
            Some(file) => file.clone(),
            None => self.default_entrypoint(),
        };

        let mut ctr = container_on(&self.client, platform)?
            .from(self.base_image_ref.clone())
            .with_directory(SDK_INSTALL_DIR, self.sdk_dir())
            .with_file_opts(ENTRYPOINT_PATH, entrypoint, executable_file_opts()?)
            .with_entrypoint(vec![ENTRYPOINT_PATH.to_string()])
            .with_default_args(vec!["/bin/bash".to_string()])
            .with_env_variable("SDK_HOME", SDK_INSTALL_DIR);

        // Bake in OECORE_NATIVE_SYSROOT so native SDK tools are available
        // without executing the environment setup script.
        let sysroot = ctr
            .with_exec_opts(
                vec!["printenv".to_string(), "OECORE_NATIVE_SYSROOT".to_string()],
                entrypoint_exec_opts()?,
            )
            .stdout()
            .await
            .map_err(Error::dagger)?
            .trim()
            .to_string();
        if sysroot.is_empty() {
            return Err(Error::validation(
                "OECORE_NATIVE_SYSROOT environment variable not found in the SDK",
            ));
        }
        ctr = ctr.with_env_variable("OECORE_NATIVE_SYSROOT", sysroot);

        // Bake in the environment setup script path, e.g. to ease running
        // tasks from an editor.
        let setups = ctr
            .directory(SDK_INSTALL_DIR)
            .glob(ENV_SETUP_GLOB)
            .await
            .map_err(Error::dagger)?;
        let setup = exactly_one(&setups, "environment setup script")?;

        Ok(ctr.with_env_variable("SDK_ENV_SETUP", format!("{SDK_INSTALL_DIR}/{setup}")))
    }

    fn default_entrypoint(&self) -> File {
        self.client
            .directory()
            .with_new_file("entrypoint", ENTRYPOINT_SCRIPT)
            .file("entrypoint")
    }
}

fn container_on(client: &Query, platform: Option<Platform>) -> Result<Container> {
    match platform {
        Some(platform) => {
            let opts = QueryContainerOptsBuilder::default()
                .platform(platform)
                .build()
                .map_err(|err| Error::configuration(err.to_string()))?;
            Ok(client.container_opts(opts))
        }
        None => Ok(client.container()),
    }
}

fn install_command(installer: &str) -> Vec<String> {
    vec![
        format!("/src/{installer}"),
        "-d".to_string(),
        SDK_INSTALL_DIR.to_string(),
        "-y".to_string(),
    ]
}

fn exactly_one<'a>(matches: &'a [String], what: &str) -> Result<&'a str> {
    match matches {
        [single] => Ok(single),
        _ => Err(Error::validation(format!(
            "expected exactly one {what}, found {}",
            matches.len()
        ))),
    }
}

fn executable_file_opts() -> Result<ContainerWithFileOpts<'static>> {
    ContainerWithFileOptsBuilder::default()
        .permissions(0o755isize)
        .build()
        .map_err(|err| Error::configuration(err.to_string()))
}

fn entrypoint_exec_opts() -> Result<ContainerWithExecOpts<'static>> {
    ContainerWithExecOptsBuilder::default()
        .use_entrypoint(true)
        .build()
        .map_err(|err| Error::configuration(err.to_string()))
}
