//! Pure builders for kas command lines.
//!
//! Each operation of the kas CLI gets an argument struct with a `to_argv`
//! method; the module code only ever executes what these produce, so the
//! full flag surface is unit-testable without a container.

/// Join config files into kas' `:`-separated config argument.
#[must_use]
pub fn format_config_arg(configs: &[String]) -> String {
    configs.join(":")
}

fn push_configs(argv: &mut Vec<String>, configs: &[String]) {
    if !configs.is_empty() {
        argv.push(format_config_arg(configs));
    }
}

/// Arguments to `kas checkout`.
#[derive(Debug, Clone, Default)]
pub struct CheckoutArgs {
    /// Configuration file(s).
    pub configs: Vec<String>,
    /// Always checkout the desired commit/branch/tag, discarding local changes.
    pub force_checkout: bool,
    /// Pull upstream changes to the branch even if already checked out.
    pub update: bool,
    /// Additional command arguments.
    pub extra_args: Vec<String>,
}

impl CheckoutArgs {
    /// Assemble the kas argument vector.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["checkout".to_string()];
        if self.force_checkout {
            argv.push("--force-checkout".to_string());
        }
        if self.update {
            argv.push("--update".to_string());
        }
        argv.extend(self.extra_args.iter().cloned());
        push_configs(&mut argv, &self.configs);
        argv
    }
}

/// Output format for `kas dump`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpFormat {
    /// YAML output (kas default).
    #[default]
    Yaml,
    /// JSON output.
    Json,
}

impl DumpFormat {
    fn as_str(self) -> &'static str {
        match self {
            DumpFormat::Yaml => "yaml",
            DumpFormat::Json => "json",
        }
    }
}

/// Arguments to `kas dump`.
#[derive(Debug, Clone, Default)]
pub struct DumpArgs {
    /// Configuration file(s).
    pub configs: Vec<String>,
    /// Always checkout the desired commit/branch/tag, discarding local changes.
    pub force_checkout: bool,
    /// Pull upstream changes to the branch even if already checked out.
    pub update: bool,
    /// Output format.
    pub format: DumpFormat,
    /// Replace floating refs with exact SHAs.
    pub resolve_refs: bool,
    /// Add tracking information of the root repository.
    pub resolve_local: bool,
    /// Set environment defaults to captured environment values.
    pub resolve_env: bool,
    /// Additional command arguments.
    pub extra_args: Vec<String>,
}

impl DumpArgs {
    /// Assemble the kas argument vector.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["dump".to_string()];
        if self.force_checkout {
            argv.push("--force-checkout".to_string());
        }
        if self.update {
            argv.push("--update".to_string());
        }
        argv.push("--format".to_string());
        argv.push(self.format.as_str().to_string());
        if self.resolve_refs {
            argv.push("--resolve-refs".to_string());
        }
        if self.resolve_local {
            argv.push("--resolve-local".to_string());
        }
        if self.resolve_env {
            argv.push("--resolve-env".to_string());
        }
        argv.extend(self.extra_args.iter().cloned());
        push_configs(&mut argv, &self.configs);
        argv
    }
}

/// Arguments to `kas build`.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    /// Configuration file(s).
    pub configs: Vec<String>,
    /// Extra arguments to pass to bitbake, after `--`.
    pub extra_bitbake_args: Vec<String>,
    /// Always checkout the desired commit/branch/tag, discarding local changes.
    pub force_checkout: bool,
    /// Pull upstream changes to the branch even if already checked out.
    pub update: bool,
    /// Skip steps that change the configuration.
    pub keep_config_unchanged: bool,
    /// Target to build.
    pub target: Option<String>,
    /// Task to run.
    pub task: Option<String>,
    /// Additional command arguments.
    pub extra_args: Vec<String>,
}

impl BuildArgs {
    /// Assemble the kas argument vector.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["build".to_string()];
        if self.force_checkout {
            argv.push("--force-checkout".to_string());
        }
        if self.update {
            argv.push("--update".to_string());
        }
        if self.keep_config_unchanged {
            argv.push("--keep-config-unchanged".to_string());
        }
        if let Some(target) = &self.target {
            argv.push("--target".to_string());
            argv.push(target.clone());
        }
        if let Some(task) = &self.task {
            argv.push("--task".to_string());
            argv.push(task.clone());
        }
        argv.extend(self.extra_args.iter().cloned());
        push_configs(&mut argv, &self.configs);
        if !self.extra_bitbake_args.is_empty() {
            argv.push("--".to_string());
            argv.extend(self.extra_bitbake_args.iter().cloned());
        }
        argv
    }
}

/// Arguments to `kas shell -c <command>`.
#[derive(Debug, Clone, Default)]
pub struct ShellArgs {
    /// Command to run inside the kas shell.
    pub command: String,
    /// Configuration file(s).
    pub configs: Vec<String>,
    /// Always checkout the desired commit/branch/tag, discarding local changes.
    pub force_checkout: bool,
    /// Pull upstream changes to the branch even if already checked out.
    pub update: bool,
    /// Keep the current user environment block.
    pub preserve_env: bool,
    /// Skip steps that change the configuration.
    pub keep_config_unchanged: bool,
    /// Additional command arguments.
    pub extra_args: Vec<String>,
}

impl ShellArgs {
    /// Assemble the kas argument vector.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["shell".to_string(), "-c".to_string(), self.command.clone()];
        if self.force_checkout {
            argv.push("--force-checkout".to_string());
        }
        if self.update {
            argv.push("--update".to_string());
        }
        if self.preserve_env {
            argv.push("--preserve-env".to_string());
        }
        if self.keep_config_unchanged {
            argv.push("--keep-config-unchanged".to_string());
        }
        argv.extend(self.extra_args.iter().cloned());
        push_configs(&mut argv, &self.configs);
        argv
    }
}

/// Arguments to `kas for-all-repos <command>`.
#[derive(Debug, Clone, Default)]
pub struct ForAllReposArgs {
    /// Command to run in each repository.
    pub command: String,
    /// Configuration file(s).
    pub configs: Vec<String>,
    /// Additional command arguments.
    pub extra_args: Vec<String>,
}

impl ForAllReposArgs {
    /// Assemble the kas argument vector.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["for-all-repos".to_string()];
        argv.extend(self.extra_args.iter().cloned());
        push_configs(&mut argv, &self.configs);
        argv.push(self.command.clone());
        argv
    }
}

/// Arguments to `kas lock`.
#[derive(Debug, Clone, Default)]
pub struct LockArgs {
    /// Configuration file(s).
    pub configs: Vec<String>,
    /// Always checkout the desired commit/branch/tag, discarding local changes.
    pub force_checkout: bool,
    /// Pull upstream changes to the branch even if already checked out.
    pub update: bool,
    /// Additional command arguments.
    pub extra_args: Vec<String>,
}

impl LockArgs {
    /// Assemble the kas argument vector.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["lock".to_string()];
        if self.force_checkout {
            argv.push("--force-checkout".to_string());
        }
        if self.update {
            argv.push("--update".to_string());
        }
        argv.extend(self.extra_args.iter().cloned());
        push_configs(&mut argv, &self.configs);
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_format_config_arg_joins_with_colon() {
        assert_eq!(
            format_config_arg(&strings(&["kas.yml", "ci.yml"])),
            "kas.yml:ci.yml"
        );
        assert_eq!(format_config_arg(&strings(&["kas.yml"])), "kas.yml");
    }

    #[test]
    fn test_checkout_defaults() {
        assert_eq!(CheckoutArgs::default().to_argv(), strings(&["checkout"]));
    }

    #[test]
    fn test_checkout_flags_and_configs() {
        let args = CheckoutArgs {
            configs: strings(&["kas.yml", "extra.yml"]),
            force_checkout: true,
            update: true,
            extra_args: strings(&["--log-level", "debug"]),
        };
        assert_eq!(
            args.to_argv(),
            strings(&[
                "checkout",
                "--force-checkout",
                "--update",
                "--log-level",
                "debug",
                "kas.yml:extra.yml",
            ])
        );
    }

    #[test]
    fn test_dump_defaults_to_yaml() {
        assert_eq!(
            DumpArgs::default().to_argv(),
            strings(&["dump", "--format", "yaml"])
        );
    }

    #[test]
    fn test_dump_resolve_flags() {
        let args = DumpArgs {
            format: DumpFormat::Json,
            resolve_refs: true,
            resolve_local: true,
            resolve_env: true,
            ..DumpArgs::default()
        };
        assert_eq!(
            args.to_argv(),
            strings(&[
                "dump",
                "--format",
                "json",
                "--resolve-refs",
                "--resolve-local",
                "--resolve-env",
            ])
        );
    }

    #[test]
    fn test_build_target_and_task() {
        let args = BuildArgs {
            configs: strings(&["kas.yml"]),
            target: Some("core-image-minimal".to_string()),
            task: Some("build".to_string()),
            keep_config_unchanged: true,
            ..BuildArgs::default()
        };
        assert_eq!(
            args.to_argv(),
            strings(&[
                "build",
                "--keep-config-unchanged",
                "--target",
                "core-image-minimal",
                "--task",
                "build",
                "kas.yml",
            ])
        );
    }

    #[test]
    fn test_build_bitbake_passthrough_comes_last() {
        let args = BuildArgs {
            configs: strings(&["kas.yml"]),
            extra_bitbake_args: strings(&["-c", "cleansstate"]),
            ..BuildArgs::default()
        };
        assert_eq!(
            args.to_argv(),
            strings(&["build", "kas.yml", "--", "-c", "cleansstate"])
        );
    }

    #[test]
    fn test_shell_carries_command_after_dash_c() {
        let args = ShellArgs {
            command: "bitbake -e".to_string(),
            preserve_env: true,
            ..ShellArgs::default()
        };
        assert_eq!(
            args.to_argv(),
            strings(&["shell", "-c", "bitbake -e", "--preserve-env"])
        );
    }

    #[test]
    fn test_for_all_repos_command_comes_last() {
        let args = ForAllReposArgs {
            command: "git log -1".to_string(),
            configs: strings(&["kas.yml"]),
            extra_args: vec![],
        };
        assert_eq!(
            args.to_argv(),
            strings(&["for-all-repos", "kas.yml", "git log -1"])
        );
    }

    #[test]
    fn test_lock_flags() {
        let args = LockArgs {
            configs: strings(&["kas.yml"]),
            force_checkout: true,
            update: false,
            extra_args: vec![],
        };
        assert_eq!(
            args.to_argv(),
            strings(&["lock", "--force-checkout", "kas.yml"])
        );
    }
}
