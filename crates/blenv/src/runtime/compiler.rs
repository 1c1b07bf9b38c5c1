//! Compiling a resolved environment into a launch plan
//!
//! Flag order is fixed: Blender reads the positional `.blend` argument last,
//! and plan output is compared verbatim in tests.

use crate::config::{EnvFileError, EnvVariableSet, EnvironmentSpec};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Call-site options that adjust the compiled arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Replaces the environment's `target_file`
    pub target_file: Option<String>,
    /// Appended after everything else
    pub extra_args: Option<Vec<String>>,
    /// Replaces every generated argument, including `raw_args`
    pub override_args: Option<Vec<String>>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_file(mut self, target: impl Into<String>) -> Self {
        self.target_file = Some(target.into());
        self
    }

    pub fn with_extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_override_args(
        mut self,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.override_args = Some(args.into_iter().map(Into::into).collect());
        self
    }
}

/// Build the argument vector; the first element is always the executable
pub fn compile_args(spec: &EnvironmentSpec, options: &CompileOptions) -> Vec<String> {
    let mut args = vec![spec.executable_path.clone()];

    if let Some(override_args) = &options.override_args {
        args.extend(override_args.iter().cloned());
        return args;
    }

    if let Some(raw_args) = &spec.raw_args {
        args.extend(raw_args.iter().cloned());
        if let Some(extra) = &options.extra_args {
            args.extend(extra.iter().cloned());
        }
        return args;
    }

    if spec.background {
        args.push("--background".to_string());
    }
    if spec.autoexec {
        args.push("--enable-autoexec".to_string());
    }
    if spec.python_use_system_env {
        args.push("--python-use-system-env".to_string());
    }

    let valued = [
        ("--app-template", &spec.app_template),
        ("--python", &spec.python_script_path),
        ("--python-text", &spec.python_text_block),
        ("--python-expr", &spec.python_expr),
    ];
    for (flag, value) in valued {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }

    if spec.python_console {
        args.push("--python-console".to_string());
    }
    if let Some(code) = spec.python_exit_code {
        args.push("--python-exit-code".to_string());
        args.push(code.to_string());
    }
    if !spec.addons.is_empty() {
        // Blender takes a single comma separated list
        args.push("--addon".to_string());
        args.push(spec.addons.join(","));
    }

    if let Some(target) = options.target_file.as_ref().or(spec.target_file.as_ref()) {
        args.push(target.clone());
    }

    if let Some(extra) = &options.extra_args {
        args.extend(extra.iter().cloned());
    }

    args
}

/// How the child process environment is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum EnvDirective {
    /// Inherit the current environment unchanged
    Ambient,
    /// Merge the file's variables into the current environment
    Merge {
        env_file: PathBuf,
        override_existing: bool,
    },
    /// Use only the file's variables
    Isolated { env_file: PathBuf },
}

impl EnvDirective {
    /// Directive for a resolved environment
    pub fn for_spec(spec: &EnvironmentSpec) -> Self {
        let env_file = PathBuf::from(&spec.env_file_path);
        if spec.env_inherit {
            EnvDirective::Merge {
                env_file,
                override_existing: spec.env_override,
            }
        } else {
            EnvDirective::Isolated { env_file }
        }
    }

    pub fn env_file(&self) -> Option<&PathBuf> {
        match self {
            EnvDirective::Ambient => None,
            EnvDirective::Merge { env_file, .. } | EnvDirective::Isolated { env_file } => {
                Some(env_file)
            }
        }
    }

    /// Variables to apply on top of the inherited environment
    ///
    /// `ambient_names` are the variable names already set in the parent
    /// process; they only matter when merging without overriding.
    pub fn materialize<K: AsRef<OsStr>>(
        &self,
        ambient_names: impl IntoIterator<Item = K>,
        file_vars: &EnvVariableSet,
    ) -> ProcessEnvironment {
        match self {
            EnvDirective::Ambient => ProcessEnvironment::default(),
            EnvDirective::Merge {
                override_existing, ..
            } => {
                let existing: HashSet<OsString> = if *override_existing {
                    HashSet::new()
                } else {
                    ambient_names
                        .into_iter()
                        .map(|name| name.as_ref().to_os_string())
                        .collect()
                };
                ProcessEnvironment {
                    clear: false,
                    vars: file_vars
                        .iter()
                        .filter(|(key, _)| !existing.contains(OsStr::new(key)))
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                }
            }
            EnvDirective::Isolated { .. } => ProcessEnvironment {
                clear: true,
                vars: file_vars
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        }
    }

    /// Read the env file (if any) and materialize it
    pub fn load<K: AsRef<OsStr>>(
        &self,
        ambient_names: impl IntoIterator<Item = K>,
    ) -> Result<ProcessEnvironment, EnvFileError> {
        let file_vars = match self.env_file() {
            Some(path) => EnvVariableSet::from_file(path)?,
            None => EnvVariableSet::new(),
        };
        Ok(self.materialize(ambient_names, &file_vars))
    }
}

/// Changes applied to the child process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnvironment {
    /// Start from an empty environment instead of inheriting the parent's
    pub clear: bool,
    /// Set after clearing or on top of the inherited variables
    pub vars: IndexMap<String, String>,
}

/// Everything needed to launch one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub environment: String,
    pub args: Vec<String>,
    pub env: EnvDirective,
}

impl LaunchPlan {
    /// Compile a resolved environment
    pub fn compile(name: &str, spec: &EnvironmentSpec, options: &CompileOptions) -> Self {
        Self {
            environment: name.to_string(),
            args: compile_args(spec, options),
            env: EnvDirective::for_spec(spec),
        }
    }

    /// Run an executable directly, outside any configured environment
    pub fn direct(executable: impl Into<String>, args: Vec<String>, env: EnvDirective) -> Self {
        let mut full_args = vec![executable.into()];
        full_args.extend(args);
        Self {
            environment: String::new(),
            args: full_args,
            env,
        }
    }

    pub fn program(&self) -> &str {
        &self.args[0]
    }
}

/// Display the launch plan in a human-readable format
impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.environment.is_empty() {
            writeln!(f, "Environment: {}", self.environment)?;
        }
        writeln!(f, "Command: {}", self.args.join(" "))?;
        match &self.env {
            EnvDirective::Ambient => writeln!(f, "Env: inherited"),
            EnvDirective::Merge {
                env_file,
                override_existing,
            } => writeln!(
                f,
                "Env: {} merged ({})",
                env_file.display(),
                if *override_existing {
                    "file wins"
                } else {
                    "existing wins"
                }
            ),
            EnvDirective::Isolated { env_file } => {
                writeln!(f, "Env: {} only", env_file.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EnvironmentSpec {
        let mut spec = EnvironmentSpec::new("/bin/app", ".env");
        spec.background = true;
        spec.target_file = Some("a.proj".to_string());
        spec
    }

    #[test]
    fn test_background_and_target() {
        assert_eq!(
            compile_args(&spec(), &CompileOptions::new()),
            vec!["/bin/app", "--background", "a.proj"]
        );
    }

    #[test]
    fn test_target_override() {
        let options = CompileOptions::new().with_target_file("b.proj");
        assert_eq!(
            compile_args(&spec(), &options),
            vec!["/bin/app", "--background", "b.proj"]
        );
    }

    #[test]
    fn test_override_args_replace_everything() {
        let mut spec = spec();
        spec.raw_args = Some(vec!["--factory-startup".to_string()]);
        let options = CompileOptions::new()
            .with_override_args(["x", "y"])
            .with_extra_args(["ignored"])
            .with_target_file("ignored.blend");
        assert_eq!(compile_args(&spec, &options), vec!["/bin/app", "x", "y"]);
    }

    #[test]
    fn test_raw_args_skip_flags_but_keep_extra() {
        let mut spec = spec();
        spec.raw_args = Some(vec!["--factory-startup".to_string()]);
        spec.autoexec = true;

        assert_eq!(
            compile_args(&spec, &CompileOptions::new()),
            vec!["/bin/app", "--factory-startup"]
        );
        assert_eq!(
            compile_args(&spec, &CompileOptions::new().with_extra_args(["--", "--verbose"])),
            vec!["/bin/app", "--factory-startup", "--", "--verbose"]
        );
    }

    #[test]
    fn test_full_flag_order() {
        let mut spec = EnvironmentSpec::new("blender", ".env");
        spec.background = true;
        spec.autoexec = true;
        spec.python_use_system_env = true;
        spec.app_template = Some("studio".to_string());
        spec.python_script_path = Some("run.py".to_string());
        spec.python_text_block = Some("Text".to_string());
        spec.python_expr = Some("print(1)".to_string());
        spec.python_console = true;
        spec.python_exit_code = Some(2);
        spec.addons = vec!["foo".to_string(), "bar".to_string()];
        spec.target_file = Some("scene.blend".to_string());

        let options = CompileOptions::new().with_extra_args(["--", "custom"]);
        assert_eq!(
            compile_args(&spec, &options),
            vec![
                "blender",
                "--background",
                "--enable-autoexec",
                "--python-use-system-env",
                "--app-template",
                "studio",
                "--python",
                "run.py",
                "--python-text",
                "Text",
                "--python-expr",
                "print(1)",
                "--python-console",
                "--python-exit-code",
                "2",
                "--addon",
                "foo,bar",
                "scene.blend",
                "--",
                "custom",
            ]
        );
    }

    #[test]
    fn test_addons_joined_into_one_token() {
        let mut spec = EnvironmentSpec::new("blender", ".env");
        spec.addons = vec!["foo".to_string(), "bar".to_string()];
        let args = compile_args(&spec, &CompileOptions::new());
        assert_eq!(args, vec!["blender", "--addon", "foo,bar"]);
        assert_eq!(args.iter().filter(|a| *a == "--addon").count(), 1);
    }

    #[test]
    fn test_exit_code_zero_is_emitted() {
        let mut spec = EnvironmentSpec::new("blender", ".env");
        spec.python_exit_code = Some(0);
        assert_eq!(
            compile_args(&spec, &CompileOptions::new()),
            vec!["blender", "--python-exit-code", "0"]
        );
    }

    #[test]
    fn test_directive_for_spec() {
        let mut spec = EnvironmentSpec::new("blender", ".env.dev");
        spec.env_override = false;
        assert_eq!(
            EnvDirective::for_spec(&spec),
            EnvDirective::Merge {
                env_file: PathBuf::from(".env.dev"),
                override_existing: false,
            }
        );

        spec.env_inherit = false;
        assert_eq!(
            EnvDirective::for_spec(&spec),
            EnvDirective::Isolated {
                env_file: PathBuf::from(".env.dev"),
            }
        );
    }

    #[test]
    fn test_materialize_merge_override() {
        let file_vars: EnvVariableSet = [("A", "file"), ("B", "file")].into_iter().collect();
        let ambient = ["A", "PATH"];

        let overriding = EnvDirective::Merge {
            env_file: PathBuf::from(".env"),
            override_existing: true,
        }
        .materialize(ambient, &file_vars);
        assert!(!overriding.clear);
        assert_eq!(overriding.vars.len(), 2);
        assert_eq!(overriding.vars["A"], "file");
        assert_eq!(overriding.vars["B"], "file");

        let keeping = EnvDirective::Merge {
            env_file: PathBuf::from(".env"),
            override_existing: false,
        }
        .materialize(ambient, &file_vars);
        assert!(!keeping.vars.contains_key("A"));
        assert_eq!(keeping.vars["B"], "file");
    }

    #[test]
    fn test_materialize_ambient_changes_nothing() {
        let file_vars: EnvVariableSet = [("A", "file")].into_iter().collect();
        let env = EnvDirective::Ambient.materialize(["PATH"], &file_vars);
        assert_eq!(env, ProcessEnvironment::default());
    }

    #[test]
    fn test_materialize_isolated_clears() {
        let file_vars: EnvVariableSet = [("A", "file")].into_iter().collect();
        let env = EnvDirective::Isolated {
            env_file: PathBuf::from(".env"),
        }
        .materialize(["PATH"], &file_vars);
        assert!(env.clear);
        assert_eq!(env.vars.len(), 1);
        assert_eq!(env.vars["A"], "file");
    }

    #[cfg(unix)]
    #[test]
    fn test_materialize_with_non_utf8_names() {
        use std::os::unix::ffi::OsStringExt;

        let file_vars: EnvVariableSet = [("A", "file")].into_iter().collect();
        let names = vec![OsString::from_vec(vec![0x66, 0xff, 0x6f]), OsString::from("A")];
        let env = EnvDirective::Merge {
            env_file: PathBuf::from(".env"),
            override_existing: false,
        }
        .materialize(names, &file_vars);
        assert!(env.vars.is_empty());
    }

    #[test]
    fn test_load_reads_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "BLENDER_USER_SCRIPTS=/project/src\n").unwrap();

        let env = EnvDirective::Isolated { env_file: path }
            .load(std::iter::empty::<OsString>())
            .unwrap();
        assert_eq!(env.vars["BLENDER_USER_SCRIPTS"], "/project/src");
    }

    #[test]
    fn test_load_missing_env_file_fails() {
        let directive = EnvDirective::Merge {
            env_file: PathBuf::from("/definitely/missing/.env"),
            override_existing: true,
        };
        assert!(matches!(
            directive.load(std::iter::empty::<OsString>()),
            Err(EnvFileError::Io { .. })
        ));
    }

    #[test]
    fn test_plan_display() {
        let plan = LaunchPlan::compile("default", &spec(), &CompileOptions::new());
        let text = plan.to_string();
        assert!(text.contains("Environment: default"));
        assert!(text.contains("Command: /bin/app --background a.proj"));
        assert!(text.contains(".env merged (file wins)"));
        assert_eq!(plan.program(), "/bin/app");
    }
}
