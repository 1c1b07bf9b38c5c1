//! Environment definitions: raw document fields and resolved specs

use serde::{Deserialize, Serialize};

/// Fields of one environment exactly as written in the document
///
/// Every field is optional; `None` means "not written". Inheritance fills the
/// gaps from the parent, then [`EnvironmentFields::validate`] turns the result
/// into an [`EnvironmentSpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentFields {
    /// Name of the parent environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit: Option<String>,

    /// Path to the Blender executable
    #[serde(default, alias = "blender", skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    /// Env file loaded before launch
    #[serde(default, alias = "env_file", skip_serializing_if = "Option::is_none")]
    pub env_file_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_inherit: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_override: Option<bool>,

    /// .blend file to open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<String>,

    /// Complete argument list, replaces all generated flags
    #[serde(default, alias = "args", skip_serializing_if = "Option::is_none")]
    pub raw_args: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoexec: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_console: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_use_system_env: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_template: Option<String>,

    #[serde(default, alias = "python", skip_serializing_if = "Option::is_none")]
    pub python_script_path: Option<String>,

    #[serde(default, alias = "python_text", skip_serializing_if = "Option::is_none")]
    pub python_text_block: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_expr: Option<String>,

    /// Negative values mean unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_exit_code: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<Vec<String>>,
}

impl EnvironmentFields {
    /// Whether this entry derives from another environment
    pub fn is_derived(&self) -> bool {
        self.inherit.is_some()
    }

    /// Overlay `child` on top of `self`: every field the child writes wins
    pub fn overlay(&self, child: &EnvironmentFields) -> EnvironmentFields {
        let parent = self.clone();
        let child = child.clone();
        EnvironmentFields {
            inherit: child.inherit.or(parent.inherit),
            executable_path: child.executable_path.or(parent.executable_path),
            env_file_path: child.env_file_path.or(parent.env_file_path),
            env_inherit: child.env_inherit.or(parent.env_inherit),
            env_override: child.env_override.or(parent.env_override),
            target_file: child.target_file.or(parent.target_file),
            raw_args: child.raw_args.or(parent.raw_args),
            background: child.background.or(parent.background),
            autoexec: child.autoexec.or(parent.autoexec),
            python_console: child.python_console.or(parent.python_console),
            python_use_system_env: child.python_use_system_env.or(parent.python_use_system_env),
            app_template: child.app_template.or(parent.app_template),
            python_script_path: child.python_script_path.or(parent.python_script_path),
            python_text_block: child.python_text_block.or(parent.python_text_block),
            python_expr: child.python_expr.or(parent.python_expr),
            python_exit_code: child.python_exit_code.or(parent.python_exit_code),
            addons: child.addons.or(parent.addons),
        }
    }

    /// Check required fields and build the resolved spec
    ///
    /// A base environment (no `inherit`) must name both the executable and
    /// the env file. Derived entries are only validated after the parent's
    /// fields have been overlaid, so by then the same rule applies to them.
    /// Empty strings count as unset.
    pub fn validate(&self, name: &str) -> Result<EnvironmentSpec, ValidationError> {
        let mut problems = Vec::new();

        let executable_path = non_empty(&self.executable_path);
        if executable_path.is_none() {
            problems.push("missing required field 'executable_path'".to_string());
        }

        let env_file_path = non_empty(&self.env_file_path);
        if env_file_path.is_none() {
            problems.push("missing required field 'env_file_path'".to_string());
        }

        let python_exit_code = match self.python_exit_code {
            Some(code) if code < 0 => None,
            Some(code) => match u8::try_from(code) {
                Ok(code) => Some(code),
                Err(_) => {
                    problems.push(format!(
                        "'python_exit_code' must be between 0 and 255, got {}",
                        code
                    ));
                    None
                }
            },
            None => None,
        };

        let (Some(executable_path), Some(env_file_path)) = (executable_path, env_file_path) else {
            return Err(ValidationError::new(name, problems));
        };
        if !problems.is_empty() {
            return Err(ValidationError::new(name, problems));
        }

        Ok(EnvironmentSpec {
            inherit: self.inherit.clone(),
            executable_path,
            env_file_path,
            env_inherit: self.env_inherit.unwrap_or(true),
            env_override: self.env_override.unwrap_or(true),
            target_file: non_empty(&self.target_file),
            raw_args: self.raw_args.clone(),
            background: self.background.unwrap_or(false),
            autoexec: self.autoexec.unwrap_or(false),
            python_console: self.python_console.unwrap_or(false),
            python_use_system_env: self.python_use_system_env.unwrap_or(false),
            app_template: non_empty(&self.app_template),
            python_script_path: non_empty(&self.python_script_path),
            python_text_block: non_empty(&self.python_text_block),
            python_expr: non_empty(&self.python_expr),
            python_exit_code,
            addons: self.addons.clone().unwrap_or_default(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// A fully resolved, validated launch environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Parent name, kept for introspection after resolution
    pub inherit: Option<String>,
    pub executable_path: String,
    pub env_file_path: String,
    /// Merge env file variables into the current environment (vs. isolate)
    pub env_inherit: bool,
    /// When merging, env file values replace existing ones
    pub env_override: bool,
    pub target_file: Option<String>,
    pub raw_args: Option<Vec<String>>,
    pub background: bool,
    pub autoexec: bool,
    pub python_console: bool,
    pub python_use_system_env: bool,
    pub app_template: Option<String>,
    pub python_script_path: Option<String>,
    pub python_text_block: Option<String>,
    pub python_expr: Option<String>,
    pub python_exit_code: Option<u8>,
    pub addons: Vec<String>,
}

impl EnvironmentSpec {
    /// A base environment with default flags
    pub fn new(executable_path: impl Into<String>, env_file_path: impl Into<String>) -> Self {
        Self {
            inherit: None,
            executable_path: executable_path.into(),
            env_file_path: env_file_path.into(),
            env_inherit: true,
            env_override: true,
            target_file: None,
            raw_args: None,
            background: false,
            autoexec: false,
            python_console: false,
            python_use_system_env: false,
            app_template: None,
            python_script_path: None,
            python_text_block: None,
            python_expr: None,
            python_exit_code: None,
            addons: Vec::new(),
        }
    }

    pub fn is_derived(&self) -> bool {
        self.inherit.is_some()
    }

    /// Every field written out, defaults included
    pub fn to_full_fields(&self) -> EnvironmentFields {
        EnvironmentFields {
            inherit: self.inherit.clone(),
            executable_path: Some(self.executable_path.clone()),
            env_file_path: Some(self.env_file_path.clone()),
            env_inherit: Some(self.env_inherit),
            env_override: Some(self.env_override),
            target_file: self.target_file.clone(),
            raw_args: self.raw_args.clone(),
            background: Some(self.background),
            autoexec: Some(self.autoexec),
            python_console: Some(self.python_console),
            python_use_system_env: Some(self.python_use_system_env),
            app_template: self.app_template.clone(),
            python_script_path: self.python_script_path.clone(),
            python_text_block: self.python_text_block.clone(),
            python_expr: self.python_expr.clone(),
            python_exit_code: Some(self.python_exit_code.map_or(-1, i64::from)),
            addons: Some(self.addons.clone()),
        }
    }

    /// Only the fields that differ from `baseline`
    ///
    /// For a base environment the baseline is the default spec, which always
    /// keeps `executable_path` and `env_file_path`. For a derived environment
    /// the baseline is the resolved parent, so an override back to a default
    /// value survives a dump/load cycle.
    pub fn to_fields_diff(&self, baseline: &EnvironmentSpec) -> EnvironmentFields {
        fn keep<T: Clone + PartialEq>(value: &T, base: &T) -> Option<T> {
            (value != base).then(|| value.clone())
        }
        fn keep_opt<T: Clone + PartialEq>(value: &Option<T>, base: &Option<T>) -> Option<T> {
            if value == base {
                None
            } else {
                value.clone()
            }
        }

        let mut fields = EnvironmentFields {
            inherit: self.inherit.clone(),
            executable_path: keep(&self.executable_path, &baseline.executable_path),
            env_file_path: keep(&self.env_file_path, &baseline.env_file_path),
            env_inherit: keep(&self.env_inherit, &baseline.env_inherit),
            env_override: keep(&self.env_override, &baseline.env_override),
            target_file: keep_opt(&self.target_file, &baseline.target_file),
            raw_args: keep_opt(&self.raw_args, &baseline.raw_args),
            background: keep(&self.background, &baseline.background),
            autoexec: keep(&self.autoexec, &baseline.autoexec),
            python_console: keep(&self.python_console, &baseline.python_console),
            python_use_system_env: keep(
                &self.python_use_system_env,
                &baseline.python_use_system_env,
            ),
            app_template: keep_opt(&self.app_template, &baseline.app_template),
            python_script_path: keep_opt(&self.python_script_path, &baseline.python_script_path),
            python_text_block: keep_opt(&self.python_text_block, &baseline.python_text_block),
            python_expr: keep_opt(&self.python_expr, &baseline.python_expr),
            python_exit_code: keep(&self.python_exit_code, &baseline.python_exit_code)
                .map(|code| code.map_or(-1, i64::from)),
            addons: keep(&self.addons, &baseline.addons),
        };

        // A string cleared relative to the parent is written as "" (read back as unset)
        for (value, base, field) in [
            (&self.target_file, &baseline.target_file, &mut fields.target_file),
            (&self.app_template, &baseline.app_template, &mut fields.app_template),
            (
                &self.python_script_path,
                &baseline.python_script_path,
                &mut fields.python_script_path,
            ),
            (
                &self.python_text_block,
                &baseline.python_text_block,
                &mut fields.python_text_block,
            ),
            (&self.python_expr, &baseline.python_expr, &mut fields.python_expr),
        ] {
            if value.is_none() && base.is_some() {
                *field = Some(String::new());
            }
        }

        fields
    }

    /// Fields to dump for a base environment, defaults suppressed
    pub fn to_fields(&self) -> EnvironmentFields {
        let baseline = EnvironmentSpec::new(String::new(), String::new());
        self.to_fields_diff(&baseline)
    }
}

/// A spec failed its required-field checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Environment '{environment}' is invalid: {}", .problems.join("; "))]
pub struct ValidationError {
    pub environment: String,
    pub problems: Vec<String>,
}

impl ValidationError {
    pub fn new(environment: impl Into<String>, problems: Vec<String>) -> Self {
        Self {
            environment: environment.into(),
            problems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_fields() -> EnvironmentFields {
        EnvironmentFields {
            executable_path: Some("/bin/blender".to_string()),
            env_file_path: Some(".env".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let spec = base_fields().validate("default").unwrap();
        assert_eq!(spec, EnvironmentSpec::new("/bin/blender", ".env"));
        assert!(spec.env_inherit);
        assert!(spec.env_override);
        assert_eq!(spec.python_exit_code, None);
    }

    #[test]
    fn test_validate_missing_required_fields() {
        let err = EnvironmentFields::default().validate("broken").unwrap_err();
        assert_eq!(err.environment, "broken");
        assert_eq!(err.problems.len(), 2);
        assert!(err.to_string().contains("executable_path"));
        assert!(err.to_string().contains("env_file_path"));
    }

    #[test]
    fn test_validate_empty_string_counts_as_missing() {
        let fields = EnvironmentFields {
            executable_path: Some("  ".to_string()),
            ..base_fields()
        };
        let err = fields.validate("blank").unwrap_err();
        assert_eq!(err.problems, vec!["missing required field 'executable_path'"]);
    }

    #[test]
    fn test_validate_exit_code_sentinel_and_range() {
        let unset = EnvironmentFields {
            python_exit_code: Some(-1),
            ..base_fields()
        };
        assert_eq!(unset.validate("a").unwrap().python_exit_code, None);

        let set = EnvironmentFields {
            python_exit_code: Some(3),
            ..base_fields()
        };
        assert_eq!(set.validate("a").unwrap().python_exit_code, Some(3));

        let too_big = EnvironmentFields {
            python_exit_code: Some(256),
            ..base_fields()
        };
        assert!(too_big.validate("a").is_err());
    }

    #[test]
    fn test_overlay_child_wins() {
        let parent = EnvironmentFields {
            background: Some(true),
            app_template: Some("studio".to_string()),
            ..base_fields()
        };
        let child = EnvironmentFields {
            inherit: Some("default".to_string()),
            app_template: Some("lite".to_string()),
            ..Default::default()
        };
        let merged = parent.overlay(&child);
        assert_eq!(merged.inherit.as_deref(), Some("default"));
        assert_eq!(merged.background, Some(true));
        assert_eq!(merged.app_template.as_deref(), Some("lite"));
        assert_eq!(merged.executable_path.as_deref(), Some("/bin/blender"));
    }

    #[test]
    fn test_to_fields_suppresses_defaults() {
        let mut spec = EnvironmentSpec::new("/bin/blender", ".env");
        spec.autoexec = true;
        let fields = spec.to_fields();
        assert_eq!(fields.executable_path.as_deref(), Some("/bin/blender"));
        assert_eq!(fields.env_file_path.as_deref(), Some(".env"));
        assert_eq!(fields.autoexec, Some(true));
        assert_eq!(fields.background, None);
        assert_eq!(fields.env_inherit, None);
        assert_eq!(fields.python_exit_code, None);
        assert_eq!(fields.addons, None);
    }

    #[test]
    fn test_to_full_fields_writes_sentinel() {
        let spec = EnvironmentSpec::new("/bin/blender", ".env");
        let fields = spec.to_full_fields();
        assert_eq!(fields.python_exit_code, Some(-1));
        assert_eq!(fields.background, Some(false));
        assert_eq!(fields.addons, Some(Vec::new()));
    }

    #[test]
    fn test_diff_against_parent_keeps_reset_to_default() {
        let mut parent = EnvironmentSpec::new("/bin/blender", ".env");
        parent.background = true;
        let mut child = parent.clone();
        child.inherit = Some("default".to_string());
        child.background = false;

        let fields = child.to_fields_diff(&parent);
        assert_eq!(fields.background, Some(false));
        assert_eq!(fields.executable_path, None);
        assert_eq!(fields.inherit.as_deref(), Some("default"));
    }

    #[test]
    fn test_diff_against_parent_marks_cleared_strings() {
        let mut parent = EnvironmentSpec::new("/bin/blender", ".env");
        parent.target_file = Some("scene.blend".to_string());
        let mut child = parent.clone();
        child.inherit = Some("default".to_string());
        child.target_file = None;

        let fields = child.to_fields_diff(&parent);
        assert_eq!(fields.target_file.as_deref(), Some(""));

        let reloaded = parent.to_full_fields().overlay(&fields).validate("child").unwrap();
        assert_eq!(reloaded, child);
    }

    #[test]
    fn test_deserialize_legacy_names() {
        let yaml = r#"
blender: /opt/blender/blender
env_file: .env.dev
args: ["--factory-startup"]
python: scripts/run.py
"#;
        let fields: EnvironmentFields = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fields.executable_path.as_deref(), Some("/opt/blender/blender"));
        assert_eq!(fields.env_file_path.as_deref(), Some(".env.dev"));
        assert_eq!(fields.raw_args, Some(vec!["--factory-startup".to_string()]));
        assert_eq!(fields.python_script_path.as_deref(), Some("scripts/run.py"));
    }

    #[test]
    fn test_deserialize_unknown_field_rejected() {
        let result: Result<EnvironmentFields, _> = serde_yaml::from_str("colour: blue\n");
        assert!(result.is_err());
    }
}
