//! Inheritance resolution for environment definitions
//!
//! Resolution is single-level: base environments (no `inherit`) are validated
//! first, then every derived environment is overlaid on its parent. A parent
//! must be a base environment; naming another derived environment fails with
//! [`ResolveError::UndefinedParent`] just like naming a missing one.

use crate::config::environment::{EnvironmentFields, EnvironmentSpec, ValidationError};
use indexmap::IndexMap;

/// Resolve raw environment entries into validated specs
///
/// The first failure aborts resolution; no partial result is returned. The
/// output keeps the input order.
pub fn resolve(
    raw: &IndexMap<String, EnvironmentFields>,
) -> Result<IndexMap<String, EnvironmentSpec>, ResolveError> {
    let (bases, children): (Vec<_>, Vec<_>) =
        raw.iter().partition(|(_, fields)| !fields.is_derived());

    // Pass 1: base environments must stand on their own
    let mut resolved: IndexMap<String, EnvironmentSpec> = IndexMap::with_capacity(raw.len());
    for (name, fields) in bases {
        let spec = fields.validate(name)?;
        resolved.insert(name.clone(), spec);
    }

    // Pass 2: derived environments, looked up against bases only
    let mut derived = Vec::with_capacity(children.len());
    for (name, fields) in children {
        let spec = resolve_child(name, fields, &resolved)?;
        derived.push((name.clone(), spec));
    }
    resolved.extend(derived);

    Ok(raw
        .keys()
        .filter_map(|name| resolved.swap_remove(name).map(|spec| (name.clone(), spec)))
        .collect())
}

/// Resolve one derived entry against already resolved environments
///
/// Only base environments qualify as parents.
pub fn resolve_child(
    name: &str,
    fields: &EnvironmentFields,
    resolved: &IndexMap<String, EnvironmentSpec>,
) -> Result<EnvironmentSpec, ResolveError> {
    let parent_name = fields.inherit.as_deref().unwrap_or_default();
    let parent = resolved
        .get(parent_name)
        .filter(|parent| !parent.is_derived())
        .ok_or_else(|| ResolveError::UndefinedParent {
            child: name.to_string(),
            parent: parent_name.to_string(),
        })?;

    let merged = parent.to_full_fields().overlay(fields);
    let spec = merged.validate(name)?;
    log::debug!("Resolved environment '{}' from parent '{}'", name, parent_name);
    Ok(spec)
}

/// Errors that can occur while resolving environments
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Environment '{child}' inherits from undefined environment '{parent}'")]
    UndefinedParent { child: String, parent: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> IndexMap<String, EnvironmentFields> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_child_inherits_unset_fields() {
        let raw = parse(
            r#"
parent:
  executable_path: /bin/blender
  env_file_path: .env
  background: true
  app_template: studio
child:
  inherit: parent
  app_template: lite
"#,
        );
        let resolved = resolve(&raw).unwrap();
        let parent = &resolved["parent"];
        let child = &resolved["child"];

        assert_eq!(child.inherit.as_deref(), Some("parent"));
        assert_eq!(child.executable_path, parent.executable_path);
        assert_eq!(child.env_file_path, parent.env_file_path);
        assert!(child.background);
        assert_eq!(child.app_template.as_deref(), Some("lite"));

        // Exactly the overridden fields differ
        let mut expected = parent.clone();
        expected.inherit = Some("parent".to_string());
        expected.app_template = Some("lite".to_string());
        assert_eq!(child, &expected);
    }

    #[test]
    fn test_base_missing_required_fields_fails() {
        let raw = parse(
            r#"
default:
  executable_path: /bin/blender
"#,
        );
        match resolve(&raw) {
            Err(ResolveError::Validation(err)) => {
                assert_eq!(err.environment, "default");
                assert!(err.problems[0].contains("env_file_path"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_derived_exempt_from_required_fields() {
        let raw = parse(
            r#"
default:
  executable_path: /bin/blender
  env_file_path: .env
dev:
  inherit: default
  autoexec: true
"#,
        );
        let resolved = resolve(&raw).unwrap();
        assert_eq!(resolved["dev"].executable_path, "/bin/blender");
        assert!(resolved["dev"].autoexec);
    }

    #[test]
    fn test_child_cannot_blank_required_field() {
        let raw = parse(
            r#"
default:
  executable_path: /bin/blender
  env_file_path: .env
broken:
  inherit: default
  executable_path: ""
"#,
        );
        assert!(matches!(
            resolve(&raw),
            Err(ResolveError::Validation(ValidationError { ref environment, .. })) if environment == "broken"
        ));
    }

    #[test]
    fn test_undefined_parent_names_child_and_parent() {
        let raw = parse(
            r#"
default:
  executable_path: /bin/blender
  env_file_path: .env
orphan:
  inherit: missing
"#,
        );
        assert_eq!(
            resolve(&raw).unwrap_err(),
            ResolveError::UndefinedParent {
                child: "orphan".to_string(),
                parent: "missing".to_string(),
            }
        );
    }

    #[test]
    fn test_grandchild_is_not_resolved() {
        let raw = parse(
            r#"
default:
  executable_path: /bin/blender
  env_file_path: .env
child:
  inherit: default
grandchild:
  inherit: child
"#,
        );
        assert_eq!(
            resolve(&raw).unwrap_err(),
            ResolveError::UndefinedParent {
                child: "grandchild".to_string(),
                parent: "child".to_string(),
            }
        );
    }

    #[test]
    fn test_order_preserved() {
        let raw = parse(
            r#"
zeta:
  inherit: alpha
alpha:
  executable_path: /bin/blender
  env_file_path: .env
mid:
  inherit: alpha
  background: true
"#,
        );
        let resolved = resolve(&raw).unwrap();
        let names: Vec<_> = resolved.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_child_declared_before_parent() {
        let raw = parse(
            r#"
render:
  inherit: default
  background: true
default:
  executable_path: /bin/blender
  env_file_path: .env
"#,
        );
        let resolved = resolve(&raw).unwrap();
        assert!(resolved["render"].background);
    }
}
