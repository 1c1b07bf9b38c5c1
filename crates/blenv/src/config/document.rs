//! The `.blenv.yaml` document: metadata plus named environments

use crate::config::environment::{EnvironmentFields, EnvironmentSpec};
use crate::config::resolver::{self, ResolveError};
use crate::runtime::locate::ExecutableLocator;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default document file name, relative to the project root
pub const DEFAULT_CONFIG_FILENAME: &str = ".blenv.yaml";

/// The only schema version understood by this crate
pub const SCHEMA_VERSION: &str = "1";

/// Name of the environment used when none is given
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Project metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    #[serde(default)]
    pub name: String,
    /// Source directory of the Blender add-on or app template
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for ProjectMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            source: default_source(),
        }
    }
}

fn default_source() -> String {
    "src".to_string()
}

/// Packaging metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    /// Directory packaged artifacts are written to
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for PackageMeta {
    fn default() -> Self {
        Self {
            output: default_output(),
        }
    }
}

fn default_output() -> String {
    "dist".to_string()
}

/// Document as stored on disk, before inheritance is resolved
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default = "default_schema")]
    schema: String,

    #[serde(default)]
    project: ProjectMeta,

    #[serde(default)]
    package: PackageMeta,

    #[serde(default)]
    environments: IndexMap<String, EnvironmentFields>,
}

fn default_schema() -> String {
    SCHEMA_VERSION.to_string()
}

/// A loaded and resolved configuration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub project: ProjectMeta,
    pub package: PackageMeta,
    environments: IndexMap<String, EnvironmentSpec>,
}

impl ConfigDocument {
    /// Document written by `blenv create`: a single `default` environment
    /// reading `env_file_path`
    pub fn default_for(
        locator: &ExecutableLocator,
        project_name: impl Into<String>,
        env_file_path: impl Into<String>,
    ) -> Self {
        let mut environments = IndexMap::new();
        environments.insert(
            DEFAULT_ENVIRONMENT.to_string(),
            EnvironmentSpec::new(locator.locate().to_string_lossy().into_owned(), env_file_path),
        );

        Self {
            project: ProjectMeta {
                name: project_name.into(),
                ..Default::default()
            },
            package: PackageMeta::default(),
            environments,
        }
    }

    /// Load and resolve a document file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and resolve a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument = serde_yaml::from_str(content).map_err(ConfigError::Parse)?;
        if raw.schema != SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedSchema(raw.schema));
        }

        let environments = resolver::resolve(&raw.environments)?;
        log::debug!("Resolved {} environments", environments.len());

        Ok(Self {
            project: raw.project,
            package: raw.package,
            environments,
        })
    }

    /// Look up an environment by name
    pub fn get(&self, name: &str) -> Result<&EnvironmentSpec, ConfigError> {
        self.environments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))
    }

    pub fn get_default(&self) -> Result<&EnvironmentSpec, ConfigError> {
        self.get(DEFAULT_ENVIRONMENT)
    }

    /// Environment names in document order
    pub fn names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvironmentSpec)> {
        self.environments.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Add a new environment, resolving it against the existing ones
    pub fn add_environment(
        &mut self,
        name: impl Into<String>,
        fields: EnvironmentFields,
    ) -> Result<&EnvironmentSpec, ConfigError> {
        let name = name.into();
        if self.environments.contains_key(&name) {
            return Err(ConfigError::DuplicateEnvironment(name));
        }

        let spec = if fields.is_derived() {
            resolver::resolve_child(&name, &fields, &self.environments)?
        } else {
            fields.validate(&name).map_err(ResolveError::from)?
        };

        let index = self.environments.insert_full(name, spec).0;
        Ok(&self.environments[index])
    }

    /// Serialize to YAML
    ///
    /// Unless `full` is set, base environments omit fields equal to their
    /// defaults and derived environments omit fields equal to their parent's.
    pub fn dump(&self, full: bool) -> Result<String, ConfigError> {
        let environments = self
            .environments
            .iter()
            .map(|(name, spec)| (name.clone(), self.dump_fields(spec, full)))
            .collect();

        let raw = RawDocument {
            schema: SCHEMA_VERSION.to_string(),
            project: self.project.clone(),
            package: self.package.clone(),
            environments,
        };
        serde_yaml::to_string(&raw).map_err(ConfigError::Serialize)
    }

    fn dump_fields(&self, spec: &EnvironmentSpec, full: bool) -> EnvironmentFields {
        if full {
            return spec.to_full_fields();
        }

        let parent = spec
            .inherit
            .as_deref()
            .and_then(|parent| self.environments.get(parent));
        match parent {
            Some(parent) => spec.to_fields_diff(parent),
            None if spec.is_derived() => spec.to_full_fields(),
            None => spec.to_fields(),
        }
    }

    /// Write the document to `path`, refusing to replace an existing file unless `overwrite`
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        overwrite: bool,
        full: bool,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        let yaml = self.dump(full)?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!("Wrote configuration to {}", path.display());
        Ok(())
    }
}

/// Errors that can occur when loading or saving a document
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access configuration '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Unsupported schema version '{0}' (expected '1')")]
    UnsupportedSchema(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("No such environment: {0}")]
    UnknownEnvironment(String),

    #[error("Environment '{0}' already exists")]
    DuplicateEnvironment(String),

    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
}
