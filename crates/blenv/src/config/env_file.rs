//! `.env` style variable files (`KEY=VALUE` per line)

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Default env file name, relative to the project root
pub const DEFAULT_ENV_FILENAME: &str = ".env";

/// Variable Blender reads to find user scripts and addons
pub const USER_SCRIPTS_VAR: &str = "BLENDER_USER_SCRIPTS";

/// An ordered set of environment variables
///
/// Names are unique; insertion order is kept so that `to_text` output is
/// stable. Modifications produce a new set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVariableSet {
    vars: IndexMap<String, String>,
}

impl EnvVariableSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables written by `blenv create`: user scripts point at `<root>/src`
    pub fn defaults(project_root: impl AsRef<Path>) -> Self {
        let scripts = project_root.as_ref().join("src");
        Self::new().with(USER_SCRIPTS_VAR, scripts.to_string_lossy())
    }

    /// Return a copy with `name` set to `value` (replacing any previous value)
    pub fn with(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(name.into(), value.into());
        Self { vars }
    }

    /// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped.
    pub fn from_text(text: &str) -> Result<Self, EnvFileError> {
        let mut vars = IndexMap::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(EnvFileError::Parse {
                    line: index + 1,
                    content: raw_line.to_string(),
                });
            };

            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(EnvFileError::Parse {
                    line: index + 1,
                    content: raw_line.to_string(),
                });
            }

            vars.insert(key.to_string(), unquote(value.trim()).to_string());
        }

        Ok(Self { vars })
    }

    /// Load and parse an env file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EnvFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EnvFileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_text(&content)
    }

    /// Render as `KEY=VALUE\n` lines in insertion order
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.vars {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Write the set to `path`, refusing to replace an existing file unless `overwrite`
    pub fn write(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<(), EnvFileError> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(EnvFileError::AlreadyExists(path.to_path_buf()));
        }

        std::fs::write(path, self.to_text()).map_err(|e| EnvFileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!("Wrote {} variables to {}", self.len(), path.display());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvVariableSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Strip one pair of matching surrounding quotes
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Errors that can occur when reading or writing env files
#[derive(Debug, thiserror::Error)]
pub enum EnvFileError {
    #[error("Failed to access env file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed env file line {line}: '{content}' (expected KEY=VALUE)")]
    Parse { line: usize, content: String },

    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
}
