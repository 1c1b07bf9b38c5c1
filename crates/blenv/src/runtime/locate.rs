//! Locating the Blender executable

use std::path::PathBuf;

/// Well-known install locations, checked in order
pub const DEFAULT_SEARCH_PATHS: &[&str] = &[
    "/Applications/Blender.app/Contents/MacOS/Blender",
    "/usr/bin/blender",
    "/usr/local/bin/blender",
    "C:\\Program Files\\Blender Foundation\\Blender\\blender.exe",
];

/// Command used when no candidate exists (resolved through `PATH`)
pub const DEFAULT_FALLBACK: &str = "blender";

/// Ordered candidate paths for the Blender executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableLocator {
    candidates: Vec<PathBuf>,
    fallback: String,
}

impl Default for ExecutableLocator {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_PATHS.iter().map(PathBuf::from), DEFAULT_FALLBACK)
    }
}

impl ExecutableLocator {
    pub fn new(
        candidates: impl IntoIterator<Item = impl Into<PathBuf>>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            fallback: fallback.into(),
        }
    }

    /// Put an extra candidate ahead of the others
    pub fn with_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.insert(0, path.into());
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First existing candidate, or the fallback command name
    pub fn locate(&self) -> PathBuf {
        match self.candidates.iter().find(|path| path.exists()) {
            Some(path) => {
                log::debug!("Found Blender at {}", path.display());
                path.clone()
            }
            None => {
                log::debug!(
                    "No Blender install found in {} locations, using '{}'",
                    self.candidates.len(),
                    self.fallback
                );
                PathBuf::from(&self.fallback)
            }
        }
    }
}
