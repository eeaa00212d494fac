use crate::config::schema::{PatchManifest, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory, relative to a root, scanned for `*.toml` manifests.
pub const MANIFEST_DIR: &str = "patches";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    NoManifests {
        searched: Vec<PathBuf>,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read manifest {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse manifest TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse manifest TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid manifest ({}): {}", path.display(), source),
                None => write!(f, "invalid manifest: {}", source),
            },
            ConfigError::NoManifests { searched } => {
                let dirs: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
                write!(f, "no .toml manifests found in {}", dirs.join(" or "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::NoManifests { .. } => None,
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchManifest, ConfigError> {
    let manifest: PatchManifest = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    manifest
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(manifest)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchManifest, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Find manifest files when none were named explicitly.
///
/// Looks in `<root>/patches` first, then `./patches`; the first directory
/// holding any `*.toml` wins. Results are sorted so application order is
/// stable.
pub fn discover_manifests(root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut searched = vec![root.join(MANIFEST_DIR)];
    if let Ok(cwd) = std::env::current_dir() {
        let cwd_dir = cwd.join(MANIFEST_DIR);
        if !searched.contains(&cwd_dir) {
            searched.push(cwd_dir);
        }
    }

    for dir in &searched {
        if !dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).max_depth(1) {
            let entry = entry.map_err(|e| ConfigError::Io {
                path: dir.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    Err(ConfigError::NoManifests { searched })
}
