//! Patch applicator - runs transformations against patch targets
//!
//! Each target goes through one linear pass:
//! - Read the file once and decode it under its declared encoding
//! - Run every transformation in order against the in-memory text
//! - Encode the result and write it back atomically, once
//!
//! A failure anywhere in that pass aborts the target without writing. Across
//! a manifest, targets are independent: one failing target never stops or
//! rolls back the others.

use crate::config::schema::{Metadata, PatchManifest};
use crate::edit::{apply_edits, atomic_write, write_backup, EditError};
use crate::encoding::{EncodingError, TextEncoding};
use crate::transform::{TransformOutcome, Transformation};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A single file plus the ordered transformations to run against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
    pub path: PathBuf,
    pub encoding: TextEncoding,
    pub transformations: Vec<Transformation>,
}

impl PatchTarget {
    pub fn new(path: impl Into<PathBuf>, encoding: TextEncoding) -> Self {
        Self {
            path: path.into(),
            encoding,
            transformations: Vec::new(),
        }
    }

    pub fn with(mut self, transformation: Transformation) -> Self {
        self.transformations.push(transformation);
        self
    }
}

/// Policy knobs for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Copy the original bytes to `<file>.bak` before overwriting
    pub backup: bool,
    /// Treat an unmatched transformation as an error for its target
    pub strict: bool,
    /// Compute everything, write nothing
    pub dry_run: bool,
}

impl ApplyOptions {
    /// Turn on any policy the manifest asks for; never turns one off.
    pub fn merge_meta(self, meta: &Metadata) -> Self {
        Self {
            backup: self.backup || meta.backup,
            strict: self.strict || meta.strict,
            dry_run: self.dry_run,
        }
    }
}

/// What one transformation did within a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub label: String,
    pub transformation: Transformation,
    pub outcome: TransformOutcome,
}

/// Result record for one patch target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "TargetReport should be reported to the operator"]
pub struct TargetReport {
    pub path: PathBuf,
    /// Patched text differs from the original
    pub modified: bool,
    /// The file on disk was rewritten (false for dry runs and unchanged files)
    pub written: bool,
    pub backup: Option<PathBuf>,
    pub transforms: Vec<TransformReport>,
    pub original: String,
    pub patched: String,
}

impl TargetReport {
    /// Transformations that changed the content.
    pub fn fired(&self) -> impl Iterator<Item = &TransformReport> {
        self.transforms.iter().filter(|t| t.outcome.fired())
    }
}

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("{}: file not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("{}: access denied ({reason})", .path.display())]
    AccessDenied { path: PathBuf, reason: String },

    #[error("{}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: EncodingError,
    },

    #[error("{}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: EncodingError,
    },

    #[error("{}: {label}: {outcome}", .path.display())]
    Unmatched {
        path: PathBuf,
        label: String,
        outcome: TransformOutcome,
    },

    #[error("{}: I/O error: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{}: edit error: {source}", .path.display())]
    Edit { path: PathBuf, source: EditError },
}

impl TargetError {
    pub fn path(&self) -> &Path {
        match self {
            TargetError::NotFound { path }
            | TargetError::AccessDenied { path, .. }
            | TargetError::Decode { path, .. }
            | TargetError::Encode { path, .. }
            | TargetError::Unmatched { path, .. }
            | TargetError::Io { path, .. }
            | TargetError::Edit { path, .. } => path,
        }
    }

    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => TargetError::NotFound { path },
            io::ErrorKind::PermissionDenied => TargetError::AccessDenied {
                path,
                reason: source.to_string(),
            },
            _ => TargetError::Io { path, source },
        }
    }
}

/// Apply a target's transformations and write the result back.
///
/// The file is read once and written at most once. It is not rewritten when
/// no transformation changed it.
pub fn apply_target(
    target: &PatchTarget,
    options: ApplyOptions,
) -> Result<TargetReport, TargetError> {
    let path = target.path.as_path();
    debug!(path = %path.display(), encoding = %target.encoding, "reading target");

    let bytes = fs::read(path).map_err(|e| TargetError::from_io(path, e))?;
    let original = target
        .encoding
        .decode(&bytes)
        .map_err(|source| TargetError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let mut content = original.clone();
    let mut transforms = Vec::with_capacity(target.transformations.len());

    for transformation in &target.transformations {
        let label = transformation.label();
        let plan = transformation.plan(&content);
        debug!(%label, outcome = %plan.outcome, "planned transformation");

        content = apply_edits(&content, plan.edits).map_err(|source| TargetError::Edit {
            path: path.to_path_buf(),
            source,
        })?;

        transforms.push(TransformReport {
            label,
            transformation: transformation.clone(),
            outcome: plan.outcome,
        });
    }

    if options.strict {
        if let Some(unmatched) = first_unmatched(&transforms) {
            return Err(TargetError::Unmatched {
                path: path.to_path_buf(),
                label: unmatched.label.clone(),
                outcome: unmatched.outcome.clone(),
            });
        }
    }

    let modified = content != original;
    let mut written = false;
    let mut backup = None;

    if modified {
        let encoded = target
            .encoding
            .encode(&content)
            .map_err(|source| TargetError::Encode {
                path: path.to_path_buf(),
                source,
            })?;

        if !options.dry_run {
            // Write through symlinks to the file they point at
            let real = fs::canonicalize(path).map_err(|e| TargetError::from_io(path, e))?;
            ensure_writable(&real)?;
            if options.backup {
                let saved =
                    write_backup(&real, &bytes).map_err(|e| TargetError::from_io(path, e))?;
                debug!(backup = %saved.display(), "wrote backup");
                backup = Some(saved);
            }
            atomic_write(&real, &encoded).map_err(|e| TargetError::from_io(path, e))?;
            written = true;
            info!(path = %path.display(), bytes = encoded.len(), "patched target");
        }
    }

    Ok(TargetReport {
        path: path.to_path_buf(),
        modified,
        written,
        backup,
        transforms,
        original,
        patched: content,
    })
}

/// Evaluate a target without writing anything.
///
/// `modified` in the returned report means "would change".
pub fn check_target(
    target: &PatchTarget,
    options: ApplyOptions,
) -> Result<TargetReport, TargetError> {
    apply_target(
        target,
        ApplyOptions {
            dry_run: true,
            ..options
        },
    )
}

/// First transformation that counts as unmatched under strict mode.
///
/// A lowercase companion pass and the pass before it form a pair; the pair
/// is unmatched only when both of its passes are.
fn first_unmatched(transforms: &[TransformReport]) -> Option<&TransformReport> {
    transforms.iter().enumerate().find_map(|(i, report)| {
        if !report.outcome.is_unmatched() {
            return None;
        }
        let partner = if report.transformation.is_companion() {
            i.checked_sub(1).and_then(|prev| transforms.get(prev))
        } else {
            transforms
                .get(i + 1)
                .filter(|next| next.transformation.is_companion())
        };
        match partner {
            Some(partner) if !partner.outcome.is_unmatched() => None,
            _ => Some(report),
        }
    })
}

/// Atomic rename would replace a read-only file without complaint, so the
/// permission bit is checked explicitly.
fn ensure_writable(path: &Path) -> Result<(), TargetError> {
    let metadata = fs::metadata(path).map_err(|e| TargetError::from_io(path, e))?;
    if metadata.permissions().readonly() {
        return Err(TargetError::AccessDenied {
            path: path.to_path_buf(),
            reason: "file is read-only".to_string(),
        });
    }
    Ok(())
}

/// Lower a manifest into concrete patch targets.
///
/// With `root_relative`, relative target paths are joined onto `root`;
/// otherwise they are used as written.
pub fn resolve_targets(manifest: &PatchManifest, root: &Path) -> Vec<PatchTarget> {
    manifest
        .targets
        .iter()
        .map(|def| {
            let path = if manifest.meta.root_relative {
                root.join(&def.path)
            } else {
                PathBuf::from(&def.path)
            };
            PatchTarget {
                path,
                encoding: def.encoding.unwrap_or(manifest.meta.encoding),
                transformations: def
                    .transformations
                    .iter()
                    .flat_map(|t| t.to_transformations())
                    .collect(),
            }
        })
        .collect()
}

/// Apply every target of a manifest, in order, tolerating per-target failures.
pub fn apply_manifest(
    manifest: &PatchManifest,
    root: &Path,
    options: ApplyOptions,
) -> Vec<(PathBuf, Result<TargetReport, TargetError>)> {
    let options = options.merge_meta(&manifest.meta);
    resolve_targets(manifest, root)
        .into_iter()
        .map(|target| {
            let result = apply_target(&target, options);
            if let Err(ref e) = result {
                warn!(error = %e, "target failed");
            }
            (target.path, result)
        })
        .collect()
}

/// Check status of a manifest without mutating any file.
pub fn check_manifest(
    manifest: &PatchManifest,
    root: &Path,
    options: ApplyOptions,
) -> Vec<(PathBuf, Result<TargetReport, TargetError>)> {
    apply_manifest(
        manifest,
        root,
        ApplyOptions {
            dry_run: true,
            ..options
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::LinePredicate;

    fn write_temp(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let target = PatchTarget::new("/nonexistent/index.js", TextEncoding::Utf8)
            .with(Transformation::substitute("a", "b"));
        let err = apply_target(&target, ApplyOptions::default()).unwrap_err();
        assert!(matches!(err, TargetError::NotFound { .. }));
        assert_eq!(err.path(), Path::new("/nonexistent/index.js"));
    }

    #[test]
    fn test_unchanged_file_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"nothing to do\n");
        let target =
            PatchTarget::new(&path, TextEncoding::Utf8).with(Transformation::substitute("x", "y"));

        let report = apply_target(&target, ApplyOptions::default()).unwrap();

        assert!(!report.modified);
        assert!(!report.written);
        assert_eq!(report.transforms[0].outcome, TransformOutcome::NoMatch);
    }

    #[test]
    fn test_read_only_target_is_access_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"Aasim\n");
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let target = PatchTarget::new(&path, TextEncoding::Utf8)
            .with(Transformation::substitute("Aasim", "OBSOLIO"));
        let err = apply_target(&target, ApplyOptions::default()).unwrap_err();

        assert!(matches!(err, TargetError::AccessDenied { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"Aasim\n");
    }

    #[test]
    fn test_encode_error_aborts_without_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "index.js", b"title: 'x',\n");
        let target = PatchTarget::new(&path, TextEncoding::Latin1).with(
            Transformation::replace_line(0, LinePredicate::Contains("title".into()), "title: 'جرّب',\n"),
        );

        let err = apply_target(&target, ApplyOptions::default()).unwrap_err();

        assert!(matches!(err, TargetError::Encode { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"title: 'x',\n");
    }

    #[test]
    fn test_strict_mode_rejects_unmatched_without_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"Aasim\n");
        let target = PatchTarget::new(&path, TextEncoding::Utf8)
            .with(Transformation::substitute("Aasim", "OBSOLIO"))
            .with(Transformation::replace_line(9, LinePredicate::Any, "x\n"));

        let err = apply_target(
            &target,
            ApplyOptions {
                strict: true,
                ..Default::default()
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            TargetError::Unmatched {
                outcome: TransformOutcome::LineOutOfRange { index: 9, line_count: 1 },
                ..
            }
        ));
        assert_eq!(fs::read(&path).unwrap(), b"Aasim\n");
    }

    #[test]
    fn test_strict_mode_accepts_case_pair_with_one_side_matching() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"By Aasim\n");
        let mut target = PatchTarget::new(&path, TextEncoding::Utf8);
        target.transformations = Transformation::substitute_with_lowercase("Aasim", "OBSOLIO");
        let strict = ApplyOptions {
            strict: true,
            ..Default::default()
        };

        let report = apply_target(&target, strict).unwrap();
        assert!(report.written);
        assert_eq!(report.transforms[1].outcome, TransformOutcome::NoMatch);
        assert_eq!(fs::read(&path).unwrap(), b"By OBSOLIO\n");

        let lower_only = write_temp(dir.path(), "b.md", b"see aasim.dev\n");
        target.path = lower_only.clone();
        apply_target(&target, strict).unwrap();
        assert_eq!(fs::read(&lower_only).unwrap(), b"see obsolio.dev\n");

        let neither = write_temp(dir.path(), "c.md", b"nothing\n");
        target.path = neither.clone();
        let err = apply_target(&target, strict).unwrap_err();
        assert!(matches!(
            err,
            TargetError::Unmatched {
                outcome: TransformOutcome::NoMatch,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_target_patches_the_linked_file() {
        let dir = tempfile::tempdir().unwrap();
        let real = write_temp(dir.path(), "real.md", b"Aasim\n");
        let link = dir.path().join("link.md");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let target = PatchTarget::new(&link, TextEncoding::Utf8)
            .with(Transformation::substitute("Aasim", "OBSOLIO"));
        let report = apply_target(
            &target,
            ApplyOptions {
                backup: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(report.written);
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&real).unwrap(), b"OBSOLIO\n");
        assert_eq!(fs::read(&link).unwrap(), b"OBSOLIO\n");
        assert_eq!(fs::read(dir.path().join("real.md.bak")).unwrap(), b"Aasim\n");
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"Aasim\n");
        let target = PatchTarget::new(&path, TextEncoding::Utf8)
            .with(Transformation::substitute("Aasim", "OBSOLIO"));

        let report = check_target(&target, ApplyOptions::default()).unwrap();

        assert!(report.modified);
        assert!(!report.written);
        assert_eq!(report.patched, "OBSOLIO\n");
        assert_eq!(fs::read(&path).unwrap(), b"Aasim\n");
    }

    #[test]
    fn test_backup_holds_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"Aasim\n");
        let target = PatchTarget::new(&path, TextEncoding::Utf8)
            .with(Transformation::substitute("Aasim", "OBSOLIO"));

        let report = apply_target(
            &target,
            ApplyOptions {
                backup: true,
                ..Default::default()
            },
        )
        .unwrap();

        let backup = report.backup.clone().unwrap();
        assert_eq!(fs::read(backup).unwrap(), b"Aasim\n");
        assert_eq!(fs::read(&path).unwrap(), b"OBSOLIO\n");
    }

    #[test]
    fn test_transformations_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(dir.path(), "a.md", b"abc\n");
        let target = PatchTarget::new(&path, TextEncoding::Utf8)
            .with(Transformation::substitute("a", "b"))
            .with(Transformation::substitute("bb", "X"));

        let report = apply_target(&target, ApplyOptions::default()).unwrap();

        assert_eq!(report.patched, "Xc\n");
        assert_eq!(report.fired().count(), 2);
    }
}
