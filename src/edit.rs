use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Suffix appended to a target's file name when a backup is requested.
pub const BACKUP_SUFFIX: &str = ".bak";

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every transformation compiles down to a list of these against the decoded
/// content of a file. Locating spans is the transformation's job; splicing
/// them in is done here, in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until it is spliced with apply_edits()"]
pub struct Edit {
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// What we expect to find in the span before replacing it
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("before-text verification failed at bytes [{byte_start}, {byte_end}): found {found:?}")]
    BeforeTextMismatch {
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("invalid byte range: [{byte_start}, {byte_end}) in content of length {content_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        content_len: usize,
    },

    #[error("byte offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    #[error("edits overlap at byte {0}")]
    Overlap(usize),
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Validate the edit against the content it will be spliced into.
    ///
    /// Returns the current text at [byte_start, byte_end) if validation succeeds.
    fn validate<'a>(&self, content: &'a str) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                content_len: content.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary(offset));
            }
        }

        let current = &content[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current) {
            return Err(EditError::BeforeTextMismatch {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current.to_string(),
            });
        }

        Ok(current)
    }
}

/// Splice a set of non-overlapping edits into `content`.
///
/// All edits are validated against the original content before any is
/// applied; then they are applied bottom-to-top so earlier offsets stay valid.
pub fn apply_edits(content: &str, mut edits: Vec<Edit>) -> Result<String, EditError> {
    if edits.is_empty() {
        return Ok(content.to_string());
    }

    edits.sort_by(|a, b| b.byte_start.cmp(&a.byte_start));

    for edit in &edits {
        edit.validate(content)?;
    }

    // Sorted descending: the earlier edit must end before the later one starts
    for window in edits.windows(2) {
        let (later, earlier) = (&window[0], &window[1]);
        if earlier.byte_end > later.byte_start {
            return Err(EditError::Overlap(later.byte_start));
        }
    }

    let mut out = content.to_string();
    for edit in &edits {
        out.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
    }

    Ok(out)
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the target is left untouched. The
/// original file's permissions are carried over to the replacement. A
/// symlink is followed so the file it points at is replaced, not the link.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let resolved = match fs::canonicalize(path) {
        Ok(real) => real,
        Err(e) if e.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };
    let path = resolved.as_path();

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        }
    };

    let permissions = fs::metadata(path).map(|m| m.permissions()).ok();

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Some(permissions) = permissions {
        temp.as_file().set_permissions(permissions)?;
    }

    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Copy the original bytes of `path` next to it as `<name>.bak`.
pub fn write_backup(path: &Path, original: &[u8]) -> io::Result<PathBuf> {
    let mut name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_os_string();
    name.push(BACKUP_SUFFIX);
    let backup = path.with_file_name(name);
    atomic_write(&backup, original)?;
    Ok(backup)
}
