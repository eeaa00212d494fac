//! Text Patcher: targeted, declarative text patching
//!
//! Rewrites files in place using three kinds of rules: line-indexed replacement
//! (overwrite line N when it satisfies a predicate), global literal
//! substitution, and regex-located replacement with a literal.
//!
//! # Architecture
//!
//! Every transformation compiles down to a list of [`Edit`]s, verified
//! byte-span replacements against the decoded text. A [`PatchTarget`] bundles
//! a path, its declared [`TextEncoding`] and the ordered transformations;
//! [`apply_target`] runs them in a single read-transform-write pass.
//!
//! # Safety
//!
//! - Encodings are explicit; undecodable content is rejected, never guessed
//! - Spans are verified against their expected before-text before splicing
//! - Atomic file writes (tempfile + fsync + rename), no partial writes
//! - A failed target is never written; other targets are unaffected
//!
//! # Example
//!
//! ```no_run
//! use text_patcher::{apply_target, ApplyOptions, PatchTarget, TextEncoding, Transformation};
//!
//! let target = PatchTarget::new("docs/SETUP.md", TextEncoding::Utf8)
//!     .with(Transformation::substitute("Aasim", "OBSOLIO"))
//!     .with(Transformation::substitute("aasim", "obsolio"));
//!
//! match apply_target(&target, ApplyOptions::default()) {
//!     Ok(report) => println!("modified: {}", report.modified),
//!     Err(e) => eprintln!("patch failed: {}", e),
//! }
//! ```

pub mod config;
pub mod edit;
pub mod encoding;
pub mod transform;

// Re-exports
pub use config::{
    apply_manifest, apply_target, check_manifest, check_target, load_from_path, load_from_str,
    resolve_targets, ApplyOptions, ConfigError, PatchManifest, PatchTarget, TargetError,
    TargetReport, TransformReport,
};
pub use edit::{apply_edits, Edit, EditError, EditVerification};
pub use encoding::{EncodingError, TextEncoding};
pub use transform::{LinePredicate, TextPattern, TransformOutcome, Transformation};
