pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_manifest, apply_target, check_manifest, check_target, resolve_targets, ApplyOptions,
    PatchTarget, TargetError, TargetReport, TransformReport,
};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    Metadata, PatchManifest, TargetDefinition, TransformationDef, ValidationError,
    ValidationIssue,
};
