use crate::encoding::TextEncoding;
use crate::transform::{LinePredicate, TextPattern, Transformation};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchManifest {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub targets: Vec<TargetDefinition>,
}

impl PatchManifest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.targets.is_empty() {
            issues.push(ValidationIssue::EmptyTargetList);
        }

        for target in &self.targets {
            if target.path.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    target: None,
                    field: "path",
                });
                continue;
            }
            let id = Some(target.path.clone());

            if target.transformations.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    target: id.clone(),
                    field: "transformations",
                });
            }

            for def in &target.transformations {
                match def {
                    TransformationDef::ReplaceLine {
                        contains,
                        equals,
                        starts_with,
                        ..
                    } => {
                        let predicates = [contains, equals, starts_with]
                            .iter()
                            .filter(|p| p.is_some())
                            .count();
                        if predicates > 1 {
                            issues.push(ValidationIssue::InvalidCombo {
                                target: id.clone(),
                                message: "replace-line accepts only one of contains, equals, starts_with"
                                    .to_string(),
                            });
                        }
                        if contains.as_deref() == Some("") || starts_with.as_deref() == Some("") {
                            issues.push(ValidationIssue::InvalidCombo {
                                target: id.clone(),
                                message: "empty line predicate matches every line; omit it instead"
                                    .to_string(),
                            });
                        }
                    }
                    TransformationDef::Substitute { from, .. } => {
                        if from.is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                target: id.clone(),
                                field: "from",
                            });
                        }
                    }
                    TransformationDef::Pattern { pattern, .. } => {
                        if pattern.as_str().is_empty() {
                            issues.push(ValidationIssue::MissingField {
                                target: id.clone(),
                                field: "pattern",
                            });
                        }
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Legal but suspicious definitions, reported without rejecting the manifest.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for target in &self.targets {
            for def in &target.transformations {
                match def {
                    TransformationDef::Substitute { from, to, .. }
                        if !from.is_empty() && to.contains(from.as_str()) =>
                    {
                        warnings.push(format!(
                            "{}: substitution {from:?} -> {to:?} is not idempotent (replacement contains source)",
                            target.path
                        ));
                    }
                    TransformationDef::Pattern { pattern, to, .. }
                        if pattern.regex().find_iter(to).any(|m| !m.is_empty()) =>
                    {
                        warnings.push(format!(
                            "{}: pattern {pattern} -> {to:?} is not idempotent (replacement matches pattern)",
                            target.path
                        ));
                    }
                    _ => {}
                }
            }
        }
        warnings
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Default encoding for targets that do not declare one
    #[serde(default)]
    pub encoding: TextEncoding,
    /// Resolve target paths against the root directory instead of the CWD
    #[serde(default)]
    pub root_relative: bool,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetDefinition {
    pub path: String,
    #[serde(default)]
    pub encoding: Option<TextEncoding>,
    #[serde(default)]
    pub transformations: Vec<TransformationDef>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransformationDef {
    ReplaceLine {
        /// 0-based line index
        index: usize,
        #[serde(default)]
        contains: Option<String>,
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        starts_with: Option<String>,
        replacement: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        keep_terminator: bool,
    },
    Substitute {
        from: String,
        to: String,
        #[serde(default)]
        lowercase_variant: bool,
    },
    /// Regex-located literal replacement, for damage whose line number drifts
    Pattern {
        pattern: TextPattern,
        to: String,
        #[serde(default)]
        label: Option<String>,
    },
}

impl TransformationDef {
    /// Lower into engine transformations. A substitution with
    /// `lowercase_variant` expands into two passes.
    pub fn to_transformations(&self) -> Vec<Transformation> {
        match self {
            TransformationDef::ReplaceLine {
                index,
                contains,
                equals,
                starts_with,
                replacement,
                label,
                keep_terminator,
            } => {
                let predicate = match (contains, equals, starts_with) {
                    (Some(s), _, _) => LinePredicate::Contains(s.clone()),
                    (_, Some(s), _) => LinePredicate::Equals(s.clone()),
                    (_, _, Some(s)) => LinePredicate::StartsWith(s.clone()),
                    _ => LinePredicate::Any,
                };
                vec![Transformation::ReplaceLine {
                    index: *index,
                    predicate,
                    replacement: replacement.clone(),
                    label: label.clone(),
                    keep_terminator: *keep_terminator,
                }]
            }
            TransformationDef::Substitute {
                from,
                to,
                lowercase_variant: true,
            } => Transformation::substitute_with_lowercase(from, to),
            TransformationDef::Substitute { from, to, .. } => {
                vec![Transformation::substitute(from.clone(), to.clone())]
            }
            TransformationDef::Pattern { pattern, to, label } => {
                vec![Transformation::Pattern {
                    pattern: pattern.clone(),
                    to: to.clone(),
                    label: label.clone(),
                }]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyTargetList,
    MissingField {
        target: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        target: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyTargetList => write!(f, "patch manifest contains no targets"),
            ValidationIssue::MissingField { target, field } => match target {
                Some(path) => write!(f, "target '{path}' missing required field '{field}'"),
                None => write!(f, "target missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { target, message } => match target {
                Some(path) => write!(f, "target '{path}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
