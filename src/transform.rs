//! Transformations: locating what to change in decoded content.
//!
//! A transformation never touches the file system. It plans a set of
//! [`Edit`]s against the current content and reports a [`TransformOutcome`]
//! describing whether (and how) it fired.

use crate::edit::{apply_edits, Edit, EditError};
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Condition a line must satisfy before a line-indexed replacement fires.
///
/// The predicate sees the line without its terminator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinePredicate {
    /// Fire regardless of the line's content
    #[default]
    Any,
    Contains(String),
    Equals(String),
    StartsWith(String),
}

impl LinePredicate {
    pub fn matches(&self, line: &str) -> bool {
        match self {
            LinePredicate::Any => true,
            LinePredicate::Contains(needle) => line.contains(needle.as_str()),
            LinePredicate::Equals(expected) => line == expected,
            LinePredicate::StartsWith(prefix) => line.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for LinePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinePredicate::Any => write!(f, "any content"),
            LinePredicate::Contains(s) => write!(f, "contains {s:?}"),
            LinePredicate::Equals(s) => write!(f, "equals {s:?}"),
            LinePredicate::StartsWith(s) => write!(f, "starts with {s:?}"),
        }
    }
}

/// A compiled regular expression, compared by its source text.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct TextPattern(Regex);

impl TextPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for TextPattern {}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

impl FromStr for TextPattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TextPattern {
    type Error = regex::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

/// One declarative text edit rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformation {
    /// Overwrite the line at a 0-based index when its content satisfies a predicate.
    ReplaceLine {
        index: usize,
        predicate: LinePredicate,
        /// Written verbatim, terminator included.
        replacement: String,
        label: Option<String>,
        /// Append the original line's terminator when the replacement has none.
        keep_terminator: bool,
    },
    /// Replace every non-overlapping occurrence of `from` with `to`.
    Substitute {
        from: String,
        to: String,
        /// Generated lowercase pass of a case-variant pair
        companion: bool,
    },
    /// Replace every non-empty, non-overlapping match of `pattern` with the
    /// literal `to` (no `$` group expansion).
    Pattern {
        pattern: TextPattern,
        to: String,
        label: Option<String>,
    },
}

/// What a transformation did to the content it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The transformation fired `count` times
    Replaced { count: usize },
    /// Nothing to do: the content already reflects the transformation
    AlreadyApplied,
    /// Substitution source not present
    NoMatch,
    /// Target line exists but fails the predicate
    PredicateMismatch { index: usize },
    /// Target line index is past the end of the content
    LineOutOfRange { index: usize, line_count: usize },
}

impl TransformOutcome {
    /// True when the transformation changed the content.
    pub fn fired(&self) -> bool {
        matches!(self, TransformOutcome::Replaced { .. })
    }

    /// True when the transformation found nothing to act on.
    pub fn is_unmatched(&self) -> bool {
        matches!(
            self,
            TransformOutcome::NoMatch
                | TransformOutcome::PredicateMismatch { .. }
                | TransformOutcome::LineOutOfRange { .. }
        )
    }
}

impl fmt::Display for TransformOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformOutcome::Replaced { count: 1 } => write!(f, "replaced 1 occurrence"),
            TransformOutcome::Replaced { count } => write!(f, "replaced {count} occurrences"),
            TransformOutcome::AlreadyApplied => write!(f, "already applied"),
            TransformOutcome::NoMatch => write!(f, "no match"),
            TransformOutcome::PredicateMismatch { index } => {
                write!(f, "line {} does not match predicate", index + 1)
            }
            TransformOutcome::LineOutOfRange { index, line_count } => write!(
                f,
                "line {} out of range (file has {line_count} lines)",
                index + 1
            ),
        }
    }
}

/// Edits planned by a transformation, plus the outcome they represent.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Spans to splice into the content the plan was computed against
    pub edits: Vec<Edit>,
    /// What applying `edits` amounts to
    pub outcome: TransformOutcome,
}

impl Plan {
    fn unchanged(outcome: TransformOutcome) -> Self {
        Self {
            edits: Vec::new(),
            outcome,
        }
    }
}

impl Transformation {
    pub fn substitute(from: impl Into<String>, to: impl Into<String>) -> Self {
        Transformation::Substitute {
            from: from.into(),
            to: to.into(),
            companion: false,
        }
    }

    pub fn pattern(pattern: TextPattern, to: impl Into<String>) -> Self {
        Transformation::Pattern {
            pattern,
            to: to.into(),
            label: None,
        }
    }

    pub fn replace_line(
        index: usize,
        predicate: LinePredicate,
        replacement: impl Into<String>,
    ) -> Self {
        Transformation::ReplaceLine {
            index,
            predicate,
            replacement: replacement.into(),
            label: None,
            keep_terminator: false,
        }
    }

    /// Expand `from -> to` into the as-written pass followed by an
    /// all-lowercase pass (`Aasim -> OBSOLIO`, then `aasim -> obsolio`).
    ///
    /// The second pass is dropped when lowercasing changes neither side.
    /// It is marked as a companion: under strict mode the pair counts as
    /// unmatched only when neither pass matches.
    pub fn substitute_with_lowercase(from: &str, to: &str) -> Vec<Self> {
        let mut passes = vec![Self::substitute(from, to)];
        let (lower_from, lower_to) = (from.to_lowercase(), to.to_lowercase());
        if lower_from != from || lower_to != to {
            passes.push(Transformation::Substitute {
                from: lower_from,
                to: lower_to,
                companion: true,
            });
        }
        passes
    }

    /// True for the generated lowercase pass of a case-variant pair.
    pub fn is_companion(&self) -> bool {
        matches!(self, Transformation::Substitute { companion: true, .. })
    }

    /// Short human-readable name used in progress output.
    pub fn label(&self) -> String {
        match self {
            Transformation::ReplaceLine {
                label: Some(label), ..
            } => label.clone(),
            Transformation::ReplaceLine { index, .. } => format!("line {}", index + 1),
            Transformation::Substitute { from, to, .. } => format!("{from:?} -> {to:?}"),
            Transformation::Pattern {
                label: Some(label), ..
            } => label.clone(),
            Transformation::Pattern { pattern, to, .. } => format!("{pattern} -> {to:?}"),
        }
    }

    /// Plan edits against `content` without applying them.
    pub fn plan(&self, content: &str) -> Plan {
        match self {
            Transformation::ReplaceLine {
                index,
                predicate,
                replacement,
                keep_terminator,
                ..
            } => plan_line(content, *index, predicate, replacement, *keep_terminator),
            Transformation::Substitute { from, to, .. } => plan_substitution(content, from, to),
            Transformation::Pattern { pattern, to, .. } => {
                plan_pattern(content, pattern.regex(), to)
            }
        }
    }

    /// Plan and splice in one step, returning the new content.
    pub fn apply(&self, content: &str) -> Result<(String, TransformOutcome), EditError> {
        let plan = self.plan(content);
        let patched = apply_edits(content, plan.edits)?;
        Ok((patched, plan.outcome))
    }
}

fn plan_line(
    content: &str,
    index: usize,
    predicate: &LinePredicate,
    replacement: &str,
    keep_terminator: bool,
) -> Plan {
    let Some((start, line)) = line_spans(content).nth(index) else {
        return Plan::unchanged(TransformOutcome::LineOutOfRange {
            index,
            line_count: line_spans(content).count(),
        });
    };

    let (body, terminator) = split_terminator(line);

    let new_line = if keep_terminator && split_terminator(replacement).1.is_empty() {
        format!("{replacement}{terminator}")
    } else {
        replacement.to_string()
    };

    if line == new_line {
        return Plan::unchanged(TransformOutcome::AlreadyApplied);
    }

    if !predicate.matches(body) {
        return Plan::unchanged(TransformOutcome::PredicateMismatch { index });
    }

    Plan {
        edits: vec![Edit::new(start, start + line.len(), new_line, line)],
        outcome: TransformOutcome::Replaced { count: 1 },
    }
}

fn plan_substitution(content: &str, from: &str, to: &str) -> Plan {
    if from.is_empty() {
        return Plan::unchanged(TransformOutcome::NoMatch);
    }

    let edits: Vec<Edit> = content
        .match_indices(from)
        .map(|(start, found)| Edit::new(start, start + found.len(), to, found))
        .collect();

    if edits.is_empty() {
        if !to.is_empty() && content.contains(to) {
            return Plan::unchanged(TransformOutcome::AlreadyApplied);
        }
        return Plan::unchanged(TransformOutcome::NoMatch);
    }

    Plan {
        outcome: TransformOutcome::Replaced { count: edits.len() },
        edits,
    }
}

fn plan_pattern(content: &str, regex: &Regex, to: &str) -> Plan {
    let edits: Vec<Edit> = regex
        .find_iter(content)
        .filter(|m| !m.is_empty())
        .map(|m| Edit::new(m.start(), m.end(), to, m.as_str()))
        .collect();

    if edits.is_empty() {
        if !to.is_empty() && content.contains(to) {
            return Plan::unchanged(TransformOutcome::AlreadyApplied);
        }
        return Plan::unchanged(TransformOutcome::NoMatch);
    }

    Plan {
        outcome: TransformOutcome::Replaced { count: edits.len() },
        edits,
    }
}

/// Iterate lines with their byte offsets, terminators included.
///
/// A trailing terminator does not start an extra empty line, so `"a\nb\n"`
/// has two lines.
pub fn line_spans(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

/// Split a line into its body and its terminator (`"\r\n"`, `"\n"` or `""`).
pub fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}
