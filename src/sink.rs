//! Non-fatal events raised while a run processes aggregates.
//!
//! Nothing reported here stops a run. Each event names the aggregate it
//! belongs to by its anchor path.

use crate::cache::IdentityKey;
use crate::validate::RejectReason;
use serde::Serialize;
use std::sync::Mutex;
use tracing::warn;

/// What happened to an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The validator refused to emit a record.
    Rejected { reason: RejectReason },
    /// An evaluator produced a partial value or none at all.
    DegradedExtraction { key: String, reason: String },
    /// The metadata document could not be read or parsed.
    ExtractionFailed { path: String, message: String },
    /// The metadata document parsed, but held no article node.
    EmptyExtraction { path: String },
    /// None of the schema's source roles is present in the aggregate.
    MissingMetadataSource,
    /// An existence check failed transiently and was treated as "not found".
    LocatorUnavailable { path: String, message: String },
    /// A cached journal title was replaced by a different one.
    TitleCollision {
        key: IdentityKey,
        value: String,
        previous: String,
        current: String,
    },
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Rejected { reason } => write!(f, "rejected: {reason}"),
            DiagnosticKind::DegradedExtraction { key, reason } => {
                write!(f, "degraded value for {key}: {reason}")
            }
            DiagnosticKind::ExtractionFailed { path, message } => {
                write!(f, "extraction failed for {path}: {message}")
            }
            DiagnosticKind::EmptyExtraction { path } => {
                write!(f, "no article found in {path}")
            }
            DiagnosticKind::MissingMetadataSource => f.write_str("no metadata source present"),
            DiagnosticKind::LocatorUnavailable { path, message } => {
                write!(f, "could not check {path}: {message}")
            }
            DiagnosticKind::TitleCollision {
                key,
                value,
                previous,
                current,
            } => write!(
                f,
                "journal title for {key}={value} changed from \"{previous}\" to \"{current}\""
            ),
        }
    }
}

/// A non-fatal event tied to one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Anchor path of the aggregate concerned.
    pub anchor: String,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(anchor: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            anchor: anchor.into(),
            kind,
        }
    }

    /// Whether this diagnostic records a rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(self.kind, DiagnosticKind::Rejected { .. })
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.anchor, self.kind)
    }
}

/// Receiver for diagnostics.
///
/// Runs report from a single thread in enumeration order, so implementations
/// see a deterministic sequence.
pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Sink that logs every diagnostic as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!(anchor = %diagnostic.anchor, "{}", diagnostic.kind);
    }
}

impl<F: Fn(Diagnostic)> DiagnosticSink for F {
    fn report(&self, diagnostic: Diagnostic) {
        self(diagnostic)
    }
}

/// Collecting sink.
impl DiagnosticSink for Mutex<Vec<Diagnostic>> {
    fn report(&self, diagnostic: Diagnostic) {
        self.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(diagnostic);
    }
}
