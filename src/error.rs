//! Error types for the aggregation engine.
//!
//! Only [`ConfigError`] ever escapes the engine as a hard failure. Locator and
//! extraction errors are caught per aggregate and turned into diagnostics.

use thiserror::Error;

/// A byte-offset span into a configuration expression.
///
/// Both `start` and `end` are byte offsets (not character indices) from the
/// beginning of the expression.  `start` is inclusive, `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl SourceSpan {
    /// Create a new `SourceSpan`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// What part of the configuration was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigErrorKind {
    #[error("invalid pattern: {0}")]
    Pattern(String),

    #[error("invalid template: {0}")]
    Template(String),

    #[error("invalid selector: {0}")]
    Selector(String),

    #[error("unknown evaluator \"{0}\"")]
    Evaluator(String),

    #[error("invalid cook map entry: {0}")]
    CookMap(String),

    #[error("unknown role \"{0}\"")]
    Role(String),

    #[error("unknown field \"{0}\"")]
    Field(String),

    #[error("unreadable configuration: {0}")]
    Format(String),

    #[error("{0}")]
    Empty(&'static str),
}

/// A configuration problem detected while compiling an engine.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{location}: {kind}{}",
    if expression.is_empty() { String::new() } else { format!(" in `{expression}`") }
)]
pub struct ConfigError {
    /// Where in the configuration the problem sits, e.g. `patterns[2]`.
    pub location: String,
    /// The offending expression, or empty when not applicable.
    pub expression: String,
    /// Byte span inside `expression`, when the problem can be pinpointed.
    pub span: Option<SourceSpan>,
    /// The specific problem.
    pub kind: ConfigErrorKind,
}

impl ConfigError {
    /// Create a ConfigError without a span.
    pub fn new(
        location: impl Into<String>,
        expression: impl Into<String>,
        kind: ConfigErrorKind,
    ) -> Self {
        Self {
            location: location.into(),
            expression: expression.into(),
            span: None,
            kind,
        }
    }

    /// Attach a byte-offset span to this error, returning `self` (builder style).
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Replace the location, keeping everything else.
    ///
    /// Compilers of individual expressions do not know where in the
    /// configuration they sit; the caller fills that in.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        let span = err.span().map(|r| SourceSpan::new(r.start, r.end));
        Self {
            location: "config".to_string(),
            expression: String::new(),
            span,
            kind: ConfigErrorKind::Format(err.message().to_string()),
        }
    }
}

/// Failure reported by a [`crate::locator::ContentLocator`].
#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("content not found: {path}")]
    NotFound { path: String },

    #[error("content locator unavailable for {path}: {message}")]
    Unavailable { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to read the structure of a metadata document.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("malformed RIS at line {line}: {message}")]
    Ris { line: usize, message: String },

    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document format `{0}` is not enabled in this build")]
    Unsupported(&'static str),

    #[error(transparent)]
    Locator(#[from] LocatorError),
}
