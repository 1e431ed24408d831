//! Pretty configuration error reporting using [ariadne].
//!
//! Only compiled when the `diagnostics` Cargo feature is enabled:
//!
//! ```toml
//! [dependencies]
//! artagg = { version = "0.1", features = ["diagnostics"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use artagg::engine_with_diagnostics;
//!
//! let source = std::fs::read_to_string("aip.toml")?;
//! match engine_with_diagnostics(&source, "aip.toml") {
//!     Ok(engine) => println!("{} pattern rules", engine.matcher().len()),
//!     Err(report) => eprintln!("{report}"),
//! }
//! ```

use crate::engine::Engine;
use crate::error::ConfigError;
use ariadne::{Color, Label, Report, ReportKind, Source};
use std::ops::Range;

impl ConfigError {
    /// Render this error as an Ariadne report against the configuration text.
    ///
    /// TOML syntax errors carry spans into `source` itself. Errors raised
    /// while compiling an expression carry spans into that expression, which
    /// is located in `source` when it appears there verbatim; otherwise the
    /// expression alone is shown.
    ///
    /// The returned `String` contains ANSI colour codes when the terminal
    /// supports them.
    pub fn to_diagnostic(&self, filename: &str, source: &str) -> String {
        let (text, range) = self.primary_byte_range(source);

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, (filename, range.clone()))
            .with_message(&self.location)
            .with_label(
                Label::new((filename, range))
                    .with_message(format!("{}", self.kind))
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(text)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }

    /// The text to display and the byte range inside it to underline.
    fn primary_byte_range<'a>(&'a self, source: &'a str) -> (&'a str, Range<usize>) {
        let span = self.span.as_ref().map(|s| s.start..s.end);

        if self.expression.is_empty() {
            let range = span.unwrap_or(0..0);
            let end = range.end.min(source.len());
            return (source, range.start.min(end)..end);
        }

        let local = span.unwrap_or(0..self.expression.len());
        match source.find(self.expression.as_str()) {
            Some(offset) => (source, offset + local.start..offset + local.end),
            None => (self.expression.as_str(), local),
        }
    }
}

/// Parse and compile a TOML configuration, rendering any failure as a pretty
/// Ariadne report instead of a raw [`ConfigError`].
pub fn engine_with_diagnostics(source: &str, filename: &str) -> Result<Engine, String> {
    Engine::from_toml_str(source).map_err(|e| e.to_diagnostic(filename, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigErrorKind, SourceSpan};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_span_located_in_source() {
        let source = "[[aspects]]\ntemplate = \"{root}{volume\"\n";
        let error = ConfigError::new(
            "aspects[0]",
            "{root}{volume",
            ConfigErrorKind::Template("unclosed placeholder".into()),
        )
        .with_span(SourceSpan::new(6, 13));

        let (text, range) = error.primary_byte_range(source);
        assert_eq!(text, source);
        assert_eq!(&source[range], "{volume");

        let report = error.to_diagnostic("aip.toml", source);
        assert!(report.contains("aip.toml"));
        assert!(report.contains("unclosed placeholder"));
    }

    #[test]
    fn test_expression_not_in_source() {
        let error = ConfigError::new(
            "schema.article[0]",
            "front/issn[@a='x]",
            ConfigErrorKind::Selector("unterminated string".into()),
        );
        let (text, range) = error.primary_byte_range("");
        assert_eq!(text, "front/issn[@a='x]");
        assert_eq!(range, 0..17);
    }

    #[test]
    fn test_toml_error_rendered_without_panic() {
        let source = "[[patterns]]\nanchor_role = \"thumbnail\"\n";
        let report = engine_with_diagnostics(source, "bad.toml").unwrap_err();
        assert!(report.contains("bad.toml"));
    }

    #[test]
    fn test_no_position() {
        let error = ConfigError::new(
            "patterns",
            "",
            ConfigErrorKind::Empty("at least one pattern rule is required"),
        );
        let report = error.to_diagnostic("empty.toml", "");
        assert!(report.contains("empty.toml"));
    }
}
