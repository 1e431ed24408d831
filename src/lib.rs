//! Aggregation of archived publisher content into article records, and
//! normalisation of their bibliographic metadata.
//!
//! `artagg` consumes a flat, content-addressed archive through the narrow
//! [`ContentLocator`] interface and turns it into a sequence of
//! ([`CookedRecord`], [`ArticleAggregate`]) pairs:
//!
//! 1. the [`IdentityMatcher`] picks *anchor* paths out of the enumeration;
//! 2. the [`AspectResolver`] derives every sibling file (PDF, XML, citation,
//!    supplementary material, ...) from the anchor's capture groups and keeps
//!    the ones that exist;
//! 3. the [`Extractor`] pulls raw key/values out of the designated metadata
//!    document (XML or RIS) using a declarative selector map;
//! 4. the [`CookMap`] turns raw keys into canonical [`Field`]s;
//! 5. the [`TitleCache`] repairs missing journal titles from earlier records;
//! 6. the [`Validator`] gates emission on required fields and companion files.
//!
//! Everything publisher-specific (URL grammar, selectors, field dictionary) is
//! plain configuration, see [`EngineConfig`].
//!
//! # Features
//!
//! - `xml` - XML metadata documents (enabled by default)
//! - `ris` - RIS citation documents (enabled by default)
//! - `parallel` - resolve and extract aggregates on a rayon pool (enabled by default)
//! - `regex` / `lite` - regular-expression backend (`regex` by default)
//! - `diagnostics` - render configuration errors with ariadne
//!
//! # Basic Usage
//!
//! ```rust
//! use artagg::{Engine, Field, LogSink, MemoryLocator};
//!
//! let config = r#"
//! [params]
//! base_url = "http://pub.example/"
//!
//! [[patterns]]
//! root = "{base_url}"
//! pattern = '(?P<article>[^/]+)/meta\.ris'
//! anchor_role = "citation_ris"
//!
//! [[aspects]]
//! source = "citation_ris"
//! target = "full_text_pdf"
//! template = "{root}{article}/article.pdf"
//!
//! [schema]
//! format = "ris"
//! source_roles = ["citation_ris"]
//! article = [
//!     { selector = "TI" },
//!     { selector = "T2" },
//! ]
//!
//! [[cook]]
//! raw = "TI"
//! fields = ["article_title"]
//!
//! [[cook]]
//! raw = "T2"
//! fields = ["journal_title"]
//! "#;
//!
//! let engine = Engine::from_toml_str(config).unwrap();
//!
//! let mut archive = MemoryLocator::new();
//! archive.insert(
//!     "http://pub.example/a1/meta.ris",
//!     "TY  - JOUR\nTI  - On Things\nT2  - Journal of Stuff\nER  -\n",
//! );
//! archive.insert("http://pub.example/a1/article.pdf", "%PDF-1.4");
//!
//! let emitted: Vec<_> = engine.run(&archive, &LogSink).collect();
//! assert_eq!(emitted.len(), 1);
//! assert_eq!(emitted[0].record.get(Field::JournalTitle), Some("Journal of Stuff"));
//! assert_eq!(
//!     emitted[0].aggregate.full_text_path(),
//!     Some("http://pub.example/a1/article.pdf")
//! );
//! ```
//!
//! # Error Handling
//!
//! Only configuration problems are hard errors ([`ConfigError`], raised by
//! [`Engine::new`]). Everything that goes wrong for a single aggregate is
//! reported to a [`DiagnosticSink`] and the run continues.
//!
//! # Thread Safety
//!
//! A compiled [`Engine`] is immutable and can be shared between threads. Each
//! [`Run`] owns its own [`TitleCache`], so concurrent runs never leak titles
//! into each other.

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod aspect;
pub mod cache;
pub mod config;
pub mod cook;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod extract;
pub mod locator;
pub mod matcher;
pub mod sink;
pub mod template;
pub mod validate;

// Reexports
pub use aggregate::ArticleAggregate;
pub use aspect::{AspectResolver, AspectRule};
pub use cache::{Backfill, IdentityKey, TitleCache};
pub use config::{EngineConfig, Params};
pub use cook::{CookMap, CookRule, CookedRecord, Field};
#[cfg(feature = "diagnostics")]
pub use diagnostics::engine_with_diagnostics;
pub use engine::{CancelToken, Emitted, Engine, Run, RunStats};
pub use error::{ConfigError, ConfigErrorKind, ExtractError, LocatorError, SourceSpan};
pub use extract::{DocumentFormat, Evaluator, Extractor, RawRecord, SchemaConfig, SelectorEntry};
pub use locator::{ContentLocator, DirectoryLocator, MemoryLocator};
pub use matcher::{AnchorMatch, Captures, IdentityMatcher, PatternRule};
pub use sink::{Diagnostic, DiagnosticKind, DiagnosticSink, LogSink};
pub use template::Template;
pub use validate::{EmitPolicy, RejectReason, Validator};

mod regex;
mod utils;

/// The logical function of one file within an article.
///
/// One path satisfies at most one role, but an [`ArticleAggregate`] holds many roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    FullTextHtml,
    FullTextPdf,
    FullTextXml,
    Metadata,
    CitationRis,
    Supplementary,
    FiguresTables,
    LandingPage,
    Abstract,
    References,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 10] = [
        Role::FullTextHtml,
        Role::FullTextPdf,
        Role::FullTextXml,
        Role::Metadata,
        Role::CitationRis,
        Role::Supplementary,
        Role::FiguresTables,
        Role::LandingPage,
        Role::Abstract,
        Role::References,
    ];

    /// The configuration name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::FullTextHtml => "full_text_html",
            Role::FullTextPdf => "full_text_pdf",
            Role::FullTextXml => "full_text_xml",
            Role::Metadata => "metadata",
            Role::CitationRis => "citation_ris",
            Role::Supplementary => "supplementary",
            Role::FiguresTables => "figures_tables",
            Role::LandingPage => "landing_page",
            Role::Abstract => "abstract",
            Role::References => "references",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::new("role", s, ConfigErrorKind::Role(s.to_string())))
    }
}
