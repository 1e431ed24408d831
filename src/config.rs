//! Engine configuration.
//!
//! Everything publisher-specific lives here as plain data: the URL grammar of
//! anchors, how sibling files are derived, which document holds the metadata
//! and how its values map to canonical fields. An [`EngineConfig`] can be
//! loaded from TOML or assembled in code, and is compiled once by
//! [`crate::Engine::new`].

use crate::Role;
use crate::aggregate::DEFAULT_FULL_TEXT_PRECEDENCE;
use crate::aspect::AspectRule;
use crate::cook::{CookRule, Field};
use crate::error::ConfigError;
use crate::extract::SchemaConfig;
use crate::matcher::PatternRule;
use crate::validate::EmitPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Plugin parameters (`base_url`, `journal_id`, ...), bound by name in templates.
pub type Params = BTreeMap<String, String>;

/// Default number of anchors processed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Complete description of one publisher's archive layout and metadata.
///
/// # Examples
///
/// ```
/// use artagg::{EngineConfig, Field, Role, Template};
/// use artagg::matcher::PatternRule;
///
/// let mut config = EngineConfig::new();
/// config
///     .set_param("base_url", "http://pub.example/")
///     .add_pattern(PatternRule::new(
///         Template::parse("{base_url}").unwrap(),
///         r"(?P<id>\d+)\.xml",
///         Role::Metadata,
///     ))
///     .set_default(Field::Publisher, "Example Press");
/// assert_eq!(config.patterns.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parameters available to every template.
    pub params: Params,
    /// Anchor recognition rules, tried in order.
    pub patterns: Vec<PatternRule>,
    /// Sibling derivation rules, applied once each in order.
    pub aspects: Vec<AspectRule>,
    /// Roles considered for the full-text path, best first.
    pub full_text_precedence: Vec<Role>,
    /// Where the metadata lives and how to read it.
    pub schema: SchemaConfig,
    /// Raw key to canonical field dictionary.
    pub cook: Vec<CookRule>,
    /// Constant values for fields the metadata leaves unset.
    pub defaults: BTreeMap<Field, String>,
    /// Emission requirements.
    pub emit: EmitPolicy,
    /// Anchors resolved and extracted together before their records are
    /// finalised in order.
    pub batch_size: usize,
    /// Process each batch on the rayon pool.
    pub run_in_parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// An empty configuration with default precedence and policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            params: Params::new(),
            patterns: Vec::new(),
            aspects: Vec::new(),
            full_text_precedence: DEFAULT_FULL_TEXT_PRECEDENCE.to_vec(),
            schema: SchemaConfig::default(),
            cook: Vec::new(),
            defaults: BTreeMap::new(),
            emit: EmitPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            run_in_parallel: true,
        }
    }

    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Serialise back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| {
            ConfigError::new(
                "config",
                "",
                crate::error::ConfigErrorKind::Format(e.to_string()),
            )
        })
    }

    /// Sets a template parameter
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Appends an anchor recognition rule
    pub fn add_pattern(&mut self, rule: PatternRule) -> &mut Self {
        self.patterns.push(rule);
        self
    }

    /// Appends an aspect derivation rule
    pub fn add_aspect(&mut self, rule: AspectRule) -> &mut Self {
        self.aspects.push(rule);
        self
    }

    /// Sets the full-text precedence list
    pub fn set_full_text_precedence(&mut self, precedence: Vec<Role>) -> &mut Self {
        self.full_text_precedence = precedence;
        self
    }

    /// Sets the extraction schema
    pub fn set_schema(&mut self, schema: SchemaConfig) -> &mut Self {
        self.schema = schema;
        self
    }

    /// Appends a cook rule
    pub fn add_cook_rule(&mut self, rule: CookRule) -> &mut Self {
        self.cook.push(rule);
        self
    }

    /// Sets a constant default for a field
    pub fn set_default(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        self.defaults.insert(field, value.into());
        self
    }

    /// Sets the emission policy
    pub fn set_emit_policy(&mut self, policy: EmitPolicy) -> &mut Self {
        self.emit = policy;
        self
    }

    /// Sets the number of anchors per batch
    pub fn set_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets whether batches run on the rayon pool
    pub fn set_run_in_parallel(&mut self, parallel: bool) -> &mut Self {
        self.run_in_parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigErrorKind;
    use crate::extract::{DocumentFormat, Evaluator};
    use pretty_assertions::assert_eq;

    const AIP: &str = r#"
batch_size = 16

[params]
base_url = "http://pub.example/"

[[patterns]]
root = "{base_url}"
pattern = '(?P<journal>[A-Z]+)/v(?P<volume>\d+)/i(?P<issue>\d+)/(?P<article_dir>[^/]+)/Markup/VOR_[^/]+\.xml'
anchor_role = "full_text_xml"

[[aspects]]
source = "full_text_xml"
target = "full_text_pdf"
template = "{root}{journal}/v{volume}/i{issue}/{article_dir}/Page_Renditions/online.pdf"

[[aspects]]
source = "full_text_xml"
target = "metadata"
template = "{root}{journal}/v{volume}/i{issue}/{article_dir}/Markup/meta.xml"

[schema]
source_roles = ["metadata", "full_text_xml"]
article = [
    { selector = "front/journal-meta//journal-title", key = "journal-title" },
    { selector = "//contrib/name", key = "author", evaluator = "author_name", all = true },
]

[[cook]]
raw = "journal-title"
fields = ["journal_title"]

[[cook]]
raw = "author"
fields = ["author"]

[defaults]
publisher = "AIP Publishing"

[emit]
companion = "{root}{journal}/v{volume}/i{issue}/{article_dir}/Page_Renditions/online.pdf"
"#;

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(AIP).unwrap();

        assert_eq!(config.params["base_url"], "http://pub.example/");
        assert_eq!(config.patterns.len(), 1);
        assert_eq!(config.patterns[0].anchor_role, Role::FullTextXml);
        assert!(config.patterns[0].case_insensitive);
        assert_eq!(config.aspects[1].target, Role::Metadata);
        assert_eq!(config.full_text_precedence, DEFAULT_FULL_TEXT_PRECEDENCE.to_vec());
        assert_eq!(config.schema.format, DocumentFormat::Xml);
        assert_eq!(config.schema.source_roles, vec![Role::Metadata, Role::FullTextXml]);
        assert_eq!(config.schema.article[0].evaluator, Evaluator::PlainText);
        assert_eq!(config.schema.article[1].evaluator, Evaluator::AuthorName);
        assert!(config.schema.article[1].all);
        assert_eq!(config.cook[1].fields, vec![Field::Author]);
        assert_eq!(config.defaults[&Field::Publisher], "AIP Publishing");
        assert!(config.emit.require_journal_title);
        assert!(config.emit.companion.is_some());
        assert_eq!(config.batch_size, 16);
        assert!(config.run_in_parallel);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::new());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::from_toml_str(AIP).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_reports_format_error() {
        let error = EngineConfig::from_toml_str("[[patterns]]\nanchor_role = \"thumbnail\"\n").unwrap_err();
        assert!(matches!(error.kind, ConfigErrorKind::Format(_)));
        assert!(error.span.is_some());

        let error = EngineConfig::from_toml_str("[emit]\ncompanion = \"{root\"\n").unwrap_err();
        assert!(matches!(error.kind, ConfigErrorKind::Format(_)));
    }

    #[test]
    fn test_builder_methods() {
        let mut config = EngineConfig::new();
        config
            .set_param("journal_id", "jap")
            .set_batch_size(8)
            .set_run_in_parallel(false)
            .set_full_text_precedence(vec![Role::FullTextHtml])
            .add_cook_rule(CookRule::new("T2", [Field::JournalTitle]));

        assert_eq!(config.params["journal_id"], "jap");
        assert_eq!(config.batch_size, 8);
        assert!(!config.run_in_parallel);
        assert_eq!(config.full_text_precedence, vec![Role::FullTextHtml]);
        assert_eq!(config.cook.len(), 1);
    }
}
