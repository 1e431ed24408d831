//! Schema-driven extraction of raw key/values from metadata documents.
//!
//! A [`SchemaConfig`] names the document format, which aggregate roles may
//! hold the document, and two lists of [`SelectorEntry`]s: a *global* scope
//! applied once per document, and an *article* scope applied once per article
//! node. Global values fill in keys an article left empty.
//!
//! A selector that matches nothing is a normal outcome and simply leaves the
//! key absent. Only an unreadable document is an error.

pub mod evaluator;
#[cfg(feature = "ris")]
pub mod ris;
pub mod selector;
pub mod xml;

pub use evaluator::{Evaluation, Evaluator};
pub use selector::{Node, Selector};

use crate::Role;
use crate::aggregate::ArticleAggregate;
use crate::error::{ConfigError, ConfigErrorKind, ExtractError};
use crate::locator::ContentLocator;
use either::Either;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xml::Element;

/// Structure of the metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    Xml,
    Ris,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Xml => "xml",
            DocumentFormat::Ris => "ris",
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            DocumentFormat::Xml => cfg!(feature = "xml"),
            DocumentFormat::Ris => cfg!(feature = "ris"),
        }
    }
}

/// One selector and how its matches become raw values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub selector: String,
    /// Raw key to store values under. Defaults to the selector text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub evaluator: Evaluator,
    /// Keep every match instead of only the first.
    #[serde(default)]
    pub all: bool,
}

impl SelectorEntry {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            key: None,
            evaluator: Evaluator::default(),
            all: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn collect_all(mut self) -> Self {
        self.all = true;
        self
    }

    /// The key values are stored under.
    pub fn raw_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.selector)
    }
}

/// Declarative description of a metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub format: DocumentFormat,
    /// Roles that may hold the document, in order of preference.
    pub source_roles: Vec<Role>,
    /// Selector for the per-article nodes of an XML container.
    ///
    /// Without one the document element is the single article node. RIS
    /// documents always use their `TY`..`ER` records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_node: Option<String>,
    pub global: Vec<SelectorEntry>,
    pub article: Vec<SelectorEntry>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            format: DocumentFormat::Xml,
            source_roles: vec![Role::Metadata],
            article_node: None,
            global: Vec::new(),
            article: Vec::new(),
        }
    }
}

/// Raw values by key for one article, in document order per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, Vec<String>>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Append a value. Blank values are ignored.
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.0.entry(key.to_string()).or_default().push(value);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy over every key of `global` this record lacks.
    pub fn merge_missing(&mut self, global: &RawRecord) {
        for (key, values) in &global.0 {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), values.clone());
            }
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut record = RawRecord::new();
        for (key, value) in iter {
            record.push(key, value);
        }
        record
    }
}

/// A value that could only be partly extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    pub key: String,
    pub reason: String,
}

/// Everything one document yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// One record per article node, in document order.
    pub records: Vec<RawRecord>,
    pub degraded: Vec<Degradation>,
}

#[derive(Debug, Clone)]
struct CompiledEntry<S> {
    key: String,
    selector: S,
    evaluator: Evaluator,
    all: bool,
}

#[derive(Debug, Clone)]
enum Scopes {
    Xml {
        article_node: Option<Selector>,
        global: Vec<CompiledEntry<Selector>>,
        article: Vec<CompiledEntry<Selector>>,
    },
    Ris {
        global: Vec<CompiledEntry<String>>,
        article: Vec<CompiledEntry<String>>,
    },
}

/// A compiled [`SchemaConfig`].
#[derive(Debug, Clone)]
pub struct Extractor {
    format: DocumentFormat,
    source_roles: Vec<Role>,
    scopes: Scopes,
}

impl Extractor {
    /// Compile every selector of `schema`, failing on the first malformed one.
    pub fn new(schema: &SchemaConfig) -> Result<Self, ConfigError> {
        if !schema.format.is_enabled() {
            return Err(ConfigError::new(
                "schema.format",
                schema.format.as_str(),
                ConfigErrorKind::Format(format!(
                    "document format `{}` is not enabled in this build",
                    schema.format.as_str()
                )),
            ));
        }
        if schema.source_roles.is_empty() {
            return Err(ConfigError::new(
                "schema.source_roles",
                "",
                ConfigErrorKind::Empty("no metadata source roles"),
            ));
        }

        let scopes = match schema.format {
            DocumentFormat::Xml => Scopes::Xml {
                article_node: schema
                    .article_node
                    .as_deref()
                    .map(|s| Selector::parse(s).map_err(|e| e.at("schema.article_node")))
                    .transpose()?,
                global: compile_entries("schema.global", &schema.global, Selector::parse)?,
                article: compile_entries("schema.article", &schema.article, Selector::parse)?,
            },
            DocumentFormat::Ris => {
                if let Some(node) = &schema.article_node {
                    return Err(ConfigError::new(
                        "schema.article_node",
                        node.as_str(),
                        ConfigErrorKind::Selector(
                            "RIS documents are split on their TY/ER records".to_string(),
                        ),
                    ));
                }
                Scopes::Ris {
                    global: compile_entries("schema.global", &schema.global, selector::parse_ris_tag)?,
                    article: compile_entries(
                        "schema.article",
                        &schema.article,
                        selector::parse_ris_tag,
                    )?,
                }
            }
        };

        Ok(Self {
            format: schema.format,
            source_roles: schema.source_roles.clone(),
            scopes,
        })
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn source_roles(&self) -> &[Role] {
        &self.source_roles
    }

    /// Path of the document to read for `aggregate`: its first present source role.
    pub fn source_path<'a>(&self, aggregate: &'a ArticleAggregate) -> Option<&'a str> {
        self.source_roles.iter().find_map(|role| aggregate.get(*role))
    }

    /// Read and extract the document at `path`.
    pub fn extract_path(
        &self,
        locator: &dyn ContentLocator,
        path: &str,
    ) -> Result<Extraction, ExtractError> {
        let content = locator.read(path)?;
        self.extract(&content)
    }

    /// Extract raw records from document bytes.
    pub fn extract(&self, content: &[u8]) -> Result<Extraction, ExtractError> {
        let text = std::str::from_utf8(content)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        match &self.scopes {
            Scopes::Xml {
                article_node,
                global,
                article,
            } => extract_xml(text, article_node.as_ref(), global, article),
            Scopes::Ris { global, article } => extract_ris(text, global, article),
        }
    }
}

fn compile_entries<S>(
    scope: &str,
    entries: &[SelectorEntry],
    parse: impl Fn(&str) -> Result<S, ConfigError>,
) -> Result<Vec<CompiledEntry<S>>, ConfigError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let selector = parse(&entry.selector).map_err(|e| e.at(format!("{scope}[{index}]")))?;
            Ok(CompiledEntry {
                key: entry.raw_key().to_string(),
                selector,
                evaluator: entry.evaluator,
                all: entry.all,
            })
        })
        .collect()
}

/// Evaluate `nodes` for `entry` into `record`.
fn apply<'a, S>(
    entry: &CompiledEntry<S>,
    mut nodes: impl Iterator<Item = Node<'a>>,
    record: &mut RawRecord,
    degraded: &mut Vec<Degradation>,
) {
    let nodes: Vec<_> = if entry.all {
        nodes.collect()
    } else {
        nodes.next().into_iter().collect()
    };
    for node in nodes {
        match entry.evaluator.evaluate(Some(node)) {
            Evaluation::Value(value) => record.push(&entry.key, value),
            Evaluation::Degraded { value, reason } => {
                if let Some(value) = value {
                    record.push(&entry.key, value);
                }
                degraded.push(Degradation {
                    key: entry.key.clone(),
                    reason,
                });
            }
            Evaluation::Empty => {}
        }
    }
}

#[cfg(feature = "xml")]
fn extract_xml(
    text: &str,
    article_node: Option<&Selector>,
    global: &[CompiledEntry<Selector>],
    article: &[CompiledEntry<Selector>],
) -> Result<Extraction, ExtractError> {
    let document = xml::XmlDocument::parse(text)?;
    let root = &document.root;
    // Relative selectors start at the document element.
    let Some(top) = root.child_elements().next() else {
        return Ok(Extraction::default());
    };

    let mut extraction = Extraction::default();
    let global_record = apply_xml(global, top, root, &mut extraction.degraded);

    let articles: Vec<&Element> = match article_node {
        Some(selector) => selector
            .select(top, root)
            .into_iter()
            .filter_map(Either::left)
            .collect(),
        None => vec![top],
    };

    for node in articles {
        let mut record = apply_xml(article, node, root, &mut extraction.degraded);
        record.merge_missing(&global_record);
        extraction.records.push(record);
    }
    Ok(extraction)
}

#[cfg(not(feature = "xml"))]
fn extract_xml(
    _text: &str,
    _article_node: Option<&Selector>,
    _global: &[CompiledEntry<Selector>],
    _article: &[CompiledEntry<Selector>],
) -> Result<Extraction, ExtractError> {
    Err(ExtractError::Unsupported("xml"))
}

#[cfg(feature = "xml")]
fn apply_xml(
    entries: &[CompiledEntry<Selector>],
    context: &Element,
    document: &Element,
    degraded: &mut Vec<Degradation>,
) -> RawRecord {
    let mut record = RawRecord::new();
    for entry in entries {
        let nodes = entry.selector.select(context, document);
        apply(entry, nodes.into_iter(), &mut record, degraded);
    }
    record
}

#[cfg(feature = "ris")]
fn extract_ris(
    text: &str,
    global: &[CompiledEntry<String>],
    article: &[CompiledEntry<String>],
) -> Result<Extraction, ExtractError> {
    let document = ris::RisDocument::parse(text)?;
    let mut extraction = Extraction::default();
    extraction.degraded.extend(document.ignored_lines.iter().map(|(line, content)| Degradation {
        key: format!("line {line}"),
        reason: format!("unrecognised RIS line `{content}`"),
    }));

    let global_record = apply_ris(global, &document.header, &mut extraction.degraded);
    for entry in &document.records {
        let mut record = apply_ris(article, entry, &mut extraction.degraded);
        record.merge_missing(&global_record);
        extraction.records.push(record);
    }
    Ok(extraction)
}

#[cfg(not(feature = "ris"))]
fn extract_ris(
    _text: &str,
    _global: &[CompiledEntry<String>],
    _article: &[CompiledEntry<String>],
) -> Result<Extraction, ExtractError> {
    Err(ExtractError::Unsupported("ris"))
}

#[cfg(feature = "ris")]
fn apply_ris(
    entries: &[CompiledEntry<String>],
    source: &ris::RisRecord,
    degraded: &mut Vec<Degradation>,
) -> RawRecord {
    let mut record = RawRecord::new();
    for entry in entries {
        let values = source.values(&entry.selector).map(Either::Right);
        apply(entry, values, &mut record, degraded);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::MemoryLocator;
    use pretty_assertions::assert_eq;

    #[cfg(feature = "xml")]
    const JATS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<article>
  <front>
    <journal-meta>
      <journal-title-group><journal-title>J. Appl. Phys.</journal-title></journal-title-group>
      <issn pub-type="ppub">0021-8979</issn>
    </journal-meta>
    <article-meta>
      <article-id pub-id-type="doi">10.1063/1.4726155</article-id>
      <title-group><article-title>Growth of <italic>GaN</italic></article-title></title-group>
      <contrib-group>
        <contrib><name><surname>Smith</surname><given-names>J.</given-names></name></contrib>
        <contrib><name><surname>Doe</surname><given-names>A.</given-names></name></contrib>
      </contrib-group>
      <pub-date><day>5</day><year>2012</year></pub-date>
      <volume>111</volume>
    </article-meta>
  </front>
</article>"#;

    #[cfg(feature = "xml")]
    fn jats_schema() -> SchemaConfig {
        SchemaConfig {
            article: vec![
                SelectorEntry::new("front/journal-meta/journal-title-group/journal-title")
                    .with_key("journal-title"),
                SelectorEntry::new("front/journal-meta/issn[@pub-type='ppub']").with_key("issn"),
                SelectorEntry::new("front/journal-meta/issn[@pub-type='epub']").with_key("eissn"),
                SelectorEntry::new("//article-id[@pub-id-type='doi']")
                    .with_key("doi")
                    .with_evaluator(Evaluator::Doi),
                SelectorEntry::new("//article-title")
                    .with_key("title")
                    .with_evaluator(Evaluator::TitleMarkup),
                SelectorEntry::new("//contrib/name")
                    .with_key("author")
                    .with_evaluator(Evaluator::AuthorName)
                    .collect_all(),
                SelectorEntry::new("//pub-date")
                    .with_key("date")
                    .with_evaluator(Evaluator::Date),
                SelectorEntry::new("front/article-meta/volume"),
            ],
            ..SchemaConfig::default()
        }
    }

    #[cfg(feature = "xml")]
    #[test]
    fn test_extract_jats_article() {
        let extractor = Extractor::new(&jats_schema()).unwrap();
        let extraction = extractor.extract(JATS.as_bytes()).unwrap();

        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record.get("journal-title"), Some("J. Appl. Phys."));
        assert_eq!(record.get("issn"), Some("0021-8979"));
        assert!(!record.contains("eissn"));
        assert_eq!(record.get("doi"), Some("10.1063/1.4726155"));
        assert_eq!(record.get("title"), Some("Growth of GaN"));
        assert_eq!(record.get_all("author"), &["Smith, J.", "Doe, A."]);
        assert_eq!(record.get("date"), Some("2012"));
        assert_eq!(record.get("front/article-meta/volume"), Some("111"));

        assert_eq!(
            extraction.degraded,
            vec![Degradation {
                key: "date".to_string(),
                reason: "incomplete date".to_string(),
            }]
        );
    }

    #[cfg(feature = "xml")]
    #[test]
    fn test_article_nodes_share_global_values() {
        let xml = r#"<issue>
  <journal-title>Physics of Fluids</journal-title>
  <issn>1070-6631</issn>
  <articles>
    <record><title>First</title></record>
    <record><title>Second</title><issn>9999-9999</issn></record>
  </articles>
</issue>"#;
        let schema = SchemaConfig {
            article_node: Some("articles/record".to_string()),
            global: vec![
                SelectorEntry::new("journal-title"),
                SelectorEntry::new("issn"),
            ],
            article: vec![SelectorEntry::new("title"), SelectorEntry::new("issn")],
            ..SchemaConfig::default()
        };
        let extraction = Extractor::new(&schema).unwrap().extract(xml.as_bytes()).unwrap();

        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.records[0].get("title"), Some("First"));
        assert_eq!(extraction.records[0].get("journal-title"), Some("Physics of Fluids"));
        assert_eq!(extraction.records[0].get("issn"), Some("1070-6631"));
        assert_eq!(extraction.records[1].get("issn"), Some("9999-9999"));
    }

    #[cfg(feature = "xml")]
    #[test]
    fn test_no_article_node_yields_no_records() {
        let schema = SchemaConfig {
            article_node: Some("//journal_article".to_string()),
            article: vec![SelectorEntry::new("titles/title")],
            ..SchemaConfig::default()
        };
        let extraction = Extractor::new(&schema)
            .unwrap()
            .extract(b"<doi_batch><head/></doi_batch>")
            .unwrap();
        assert!(extraction.records.is_empty());
    }

    #[cfg(feature = "xml")]
    #[test]
    fn test_malformed_document_fails() {
        let extractor = Extractor::new(&jats_schema()).unwrap();
        assert!(matches!(
            extractor.extract(b"<article><front></article>"),
            Err(ExtractError::Xml { .. })
        ));
        assert!(matches!(
            extractor.extract(&[0x3c, 0x61, 0x3e, 0xff, 0xfe]),
            Err(ExtractError::Encoding(_))
        ));
    }

    #[test]
    fn test_bad_selector_reports_location() {
        let schema = SchemaConfig {
            article: vec![
                SelectorEntry::new("front/volume"),
                SelectorEntry::new("front/issn[@pub-type"),
            ],
            ..SchemaConfig::default()
        };
        let error = Extractor::new(&schema).unwrap_err();
        assert_eq!(error.location, "schema.article[1]");
        assert!(matches!(error.kind, ConfigErrorKind::Selector(_)));
    }

    #[cfg(feature = "ris")]
    #[test]
    fn test_extract_ris_records() {
        let schema = SchemaConfig {
            format: DocumentFormat::Ris,
            source_roles: vec![Role::CitationRis],
            global: vec![SelectorEntry::new("PB")],
            article: vec![
                SelectorEntry::new("T1"),
                SelectorEntry::new("AU")
                    .with_evaluator(Evaluator::AuthorName)
                    .collect_all(),
                SelectorEntry::new("PY").with_evaluator(Evaluator::Date),
                SelectorEntry::new("DO").with_evaluator(Evaluator::Doi),
            ],
            ..SchemaConfig::default()
        };
        let ris = "PB  - AIP\nTY  - JOUR\nT1  - Title\nAU  - Smith, John\nAU  - Jane Doe\n\
                   PY  - 2012/06/05/\nDO  - not-a-doi\nER  -\n";

        let extraction = Extractor::new(&schema).unwrap().extract(ris.as_bytes()).unwrap();
        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        assert_eq!(record.get("T1"), Some("Title"));
        assert_eq!(record.get_all("AU"), &["Smith, John", "Doe, Jane"]);
        assert_eq!(record.get("PY"), Some("2012-06-05"));
        assert_eq!(record.get("PB"), Some("AIP"));
        assert!(!record.contains("DO"));
        assert_eq!(extraction.degraded.len(), 1);
        assert_eq!(extraction.degraded[0].key, "DO");
    }

    #[cfg(feature = "ris")]
    #[test]
    fn test_extract_ris_reports_ignored_lines() {
        let schema = SchemaConfig {
            format: DocumentFormat::Ris,
            source_roles: vec![Role::CitationRis],
            article: vec![SelectorEntry::new("T1")],
            ..SchemaConfig::default()
        };
        let ris = "TY  - JOUR\nT1  - Title\n!! garbage\nER  -\n";

        let extraction = Extractor::new(&schema).unwrap().extract(ris.as_bytes()).unwrap();
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].get("T1"), Some("Title"));
        assert_eq!(
            extraction.degraded,
            vec![Degradation {
                key: "line 3".to_string(),
                reason: "unrecognised RIS line `!! garbage`".to_string(),
            }]
        );
    }

    #[cfg(feature = "ris")]
    #[test]
    fn test_ris_schema_validation() {
        let schema = SchemaConfig {
            format: DocumentFormat::Ris,
            article: vec![SelectorEntry::new("title")],
            ..SchemaConfig::default()
        };
        let error = Extractor::new(&schema).unwrap_err();
        assert_eq!(error.location, "schema.article[0]");

        let schema = SchemaConfig {
            format: DocumentFormat::Ris,
            article_node: Some("//record".to_string()),
            ..SchemaConfig::default()
        };
        assert!(Extractor::new(&schema).is_err());
    }

    #[test]
    fn test_empty_source_roles_rejected() {
        let schema = SchemaConfig {
            source_roles: vec![],
            ..SchemaConfig::default()
        };
        assert!(matches!(
            Extractor::new(&schema).unwrap_err().kind,
            ConfigErrorKind::Empty(_)
        ));
    }

    #[cfg(feature = "ris")]
    #[test]
    fn test_extract_path_reads_through_locator() {
        let schema = SchemaConfig {
            format: DocumentFormat::Ris,
            article: vec![SelectorEntry::new("T1")],
            ..SchemaConfig::default()
        };
        let extractor = Extractor::new(&schema).unwrap();
        let mut archive = MemoryLocator::new();
        archive.insert("a.ris", "TY  - JOUR\nT1  - Found\nER  -\n");

        let extraction = extractor.extract_path(&archive, "a.ris").unwrap();
        assert_eq!(extraction.records[0].get("T1"), Some("Found"));
        assert!(matches!(
            extractor.extract_path(&archive, "b.ris"),
            Err(ExtractError::Locator(_))
        ));
    }

    #[test]
    fn test_raw_record_ignores_blank_values() {
        let mut record: RawRecord = [("a", "1"), ("a", "2"), ("b", " ")].into_iter().collect();
        record.push("c", "3");
        assert_eq!(record.get_all("a"), &["1", "2"]);
        assert!(!record.contains("b"));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
