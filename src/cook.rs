//! Cooking raw key/values into canonical bibliographic fields.
//!
//! A [`CookMap`] is an ordered dictionary from raw keys to one or more
//! [`Field`]s. Rules are applied in order, so when several raw keys feed the
//! same single-valued field the earliest rule with a value wins. Multi-valued
//! fields keep every value in extraction order.

use crate::error::{ConfigError, ConfigErrorKind};
use crate::extract::RawRecord;
use crate::utils::{collapse_whitespace, format_doi, normalize_date, normalize_issn, reorder_author_name};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// A canonical metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ArticleTitle,
    Author,
    Issn,
    Eissn,
    JournalTitle,
    Volume,
    Issue,
    Date,
    Doi,
    ProprietaryId,
    AccessUrl,
    Keywords,
    StartPage,
    EndPage,
    Publisher,
    Language,
    Abstract,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::ArticleTitle,
        Field::Author,
        Field::Issn,
        Field::Eissn,
        Field::JournalTitle,
        Field::Volume,
        Field::Issue,
        Field::Date,
        Field::Doi,
        Field::ProprietaryId,
        Field::AccessUrl,
        Field::Keywords,
        Field::StartPage,
        Field::EndPage,
        Field::Publisher,
        Field::Language,
        Field::Abstract,
    ];

    /// The conventional display name, e.g. `ISSN` or `AccessURL`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ArticleTitle => "ArticleTitle",
            Field::Author => "Author",
            Field::Issn => "ISSN",
            Field::Eissn => "EISSN",
            Field::JournalTitle => "JournalTitle",
            Field::Volume => "Volume",
            Field::Issue => "Issue",
            Field::Date => "Date",
            Field::Doi => "DOI",
            Field::ProprietaryId => "ProprietaryID",
            Field::AccessUrl => "AccessURL",
            Field::Keywords => "Keywords",
            Field::StartPage => "StartPage",
            Field::EndPage => "EndPage",
            Field::Publisher => "Publisher",
            Field::Language => "Language",
            Field::Abstract => "Abstract",
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Field::Author | Field::Keywords)
    }

    /// Normalise a value for this field. `None` when nothing usable is left.
    ///
    /// Shaping is idempotent: shaping a shaped value returns it unchanged.
    pub fn shape(&self, value: &str) -> Option<String> {
        let shaped = match self {
            Field::Author => reorder_author_name(value)?,
            Field::Issn | Field::Eissn => normalize_issn(value),
            Field::Doi => format_doi(value).unwrap_or_else(|| collapse_whitespace(value)),
            Field::Date => normalize_date(value)?,
            _ => collapse_whitespace(value),
        };
        (!shaped.is_empty()).then_some(shaped)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ConfigError;

    /// Accepts the display name (`ISSN`) or the configuration name (`issn`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.trim().chars().filter(|c| *c != '_').collect();
        Field::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ConfigError::new("field", s, ConfigErrorKind::Field(s.to_string())))
    }
}

/// Cook the values of raw key `raw` into `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookRule {
    pub raw: String,
    pub fields: Vec<Field>,
}

impl CookRule {
    pub fn new(raw: impl Into<String>, fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            raw: raw.into(),
            fields: fields.into_iter().collect(),
        }
    }
}

/// Canonical field values of one article.
///
/// Values are never blank. Raw keys no rule consumed are kept aside in
/// [`CookedRecord::uncooked`] and are not serialised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookedRecord {
    fields: BTreeMap<Field, Vec<String>>,
    #[serde(skip)]
    uncooked: BTreeMap<String, Vec<String>>,
}

impl CookedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `field`.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.get_all(field).first().map(String::as_str)
    }

    pub fn get_all(&self, field: Field) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    /// Replace every value of `field`. Blank values clear the field.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, vec![value]);
        }
    }

    /// Append a value. Blank values are ignored.
    pub fn push(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.entry(field).or_default().push(value);
        }
    }

    pub fn remove(&mut self, field: Field) -> Option<Vec<String>> {
        self.fields.remove(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &[String])> {
        self.fields.iter().map(|(f, v)| (*f, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw values no cook rule mapped.
    pub fn uncooked(&self) -> &BTreeMap<String, Vec<String>> {
        &self.uncooked
    }
}

/// The compiled raw-key dictionary plus per-field default values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookMap {
    rules: Vec<CookRule>,
    defaults: BTreeMap<Field, String>,
}

impl CookMap {
    /// Validate `rules` and `defaults`.
    ///
    /// Every rule needs a raw key and at least one field, and a raw key may
    /// appear only once. Defaults must be non-blank.
    pub fn new(rules: Vec<CookRule>, defaults: BTreeMap<Field, String>) -> Result<Self, ConfigError> {
        for (index, rule) in rules.iter().enumerate() {
            let location = format!("cook[{index}]");
            if rule.raw.trim().is_empty() {
                return Err(ConfigError::new(
                    location,
                    "",
                    ConfigErrorKind::CookMap("empty raw key".to_string()),
                ));
            }
            if rule.fields.is_empty() {
                return Err(ConfigError::new(
                    location,
                    rule.raw.as_str(),
                    ConfigErrorKind::CookMap("raw key maps to no field".to_string()),
                ));
            }
        }

        if let Some(raw) = rules.iter().map(|rule| rule.raw.as_str()).duplicates().next() {
            return Err(ConfigError::new(
                "cook",
                raw,
                ConfigErrorKind::CookMap("raw key is listed more than once".to_string()),
            ));
        }

        let mut shaped = BTreeMap::new();
        for (field, value) in defaults {
            let Some(value) = field.shape(&value) else {
                return Err(ConfigError::new(
                    format!("defaults.{}", serde_name(field)),
                    value,
                    ConfigErrorKind::Field(format!("unusable default for {field}")),
                ));
            };
            shaped.insert(field, value);
        }

        Ok(Self {
            rules,
            defaults: shaped,
        })
    }

    pub fn rules(&self) -> &[CookRule] {
        &self.rules
    }

    pub fn defaults(&self) -> &BTreeMap<Field, String> {
        &self.defaults
    }

    /// Cook `raw` into canonical fields.
    ///
    /// A pure function of `raw`: the same input always gives the same record.
    pub fn cook(&self, raw: &RawRecord) -> CookedRecord {
        let mut record = CookedRecord::new();

        for rule in &self.rules {
            let values = raw.get_all(&rule.raw);
            for field in &rule.fields {
                if field.is_multi_valued() {
                    for value in values.iter().filter_map(|v| field.shape(v)) {
                        record.push(*field, value);
                    }
                } else if !record.contains(*field) {
                    if let Some(value) = values.iter().find_map(|v| field.shape(v)) {
                        record.set(*field, value);
                    }
                }
            }
        }

        for (field, value) in &self.defaults {
            if !record.contains(*field) {
                record.set(*field, value.clone());
            }
        }

        let mapped: BTreeSet<&str> = self.rules.iter().map(|rule| rule.raw.as_str()).collect();
        record.uncooked = raw
            .iter()
            .filter(|(key, _)| !mapped.contains(key))
            .map(|(key, values)| (key.to_string(), values.to_vec()))
            .collect();

        record
    }
}

/// Configuration spelling of a field, as used in TOML keys.
fn serde_name(field: Field) -> String {
    let mut out = String::new();
    for (i, c) in field.as_str().chars().enumerate() {
        let previous_lower = i > 0
            && field
                .as_str()
                .chars()
                .nth(i - 1)
                .is_some_and(|p| p.is_ascii_lowercase());
        if c.is_ascii_uppercase() && previous_lower {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
