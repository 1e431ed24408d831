//! Named evaluators turning a selected node into a raw value.
//!
//! Every evaluator accepts an absent node and malformed content. The worst
//! outcome is [`Evaluation::Degraded`] without a value; nothing here fails.

use super::selector::Node;
use super::xml::Element;
use crate::error::{ConfigError, ConfigErrorKind};
use crate::regex::Regex;
use crate::utils::{
    assemble_date, collapse_whitespace, format_doi, join_author_name, normalize_date,
    reorder_author_name,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

static MARKUP_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

const FAMILY_NAMES: &[&str] = &["surname", "family", "family-name", "last-name", "lastname"];
const GIVEN_NAMES: &[&str] = &["given-names", "given", "given-name", "given_name", "first-name", "firstname"];
/// Subtrees dropped from titles: cross-references and footnote markers.
const TITLE_NOISE: &[&str] = &["xref", "fn", "target"];

/// How a selected node becomes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluator {
    /// Whitespace-collapsed text of the node.
    #[default]
    PlainText,
    /// `Family, Given` from name parts, or a reordered free-text name.
    AuthorName,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD` from date parts or free text.
    Date,
    /// Text with inline markup and footnote references removed.
    TitleMarkup,
    /// A bare, lowercase DOI.
    Doi,
}

/// Outcome of evaluating one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Value(String),
    /// Malformed input. `value` holds whatever part could be salvaged.
    Degraded {
        value: Option<String>,
        reason: String,
    },
    /// Nothing there.
    Empty,
}

impl Evaluation {
    fn from_text(text: String) -> Self {
        if text.is_empty() {
            Evaluation::Empty
        } else {
            Evaluation::Value(text)
        }
    }

    fn degraded(value: Option<String>, reason: impl Into<String>) -> Self {
        Evaluation::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Evaluation::Value(v) => Some(v),
            Evaluation::Degraded { value, .. } => value.as_deref(),
            Evaluation::Empty => None,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Evaluation::Value(v) => Some(v),
            Evaluation::Degraded { value, .. } => value,
            Evaluation::Empty => None,
        }
    }
}

impl Evaluator {
    pub const ALL: [Evaluator; 5] = [
        Evaluator::PlainText,
        Evaluator::AuthorName,
        Evaluator::Date,
        Evaluator::TitleMarkup,
        Evaluator::Doi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Evaluator::PlainText => "plain_text",
            Evaluator::AuthorName => "author_name",
            Evaluator::Date => "date",
            Evaluator::TitleMarkup => "title_markup",
            Evaluator::Doi => "doi",
        }
    }

    /// Evaluate `node`, which may be absent.
    pub fn evaluate(&self, node: Option<Node<'_>>) -> Evaluation {
        let Some(node) = node else {
            return Evaluation::Empty;
        };
        match self {
            Evaluator::PlainText => Evaluation::from_text(collapse_whitespace(&node_text(node))),
            Evaluator::AuthorName => author_name(node),
            Evaluator::Date => date(node),
            Evaluator::TitleMarkup => {
                let text = node.either(
                    |e| e.text_excluding(TITLE_NOISE),
                    |s| MARKUP_REGEX.replace_all(s, "").into_owned(),
                );
                Evaluation::from_text(collapse_whitespace(&text))
            }
            Evaluator::Doi => {
                let text = collapse_whitespace(&node_text(node));
                if text.is_empty() {
                    return Evaluation::Empty;
                }
                match format_doi(&text) {
                    Some(doi) => Evaluation::Value(doi),
                    None => Evaluation::degraded(None, format!("`{text}` is not a DOI")),
                }
            }
        }
    }
}

impl std::fmt::Display for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Evaluator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Evaluator::ALL
            .into_iter()
            .find(|e| e.as_str() == s.trim())
            .ok_or_else(|| {
                ConfigError::new("evaluator", s, ConfigErrorKind::Evaluator(s.trim().to_string()))
            })
    }
}

fn node_text(node: Node<'_>) -> String {
    node.either(Element::text, str::to_string)
}

fn author_name(node: Node<'_>) -> Evaluation {
    let structured = node.left().and_then(|element| {
        let family = element.find_descendant(FAMILY_NAMES);
        let given = element.find_descendant(GIVEN_NAMES);
        (family.is_some() || given.is_some()).then(|| {
            join_author_name(
                &family.map(Element::text).unwrap_or_default(),
                &given.map(Element::text).unwrap_or_default(),
            )
        })
    });
    match structured {
        Some(name) => name.map_or(Evaluation::Empty, Evaluation::Value),
        None => reorder_author_name(&node_text(node)).map_or(Evaluation::Empty, Evaluation::Value),
    }
}

fn date(node: Node<'_>) -> Evaluation {
    let text = collapse_whitespace(&node_text(node));

    let parts = node.left().map(|element| {
        let part = |name: &str| {
            element
                .find_descendant(&[name])
                .map(|e| collapse_whitespace(&e.text()))
                .filter(|t| !t.is_empty())
        };
        (part("year"), part("month"), part("day"))
    });

    match parts {
        Some((year, month, day)) if year.is_some() || month.is_some() || day.is_some() => {
            let Some(year) = year else {
                return Evaluation::degraded(None, "date without a year");
            };
            let Some(value) = assemble_date(Some(&year), month.as_deref(), day.as_deref()) else {
                return Evaluation::degraded(None, format!("unrecognised year `{year}`"));
            };
            let given = 1 + usize::from(month.is_some()) + usize::from(day.is_some());
            if value.split('-').count() < given {
                Evaluation::degraded(Some(value), "incomplete date")
            } else {
                Evaluation::Value(value)
            }
        }
        _ if text.is_empty() => Evaluation::Empty,
        _ => match normalize_date(&text) {
            Some(value) => Evaluation::Value(value),
            None => Evaluation::degraded(None, format!("unrecognised date `{text}`")),
        },
    }
}
