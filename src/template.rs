//! `{name}` placeholder templates used for roots, aspect paths and companions.
//!
//! A template is parsed once when the engine is built. Rendering never fails:
//! a placeholder without a (non-empty) binding makes the whole render yield
//! `None`, and callers treat that as "this rule does not apply".

use crate::error::{ConfigError, ConfigErrorKind, SourceSpan};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(CompactString),
}

/// A parsed path template such as `{root}{article_dir}/Page_Renditions/online.pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template, rejecting unbalanced braces and empty or malformed names.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices();

        while let Some((start, c)) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    let end = start + name.len() + if closed { 2 } else { 1 };
                    if !closed {
                        return Err(template_error(source, start, end, "unclosed `{`"));
                    }
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(template_error(
                            source,
                            start,
                            end,
                            "placeholder names must be non-empty and use [A-Za-z0-9_]",
                        ));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(CompactString::from(name)));
                }
                '}' => {
                    return Err(template_error(source, start, start + 1, "unmatched `}`"));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The template text as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of all placeholders, in order of appearance.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder through `lookup`.
    ///
    /// Returns `None` when any placeholder is unbound or bound to an empty
    /// value, or when the result would be blank.
    pub fn render<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<String> {
        let out = self.substitute(|name| lookup(name).filter(|v| !v.is_empty()))?;
        (!out.trim().is_empty()).then_some(out)
    }

    /// Substitute every placeholder through `lookup`, accepting empty values.
    ///
    /// Used for parameter-only templates such as pattern roots, where an empty
    /// value is meaningful. Returns `None` only when a placeholder is unbound.
    pub fn render_params<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<String> {
        self.substitute(lookup)
    }

    fn substitute<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<String> {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => out.push_str(lookup(name)?),
            }
        }
        Some(out)
    }
}

impl Default for Template {
    /// The empty template, which renders to nothing.
    fn default() -> Self {
        Self {
            source: String::new(),
            segments: Vec::new(),
        }
    }
}

impl TryFrom<String> for Template {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Template::parse(&value)
    }
}

impl From<Template> for String {
    fn from(value: Template) -> Self {
        value.source
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn template_error(source: &str, start: usize, end: usize, reason: &str) -> ConfigError {
    ConfigError::new(
        String::new(),
        source,
        ConfigErrorKind::Template(reason.to_string()),
    )
    .with_span(SourceSpan::new(start, end.min(source.len())))
}
