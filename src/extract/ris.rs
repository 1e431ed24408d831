//! Tagged-line (RIS) citation documents.
//!
//! A document is a sequence of `TY` .. `ER` records. Tag lines outside any
//! record form the document header, which serves as the global scope.

use crate::error::ExtractError;

/// Tags whose values may list several people on one line.
const AUTHOR_TAGS: &[&str] = &["AU", "A1", "A2", "A3", "A4"];

/// Ordered tag/value pairs of one record (or of the header).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RisRecord {
    entries: Vec<(String, String)>,
}

impl RisRecord {
    fn push(&mut self, tag: &str, value: String) {
        if !value.is_empty() {
            self.entries.push((tag.to_string(), value));
        }
    }

    /// All values of `tag`, in file order.
    pub fn values<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn first<'a>(&'a self, tag: &'a str) -> Option<&'a str> {
        self.values(tag).next()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A parsed RIS document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RisDocument {
    pub header: RisRecord,
    pub records: Vec<RisRecord>,
    /// Lines that were neither tag lines nor export banners, with their line numbers.
    pub ignored_lines: Vec<(usize, String)>,
}

impl RisDocument {
    /// Parse `text`.
    ///
    /// Malformed lines are kept in `ignored_lines`. A non-blank document with
    /// no tag line at all is rejected, which catches error pages stored where
    /// a citation file was expected.
    pub fn parse(text: &str) -> Result<Self, ExtractError> {
        let mut document = RisDocument::default();
        if text.trim().is_empty() {
            return Ok(document);
        }

        let mut current: Option<RisRecord> = None;
        let mut tagged_lines = 0usize;

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = line.trim().trim_start_matches('\u{feff}');
            if line.is_empty() || is_banner_line(line) {
                continue;
            }

            let Some((tag, content)) = parse_line(line) else {
                document.ignored_lines.push((line_number, line.to_string()));
                continue;
            };
            tagged_lines += 1;

            match tag {
                "TY" => {
                    if let Some(record) = current.take().filter(|r| !r.is_empty()) {
                        document.records.push(record);
                    }
                    let mut record = RisRecord::default();
                    record.push(tag, content.to_string());
                    current = Some(record);
                }
                "ER" => {
                    if let Some(record) = current.take().filter(|r| !r.is_empty()) {
                        document.records.push(record);
                    }
                }
                _ => {
                    let target = current.as_mut().unwrap_or(&mut document.header);
                    if AUTHOR_TAGS.contains(&tag) {
                        for author in split_authors(content) {
                            target.push(tag, author);
                        }
                    } else {
                        target.push(tag, content.to_string());
                    }
                }
            }
        }

        if let Some(record) = current.filter(|r| !r.is_empty()) {
            document.records.push(record);
        }

        if tagged_lines == 0 {
            let (line, _) = document.ignored_lines.first().cloned().unwrap_or_default();
            return Err(ExtractError::Ris {
                line,
                message: "no RIS tag lines found".to_string(),
            });
        }
        Ok(document)
    }
}

/// Split a line into its tag and content.
///
/// Accepts `TY  - JOUR`, `TY  -`, `TY- JOUR`, `TY-JOUR` and `TY JOUR`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let tag = line.get(..2)?;
    let mut chars = tag.chars();
    if !(chars.next()?.is_ascii_uppercase()
        && chars.next().is_some_and(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
    {
        return None;
    }

    let rest = &line[2..];
    let content = if let Some(content) = rest.strip_prefix("  - ") {
        content
    } else if let Some(content) = rest.strip_prefix("  -") {
        content
    } else if let Some(content) = rest.strip_prefix('-') {
        content
    } else if rest.starts_with(' ') {
        rest.trim_start().strip_prefix('-').unwrap_or(rest)
    } else if rest.is_empty() {
        rest
    } else {
        return None;
    };
    Some((tag, content.trim()))
}

/// Split several people given on one line.
///
/// Semicolons always separate; ` & ` and ` and ` separate too. Bare commas do
/// not, since `Family, Given` uses them.
fn split_authors(content: &str) -> Vec<String> {
    content
        .split(';')
        .flat_map(|segment| segment.split(" & "))
        .flat_map(|segment| segment.split(" and "))
        .map(|author| author.trim().trim_end_matches(',').trim().to_string())
        .filter(|author| !author.is_empty())
        .collect()
}

/// Export banners some databases prepend to each record.
fn is_banner_line(line: &str) -> bool {
    line.starts_with("Record #")
        || line.starts_with("Provider:")
        || line.starts_with("Content:")
        || line.starts_with("Database:")
}
