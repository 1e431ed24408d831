//! Path selectors over the XML tree.
//!
//! The supported subset:
//!
//! | Form            | Meaning                                          |
//! |-----------------|--------------------------------------------------|
//! | `a/b`           | child steps from the context node                |
//! | `/a/b`          | child steps from the document                    |
//! | `//a`, `a//b`   | descendant search                                |
//! | `*`             | any element                                      |
//! | `.`             | the context node                                 |
//! | `a[@x='v']`     | attribute equals                                 |
//! | `a[@x]`         | attribute present                                |
//! | `a[b='v']`      | child element text equals                        |
//! | `a/@x`          | select an attribute value (last step only)       |
//!
//! Unprefixed names match on the local name, so `article-title` also finds
//! `jats:article-title`.

use super::xml::Element;
use crate::error::{ConfigError, ConfigErrorKind, SourceSpan};
use either::Either;

/// A node picked by a selector: an element, or an attribute's value.
pub type Node<'a> = Either<&'a Element, &'a str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Context,
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    HasAttribute(String),
    AttributeEquals(String, String),
    ChildEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

/// A compiled selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
    attribute: Option<String>,
}

impl Selector {
    /// Compile `source`. Errors carry the byte span of the offending part.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        Parser::new(source).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Every node matching the selector, in document order.
    ///
    /// `context` is the article node (or the document for global selectors);
    /// `document` is where absolute selectors start.
    pub fn select<'a>(&self, context: &'a Element, document: &'a Element) -> Vec<Node<'a>> {
        let mut current: Vec<&'a Element> = vec![if self.absolute { document } else { context }];

        for step in &self.steps {
            let mut next: Vec<&'a Element> = Vec::new();
            for node in current {
                let candidates: Vec<&'a Element> = match (&step.test, step.axis) {
                    (NameTest::Context, _) => vec![node],
                    (_, Axis::Child) => node.child_elements().collect(),
                    (_, Axis::Descendant) => node.descendants(),
                };
                for candidate in candidates {
                    if step.accepts(candidate) && !next.iter().any(|e| std::ptr::eq(*e, candidate)) {
                        next.push(candidate);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        match &self.attribute {
            Some(name) => current
                .into_iter()
                .filter_map(|e| e.attribute(name))
                .map(Either::Right)
                .collect(),
            None => current.into_iter().map(Either::Left).collect(),
        }
    }

    /// The first match, if any.
    pub fn select_first<'a>(&self, context: &'a Element, document: &'a Element) -> Option<Node<'a>> {
        self.select(context, document).into_iter().next()
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl Step {
    fn accepts(&self, element: &Element) -> bool {
        let name_ok = match &self.test {
            NameTest::Context | NameTest::Any => true,
            NameTest::Name(name) => element.is_named(name),
        };
        name_ok && self.predicates.iter().all(|p| p.holds(element))
    }
}

impl Predicate {
    fn holds(&self, element: &Element) -> bool {
        match self {
            Predicate::HasAttribute(name) => element.attribute(name).is_some(),
            Predicate::AttributeEquals(name, value) => element.attribute(name) == Some(value.as_str()),
            Predicate::ChildEquals(name, value) => element
                .child_elements()
                .any(|c| c.is_named(name) && c.text().trim() == value),
        }
    }
}

struct Parser<'s> {
    source: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self { source, pos: 0 }
    }

    fn error(&self, start: usize, end: usize, message: impl Into<String>) -> ConfigError {
        ConfigError::new(
            "selector",
            self.source,
            ConfigErrorKind::Selector(message.into()),
        )
        .with_span(SourceSpan::new(start, end.max(start + 1).min(self.source.len().max(1))))
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn parse(mut self) -> Result<Selector, ConfigError> {
        if self.source.trim().is_empty() {
            return Err(self.error(0, 0, "empty selector"));
        }

        let mut absolute = false;
        let mut axis = Axis::Child;
        if self.eat('/') {
            absolute = true;
            if self.eat('/') {
                axis = Axis::Descendant;
            }
        }

        let mut steps = Vec::new();
        let mut attribute = None;

        loop {
            let start = self.pos;
            if self.eat('@') {
                let name = self.name()?;
                if self.pos < self.source.len() {
                    return Err(self.error(
                        start,
                        self.source.len(),
                        "an attribute can only be selected by the last step",
                    ));
                }
                if axis == Axis::Descendant {
                    steps.push(Step {
                        axis,
                        test: NameTest::Any,
                        predicates: Vec::new(),
                    });
                }
                attribute = Some(name);
                break;
            }

            let test = if self.eat('*') {
                NameTest::Any
            } else if self.peek() == Some('.') {
                self.pos += 1;
                NameTest::Context
            } else {
                NameTest::Name(self.name()?)
            };

            let mut predicates = Vec::new();
            while self.peek() == Some('[') {
                predicates.push(self.predicate()?);
            }

            steps.push(Step {
                axis,
                test,
                predicates,
            });

            match self.peek() {
                None => break,
                Some('/') => {
                    self.pos += 1;
                    axis = if self.eat('/') {
                        Axis::Descendant
                    } else {
                        Axis::Child
                    };
                    if self.peek().is_none() {
                        return Err(self.error(self.pos - 1, self.pos, "selector ends with `/`"));
                    }
                }
                Some(c) => {
                    return Err(self.error(
                        self.pos,
                        self.pos + c.len_utf8(),
                        format!("unexpected character `{c}`"),
                    ));
                }
            }
        }

        Ok(Selector {
            source: self.source.to_string(),
            absolute,
            steps,
            attribute,
        })
    }

    fn name(&mut self) -> Result<String, ConfigError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            Some(c) => {
                return Err(self.error(
                    start,
                    start + c.len_utf8(),
                    format!("expected a name, found `{c}`"),
                ));
            }
            None => return Err(self.error(start, start, "expected a name")),
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':') {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        Ok(self.source[start..self.pos].to_string())
    }

    fn predicate(&mut self) -> Result<Predicate, ConfigError> {
        let open = self.pos;
        self.pos += 1;
        self.skip_spaces();

        let is_attribute = self.eat('@');
        let name = self.name()?;
        self.skip_spaces();

        let predicate = if self.eat('=') {
            self.skip_spaces();
            let value = self.value()?;
            if is_attribute {
                Predicate::AttributeEquals(name, value)
            } else {
                Predicate::ChildEquals(name, value)
            }
        } else if is_attribute {
            Predicate::HasAttribute(name)
        } else {
            return Err(self.error(open, self.pos, "element predicate needs a value"));
        };

        self.skip_spaces();
        if !self.eat(']') {
            return Err(self.error(open, self.source.len(), "unterminated predicate"));
        }
        Ok(predicate)
    }

    fn value(&mut self) -> Result<String, ConfigError> {
        let start = self.pos;
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let rest = &self.source[self.pos..];
                let Some(len) = rest.find(quote) else {
                    return Err(self.error(start, self.source.len(), "unterminated string"));
                };
                let value = rest[..len].to_string();
                self.pos += len + 1;
                Ok(value)
            }
            _ => {
                let rest = &self.source[self.pos..];
                let len = rest.find([']', ' ']).unwrap_or(rest.len());
                if len == 0 {
                    return Err(self.error(start, start, "expected a value"));
                }
                self.pos += len;
                Ok(rest[..len].to_string())
            }
        }
    }
}

/// A RIS tag selector: two characters, a letter then a letter or digit.
pub(crate) fn parse_ris_tag(source: &str) -> Result<String, ConfigError> {
    let tag = source.trim();
    let mut chars = tag.chars();
    let valid = tag.len() == 2
        && chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.next().is_some_and(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if valid {
        Ok(tag.to_string())
    } else {
        Err(ConfigError::new(
            "selector",
            source,
            ConfigErrorKind::Selector("RIS selectors are two-character tags such as `T2`".to_string()),
        )
        .with_span(SourceSpan::new(0, source.len().max(1))))
    }
}
