//! A small owned XML tree built with quick-xml.
//!
//! Selectors need to walk up and down repeatedly, so the document is read
//! into memory once. Whitespace inside text is kept as-is; evaluators collapse
//! it when they produce values.

#[cfg(feature = "xml")]
use crate::error::ExtractError;
#[cfg(feature = "xml")]
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

/// One element with its attributes and mixed content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Child content of an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

impl Element {
    /// The name without any namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Whether this element answers to `name`.
    ///
    /// A prefixed name is compared exactly; an unprefixed one matches the local name.
    pub fn is_named(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }

    /// Value of the attribute answering to `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| names_match(key, name))
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// First descendant element (depth-first) whose local name is one of `names`,
    /// compared case-insensitively.
    pub fn find_descendant(&self, names: &[&str]) -> Option<&Element> {
        self.child_elements().find_map(|child| {
            if names
                .iter()
                .any(|n| child.local_name().eq_ignore_ascii_case(n))
            {
                Some(child)
            } else {
                child.find_descendant(names)
            }
        })
    }

    /// Concatenated text of every descendant text node.
    pub fn text(&self) -> String {
        self.text_excluding(&[])
    }

    /// Concatenated descendant text, skipping subtrees whose local name is in `skip`.
    pub fn text_excluding(&self, skip: &[&str]) -> String {
        let mut out = String::new();
        push_text(self, skip, &mut out);
        out
    }
}

fn push_text(element: &Element, skip: &[&str], out: &mut String) {
    for child in &element.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => {
                if !skip.contains(&e.local_name()) {
                    push_text(e, skip, out);
                }
            }
        }
    }
}

fn collect_descendants<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in element.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, l)| l)
}

pub(crate) fn names_match(actual: &str, wanted: &str) -> bool {
    if wanted.contains(':') {
        actual == wanted
    } else {
        local(actual) == wanted
    }
}

/// A parsed document. The root is a synthetic, unnamed element whose children
/// are the document's top-level nodes, so absolute selectors start from it.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: Element,
}

#[cfg(feature = "xml")]
impl XmlDocument {
    /// Parse `content` into a tree.
    ///
    /// Text with entities that cannot be resolved is kept verbatim rather than
    /// failing the document.
    pub fn parse(content: &str) -> Result<Self, ExtractError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut stack = vec![Element::default()];

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(start_element(&e, position)?),
                Ok(Event::Empty(e)) => {
                    let element = start_element(&e, position)?;
                    append(&mut stack, XmlNode::Element(element));
                }
                Ok(Event::End(_)) => {
                    // quick-xml already verified the end name matches.
                    if stack.len() > 1 {
                        let element = stack.pop().unwrap_or_default();
                        append(&mut stack, XmlNode::Element(element));
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    append(&mut stack, XmlNode::Text(text));
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    append(&mut stack, XmlNode::Text(text));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ExtractError::Xml {
                        position: reader.buffer_position(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if stack.len() != 1 {
            return Err(ExtractError::Xml {
                position: reader.buffer_position(),
                message: format!(
                    "unexpected end of document inside <{}>",
                    stack.last().map(|e| e.name.as_str()).unwrap_or_default()
                ),
            });
        }
        let root = stack.pop().unwrap_or_default();
        if root.child_elements().next().is_none() {
            return Err(ExtractError::Xml {
                position: 0,
                message: "document has no root element".to_string(),
            });
        }
        Ok(Self { root })
    }
}

#[cfg(feature = "xml")]
fn append(stack: &mut [Element], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

#[cfg(feature = "xml")]
fn start_element(e: &BytesStart<'_>, position: u64) -> Result<Element, ExtractError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ExtractError::Xml {
            position,
            message: format!("invalid attribute: {err}"),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}
