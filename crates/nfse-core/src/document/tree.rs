//! Minimal element tree built from quick-xml events.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

use super::Result;
use crate::error::ExtractionError;

/// An XML element. Names are local names with any namespace prefix removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Local name of the element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trimmed text content directly inside the element.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Direct children in document order.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All descendants in pre-order, excluding the element itself.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// First descendant with the given name, in document order.
    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        self.descendants().find(|e| e.name == name)
    }
}

/// Pre-order iterator over the descendants of an element.
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse a document from a string.
    ///
    /// Fails with [`ExtractionError::Parse`] when the source is not
    /// well-formed: mismatched or unclosed tags, several root elements,
    /// no root element at all, or bad escapes.
    pub fn parse(source: &str) -> Result<Self> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Element::new(local_name(&start))),
                Ok(Event::Empty(start)) => {
                    attach(&mut stack, &mut root, Element::new(local_name(&start)))?;
                }
                Ok(Event::End(_)) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| parse_error(position, "unexpected closing tag"))?;
                    element.text = element.text.trim().to_string();
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|e| parse_error(position, &e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(parse_error(reader.error_position(), &e.to_string())),
            }
        }

        if let Some(open) = stack.last() {
            return Err(ExtractionError::Parse(format!(
                "unclosed element <{}>",
                open.name
            )));
        }

        let root = root.ok_or_else(|| ExtractionError::Parse("no root element".to_string()))?;
        trace!("Parsed document with root <{}>", root.name);

        Ok(Self { root })
    }

    /// Parse a document from raw bytes. Invalid UTF-8 is replaced.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(&String::from_utf8_lossy(data))
    }

    /// Root element.
    pub fn root(&self) -> &Element {
        &self.root
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }

    if root.is_some() {
        return Err(ExtractionError::Parse(format!(
            "multiple root elements (second is <{}>)",
            element.name
        )));
    }

    *root = Some(element);
    Ok(())
}

fn parse_error(position: impl std::fmt::Display, reason: &str) -> ExtractionError {
    ExtractionError::Parse(format!("at byte {}: {}", position, reason))
}
