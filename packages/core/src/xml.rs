//! A minimal owned XML element tree.
//!
//! Metadata payloads reach the envelope as foreign XML (RDF/XML today). They
//! are parsed into an [`XmlElement`] once, which proves they are well formed,
//! and then written into the response verbatim. Names are kept as qualified
//! names and `xmlns` declarations as ordinary attributes, so a subtree keeps
//! its namespace bindings wherever it is embedded.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum XmlError {
    #[error("XML parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("document has no root element")]
    NoRoot,

    #[error("unexpected closing tag </{0}>")]
    Unbalanced(String),

    #[error("XML write error: {0}")]
    Write(String),
}

/// A node inside an element: a child element or a run of text.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name, e.g. `rdf:Description`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Shorthand for `<name>text</name>`.
    pub fn text_element(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// The part of the name after the namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    /// All child elements with the given local name.
    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.local_name() == local_name)
    }

    /// Every descendant element (depth first) with the given local name.
    pub fn descendants(&self, local_name: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        for e in self.elements() {
            if e.local_name() == local_name {
                out.push(e);
            }
            out.extend(e.descendants(local_name));
        }
        out
    }

    /// Parse a complete document and return its root element.
    ///
    /// The XML declaration, comments, processing instructions and a DOCTYPE
    /// are skipped. Whitespace-only text between elements is dropped; the
    /// text of a leaf element, whitespace included, is kept exactly as
    /// written.
    pub fn parse(input: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(input);
        let parse_err = |reader: &Reader<&[u8]>, message: String| XmlError::Parse {
            position: reader.buffer_position(),
            message,
        };

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| parse_err(&reader, e.to_string()))?;
            match event {
                Event::Start(start) => {
                    let element = element_from_start(&start)
                        .map_err(|message| parse_err(&reader, message))?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)
                        .map_err(|message| parse_err(&reader, message))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(end) => {
                    let mut element = stack.pop().ok_or_else(|| {
                        XmlError::Unbalanced(String::from_utf8_lossy(end.name().as_ref()).into())
                    })?;
                    drop_indentation(&mut element);
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| parse_err(&reader, e.to_string()))?;
                    push_text(&mut stack, &text);
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8(cdata.into_inner().into_owned())
                        .map_err(|e| parse_err(&reader, e.to_string()))?;
                    push_text(&mut stack, &text);
                }
                Event::Eof => break,
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }

        root.ok_or(XmlError::NoRoot)
    }

    /// Write this element (and its subtree) as XML events.
    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            return write_event(writer, Event::Empty(start));
        }

        write_event(writer, Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write_to(writer)?,
                XmlNode::Text(t) => write_event(writer, Event::Text(BytesText::new(t)))?,
            }
        }
        write_event(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }

    /// Serialize as a standalone document with a UTF-8 declaration.
    pub fn to_document(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        write_event(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }

    /// Serialize without a declaration.
    pub fn to_xml_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }
}

// --- helpers -----------------------------------------------------------------

fn write_event<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), XmlError> {
    writer
        .write_event(event)
        .map_err(|e| XmlError::Write(e.to_string()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| e.to_string())?
        .to_string();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| e.to_string())?
            .to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn push_text(stack: &mut [XmlElement], text: &str) {
    if let Some(parent) = stack.last_mut() {
        // Adjacent text and CDATA runs merge into one node.
        if let Some(XmlNode::Text(prev)) = parent.children.last_mut() {
            prev.push_str(text);
        } else {
            parent.children.push(XmlNode::Text(text.to_string()));
        }
    }
}

/// Whitespace-only text is layout once an element has element children; in
/// a leaf it is content.
fn drop_indentation(element: &mut XmlElement) {
    let has_elements = element
        .children
        .iter()
        .any(|c| matches!(c, XmlNode::Element(_)));
    if has_elements {
        element
            .children
            .retain(|c| !matches!(c, XmlNode::Text(t) if t.trim().is_empty()));
    }
}
