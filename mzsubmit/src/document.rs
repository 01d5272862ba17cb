//! An owned, mutable XML tree for identification documents.
//!
//! Parsing is done by [`roxmltree`] on the repaired text, which also guarantees well formedness.
//! Qualified names and namespace declarations are taken from the source text as written, so
//! that writing the tree back out with [`quick_xml`] keeps the default namespace and all prefixes
//! exactly as they were.

use std::{borrow::Cow, path::Path};

use context_error::{BoxedError, Context, CreateError};
use quick_xml::{
    Writer,
    escape::escape,
    events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event, attributes},
    name::QName,
};
use roxmltree::{NodeType, ParsingOptions};

use crate::{
    SubmitError,
    repair::{decode, repair},
};

/// The local name of the element that links an identification document to its spectrum file
pub const SPECTRUM_REFERENCE_ELEMENT: &str = "SpectraData";
/// The attribute on the [`SPECTRUM_REFERENCE_ELEMENT`] that holds the spectrum file location
pub const SPECTRUM_REFERENCE_ATTRIBUTE: &str = "location";

/// A full XML document
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    /// Comments and processing instructions before the root element
    pub prolog: Vec<Node>,
    /// The root element
    pub root: Element,
    /// Comments and processing instructions after the root element
    pub epilog: Vec<Node>,
}

/// An element with its (qualified) name, attributes, and children
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    /// The qualified name as written in the source, e.g. `SpectraData` or `mzid:SpectraData`
    pub name: String,
    /// All attributes in source order, namespace declarations (`xmlns`, `xmlns:prefix`) included
    pub attributes: Vec<Attribute>,
    /// All child nodes in source order
    pub children: Vec<Node>,
}

/// An attribute with its qualified name and unescaped value
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    /// The qualified name as written in the source
    pub name: String,
    /// The unescaped value
    pub value: String,
}

/// A child node of an element
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
    /// A nested element
    Element(Element),
    /// Unescaped text (CDATA sections are merged into text)
    Text(String),
    /// A comment
    Comment(String),
    /// A processing instruction
    ProcessingInstruction {
        /// The target
        target: String,
        /// The content following the target
        value: Option<String>,
    },
}

impl Attribute {
    /// Check if this is a namespace declaration.
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

impl Element {
    /// The name without namespace prefix
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// The namespace prefix, if any
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Get the value of an attribute by its qualified name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set the value of an attribute, the attribute is appended if it did not exist yet
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(attribute) = self.attributes.iter_mut().find(|a| a.name == name) {
            attribute.value = value;
        } else {
            self.attributes.push(Attribute {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Check if this element is a spectrum reference element
    pub fn is_spectrum_reference(&self) -> bool {
        self.local_name() == SPECTRUM_REFERENCE_ELEMENT
    }

    /// The concatenation of all direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Call the function on this element and all its descendants, in document order.
    pub fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut Self)) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.for_each_element_mut(f);
            }
        }
    }

    /// Call the function on this element and all its descendants, in document order.
    pub fn for_each_element(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        for child in &self.children {
            if let Node::Element(element) = child {
                element.for_each_element(f);
            }
        }
    }
}

impl Document {
    /// Read, repair, and parse an identification document from disk.
    /// # Errors
    /// If the file could not be read or is not valid XML after repair.
    pub fn load(path: &Path) -> Result<Self, BoxedError<'static, SubmitError>> {
        let raw = std::fs::read(path).map_err(|e| {
            BoxedError::new(
                SubmitError::FileNotReadable,
                "Identification file could not be read",
                e.to_string(),
                Context::none().source(path.to_string_lossy()).to_owned(),
            )
        })?;
        let decoded = decode(&raw);
        let repaired = repair(&decoded);
        Self::parse_inner(&repaired).map_err(|e| xml_error(&repaired, &e, Some(path)))
    }

    /// Parse a document from text, the text is expected to be repaired already (see [`repair`]).
    /// # Errors
    /// If the text is not valid XML.
    pub fn parse(text: &str) -> Result<Self, BoxedError<'static, SubmitError>> {
        Self::parse_inner(text).map_err(|e| xml_error(text, &e, None))
    }

    fn parse_inner(text: &str) -> Result<Self, roxmltree::Error> {
        let document = roxmltree::Document::parse_with_options(
            text,
            ParsingOptions {
                allow_dtd: true,
                ..Default::default()
            },
        )?;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root = None;
        for node in document.root().children() {
            if node.is_element() {
                root = Some(convert_element(text, node));
            } else if let Some(converted) = convert_node(text, node) {
                if root.is_none() {
                    prolog.push(converted);
                } else {
                    epilog.push(converted);
                }
            }
        }
        Ok(Self {
            prolog,
            root: root.unwrap_or_default(),
            epilog,
        })
    }

    /// The current locations of all spectrum reference elements, in document order.
    pub fn spectrum_locations(&self) -> Vec<String> {
        let mut locations = Vec::new();
        self.root.for_each_element(&mut |element| {
            if element.is_spectrum_reference()
                && let Some(location) = element.attribute(SPECTRUM_REFERENCE_ATTRIBUTE)
            {
                locations.push(location.to_string());
            }
        });
        locations
    }

    /// Serialize the document, including an XML declaration.
    /// # Errors
    /// If the underlying writer failed.
    pub fn to_xml(&self) -> Result<Vec<u8>, BoxedError<'static, SubmitError>> {
        let mut writer = Writer::new(Vec::new());
        write_document(&mut writer, self).map_err(|e| {
            BoxedError::new(
                SubmitError::FileNotWritable,
                "Identification document could not be serialized",
                e,
                Context::none(),
            )
        })?;
        Ok(writer.into_inner())
    }

    /// Serialize the document to the given path.
    /// # Errors
    /// If the document could not be serialized or the file could not be written.
    pub fn write_to(&self, path: &Path) -> Result<(), BoxedError<'static, SubmitError>> {
        let bytes = self.to_xml()?;
        std::fs::write(path, bytes).map_err(|e| {
            BoxedError::new(
                SubmitError::FileNotWritable,
                "Identification file could not be written",
                e.to_string(),
                Context::none().source(path.to_string_lossy()).to_owned(),
            )
        })
    }
}

/// Create a rich error for a parse error, showing the line the parser stopped at.
fn xml_error(
    text: &str,
    error: &roxmltree::Error,
    path: Option<&Path>,
) -> BoxedError<'static, SubmitError> {
    let position = error.pos();
    let row = position.row.saturating_sub(1);
    let line = text.lines().nth(row as usize).unwrap_or_default();
    let length = line.chars().count();
    let column = (position.col.saturating_sub(1) as usize).min(length);
    let mut context = Context::line(
        Some(row),
        line.to_string(),
        column,
        usize::from(column < length),
    );
    if let Some(path) = path {
        context = context.source(path.to_string_lossy().to_string());
    }
    BoxedError::new(
        SubmitError::InvalidXml,
        "Invalid XML",
        format!(
            "The identification document could not be parsed, even after repairing ampersands and illegal characters: {error}"
        ),
        context.to_owned(),
    )
}

fn convert_node(text: &str, node: roxmltree::Node<'_, '_>) -> Option<Node> {
    match node.node_type() {
        NodeType::Element => Some(Node::Element(convert_element(text, node))),
        NodeType::Text => node.text().map(|t| Node::Text(t.to_string())),
        NodeType::Comment => node.text().map(|t| Node::Comment(t.to_string())),
        NodeType::PI => node.pi().map(|pi| Node::ProcessingInstruction {
            target: pi.target.to_string(),
            value: pi.value.map(ToString::to_string),
        }),
        NodeType::Root => None,
    }
}

fn convert_element(text: &str, node: roxmltree::Node<'_, '_>) -> Element {
    let (name, raw_attributes) = start_tag_names(&text[node.range().start..]);
    let values = node.attributes().collect::<Vec<_>>();
    let mut attributes = Vec::with_capacity(raw_attributes.len());
    let mut index = 0;
    for raw in raw_attributes {
        if raw == "xmlns" || raw.starts_with("xmlns:") {
            let prefix = raw.strip_prefix("xmlns:");
            if let Some(namespace) = node.namespaces().find(|ns| ns.name() == prefix) {
                attributes.push(Attribute {
                    name: raw.to_string(),
                    value: namespace.uri().to_string(),
                });
            }
        } else if let Some(attribute) = values.get(index) {
            attributes.push(Attribute {
                name: raw.to_string(),
                value: attribute.value().to_string(),
            });
            index += 1;
        }
    }
    Element {
        name: name.to_string(),
        attributes,
        children: node
            .children()
            .filter_map(|child| convert_node(text, child))
            .collect(),
    }
}

/// Get the qualified element name and the qualified attribute names from the start of a start tag
/// as written in well formed source text (`text` starts with `<`).
fn start_tag_names(text: &str) -> (&str, Vec<&str>) {
    let is_name_end = |c: char| c.is_ascii_whitespace() || matches!(c, '/' | '>' | '=');
    let tag = &text[1..];
    let name_end = tag.find(is_name_end).unwrap_or(tag.len());
    let name = &tag[..name_end];
    let mut rest = &tag[name_end..];
    let mut attributes = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('>') {
            break;
        }
        let end = rest.find(is_name_end).unwrap_or(rest.len());
        attributes.push(&rest[..end]);
        rest = rest[end..].trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '=');
        let Some(quote) = rest.chars().next() else {
            break;
        };
        rest = &rest[quote.len_utf8()..];
        rest = rest.find(quote).map_or("", |close| &rest[close + quote.len_utf8()..]);
    }
    (name, attributes)
}

fn write_document(writer: &mut Writer<Vec<u8>>, document: &Document) -> Result<(), String> {
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| e.to_string())?;
    for node in &document.prolog {
        newline(writer)?;
        write_node(writer, node)?;
    }
    newline(writer)?;
    write_element(writer, &document.root)?;
    for node in &document.epilog {
        newline(writer)?;
        write_node(writer, node)?;
    }
    newline(writer)
}

fn newline(writer: &mut Writer<Vec<u8>>) -> Result<(), String> {
    writer
        .write_event(Event::Text(BytesText::new("\n")))
        .map_err(|e| e.to_string())
}

/// Escape an attribute value, tabs and line breaks are written as character references so that
/// they read back unchanged.
fn escape_attribute(value: &str) -> String {
    let escaped = escape(value);
    if escaped.contains(['\n', '\t', '\r']) {
        escaped
            .replace('\n', "&#10;")
            .replace('\t', "&#9;")
            .replace('\r', "&#13;")
    } else {
        escaped.into_owned()
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), String> {
    let mut start = BytesStart::new(element.name.as_str());
    for attribute in &element.attributes {
        start.push_attribute(attributes::Attribute {
            key: QName(attribute.name.as_bytes()),
            value: Cow::Owned(escape_attribute(&attribute.value).into_bytes()),
        });
    }
    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| e.to_string())
    } else {
        writer
            .write_event(Event::Start(start))
            .map_err(|e| e.to_string())?;
        for child in &element.children {
            write_node(writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(element.name.as_str())))
            .map_err(|e| e.to_string())
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), String> {
    match node {
        Node::Element(element) => write_element(writer, element),
        Node::Text(text) => writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| e.to_string()),
        Node::Comment(comment) => writer
            .write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))
            .map_err(|e| e.to_string()),
        Node::ProcessingInstruction { target, value } => {
            let content = value
                .as_ref()
                .map_or_else(|| target.clone(), |value| format!("{target} {value}"));
            writer
                .write_event(Event::PI(BytesPI::new(content)))
                .map_err(|e| e.to_string())
        }
    }
}
