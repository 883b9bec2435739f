use std::borrow::Cow;
use std::io::Write;

use xml::attribute::OwnedAttribute;
use xml::name::OwnedName;
use xml::namespace::Namespace;
use xml::reader::XmlEvent;
use xml::writer::{EventWriter, XmlEvent as WriterEvent};
use xml::{EmitterConfig, ParserConfig};

use crate::error::DocumentError;

/// Deepest element nesting accepted from an exporter. Every tree walk recurses once per level.
pub const MAX_NESTING_DEPTH: usize = 256;

/// An exported SVG image held as an owned tree.
///
/// Documents are values: every change produces a new document and leaves the original as it was,
/// so a document handed out by an exporter can be kept around and compared after normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct SvgDocument {
    root: SvgElement,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SvgElement {
    name: OwnedName,
    attributes: Vec<OwnedAttribute>,
    /// every namespace in scope, the writer only emits the ones its parent didn't already declare
    namespace: Namespace,
    children: Vec<SvgNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SvgNode {
    Element(SvgElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { name: String, data: Option<String> },
}

impl SvgDocument {
    pub fn parse(source: &str) -> Result<Self, DocumentError> {
        let reader = ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(true)
            .ignore_comments(false)
            .create_reader(source.as_bytes());

        let mut open: Vec<SvgElement> = Vec::new();
        let mut root = None;

        for event in reader {
            match event.map_err(|e| DocumentError::Parse(e.to_string()))? {
                XmlEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => {
                    if open.len() >= MAX_NESTING_DEPTH {
                        return Err(DocumentError::TooDeep(MAX_NESTING_DEPTH));
                    }

                    open.push(SvgElement {
                        name,
                        attributes,
                        namespace,
                        children: vec![],
                    })
                }
                XmlEvent::EndElement { .. } => {
                    let element = open
                        .pop()
                        .ok_or_else(|| DocumentError::Parse("Unbalanced end element".into()))?;
                    match open.last_mut() {
                        Some(parent) => parent.children.push(SvgNode::Element(element)),
                        None => root = Some(element),
                    }
                }
                XmlEvent::Characters(text) => push_child(&mut open, SvgNode::Text(text)),
                XmlEvent::CData(text) => push_child(&mut open, SvgNode::CData(text)),
                XmlEvent::Comment(text) => push_child(&mut open, SvgNode::Comment(text)),
                XmlEvent::ProcessingInstruction { name, data } => {
                    push_child(&mut open, SvgNode::ProcessingInstruction { name, data })
                }
                XmlEvent::EndDocument => break,
                // the document declaration and anything outside the root isn't kept
                _ => (),
            }
        }

        let root = root.ok_or(DocumentError::MissingRoot)?;
        if root.local_name() != "svg" {
            return Err(DocumentError::UnexpectedRoot(root.local_name().to_string()));
        }

        Ok(SvgDocument { root })
    }

    pub fn root(&self) -> &SvgElement {
        &self.root
    }

    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.root.attribute(local_name)
    }

    /// Returns a copy of this document with an attribute set on the root element
    pub fn with_attribute(&self, local_name: &str, value: &str) -> SvgDocument {
        let mut root = self.root.clone();
        root.set_attribute(local_name, value);

        SvgDocument { root }
    }

    /// Follows a chain of "first element child" steps from the root
    pub fn first_element_descendant(&self, depth: usize) -> Option<&SvgElement> {
        (0..depth).try_fold(&self.root, |element, _| element.first_element_child())
    }

    /// Returns a copy of this document without the element found by following `depth` "first element
    /// child" steps from the root, or `None` if there is nothing at that path.
    pub fn without_first_element_descendant(&self, depth: usize) -> Option<SvgDocument> {
        fn remove(element: &mut SvgElement, depth: usize) -> bool {
            let Some(index) = element.first_element_child_index() else {
                return false;
            };

            if depth == 1 {
                element.children.remove(index);
                true
            } else if let SvgNode::Element(child) = &mut element.children[index] {
                remove(child, depth - 1)
            } else {
                false
            }
        }

        if depth == 0 {
            return None;
        }

        let mut root = self.root.clone();
        remove(&mut root, depth).then_some(SvgDocument { root })
    }

    /// Every element in document order, starting at the root
    pub fn elements(&self) -> Vec<&SvgElement> {
        fn collect<'a>(element: &'a SvgElement, elements: &mut Vec<&'a SvgElement>) {
            elements.push(element);
            for child in element.child_elements() {
                collect(child, elements);
            }
        }

        let mut elements = vec![];
        collect(&self.root, &mut elements);
        elements
    }

    /// Serializes the document as inline markup, without an XML declaration or line breaks
    pub fn to_markup(&self) -> Result<String, DocumentError> {
        let mut buffer = Vec::new();
        let mut writer = EmitterConfig::new()
            .line_separator("")
            .write_document_declaration(false)
            .keep_element_names_stack(false)
            .create_writer(&mut buffer);

        write_element(&mut writer, &self.root)?;

        String::from_utf8(buffer)
            .map_err(|e| DocumentError::Write(format!("Error converting SVG to string: {e}")))
    }
}

fn write_element<W: Write>(
    writer: &mut EventWriter<W>,
    element: &SvgElement,
) -> Result<(), DocumentError> {
    write_event(
        writer,
        WriterEvent::StartElement {
            name: element.name.borrow(),
            attributes: Cow::Owned(element.attributes.iter().map(|a| a.borrow()).collect()),
            namespace: Cow::Borrowed(&element.namespace),
        },
    )?;

    for child in element.children.iter() {
        match child {
            SvgNode::Element(child) => write_element(writer, child)?,
            SvgNode::Text(text) => write_event(writer, WriterEvent::Characters(text))?,
            SvgNode::CData(text) => write_event(writer, WriterEvent::CData(text))?,
            SvgNode::Comment(text) => write_event(writer, WriterEvent::Comment(text))?,
            SvgNode::ProcessingInstruction { name, data } => write_event(
                writer,
                WriterEvent::ProcessingInstruction {
                    name,
                    data: data.as_deref(),
                },
            )?,
        }
    }

    write_event(
        writer,
        WriterEvent::EndElement {
            name: Some(element.name.borrow()),
        },
    )
}

fn write_event<W: Write>(
    writer: &mut EventWriter<W>,
    event: WriterEvent,
) -> Result<(), DocumentError> {
    writer
        .write(event)
        .map_err(|e| DocumentError::Write(e.to_string()))
}

fn push_child(open: &mut [SvgElement], node: SvgNode) {
    // content outside of the root element (prolog comments etc.) is dropped
    if let Some(parent) = open.last_mut() {
        parent.children.push(node);
    }
}

impl SvgElement {
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Looks up an unprefixed attribute
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.prefix.is_none() && a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &SvgElement> {
        self.children.iter().filter_map(|node| match node {
            SvgNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn first_element_child(&self) -> Option<&SvgElement> {
        self.child_elements().next()
    }

    /// Concatenated text of this element and its descendants
    pub fn text(&self) -> String {
        self.children
            .iter()
            .map(|node| match node {
                SvgNode::Element(element) => element.text(),
                SvgNode::Text(text) | SvgNode::CData(text) => text.clone(),
                _ => String::new(),
            })
            .collect()
    }

    fn first_element_child_index(&self) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, SvgNode::Element(_)))
    }

    fn set_attribute(&mut self, local_name: &str, value: &str) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.prefix.is_none() && a.name.local_name == local_name)
        {
            Some(attribute) => attribute.value = value.to_string(),
            None => self.attributes.push(OwnedAttribute {
                name: OwnedName::local(local_name),
                value: value.to_string(),
            }),
        }
    }
}
