//! Generic XML tree.
//!
//! Every element becomes a mapping from child tag name to the ordered list of
//! child nodes, with attributes and text content kept beside it. Elements that
//! carry neither attributes nor child elements collapse to their text, so a
//! leaf like `<SUBJECT>Napa Valley.</SUBJECT>` is a plain [`Node::Text`].

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum XmlError {
    /// The reader rejected the markup.
    #[error("malformed markup at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    /// An attribute is malformed or its value cannot be unescaped.
    #[error("invalid attribute on <{element}>: {message}")]
    Attribute { element: String, message: String },

    /// A tag or attribute name is not UTF-8.
    #[error("tag name is not valid UTF-8")]
    Name,

    /// A closing tag with no matching open element.
    #[error("unexpected closing tag </{0}>")]
    UnexpectedEnd(String),

    /// End of input while an element is still open.
    #[error("document ended inside <{0}>")]
    Unclosed(String),

    /// No element at all, e.g. an empty or whitespace-only body.
    #[error("document has no root element")]
    MissingRoot,

    /// A second top-level element follows the root.
    #[error("content after the root element <{0}>")]
    TrailingContent(String),

    /// Non-whitespace text at the top level.
    #[error("text outside the root element: {0:?}")]
    StrayText(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub attrs: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: BTreeMap<String, Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
}

impl Node {
    /// Text content, whichever representation the node collapsed to.
    pub fn text(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(element) => element.text.as_deref(),
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Text(_) => None,
            Node::Element(element) => Some(element),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.as_element()?.attrs.get(name).map(String::as_str)
    }

    /// All children with the given tag, in document order.
    pub fn children(&self, tag: &str) -> Option<&[Node]> {
        self.as_element()?.children.get(tag).map(Vec::as_slice)
    }

    pub fn child(&self, tag: &str, index: usize) -> Option<&Node> {
        self.children(tag)?.get(index)
    }
}

/// A parsed document: the root tag and its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlTree {
    pub root_name: String,
    pub root: Node,
}

impl XmlTree {
    /// The root node, if the document's root tag is `name`.
    pub fn root(&self, name: &str) -> Option<&Node> {
        (self.root_name == name).then_some(&self.root)
    }
}

struct OpenElement {
    name: String,
    element: Element,
    text: String,
}

pub fn parse_document(xml: &[u8]) -> Result<XmlTree, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, Node)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| syntax(&reader, err))?;
        match event {
            Event::Start(start) => {
                reject_trailing(&stack, &root)?;
                stack.push(open_element(&start)?);
            }
            Event::Empty(start) => {
                reject_trailing(&stack, &root)?;
                let open = open_element(&start)?;
                close_element(open, &mut stack, &mut root);
            }
            Event::End(end) => {
                let name = decode_name(end.name().as_ref())?;
                match stack.pop() {
                    Some(open) if open.name == name => {
                        close_element(open, &mut stack, &mut root)
                    }
                    _ => return Err(XmlError::UnexpectedEnd(name)),
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|err| syntax(&reader, err))?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&raw))?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Unclosed(open.name.clone()));
    }
    let (root_name, root) = root.ok_or(XmlError::MissingRoot)?;
    Ok(XmlTree { root_name, root })
}

fn syntax(reader: &Reader<&[u8]>, err: impl Display) -> XmlError {
    XmlError::Syntax {
        position: reader.buffer_position() as u64,
        message: err.to_string(),
    }
}

fn decode_name(raw: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(raw)
        .map(ToOwned::to_owned)
        .map_err(|_| XmlError::Name)
}

fn reject_trailing(
    stack: &[OpenElement],
    root: &Option<(String, Node)>,
) -> Result<(), XmlError> {
    match root {
        Some((name, _)) if stack.is_empty() => Err(XmlError::TrailingContent(name.clone())),
        _ => Ok(()),
    }
}

fn open_element(start: &BytesStart<'_>) -> Result<OpenElement, XmlError> {
    let name = decode_name(start.name().as_ref())?;
    let mut element = Element::default();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| XmlError::Attribute {
            element: name.clone(),
            message: err.to_string(),
        })?;
        let key = decode_name(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Attribute {
                element: name.clone(),
                message: err.to_string(),
            })?
            .into_owned();
        element.attrs.insert(key, value);
    }
    Ok(OpenElement {
        name,
        element,
        text: String::new(),
    })
}

fn push_text(stack: &mut [OpenElement], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::StrayText(text.trim().to_string())),
    }
}

fn close_element(open: OpenElement, stack: &mut [OpenElement], root: &mut Option<(String, Node)>) {
    let OpenElement {
        name,
        mut element,
        text,
    } = open;
    let text = text.trim();
    let node = if element.attrs.is_empty() && element.children.is_empty() {
        Node::Text(text.to_string())
    } else {
        if !text.is_empty() {
            element.text = Some(text.to_string());
        }
        Node::Element(element)
    };

    match stack.last_mut() {
        Some(parent) => parent.element.children.entry(name).or_default().push(node),
        None => *root = Some((name, node)),
    }
}
