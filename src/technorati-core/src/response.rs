//! XML response tree, parsing and API-level error classification.
//!
//! Every reply has the shape `<document><result>...</result></document>`,
//! usually wrapped in a `<tapi>` root element. A `<result><error>` child
//! signals a failed call even when the HTTP status was 200.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One XML element with its attributes, text content and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a path of child names, taking the first match at each step.
    pub fn find(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Text of the node at `path`.
    pub fn text_of(&self, path: &[&str]) -> Option<&str> {
        self.find(path).map(|n| n.text.as_str())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// No text, no attributes and no children.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attributes.is_empty() && self.children.is_empty()
    }

    /// Trimmed text of this node and all descendants, in document order,
    /// joined by single spaces.
    pub fn descendant_text(&self) -> String {
        let mut parts = Vec::new();
        collect_text(self, &mut parts);
        parts.join(" ")
    }
}

fn collect_text<'a>(node: &'a XmlNode, parts: &mut Vec<&'a str>) {
    let text = node.text.trim();
    if !text.is_empty() {
        parts.push(text);
    }
    for child in &node.children {
        collect_text(child, parts);
    }
}

/// A fully materialised response document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub root: XmlNode,
}

impl ParsedResponse {
    /// Parse a raw response body.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let xml = std::str::from_utf8(body)
            .map_err(|e| Error::MalformedResponse(format!("body is not UTF-8: {e}")))?;
        let root = parse_tree(xml)?;
        Ok(Self { root })
    }

    /// The `document` node: the root itself or one of its direct children.
    pub fn document(&self) -> Option<&XmlNode> {
        if self.root.name == "document" {
            Some(&self.root)
        } else {
            self.root.child("document")
        }
    }

    pub fn result(&self) -> Option<&XmlNode> {
        self.document().and_then(|d| d.child("result"))
    }

    /// Text of a direct child of `result`, e.g. `result_text("url")`.
    pub fn result_text(&self, field: &str) -> Option<&str> {
        self.result()
            .and_then(|r| r.child(field))
            .map(|n| n.text.as_str())
    }

    /// Every `item` element of the document.
    pub fn items(&self) -> impl Iterator<Item = &XmlNode> {
        self.document()
            .into_iter()
            .flat_map(|d| d.children_named("item"))
    }
}

fn element(start: &BytesStart<'_>) -> Result<XmlNode> {
    let mut node = XmlNode::new(String::from_utf8_lossy(start.local_name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::MalformedResponse(format!("bad attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::MalformedResponse(format!("bad attribute value: {e}")))?;
        node.attributes.push((key, value.to_string()));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, mut node: XmlNode) -> Result<()> {
    // Whitespace around the content goes; whitespace inside mixed content stays.
    let trimmed = node.text.trim();
    if trimmed.len() != node.text.len() {
        node.text = trimmed.to_string();
    }
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => {
            return Err(Error::MalformedResponse(
                "multiple root elements".to_string(),
            ))
        }
    }
    Ok(())
}

fn parse_tree(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element(&e)?),
            Ok(Event::Empty(e)) => {
                let node = element(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| {
                    Error::MalformedResponse("unbalanced closing tag".to_string())
                })?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::MalformedResponse(format!("bad text: {e}")))?;
                match stack.last_mut() {
                    Some(node) => node.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(Error::MalformedResponse(
                            "text outside the root element".to_string(),
                        ))
                    }
                }
            }
            Ok(Event::CData(e)) => match stack.last_mut() {
                Some(node) => node.text.push_str(&String::from_utf8_lossy(&e.into_inner())),
                None => {
                    return Err(Error::MalformedResponse(
                        "CDATA outside the root element".to_string(),
                    ))
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::MalformedResponse(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::MalformedResponse(
            "document ended inside an open element".to_string(),
        ));
    }
    root.ok_or_else(|| Error::MalformedResponse("empty document".to_string()))
}

/// Reject responses that carry an embedded error or lack the fixed shape.
pub fn classify(parsed: ParsedResponse) -> Result<ParsedResponse> {
    let result = parsed.result().ok_or_else(|| {
        Error::MalformedResponse("response has no document/result element".to_string())
    })?;

    if let Some(error) = result.child("error") {
        if !error.is_empty() {
            return Err(Error::Api {
                message: error_message(error),
            });
        }
    }

    Ok(parsed)
}

/// Descendant text of an error node, else its attributes, else its child names.
fn error_message(error: &XmlNode) -> String {
    let text = error.descendant_text();
    if !text.is_empty() {
        return text;
    }
    if !error.attributes.is_empty() {
        return error
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
    }
    error
        .children
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Daily usage counters reported by the keyinfo query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub api_queries: u32,
    pub max_queries: u32,
}

impl KeyInfo {
    pub fn from_response(response: &ParsedResponse) -> Result<Self> {
        Ok(Self {
            api_queries: counter(response, "apiqueries")?,
            max_queries: counter(response, "maxqueries")?,
        })
    }

    pub fn remaining(&self) -> u32 {
        self.max_queries.saturating_sub(self.api_queries)
    }
}

fn counter(response: &ParsedResponse, field: &str) -> Result<u32> {
    let raw = response
        .result_text(field)
        .ok_or_else(|| Error::MalformedResponse(format!("keyinfo result has no {field}")))?;
    raw.trim()
        .parse()
        .map_err(|_| Error::MalformedResponse(format!("keyinfo {field} is not a number: {raw:?}")))
}
