//! Company name extraction from Tally's XML replies.
//!
//! The reply is read with quick-xml into a small element tree. Attributes are
//! kept on their owning element under their plain name, so `<COMPANY NAME="x">`
//! and `<COMPANY><NAME>x</NAME></COMPANY>` both answer a lookup of `NAME`.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

const ROOT: &str = "ENVELOPE";
const COMPANY_PATH: [&str; 4] = ["BODY", "DATA", "COLLECTION", "COMPANY"];
const NAME_FIELD: &str = "NAME";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Malformed XML response: {0}")]
    Parse(String),

    #[error("Response did not contain an XML document")]
    Empty,
}

impl From<quick_xml::Error> for ExtractError {
    fn from(err: quick_xml::Error) -> Self {
        ExtractError::Parse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ExtractError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ExtractError::Parse(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Element, ExtractError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Element {
            name,
            attributes,
            ..Default::default()
        })
    }

    /// First child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn path(&self, segments: &[&str]) -> Option<&Element> {
        segments
            .iter()
            .try_fold(self, |element, segment| element.child(segment))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text of the child element `name`, falling back to an attribute of
    /// the same name. Empty values count as absent.
    pub fn child_text(&self, name: &str) -> Option<String> {
        let from_child = self.child(name).map(|c| c.text.trim().to_string());
        let from_attr = || self.attribute(name).map(|a| a.trim().to_string());

        from_child
            .filter(|t| !t.is_empty())
            .or_else(|| from_attr().filter(|t| !t.is_empty()))
    }
}

/// Parses a complete XML document and returns its root element.
pub fn parse_document(xml: &str) -> Result<Element, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                ensure_single_root(&root)?;
                stack.push(Element::open(&start)?);
            }
            Event::Empty(start) => {
                ensure_single_root(&root)?;
                let element = Element::open(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ExtractError::Parse("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                match stack.last_mut() {
                    Some(parent) => parent.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(ExtractError::Parse(
                            "text outside of the root element".to_string(),
                        ));
                    }
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ExtractError::Parse(format!("unclosed element <{}>", open.name)));
    }

    root.ok_or(ExtractError::Empty)
}

fn ensure_single_root(root: &Option<Element>) -> Result<(), ExtractError> {
    match root {
        Some(_) => Err(ExtractError::Parse(
            "more than one root element".to_string(),
        )),
        None => Ok(()),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Extracts `ENVELOPE/BODY/DATA/COLLECTION/COMPANY/NAME` from a company
/// collection reply. A missing segment is not an error, it yields `None`.
pub fn extract_company_name(xml: &str) -> Result<Option<String>, ExtractError> {
    let root = parse_document(xml)?;
    if root.name != ROOT {
        return Ok(None);
    }

    Ok(root
        .path(&COMPANY_PATH)
        .and_then(|company| company.child_text(NAME_FIELD)))
}
