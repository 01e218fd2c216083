//! Minimal element tree for the signature part-files.
//!
//! Both part-files are small and fully rewritten on every change, so they are
//! read into a tree and written back from one. Element and attribute names
//! are stored without their namespace prefix; every element is written with
//! the `ofd:` prefix and the root carries the namespace declaration.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{xml_error, Error, Result};

/// OFD namespace URI.
pub const OFD_NAMESPACE: &str = "http://www.ofdspec.org/2016";

const PREFIX: &str = "ofd";

/// One XML element.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.push((key.to_string(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn required_attr(&self, key: &str) -> Result<&str> {
        self.attr(key)
            .ok_or_else(|| Error::Xml(format!("<{}> lacks attribute {}", self.name, key)))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn required_child(&self, name: &str) -> Result<&XmlElement> {
        self.child(name)
            .ok_or_else(|| Error::Xml(format!("<{}> lacks child <{}>", self.name, name)))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of a required child.
    pub fn child_text(&self, name: &str) -> Result<&str> {
        Ok(self.required_child(name)?.text.trim())
    }

    /// Serialize as a standalone document.
    pub fn to_document(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        self.write(&mut writer, true)?;
        Ok(writer.into_inner())
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>, root: bool) -> Result<()> {
        let qname = format!("{}:{}", PREFIX, self.name);
        let mut start = BytesStart::new(qname.as_str());
        if root {
            start.push_attribute(("xmlns:ofd", OFD_NAMESPACE));
        }
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write(writer, false)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(qname.as_str())))
            .map_err(xml_error)
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(&String::from_utf8_lossy(start.local_name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr.unescape_value().map_err(xml_error)?.to_string();
        element.attributes.push((name, value));
    }
    Ok(element)
}

/// Parse a document into its root element.
pub(crate) fn parse_tree(bytes: &[u8]) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => stack.push(element_from(&e)?),
            Event::Empty(e) => {
                let element = element_from(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.push(element),
                    None => root = root.or(Some(element)),
                }
            },
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape().map_err(xml_error)?);
                }
            },
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            },
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.push(element),
                    None => root = root.or(Some(element)),
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }

    if !stack.is_empty() {
        return Err(Error::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::Xml("document has no root element".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_parse() {
        let tree = XmlElement::new("Signatures")
            .with_child(XmlElement::new("MaxSignId").with_text("s001"))
            .with_child(
                XmlElement::new("Signature")
                    .with_attr("ID", "s001")
                    .with_attr("BaseLoc", "Sign_0/Signature.xml"),
            );
        let bytes = tree.to_document().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("xmlns:ofd=\"http://www.ofdspec.org/2016\""));
        assert!(text.contains("<ofd:MaxSignId>s001</ofd:MaxSignId>"));

        let parsed = parse_tree(&bytes).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn test_parse_ignores_prefixes() {
        let xml = br#"<?xml version="1.0"?>
            <x:Signature xmlns:x="http://www.ofdspec.org/2016">
              <x:SignedValue>/Doc_0/Signs/Sign_0/SignedValue.dat</x:SignedValue>
              <x:ExclusionWindow x:FileRef="a" Offset="0" Length="4"/>
            </x:Signature>"#;
        let root = parse_tree(xml).unwrap();
        assert_eq!(root.name, "Signature");
        assert_eq!(root.child_text("SignedValue").unwrap(), "/Doc_0/Signs/Sign_0/SignedValue.dat");
        let window = root.required_child("ExclusionWindow").unwrap();
        assert_eq!(window.attr("FileRef"), Some("a"));
        assert_eq!(window.attr("Length"), Some("4"));
    }

    #[test]
    fn test_text_is_escaped() {
        let tree = XmlElement::new("Provider").with_attr("Company", "A & B <Ltd>");
        let bytes = tree.to_document().unwrap();
        assert_eq!(parse_tree(&bytes).unwrap().attr("Company"), Some("A & B <Ltd>"));
    }

    #[test]
    fn test_truncated_document_rejected() {
        assert!(matches!(parse_tree(b"<ofd:Signatures><ofd:Signature>"), Err(Error::Xml(_))));
        assert!(matches!(parse_tree(b""), Err(Error::Xml(_))));
    }

    #[test]
    fn test_missing_child_reported() {
        let root = XmlElement::new("Signature");
        let err = root.required_child("SignedInfo").unwrap_err();
        assert!(err.to_string().contains("SignedInfo"));
    }
}
