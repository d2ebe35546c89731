//! Owned XML document tree.
//!
//! # Responsibilities
//! - Parse UTF-8 bodies into an element tree (quick-xml event reader)
//! - Keep qualified names, attributes and `xmlns` declarations as written
//! - Compute the namespace scope of any element on demand
//! - Serialize the tree back to text
//!
//! # Design Decisions
//! - No DTD processing or entity expansion beyond the predefined entities
//! - Whitespace text nodes inside the root are kept so serialization is faithful
//! - Non-UTF-8 documents are rejected

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

use super::{MessageError, MessageResult};

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// An element with its qualified name, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written (`wfs:Query`, `Query`).
    pub name: String,
    /// Attributes in document order, including `xmlns` declarations.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    declaration: Option<String>,
    root: XmlElement,
}

/// Prefix → URI bindings visible at one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceScope {
    default: Option<String>,
    prefixes: BTreeMap<String, String>,
}

fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map(|(_, local)| local).unwrap_or(qname)
}

fn prefix_part(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(prefix, _)| prefix)
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        prefix_part(&self.name)
    }

    /// Attribute value by qualified name, falling back to local name.
    /// Namespace declarations are never returned.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        let exact = self
            .attributes
            .iter()
            .find(|(k, _)| k == name && !is_namespace_declaration(k));
        exact
            .or_else(|| {
                self.attributes
                    .iter()
                    .filter(|(k, _)| !is_namespace_declaration(k))
                    .find(|(k, _)| local_part(k) == name)
            })
            .map(|(_, v)| v.as_str())
    }

    /// Sets (or adds) an attribute, keeping its position if it exists.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(index).1)
    }

    /// `xmlns` declarations made on this element: `(None, uri)` for the default namespace.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (Option<&str>, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some((None, v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (Some(p), v.as_str()))
            }
        })
    }

    /// Child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// All descendant elements in document order (self excluded).
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        fn walk<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
            for child in el.elements() {
                out.push(child);
                walk(child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    /// Concatenated text and CDATA content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        fn collect(el: &XmlElement, out: &mut String) {
            for child in &el.children {
                match child {
                    XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                    XmlNode::Element(e) => collect(e, out),
                    _ => {}
                }
            }
        }
        collect(self, &mut out);
        out
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(e) => e.write(out),
                XmlNode::Text(t) => out.push_str(&escape(t.as_str())),
                XmlNode::CData(t) => {
                    out.push_str("<![CDATA[");
                    out.push_str(t);
                    out.push_str("]]>");
                }
                XmlNode::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
                XmlNode::ProcessingInstruction(t) => {
                    out.push_str("<?");
                    out.push_str(t);
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

impl NamespaceScope {
    fn declare(&mut self, prefix: Option<&str>, uri: &str) {
        match prefix {
            None => self.default = Some(uri.to_string()),
            Some(p) => {
                self.prefixes.insert(p.to_string(), uri.to_string());
            }
        }
    }

    /// URI bound to `prefix`, or the default namespace for `None`.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            None => self.default.as_deref(),
            Some(p) => self.prefixes.get(p).map(String::as_str),
        }
    }

    /// Namespace URI of a qualified name such as `topp:states`.
    pub fn resolve_qname(&self, qname: &str) -> Option<&str> {
        self.resolve(prefix_part(qname))
    }
}

fn start_element(start: &BytesStart<'_>) -> MessageResult<XmlElement> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MessageError::Xml(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        Self {
            declaration: None,
            root,
        }
    }

    /// Parses a UTF-8 encoded body.
    pub fn parse(bytes: &[u8]) -> MessageResult<Self> {
        Self::parse_str(std::str::from_utf8(bytes)?)
    }

    pub fn parse_str(xml: &str) -> MessageResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut declaration = None;
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event()?;
            match event {
                Event::Decl(decl) => {
                    let version = decl.version()?;
                    let mut text = format!("<?xml version=\"{}\"", std::str::from_utf8(&version)?);
                    if let Some(encoding) = decl.encoding() {
                        let encoding = encoding.map_err(|e| MessageError::Xml(e.to_string()))?;
                        text.push_str(&format!(" encoding=\"{}\"", std::str::from_utf8(&encoding)?));
                    }
                    if let Some(standalone) = decl.standalone() {
                        let standalone = standalone.map_err(|e| MessageError::Xml(e.to_string()))?;
                        text.push_str(&format!(" standalone=\"{}\"", std::str::from_utf8(&standalone)?));
                    }
                    text.push_str("?>");
                    declaration = Some(text);
                }
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(MessageError::Xml("content after the root element".into()));
                    }
                    stack.push(start_element(&start)?);
                }
                Event::Empty(start) => {
                    let element = start_element(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Element(element)),
                        None if root.is_none() => root = Some(element),
                        None => return Err(MessageError::Xml("multiple root elements".into())),
                    }
                }
                Event::End(_) => {
                    // end-name mismatches are rejected by the reader itself
                    let element = stack
                        .pop()
                        .ok_or_else(|| MessageError::Xml("unexpected closing tag".into()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape()?.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text)),
                        None if text.trim().is_empty() => {}
                        None => return Err(MessageError::Xml("text outside the root element".into())),
                    }
                }
                Event::CData(data) => {
                    let text = std::str::from_utf8(&data)?.to_string();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::CData(text)),
                        None => return Err(MessageError::Xml("CDATA outside the root element".into())),
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::Comment(std::str::from_utf8(&comment)?.to_string()));
                    }
                }
                Event::PI(pi) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(XmlNode::ProcessingInstruction(std::str::from_utf8(&pi)?.to_string()));
                    }
                }
                Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(MessageError::Xml(format!("unclosed element <{}>", open.name)));
        }
        let root = root.ok_or_else(|| MessageError::Xml("document has no root element".into()))?;
        Ok(Self { declaration, root })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    /// Namespace bindings in effect at `target`, which must belong to this document.
    pub fn namespace_scope(&self, target: &XmlElement) -> Option<NamespaceScope> {
        fn find_path<'a>(el: &'a XmlElement, target: &XmlElement, path: &mut Vec<&'a XmlElement>) -> bool {
            path.push(el);
            if std::ptr::eq(el, target) {
                return true;
            }
            for child in el.elements() {
                if find_path(child, target, path) {
                    return true;
                }
            }
            path.pop();
            false
        }

        let mut path = Vec::new();
        if !find_path(&self.root, target, &mut path) {
            return None;
        }
        let mut scope = NamespaceScope::default();
        for el in path {
            for (prefix, uri) in el.namespace_declarations() {
                scope.declare(prefix, uri);
            }
        }
        Some(scope)
    }

    /// Serializes the document, keeping the original XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if let Some(decl) = &self.declaration {
            out.push_str(decl);
        }
        self.root.write(&mut out);
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_FEATURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs" service="WFS" version="1.1.0">
  <wfs:Query typeName="topp:states" xmlns:topp="http://www.openplans.org/topp">
    <ogc:Filter xmlns:ogc="http://www.opengis.net/ogc"><ogc:FeatureId fid="states.1"/></ogc:Filter>
  </wfs:Query>
</wfs:GetFeature>"#;

    #[test]
    fn test_parse_names_and_attributes() {
        let doc = XmlDocument::parse_str(GET_FEATURE).unwrap();
        let root = doc.root();
        assert_eq!(root.name, "wfs:GetFeature");
        assert_eq!(root.local_name(), "GetFeature");
        assert_eq!(root.prefix(), Some("wfs"));
        assert_eq!(root.attribute("service"), Some("WFS"));
        // declarations are not regular attributes
        assert_eq!(root.attribute("wfs"), None);

        let query = root.elements().next().unwrap();
        assert_eq!(query.attribute("typeName"), Some("topp:states"));
        assert_eq!(root.descendants().len(), 3);
    }

    #[test]
    fn test_namespace_scope_is_per_element() {
        let doc = XmlDocument::parse_str(GET_FEATURE).unwrap();
        let query = doc.root().elements().next().unwrap();

        let root_scope = doc.namespace_scope(doc.root()).unwrap();
        assert_eq!(root_scope.resolve(Some("topp")), None);

        let query_scope = doc.namespace_scope(query).unwrap();
        assert_eq!(query_scope.resolve_qname("topp:states"), Some("http://www.openplans.org/topp"));
        assert_eq!(query_scope.resolve(Some("wfs")), Some("http://www.opengis.net/wfs"));

        let other = XmlElement::new("Query");
        assert!(doc.namespace_scope(&other).is_none());
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(XmlDocument::parse_str("<a><b></a>").is_err());
        assert!(XmlDocument::parse_str("<a>").is_err());
        assert!(XmlDocument::parse_str("").is_err());
        assert!(XmlDocument::parse_str("<a/><b/>").is_err());
        assert!(XmlDocument::parse_str("just text").is_err());
        assert!(XmlDocument::parse(&[0x3c, 0x61, 0xff, 0x3e]).is_err());
    }

    #[test]
    fn test_serialize_after_edit() {
        let mut doc = XmlDocument::parse_str(r#"<?xml version="1.0"?><a x="1"><b>t &amp; u</b><c/></a>"#).unwrap();
        doc.root_mut().set_attribute("x", "<2>");
        let b = doc.root_mut().elements_mut().next().unwrap();
        b.set_text("v");
        assert_eq!(
            doc.to_xml(),
            r#"<?xml version="1.0"?><a x="&lt;2&gt;"><b>v</b><c/></a>"#
        );
    }

    #[test]
    fn test_text_collects_cdata() {
        let doc = XmlDocument::parse_str("<a>x<![CDATA[<y>]]><b>z</b></a>").unwrap();
        assert_eq!(doc.root().text(), "x<y>z");
    }
}
