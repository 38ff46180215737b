//! A minimal, namespace-stripped XML tree used to anchor extraction of the
//! small set of elements the envelope layer and the builders in
//! `htng-xml` care about. Not a general-purpose DOM: attribute and text
//! order is not preserved beyond what callers need, and namespace
//! declarations are discarded after matching local names.
//!
//! Mirrors the manual `quick_xml::Reader` event scan used in the pack's
//! ONVIF SOAP example rather than pulling in a full XML-to-struct mapper,
//! since HTNG payloads are shallow and the same small set of anchor
//! elements recurs across every message kind.

use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == local_name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, local_name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == local_name)
    }

    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == local_name)
    }

    /// Depth-first search for the first descendant (including self) with
    /// the given local name.
    pub fn find(&self, local_name: &str) -> Option<&XmlNode> {
        if self.name == local_name {
            return Some(self);
        }
        for child in &self.children {
            if let Some(found) = child.find(local_name) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first collection of every descendant (including self) with
    /// the given local name.
    pub fn find_all(&self, local_name: &str, out: &mut Vec<&XmlNode>) {
        if self.name == local_name {
            out.push(self);
        }
        for child in &self.children {
            child.find_all(local_name, out);
        }
    }

    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("xml parse error: {0}")]
pub struct XmlParseError(pub String);

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    match s.find(':') {
        Some(idx) => s[idx + 1..].to_string(),
        None => s.to_string(),
    }
}

/// Parse an XML document into a single root `XmlNode`. If the document has
/// more than one top-level element only the first is returned (HTNG/SOAP
/// documents always have exactly one root).
pub fn parse(xml: &str) -> Result<XmlNode, XmlParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let node = XmlNode {
                    name: local_name(e.name().as_ref()),
                    attrs: e
                        .attributes()
                        .flatten()
                        .map(|a| {
                            (
                                local_name(a.key.as_ref()),
                                String::from_utf8_lossy(&a.value).to_string(),
                            )
                        })
                        .collect(),
                    text: String::new(),
                    children: Vec::new(),
                };
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = XmlNode {
                    name: local_name(e.name().as_ref()),
                    attrs: e
                        .attributes()
                        .flatten()
                        .map(|a| {
                            (
                                local_name(a.key.as_ref()),
                                String::from_utf8_lossy(&a.value).to_string(),
                            )
                        })
                        .collect(),
                    text: String::new(),
                    children: Vec::new(),
                };
                push_finished(&mut stack, &mut root, node);
            }
            Ok(Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    push_finished(&mut stack, &mut root, node);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape().map_err(|err| XmlParseError(err.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlParseError(e.to_string())),
            _ => {}
        }
    }

    root.ok_or_else(|| XmlParseError("no root element found".to_string()))
}

fn push_finished(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_strips_namespaces() {
        let xml = r#"<s:Envelope xmlns:s="http://example.com"><s:Body><ns:Foo a="1"><Bar>hi</Bar></ns:Foo></s:Body></s:Envelope>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "Envelope");
        let foo = root.find("Foo").unwrap();
        assert_eq!(foo.attr("a"), Some("1"));
        assert_eq!(foo.child("Bar").unwrap().text_trimmed(), "hi");
    }

    #[test]
    fn find_all_collects_repeated_elements() {
        let xml = r#"<Errors><Error Code="VAL1">a</Error><Error Code="VAL2">b</Error></Errors>"#;
        let root = parse(xml).unwrap();
        let mut errors = Vec::new();
        root.find_all("Error", &mut errors);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].attr("Code"), Some("VAL1"));
    }
}
