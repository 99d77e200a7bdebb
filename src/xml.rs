use crate::error::{KdbxError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Attribute marking a node whose text content is stream-cipher protected
pub const PROTECTED_ATTR: &str = "Protected";

/// A generic attributed document node: element name, attribute map, text
/// content and child nodes. The engine never interprets the semantic schema
/// of the tree; it only reads and writes nodes.
///
/// Text content is UTF-8 by construction. Protected values must therefore
/// unlock to valid UTF-8 text; a protected payload of arbitrary bytes is
/// rejected at load time rather than stored lossily.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Value of an attribute by name, if present
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this node's text content is stream-cipher protected
    pub fn is_protected(&self) -> bool {
        self.attribute(PROTECTED_ATTR) == Some("True")
    }
}

/// Visit every protected node of the tree in one fixed deterministic
/// pre-order traversal.
///
/// Both the lock and unlock paths go through this single visitor, so their
/// traversal order is identical by construction. The order matters: the
/// stream cipher consumes one continuous keystream across all fields.
pub fn for_each_protected<F>(node: &mut XmlNode, visit: &mut F) -> Result<()>
where
    F: FnMut(&mut XmlNode) -> Result<()>,
{
    if node.is_protected() {
        visit(node)?;
    }
    for child in &mut node.children {
        for_each_protected(child, visit)?;
    }
    Ok(())
}

/// Parse a byte buffer into a document tree
pub fn parse(bytes: &[u8]) -> Result<XmlNode> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    reader.config_mut().expand_empty_elements = true;

    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|err| KdbxError::Parse(err.to_string()))?
        {
            Event::Start(start) => {
                stack.push(node_from_start(&start)?);
            }
            Event::Text(text) => {
                let unescaped = text
                    .unescape()
                    .map_err(|err| KdbxError::Parse(err.to_string()))?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| {
                    KdbxError::Parse("Unbalanced closing element in document".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None if root.is_none() => root = Some(node),
                    None => {
                        return Err(KdbxError::Parse(
                            "Document has more than one root element".to_string(),
                        ))
                    }
                }
            }
            // Not reachable with expand_empty_elements, kept for completeness
            Event::Empty(start) => {
                let node = node_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None if root.is_none() => root = Some(node),
                    None => {
                        return Err(KdbxError::Parse(
                            "Document has more than one root element".to_string(),
                        ))
                    }
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(KdbxError::Parse(
            "Document ended with unclosed elements".to_string(),
        ));
    }
    root.ok_or_else(|| KdbxError::Parse("Document has no root element".to_string()))
}

fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode> {
    let mut node = XmlNode::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|err| KdbxError::Parse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| KdbxError::Parse(err.to_string()))?
            .into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

/// Serialize a document tree back to bytes
pub fn serialize(root: &XmlNode) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|err| KdbxError::Parse(err.to_string()))?;
    write_node(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|err| KdbxError::Parse(err.to_string()))?;

    if !node.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&node.text)))
            .map_err(|err| KdbxError::Parse(err.to_string()))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
        .map_err(|err| KdbxError::Parse(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_node(text: &str, protected: bool) -> XmlNode {
        let mut node = XmlNode::new("Value");
        if protected {
            node.attributes
                .push((PROTECTED_ATTR.to_string(), "True".to_string()));
        }
        node.text = text.to_string();
        node
    }

    fn sample_tree() -> XmlNode {
        let mut entry = XmlNode::new("Entry");
        entry.children.push(value_node("first", true));
        entry.children.push(value_node("plain", false));

        let mut nested = XmlNode::new("History");
        nested.children.push(value_node("second", true));
        entry.children.push(nested);

        let mut root = XmlNode::new("KeePassFile");
        root.children.push(entry);
        root.children.push(value_node("third", true));
        root
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let tree = sample_tree();
        let bytes = serialize(&tree).unwrap();
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed, tree);
    }

    #[test]
    fn test_text_escaping_roundtrip() {
        let mut root = XmlNode::new("Root");
        root.text = "a < b && \"c\" > d".to_string();
        let bytes = serialize(&root).unwrap();
        assert_eq!(parse(&bytes).unwrap(), root);
    }

    #[test]
    fn test_parse_handwritten_document() {
        let doc = b"<?xml version=\"1.0\"?>\n<Root>\n  <Child Protected=\"True\">dGV4dA==</Child>\n</Root>";
        let tree = parse(doc).unwrap();
        assert_eq!(tree.name, "Root");
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].is_protected());
        assert_eq!(tree.children[0].text, "dGV4dA==");
    }

    #[test]
    fn test_empty_element_becomes_node() {
        let tree = parse(b"<Root><Empty/></Root>").unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "Empty");
        assert!(tree.children[0].text.is_empty());
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        let result = parse(b"<Root><Unclosed></Root>");
        assert!(matches!(result, Err(KdbxError::Parse(_))));
    }

    #[test]
    fn test_protected_traversal_is_preorder() {
        let mut tree = sample_tree();
        let mut seen = Vec::new();
        for_each_protected(&mut tree, &mut |node| {
            seen.push(node.text.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, ["first", "second", "third"]);
    }

    #[test]
    fn test_protected_traversal_can_mutate() {
        let mut tree = sample_tree();
        for_each_protected(&mut tree, &mut |node| {
            node.text = node.text.to_uppercase();
            Ok(())
        })
        .unwrap();

        let mut seen = Vec::new();
        for_each_protected(&mut tree, &mut |node| {
            seen.push(node.text.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, ["FIRST", "SECOND", "THIRD"]);
    }
}
