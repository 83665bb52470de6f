use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A node of a parsed TEI tree.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with its namespace prefix stripped from the tag and attribute names.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Parse markup into a tree and return its outermost element.
    ///
    /// Parsing never fails: on malformed input everything read before the
    /// error is kept, and input without any element yields an empty element.
    pub fn parse(xml: &str) -> Element {
        let mut reader = Reader::from_str(xml);
        // The bottom of the stack is a synthetic document node.
        let mut stack: Vec<Element> = vec![Element::default()];

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => stack.push(open_element(e)),
                Ok(Event::Empty(ref e)) => {
                    let element = open_element(e);
                    append(&mut stack, Node::Element(element));
                }
                Ok(Event::End(_)) => close_top(&mut stack),
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    append(&mut stack, Node::Text(text));
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    append(&mut stack, Node::Text(text));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    warn!(
                        "Malformed markup at byte {}, keeping partial tree: {}",
                        reader.buffer_position(),
                        e
                    );
                    break;
                }
                _ => {}
            }
        }

        while stack.len() > 1 {
            close_top(&mut stack);
        }

        let document = stack.pop().unwrap_or_default();
        document
            .children
            .into_iter()
            .find_map(|node| match node {
                Node::Element(element) => Some(element),
                Node::Text(_) => None,
            })
            .unwrap_or_default()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// All elements matching a slash-separated path of local names, in
    /// document order. An empty segment (`a//b`) matches at any depth.
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let mut current: Vec<&Element> = vec![self];
        let mut any_depth = false;

        for segment in path.split('/') {
            if segment.is_empty() {
                any_depth = true;
                continue;
            }

            let mut next = Vec::new();
            for element in current {
                if any_depth {
                    let mut descendants = Vec::new();
                    for child in element.child_elements() {
                        child.collect_preorder(&mut descendants);
                    }
                    next.extend(descendants.into_iter().filter(|e| e.name == segment));
                } else {
                    next.extend(element.child_elements().filter(|e| e.name == segment));
                }
            }

            current = next;
            any_depth = false;
            if current.is_empty() {
                break;
            }
        }

        current
    }

    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// This element and all its descendants in document order.
    pub fn preorder(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_preorder(&mut out);
        out
    }

    fn collect_preorder<'a>(&'a self, out: &mut Vec<&'a Element>) {
        out.push(self);
        for child in self.child_elements() {
            child.collect_preorder(out);
        }
    }

    /// Text of the whole subtree as one string with whitespace runs collapsed.
    /// Text nodes are concatenated as they appear, so inline markup inside a
    /// word does not split it.
    pub fn text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        collapse_whitespace(&parts.concat())
    }

    fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push(text),
                Node::Element(element) => element.collect_text(out),
            }
        }
    }

    /// Text directly inside this element, ignoring child elements.
    pub fn own_text(&self) -> String {
        let parts: Vec<&str> = self
            .children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect();
        collapse_whitespace(&parts.concat())
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn open_element(start: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect();

    Element {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn append(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn close_top(stack: &mut Vec<Element>) {
    if stack.len() > 1 {
        if let Some(element) = stack.pop() {
            append(stack, Node::Element(element));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_namespace_prefixes() {
        let root = Element::parse(
            r#"<tei:TEI xmlns:tei="http://www.tei-c.org/ns/1.0"><tei:teiHeader xml:lang="en"/></tei:TEI>"#,
        );
        assert_eq!(root.name, "TEI");
        let header = root.find("teiHeader").unwrap();
        assert_eq!(header.attr("lang"), Some("en"));
    }

    #[test]
    fn test_find_all_any_depth() {
        let root = Element::parse("<r><a><x><b>1</b></x></a><a><b>2</b></a></r>");
        let texts: Vec<String> = root.find_all("a//b").iter().map(|e| e.text()).collect();
        assert_eq!(texts, vec!["1", "2"]);
        assert_eq!(root.find_all("a/b").len(), 1);
    }

    #[test]
    fn test_text_flattens_and_collapses() {
        let root = Element::parse("<r><p>Deep\n   <hi>graph</hi></p><p> models &amp; more</p></r>");
        assert_eq!(root.text(), "Deep graph models & more");
        assert_eq!(root.find("p").unwrap().own_text(), "Deep");
    }

    #[test]
    fn test_inline_markup_does_not_split_words() {
        let root = Element::parse("<title>H<sub>2</sub>O transport as shown<ref>[1]</ref>.</title>");
        assert_eq!(root.text(), "H2O transport as shown[1].");

        let root = Element::parse("<p>Thanks <ref>x</ref> to all</p>");
        assert_eq!(root.own_text(), "Thanks to all");
    }

    #[test]
    fn test_malformed_keeps_partial_tree() {
        let root = Element::parse("<r><title>Kept</title><open></r>");
        assert_eq!(root.find("title").map(|t| t.text()), Some("Kept".to_string()));
    }

    #[test]
    fn test_no_markup_yields_empty_element() {
        let root = Element::parse("just some text");
        assert!(root.name.is_empty());
        assert!(root.children.is_empty());
    }
}
