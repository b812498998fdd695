//! Owned, mutable element tree for one HTML fragment.
//!
//! `scraper` parses the markup; the result is copied into plain owned nodes so
//! rewriting passes can replace whole subtrees. Both directions walk the tree
//! with an explicit stack, so nesting depth never grows the call stack.

use ego_tree::iter::Edge;
use scraper::Html;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

/// An element: lowercase tag name, attributes in document order, children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First descendant (document order, excluding `self`) matching `predicate`.
    pub fn find_descendant(&self, predicate: impl Fn(&Element) -> bool) -> Option<&Element> {
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        while let Some(element) = stack.pop() {
            if predicate(element) {
                return Some(element);
            }
            let before = stack.len();
            stack.extend(element.child_elements());
            stack[before..].reverse();
        }
        None
    }
}

/// A parsed fragment: the top-level nodes in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

impl Fragment {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn parse(html: &str) -> Self {
        let document = Html::parse_fragment(html);
        let root = document.root_element();
        let root_id = root.id();

        // Bottom of the stack collects the fragment's top-level nodes.
        let mut open: Vec<Element> = vec![Element::default()];
        for edge in root.traverse() {
            match edge {
                Edge::Open(node) if node.id() != root_id => match node.value() {
                    scraper::Node::Element(element) => open.push(Element {
                        name: element.name().to_string(),
                        attrs: element
                            .attrs()
                            .map(|(key, value)| (key.to_string(), value.to_string()))
                            .collect(),
                        children: Vec::new(),
                    }),
                    scraper::Node::Text(text) => {
                        push_child(&mut open, Node::Text(text.text.to_string()))
                    }
                    scraper::Node::Comment(comment) => {
                        push_child(&mut open, Node::Comment(comment.comment.to_string()))
                    }
                    _ => {}
                },
                Edge::Close(node) if node.id() != root_id && node.value().is_element() => {
                    if open.len() > 1 {
                        if let Some(done) = open.pop() {
                            push_child(&mut open, Node::Element(done));
                        }
                    }
                }
                _ => {}
            }
        }

        let nodes = open.into_iter().next().map(|root| root.children).unwrap_or_default();
        Self { nodes }
    }

    /// Decoded text of every node, tags and comments dropped.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<&Node> = self.nodes.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => stack.extend(element.children.iter().rev()),
                Node::Comment(_) => {}
            }
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_nodes(&self.nodes, &mut out);
        out
    }
}

fn push_child(open: &mut [Element], node: Node) {
    if let Some(parent) = open.last_mut() {
        parent.children.push(node);
    }
}

enum Step<'a> {
    Visit(&'a Node),
    Close(&'a str),
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    let mut stack: Vec<Step<'_>> = nodes.iter().rev().map(Step::Visit).collect();
    while let Some(step) = stack.pop() {
        match step {
            Step::Close(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            Step::Visit(Node::Text(text)) => escape_text(text, out),
            Step::Visit(Node::Comment(comment)) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Step::Visit(Node::Element(element)) => {
                write_open_tag(element, out);
                let name = element.name.as_str();
                if VOID_ELEMENTS.contains(&name) {
                    continue;
                }
                if RAW_TEXT_ELEMENTS.contains(&name) {
                    for child in &element.children {
                        if let Node::Text(text) = child {
                            out.push_str(text);
                        }
                    }
                    stack.push(Step::Close(name));
                    continue;
                }
                stack.push(Step::Close(name));
                stack.extend(element.children.iter().rev().map(Step::Visit));
            }
        }
    }
}

fn write_open_tag(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}
