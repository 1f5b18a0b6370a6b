//! Flat, document-ordered view of a parsed HTML tree
//!
//! Every node (including attributes) gets an index in document order, so
//! node-sets are plain sorted index lists and descendants of a node occupy
//! a contiguous index range.

use scraper::{ElementRef, Html, Node};

pub(crate) const ROOT: usize = 0;

#[derive(Debug, Clone, Copy)]
pub(crate) enum NodeKind<'a> {
    Root,
    Element(ElementRef<'a>),
    Attribute { name: &'a str, value: &'a str },
    Text(&'a str),
    Comment(&'a str),
}

#[derive(Debug)]
pub(crate) struct DomNode<'a> {
    pub kind: NodeKind<'a>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub attributes: Vec<usize>,
    /// One past the last index belonging to this node's subtree
    pub end: usize,
}

#[derive(Debug)]
pub(crate) struct Dom<'a> {
    document: &'a Html,
    nodes: Vec<DomNode<'a>>,
}

impl<'a> Dom<'a> {
    pub fn build(document: &'a Html) -> Self {
        let mut dom = Dom {
            document,
            nodes: vec![DomNode {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
                attributes: Vec::new(),
                end: 0,
            }],
        };

        let mut stack = vec![(ROOT, document.tree.root().children())];
        while let Some((parent, children)) = stack.last_mut() {
            let parent = *parent;
            let Some(child) = children.next() else {
                stack.pop();
                continue;
            };

            match child.value() {
                Node::Element(element) => {
                    if let Some(element_ref) = ElementRef::wrap(child) {
                        let id = dom.push(parent, NodeKind::Element(element_ref));
                        for (name, value) in element.attrs() {
                            let attr = dom.push_detached(id, NodeKind::Attribute { name, value });
                            dom.nodes[id].attributes.push(attr);
                        }
                        stack.push((id, child.children()));
                    }
                }
                Node::Text(text) => {
                    dom.push(parent, NodeKind::Text(text));
                }
                Node::Comment(comment) => {
                    dom.push(parent, NodeKind::Comment(comment));
                }
                _ => {}
            }
        }

        dom.compute_ends();
        dom
    }

    fn push_detached(&mut self, parent: usize, kind: NodeKind<'a>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(DomNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
            end: id + 1,
        });
        id
    }

    fn push(&mut self, parent: usize, kind: NodeKind<'a>) -> usize {
        let id = self.push_detached(parent, kind);
        self.nodes[parent].children.push(id);
        id
    }

    fn compute_ends(&mut self) {
        for id in (0..self.nodes.len()).rev() {
            let node = &self.nodes[id];
            let end = node
                .children
                .last()
                .map(|&last| self.nodes[last].end)
                .or_else(|| node.attributes.last().map(|&last| last + 1))
                .unwrap_or(id + 1);
            self.nodes[id].end = end;
        }
    }

    pub fn node(&self, id: usize) -> &DomNode<'a> {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_attribute(&self, id: usize) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Attribute { .. })
    }

    /// Element or attribute name; empty for other nodes
    pub fn name(&self, id: usize) -> &'a str {
        match self.nodes[id].kind {
            NodeKind::Element(element) => element.value().name(),
            NodeKind::Attribute { name, .. } => name,
            _ => "",
        }
    }

    /// XPath string-value of a node
    pub fn string_value(&self, id: usize) -> String {
        match self.nodes[id].kind {
            NodeKind::Root => self.document.root_element().text().collect(),
            NodeKind::Element(element) => element.text().collect(),
            NodeKind::Attribute { value, .. } => value.to_string(),
            NodeKind::Text(text) | NodeKind::Comment(text) => text.to_string(),
        }
    }

    /// Serialize a node back to markup with entities unescaped
    ///
    /// Attributes render as an element named after the attribute, and void
    /// elements self-close (`<br/>`).
    pub fn render(&self, id: usize) -> String {
        match self.nodes[id].kind {
            NodeKind::Root | NodeKind::Element(_) => unescape_entities(&self.serialize(id)),
            NodeKind::Attribute { name, value } => format!("<{0}>{1}</{0}>", name, value),
            NodeKind::Text(text) => text.to_string(),
            NodeKind::Comment(text) => format!("<!--{}-->", text),
        }
    }

    /// Escaped markup for the subtree at `id`, walked in index order
    fn serialize(&self, id: usize) -> String {
        let mut out = String::new();
        // Elements whose end tag is still owed, innermost last
        let mut open: Vec<usize> = Vec::new();

        for current in id..self.nodes[id].end {
            while let Some(&top) = open.last() {
                if self.nodes[top].end > current {
                    break;
                }
                open.pop();
                self.close_tag(top, &mut out);
            }

            let node = &self.nodes[current];
            match node.kind {
                NodeKind::Root | NodeKind::Attribute { .. } => {}
                NodeKind::Element(element) => {
                    let name = element.value().name();
                    out.push('<');
                    out.push_str(name);
                    for &attr in &node.attributes {
                        if let NodeKind::Attribute { name, value } = self.nodes[attr].kind {
                            out.push(' ');
                            out.push_str(name);
                            out.push_str("=\"");
                            escape_into(value, &mut out);
                            out.push('"');
                        }
                    }
                    if VOID_ELEMENTS.contains(&name) {
                        out.push_str("/>");
                        continue;
                    }
                    out.push('>');
                    let keeps_newline = matches!(name, "pre" | "listing" | "textarea");
                    if keeps_newline && self.starts_with_newline(current) {
                        out.push('\n');
                    }
                    open.push(current);
                }
                NodeKind::Text(text) => {
                    let raw = node
                        .parent
                        .is_some_and(|parent| RAW_TEXT_ELEMENTS.contains(&self.name(parent)));
                    if raw {
                        out.push_str(text);
                    } else {
                        escape_into(text, &mut out);
                    }
                }
                NodeKind::Comment(text) => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
            }
        }

        while let Some(top) = open.pop() {
            self.close_tag(top, &mut out);
        }
        out
    }

    fn close_tag(&self, id: usize, out: &mut String) {
        out.push_str("</");
        out.push_str(self.name(id));
        out.push('>');
    }

    /// The parser drops one leading newline in these elements; put it back
    fn starts_with_newline(&self, id: usize) -> bool {
        self.nodes[id].children.first().is_some_and(|&child| {
            matches!(self.nodes[child].kind, NodeKind::Text(text) if text.starts_with('\n'))
        })
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text children are written without escaping
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\r' => out.push_str("&#13;"),
            c => out.push(c),
        }
    }
}

/// Replace the character references an HTML serializer emits
pub(crate) fn unescape_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.bytes().take(11).position(|b| b == b';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    if let Some(hex) = entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                    {
                        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                    } else if let Some(dec) = entity.strip_prefix('#') {
                        dec.parse::<u32>().ok().and_then(char::from_u32)
                    } else {
                        None
                    }
                }
            };
            ch.map(|c| (c, semi + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
