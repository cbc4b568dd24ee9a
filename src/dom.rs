use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct StyleNode {
    pub data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct StyleTree {
    nodes: Vec<StyleNode>,
    root: NodeId,
    style_blocks: Vec<String>,
}

impl StyleTree {
    pub fn new(root_tag: &str) -> Self {
        Self {
            nodes: vec![StyleNode {
                data: NodeData::Element(ElementData {
                    tag: root_tag.to_ascii_lowercase(),
                    attributes: Vec::new(),
                }),
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
            style_blocks: Vec::new(),
        }
    }

    // Parses an HTML document. The `<html>` element becomes the root; the
    // bodies of `<style>` elements are kept aside in document order.
    pub fn parse_html(html: &str) -> Self {
        let document = kuchiki::parse_html().one(html);
        let mut tree = StyleTree::new("html");
        let html_node = document.children().find(|child| {
            child
                .as_element()
                .map(|el| el.name.local.as_ref().eq_ignore_ascii_case("html"))
                .unwrap_or(false)
        });
        match html_node {
            Some(node) => {
                tree.set_attributes(tree.root, element_attributes(&node));
                for child in node.children() {
                    tree.import_kuchiki(&child, tree.root);
                }
            }
            None => {
                for child in document.children() {
                    tree.import_kuchiki(&child, tree.root);
                }
            }
        }
        tree
    }

    fn import_kuchiki(&mut self, node: &NodeRef, parent: NodeId) {
        if let Some(element) = node.as_element() {
            let tag = element.name.local.as_ref().to_ascii_lowercase();
            let attributes = element_attributes(node);
            if tag == "style" {
                self.style_blocks.push(node.text_contents());
            }
            let id = self.push(
                NodeData::Element(ElementData { tag, attributes }),
                parent,
            );
            if self.is_raw_text(id) {
                return;
            }
            for child in node.children() {
                self.import_kuchiki(&child, id);
            }
        } else if let Some(text) = node.as_text() {
            let text = text.borrow();
            if !text.is_empty() {
                self.push(NodeData::Text(text.to_string()), parent);
            }
        }
    }

    fn is_raw_text(&self, id: NodeId) -> bool {
        matches!(self.tag(id), Some("script" | "style"))
    }

    fn push(&mut self, data: NodeData, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(StyleNode {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn set_attributes(&mut self, id: NodeId, attributes: Vec<(String, String)>) {
        if let NodeData::Element(element) = &mut self.nodes[id.0].data {
            element.attributes = attributes;
        }
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attributes = attrs
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        self.push(
            NodeData::Element(ElementData {
                tag: tag.to_ascii_lowercase(),
                attributes,
            }),
            parent,
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()), parent)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &StyleNode {
        &self.nodes[id.0]
    }

    pub fn style_blocks(&self) -> &[String] {
        &self.style_blocks
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].data {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&s| self.is_element(s))
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !self.is_element(id) {
                continue;
            }
            out.push(id);
            for &child in self.children(id).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    pub fn find_first(&self, tag: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&id| self.tag(id) == Some(tag))
    }
}

pub struct Ancestors<'a> {
    tree: &'a StyleTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

fn element_attributes(node: &NodeRef) -> Vec<(String, String)> {
    let Some(element) = node.as_element() else {
        return Vec::new();
    };
    let attrs = element.attributes.borrow();
    attrs
        .map
        .iter()
        .filter(|(name, _)| name.ns.is_empty())
        .map(|(name, attr)| (name.local.to_string().to_ascii_lowercase(), attr.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_html_lowercases_and_keeps_style_blocks() {
        let tree = StyleTree::parse_html(
            "<HTML><head><style>p { color: red; }</style></head>\
             <body><P ID=\"Intro\" Class=\"a b\">Hi <b>there</b></P></body></HTML>",
        );
        assert_eq!(tree.tag(tree.root()), Some("html"));
        let p = tree.find_first("p").expect("p element");
        assert_eq!(tree.attr(p, "id"), Some("Intro"));
        assert!(tree.has_class(p, "b"));
        assert!(!tree.has_class(p, "B"));
        assert_eq!(tree.style_blocks(), ["p { color: red; }".to_string()]);

        let style = tree.find_first("style").expect("style element");
        assert!(tree.children(style).is_empty(), "style text must not become content");
    }

    #[test]
    fn previous_element_sibling_skips_text() {
        let mut tree = StyleTree::new("div");
        let root = tree.root();
        let p = tree.append_element(root, "p", &[]);
        tree.append_text(root, "  ");
        let span = tree.append_element(root, "span", &[]);
        assert_eq!(tree.previous_element_sibling(span), Some(p));
        assert_eq!(tree.previous_element_sibling(p), None);
    }

    #[test]
    fn elements_are_in_document_order() {
        let mut tree = StyleTree::new("div");
        let root = tree.root();
        let p = tree.append_element(root, "p", &[]);
        let span = tree.append_element(p, "span", &[]);
        let em = tree.append_element(root, "em", &[]);
        assert_eq!(tree.elements(), vec![root, p, span, em]);
        assert_eq!(tree.ancestors(span).collect::<Vec<_>>(), vec![p, root]);
    }
}
