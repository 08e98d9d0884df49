//! HTML tree helpers over `kuchikiki`.
//!
//! Post bodies are fragments. They are parsed in a `<body>` context, so
//! leading comments, whitespace and `<style>` blocks stay where they were.
//! html5ever puts the parsed nodes under a synthesized `<html>` root; only
//! its children are serialized back.

use html5ever::{LocalName, Namespace, QualName};
use kuchikiki::traits::TendrilSink;
use kuchikiki::{Attribute, ExpandedName, NodeRef};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed post body.
pub(crate) struct HtmlTree {
    root: NodeRef,
}

impl HtmlTree {
    /// Parse an HTML fragment.
    pub(crate) fn parse(html: &str) -> Self {
        Self {
            root: parse_in_body(html),
        }
    }

    /// The synthesized root element holding the fragment's nodes.
    pub(crate) fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Serialize the fragment (children of the root only).
    pub(crate) fn serialize(&self) -> String {
        serialize_children(&self.root)
    }
}

/// Parse `markup` as the content of a `<body>` element and return the
/// fragment root.
fn parse_in_body(markup: &str) -> NodeRef {
    let context = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from("body"));
    let document = kuchikiki::parse_fragment(context, Vec::new())
        .one(markup)
        .document_node;
    // html5ever appends the fragment root as the document's only child.
    document.first_child().unwrap_or(document)
}

fn serialize_children(parent: &NodeRef) -> String {
    let mut out = Vec::new();
    for child in parent.children() {
        // Writes into a Vec only fail on allocation failure.
        let _ = child.serialize(&mut out);
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse markup into detached top-level nodes, ready to be inserted elsewhere.
pub(crate) fn fragment(markup: &str) -> Vec<NodeRef> {
    let root = parse_in_body(markup);
    let nodes: Vec<NodeRef> = root.children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

/// Create a detached HTML element with the given attributes, in order.
pub(crate) fn new_element(tag: &str, attributes: &[(&str, &str)]) -> NodeRef {
    let name = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag));
    NodeRef::new_element(
        name,
        attributes.iter().map(|&(name, value)| {
            (
                ExpandedName::new("", name),
                Attribute {
                    prefix: None,
                    value: value.to_owned(),
                },
            )
        }),
    )
}

/// All elements under `root` matching `selectors`, in document order.
///
/// The list is collected up front so callers can mutate the tree while
/// walking it.
pub(crate) fn select_all(root: &NodeRef, selectors: &str) -> Vec<NodeRef> {
    root.select(selectors)
        .map(|matches| matches.map(|element| element.as_node().clone()).collect())
        .unwrap_or_default()
}

/// Whether `node` is an element with the given local name.
pub(crate) fn is_element(node: &NodeRef, tag: &str) -> bool {
    node.as_element()
        .is_some_and(|element| &*element.name.local == tag)
}

/// Attribute value of an element node.
pub(crate) fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get(name).map(str::to_owned)
}

/// Set an attribute on an element node; non-elements are ignored.
pub(crate) fn set_attr(node: &NodeRef, name: &str, value: String) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().insert(name, value);
    }
}

/// Whether the element's `class` attribute contains `class`.
pub(crate) fn has_class(node: &NodeRef, class: &str) -> bool {
    attr(node, "class").is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

/// Whitespace-only text node.
pub(crate) fn is_blank_text(node: &NodeRef) -> bool {
    node.as_text()
        .is_some_and(|text| text.borrow().trim().is_empty())
}

/// The `<p>` that `node` is the only meaningful child of, if any.
///
/// Whitespace-only text siblings do not count.
pub(crate) fn sole_child_paragraph(node: &NodeRef) -> Option<NodeRef> {
    let parent = node.parent()?;
    if !is_element(&parent, "p") {
        return None;
    }
    let meaningful = parent.children().filter(|c| !is_blank_text(c)).count();
    (meaningful == 1).then_some(parent)
}

/// Put `replacements` where `target` is and remove `target`.
pub(crate) fn replace_with(target: &NodeRef, replacements: &[NodeRef]) {
    for node in replacements {
        target.insert_before(node.clone());
    }
    target.detach();
}

/// Move `node` inside `wrapper`, putting `wrapper` where `node` was.
pub(crate) fn wrap(node: &NodeRef, wrapper: &NodeRef) {
    node.insert_before(wrapper.clone());
    wrapper.append(node.clone());
}
