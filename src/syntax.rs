//! Parser adapter interface.
//!
//! The compilation core does not parse. It consumes an already-built syntax
//! tree through the small interface in this module: nodes identified by
//! symbol names, children addressed by field names, and byte ranges into the
//! original source. Any concrete parser (tree-sitter or otherwise) can be
//! bridged by implementing [`SyntaxNode`], or by populating the in-memory
//! [`Tree`] provided here.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Byte range of a construct in the original source.
///
/// Spans double as stable identifiers during emission: the start offset is
/// what makes generated function names unique across a script.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}

/// A node handle in the external syntax tree.
///
/// Symbols and fields are addressed by name, not by numeric id; the core
/// depends on the grammar's names being stable, not on its id assignment.
pub trait SyntaxNode: Clone {
    /// Grammar symbol of this node, e.g. `"binary_expr"` or `"integer"`.
    fn symbol(&self) -> &str;

    /// The single child stored under the given field name, if present.
    fn field(&self, name: &str) -> Option<Self>;

    /// All children stored under the given field name, in source order.
    fn field_all(&self, name: &str) -> Vec<Self>;

    /// All named children, in source order.
    fn named_children(&self) -> Vec<Self>;

    fn start_byte(&self) -> usize;

    fn end_byte(&self) -> usize;

    fn span(&self) -> Span {
        Span::new(self.start_byte(), self.end_byte())
    }

    /// Whether the parser flagged this node as a syntax error.
    fn is_error(&self) -> bool {
        self.symbol() == "ERROR"
    }
}

/// Source text covered by a node.
pub fn node_text<'a, N: SyntaxNode>(node: &N, source: &'a str) -> &'a str {
    &source[node.start_byte().min(source.len())..node.end_byte().min(source.len())]
}

#[derive(Clone, Debug, Default)]
struct RawNode {
    symbol: String,
    start: usize,
    end: usize,
    children: Vec<usize>,
    fields: Vec<(String, usize)>,
}

/// A plain in-memory syntax tree.
///
/// Hosts that do not want to keep their parser's tree alive can copy it into
/// one of these; the unit tests build their inputs the same way.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    source: String,
    nodes: Vec<RawNode>,
    root: usize,
}

/// Handle returned while populating a [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(usize);

impl Tree {
    pub fn new(source: impl Into<String>) -> Tree {
        Tree {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn add(&mut self, symbol: impl Into<String>, span: Span) -> NodeId {
        self.nodes.push(RawNode {
            symbol: symbol.into(),
            start: span.start,
            end: span.end,
            ..Default::default()
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Add a node whose span is located by searching for `text` in the source.
    /// Convenient for hand-built trees; falls back to an empty span.
    pub fn add_at(&mut self, symbol: impl Into<String>, text: &str) -> NodeId {
        let span = self
            .source
            .find(text)
            .map(|start| Span::new(start, start + text.len()))
            .unwrap_or_default();
        self.add(symbol, span)
    }

    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.push(child.0);
    }

    pub fn set_field(&mut self, parent: NodeId, name: impl Into<String>, child: NodeId) {
        let name = name.into();
        self.nodes[parent.0].fields.push((name, child.0));
        self.nodes[parent.0].children.push(child.0);
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root.0;
    }

    pub fn node(&self, id: NodeId) -> TreeNode<'_> {
        TreeNode {
            tree: self,
            index: id.0,
        }
    }

    pub fn node_root(&self) -> TreeNode<'_> {
        TreeNode {
            tree: self,
            index: self.root,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node_text(&self, node: &TreeNode<'_>) -> &str {
        node_text(node, &self.source)
    }
}

/// Borrowing node handle over [`Tree`].
#[derive(Clone, Copy)]
pub struct TreeNode<'a> {
    tree: &'a Tree,
    index: usize,
}

impl fmt::Debug for TreeNode<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TreeNode({})", self.symbol())
    }
}

impl<'a> SyntaxNode for TreeNode<'a> {
    fn symbol(&self) -> &str {
        &self.tree.nodes[self.index].symbol
    }

    fn field(&self, name: &str) -> Option<Self> {
        self.tree.nodes[self.index]
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, index)| TreeNode {
                tree: self.tree,
                index,
            })
    }

    fn field_all(&self, name: &str) -> Vec<Self> {
        self.tree.nodes[self.index]
            .fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|&(_, index)| TreeNode {
                tree: self.tree,
                index,
            })
            .collect()
    }

    fn named_children(&self) -> Vec<Self> {
        self.tree.nodes[self.index]
            .children
            .iter()
            .map(|&index| TreeNode {
                tree: self.tree,
                index,
            })
            .collect()
    }

    fn start_byte(&self) -> usize {
        self.tree.nodes[self.index].start
    }

    fn end_byte(&self) -> usize {
        self.tree.nodes[self.index].end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup() {
        let mut tree = Tree::new("1 + 2");
        let root = tree.add("binary_expr", Span::new(0, 5));
        let left = tree.add("integer", Span::new(0, 1));
        let right = tree.add("integer", Span::new(4, 5));
        tree.set_field(root, "left", left);
        tree.set_field(root, "right", right);
        tree.set_root(root);

        let root = tree.node_root();
        assert_eq!(root.symbol(), "binary_expr");
        assert_eq!(root.field("left").unwrap().symbol(), "integer");
        assert_eq!(tree.node_text(&root.field("right").unwrap()), "2");
        assert!(root.field("cond").is_none());
    }

    #[test]
    fn test_named_children_in_order() {
        let mut tree = Tree::new("[1, 2, 3]");
        let root = tree.add("array", Span::new(0, 9));
        for (start, end) in [(1, 2), (4, 5), (7, 8)] {
            let item = tree.add("integer", Span::new(start, end));
            tree.push_child(root, item);
        }
        tree.set_root(root);

        let texts: Vec<_> = tree
            .node_root()
            .named_children()
            .iter()
            .map(|n| tree.node_text(n).to_string())
            .collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }
}
