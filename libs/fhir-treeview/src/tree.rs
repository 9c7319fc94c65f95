//! Ordered element trees
//!
//! Nodes live in an arena owned by [`TreeData`] and are addressed by
//! [`NodeId`]. Parent/child edges are ownership; `linked_node` and a
//! differential node's backup node are plain ids and never own anything.

use crate::error::{Error, Result};
use crate::node::TreeNodeData;
use serde::Serialize;
use std::fmt;

/// Index of a node inside its owning [`TreeData`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode<D> {
    pub data: D,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    linked_node: Option<NodeId>,
}

impl<D> TreeNode<D> {
    fn new(data: D, parent: Option<NodeId>) -> Self {
        Self {
            data,
            parent,
            children: Vec::new(),
            linked_node: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn linked_node(&self) -> Option<NodeId> {
        self.linked_node
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeData<D> {
    nodes: Vec<TreeNode<D>>,
    root: NodeId,
}

impl<D> TreeData<D> {
    pub fn new(root: D) -> Self {
        Self {
            nodes: vec![TreeNode::new(root, None)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &TreeNode<D> {
        &self.nodes[id.0]
    }

    pub fn data(&self, id: NodeId) -> &D {
        &self.nodes[id.0].data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut D {
        &mut self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn linked_node(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].linked_node
    }

    pub(crate) fn set_linked_node(&mut self, id: NodeId, target: NodeId) {
        self.nodes[id.0].linked_node = Some(target);
    }

    /// Appends `data` as the last child of `parent`
    pub fn add_child(&mut self, parent: NodeId, data: D) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode::new(data, Some(parent)));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Always false: a tree holds at least its root
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Pre-order traversal of the whole tree
    pub fn iter(&self) -> PreOrder<'_, D> {
        self.descendants(self.root)
    }

    /// Pre-order traversal of the subtree rooted at `id`, `id` included
    pub fn descendants(&self, id: NodeId) -> PreOrder<'_, D> {
        PreOrder {
            tree: self,
            stack: vec![id],
        }
    }

    /// Ancestor chain of `id`, nearest first, root last
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, D> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Whether `id` is the last child of its parent
    pub fn is_last_child(&self, id: NodeId) -> bool {
        self.parent(id)
            .and_then(|p| self.children(p).last().copied())
            .map_or(true, |last| last == id)
    }

    /// Replaces the subtree at `target` with the content of `subtree`.
    ///
    /// `target` keeps its id and position under its parent. Its old
    /// descendants become unreachable.
    pub fn replace_subtree(&mut self, target: NodeId, subtree: TreeData<D>) {
        let TreeData {
            nodes,
            root: subtree_root,
        } = subtree;
        let offset = self.nodes.len();
        let remap = |id: NodeId| {
            if id == subtree_root {
                target
            } else {
                NodeId(id.0 + offset - usize::from(id.0 > subtree_root.0))
            }
        };

        let mut root_node = None;
        for (index, node) in nodes.into_iter().enumerate() {
            let id = NodeId(index);
            let TreeNode {
                data,
                parent,
                children,
                linked_node,
            } = node;
            let rebuilt = TreeNode {
                data,
                parent: if id == subtree_root {
                    self.nodes[target.0].parent
                } else {
                    parent.map(remap)
                },
                children: children.into_iter().map(remap).collect(),
                linked_node: linked_node.map(remap),
            };
            if id == subtree_root {
                root_node = Some(rebuilt);
            } else {
                self.nodes.push(rebuilt);
            }
        }

        if let Some(root_node) = root_node {
            self.nodes[target.0] = root_node;
        }
    }

    /// Unlinks `id` from its parent. The subtree stays addressable by id but
    /// is no longer visited by traversals from the root.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self
            .parent(id)
            .ok_or_else(|| Error::InvalidTree("cannot detach the root node".to_string()))?;
        self.nodes[parent.0].children.retain(|child| *child != id);
        Ok(())
    }
}

impl<D: TreeNodeData> TreeData<D> {
    pub fn path(&self, id: NodeId) -> &str {
        &self.data(id).element().path
    }

    /// A sibling with the same path introduces slicing
    pub fn has_slicing_sibling(&self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let path = self.path(id);
        self.children(parent).iter().any(|&sibling| {
            sibling != id
                && self.path(sibling) == path
                && self.data(sibling).element().has_slicing_info()
        })
    }

    /// Takes part in slicing: introduces it, is a named slice, or sits next to a slice header
    pub fn is_sliced(&self, id: NodeId) -> bool {
        let element = self.data(id).element();
        element.has_slicing_info() || element.slice_name.is_some() || self.has_slicing_sibling(id)
    }

    /// Nearest ancestor of `id` that takes part in slicing
    pub fn first_sliced_ancestor(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id).find(|&ancestor| self.is_sliced(ancestor))
    }

    /// All nodes under `root` (inclusive) whose path equals `path`, in pre-order
    pub fn find_descendants_with_path(&self, root: NodeId, path: &str) -> Vec<NodeId> {
        self.descendants(root)
            .filter(|&id| self.path(id) == path)
            .collect()
    }

    /// The single unsliced node under `root` at `path`
    pub fn find_unique_descendant_with_path(&self, root: NodeId, path: &str) -> Option<NodeId> {
        let matches = self.find_descendants_with_path(root, path);
        if matches.len() == 1 {
            return matches.first().copied();
        }
        let mut unsliced = matches
            .into_iter()
            .filter(|&id| self.data(id).element().slice_name.is_none());
        match (unsliced.next(), unsliced.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Key identifying `id` among its relatives: dot-joined path names, with
    /// `(alias)` added for slices. The alias is the slice name, else the
    /// discriminator value.
    pub fn node_key(&self, id: NodeId) -> String {
        let mut chain: Vec<NodeId> = self.ancestors(id).collect();
        chain.reverse();
        chain.push(id);
        chain
            .into_iter()
            .map(|node| {
                let element = self.data(node).element();
                let alias = element
                    .slice_name
                    .as_deref()
                    .or(element.discriminator_value.as_deref());
                match alias {
                    Some(alias) if self.is_sliced(node) => {
                        format!("{}({})", element.path_name(), alias)
                    }
                    _ => element.path_name().to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

pub struct PreOrder<'a, D> {
    tree: &'a TreeData<D>,
    stack: Vec<NodeId>,
}

impl<'a, D> Iterator for PreOrder<'a, D> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

pub struct Ancestors<'a, D> {
    tree: &'a TreeData<D>,
    next: Option<NodeId>,
}

impl<'a, D> Iterator for Ancestors<'a, D> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.parent(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (TreeData<&'static str>, NodeId, NodeId, NodeId) {
        let mut tree = TreeData::new("Patient");
        let root = tree.root();
        let name = tree.add_child(root, "Patient.name");
        let family = tree.add_child(name, "Patient.name.family");
        let gender = tree.add_child(root, "Patient.gender");
        (tree, name, family, gender)
    }

    #[test]
    fn test_pre_order() {
        let (tree, ..) = sample();
        let order: Vec<_> = tree.iter().map(|id| *tree.data(id)).collect();
        assert_eq!(
            order,
            vec!["Patient", "Patient.name", "Patient.name.family", "Patient.gender"]
        );
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_ancestors() {
        let (tree, name, family, _) = sample();
        let chain: Vec<_> = tree.ancestors(family).collect();
        assert_eq!(chain, vec![name, tree.root()]);
        assert_eq!(tree.depth(family), 2);
        assert!(tree.is_last_child(family));
        assert!(!tree.is_last_child(name));
    }

    #[test]
    fn test_replace_subtree_keeps_position() {
        let (mut tree, name, _, gender) = sample();

        let mut replacement = TreeData::new("Patient.name*");
        let r = replacement.root();
        let given = replacement.add_child(r, "Patient.name.given");
        replacement.add_child(given, "Patient.name.given.extension");
        replacement.add_child(r, "Patient.name.text");

        tree.replace_subtree(name, replacement);

        let order: Vec<_> = tree.iter().map(|id| *tree.data(id)).collect();
        assert_eq!(
            order,
            vec![
                "Patient",
                "Patient.name*",
                "Patient.name.given",
                "Patient.name.given.extension",
                "Patient.name.text",
                "Patient.gender",
            ]
        );
        assert_eq!(tree.children(tree.root()), &[name, gender]);
        for child in tree.children(name) {
            assert_eq!(tree.parent(*child), Some(name));
        }
    }

    #[test]
    fn test_detach() {
        let (mut tree, name, family, _) = sample();
        tree.detach(name).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(*tree.data(family), "Patient.name.family");
        assert!(tree.detach(tree.root()).is_err());
    }
}
