//! Linked node resolution
//!
//! Elements can reuse another element's content (`contentReference` from STU3
//! on, `nameReference` in DSTU2). Both forms are resolved the same way and
//! differ only in the key joining the reference to its target.

use crate::error::Result;
use crate::event::{EventSink, RendererEventType};
use crate::node::{ElementData, TreeNodeData};
use crate::tree::{NodeId, TreeData};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKey {
    Id,
    Name,
}

impl LinkKey {
    fn declared(self, element: &ElementData) -> Option<&str> {
        match self {
            LinkKey::Id => element.id.as_deref(),
            LinkKey::Name => element.name.as_deref(),
        }
    }

    fn referenced(self, element: &ElementData) -> Option<&str> {
        match self {
            LinkKey::Id => element.linked_node_id.as_deref(),
            LinkKey::Name => element.linked_node_name.as_deref(),
        }
    }
}

/// Sets `linked_node` on every node whose reference can be resolved within `tree`
pub fn resolve_linked_nodes<D: TreeNodeData>(
    tree: &mut TreeData<D>,
    key: LinkKey,
    events: &mut dyn EventSink,
) -> Result<()> {
    let mut declared: BTreeMap<String, NodeId> = BTreeMap::new();
    let mut referenced: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();

    for id in tree.iter() {
        let element = tree.data(id).element();
        if let Some(k) = key.declared(element) {
            declared.entry(k.to_string()).or_insert(id);
        }
        if let Some(k) = key.referenced(element) {
            referenced.entry(k.to_string()).or_default().push(id);
        }
    }

    for (link, referrers) in referenced {
        let Some(&target) = declared.get(&link) else {
            // differential nodes can still show the link through their backup node
            let unresolved: Vec<&str> = referrers
                .iter()
                .filter(|&&r| tree.data(r).backup_node().is_none())
                .map(|&r| tree.path(r))
                .collect();
            if !unresolved.is_empty() {
                events.event(
                    RendererEventType::MissingReferencedNode,
                    format!("No node with {:?} '{}' (referenced by {})", key, link, unresolved.join(", ")),
                )?;
            }
            continue;
        };

        for referrer in referrers {
            let element = tree.data(referrer).element();
            if key.declared(element) == Some(link.as_str()) {
                events.event(
                    RendererEventType::LinkReferencesItself,
                    format!("{} links to itself", element.path),
                )?;
                continue;
            }
            if element.is_fixed() {
                events.event(
                    RendererEventType::FixedvalueWithLinkedNode,
                    format!("{} has both a fixed value and a linked node", element.path),
                )?;
            }
            tree.set_linked_node(referrer, target);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventRecorder;
    use crate::node::SnapshotNode;

    fn node(id: &str, link: Option<&str>) -> SnapshotNode {
        SnapshotNode::new(ElementData {
            id: Some(id.to_string()),
            path: id.to_string(),
            linked_node_id: link.map(str::to_string),
            ..ElementData::default()
        })
    }

    #[test]
    fn test_resolves_by_id() {
        let mut tree = TreeData::new(node("Questionnaire", None));
        let root = tree.root();
        let item = tree.add_child(root, node("Questionnaire.item", None));
        let nested = tree.add_child(item, node("Questionnaire.item.item", Some("Questionnaire.item")));

        let mut events = EventRecorder::default();
        resolve_linked_nodes(&mut tree, LinkKey::Id, &mut events).unwrap();

        assert_eq!(tree.linked_node(nested), Some(item));
        assert_eq!(tree.linked_node(item), None);
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_resolves_by_name() {
        let mut tree = TreeData::new(node("Questionnaire", None));
        let root = tree.root();
        let mut group = node("Questionnaire.group", None);
        group.element.name = Some("group".into());
        let group = tree.add_child(root, group);
        let mut nested = node("Questionnaire.group.group", None);
        nested.element.linked_node_name = Some("group".into());
        let nested = tree.add_child(group, nested);

        let mut events = EventRecorder::default();
        resolve_linked_nodes(&mut tree, LinkKey::Id, &mut events).unwrap();
        assert_eq!(tree.linked_node(nested), None);

        resolve_linked_nodes(&mut tree, LinkKey::Name, &mut events).unwrap();
        assert_eq!(tree.linked_node(nested), Some(group));
    }

    #[test]
    fn test_fixed_value_with_link_is_reported() {
        let mut tree = TreeData::new(node("Questionnaire", None));
        let root = tree.root();
        let item = tree.add_child(root, node("Questionnaire.item", None));
        let mut nested = node("Questionnaire.item.item", Some("Questionnaire.item"));
        nested.element.fixed_value = Some(crate::node::LiteralValue {
            type_name: "String".into(),
            value: serde_json::json!("x"),
        });
        let nested = tree.add_child(item, nested);

        let mut events = EventRecorder::default();
        resolve_linked_nodes(&mut tree, LinkKey::Id, &mut events).unwrap();
        assert_eq!(tree.linked_node(nested), Some(item));
        assert!(events.has(RendererEventType::FixedvalueWithLinkedNode));
    }
}
