//! Builds element trees from flat ElementDefinition lists

use crate::error::{Error, Result};
use crate::node::{DifferentialNode, ElementData, SnapshotNode, TreeNodeData};
use crate::tree::{NodeId, TreeData};
use ferrum_models::{ElementDefinition, FhirVersion};

pub fn build_snapshot_tree(
    elements: &[ElementDefinition],
    version: FhirVersion,
) -> Result<TreeData<SnapshotNode>> {
    build_tree(elements, version, SnapshotNode::new, false)
}

/// Differentials only restate what they change, so missing ancestors are
/// filled with placeholder nodes.
pub fn build_differential_tree(
    elements: &[ElementDefinition],
    version: FhirVersion,
) -> Result<TreeData<DifferentialNode>> {
    build_tree(elements, version, DifferentialNode::new, true)
}

fn parent_path(path: &str) -> Option<&str> {
    path.rfind('.').map(|pos| &path[..pos])
}

fn build_tree<D, F>(
    elements: &[ElementDefinition],
    version: FhirVersion,
    make: F,
    allow_gaps: bool,
) -> Result<TreeData<D>>
where
    D: TreeNodeData,
    F: Fn(ElementData) -> D,
{
    let (first, rest) = elements
        .split_first()
        .ok_or_else(|| Error::InvalidTree("no elements".to_string()))?;

    let first = ElementData::from_definition(first, version);
    let mut tree = match parent_path(&first.path) {
        None => TreeData::new(make(first)),
        Some(_) if allow_gaps => {
            let root_path = first.path.split('.').next().unwrap_or_default().to_string();
            let mut tree = TreeData::new(make(ElementData::placeholder(root_path)));
            let root = tree.root();
            insert(&mut tree, root, first, &make, allow_gaps)?;
            tree
        }
        Some(_) => {
            return Err(Error::InvalidTree(format!(
                "first element {} is not a root element",
                first.path
            )))
        }
    };

    let mut last = tree.iter().last().unwrap_or(tree.root());
    if version.links_by_name() {
        mark_dstu2_slice(&mut tree, last);
    }
    for def in rest {
        let element = ElementData::from_definition(def, version);
        last = insert(&mut tree, last, element, &make, allow_gaps)?;
        if version.links_by_name() {
            mark_dstu2_slice(&mut tree, last);
        }
    }
    Ok(tree)
}

/// DSTU2 has no `sliceName`. A slice carries its name in `name`, which
/// otherwise only labels a `nameReference` target, so named elements are
/// slices only when their path repeats among siblings or they are extensions.
fn mark_dstu2_slice<D: TreeNodeData>(tree: &mut TreeData<D>, id: NodeId) {
    let Some(parent) = tree.parent(id) else {
        return;
    };
    let path = tree.path(id).to_string();
    let same_path: Vec<NodeId> = tree
        .children(parent)
        .iter()
        .copied()
        .filter(|&sibling| tree.path(sibling) == path)
        .collect();
    if same_path.len() < 2 && !tree.data(id).element().is_extension() {
        return;
    }

    for sibling in same_path {
        let element = tree.data_mut(sibling).element_mut();
        if element.slice_name.is_none() && !element.has_slicing_info() {
            element.slice_name = element.name.clone();
        }
    }
}

/// Inserts `element` below the nearest node on `last`'s ancestor chain
/// (inclusive) whose path is the element's parent path.
fn insert<D, F>(
    tree: &mut TreeData<D>,
    last: NodeId,
    element: ElementData,
    make: &F,
    allow_gaps: bool,
) -> Result<NodeId>
where
    D: TreeNodeData,
    F: Fn(ElementData) -> D,
{
    let Some(parent_path) = parent_path(&element.path).map(str::to_string) else {
        return Err(Error::InvalidTree(format!(
            "second root element {}",
            element.path
        )));
    };

    let chain: Vec<NodeId> = std::iter::once(last).chain(tree.ancestors(last)).collect();

    if let Some(&parent) = chain.iter().find(|&&id| tree.path(id) == parent_path) {
        // a placeholder created for a gap is promoted when its element turns up
        let placeholder = tree.children(parent).iter().copied().find(|&child| {
            let existing = tree.data(child).element();
            existing.placeholder && existing.path == element.path && element.slice_name.is_none()
        });
        return Ok(match placeholder {
            Some(id) => {
                *tree.data_mut(id) = make(element);
                id
            }
            None => tree.add_child(parent, make(element)),
        });
    }

    if !allow_gaps {
        return Err(Error::InvalidTree(format!(
            "no parent element {} for {}",
            parent_path, element.path
        )));
    }

    let anchor = chain
        .iter()
        .copied()
        .find(|&id| parent_path.starts_with(&format!("{}.", tree.path(id))))
        .ok_or_else(|| {
            Error::InvalidTree(format!("{} is outside the tree", element.path))
        })?;

    let anchor_path = tree.path(anchor).to_string();
    let mut parent = anchor;
    let mut path = anchor_path;
    for segment in parent_path[path.len() + 1..].split('.') {
        path = format!("{}.{}", path, segment);
        tracing::debug!(path = %path, "Inserting placeholder for missing differential element");
        parent = tree.add_child(parent, make(ElementData::placeholder(path.clone())));
    }
    Ok(tree.add_child(parent, make(element)))
}
