//! Backup node matching
//!
//! Every differential node is paired with the snapshot node it overrides.
//! Matching is by exact path, restricted to the subtree of the snapshot node
//! already matched to the differential node's nearest sliced ancestor. When
//! several snapshot slices share the path, the differential node's slicing
//! flag, slice name or discriminator values pick one.

use crate::discriminator::DiscriminatorPath;
use crate::error::{Error, Result};
use crate::event::{EventSink, RendererEventType};
use crate::node::{DifferentialNode, ElementData, SnapshotNode, TreeNodeData};
use crate::tree::{NodeId, TreeData};

/// Type names that can follow a choice element's base name, e.g. `valueQuantity`
pub const CHOICE_SUFFIXES: &[&str] = &[
    "Integer",
    "Decimal",
    "DateTime",
    "Date",
    "Instant",
    "Time",
    "String",
    "Uri",
    "Url",
    "Canonical",
    "Oid",
    "Uuid",
    "Id",
    "Boolean",
    "Code",
    "Markdown",
    "Base64Binary",
    "PositiveInt",
    "UnsignedInt",
    "Coding",
    "CodeableConcept",
    "Attachment",
    "Identifier",
    "Quantity",
    "SimpleQuantity",
    "Age",
    "Count",
    "Distance",
    "Duration",
    "Money",
    "Range",
    "Period",
    "Ratio",
    "SampledData",
    "HumanName",
    "Address",
    "ContactPoint",
    "Timing",
    "Signature",
    "Annotation",
    "Reference",
    "Meta",
];

/// Base name of a renamed choice segment: `valueQuantity` gives `value`
pub fn strip_choice_suffix(segment: &str) -> Option<&str> {
    CHOICE_SUFFIXES
        .iter()
        .filter(|suffix| segment.len() > suffix.len() && segment.ends_with(*suffix))
        .max_by_key(|suffix| suffix.len())
        .map(|suffix| &segment[..segment.len() - suffix.len()])
}

pub struct BackupNodeLocator<'a> {
    snapshot: &'a TreeData<SnapshotNode>,
}

impl<'a> BackupNodeLocator<'a> {
    pub fn new(snapshot: &'a TreeData<SnapshotNode>) -> Self {
        Self { snapshot }
    }

    /// Finds the unique snapshot node for differential node `id`.
    ///
    /// Ancestors of `id` must already carry their backup nodes.
    pub fn find_backup_node(
        &self,
        differential: &TreeData<DifferentialNode>,
        id: NodeId,
        events: &mut dyn EventSink,
    ) -> Result<NodeId> {
        let element = differential.data(id).element();
        let search_root = differential
            .first_sliced_ancestor(id)
            .and_then(|ancestor| differential.data(ancestor).backup_node())
            .unwrap_or(self.snapshot.root());

        let candidates = self
            .snapshot
            .find_descendants_with_path(search_root, &element.path);

        let found = match candidates.as_slice() {
            [] => self.find_renamed_choice(search_root, &element.path, events)?,
            [single] => *single,
            _ => self.disambiguate(differential, id, &candidates, events)?,
        };

        self.check_id(element, found, events)?;
        Ok(found)
    }

    /// Walks the differential path one segment at a time, substituting `[x]`
    /// for a choice-type suffix where the snapshot kept the generic name.
    fn find_renamed_choice(
        &self,
        search_root: NodeId,
        path: &str,
        events: &mut dyn EventSink,
    ) -> Result<NodeId> {
        let mut resolved_path = self.snapshot.path(search_root).to_string();
        let skip = resolved_path.split('.').count();
        let mut current = search_root;
        let mut renamed = None;

        for segment in path.split('.').skip(skip) {
            let candidate_path = format!("{}.{}", resolved_path, segment);
            if let Some(found) = self
                .snapshot
                .find_unique_descendant_with_path(current, &candidate_path)
            {
                current = found;
                resolved_path = candidate_path;
                continue;
            }

            let choice_path = strip_choice_suffix(segment)
                .map(|base| format!("{}.{}[x]", resolved_path, base))
                .ok_or_else(|| Error::mismatch(path, "no snapshot node with this path"))?;
            let found = self
                .snapshot
                .find_unique_descendant_with_path(current, &choice_path)
                .ok_or_else(|| {
                    Error::mismatch(
                        path,
                        format!("no snapshot node with this path or as {}", choice_path),
                    )
                })?;
            current = found;
            renamed = Some(choice_path.clone());
            resolved_path = choice_path;
        }

        match renamed {
            Some(choice_path) => {
                events.event(
                    RendererEventType::MisnamedSnapshotChoiceNode,
                    format!("Differential node {} matched snapshot node {}", path, choice_path),
                )?;
                Ok(current)
            }
            None => Err(Error::mismatch(path, "no snapshot node with this path")),
        }
    }

    fn disambiguate(
        &self,
        differential: &TreeData<DifferentialNode>,
        id: NodeId,
        candidates: &[NodeId],
        events: &mut dyn EventSink,
    ) -> Result<NodeId> {
        let element = differential.data(id).element();
        let first = candidates[0];

        if !self.snapshot.data(first).element().has_slicing_info() {
            return self.outside_slices(element, candidates);
        }

        if element.has_slicing_info() {
            return Ok(first);
        }

        let remaining: Vec<NodeId> = candidates
            .iter()
            .copied()
            .filter(|&c| !self.snapshot.data(c).element().has_slicing_info())
            .collect();

        let result = match element.slice_name.as_deref() {
            Some(slice_name) => unique(
                &element.path,
                remaining
                    .iter()
                    .copied()
                    .filter(|&c| {
                        self.snapshot.data(c).element().slice_name.as_deref() == Some(slice_name)
                    })
                    .collect(),
                &format!("slice name '{}'", slice_name),
            ),
            None => {
                let discriminators = self
                    .snapshot
                    .data(first)
                    .element()
                    .slicing
                    .as_ref()
                    .map(|s| s.discriminators.clone())
                    .unwrap_or_default();
                let mut accepted = Vec::new();
                for &candidate in &remaining {
                    if self.matches_discriminators(
                        differential,
                        id,
                        candidate,
                        &discriminators,
                        events,
                    )? {
                        accepted.push(candidate);
                    }
                }
                unique(&element.path, accepted, "slicing discriminators")
            }
        };

        result.or_else(|err| self.match_nested_extension_by_name(element, &remaining).ok_or(err))
    }

    /// Several candidates but no slicing here: a named node takes the slice with
    /// its name, otherwise keep the one not inside a named slice
    fn outside_slices(&self, element: &ElementData, candidates: &[NodeId]) -> Result<NodeId> {
        if let Some(slice_name) = element.slice_name.as_deref() {
            let named = candidates
                .iter()
                .copied()
                .filter(|&c| self.snapshot.data(c).element().slice_name.as_deref() == Some(slice_name))
                .collect();
            return unique(&element.path, named, &format!("slice name '{}'", slice_name))
                .or_else(|err| self.match_nested_extension_by_name(element, candidates).ok_or(err));
        }

        let unsliced: Vec<NodeId> = candidates
            .iter()
            .copied()
            .filter(|&c| {
                std::iter::once(c)
                    .chain(self.snapshot.ancestors(c))
                    .all(|n| self.snapshot.data(n).element().slice_name.is_none())
            })
            .collect();
        unique(&element.path, unsliced, "unsliced path")
            .or_else(|err| self.match_nested_extension_by_name(element, candidates).ok_or(err))
    }

    /// `Extension.extension` children often lack slicing on either side; fall
    /// back to their names.
    fn match_nested_extension_by_name(
        &self,
        element: &ElementData,
        candidates: &[NodeId],
    ) -> Option<NodeId> {
        if !(element.path.starts_with("Extension.") && element.is_extension()) {
            return None;
        }
        let name = element.slice_name.as_deref().or(element.name.as_deref())?;
        let mut named = candidates.iter().copied().filter(|&c| {
            let candidate = self.snapshot.data(c).element();
            candidate.slice_name.as_deref() == Some(name) || candidate.name.as_deref() == Some(name)
        });
        match (named.next(), named.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    fn matches_discriminators(
        &self,
        differential: &TreeData<DifferentialNode>,
        id: NodeId,
        candidate: NodeId,
        discriminators: &[String],
        events: &mut dyn EventSink,
    ) -> Result<bool> {
        let diff = differential.data(id).element();
        let snap = self.snapshot.data(candidate).element();

        for discriminator in discriminators {
            let matched = match DiscriminatorPath::parse(discriminator, diff.is_extension()) {
                DiscriminatorPath::ExtensionUrl => {
                    diff.extension_url_discriminators == snap.extension_url_discriminators
                }
                DiscriminatorPath::Type => {
                    let codes = |e: &ElementData| {
                        e.type_links.iter().map(|l| l.code.clone()).collect::<Vec<_>>()
                    };
                    codes(diff) == codes(snap)
                }
                DiscriminatorPath::This => same_fixed(Some(diff), Some(snap)),
                DiscriminatorPath::Relative(relative) => {
                    let diff_target = differential
                        .find_unique_descendant_with_path(id, &format!("{}.{}", diff.path, relative))
                        .map(|n| differential.data(n).element());
                    let snap_target = self
                        .snapshot
                        .find_unique_descendant_with_path(
                            candidate,
                            &format!("{}.{}", snap.path, relative),
                        )
                        .map(|n| self.snapshot.data(n).element());
                    same_fixed(diff_target, snap_target)
                }
                DiscriminatorPath::Unsupported(path) => {
                    events.event(
                        RendererEventType::UnresolvedDiscriminator,
                        format!("Cannot evaluate discriminator '{}' on {}", path, diff.path),
                    )?;
                    false
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_id(&self, element: &ElementData, found: NodeId, events: &mut dyn EventSink) -> Result<()> {
        if element.placeholder {
            return Ok(());
        }
        let backup_id = self.snapshot.data(found).element().id.as_deref();
        match (element.id.as_deref(), backup_id) {
            (None, _) => events.event(
                RendererEventType::DifferentialNodeMissingId,
                format!("Differential node {} has no id", element.path),
            ),
            (Some(own), Some(backup)) if own != backup && backup.contains("[x]") => events.event(
                RendererEventType::DifferentialChoiceNodeWrongId,
                format!("Differential node id {} differs from snapshot id {}", own, backup),
            ),
            _ => Ok(()),
        }
    }
}

/// Both present and either both unfixed or both fixed to the same value
fn same_fixed(diff: Option<&ElementData>, snap: Option<&ElementData>) -> bool {
    match (diff, snap) {
        (Some(diff), Some(snap)) => {
            diff.fixed_value.as_ref().map(|v| &v.value) == snap.fixed_value.as_ref().map(|v| &v.value)
        }
        _ => false,
    }
}

fn unique(path: &str, matches: Vec<NodeId>, by: &str) -> Result<NodeId> {
    match matches.as_slice() {
        [only] => Ok(*only),
        [] => Err(Error::mismatch(path, format!("no candidate matched by {}", by))),
        many => Err(Error::mismatch(
            path,
            format!("{} candidates matched by {}", many.len(), by),
        )),
    }
}

/// Assigns a backup node to every differential node, in pre-order.
///
/// A node that cannot be matched raises `UNMATCHED_DIFFERENTIAL_NODE`; if the
/// policy lets processing continue, the node is left without a backup.
pub fn resolve_backup_nodes(
    differential: &mut TreeData<DifferentialNode>,
    snapshot: &TreeData<SnapshotNode>,
    events: &mut dyn EventSink,
) -> Result<()> {
    let locator = BackupNodeLocator::new(snapshot);
    let ids: Vec<NodeId> = differential.iter().collect();
    let mut matched = 0usize;

    for id in ids {
        match locator.find_backup_node(differential, id, events) {
            Ok(backup) => {
                differential.data_mut(id).set_backup_node(backup);
                matched += 1;
            }
            Err(err @ Error::StructuralMismatch { .. }) => {
                events.event(RendererEventType::UnmatchedDifferentialNode, err.to_string())?;
            }
            Err(err) => return Err(err),
        }
    }

    tracing::debug!(matched, total = differential.len(), "Resolved backup nodes");
    Ok(())
}
