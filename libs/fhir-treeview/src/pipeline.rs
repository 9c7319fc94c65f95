//! End-to-end reconciliation of a StructureDefinition
//!
//! Builds the snapshot and differential trees, then runs the passes in the
//! order later passes depend on: extension types, discriminator cache, backup
//! nodes, linked nodes. The result derives rows for either view.

use crate::backup::resolve_backup_nodes;
use crate::builder::{build_differential_tree, build_snapshot_tree};
use crate::config::TreeViewConfig;
use crate::discriminator::cache_discriminators;
use crate::error::Result;
use crate::event::EventSink;
use crate::extension::{lookup_extension_type, ExtensionTypeResolver, PermittedMissingExtensions};
use crate::linked::{resolve_linked_nodes, LinkKey};
use crate::node::{DifferentialNode, SnapshotNode, TreeNodeData};
use crate::rows::{Row, RowDeriver};
use crate::tree::{NodeId, TreeData};
use ferrum_models::{ElementDefinition, FhirVersion, StructureDefinition};

/// FHIR version of `sd`. Without a `fhirVersion`, a DSTU2 `constrainedType`
/// marks DSTU2 and anything else is read as R4.
pub fn detect_version(sd: &StructureDefinition) -> Result<FhirVersion> {
    if let Some(version) = sd.fhir_version()? {
        return Ok(version);
    }
    if sd.constrained_type.is_some() {
        return Ok(FhirVersion::Dstu2);
    }
    tracing::debug!(url = %sd.url, "No fhirVersion declared, assuming R4");
    Ok(FhirVersion::R4)
}

pub struct Reconciler<'a> {
    config: &'a TreeViewConfig,
    extensions: &'a dyn ExtensionTypeResolver,
    permitted: PermittedMissingExtensions,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a TreeViewConfig, extensions: &'a dyn ExtensionTypeResolver) -> Self {
        Self {
            config,
            extensions,
            permitted: PermittedMissingExtensions::new(
                config.permitted_missing_extension_prefixes.iter().cloned(),
            ),
        }
    }

    /// Shares a permitted-missing table with other reconcilers in the same batch
    pub fn with_permitted_missing(mut self, permitted: PermittedMissingExtensions) -> Self {
        self.permitted = permitted;
        self
    }

    pub fn permitted_missing(&self) -> &PermittedMissingExtensions {
        &self.permitted
    }

    pub fn reconcile(
        &self,
        sd: &StructureDefinition,
        events: &mut dyn EventSink,
    ) -> Result<ReconciledProfile> {
        let version = detect_version(sd)?;
        self.reconcile_with_version(sd, version, events)
    }

    pub fn reconcile_with_version(
        &self,
        sd: &StructureDefinition,
        version: FhirVersion,
        events: &mut dyn EventSink,
    ) -> Result<ReconciledProfile> {
        tracing::info!(url = %sd.url, %version, "Reconciling structure definition");
        let snapshot = &sd.snapshot()?.element;
        let differential = sd.differential.as_ref().map(|d| d.element.as_slice());
        self.reconcile_elements(snapshot, differential, version, events)
    }

    pub fn reconcile_elements(
        &self,
        snapshot: &[ElementDefinition],
        differential: Option<&[ElementDefinition]>,
        version: FhirVersion,
        events: &mut dyn EventSink,
    ) -> Result<ReconciledProfile> {
        let snapshot = build_snapshot_tree(snapshot, version)?;
        let differential = differential
            .filter(|elements| !elements.is_empty())
            .map(|elements| build_differential_tree(elements, version))
            .transpose()?;
        self.reconcile_trees(snapshot, differential, version, events)
    }

    pub fn reconcile_trees(
        &self,
        mut snapshot: TreeData<SnapshotNode>,
        mut differential: Option<TreeData<DifferentialNode>>,
        version: FhirVersion,
        events: &mut dyn EventSink,
    ) -> Result<ReconciledProfile> {
        self.resolve_extension_types(&mut snapshot, version, events)?;
        cache_discriminators(&mut snapshot, events)?;
        resolve_linked_nodes(&mut snapshot, LinkKey::Id, events)?;
        resolve_linked_nodes(&mut snapshot, LinkKey::Name, events)?;

        if let Some(differential) = differential.as_mut() {
            self.resolve_extension_types(differential, version, events)?;
            cache_discriminators(differential, events)?;
            resolve_backup_nodes(differential, &snapshot, events)?;
            resolve_linked_nodes(differential, LinkKey::Id, events)?;
            resolve_linked_nodes(differential, LinkKey::Name, events)?;
        }

        let mut profile = ReconciledProfile {
            snapshot,
            differential,
            version,
            config: self.config.clone(),
        };
        if self.config.strip_removed_elements {
            profile.strip_removed_elements()?;
        }
        Ok(profile)
    }

    fn resolve_extension_types<D: TreeNodeData>(
        &self,
        tree: &mut TreeData<D>,
        version: FhirVersion,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let ids: Vec<NodeId> = tree.iter().collect();
        for id in ids {
            let element = tree.data(id).element();
            if !element.is_extension() {
                continue;
            }
            let Some(profile) = element
                .type_links
                .iter()
                .filter(|link| link.code == "Extension")
                .flat_map(|link| link.profiles.first())
                .next()
                .cloned()
            else {
                continue;
            };
            let resolved =
                lookup_extension_type(self.extensions, &self.permitted, &profile, version, events)?;
            tree.data_mut(id).element_mut().extension_type = resolved;
        }
        Ok(())
    }
}

/// Snapshot and differential trees after every reconciliation pass
#[derive(Debug, Clone)]
pub struct ReconciledProfile {
    pub snapshot: TreeData<SnapshotNode>,
    pub differential: Option<TreeData<DifferentialNode>>,
    pub version: FhirVersion,
    config: TreeViewConfig,
}

impl ReconciledProfile {
    pub fn snapshot_rows(&self, events: &mut dyn EventSink) -> Result<Vec<Row>> {
        RowDeriver::new(&self.snapshot, &self.config).rows(events)
    }

    /// `None` when the profile has no differential
    pub fn differential_rows(&self, events: &mut dyn EventSink) -> Result<Option<Vec<Row>>> {
        self.differential
            .as_ref()
            .map(|differential| {
                RowDeriver::new(differential, &self.config)
                    .with_backup(&self.snapshot)
                    .rows(events)
            })
            .transpose()
    }

    /// Detaches every `max = 0` subtree from both trees. Returns the number of
    /// subtrees removed.
    pub fn strip_removed_elements(&mut self) -> Result<usize> {
        let mut removed = strip_removed_elements(&mut self.snapshot, |_| false)?;
        if let Some(differential) = self.differential.as_mut() {
            let snapshot = &self.snapshot;
            removed += strip_removed_elements(differential, |node: &DifferentialNode| {
                node.element.max.is_none()
                    && node
                        .backup_node()
                        .is_some_and(|b| snapshot.data(b).element().is_removed_by_profile())
            })?;
        }
        Ok(removed)
    }
}

/// Detaches the subtree of every node removed by the profile, or for which
/// `removed_by_backup` holds.
pub fn strip_removed_elements<D, F>(tree: &mut TreeData<D>, removed_by_backup: F) -> Result<usize>
where
    D: TreeNodeData,
    F: Fn(&D) -> bool,
{
    let root = tree.root();
    let removed: Vec<NodeId> = tree
        .iter()
        .filter(|&id| id != root)
        .filter(|&id| {
            let data = tree.data(id);
            data.element().is_removed_by_profile() || removed_by_backup(data)
        })
        .collect();

    for &id in &removed {
        tree.detach(id)?;
    }
    if !removed.is_empty() {
        tracing::debug!(count = removed.len(), "Stripped elements removed by profile");
    }
    Ok(removed.len())
}
