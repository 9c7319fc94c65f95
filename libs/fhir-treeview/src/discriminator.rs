//! Slicing discriminator cache
//!
//! Runs once per tree before node matching. Extension nodes get the set of
//! extension profile URLs a `url` discriminator would see; slices get the
//! value their header's first resolvable discriminator picks out.

use crate::error::Result;
use crate::event::{EventSink, RendererEventType};
use crate::node::TreeNodeData;
use crate::tree::{NodeId, TreeData};
use std::collections::BTreeSet;

/// Placeholder used in node keys when a slice cannot be told apart
pub const MISSING_DISCRIMINATOR_VALUE: &str = "<missing>";

/// How a discriminator path is evaluated against a slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscriminatorPath<'a> {
    /// `url` on an extension slice
    ExtensionUrl,
    /// `@type`
    Type,
    /// `$this`
    This,
    /// A relative element path such as `system` or `code.coding.system`
    Relative(&'a str),
    /// FHIRPath the engine does not evaluate, e.g. `resolve()` or `extension('x')`
    Unsupported(&'a str),
}

impl<'a> DiscriminatorPath<'a> {
    pub fn parse(path: &'a str, on_extension: bool) -> Self {
        match path {
            "url" if on_extension => DiscriminatorPath::ExtensionUrl,
            "@type" => DiscriminatorPath::Type,
            "$this" => DiscriminatorPath::This,
            p if p.contains(['(', '@', '$']) => DiscriminatorPath::Unsupported(p),
            p => DiscriminatorPath::Relative(p),
        }
    }
}

/// Sibling of `id` that introduces its slicing
pub fn slice_header<D: TreeNodeData>(tree: &TreeData<D>, id: NodeId) -> Option<NodeId> {
    let parent = tree.parent(id)?;
    let path = tree.path(id);
    tree.children(parent).iter().copied().find(|&sibling| {
        sibling != id && tree.path(sibling) == path && tree.data(sibling).element().has_slicing_info()
    })
}

/// Extension profile URLs declared on an extension node or fixed on its `url` child
pub fn extension_urls<D: TreeNodeData>(tree: &TreeData<D>, id: NodeId) -> BTreeSet<String> {
    let element = tree.data(id).element();
    let mut urls: BTreeSet<String> = element
        .type_links
        .iter()
        .filter(|link| link.code == "Extension")
        .flat_map(|link| link.profiles.iter().cloned())
        .collect();

    let url_path = format!("{}.url", element.path);
    if let Some(url_child) = tree
        .children(id)
        .iter()
        .copied()
        .find(|&child| tree.path(child) == url_path)
    {
        if let Some(fixed) = &tree.data(url_child).element().fixed_value {
            urls.insert(fixed.text());
        }
    }
    urls
}

/// Value a single discriminator selects for the slice at `id`
fn discriminator_value<D: TreeNodeData>(
    tree: &TreeData<D>,
    id: NodeId,
    discriminator: DiscriminatorPath<'_>,
) -> Option<String> {
    let element = tree.data(id).element();
    match discriminator {
        DiscriminatorPath::ExtensionUrl => {
            element.extension_url_discriminators.iter().next().cloned()
        }
        DiscriminatorPath::Type => {
            let codes: Vec<&str> = element.type_links.iter().map(|l| l.code.as_str()).collect();
            (!codes.is_empty()).then(|| codes.join(" | "))
        }
        DiscriminatorPath::This => element.fixed_value.as_ref().map(|v| v.text()),
        DiscriminatorPath::Relative(relative) => {
            let target = tree
                .find_unique_descendant_with_path(id, &format!("{}.{}", element.path, relative))?;
            let target = tree.data(target).element();
            target.fixed_value.as_ref().map(|v| v.text()).or_else(|| {
                target
                    .binding
                    .as_ref()
                    .and_then(|b| b.description.clone().or_else(|| b.url.clone()))
            })
        }
        DiscriminatorPath::Unsupported(_) => None,
    }
}

/// Populates `extension_url_discriminators` and `discriminator_value` across `tree`
pub fn cache_discriminators<D: TreeNodeData>(
    tree: &mut TreeData<D>,
    events: &mut dyn EventSink,
) -> Result<()> {
    let ids: Vec<NodeId> = tree.iter().collect();

    // extension URLs first; discriminator values below read them
    for &id in &ids {
        if tree.data(id).element().is_extension() {
            let urls = extension_urls(tree, id);
            tree.data_mut(id).element_mut().extension_url_discriminators = urls;
        }
    }

    for &id in &ids {
        let element = tree.data(id).element();
        if let Some(slicing) = &element.slicing {
            if slicing.discriminators.is_empty() {
                events.event(
                    RendererEventType::SlicingWithoutDiscriminator,
                    format!("Slicing on {} declares no discriminators", element.path),
                )?;
            }
            continue;
        }

        let Some(header) = slice_header(tree, id) else {
            continue;
        };
        let discriminators = tree
            .data(header)
            .element()
            .slicing
            .as_ref()
            .map(|s| s.discriminators.clone())
            .unwrap_or_default();
        let on_extension = element.is_extension();
        let has_slice_name = element.slice_name.is_some();
        let path = element.path.clone();

        if discriminators.is_empty() {
            if !has_slice_name {
                events.event(
                    RendererEventType::NoDiscriminatorsFound,
                    format!("Unnamed slice of {} with no discriminators", path),
                )?;
            }
            continue;
        }

        let value = discriminators.iter().find_map(|d| {
            discriminator_value(tree, id, DiscriminatorPath::parse(d, on_extension))
        });

        match value {
            Some(value) => tree.data_mut(id).element_mut().discriminator_value = Some(value),
            None if has_slice_name => {
                tracing::debug!(path = %path, "Named slice has no resolvable discriminator value");
            }
            None => {
                events.event(
                    RendererEventType::UnresolvedDiscriminator,
                    format!(
                        "Could not resolve discriminators [{}] for unnamed slice of {}",
                        discriminators.join(", "),
                        path
                    ),
                )?;
                tree.data_mut(id).element_mut().discriminator_value =
                    Some(MISSING_DISCRIMINATOR_VALUE.to_string());
            }
        }
    }
    Ok(())
}
