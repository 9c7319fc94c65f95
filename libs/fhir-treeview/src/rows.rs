//! Row derivation
//!
//! Walks a reconciled tree in pre-order and produces one [`Row`] per node,
//! carrying indentation glyphs, an icon and the annotations shown next to the
//! element. Differential nodes fall back to their backup node for anything
//! they do not restate.

use crate::config::TreeViewConfig;
use crate::error::{Error, Result};
use crate::event::{EventSink, RendererEventType};
use crate::extension::ExtensionType;
use crate::node::{
    BindingInfo, DataTypeCategory, ElementData, ElementFlags, LiteralValue, MaxCardinality,
    SlicingInfo, SnapshotNode, TreeNodeData, TypeLink,
};
use crate::tree::{NodeId, TreeData};
use serde::Serialize;
use url::Url;

/// Indentation symbol drawn for one ancestor level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeGlyph {
    /// The level continues below this row
    VLine,
    /// Branch to this row, more siblings follow
    VJoin,
    /// Branch to this row, which is the last sibling
    VJoinEnd,
    Blank,
}

impl TreeGlyph {
    pub fn as_text(&self) -> &'static str {
        match self {
            TreeGlyph::VLine => "│  ",
            TreeGlyph::VJoin => "├─ ",
            TreeGlyph::VJoinEnd => "└─ ",
            TreeGlyph::Blank => "   ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIcon {
    Reuse,
    Slice,
    Resource,
    ExtensionSimple,
    ExtensionComplex,
    Choice,
    Reference,
    Primitive,
    Datatype,
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Constraint,
    Slicing,
    SlicingDiscriminator,
    FixedValue,
    ExampleValue,
    DefaultValue,
    Binding,
    ExtensionUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub kind: AnnotationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// The url is shown as text rather than as a hyperlink
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub text_link: bool,
}

impl Annotation {
    fn text(title: &str, description: impl Into<String>, kind: AnnotationKind) -> Self {
        Self {
            title: title.to_string(),
            description: Some(description.into()),
            url: None,
            kind,
            qualifier: None,
            text_link: false,
        }
    }

    fn link(title: &str, url: impl Into<String>, kind: AnnotationKind) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            url: Some(url.into()),
            kind,
            qualifier: None,
            text_link: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub path: String,
    pub node_key: String,
    pub display_name: String,
    pub glyphs: Vec<TreeGlyph>,
    pub icon: RowIcon,
    pub flags: ElementFlags,
    /// Absent for the root row
    pub cardinality: Option<String>,
    pub uses_backup_cardinality: bool,
    pub type_links: Vec<TypeLink>,
    pub uses_backup_type_links: bool,
    pub definition: Option<String>,
    pub annotations: Vec<Annotation>,
    pub removed_by_profile: bool,
}

impl Row {
    /// Indentation glyphs followed by the display name
    pub fn tree_label(&self) -> String {
        let mut label: String = self.glyphs.iter().map(TreeGlyph::as_text).collect();
        label.push_str(&self.display_name);
        label
    }
}

/// A node's own data with its backup node behind it
struct MergedView<'a> {
    own: &'a ElementData,
    backup: Option<&'a ElementData>,
}

impl<'a> MergedView<'a> {
    fn uses_backup_cardinality(&self) -> bool {
        !self.own.has_cardinality() && self.backup.is_some_and(ElementData::has_cardinality)
    }

    /// Bounds the node leaves out are taken from its backup
    fn cardinality(&self) -> Option<String> {
        let min = self.own.min.or_else(|| self.backup.and_then(|b| b.min));
        let max = self.own.max.or_else(|| self.backup.and_then(|b| b.max));
        if min.is_none() && max.is_none() {
            return None;
        }
        Some(format!(
            "{}..{}",
            min.unwrap_or(0),
            max.unwrap_or(MaxCardinality::Unbounded)
        ))
    }

    fn uses_backup_type_links(&self) -> bool {
        self.own.type_links.is_empty() && self.backup.is_some_and(|b| !b.type_links.is_empty())
    }

    fn type_links(&self) -> &'a [TypeLink] {
        match self.backup {
            Some(backup) if self.uses_backup_type_links() => &backup.type_links,
            _ => &self.own.type_links,
        }
    }

    fn slicing(&self) -> Option<&'a SlicingInfo> {
        self.own
            .slicing
            .as_ref()
            .or_else(|| self.backup.and_then(|b| b.slicing.as_ref()))
    }

    fn definition(&self) -> Option<String> {
        self.own
            .definition
            .clone()
            .or_else(|| self.own.short.clone())
            .or_else(|| self.backup.and_then(|b| b.definition.clone().or_else(|| b.short.clone())))
    }

    fn extension_type(&self) -> Option<ExtensionType> {
        self.own
            .extension_type
            .or_else(|| self.backup.and_then(|b| b.extension_type))
    }

    /// Own binding backfilled from the backup's, or the backup's when the node has none
    fn binding(&self) -> Option<BindingInfo> {
        let backup = self.backup.and_then(|b| b.binding.as_ref());
        match (self.own.binding.as_ref(), backup) {
            (Some(own), Some(backup)) => Some(own.backfill(backup)),
            (Some(own), None) => Some(own.clone()),
            (None, backup) => backup.cloned(),
        }
    }

    fn removed_by_profile(&self) -> bool {
        if self.own.max.is_some() {
            self.own.is_removed_by_profile()
        } else {
            self.backup.is_some_and(ElementData::is_removed_by_profile)
        }
    }

    fn flags(&self) -> ElementFlags {
        let own = self.own.flags;
        match self.backup {
            Some(backup) if self.own.placeholder => backup.flags,
            _ => own,
        }
    }
}

pub struct RowDeriver<'a, D> {
    tree: &'a TreeData<D>,
    backup: Option<&'a TreeData<SnapshotNode>>,
    config: &'a TreeViewConfig,
}

impl<'a, D: TreeNodeData> RowDeriver<'a, D> {
    pub fn new(tree: &'a TreeData<D>, config: &'a TreeViewConfig) -> Self {
        Self {
            tree,
            backup: None,
            config,
        }
    }

    /// Snapshot tree that backup node ids point into
    pub fn with_backup(mut self, snapshot: &'a TreeData<SnapshotNode>) -> Self {
        self.backup = Some(snapshot);
        self
    }

    pub fn rows(&self, events: &mut dyn EventSink) -> Result<Vec<Row>> {
        let root = self.tree.root();
        let mut rows = Vec::with_capacity(self.tree.len());

        let root_vlines = vec![!self.tree.children(root).is_empty()];
        rows.push(self.row(root, Vec::new(), true, events)?);
        self.add_children(root, &root_vlines, &mut rows, events)?;
        Ok(rows)
    }

    fn add_children(
        &self,
        id: NodeId,
        vlines: &[bool],
        rows: &mut Vec<Row>,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let children = self.tree.children(id);
        for (i, &child) in children.iter().enumerate() {
            let mut child_vlines = vlines.to_vec();
            child_vlines.push(!self.tree.children(child).is_empty());
            let last_child = i == children.len() - 1;
            if last_child {
                let at = child_vlines.len() - 2;
                child_vlines[at] = false;
            }

            let glyphs = (0..vlines.len())
                .map(|j| {
                    let line_below = child_vlines[j];
                    let last_glyph = j == vlines.len() - 1;
                    match (line_below, last_glyph) {
                        (true, false) => TreeGlyph::VLine,
                        (true, true) => TreeGlyph::VJoin,
                        (false, true) => TreeGlyph::VJoinEnd,
                        (false, false) => TreeGlyph::Blank,
                    }
                })
                .collect();

            rows.push(self.row(child, glyphs, false, events)?);
            self.add_children(child, &child_vlines, rows, events)?;
        }
        Ok(())
    }

    fn backup_element(&self, id: NodeId) -> Option<&'a ElementData> {
        let backup = self.tree.data(id).backup_node()?;
        self.backup.map(|snapshot| snapshot.data(backup).element())
    }

    fn view(&self, id: NodeId) -> MergedView<'a> {
        MergedView {
            own: self.tree.data(id).element(),
            backup: self.backup_element(id),
        }
    }

    /// Key of the node `id` reuses, own link first, then its backup's
    fn linked_key(&self, id: NodeId) -> Option<String> {
        if let Some(linked) = self.tree.linked_node(id) {
            return Some(self.tree.node_key(linked));
        }
        let backup = self.tree.data(id).backup_node()?;
        let snapshot = self.backup?;
        snapshot
            .linked_node(backup)
            .map(|linked| snapshot.node_key(linked))
    }

    fn row(
        &self,
        id: NodeId,
        glyphs: Vec<TreeGlyph>,
        is_root: bool,
        events: &mut dyn EventSink,
    ) -> Result<Row> {
        let view = self.view(id);
        let element = view.own;
        let linked_key = self.linked_key(id);

        let mut type_links = view.type_links().to_vec();
        if type_links.is_empty() {
            if let Some(key) = &linked_key {
                type_links.push(TypeLink::new(format!("see {}", key)));
            }
        }
        if type_links.is_empty() && !is_root {
            events.event(
                RendererEventType::EmptyTypeLinks,
                format!("No type links available for {}", element.path),
            )?;
        }

        let cardinality = if is_root { None } else { view.cardinality() };
        if cardinality.is_none() && !is_root {
            events.event(
                RendererEventType::MissingCardinality,
                format!("No cardinality for {}", element.path),
            )?;
        }

        Ok(Row {
            path: element.path.clone(),
            node_key: self.tree.node_key(id),
            display_name: element.display_name(),
            glyphs,
            icon: self.icon(id, &view, linked_key.is_some(), is_root),
            flags: view.flags(),
            cardinality,
            uses_backup_cardinality: view.uses_backup_cardinality(),
            uses_backup_type_links: view.uses_backup_type_links(),
            type_links,
            definition: view.definition(),
            annotations: self.annotations(id, &view, events)?,
            removed_by_profile: view.removed_by_profile(),
        })
    }

    fn icon(&self, id: NodeId, view: &MergedView<'_>, linked: bool, is_root: bool) -> RowIcon {
        if linked {
            return RowIcon::Reuse;
        }
        if view.slicing().is_some() {
            return RowIcon::Slice;
        }
        if is_root {
            return RowIcon::Resource;
        }
        match view.extension_type() {
            Some(ExtensionType::Simple) => return RowIcon::ExtensionSimple,
            Some(ExtensionType::Complex) => return RowIcon::ExtensionComplex,
            None => {}
        }
        match DataTypeCategory::classify(&view.own.path, view.type_links()) {
            DataTypeCategory::Choice => RowIcon::Choice,
            DataTypeCategory::Reference => RowIcon::Reference,
            DataTypeCategory::Primitive => RowIcon::Primitive,
            DataTypeCategory::Resource => RowIcon::Resource,
            DataTypeCategory::Datatype => RowIcon::Datatype,
            DataTypeCategory::Unknown if self.tree.children(id).is_empty() => RowIcon::Datatype,
            DataTypeCategory::Unknown => RowIcon::Element,
        }
    }

    /// Slicing declared by an ancestor, or by the header sitting next to it
    fn ancestor_slicing(&self, ancestor: NodeId) -> Option<&'a SlicingInfo> {
        if let Some(slicing) = self.view(ancestor).slicing() {
            return Some(slicing);
        }
        let header = crate::discriminator::slice_header(self.tree, ancestor)?;
        self.view(header).slicing()
    }

    fn annotations(
        &self,
        id: NodeId,
        view: &MergedView<'_>,
        events: &mut dyn EventSink,
    ) -> Result<Vec<Annotation>> {
        let element = view.own;
        let path = element.path.as_str();
        let mut annotations = Vec::new();

        for constraint in &element.constraints {
            let mut annotation =
                Annotation::text("Constraint", &constraint.description, AnnotationKind::Constraint);
            annotation.qualifier = Some(format!("({})", constraint.key));
            annotations.push(annotation);
        }

        if let Some(summary) = view.slicing().and_then(SlicingInfo::summary) {
            annotations.push(Annotation::text("Slicing", summary, AnnotationKind::Slicing));
        }

        for ancestor in self.tree.ancestors(id) {
            let Some(slicing) = self.ancestor_slicing(ancestor) else {
                continue;
            };
            let root = format!("{}.", self.tree.path(ancestor));
            for discriminator in &slicing.discriminators {
                if format!("{}{}", root, discriminator) == path {
                    annotations.push(Annotation::text(
                        "Slice discriminator",
                        discriminator,
                        AnnotationKind::SlicingDiscriminator,
                    ));
                }
            }
        }

        if element.is_fixed() && element.default_value.is_some() {
            return Err(Error::InvalidState(format!(
                "{} has both a fixed value and a default value",
                path
            )));
        }

        if let Some(fixed) = &element.fixed_value {
            annotations.push(self.fixed_value_annotation(path, fixed));
        } else {
            for example in &element.examples {
                annotations.push(Annotation::text(
                    "Example Value",
                    example.text(),
                    AnnotationKind::ExampleValue,
                ));
            }
        }

        if let Some(default) = &element.default_value {
            annotations.push(self.maybe_link("Default Value", default.text(), AnnotationKind::DefaultValue));
        }

        if let Some(mut binding) = view.binding() {
            if !binding.has_description_or_url() {
                events.event(
                    RendererEventType::BindingWithoutDescOrUrl,
                    format!("Binding on {} has neither a description nor a value set", path),
                )?;
                binding = BindingInfo::stand_in(binding.strength);
            }
            if binding.is_stand_in() {
                if !view.removed_by_profile() {
                    events.event(
                        RendererEventType::StandInBindingDescriptionNotRemoved,
                        format!("Stand-in binding description would be displayed for {}", path),
                    )?;
                }
            } else {
                annotations.push(Annotation {
                    title: "Binding".to_string(),
                    description: binding.description,
                    url: binding.url,
                    kind: AnnotationKind::Binding,
                    qualifier: binding.strength,
                    text_link: false,
                });
            }
        }

        if element.is_extension() {
            for link in view.type_links().iter().filter(|l| l.code == "Extension") {
                for profile in &link.profiles {
                    annotations.push(Annotation::link("URL", profile, AnnotationKind::ExtensionUrl));
                }
            }
        }

        Ok(annotations)
    }

    fn fixed_value_annotation(&self, path: &str, fixed: &LiteralValue) -> Annotation {
        let value = fixed.text();
        let system_path = path.ends_with("coding.system") || path.ends_with("identifier.system");
        // a system that cannot be parsed as a URL is shown as text, not as a hyperlink
        if system_path
            && looks_like_url(&value)
            && !self.config.is_logical_url(&value)
            && Url::parse(&value).is_err()
        {
            let mut annotation = Annotation::link("Fixed Value", value, AnnotationKind::FixedValue);
            annotation.text_link = true;
            return annotation;
        }
        self.maybe_link("Fixed Value", value, AnnotationKind::FixedValue)
    }

    fn maybe_link(&self, title: &str, value: String, kind: AnnotationKind) -> Annotation {
        if looks_like_url(&value) && !self.config.is_logical_url(&value) {
            Annotation::link(title, value, kind)
        } else {
            Annotation::text(title, value, kind)
        }
    }
}

fn looks_like_url(value: &str) -> bool {
    let has_scheme = value.starts_with("http://") || value.starts_with("https://");
    if !has_scheme && value.contains('/') {
        tracing::debug!(value, "Value contains '/' but has no http(s) scheme");
    }
    has_scheme
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventRecorder;
    use crate::node::ConstraintInfo;
    use serde_json::json;

    fn node(path: &str, code: &str) -> SnapshotNode {
        SnapshotNode::new(ElementData {
            id: Some(path.to_string()),
            path: path.to_string(),
            min: Some(0),
            max: Some(MaxCardinality::Unbounded),
            type_links: vec![TypeLink::new(code)],
            ..ElementData::default()
        })
    }

    fn derive(tree: &TreeData<SnapshotNode>) -> Vec<Row> {
        let config = TreeViewConfig::default();
        RowDeriver::new(tree, &config)
            .rows(&mut EventRecorder::default())
            .unwrap()
    }

    #[test]
    fn test_glyphs() {
        let mut tree = TreeData::new(SnapshotNode::new(ElementData {
            path: "Patient".into(),
            ..ElementData::default()
        }));
        let root = tree.root();
        let name = tree.add_child(root, node("Patient.name", "HumanName"));
        tree.add_child(name, node("Patient.name.given", "string"));
        tree.add_child(root, node("Patient.gender", "code"));

        let rows = derive(&tree);
        let glyphs: Vec<Vec<TreeGlyph>> = rows.iter().map(|r| r.glyphs.clone()).collect();
        assert_eq!(
            glyphs,
            vec![
                vec![],
                vec![TreeGlyph::VJoin],
                vec![TreeGlyph::VLine, TreeGlyph::VJoinEnd],
                vec![TreeGlyph::VJoinEnd],
            ]
        );
        assert_eq!(rows[0].cardinality, None);
        assert_eq!(rows[0].icon, RowIcon::Resource);
        assert_eq!(rows[2].tree_label(), "│  └─ given");
    }

    #[test]
    fn test_annotation_order() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut identifier = node("Patient.identifier", "Identifier");
        identifier.element.slicing = Some(SlicingInfo {
            description: None,
            discriminators: vec!["system".into()],
            ordered: None,
            rules: Some("open".into()),
        });
        let identifier = tree.add_child(root, identifier);

        let mut system = node("Patient.identifier.system", "uri");
        system.element.constraints = vec![ConstraintInfo {
            key: "sys-1".into(),
            description: "Must be a URI".into(),
        }];
        system.element.fixed_value = Some(LiteralValue {
            type_name: "Uri".into(),
            value: json!("http://example.org/ids"),
        });
        system.element.examples = vec![LiteralValue {
            type_name: "Uri".into(),
            value: json!("http://ignored"),
        }];
        tree.add_child(identifier, system);

        let rows = derive(&tree);
        assert_eq!(rows[1].icon, RowIcon::Slice);
        assert_eq!(rows[1].annotations[0].kind, AnnotationKind::Slicing);

        let kinds: Vec<AnnotationKind> = rows[2].annotations.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnnotationKind::Constraint,
                AnnotationKind::SlicingDiscriminator,
                AnnotationKind::FixedValue,
            ]
        );
        let fixed = &rows[2].annotations[2];
        assert!(!fixed.text_link);
        assert_eq!(fixed.url.as_deref(), Some("http://example.org/ids"));
        assert_eq!(rows[2].annotations[0].qualifier.as_deref(), Some("(sys-1)"));
    }

    #[test]
    fn test_logical_url_is_plain_text() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut system = node("Patient.identifier.system", "uri");
        system.element.fixed_value = Some(LiteralValue {
            type_name: "Uri".into(),
            value: json!("https://fhir.nhs.uk/Id/nhs-number"),
        });
        let identifier = tree.add_child(root, node("Patient.identifier", "Identifier"));
        tree.add_child(identifier, system);

        let rows = derive(&tree);
        let fixed = &rows[2].annotations[0];
        assert_eq!(fixed.description.as_deref(), Some("https://fhir.nhs.uk/Id/nhs-number"));
        assert!(fixed.url.is_none());
    }

    #[test]
    fn test_unparseable_system_url_is_text_link() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut system = node("Patient.identifier.system", "uri");
        system.element.fixed_value = Some(LiteralValue {
            type_name: "Uri".into(),
            value: json!("http://example org/ids"),
        });
        let identifier = tree.add_child(root, node("Patient.identifier", "Identifier"));
        tree.add_child(identifier, system);

        let rows = derive(&tree);
        let fixed = &rows[2].annotations[0];
        assert!(fixed.text_link);
        assert_eq!(fixed.url.as_deref(), Some("http://example org/ids"));
    }

    #[test]
    fn test_fixed_and_default_is_invalid() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut active = node("Patient.active", "boolean");
        active.element.fixed_value = Some(LiteralValue {
            type_name: "Boolean".into(),
            value: json!(true),
        });
        active.element.default_value = active.element.fixed_value.clone();
        tree.add_child(root, active);

        let config = TreeViewConfig::default();
        let err = RowDeriver::new(&tree, &config)
            .rows(&mut EventRecorder::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_stand_in_binding_is_suppressed() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut gender = node("Patient.gender", "code");
        gender.element.binding = Some(BindingInfo {
            description: None,
            url: None,
            strength: Some("required".into()),
        });
        tree.add_child(root, gender);

        let config = TreeViewConfig::default();
        let mut events = EventRecorder::default();
        let rows = RowDeriver::new(&tree, &config).rows(&mut events).unwrap();
        assert!(rows[1].annotations.is_empty());
        assert!(events.has(RendererEventType::BindingWithoutDescOrUrl));
        assert!(events.has(RendererEventType::StandInBindingDescriptionNotRemoved));
    }

    #[test]
    fn test_empty_type_links_throw() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut untyped = node("Patient.name", "HumanName");
        untyped.element.type_links.clear();
        tree.add_child(root, untyped);

        let config = TreeViewConfig::default();
        let err = RowDeriver::new(&tree, &config)
            .rows(&mut EventRecorder::default())
            .unwrap_err();
        assert_eq!(err.event_kind(), Some(RendererEventType::EmptyTypeLinks));
    }

    #[test]
    fn test_linked_node_gets_see_link_and_reuse_icon() {
        let mut tree = TreeData::new(node("Questionnaire", "Questionnaire"));
        let root = tree.root();
        let item = tree.add_child(root, node("Questionnaire.item", "BackboneElement"));
        let mut nested = node("Questionnaire.item.item", "BackboneElement");
        nested.element.type_links.clear();
        let nested = tree.add_child(item, nested);
        tree.set_linked_node(nested, item);

        let rows = derive(&tree);
        assert_eq!(rows[2].icon, RowIcon::Reuse);
        assert_eq!(rows[2].type_links[0].code, "see Questionnaire.item");
    }

    #[test]
    fn test_extension_icons_and_urls() {
        let mut tree = TreeData::new(node("Patient", "Patient"));
        let root = tree.root();
        let mut extension = node("Patient.extension", "Extension");
        extension.element.type_links[0].profiles = vec!["http://x/ethnic".into()];
        extension.element.extension_type = Some(ExtensionType::Complex);
        tree.add_child(root, extension);

        let rows = derive(&tree);
        assert_eq!(rows[1].icon, RowIcon::ExtensionComplex);
        assert_eq!(rows[1].annotations[0].kind, AnnotationKind::ExtensionUrl);
        assert_eq!(rows[1].annotations[0].url.as_deref(), Some("http://x/ethnic"));
    }
}
