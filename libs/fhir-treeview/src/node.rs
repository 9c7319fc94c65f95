//! Node payloads shared by snapshot and differential trees

use crate::extension::ExtensionType;
use crate::tree::NodeId;
use ferrum_models::{
    ChoiceValue, ElementDefinition, ElementDefinitionBinding, ElementDefinitionSlicing,
    FhirVersion,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Description given to bindings that have neither a description nor a value set
pub const STAND_IN_DESCRIPTION: &str = "STAND IN STRING BECAUSE IT'S MISSING FROM THE SNAPSHOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaxCardinality {
    Unbounded,
    Bounded(u32),
}

impl MaxCardinality {
    pub fn parse(value: &str) -> Option<Self> {
        if value == "*" {
            Some(MaxCardinality::Unbounded)
        } else {
            value.parse().ok().map(MaxCardinality::Bounded)
        }
    }
}

impl fmt::Display for MaxCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxCardinality::Unbounded => f.write_str("*"),
            MaxCardinality::Bounded(n) => write!(f, "{}", n),
        }
    }
}

/// A declared type, with the profiles nested beneath it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeLink {
    pub code: String,
    pub profiles: Vec<String>,
    pub target_profiles: Vec<String>,
}

impl TypeLink {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            profiles: Vec::new(),
            target_profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlicingInfo {
    pub description: Option<String>,
    pub discriminators: Vec<String>,
    pub ordered: Option<bool>,
    pub rules: Option<String>,
}

impl SlicingInfo {
    fn from_model(slicing: &ElementDefinitionSlicing) -> Self {
        Self {
            description: slicing.description.clone(),
            discriminators: slicing
                .discriminator
                .iter()
                .map(|d| d.path.clone())
                .collect(),
            ordered: slicing.ordered,
            rules: slicing.rules.map(|r| r.to_string()),
        }
    }

    /// Human readable summary, `None` when nothing was declared
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(description) = &self.description {
            parts.push(format!("Description: {}", description));
        }
        match self.discriminators.as_slice() {
            [] => {}
            [single] => parts.push(format!("Discriminator: {}", single)),
            many => parts.push(format!("Discriminators: [{}]", many.join(" "))),
        }
        if let Some(ordered) = self.ordered {
            parts.push(format!("Ordering: {}", ordered));
        }
        if let Some(rules) = &self.rules {
            parts.push(format!("Rules: {}", rules));
        }
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// A literal `[x]` value with the type it was declared as
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteralValue {
    pub type_name: String,
    pub value: Value,
}

impl LiteralValue {
    fn from_choice(choice: ChoiceValue<'_>) -> Self {
        Self {
            type_name: choice.type_name.to_string(),
            value: choice.value.clone(),
        }
    }

    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindingInfo {
    pub description: Option<String>,
    pub url: Option<String>,
    pub strength: Option<String>,
}

impl BindingInfo {
    fn from_model(binding: &ElementDefinitionBinding) -> Self {
        Self {
            description: binding.description.clone(),
            url: binding.value_set_url().map(str::to_string),
            strength: binding.strength.map(|s| s.to_string()),
        }
    }

    /// Fill fields missing here from `backup`
    pub fn backfill(&self, backup: &BindingInfo) -> BindingInfo {
        BindingInfo {
            description: self.description.clone().or_else(|| backup.description.clone()),
            url: self.url.clone().or_else(|| backup.url.clone()),
            strength: self.strength.clone().or_else(|| backup.strength.clone()),
        }
    }

    pub fn has_description_or_url(&self) -> bool {
        self.description.is_some() || self.url.is_some()
    }

    pub fn is_stand_in(&self) -> bool {
        self.description.as_deref() == Some(STAND_IN_DESCRIPTION)
    }

    pub(crate) fn stand_in(strength: Option<String>) -> Self {
        Self {
            description: Some(STAND_IN_DESCRIPTION.to_string()),
            url: None,
            strength,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintInfo {
    pub key: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ElementFlags {
    pub must_support: bool,
    pub modifier: bool,
    pub summary: bool,
    pub constrained: bool,
}

/// Coarse data-type classification used for icon selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataTypeCategory {
    Choice,
    Reference,
    Primitive,
    Resource,
    Datatype,
    Unknown,
}

impl DataTypeCategory {
    pub fn classify(path: &str, type_links: &[TypeLink]) -> Self {
        if path.ends_with("[x]") || type_links.len() > 1 {
            return DataTypeCategory::Choice;
        }
        let Some(link) = type_links.first() else {
            return DataTypeCategory::Unknown;
        };
        match link.code.as_str() {
            "Reference" => DataTypeCategory::Reference,
            "Resource" | "DomainResource" => DataTypeCategory::Resource,
            code if code.starts_with(|c: char| c.is_ascii_lowercase()) => {
                DataTypeCategory::Primitive
            }
            _ => DataTypeCategory::Datatype,
        }
    }
}

/// Attributes every tree node carries, whatever its role
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementData {
    pub id: Option<String>,
    pub path: String,
    pub name: Option<String>,
    pub slice_name: Option<String>,
    pub min: Option<u32>,
    pub max: Option<MaxCardinality>,
    pub type_links: Vec<TypeLink>,
    pub slicing: Option<SlicingInfo>,
    pub fixed_value: Option<LiteralValue>,
    pub default_value: Option<LiteralValue>,
    pub examples: Vec<LiteralValue>,
    pub binding: Option<BindingInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub flags: ElementFlags,
    pub short: Option<String>,
    pub definition: Option<String>,
    pub linked_node_id: Option<String>,
    pub linked_node_name: Option<String>,
    pub extension_type: Option<ExtensionType>,
    /// Extension profile URLs reachable through a `url` discriminator
    pub extension_url_discriminators: BTreeSet<String>,
    /// Value that tells this slice apart from its siblings
    pub discriminator_value: Option<String>,
    /// Inserted to fill a gap in a differential; carries only a path
    pub placeholder: bool,
}

impl ElementData {
    pub fn from_definition(def: &ElementDefinition, version: FhirVersion) -> Self {
        let type_links = def
            .types
            .iter()
            .flatten()
            .map(|t| TypeLink {
                code: t.code.clone(),
                profiles: t.profile.clone(),
                target_profiles: t.target_profile.clone(),
            })
            .collect();

        let constraints: Vec<ConstraintInfo> = def
            .constraint
            .iter()
            .flatten()
            .map(|c| ConstraintInfo {
                key: c.key.clone(),
                description: c.human.clone(),
            })
            .collect();

        let (linked_node_id, linked_node_name) = if version.links_by_name() {
            (None, def.name_reference.clone())
        } else {
            (def.content_reference_id().map(str::to_string), None)
        };

        Self {
            id: def.id.clone(),
            path: def.path.clone(),
            name: def.name.clone(),
            slice_name: def.slice_name.clone(),
            min: def.min,
            max: def.max.as_deref().and_then(MaxCardinality::parse),
            type_links,
            slicing: def.slicing.as_ref().map(SlicingInfo::from_model),
            fixed_value: def.fixed().or_else(|| def.pattern()).map(LiteralValue::from_choice),
            default_value: def.default_value().map(LiteralValue::from_choice),
            examples: def
                .example_values()
                .into_iter()
                .map(LiteralValue::from_choice)
                .collect(),
            binding: def.binding.as_ref().map(BindingInfo::from_model),
            flags: ElementFlags {
                must_support: def.must_support.unwrap_or(false),
                modifier: def.is_modifier.unwrap_or(false),
                summary: def.is_summary.unwrap_or(false),
                constrained: !constraints.is_empty(),
            },
            constraints,
            short: def.short.clone(),
            definition: def.definition.clone(),
            linked_node_id,
            linked_node_name,
            ..Self::default()
        }
    }

    pub fn placeholder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            placeholder: true,
            ..Self::default()
        }
    }

    /// Last path segment
    pub fn path_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.path.rfind('.').map(|pos| &self.path[..pos])
    }

    pub fn display_name(&self) -> String {
        match self.slice_name.as_deref() {
            Some(slice) if slice != self.path_name() => {
                format!("{} ({})", self.path_name(), slice)
            }
            _ => self.path_name().to_string(),
        }
    }

    pub fn has_slicing_info(&self) -> bool {
        self.slicing.is_some()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_value.is_some()
    }

    pub fn is_extension(&self) -> bool {
        matches!(self.path_name(), "extension" | "modifierExtension")
    }

    pub fn is_removed_by_profile(&self) -> bool {
        self.max == Some(MaxCardinality::Bounded(0))
    }

    pub fn has_cardinality(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Role-specific data carried by a tree node
pub trait TreeNodeData {
    fn element(&self) -> &ElementData;

    fn element_mut(&mut self) -> &mut ElementData;

    /// Matching snapshot node, for differential nodes once reconciled
    fn backup_node(&self) -> Option<NodeId> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    pub element: ElementData,
}

impl SnapshotNode {
    pub fn new(element: ElementData) -> Self {
        Self { element }
    }
}

impl TreeNodeData for SnapshotNode {
    fn element(&self) -> &ElementData {
        &self.element
    }

    fn element_mut(&mut self) -> &mut ElementData {
        &mut self.element
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialNode {
    pub element: ElementData,
    backup_node: Option<NodeId>,
}

impl DifferentialNode {
    pub fn new(element: ElementData) -> Self {
        Self {
            element,
            backup_node: None,
        }
    }

    /// Records the matching snapshot node. Only the first assignment sticks.
    pub fn set_backup_node(&mut self, node: NodeId) {
        if self.backup_node.is_none() {
            self.backup_node = Some(node);
        }
    }
}

impl TreeNodeData for DifferentialNode {
    fn element(&self) -> &ElementData {
        &self.element
    }

    fn element_mut(&mut self) -> &mut ElementData {
        &mut self.element
    }

    fn backup_node(&self) -> Option<NodeId> {
        self.backup_node
    }
}
