//! FHIR ElementDefinition model
//!
//! Version-agnostic model for ElementDefinition (used in StructureDefinition snapshots and differentials).
//! DSTU2, STU3 and R4/R5 shapes are all accepted: fields that moved or changed
//! cardinality between versions are normalised on read.

use super::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// FHIR ElementDefinition - defines an element in a resource or data type structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Unique id for inter-element referencing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Path of the element in the hierarchy (e.g., "Patient.name")
    pub path: String,

    /// Name for this particular element (DSTU2 only; later versions use sliceName)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Name for this particular element (in a slice)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,

    /// Short label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,

    /// Full formal definition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,

    /// Minimum cardinality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    /// Maximum cardinality (can be "*")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,

    /// Reference to definition of content if present (STU3+, "#id")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<String>,

    /// Reference to definition of content by element name (DSTU2)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_reference: Option<String>,

    /// Data type and profile for this element
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<ElementDefinitionType>>,

    /// Example value (as defined for type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Vec<ElementDefinitionExample>>,

    /// Condition that must evaluate to true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Vec<ElementDefinitionConstraint>>,

    /// If this modifies the meaning of other elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_modifier: Option<bool>,

    /// Include when in summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_summary: Option<bool>,

    /// ValueSet details if this is coded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<ElementDefinitionBinding>,

    /// This element is sliced - slices follow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slicing: Option<ElementDefinitionSlicing>,

    /// If this element must be supported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_support: Option<bool>,

    /// Additional content beyond core fields.
    ///
    /// Polymorphic values (`fixed[x]`, `pattern[x]`, `defaultValue[x]` and the
    /// DSTU2 `example[x]`) land here and are read back through the typed
    /// accessors below.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

/// A polymorphic `[x]` value together with the type suffix it was declared with
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceValue<'a> {
    /// Type suffix, e.g. `Uri` for `fixedUri`
    pub type_name: &'a str,
    pub value: &'a Value,
}

/// Data type for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionType {
    /// Data type code
    pub code: String,

    /// Profiles that apply. A single string in STU3, a list elsewhere.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub profile: Vec<String>,

    /// Profile for Reference/canonical target types
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub target_profile: Vec<String>,
}

/// Example value for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionExample {
    /// Describes the purpose of this example
    #[serde(default)]
    pub label: String,

    /// Value of example (one of various types)
    #[serde(flatten)]
    pub value: BTreeMap<String, Value>,
}

/// Constraint on an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementDefinitionConstraint {
    /// Target of 'condition' reference
    pub key: String,

    /// Severity (error | warning)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConstraintSeverity>,

    /// Human description of constraint
    #[serde(default)]
    pub human: String,

    /// FHIRPath expression of constraint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Severity of a constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintSeverity {
    Error,
    Warning,
}

/// ValueSet binding for a coded element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinitionBinding {
    /// Binding strength (required | extensible | preferred | example)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<BindingStrength>,

    /// Human explanation of the value set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Source of value set (R4+)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,

    /// Source of value set (DSTU2/STU3 uri form)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set_uri: Option<String>,

    /// Source of value set (DSTU2/STU3 reference form)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set_reference: Option<ValueSetReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueSetReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ElementDefinitionBinding {
    /// The value set URL in whichever form the source version declared it
    pub fn value_set_url(&self) -> Option<&str> {
        self.value_set
            .as_deref()
            .or(self.value_set_uri.as_deref())
            .or_else(|| {
                self.value_set_reference
                    .as_ref()
                    .and_then(|r| r.reference.as_deref())
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
    Example,
}

impl fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingStrength::Required => "required",
            BindingStrength::Extensible => "extensible",
            BindingStrength::Preferred => "preferred",
            BindingStrength::Example => "example",
        };
        f.write_str(s)
    }
}

/// Slicing information for an element
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ElementDefinitionSlicing {
    /// Element values that are used to distinguish slices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discriminator: Vec<ElementDefinitionDiscriminator>,

    /// Text description of how slicing works
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// If elements must be in same order as slices
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,

    /// Slicing rules (closed | open | openAtEnd)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<SlicingRules>,
}

/// Discriminator for slicing.
///
/// DSTU2 declares discriminators as bare path strings; STU3 onwards uses
/// `{type, path}` objects. Both deserialize into this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawDiscriminator")]
pub struct ElementDefinitionDiscriminator {
    /// Type of discriminator (value | exists | pattern | type | profile)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub discriminator_type: Option<DiscriminatorType>,

    /// Path to element value
    pub path: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDiscriminator {
    Path(String),
    Typed {
        #[serde(rename = "type")]
        discriminator_type: Option<DiscriminatorType>,
        path: String,
    },
}

impl From<RawDiscriminator> for ElementDefinitionDiscriminator {
    fn from(raw: RawDiscriminator) -> Self {
        match raw {
            RawDiscriminator::Path(path) => Self {
                discriminator_type: None,
                path,
            },
            RawDiscriminator::Typed {
                discriminator_type,
                path,
            } => Self {
                discriminator_type,
                path,
            },
        }
    }
}

/// Type of slicing discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscriminatorType {
    Value,
    Exists,
    Pattern,
    Type,
    Profile,
}

/// Slicing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlicingRules {
    Closed,
    Open,
    OpenAtEnd,
}

impl fmt::Display for SlicingRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlicingRules::Closed => "closed",
            SlicingRules::Open => "open",
            SlicingRules::OpenAtEnd => "openAtEnd",
        };
        f.write_str(s)
    }
}

/// Snapshot - a set of elements that define the structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    pub element: Vec<ElementDefinition>,
}

/// Differential - a set of elements that define changes from the base
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Differential {
    pub element: Vec<ElementDefinition>,
}

impl Snapshot {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}

impl Differential {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Finds the single `<prefix>Type` entry in a flattened map, e.g. `fixedUri`.
fn choice_entry<'a>(map: &'a BTreeMap<String, Value>, prefix: &str) -> Option<ChoiceValue<'a>> {
    map.iter().find_map(|(key, value)| {
        let suffix = key.strip_prefix(prefix)?;
        suffix
            .starts_with(|c: char| c.is_ascii_uppercase())
            .then_some(ChoiceValue {
                type_name: suffix,
                value,
            })
    })
}

impl ElementDefinition {
    /// Get the key for this element (path:sliceName for slices, just path otherwise)
    pub fn key(&self) -> String {
        if let Some(ref slice_name) = self.slice_name {
            format!("{}:{}", self.path, slice_name)
        } else {
            self.path.clone()
        }
    }

    /// Check if this element has a slice name
    pub fn is_slice(&self) -> bool {
        self.slice_name.is_some()
    }

    /// Get the parent path (everything before the last '.')
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rfind('.').map(|pos| &self.path[..pos])
    }

    /// Check if this is a choice type element (ends with [x])
    pub fn is_choice_type(&self) -> bool {
        self.path.ends_with("[x]")
    }

    /// Get type codes for this element
    pub fn type_codes(&self) -> Vec<&str> {
        self.types
            .as_ref()
            .map(|types| types.iter().map(|t| t.code.as_str()).collect())
            .unwrap_or_default()
    }

    /// `fixed[x]` value, if any
    pub fn fixed(&self) -> Option<ChoiceValue<'_>> {
        choice_entry(&self.extensions, "fixed")
    }

    /// `pattern[x]` value, if any
    pub fn pattern(&self) -> Option<ChoiceValue<'_>> {
        choice_entry(&self.extensions, "pattern")
    }

    /// `defaultValue[x]` value, if any
    pub fn default_value(&self) -> Option<ChoiceValue<'_>> {
        choice_entry(&self.extensions, "defaultValue")
    }

    /// All example values: STU3+ `example` entries followed by a DSTU2 `example[x]`
    pub fn example_values(&self) -> Vec<ChoiceValue<'_>> {
        let mut values: Vec<ChoiceValue<'_>> = self
            .example
            .iter()
            .flatten()
            .filter_map(|example| choice_entry(&example.value, "value"))
            .collect();
        values.extend(choice_entry(&self.extensions, "example"));
        values
    }

    /// Target of `contentReference` with the leading `#` removed
    pub fn content_reference_id(&self) -> Option<&str> {
        self.content_reference
            .as_deref()
            .map(|r| r.rsplit_once('#').map_or(r, |(_, id)| id))
    }

    /// Get the cardinality as a string (e.g., "0..1", "1..*")
    pub fn cardinality_string(&self) -> String {
        let min = self.min.unwrap_or(0);
        let max = self.max.as_deref().unwrap_or("*");
        format!("{}..{}", min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(value: Value) -> ElementDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_element_key() {
        let elem = element(json!({"path": "Patient.name", "sliceName": "official"}));
        assert_eq!(elem.key(), "Patient.name:official");
        assert!(elem.is_slice());
        assert_eq!(elem.parent_path(), Some("Patient"));
    }

    #[test]
    fn test_polymorphic_values_are_extracted() {
        let elem = element(json!({
            "path": "Patient.identifier.system",
            "fixedUri": "https://fhir.nhs.uk/Id/nhs-number",
            "example": [{"label": "General", "valueString": "abc"}]
        }));

        let fixed = elem.fixed().unwrap();
        assert_eq!(fixed.type_name, "Uri");
        assert_eq!(fixed.value, &json!("https://fhir.nhs.uk/Id/nhs-number"));
        assert!(elem.pattern().is_none());
        assert!(elem.default_value().is_none());

        let examples = elem.example_values();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].value, &json!("abc"));
    }

    #[test]
    fn test_dstu2_shapes() {
        let elem = element(json!({
            "path": "Extension.extension",
            "name": "child",
            "nameReference": "other",
            "exampleCode": "x",
            "type": [{"code": "Extension", "profile": ["http://example.org/ext"]}],
            "slicing": {"discriminator": ["url"], "rules": "open"},
            "binding": {"strength": "required", "valueSetReference": {"reference": "http://vs"}}
        }));

        assert_eq!(elem.name.as_deref(), Some("child"));
        assert!(!elem.is_slice());
        assert_eq!(elem.example_values().len(), 1);
        let slicing = elem.slicing.unwrap();
        assert_eq!(slicing.discriminator[0].path, "url");
        assert_eq!(slicing.discriminator[0].discriminator_type, None);
        assert_eq!(elem.binding.unwrap().value_set_url(), Some("http://vs"));
    }

    #[test]
    fn test_stu3_single_profile_and_content_reference() {
        let elem = element(json!({
            "path": "Questionnaire.item.item",
            "contentReference": "#Questionnaire.item",
            "type": [{"code": "Reference", "targetProfile": "http://hl7.org/fhir/StructureDefinition/Patient"}]
        }));

        assert_eq!(elem.content_reference_id(), Some("Questionnaire.item"));
        let ty = &elem.types.unwrap()[0];
        assert_eq!(ty.target_profile.len(), 1);
        assert!(ty.profile.is_empty());
    }

    #[test]
    fn test_cardinality_string() {
        let elem = element(json!({"path": "Patient.name", "min": 1}));
        assert_eq!(elem.cardinality_string(), "1..*");
    }
}
