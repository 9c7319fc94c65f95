//! FHIR StructureDefinition model
//!
//! Only the parts needed to walk a profile's snapshot and differential are typed;
//! everything else is kept in `extensions`.

use super::element_definition::{Differential, Snapshot};
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub url: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<StructureDefinitionKind>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// DSTU2 equivalent of `type` for constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constrained_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub differential: Option<Differential>,

    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

fn default_resource_type() -> String {
    "StructureDefinition".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureDefinitionKind {
    Datatype,
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// FHIR release a definition was authored against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FhirVersion {
    Dstu2,
    Stu3,
    R4,
    R5,
}

impl FhirVersion {
    /// Parse a `fhirVersion` value such as `1.0.2`, `3.0.1` or `4.0.1`
    pub fn from_version_string(version: &str) -> Result<Self> {
        let major = version.split('.').next().unwrap_or_default();
        match major {
            "1" => Ok(FhirVersion::Dstu2),
            "3" => Ok(FhirVersion::Stu3),
            "4" => Ok(FhirVersion::R4),
            "5" => Ok(FhirVersion::R5),
            _ => Err(Error::UnsupportedFhirVersion(version.to_string())),
        }
    }

    /// Whether elements link to each other by `nameReference` rather than `contentReference`
    pub fn links_by_name(self) -> bool {
        self == FhirVersion::Dstu2
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FhirVersion::Dstu2 => "DSTU2",
            FhirVersion::Stu3 => "STU3",
            FhirVersion::R4 => "R4",
            FhirVersion::R5 => "R5",
        };
        f.write_str(s)
    }
}

impl StructureDefinition {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        let sd: Self = serde_json::from_value(value.clone())?;
        if sd.resource_type != "StructureDefinition" {
            return Err(Error::InvalidResource(format!(
                "expected StructureDefinition, got {}",
                sd.resource_type
            )));
        }
        Ok(sd)
    }

    /// Declared FHIR version, or `None` if the resource does not state one
    pub fn fhir_version(&self) -> Result<Option<FhirVersion>> {
        self.fhir_version
            .as_deref()
            .map(FhirVersion::from_version_string)
            .transpose()
    }

    /// The constrained type, whichever field carries it
    pub fn constrained_type(&self) -> Option<&str> {
        self.type_.as_deref().or(self.constrained_type.as_deref())
    }

    pub fn snapshot(&self) -> Result<&Snapshot> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| Error::MissingField("snapshot".to_string()))
    }

    pub fn differential(&self) -> Result<&Differential> {
        self.differential
            .as_ref()
            .ok_or_else(|| Error::MissingField("differential".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_detection() {
        assert_eq!(FhirVersion::from_version_string("1.0.2").unwrap(), FhirVersion::Dstu2);
        assert_eq!(FhirVersion::from_version_string("3.0.1").unwrap(), FhirVersion::Stu3);
        assert_eq!(FhirVersion::from_version_string("4.0.1").unwrap(), FhirVersion::R4);
        assert!(FhirVersion::from_version_string("0.5").is_err());
        assert!(FhirVersion::Dstu2.links_by_name());
        assert!(!FhirVersion::R4.links_by_name());
    }

    #[test]
    fn test_rejects_other_resource_types() {
        let value = json!({"resourceType": "ValueSet", "url": "http://x", "name": "x"});
        assert!(matches!(
            StructureDefinition::from_value(&value),
            Err(Error::InvalidResource(_))
        ));
    }

    #[test]
    fn test_missing_differential() {
        let value = json!({
            "resourceType": "StructureDefinition",
            "url": "http://x",
            "name": "x",
            "snapshot": {"element": [{"path": "Patient"}]}
        });
        let sd = StructureDefinition::from_value(&value).unwrap();
        assert_eq!(sd.snapshot().unwrap().element.len(), 1);
        assert!(matches!(sd.differential(), Err(Error::MissingField(_))));
    }
}
