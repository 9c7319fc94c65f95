#![allow(dead_code)]

use ferrum_models::{ElementDefinition, StructureDefinition};
use ferrum_treeview::{
    EventPolicy, EventRecorder, ExtensionType, ReconciledProfile, Reconciler,
    StaticExtensionTypes, TreeViewConfig,
};
use serde_json::{json, Value};

pub const CARECONNECT: &str = "https://fhir.hl7.org.uk/STU3/StructureDefinition/";

pub fn elements(values: Vec<Value>) -> Vec<ElementDefinition> {
    values
        .into_iter()
        .map(|v| {
            serde_json::from_value(v.clone())
                .unwrap_or_else(|e| panic!("Failed to parse element {}: {}", v, e))
        })
        .collect()
}

pub fn structure_definition(
    fhir_version: &str,
    snapshot: Vec<Value>,
    differential: Vec<Value>,
) -> StructureDefinition {
    let mut sd = json!({
        "resourceType": "StructureDefinition",
        "url": "http://example.org/fhir/StructureDefinition/test-profile",
        "name": "TestProfile",
        "fhirVersion": fhir_version,
        "snapshot": {"element": snapshot},
    });
    if !differential.is_empty() {
        sd["differential"] = json!({"element": differential});
    }
    StructureDefinition::from_value(&sd).expect("Failed to parse StructureDefinition")
}

pub fn resolver() -> StaticExtensionTypes {
    StaticExtensionTypes::new()
        .with(
            format!("{}Extension-CareConnect-EthnicCategory-1", CARECONNECT),
            ExtensionType::Simple,
        )
        .with("http://example.org/fhir/StructureDefinition/nested", ExtensionType::Complex)
}

pub fn reconcile(sd: &StructureDefinition) -> (ReconciledProfile, EventRecorder) {
    reconcile_with(sd, TreeViewConfig::default())
}

pub fn reconcile_with(
    sd: &StructureDefinition,
    config: TreeViewConfig,
) -> (ReconciledProfile, EventRecorder) {
    let resolver = resolver();
    let mut events = EventRecorder::new(config.events.clone());
    let profile = Reconciler::new(&config, &resolver)
        .reconcile(sd, &mut events)
        .unwrap_or_else(|e| panic!("Reconciliation failed: {}", e));
    (profile, events)
}

pub fn strict_config() -> TreeViewConfig {
    TreeViewConfig {
        events: EventPolicy::strict(),
        ..TreeViewConfig::default()
    }
}

/// Element with an id equal to its path, a type and `0..max` cardinality
pub fn el(path: &str, code: &str, max: &str) -> Value {
    json!({
        "id": path,
        "path": path,
        "min": 0,
        "max": max,
        "type": [{"code": code}]
    })
}

/// Patient snapshot with `identifier` sliced by `system` into `nhsNumber` and `localId`
pub fn patient_identifier_snapshot() -> Vec<Value> {
    vec![
        json!({"id": "Patient", "path": "Patient", "min": 0, "max": "*"}),
        json!({
            "id": "Patient.identifier",
            "path": "Patient.identifier",
            "min": 0,
            "max": "*",
            "type": [{"code": "Identifier"}],
            "slicing": {"discriminator": [{"type": "value", "path": "system"}], "rules": "open"}
        }),
        el("Patient.identifier.system", "uri", "1"),
        json!({
            "id": "Patient.identifier:nhsNumber",
            "path": "Patient.identifier",
            "sliceName": "nhsNumber",
            "min": 0,
            "max": "1",
            "type": [{"code": "Identifier"}]
        }),
        json!({
            "id": "Patient.identifier:nhsNumber.system",
            "path": "Patient.identifier.system",
            "min": 1,
            "max": "1",
            "type": [{"code": "uri"}],
            "fixedUri": "https://fhir.nhs.uk/Id/nhs-number"
        }),
        json!({
            "id": "Patient.identifier:localId",
            "path": "Patient.identifier",
            "sliceName": "localId",
            "min": 0,
            "max": "*",
            "type": [{"code": "Identifier"}]
        }),
        json!({
            "id": "Patient.identifier:localId.system",
            "path": "Patient.identifier.system",
            "min": 1,
            "max": "1",
            "type": [{"code": "uri"}],
            "fixedUri": "https://fhir.example.org/Id/local"
        }),
        el("Patient.gender", "code", "1"),
    ]
}

/// Patient snapshot whose identifier slices differ only in their fixed `system`
pub fn patient_system_slices_snapshot() -> Vec<Value> {
    let slice = |name: &str, system: &str| {
        vec![
            json!({
                "id": format!("Patient.identifier:{}", name),
                "path": "Patient.identifier",
                "sliceName": name,
                "min": 0,
                "max": "1",
                "type": [{"code": "Identifier"}]
            }),
            json!({
                "id": format!("Patient.identifier:{}.system", name),
                "path": "Patient.identifier.system",
                "min": 1,
                "max": "1",
                "type": [{"code": "uri"}],
                "fixedUri": system
            }),
        ]
    };

    let mut elements = vec![
        json!({"id": "Patient", "path": "Patient", "min": 0, "max": "*"}),
        json!({
            "id": "Patient.identifier",
            "path": "Patient.identifier",
            "min": 0,
            "max": "*",
            "type": [{"code": "Identifier"}],
            "slicing": {"discriminator": [{"type": "value", "path": "system"}], "rules": "open"}
        }),
        el("Patient.identifier.system", "uri", "1"),
    ];
    elements.extend(slice("a", "sys-a"));
    elements.extend(slice("b", "sys-b"));
    elements
}

pub fn observation_snapshot() -> Vec<Value> {
    vec![
        json!({"id": "Observation", "path": "Observation", "min": 0, "max": "*"}),
        json!({
            "id": "Observation.status",
            "path": "Observation.status",
            "min": 1,
            "max": "1",
            "type": [{"code": "code"}],
            "binding": {
                "strength": "required",
                "description": "Codes providing the status of an observation.",
                "valueSet": "http://hl7.org/fhir/ValueSet/observation-status|4.0.1"
            }
        }),
        el("Observation.code", "CodeableConcept", "1"),
        json!({
            "id": "Observation.value[x]",
            "path": "Observation.value[x]",
            "min": 0,
            "max": "1",
            "type": [{"code": "Quantity"}, {"code": "string"}]
        }),
    ]
}
