//! Engine configuration

use crate::event::EventPolicy;
use serde::{Deserialize, Serialize};

/// Identifiers that look like web URLs but name a system rather than a page
pub const DEFAULT_LOGICAL_URLS: &[&str] = &[
    "https://fhir.nhs.uk/Id/",
    "http://fhir.nhs.net/Id/",
    "http://snomed.info/sct",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeViewConfig {
    pub events: EventPolicy,

    /// Extension profile URL prefixes that default to a simple extension when
    /// the profile cannot be resolved
    pub permitted_missing_extension_prefixes: Vec<String>,

    /// Prefixes (or exact values) treated as logical identifiers, never as links
    pub logical_url_prefixes: Vec<String>,

    /// Drop elements with `max = 0` from derived rows
    pub strip_removed_elements: bool,
}

impl Default for TreeViewConfig {
    fn default() -> Self {
        Self {
            events: EventPolicy::default(),
            permitted_missing_extension_prefixes: Vec::new(),
            logical_url_prefixes: DEFAULT_LOGICAL_URLS.iter().map(|s| s.to_string()).collect(),
            strip_removed_elements: false,
        }
    }
}

impl TreeViewConfig {
    pub fn is_logical_url(&self, value: &str) -> bool {
        self.logical_url_prefixes
            .iter()
            .any(|prefix| value.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_urls() {
        let config = TreeViewConfig::default();
        assert!(config.is_logical_url("https://fhir.nhs.uk/Id/nhs-number"));
        assert!(config.is_logical_url("http://snomed.info/sct"));
        assert!(!config.is_logical_url("http://hl7.org/fhir/ValueSet/administrative-gender"));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: TreeViewConfig = serde_json::from_value(serde_json::json!({
            "strip_removed_elements": true
        }))
        .unwrap();
        assert!(config.strip_removed_elements);
        assert_eq!(config.logical_url_prefixes.len(), DEFAULT_LOGICAL_URLS.len());
        assert!(!config.events.strict);
    }
}
