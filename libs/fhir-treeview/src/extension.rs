//! Extension type resolution
//!
//! Rows show a different icon for simple and complex extensions, which needs
//! the extension's own StructureDefinition. Looking that up is delegated to an
//! [`ExtensionTypeResolver`].

use crate::error::{Error, Result};
use crate::event::{EventSink, RendererEventType};
use ferrum_models::FhirVersion;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionType {
    Simple,
    Complex,
}

/// Looks up whether an extension profile defines a simple or complex extension
pub trait ExtensionTypeResolver {
    fn resolve_extension_type(&self, profile_url: &str, version: FhirVersion)
        -> Result<ExtensionType>;
}

/// In-memory resolver backed by a URL table
#[derive(Debug, Clone, Default)]
pub struct StaticExtensionTypes {
    types: HashMap<String, ExtensionType>,
}

impl StaticExtensionTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, extension_type: ExtensionType) -> Self {
        self.insert(url, extension_type);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, extension_type: ExtensionType) {
        self.types.insert(url.into(), extension_type);
    }
}

impl ExtensionTypeResolver for StaticExtensionTypes {
    fn resolve_extension_type(&self, profile_url: &str, _version: FhirVersion) -> Result<ExtensionType> {
        self.types
            .get(profile_url)
            .copied()
            .ok_or_else(|| Error::ExtensionLookup {
                url: profile_url.to_string(),
                reason: "no definition available".to_string(),
            })
    }
}

/// Extension profiles allowed to be missing, shared across a batch.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct PermittedMissingExtensions {
    prefixes: Arc<Vec<String>>,
    urls: Arc<RwLock<HashSet<String>>>,
}

impl PermittedMissingExtensions {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: Arc::new(prefixes.into_iter().map(Into::into).collect()),
            urls: Arc::default(),
        }
    }

    pub fn is_permitted_prefix(&self, url: &str) -> bool {
        self.prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }

    /// Records `url`; returns `false` if it was already present
    pub fn insert(&self, url: &str) -> bool {
        self.urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string())
    }

    pub fn len(&self) -> usize {
        self.urls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves an extension type, falling back to `Simple` for permitted-missing profiles
pub fn lookup_extension_type(
    resolver: &dyn ExtensionTypeResolver,
    permitted: &PermittedMissingExtensions,
    profile_url: &str,
    version: FhirVersion,
    events: &mut dyn EventSink,
) -> Result<Option<ExtensionType>> {
    if permitted.contains(profile_url) {
        return Ok(Some(ExtensionType::Simple));
    }

    match resolver.resolve_extension_type(profile_url, version) {
        Ok(extension_type) => Ok(Some(extension_type)),
        Err(err) if permitted.is_permitted_prefix(profile_url) => {
            permitted.insert(profile_url);
            events.event(
                RendererEventType::DefaultToSimpleExtension,
                format!("Defaulting {} to a simple extension ({})", profile_url, err),
            )?;
            Ok(Some(ExtensionType::Simple))
        }
        Err(err) => {
            events.event(
                RendererEventType::ExtensionFileNotFound,
                format!("Extension type unavailable: {}", err),
            )?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPolicy, EventRecorder, EventResponse};

    const CARECONNECT: &str = "https://fhir.hl7.org.uk/STU3/StructureDefinition/";

    #[test]
    fn test_known_extension() {
        let resolver = StaticExtensionTypes::new().with("http://x/ext", ExtensionType::Complex);
        let permitted = PermittedMissingExtensions::default();
        let mut events = EventRecorder::default();

        let ty = lookup_extension_type(&resolver, &permitted, "http://x/ext", FhirVersion::R4, &mut events)
            .unwrap();
        assert_eq!(ty, Some(ExtensionType::Complex));
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_permitted_prefix_defaults_to_simple_and_is_cached() {
        let resolver = StaticExtensionTypes::new();
        let permitted = PermittedMissingExtensions::new([CARECONNECT]);
        let shared = permitted.clone();
        let mut events = EventRecorder::default();
        let url = format!("{}Extension-CareConnect-EthnicCategory-1", CARECONNECT);

        let ty = lookup_extension_type(&resolver, &permitted, &url, FhirVersion::Stu3, &mut events)
            .unwrap();
        assert_eq!(ty, Some(ExtensionType::Simple));
        assert!(shared.contains(&url));
        assert_eq!(events.count(RendererEventType::DefaultToSimpleExtension), 1);

        // second lookup is served from the shared table
        lookup_extension_type(&resolver, &shared, &url, FhirVersion::Stu3, &mut events).unwrap();
        assert_eq!(events.count(RendererEventType::DefaultToSimpleExtension), 1);
    }

    #[test]
    fn test_unknown_extension_follows_policy() {
        let resolver = StaticExtensionTypes::new();
        let permitted = PermittedMissingExtensions::default();

        let mut strict = EventRecorder::default();
        let err = lookup_extension_type(&resolver, &permitted, "http://x/missing", FhirVersion::R4, &mut strict)
            .unwrap_err();
        assert_eq!(err.event_kind(), Some(RendererEventType::ExtensionFileNotFound));

        let mut lenient = EventRecorder::new(
            EventPolicy::default()
                .with_override(RendererEventType::ExtensionFileNotFound, EventResponse::LogWarning),
        );
        let ty = lookup_extension_type(&resolver, &permitted, "http://x/missing", FhirVersion::R4, &mut lenient)
            .unwrap();
        assert_eq!(ty, None);
    }

    #[test]
    fn test_table_is_shared_across_threads() {
        let permitted = PermittedMissingExtensions::new(["http://x/"]);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let table = permitted.clone();
                std::thread::spawn(move || table.insert(&format!("http://x/{}", i)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(permitted.len(), 4);
    }
}
