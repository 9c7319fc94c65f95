//! Renderer events
//!
//! Every anomaly the engine notices is raised by kind and message through an
//! [`EventSink`]. The sink's [`EventPolicy`] decides whether the event is
//! ignored, logged, or turned into an [`Error::Event`] that aborts the
//! current resource.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Catalogue of conditions the engine can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum RendererEventType {
    MisnamedSnapshotChoiceNode,
    DifferentialNodeMissingId,
    DifferentialChoiceNodeWrongId,
    DefaultToSimpleExtension,
    BindingWithoutDescOrUrl,
    LinkReferencesItself,
    MissingReferencedNode,
    FixedvalueWithLinkedNode,
    StandInBindingDescriptionNotRemoved,
    NoDiscriminatorsFound,
    SlicingWithoutDiscriminator,
    MissingCardinality,
    UnresolvedDiscriminator,
    EmptyTypeLinks,
    ExtensionFileNotFound,
    UnmatchedDifferentialNode,
}

impl RendererEventType {
    pub const ALL: [RendererEventType; 16] = [
        RendererEventType::MisnamedSnapshotChoiceNode,
        RendererEventType::DifferentialNodeMissingId,
        RendererEventType::DifferentialChoiceNodeWrongId,
        RendererEventType::DefaultToSimpleExtension,
        RendererEventType::BindingWithoutDescOrUrl,
        RendererEventType::LinkReferencesItself,
        RendererEventType::MissingReferencedNode,
        RendererEventType::FixedvalueWithLinkedNode,
        RendererEventType::StandInBindingDescriptionNotRemoved,
        RendererEventType::NoDiscriminatorsFound,
        RendererEventType::SlicingWithoutDiscriminator,
        RendererEventType::MissingCardinality,
        RendererEventType::UnresolvedDiscriminator,
        RendererEventType::EmptyTypeLinks,
        RendererEventType::ExtensionFileNotFound,
        RendererEventType::UnmatchedDifferentialNode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RendererEventType::MisnamedSnapshotChoiceNode => "MISNAMED_SNAPSHOT_CHOICE_NODE",
            RendererEventType::DifferentialNodeMissingId => "DIFFERENTIAL_NODE_MISSING_ID",
            RendererEventType::DifferentialChoiceNodeWrongId => "DIFFERENTIAL_CHOICE_NODE_WRONG_ID",
            RendererEventType::DefaultToSimpleExtension => "DEFAULT_TO_SIMPLE_EXTENSION",
            RendererEventType::BindingWithoutDescOrUrl => "BINDING_WITHOUT_DESC_OR_URL",
            RendererEventType::LinkReferencesItself => "LINK_REFERENCES_ITSELF",
            RendererEventType::MissingReferencedNode => "MISSING_REFERENCED_NODE",
            RendererEventType::FixedvalueWithLinkedNode => "FIXEDVALUE_WITH_LINKED_NODE",
            RendererEventType::StandInBindingDescriptionNotRemoved => {
                "STAND_IN_BINDING_DESCRIPTION_NOT_REMOVED"
            }
            RendererEventType::NoDiscriminatorsFound => "NO_DISCRIMINATORS_FOUND",
            RendererEventType::SlicingWithoutDiscriminator => "SLICING_WITHOUT_DISCRIMINATOR",
            RendererEventType::MissingCardinality => "MISSING_CARDINALITY",
            RendererEventType::UnresolvedDiscriminator => "UNRESOLVED_DISCRIMINATOR",
            RendererEventType::EmptyTypeLinks => "EMPTY_TYPE_LINKS",
            RendererEventType::ExtensionFileNotFound => "EXTENSION_FILE_NOT_FOUND",
            RendererEventType::UnmatchedDifferentialNode => "UNMATCHED_DIFFERENTIAL_NODE",
        }
    }

    /// Response used when no override is configured
    pub fn default_response(&self) -> EventResponse {
        use RendererEventType::*;
        match self {
            MisnamedSnapshotChoiceNode
            | DifferentialNodeMissingId
            | DifferentialChoiceNodeWrongId
            | DefaultToSimpleExtension
            | BindingWithoutDescOrUrl => EventResponse::Ignore,
            LinkReferencesItself
            | MissingReferencedNode
            | FixedvalueWithLinkedNode
            | StandInBindingDescriptionNotRemoved
            | NoDiscriminatorsFound
            | SlicingWithoutDiscriminator
            | MissingCardinality => EventResponse::LogWarning,
            UnresolvedDiscriminator
            | EmptyTypeLinks
            | ExtensionFileNotFound
            | UnmatchedDifferentialNode => EventResponse::Throw,
        }
    }
}

impl FromStr for RendererEventType {
    type Err = String;

    /// Matches catalogue names case-insensitively
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RendererEventType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown renderer event '{}'", s))
    }
}

impl TryFrom<String> for RendererEventType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RendererEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when an event is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventResponse {
    Ignore,
    LogWarning,
    Throw,
}

/// Maps event kinds to responses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventPolicy {
    /// Upgrade every `LogWarning` response to `Throw`
    pub strict: bool,
    pub overrides: BTreeMap<RendererEventType, EventResponse>,
}

impl EventPolicy {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_override(mut self, kind: RendererEventType, response: EventResponse) -> Self {
        self.overrides.insert(kind, response);
        self
    }

    pub fn response_for(&self, kind: RendererEventType) -> EventResponse {
        let response = self
            .overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_response());
        match response {
            EventResponse::LogWarning if self.strict => EventResponse::Throw,
            other => other,
        }
    }
}

/// A raised event, as recorded by [`EventRecorder`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererEvent {
    pub kind: RendererEventType,
    pub message: String,
    pub response: EventResponse,
}

impl fmt::Display for RendererEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Receives events from the engine.
///
/// Returning `Err` aborts the pass that raised the event.
pub trait EventSink {
    fn event(&mut self, kind: RendererEventType, message: String) -> Result<()>;
}

/// Standard sink: applies an [`EventPolicy`], logs through `tracing` and keeps
/// every event for later inspection.
#[derive(Debug, Default)]
pub struct EventRecorder {
    policy: EventPolicy,
    events: Vec<RendererEvent>,
}

impl EventRecorder {
    pub fn new(policy: EventPolicy) -> Self {
        Self {
            policy,
            events: Vec::new(),
        }
    }

    pub fn policy(&self) -> &EventPolicy {
        &self.policy
    }

    pub fn events(&self) -> &[RendererEvent] {
        &self.events
    }

    pub fn count(&self, kind: RendererEventType) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn has(&self, kind: RendererEventType) -> bool {
        self.count(kind) > 0
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn into_events(self) -> Vec<RendererEvent> {
        self.events
    }
}

impl EventSink for EventRecorder {
    fn event(&mut self, kind: RendererEventType, message: String) -> Result<()> {
        let response = self.policy.response_for(kind);
        match response {
            EventResponse::Ignore => tracing::debug!(event = %kind, "{}", message),
            EventResponse::LogWarning => tracing::warn!(event = %kind, "{}", message),
            EventResponse::Throw => tracing::error!(event = %kind, "{}", message),
        }

        self.events.push(RendererEvent {
            kind,
            message: message.clone(),
            response,
        });

        if response == EventResponse::Throw {
            return Err(Error::Event { kind, message });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_responses() {
        let mut recorder = EventRecorder::default();

        recorder
            .event(RendererEventType::MisnamedSnapshotChoiceNode, "renamed".into())
            .unwrap();
        recorder
            .event(RendererEventType::LinkReferencesItself, "self".into())
            .unwrap();
        let err = recorder
            .event(RendererEventType::EmptyTypeLinks, "no types".into())
            .unwrap_err();

        assert_eq!(err.event_kind(), Some(RendererEventType::EmptyTypeLinks));
        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.events()[0].response, EventResponse::Ignore);
        assert_eq!(recorder.events()[1].response, EventResponse::LogWarning);
    }

    #[test]
    fn test_strict_upgrades_warnings_only() {
        let policy = EventPolicy::strict();
        assert_eq!(
            policy.response_for(RendererEventType::MissingReferencedNode),
            EventResponse::Throw
        );
        assert_eq!(
            policy.response_for(RendererEventType::MisnamedSnapshotChoiceNode),
            EventResponse::Ignore
        );
    }

    #[test]
    fn test_override_wins_over_default() {
        let policy = EventPolicy::default()
            .with_override(RendererEventType::EmptyTypeLinks, EventResponse::Ignore);
        assert_eq!(
            policy.response_for(RendererEventType::EmptyTypeLinks),
            EventResponse::Ignore
        );
    }

    #[test]
    fn test_policy_deserializes_from_event_names() {
        let policy: EventPolicy = serde_json::from_value(serde_json::json!({
            "overrides": {"missing_referenced_node": "throw"}
        }))
        .unwrap();
        assert!(!policy.strict);
        assert_eq!(
            policy.response_for(RendererEventType::MissingReferencedNode),
            EventResponse::Throw
        );
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let names: std::collections::HashSet<_> =
            RendererEventType::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), RendererEventType::ALL.len());
    }
}
