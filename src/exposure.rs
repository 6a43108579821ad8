//! Exposure events: the record that an entity was concretely assigned a variant.
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{context::EvaluationContext, variant::SelectedVariant};

/// Event properties handed to an [`EventTracker`].
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Outcome reported by an [`EventTracker`]. Errors are logged and otherwise ignored.
pub type TrackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Name of the event emitted on exposure.
pub const EXPOSURE_EVENT_NAME: &str = "$experiment_started";

/// Destination for exposure events, usually your analytics ingestion client.
///
/// Closures with the matching signature implement this trait:
///
/// ```
/// # use mixpanel_flags::{ClientConfig, Properties, TrackResult};
/// let config = ClientConfig::from_token("project-token")
///     .event_tracker(|event: &str, properties: &Properties| -> TrackResult {
///         println!("{event}: {properties:?}");
///         Ok(())
///     });
/// ```
pub trait EventTracker {
    /// Deliver a single event.
    ///
    /// This is called on the evaluating thread before the evaluation result is returned, so it
    /// should hand the event off rather than block on network I/O. It may be called from several
    /// threads at once.
    fn track(&self, event_name: &str, properties: &Properties) -> TrackResult;
}

pub(crate) struct NoopEventTracker;
impl EventTracker for NoopEventTracker {
    fn track(&self, _event_name: &str, _properties: &Properties) -> TrackResult {
        Ok(())
    }
}

impl<T: Fn(&str, &Properties) -> TrackResult> EventTracker for T {
    fn track(&self, event_name: &str, properties: &Properties) -> TrackResult {
        self(event_name, properties)
    }
}

/// Where the variant was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Evaluated against locally cached definitions.
    Local,
    /// Evaluated by the server.
    Remote,
}

/// Properties of an exposure event.
#[derive(Debug, Clone, Serialize)]
pub struct ExposureEvent {
    /// Entity that was exposed.
    pub distinct_id: String,
    /// Flag key.
    #[serde(rename = "Experiment name")]
    pub experiment_name: String,
    /// Selected variant key.
    #[serde(rename = "Variant name")]
    pub variant_name: String,
    /// Always `"feature_flag"`.
    #[serde(rename = "$experiment_type")]
    pub experiment_type: &'static str,
    /// Local or remote evaluation.
    #[serde(rename = "Flag evaluation mode")]
    pub evaluation_mode: EvaluationMode,
    /// Round trip of the remote evaluation request.
    #[serde(
        rename = "Variant fetch latency (ms)",
        skip_serializing_if = "Option::is_none"
    )]
    pub latency_ms: Option<u64>,
    /// Experiment attached to the flag.
    #[serde(rename = "$experiment_id", skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    /// Whether the experiment is running.
    #[serde(rename = "$is_experiment_active", skip_serializing_if = "Option::is_none")]
    pub is_experiment_active: Option<bool>,
    /// Whether the variant was forced by a test override.
    #[serde(rename = "$is_qa_tester", skip_serializing_if = "Option::is_none")]
    pub is_qa_tester: Option<bool>,
    /// When the exposure happened.
    #[serde(rename = "time", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Builds exposure events and forwards them to the configured [`EventTracker`].
pub(crate) struct ExposureTracker<'a> {
    tracker: Box<dyn EventTracker + Send + Sync + 'a>,
}

impl<'a> ExposureTracker<'a> {
    pub fn new(tracker: Box<dyn EventTracker + Send + Sync + 'a>) -> Self {
        ExposureTracker { tracker }
    }

    /// Report that the entity in `context` was exposed to `variant`. Never fails; problems are
    /// logged.
    pub fn track_exposure(
        &self,
        flag_key: &str,
        variant: &SelectedVariant,
        context: &EvaluationContext,
        evaluation_mode: EvaluationMode,
        latency: Option<Duration>,
    ) {
        let Some(distinct_id) = context.distinct_id() else {
            log::error!(target: "mixpanel_flags",
                        flag_key;
                        "cannot track exposure event without a distinct_id in the context");
            return;
        };
        let Some(variant_name) = variant.variant_key.clone() else {
            log::debug!(target: "mixpanel_flags", flag_key; "not tracking exposure for a fallback value");
            return;
        };

        let event = ExposureEvent {
            distinct_id,
            experiment_name: flag_key.to_owned(),
            variant_name,
            experiment_type: "feature_flag",
            evaluation_mode,
            latency_ms: latency.map(|latency| latency.as_millis() as u64),
            experiment_id: variant.experiment_id.clone(),
            is_experiment_active: variant.is_experiment_active,
            is_qa_tester: variant.is_qa_tester,
            timestamp: Utc::now(),
        };

        let properties = match serde_json::to_value(&event) {
            Ok(serde_json::Value::Object(properties)) => properties,
            other => {
                log::error!(target: "mixpanel_flags",
                            flag_key;
                            "failed to serialize exposure event: {:?}", other);
                return;
            }
        };

        log::trace!(target: "mixpanel_flags", event:serde; "tracking exposure event");
        if let Err(err) = self.tracker.track(EXPOSURE_EVENT_NAME, &properties) {
            log::error!(target: "mixpanel_flags",
                        flag_key;
                        "failed to track exposure event: {}", err);
        }
    }
}
