use serde::{Deserialize, Serialize};

use crate::definitions::{FlagDefinition, Variant};

/// The outcome of evaluating a flag for one entity.
///
/// A concrete selection carries `variant_key`; a fallback built with
/// [`SelectedVariant::fallback`] does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedVariant {
    /// Key of the selected variant. `None` for a caller-supplied fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
    /// Value of the selected variant.
    #[serde(default)]
    pub variant_value: serde_json::Value,
    /// Experiment the flag is attached to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    /// Whether the attached experiment is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_experiment_active: Option<bool>,
    /// `Some(true)` only when the variant was forced by a test override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_qa_tester: Option<bool>,
}

impl SelectedVariant {
    /// A fallback carrying only a value.
    ///
    /// ```
    /// # use mixpanel_flags::SelectedVariant;
    /// let fallback = SelectedVariant::fallback("control");
    /// assert!(fallback.variant_key.is_none());
    /// ```
    pub fn fallback(value: impl Into<serde_json::Value>) -> Self {
        SelectedVariant {
            variant_key: None,
            variant_value: value.into(),
            experiment_id: None,
            is_experiment_active: None,
            is_qa_tester: None,
        }
    }

    pub(crate) fn from_variant(flag: &FlagDefinition, variant: &Variant, is_qa_tester: bool) -> Self {
        SelectedVariant {
            variant_key: Some(variant.key.clone()),
            variant_value: variant.value.clone(),
            experiment_id: flag.experiment_id.clone(),
            is_experiment_active: flag.is_experiment_active,
            is_qa_tester: Some(is_qa_tester),
        }
    }

    /// `true` if this is the fallback rather than a variant selected by the flag.
    pub fn is_fallback(&self) -> bool {
        self.variant_key.is_none()
    }
}
