use std::collections::HashMap;

use crate::{context::EvaluationContext, variant::SelectedVariant};

/// Caller-facing flag evaluation interface, shared by [`LocalFlagsProvider`] and
/// [`RemoteFlagsProvider`].
///
/// None of these methods fail: when a flag cannot be evaluated (unknown flag, missing context
/// attribute, no matching rollout, network failure) the caller's fallback is returned.
///
/// [`LocalFlagsProvider`]: crate::LocalFlagsProvider
/// [`RemoteFlagsProvider`]: crate::RemoteFlagsProvider
pub trait FlagsProvider {
    /// Resolve `flag_key` for `context`, returning `fallback` if no variant is selected.
    ///
    /// If `report_exposure` is `true` and a variant is selected, an exposure event is tracked.
    fn get_variant(
        &self,
        flag_key: &str,
        fallback: SelectedVariant,
        context: &EvaluationContext,
        report_exposure: bool,
    ) -> SelectedVariant;

    /// Resolve every known flag for `context` without tracking exposures. Only flags that
    /// selected a variant are returned.
    ///
    /// Returns `None` if the flags could not be resolved at all (remote evaluation failure).
    fn get_all_variants(
        &self,
        context: &EvaluationContext,
    ) -> Option<HashMap<String, SelectedVariant>>;

    /// Like [`FlagsProvider::get_variant`] but returns only the value.
    fn get_variant_value(
        &self,
        flag_key: &str,
        fallback_value: serde_json::Value,
        context: &EvaluationContext,
        report_exposure: bool,
    ) -> serde_json::Value {
        self.get_variant(
            flag_key,
            SelectedVariant::fallback(fallback_value),
            context,
            report_exposure,
        )
        .variant_value
    }

    /// `true` only if the flag resolves to the boolean `true`. Values such as `"true"` or `1`
    /// are not enabled. Tracks an exposure when a variant is selected.
    fn is_enabled(&self, flag_key: &str, context: &EvaluationContext) -> bool {
        self.get_variant_value(flag_key, serde_json::Value::Bool(false), context, true)
            == serde_json::Value::Bool(true)
    }
}
