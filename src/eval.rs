//! Local flag evaluation.
//!
//! Evaluation is a pure function of a [`Definitions`] snapshot and an [`EvaluationContext`]. It
//! returns `None` whenever the caller's fallback should be used: unknown flag, missing context
//! attribute, or no matching rollout. Exposure reporting is left to the caller.
use crate::{
    context::EvaluationContext,
    definitions::{Definitions, FlagDefinition, Rollout, Variant},
    hashing::normalized_hash,
    rules::matches_runtime_definition,
    variant::SelectedVariant,
};

impl Definitions {
    pub(crate) fn eval_flag(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Option<SelectedVariant> {
        self.get(flag_key)?.eval(context)
    }
}

impl FlagDefinition {
    /// Evaluate this flag for `context`. Returns `None` if the fallback should be used.
    pub fn eval(&self, context: &EvaluationContext) -> Option<SelectedVariant> {
        let Some(bucketing_value) = context.bucketing_value(&self.context) else {
            log::trace!(target: "mixpanel_flags",
                        flag_key:display = self.key,
                        context_attribute:display = self.context;
                        "context attribute missing, using fallback");
            return None;
        };

        if let Some(variant) = self.test_override(context) {
            return Some(SelectedVariant::from_variant(self, variant, true));
        }

        let rollout = self
            .ruleset
            .rollout
            .iter()
            .enumerate()
            .find(|(index, rollout)| rollout.matches(self, *index, &bucketing_value, context))
            .map(|(_, rollout)| rollout)?;

        let variant = self.assigned_variant(&bucketing_value, rollout)?;
        Some(SelectedVariant::from_variant(self, variant, false))
    }

    fn test_override(&self, context: &EvaluationContext) -> Option<&Variant> {
        let users = &self.ruleset.test.as_ref()?.users;
        let distinct_id = context.distinct_id()?;
        let variant_key = users.get(&distinct_id)?;
        let variant = self.find_variant(variant_key);
        if variant.is_none() {
            log::debug!(target: "mixpanel_flags",
                        flag_key:display = self.key,
                        variant_key:display = variant_key;
                        "test override names an unknown variant, ignoring it");
        }
        variant
    }

    fn rollout_salt(&self, index: usize) -> String {
        match &self.hash_salt {
            Some(hash_salt) => format!("{}{}{}", self.key, hash_salt, index),
            None => format!("{}rollout", self.key),
        }
    }

    fn variant_salt(&self) -> String {
        format!(
            "{}{}variant",
            self.key,
            self.hash_salt.as_deref().unwrap_or_default()
        )
    }

    fn assigned_variant(&self, bucketing_value: &str, rollout: &Rollout) -> Option<&Variant> {
        if let Some(variant_override) = &rollout.variant_override {
            if let Some(variant) = self.find_variant(&variant_override.key) {
                return Some(variant);
            }
        }

        let variant_hash = normalized_hash(bucketing_value, &self.variant_salt());

        // Walk variants accumulating their splits. If splits add up to less than 1, the last
        // variant takes the remaining mass.
        let mut cumulative = 0.0;
        let mut selected = None;
        for variant in &self.ruleset.variants {
            selected = Some(variant);
            cumulative += rollout.split_for(variant);
            if variant_hash < cumulative {
                break;
            }
        }
        selected
    }
}

impl Rollout {
    /// Return `true` if the entity falls into this rollout's percentage and satisfies its runtime
    /// rules.
    fn matches(
        &self,
        flag: &FlagDefinition,
        index: usize,
        bucketing_value: &str,
        context: &EvaluationContext,
    ) -> bool {
        let rollout_hash = normalized_hash(bucketing_value, &flag.rollout_salt(index));
        rollout_hash < self.rollout_percentage / 100.0
            && matches_runtime_definition(self.runtime_evaluation_definition.as_ref(), context)
    }

    fn split_for(&self, variant: &Variant) -> f64 {
        self.variant_splits
            .as_ref()
            .and_then(|splits| splits.get(&variant.key))
            .copied()
            .unwrap_or(variant.split)
    }
}
