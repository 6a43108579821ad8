//! Flag definitions as served by the definitions endpoint.
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Immutable snapshot of every flag definition known to the client, keyed by flag key.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Definitions {
    pub(crate) flags: HashMap<String, FlagDefinition>,
}

impl Definitions {
    /// Look up a flag by key.
    pub fn get(&self, flag_key: &str) -> Option<&FlagDefinition> {
        self.flags.get(flag_key)
    }

    /// Iterate over all flag keys in the snapshot.
    pub fn flag_keys(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    /// Number of flags in the snapshot.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// `true` if the snapshot holds no flags.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl FromIterator<FlagDefinition> for Definitions {
    fn from_iter<I: IntoIterator<Item = FlagDefinition>>(iter: I) -> Self {
        Definitions {
            flags: iter
                .into_iter()
                .map(|flag| (flag.key.clone(), flag))
                .collect(),
        }
    }
}

/// Response body of `GET /flags/definitions`.
#[derive(Debug, Deserialize)]
pub(crate) struct DefinitionsResponse {
    pub flags: Vec<TryParse<FlagDefinition>>,
}

impl DefinitionsResponse {
    /// Collect successfully parsed flags into a snapshot, skipping the ones that failed.
    pub fn into_definitions(self) -> Definitions {
        self.flags
            .into_iter()
            .filter_map(|flag| match flag {
                TryParse::Parsed(flag) => Some(flag),
                TryParse::ParseFailed(value) => {
                    log::warn!(target: "mixpanel_flags",
                               flag_key:serde = value.get("key");
                               "skipping flag definition that failed to parse");
                    None
                }
            })
            .collect()
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}

/// Server-side definition of a single flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagDefinition {
    /// Server-side identifier.
    #[serde(default)]
    pub id: String,
    /// Key used to look the flag up.
    pub key: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Lifecycle status as reported by the server, e.g. `"active"`.
    #[serde(default)]
    pub status: String,
    /// Project the flag belongs to.
    #[serde(default)]
    pub project_id: u64,
    /// Name of the context attribute that identifies the bucketing subject.
    pub context: String,
    /// Experiment this flag is attached to, if any.
    #[serde(default)]
    pub experiment_id: Option<String>,
    /// Whether the attached experiment is running.
    #[serde(default)]
    pub is_experiment_active: Option<bool>,
    /// Extra salt mixed into rollout and variant hashes.
    #[serde(default)]
    pub hash_salt: Option<String>,
    /// Variants and targeting rules.
    pub ruleset: RuleSet,
}

/// Variants and targeting rules of a flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    /// Possible values of the flag, in split order.
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Evaluated in order; the first matching rollout wins.
    #[serde(default)]
    pub rollout: Vec<Rollout>,
    /// Forced assignments for QA testers.
    #[serde(default)]
    pub test: Option<TestOverrides>,
}

/// One concrete value a flag can resolve to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    /// Variant key, unique within the flag ignoring case.
    pub key: String,
    /// Opaque value handed back to the caller.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Whether this is the control group of an experiment.
    #[serde(default)]
    pub is_control: bool,
    /// Fraction of eligible entities assigned to this variant.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub split: f64,
}

/// A targeting rule: a percentage of entities, optionally filtered by runtime properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rollout {
    /// Percentage of entities eligible for this rollout, 0 to 100.
    #[serde(default)]
    pub rollout_percentage: f64,
    /// Properties that must all be present in `custom_properties` and equal,
    /// case-insensitively, to the listed values. A `null`, array or object value never matches.
    #[serde(default)]
    pub runtime_evaluation_definition: Option<HashMap<String, serde_json::Value>>,
    /// Forces the named variant instead of the weighted split.
    #[serde(default)]
    pub variant_override: Option<VariantOverride>,
    /// Per-rollout replacement for variant splits, keyed by variant key.
    #[serde(default)]
    pub variant_splits: Option<HashMap<String, f64>>,
}

/// Reference to the variant forced by a rollout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantOverride {
    /// Key of the forced variant, matched ignoring case.
    pub key: String,
}

/// Forced assignments for QA testers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestOverrides {
    /// Distinct id to variant key.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl FlagDefinition {
    /// Find a variant by key, ignoring case.
    pub fn find_variant(&self, key: &str) -> Option<&Variant> {
        self.ruleset
            .variants
            .iter()
            .find(|variant| variant.key.eq_ignore_ascii_case(key))
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
