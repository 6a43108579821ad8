use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Named attributes describing the entity being evaluated.
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a single context attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, `bool`, and nested
/// [`Attributes`].
///
/// ```
/// # use mixpanel_flags::AttributeValue;
/// let plan: AttributeValue = "premium".into();
/// let seats: AttributeValue = 12.0.into();
/// let beta: AttributeValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A nested map of attributes, e.g. `custom_properties`.
    Map(Attributes),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    /// Returns the string if this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested attributes if this is a map attribute.
    pub fn as_map(&self) -> Option<&Attributes> {
        match self {
            AttributeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// String form of a scalar attribute. Null and maps have none.
    pub(crate) fn to_scalar_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Number(n) => Some(n.to_string()),
            AttributeValue::Boolean(b) => Some(b.to_string()),
            AttributeValue::Map(_) | AttributeValue::Null => None,
        }
    }

    fn is_falsy(&self) -> bool {
        match self {
            AttributeValue::String(s) => s.is_empty(),
            AttributeValue::Number(n) => *n == 0.0 || n.is_nan(),
            AttributeValue::Boolean(b) => !b,
            AttributeValue::Null => true,
            AttributeValue::Map(_) => false,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Caller-supplied attributes for a single evaluation.
///
/// Every flag names one attribute (its *context*, usually `distinct_id`) that identifies the
/// bucketing subject; the entity is only eligible for the flag if that attribute is set.
/// Runtime rules are matched against the nested `custom_properties` map.
///
/// ```
/// # use mixpanel_flags::EvaluationContext;
/// let context = EvaluationContext::with_distinct_id("user-42")
///     .attribute("company_id", "acme")
///     .custom_property("plan", "premium");
///
/// assert_eq!(context.distinct_id().as_deref(), Some("user-42"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext {
    attributes: Attributes,
}

impl EvaluationContext {
    /// Attribute holding the entity identifier used for exposure tracking and test overrides.
    pub const DISTINCT_ID: &'static str = "distinct_id";
    /// Attribute holding the nested map used by runtime rules.
    pub const CUSTOM_PROPERTIES: &'static str = "custom_properties";

    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with `distinct_id` set.
    pub fn with_distinct_id(distinct_id: impl Into<String>) -> Self {
        Self::new().attribute(Self::DISTINCT_ID, distinct_id.into())
    }

    /// Set a top-level attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a property inside `custom_properties`, creating the map if needed.
    pub fn custom_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        let slot = self
            .attributes
            .entry(Self::CUSTOM_PROPERTIES.to_owned())
            .or_insert_with(|| AttributeValue::Map(Attributes::new()));
        if !matches!(slot, AttributeValue::Map(_)) {
            *slot = AttributeValue::Map(Attributes::new());
        }
        if let AttributeValue::Map(map) = slot {
            map.insert(name.into(), value.into());
        }
        self
    }

    /// Insert an attribute, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.attributes.insert(name.into(), value.into())
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// All attributes of this context.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The entity identifier, if present and non-empty.
    pub fn distinct_id(&self) -> Option<String> {
        self.bucketing_value(Self::DISTINCT_ID)
    }

    /// The nested `custom_properties` map, if present.
    pub fn custom_properties(&self) -> Option<&Attributes> {
        self.get(Self::CUSTOM_PROPERTIES)
            .and_then(AttributeValue::as_map)
    }

    /// String form of attribute `name` used as hash input.
    ///
    /// Returns `None` when the attribute is missing or falsy (null, `false`, `0`, `""`), and for
    /// nested maps. A flag whose context attribute yields `None` resolves to the fallback.
    pub fn bucketing_value(&self, name: &str) -> Option<String> {
        self.get(name)
            .filter(|value| !value.is_falsy())
            .and_then(AttributeValue::to_scalar_string)
    }
}

impl From<Attributes> for EvaluationContext {
    fn from(attributes: Attributes) -> Self {
        EvaluationContext { attributes }
    }
}
