//! Transaction custom attributes and the `llm.` scoping rule.

use serde::{Deserialize, Serialize};

use crate::telemetry::keys::LLM_ATTRIBUTE_PREFIX;

/// Scalar value of a transaction custom attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&AttributeValue> for serde_json::Value {
    fn from(v: &AttributeValue) -> Self {
        match v {
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Int(i) => serde_json::Value::from(*i),
            AttributeValue::Float(f) => serde_json::Value::from(*f),
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Ordered key/value list attached to every event of a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomAttributes(Vec<(String, AttributeValue)>);

impl CustomAttributes {
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, AttributeValue)> for CustomAttributes {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Keep only attributes whose key starts with `llm.`, with the prefix stripped.
///
/// The match is on the literal prefix: `llm` (the transaction marker),
/// `llmfoo` or `user.llm.x` never qualify.
pub fn extract_llm_attributes<'a, I>(all: I) -> CustomAttributes
where
    I: IntoIterator<Item = &'a (String, AttributeValue)>,
{
    all.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(LLM_ATTRIBUTE_PREFIX)
                .map(|stripped| (stripped.to_string(), value.clone()))
        })
        .collect()
}
