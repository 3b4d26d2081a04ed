//! Shared execution context passed between saga steps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ContextError;

/// Key under which the orchestrator records best-effort step failures
/// (`{step_name: reason}`).
pub const BEST_EFFORT_FAILURES: &str = "best_effort_failures";

/// Mutable key/value context shared by the steps of one saga run.
///
/// Values are stored as JSON so the whole context can be persisted by a
/// state store and snapshotted into audit entries. Steps read and write the
/// keys they need through the typed accessors; each workflow documents its
/// keys as constants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaContext {
    values: Map<String, Value>,
}

impl SagaContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for assembling initial contexts.
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Values that cannot be represented as JSON are stored as `null`.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: T) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.values.insert(key.to_string(), value);
    }

    /// Reads `key` as `T`. Returns `None` if the key is absent or has a different type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Reads `key` as `T`, failing if it is absent or has a different type.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ContextError::MissingKey(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns the raw JSON value under `key`.
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Removes `key`, returning its raw value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the context holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over keys and raw values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Records a best-effort failure for `step` under [`BEST_EFFORT_FAILURES`].
    pub fn record_best_effort_failure(&mut self, step: &str, reason: &str) {
        let entry = self
            .values
            .entry(BEST_EFFORT_FAILURES.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(failures) = entry {
            failures.insert(step.to_string(), Value::String(reason.to_string()));
        }
    }

    /// Returns the best-effort failure reason recorded for `step`, if any.
    pub fn best_effort_failure(&self, step: &str) -> Option<&str> {
        self.values
            .get(BEST_EFFORT_FAILURES)
            .and_then(|v| v.get(step))
            .and_then(Value::as_str)
    }

    /// Borrows the underlying JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Converts the context into a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl From<Map<String, Value>> for SagaContext {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for SagaContext {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ArticleId;

    #[test]
    fn test_insert_and_get_typed_values() {
        let article_id = ArticleId::new();
        let mut ctx = SagaContext::new();
        ctx.insert("article_id", article_id);
        ctx.insert("attempts", 3u32);
        ctx.insert("sent", false);

        assert_eq!(ctx.get::<ArticleId>("article_id"), Some(article_id));
        assert_eq!(ctx.get::<u32>("attempts"), Some(3));
        assert_eq!(ctx.get::<bool>("sent"), Some(false));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_get_with_wrong_type_is_none() {
        let ctx = SagaContext::new().with("count", "not a number");
        assert_eq!(ctx.get::<u32>("count"), None);
    }

    #[test]
    fn test_require_reports_missing_and_invalid_keys() {
        let ctx = SagaContext::new().with("count", "seven");

        match ctx.require::<u32>("missing") {
            Err(ContextError::MissingKey(key)) => assert_eq!(key, "missing"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
        assert!(matches!(
            ctx.require::<u32>("count"),
            Err(ContextError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_best_effort_failures_accumulate_per_step() {
        let mut ctx = SagaContext::new();
        ctx.record_best_effort_failure("notify_followers", "smtp down");
        ctx.record_best_effort_failure("index_search", "timeout");

        assert_eq!(ctx.best_effort_failure("notify_followers"), Some("smtp down"));
        assert_eq!(ctx.best_effort_failure("index_search"), Some("timeout"));
        assert_eq!(ctx.best_effort_failure("other"), None);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let ctx = SagaContext::new().with("a", 1).with("b", "two");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json, serde_json::json!({"a": 1, "b": "two"}));

        let back: SagaContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }
}
