//! Message reference resolution.
//!
//! The engine never owns user-facing text. Labels and validation messages
//! are message references resolved through a [`MessageResolver`]; a
//! resolver must not fail, and a missing reference resolves to the key
//! itself.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::values::display_string;

/// Interpolation parameters for a message.
pub type MessageParams = BTreeMap<String, Value>;

/// Turns message references into user-facing text.
pub trait MessageResolver: Send + Sync {
    fn resolve(&self, message_ref: &str, params: &MessageParams) -> String;
}

/// Resolver that returns every reference unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyResolver;

impl MessageResolver for KeyResolver {
    fn resolve(&self, message_ref: &str, _params: &MessageParams) -> String {
        message_ref.to_string()
    }
}

/// Flat key → template catalog with `{name}` interpolation.
///
/// Unknown keys resolve to the key itself; unknown placeholders are left
/// in place.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    entries: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn new(entries: HashMap<String, String>) -> Self {
        MessageCatalog { entries }
    }

    /// Build a catalog from a JSON object of string templates. Nested
    /// objects are flattened with dotted keys (`{"errors": {"required": ..}}`
    /// becomes `errors.required`); non-string leaves are skipped.
    pub fn from_json(value: &Value) -> Self {
        let mut entries = HashMap::new();
        flatten_into(value, String::new(), &mut entries);
        MessageCatalog { entries }
    }

    pub fn insert(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.entries.insert(key.into(), template.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn flatten_into(value: &Value, prefix: String, out: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten_into(v, key, out);
            }
        }
        Value::String(s) if !prefix.is_empty() => {
            out.insert(prefix, s.clone());
        }
        _ => {}
    }
}

impl MessageResolver for MessageCatalog {
    fn resolve(&self, message_ref: &str, params: &MessageParams) -> String {
        let Some(template) = self.entries.get(message_ref) else {
            return message_ref.to_string();
        };
        let mut text = template.clone();
        for (name, value) in params {
            text = text.replace(&format!("{{{}}}", name), &display_string(Some(value)));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_resolver_echoes() {
        assert_eq!(KeyResolver.resolve("a.b", &MessageParams::new()), "a.b");
    }

    #[test]
    fn catalog_interpolates_and_falls_back() {
        let catalog = MessageCatalog::from_json(&json!({
            "errors": { "min": "{field} must be at least {value}" },
            "count": 3
        }));
        assert_eq!(catalog.len(), 1);
        let mut params = MessageParams::new();
        params.insert("field".to_string(), json!("Amount"));
        params.insert("value".to_string(), json!(0));
        assert_eq!(
            catalog.resolve("errors.min", &params),
            "Amount must be at least 0"
        );
        assert_eq!(catalog.resolve("errors.nope", &params), "errors.nope");
    }
}
