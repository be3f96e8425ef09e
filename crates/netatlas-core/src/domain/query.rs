use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValidationError;

/// Ordered query parameters for a dataset request.
///
/// Parameters are stored sorted by name, so two queries built in different
/// insertion orders serialize to the same string and share cache and
/// deduplication keys. Serialized values are URL-encoded, which keeps `:` out
/// of the result and preserves the `"<kind>:<query>"` key layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.0.insert(name.to_owned(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Deterministic `k=v&k2=v2` encoding with sorted keys.
    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Build parameters from a JSON object of scalar filters.
    ///
    /// `null` values are skipped; arrays of scalars are joined with `,`.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            _ => return Err(ValidationError::QueryNotObject),
        };

        let mut params = Self::default();
        for (name, value) in object {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyQueryParam);
            }
            let rendered = match value {
                Value::Null => continue,
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        scalar_to_string(item).ok_or_else(|| {
                            ValidationError::NonScalarQueryParam { name: name.clone() }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join(","),
                other => scalar_to_string(other)
                    .ok_or_else(|| ValidationError::NonScalarQueryParam { name: name.clone() })?,
            };
            params.insert(name.as_str(), rendered);
        }
        Ok(params)
    }

    /// Parsed `limit` parameter, when present and numeric.
    pub fn limit(&self) -> Option<usize> {
        self.get("limit")
            .and_then(|value| value.trim().parse::<usize>().ok())
    }

    /// Upper-cased `country` filter.
    pub fn country(&self) -> Option<String> {
        self.get("country")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_uppercase)
    }
}

impl Display for QueryParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::default();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn serialization_sorts_keys_and_encodes_values() {
        let params = QueryParams::new()
            .with("region", "eu west")
            .with("limit", "10")
            .with("country", "DE:FR");

        assert_eq!(params.serialize(), "country=DE%3AFR&limit=10&region=eu%20west");
    }

    #[test]
    fn from_json_renders_scalars_and_skips_null() {
        let params = QueryParams::from_json(&json!({
            "limit": 5,
            "active": true,
            "owner": null,
            "tags": ["a", "b"]
        }))
        .expect("valid query");

        assert_eq!(params.limit(), Some(5));
        assert_eq!(params.get("active"), Some("true"));
        assert_eq!(params.get("owner"), None);
        assert_eq!(params.get("tags"), Some("a,b"));
    }

    #[test]
    fn from_json_rejects_nested_objects() {
        let error = QueryParams::from_json(&json!({"bbox": {"lat": 1}})).expect_err("nested");
        assert_eq!(
            error,
            ValidationError::NonScalarQueryParam {
                name: String::from("bbox")
            }
        );
    }

    #[test]
    fn blank_names_are_ignored() {
        let params = QueryParams::new().with("  ", "x");
        assert!(params.is_empty());
    }

    proptest! {
        #[test]
        fn serialization_ignores_insertion_order(
            entries in proptest::collection::btree_map("[a-z]{1,6}", "[ -~]{0,8}", 0..6)
        ) {
            let forward: QueryParams = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let reverse: QueryParams = entries.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();

            prop_assert_eq!(forward.serialize(), reverse.serialize());
            prop_assert!(!forward.serialize().contains(':'));
        }
    }
}
