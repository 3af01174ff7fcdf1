//! # Field Mapping
//!
//! Declarative translation between local canonical field names and the
//! remote system's field names.
//!
//! ## Direction Asymmetry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     mapping: { "sku": "SKU", "qty": "Quantity" }        │
//! │                                                                         │
//! │  PULL (remote → local) : permissive                                     │
//! │  ─────────────────────────────────                                      │
//! │  { "SKU": "A1", "Quantity": 3, "Notes": "x" }                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  { "sku": "A1", "qty": 3, "Notes": "x" }   ← unmapped kept as-is        │
//! │                                                                         │
//! │  PUSH (local → remote) : restrictive                                    │
//! │  ─────────────────────────────────                                      │
//! │  { "sku": "A1", "qty": 3, "Notes": "x" }                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  { "SKU": "A1", "Quantity": 3 }            ← unmapped dropped           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every lookup returns a [`MappingOutcome`] so callers can tell an
//! intentional mapping from the identity fallback.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

/// Untyped record fields as exchanged with remote systems.
pub type FieldMap = Map<String, Value>;

// =============================================================================
// Mapping Outcome
// =============================================================================

/// Result of translating one field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutcome {
    /// The mapping table has an entry; this is the translated name.
    Mapped(String),
    /// No entry exists; this is the original, untranslated name.
    Unmapped(String),
}

impl MappingOutcome {
    /// The resulting field name regardless of outcome.
    pub fn name(&self) -> &str {
        match self {
            MappingOutcome::Mapped(name) | MappingOutcome::Unmapped(name) => name,
        }
    }

    /// Returns true if a mapping entry was used.
    pub fn is_mapped(&self) -> bool {
        matches!(self, MappingOutcome::Mapped(_))
    }
}

// =============================================================================
// Field Mapping
// =============================================================================

/// Bidirectional field mapping (local field → remote field).
///
/// Both local and remote names are unique, so the reverse lookup used by
/// pull is unambiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    to_remote: BTreeMap<String, String>,
    to_local: BTreeMap<String, String>,
}

impl FieldMapping {
    /// Parses the declarative mapping from its JSON object string form.
    ///
    /// A blank string is an empty mapping.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::mapping::FieldMapping;
    ///
    /// let mapping = FieldMapping::parse(r#"{"sku": "SKU"}"#).unwrap();
    /// assert_eq!(mapping.remote_name_for("sku").name(), "SKU");
    ///
    /// assert!(FieldMapping::parse(r#"{"sku": "SKU", "sku": "Code"}"#).is_err());
    /// assert!(FieldMapping::parse("[1, 2]").is_err());
    /// ```
    pub fn parse(raw: &str) -> ValidationResult<Self> {
        if raw.trim().is_empty() {
            return Ok(FieldMapping::default());
        }

        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let pairs = deserializer
            .deserialize_map(PairsVisitor)
            .and_then(|pairs| deserializer.end().map(|_| pairs))
            .map_err(|e| ValidationError::invalid_format("mapping", e.to_string()))?;

        let mut string_pairs = Vec::with_capacity(pairs.len());
        for (local, remote) in pairs {
            match remote {
                Value::String(remote) => string_pairs.push((local, remote)),
                other => {
                    return Err(ValidationError::invalid_format(
                        "mapping",
                        format!("value for '{}' must be a string, got {}", local, other),
                    ))
                }
            }
        }

        Self::from_pairs(string_pairs)
    }

    /// Builds a mapping from (local, remote) pairs, rejecting duplicates.
    pub fn from_pairs<I, L, R>(pairs: I) -> ValidationResult<Self>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let mut mapping = FieldMapping::default();

        for (local, remote) in pairs {
            let local = local.into();
            let remote = remote.into();

            if local.trim().is_empty() || remote.trim().is_empty() {
                return Err(ValidationError::invalid_format(
                    "mapping",
                    "field names must not be empty",
                ));
            }
            if mapping.to_remote.contains_key(&local) {
                return Err(ValidationError::Duplicate {
                    field: "mapping key".to_string(),
                    value: local,
                });
            }
            if mapping.to_local.contains_key(&remote) {
                return Err(ValidationError::Duplicate {
                    field: "mapping target".to_string(),
                    value: remote,
                });
            }

            mapping.to_local.insert(remote.clone(), local.clone());
            mapping.to_remote.insert(local, remote);
        }

        Ok(mapping)
    }

    /// Serializes back to the JSON object string form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_remote).unwrap_or_else(|_| "{}".to_string())
    }

    /// Number of mapped fields.
    pub fn len(&self) -> usize {
        self.to_remote.len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.to_remote.is_empty()
    }

    /// Iterates (local, remote) pairs in local-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_remote.iter().map(|(l, r)| (l.as_str(), r.as_str()))
    }

    /// Translates a local field name to its remote name.
    pub fn remote_name_for(&self, local: &str) -> MappingOutcome {
        match self.to_remote.get(local) {
            Some(remote) => MappingOutcome::Mapped(remote.clone()),
            None => MappingOutcome::Unmapped(local.to_string()),
        }
    }

    /// Translates a remote field name to its local name.
    pub fn local_name_for(&self, remote: &str) -> MappingOutcome {
        match self.to_local.get(remote) {
            Some(local) => MappingOutcome::Mapped(local.clone()),
            None => MappingOutcome::Unmapped(remote.to_string()),
        }
    }

    /// Push direction: keeps only mapped fields, under their remote names.
    pub fn to_remote_fields(&self, local_fields: &FieldMap) -> FieldMap {
        local_fields
            .iter()
            .filter_map(|(name, value)| match self.remote_name_for(name) {
                MappingOutcome::Mapped(remote) => Some((remote, value.clone())),
                MappingOutcome::Unmapped(_) => None,
            })
            .collect()
    }

    /// Pull direction: translates mapped fields and keeps the rest verbatim.
    ///
    /// If an unmapped remote name collides with a translated local name the
    /// translated value wins.
    pub fn to_local_fields(&self, remote_fields: &FieldMap) -> FieldMap {
        let mut local = FieldMap::new();
        let mut fallbacks = Vec::new();

        for (name, value) in remote_fields {
            match self.local_name_for(name) {
                MappingOutcome::Mapped(local_name) => {
                    local.insert(local_name, value.clone());
                }
                MappingOutcome::Unmapped(original) => fallbacks.push((original, value.clone())),
            }
        }

        for (name, value) in fallbacks {
            local.entry(name).or_insert(value);
        }

        local
    }
}

// =============================================================================
// Serde
// =============================================================================

/// Collects object entries in document order without collapsing duplicates.
struct PairsVisitor;

impl<'de> Visitor<'de> for PairsVisitor {
    type Value = Vec<(String, Value)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of local_field -> remote_field")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            pairs.push((key, value));
        }
        Ok(pairs)
    }
}

impl Serialize for FieldMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.to_remote.len()))?;
        for (local, remote) in &self.to_remote {
            map.serialize_entry(local, remote)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = deserializer.deserialize_map(PairsVisitor)?;
        let mut string_pairs = Vec::with_capacity(pairs.len());
        for (local, remote) in pairs {
            match remote {
                Value::String(remote) => string_pairs.push((local, remote)),
                _ => return Err(de::Error::custom(format!("value for '{}' must be a string", local))),
            }
        }
        FieldMapping::from_pairs(string_pairs).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    fn orders_mapping() -> FieldMapping {
        FieldMapping::parse(r#"{"sku": "SKU", "qty": "Quantity"}"#).unwrap()
    }

    #[test]
    fn test_pull_keeps_unmapped_fields_under_original_name() {
        let remote = fields(json!({"SKU": "A1", "Quantity": 3, "Notes": "rush"}));
        let local = orders_mapping().to_local_fields(&remote);

        assert_eq!(local.get("sku"), Some(&json!("A1")));
        assert_eq!(local.get("qty"), Some(&json!(3)));
        assert_eq!(local.get("Notes"), Some(&json!("rush")));
        assert!(local.get("SKU").is_none());
    }

    #[test]
    fn test_push_drops_unmapped_fields() {
        let local = fields(json!({"sku": "A1", "qty": 3, "Notes": "rush"}));
        let remote = orders_mapping().to_remote_fields(&local);

        assert_eq!(remote.len(), 2);
        assert_eq!(remote.get("SKU"), Some(&json!("A1")));
        assert_eq!(remote.get("Quantity"), Some(&json!(3)));
        assert!(remote.get("Notes").is_none());
    }

    #[test]
    fn test_heterogeneous_values_pass_through() {
        let mapping = FieldMapping::parse(r#"{"tags": "Tags", "paid": "Paid"}"#).unwrap();
        let remote = mapping.to_remote_fields(&fields(json!({
            "tags": ["a", "b"],
            "paid": true,
        })));
        assert_eq!(remote.get("Tags"), Some(&json!(["a", "b"])));
        assert_eq!(remote.get("Paid"), Some(&json!(true)));
    }

    #[test]
    fn test_outcome_distinguishes_fallback() {
        let mapping = orders_mapping();
        assert_eq!(
            mapping.local_name_for("SKU"),
            MappingOutcome::Mapped("sku".to_string())
        );
        let fallback = mapping.local_name_for("Notes");
        assert!(!fallback.is_mapped());
        assert_eq!(fallback.name(), "Notes");
    }

    #[test]
    fn test_mapped_value_wins_over_colliding_fallback() {
        let mapping = FieldMapping::parse(r#"{"name": "Title"}"#).unwrap();
        let local = mapping.to_local_fields(&fields(json!({"Title": "mapped", "name": "raw"})));
        assert_eq!(local.get("name"), Some(&json!("mapped")));
    }

    #[test]
    fn test_parse_rejects_malformed_config() {
        assert!(FieldMapping::parse("{not json").is_err());
        assert!(FieldMapping::parse(r#"["sku"]"#).is_err());
        assert!(FieldMapping::parse(r#"{"sku": 1}"#).is_err());
        assert!(FieldMapping::parse(r#"{"sku": ""}"#).is_err());
        assert!(FieldMapping::parse(r#"{"sku": "SKU"} trailing"#).is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_keys_and_targets() {
        let err = FieldMapping::parse(r#"{"sku": "SKU", "sku": "Code"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { .. }));

        let err = FieldMapping::parse(r#"{"sku": "SKU", "code": "SKU"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { .. }));
    }

    #[test]
    fn test_blank_mapping_is_empty() {
        let mapping = FieldMapping::parse("  ").unwrap();
        assert!(mapping.is_empty());
        assert!(mapping.to_remote_fields(&fields(json!({"a": 1}))).is_empty());
    }

    #[test]
    fn test_json_form_survives_serde() {
        let mapping = orders_mapping();
        let parsed = FieldMapping::parse(&mapping.to_json()).unwrap();
        assert_eq!(parsed, mapping);

        let from_serde: FieldMapping =
            serde_json::from_value(json!({"sku": "SKU", "qty": "Quantity"})).unwrap();
        assert_eq!(from_serde, mapping);
    }
}
