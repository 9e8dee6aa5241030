//! Conversion of an [`AddEntry`] into the column values of an entry row.

use crate::dn::fold_value;
use crate::models::AddEntry;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapperError {
    #[error("Attribute with empty name")]
    EmptyAttributeName,

    #[error("Attribute '{0}' has no values")]
    NoValues(String),
}

/// Storage-ready fields of a new entry.
#[derive(Debug, Clone)]
pub struct StorageRow {
    pub uuid: Uuid,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub attrs_norm: Value,
    pub attrs_orig: Value,
}

pub fn to_storage_row(entry: &AddEntry) -> Result<StorageRow, MapperError> {
    // Keyed by normalized name; the first spelling seen is kept for display.
    let mut merged: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();

    for attr in entry.stored_attributes() {
        let name = attr.name.trim();
        if name.is_empty() {
            return Err(MapperError::EmptyAttributeName);
        }
        if attr.values.is_empty() {
            return Err(MapperError::NoValues(name.to_string()));
        }
        let slot = merged
            .entry(name.to_lowercase())
            .or_insert_with(|| (name.to_string(), Vec::new()));
        slot.1.extend(attr.values.iter().cloned());
    }

    let mut attrs_norm = Map::new();
    let mut attrs_orig = Map::new();
    for (norm_name, (orig_name, values)) in merged {
        let norm_values = values.iter().map(|v| Value::String(fold_value(v)));
        attrs_norm.insert(norm_name, Value::Array(norm_values.collect()));
        attrs_orig.insert(
            orig_name,
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }

    let now = Utc::now();
    Ok(StorageRow {
        uuid: Uuid::new_v4(),
        created: now,
        updated: now,
        attrs_norm: Value::Object(attrs_norm),
        attrs_orig: Value::Object(attrs_orig),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::DirectoryContext;
    use crate::models::Attribute;
    use serde_json::json;

    fn entry(attributes: Vec<Attribute>) -> AddEntry {
        let ctx = DirectoryContext::new("dc=example,dc=com").unwrap();
        let dn = ctx
            .normalize_dn("cn=alice,ou=people,dc=example,dc=com")
            .unwrap();
        AddEntry::new(dn, attributes)
    }

    #[test]
    fn encodes_norm_and_orig_maps() {
        let row = to_storage_row(&entry(vec![
            Attribute::new("cn", ["Alice"]),
            Attribute::new("displayName", ["Alice  Liddell"]),
        ]))
        .unwrap();

        assert_eq!(
            row.attrs_norm,
            json!({"cn": ["alice"], "displayname": ["alice liddell"]})
        );
        assert_eq!(
            row.attrs_orig,
            json!({"cn": ["Alice"], "displayName": ["Alice  Liddell"]})
        );
        assert_eq!(row.created, row.updated);
    }

    #[test]
    fn merges_names_differing_in_case() {
        let row = to_storage_row(&entry(vec![
            Attribute::new("mail", ["a@example.com"]),
            Attribute::new("MAIL", ["b@example.com"]),
        ]))
        .unwrap();

        assert_eq!(
            row.attrs_norm,
            json!({"mail": ["a@example.com", "b@example.com"]})
        );
        assert_eq!(
            row.attrs_orig,
            json!({"mail": ["a@example.com", "b@example.com"]})
        );
    }

    #[test]
    fn values_fold_like_dn_components() {
        let row = to_storage_row(&entry(vec![Attribute::new(
            "seeAlso",
            [r"CN=Bob\  Smith,  OU=People"],
        )]))
        .unwrap();

        assert_eq!(
            row.attrs_norm,
            json!({"seealso": [r"cn=bob\  smith, ou=people"]})
        );
    }

    #[test]
    fn membership_is_left_out() {
        let row = to_storage_row(&entry(vec![
            Attribute::new("cn", ["Alice"]),
            Attribute::new("member", ["cn=bob,dc=example,dc=com"]),
        ]))
        .unwrap();

        assert_eq!(row.attrs_norm, json!({"cn": ["alice"]}));
    }

    #[test]
    fn rejects_empty_values_and_names() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            to_storage_row(&entry(vec![Attribute::new("cn", empty)])).unwrap_err(),
            MapperError::NoValues("cn".to_string())
        );
        assert_eq!(
            to_storage_row(&entry(vec![Attribute::new(" ", ["x"])])).unwrap_err(),
            MapperError::EmptyAttributeName
        );
    }

    #[test]
    fn each_row_gets_a_fresh_uuid() {
        let e = entry(vec![Attribute::new("cn", ["Alice"])]);
        let a = to_storage_row(&e).unwrap();
        let b = to_storage_row(&e).unwrap();
        assert_ne!(a.uuid, b.uuid);
    }
}
