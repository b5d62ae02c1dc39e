//! Flat records and the ordered table built from them.
//!
//! A `Record` is a mapping of field name to string value. Field order is
//! always sorted, so serializing a `Table` yields the same bytes for the
//! same logical content no matter how the source ordered its keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of the reference dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Build a record from a JSON object.
    ///
    /// Strings are kept verbatim, numbers and booleans are stringified,
    /// `null` fields are dropped and nested values keep their compact JSON text.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let fields = object
            .into_iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s,
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
                };
                Some((name, text))
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this record with one field removed.
    pub fn without(&self, name: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.remove(name);
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Ordered sequence of records, replaced wholesale on refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    records: Vec<Record>,
}

impl Table {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Record> for Table {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn test_from_object_scalar_values() {
        let record = Record::from_object(object(json!({
            "country": "US",
            "lvid": 42,
            "active": true,
            "note": null
        })));

        assert_eq!(record.get("country"), Some("US"));
        assert_eq!(record.get("lvid"), Some("42"));
        assert_eq!(record.get("active"), Some("true"));
        assert_eq!(record.get("note"), None);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_from_object_nested_value_kept_as_json() {
        let record = Record::from_object(object(json!({
            "tags": {"b": 1, "a": 2}
        })));
        assert_eq!(record.get("tags"), Some(r#"{"a":2,"b":1}"#));
    }

    #[test]
    fn test_without_removes_field() {
        let record: Record = [("country", "US"), ("branch", "B1")].into_iter().collect();
        let rest = record.without("branch");
        assert_eq!(rest.get("branch"), None);
        assert_eq!(rest.get("country"), Some("US"));
        // original untouched
        assert_eq!(record.get("branch"), Some("B1"));
    }

    #[test]
    fn test_table_serializes_with_sorted_fields() {
        let record = Record::from_object(object(json!({"z": "1", "a": "2"})));
        let table = Table::new(vec![record]);
        let text = serde_json::to_string(&table).unwrap();
        assert_eq!(text, r#"[{"a":"2","z":"1"}]"#);

        let back: Table = serde_json::from_str(&text).unwrap();
        assert_eq!(back, table);
    }
}
