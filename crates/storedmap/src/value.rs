use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value stored inside a record's map tree.
///
/// Unlike `serde_json::Value`, lists and maps nest `MapValue` directly so a
/// record can hold arbitrarily deep structure while keeping map insertion
/// order (`IndexMap`) — the order a reader iterates keys in matches the
/// order a writer put them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<MapValue>),
    Map(IndexMap<String, MapValue>),
}

impl MapValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MapValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, MapValue>> {
        match self {
            MapValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MapValue]> {
        match self {
            MapValue::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn empty_map() -> Self {
        MapValue::Map(IndexMap::new())
    }
}

impl From<&str> for MapValue {
    fn from(value: &str) -> Self {
        MapValue::Text(value.to_string())
    }
}

impl From<String> for MapValue {
    fn from(value: String) -> Self {
        MapValue::Text(value)
    }
}

impl From<i64> for MapValue {
    fn from(value: i64) -> Self {
        MapValue::Int(value)
    }
}

impl From<f64> for MapValue {
    fn from(value: f64) -> Self {
        MapValue::Float(value)
    }
}

impl From<bool> for MapValue {
    fn from(value: bool) -> Self {
        MapValue::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_value_preserves_insertion_order() {
        let mut map = IndexMap::new();
        map.insert("z".to_string(), MapValue::Int(1));
        map.insert("a".to_string(), MapValue::Int(2));
        let value = MapValue::Map(map);

        let keys: Vec<&str> = value.as_map().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn conversions_build_expected_variants() {
        assert_eq!(MapValue::from("hi"), MapValue::Text("hi".to_string()));
        assert_eq!(MapValue::from(3i64), MapValue::Int(3));
        assert_eq!(MapValue::from(true), MapValue::Bool(true));
    }
}
