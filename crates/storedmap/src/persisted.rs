use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::payload::Payload;
use crate::sort_key::SortValue;
use crate::value::MapValue;

/// On-the-wire shape of a [`Payload`], written as the primary blob's value.
/// Kept distinct from `Payload` itself so the in-memory type is free to
/// grow fields that don't round-trip (e.g. derived caches) without
/// disturbing the persisted format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedPayload {
    tree: MapValue,
    sort: SortValue,
    secondary_key: Option<String>,
    tags: Vec<String>,
}

pub fn encode_payload(payload: &Payload) -> StoreResult<Vec<u8>> {
    let persisted = PersistedPayload {
        tree: payload.tree().clone(),
        sort: payload.sort().clone(),
        secondary_key: payload.secondary_key().map(str::to_string),
        tags: payload.tags_persisted().to_vec(),
    };
    serde_json::to_vec(&persisted)
        .map_err(|e| StoreError::serialization(format!("cannot encode payload: {e}")))
}

pub fn decode_payload(bytes: &[u8]) -> StoreResult<Payload> {
    let persisted: PersistedPayload = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::serialization(format!("cannot decode payload: {e}")))?;
    Ok(Payload::from_parts(persisted.tree, persisted.sort, persisted.secondary_key, persisted.tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_its_wire_format() {
        let mut payload = Payload::empty();
        payload.map_mut().insert("k".to_string(), MapValue::Int(42));
        payload.set_sort(SortValue::Number(1.5));
        payload.set_secondary_key(Some("sk".to_string()));
        payload.set_tags(vec!["t1".to_string(), "t2".to_string()]);

        let bytes = encode_payload(&payload).unwrap();
        let decoded = decode_payload(&bytes).unwrap();

        assert_eq!(decoded.tree(), payload.tree());
        assert_eq!(decoded.sort(), payload.sort());
        assert_eq!(decoded.secondary_key(), payload.secondary_key());
        assert_eq!(decoded.tags(), payload.tags());
    }
}
