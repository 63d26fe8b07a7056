//! Document sanitizer — pure transforms from stored rows to boundary documents.
//!
//! The raw storage identifier never crosses the boundary under its storage
//! name. Two shapes exist:
//! - listing form: `{id, meta, <payload>}` (paged queries)
//! - entity form: `{meta: {id, ..}, <payload>}` (point and batch lookups)

use serde_json::{Map, Value};

use crate::query::FieldPath;
use crate::types::{Document, EntityKind, StoredDocument};

/// Listing form: storage id exposed as top-level `id`.
pub fn to_listing(kind: EntityKind, stored: StoredDocument, strip: &[FieldPath]) -> Document {
    let (meta, payload) = split(kind, stored.body, strip);
    Document {
        id: Some(stored.id),
        meta,
        payload: kind.wrap(payload),
    }
}

/// Entity form: storage id copied into `meta.id`, no top-level id.
pub fn to_entity(kind: EntityKind, stored: StoredDocument, strip: &[FieldPath]) -> Document {
    let (mut meta, payload) = split(kind, stored.body, strip);
    meta.insert("id".into(), Value::from(stored.id.as_u64()));
    Document {
        id: None,
        meta,
        payload: kind.wrap(payload),
    }
}

fn split(kind: EntityKind, mut body: Value, strip: &[FieldPath]) -> (Map<String, Value>, Map<String, Value>) {
    for path in strip {
        path.remove_from(&mut body);
    }
    let Value::Object(mut fields) = body else {
        return (Map::new(), Map::new());
    };
    let meta = take_object(&mut fields, "meta");
    let payload = take_object(&mut fields, kind.payload_key());
    (meta, payload)
}

fn take_object(fields: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match fields.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageId;
    use serde_json::json;

    fn stored() -> StoredDocument {
        StoredDocument::new(
            42,
            json!({
                "meta": {"height": 7, "addresses": ["AA"]},
                "transaction": {"type": 16724}
            }),
        )
    }

    #[test]
    fn listing_form_exposes_top_level_id_and_strips() {
        let doc = to_listing(EntityKind::Transaction, stored(), &[FieldPath::new("meta.addresses")]);
        assert_eq!(doc.id, Some(StorageId(42)));
        assert!(doc.meta.get("addresses").is_none());
        assert!(doc.meta.get("id").is_none());
        assert_eq!(doc.payload_u64("type"), Some(16724));
    }

    #[test]
    fn entity_form_moves_id_into_meta() {
        let original = stored();
        let doc = to_entity(EntityKind::Transaction, original.clone(), &[]);
        assert_eq!(doc.id, None);
        assert_eq!(doc.meta_u64("id"), Some(original.id.as_u64()));
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["meta"]["id"], json!(42));
    }

    #[test]
    fn malformed_body_yields_empty_sections() {
        let doc = to_entity(EntityKind::Block, StoredDocument::new(1, json!("oops")), &[]);
        assert_eq!(doc.meta.len(), 1);
        assert!(doc.payload.fields().is_empty());
    }
}
