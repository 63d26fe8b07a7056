//! Backend-neutral query model.
//!
//! Builders describe *what* to fetch with [`Condition`], [`Sort`] and
//! [`Projection`]; each backend translates the same AST into its native
//! query language. [`Condition::matches`] is the reference evaluator: the
//! memory backend runs it directly and the Postgres backend must agree with it.
//!
//! Numeric comparisons never go through `f64` when both sides fit in `u64`
//! or `i64`, so heights and ids above 2^53 compare exactly.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::types::{StorageId, StoredDocument};

// ─── FieldPath ────────────────────────────────────────────────────────────────

/// A dotted path into a document body, e.g. `meta.height`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Walk the path through nested objects. Arrays are not traversed.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments()
            .try_fold(value, |current, segment| current.as_object()?.get(segment))
    }

    /// Remove the field at this path, returning it if it existed.
    pub fn remove_from(&self, value: &mut Value) -> Option<Value> {
        let segments: Vec<&str> = self.segments().collect();
        let (last, parents) = segments.split_last()?;
        let mut current = value;
        for segment in parents {
            current = current.as_object_mut()?.get_mut(*segment)?;
        }
        current.as_object_mut()?.remove(*last)
    }

    /// Set the field at this path, creating intermediate objects as needed.
    /// Non-object intermediates are left alone and the write is skipped.
    pub fn insert_into(&self, target: &mut Value, value: Value) {
        let segments: Vec<&str> = self.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = target;
        for segment in parents {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if let Some(map) = current.as_object_mut() {
            map.insert(last.to_string(), value);
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Condition ────────────────────────────────────────────────────────────────

/// A single match predicate. Lists of conditions are always ANDed.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals value (numbers compare by value, not representation).
    Eq(FieldPath, Value),
    /// Field equals one of the values.
    In(FieldPath, Vec<Value>),
    Gt(FieldPath, Value),
    Gte(FieldPath, Value),
    Lt(FieldPath, Value),
    /// Array field has an element containing the value (JSONB `@>` semantics,
    /// so `{"id": 5}` matches `[{"id": 5, "amount": 10}]`).
    Contains(FieldPath, Value),
    /// Field is present (`true`) or absent (`false`).
    Exists(FieldPath, bool),
    IdGt(StorageId),
    IdLt(StorageId),
    IdIn(Vec<StorageId>),
    And(Vec<Condition>),
}

impl Condition {
    pub fn eq(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(path: impl Into<FieldPath>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(path.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::Contains(path.into(), value.into())
    }

    pub fn missing(path: impl Into<FieldPath>) -> Self {
        Self::Exists(path.into(), false)
    }

    /// Evaluate against a stored document.
    pub fn matches(&self, doc: &StoredDocument) -> bool {
        match self {
            Self::Eq(path, expected) => doc
                .get(path)
                .is_some_and(|actual| values_equal(actual, expected)),
            Self::In(path, candidates) => doc
                .get(path)
                .is_some_and(|actual| candidates.iter().any(|c| values_equal(actual, c))),
            Self::Gt(path, bound) => cmp_field(doc, path, bound) == Some(Ordering::Greater),
            Self::Gte(path, bound) => matches!(
                cmp_field(doc, path, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Lt(path, bound) => cmp_field(doc, path, bound) == Some(Ordering::Less),
            Self::Contains(path, needle) => match doc.get(path) {
                Some(Value::Array(items)) => items.iter().any(|item| json_contains(item, needle)),
                _ => false,
            },
            Self::Exists(path, present) => doc.get(path).is_some() == *present,
            Self::IdGt(bound) => doc.id > *bound,
            Self::IdLt(bound) => doc.id < *bound,
            Self::IdIn(ids) => ids.contains(&doc.id),
            Self::And(conditions) => matches_all(conditions, doc),
        }
    }
}

/// `true` when every condition matches; an empty list matches everything.
pub fn matches_all(conditions: &[Condition], doc: &StoredDocument) -> bool {
    conditions.iter().all(|c| c.matches(doc))
}

fn cmp_field(doc: &StoredDocument, path: &FieldPath, bound: &Value) -> Option<Ordering> {
    compare_values(doc.get(path)?, bound)
}

/// Order two JSON scalars of the same type; `None` for incomparable pairs.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            // one side is u64 above i64::MAX, the other a negative i64
            match (x.as_u64(), y.as_u64()) {
                (Some(_), None) if y.is_i64() => Some(Ordering::Greater),
                (None, Some(_)) if x.is_i64() => Some(Ordering::Less),
                _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// JSONB-style containment: objects match on a subset of keys, arrays when
/// every needle element is contained by some haystack element.
pub fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, v)| h.get(k).is_some_and(|hv| json_contains(hv, v))),
        (Value::Array(h), Value::Array(n)) => n
            .iter()
            .all(|nv| h.iter().any(|hv| json_contains(hv, nv))),
        _ => values_equal(haystack, needle),
    }
}

// ─── Sort ─────────────────────────────────────────────────────────────────────

/// Sort direction; crosses the boundary as `1` / `-1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

impl TryFrom<i64> for SortDirection {
    type Error = crate::error::QueryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ascending),
            -1 => Ok(Self::Descending),
            other => Err(crate::error::QueryError::InvalidQuery(format!(
                "sort direction must be 1 or -1, got {other}"
            ))),
        }
    }
}

impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// What to sort on: the storage id or a document field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Id,
    Path(FieldPath),
}

impl SortField {
    pub fn path(path: impl Into<FieldPath>) -> Self {
        Self::Path(path.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Compare two documents: sort field first, then ascending storage order.
    pub fn compare(&self, a: &StoredDocument, b: &StoredDocument) -> Ordering {
        let primary = match &self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Path(path) => sort_key_cmp(a.get(path), b.get(path)),
        };
        self.direction.apply(primary).then_with(|| a.id.cmp(&b.id))
    }
}

/// Total order used for sorting: missing and null first, then numbers,
/// strings, objects, arrays, booleans.
fn sort_key_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

// ─── Projection / FindQuery ───────────────────────────────────────────────────

/// Which fields of a document to return.
///
/// A non-empty `include` keeps only those paths; `exclude` is applied after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub include: Vec<FieldPath>,
    pub exclude: Vec<FieldPath>,
}

impl Projection {
    pub fn excluding(fields: impl IntoIterator<Item = FieldPath>) -> Self {
        Self {
            include: Vec::new(),
            exclude: fields.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn apply(&self, body: &mut Value) {
        if !self.include.is_empty() {
            let mut kept = Value::Object(Map::new());
            for path in &self.include {
                if let Some(value) = path.resolve(body) {
                    path.insert_into(&mut kept, value.clone());
                }
            }
            *body = kept;
        }
        for path in &self.exclude {
            path.remove_from(body);
        }
    }
}

/// A complete find request against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    /// ANDed; empty matches every document.
    pub filter: Vec<Condition>,
    /// `None` means ascending storage order.
    pub sort: Option<Sort>,
    pub skip: u64,
    pub limit: Option<u64>,
    pub projection: Projection,
}

impl FindQuery {
    pub fn new(filter: Vec<Condition>) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn exclude(mut self, fields: impl IntoIterator<Item = FieldPath>) -> Self {
        self.projection.exclude.extend(fields);
        self
    }

    pub fn include(mut self, fields: impl IntoIterator<Item = FieldPath>) -> Self {
        self.projection.include.extend(fields);
        self
    }

    /// The effective sort, defaulting to ascending storage order.
    pub fn effective_sort(&self) -> Sort {
        self.sort.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: u64, body: Value) -> StoredDocument {
        StoredDocument::new(id, body)
    }

    #[test]
    fn resolve_and_remove_nested_path() {
        let mut body = json!({"meta": {"height": 5, "addresses": ["A"]}});
        let path = FieldPath::new("meta.addresses");
        assert_eq!(path.resolve(&body), Some(&json!(["A"])));
        assert_eq!(path.remove_from(&mut body), Some(json!(["A"])));
        assert_eq!(body, json!({"meta": {"height": 5}}));
        assert!(FieldPath::new("meta.missing.deep").remove_from(&mut body).is_none());
    }

    #[test]
    fn include_projection_keeps_only_listed_paths() {
        let mut body = json!({
            "account": {"address": "98AA", "publicKey": "AB", "mosaics": []},
            "meta": {"x": 1}
        });
        let projection = Projection {
            include: vec![FieldPath::new("account.publicKey")],
            exclude: vec![],
        };
        projection.apply(&mut body);
        assert_eq!(body, json!({"account": {"publicKey": "AB"}}));
    }

    #[test]
    fn numbers_above_2_pow_53_compare_exactly() {
        let big = (1u64 << 53) + 1;
        let d = doc(1, json!({"meta": {"height": big}}));
        assert!(Condition::eq("meta.height", big).matches(&d));
        assert!(!Condition::eq("meta.height", big - 1).matches(&d));
        assert!(Condition::Gt("meta.height".into(), json!(big - 1)).matches(&d));
        assert!(!Condition::Gt("meta.height".into(), json!(big)).matches(&d));
        assert_eq!(
            compare_values(&json!(u64::MAX), &json!(-1)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn contains_matches_array_elements_and_subobjects() {
        let d = doc(
            1,
            json!({
                "meta": {"addresses": ["AA", "BB"]},
                "account": {"mosaics": [{"id": 7, "amount": 100}]}
            }),
        );
        assert!(Condition::contains("meta.addresses", "BB").matches(&d));
        assert!(!Condition::contains("meta.addresses", "CC").matches(&d));
        assert!(Condition::contains("account.mosaics", json!({"id": 7})).matches(&d));
        assert!(!Condition::contains("account.mosaics", json!({"id": 8})).matches(&d));
    }

    #[test]
    fn exists_and_id_conditions() {
        let d = doc(10, json!({"meta": {"aggregateId": 3}}));
        assert!(Condition::Exists("meta.aggregateId".into(), true).matches(&d));
        assert!(!Condition::missing("meta.aggregateId").matches(&d));
        assert!(Condition::IdGt(StorageId(9)).matches(&d));
        assert!(!Condition::IdLt(StorageId(10)).matches(&d));
        assert!(Condition::IdIn(vec![StorageId(1), StorageId(10)]).matches(&d));
        assert!(matches_all(&[], &d));
    }

    #[test]
    fn sort_breaks_ties_by_storage_order() {
        let a = doc(1, json!({"meta": {"height": 5}}));
        let b = doc(2, json!({"meta": {"height": 5}}));
        let c = doc(3, json!({"meta": {"height": 9}}));
        let sort = Sort::new(SortField::path("meta.height"), SortDirection::Descending);
        let mut docs = vec![a.clone(), c.clone(), b.clone()];
        docs.sort_by(|x, y| sort.compare(x, y));
        let ids: Vec<u64> = docs.iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn sort_direction_wire_format() {
        assert_eq!(serde_json::to_value(SortDirection::Descending).unwrap(), json!(-1));
        let parsed: SortDirection = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(parsed, SortDirection::Ascending);
        assert!(serde_json::from_value::<SortDirection>(json!(0)).is_err());
    }
}
