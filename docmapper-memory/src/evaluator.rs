//! Filter evaluation and update application for in-memory documents.
//!
//! Filters use the document-store query language: `{ field: value }` for
//! equality, `{ field: { $op: operand } }` for operators, `$and`/`$or` at the
//! top level and dotted paths into embedded documents. Updates use the
//! `$set`, `$unset` and `$inc` operators.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docmapper_core::error::{MapperError, MapperResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `1` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value, compared structurally.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path inside `document`.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn is_operator_document(value: &Bson) -> bool {
    match value {
        Bson::Document(doc) => doc.keys().next().is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns whether the document satisfies every clause of `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::InvalidDocument`] for unknown operators or
    /// malformed operands.
    pub fn matches(&self, filter: &Document) -> MapperResult<bool> {
        for (key, condition) in filter {
            let satisfied = match key.as_str() {
                "$and" => self.visit_and(clauses(key, condition)?)?,
                "$or" => self.visit_or(clauses(key, condition)?)?,
                "$nor" => !self.visit_or(clauses(key, condition)?)?,
                op if op.starts_with('$') => {
                    return Err(MapperError::InvalidDocument(format!("unknown top-level operator {op}")));
                }
                path => self.visit_field(path, condition)?,
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> MapperResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn visit_and(&self, clauses: Vec<&Document>) -> MapperResult<bool> {
        for clause in clauses {
            if !self.matches(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&self, clauses: Vec<&Document>) -> MapperResult<bool> {
        for clause in clauses {
            if self.matches(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&self, path: &str, condition: &Bson) -> MapperResult<bool> {
        let value = lookup(self.document, path);

        match condition {
            Bson::Document(ops) if is_operator_document(condition) => {
                for (op, operand) in ops {
                    if !visit_op(value, op, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(equals(value, condition)),
        }
    }
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> MapperResult<Vec<&'a Document>> {
    let invalid = || MapperError::InvalidDocument(format!("{op} expects an array of documents"));

    condition
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|clause| clause.as_document().ok_or_else(invalid))
        .collect()
}

/// Equality as the store defines it: a missing field equals `null` and an
/// array field matches when it equals the operand or contains it.
fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    let operand = Comparable::from(operand);

    match value {
        None => operand == Comparable::Null,
        Some(value) => match Comparable::from(value) {
            Comparable::Array(items) => {
                items.iter().any(|item| *item == operand) || Comparable::Array(items) == operand
            }
            value => value == operand,
        },
    }
}

fn compare(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);

    match value.map(Comparable::from) {
        Some(Comparable::Array(items)) => items
            .iter()
            .any(|item| item.partial_cmp(&operand).is_some_and(accept)),
        Some(value) => value.partial_cmp(&operand).is_some_and(accept),
        None => false,
    }
}

fn visit_op(value: Option<&Bson>, op: &str, operand: &Bson) -> MapperResult<bool> {
    Ok(match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => compare(value, operand, |o| o == Ordering::Greater),
        "$gte" => compare(value, operand, |o| o != Ordering::Less),
        "$lt" => compare(value, operand, |o| o == Ordering::Less),
        "$lte" => compare(value, operand, |o| o != Ordering::Greater),
        "$in" => members(op, operand)?.iter().any(|member| equals(value, member)),
        "$nin" => !members(op, operand)?.iter().any(|member| equals(value, member)),
        "$exists" => value.is_some() == truthy(operand),
        _ => return Err(MapperError::InvalidDocument(format!("unknown operator {op}"))),
    })
}

fn members<'a>(op: &str, operand: &'a Bson) -> MapperResult<&'a Vec<Bson>> {
    operand
        .as_array()
        .ok_or_else(|| MapperError::InvalidDocument(format!("{op} expects an array")))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Orders two documents by a `{ field: 1 | -1 }` sort specification.
pub(crate) fn sort_order(left: &Document, right: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let descending = matches!(Comparable::from(direction), Comparable::Number(n) if n < 0.0);

        let a = lookup(left, path).map(Comparable::from).unwrap_or(Comparable::Null);
        let b = lookup(right, path).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match (&a, &b) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Null, _) => Ordering::Less,
            (_, Comparable::Null) => Ordering::Greater,
            _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        };

        let ordering = if descending { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies an operator update to `document` in place.
///
/// # Errors
///
/// Returns [`MapperError::InvalidDocument`] when `update` is empty, holds a
/// plain field instead of an operator, uses an unsupported operator, or
/// `$inc` targets a non-numeric value.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> MapperResult<()> {
    if update.is_empty() {
        return Err(MapperError::InvalidDocument("update document is empty".to_string()));
    }

    for (op, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| MapperError::InvalidDocument(format!("{op} expects a document")))?;

        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for (path, _) in fields {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let value = increment(lookup(document, path), delta)
                        .ok_or_else(|| MapperError::InvalidDocument(format!("cannot increment {path} by {delta}")))?;
                    set_path(document, path, value)?;
                }
            }
            other if other.starts_with('$') => {
                return Err(MapperError::InvalidDocument(format!("unsupported update operator {other}")));
            }
            other => {
                return Err(MapperError::InvalidDocument(format!(
                    "update documents may only contain operators, found {other}"
                )));
            }
        }
    }

    Ok(())
}

/// Builds the base document of an upsert from the equality clauses of `filter`.
pub(crate) fn upsert_base(filter: &Document) -> MapperResult<Document> {
    let mut document = Document::new();

    for (path, condition) in filter {
        if path.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(ops) if is_operator_document(condition) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(&mut document, path, value.clone())?;
                }
            }
            value => set_path(&mut document, path, value.clone())?,
        }
    }

    Ok(document)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> MapperResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let inner = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match inner {
                Bson::Document(inner) => set_path(inner, rest, value),
                other => Err(MapperError::InvalidDocument(format!(
                    "cannot create field {rest} inside non-document {head}: {other}"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn increment(current: Option<&Bson>, delta: &Bson) -> Option<Bson> {
    Some(match (current.unwrap_or(&Bson::Int32(0)), delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64((*a as i64).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(*b as i64)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn hotel() -> Document {
        doc! {
            "name": "Grand",
            "stars": 4,
            "rating": 8.5,
            "tags": ["pool", "spa"],
            "address": { "city": "Lisbon", "zip": "1000" },
        }
    }

    fn matches(filter: Document) -> bool {
        DocumentEvaluator::new(&hotel()).matches(&filter).unwrap()
    }

    #[test]
    fn equality() {
        assert!(matches(doc! {}));
        assert!(matches(doc! { "name": "Grand" }));
        assert!(matches(doc! { "stars": 4.0 }));
        assert!(matches(doc! { "address.city": "Lisbon" }));
        assert!(matches(doc! { "tags": "spa" }));
        assert!(matches(doc! { "tags": ["pool", "spa"] }));
        assert!(matches(doc! { "missing": Bson::Null }));
        assert!(!matches(doc! { "name": "Grand", "stars": 5 }));
        assert!(!matches(doc! { "address": { "city": "Lisbon" } }));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(doc! { "stars": { "$gt": 3, "$lte": 4 } }));
        assert!(matches(doc! { "rating": { "$gte": 8.5 } }));
        assert!(matches(doc! { "name": { "$lt": "Hilton" } }));
        assert!(!matches(doc! { "stars": { "$lt": 4 } }));
        assert!(!matches(doc! { "name": { "$gt": 1 } }));
        assert!(matches(doc! { "name": { "$ne": "Ritz" } }));
        assert!(matches(doc! { "tags": { "$ne": "gym" } }));
    }

    #[test]
    fn membership_and_existence() {
        assert!(matches(doc! { "stars": { "$in": [3, 4] } }));
        assert!(matches(doc! { "tags": { "$in": ["gym", "spa"] } }));
        assert!(matches(doc! { "stars": { "$nin": [1, 2] } }));
        assert!(matches(doc! { "rating": { "$exists": true } }));
        assert!(matches(doc! { "owner": { "$exists": false } }));
        assert!(!matches(doc! { "owner": { "$exists": 1 } }));
    }

    #[test]
    fn logical_operators() {
        assert!(matches(doc! { "$or": [{ "stars": 5 }, { "name": "Grand" }] }));
        assert!(!matches(doc! { "$and": [{ "stars": 4 }, { "name": "Ritz" }] }));
        assert!(matches(doc! { "$nor": [{ "stars": 5 }] }));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let document = hotel();
        let evaluator = DocumentEvaluator::new(&document);

        assert!(matches!(
            evaluator.matches(&doc! { "stars": { "$near": 1 } }),
            Err(MapperError::InvalidDocument(_))
        ));
        assert!(matches!(
            evaluator.matches(&doc! { "$where": "true" }),
            Err(MapperError::InvalidDocument(_))
        ));
        assert!(matches!(
            evaluator.matches(&doc! { "stars": { "$in": 4 } }),
            Err(MapperError::InvalidDocument(_))
        ));
    }

    #[test]
    fn update_operators() {
        let mut document = hotel();

        apply_update(
            &mut document,
            &doc! {
                "$set": { "name": "Grand Palace", "address.zip": "1100", "owner.name": "Ada" },
                "$unset": { "tags": "" },
                "$inc": { "stars": 1, "rating": 0.5, "visits": 2 },
            },
        )
        .unwrap();

        assert_eq!(
            document,
            doc! {
                "name": "Grand Palace",
                "stars": 5,
                "rating": 9.0,
                "address": { "city": "Lisbon", "zip": "1100" },
                "owner": { "name": "Ada" },
                "visits": 2,
            }
        );
    }

    #[test]
    fn increment_widens_on_overflow() {
        let mut document = doc! { "n": i32::MAX };
        apply_update(&mut document, &doc! { "$inc": { "n": 1 } }).unwrap();

        assert_eq!(document, doc! { "n": (i32::MAX as i64 + 1) });
    }

    #[test]
    fn invalid_updates_are_rejected() {
        let mut document = hotel();

        for update in [
            doc! {},
            doc! { "name": "Ritz" },
            doc! { "$rename": { "name": "title" } },
            doc! { "$inc": { "name": 1 } },
            doc! { "$set": { "name.first": "x" } },
        ] {
            assert!(
                matches!(apply_update(&mut document, &update), Err(MapperError::InvalidDocument(_))),
                "{update} should be rejected"
            );
        }
    }

    #[test]
    fn upsert_base_takes_equality_clauses() {
        let base = upsert_base(&doc! {
            "name": "Grand",
            "address.city": "Porto",
            "stars": { "$gt": 3 },
            "code": { "$eq": "G1" },
            "$or": [{ "a": 1 }],
        })
        .unwrap();

        assert_eq!(base, doc! { "name": "Grand", "address": { "city": "Porto" }, "code": "G1" });
    }

    #[test]
    fn sort_by_multiple_keys() {
        let mut documents = vec![
            doc! { "stars": 3, "name": "b" },
            doc! { "stars": 5, "name": "a" },
            doc! { "name": "c" },
            doc! { "stars": 3, "name": "a" },
        ];

        documents.sort_by(|a, b| sort_order(a, b, &doc! { "stars": -1, "name": 1 }));

        let names = documents
            .iter()
            .map(|d| d.get_str("name").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "a", "b", "c"]);
        assert_eq!(documents[0].get_i32("stars").unwrap(), 5);
    }
}
