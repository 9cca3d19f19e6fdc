//! Filter evaluation for in-memory documents.
//!
//! This module evaluates MongoDB-style filter documents against BSON documents: logical
//! operators (`$and`, `$or`, `$nor`, `$expr`), the comparison and membership operators,
//! `$exists`, `$regex`, `$size` and `$not`. Paths may be dotted and traverse arrays of
//! embedded documents.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, DateTime, Document, oid::ObjectId};
use regex::RegexBuilder;

use docbase_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::expression::{self, Variables};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64`. Values of different types order by the BSON
/// comparison order: null, numbers, strings, documents, arrays, object ids, booleans, dates.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null or missing value
    Null,
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// String value
    String(&'a str),
    /// Embedded document
    Map(&'a Document),
    /// Array of values
    Array(&'a [Bson]),
    /// ObjectId value
    ObjectId(ObjectId),
    /// Boolean value
    Bool(bool),
    /// DateTime value
    DateTime(DateTime),
    /// Any other BSON type
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(values) => Comparable::Array(values),
            Bson::Document(document) => Comparable::Map(document),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> From<Option<&'a Bson>> for Comparable<'a> {
    fn from(bson: Option<&'a Bson>) -> Self {
        bson.map(Comparable::from).unwrap_or(Comparable::Null)
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(_) => 10,
        }
    }

    /// Returns `true` when both values belong to the same comparison bracket.
    pub fn same_type(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => self.cmp(other) == Ordering::Equal,
        }
    }
}

impl Eq for Comparable<'_> {}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ordering = ka
                        .cmp(kb)
                        .then_with(|| Comparable::from(va).cmp(&Comparable::from(vb)));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::Array(a), Comparable::Array(b)) => {
                for (va, vb) in a.iter().zip(b.iter()) {
                    let ordering = Comparable::from(va).cmp(&Comparable::from(vb));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Other(_), Comparable::Other(_)) => Ordering::Equal,
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Compares two optional values with missing values ordered as null.
pub(crate) fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    Comparable::from(a).cmp(&Comparable::from(b))
}

/// Returns `true` when two values are equal, treating all numeric types alike.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

/// Resolves a dotted path. Traversing an array collects the path's value from every
/// embedded document, so `items.sku` on `{items: [{sku: 1}, {sku: 2}]}` yields `[1, 2]`.
pub(crate) fn lookup_path(document: &Document, path: &str) -> Option<Bson> {
    let mut segments = path.splitn(2, '.');
    let head = segments.next()?;
    let value = document.get(head)?;

    match segments.next() {
        None => Some(value.clone()),
        Some(rest) => lookup_in_value(value, rest),
    }
}

fn lookup_in_value(value: &Bson, path: &str) -> Option<Bson> {
    match value {
        Bson::Document(document) => lookup_path(document, path),
        Bson::Array(values) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };

            if let Ok(index) = head.parse::<usize>() {
                let element = values.get(index)?;
                return match rest {
                    Some(rest) => lookup_in_value(element, rest),
                    None => Some(element.clone()),
                };
            }

            let collected = values
                .iter()
                .filter_map(|element| match element {
                    Bson::Document(document) => lookup_path(document, path),
                    _ => None,
                })
                .collect::<Vec<_>>();

            if collected.is_empty() {
                None
            } else {
                Some(Bson::Array(collected))
            }
        }
        _ => None,
    }
}

/// Sets a dotted path, creating intermediate documents as needed.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                if document.get(head).is_some_and(|existing| !matches!(existing, Bson::Null)) {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "cannot create field `{rest}` inside non-document field `{head}`"
                    )));
                }
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Ok(()),
            }
        }
    }
}

/// Removes a dotted path and returns the removed value.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

/// Returns `true` when `document` satisfies `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> DocumentStoreResult<bool> {
    DocumentEvaluator::new(document, &HashMap::new()).evaluate(filter)
}

/// Evaluates filters against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
    variables: &'a Variables,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document, variables: &'a Variables) -> Self {
        Self { document, variables }
    }

    pub fn evaluate(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            if !self.evaluate_entry(key, condition)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn evaluate_entry(&self, key: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        match key {
            "$and" => {
                for clause in clauses(key, condition)? {
                    if !self.evaluate(clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "$or" => {
                for clause in clauses(key, condition)? {
                    if self.evaluate(clause)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            "$nor" => {
                for clause in clauses(key, condition)? {
                    if self.evaluate(clause)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "$expr" => Ok(expression::is_truthy(
                expression::evaluate(condition, self.document, self.variables)?.as_ref(),
            )),
            op if op.starts_with('$') => Err(DocumentStoreError::UnsupportedOperation(format!(
                "query operator {op}"
            ))),
            field => {
                let value = lookup_path(self.document, field);

                match condition {
                    Bson::Document(operators) if is_operator_document(operators) => {
                        field_matches(value.as_ref(), operators)
                    }
                    Bson::RegularExpression(regex) => {
                        regex_matches(value.as_ref(), regex.pattern.as_str(), regex.options.as_str())
                    }
                    expected => Ok(equals(value.as_ref(), expected)),
                }
            }
        }
    }
}

fn clauses<'a>(key: &str, condition: &'a Bson) -> DocumentStoreResult<Vec<&'a Document>> {
    match condition {
        Bson::Array(values) => values
            .iter()
            .map(|value| match value {
                Bson::Document(document) => Ok(document),
                other => Err(DocumentStoreError::InvalidDocument(format!(
                    "{key} entries must be documents, got {other}"
                ))),
            })
            .collect(),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "{key} must be an array, got {other}"
        ))),
    }
}

pub(crate) fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// Equality as a query sees it: a missing field equals null, and an array field matches
/// when the array itself or any element equals the expected value.
pub(crate) fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(values)) => {
            values_equal(&Bson::Array(values.clone()), expected)
                || values.iter().any(|element| values_equal(element, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn ordered(value: Option<&Bson>, bound: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let bound = Comparable::from(bound);
    let check = |candidate: &Bson| {
        let candidate = Comparable::from(candidate);
        candidate.same_type(&bound) && accept(candidate.cmp(&bound))
    };

    match value {
        None => false,
        Some(Bson::Array(values)) => values.iter().any(check),
        Some(value) => check(value),
    }
}

fn field_matches(value: Option<&Bson>, operators: &Document) -> DocumentStoreResult<bool> {
    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => ordered(value, operand, Ordering::is_gt),
            "$gte" => ordered(value, operand, Ordering::is_ge),
            "$lt" => ordered(value, operand, Ordering::is_lt),
            "$lte" => ordered(value, operand, Ordering::is_le),
            "$in" => membership(value, operand, op)?,
            "$nin" => !membership(value, operand, op)?,
            "$exists" => value.is_some() == expression::is_truthy(Some(operand)),
            "$size" => match (value, operand.as_i64().or_else(|| operand.as_i32().map(i64::from))) {
                (Some(Bson::Array(values)), Some(size)) => values.len() as i64 == size,
                _ => false,
            },
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or_default();
                match operand {
                    Bson::String(pattern) => regex_matches(value, pattern, options)?,
                    Bson::RegularExpression(regex) => {
                        regex_matches(value, regex.pattern.as_str(), regex.options.as_str())?
                    }
                    other => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "$regex must be a string, got {other}"
                        )));
                    }
                }
            }
            "$options" => true,
            "$not" => match operand {
                Bson::Document(inner) => !field_matches(value, inner)?,
                Bson::RegularExpression(regex) => {
                    !regex_matches(value, regex.pattern.as_str(), regex.options.as_str())?
                }
                other => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "$not must be a document or regex, got {other}"
                    )));
                }
            },
            other => {
                return Err(DocumentStoreError::UnsupportedOperation(format!(
                    "query operator {other}"
                )));
            }
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn membership(value: Option<&Bson>, operand: &Bson, op: &str) -> DocumentStoreResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|candidate| equals(value, candidate))),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "{op} needs an array, got {other}"
        ))),
    }
}

fn regex_matches(value: Option<&Bson>, pattern: &str, options: &str) -> DocumentStoreResult<bool> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|err| DocumentStoreError::InvalidDocument(format!("invalid $regex: {err}")))?;

    Ok(match value {
        Some(Bson::String(text)) => regex.is_match(text),
        Some(Bson::Array(values)) => values
            .iter()
            .any(|element| matches!(element, Bson::String(text) if regex.is_match(text))),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn product() -> Document {
        doc! {
            "name": "Green Tea",
            "price": 12,
            "stock": 3.5,
            "tags": ["drink", "hot"],
            "store": { "name": "Corner", "city": "Bandung" },
            "variants": [{ "sku": "a" }, { "sku": "b" }],
            "archivedAt": Bson::Null,
        }
    }

    #[test]
    fn test_lookup_path_traverses_documents_and_arrays() {
        let document = product();

        assert_eq!(lookup_path(&document, "store.city"), Some(Bson::String("Bandung".into())));
        assert_eq!(
            lookup_path(&document, "variants.sku"),
            Some(Bson::Array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(lookup_path(&document, "variants.1.sku"), Some(Bson::String("b".into())));
        assert_eq!(lookup_path(&document, "store.zip"), None);
    }

    #[test]
    fn test_sentinel_fragments() {
        let document = product();

        assert!(matches(&document, &doc! { "missing": { "$nin": [] } }).unwrap());
        assert!(matches(&document, &doc! { "price": { "$nin": [] } }).unwrap());
        assert!(!matches(&document, &doc! { "price": { "$in": [] } }).unwrap());
    }

    #[test]
    fn test_comparisons_normalize_numbers() {
        let document = product();

        assert!(matches(&document, &doc! { "price": { "$gte": 12_i64, "$lte": 20.0 } }).unwrap());
        assert!(!matches(&document, &doc! { "price": { "$gt": 12 } }).unwrap());
        assert!(matches(&document, &doc! { "stock": { "$lt": 4 } }).unwrap());
        // Different types never compare.
        assert!(!matches(&document, &doc! { "name": { "$gt": 1 } }).unwrap());
    }

    #[test]
    fn test_array_fields_match_elements() {
        let document = product();

        assert!(matches(&document, &doc! { "tags": "hot" }).unwrap());
        assert!(matches(&document, &doc! { "tags": { "$in": ["cold", "drink"] } }).unwrap());
        assert!(matches(&document, &doc! { "variants.sku": "b" }).unwrap());
        assert!(!matches(&document, &doc! { "tags": { "$nin": ["hot"] } }).unwrap());
    }

    #[test]
    fn test_null_and_exists() {
        let document = product();

        assert!(matches(&document, &doc! { "archivedAt": Bson::Null }).unwrap());
        assert!(matches(&document, &doc! { "missing": Bson::Null }).unwrap());
        assert!(!matches(&document, &doc! { "archivedAt": { "$ne": Bson::Null } }).unwrap());
        assert!(matches(&document, &doc! { "archivedAt": { "$exists": true } }).unwrap());
        assert!(matches(&document, &doc! { "missing": { "$exists": false } }).unwrap());
    }

    #[test]
    fn test_regex_with_options() {
        let document = product();

        assert!(matches(&document, &doc! { "name": { "$regex": "green", "$options": "i" } }).unwrap());
        assert!(!matches(&document, &doc! { "name": { "$regex": "green" } }).unwrap());
        assert!(matches(&document, &doc! { "name": { "$not": { "$regex": "^Black" } } }).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let document = product();

        assert!(matches(&document, &doc! { "$or": [{ "price": 1 }, { "store.name": "Corner" }] }).unwrap());
        assert!(!matches(&document, &doc! { "$and": [{ "price": 12 }, { "tags": "cold" }] }).unwrap());
        assert!(matches(&document, &doc! { "$nor": [{ "price": 1 }] }).unwrap());
        assert!(matches(&document, &doc! { "$expr": { "$eq": [true, true] } }).unwrap());
        assert!(!matches(&document, &doc! { "$expr": { "$eq": [false, true] } }).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_unsupported() {
        let err = matches(&product(), &doc! { "tags": { "$elemMatch": { "$eq": "hot" } } }).unwrap_err();

        assert!(matches!(err, DocumentStoreError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_set_and_remove_paths() {
        let mut document = doc! { "name": "Tea" };

        set_path(&mut document, "store.city", Bson::String("Bandung".into())).unwrap();
        assert_eq!(document, doc! { "name": "Tea", "store": { "city": "Bandung" } });

        assert_eq!(remove_path(&mut document, "store.city"), Some(Bson::String("Bandung".into())));
        assert!(set_path(&mut document, "name.first", Bson::Int32(1)).is_err());
    }

    #[test]
    fn test_cross_type_ordering() {
        let null = Bson::Null;
        let number = Bson::Int32(5);
        let text = Bson::String("a".into());

        assert_eq!(compare(None, Some(&number)), Ordering::Less);
        assert_eq!(compare(Some(&null), None), Ordering::Equal);
        assert_eq!(compare(Some(&text), Some(&number)), Ordering::Greater);
    }
}
