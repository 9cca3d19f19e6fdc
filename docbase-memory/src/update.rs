//! Update-operator application for in-memory documents.

use bson::{Bson, Document, oid::ObjectId};

use docbase_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::evaluator::{is_operator_document, lookup_path, remove_path, set_path, values_equal};

/// Applies `update` to `document` in place and reports whether anything changed.
///
/// `inserting` enables `$setOnInsert`, which is ignored for existing documents.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
    inserting: bool,
) -> DocumentStoreResult<bool> {
    if update.is_empty() || !update.keys().all(|key| key.starts_with('$')) {
        return Err(DocumentStoreError::InvalidDocument(
            "update documents must only contain update operators".to_string(),
        ));
    }

    let before = document.clone();

    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{op} must be a document, got {fields}"
            )));
        };

        for (path, value) in fields {
            if path == "_id" && op != "$setOnInsert" && lookup_path(document, path).as_ref() != Some(value) {
                return Err(DocumentStoreError::InvalidDocument(
                    "the `_id` field is immutable".to_string(),
                ));
            }

            match op.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" if inserting => set_path(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value, false)?,
                "$addToSet" => push(document, path, value, true)?,
                other => {
                    return Err(DocumentStoreError::UnsupportedOperation(format!(
                        "update operator {other}"
                    )));
                }
            }
        }
    }

    Ok(*document != before)
}

fn increment(document: &mut Document, path: &str, amount: &Bson) -> DocumentStoreResult<()> {
    let current = lookup_path(document, path).unwrap_or(Bson::Int32(0));

    let overflow = || {
        DocumentStoreError::InvalidDocument(format!(
            "$inc of {current} by {amount} overflows at `{path}`"
        ))
    };

    let next = match (&current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => {
            Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Bson::Int32(b)) => {
            Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?)
        }
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Bson::Double(a), b) => Bson::Double(a + as_f64(b)?),
        (a, Bson::Double(b)) => Bson::Double(as_f64(a)? + b),
        (a, b) => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "cannot $inc {a} by {b} at `{path}`"
            )));
        }
    };

    set_path(document, path, next)
}

fn as_f64(value: &Bson) -> DocumentStoreResult<f64> {
    match value {
        Bson::Int32(n) => Ok(f64::from(*n)),
        Bson::Int64(n) => Ok(*n as f64),
        Bson::Double(n) => Ok(*n),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a number, got {other}"
        ))),
    }
}

fn push(document: &mut Document, path: &str, value: &Bson, unique: bool) -> DocumentStoreResult<()> {
    let values = match value {
        Bson::Document(modifier) if modifier.contains_key("$each") => match modifier.get("$each") {
            Some(Bson::Array(each)) => each.clone(),
            _ => {
                return Err(DocumentStoreError::InvalidDocument(
                    "$each must be an array".to_string(),
                ));
            }
        },
        single => vec![single.clone()],
    };

    let mut items = match lookup_path(document, path) {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(items)) => items,
        Some(other) => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "cannot push to non-array field `{path}` ({other})"
            )));
        }
    };

    for value in values {
        if unique && items.iter().any(|item| values_equal(item, &value)) {
            continue;
        }
        items.push(value);
    }

    set_path(document, path, Bson::Array(items))
}

/// Builds the document inserted by an upsert: the filter's equality fields, then the
/// update applied with `$setOnInsert` enabled. The `_id` is placed first.
pub(crate) fn upsert_document(filter: &Document, update: &Document) -> DocumentStoreResult<Document> {
    let mut seed = Document::new();

    for (key, value) in filter {
        if key.starts_with('$') {
            continue;
        }

        match value {
            Bson::Document(operators) if is_operator_document(operators) => {
                if let Some(eq) = operators.get("$eq") {
                    set_path(&mut seed, key, eq.clone())?;
                }
            }
            value => set_path(&mut seed, key, value.clone())?,
        }
    }

    apply_update(&mut seed, update, true)?;

    let id = seed
        .remove("_id")
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut document = Document::new();
    document.insert("_id", id);
    document.extend(seed);

    Ok(document)
}
