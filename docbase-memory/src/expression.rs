//! Aggregation expression evaluation.
//!
//! Expressions appear in `$expr`, `$group`, `$addFields`, `$project`, `$replaceRoot` and
//! `$lookup` variables. `"$path"` reads a field of the current document, `"$$name"` reads a
//! variable (`$$ROOT` and `$$CURRENT` are the document itself) and single-key documents
//! whose key starts with `$` are operators. Evaluation returns `None` for missing values.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document};

use docbase_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::evaluator::{compare, lookup_path, values_equal};

pub(crate) type Variables = HashMap<String, Bson>;

/// Truthiness as aggregation sees it: missing, null, `false` and zero are false.
pub(crate) fn is_truthy(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => false,
        Some(Bson::Boolean(b)) => *b,
        Some(Bson::Int32(n)) => *n != 0,
        Some(Bson::Int64(n)) => *n != 0,
        Some(Bson::Double(n)) => *n != 0.0,
        Some(_) => true,
    }
}

/// Evaluates `expression` against `document`.
pub(crate) fn evaluate(
    expression: &Bson,
    document: &Document,
    variables: &Variables,
) -> DocumentStoreResult<Option<Bson>> {
    match expression {
        Bson::String(path) if path.starts_with("$$") => Ok(variable(&path[2..], document, variables)),
        Bson::String(path) if path.starts_with('$') => Ok(lookup_path(document, &path[1..])),
        Bson::Array(items) => items
            .iter()
            .map(|item| -> DocumentStoreResult<Bson> {
                Ok(evaluate(item, document, variables)?.unwrap_or(Bson::Null))
            })
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map(|items| Some(Bson::Array(items))),
        Bson::Document(spec) => match operator(spec) {
            Some((op, args)) => apply_operator(op, args, document, variables),
            None => {
                let mut evaluated = Document::new();
                for (key, value) in spec {
                    if let Some(value) = evaluate(value, document, variables)? {
                        evaluated.insert(key, value);
                    }
                }
                Ok(Some(Bson::Document(evaluated)))
            }
        },
        literal => Ok(Some(literal.clone())),
    }
}

fn variable(reference: &str, document: &Document, variables: &Variables) -> Option<Bson> {
    let (name, path) = match reference.split_once('.') {
        Some((name, path)) => (name, Some(path)),
        None => (reference, None),
    };

    let root = match name {
        "ROOT" | "CURRENT" => Bson::Document(document.clone()),
        name => variables.get(name)?.clone(),
    };

    match (path, root) {
        (None, root) => Some(root),
        (Some(path), Bson::Document(inner)) => lookup_path(&inner, path),
        (Some(path), other) => lookup_path(&bson::doc! { "v": other }, &format!("v.{path}")),
    }
}

fn operator(spec: &Document) -> Option<(&str, &Bson)> {
    if spec.len() != 1 {
        return None;
    }

    spec.iter()
        .next()
        .filter(|(key, _)| key.starts_with('$'))
        .map(|(key, value)| (key.as_str(), value))
}

fn arguments(
    args: &Bson,
    document: &Document,
    variables: &Variables,
) -> DocumentStoreResult<Vec<Option<Bson>>> {
    match args {
        Bson::Array(items) => items
            .iter()
            .map(|item| evaluate(item, document, variables))
            .collect(),
        single => Ok(vec![evaluate(single, document, variables)?]),
    }
}

fn pair(op: &str, values: Vec<Option<Bson>>) -> DocumentStoreResult<(Option<Bson>, Option<Bson>)> {
    let mut values = values.into_iter();
    match (values.next(), values.next(), values.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(DocumentStoreError::InvalidDocument(format!(
            "{op} expects exactly two arguments"
        ))),
    }
}

fn apply_operator(
    op: &str,
    args: &Bson,
    document: &Document,
    variables: &Variables,
) -> DocumentStoreResult<Option<Bson>> {
    if op == "$literal" {
        return Ok(Some(args.clone()));
    }

    let values = arguments(args, document, variables)?;

    let result = match op {
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$cmp" => {
            let (a, b) = pair(op, values)?;
            let ordering = compare(a.as_ref(), b.as_ref());
            match op {
                "$eq" => Bson::Boolean(ordering == Ordering::Equal),
                "$ne" => Bson::Boolean(ordering != Ordering::Equal),
                "$gt" => Bson::Boolean(ordering.is_gt()),
                "$gte" => Bson::Boolean(ordering.is_ge()),
                "$lt" => Bson::Boolean(ordering.is_lt()),
                "$lte" => Bson::Boolean(ordering.is_le()),
                _ => Bson::Int32(ordering as i32),
            }
        }
        "$and" => Bson::Boolean(values.iter().all(|value| is_truthy(value.as_ref()))),
        "$or" => Bson::Boolean(values.iter().any(|value| is_truthy(value.as_ref()))),
        "$not" => Bson::Boolean(!values.first().is_some_and(|value| is_truthy(value.as_ref()))),
        "$in" => match pair(op, values)? {
            (needle, Some(Bson::Array(haystack))) => {
                let needle = needle.unwrap_or(Bson::Null);
                Bson::Boolean(haystack.iter().any(|item| values_equal(item, &needle)))
            }
            _ => {
                return Err(DocumentStoreError::InvalidDocument(
                    "$in needs an array as its second argument".to_string(),
                ));
            }
        },
        "$ifNull" => {
            return Ok(values
                .into_iter()
                .find(|value| !matches!(value, None | Some(Bson::Null)))
                .flatten()
                .or(Some(Bson::Null)));
        }
        "$size" => match values.first() {
            Some(Some(Bson::Array(items))) => Bson::Int64(items.len() as i64),
            _ => {
                return Err(DocumentStoreError::InvalidDocument(
                    "$size needs an array".to_string(),
                ));
            }
        },
        "$concat" => {
            let mut joined = String::new();
            for value in values {
                match value {
                    Some(Bson::String(part)) => joined.push_str(&part),
                    None | Some(Bson::Null) => return Ok(Some(Bson::Null)),
                    Some(other) => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "$concat only supports strings, got {other}"
                        )));
                    }
                }
            }
            Bson::String(joined)
        }
        "$add" => {
            let mut integer: i64 = 0;
            let mut float: Option<f64> = None;
            for value in values {
                match value {
                    Some(Bson::Int32(n)) => integer += i64::from(n),
                    Some(Bson::Int64(n)) => integer += n,
                    Some(Bson::Double(n)) => *float.get_or_insert(0.0) += n,
                    None | Some(Bson::Null) => return Ok(Some(Bson::Null)),
                    Some(other) => {
                        return Err(DocumentStoreError::InvalidDocument(format!(
                            "$add only supports numbers, got {other}"
                        )));
                    }
                }
            }
            match float {
                Some(float) => Bson::Double(float + integer as f64),
                None => Bson::Int64(integer),
            }
        }
        other => {
            return Err(DocumentStoreError::UnsupportedOperation(format!(
                "expression operator {other}"
            )));
        }
    };

    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn eval(expression: Bson, document: &Document) -> Option<Bson> {
        evaluate(&expression, document, &Variables::new()).unwrap()
    }

    #[test]
    fn test_field_paths_and_literals() {
        let document = doc! { "name": "Tea", "store": { "name": "Corner" } };

        assert_eq!(eval(Bson::String("$store.name".into()), &document), Some("Corner".into()));
        assert_eq!(eval(Bson::String("$missing".into()), &document), None);
        assert_eq!(eval(Bson::Int32(3), &document), Some(Bson::Int32(3)));
        assert_eq!(
            eval(Bson::Document(doc! { "$literal": "$name" }), &document),
            Some("$name".into())
        );
    }

    #[test]
    fn test_document_expression_drops_missing_fields() {
        let document = doc! { "name": "Tea", "storeId": 7 };

        let evaluated = eval(
            Bson::Document(doc! { "label": "$name", "value": "$storeId", "extra": "$missing" }),
            &document,
        );

        assert_eq!(evaluated, Some(Bson::Document(doc! { "label": "Tea", "value": 7 })));
    }

    #[test]
    fn test_comparison_operators() {
        let document = doc! { "price": 10, "stock": 0 };

        assert_eq!(eval(Bson::Document(doc! { "$gt": ["$price", 5] }), &document), Some(true.into()));
        assert_eq!(eval(Bson::Document(doc! { "$eq": ["$price", 10.0] }), &document), Some(true.into()));
        assert_eq!(eval(Bson::Document(doc! { "$eq": [false, true] }), &document), Some(false.into()));
        assert_eq!(
            eval(Bson::Document(doc! { "$and": ["$price", "$stock"] }), &document),
            Some(false.into())
        );
    }

    #[test]
    fn test_variables() {
        let document = doc! { "productId": 3 };
        let mut variables = Variables::new();
        variables.insert("id".into(), Bson::Int32(3));

        let matched = evaluate(
            &Bson::Document(doc! { "$eq": ["$productId", "$$id"] }),
            &document,
            &variables,
        )
        .unwrap();

        assert_eq!(matched, Some(true.into()));
        assert_eq!(eval(Bson::String("$$ROOT".into()), &document), Some(Bson::Document(document.clone())));
    }

    #[test]
    fn test_unknown_operator_is_unsupported() {
        let err = evaluate(&Bson::Document(doc! { "$zip": [] }), &doc! {}, &Variables::new()).unwrap_err();

        assert!(matches!(err, DocumentStoreError::UnsupportedOperation(_)));
    }
}
