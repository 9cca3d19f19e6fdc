//! Aggregation pipeline execution over in-memory collections.
//!
//! Stages run in order over a materialized `Vec<Document>`. Joins (`$lookup`,
//! `$graphLookup`) read the other collections of the same database. Supported stages:
//! `$match`, `$sort`, `$skip`, `$limit`, `$count`, `$facet`, `$unwind`, `$addFields`/`$set`,
//! `$project`, `$replaceRoot`/`$replaceWith`, `$group`, `$lookup`, `$setWindowFields` with
//! `$documentNumber` and `$graphLookup`. Any other stage fails with
//! [`DocumentStoreError::UnsupportedOperation`].

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document};

use docbase_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::{
    evaluator::{DocumentEvaluator, compare, equals, lookup_path, remove_path, set_path, values_equal},
    expression::{self, Variables},
    store::Collection,
};

/// Executes pipelines against one database's collections.
pub(crate) struct Aggregator<'a> {
    collections: &'a HashMap<String, Collection>,
}

impl<'a> Aggregator<'a> {
    pub fn new(collections: &'a HashMap<String, Collection>) -> Self {
        Self { collections }
    }

    /// Runs `pipeline` over the documents of `collection`.
    pub fn run(&self, collection: &str, pipeline: &[Document]) -> DocumentStoreResult<Vec<Document>> {
        self.run_stages(self.documents_of(collection), pipeline, &Variables::new())
    }

    fn documents_of(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|collection| collection.documents.clone())
            .unwrap_or_default()
    }

    fn run_stages(
        &self,
        mut documents: Vec<Document>,
        pipeline: &[Document],
        variables: &Variables,
    ) -> DocumentStoreResult<Vec<Document>> {
        for stage in pipeline {
            let mut entries = stage.iter();
            let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "a pipeline stage must have exactly one field, got {stage}"
                )));
            };

            documents = self.run_stage(documents, name, spec, variables)?;
        }

        Ok(documents)
    }

    fn run_stage(
        &self,
        documents: Vec<Document>,
        name: &str,
        spec: &Bson,
        variables: &Variables,
    ) -> DocumentStoreResult<Vec<Document>> {
        match name {
            "$match" => {
                let filter = stage_document(name, spec)?;
                let mut matched = Vec::with_capacity(documents.len());
                for document in documents {
                    if DocumentEvaluator::new(&document, variables).evaluate(filter)? {
                        matched.push(document);
                    }
                }
                Ok(matched)
            }
            "$sort" => {
                let mut documents = documents;
                sort_documents(&mut documents, stage_document(name, spec)?)?;
                Ok(documents)
            }
            "$skip" => Ok(documents.into_iter().skip(count_argument(name, spec)?).collect()),
            "$limit" => Ok(documents.into_iter().take(count_argument(name, spec)?).collect()),
            "$count" => {
                let Bson::String(field) = spec else {
                    return Err(DocumentStoreError::InvalidDocument(
                        "$count needs a field name".to_string(),
                    ));
                };
                if documents.is_empty() {
                    return Ok(Vec::new());
                }
                let total = i32::try_from(documents.len())
                    .map(Bson::Int32)
                    .unwrap_or(Bson::Int64(documents.len() as i64));
                Ok(vec![bson::doc! { field.as_str(): total }])
            }
            "$facet" => {
                let mut output = Document::new();
                for (facet, stages) in stage_document(name, spec)? {
                    let stages = stage_list(facet, stages)?;
                    let results = self.run_stages(documents.clone(), &stages, variables)?;
                    output.insert(facet, results.into_iter().map(Bson::Document).collect::<Vec<_>>());
                }
                Ok(vec![output])
            }
            "$unwind" => unwind(documents, spec),
            "$addFields" | "$set" => {
                let fields = stage_document(name, spec)?;
                documents
                    .into_iter()
                    .map(|document| -> DocumentStoreResult<Document> {
                        let mut output = document.clone();
                        for (path, value) in fields {
                            match expression::evaluate(value, &document, variables)? {
                                Some(value) => set_path(&mut output, path, value)?,
                                None => {
                                    remove_path(&mut output, path);
                                }
                            }
                        }
                        Ok(output)
                    })
                    .collect()
            }
            "$project" => {
                let projection = stage_document(name, spec)?;
                documents
                    .iter()
                    .map(|document| project(document, projection, variables))
                    .collect()
            }
            "$replaceRoot" | "$replaceWith" => {
                let root = if name == "$replaceRoot" {
                    stage_document(name, spec)?.get("newRoot").ok_or_else(|| {
                        DocumentStoreError::InvalidDocument("$replaceRoot needs newRoot".to_string())
                    })?
                } else {
                    spec
                };

                documents
                    .iter()
                    .map(|document| -> DocumentStoreResult<Document> {
                        match expression::evaluate(root, document, variables)? {
                            Some(Bson::Document(replacement)) => Ok(replacement),
                            other => Err(DocumentStoreError::InvalidDocument(format!(
                                "{name} must resolve to a document, got {}",
                                other.unwrap_or(Bson::Null)
                            ))),
                        }
                    })
                    .collect()
            }
            "$group" => group(documents, stage_document(name, spec)?, variables),
            "$lookup" => self.lookup(documents, stage_document(name, spec)?, variables),
            "$setWindowFields" => set_window_fields(documents, stage_document(name, spec)?, variables),
            "$graphLookup" => self.graph_lookup(documents, stage_document(name, spec)?, variables),
            other => Err(DocumentStoreError::UnsupportedOperation(format!(
                "aggregation stage {other}"
            ))),
        }
    }

    fn lookup(
        &self,
        documents: Vec<Document>,
        spec: &Document,
        variables: &Variables,
    ) -> DocumentStoreResult<Vec<Document>> {
        let from = required_str(spec, "$lookup", "from")?;
        let as_field = required_str(spec, "$lookup", "as")?;
        let local_field = spec.get_str("localField").ok();
        let foreign_field = spec.get_str("foreignField").ok();
        let pipeline = spec.get("pipeline").map(|stages| stage_list("pipeline", stages)).transpose()?;
        let let_vars = spec.get_document("let").ok();

        let foreign = self.documents_of(from);

        documents
            .into_iter()
            .map(|mut document| -> DocumentStoreResult<Document> {
                let mut joined = match (local_field, foreign_field) {
                    (Some(local), Some(foreign_field)) => {
                        let local_value = lookup_path(&document, local).unwrap_or(Bson::Null);
                        foreign
                            .iter()
                            .filter(|candidate| {
                                let value = lookup_path(candidate, foreign_field);
                                match &local_value {
                                    Bson::Array(values) => {
                                        values.iter().any(|local| equals(value.as_ref(), local))
                                    }
                                    local => equals(value.as_ref(), local),
                                }
                            })
                            .cloned()
                            .collect()
                    }
                    _ => foreign.clone(),
                };

                if let Some(pipeline) = &pipeline {
                    let mut scoped = variables.clone();
                    if let Some(let_vars) = let_vars {
                        for (name, expr) in let_vars {
                            let value = expression::evaluate(expr, &document, variables)?;
                            scoped.insert(name.clone(), value.unwrap_or(Bson::Null));
                        }
                    }
                    joined = self.run_stages(joined, pipeline, &scoped)?;
                }

                set_path(
                    &mut document,
                    as_field,
                    Bson::Array(joined.into_iter().map(Bson::Document).collect()),
                )?;
                Ok(document)
            })
            .collect()
    }

    fn graph_lookup(
        &self,
        documents: Vec<Document>,
        spec: &Document,
        variables: &Variables,
    ) -> DocumentStoreResult<Vec<Document>> {
        let from = required_str(spec, "$graphLookup", "from")?;
        let as_field = required_str(spec, "$graphLookup", "as")?;
        let connect_from = required_str(spec, "$graphLookup", "connectFromField")?;
        let connect_to = required_str(spec, "$graphLookup", "connectToField")?;
        let start_with = spec.get("startWith").ok_or_else(|| {
            DocumentStoreError::InvalidDocument("$graphLookup needs startWith".to_string())
        })?;
        let max_depth = spec.get("maxDepth").map(|depth| count_argument("maxDepth", depth)).transpose()?;
        let depth_field = spec.get_str("depthField").ok();
        let restrict = spec.get_document("restrictSearchWithMatch").ok();

        let mut candidates = Vec::new();
        for candidate in self.documents_of(from) {
            if match restrict {
                Some(filter) => DocumentEvaluator::new(&candidate, variables).evaluate(filter)?,
                None => true,
            } {
                candidates.push(candidate);
            }
        }

        documents
            .into_iter()
            .map(|mut document| -> DocumentStoreResult<Document> {
                let mut frontier = flatten(expression::evaluate(start_with, &document, variables)?);
                let mut visited: Vec<usize> = Vec::new();
                let mut found = Vec::new();
                let mut depth = 0;

                while !frontier.is_empty() && max_depth.is_none_or(|max| depth <= max) {
                    let mut next = Vec::new();

                    for (index, candidate) in candidates.iter().enumerate() {
                        if visited.contains(&index) {
                            continue;
                        }

                        let value = lookup_path(candidate, connect_to);
                        if frontier.iter().any(|wanted| equals(value.as_ref(), wanted)) {
                            visited.push(index);
                            next.extend(flatten(lookup_path(candidate, connect_from)));

                            let mut matched = candidate.clone();
                            if let Some(field) = depth_field {
                                matched.insert(field, Bson::Int64(depth as i64));
                            }
                            found.push(Bson::Document(matched));
                        }
                    }

                    frontier = next;
                    depth += 1;
                }

                set_path(&mut document, as_field, Bson::Array(found))?;
                Ok(document)
            })
            .collect()
    }
}

fn stage_document<'s>(name: &str, spec: &'s Bson) -> DocumentStoreResult<&'s Document> {
    match spec {
        Bson::Document(document) => Ok(document),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "{name} must be a document, got {other}"
        ))),
    }
}

fn stage_list(name: &str, stages: &Bson) -> DocumentStoreResult<Vec<Document>> {
    match stages {
        Bson::Array(stages) => stages
            .iter()
            .map(|stage| stage_document(name, stage).cloned())
            .collect(),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "{name} must be an array of stages, got {other}"
        ))),
    }
}

fn required_str<'s>(spec: &'s Document, stage: &str, field: &str) -> DocumentStoreResult<&'s str> {
    spec.get_str(field)
        .map_err(|_| DocumentStoreError::InvalidDocument(format!("{stage} needs a string `{field}`")))
}

fn count_argument(name: &str, value: &Bson) -> DocumentStoreResult<usize> {
    let count = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        other => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{name} must be a whole number, got {other}"
            )));
        }
    };

    usize::try_from(count)
        .map_err(|_| DocumentStoreError::InvalidDocument(format!("{name} must not be negative")))
}

fn flatten(value: Option<Bson>) -> Vec<Bson> {
    match value {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(values)) => values,
        Some(value) => vec![value],
    }
}

/// Parses a `{field: 1 | -1}` sort specification into `(path, descending)` keys.
pub(crate) fn sort_keys(spec: &Document) -> DocumentStoreResult<Vec<(&str, bool)>> {
    spec.iter()
        .map(|(field, direction)| {
            let descending = match direction {
                Bson::Int32(n) => *n < 0,
                Bson::Int64(n) => *n < 0,
                Bson::Double(n) => *n < 0.0,
                other => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "invalid sort direction {other} for `{field}`"
                    )));
                }
            };
            Ok((field.as_str(), descending))
        })
        .collect()
}

pub(crate) fn compare_documents(a: &Document, b: &Document, keys: &[(&str, bool)]) -> Ordering {
    keys.iter()
        .map(|(field, descending)| {
            let ordering = compare(lookup_path(a, field).as_ref(), lookup_path(b, field).as_ref());
            if *descending { ordering.reverse() } else { ordering }
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Sorts documents in place. The sort is stable.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) -> DocumentStoreResult<()> {
    let keys = sort_keys(spec)?;
    documents.sort_by(|a, b| compare_documents(a, b, &keys));
    Ok(())
}

/// Applies a `$project` (or find projection) document.
///
/// A projection is exclusive when every field other than `_id` is falsy; otherwise listed
/// fields are kept, non-numeric values are computed as expressions and `_id` is kept
/// unless set to a falsy value.
pub(crate) fn project(
    document: &Document,
    projection: &Document,
    variables: &Variables,
) -> DocumentStoreResult<Document> {
    let flag = |value: &Bson| match value {
        Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            Some(expression::is_truthy(Some(value)))
        }
        _ => None,
    };

    let exclusive = projection
        .iter()
        .filter(|(field, _)| field.as_str() != "_id")
        .all(|(_, value)| flag(value) == Some(false));

    if exclusive {
        let mut output = document.clone();
        for (field, _) in projection {
            remove_path(&mut output, field);
        }
        return Ok(output);
    }

    let mut output = Document::new();

    if projection.get("_id").and_then(flag) != Some(false) {
        if let Some(id) = document.get("_id") {
            output.insert("_id", id.clone());
        }
    }

    for (field, value) in projection {
        if field == "_id" && flag(value).is_some() {
            continue;
        }

        let projected = match flag(value) {
            Some(true) => lookup_path(document, field),
            Some(false) => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot exclude `{field}` in an inclusion projection"
                )));
            }
            None => expression::evaluate(value, document, variables)?,
        };

        if let Some(projected) = projected {
            set_path(&mut output, field, projected)?;
        }
    }

    Ok(output)
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> DocumentStoreResult<Vec<Document>> {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(options) => (
            required_str(options, "$unwind", "path")?,
            options.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        other => {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "$unwind must be a path or a document, got {other}"
            )));
        }
    };

    let Some(field) = path.strip_prefix('$') else {
        return Err(DocumentStoreError::InvalidDocument(format!(
            "$unwind path must start with `$`, got `{path}`"
        )));
    };

    let mut output = Vec::with_capacity(documents.len());

    for document in documents {
        match lookup_path(&document, field) {
            Some(Bson::Array(values)) if !values.is_empty() => {
                for value in values {
                    let mut unwound = document.clone();
                    set_path(&mut unwound, field, value)?;
                    output.push(unwound);
                }
            }
            Some(Bson::Array(_)) => {
                if preserve {
                    let mut unwound = document;
                    remove_path(&mut unwound, field);
                    output.push(unwound);
                }
            }
            None | Some(Bson::Null) => {
                if preserve {
                    output.push(document);
                }
            }
            Some(_) => output.push(document),
        }
    }

    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accumulator {
    Sum,
    Avg,
    First,
    Last,
    Push,
    AddToSet,
    Max,
    Min,
}

impl Accumulator {
    fn parse(field: &str, spec: &Bson) -> DocumentStoreResult<(Self, Bson)> {
        let Bson::Document(spec) = spec else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "accumulator for `{field}` must be a document"
            )));
        };

        let mut entries = spec.iter();
        let (Some((op, expr)), None) = (entries.next(), entries.next()) else {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "accumulator for `{field}` must have exactly one operator"
            )));
        };

        let accumulator = match op.as_str() {
            "$sum" => Self::Sum,
            "$avg" => Self::Avg,
            "$first" => Self::First,
            "$last" => Self::Last,
            "$push" => Self::Push,
            "$addToSet" => Self::AddToSet,
            "$max" => Self::Max,
            "$min" => Self::Min,
            other => {
                return Err(DocumentStoreError::UnsupportedOperation(format!(
                    "group accumulator {other}"
                )));
            }
        };

        Ok((accumulator, expr.clone()))
    }

    fn finish(self, values: Vec<Option<Bson>>) -> Bson {
        let present = || values.iter().flatten().filter(|value| !matches!(value, Bson::Null));

        match self {
            Self::Sum => sum(present()),
            Self::Avg => {
                let numbers = present().filter_map(number).collect::<Vec<_>>();
                if numbers.is_empty() {
                    Bson::Null
                } else {
                    Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Self::First => values.first().cloned().flatten().unwrap_or(Bson::Null),
            Self::Last => values.last().cloned().flatten().unwrap_or(Bson::Null),
            Self::Push => Bson::Array(values.iter().flatten().cloned().collect()),
            Self::AddToSet => {
                let mut set: Vec<Bson> = Vec::new();
                for value in values.iter().flatten() {
                    if !set.iter().any(|existing| values_equal(existing, value)) {
                        set.push(value.clone());
                    }
                }
                Bson::Array(set)
            }
            Self::Max => present()
                .max_by(|a, b| compare(Some(*a), Some(*b)))
                .cloned()
                .unwrap_or(Bson::Null),
            Self::Min => present()
                .min_by(|a, b| compare(Some(*a), Some(*b)))
                .cloned()
                .unwrap_or(Bson::Null),
        }
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn sum<'v>(values: impl Iterator<Item = &'v Bson>) -> Bson {
    let mut integer: i64 = 0;
    let mut float: Option<f64> = None;

    for value in values {
        match value {
            Bson::Int32(n) => integer += i64::from(*n),
            Bson::Int64(n) => integer += n,
            Bson::Double(n) => *float.get_or_insert(0.0) += n,
            _ => {}
        }
    }

    match float {
        Some(float) => Bson::Double(float + integer as f64),
        None => i32::try_from(integer).map(Bson::Int32).unwrap_or(Bson::Int64(integer)),
    }
}

struct Group {
    key: Bson,
    values: Vec<Vec<Option<Bson>>>,
}

fn group(documents: Vec<Document>, spec: &Document, variables: &Variables) -> DocumentStoreResult<Vec<Document>> {
    let key_expr = spec.get("_id").ok_or_else(|| {
        DocumentStoreError::InvalidDocument("$group needs an `_id` expression".to_string())
    })?;

    let accumulators = spec
        .iter()
        .filter(|(field, _)| field.as_str() != "_id")
        .map(|(field, value)| -> DocumentStoreResult<(&str, Accumulator, Bson)> {
            let (accumulator, expr) = Accumulator::parse(field, value)?;
            Ok((field.as_str(), accumulator, expr))
        })
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    let mut groups: Vec<Group> = Vec::new();

    for document in &documents {
        let key = expression::evaluate(key_expr, document, variables)?.unwrap_or(Bson::Null);

        let index = match groups.iter().position(|group| values_equal(&group.key, &key)) {
            Some(index) => index,
            None => {
                groups.push(Group { key, values: vec![Vec::new(); accumulators.len()] });
                groups.len() - 1
            }
        };

        for (slot, (_, _, expr)) in accumulators.iter().enumerate() {
            let value = expression::evaluate(expr, document, variables)?;
            groups[index].values[slot].push(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut output = bson::doc! { "_id": group.key };
            for ((field, accumulator, _), values) in accumulators.iter().zip(group.values) {
                output.insert(*field, accumulator.finish(values));
            }
            output
        })
        .collect())
}

fn set_window_fields(
    documents: Vec<Document>,
    spec: &Document,
    variables: &Variables,
) -> DocumentStoreResult<Vec<Document>> {
    let output = spec.get_document("output").map_err(|_| {
        DocumentStoreError::InvalidDocument("$setWindowFields needs an output document".to_string())
    })?;

    let mut fields = Vec::new();
    for (field, window) in output {
        match window {
            Bson::Document(window) if window.contains_key("$documentNumber") => fields.push(field.as_str()),
            other => {
                return Err(DocumentStoreError::UnsupportedOperation(format!(
                    "window function {other}"
                )));
            }
        }
    }

    let mut partitions: Vec<(Bson, Vec<Document>)> = Vec::new();
    for document in documents {
        let key = match spec.get("partitionBy") {
            Some(expr) => expression::evaluate(expr, &document, variables)?.unwrap_or(Bson::Null),
            None => Bson::Null,
        };

        match partitions.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
            Some((_, members)) => members.push(document),
            None => partitions.push((key, vec![document])),
        }
    }

    let mut numbered = Vec::new();
    for (_, mut members) in partitions {
        if let Ok(sort) = spec.get_document("sortBy") {
            sort_documents(&mut members, sort)?;
        }

        for (position, mut document) in members.into_iter().enumerate() {
            for field in &fields {
                set_path(&mut document, field, Bson::Int64(position as i64 + 1))?;
            }
            numbered.push(document);
        }
    }

    Ok(numbered)
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;

    fn database() -> HashMap<String, Collection> {
        let store_a = ObjectId::new();
        let store_b = ObjectId::new();

        let mut collections = HashMap::new();
        collections.insert(
            "stores".to_string(),
            Collection::with_documents(vec![
                doc! { "_id": store_a, "name": "Corner" },
                doc! { "_id": store_b, "name": "Market" },
            ]),
        );
        collections.insert(
            "products".to_string(),
            Collection::with_documents(vec![
                doc! { "_id": 1, "name": "Tea", "price": 4, "storeId": store_a, "tags": ["hot", "drink"] },
                doc! { "_id": 2, "name": "Coffee", "price": 6, "storeId": store_a, "tags": [] },
                doc! { "_id": 3, "name": "Bread", "price": 3, "storeId": store_b },
                doc! { "_id": 4, "name": "Apple", "price": 2, "storeId": Bson::Null },
            ]),
        );
        collections.insert(
            "employees".to_string(),
            Collection::with_documents(vec![
                doc! { "_id": 1, "name": "Ada", "reportsTo": Bson::Null },
                doc! { "_id": 2, "name": "Bo", "reportsTo": 1 },
                doc! { "_id": 3, "name": "Cy", "reportsTo": 2 },
            ]),
        );
        collections
    }

    fn names(documents: &[Document]) -> Vec<&str> {
        documents.iter().filter_map(|d| d.get_str("name").ok()).collect()
    }

    #[test]
    fn test_match_sort_skip_limit() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[
                    doc! { "$match": { "price": { "$gte": 3 } } },
                    doc! { "$sort": { "price": -1 } },
                    doc! { "$skip": 1 },
                    doc! { "$limit": 1_i64 },
                ],
            )
            .unwrap();

        assert_eq!(names(&output), vec!["Tea"]);
    }

    #[test]
    fn test_pagination_facet_shape() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[
                    doc! { "$facet": {
                        "data": [{ "$sort": { "name": 1 } }, { "$skip": 0_i64 }, { "$limit": 2_i64 }],
                        "totalRecords": [{ "$count": "total" }],
                    } },
                    doc! { "$unwind": "$totalRecords" },
                    doc! { "$addFields": { "totalRecords": "$totalRecords.total" } },
                ],
            )
            .unwrap();

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].get_i32("totalRecords").unwrap(), 4);
        assert_eq!(output[0].get_array("data").unwrap().len(), 2);
    }

    #[test]
    fn test_pagination_facet_without_matches_yields_nothing() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[
                    doc! { "$match": { "price": { "$gt": 100 } } },
                    doc! { "$facet": { "data": [], "totalRecords": [{ "$count": "total" }] } },
                    doc! { "$unwind": "$totalRecords" },
                ],
            )
            .unwrap();

        assert!(output.is_empty());
    }

    #[test]
    fn test_lookup_and_unwind_preserving_missing() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[
                    doc! { "$lookup": { "from": "stores", "localField": "storeId", "foreignField": "_id", "as": "store" } },
                    doc! { "$unwind": { "path": "$store", "preserveNullAndEmptyArrays": true } },
                    doc! { "$sort": { "_id": 1 } },
                ],
            )
            .unwrap();

        assert_eq!(output.len(), 4);
        assert_eq!(output[0].get_document("store").unwrap().get_str("name").unwrap(), "Corner");
        assert!(!output[3].contains_key("store"));
    }

    #[test]
    fn test_lookup_with_let_pipeline() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "stores",
                &[
                    doc! { "$lookup": {
                        "from": "products",
                        "let": { "storeId": "$_id" },
                        "pipeline": [
                            { "$match": { "$expr": { "$eq": ["$storeId", "$$storeId"] } } },
                            { "$sort": { "price": 1 } },
                        ],
                        "as": "products",
                    } },
                    doc! { "$project": { "name": 1, "count": { "$size": "$products" } } },
                    doc! { "$sort": { "name": 1 } },
                ],
            )
            .unwrap();

        assert_eq!(output[0].get_str("name").unwrap(), "Corner");
        assert_eq!(output[0].get_i64("count").unwrap(), 2);
        assert!(output[0].contains_key("_id"));
        assert_eq!(output[1].get_i64("count").unwrap(), 1);
    }

    #[test]
    fn test_group_accumulators_keep_first_seen_order() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[doc! { "$group": {
                    "_id": "$storeId",
                    "total": { "$sum": "$price" },
                    "count": { "$sum": 1 },
                    "average": { "$avg": "$price" },
                    "names": { "$push": "$name" },
                    "cheapest": { "$min": "$price" },
                } }],
            )
            .unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0].get_i32("total").unwrap(), 10);
        assert_eq!(output[0].get_i32("count").unwrap(), 2);
        assert_eq!(output[0].get_f64("average").unwrap(), 5.0);
        assert_eq!(output[0].get_i32("cheapest").unwrap(), 4);
        assert_eq!(output[0].get_array("names").unwrap().len(), 2);
        assert_eq!(output[2].get("_id"), Some(&Bson::Null));
    }

    #[test]
    fn test_option_list_shape() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[
                    doc! { "$match": { "storeId": { "$ne": Bson::Null } } },
                    doc! { "$group": { "_id": { "label": "$name", "value": "$_id" } } },
                    doc! { "$sort": { "_id.label": 1 } },
                    doc! { "$replaceRoot": { "newRoot": "$_id" } },
                ],
            )
            .unwrap();

        assert_eq!(
            output,
            vec![
                doc! { "label": "Bread", "value": 3 },
                doc! { "label": "Coffee", "value": 2 },
                doc! { "label": "Tea", "value": 1 },
            ]
        );
    }

    #[test]
    fn test_unwind_drops_empty_arrays_by_default() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run("products", &[doc! { "$unwind": "$tags" }])
            .unwrap();

        // Coffee's empty array and the missing fields drop their documents.
        assert_eq!(names(&output), vec!["Tea", "Tea"]);
    }

    #[test]
    fn test_set_window_fields_numbers_documents() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "products",
                &[doc! { "$setWindowFields": {
                    "sortBy": { "price": 1 },
                    "output": { "index": { "$documentNumber": {} } },
                } }],
            )
            .unwrap();

        assert_eq!(names(&output), vec!["Apple", "Bread", "Tea", "Coffee"]);
        assert_eq!(output[3].get_i64("index").unwrap(), 4);
    }

    #[test]
    fn test_graph_lookup_walks_the_chain() {
        let collections = database();
        let output = Aggregator::new(&collections)
            .run(
                "employees",
                &[
                    doc! { "$match": { "name": "Cy" } },
                    doc! { "$graphLookup": {
                        "from": "employees",
                        "startWith": "$reportsTo",
                        "connectFromField": "reportsTo",
                        "connectToField": "_id",
                        "as": "chain",
                        "depthField": "depth",
                    } },
                ],
            )
            .unwrap();

        let chain = output[0].get_array("chain").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain[1].as_document().and_then(|d| d.get_i64("depth").ok()),
            Some(1)
        );
    }

    #[test]
    fn test_exclusion_projection() {
        let document = doc! { "_id": 1, "name": "Tea", "secret": "x" };

        let projected = project(&document, &doc! { "secret": 0 }, &Variables::new()).unwrap();

        assert_eq!(projected, doc! { "_id": 1, "name": "Tea" });
    }

    #[test]
    fn test_unknown_stage_is_unsupported() {
        let collections = database();
        let err = Aggregator::new(&collections)
            .run("products", &[doc! { "$bucket": {} }])
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::UnsupportedOperation(_)));
    }
}
