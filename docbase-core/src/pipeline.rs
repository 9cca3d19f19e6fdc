//! Fluent construction of aggregation pipelines.
//!
//! [`PipelineBuilder`] is an accumulator passed by value: every stage method takes `self`,
//! appends at most one stage (or a fixed group of stages) and returns the builder.
//! Stage methods receiving an empty document leave the pipeline unchanged.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docbase::{filter, pipeline::{Lookup, PipelineBuilder}};
//!
//! let stages = PipelineBuilder::new()
//!     .match_stage(doc! { "price": filter::range(&query.price) })
//!     .lookup_with(Lookup::new("stores", "store").local("storeId").foreign("_id").unwind(true))
//!     .search(&query.search, &["name", "store.name"])
//!     .pagination(&query.pagination, &[])
//!     .build();
//! ```

use bson::{Bson, Document, doc};

use crate::{
    filter,
    page::{PaginationQuery, SortSpec},
};

/// The sort applied by [`PipelineBuilder::pagination`] when nothing else is requested.
pub const DEFAULT_SORT_FIELD: &str = "name";

/// An ordered list of aggregation stages under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineBuilder {
    stages: Vec<Document>,
}

/// A `$lookup` stage, optionally followed by an `$unwind` of its output field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookup {
    pub from: String,
    pub as_field: String,
    pub local_field: Option<String>,
    pub foreign_field: Option<String>,
    pub let_vars: Option<Document>,
    pub pipeline: Option<Vec<Document>>,
    pub unwind: bool,
    pub preserve_null_and_empty: bool,
}

impl Lookup {
    pub fn new(from: impl Into<String>, as_field: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            as_field: as_field.into(),
            ..Default::default()
        }
    }

    pub fn local(mut self, field: impl Into<String>) -> Self {
        self.local_field = Some(field.into());
        self
    }

    pub fn foreign(mut self, field: impl Into<String>) -> Self {
        self.foreign_field = Some(field.into());
        self
    }

    pub fn let_vars(mut self, vars: Document) -> Self {
        self.let_vars = Some(vars);
        self
    }

    pub fn pipeline(mut self, pipeline: Vec<Document>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Unwinds the joined field. `preserve` keeps documents without a match.
    pub fn unwind(mut self, preserve: bool) -> Self {
        self.unwind = true;
        self.preserve_null_and_empty = preserve;
        self
    }

    fn to_stage(&self) -> Document {
        let mut spec = doc! { "from": self.from.clone(), "as": self.as_field.clone() };

        if let Some(local) = self.local_field.as_deref().filter(|f| !f.is_empty()) {
            spec.insert("localField", local);
        }
        if let Some(foreign) = self.foreign_field.as_deref().filter(|f| !f.is_empty()) {
            spec.insert("foreignField", foreign);
        }
        if let Some(vars) = &self.let_vars {
            spec.insert("let", vars.clone());
        }
        if let Some(pipeline) = &self.pipeline {
            spec.insert("pipeline", pipeline.clone());
        }

        doc! { "$lookup": spec }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, stage: &str, body: impl Into<Bson>) -> Self {
        self.stages.push(doc! { stage: body.into() });
        self
    }

    fn push_non_empty(self, stage: &str, body: Document) -> Self {
        if body.is_empty() { self } else { self.push(stage, body) }
    }

    /// Appends `{"$match": conditions}`.
    pub fn match_stage(self, conditions: Document) -> Self {
        self.push_non_empty("$match", conditions)
    }

    /// Appends `{"$match": conditions}` only when `apply` is `true`.
    pub fn optional_match(self, conditions: Document, apply: bool) -> Self {
        if apply { self.match_stage(conditions) } else { self }
    }

    pub fn group(self, spec: Document) -> Self {
        self.push_non_empty("$group", spec)
    }

    pub fn set(self, fields: Document) -> Self {
        self.push_non_empty("$set", fields)
    }

    pub fn add_fields(self, fields: Document) -> Self {
        self.push_non_empty("$addFields", fields)
    }

    pub fn project(self, projection: Document) -> Self {
        self.push_non_empty("$project", projection)
    }

    pub fn graph_lookup(self, spec: Document) -> Self {
        self.push_non_empty("$graphLookup", spec)
    }

    /// Appends a raw `$lookup` stage.
    pub fn lookup(self, spec: Document) -> Self {
        self.push_non_empty("$lookup", spec)
    }

    /// Appends a `$lookup` built from `lookup`, then `$unwind` on its output when requested.
    pub fn lookup_with(mut self, lookup: Lookup) -> Self {
        self.stages.push(lookup.to_stage());

        if lookup.unwind {
            self = self.unwind(doc! {
                "path": format!("${}", lookup.as_field),
                "preserveNullAndEmptyArrays": lookup.preserve_null_and_empty,
            });
        }

        self
    }

    pub fn unwind(self, spec: Document) -> Self {
        self.push_non_empty("$unwind", spec)
    }

    pub fn limit(self, limit: i64) -> Self {
        self.push("$limit", limit)
    }

    pub fn skip(self, skip: i64) -> Self {
        self.push("$skip", skip)
    }

    pub fn sort(self, sort: Document) -> Self {
        self.push_non_empty("$sort", sort)
    }

    pub fn facet(self, facets: Document) -> Self {
        self.push("$facet", facets)
    }

    pub fn replace_root(self, spec: Document) -> Self {
        self.push("$replaceRoot", spec)
    }

    /// Numbers documents in `sort` order into an `index` field starting at 1.
    pub fn set_window_fields(self, sort: Document) -> Self {
        self.push(
            "$setWindowFields",
            doc! {
                "sortBy": sort,
                "output": { "index": { "$documentNumber": {} } },
            },
        )
    }

    /// Appends `{"$count": field}`.
    pub fn count(self, field: &str) -> Self {
        self.push("$count", field)
    }

    /// Appends already built stages.
    pub fn extend(mut self, stages: impl IntoIterator<Item = Document>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Appends the pagination stages.
    ///
    /// The data branch sorts, skips and limits. The count branch counts every match, and
    /// the total is promoted to a top-level `totalRecords` field. The sort is taken from
    /// `query.sort_by` (order defaulting to ascending), otherwise from `default_sort`,
    /// otherwise `{name: 1}`. An aggregation with no matches produces no document.
    pub fn pagination(mut self, query: &PaginationQuery, default_sort: &[SortSpec]) -> Self {
        let sort_order = if query.sort_order != 0 { query.sort_order } else { 1 };

        let sort = if !query.sort_by.is_empty() {
            doc! { &query.sort_by: sort_order }
        } else if !default_sort.is_empty() {
            default_sort
                .iter()
                .map(|spec| (spec.sort_by.clone(), Bson::Int64(spec.sort_order)))
                .collect()
        } else {
            doc! { DEFAULT_SORT_FIELD: sort_order }
        };

        self.stages.push(doc! {
            "$facet": {
                "data": [
                    { "$sort": sort },
                    { "$skip": query.skip() },
                    { "$limit": query.page_size() },
                ],
                "totalRecords": [
                    { "$count": "total" },
                ],
            }
        });
        self.stages.push(doc! { "$unwind": "$totalRecords" });
        self.stages.push(doc! { "$addFields": { "totalRecords": "$totalRecords.total" } });

        self
    }

    /// Matches documents where any of `fields` contains `keyword`, case-insensitively.
    /// An empty keyword or field list leaves the pipeline unchanged.
    pub fn search(self, keyword: &str, fields: &[&str]) -> Self {
        if keyword.is_empty() || fields.is_empty() {
            return self;
        }

        let cases = fields
            .iter()
            .map(|field| Bson::Document(doc! { *field: filter::search(keyword) }))
            .collect::<Vec<_>>();

        self.match_stage(doc! { "$or": cases })
    }

    /// Returns the stages built so far.
    pub fn build(self) -> Vec<Document> {
        self.stages
    }
}

fn field_path(key: &str) -> String {
    if key.starts_with('$') {
        key.to_string()
    } else {
        format!("${key}")
    }
}

fn option_stages(field: &str, enabled: bool, label_key: &str, value_key: &str) -> PipelineBuilder {
    PipelineBuilder::new()
        .match_stage(doc! {
            field: { "$ne": Bson::Null },
            "$expr": { "$eq": [enabled, true] },
        })
        .group(doc! {
            "_id": { "label": field_path(label_key), "value": field_path(value_key) },
        })
        .sort(doc! { "_id.label": 1 })
}

/// Distinct `{label, value}` pairs of the documents where `field` is set, sorted by label.
///
/// Meant as a `$facet` branch. `enabled` gates the branch at query time: when `false`,
/// the branch matches nothing. Keys are field paths with or without the `$` prefix.
pub fn option_list(field: &str, enabled: bool, label_key: &str, value_key: &str) -> Vec<Document> {
    option_stages(field, enabled, label_key, value_key)
        .replace_root(doc! { "newRoot": "$_id" })
        .build()
}

/// Like [`option_list`] but leaves each pair under `_id`.
#[deprecated(note = "use `option_list`, which returns the pairs at the top level")]
pub fn option_facet(field: &str, enabled: bool, label_key: &str, value_key: &str) -> Vec<Document> {
    option_stages(field, enabled, label_key, value_key).build()
}
