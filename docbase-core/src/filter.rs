//! Filter fragment generators.
//!
//! Every generator turns raw, possibly absent, caller supplied values into a [`Fragment`]:
//! one operator document placed positionally under a field, e.g.
//!
//! ```ignore
//! use bson::doc;
//! use docbase::filter;
//!
//! let query = doc! {
//!     "price": filter::range(&params.price),
//!     "storeId": filter::object_id(&params.store_id),
//!     "name": filter::search(&params.search),
//! };
//! ```
//!
//! Absent values never drop the field from the predicate. They compile to
//! [`Fragment::AlwaysTrue`], an operator every document satisfies, so the surrounding
//! document keeps the shape callers expect.

use bson::{Bson, DateTime, Document, doc, oid::ObjectId};
use chrono::{Duration, TimeZone, Utc};

/// A single filter predicate for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// An operator document such as `{"$gte": 5, "$lte": 10}`.
    Predicate(Document),
    /// Satisfied by every document, including documents missing the field.
    AlwaysTrue,
    /// Satisfied by no document.
    NeverTrue,
}

impl Fragment {
    /// Returns the operator document sent to the database.
    ///
    /// `AlwaysTrue` is `{"$nin": []}` and `NeverTrue` is `{"$in": []}`.
    pub fn into_document(self) -> Document {
        match self {
            Fragment::Predicate(document) => document,
            Fragment::AlwaysTrue => doc! { "$nin": [] },
            Fragment::NeverTrue => doc! { "$in": [] },
        }
    }

    /// Returns `true` for a fragment that places no constraint on the field.
    pub fn is_always_true(&self) -> bool {
        matches!(self, Fragment::AlwaysTrue)
    }
}

impl From<Fragment> for Bson {
    fn from(fragment: Fragment) -> Self {
        Bson::Document(fragment.into_document())
    }
}

impl From<Fragment> for Document {
    fn from(fragment: Fragment) -> Self {
        fragment.into_document()
    }
}

/// Range over a `[lo, hi]` pair. Negative bounds count as not provided.
///
/// - `[lo, hi]` with both bounds `>= 0`: `{"$gte": lo, "$lte": hi}`
/// - `[lo, hi]` with only `hi >= 0`: `{"$lte": hi}`
/// - `[lo]` with `lo >= 0`: `{"$gte": lo}`
/// - anything else: [`Fragment::AlwaysTrue`]
pub fn range(bounds: &[i64]) -> Fragment {
    match *bounds {
        [lo, hi] if lo >= 0 && hi >= 0 => Fragment::Predicate(doc! { "$gte": lo, "$lte": hi }),
        [_, hi] if hi >= 0 => Fragment::Predicate(doc! { "$lte": hi }),
        [lo] if lo >= 0 => Fragment::Predicate(doc! { "$gte": lo }),
        _ => Fragment::AlwaysTrue,
    }
}

/// Range over two independent bounds. Zero counts as not provided; negative values are
/// used as given.
pub fn range_between(lo: i64, hi: i64) -> Fragment {
    match (lo, hi) {
        (0, 0) => Fragment::AlwaysTrue,
        (0, hi) => Fragment::Predicate(doc! { "$lte": hi }),
        (lo, 0) => Fragment::Predicate(doc! { "$gte": lo }),
        (lo, hi) => Fragment::Predicate(doc! { "$gte": lo, "$lte": hi }),
    }
}

/// Exact match, applied only when `apply` is `true`.
pub fn exact(apply: bool, value: impl Into<Bson>) -> Fragment {
    if apply {
        Fragment::Predicate(doc! { "$eq": value.into() })
    } else {
        Fragment::AlwaysTrue
    }
}

/// Exact match on an optional value, applied when the value is present.
///
/// This pairs with the `bool` query transform, where a missing or unparsable value is
/// decoded as `None` rather than `false`.
pub fn exact_opt<T: Into<Bson>>(value: Option<T>) -> Fragment {
    match value {
        Some(value) => exact(true, value),
        None => Fragment::AlwaysTrue,
    }
}

/// Identifier equality from a hex string.
///
/// An empty string yields [`Fragment::AlwaysTrue`]. A string that is not a valid
/// identifier is logged and yields [`Fragment::NeverTrue`] instead of aborting the query.
pub fn object_id(hex: &str) -> Fragment {
    if hex.is_empty() {
        return Fragment::AlwaysTrue;
    }

    match ObjectId::parse_str(hex) {
        Ok(oid) => Fragment::Predicate(doc! { "$eq": oid }),
        Err(err) => {
            tracing::warn!(value = %hex, error = %err, "Invalid ObjectId in filter, matching nothing");
            Fragment::NeverTrue
        }
    }
}

/// Membership in a non-empty set of values. An empty set yields [`Fragment::AlwaysTrue`].
pub fn array<I>(values: I) -> Fragment
where
    I: IntoIterator,
    I::Item: Into<Bson>,
{
    let values = values.into_iter().map(Into::into).collect::<Vec<Bson>>();

    if values.is_empty() {
        Fragment::AlwaysTrue
    } else {
        Fragment::Predicate(doc! { "$in": values })
    }
}

/// Membership for a dynamically shaped value. Only a non-empty BSON array produces a
/// predicate; every other shape yields [`Fragment::AlwaysTrue`].
pub fn array_value(value: &Bson) -> Fragment {
    match value {
        Bson::Array(values) if !values.is_empty() => array(values.iter().cloned()),
        _ => Fragment::AlwaysTrue,
    }
}

/// Case-insensitive substring match. An empty keyword yields [`Fragment::AlwaysTrue`].
///
/// The keyword is used as a regular expression as is.
pub fn search(keyword: &str) -> Fragment {
    if keyword.is_empty() {
        Fragment::AlwaysTrue
    } else {
        Fragment::Predicate(doc! { "$regex": keyword, "$options": "i" })
    }
}

/// Date range from epoch milliseconds.
///
/// - `[start, end]` with both `>= 0`: inclusive `{"$gte": start, "$lte": end}`
/// - `[start]` with `start >= 0`: the 24 hours following `start`, `{"$gte": start, "$lt": start + 24h}`
/// - anything else: [`Fragment::AlwaysTrue`]
///
/// No timezone adjustment is made. Callers pass instants already localized.
pub fn date_range(millis: &[i64]) -> Fragment {
    match *millis {
        [start, end] if start >= 0 && end >= 0 => Fragment::Predicate(doc! {
            "$gte": DateTime::from_millis(start),
            "$lte": DateTime::from_millis(end),
        }),
        [start] if start >= 0 => match Utc.timestamp_millis_opt(start).single() {
            Some(from) => Fragment::Predicate(doc! {
                "$gte": DateTime::from_chrono(from),
                "$lt": DateTime::from_chrono(from + Duration::hours(24)),
            }),
            None => Fragment::AlwaysTrue,
        },
        _ => Fragment::AlwaysTrue,
    }
}
