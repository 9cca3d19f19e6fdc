//! Procedural macros for the docbase project.
//!
//! - `#[derive(QueryParams)]` generates the transform declarations of a query-target struct
//!   from `#[transform("kind")]` field attributes.
//! - `#[derive(Entity)]` implements the entity contract from an `#[entity(...)]` attribute.
//!
//! Generated code refers to items through the `docbase` facade crate.

#[allow(unused_extern_crates)]
extern crate self as docbase_macros;

use proc_macro::TokenStream;

mod entity;
mod query_params;
mod serde_attr;

/// Derives `docbase::transform::QueryParams`.
///
/// Every field carries `#[transform("kind")]` with one of `string`, `int`, `float32`,
/// `float64`, `bool`, `array`, `objectId` or `objectIdArray`. Wire keys follow the field's
/// `#[serde(rename)]` or the container's `#[serde(rename_all)]`. Fields skipped by serde
/// need no declaration. A `bool` field is an `Option` or carries `#[serde(default)]`, since
/// a missing or unrecognized boolean has no value.
#[proc_macro_derive(QueryParams, attributes(transform))]
pub fn derive_query_params(input: TokenStream) -> TokenStream {
    query_params::derive_query_params(input.into()).into()
}

/// Derives `docbase::document::Entity`.
///
/// `#[entity(collection = "stores")]` names the default collection. Adding `timestamps`
/// opts into `createdAt`/`updatedAt` handling; `timestamps(created = "...", updated = "...")`
/// names the fields explicitly.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive_entity(input.into()).into()
}
