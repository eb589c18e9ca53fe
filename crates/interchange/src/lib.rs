//! formwork-interchange: form configuration wire types and deserialization.
//!
//! Provides typed structs for the configuration format a backend (or a
//! hand-authored file) produces: field descriptors, validation rules,
//! visibility conditions, option fetcher bindings, and step grouping.
//! A single `from_interchange()` entry point turns a `serde_json::Value`
//! into a [`FormDocument`].
//!
//! Component kinds and validation kinds are kept as raw tags here; the
//! engine in `formwork-eval` maps them onto its closed dispatch tables.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_interchange, parse_condition, parse_fields, InterchangeError};
pub use types::*;
