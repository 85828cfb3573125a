//! Caching for lakecat catalogs
//!
//! [`CachingCatalog`] wraps any [`Catalog`](lakecat_catalog::Catalog) and serves repeated
//! metadata reads from per-kind [`TtlCache`]s; manifest file content is held in a size-bounded
//! [`ManifestCache`].
mod catalog;
mod manifest;
mod options;
mod ttl;

pub use catalog::CachingCatalog;
pub use manifest::ManifestCache;
pub use options::*;
pub use ttl::{PendingLoad, TtlCache, TtlPolicy, Weigher};
