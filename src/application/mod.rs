//! Application services: record decoding, paginated fetching, derived views
//! and the cached content accessors.

pub mod content;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod links;
pub mod records;
pub mod store;
pub mod views;
