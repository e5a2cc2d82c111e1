//! Authorization policy.
//!
//! Pure predicates over a configuration snapshot deciding who may
//! administer the bot and who may broadcast where.

mod policy;

pub use policy::{AccessPolicy, AdminDenial, Role};
