//! # statetable
//!
//! In-memory host store: ordered primary-key tables and single-value slots
//! addressed by `(namespace, scope)`, with storage billed to named accounts.
//!
//! ## Architecture
//! - **Database**: shared host state behind one lock
//! - **Table**: ordered keyed view with opaque, never-reused row handles
//! - **Singleton**: at most one value per `(namespace, scope)`
//! - **Billing**: payload bytes + fixed per-row overhead, charged to the
//!   payer of each write and refunded on erase

#![warn(missing_docs)]

mod db;
mod error;
mod singleton;
mod table;

pub use db::{AccountId, Database, ROW_OVERHEAD_BYTES};
pub use error::{Error, Result};
pub use singleton::Singleton;
pub use table::{Row, RowHandle, Table};
