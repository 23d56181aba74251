//! chainview-store: the persisted relational index.
//!
//! One SQLite file holds the entire index: `block`, `tx`, `input`,
//! `output`, plus the schema `version` stamp. Writes happen inside scoped
//! transactions so a confirmed block is either fully indexed or absent.

pub mod sqlite;

pub use sqlite::{Store, StoreTx};
