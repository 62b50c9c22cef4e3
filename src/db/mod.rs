//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed entities and patch payloads returned/accepted by repositories.
//! - `repo`: SQL-only functions that map rows into entities, plus the
//!   [`SqliteStore`] destination used by the sync engine.
//!
//! External modules should import from `studyhub::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{NewPage, NewView, PagePatch, StoredPage, StoredTopic, StoredView, TopicPatch};
