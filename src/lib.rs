//! studyhub: a personal study-tracking backend that mirrors a Notion
//! database into SQLite and serves it (plus a small AI study-insight
//! feature) over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod insight;
pub mod model;
pub mod notion;
pub mod server;
pub mod sync;
