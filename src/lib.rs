//! Backfills script document URLs into the dialogue store.
//!
//! Script titles carry a management identifier prefix (`B1234 ...`). The
//! production spreadsheets map those identifiers to document URLs; this crate
//! reads the spreadsheet exports, builds an identifier → URL mapping, and
//! writes the URL onto every dialogue row of each matching title.

pub mod cli;
pub mod database_ops;
pub mod logging;
pub mod normalization;

pub mod util {
    pub mod env;
}

pub use database_ops::mapping::{
    build_mapping, build_merged, merge_by_precedence, BuildStats, ColumnLayout, IdentifierUrlMap,
    MergeConflict, MergedMapping, SourceLayout,
};
pub use database_ops::reconcile::{reconcile, ReconcileOptions, Summary};
pub use database_ops::store::{DialogueStore, StoreSchema};
pub use normalization::identifier::{Identifier, IdentifierScheme, SchemePreset};
pub use normalization::url_host::HostAllowList;
