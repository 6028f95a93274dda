//! Core library for the order-recon command line application.
//!
//! A run reads five spreadsheet exports (orders, stock, status, prices and
//! responsible parties) out of one ZIP archive and joins them into a single
//! table with one row per order line. Responsibilities stay narrow: archive
//! and workbook adapters live under [`io`], label and key cleanup in
//! [`normalize`], per-source contracts in [`schema`], key handling in
//! [`dedup`], the joins in [`reconcile`], the workload summary in
//! [`aggregate`], and the end-to-end orchestration in [`pipeline`].

pub mod aggregate;
pub mod dedup;
pub mod error;
pub mod io;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod schema;

pub use error::{Result, ToolError};
