//! StockMeta
//!
//! Bulk metadata generation for stock-photo marketplaces. Images are queued,
//! analyzed by a Gemini vision model under a fixed concurrency ceiling, and
//! exported as an Adobe Stock import CSV.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
