//! ARBAAK — Hong Kong racing odds and discount aggregator
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod parsers;
pub mod feeds;
pub mod engine;
