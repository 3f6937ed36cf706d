//! Core engine: odds/discount reconciliation and the fetch cycle.

pub mod names;
pub mod reconciler;
pub mod cache;
pub mod legacy;
pub mod aggregator;
