//! Response parsers.
//!
//! Each parser turns one upstream payload into the shared model in
//! `crate::types`. Parsers never perform I/O and never panic on bad input:
//! recoverable problems are logged and dropped, consistency violations are
//! returned as `FeedError`.

pub mod lenient;
pub mod literal;
pub mod meeting;
pub mod odds;
pub mod discount;
pub mod script;
pub mod racecard;
