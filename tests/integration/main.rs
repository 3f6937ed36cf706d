//! Integration tests: full fetch cycles against in-memory feeds.

mod mock_feed;
mod pipeline;
