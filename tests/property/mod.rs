//! Property-based tests for cache keys, cache bounds and suggestion parsing

mod cache_bounds;
mod parser;
