//! Integration tests for the tabmind coordination layer

mod test_utils;
pub use test_utils::*;

mod config_layers;
mod page_content;
mod suggestion_cache;
