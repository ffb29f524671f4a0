//! Library half of `daily_feed_posts`: feed parsing, post materialization
//! and filter navigation. The binary in `main.rs` wires these together.

pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod outputs;
pub mod parse;
pub mod pipeline;
pub mod utils;
