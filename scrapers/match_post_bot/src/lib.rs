pub mod blogger;
pub mod cleanup;
pub mod config;
pub mod fetcher;
pub mod formatter;
pub mod iframe_resolver;
pub mod match_parser;
pub mod pipeline;
pub mod publisher;
pub mod retry;
pub mod schedule_time;
pub mod state;
pub mod types;
pub mod utils;
