//! Feed Aggregator - merges articles, videos and posts from many sources
//!
//! This crate fetches RSS/Atom feeds, YouTube channels and subreddits
//! concurrently, then publishes one deduplicated, tagged, newest-first
//! snapshot that callers can filter and page through.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod rate_limiter;
pub mod tagger;
