//! Feedstash - feed and item storage over a key-value store
//!
//! Feeds and their items live as JSON documents in a Redis-compatible store.
//! On top of that sit cross-feed aggregation (listing, categories, stats) and
//! time-windowed trending by view recency. An HTTP API and a background
//! importer for RSS/Atom sources are layered over the `Database` facade.

pub mod aggregate;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod feeds;
pub mod fetcher;
pub mod items;
pub mod keys;
pub mod kv;
pub mod model;
pub mod routes;
pub mod trending;
