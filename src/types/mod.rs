//! Domain types: chain content items, decoded payloads and projection rows.

pub mod content;
pub mod models;
