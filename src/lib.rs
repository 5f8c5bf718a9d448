//! Track enrichment library - shared modules for all binaries.

pub mod audio;
pub mod catalog;
pub mod chunks;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod manifest;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod resolver;
pub mod retry;
pub mod safety;
pub mod slug;
pub mod spotify;
