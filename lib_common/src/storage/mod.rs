//! Local persistence for fetched payloads.

pub mod cache_fs;
