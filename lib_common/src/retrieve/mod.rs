//! Network retrieval utilities.

pub mod ky_http;
