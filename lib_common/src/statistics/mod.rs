//! Statistical data sources.

pub mod camcom;
