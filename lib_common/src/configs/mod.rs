//! Configuration handling for the extraction pipeline.

/// Declarative application configuration loaded from a YAML file.
pub mod config_app;
