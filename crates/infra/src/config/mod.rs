//! Configuration loading
//!
//! Resolves [`kindred_domain::Config`] from `KINDRED_*` environment variables,
//! falling back to a TOML or JSON file.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
