//! Infrastructure error conversions

mod conversions;

pub use conversions::{is_unique_violation, InfraError};
