//! Macro for implementing Display and FromStr for wire-tag enums
//!
//! Provider tags travel as lowercase strings in URLs and stored rows. This
//! macro keeps the string mapping for both directions in one place.
//!
//! # Example
//!
//! ```rust
//! use kindred_domain::impl_tag_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Channel {
//!     Push,
//!     Poll,
//! }
//!
//! impl_tag_conversions!(Channel {
//!     Push => "push",
//!     Poll => "poll",
//! });
//! ```

/// Implements Display, FromStr and `as_str` for tag enums
///
/// Parsing is case-insensitive; output is always the canonical string.
#[macro_export]
macro_rules! impl_tag_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical wire representation.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
