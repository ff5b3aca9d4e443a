//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains the domain records shared by the repositories and services, plus
//! the request/response structures used by the API.

pub mod concept;
pub mod job;

// Re-export commonly used types
pub use concept::*;
pub use job::*;

use serde::Serialize;

/// Implements `as_str`, `FromStr` and `Display` for a fieldless enum stored as TEXT.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(crate::error::AppError::Validation(format!(
                    "Unknown {} '{}'",
                    stringify!($ty),
                    s
                )))
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
pub(crate) use text_enum;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}
