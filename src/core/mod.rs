//! Core types shared by every cachet component.
//!
//! Currently this is the error taxonomy and its user-facing rendering; see
//! [`error`] for the exit-code contract.

pub mod error;

pub use error::{
    CachetError, ErrorContext, NotFoundKind, exit_code, find_cachet_error, is_cancelled,
    user_friendly_error,
};
