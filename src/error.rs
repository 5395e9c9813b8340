//! Shared error conventions.
//!
//! DESIGN
//! ======
//! Every module defines its own `thiserror` enum; this trait adds a grepable
//! code and a retryable flag so handlers and log lines stay uniform without
//! a single god-enum.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
