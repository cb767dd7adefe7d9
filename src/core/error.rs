//! Error handling for cachet
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`CachetError`]) so callers can branch on the
//!    failure kind (conflict vs. not-found vs. cancelled) and the dispatcher can
//!    map each kind onto a stable process exit code.
//! 2. **User-friendly messages** ([`ErrorContext`]) carrying a one-line message,
//!    the offending identifier, and optional details and suggestions.
//!
//! Library functions return [`anyhow::Result`]. Typed errors are raised with
//! `CachetError::...into()` and recovered with [`anyhow::Error::downcast_ref`],
//! which keeps `.with_context(...)` usable without hiding the underlying kind.
//!
//! # Exit codes
//!
//! | Kind                                   | Code |
//! |----------------------------------------|------|
//! | success                                | 0    |
//! | general / config / io                  | 1    |
//! | validation (invalid usage)             | 2    |
//! | not found (repository or script)       | 3    |
//! | conflict (name or local modifications) | 4    |
//! | git / network / lock timeout           | 5    |
//! | permission denied                      | 6    |
//! | cancelled by the user                  | 130  |

use colored::Colorize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// What kind of thing a [`CachetError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// A cached repository entry
    Repository,
    /// A discovered script
    Script,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => f.write_str("repository"),
            Self::Script => f.write_str("script"),
        }
    }
}

/// The main error type for cachet operations.
///
/// Each variant maps onto one kind of the error taxonomy. Variants carry the
/// offending identifier (repository name, URL, path, config key) so the CLI
/// can print a single actionable line.
#[derive(Error, Debug, Clone)]
pub enum CachetError {
    /// Bad URL, name, or value. Always caller-fixable, never retried.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// The field or input that failed validation (e.g. "url", "name")
        field: String,
        /// Why the value was rejected
        message: String,
    },

    /// A name collision or unstashed local modifications.
    ///
    /// Requires an explicit decision from the caller; never resolved silently.
    #[error("Conflict on '{identifier}': {message}")]
    Conflict {
        /// Repository or script name the conflict is about
        identifier: String,
        /// Description of the conflict
        message: String,
        /// Paths involved in the conflict (modified files for sync conflicts)
        paths: Vec<String>,
    },

    /// A referenced repository or script is absent.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Whether a repository or a script was looked up
        kind: NotFoundKind,
        /// The name that was looked up
        name: String,
        /// Closest known name, if any
        suggestion: Option<String>,
    },

    /// The cache lock could not be acquired in time.
    #[error("Timed out after {waited:?} waiting for cache lock {path}")]
    LockTimeout {
        /// Path of the lock file
        path: String,
        /// How long the caller waited
        waited: Duration,
    },

    /// A git subprocess failed; `stderr` holds the tool's diagnostic text.
    #[error("Git operation failed: {operation}")]
    Git {
        /// The git operation that failed (e.g. "clone", "fetch")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git executable not found in PATH.
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// A filesystem operation failed.
    #[error("Failed to {operation} {path}: {reason}")]
    Io {
        /// The operation that failed (e.g. "create directory")
        operation: String,
        /// Path the operation was applied to
        path: String,
        /// Underlying error text
        reason: String,
    },

    /// A filesystem operation was refused by the OS.
    #[error("Permission denied: cannot {operation} {path}")]
    PermissionDenied {
        /// The operation that was denied
        operation: String,
        /// Path where permission was denied
        path: String,
    },

    /// The resolved configuration is unusable (e.g. cache dir not writable).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// The user aborted an interactive prompt.
    #[error("Cancelled by user")]
    Cancelled,
}

impl CachetError {
    /// Builds a validation error for `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds the right error for a failed filesystem operation on `path`.
    ///
    /// Permission failures become [`CachetError::PermissionDenied`] so they map
    /// onto their own exit code; everything else becomes [`CachetError::Io`].
    pub fn from_io(operation: &str, path: &Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                operation: operation.to_string(),
                path: path.display().to_string(),
            }
        } else {
            Self::Io {
                operation: operation.to_string(),
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Process exit code for this error kind.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation {
                ..
            } => 2,
            Self::NotFound {
                ..
            } => 3,
            Self::Conflict {
                ..
            } => 4,
            Self::Git {
                ..
            }
            | Self::GitNotFound
            | Self::LockTimeout {
                ..
            } => 5,
            Self::PermissionDenied {
                ..
            } => 6,
            Self::Cancelled => 130,
            Self::Io {
                ..
            }
            | Self::Config {
                ..
            } => 1,
        }
    }
}

/// Finds the first [`CachetError`] in an error chain.
#[must_use]
pub fn find_cachet_error(error: &anyhow::Error) -> Option<&CachetError> {
    error.chain().find_map(|cause| cause.downcast_ref::<CachetError>())
}

/// Returns true if the error chain contains a [`CachetError::Cancelled`].
#[must_use]
pub fn is_cancelled(error: &anyhow::Error) -> bool {
    matches!(find_cachet_error(error), Some(CachetError::Cancelled))
}

/// Maps any error onto the exit-code contract exposed to the dispatcher.
///
/// Untyped I/O permission failures are recognised too, so an error raised by
/// a plain `std::fs` call still maps to the permission code.
#[must_use]
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(err) = find_cachet_error(error) {
        return err.exit_code();
    }
    let permission = error.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
    });
    if permission { 6 } else { 1 }
}

/// Error context wrapper that provides user-friendly error information
///
/// When displayed, errors show:
/// 1. **error**: The main error message in red
/// 2. **details**: Additional context in yellow (optional)
/// 3. **suggestion**: Actionable steps in green (optional)
#[derive(Debug)]
pub struct ErrorContext {
    /// One-line error message
    pub message: String,
    /// Exit code the process should terminate with
    pub exit_code: i32,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with a message and exit code.
    #[must_use]
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`].
///
/// `verbose` additionally surfaces the wrapped subprocess diagnostics and the
/// full cause chain.
#[must_use]
pub fn user_friendly_error(error: &anyhow::Error, verbose: bool) -> ErrorContext {
    let code = exit_code(error);

    let Some(typed) = find_cachet_error(error) else {
        let mut ctx = ErrorContext::new(error.to_string(), code);
        if verbose {
            let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
            if !chain.is_empty() {
                ctx = ctx.with_details(chain.join("\n  caused by: "));
            }
        }
        return ctx;
    };

    // Keep the outermost context message; it names what the user asked for.
    let ctx = ErrorContext::new(error.to_string(), code);
    match typed {
        CachetError::Validation {
            field,
            ..
        } => ctx.with_suggestion(format!("Check the {field} and try again")),
        CachetError::Conflict {
            identifier,
            paths,
            ..
        } => {
            let ctx = if paths.is_empty() {
                ctx.with_suggestion(format!(
                    "Choose a different name with --name, or remove '{identifier}' first"
                ))
            } else {
                ctx.with_suggestion("Re-run with --force to stash local changes before updating")
            };
            if paths.is_empty() {
                ctx
            } else {
                ctx.with_details(format!("Modified: {}", paths.join(", ")))
            }
        }
        CachetError::NotFound {
            kind,
            suggestion,
            ..
        } => match suggestion {
            Some(name) => ctx.with_suggestion(format!("Did you mean {kind} '{name}'?")),
            None => ctx.with_suggestion(format!("Run 'cachet list' to see available {kind}s")),
        },
        CachetError::LockTimeout {
            ..
        } => ctx
            .with_details("Another cachet process is modifying the cache")
            .with_suggestion("Wait for it to finish, or raise lock_timeout"),
        CachetError::Git {
            stderr,
            ..
        } => {
            if verbose && !stderr.trim().is_empty() {
                ctx.with_details(stderr.trim().to_string())
            } else {
                ctx.with_suggestion("Re-run with --verbose to see git's output")
            }
        }
        CachetError::GitNotFound => {
            ctx.with_suggestion("Install git from https://git-scm.com/ and make sure it is on PATH")
        }
        CachetError::PermissionDenied {
            ..
        } => ctx.with_suggestion("Check ownership and permissions of the cache directory"),
        CachetError::Io {
            ..
        }
        | CachetError::Config {
            ..
        }
        | CachetError::Cancelled => ctx,
    }
}
