//! Error types for artifact verification and delivery.
//!
//! Every failure is one of two kinds:
//!
//! - **Domain** errors are business-rule violations: preflight checks that
//!   failed, a build upload the remote side marked `FAILED`, a processing wait
//!   that timed out.
//! - **Infrastructure** errors come from I/O, the network, external tools or
//!   malformed responses.
//!
//! Callers use [`Error::is_domain`] to tell "your artifact is invalid" apart
//! from "the network or remote service failed".

use std::{fmt::Display, path::Path};

/// Boxed underlying cause kept for diagnostics.
pub type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for delivery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Delivery error with an optional underlying cause.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Business-rule violation.
    #[error("{message}")]
    Domain {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// I/O, network, tool or payload failure.
    #[error("{message}")]
    Infrastructure {
        message: String,
        #[source]
        source: Option<Source>,
    },
}

impl Error {
    /// Creates a domain error without an underlying cause.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an infrastructure error without an underlying cause.
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an infrastructure error wrapping `source`.
    pub fn infrastructure_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for business-rule violations.
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain { .. })
    }

    /// Returns true for I/O, network and tooling failures.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Infrastructure { .. })
    }

    /// The human-readable message without the cause chain.
    pub fn message(&self) -> &str {
        match self {
            Self::Domain { message, .. } | Self::Infrastructure { message, .. } => message,
        }
    }
}

macro_rules! infrastructure_from {
    ($($ty:ty => $label:literal),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(e: $ty) -> Self {
                    Self::infrastructure_with(format!(concat!($label, ": {}"), e), e)
                }
            }
        )*
    };
}

infrastructure_from! {
    std::io::Error => "IO error",
    reqwest::Error => "HTTP error",
    serde_json::Error => "JSON error",
    zip::result::ZipError => "Archive error",
    plist::Error => "Property list error",
    tokio::task::JoinError => "Background task failed",
    url::ParseError => "Invalid URL",
}

/// Adds path context to I/O results.
pub trait ErrorExt<T> {
    /// Converts the error into an infrastructure error naming the action and path.
    fn fs_context(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|e| {
            Error::infrastructure_with(format!("Failed {} {}: {}", action, path.display(), e), e)
        })
    }
}

/// Adds a lazily built message to any error result.
pub trait Context<T> {
    /// Prefixes the error message with `f()`, keeping the error kind.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display,
        F: FnOnce() -> C;
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display,
        F: FnOnce() -> C,
    {
        self.map_err(|e| match e.into() {
            Error::Domain { message, source } => Error::Domain {
                message: format!("{}: {}", f(), message),
                source,
            },
            Error::Infrastructure { message, source } => Error::Infrastructure {
                message: format!("{}: {}", f(), message),
                source,
            },
        })
    }
}

/// Returns early with an infrastructure error built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::delivery::Error::infrastructure(format!($($arg)*)))
    };
}
