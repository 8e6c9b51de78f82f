//! Error types for the upgrade cycle
//!
//! Provider calls return [`ProviderError`], which carries an explicit
//! [`ProviderErrorKind`] so the cycle can decide what to skip without
//! inspecting messages. Everything that can end a cycle early is folded into
//! [`UpgradeError`].

use thiserror::Error;

/// Classification of a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network failure, timeout or upstream 5xx. The next tick tries again.
    Transient,
    /// Missing or rejected endpoint/credential
    Configuration,
    /// The provider answered with something we could not use
    InvalidResponse,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Transient => write!(f, "transient"),
            ProviderErrorKind::Configuration => write!(f, "configuration"),
            ProviderErrorKind::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

/// Error returned by a [`Provider`](crate::providers::Provider) call
#[derive(Error, Debug, Clone)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Configuration, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidResponse, message)
    }

    /// Map an HTTP status returned by a provider to an error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };
        match status {
            401 | 403 => Self::configuration(message),
            408 | 429 => Self::transient(message),
            500..=599 => Self::transient(message),
            _ => Self::invalid_response(message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::invalid_response(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        // connect, timeout, request and body errors all mean "try again later"
        Self::transient(err.to_string())
    }
}

/// Errors that end a cycle (or a provider's part of it) early
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// The queue datastore failed. Fatal for the current cycle.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An enabled provider cannot be used as configured
    #[error("configuration error for provider '{provider}': {message}")]
    Configuration { provider: String, message: String },
}

/// Severity used when logging an [`UpgradeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl UpgradeError {
    pub fn configuration(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the failure ends the whole multi-provider pass
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Storage(_) | Self::Configuration { .. } => ErrorSeverity::Error,
            Self::Provider(err) if err.kind == ProviderErrorKind::Configuration => {
                ErrorSeverity::Error
            }
            Self::Provider(_) => ErrorSeverity::Warning,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self, provider: &str) {
        match self.severity() {
            ErrorSeverity::Error => {
                tracing::error!(provider = %provider, error = %self, fatal = self.is_fatal(), "Upgrade cycle error");
            }
            ErrorSeverity::Warning => {
                tracing::warn!(provider = %provider, error = %self, fatal = self.is_fatal(), "Upgrade cycle warning");
            }
        }
    }
}

pub type UpgradeResult<T> = Result<T, UpgradeError>;

pub type ProviderResult<T> = Result<T, ProviderError>;
