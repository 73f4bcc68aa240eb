//! Custom error type definitions.
//!
//! Every asynchronous object of `netnames` reports failure through one of the enums below. The
//! event errors are `Copy`, [`NameError`] carries the offending text and is only `Clone`. All of
//! them compare with `==`, so they can be queued as events and matched in tests.

use thiserror::Error;

/// Errors that may arise when converting or (un)escaping domain names.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NameError {
    #[error("Could not convert {0} to its ASCII (IDNA) form.")]
    Idna(String),

    #[error("Dangling escape character at the end of a domain label.")]
    DanglingEscape,

    #[error("Invalid decimal escape in domain label: \\{0}.")]
    InvalidDecimalEscape(String),
}

/// Errors reported by a `NameResolver`.
#[derive(Debug, Error, PartialEq, Eq, Copy, Clone)]
pub enum ResolverError {
    #[error("Generic lookup failure.")]
    Generic,

    #[error("The name does not exist.")]
    NoName,

    #[error("The lookup timed out.")]
    Timeout,

    #[error("No local (multicast) provider is available.")]
    NoLocal,

    #[error("Long-lived lookups are not supported for this name.")]
    NoLongLived,
}

/// Errors reported by a `ServiceBrowser`.
#[derive(Debug, Error, PartialEq, Eq, Copy, Clone)]
pub enum BrowserError {
    #[error("Generic browse failure.")]
    Generic,

    #[error("No local (multicast) provider is available.")]
    NoLocal,

    #[error("No provider can browse wide-area domains.")]
    NoWide,
}

/// Errors reported by a `ServiceResolver`.
#[derive(Debug, Error, PartialEq, Eq, Copy, Clone)]
pub enum ServiceResolverError {
    #[error("The service does not exist.")]
    ServiceNotFound,

    #[error("All candidate hosts have been tried.")]
    NoHostLeft,

    #[error("Generic service lookup failure.")]
    Generic,

    #[error("The service lookup timed out.")]
    Timeout,

    #[error("No local (multicast) provider is available.")]
    NoLocal,
}

impl ServiceResolverError {
    /// Maps the failure of an SRV lookup to the error a service resolver reports for it.
    pub fn from_srv_failure(err: ResolverError) -> Self {
        match err {
            ResolverError::NoName => Self::ServiceNotFound,
            ResolverError::Timeout => Self::Timeout,
            ResolverError::NoLocal => Self::NoLocal,
            ResolverError::Generic | ResolverError::NoLongLived => Self::Generic,
        }
    }
}

/// Errors reported by a `ServiceLocalPublisher`.
#[derive(Debug, Error, PartialEq, Eq, Copy, Clone)]
pub enum PublisherError {
    #[error("Generic publishing failure.")]
    Generic,

    #[error("The service instance name is already taken on the network.")]
    Conflict,

    #[error("No local (multicast) provider is available.")]
    NoLocal,
}

#[cfg(test)]
mod tests {
    use super::{NameError, ResolverError, ServiceResolverError};

    #[test]
    fn name_errors_keep_the_offending_text() {
        let error = NameError::Idna("bad\u{0}name".to_string());
        let copy = error.clone();
        assert_eq!(error, copy);
        assert_eq!(
            copy.to_string(),
            "Could not convert bad\u{0}name to its ASCII (IDNA) form."
        );
        assert_ne!(error, NameError::Idna("other".to_string()));
    }

    #[test]
    fn srv_failures_map_to_service_errors() {
        let error = ResolverError::Timeout;
        let queued = [error, error];
        assert_eq!(
            queued.map(ServiceResolverError::from_srv_failure),
            [ServiceResolverError::Timeout; 2]
        );
        assert_eq!(
            ServiceResolverError::from_srv_failure(ResolverError::NoLongLived),
            ServiceResolverError::Generic
        );
    }
}
