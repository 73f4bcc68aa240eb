//! The transport abstraction behind a [`Session`](crate::session::Session).
//!
//! A provider performs lookups, browses and publications on behalf of the session and reports
//! their outcome as [`ProviderEvent`]s, which the session hands out on the caller's thread. Each
//! operation is identified by a [`LookupId`] chosen by the session.

use std::collections::BTreeMap;

use netnames_proto::error::{BrowserError, PublisherError, ResolverError};
use netnames_proto::{NameRecord, RecordType, ServiceInstance};

/// Identifies one operation started on a provider.
pub type LookupId = u64;

/// What a provider is able to do.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// One-shot lookups.
    pub single: bool,
    /// Lookups that stay open and report additions and removals.
    pub long_lived: bool,
    /// DNS-SD browsing.
    pub browse: bool,
    /// DNS-SD publishing.
    pub publish: bool,
}

/// A name lookup as handed to a provider. `name` is absolute. Outside of `local.` it is also
/// ASCII (IDNA); `local.` names keep their UTF-8 labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub rtype: RecordType,
    pub long_lived: bool,
}

/// A service to announce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    pub instance: String,
    pub service_type: String,
    pub port: u16,
    pub attributes: BTreeMap<String, Vec<u8>>,
}

/// The outcome of provider operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    ResolveResults(LookupId, Vec<NameRecord>),
    ResolveError(LookupId, ResolverError),
    BrowseAvailable(LookupId, ServiceInstance),
    BrowseUnavailable(LookupId, ServiceInstance),
    BrowseError(LookupId, BrowserError),
    Published(LookupId),
    PublishError(LookupId, PublisherError),
}

impl ProviderEvent {
    /// The operation this event belongs to.
    pub fn id(&self) -> LookupId {
        match self {
            ProviderEvent::ResolveResults(id, _)
            | ProviderEvent::ResolveError(id, _)
            | ProviderEvent::BrowseAvailable(id, _)
            | ProviderEvent::BrowseUnavailable(id, _)
            | ProviderEvent::BrowseError(id, _)
            | ProviderEvent::Published(id)
            | ProviderEvent::PublishError(id, _) => *id,
        }
    }
}

/// A DNS transport.
///
/// Only the operations announced in [`Provider::capabilities()`] are ever called; the default
/// implementations of the others do nothing. Calls never block, and a provider must not report the
/// outcome of an operation from inside the call that started it: outcomes are collected through
/// [`Provider::poll_event()`].
///
/// After `*_stop()` has been called for an id, events the provider still emits for it are
/// discarded by the session.
pub trait Provider {
    /// A short name used in logs and diagnostics.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn resolve_start(&mut self, id: LookupId, query: &Query);

    fn resolve_stop(&mut self, id: LookupId);

    fn browse_start(&mut self, _id: LookupId, _service_type: &str, _domain: &str) {}

    fn browse_stop(&mut self, _id: LookupId) {}

    fn publish_start(&mut self, _id: LookupId, _publication: &Publication) {}

    fn publish_update(&mut self, _id: LookupId, _attributes: &BTreeMap<String, Vec<u8>>) {}

    /// Publishes an additional record alongside the service of `id`.
    fn publish_extra(&mut self, _id: LookupId, _record: &NameRecord) {}

    fn publish_stop(&mut self, _id: LookupId) {}

    /// Returns the next outcome, if any is ready.
    fn poll_event(&mut self) -> Option<ProviderEvent>;

    /// Human-readable notes about the transport state, collected by
    /// [`diagnostic_text()`](crate::session::diagnostic_text).
    fn take_diagnostics(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Releases all resources. No events are polled afterwards.
    fn shutdown(&mut self) {}
}
