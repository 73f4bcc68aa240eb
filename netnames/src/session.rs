//! The shared name resolution session.
//!
//! Every resolver, browser and publisher talks to the network through a [`Session`]. A session
//! owns up to two providers: a unicast one for wide-area names and a local (multicast) one for
//! names in `local.`. It routes operations to them and queues their outcomes per operation until
//! the owning object polls for them.
//!
//! Objects created without an explicit session share the thread's global session, which is built
//! from the system configuration on first use and torn down by [`cleanup()`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use netnames_proto::error::{BrowserError, PublisherError, ResolverError};
use netnames_proto::name::{idna_from_string, is_local, normalize};
use netnames_proto::{NameRecord, RecordType};
use tracing::{debug, trace};

use crate::config::ResolverConfig;
use crate::provider::{LookupId, Provider, ProviderEvent, Publication, Query};
use crate::unicast::UnicastProvider;

thread_local! {
    static GLOBAL: RefCell<Option<Session>> = RefCell::new(None);
}

/// Tears down the thread's global session, shutting down its providers.
///
/// Objects still holding the old session stop receiving events. The next object created without
/// an explicit session builds a fresh one.
pub fn cleanup() {
    let session = GLOBAL.with(|global| global.borrow_mut().take());
    if let Some(session) = session {
        debug!("Cleaning up the global session.");
        session.shutdown();
    }
}

/// Returns (and clears) the diagnostic notes collected by the global session's providers.
pub fn diagnostic_text() -> String {
    let session = GLOBAL.with(|global| global.borrow().clone());
    session
        .map(|session| session.take_diagnostics())
        .unwrap_or_default()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    Unicast,
    Local,
    // failed before reaching a provider
    Nowhere,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Kind {
    Resolve,
    Browse,
    Publish,
}

struct Operation {
    route: Route,
    kind: Kind,
    queue: VecDeque<ProviderEvent>,
}

struct NameManager {
    unicast: Option<Box<dyn Provider>>,
    local: Option<Box<dyn Provider>>,
    next_id: LookupId,
    operations: HashMap<LookupId, Operation>,
    diagnostics: Vec<String>,
}

impl NameManager {
    fn provider(&mut self, route: Route) -> Option<&mut Box<dyn Provider>> {
        match route {
            Route::Unicast => self.unicast.as_mut(),
            Route::Local => self.local.as_mut(),
            Route::Nowhere => None,
        }
    }

    fn register(&mut self, route: Route, kind: Kind) -> LookupId {
        self.next_id += 1;
        let id = self.next_id;
        self.operations.insert(
            id,
            Operation {
                route,
                kind,
                queue: VecDeque::new(),
            },
        );
        id
    }

    // failures detected before reaching a provider are queued like any other outcome
    fn fail(
        &mut self,
        route: Route,
        kind: Kind,
        event: impl FnOnce(LookupId) -> ProviderEvent,
    ) -> LookupId {
        let id = self.register(route, kind);
        let event = event(id);
        debug!("Operation {} failed right away: {:?}", id, event);
        if let Some(operation) = self.operations.get_mut(&id) {
            operation.queue.push_back(event);
        }
        id
    }

    fn unregister(&mut self, id: LookupId) -> Option<Operation> {
        self.operations.remove(&id)
    }

    fn pump(&mut self) {
        for route in [Route::Unicast, Route::Local] {
            let mut events = Vec::new();
            if let Some(provider) = self.provider(route) {
                while let Some(event) = provider.poll_event() {
                    events.push(event);
                }
            }
            for event in events {
                match self.operations.get_mut(&event.id()) {
                    Some(operation) => operation.queue.push_back(event),
                    None => trace!("Dropping event of finished operation: {:?}", event),
                }
            }
        }
    }
}

/// A handle to a name resolution session. Cloning it yields another handle to the same session.
///
/// # Example
///
/// ```rust,no_run
/// use netnames::config::ResolverConfig;
/// use netnames::session::Session;
/// use netnames::unicast::UnicastProvider;
///
/// let session = Session::builder()
///     .with_unicast(UnicastProvider::new(ResolverConfig::from_system()))
///     .build();
/// Session::set_global(session);
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Rc<RefCell<NameManager>>,
}

/// Assembles a [`Session`] from providers.
#[derive(Default)]
pub struct SessionBuilder {
    unicast: Option<Box<dyn Provider>>,
    local: Option<Box<dyn Provider>>,
}

impl SessionBuilder {
    /// Sets the provider for names outside of `local.`.
    pub fn with_unicast(mut self, provider: impl Provider + 'static) -> Self {
        self.unicast = Some(Box::new(provider));
        self
    }

    /// Sets the provider for names in `local.` and for DNS-SD browsing and publishing there.
    pub fn with_local(mut self, provider: impl Provider + 'static) -> Self {
        self.local = Some(Box::new(provider));
        self
    }

    pub fn build(self) -> Session {
        Session {
            inner: Rc::new(RefCell::new(NameManager {
                unicast: self.unicast,
                local: self.local,
                next_id: 0,
                operations: HashMap::new(),
                diagnostics: Vec::new(),
            })),
        }
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Builds a session from the system configuration: unicast DNS as configured in
    /// `/etc/resolv.conf`, plus multicast DNS if the `mdns` feature is enabled and the daemon can
    /// be started.
    pub fn from_system() -> Session {
        let builder =
            Session::builder().with_unicast(UnicastProvider::new(ResolverConfig::from_system()));

        #[cfg(feature = "mdns")]
        let builder = match crate::mdns::MdnsProvider::new(crate::config::MdnsConfig::default()) {
            Ok(provider) => builder.with_local(provider),
            Err(e) => {
                tracing::warn!("Multicast DNS is unavailable: {}", e);
                builder
            }
        };

        builder.build()
    }

    /// Returns the thread's global session, creating it on first use.
    pub fn global() -> Session {
        GLOBAL.with(|global| {
            global
                .borrow_mut()
                .get_or_insert_with(Session::from_system)
                .clone()
        })
    }

    /// Replaces the thread's global session, returning the previous one.
    pub fn set_global(session: Session) -> Option<Session> {
        GLOBAL.with(|global| global.borrow_mut().replace(session))
    }

    /// Collects pending outcomes from the providers. Polling any object does this implicitly.
    pub fn process(&self) {
        self.inner.borrow_mut().pump();
    }

    /// Shuts down both providers. Operations still running never complete.
    pub fn shutdown(&self) {
        let mut manager = self.inner.borrow_mut();
        for route in [Route::Unicast, Route::Local] {
            if let Some(mut provider) = match route {
                Route::Unicast => manager.unicast.take(),
                _ => manager.local.take(),
            } {
                debug!("Shutting down provider {}.", provider.name());
                provider.shutdown();
            }
        }
        manager.operations.clear();
    }

    /// Returns (and clears) the diagnostic notes collected so far.
    pub fn take_diagnostics(&self) -> String {
        let mut manager = self.inner.borrow_mut();
        let mut notes = std::mem::take(&mut manager.diagnostics);
        for route in [Route::Unicast, Route::Local] {
            if let Some(provider) = manager.provider(route) {
                let name = provider.name().to_string();
                notes.extend(
                    provider
                        .take_diagnostics()
                        .into_iter()
                        .map(|note| format!("{}: {}", name, note)),
                );
            }
        }
        notes.join("\n")
    }

    /// The number of operations whose outcome is still being waited for.
    pub fn pending_operations(&self) -> usize {
        self.inner.borrow().operations.len()
    }

    pub(crate) fn resolve_start(&self, name: &str, rtype: RecordType, long_lived: bool) -> LookupId {
        let mut manager = self.inner.borrow_mut();

        // multicast DNS names are UTF-8 on the wire (RFC 6762, Section 16), only unicast names
        // are converted to their IDNA form
        let route = if is_local(name) {
            Route::Local
        } else {
            Route::Unicast
        };
        let name = match route {
            Route::Local => normalize(name),
            _ => match idna_from_string(name) {
                Ok(name) => normalize(&name),
                Err(e) => {
                    manager.diagnostics.push(e.to_string());
                    return manager.fail(Route::Nowhere, Kind::Resolve, |id| {
                        ProviderEvent::ResolveError(id, ResolverError::Generic)
                    });
                }
            },
        };
        let capabilities = manager.provider(route).map(|p| p.capabilities());
        let error = match capabilities {
            None if route == Route::Local => Some(ResolverError::NoLocal),
            None => Some(ResolverError::Generic),
            Some(caps) if long_lived && !caps.long_lived => Some(ResolverError::NoLongLived),
            Some(caps) if !long_lived && !caps.single => Some(ResolverError::Generic),
            Some(_) => None,
        };
        if let Some(error) = error {
            return manager.fail(route, Kind::Resolve, |id| {
                ProviderEvent::ResolveError(id, error)
            });
        }

        let id = manager.register(route, Kind::Resolve);
        let query = Query {
            name,
            rtype,
            long_lived,
        };
        if let Some(provider) = manager.provider(route) {
            debug!(
                "Lookup {}: {} {} via {}{}",
                id,
                query.name,
                query.rtype,
                provider.name(),
                if long_lived { " (long-lived)" } else { "" }
            );
            provider.resolve_start(id, &query);
        }
        id
    }

    pub(crate) fn browse_start(&self, service_type: &str, domain: &str) -> LookupId {
        let mut manager = self.inner.borrow_mut();
        let domain = normalize(domain);

        let can_browse = |provider: Option<&mut Box<dyn Provider>>| {
            provider.map_or(false, |p| p.capabilities().browse)
        };
        let route = if is_local(&domain) {
            if !can_browse(manager.provider(Route::Local)) {
                return manager.fail(Route::Local, Kind::Browse, |id| {
                    ProviderEvent::BrowseError(id, BrowserError::NoLocal)
                });
            }
            Route::Local
        } else {
            if !can_browse(manager.provider(Route::Unicast)) {
                return manager.fail(Route::Unicast, Kind::Browse, |id| {
                    ProviderEvent::BrowseError(id, BrowserError::NoWide)
                });
            }
            Route::Unicast
        };

        let id = manager.register(route, Kind::Browse);
        if let Some(provider) = manager.provider(route) {
            debug!("Browse {}: {}.{} via {}", id, service_type, domain, provider.name());
            provider.browse_start(id, service_type, &domain);
        }
        id
    }

    pub(crate) fn publish_start(&self, publication: &Publication) -> LookupId {
        let mut manager = self.inner.borrow_mut();
        let can_publish = manager
            .provider(Route::Local)
            .map_or(false, |p| p.capabilities().publish);
        if !can_publish {
            return manager.fail(Route::Local, Kind::Publish, |id| {
                ProviderEvent::PublishError(id, PublisherError::NoLocal)
            });
        }

        let id = manager.register(Route::Local, Kind::Publish);
        if let Some(provider) = manager.provider(Route::Local) {
            debug!(
                "Publish {}: {} {} port {}",
                id, publication.instance, publication.service_type, publication.port
            );
            provider.publish_start(id, publication);
        }
        id
    }

    pub(crate) fn publish_update(&self, id: LookupId, attributes: &BTreeMap<String, Vec<u8>>) {
        let mut manager = self.inner.borrow_mut();
        let route = match manager.operations.get(&id) {
            Some(operation) if operation.kind == Kind::Publish => operation.route,
            _ => return,
        };
        if let Some(provider) = manager.provider(route) {
            provider.publish_update(id, attributes);
        }
    }

    pub(crate) fn publish_extra(&self, id: LookupId, record: &NameRecord) {
        let mut manager = self.inner.borrow_mut();
        let route = match manager.operations.get(&id) {
            Some(operation) if operation.kind == Kind::Publish => operation.route,
            _ => return,
        };
        if let Some(provider) = manager.provider(route) {
            provider.publish_extra(id, record);
        }
    }

    /// Stops an operation of any kind. Its queued and future events are discarded.
    pub(crate) fn stop(&self, id: LookupId) {
        let mut manager = self.inner.borrow_mut();
        let operation = match manager.unregister(id) {
            Some(operation) => operation,
            None => return,
        };
        if let Some(provider) = manager.provider(operation.route) {
            trace!("Stopping operation {} on {}", id, provider.name());
            match operation.kind {
                Kind::Resolve => provider.resolve_stop(id),
                Kind::Browse => provider.browse_stop(id),
                Kind::Publish => provider.publish_stop(id),
            }
        }
    }

    /// Returns the next queued outcome of operation `id`.
    pub(crate) fn next_event(&self, id: LookupId) -> Option<ProviderEvent> {
        let mut manager = self.inner.borrow_mut();
        manager.pump();
        manager
            .operations
            .get_mut(&id)
            .and_then(|operation| operation.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use netnames_proto::error::{BrowserError, PublisherError, ResolverError};
    use netnames_proto::RecordType;

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Session;
    use crate::provider::{Capabilities, LookupId, Provider, ProviderEvent, Publication, Query};

    /// Remembers the queries it is asked and never answers.
    struct Recorder(Rc<RefCell<Vec<Query>>>);

    impl Provider for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                single: true,
                ..Capabilities::default()
            }
        }

        fn resolve_start(&mut self, _id: LookupId, query: &Query) {
            self.0.borrow_mut().push(query.clone());
        }

        fn resolve_stop(&mut self, _id: LookupId) {}

        fn poll_event(&mut self) -> Option<ProviderEvent> {
            None
        }
    }

    #[test]
    fn empty_session_reports_missing_providers() {
        let session = Session::builder().build();

        let id = session.resolve_start("example.com", RecordType::A, false);
        assert_eq!(
            session.next_event(id),
            Some(ProviderEvent::ResolveError(id, ResolverError::Generic))
        );

        let id = session.resolve_start("printer.local", RecordType::A, false);
        assert_eq!(
            session.next_event(id),
            Some(ProviderEvent::ResolveError(id, ResolverError::NoLocal))
        );

        let id = session.browse_start("_ipp._tcp", "local");
        assert_eq!(
            session.next_event(id),
            Some(ProviderEvent::BrowseError(id, BrowserError::NoLocal))
        );

        let id = session.browse_start("_ipp._tcp", "example.com");
        assert_eq!(
            session.next_event(id),
            Some(ProviderEvent::BrowseError(id, BrowserError::NoWide))
        );

        let id = session.publish_start(&Publication {
            instance: "x".into(),
            service_type: "_x._tcp".into(),
            port: 1,
            attributes: Default::default(),
        });
        assert_eq!(
            session.next_event(id),
            Some(ProviderEvent::PublishError(id, PublisherError::NoLocal))
        );
    }

    #[test]
    fn stopped_operation_loses_its_events() {
        let session = Session::builder().build();
        let id = session.resolve_start("example.com", RecordType::A, false);
        assert_eq!(session.pending_operations(), 1);
        session.stop(id);
        assert_eq!(session.pending_operations(), 0);
        assert_eq!(session.next_event(id), None);
    }

    #[test]
    fn local_names_skip_idna_conversion() {
        let local = Rc::new(RefCell::new(Vec::new()));
        let session = Session::builder()
            .with_local(Recorder(Rc::clone(&local)))
            .build();

        session.resolve_start("Büro Drucker._ipp._tcp.local", RecordType::SRV, false);
        assert_eq!(local.borrow()[0].name, "Büro Drucker._ipp._tcp.local.");
    }

    #[test]
    fn unconvertible_name_fails_generically() {
        let session = Session::builder().build();
        let id = session.resolve_start("xn--a\u{fffd}.example", RecordType::A, false);
        assert_eq!(
            session.next_event(id),
            Some(ProviderEvent::ResolveError(id, ResolverError::Generic))
        );
        assert!(!session.take_diagnostics().is_empty());
    }
}
