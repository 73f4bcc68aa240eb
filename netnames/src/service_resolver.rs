//! Resolving a service to connectable addresses.
//!
//! A [`ServiceResolver`] walks the chain `SRV` → host → addresses, one candidate at a time:
//!
//! 1. The `SRV` lookup yields the target hosts, ordered as described in
//!    [RFC 2782](https://www.rfc-editor.org/rfc/rfc2782).
//! 2. The next host is resolved for the primary address family of the [`Protocol`].
//! 3. Every address is handed out as a [`ServiceResolverEvent::ResultReady`]. If connecting to it
//!    fails, the caller asks for the next one with [`ServiceResolver::try_next()`].
//! 4. When the addresses of the primary family are used up (or there are none), the host is
//!    resolved for the fallback family, if the protocol has one.
//! 5. After that the next host follows. When no host is left the resolver fails with
//!    [`ServiceResolverError::NoHostLeft`].
//!
//! If a fallback port is given, the service's domain itself is appended as the last host, so a
//! domain without `SRV` records is still reachable directly.

use std::collections::VecDeque;
use std::net::IpAddr;

use netnames_proto::error::{ResolverError, ServiceResolverError};
use netnames_proto::name::{normalize, srv_name};
use netnames_proto::{NameRecord, RecordType, WeightedNameRecordList};
use tracing::{debug, trace};

use crate::resolver::{Mode, NameResolver, ResolverEvent};
use crate::session::Session;

/// Which address families are tried, and in which order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Protocol {
    /// IPv6 first, then IPv4.
    #[default]
    IPv6IPv4,
    /// IPv4 first, then IPv6.
    IPv4IPv6,
    /// Both families in parallel, through the two resolvers returned by
    /// [`ServiceResolver::happy_split()`]
    /// ([RFC 8305](https://www.rfc-editor.org/rfc/rfc8305)).
    HappyEyeballs,
    IPv6,
    IPv4,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    fn rtype(self) -> RecordType {
        match self {
            Family::V4 => RecordType::A,
            Family::V6 => RecordType::AAAA,
        }
    }
}

impl Protocol {
    fn primary(self) -> Family {
        match self {
            Protocol::IPv4IPv6 | Protocol::IPv4 => Family::V4,
            Protocol::IPv6IPv4 | Protocol::HappyEyeballs | Protocol::IPv6 => Family::V6,
        }
    }

    fn fallback(self) -> Option<Family> {
        match self {
            Protocol::IPv6IPv4 | Protocol::HappyEyeballs => Some(Family::V4),
            Protocol::IPv4IPv6 => Some(Family::V6),
            Protocol::IPv6 | Protocol::IPv4 => None,
        }
    }

    fn accepts(self, family: Family) -> bool {
        match self {
            Protocol::IPv6 => family == Family::V6,
            Protocol::IPv4 => family == Family::V4,
            _ => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceResolverEvent {
    /// A candidate to connect to. `hostname` is the host the address belongs to.
    ResultReady {
        address: IpAddr,
        port: u16,
        hostname: String,
    },
    /// The `SRV` lookup succeeded.
    SrvReady,
    /// The `SRV` lookup failed. Resolution goes on with the fallback host, if there is one.
    SrvFailed,
    /// Ends the resolution.
    Error(ServiceResolverError),
}

struct HostLookup {
    resolver: NameResolver,
    family: Family,
}

/// The two single-family resolvers created by [`ServiceResolver::happy_split()`]. Both are owned
/// by the resolver that was split.
pub struct ProtoSplit<'a> {
    pub ipv4: &'a mut ServiceResolver,
    pub ipv6: &'a mut ServiceResolver,
}

/// Resolves a service (or a plain host) to addresses, see the [module docs](self).
///
/// # Example
///
/// ```rust,no_run
/// use netnames::service_resolver::{ServiceResolver, ServiceResolverEvent};
///
/// let mut resolver = ServiceResolver::new();
/// resolver.start_service("xmpp-client", "tcp", "jabber.org", Some(5222));
/// loop {
///     match resolver.poll_event() {
///         Some(ServiceResolverEvent::ResultReady { address, port, .. }) => {
///             if std::net::TcpStream::connect((address, port)).is_ok() {
///                 break;
///             }
///             resolver.try_next();
///         }
///         Some(ServiceResolverEvent::Error(e)) => {
///             eprintln!("{}", e);
///             break;
///         }
///         Some(_) => {}
///         None => std::thread::sleep(std::time::Duration::from_millis(10)),
///     }
/// }
/// ```
pub struct ServiceResolver {
    session: Session,
    protocol: Protocol,
    srv: Option<NameResolver>,
    host: Option<HostLookup>,
    srv_list: WeightedNameRecordList,
    host_list: WeightedNameRecordList,
    // the host being walked and the port its addresses are reported with
    domain: String,
    port: u16,
    // family of the addresses in host_list, None before the first host
    requested: Option<Family>,
    fallback_tried: bool,
    started: bool,
    finished: bool,
    events: VecDeque<ServiceResolverEvent>,
    split: Option<(Box<ServiceResolver>, Box<ServiceResolver>)>,
}

impl ServiceResolver {
    /// Creates a resolver on the thread's global session.
    pub fn new() -> Self {
        Self::with_session(&Session::global())
    }

    pub fn with_session(session: &Session) -> Self {
        Self {
            session: session.clone(),
            protocol: Protocol::default(),
            srv: None,
            host: None,
            srv_list: WeightedNameRecordList::new(),
            host_list: WeightedNameRecordList::new(),
            domain: String::new(),
            port: 0,
            requested: None,
            fallback_tried: false,
            started: false,
            finished: false,
            events: VecDeque::new(),
            split: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Sets the address family policy for the next `start*()` call.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    /// Resolves a DNS-SD instance, e.g. `"Office._ipp._tcp.local."`, through its `SRV` record.
    pub fn start_instance(&mut self, name: &str) {
        self.reset();
        self.started = true;
        self.start_srv(name);
    }

    /// Resolves `host` directly and reports its addresses with `port`.
    ///
    /// With [`Protocol::HappyEyeballs`] nothing is looked up yet: the host becomes the only
    /// candidate of the two resolvers created by [`Self::happy_split()`].
    pub fn start_host(&mut self, host: &str, port: u16) {
        self.reset();
        self.started = true;
        if self.protocol == Protocol::HappyEyeballs {
            self.srv_list.append_host(host, port);
            return;
        }
        self.resolve_host(host, port);
    }

    /// Resolves `_service._transport.domain` through `SRV`. If `port` is given, `domain:port` is
    /// tried after every `SRV` target, or alone if there are no `SRV` records.
    pub fn start_service(
        &mut self,
        service: &str,
        transport: &str,
        domain: &str,
        port: Option<u16>,
    ) {
        self.reset();
        self.started = true;
        if let Some(port) = port {
            self.srv_list.append_host(&normalize(domain), port);
        }
        self.start_srv(&srv_name(service, transport, domain));
    }

    /// Hands out the next candidate after the caller failed to use the previous one.
    ///
    /// Does nothing before a `start*()` call and after [`Self::happy_split()`]: the split
    /// resolvers own the remaining candidates then.
    pub fn try_next(&mut self) {
        if !self.started || self.finished {
            return;
        }
        if self.split.is_some() {
            trace!("{} was split, advance the split resolvers instead.", self.domain);
            return;
        }
        if self.srv.is_some() || self.host.is_some() {
            debug!("Lookup for {} still running, not advancing.", self.domain);
            return;
        }

        match self.host_list.take_next() {
            Some(record) => self.report(record),
            None => {
                if !self.lookup_host_fallback() {
                    self.try_next_host();
                }
            }
        }
    }

    /// Whether `SRV` targets remain that have not been tried yet.
    pub fn has_pending_srv(&self) -> bool {
        !self.srv_list.is_empty()
    }

    /// Whether the resolver has reported its final error.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Splits the remaining candidates into an IPv4-only and an IPv6-only resolver, to be driven
    /// in parallel. Call it after [`ServiceResolverEvent::SrvReady`] or
    /// [`ServiceResolverEvent::SrvFailed`] (or right after [`Self::start_host()`]).
    ///
    /// Both resolvers are owned by `self`: they live until `self` is stopped, restarted, split
    /// again or dropped, and can be reached again through [`Self::split()`]. Each one starts with
    /// a call to its [`Self::try_next()`].
    pub fn happy_split(&mut self) -> ProtoSplit<'_> {
        let ipv4 = Box::new(self.split_child(Protocol::IPv4, Family::V4));
        let ipv6 = Box::new(self.split_child(Protocol::IPv6, Family::V6));
        trace!(
            "Split {} SRV target(s) for {}",
            self.srv_list.len(),
            self.domain
        );

        self.stop_lookups();
        self.srv_list.clear();
        self.host_list.clear();

        let (ipv4, ipv6) = self.split.insert((ipv4, ipv6));
        ProtoSplit {
            ipv4: &mut **ipv4,
            ipv6: &mut **ipv6,
        }
    }

    /// The resolvers created by the last [`Self::happy_split()`].
    pub fn split(&mut self) -> Option<ProtoSplit<'_>> {
        let (ipv4, ipv6) = self.split.as_mut()?;
        Some(ProtoSplit {
            ipv4: &mut **ipv4,
            ipv6: &mut **ipv6,
        })
    }

    /// Stops all lookups, including those of split resolvers. Nothing is reported afterwards.
    pub fn stop(&mut self) {
        self.reset();
    }

    /// Returns the next event, if one is ready.
    pub fn poll_event(&mut self) -> Option<ServiceResolverEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }

            if let Some(srv) = self.srv.as_mut() {
                match srv.poll_event() {
                    Some(ResolverEvent::ResultsReady(records)) => {
                        self.srv = None;
                        self.handle_srv_results(records);
                        continue;
                    }
                    Some(ResolverEvent::Error(e)) => {
                        self.srv = None;
                        self.handle_srv_error(e);
                        continue;
                    }
                    None => {}
                }
            }

            if let Some(host) = self.host.as_mut() {
                let family = host.family;
                match host.resolver.poll_event() {
                    Some(ResolverEvent::ResultsReady(records)) => {
                        self.host = None;
                        self.handle_host_results(records, family);
                        continue;
                    }
                    Some(ResolverEvent::Error(e)) => {
                        debug!("{} lookup for {} failed: {}", family.rtype(), self.domain, e);
                        self.host = None;
                        self.handle_host_error();
                        continue;
                    }
                    None => {}
                }
            }

            return None;
        }
    }

    fn reset(&mut self) {
        self.stop_lookups();
        self.srv_list.clear();
        self.host_list.clear();
        self.domain.clear();
        self.port = 0;
        self.requested = None;
        self.fallback_tried = false;
        self.started = false;
        self.finished = false;
        self.events.clear();
        self.split = None;
    }

    fn stop_lookups(&mut self) {
        self.srv = None;
        self.host = None;
    }

    fn fail(&mut self, error: ServiceResolverError) {
        debug!("Service resolution failed: {}", error);
        self.stop_lookups();
        self.srv_list.clear();
        self.host_list.clear();
        self.finished = true;
        self.events.push_back(ServiceResolverEvent::Error(error));
    }

    fn report(&mut self, record: NameRecord) {
        if let Some(address) = record.address() {
            self.events.push_back(ServiceResolverEvent::ResultReady {
                address,
                port: self.port,
                hostname: self.domain.clone(),
            });
        }
    }

    fn start_srv(&mut self, name: &str) {
        let mut resolver = NameResolver::with_session(&self.session);
        resolver.start(name, RecordType::SRV, Mode::Single);
        self.srv = Some(resolver);
    }

    fn handle_srv_results(&mut self, records: Vec<NameRecord>) {
        let targets: Vec<_> = records
            .into_iter()
            .filter(|record| record.rtype() == Some(RecordType::SRV))
            .collect();

        // a sole target of "." means the service is decidedly not available (RFC 2782)
        if !targets.is_empty() && targets.iter().all(|record| record.name() == ".") {
            self.events.push_back(ServiceResolverEvent::SrvFailed);
            self.fail(ServiceResolverError::ServiceNotFound);
            return;
        }

        self.srv_list
            .append_all(targets.into_iter().filter(|record| record.name() != "."));
        trace!("SRV targets: {:?}", self.srv_list);
        self.events.push_back(ServiceResolverEvent::SrvReady);
        if self.protocol != Protocol::HappyEyeballs {
            self.try_next_host();
        }
    }

    fn handle_srv_error(&mut self, error: ResolverError) {
        debug!("SRV lookup failed: {}", error);
        self.events.push_back(ServiceResolverEvent::SrvFailed);
        if self.srv_list.is_empty() {
            self.fail(ServiceResolverError::from_srv_failure(error));
        } else if self.protocol != Protocol::HappyEyeballs {
            self.try_next_host();
        }
    }

    fn handle_host_results(&mut self, records: Vec<NameRecord>, family: Family) {
        let addresses = records.into_iter().filter(|record| {
            record
                .address()
                .map_or(false, |address| Family::of(&address) == family)
        });
        self.host_list.append_all(addresses);

        if self.host_list.is_empty() {
            self.handle_host_error();
        } else {
            self.try_next();
        }
    }

    fn handle_host_error(&mut self) {
        if !self.lookup_host_fallback() {
            self.try_next_host();
        }
    }

    /// Starts resolving `host`, beginning with the protocol's primary family.
    fn resolve_host(&mut self, host: &str, port: u16) {
        self.host_list.clear();
        self.port = port;
        self.fallback_tried = false;

        // literal addresses need no lookup
        let literal = host.trim_end_matches('.');
        if let Ok(address) = literal.parse::<IpAddr>() {
            self.domain = literal.to_string();
            let family = Family::of(&address);
            self.requested = Some(family);
            self.fallback_tried = true;
            if self.protocol.accepts(family) {
                self.host_list
                    .append(NameRecord::address_record(literal, 0, address));
                self.try_next();
            } else {
                self.try_next_host();
            }
            return;
        }

        self.domain = normalize(host);
        let family = self.protocol.primary();
        self.requested = Some(family);
        self.lookup_host(family);
    }

    fn lookup_host(&mut self, family: Family) {
        trace!("Looking up {} {}", self.domain, family.rtype());
        let mut resolver = NameResolver::with_session(&self.session);
        resolver.start(&self.domain, family.rtype(), Mode::Single);
        self.host = Some(HostLookup { resolver, family });
    }

    /// Resolves the current host for the fallback family, if the protocol has one and it was not
    /// tried yet. Returns whether a lookup was started.
    fn lookup_host_fallback(&mut self) -> bool {
        let fallback = match (self.requested, self.protocol.fallback()) {
            (Some(requested), Some(fallback))
                if requested == self.protocol.primary() && !self.fallback_tried =>
            {
                fallback
            }
            _ => return false,
        };
        self.fallback_tried = true;
        self.requested = Some(fallback);
        self.lookup_host(fallback);
        true
    }

    /// Moves on to the next `SRV` target, failing if there is none.
    fn try_next_host(&mut self) {
        match self.srv_list.take_next() {
            Some(record) => {
                let (host, port) = (record.name().to_string(), record.port());
                self.resolve_host(&host, port);
            }
            None => self.fail(ServiceResolverError::NoHostLeft),
        }
    }

    fn split_child(&self, protocol: Protocol, family: Family) -> ServiceResolver {
        let mut child = ServiceResolver::with_session(&self.session);
        child.protocol = protocol;
        child.started = true;
        child.srv_list = self.srv_list.clone();
        child.domain = self.domain.clone();
        child.port = self.port;
        child.host_list = self
            .host_list
            .records()
            .filter(|record| record.address().map_or(false, |a| Family::of(&a) == family))
            .cloned()
            .collect();
        if !child.host_list.is_empty() {
            child.requested = Some(family);
        }
        child
    }
}

impl Default for ServiceResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Family, Protocol};

    #[test]
    fn protocol_families() {
        assert_eq!(Protocol::default(), Protocol::IPv6IPv4);
        assert_eq!(Protocol::IPv6IPv4.primary(), Family::V6);
        assert_eq!(Protocol::IPv6IPv4.fallback(), Some(Family::V4));
        assert_eq!(Protocol::IPv4IPv6.primary(), Family::V4);
        assert_eq!(Protocol::IPv4IPv6.fallback(), Some(Family::V6));
        assert_eq!(Protocol::IPv4.fallback(), None);
        assert_eq!(Protocol::IPv6.fallback(), None);
        assert!(!Protocol::IPv4.accepts(Family::V6));
        assert!(Protocol::HappyEyeballs.accepts(Family::V4));
    }
}
