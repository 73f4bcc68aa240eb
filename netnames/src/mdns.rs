//! Multicast DNS and DNS-SD in `local.`, backed by the `mdns-sd` daemon.
//!
//! The daemon only knows about services and host addresses, so name lookups are mapped onto
//! those: `PTR` lookups of a service type list its instances, `SRV`/`TXT` lookups of an instance
//! name wait for that instance to be resolved, and `A`/`AAAA` lookups of a host name query the
//! host's addresses (also taking those of every instance resolved so far).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use mdns_sd::{HostnameResolutionEvent, ServiceDaemon, ServiceEvent, ServiceInfo};
use netnames_proto::error::{BrowserError, PublisherError, ResolverError};
use netnames_proto::name::{split_instance_name, LOCAL_DOMAIN};
use netnames_proto::service::{attributes_from_txt, attributes_to_txt, ServiceInstance};
use netnames_proto::{NameRecord, RecordType};
use tracing::{debug, trace, warn};

use crate::config::MdnsConfig;
use crate::provider::{Capabilities, LookupId, Provider, ProviderEvent, Publication, Query};

/// TTL of host and SRV records, see RFC 6762, Section 10.
const HOST_TTL: u32 = 120;
/// TTL of other records, see RFC 6762, Section 10.
const OTHER_TTL: u32 = 4500;

#[derive(Clone, Debug, PartialEq, Eq)]
enum LocalQuery {
    /// `PTR` lookup of `_service._proto.local.`
    ServiceType(String),
    /// `SRV`/`TXT` lookup of an instance, with the service type it belongs to.
    Instance { fullname: String, ty_domain: String },
    /// Address lookup of `host.local.`
    Host(String),
}

impl LocalQuery {
    fn classify(query: &Query) -> Option<Self> {
        match query.rtype {
            RecordType::PTR if query.name.starts_with('_') => {
                Some(LocalQuery::ServiceType(query.name.clone()))
            }
            RecordType::SRV | RecordType::TXT => split_instance_name(&query.name).map(
                |(_, service_type, domain)| LocalQuery::Instance {
                    fullname: query.name.clone(),
                    ty_domain: format!("{}.{}", service_type, domain),
                },
            ),
            RecordType::A | RecordType::AAAA | RecordType::ANY => {
                Some(LocalQuery::Host(query.name.clone()))
            }
            _ => None,
        }
    }

    /// What the daemon has to watch to answer the lookup.
    fn topic(&self) -> Topic {
        match self {
            LocalQuery::ServiceType(ty_domain) | LocalQuery::Instance { ty_domain, .. } => {
                Topic::browse(ty_domain)
            }
            LocalQuery::Host(host) => Topic::Host(host.to_ascii_lowercase()),
        }
    }
}

/// A daemon subscription, keyed by its lowercased name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Topic {
    Browse(String),
    Host(String),
}

impl Topic {
    fn browse(ty_domain: &str) -> Self {
        Topic::Browse(ty_domain.to_ascii_lowercase())
    }
}

struct Lookup {
    query: Query,
    kind: LocalQuery,
    deadline: Option<Instant>,
    // what a long-lived lookup was told so far
    reported: Vec<NameRecord>,
}

struct Browse {
    ty_domain: String,
    // lowercased full names of the instances reported as available
    announced: HashSet<String>,
}

struct Subscription<E> {
    receiver: flume::Receiver<E>,
    users: usize,
}

impl<E> Subscription<E> {
    fn new(receiver: flume::Receiver<E>) -> Self {
        Self { receiver, users: 1 }
    }
}

/// Lookups, browses and what the daemon reported for them. Holds the daemon's receivers but never
/// talks to the daemon itself: subscriptions nobody needs any more are collected in `unused` for
/// the provider to stop.
struct LocalState {
    query_timeout: Duration,
    browsing: HashMap<String, Subscription<ServiceEvent>>,
    resolving: HashMap<String, Subscription<HostnameResolutionEvent>>,
    lookups: HashMap<LookupId, Lookup>,
    browses: HashMap<LookupId, Browse>,
    resolved: BTreeMap<String, ServiceInfo>,
    hosts: HashMap<String, HashSet<IpAddr>>,
    unused: Vec<Topic>,
    events: VecDeque<ProviderEvent>,
}

impl LocalState {
    fn new(query_timeout: Duration) -> Self {
        Self {
            query_timeout,
            browsing: HashMap::new(),
            resolving: HashMap::new(),
            lookups: HashMap::new(),
            browses: HashMap::new(),
            resolved: BTreeMap::new(),
            hosts: HashMap::new(),
            unused: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Adds a user to the subscription of `topic`. Returns `false` if there is none yet.
    fn retain(&mut self, topic: &Topic) -> bool {
        let users = match topic {
            Topic::Browse(ty_domain) => self.browsing.get_mut(ty_domain).map(|s| &mut s.users),
            Topic::Host(host) => self.resolving.get_mut(host).map(|s| &mut s.users),
        };
        match users {
            Some(users) => {
                *users += 1;
                true
            }
            None => false,
        }
    }

    fn release(&mut self, topic: Topic) {
        let remaining = match &topic {
            Topic::Browse(ty_domain) => drop_user(&mut self.browsing, ty_domain),
            Topic::Host(host) => drop_user(&mut self.resolving, host),
        };
        if remaining == Some(0) {
            self.unused.push(topic);
        }
    }

    fn start_lookup(&mut self, id: LookupId, query: &Query, kind: LocalQuery, now: Instant) {
        let deadline = if query.long_lived {
            None
        } else {
            Some(now + self.query_timeout)
        };
        self.lookups.insert(
            id,
            Lookup {
                query: query.clone(),
                kind,
                deadline,
                reported: Vec::new(),
            },
        );
        self.answer_from_cache(id);
    }

    fn finish_lookup(&mut self, id: LookupId) {
        if let Some(lookup) = self.lookups.remove(&id) {
            self.release(lookup.kind.topic());
        }
    }

    fn stop_lookup(&mut self, id: LookupId) {
        self.finish_lookup(id);
        self.events.retain(|event| event.id() != id);
    }

    /// Starts reporting the instances of `ty_domain`, beginning with those resolved before.
    fn start_browse(&mut self, id: LookupId, ty_domain: &str) {
        let mut announced = HashSet::new();
        for info in self
            .resolved
            .values()
            .filter(|info| info.get_type().eq_ignore_ascii_case(ty_domain))
        {
            if let Some(instance) = instance_from_info(info) {
                announced.insert(info.get_fullname().to_ascii_lowercase());
                self.events
                    .push_back(ProviderEvent::BrowseAvailable(id, instance));
            }
        }
        self.browses.insert(
            id,
            Browse {
                ty_domain: ty_domain.to_ascii_lowercase(),
                announced,
            },
        );
    }

    fn stop_browse(&mut self, id: LookupId) {
        if let Some(browse) = self.browses.remove(&id) {
            self.release(Topic::Browse(browse.ty_domain));
        }
        self.events.retain(|event| event.id() != id);
    }

    /// Delivers the `records` lookup `id` was not told about yet, finishing it if it is a
    /// one-shot lookup.
    fn answer(&mut self, id: LookupId, records: Vec<NameRecord>) {
        let lookup = match self.lookups.get_mut(&id) {
            Some(lookup) => lookup,
            None => return,
        };
        let fresh: Vec<_> = records
            .into_iter()
            .filter(|record| !lookup.reported.contains(record))
            .collect();
        if fresh.is_empty() {
            return;
        }

        let long_lived = lookup.query.long_lived;
        if long_lived {
            lookup.reported.extend(fresh.iter().cloned());
        }
        self.events
            .push_back(ProviderEvent::ResolveResults(id, fresh));
        if !long_lived {
            self.finish_lookup(id);
        }
    }

    /// Tells a long-lived lookup that `records` it got before are gone, as TTL 0 records.
    fn retract(&mut self, id: LookupId, records: Vec<NameRecord>) {
        let lookup = match self.lookups.get_mut(&id) {
            Some(lookup) => lookup,
            None => return,
        };
        let mut withdrawn = Vec::new();
        for mut record in records {
            if let Some(pos) = lookup.reported.iter().position(|r| *r == record) {
                lookup.reported.remove(pos);
                record.set_ttl(0);
                withdrawn.push(record);
            }
        }
        if !withdrawn.is_empty() {
            self.events
                .push_back(ProviderEvent::ResolveResults(id, withdrawn));
        }
    }

    /// Answers from instances and host addresses learned earlier.
    fn answer_from_cache(&mut self, id: LookupId) {
        let lookup = match self.lookups.get(&id) {
            Some(lookup) => lookup,
            None => return,
        };
        let mut records = Vec::new();
        for info in self.resolved.values() {
            for record in records_for(&lookup.kind, lookup.query.rtype, info) {
                if !records.contains(&record) {
                    records.push(record);
                }
            }
        }
        if let LocalQuery::Host(host) = &lookup.kind {
            if let Some(addresses) = self.hosts.get(&host.to_ascii_lowercase()) {
                for record in host_records(host, lookup.query.rtype, addresses.iter().copied()) {
                    if !records.contains(&record) {
                        records.push(record);
                    }
                }
            }
        }
        self.answer(id, records);
    }

    fn answer_all(&mut self) {
        let ids: Vec<_> = self.lookups.keys().copied().collect();
        for id in ids {
            self.answer_from_cache(id);
        }
    }

    fn handle_service_event(&mut self, ty_domain: &str, event: ServiceEvent) {
        match event {
            ServiceEvent::ServiceFound(_, fullname) => {
                let found: Vec<_> = self
                    .lookups
                    .iter()
                    .filter_map(|(id, lookup)| match &lookup.kind {
                        LocalQuery::ServiceType(owner) if owner.eq_ignore_ascii_case(ty_domain) => {
                            Some((*id, ptr_record(owner, &fullname, OTHER_TTL)))
                        }
                        _ => None,
                    })
                    .collect();
                for (id, record) in found {
                    self.answer(id, vec![record]);
                }
            }
            ServiceEvent::ServiceResolved(info) => {
                trace!("Resolved {}", info.get_fullname());
                let key = info.get_fullname().to_ascii_lowercase();
                let instance = instance_from_info(&info);
                self.resolved.insert(key.clone(), info);

                // the daemon resolves an instance again on every update and on every interface
                if let Some(instance) = instance {
                    for (id, browse) in self
                        .browses
                        .iter_mut()
                        .filter(|(_, browse)| browse.ty_domain.eq_ignore_ascii_case(ty_domain))
                    {
                        if browse.announced.insert(key.clone()) {
                            self.events
                                .push_back(ProviderEvent::BrowseAvailable(*id, instance.clone()));
                        }
                    }
                }
                self.answer_all();
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                trace!("Removed {}", fullname);
                let key = fullname.to_ascii_lowercase();
                let info = self.resolved.remove(&key);
                let instance = info.as_ref().and_then(instance_from_info).or_else(|| {
                    split_instance_name(&fullname).map(|(instance, ty, domain)| {
                        ServiceInstance::new(instance, ty, domain, BTreeMap::new())
                    })
                });

                if let Some(instance) = instance {
                    for (id, browse) in self
                        .browses
                        .iter_mut()
                        .filter(|(_, browse)| browse.ty_domain.eq_ignore_ascii_case(ty_domain))
                    {
                        if browse.announced.remove(&key) {
                            self.events
                                .push_back(ProviderEvent::BrowseUnavailable(*id, instance.clone()));
                        }
                    }
                }

                // long-lived lookups learn about the removal as TTL 0 records; the host of the
                // instance may well still be there, so addresses stay
                let mut gone = Vec::new();
                for (id, lookup) in self.lookups.iter().filter(|(_, l)| l.query.long_lived) {
                    let records = match &lookup.kind {
                        LocalQuery::ServiceType(owner) if owner.eq_ignore_ascii_case(ty_domain) => {
                            vec![ptr_record(owner, &fullname, OTHER_TTL)]
                        }
                        LocalQuery::Instance { .. } => info
                            .as_ref()
                            .map(|info| records_for(&lookup.kind, lookup.query.rtype, info))
                            .unwrap_or_default(),
                        _ => continue,
                    };
                    gone.push((*id, records));
                }
                for (id, records) in gone {
                    self.retract(id, records);
                }
            }
            other => trace!("Ignoring daemon event for {}: {:?}", ty_domain, other),
        }
    }

    fn handle_host_event(&mut self, event: HostnameResolutionEvent) {
        match event {
            HostnameResolutionEvent::AddressesFound(host, addresses) => {
                trace!("Addresses of {}: {:?}", host, addresses);
                self.hosts
                    .entry(host.to_ascii_lowercase())
                    .or_default()
                    .extend(addresses);
                self.answer_all();
            }
            HostnameResolutionEvent::AddressesRemoved(host, addresses) => {
                trace!("Addresses of {} removed: {:?}", host, addresses);
                let key = host.to_ascii_lowercase();
                if let Some(known) = self.hosts.get_mut(&key) {
                    known.retain(|address| !addresses.contains(address));
                }
                let gone: Vec<_> = self
                    .lookups
                    .iter()
                    .filter(|(_, l)| l.query.long_lived)
                    .filter_map(|(id, lookup)| match &lookup.kind {
                        LocalQuery::Host(name) if name.eq_ignore_ascii_case(&key) => Some((
                            *id,
                            host_records(name, lookup.query.rtype, addresses.iter().copied()),
                        )),
                        _ => None,
                    })
                    .collect();
                for (id, records) in gone {
                    self.retract(id, records);
                }
            }
            other => trace!("Ignoring daemon event: {:?}", other),
        }
    }

    /// Drains the daemon's receivers.
    fn receive(&mut self) {
        let mut services = Vec::new();
        for (ty_domain, subscription) in &self.browsing {
            services.extend(
                subscription
                    .receiver
                    .try_iter()
                    .map(|event| (ty_domain.clone(), event)),
            );
        }
        let hosts: Vec<_> = self
            .resolving
            .values()
            .flat_map(|subscription| subscription.receiver.try_iter())
            .collect();

        for (ty_domain, event) in services {
            self.handle_service_event(&ty_domain, event);
        }
        for event in hosts {
            self.handle_host_event(event);
        }
    }

    /// Fails the one-shot lookups whose deadline passed.
    fn expire(&mut self, now: Instant) {
        let expired: Vec<_> = self
            .lookups
            .iter()
            .filter(|(_, l)| l.deadline.map_or(false, |deadline| deadline <= now))
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            debug!("Local lookup {} got no answer in time.", id);
            self.finish_lookup(id);
            self.events
                .push_back(ProviderEvent::ResolveError(id, ResolverError::NoName));
        }
    }

    fn process(&mut self, now: Instant) {
        self.receive();
        self.expire(now);
    }
}

fn drop_user<E>(subscriptions: &mut HashMap<String, Subscription<E>>, key: &str) -> Option<usize> {
    let subscription = subscriptions.get_mut(key)?;
    subscription.users -= 1;
    let users = subscription.users;
    if users == 0 {
        subscriptions.remove(key);
    }
    Some(users)
}

struct Published {
    publication: Publication,
    // announced in addition to the host's own addresses
    addresses: Vec<IpAddr>,
    fullname: String,
}

/// Provides `local.` lookups, browsing and publishing through multicast DNS.
pub struct MdnsProvider {
    daemon: ServiceDaemon,
    host_name: String,
    state: LocalState,
    publications: HashMap<LookupId, Published>,
    notes: Vec<String>,
}

impl MdnsProvider {
    /// Starts the multicast DNS daemon.
    pub fn new(config: MdnsConfig) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;
        let host_name = host_name(&config);
        debug!("Multicast DNS daemon started, announcing as {}", host_name);
        Ok(Self {
            daemon,
            host_name,
            state: LocalState::new(config.query_timeout),
            publications: HashMap::new(),
            notes: Vec::new(),
        })
    }

    // the daemon allows one browse per service type and one query per host, shared by every
    // interested operation
    fn subscribe(&mut self, topic: &Topic) -> Result<(), mdns_sd::Error> {
        if self.state.retain(topic) {
            return Ok(());
        }
        match topic {
            Topic::Browse(ty_domain) => {
                let receiver = self.daemon.browse(ty_domain)?;
                trace!("Browsing {}", ty_domain);
                self.state
                    .browsing
                    .insert(ty_domain.clone(), Subscription::new(receiver));
            }
            Topic::Host(host) => {
                // lookups time out on their own deadline
                let receiver = self.daemon.resolve_hostname(host, None)?;
                trace!("Querying the addresses of {}", host);
                self.state
                    .resolving
                    .insert(host.clone(), Subscription::new(receiver));
            }
        }
        Ok(())
    }

    fn stop_unused(&mut self) {
        for topic in std::mem::take(&mut self.state.unused) {
            let result = match &topic {
                Topic::Browse(ty_domain) => self.daemon.stop_browse(ty_domain),
                Topic::Host(host) => self.daemon.stop_resolve_hostname(host),
            };
            if let Err(e) = result {
                debug!("Could not stop {:?}: {}", topic, e);
            }
        }
    }

    fn register(
        &mut self,
        id: LookupId,
        publication: Publication,
        addresses: Vec<IpAddr>,
    ) -> Result<(), mdns_sd::Error> {
        let info = service_info(&self.host_name, &publication, &addresses)?;
        let fullname = info.get_fullname().to_string();
        // registering the same instance again re-announces it
        self.daemon.register(info)?;
        self.publications.insert(
            id,
            Published {
                publication,
                addresses,
                fullname,
            },
        );
        Ok(())
    }

    /// Re-announces publication `id` with changes. On failure the previous announcement stays.
    fn reannounce(&mut self, id: LookupId, publication: Publication, addresses: Vec<IpAddr>) {
        let instance = publication.instance.clone();
        if let Err(e) = self.register(id, publication, addresses) {
            warn!("Could not update service {}: {}", instance, e);
            self.notes.push(e.to_string());
        }
    }
}

fn host_name(config: &MdnsConfig) -> String {
    let name = match &config.host_name {
        Some(name) => name.clone(),
        None => hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|e| {
                debug!("Could not get system hostname: {}", e);
                "netnames".to_string()
            }),
    };
    // only the first label, the host lives directly under local.
    let label = name.split('.').next().unwrap_or_default();
    format!("{}.{}", label, LOCAL_DOMAIN)
}

fn service_info(
    host_name: &str,
    publication: &Publication,
    addresses: &[IpAddr],
) -> Result<ServiceInfo, mdns_sd::Error> {
    let ty_domain = format!("{}.{}", publication.service_type, LOCAL_DOMAIN);
    let properties: HashMap<String, String> = publication
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), String::from_utf8_lossy(value).into_owned()))
        .collect();
    Ok(ServiceInfo::new(
        &ty_domain,
        &publication.instance,
        host_name,
        addresses,
        publication.port,
        properties,
    )?
    .enable_addr_auto())
}

/// Folds an extra record into a publication. Only what a DNS-SD service announcement carries can
/// be added: `TXT` strings become attributes, `A`/`AAAA` addresses are announced for the host.
fn add_extra(
    publication: &mut Publication,
    addresses: &mut Vec<IpAddr>,
    record: &NameRecord,
) -> Result<(), String> {
    match (record.rtype(), record.address()) {
        (Some(RecordType::TXT), _) => {
            publication
                .attributes
                .extend(attributes_from_txt(record.texts()));
            Ok(())
        }
        (Some(RecordType::A | RecordType::AAAA), Some(address)) => {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
            Ok(())
        }
        _ => Err(format!(
            "Cannot announce {} alongside a service via multicast DNS.",
            record
        )),
    }
}

fn instance_from_info(info: &ServiceInfo) -> Option<ServiceInstance> {
    let (instance, service_type, domain) = split_instance_name(info.get_fullname())?;
    let attributes = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().as_bytes().to_vec()))
        .collect();
    Some(ServiceInstance::new(instance, service_type, domain, attributes))
}

fn ptr_record(owner: &str, fullname: &str, ttl: u32) -> NameRecord {
    let mut record = NameRecord::new(owner, ttl);
    record.set_ptr(fullname);
    record
}

fn host_records(
    host: &str,
    rtype: RecordType,
    addresses: impl IntoIterator<Item = IpAddr>,
) -> Vec<NameRecord> {
    let mut addresses: Vec<IpAddr> = addresses
        .into_iter()
        .filter(|address| match rtype {
            RecordType::A => address.is_ipv4(),
            RecordType::AAAA => address.is_ipv6(),
            _ => true,
        })
        .collect();
    addresses.sort();
    addresses
        .into_iter()
        .map(|address| NameRecord::address_record(host, HOST_TTL, address))
        .collect()
}

/// The records a resolved instance contributes to a lookup.
fn records_for(kind: &LocalQuery, rtype: RecordType, info: &ServiceInfo) -> Vec<NameRecord> {
    match kind {
        LocalQuery::ServiceType(owner) if owner.eq_ignore_ascii_case(info.get_type()) => {
            vec![ptr_record(owner, info.get_fullname(), OTHER_TTL)]
        }
        LocalQuery::Instance { fullname, .. }
            if fullname.eq_ignore_ascii_case(info.get_fullname()) =>
        {
            let mut record = NameRecord::new(fullname.clone(), HOST_TTL);
            if rtype == RecordType::SRV {
                record.set_srv(info.get_hostname(), info.get_port(), 0, 0);
            } else {
                let attributes = instance_from_info(info)
                    .map(|instance| instance.attributes().clone())
                    .unwrap_or_default();
                record.set_ttl(OTHER_TTL);
                record.set_txt(attributes_to_txt(&attributes));
            }
            vec![record]
        }
        LocalQuery::Host(host) if host.eq_ignore_ascii_case(info.get_hostname()) => {
            host_records(host, rtype, info.get_addresses().iter().copied())
        }
        _ => Vec::new(),
    }
}

impl Provider for MdnsProvider {
    fn name(&self) -> &str {
        "mdns"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            single: true,
            long_lived: true,
            browse: true,
            publish: true,
        }
    }

    fn resolve_start(&mut self, id: LookupId, query: &Query) {
        let kind = match LocalQuery::classify(query) {
            Some(kind) => kind,
            None => {
                debug!("Cannot look up {} {} via multicast DNS", query.name, query.rtype);
                self.state
                    .events
                    .push_back(ProviderEvent::ResolveError(id, ResolverError::Generic));
                return;
            }
        };

        let topic = kind.topic();
        if let Err(e) = self.subscribe(&topic) {
            warn!("Could not watch {:?}: {}", topic, e);
            self.notes.push(e.to_string());
            self.state
                .events
                .push_back(ProviderEvent::ResolveError(id, ResolverError::Generic));
            return;
        }
        self.state.start_lookup(id, query, kind, Instant::now());
        self.stop_unused();
    }

    fn resolve_stop(&mut self, id: LookupId) {
        self.state.stop_lookup(id);
        self.stop_unused();
    }

    fn browse_start(&mut self, id: LookupId, service_type: &str, domain: &str) {
        let ty_domain = format!("{}.{}", service_type, domain);
        if let Err(e) = self.subscribe(&Topic::browse(&ty_domain)) {
            warn!("Could not browse {}: {}", ty_domain, e);
            self.notes.push(e.to_string());
            self.state
                .events
                .push_back(ProviderEvent::BrowseError(id, BrowserError::Generic));
            return;
        }
        self.state.start_browse(id, &ty_domain);
    }

    fn browse_stop(&mut self, id: LookupId) {
        self.state.stop_browse(id);
        self.stop_unused();
    }

    fn publish_start(&mut self, id: LookupId, publication: &Publication) {
        let ty_domain = format!("{}.{}", publication.service_type, LOCAL_DOMAIN);
        let taken = self.publications.values().any(|published| {
            published.publication.instance == publication.instance
                && published.fullname.ends_with(&ty_domain)
        });
        if taken {
            debug!("{} is already published by this host", publication.instance);
            self.state
                .events
                .push_back(ProviderEvent::PublishError(id, PublisherError::Conflict));
            return;
        }

        match self.register(id, publication.clone(), Vec::new()) {
            // the daemon announces on its own and does not report completion
            Ok(()) => self.state.events.push_back(ProviderEvent::Published(id)),
            Err(e) => {
                warn!("Could not register service {}: {}", publication.instance, e);
                self.notes.push(e.to_string());
                self.state
                    .events
                    .push_back(ProviderEvent::PublishError(id, PublisherError::Generic));
            }
        }
    }

    fn publish_update(&mut self, id: LookupId, attributes: &BTreeMap<String, Vec<u8>>) {
        let (mut publication, addresses) = match self.publications.get(&id) {
            Some(published) => (published.publication.clone(), published.addresses.clone()),
            None => return,
        };
        publication.attributes = attributes.clone();
        self.reannounce(id, publication, addresses);
    }

    fn publish_extra(&mut self, id: LookupId, record: &NameRecord) {
        let (mut publication, mut addresses) = match self.publications.get(&id) {
            Some(published) => (published.publication.clone(), published.addresses.clone()),
            None => return,
        };
        match add_extra(&mut publication, &mut addresses, record) {
            Ok(()) => self.reannounce(id, publication, addresses),
            Err(note) => {
                warn!("{}", note);
                self.notes.push(note);
            }
        }
    }

    fn publish_stop(&mut self, id: LookupId) {
        if let Some(published) = self.publications.remove(&id) {
            if let Err(e) = self.daemon.unregister(&published.fullname) {
                debug!("Could not unregister {}: {}", published.fullname, e);
            }
        }
        self.state.events.retain(|event| event.id() != id);
    }

    fn poll_event(&mut self) -> Option<ProviderEvent> {
        if self.state.events.is_empty() {
            self.state.process(Instant::now());
            self.stop_unused();
        }
        self.state.events.pop_front()
    }

    fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }

    fn shutdown(&mut self) {
        let ids: Vec<_> = self.publications.keys().copied().collect();
        for id in ids {
            self.publish_stop(id);
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!("Could not shut down the multicast DNS daemon: {}", e);
        }
        self.state = LocalState::new(self.state.query_timeout);
    }
}
