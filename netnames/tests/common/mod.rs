//! A scripted in-memory provider for driving the state machines without a network.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use netnames::provider::{Capabilities, LookupId, Provider, ProviderEvent, Publication, Query};
use netnames::session::Session;
use netnames_proto::error::{PublisherError, ResolverError};
use netnames_proto::name::normalize;
use netnames_proto::{NameRecord, RecordType, ServiceInstance};

type Key = (String, RecordType);

fn key(name: &str, rtype: RecordType) -> Key {
    (normalize(name).to_ascii_lowercase(), rtype)
}

#[derive(Default)]
struct Script {
    answers: HashMap<Key, Result<Vec<NameRecord>, ResolverError>>,
    held: HashSet<Key>,
    queries: Vec<Query>,
    lookups: HashMap<LookupId, Query>,
    stopped: Vec<LookupId>,
    browses: HashMap<LookupId, (String, String)>,
    publications: HashMap<LookupId, Publication>,
    updates: Vec<BTreeMap<String, Vec<u8>>>,
    extras: Vec<(LookupId, NameRecord)>,
    events: VecDeque<ProviderEvent>,
}

impl Script {
    fn answer_event(&self, id: LookupId, query: &Query) -> Option<ProviderEvent> {
        let answer = self.answers.get(&key(&query.name, query.rtype));
        match (answer, query.long_lived) {
            (Some(Ok(records)), _) if !records.is_empty() => {
                Some(ProviderEvent::ResolveResults(id, records.clone()))
            }
            (Some(Err(error)), _) => Some(ProviderEvent::ResolveError(id, *error)),
            // long-lived lookups stay silent until something changes
            (_, true) => None,
            _ => Some(ProviderEvent::ResolveError(id, ResolverError::NoName)),
        }
    }
}

/// Answers lookups from a script. Clones share the script, so a test keeps one clone to steer the
/// provider it handed to the session.
#[derive(Clone)]
pub struct ScriptedProvider {
    name: &'static str,
    capabilities: Capabilities,
    script: Rc<RefCell<Script>>,
}

impl ScriptedProvider {
    /// A wide-area provider: one-shot lookups only.
    pub fn unicast() -> Self {
        Self {
            name: "scripted-unicast",
            capabilities: Capabilities {
                single: true,
                ..Capabilities::default()
            },
            script: Rc::default(),
        }
    }

    /// A `local.` provider that can do everything.
    pub fn local() -> Self {
        Self {
            name: "scripted-local",
            capabilities: Capabilities {
                single: true,
                long_lived: true,
                browse: true,
                publish: true,
            },
            script: Rc::default(),
        }
    }

    pub fn answer(&self, name: &str, rtype: RecordType, records: Vec<NameRecord>) {
        self.script
            .borrow_mut()
            .answers
            .insert(key(name, rtype), Ok(records));
    }

    pub fn fail(&self, name: &str, rtype: RecordType, error: ResolverError) {
        self.script
            .borrow_mut()
            .answers
            .insert(key(name, rtype), Err(error));
    }

    /// Keeps lookups of `name` pending until [`Self::release()`].
    pub fn hold(&self, name: &str, rtype: RecordType) {
        self.script.borrow_mut().held.insert(key(name, rtype));
    }

    /// Answers every lookup started for `name` so far, even stopped ones.
    pub fn release(&self, name: &str, rtype: RecordType, started: &[LookupId]) {
        let mut script = self.script.borrow_mut();
        script.held.remove(&key(name, rtype));
        let query = Query {
            name: normalize(name),
            rtype,
            long_lived: false,
        };
        for id in started {
            if let Some(event) = script.answer_event(*id, &query) {
                script.events.push_back(event);
            }
        }
    }

    /// Reports `records` to every running long-lived lookup of `name`.
    pub fn change(&self, name: &str, rtype: RecordType, records: Vec<NameRecord>) {
        let mut script = self.script.borrow_mut();
        let wanted = key(name, rtype);
        let ids: Vec<_> = script
            .lookups
            .iter()
            .filter(|(_, query)| query.long_lived && key(&query.name, query.rtype) == wanted)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            script
                .events
                .push_back(ProviderEvent::ResolveResults(id, records.clone()));
        }
    }

    pub fn announce(&self, instance: &ServiceInstance) {
        self.browse_event(instance, ProviderEvent::BrowseAvailable);
    }

    pub fn withdraw(&self, instance: &ServiceInstance) {
        self.browse_event(instance, ProviderEvent::BrowseUnavailable);
    }

    fn browse_event(
        &self,
        instance: &ServiceInstance,
        event: fn(LookupId, ServiceInstance) -> ProviderEvent,
    ) {
        let mut script = self.script.borrow_mut();
        let ids: Vec<_> = script
            .browses
            .iter()
            .filter(|(_, (service_type, _))| service_type == instance.service_type())
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            script.events.push_back(event(id, instance.clone()));
        }
    }

    /// Confirms every running publication.
    pub fn confirm_publications(&self) {
        let mut script = self.script.borrow_mut();
        let ids: Vec<_> = script.publications.keys().copied().collect();
        for id in ids {
            script.events.push_back(ProviderEvent::Published(id));
        }
    }

    pub fn reject_publications(&self, error: PublisherError) {
        let mut script = self.script.borrow_mut();
        let ids: Vec<_> = script.publications.keys().copied().collect();
        for id in ids {
            script.events.push_back(ProviderEvent::PublishError(id, error));
        }
    }

    /// Every query received, in order.
    pub fn queries(&self) -> Vec<Query> {
        self.script.borrow().queries.clone()
    }

    /// Ids of the lookups started for `name`.
    pub fn lookups_for(&self, name: &str, rtype: RecordType) -> Vec<LookupId> {
        let wanted = key(name, rtype);
        let script = self.script.borrow();
        let mut ids: Vec<_> = script
            .lookups
            .iter()
            .filter(|(_, query)| key(&query.name, query.rtype) == wanted)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn stopped(&self) -> Vec<LookupId> {
        self.script.borrow().stopped.clone()
    }

    pub fn publications(&self) -> Vec<Publication> {
        self.script.borrow().publications.values().cloned().collect()
    }

    pub fn attribute_updates(&self) -> Vec<BTreeMap<String, Vec<u8>>> {
        self.script.borrow().updates.clone()
    }

    /// Extra records added to publications, with the publication they belong to.
    pub fn extra_records(&self) -> Vec<(LookupId, NameRecord)> {
        self.script.borrow().extras.clone()
    }

    pub fn running_browses(&self) -> usize {
        self.script.borrow().browses.len()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn resolve_start(&mut self, id: LookupId, query: &Query) {
        let mut script = self.script.borrow_mut();
        script.queries.push(query.clone());
        // kept after a one-shot answer so that lookups_for() can find it
        script.lookups.insert(id, query.clone());
        if script.held.contains(&key(&query.name, query.rtype)) {
            return;
        }
        if let Some(event) = script.answer_event(id, query) {
            script.events.push_back(event);
        }
    }

    fn resolve_stop(&mut self, id: LookupId) {
        let mut script = self.script.borrow_mut();
        if let Some(query) = script.lookups.get_mut(&id) {
            query.long_lived = false;
        }
        script.stopped.push(id);
    }

    fn browse_start(&mut self, id: LookupId, service_type: &str, domain: &str) {
        self.script
            .borrow_mut()
            .browses
            .insert(id, (service_type.to_string(), domain.to_string()));
    }

    fn browse_stop(&mut self, id: LookupId) {
        let mut script = self.script.borrow_mut();
        script.browses.remove(&id);
        script.stopped.push(id);
    }

    fn publish_start(&mut self, id: LookupId, publication: &Publication) {
        self.script
            .borrow_mut()
            .publications
            .insert(id, publication.clone());
    }

    fn publish_update(&mut self, _id: LookupId, attributes: &BTreeMap<String, Vec<u8>>) {
        self.script.borrow_mut().updates.push(attributes.clone());
    }

    fn publish_extra(&mut self, id: LookupId, record: &NameRecord) {
        self.script.borrow_mut().extras.push((id, record.clone()));
    }

    fn publish_stop(&mut self, id: LookupId) {
        let mut script = self.script.borrow_mut();
        script.publications.remove(&id);
        script.stopped.push(id);
    }

    fn poll_event(&mut self) -> Option<ProviderEvent> {
        self.script.borrow_mut().events.pop_front()
    }
}

/// A session with `unicast` for wide-area names and no `local.` provider.
pub fn unicast_session(unicast: &ScriptedProvider) -> Session {
    Session::builder().with_unicast(unicast.clone()).build()
}

/// A session with both providers.
pub fn full_session(unicast: &ScriptedProvider, local: &ScriptedProvider) -> Session {
    Session::builder()
        .with_unicast(unicast.clone())
        .with_local(local.clone())
        .build()
}

pub fn srv(owner: &str, target: &str, port: u16, priority: u16, weight: u16) -> NameRecord {
    NameRecord::srv_record(owner, 300, target, port, priority, weight)
}

pub fn address(owner: &str, address: &str) -> NameRecord {
    match address.parse() {
        Ok(address) => NameRecord::address_record(owner, 300, address),
        Err(e) => panic!("bad address {}: {}", address, e),
    }
}
