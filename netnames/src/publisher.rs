//! Announcing a service on the local network via DNS-SD.

use std::collections::BTreeMap;

use netnames_proto::error::PublisherError;
use netnames_proto::NameRecord;
use tracing::{debug, trace};

use crate::provider::{LookupId, ProviderEvent, Publication};
use crate::session::Session;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublisherEvent {
    Published,
    /// Ends the publication.
    Error(PublisherError),
}

/// Publishes one service instance in `local.` until cancelled or dropped.
pub struct ServiceLocalPublisher {
    session: Session,
    publication: Option<LookupId>,
}

impl ServiceLocalPublisher {
    /// Creates a publisher on the thread's global session.
    pub fn new() -> Self {
        Self::with_session(&Session::global())
    }

    pub fn with_session(session: &Session) -> Self {
        Self {
            session: session.clone(),
            publication: None,
        }
    }

    /// Starts publishing `instance` of `service_type` (e.g. `"_ipp._tcp"`) on `port`. A publication
    /// still running is cancelled first.
    pub fn publish(
        &mut self,
        instance: &str,
        service_type: &str,
        port: u16,
        attributes: BTreeMap<String, Vec<u8>>,
    ) {
        self.cancel();
        let publication = Publication {
            instance: instance.to_string(),
            service_type: service_type.to_string(),
            port,
            attributes,
        };
        self.publication = Some(self.session.publish_start(&publication));
    }

    /// Replaces the attributes (i.e. the `TXT` record) of the published instance.
    pub fn update_attributes(&mut self, attributes: BTreeMap<String, Vec<u8>>) {
        match self.publication {
            Some(id) => self.session.publish_update(id, &attributes),
            None => debug!("Ignoring attribute update, nothing is published."),
        }
    }

    /// Publishes an extra record alongside the instance.
    pub fn add_record(&mut self, record: &NameRecord) {
        match self.publication {
            Some(id) => self.session.publish_extra(id, record),
            None => debug!("Ignoring extra record, nothing is published."),
        }
    }

    /// Withdraws the instance. Nothing is reported afterwards.
    pub fn cancel(&mut self) {
        if let Some(id) = self.publication.take() {
            self.session.stop(id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.publication.is_some()
    }

    pub fn poll_event(&mut self) -> Option<PublisherEvent> {
        let id = self.publication?;
        match self.session.next_event(id)? {
            ProviderEvent::Published(_) => Some(PublisherEvent::Published),
            ProviderEvent::PublishError(_, error) => {
                self.cancel();
                Some(PublisherEvent::Error(error))
            }
            other => {
                trace!("Publication {} got unrelated event {:?}", id, other);
                None
            }
        }
    }
}

impl Default for ServiceLocalPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServiceLocalPublisher {
    fn drop(&mut self) {
        self.cancel();
    }
}
