//! Continuous DNS-SD enumeration of a service type.

use netnames_proto::error::BrowserError;
use netnames_proto::ServiceInstance;
use tracing::trace;

use crate::provider::{LookupId, ProviderEvent};
use crate::session::Session;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrowserEvent {
    InstanceAvailable(ServiceInstance),
    InstanceUnavailable(ServiceInstance),
    /// Ends the browse.
    Error(BrowserError),
}

/// Watches the instances of a service type appear and disappear.
pub struct ServiceBrowser {
    session: Session,
    browse: Option<LookupId>,
}

impl ServiceBrowser {
    /// Creates a browser on the thread's global session.
    pub fn new() -> Self {
        Self::with_session(&Session::global())
    }

    pub fn with_session(session: &Session) -> Self {
        Self {
            session: session.clone(),
            browse: None,
        }
    }

    /// Starts browsing for `service_type` (e.g. `"_ipp._tcp"`) in `domain`, which defaults to
    /// `local.`. A browse still running is stopped first.
    pub fn start(&mut self, service_type: &str, domain: Option<&str>) {
        self.stop();
        let domain = domain.unwrap_or("local");
        self.browse = Some(self.session.browse_start(service_type, domain));
    }

    /// Stops browsing. Nothing is reported afterwards.
    pub fn stop(&mut self) {
        if let Some(id) = self.browse.take() {
            self.session.stop(id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.browse.is_some()
    }

    pub fn poll_event(&mut self) -> Option<BrowserEvent> {
        let id = self.browse?;
        match self.session.next_event(id)? {
            ProviderEvent::BrowseAvailable(_, instance) => {
                Some(BrowserEvent::InstanceAvailable(instance))
            }
            ProviderEvent::BrowseUnavailable(_, instance) => {
                Some(BrowserEvent::InstanceUnavailable(instance))
            }
            ProviderEvent::BrowseError(_, error) => {
                self.stop();
                Some(BrowserEvent::Error(error))
            }
            other => {
                trace!("Browse {} got unrelated event {:?}", id, other);
                None
            }
        }
    }
}

impl Default for ServiceBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServiceBrowser {
    fn drop(&mut self) {
        self.stop();
    }
}
