//! Asynchronous lookup of a single name.

use netnames_proto::error::ResolverError;
use netnames_proto::{NameRecord, RecordType};
use tracing::trace;

use crate::provider::{LookupId, ProviderEvent};
use crate::session::Session;

/// Whether a lookup ends with its first answer or keeps reporting changes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    /// Finish after the first set of results.
    #[default]
    Single,
    /// Stay active and report every addition, and every removal as a record with TTL 0, until
    /// stopped. Only available where the provider supports it, i.e. in `local.`.
    LongLived,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Active,
    Finished,
    Failed,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolverEvent {
    ResultsReady(Vec<NameRecord>),
    /// Always the last event of a lookup.
    Error(ResolverError),
}

/// Looks up the records of one name and type.
///
/// [`NameResolver::start()`] returns right away; the outcome is collected with
/// [`NameResolver::poll_event()`], typically from the application's event loop. Even failures that
/// are known immediately (e.g. no provider for `local.`) are only reported through `poll_event()`.
///
/// # Example
///
/// ```rust,no_run
/// use netnames::resolver::{Mode, NameResolver, ResolverEvent};
/// use netnames_proto::RecordType;
///
/// let mut resolver = NameResolver::new();
/// resolver.start("example.com", RecordType::AAAA, Mode::Single);
/// loop {
///     match resolver.poll_event() {
///         Some(ResolverEvent::ResultsReady(records)) => {
///             for record in records {
///                 println!("{}", record);
///             }
///             break;
///         }
///         Some(ResolverEvent::Error(e)) => {
///             eprintln!("{}", e);
///             break;
///         }
///         None => std::thread::sleep(std::time::Duration::from_millis(10)),
///     }
/// }
/// ```
pub struct NameResolver {
    session: Session,
    lookup: Option<LookupId>,
    mode: Mode,
    state: ResolverState,
}

impl NameResolver {
    /// Creates a resolver on the thread's global session.
    pub fn new() -> Self {
        Self::with_session(&Session::global())
    }

    pub fn with_session(session: &Session) -> Self {
        Self {
            session: session.clone(),
            lookup: None,
            mode: Mode::Single,
            state: ResolverState::Idle,
        }
    }

    /// Starts looking up `name`. A lookup still running is stopped first.
    ///
    /// `name` may be given with or without the trailing dot.
    pub fn start(&mut self, name: &str, rtype: RecordType, mode: Mode) {
        self.stop();
        self.mode = mode;
        self.lookup = Some(
            self.session
                .resolve_start(name, rtype, mode == Mode::LongLived),
        );
        self.state = ResolverState::Active;
    }

    /// Stops the lookup. Nothing is reported for it afterwards. Does nothing if no lookup is
    /// active.
    pub fn stop(&mut self) {
        if let Some(id) = self.lookup.take() {
            self.session.stop(id);
            if self.state == ResolverState::Active {
                self.state = ResolverState::Stopped;
            }
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.state == ResolverState::Active
    }

    /// Returns the next outcome of the active lookup, if one is ready.
    pub fn poll_event(&mut self) -> Option<ResolverEvent> {
        let id = self.lookup?;
        match self.session.next_event(id)? {
            ProviderEvent::ResolveResults(_, records) => {
                trace!("Lookup {}: {} record(s)", id, records.len());
                if self.mode == Mode::Single {
                    self.session.stop(id);
                    self.lookup = None;
                    self.state = ResolverState::Finished;
                }
                Some(ResolverEvent::ResultsReady(records))
            }
            ProviderEvent::ResolveError(_, error) => {
                trace!("Lookup {} failed: {}", id, error);
                self.session.stop(id);
                self.lookup = None;
                self.state = ResolverState::Failed;
                Some(ResolverEvent::Error(error))
            }
            other => {
                trace!("Lookup {} got unrelated event {:?}", id, other);
                None
            }
        }
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NameResolver {
    fn drop(&mut self) {
        self.stop();
    }
}
