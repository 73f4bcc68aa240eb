//! `netnames-proto` provides the value types of the `netnames` name resolution layer: resource
//! records as delivered by lookups, the priority/weight ordered candidate list used to walk `SRV`
//! targets, DNS-SD service instances, and the error types every asynchronous object reports.
//!
//! Nothing in this crate performs I/O. The resolvers, browsers and publishers that produce and
//! consume these types live in [`netnames`].
//!
//! # Basic usage example
//! ```rust
//! use netnames_proto::{NameRecord, RecordType, WeightedNameRecordList};
//!
//! let mut candidates = WeightedNameRecordList::new();
//! candidates.append(NameRecord::srv_record("_xmpp-client._tcp.example.", 300, "a.example.", 5222, 5, 0));
//! candidates.append(NameRecord::srv_record("_xmpp-client._tcp.example.", 300, "b.example.", 5222, 10, 0));
//! candidates.append_host("example.", 5222);
//!
//! let first = candidates.take_next().unwrap();
//! assert_eq!(first.rtype(), Some(RecordType::SRV));
//! assert_eq!(first.name(), "a.example.");
//! ```
//!
//! [`netnames`]: https://docs.rs/netnames

pub mod error;
pub mod name;
pub mod record;
pub mod service;
pub mod weighted;

pub use record::{NameRecord, Rdata, RecordType};
pub use service::ServiceInstance;
pub use weighted::WeightedNameRecordList;
