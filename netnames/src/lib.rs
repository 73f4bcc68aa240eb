//! `netnames` resolves names and services without blocking the caller.
//!
//! Every object ([`NameResolver`], [`ServiceBrowser`], [`ServiceResolver`],
//! [`ServiceLocalPublisher`]) starts its work right away and reports the outcome through
//! `poll_event()`, to be called from the application's event loop. The network work itself is
//! done by the [providers](provider) of a [`Session`]: unicast DNS for wide-area names and, with
//! the `mdns` feature, multicast DNS and DNS-SD for `local.`.
//!
//! # Basic usage example
//! ```rust,no_run
//! use netnames::{ServiceResolver, ServiceResolverEvent};
//!
//! let mut resolver = ServiceResolver::new();
//! resolver.start_service("imaps", "tcp", "example.com", Some(993));
//! while let Some(event) = resolver.poll_event() {
//!     if let ServiceResolverEvent::ResultReady { address, port, hostname } = event {
//!         println!("{} ({}) port {}", address, hostname, port);
//!     }
//! }
//! netnames::cleanup();
//! ```

pub mod browser;
pub mod config;
#[cfg(feature = "mdns")]
pub mod mdns;
pub mod provider;
pub mod publisher;
pub mod resolver;
pub mod service_resolver;
pub mod session;
pub mod unicast;

pub use browser::{BrowserEvent, ServiceBrowser};
pub use publisher::{PublisherEvent, ServiceLocalPublisher};
pub use resolver::{Mode, NameResolver, ResolverEvent};
pub use service_resolver::{ProtoSplit, Protocol, ServiceResolver, ServiceResolverEvent};
pub use session::{cleanup, diagnostic_text, Session};
