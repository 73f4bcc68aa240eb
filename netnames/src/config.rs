//! Configuration of the providers a [`Session`](crate::session::Session) is built from.

use std::fmt::Display;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use resolv_conf::ScopedIp;
use tracing::{debug, warn};

const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Per-attempt timeout when nothing else is configured, as with `resolv.conf`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ATTEMPTS: u32 = 2;
/// Advertised EDNS payload size.
pub const DEFAULT_BUFSIZE: u16 = 4096; // seems reasonable
/// How long a one-shot lookup in `local.` waits for an answer.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(3);

/// How queries are sent to a unicast nameserver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    /// UDP, retried over TCP if the answer is truncated.
    Udp,
    Tcp,
}

/// The address of a unicast nameserver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nameserver {
    pub ip: IpAddr,
    pub port: u16,
}

impl Nameserver {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl Display for Nameserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // display mapped IPv4 addresses as plain IPv4 addresses
        let ip = match self.ip {
            IpAddr::V6(ipv6) => match ipv6.to_ipv4() {
                Some(ipv4) if ipv4.to_ipv6_mapped() == ipv6 => ipv4.to_string(),
                _ => format!("[{}]", ipv6),
            },
            ip => ip.to_string(),
        };
        write!(f, "{}:{}", ip, self.port)
    }
}

/// Configuration of the unicast DNS provider.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use netnames::config::{ConnectionType, Nameserver, ResolverConfig};
///
/// let config = ResolverConfig::default()
///     .with_nameservers(vec![Nameserver::new("192.0.2.53".parse().unwrap(), 53)])
///     .with_timeout(Duration::from_secs(2))
///     .with_connection_type(ConnectionType::Tcp);
/// assert_eq!(config.attempts, 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Nameservers, tried in order (see [`Self::rotate`]).
    ///
    /// Default: `127.0.0.1:53`
    pub nameservers: Vec<Nameserver>,

    /// How long to wait for a single nameserver to answer.
    ///
    /// Default: 5 seconds
    pub timeout: Duration,

    /// How many times the whole nameserver list is tried before giving up.
    ///
    /// Default: 2
    pub attempts: u32,

    /// Start every query at a random nameserver instead of the first one.
    ///
    /// Default: false
    pub rotate: bool,

    /// Default: [`ConnectionType::Udp`]
    pub connection_type: ConnectionType,

    /// EDNS payload size advertised to the nameserver.
    ///
    /// Default: 4096
    pub bufsize: u16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            nameservers: vec![Nameserver::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 53)],
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            rotate: false,
            connection_type: ConnectionType::Udp,
            bufsize: DEFAULT_BUFSIZE,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the system configuration from `/etc/resolv.conf`, falling back to the defaults if the
    /// file is missing or cannot be parsed.
    pub fn from_system() -> Self {
        match fs::read(RESOLV_CONF) {
            Ok(bytes) => Self::from_resolv_conf(&bytes).unwrap_or_else(|e| {
                warn!("Could not parse {}: {}", RESOLV_CONF, e);
                Self::default()
            }),
            Err(e) => {
                debug!("Could not read {}: {}", RESOLV_CONF, e);
                Self::default()
            }
        }
    }

    /// Builds a configuration from the contents of a `resolv.conf` file.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use netnames::config::ResolverConfig;
    ///
    /// let conf = b"nameserver 192.0.2.1\nnameserver 2001:db8::1\noptions timeout:1 attempts:3 rotate\n";
    /// let config = ResolverConfig::from_resolv_conf(conf).unwrap();
    /// assert_eq!(config.nameservers.len(), 2);
    /// assert_eq!(config.timeout, Duration::from_secs(1));
    /// assert_eq!(config.attempts, 3);
    /// assert!(config.rotate);
    /// ```
    pub fn from_resolv_conf(bytes: &[u8]) -> Result<Self, resolv_conf::ParseError> {
        let parsed = resolv_conf::Config::parse(bytes)?;
        let mut config = Self::default();

        let nameservers: Vec<_> = parsed
            .nameservers
            .iter()
            .map(|ip| {
                let ip = match ip {
                    ScopedIp::V4(ip) => IpAddr::V4(*ip),
                    ScopedIp::V6(ip, _) => IpAddr::V6(*ip),
                };
                Nameserver::new(ip, 53)
            })
            .collect();
        if !nameservers.is_empty() {
            config.nameservers = nameservers;
        }
        config.timeout = Duration::from_secs(parsed.timeout.max(1) as u64);
        config.attempts = parsed.attempts.max(1);
        config.rotate = parsed.rotate;
        Ok(config)
    }

    pub fn with_nameservers(mut self, nameservers: Vec<Nameserver>) -> Self {
        self.nameservers = nameservers;
        self
    }

    /// Sets the port of every configured nameserver.
    pub fn with_port(mut self, port: u16) -> Self {
        for nameserver in &mut self.nameservers {
            nameserver.port = port;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A value of zero is treated as one attempt.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_rotate(mut self, rotate: bool) -> Self {
        self.rotate = rotate;
        self
    }

    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    pub fn with_bufsize(mut self, bufsize: u16) -> Self {
        self.bufsize = bufsize;
        self
    }
}

/// Configuration of the multicast DNS provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdnsConfig {
    /// Maximum time a single (not long-lived) lookup in `local.` waits for an answer before
    /// failing with [`ResolverError::NoName`](netnames_proto::error::ResolverError::NoName).
    ///
    /// Default: 3 seconds
    pub query_timeout: Duration,

    /// Host name (without `.local.`) announced for published services.
    ///
    /// Default: None, i.e. the system's host name
    pub host_name: Option<String>,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_LOCAL_TIMEOUT,
            host_name: None,
        }
    }
}

impl MdnsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }
}
