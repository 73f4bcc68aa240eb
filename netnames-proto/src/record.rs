//! Definition of the [`NameRecord`] type and its [`RecordType`].

use std::fmt::{self, Display};
use std::net::IpAddr;

use data_encoding::HEXUPPER;
#[cfg(feature = "serde")]
use serde::Serialize;
use strum_macros::{Display as StrumDisplay, EnumString};

/// The record types a lookup can ask for.
///
/// See [here](https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4)
/// for the codes. [`RecordType::ANY`] only makes sense in a query; no [`NameRecord`] ever carries
/// it.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use netnames_proto::RecordType;
///
/// assert_eq!(RecordType::from_str("srv"), Ok(RecordType::SRV));
/// assert_eq!(RecordType::AAAA.to_string(), "AAAA");
/// assert_eq!(RecordType::from_code(33), Some(RecordType::SRV));
/// ```
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Copy, Clone, Hash, Debug, EnumString, StrumDisplay)]
#[strum(ascii_case_insensitive)]
pub enum RecordType {
    A,
    AAAA,
    MX,
    SRV,
    CNAME,
    PTR,
    TXT,
    HINFO,
    NS,
    NULL,
    ANY,
}

impl RecordType {
    /// Returns the type's IANA code.
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::NULL => 10,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::ANY => 255,
        }
    }

    /// Returns the type for an IANA code, or [`None`] if it is not one of the supported types.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            10 => RecordType::NULL,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            255 => RecordType::ANY,
            _ => return None,
        })
    }

    /// Whether this type carries a host address.
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::AAAA)
    }
}

/// The type-specific payload of a [`NameRecord`].
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Rdata {
    /// `A` or `AAAA`, depending on the address family.
    Address(IpAddr),
    MX { name: String, priority: u16 },
    SRV {
        name: String,
        port: u16,
        priority: u16,
        weight: u16,
    },
    CNAME(String),
    PTR(String),
    NS(String),
    TXT(Vec<Vec<u8>>),
    HINFO { cpu: Vec<u8>, os: Vec<u8> },
    NULL(Vec<u8>),
}

impl Rdata {
    /// The record type this payload belongs to.
    pub fn rtype(&self) -> RecordType {
        match self {
            Rdata::Address(IpAddr::V4(_)) => RecordType::A,
            Rdata::Address(IpAddr::V6(_)) => RecordType::AAAA,
            Rdata::MX { .. } => RecordType::MX,
            Rdata::SRV { .. } => RecordType::SRV,
            Rdata::CNAME(_) => RecordType::CNAME,
            Rdata::PTR(_) => RecordType::PTR,
            Rdata::NS(_) => RecordType::NS,
            Rdata::TXT(_) => RecordType::TXT,
            Rdata::HINFO { .. } => RecordType::HINFO,
            Rdata::NULL(_) => RecordType::NULL,
        }
    }
}

/// A single resource record as delivered by a lookup.
///
/// A `NameRecord` starts out *null* (see [`NameRecord::is_null()`]): it has no type and no payload.
/// One of the setters gives it a type. All accessors are soft: reading a field that the current
/// type does not have returns a neutral value instead of failing.
///
/// Note that a null record is something different from a record of type [`RecordType::NULL`].
///
/// # Examples
/// ```rust
/// use std::net::IpAddr;
/// use netnames_proto::{NameRecord, RecordType};
///
/// let mut record = NameRecord::new("jabber.org.", 300);
/// assert!(record.is_null());
///
/// record.set_address("2001:db8::1".parse::<IpAddr>().unwrap());
/// assert_eq!(record.rtype(), Some(RecordType::AAAA));
/// assert_eq!(record.port(), 0);
/// assert_eq!(record.name(), "");
/// ```
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct NameRecord {
    owner: String,
    ttl: u32,
    rdata: Option<Rdata>,
}

impl NameRecord {
    /// Creates a record for `owner` without a type. Use one of the setters to give it one.
    pub fn new(owner: impl Into<String>, ttl: u32) -> Self {
        Self {
            owner: owner.into(),
            ttl,
            rdata: None,
        }
    }

    /// Creates a record with the given payload.
    pub fn with_rdata(owner: impl Into<String>, ttl: u32, rdata: Rdata) -> Self {
        Self {
            owner: owner.into(),
            ttl,
            rdata: Some(rdata),
        }
    }

    /// Shortcut for an `A`/`AAAA` record.
    pub fn address_record(owner: impl Into<String>, ttl: u32, address: IpAddr) -> Self {
        Self::with_rdata(owner, ttl, Rdata::Address(address))
    }

    /// Shortcut for an `SRV` record.
    pub fn srv_record(
        owner: impl Into<String>,
        ttl: u32,
        target: impl Into<String>,
        port: u16,
        priority: u16,
        weight: u16,
    ) -> Self {
        Self::with_rdata(
            owner,
            ttl,
            Rdata::SRV {
                name: target.into(),
                port,
                priority,
                weight,
            },
        )
    }

    /// Whether this record has no type yet.
    pub fn is_null(&self) -> bool {
        self.rdata.is_none()
    }

    /// Whether this record announces the removal of a previously reported record. Only meaningful
    /// for results of long-lived lookups.
    pub fn is_withdrawn(&self) -> bool {
        self.ttl == 0
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// The record's type, [`None`] for a null record.
    pub fn rtype(&self) -> Option<RecordType> {
        self.rdata.as_ref().map(Rdata::rtype)
    }

    pub fn rdata(&self) -> Option<&Rdata> {
        self.rdata.as_ref()
    }

    /// The address of an `A`/`AAAA` record.
    pub fn address(&self) -> Option<IpAddr> {
        match &self.rdata {
            Some(Rdata::Address(address)) => Some(*address),
            _ => None,
        }
    }

    /// The target name of an `MX`, `SRV`, `CNAME`, `PTR` or `NS` record, `""` otherwise.
    pub fn name(&self) -> &str {
        match &self.rdata {
            Some(Rdata::MX { name, .. })
            | Some(Rdata::SRV { name, .. })
            | Some(Rdata::CNAME(name))
            | Some(Rdata::PTR(name))
            | Some(Rdata::NS(name)) => name,
            _ => "",
        }
    }

    /// The priority of an `MX` or `SRV` record, 0 otherwise.
    pub fn priority(&self) -> u16 {
        match &self.rdata {
            Some(Rdata::MX { priority, .. }) | Some(Rdata::SRV { priority, .. }) => *priority,
            _ => 0,
        }
    }

    /// The weight of an `SRV` record, 0 otherwise.
    pub fn weight(&self) -> u16 {
        match &self.rdata {
            Some(Rdata::SRV { weight, .. }) => *weight,
            _ => 0,
        }
    }

    /// The port of an `SRV` record, 0 otherwise.
    pub fn port(&self) -> u16 {
        match &self.rdata {
            Some(Rdata::SRV { port, .. }) => *port,
            _ => 0,
        }
    }

    pub fn texts(&self) -> &[Vec<u8>] {
        match &self.rdata {
            Some(Rdata::TXT(texts)) => texts,
            _ => &[],
        }
    }

    pub fn cpu(&self) -> &[u8] {
        match &self.rdata {
            Some(Rdata::HINFO { cpu, .. }) => cpu,
            _ => &[],
        }
    }

    pub fn os(&self) -> &[u8] {
        match &self.rdata {
            Some(Rdata::HINFO { os, .. }) => os,
            _ => &[],
        }
    }

    /// The payload of a `NULL` record.
    pub fn raw_data(&self) -> &[u8] {
        match &self.rdata {
            Some(Rdata::NULL(data)) => data,
            _ => &[],
        }
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }

    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    /// Makes this an `A` or `AAAA` record, depending on the family of `address`.
    pub fn set_address(&mut self, address: IpAddr) {
        self.rdata = Some(Rdata::Address(address));
    }

    pub fn set_mx(&mut self, name: impl Into<String>, priority: u16) {
        self.rdata = Some(Rdata::MX {
            name: name.into(),
            priority,
        });
    }

    pub fn set_srv(&mut self, name: impl Into<String>, port: u16, priority: u16, weight: u16) {
        self.rdata = Some(Rdata::SRV {
            name: name.into(),
            port,
            priority,
            weight,
        });
    }

    pub fn set_cname(&mut self, name: impl Into<String>) {
        self.rdata = Some(Rdata::CNAME(name.into()));
    }

    pub fn set_ptr(&mut self, name: impl Into<String>) {
        self.rdata = Some(Rdata::PTR(name.into()));
    }

    pub fn set_txt(&mut self, texts: Vec<Vec<u8>>) {
        self.rdata = Some(Rdata::TXT(texts));
    }

    pub fn set_hinfo(&mut self, cpu: impl Into<Vec<u8>>, os: impl Into<Vec<u8>>) {
        self.rdata = Some(Rdata::HINFO {
            cpu: cpu.into(),
            os: os.into(),
        });
    }

    pub fn set_ns(&mut self, name: impl Into<String>) {
        self.rdata = Some(Rdata::NS(name.into()));
    }

    pub fn set_null(&mut self, data: impl Into<Vec<u8>>) {
        self.rdata = Some(Rdata::NULL(data.into()));
    }
}

fn quoted(text: &[u8]) -> String {
    // quotes inside the string must be escaped if we print it quoted
    let text = String::from_utf8_lossy(text).replace('"', "\\\"");
    format!("\"{}\"", text)
}

impl Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rdata::Address(address) => write!(f, "{}", address),
            Rdata::MX { name, priority } => write!(f, "{} {}", priority, name),
            Rdata::SRV {
                name,
                port,
                priority,
                weight,
            } => write!(f, "{} {} {} {}", priority, weight, port, name),
            Rdata::CNAME(name) | Rdata::PTR(name) | Rdata::NS(name) => write!(f, "{}", name),
            Rdata::TXT(texts) => {
                let texts: Vec<_> = texts.iter().map(|t| quoted(t)).collect();
                write!(f, "{}", texts.join(" "))
            }
            Rdata::HINFO { cpu, os } => write!(f, "{} {}", quoted(cpu), quoted(os)),
            // generic RDATA encoding, see RFC 3597, Section 5
            Rdata::NULL(data) => write!(f, "\\# {} {}", data.len(), HEXUPPER.encode(data)),
        }
    }
}

impl Display for NameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rdata {
            Some(rdata) => write!(f, "{} {} {} {}", self.owner, self.ttl, rdata.rtype(), rdata),
            None => write!(f, "{} {} <null>", self.owner, self.ttl),
        }
    }
}
