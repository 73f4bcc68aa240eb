//! Unicast DNS, i.e. actually sending queries to nameservers and receiving answers.
//!
//! Every lookup runs on its own worker thread, which sends the outcome back over a channel. The
//! provider's [`poll_event()`](Provider::poll_event) drains that channel on the caller's thread.

use std::collections::{HashSet, VecDeque};
use std::io::{self, Cursor, Read, Write};
use std::net::{IpAddr, TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use byteorder::{NetworkEndian, WriteBytesExt};
use netnames_proto::error::ResolverError;
use netnames_proto::name::normalize;
use netnames_proto::{NameRecord, Rdata, RecordType};
use rand::Rng;
use toluol_proto::error::ParseError;
use toluol_proto::{
    EdnsConfig, HeaderFlags, Message, Name, NonOptRecord, Opcode, RCode,
    Rdata as WireRdata, RecordType as WireType,
};
use tracing::{debug, trace, warn};

use crate::config::{ConnectionType, Nameserver, ResolverConfig};
use crate::provider::{Capabilities, LookupId, Provider, ProviderEvent, Query};

const WRITE_TIMEOUT: Duration = Duration::new(2, 0);

/// Resolves names by querying the configured nameservers.
pub struct UnicastProvider {
    config: ResolverConfig,
    tx: flume::Sender<ProviderEvent>,
    rx: flume::Receiver<ProviderEvent>,
    notes_tx: flume::Sender<String>,
    notes_rx: flume::Receiver<String>,
    // outcomes that did not need a worker thread
    pending: VecDeque<ProviderEvent>,
    // lookups whose worker has not reported yet
    running: HashSet<LookupId>,
}

impl UnicastProvider {
    pub fn new(config: ResolverConfig) -> Self {
        let (tx, rx) = flume::unbounded();
        let (notes_tx, notes_rx) = flume::unbounded();
        Self {
            config,
            tx,
            rx,
            notes_tx,
            notes_rx,
            pending: VecDeque::new(),
            running: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}

impl Provider for UnicastProvider {
    fn name(&self) -> &str {
        "unicast"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            single: true,
            ..Default::default()
        }
    }

    fn resolve_start(&mut self, id: LookupId, query: &Query) {
        let config = self.config.clone();
        let query = query.clone();
        let tx = self.tx.clone();
        let notes = self.notes_tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("netnames-lookup-{}", id))
            .spawn(move || {
                let event = match lookup(&config, &query, &notes) {
                    Ok(records) => ProviderEvent::ResolveResults(id, records),
                    Err(e) => ProviderEvent::ResolveError(id, e),
                };
                // the receiver is gone if the provider was dropped in the meantime
                let _ = tx.send(event);
            });
        match spawned {
            Ok(_) => {
                self.running.insert(id);
            }
            Err(e) => {
                warn!("Could not spawn lookup thread: {}", e);
                self.pending
                    .push_back(ProviderEvent::ResolveError(id, ResolverError::Generic));
            }
        }
    }

    fn resolve_stop(&mut self, id: LookupId) {
        self.running.remove(&id);
        self.pending.retain(|event| event.id() != id);
    }

    fn poll_event(&mut self) -> Option<ProviderEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        while let Ok(event) = self.rx.try_recv() {
            if !self.running.remove(&event.id()) {
                trace!("Discarding answer of stopped lookup {}", event.id());
                continue;
            }
            return Some(event);
        }
        None
    }

    fn take_diagnostics(&mut self) -> Vec<String> {
        self.notes_rx.try_iter().collect()
    }
}

/// Performs a complete lookup: tries every nameserver `config.attempts` times until one of them
/// gives a usable answer.
pub fn lookup(
    config: &ResolverConfig,
    query: &Query,
    notes: &flume::Sender<String>,
) -> std::result::Result<Vec<NameRecord>, ResolverError> {
    let (msg_id, data) = prepare_query(query, config.bufsize).map_err(|e| {
        let _ = notes.send(format!("{}: {:#}", query.name, e));
        ResolverError::Generic
    })?;

    let mut order: Vec<&Nameserver> = config.nameservers.iter().collect();
    if config.rotate && !order.is_empty() {
        let start = rand::thread_rng().gen_range(0..order.len());
        order.rotate_left(start);
    }

    let mut last_error = ResolverError::Generic;
    for attempt in 0..config.attempts.max(1) {
        for nameserver in &order {
            let answer = match exchange(config, nameserver, msg_id, &data) {
                Ok(answer) => answer,
                Err(e) => {
                    debug!(
                        "{} {} via {} (attempt {}): {:#}",
                        query.name,
                        query.rtype,
                        nameserver,
                        attempt + 1,
                        e
                    );
                    let _ = notes.send(format!("{}: {:#}", nameserver, e));
                    last_error = if is_timeout(&e) {
                        ResolverError::Timeout
                    } else {
                        ResolverError::Generic
                    };
                    continue;
                }
            };

            match answer.header.rcode {
                Some(RCode::SERVFAIL) | Some(RCode::REFUSED) | Some(RCode::NOTIMP) => {
                    debug!("{} answered {:?} for {}", nameserver, answer.header.rcode, query.name);
                    last_error = ResolverError::Generic;
                    continue;
                }
                _ => return interpret(&answer, query),
            }
        }
    }
    Err(last_error)
}

/// Encodes the query, returning its message id along with the encoded bytes.
fn prepare_query(query: &Query, bufsize: u16) -> Result<(u16, Vec<u8>)> {
    let name = Name::from_ascii(&query.name).context("Invalid query name.")?;
    let flags = HeaderFlags {
        aa: false,
        tc: false,
        rd: true,
        ra: false,
        ad: false,
        cd: false,
    };
    let msg = Message::new_query(
        name,
        WireType::from(query.rtype.code()),
        Opcode::QUERY,
        flags,
        Some(EdnsConfig {
            do_flag: false,
            bufsize,
            client_cookie: None,
        }),
    )
    .context("Could not create query.")?;
    let data = msg.encode().context("Could not encode query.")?;
    Ok((msg.header.msg_id, data))
}

/// Sends the query to one nameserver and parses the answer, retrying over TCP if a UDP answer is
/// truncated.
fn exchange(
    config: &ResolverConfig,
    nameserver: &Nameserver,
    msg_id: u16,
    data: &[u8],
) -> Result<Message> {
    let answer = match config.connection_type {
        ConnectionType::Udp => {
            let answer = send_query_udp(nameserver, config.bufsize, config.timeout, data)?;
            match Message::parse(&mut Cursor::new(&answer)) {
                Err(ParseError::TruncatedMessage) => {
                    debug!("Truncated answer from {}, retrying via TCP.", nameserver);
                    let answer = send_query_tcp(nameserver, config.timeout, data)?;
                    Message::parse(&mut Cursor::new(&answer))
                }
                res => res,
            }
        }
        ConnectionType::Tcp => {
            let answer = send_query_tcp(nameserver, config.timeout, data)?;
            Message::parse(&mut Cursor::new(&answer))
        }
    }
    .context("Could not parse answer.")?;

    if answer.header.msg_id != msg_id {
        bail!(
            "Answer has message id {}, but the query had {}.",
            answer.header.msg_id,
            msg_id
        );
    }
    Ok(answer)
}

fn is_timeout(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause.downcast_ref::<io::Error>().map_or(false, |e| {
            matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        })
    })
}

/// Turns an answer into the records matching the query.
fn interpret(
    answer: &Message,
    query: &Query,
) -> std::result::Result<Vec<NameRecord>, ResolverError> {
    if answer.header.rcode == Some(RCode::NXDOMAIN) {
        return Err(ResolverError::NoName);
    }

    let records: Vec<_> = answer
        .answers
        .iter()
        .filter_map(|record| record.as_nonopt())
        .filter_map(record_from_wire)
        .filter(|record| query.rtype == RecordType::ANY || record.rtype() == Some(query.rtype))
        .collect();

    if records.is_empty() {
        // NODATA: the name exists, but not with this type
        Err(ResolverError::NoName)
    } else {
        Ok(records)
    }
}

fn absolute(name: &Name) -> String {
    normalize(&name.to_string())
}

/// Converts a record from its wire representation. Returns [`None`] for record types that have no
/// [`NameRecord`] counterpart.
pub fn record_from_wire(record: &NonOptRecord) -> Option<NameRecord> {
    let rdata = match record.rdata() {
        WireRdata::A(a) => Rdata::Address(IpAddr::V4(a.address)),
        WireRdata::AAAA(aaaa) => Rdata::Address(IpAddr::V6(aaaa.address)),
        WireRdata::MX(mx) => Rdata::MX {
            name: absolute(&mx.exchange),
            priority: mx.preference as u16,
        },
        WireRdata::SRV(srv) => Rdata::SRV {
            name: absolute(&srv.target),
            port: srv.port,
            priority: srv.priority,
            weight: srv.weight,
        },
        WireRdata::CNAME(cname) => Rdata::CNAME(normalize(&cname.to_string())),
        WireRdata::PTR(ptr) => Rdata::PTR(absolute(&ptr.location)),
        WireRdata::NS(ns) => Rdata::NS(absolute(&ns.name)),
        WireRdata::TXT(txt) => Rdata::TXT(txt.text.iter().map(|s| s.as_bytes().to_vec()).collect()),
        WireRdata::HINFO(hinfo) => Rdata::HINFO {
            cpu: hinfo.cpu.as_bytes().to_vec(),
            os: hinfo.os.as_bytes().to_vec(),
        },
        WireRdata::Unknown(data) if record.rtype == WireType::from(RecordType::NULL.code()) => {
            Rdata::NULL(data.clone())
        }
        _ => return None,
    };
    Some(NameRecord::with_rdata(
        absolute(&record.owner),
        record.ttl,
        rdata,
    ))
}

pub fn send_query_udp(
    nameserver: &Nameserver,
    bufsize: u16,
    timeout: Duration,
    data: &[u8],
) -> Result<Vec<u8>> {
    // bind to the nameserver's address family, binding to :: and connecting to an IPv4 address
    // fails on some systems
    let bind_addr = if nameserver.ip.is_ipv6() { "::" } else { "0.0.0.0" };
    let socket = UdpSocket::bind((bind_addr, 0)).context("Could not create UDP socket.")?;
    let mut res = vec![0; bufsize as usize]; // the query sets this as max size

    socket
        .set_write_timeout(Some(WRITE_TIMEOUT))
        .context("Could not set UDP socket write timeout.")?;
    socket
        .set_read_timeout(Some(timeout))
        .context("Could not set UDP socket read timeout.")?;

    socket
        .connect(nameserver.socket_addr())
        .context(format!("Could not connect to {} via UDP.", nameserver))?;

    socket
        .send(data)
        .context("Could not send data to nameserver.")?;

    let bytes_recvd = socket
        .recv(&mut res)
        .context("The nameserver did not reply in time.")?;

    res.truncate(bytes_recvd);
    Ok(res)
}

pub fn send_query_tcp(nameserver: &Nameserver, timeout: Duration, data: &[u8]) -> Result<Vec<u8>> {
    let mut socket = TcpStream::connect_timeout(&nameserver.socket_addr(), timeout).context(
        format!("Could not connect to {} via TCP, is the server running?", nameserver),
    )?;

    socket
        .set_write_timeout(Some(WRITE_TIMEOUT))
        .context("Could not set TCP stream write timeout.")?;
    socket
        .set_read_timeout(Some(timeout))
        .context("Could not set TCP stream read timeout.")?;

    let mut msg = Vec::with_capacity(data.len() + 2);
    msg.write_u16::<NetworkEndian>(data.len() as u16)?;
    msg.extend_from_slice(data);

    socket
        .write_all(&msg)
        .context("Could not write data to TCP stream.")?;

    // read_to_end() would wait for the read timeout before seeing EOF, so stop reading as soon as
    // the length prefix says the message is complete (see RFC 1035, Section 4.2.2)
    let mut len = [0; 2];
    socket
        .read_exact(&mut len)
        .context("Could not read from TCP stream.")?;
    let expected = u16::from_be_bytes(len) as usize;
    let mut res = vec![0; expected];
    socket
        .read_exact(&mut res)
        .context(format!("Could not read {} bytes from TCP stream.", expected))?;

    socket.shutdown(std::net::Shutdown::Both).ok();

    if res.is_empty() {
        return Err(anyhow!("Received an empty message via TCP."));
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, UdpSocket};
    use std::thread;
    use std::time::{Duration, Instant};

    use netnames_proto::error::ResolverError;
    use netnames_proto::RecordType;

    use super::UnicastProvider;
    use crate::config::{Nameserver, ResolverConfig};
    use crate::provider::{Provider, ProviderEvent, Query};

    // the query ends with an OPT record without options: root name, type, class, ttl, rdlength
    const OPT_LEN: usize = 11;

    /// Answers one query. The answer echoes the question and carries `rcode` and, if given, a
    /// single `A` record pointing back at the question's name.
    fn fake_nameserver(
        rcode: u8,
        address: Option<Ipv4Addr>,
    ) -> (Nameserver, thread::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0; 512];
            let (len, peer) = socket.recv_from(&mut buf).unwrap();
            let query = &buf[..len];

            let mut answer = Vec::new();
            answer.extend_from_slice(&query[..2]); // id
            answer.push(0x81); // QR, RD
            answer.push(0x80 | rcode); // RA
            answer.extend_from_slice(&[0, 1]); // QDCOUNT
            answer.extend_from_slice(&[0, address.is_some() as u8]); // ANCOUNT
            answer.extend_from_slice(&[0, 0, 0, 0]); // NSCOUNT, ARCOUNT
            answer.extend_from_slice(&query[12..len - OPT_LEN]);
            if let Some(address) = address {
                answer.extend_from_slice(&[0xc0, 12, 0, 1, 0, 1, 0, 0, 1, 44, 0, 4]);
                answer.extend_from_slice(&address.octets());
            }
            socket.send_to(&answer, peer).unwrap();
        });
        (Nameserver::new(addr.ip(), addr.port()), handle)
    }

    fn wait_for_event(provider: &mut UnicastProvider) -> ProviderEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = provider.poll_event() {
                return event;
            }
            assert!(Instant::now() < deadline, "no answer from provider");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn query(name: &str) -> Query {
        Query {
            name: name.to_string(),
            rtype: RecordType::A,
            long_lived: false,
        }
    }

    #[test]
    fn resolves_a_record() {
        let (nameserver, server) = fake_nameserver(0, Some(Ipv4Addr::new(192, 0, 2, 10)));
        let mut provider =
            UnicastProvider::new(ResolverConfig::default().with_nameservers(vec![nameserver]));

        provider.resolve_start(1, &query("example.com."));
        match wait_for_event(&mut provider) {
            ProviderEvent::ResolveResults(1, records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].owner(), "example.com.");
                assert_eq!(records[0].ttl(), 300);
                assert_eq!(records[0].address(), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))));
            }
            other => panic!("unexpected event {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn nxdomain_is_no_name() {
        let (nameserver, server) = fake_nameserver(3, None);
        let mut provider =
            UnicastProvider::new(ResolverConfig::default().with_nameservers(vec![nameserver]));

        provider.resolve_start(7, &query("missing.example."));
        assert_eq!(
            wait_for_event(&mut provider),
            ProviderEvent::ResolveError(7, ResolverError::NoName)
        );
        server.join().unwrap();
    }

    #[test]
    fn silent_nameserver_times_out() {
        // bound but never answering
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let config = ResolverConfig::default()
            .with_nameservers(vec![Nameserver::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)])
            .with_timeout(Duration::from_millis(100))
            .with_attempts(1);
        let mut provider = UnicastProvider::new(config);

        provider.resolve_start(3, &query("example.com."));
        assert_eq!(
            wait_for_event(&mut provider),
            ProviderEvent::ResolveError(3, ResolverError::Timeout)
        );
        assert!(!provider.take_diagnostics().is_empty());
        drop(silent);
    }

    #[test]
    fn stopped_lookup_is_not_reported() {
        let (nameserver, server) = fake_nameserver(0, Some(Ipv4Addr::new(192, 0, 2, 10)));
        let mut provider =
            UnicastProvider::new(ResolverConfig::default().with_nameservers(vec![nameserver]));

        provider.resolve_start(1, &query("example.com."));
        provider.resolve_stop(1);
        server.join().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(provider.poll_event(), None);
    }
}
