use std::cmp::max;
use std::net::ToSocketAddrs;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use netnames::config::{Nameserver, ResolverConfig};
use netnames::session::Session;
use netnames::unicast::UnicastProvider;
use netnames::{
    BrowserEvent, Mode, NameResolver, ProtoSplit, Protocol, ResolverEvent, ServiceBrowser,
    ServiceResolver, ServiceResolverEvent,
};
use netnames_proto::error::ServiceResolverError;
use netnames_proto::name::split_instance_name;
use netnames_proto::NameRecord;
use owo_colors::{OwoColorize, Style};
use tracing_subscriber::EnvFilter;

mod args;

use args::{Action, Args};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    Session::set_global(build_session(&args)?);

    let started = Instant::now();
    let outcome = match args.action {
        Action::Lookup => do_and_display_lookup(&args),
        Action::Follow => do_and_display_follow(&args),
        Action::Browse => do_and_display_browse(&args),
    };

    if args.print_meta {
        println!();
        println!("Finished in {} ms", started.elapsed().as_millis());
    }
    if args.verbose {
        display_diagnostics(&netnames::diagnostic_text());
    }

    netnames::cleanup();
    outcome
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "netnames=debug"
    } else {
        "netnames=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_session(args: &Args) -> Result<Session> {
    let mut config = ResolverConfig::from_system().with_connection_type(args.connection_type);
    match (&args.nameserver, args.port) {
        (Some(nameserver), port) => {
            let nameservers: Vec<_> = (nameserver.as_str(), port.unwrap_or(53))
                .to_socket_addrs()
                .with_context(|| format!("Could not resolve nameserver {}.", nameserver))?
                .map(|addr| Nameserver::new(addr.ip(), addr.port()))
                .collect();
            config = config.with_nameservers(nameservers);
        }
        (None, Some(port)) => config = config.with_port(port),
        (None, None) => {}
    }

    let builder = Session::builder().with_unicast(UnicastProvider::new(config));

    #[cfg(feature = "mdns")]
    let builder = match netnames::mdns::MdnsProvider::new(netnames::config::MdnsConfig::default())
    {
        Ok(provider) => builder.with_local(provider),
        Err(e) => {
            tracing::warn!("Multicast DNS is unavailable: {}", e);
            builder
        }
    };

    Ok(builder.build())
}

fn do_and_display_lookup(args: &Args) -> Result<()> {
    let mode = if args.long_lived {
        Mode::LongLived
    } else {
        Mode::Single
    };
    let deadline = Instant::now() + args.wait;

    let mut resolver = NameResolver::new();
    resolver.start(&args.name, args.qtype, mode);
    loop {
        match resolver.poll_event() {
            Some(ResolverEvent::ResultsReady(records)) => {
                display_records(&records, args);
                if mode == Mode::Single {
                    return Ok(());
                }
            }
            Some(ResolverEvent::Error(e)) => {
                display_error(&e.to_string());
                return Ok(());
            }
            None => {
                if mode == Mode::LongLived && Instant::now() >= deadline {
                    resolver.stop();
                    return Ok(());
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// What a `+follow` name stands for.
enum Target {
    Service {
        service: String,
        transport: String,
        domain: String,
    },
    Instance,
    Host,
}

fn parse_target(name: &str) -> Target {
    if split_instance_name(name).is_some() {
        return Target::Instance;
    }
    let mut labels = name.splitn(3, '.');
    match (labels.next(), labels.next(), labels.next()) {
        (Some(service), Some(transport), Some(domain))
            if service.starts_with('_') && transport.starts_with('_') =>
        {
            Target::Service {
                service: service[1..].to_string(),
                transport: transport[1..].to_string(),
                domain: domain.to_string(),
            }
        }
        _ => Target::Host,
    }
}

/// Splits a `:port` suffix off `name`, leaving IPv6 literals alone.
fn split_port(name: &str) -> (&str, Option<u16>) {
    if let Some((host, port)) = name.rsplit_once(':') {
        if !host.contains(':') {
            if let Ok(port) = port.parse() {
                return (host, Some(port));
            }
        }
    }
    (name, None)
}

fn do_and_display_follow(args: &Args) -> Result<()> {
    let (name, port) = split_port(&args.name);
    let happy = args.protocol == Protocol::HappyEyeballs;

    let mut resolver = ServiceResolver::new();
    resolver.set_protocol(args.protocol);
    let mut split = false;
    match parse_target(name) {
        Target::Service {
            service,
            transport,
            domain,
        } => resolver.start_service(&service, &transport, &domain, port),
        Target::Instance => resolver.start_instance(name),
        Target::Host => {
            resolver.start_host(name, port.unwrap_or(0));
            if happy {
                resolver.happy_split();
                split = true;
            }
        }
    }

    let mut candidates = 0;
    loop {
        if split {
            let ProtoSplit { ipv4, ipv6 } = match resolver.split() {
                Some(split) => split,
                None => break,
            };
            let progress = drive_split(ipv4, "IPv4", &mut candidates)
                | drive_split(ipv6, "IPv6", &mut candidates);
            if ipv4.is_finished() && ipv6.is_finished() {
                break;
            }
            if !progress {
                thread::sleep(POLL_INTERVAL);
            }
            continue;
        }

        match resolver.poll_event() {
            Some(ServiceResolverEvent::SrvReady) => {
                if args.verbose {
                    println!("{}", "SRV records found".if_supports_color(
                        owo_colors::Stream::Stdout,
                        |s| s.yellow()
                    ));
                }
                if happy {
                    resolver.happy_split();
                    split = true;
                }
            }
            Some(ServiceResolverEvent::SrvFailed) => {
                if args.verbose {
                    println!("{}", "No usable SRV records".if_supports_color(
                        owo_colors::Stream::Stdout,
                        |s| s.yellow()
                    ));
                }
                if happy && !resolver.is_finished() {
                    resolver.happy_split();
                    split = true;
                }
            }
            Some(ServiceResolverEvent::ResultReady {
                address,
                port,
                hostname,
            }) => {
                candidates += 1;
                display_candidate(None, &address.to_string(), port, &hostname);
                resolver.try_next();
            }
            Some(ServiceResolverEvent::Error(ServiceResolverError::NoHostLeft)) => break,
            Some(ServiceResolverEvent::Error(e)) => {
                display_error(&e.to_string());
                return Ok(());
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }

    if candidates == 0 {
        println!("<no candidates>");
    }
    Ok(())
}

/// Drains the events of one half of a split resolver. Returns whether there were any.
fn drive_split(resolver: &mut ServiceResolver, label: &str, candidates: &mut usize) -> bool {
    let mut progress = false;
    while let Some(event) = resolver.poll_event() {
        progress = true;
        match event {
            ServiceResolverEvent::ResultReady {
                address,
                port,
                hostname,
            } => {
                *candidates += 1;
                display_candidate(Some(label), &address.to_string(), port, &hostname);
                resolver.try_next();
            }
            ServiceResolverEvent::Error(ServiceResolverError::NoHostLeft) => {}
            ServiceResolverEvent::Error(e) => display_error(&format!("{}: {}", label, e)),
            ServiceResolverEvent::SrvReady | ServiceResolverEvent::SrvFailed => {}
        }
    }
    progress
}

fn do_and_display_browse(args: &Args) -> Result<()> {
    let labels: Vec<_> = args.name.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 || !labels[0].starts_with('_') || !labels[1].starts_with('_') {
        bail!(
            "Expected a service type like _ipp._tcp.local, but got: {}.",
            args.name
        );
    }
    let service_type = labels[..2].join(".");
    let domain = labels[2..].join(".");
    let domain = if domain.is_empty() {
        None
    } else {
        Some(domain.as_str())
    };

    let output = owo_colors::Stream::Stdout;
    let deadline = Instant::now() + args.wait;
    let mut browser = ServiceBrowser::new();
    browser.start(&service_type, domain);
    while Instant::now() < deadline {
        match browser.poll_event() {
            Some(BrowserEvent::InstanceAvailable(instance)) => {
                println!(
                    "{} {}",
                    "+".if_supports_color(output, |s| s.green()),
                    instance.name()
                );
                if args.verbose {
                    for (key, value) in instance.attributes() {
                        println!("\t{}={}", key, String::from_utf8_lossy(value));
                    }
                }
            }
            Some(BrowserEvent::InstanceUnavailable(instance)) => {
                println!(
                    "{} {}",
                    "-".if_supports_color(output, |s| s.red()),
                    instance.name()
                );
            }
            Some(BrowserEvent::Error(e)) => {
                display_error(&e.to_string());
                break;
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
    Ok(())
}

fn display_records(records: &[NameRecord], args: &Args) {
    let output = owo_colors::Stream::Stdout;

    if records.is_empty() {
        println!("<empty response>");
        return;
    }

    if !args.pad_answers {
        for record in records {
            println!("{}", record);
        }
        return;
    }

    let (mut max_owner_len, mut max_type_len) = (0, 0);
    for record in records {
        max_owner_len = max(max_owner_len, record.owner().len());
        if let Some(rtype) = record.rtype() {
            max_type_len = max(max_type_len, rtype.to_string().len());
        }
    }
    for record in records {
        let rdata = match record.rdata() {
            Some(rdata) => rdata,
            None => continue,
        };
        let line = format!(
            "{:<owner$} {:>6} {:<rtype$} {}",
            record.owner(),
            record.ttl(),
            rdata.rtype().to_string(),
            rdata,
            owner = max_owner_len,
            rtype = max_type_len,
        );
        // removals reported by long-lived lookups
        if record.is_withdrawn() && args.long_lived {
            println!("{}", line.if_supports_color(output, |s| s.red()));
        } else {
            println!("{}", line);
        }
    }
}

fn display_candidate(label: Option<&str>, address: &str, port: u16, hostname: &str) {
    let output = owo_colors::Stream::Stdout;
    let label = label.map(|l| format!("[{}] ", l)).unwrap_or_default();
    println!(
        "{}{:<39} port {:<5} ({})",
        label,
        address.if_supports_color(output, |s| s.green()),
        port,
        hostname
    );
}

fn display_error(msg: &str) {
    let output = owo_colors::Stream::Stdout;
    let err_style = Style::new().bold().red();
    println!("{}", msg.if_supports_color(output, |s| s.style(err_style)));
}

fn display_diagnostics(notes: &str) {
    if notes.is_empty() {
        return;
    }
    let output = owo_colors::Stream::Stdout;
    println!();
    println!(
        "{}",
        "Diagnostics:".if_supports_color(output, |s| s.yellow())
    );
    for note in notes.lines() {
        println!("\t{}", note);
    }
}
