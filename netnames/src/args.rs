//! CLI argument definition and parsing.

use std::env;
use std::net::IpAddr;
use std::process;
use std::str::FromStr;
use std::time::Duration;

use netnames::config::ConnectionType;
use netnames::Protocol;
use netnames_proto::RecordType;
use owo_colors::OwoColorize;

/// What the CLI does with the name it was given.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Look up the records of the name.
    Lookup,
    /// Walk the name as a service or host with a `ServiceResolver`.
    Follow,
    /// Watch the instances of a DNS-SD service type appear and disappear.
    Browse,
}

#[derive(Clone, Debug)]
pub struct Args {
    pub nameserver: Option<String>,
    pub name: String,
    pub qtype: RecordType,
    pub action: Action,
    pub protocol: Protocol,
    pub verbose: bool,
    pub print_meta: bool,
    pub pad_answers: bool,
    pub long_lived: bool,
    pub connection_type: ConnectionType,
    pub port: Option<u16>,
    pub wait: Duration,
}

enum ConsumeNext {
    Port,
    Wait,
}

const DEFAULT_URL: &str = "example.com.";
const DEFAULT_QTYPE: RecordType = RecordType::AAAA;
const DEFAULT_WAIT: u64 = 5;

impl Args {
    pub fn parse() -> Self {
        // skip executable name
        let args: Vec<String> = env::args().skip(1).collect();

        let mut nameserver = None;
        let mut name = DEFAULT_URL.to_string();
        let mut qtype = DEFAULT_QTYPE;
        let mut action = Action::Lookup;
        let mut protocol = Protocol::default();
        let mut verbose = false;
        let mut print_meta = true;
        let mut pad_answers = true;
        let mut long_lived = false;
        let mut connection_type = ConnectionType::Udp;
        let mut port = None;
        let mut wait = Duration::from_secs(DEFAULT_WAIT);

        let mut reverse = false;
        let mut consume_next = None;

        for arg in args {
            if let Some(to_consume) = &consume_next {
                match to_consume {
                    ConsumeNext::Port => match arg.parse::<u16>() {
                        Ok(val) => port = Some(val),
                        Err(_) => err(format!("Invalid port: {}.", arg)),
                    },
                    ConsumeNext::Wait => match arg.parse::<u64>() {
                        Ok(val) => wait = Duration::from_secs(val),
                        Err(_) => err(format!("Invalid number of seconds: {}.", arg)),
                    },
                }
                consume_next = None;
            } else if let Some(ns) = arg.strip_prefix('@') {
                // nameserver
                nameserver = Some(ns.to_string());
            } else if let Some(flag) = arg.strip_prefix('+') {
                // flags
                match flag {
                    "verbose" => {
                        verbose = true;
                    }
                    "no-meta" => {
                        print_meta = false;
                    }
                    "no-padding" => {
                        pad_answers = false;
                    }
                    "follow" => {
                        action = Action::Follow;
                    }
                    "browse" => {
                        action = Action::Browse;
                    }
                    "long-lived" => {
                        long_lived = true;
                    }
                    "ipv4" => {
                        protocol = Protocol::IPv4;
                    }
                    "ipv6" => {
                        protocol = Protocol::IPv6;
                    }
                    "ipv4-ipv6" => {
                        protocol = Protocol::IPv4IPv6;
                    }
                    "ipv6-ipv4" => {
                        protocol = Protocol::IPv6IPv4;
                    }
                    "happy" => {
                        protocol = Protocol::HappyEyeballs;
                    }
                    "tcp" => {
                        connection_type = ConnectionType::Tcp;
                    }
                    x => {
                        err(format!("Invalid flag: +{}.", x));
                    }
                }
            } else if let Some(option) = arg.strip_prefix('-') {
                // options
                match option {
                    "h" | "-help" => {
                        print_help();
                        process::exit(0);
                    }
                    "V" | "-version" => {
                        print_version();
                        process::exit(0);
                    }
                    "p" | "-port" => {
                        consume_next = Some(ConsumeNext::Port);
                    }
                    "w" | "-wait" => {
                        consume_next = Some(ConsumeNext::Wait);
                    }
                    "x" => {
                        reverse = true;
                    }
                    x => {
                        err(format!("Invalid option: -{}.", x));
                    }
                }
            } else {
                match RecordType::from_str(&arg) {
                    Ok(t) => {
                        qtype = t;
                    }
                    Err(_) => {
                        // use URL as fallback
                        name = arg;
                    }
                }
            }
        }

        if consume_next.is_some() {
            err("Missing value for the last option.");
        }

        if verbose && !pad_answers {
            err("Cannot use both +verbose and +no-padding.");
        }

        if long_lived && action != Action::Lookup {
            err("+long-lived can only be used for plain lookups.");
        }

        if reverse {
            match IpAddr::from_str(name.as_str()) {
                Err(_) => {
                    err(format!(
                        "Expected IP address for reverse lookup, but got: {}.",
                        name
                    ));
                }
                Ok(IpAddr::V4(addr)) => {
                    let octets = addr.octets();
                    name = format!(
                        "{}.{}.{}.{}.in-addr.arpa",
                        octets[3], octets[2], octets[1], octets[0]
                    );
                }
                Ok(IpAddr::V6(addr)) => {
                    name = String::with_capacity(72);
                    for s in addr.segments().iter().rev() {
                        for c in format!("{:04x}", s).chars().rev() {
                            name.push(c);
                            name.push('.');
                        }
                    }
                    name.push_str("ip6.arpa");
                }
            }
            qtype = RecordType::PTR;
        }

        Self {
            nameserver,
            name,
            qtype,
            action,
            protocol,
            verbose,
            print_meta,
            pad_answers,
            long_lived,
            connection_type,
            port,
            wait,
        }
    }
}

macro_rules! var {
    ($var:expr) => {
        $var.if_supports_color(owo_colors::Stream::Stdout, |s| s.green())
    };
}

macro_rules! printopt {
    ($opt:expr, $desc:expr) => {
        println!(
            "\t    {:<19} ({})",
            $opt.if_supports_color(owo_colors::Stream::Stdout, |s| s.yellow()),
            $desc,
        )
    };
}

macro_rules! printflag {
    ($flag:expr, $desc:expr) => {
        println!(
            "\t    {:<12} ({})",
            $flag.if_supports_color(owo_colors::Stream::Stdout, |s| s.yellow()),
            $desc,
        )
    };
}

fn print_help() {
    let output = owo_colors::Stream::Stdout;
    print!("{}", "Usage:".if_supports_color(output, |s| s.purple()));
    println!(
        "\tnetnames [@{}] [{}] [{}] [{}] [{}]",
        var!("nameserver"),
        var!("name"),
        var!("q-type"),
        var!("options"),
        var!("flags")
    );
    println!();

    println!("{}", "Where:".if_supports_color(output, |s| s.purple()));

    println!(
        "\t{} is the IP address or hostname of a DNS nameserver; the system's\n\tnameservers are used if it is omitted",
        var!("nameserver")
    );
    println!();

    println!(
        "\t{} is the domain you want to query; with +follow it may be a service\n\t(e.g. _xmpp-client._tcp.example.org), a DNS-SD instance or a host, optionally\n\tsuffixed with :port; with +browse it is a service type (e.g. _ipp._tcp.local)",
        var!("name")
    );
    println!();

    println!(
        "\t{} is the record type you want (e.g. AAAA, A, TXT, MX, SRV, ...)",
        var!("q-type")
    );
    println!();

    println!("\t{} is one or more of the following:", var!("options"));
    printopt!("-h | --help", "print this help message");
    printopt!("-V | --version", "print the version of netnames");
    printopt!("-p | --port <port>", "use the given nameserver port number");
    printopt!("-w | --wait <secs>", "how long to browse or stay long-lived");
    printopt!("-x", "shortcut for reverse lookup");
    println!();
    println!("\t{} is one or more of the following:", var!("flags"));
    printflag!("+verbose", "log what happens and print diagnostics");
    printflag!("+no-meta", "don't print metadata, e.g. timing");
    printflag!(
        "+no-padding",
        "don't pad output; cannot be used with +verbose"
    );
    printflag!("+follow", "resolve a service or host to addresses");
    printflag!("+browse", "list the instances of a DNS-SD service type");
    printflag!("+long-lived", "keep the lookup open (local. only)");
    printflag!("+ipv6-ipv4", "with +follow: IPv6 first (default)");
    printflag!("+ipv4-ipv6", "with +follow: IPv4 first");
    printflag!("+ipv6", "with +follow: only IPv6");
    printflag!("+ipv4", "with +follow: only IPv4");
    printflag!("+happy", "with +follow: both families in parallel");
    printflag!("+tcp", "use TCP instead of UDP");
    println!();

    println!("Note: the order of the arguments does not matter.");
    println!();

    println!(
        "If no arguments are specified, the default behaviour is\n`{}`.",
        format!("netnames {} {}", DEFAULT_URL, DEFAULT_QTYPE)
            .if_supports_color(output, |s| s.green())
    );
    println!();

    println!(
        "Output is colourized by default. This can be tuned using the {}/\n{} environment variables. Logging can be configured with {}.",
        var!("FORCE_COLOR"),
        var!("NO_COLOR"),
        var!("RUST_LOG")
    );
}

fn print_version() {
    println!("netnames v{}", env!("CARGO_PKG_VERSION"));
}

pub fn err(msg: impl AsRef<str>) -> ! {
    eprintln!("{}", msg.as_ref());
    process::exit(1)
}
