//! Helpers for working with domain names as plain strings.
//!
//! Lookups address names in their *absolute* form, i.e. with a trailing dot. Everything handed to
//! a resolver goes through [`normalize()`], so `"example.com"` and `"example.com."` refer to the
//! same query.

use crate::error::NameError;

/// The domain multicast DNS operates on.
pub const LOCAL_DOMAIN: &str = "local.";

/// Returns `name` in absolute form, appending a trailing dot if it is missing.
///
/// # Examples
/// ```rust
/// use netnames_proto::name::normalize;
///
/// assert_eq!(normalize("example.com"), "example.com.");
/// assert_eq!(normalize("example.com."), "example.com.");
/// assert_eq!(normalize(""), ".");
/// ```
pub fn normalize(name: &str) -> String {
    if name.ends_with('.') && !ends_with_escaped_dot(name) {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

// "a\." ends in an escaped dot, "a\\." in a real one
fn ends_with_escaped_dot(name: &str) -> bool {
    let without_dot = &name[..name.len() - 1];
    let backslashes = without_dot.bytes().rev().take_while(|b| *b == b'\\').count();
    backslashes % 2 == 1
}

/// Whether `name` lives in the multicast `local.` domain.
///
/// # Examples
/// ```rust
/// use netnames_proto::name::is_local;
///
/// assert!(is_local("printer.local"));
/// assert!(is_local("_ipp._tcp.LOCAL."));
/// assert!(!is_local("example.com"));
/// assert!(!is_local("notlocal"));
/// ```
pub fn is_local(name: &str) -> bool {
    let name = normalize(name).to_ascii_lowercase();
    name == LOCAL_DOMAIN || name.ends_with(".local.")
}

/// Builds the query name for an SRV lookup, see
/// [RFC 2782](https://www.rfc-editor.org/rfc/rfc2782).
///
/// # Examples
/// ```rust
/// use netnames_proto::name::srv_name;
///
/// assert_eq!(srv_name("xmpp-client", "tcp", "jabber.org"), "_xmpp-client._tcp.jabber.org.");
/// ```
pub fn srv_name(service: &str, transport: &str, domain: &str) -> String {
    normalize(&format!("_{}._{}.{}", service, transport, domain))
}

/// Converts an internationalized domain name to its ASCII form, see
/// [RFC 5891](https://www.rfc-editor.org/rfc/rfc5891).
///
/// # Examples
/// ```rust
/// use netnames_proto::name::idna_from_string;
///
/// assert_eq!(idna_from_string("bücher.example").unwrap(), "xn--bcher-kva.example");
/// assert_eq!(idna_from_string("example.com.").unwrap(), "example.com.");
/// ```
pub fn idna_from_string(name: &str) -> Result<String, NameError> {
    if name.is_ascii() {
        return Ok(name.to_string());
    }
    idna::domain_to_ascii(name).map_err(|_| NameError::Idna(name.to_string()))
}

/// Converts an ASCII (punycode) domain name back to its Unicode form. Labels that cannot be
/// decoded are kept as they are.
pub fn idna_to_string(name: &str) -> String {
    let (unicode, _) = idna::domain_to_unicode(name);
    unicode
}

/// Escapes a single label so that it can be embedded in a domain name: `.` becomes `\.` and `\`
/// becomes `\\`.
///
/// DNS-SD instance names are free-form UTF-8 and routinely contain dots.
///
/// # Examples
/// ```rust
/// use netnames_proto::name::escape_domain;
///
/// assert_eq!(escape_domain("Mr. Printer"), r"Mr\. Printer");
/// assert_eq!(escape_domain(r"a\b"), r"a\\b");
/// ```
pub fn escape_domain(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c == '.' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Reverses [`escape_domain()`]. Also accepts the `\DDD` decimal escapes of
/// [RFC 1035, Section 5.1](https://www.rfc-editor.org/rfc/rfc1035#section-5.1).
///
/// # Examples
/// ```rust
/// use netnames_proto::name::unescape_domain;
///
/// assert_eq!(unescape_domain(r"Mr\. Printer").unwrap(), "Mr. Printer");
/// assert_eq!(unescape_domain(r"Mr\032Printer").unwrap(), "Mr Printer");
/// assert!(unescape_domain(r"broken\").is_err());
/// ```
pub fn unescape_domain(label: &str) -> Result<String, NameError> {
    let bytes = label.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let rest = &bytes[i + 1..];
        match rest.first() {
            None => return Err(NameError::DanglingEscape),
            Some(d) if d.is_ascii_digit() => {
                let digits = rest.get(..3).unwrap_or(rest);
                let text = String::from_utf8_lossy(digits).into_owned();
                match text.parse::<u8>() {
                    Ok(byte) if digits.len() == 3 && digits.iter().all(u8::is_ascii_digit) => {
                        out.push(byte);
                        i += 4;
                    }
                    _ => return Err(NameError::InvalidDecimalEscape(text)),
                }
            }
            Some(c) => {
                out.push(*c);
                i += 2;
            }
        }
    }

    String::from_utf8(out).map_err(|e| {
        NameError::InvalidDecimalEscape(String::from_utf8_lossy(e.as_bytes()).into_owned())
    })
}

/// Splits a domain name into its labels, honouring escaped dots. The labels keep their escapes.
fn split_labels(name: &str) -> Vec<&str> {
    let mut labels = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in name.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '.' => {
                labels.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < name.len() {
        labels.push(&name[start..]);
    }
    labels
}

/// Splits a full DNS-SD instance name (`<instance>.<_service>.<_proto>.<domain>`) into its
/// unescaped instance label, its service type and its domain.
///
/// # Examples
/// ```rust
/// use netnames_proto::name::split_instance_name;
///
/// let (instance, ty, domain) = split_instance_name(r"Mr\. Printer._ipp._tcp.local.").unwrap();
/// assert_eq!(instance, "Mr. Printer");
/// assert_eq!(ty, "_ipp._tcp");
/// assert_eq!(domain, "local.");
///
/// assert!(split_instance_name("_ipp._tcp.local.").is_none());
/// ```
pub fn split_instance_name(name: &str) -> Option<(String, String, String)> {
    let name = normalize(name);
    let labels = split_labels(&name);
    if labels.len() < 4 || !labels[1].starts_with('_') || !labels[2].starts_with('_') {
        return None;
    }
    let instance = unescape_domain(labels[0]).ok()?;
    let service_type = format!("{}.{}", labels[1], labels[2]);
    let domain = normalize(&labels[3..].join("."));
    Some((instance, service_type, domain))
}
