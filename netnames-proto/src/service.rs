//! DNS-SD service instances, see [RFC 6763](https://www.rfc-editor.org/rfc/rfc6763).

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::name::escape_domain;

/// One advertised instance of a service, e.g. a printer called `"Office"` offering `_ipp._tcp`
/// in `local.`.
///
/// # Examples
/// ```rust
/// use std::collections::BTreeMap;
/// use netnames_proto::ServiceInstance;
///
/// let instance = ServiceInstance::new("Office 2.1", "_ipp._tcp", "local.", BTreeMap::new());
/// assert_eq!(instance.name(), r"Office 2\.1._ipp._tcp.local.");
/// ```
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ServiceInstance {
    instance: String,
    service_type: String,
    domain: String,
    attributes: BTreeMap<String, Vec<u8>>,
    name: String,
}

impl ServiceInstance {
    pub fn new(
        instance: impl Into<String>,
        service_type: impl Into<String>,
        domain: impl Into<String>,
        attributes: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        let instance = instance.into();
        let service_type = service_type.into();
        let domain = domain.into();
        let name = format!("{}.{}.{}", escape_domain(&instance), service_type, domain);
        Self {
            instance,
            service_type,
            domain,
            attributes,
            name,
        }
    }

    /// The unescaped instance label.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn attributes(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.attributes
    }

    /// The full instance name, i.e. the owner of the instance's `SRV` and `TXT` records.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Encodes attributes as the strings of a DNS-SD `TXT` record
/// ([RFC 6763, Section 6](https://www.rfc-editor.org/rfc/rfc6763#section-6)).
///
/// An empty value is encoded as the bare key. An empty map yields a single empty string, as a
/// `TXT` record must contain at least one.
pub fn attributes_to_txt(attributes: &BTreeMap<String, Vec<u8>>) -> Vec<Vec<u8>> {
    if attributes.is_empty() {
        return vec![Vec::new()];
    }
    attributes
        .iter()
        .map(|(key, value)| {
            let mut entry = key.as_bytes().to_vec();
            if !value.is_empty() {
                entry.push(b'=');
                entry.extend_from_slice(value);
            }
            entry
        })
        .collect()
}

/// Decodes the strings of a DNS-SD `TXT` record into attributes.
///
/// Keys are compared case-insensitively and the first occurrence wins. Strings with an empty key
/// are skipped.
///
/// # Examples
/// ```rust
/// use netnames_proto::service::attributes_from_txt;
///
/// let attrs = attributes_from_txt(&[b"txtvers=1".to_vec(), b"TXTVERS=2".to_vec(), b"color".to_vec()]);
/// assert_eq!(attrs["txtvers"], b"1");
/// assert!(attrs["color"].is_empty());
/// ```
pub fn attributes_from_txt(texts: &[Vec<u8>]) -> BTreeMap<String, Vec<u8>> {
    let mut attributes = BTreeMap::new();
    for text in texts {
        let (key, value) = match text.iter().position(|b| *b == b'=') {
            Some(pos) => (&text[..pos], text[pos + 1..].to_vec()),
            None => (&text[..], Vec::new()),
        };
        if key.is_empty() {
            continue;
        }
        let key = String::from_utf8_lossy(key).to_ascii_lowercase();
        attributes.entry(key).or_insert(value);
    }
    attributes
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{attributes_from_txt, attributes_to_txt, ServiceInstance};

    #[test]
    fn attributes_survive_txt_encoding() {
        let mut attributes = BTreeMap::new();
        attributes.insert("path".to_string(), b"/queue".to_vec());
        attributes.insert("flag".to_string(), Vec::new());
        let txt = attributes_to_txt(&attributes);
        assert_eq!(txt, vec![b"flag".to_vec(), b"path=/queue".to_vec()]);
        assert_eq!(attributes_from_txt(&txt), attributes);
    }

    #[test]
    fn empty_attributes_give_one_empty_string() {
        assert_eq!(attributes_to_txt(&BTreeMap::new()), vec![Vec::<u8>::new()]);
        assert!(attributes_from_txt(&[Vec::new()]).is_empty());
    }

    #[test]
    fn value_may_contain_equals_sign() {
        let attrs = attributes_from_txt(&[b"expr=a=b".to_vec()]);
        assert_eq!(attrs["expr"], b"a=b");
    }

    #[test]
    fn instance_accessors() {
        let instance = ServiceInstance::new("web", "_http._tcp", "example.org.", BTreeMap::new());
        assert_eq!(instance.instance(), "web");
        assert_eq!(instance.service_type(), "_http._tcp");
        assert_eq!(instance.domain(), "example.org.");
        assert_eq!(instance.name(), "web._http._tcp.example.org.");
    }
}
