mod common;

use std::collections::BTreeMap;

use common::{full_session, unicast_session, ScriptedProvider};
use netnames::{PublisherEvent, ServiceLocalPublisher};
use netnames_proto::error::PublisherError;
use netnames_proto::NameRecord;

fn attributes(version: &str) -> BTreeMap<String, Vec<u8>> {
    let mut attributes = BTreeMap::new();
    attributes.insert("version".to_string(), version.as_bytes().to_vec());
    attributes
}

#[test_log::test]
fn publication_is_confirmed() {
    let unicast = ScriptedProvider::unicast();
    let local = ScriptedProvider::local();
    let session = full_session(&unicast, &local);

    let mut publisher = ServiceLocalPublisher::with_session(&session);
    publisher.publish("Shared files", "_smb._tcp", 445, attributes("1"));
    assert!(publisher.is_active());
    assert_eq!(publisher.poll_event(), None);

    let publications = local.publications();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].instance, "Shared files");
    assert_eq!(publications[0].service_type, "_smb._tcp");
    assert_eq!(publications[0].port, 445);

    local.confirm_publications();
    assert_eq!(publisher.poll_event(), Some(PublisherEvent::Published));

    publisher.update_attributes(attributes("2"));
    assert_eq!(local.attribute_updates(), vec![attributes("2")]);

    publisher.cancel();
    assert!(local.publications().is_empty());
    assert!(!publisher.is_active());
}

#[test_log::test]
fn conflict_ends_the_publication() {
    let unicast = ScriptedProvider::unicast();
    let local = ScriptedProvider::local();
    let session = full_session(&unicast, &local);

    let mut publisher = ServiceLocalPublisher::with_session(&session);
    publisher.publish("Shared files", "_smb._tcp", 445, BTreeMap::new());
    local.reject_publications(PublisherError::Conflict);

    assert_eq!(
        publisher.poll_event(),
        Some(PublisherEvent::Error(PublisherError::Conflict))
    );
    assert!(!publisher.is_active());
    assert_eq!(publisher.poll_event(), None);

    // nothing to update any more
    publisher.update_attributes(attributes("3"));
    assert!(local.attribute_updates().is_empty());
}

#[test_log::test]
fn publishing_needs_a_local_provider() {
    let unicast = ScriptedProvider::unicast();
    let session = unicast_session(&unicast);

    let mut publisher = ServiceLocalPublisher::with_session(&session);
    publisher.publish("Shared files", "_smb._tcp", 445, BTreeMap::new());
    assert_eq!(
        publisher.poll_event(),
        Some(PublisherEvent::Error(PublisherError::NoLocal))
    );
}

#[test_log::test]
fn extra_records_keep_the_publication_running() {
    let unicast = ScriptedProvider::unicast();
    let local = ScriptedProvider::local();
    let session = full_session(&unicast, &local);

    let mut publisher = ServiceLocalPublisher::with_session(&session);

    // nothing published yet, nothing to attach to
    let mut txt = NameRecord::new("Shared files._smb._tcp.local.", 4500);
    txt.set_txt(vec![b"path=/srv".to_vec()]);
    publisher.add_record(&txt);
    assert!(local.extra_records().is_empty());

    publisher.publish("Shared files", "_smb._tcp", 445, attributes("1"));
    local.confirm_publications();
    assert_eq!(publisher.poll_event(), Some(PublisherEvent::Published));

    let address =
        NameRecord::address_record("files.local.", 120, "192.168.1.30".parse().unwrap());
    publisher.add_record(&txt);
    publisher.add_record(&address);

    let extras = local.extra_records();
    assert_eq!(extras.len(), 2);
    assert_eq!(extras[0].1, txt);
    assert_eq!(extras[1].1, address);
    assert_eq!(extras[0].0, extras[1].0);

    assert_eq!(publisher.poll_event(), None);
    assert!(publisher.is_active());
    assert_eq!(local.publications().len(), 1);

    publisher.cancel();
    publisher.add_record(&txt);
    assert_eq!(local.extra_records().len(), 2);
}
