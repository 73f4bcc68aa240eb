mod common;

use std::collections::BTreeMap;

use common::{full_session, unicast_session, ScriptedProvider};
use netnames::{BrowserEvent, ServiceBrowser};
use netnames_proto::error::BrowserError;
use netnames_proto::ServiceInstance;

fn printer(name: &str) -> ServiceInstance {
    let mut attributes = BTreeMap::new();
    attributes.insert("rp".to_string(), b"queue".to_vec());
    ServiceInstance::new(name, "_ipp._tcp", "local.", attributes)
}

#[test_log::test]
fn instances_come_and_go() {
    let unicast = ScriptedProvider::unicast();
    let local = ScriptedProvider::local();
    let session = full_session(&unicast, &local);

    let mut browser = ServiceBrowser::with_session(&session);
    browser.start("_ipp._tcp", None);
    assert!(browser.is_active());
    assert_eq!(browser.poll_event(), None);

    local.announce(&printer("Office"));
    local.announce(&printer("Lab"));
    local.withdraw(&printer("Office"));

    assert_eq!(
        browser.poll_event(),
        Some(BrowserEvent::InstanceAvailable(printer("Office")))
    );
    assert_eq!(
        browser.poll_event(),
        Some(BrowserEvent::InstanceAvailable(printer("Lab")))
    );
    match browser.poll_event() {
        Some(BrowserEvent::InstanceUnavailable(instance)) => {
            assert_eq!(instance.name(), "Office._ipp._tcp.local.");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(browser.poll_event(), None);
}

#[test_log::test]
fn stopped_browse_reports_nothing() {
    let unicast = ScriptedProvider::unicast();
    let local = ScriptedProvider::local();
    let session = full_session(&unicast, &local);

    let mut browser = ServiceBrowser::with_session(&session);
    browser.start("_ipp._tcp", Some("local."));
    local.announce(&printer("Office"));
    browser.stop();
    assert!(!browser.is_active());
    assert_eq!(local.running_browses(), 0);

    local.announce(&printer("Lab"));
    assert_eq!(browser.poll_event(), None);
}

#[test_log::test]
fn dropping_the_browser_stops_it() {
    let unicast = ScriptedProvider::unicast();
    let local = ScriptedProvider::local();
    let session = full_session(&unicast, &local);

    {
        let mut browser = ServiceBrowser::with_session(&session);
        browser.start("_ipp._tcp", None);
        assert_eq!(local.running_browses(), 1);
    }
    assert_eq!(local.running_browses(), 0);
    assert_eq!(session.pending_operations(), 0);
}

#[test_log::test]
fn browsing_needs_a_capable_provider() {
    let unicast = ScriptedProvider::unicast();
    let session = unicast_session(&unicast);

    let mut browser = ServiceBrowser::with_session(&session);
    browser.start("_ipp._tcp", None);
    assert_eq!(
        browser.poll_event(),
        Some(BrowserEvent::Error(BrowserError::NoLocal))
    );
    assert!(!browser.is_active());

    browser.start("_ipp._tcp", Some("example.com"));
    assert_eq!(
        browser.poll_event(),
        Some(BrowserEvent::Error(BrowserError::NoWide))
    );
}
