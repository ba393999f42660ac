//! End-to-end exercises of the six literal scenarios from spec §8, driven
//! entirely through the public facade (`Switch`/`EndpointHandle`), in the
//! teacher's own test idiom (`test/test.rs`): one `#[test]` per scenario,
//! `env_logger` initialised at the top of each.

use kswitch::{Flags, Limits, Mode, MessageId, NetworkRef, Role, Switch, SwitchError};

fn switch() -> Switch {
    Switch::new(Limits::default())
}

#[test]
fn basic_announce() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();

    l.bind("$.X", Role::Listener).unwrap();

    s.start_write("$.X").unwrap();
    s.write(b"hi").unwrap();
    s.send().unwrap();

    let msg = l.read_message().unwrap().expect("message should arrive");
    assert_eq!(msg.name.to_string(), "$.X");
    assert_eq!(msg.data, b"hi");
    assert_eq!(msg.flags, Flags::empty());
    assert_eq!(msg.from, s.id());
}

#[test]
fn request_reply() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();

    l.bind("$.Q", Role::Replier).unwrap();

    s.start_write("$.Q").unwrap();
    s.set_write_options(0, MessageId::UNSET, Flags::WANT_A_REPLY, NetworkRef::UNSET)
        .unwrap();
    let req_id = s.send().unwrap();

    let req = l.read_message().unwrap().expect("request should arrive");
    assert!(req.flags.contains(Flags::WANT_YOU_TO_REPLY));
    assert_eq!(req.id, req_id);

    l.start_write("$.Q").unwrap();
    l.set_write_options(req.from, req.id, Flags::empty(), NetworkRef::UNSET)
        .unwrap();
    l.send().unwrap();

    let reply = s.read_message().unwrap().expect("reply should arrive");
    assert_eq!(reply.in_reply_to, req_id);
}

#[test]
fn replier_vanishes_yields_gone_away() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();

    l.bind("$.Q", Role::Replier).unwrap();

    s.start_write("$.Q").unwrap();
    s.set_write_options(0, MessageId::UNSET, Flags::WANT_A_REPLY, NetworkRef::UNSET)
        .unwrap();
    let req_id = s.send().unwrap();

    let req = l.read_message().unwrap().expect("request should arrive");
    assert_eq!(req.id, req_id);

    l.close().unwrap();

    let synthetic = s.read_message().unwrap().expect("gone-away should arrive");
    assert_eq!(synthetic.name.to_string(), "$.KBUS.Replier.GoneAway");
    assert!(synthetic.flags.contains(Flags::SYNTHETIC));
    assert_eq!(synthetic.in_reply_to, req_id);
}

#[test]
fn replier_unbind_yields_unbound_rather_than_gone_away() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();

    l.bind("$.Q", Role::Replier).unwrap();

    s.start_write("$.Q").unwrap();
    s.set_write_options(0, MessageId::UNSET, Flags::WANT_A_REPLY, NetworkRef::UNSET)
        .unwrap();
    let req_id = s.send().unwrap();

    let req = l.read_message().unwrap().expect("request should arrive");
    assert_eq!(req.id, req_id);

    // Unlike closing the endpoint, an explicit unbind leaves `l` itself
    // alive -- only its obligation for this one name is retracted (spec
    // §4.4).
    l.unbind("$.Q", Role::Replier).unwrap();

    let synthetic = s.read_message().unwrap().expect("unbound notice should arrive");
    assert_eq!(synthetic.name.to_string(), "$.KBUS.Replier.Unbound");
    assert!(synthetic.flags.contains(Flags::SYNTHETIC));
    assert_eq!(synthetic.in_reply_to, req_id);
    assert!(synthetic.data.is_empty());
}

#[test]
fn unsolicited_reply_is_refused() {
    let _ = env_logger::try_init();
    let switch = switch();
    let x = switch.open(0, Mode::ReadWrite).unwrap();

    x.start_write("$.Whatever").unwrap();
    let bogus_id = MessageId {
        network_id: 0,
        serial: 999,
    };
    x.set_write_options(x.id(), bogus_id, Flags::empty(), NetworkRef::UNSET)
        .unwrap();

    let err = x.send().unwrap_err();
    assert!(matches!(err, SwitchError::ConnectionRefused));
}

#[test]
fn urgent_message_jumps_the_queue() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();

    l.bind("$.A", Role::Listener).unwrap();
    l.set_max_messages(10).unwrap();

    for n in &[b"one".to_vec(), b"two".to_vec()] {
        s.start_write("$.A").unwrap();
        s.write(n).unwrap();
        s.send().unwrap();
    }

    s.start_write("$.A").unwrap();
    s.write(b"three").unwrap();
    s.set_write_options(0, MessageId::UNSET, Flags::URGENT, NetworkRef::UNSET)
        .unwrap();
    s.send().unwrap();

    let first = l.read_message().unwrap().unwrap();
    let second = l.read_message().unwrap().unwrap();
    let third = l.read_message().unwrap().unwrap();

    assert_eq!(first.data, b"three");
    assert_eq!(second.data, b"one");
    assert_eq!(third.data, b"two");
}

#[test]
fn bind_event_visibility() {
    let _ = env_logger::try_init();
    let switch = switch();
    let z = switch.open(0, Mode::ReadWrite).unwrap();
    let b = switch.open(0, Mode::ReadWrite).unwrap();

    z.bind("$.KBUS.ReplierBindEvent", Role::Listener).unwrap();
    z.set_report_replier_binds(true).unwrap();

    b.bind("$.Foo", Role::Replier).unwrap();

    let event = z.read_message().unwrap().expect("bind event should arrive");
    assert_eq!(event.name.to_string(), "$.KBUS.ReplierBindEvent");
    let is_bind = u32::from_be_bytes(event.data[0..4].try_into().unwrap());
    let binder_id = u32::from_be_bytes(event.data[4..8].try_into().unwrap());
    assert_eq!(is_bind, 1);
    assert_eq!(binder_id, b.id());

    b.unbind("$.Foo", Role::Replier).unwrap();

    let event = z.read_message().unwrap().expect("unbind event should arrive");
    let is_bind = u32::from_be_bytes(event.data[0..4].try_into().unwrap());
    assert_eq!(is_bind, 0);
}
