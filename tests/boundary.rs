//! Boundary behaviours from spec §8: `max_messages = 1` under each
//! backpressure discipline, and a sender's own inbound queue blocking a
//! new Request for lack of a reply slot.

use std::thread;
use std::time::Duration;

use kswitch::{Flags, Limits, Mode, MessageId, NetworkRef, Role, Switch, SwitchError};

fn switch() -> Switch {
    Switch::new(Limits::default())
}

fn announce(to: &kswitch::EndpointHandle, name: &str, flags: Flags) -> Result<MessageId, SwitchError> {
    to.start_write(name)?;
    to.set_write_options(0, MessageId::UNSET, flags, NetworkRef::UNSET)?;
    to.send()
}

#[test]
fn default_flags_silently_drop_on_a_full_queue() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();
    l.bind("$.X", Role::Listener).unwrap();
    l.set_max_messages(1).unwrap();

    announce(&s, "$.X", Flags::empty()).unwrap();
    announce(&s, "$.X", Flags::empty()).unwrap();

    assert_eq!(l.num_messages().unwrap(), 1);
    let msg = l.read_message().unwrap().unwrap();
    assert_eq!(msg.name.to_string(), "$.X");
    assert_eq!(l.num_messages().unwrap(), 0);
}

#[test]
fn all_or_fail_reports_busy_on_a_full_queue() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();
    l.bind("$.X", Role::Listener).unwrap();
    l.set_max_messages(1).unwrap();

    announce(&s, "$.X", Flags::empty()).unwrap();
    let err = announce(&s, "$.X", Flags::ALL_OR_FAIL).unwrap_err();
    assert!(matches!(err, SwitchError::Busy));
}

#[test]
fn all_or_wait_blocks_until_space_frees_up() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();
    l.bind("$.X", Role::Listener).unwrap();
    l.set_max_messages(1).unwrap();

    announce(&s, "$.X", Flags::empty()).unwrap();

    let blocked = thread::spawn(move || announce(&s, "$.X", Flags::ALL_OR_WAIT).unwrap());

    // Give the blocked send a moment to actually be parked before we free
    // up room; not required for correctness (the send would eventually
    // succeed regardless) but makes the test actually exercise the wait.
    thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished());

    let drained = l.read_message().unwrap().unwrap();
    assert_eq!(drained.data, Vec::<u8>::new());

    blocked.join().unwrap();

    let second = l.read_message().unwrap().unwrap();
    assert_eq!(second.name.to_string(), "$.X");
}

#[test]
fn request_fails_with_no_locks_when_sender_queue_has_no_spare_slot() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();
    l.bind("$.Q", Role::Replier).unwrap();
    s.set_max_messages(1).unwrap();

    // Fill the sender's own inbound with an unrelated, unread message so
    // there is no room left to reserve a reply slot.
    let filler = switch.open(0, Mode::ReadWrite).unwrap();
    s.bind("$.Filler", Role::Listener).unwrap();
    filler.start_write("$.Filler").unwrap();
    filler.send().unwrap();

    assert_eq!(s.num_messages().unwrap(), 1);

    s.start_write("$.Q").unwrap();
    s.set_write_options(0, MessageId::UNSET, Flags::WANT_A_REPLY, NetworkRef::UNSET)
        .unwrap();
    let err = s.send().unwrap_err();
    assert!(matches!(err, SwitchError::NoLocks));
}

#[test]
fn only_once_deduplicates_a_double_match() {
    let _ = env_logger::try_init();
    let switch = switch();
    let l = switch.open(0, Mode::ReadWrite).unwrap();
    let s = switch.open(0, Mode::ReadWrite).unwrap();

    l.bind("$.Foo.Bar", Role::Listener).unwrap();
    l.bind("$.Foo.*", Role::Listener).unwrap();
    l.set_only_once(true).unwrap();

    s.start_write("$.Foo.Bar").unwrap();
    s.send().unwrap();

    assert_eq!(l.num_messages().unwrap(), 1);
}

#[test]
fn wildcard_matching_boundary() {
    use kswitch::Name;

    let star = Name::parse_pattern("$.*").unwrap();
    assert!(star.matches_literal(&Name::parse_literal("$.Fred").unwrap()));
    assert!(star.matches_literal(&Name::parse_literal("$.Fred.Jim").unwrap()));

    let percent = Name::parse_pattern("$.%").unwrap();
    assert!(percent.matches_literal(&Name::parse_literal("$.Fred").unwrap()));
    assert!(!percent.matches_literal(&Name::parse_literal("$.Fred.Jim").unwrap()));
}
