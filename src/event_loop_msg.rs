//! Commands and notifications flowing between the client-facing facade
//! (`switch_facade.rs`, `device.rs`) and the backend thread that owns all
//! switch state (`switch_impl.rs`).
//!
//! Kept in spirit from the teacher's own `event_loop_msg.rs`: there,
//! `CmdSignal`/`SocketCmdSignal` carry facade-to-backend requests
//! (`Connect`, `Bind`, `SendMsg`, ...) and `SocketNotify` carries the
//! backend's replies (`Connected`, `MsgSent`, ...). Here the vocabulary is
//! this system's control surface (spec §4.5) instead of nanomsg's, and
//! each request additionally carries its own one-shot reply channel
//! (`std::sync::mpsc`) rather than relying on a single long-lived
//! per-socket event channel, since this backend multiplexes many more
//! concurrent endpoints behind one thread than the teacher's one socket
//! per protocol does.

use std::sync::mpsc;

use crate::binding::Role;
use crate::endpoint::{EndpointId, Mode};
use crate::error::SwitchError;
use crate::message::{Flags, MessageId, NetworkRef};

pub type DeviceId = u32;

/// A request sent to the backend thread, paired with the channel its
/// reply must be sent back on.
pub struct Request {
    pub device: DeviceId,
    pub command: Command,
    pub reply: mpsc::Sender<Reply>,
}

pub enum Command {
    /// Opens a fresh endpoint on the device.
    Open {
        mode: Mode,
    },
    Close {
        endpoint: EndpointId,
    },
    Bind {
        endpoint: EndpointId,
        name: String,
        role: Role,
    },
    Unbind {
        endpoint: EndpointId,
        name: String,
        role: Role,
    },
    StartWrite {
        endpoint: EndpointId,
        name: String,
    },
    Write {
        endpoint: EndpointId,
        data: Vec<u8>,
    },
    SetWriteOptions {
        endpoint: EndpointId,
        to: u32,
        in_reply_to: MessageId,
        flags: Flags,
        final_to: NetworkRef,
    },
    Send {
        endpoint: EndpointId,
    },
    Discard {
        endpoint: EndpointId,
    },
    NextMessageLength {
        endpoint: EndpointId,
    },
    BytesLeftInCurrent {
        endpoint: EndpointId,
    },
    ReadBytes {
        endpoint: EndpointId,
        n: usize,
    },
    LastSentId {
        endpoint: EndpointId,
    },
    FindReplier {
        name: String,
    },
    SetMaxMessages {
        endpoint: EndpointId,
        n: usize,
    },
    GetMaxMessages {
        endpoint: EndpointId,
    },
    NumMessages {
        endpoint: EndpointId,
    },
    NumUnrepliedTo {
        endpoint: EndpointId,
    },
    SetOnlyOnce {
        endpoint: EndpointId,
        value: bool,
    },
    GetOnlyOnce {
        endpoint: EndpointId,
    },
    SetReportReplierBinds {
        endpoint: EndpointId,
        value: bool,
    },
    GetReportReplierBinds {
        endpoint: EndpointId,
    },
    SetVerbose {
        endpoint: EndpointId,
        value: bool,
    },
    GetVerbose {
        endpoint: EndpointId,
    },
    CreateNewDevice,
    Introspect,
    /// Used by the bridge (C6) to perform a replier bind/unbind on
    /// behalf of a remote binder without going through a local
    /// `EndpointHandle` (spec §4.6, "peer -> local" bind-event handling).
    ProxyReplierBind {
        endpoint: EndpointId,
        name: String,
        bind: bool,
    },
    /// Used by the bridge to check whether the current local replier for
    /// a name still matches an expected endpoint id (spec §4.6,
    /// stateful-request `final_to` check).
    CheckReplierIs {
        name: String,
        expected: EndpointId,
    },
    /// Used by the bridge to preserve a peer-originated message's full id
    /// (network id and serial both) through local admission (spec §4.6).
    ProxySetPresetId {
        endpoint: EndpointId,
        id: MessageId,
    },
}

pub enum Reply {
    Opened(EndpointId),
    Closed,
    Bound,
    Unbound,
    Written,
    Sent(MessageId),
    Discarded,
    MessageLength(usize),
    BytesLeft(usize),
    Bytes(Vec<u8>),
    LastSentId(Option<MessageId>),
    Replier(Option<EndpointId>),
    MaxMessagesSet,
    MaxMessages(usize),
    Count(usize),
    BoolValue(bool),
    FlagSet,
    DeviceCreated(DeviceId),
    Introspection(String),
    ReplierIs(bool),
    Err(SwitchError),
}
