//! Per-endpoint state (C2): bindings are owned by the binding table, but
//! the inbound queue, send buffer and per-endpoint counters live here.
//!
//! Grounded on the teacher's `SocketFacade` (the client-visible handle,
//! `socket_facade.rs`) for the shape of the public operations, and on
//! `pipe.rs`'s `RecvOperation` for the idea of a small state machine
//! tracking a partially-completed operation (there: a partial wire read;
//! here: a partially composed outgoing message and a partially consumed
//! incoming one).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{Result, SwitchError};
use crate::message::{Flags, Message, MessageBuilder, MessageId, NetworkRef};
use crate::name::Name;

pub type EndpointId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    ReadWrite,
}

/// The send buffer's state machine (spec §4.2).
enum SendState {
    Idle,
    /// Between the first `write` and a `send`/`discard`.
    Composing(MessageBuilder),
    /// `send` returned `WouldBlock` under `ALL_OR_WAIT`; the switch
    /// retains the message and will retry delivery as space frees up.
    PendingSend(Message),
}

/// Read-side cursor over the head-of-queue message (spec §4.5:
/// `next_message_length`/`read_bytes` are cursor-based).
///
/// Per spec §3, what a caller reads is the *entire* wire-serialised
/// message (header, name and data together) — the same bytes a bridge
/// would put on a byte stream — not just the opaque data payload. The
/// cursor therefore snapshots the message's `write_wire` encoding once,
/// at `next_message_length` time, and streams out of that buffer.
struct ReadCursor {
    id: MessageId,
    bytes: Vec<u8>,
    consumed: usize,
}

pub struct Endpoint {
    pub id: EndpointId,
    pub device: u32,
    pub mode: Mode,
    inbound: VecDeque<Arc<Message>>,
    max_messages: usize,
    send_state: SendState,
    read_cursor: Option<ReadCursor>,
    /// Requests read as the designated Replier but not yet answered,
    /// keyed by id with the request's name kept alongside so an explicit
    /// Replier unbind (spec §4.4) can tell which outstanding requests
    /// belong to the pattern being unbound.
    pub unreplied_requests: HashMap<MessageId, Name>,
    pub outstanding_sent_requests: u32,
    pub only_once: bool,
    pub report_replier_binds: bool,
    pub verbose: bool,
    last_sent_id: Option<MessageId>,
    /// Messages this endpoint already holds a queued reference to, when
    /// `only_once` is set — lets the switch avoid double-enqueuing a
    /// message matched by more than one of this endpoint's bindings.
    queued_ids: HashSet<MessageId>,
}

impl Endpoint {
    pub fn new(id: EndpointId, device: u32, mode: Mode) -> Endpoint {
        Endpoint {
            id,
            device,
            mode,
            inbound: VecDeque::new(),
            max_messages: 100,
            send_state: SendState::Idle,
            read_cursor: None,
            unreplied_requests: HashMap::new(),
            outstanding_sent_requests: 0,
            only_once: false,
            report_replier_binds: false,
            verbose: false,
            last_sent_id: None,
            queued_ids: HashSet::new(),
        }
    }

    pub fn can_write(&self) -> bool {
        self.mode == Mode::ReadWrite
    }

    // -- send buffer --------------------------------------------------

    pub fn start_write(&mut self, name: Name) -> Result<()> {
        match self.send_state {
            SendState::Idle => {
                self.send_state = SendState::Composing(Message::builder(name));
                Ok(())
            }
            SendState::Composing(_) => {
                // Starting a fresh compose implicitly discards the
                // previous one, matching the teacher's `send_buffer`
                // always being overwritable up until `send` commits it.
                self.send_state = SendState::Composing(Message::builder(name));
                Ok(())
            }
            SendState::PendingSend(_) => Err(SwitchError::AlreadyInSend),
        }
    }

    pub fn append_write(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.send_state {
            SendState::Composing(builder) => {
                builder.append(bytes);
                Ok(())
            }
            SendState::PendingSend(_) => Err(SwitchError::AlreadyInSend),
            SendState::Idle => Err(SwitchError::Invalid("write before starting a message")),
        }
    }

    pub fn set_write_options(
        &mut self,
        to: u32,
        in_reply_to: MessageId,
        flags: Flags,
        final_to: NetworkRef,
    ) -> Result<()> {
        match &mut self.send_state {
            SendState::Composing(builder) => {
                builder.set_options(to, in_reply_to, flags, final_to);
                Ok(())
            }
            SendState::PendingSend(_) => Err(SwitchError::AlreadyInSend),
            SendState::Idle => Err(SwitchError::Invalid("write before starting a message")),
        }
    }

    /// Bridge-only: see `MessageBuilder::set_preset_id`.
    pub fn set_preset_id(&mut self, id: MessageId) -> Result<()> {
        match &mut self.send_state {
            SendState::Composing(builder) => {
                builder.set_preset_id(id);
                Ok(())
            }
            SendState::PendingSend(_) => Err(SwitchError::AlreadyInSend),
            SendState::Idle => Err(SwitchError::Invalid("write before starting a message")),
        }
    }

    pub fn discard(&mut self) {
        self.send_state = SendState::Idle;
    }

    /// Takes the composed message out, leaving the buffer idle. Returns
    /// `NoMessage` if nothing was composed.
    pub fn take_composed(&mut self) -> Result<MessageBuilder> {
        match std::mem::replace(&mut self.send_state, SendState::Idle) {
            SendState::Composing(builder) => Ok(builder),
            SendState::Idle => Err(SwitchError::NoMessage),
            other @ SendState::PendingSend(_) => {
                self.send_state = other;
                Err(SwitchError::AlreadyInSend)
            }
        }
    }

    /// Parks a fully-validated message that could not be delivered yet
    /// under `ALL_OR_WAIT` backpressure; the endpoint is in `send` state
    /// until the switch retries and notifies completion.
    pub fn park_pending_send(&mut self, msg: Message) {
        self.send_state = SendState::PendingSend(msg);
    }

    pub fn pending_send(&self) -> Option<&Message> {
        match &self.send_state {
            SendState::PendingSend(m) => Some(m),
            _ => None,
        }
    }

    pub fn clear_pending_send(&mut self) {
        self.send_state = SendState::Idle;
    }

    pub fn record_sent_id(&mut self, id: MessageId) {
        self.last_sent_id = Some(id);
    }

    pub fn last_sent_id(&self) -> Option<MessageId> {
        self.last_sent_id
    }

    // -- inbound queue --------------------------------------------------

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn set_max_messages(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(SwitchError::Invalid("max_messages must be at least 1"));
        }
        self.max_messages = n;
        Ok(())
    }

    pub fn num_messages(&self) -> usize {
        self.inbound.len()
    }

    pub fn has_room(&self) -> bool {
        self.inbound.len() < self.max_messages
    }

    /// Enqueues `msg`, honouring `only_once` (skip if this endpoint
    /// already holds a reference to the same message id) and `URGENT`
    /// (head-of-queue insertion, spec §5 ordering guarantee 3).
    ///
    /// Returns `false` if skipped because of `only_once` dedup — this is
    /// not a failure, just nothing to do.
    pub fn enqueue(&mut self, msg: Arc<Message>) -> Result<bool> {
        if self.only_once && !msg.id.is_unset() && self.queued_ids.contains(&msg.id) {
            return Ok(false);
        }
        if !self.has_room() {
            return Err(SwitchError::Busy);
        }

        if !msg.id.is_unset() {
            self.queued_ids.insert(msg.id);
        }

        if msg.flags.contains(Flags::URGENT) {
            self.inbound.push_front(msg);
        } else {
            self.inbound.push_back(msg);
        }
        Ok(true)
    }

    /// Opens the head message for reading, discarding any unread
    /// remainder of a previous partially-read message, per spec §4.5.
    /// Returns the total wire length, or 0 if the queue is empty.
    pub fn next_message_length(&mut self) -> usize {
        self.read_cursor = None;
        match self.inbound.front() {
            Some(msg) => {
                let mut bytes = Vec::new();
                msg.write_wire(&mut bytes)
                    .expect("writing to a Vec<u8> cannot fail");
                let len = bytes.len();
                self.read_cursor = Some(ReadCursor {
                    id: msg.id,
                    bytes,
                    consumed: 0,
                });
                len
            }
            None => 0,
        }
    }

    pub fn bytes_left_in_current(&self) -> usize {
        match &self.read_cursor {
            Some(c) => c.bytes.len() - c.consumed,
            None => 0,
        }
    }

    /// Reads up to `n` bytes of the current message's wire encoding,
    /// advancing the cursor and popping the message off the queue once
    /// fully consumed. Partial reads are allowed.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let cursor = self
            .read_cursor
            .as_mut()
            .ok_or_else(|| SwitchError::Invalid("no message open for reading"))?;

        let remaining = cursor.bytes.len() - cursor.consumed;
        let take = n.min(remaining);
        let out = cursor.bytes[cursor.consumed..cursor.consumed + take].to_vec();
        cursor.consumed += take;

        if cursor.consumed == cursor.bytes.len() {
            let id = cursor.id;
            self.read_cursor = None;
            self.inbound.pop_front();
            self.queued_ids.remove(&id);
        }

        Ok(out)
    }

    /// Removes every queued reference to `id` without requiring a read —
    /// used when an endpoint closes so its queue's accounting is
    /// consistent, and by tests asserting on conservation (spec §8).
    pub fn drain_all(&mut self) -> Vec<Arc<Message>> {
        self.read_cursor = None;
        self.queued_ids.clear();
        self.inbound.drain(..).collect()
    }
}
