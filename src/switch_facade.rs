//! The per-endpoint client handle (part of C5), exposing the full control
//! surface of spec §4.5.
//!
//! Grounded on the teacher's `SocketFacade` (`send_cmd` plus a blocking
//! `recv()` on a notify channel): here each call opens its own one-shot
//! reply channel instead of sharing one long-lived notify channel, since
//! the backend multiplexes many endpoints across many devices rather than
//! one event loop per socket.

use std::sync::mpsc;

use crate::endpoint::{EndpointId, Mode};
use crate::error::{Result, SwitchError};
use crate::event_loop_msg::{Command, DeviceId, Reply, Request};
use crate::message::{Flags, MessageId, NetworkRef};

/// A connection to one device of a `Switch`: the unit of bind/send/read
/// (spec glossary, "Endpoint").
pub struct EndpointHandle {
    cmd_tx: mpsc::Sender<Request>,
    device: DeviceId,
    endpoint: EndpointId,
    mode: Mode,
}

impl EndpointHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<Request>,
        device: DeviceId,
        endpoint: EndpointId,
        mode: Mode,
    ) -> EndpointHandle {
        EndpointHandle {
            cmd_tx,
            device,
            endpoint,
            mode,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.endpoint
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn call(&self, command: Command) -> Result<Reply> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.cmd_tx
            .send(Request {
                device: self.device,
                command,
                reply: reply_tx,
            })
            .map_err(|_| SwitchError::Invalid("switch backend thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| SwitchError::Invalid("switch backend thread is gone"))
    }

    fn require_write(&self) -> Result<()> {
        if self.mode != Mode::ReadWrite {
            return Err(SwitchError::Invalid(
                "endpoint was opened read-only; send/write are unavailable",
            ));
        }
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        match self.call(Command::Close {
            endpoint: self.endpoint,
        })? {
            Reply::Closed => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Close")),
        }
    }

    pub fn bind(&self, name: &str, role: crate::Role) -> Result<()> {
        match self.call(Command::Bind {
            endpoint: self.endpoint,
            name: name.to_owned(),
            role,
        })? {
            Reply::Bound => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Bind")),
        }
    }

    pub fn unbind(&self, name: &str, role: crate::Role) -> Result<()> {
        match self.call(Command::Unbind {
            endpoint: self.endpoint,
            name: name.to_owned(),
            role,
        })? {
            Reply::Unbound => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Unbind")),
        }
    }

    /// Begins composing a new message with the given name, discarding any
    /// message composed but not yet sent (spec §4.2).
    pub fn start_write(&self, name: &str) -> Result<()> {
        self.require_write()?;
        match self.call(Command::StartWrite {
            endpoint: self.endpoint,
            name: name.to_owned(),
        })? {
            Reply::Written => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to StartWrite")),
        }
    }

    /// Appends to the composing buffer; repeated calls concatenate (spec
    /// §4.2).
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.require_write()?;
        match self.call(Command::Write {
            endpoint: self.endpoint,
            data: bytes.to_vec(),
        })? {
            Reply::Written => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Write")),
        }
    }

    /// Sets the routing/flag options for the message currently composing.
    pub fn set_write_options(
        &self,
        to: u32,
        in_reply_to: MessageId,
        flags: Flags,
        final_to: NetworkRef,
    ) -> Result<()> {
        self.require_write()?;
        match self.call(Command::SetWriteOptions {
            endpoint: self.endpoint,
            to,
            in_reply_to,
            flags,
            final_to,
        })? {
            Reply::Written => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to SetWriteOptions")),
        }
    }

    /// Commits the composed message to the switch, returning the id it was
    /// stamped with. Under `ALL_OR_WAIT` backpressure this call parks on
    /// the backend until every recipient has room (spec §4.2); it always
    /// returns a sent id or an error, never a partial result.
    pub fn send(&self) -> Result<MessageId> {
        self.require_write()?;
        match self.call(Command::Send {
            endpoint: self.endpoint,
        })? {
            Reply::Sent(id) => Ok(id),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Send")),
        }
    }

    pub fn discard(&self) -> Result<()> {
        match self.call(Command::Discard {
            endpoint: self.endpoint,
        })? {
            Reply::Discarded => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Discard")),
        }
    }

    /// Opens the head message for reading and returns its total byte
    /// length, or 0 if the queue is empty (spec §4.5).
    pub fn next_message_length(&self) -> Result<usize> {
        match self.call(Command::NextMessageLength {
            endpoint: self.endpoint,
        })? {
            Reply::MessageLength(len) => Ok(len),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to NextMessageLength")),
        }
    }

    pub fn bytes_left_in_current(&self) -> Result<usize> {
        match self.call(Command::BytesLeftInCurrent {
            endpoint: self.endpoint,
        })? {
            Reply::BytesLeft(n) => Ok(n),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to BytesLeftInCurrent")),
        }
    }

    pub fn read_bytes(&self, n: usize) -> Result<Vec<u8>> {
        match self.call(Command::ReadBytes {
            endpoint: self.endpoint,
            n,
        })? {
            Reply::Bytes(b) => Ok(b),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to ReadBytes")),
        }
    }

    /// Convenience built atop `next_message_length`/`read_bytes`: drains
    /// the entire head message's wire encoding in one call and decodes
    /// it back into a [`crate::Message`] (spec §3: what is read from the
    /// switch is the entire serialised message, header included).
    pub fn read_message(&self) -> Result<Option<crate::Message>> {
        let len = self.next_message_length()?;
        if len == 0 {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let chunk = self.read_bytes(len - out.len())?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        let mut cursor = std::io::Cursor::new(out);
        crate::Message::read_wire(&mut cursor).map(Some)
    }

    pub fn last_sent_id(&self) -> Result<Option<MessageId>> {
        match self.call(Command::LastSentId {
            endpoint: self.endpoint,
        })? {
            Reply::LastSentId(id) => Ok(id),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to LastSentId")),
        }
    }

    pub fn find_replier(&self, name: &str) -> Result<Option<EndpointId>> {
        match self.call(Command::FindReplier {
            name: name.to_owned(),
        })? {
            Reply::Replier(r) => Ok(r),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to FindReplier")),
        }
    }

    pub fn set_max_messages(&self, n: usize) -> Result<()> {
        match self.call(Command::SetMaxMessages {
            endpoint: self.endpoint,
            n,
        })? {
            Reply::MaxMessagesSet => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to SetMaxMessages")),
        }
    }

    pub fn max_messages(&self) -> Result<usize> {
        match self.call(Command::GetMaxMessages {
            endpoint: self.endpoint,
        })? {
            Reply::MaxMessages(n) => Ok(n),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to GetMaxMessages")),
        }
    }

    pub fn num_messages(&self) -> Result<usize> {
        match self.call(Command::NumMessages {
            endpoint: self.endpoint,
        })? {
            Reply::Count(n) => Ok(n),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to NumMessages")),
        }
    }

    pub fn num_unreplied_to(&self) -> Result<usize> {
        match self.call(Command::NumUnrepliedTo {
            endpoint: self.endpoint,
        })? {
            Reply::Count(n) => Ok(n),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to NumUnrepliedTo")),
        }
    }

    pub fn set_only_once(&self, value: bool) -> Result<()> {
        match self.call(Command::SetOnlyOnce {
            endpoint: self.endpoint,
            value,
        })? {
            Reply::FlagSet => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to SetOnlyOnce")),
        }
    }

    pub fn only_once(&self) -> Result<bool> {
        match self.call(Command::GetOnlyOnce {
            endpoint: self.endpoint,
        })? {
            Reply::BoolValue(v) => Ok(v),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to GetOnlyOnce")),
        }
    }

    pub fn set_report_replier_binds(&self, value: bool) -> Result<()> {
        match self.call(Command::SetReportReplierBinds {
            endpoint: self.endpoint,
            value,
        })? {
            Reply::FlagSet => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to SetReportReplierBinds")),
        }
    }

    pub fn report_replier_binds(&self) -> Result<bool> {
        match self.call(Command::GetReportReplierBinds {
            endpoint: self.endpoint,
        })? {
            Reply::BoolValue(v) => Ok(v),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to GetReportReplierBinds")),
        }
    }

    pub fn set_verbose(&self, value: bool) -> Result<()> {
        match self.call(Command::SetVerbose {
            endpoint: self.endpoint,
            value,
        })? {
            Reply::FlagSet => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to SetVerbose")),
        }
    }

    pub fn verbose(&self) -> Result<bool> {
        match self.call(Command::GetVerbose {
            endpoint: self.endpoint,
        })? {
            Reply::BoolValue(v) => Ok(v),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to GetVerbose")),
        }
    }

    /// Binds or unbinds this endpoint as Replier on behalf of a remote
    /// peer (bridge use only, spec §4.6 "peer -> local" bind-event
    /// handling) — not part of the ordinary control surface.
    pub(crate) fn proxy_replier_bind(&self, name: &str, bind: bool) -> Result<()> {
        match self.call(Command::ProxyReplierBind {
            endpoint: self.endpoint,
            name: name.to_owned(),
            bind,
        })? {
            Reply::Bound => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to ProxyReplierBind")),
        }
    }

    /// Checks whether `expected` is still the local Replier for `name`
    /// (bridge use only, spec §4.6 stateful-request `final_to` check).
    pub(crate) fn check_replier_is(&self, name: &str, expected: EndpointId) -> Result<bool> {
        match self.call(Command::CheckReplierIs {
            name: name.to_owned(),
            expected,
        })? {
            Reply::ReplierIs(v) => Ok(v),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to CheckReplierIs")),
        }
    }

    /// Pre-sets the full id of the message currently composing (bridge use
    /// only, spec §4.6: preserves a peer-originated message's id, network
    /// id and serial both, through local admission so a later Reply can be
    /// matched back to it). Must follow `start_write` and precede `send`.
    pub(crate) fn proxy_set_preset_id(&self, id: MessageId) -> Result<()> {
        self.require_write()?;
        match self.call(Command::ProxySetPresetId {
            endpoint: self.endpoint,
            id,
        })? {
            Reply::Written => Ok(()),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to ProxySetPresetId")),
        }
    }
}
