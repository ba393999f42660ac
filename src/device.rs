//! The switch-level client handle (part of C5).
//!
//! Grounded on the teacher's implied `SessionFacade` (referenced, not
//! retrieved, by `event_loop_msg.rs`'s `SessionCmdSignal::CreateSocket` /
//! `SessionNotify::SocketCreated` pair): a process may host one `Switch`,
//! which in turn hosts any number of independent devices (spec §3, §9,
//! "a device factory creates new devices on demand"). `Switch` owns the
//! channel to the backend thread spawned by `switch_impl::SwitchCore`;
//! `open` hands out an `EndpointHandle` scoped to one device.

use std::sync::mpsc;

use crate::endpoint::Mode;
use crate::error::{Result, SwitchError};
use crate::event_loop_msg::{Command, DeviceId, Reply, Request};
use crate::switch_facade::EndpointHandle;
use crate::switch_impl::SwitchCore;
use crate::Limits;

/// A running switch: one backend thread, any number of devices, each an
/// independent namespace of endpoints and bindings.
pub struct Switch {
    cmd_tx: mpsc::Sender<Request>,
}

impl Switch {
    /// Starts the backend thread and returns a handle to it. Device `0`
    /// already exists, ready for `open`.
    pub fn new(limits: Limits) -> Switch {
        Switch {
            cmd_tx: SwitchCore::spawn(limits),
        }
    }

    fn call(&self, device: DeviceId, command: Command) -> Result<Reply> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.cmd_tx
            .send(Request {
                device,
                command,
                reply: reply_tx,
            })
            .map_err(|_| SwitchError::Invalid("switch backend thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| SwitchError::Invalid("switch backend thread is gone"))
    }

    /// Creates a fresh, independent device: its own endpoint-id counter
    /// and binding table (spec §9).
    pub fn create_new_device(&self) -> Result<DeviceId> {
        match self.call(0, Command::CreateNewDevice)? {
            Reply::DeviceCreated(id) => Ok(id),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to CreateNewDevice")),
        }
    }

    /// Opens a fresh endpoint on `device` (spec §4.5 `open(device) ->
    /// endpoint`). `Mode::Read` forbids `send`, `write` and binding as
    /// Replier is permitted but uncommon in that mode (spec §6).
    pub fn open(&self, device: DeviceId, mode: Mode) -> Result<EndpointHandle> {
        match self.call(device, Command::Open { mode })? {
            Reply::Opened(endpoint) => Ok(EndpointHandle::new(
                self.cmd_tx.clone(),
                device,
                endpoint,
                mode,
            )),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Open")),
        }
    }

    /// Renders the current binding table of `device` (spec §6
    /// introspection surface; textual encoding is not load-bearing).
    pub fn introspect(&self, device: DeviceId) -> Result<String> {
        match self.call(device, Command::Introspect)? {
            Reply::Introspection(text) => Ok(text),
            Reply::Err(e) => Err(e),
            _ => Err(SwitchError::Invalid("unexpected reply to Introspect")),
        }
    }
}
