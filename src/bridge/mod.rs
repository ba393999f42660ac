//! The bridge daemon (C6): a pair of processes, each attached to its own
//! local switch, that serialises messages across a byte stream while
//! preserving publish/subscribe and request/reply semantics between the
//! two switches (spec §4.6).
//!
//! The bridge drives its local switch through the ordinary public
//! [`crate::EndpointHandle`] surface -- it is not a privileged client,
//! just one that happens to proxy Replier bindings and rewrite a few
//! message fields. Grounded on the teacher's `pipe.rs` for the handshake
//! sequencing and on `socket_facade.rs`/`global.rs` for driving a
//! connection from ordinary client-visible operations rather than direct
//! access to switch internals.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Result, SwitchError};
use crate::message::{Flags, Message, MessageId, NetworkRef};
use crate::name::Name;
use crate::switch_facade::EndpointHandle;
use crate::Role;

pub mod wire;
mod pipe;

use pipe::Pipe;

/// How long the local-switch poll loop sleeps between empty
/// `read_message` calls. `EndpointHandle` has no blocking "wait for the
/// next message" primitive -- each call is a synchronous round trip to
/// the backend thread that returns immediately if the queue is empty --
/// so the bridge's main loop polls both sides rather than blocking on
/// either exclusively.
const LOCAL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A duplex byte stream that can be split into independent read and
/// write halves, each usable from its own thread. Implemented for the
/// two stream types `runlimpet.py` supports (TCP and, on Unix, a domain
/// socket); the bridge itself is transport-agnostic beyond this.
pub trait Transport: Read + Write + Send + 'static {
    type Reader: Read + Send + 'static;
    type Writer: Write + Send + 'static;

    fn split(self) -> std::io::Result<(Self::Reader, Self::Writer)>;
}

impl Transport for TcpStream {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn split(self) -> std::io::Result<(TcpStream, TcpStream)> {
        let writer = self.try_clone()?;
        Ok((self, writer))
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    type Reader = std::os::unix::net::UnixStream;
    type Writer = std::os::unix::net::UnixStream;

    fn split(self) -> std::io::Result<(Self::Reader, Self::Writer)> {
        let writer = self.try_clone()?;
        Ok((self, writer))
    }
}

/// Bridge setup parameters (spec §4.6, §6).
pub struct BridgeConfig {
    /// Network id this bridge advertises in the `HELO` preamble and
    /// stamps onto messages it forwards outward. Must be nonzero.
    pub our_network_id: u32,
    /// Binding pattern the bridge subscribes to as Listener on the local
    /// switch; only messages matching it are proxied. Defaults to `$.*`.
    pub subscribe_pattern: String,
    /// A message name that, when read from the local switch, causes the
    /// bridge to close cleanly rather than forward it (spec §6).
    pub poison: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> BridgeConfig {
        BridgeConfig {
            our_network_id: 1,
            subscribe_pattern: "$.*".to_owned(),
            poison: None,
        }
    }
}

/// Bookkeeping for a Request this bridge forwarded to the peer while
/// standing in locally as the apparent Replier (spec §4.6, local → peer).
struct ProxiedRequest {
    original_from: u32,
    original_id: MessageId,
}

/// One end of a bridge connection: one local endpoint, one peer pipe, and
/// the bookkeeping needed to translate between them.
pub struct Bridge {
    handle: EndpointHandle,
    our_network_id: u32,
    peer_network_id: u32,
    pipe: Pipe,
    poison: Option<Name>,
    replier_bind_event: Name,
    pending_requests: HashMap<MessageId, ProxiedRequest>,
}

impl Bridge {
    /// Performs the `HELO` handshake over `stream`, registers the local
    /// endpoint's subscriptions, and spawns the peer transport threads.
    /// `handle` should be freshly opened in read+write mode and not yet
    /// bound to anything.
    pub fn connect<T: Transport>(
        handle: EndpointHandle,
        config: BridgeConfig,
        mut stream: T,
    ) -> Result<Bridge> {
        assert!(config.our_network_id != 0, "bridge network id must be nonzero");

        let peer_network_id = wire::exchange_helo(&mut stream, config.our_network_id)?;
        info!(
            "bridge handshake complete: we are network {}, peer is network {}",
            config.our_network_id, peer_network_id
        );

        handle.set_report_replier_binds(true)?;
        handle.bind("$.KBUS.ReplierBindEvent", Role::Listener)?;
        handle.bind(&config.subscribe_pattern, Role::Listener)?;
        // A pattern as broad as the default `$.*` already covers the
        // event name above; MSGONLYONCE keeps each matching message
        // delivered to us a single time (`runlimpet.py`'s note on why it
        // sets the analogous nanomsg/KBUS option).
        handle.set_only_once(true)?;

        let poison = config
            .poison
            .as_deref()
            .map(Name::parse_literal)
            .transpose()?;

        let (reader, writer) = stream.split()?;

        Ok(Bridge {
            handle,
            our_network_id: config.our_network_id,
            peer_network_id,
            pipe: Pipe::spawn(reader, writer),
            poison,
            replier_bind_event: Name::parse_literal("$.KBUS.ReplierBindEvent").unwrap(),
            pending_requests: HashMap::new(),
        })
    }

    /// Runs the forwarding loop until the poison message (if configured)
    /// is seen on the local switch, or the peer connection is lost.
    pub fn run(mut self) -> Result<()> {
        loop {
            if let Some(msg) = self.pipe.try_recv_from_peer() {
                self.handle_from_peer(msg)?;
                continue;
            }

            match self.handle.read_message()? {
                Some(msg) => {
                    if let Some(poison) = &self.poison {
                        if &msg.name == poison {
                            info!("poison message received, closing bridge");
                            return Ok(());
                        }
                    }
                    self.handle_from_local(msg)?;
                }
                None => thread::sleep(LOCAL_POLL_INTERVAL),
            }
        }
    }

    // -- local -> peer (spec §4.6) --------------------------------------

    fn handle_from_local(&mut self, mut msg: Message) -> Result<()> {
        if msg.id.network_id != 0 && msg.id.network_id == self.peer_network_id {
            // Arrived here because we're subscribed broadly and just
            // forwarded or admitted this very message ourselves; it
            // originated on the peer's side, so don't bounce it back.
            return Ok(());
        }

        if msg.name == self.replier_bind_event {
            match parse_bind_event(&msg.data) {
                Some((_, binder_id, _)) if binder_id == self.handle.id() => return Ok(()),
                Some(_) => {}
                None => {
                    warn!("[bridge] malformed ReplierBindEvent payload, dropping");
                    return Ok(());
                }
            }
        }

        let original_id = msg.id;
        if msg.id.network_id == 0 {
            msg.id.network_id = self.our_network_id;
        }
        if msg.orig_from.is_unset() {
            msg.orig_from = NetworkRef {
                network_id: self.our_network_id,
                local_id: msg.from,
            };
        }
        if !msg.is_reply() {
            // `to` is always the locally-resolved replier's endpoint id by
            // the time a Request/Announcement is admitted and readable
            // here (spec §4.4 stamping) -- an id from our own device's
            // namespace, meaningless to the peer. The only addressing
            // that survives a bridge hop is `final_to`, which a caller
            // sets explicitly and the switch never rewrites.
            msg.to = 0;
        }

        if msg.is_request() {
            self.pending_requests.insert(
                msg.id,
                ProxiedRequest {
                    original_from: msg.from,
                    original_id,
                },
            );
        }

        debug!("[bridge] local -> peer: {} ({:?})", msg.name, msg.id);
        if self.pipe.send_to_peer(msg).is_err() {
            warn!("[bridge] peer connection is gone");
        }
        Ok(())
    }

    // -- peer -> local (spec §4.6) ---------------------------------------

    fn handle_from_peer(&mut self, msg: Message) -> Result<()> {
        if msg.name == self.replier_bind_event {
            return self.handle_peer_bind_event(&msg);
        }

        if msg.is_reply() {
            return self.handle_peer_reply(msg);
        }

        if msg.final_to.network_id == self.our_network_id && msg.final_to.network_id != 0 {
            let still_bound = self
                .handle
                .check_replier_is(&msg.name.to_string(), msg.final_to.local_id)?;
            if !still_bound {
                self.reply_not_same_ksock(&msg);
                return Ok(());
            }
        }

        self.forward_to_local(msg)
    }

    fn handle_peer_bind_event(&self, msg: &Message) -> Result<()> {
        let Some((is_bind, _binder_id, name)) = parse_bind_event(&msg.data) else {
            warn!("[bridge] malformed ReplierBindEvent payload from peer, dropping");
            return Ok(());
        };
        debug!(
            "[bridge] peer {} replier bind for {}",
            if is_bind { "set" } else { "cleared" },
            name
        );
        self.handle.proxy_replier_bind(&name, is_bind)
    }

    fn handle_peer_reply(&mut self, mut msg: Message) -> Result<()> {
        let Some(proxied) = self.pending_requests.remove(&msg.in_reply_to) else {
            warn!(
                "[bridge] reply from peer with no matching proxied request: {:?}",
                msg.in_reply_to
            );
            return Ok(());
        };

        msg.in_reply_to = proxied.original_id;
        self.inject_reply(proxied.original_from, msg)
    }

    fn inject_reply(&self, to: u32, msg: Message) -> Result<()> {
        self.handle.start_write(&msg.name.to_string())?;
        if !msg.data.is_empty() {
            self.handle.write(&msg.data)?;
        }
        self.handle
            .set_write_options(to, msg.in_reply_to, msg.flags, NetworkRef::UNSET)?;
        self.handle.send()?;
        Ok(())
    }

    fn forward_to_local(&mut self, msg: Message) -> Result<()> {
        let result = (|| -> Result<()> {
            self.handle.start_write(&msg.name.to_string())?;
            if !msg.data.is_empty() {
                self.handle.write(&msg.data)?;
            }
            self.handle
                .set_write_options(msg.to, MessageId::UNSET, msg.flags, msg.final_to)?;
            self.handle.proxy_set_preset_id(msg.id)?;
            self.handle.send()?;
            Ok(())
        })();

        if let Err(e) = result {
            self.handle.discard().ok();
            self.reply_remote_error(&msg, &e);
        }
        Ok(())
    }

    fn reply_not_same_ksock(&self, request: &Message) {
        let name = Name::parse_literal("$.KBUS.Replier.NotSameKsock").unwrap();
        let reply = synthetic_reply(&name, request.id);
        if self.pipe.send_to_peer(reply).is_err() {
            warn!("[bridge] peer connection is gone, dropping NotSameKsock");
        }
    }

    fn reply_remote_error(&self, request: &Message, err: &SwitchError) {
        let name = Name::parse_literal(&format!("$.KBUS.RemoteError.{}", error_kind(err))).unwrap();
        let reply = synthetic_reply(&name, request.id);
        if self.pipe.send_to_peer(reply).is_err() {
            warn!("[bridge] peer connection is gone, dropping RemoteError");
        }
    }
}

fn synthetic_reply(name: &Name, in_reply_to: MessageId) -> Message {
    Message {
        id: MessageId::UNSET,
        in_reply_to,
        to: 0,
        from: 0,
        orig_from: NetworkRef::UNSET,
        final_to: NetworkRef::UNSET,
        flags: Flags::SYNTHETIC,
        name: name.clone(),
        data: Vec::new(),
    }
}

fn error_kind(err: &SwitchError) -> &'static str {
    match err {
        SwitchError::NameInvalid(_) => "NameInvalid",
        SwitchError::NameTooLong { .. } => "NameTooLong",
        SwitchError::MessageTooLarge { .. } => "MessageTooLarge",
        SwitchError::ReplierConflict { .. } => "ReplierConflict",
        SwitchError::NoSuchBinding { .. } => "NoSuchBinding",
        SwitchError::AddressNotAvailable(_) => "AddressNotAvailable",
        SwitchError::ConnectionRefused => "ConnectionRefused",
        SwitchError::Busy => "Busy",
        SwitchError::WouldBlock => "WouldBlock",
        SwitchError::NoLocks => "NoLocks",
        SwitchError::AlreadyInSend => "AlreadyInSend",
        SwitchError::NoMessage => "NoMessage",
        SwitchError::Invalid(_) => "Invalid",
        SwitchError::NoSuchEndpoint(_) => "NoSuchEndpoint",
        SwitchError::NoSuchDevice(_) => "NoSuchDevice",
        SwitchError::Io(_) => "Io",
    }
}

/// Decodes a `$.KBUS.ReplierBindEvent` payload: `(is_bind: u32,
/// binder_id: u32, name_len: u32, name_bytes, pad)` (spec §4.4).
fn parse_bind_event(data: &[u8]) -> Option<(bool, u32, String)> {
    if data.len() < 12 {
        return None;
    }
    let is_bind = u32::from_be_bytes(data[0..4].try_into().ok()?) != 0;
    let binder_id = u32::from_be_bytes(data[4..8].try_into().ok()?);
    let name_len = u32::from_be_bytes(data[8..12].try_into().ok()?) as usize;
    let name_bytes = data.get(12..12 + name_len)?;
    let name = String::from_utf8(name_bytes.to_vec()).ok()?;
    Some((is_bind, binder_id, name))
}
