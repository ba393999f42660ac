//! The bridge's steady-state duplex transport: after the handshake
//! (`wire::exchange_helo`), one dedicated thread reads framed `Message`s
//! off the peer and hands them to `mod.rs`'s main loop, and another
//! drains an outbound queue onto the peer.
//!
//! The teacher multiplexes an unbounded number of pipes behind one
//! non-blocking `mio` event loop because one nanomsg socket can have many
//! peers. A bridge instance is, by construction, exactly one connection
//! to exactly one peer switch (spec §4.6) — there is nothing to
//! multiplex — so this gives each direction its own blocking thread
//! instead, the same "one thread owns one critical section" shape
//! `switch_impl.rs`'s backend thread already uses for a device.

use std::io::{Read, Write};
use std::sync::mpsc;
use std::thread;

use log::{debug, warn};

use crate::message::Message;

/// Handle to the two background threads moving messages across one
/// bridge connection.
pub struct Pipe {
    outbound: mpsc::Sender<Message>,
    inbound: mpsc::Receiver<Message>,
}

impl Pipe {
    /// Spawns the reader and writer threads over an already
    /// handshake-completed duplex connection, split into independent
    /// read/write halves (e.g. two `TcpStream`s from `try_clone`).
    pub fn spawn<R, W>(mut reader: R, mut writer: W) -> Pipe
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel::<Message>();
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>();

        thread::Builder::new()
            .name("kswitch-bridge-reader".to_owned())
            .spawn(move || loop {
                match Message::read_wire(&mut reader) {
                    Ok(msg) => {
                        if inbound_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("[bridge] peer connection closed or malformed: {}", e);
                        break;
                    }
                }
            })
            .expect("failed to spawn bridge reader thread");

        thread::Builder::new()
            .name("kswitch-bridge-writer".to_owned())
            .spawn(move || {
                for msg in outbound_rx {
                    if let Err(e) = msg.write_wire(&mut writer) {
                        warn!("[bridge] failed writing to peer: {}", e);
                        break;
                    }
                }
            })
            .expect("failed to spawn bridge writer thread");

        Pipe {
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }

    pub fn send_to_peer(&self, msg: Message) -> Result<(), Message> {
        self.outbound.send(msg).map_err(|e| e.0)
    }

    pub fn try_recv_from_peer(&self) -> Option<Message> {
        self.inbound.try_recv().ok()
    }
}
