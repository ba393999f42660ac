//! A lightweight in-process message bus: named publish/subscribe and
//! request/reply over a kernel-mediated-style switch, with a bridge
//! protocol for linking two switches over a byte stream.
//!
//! Senders publish named messages; receivers bind to message names either
//! as passive [`Listener`](binding::Role::Listener)s or as the single
//! authoritative [`Replier`](binding::Role::Replier), and draw messages
//! from a per-endpoint queue. The switch guarantees message ordering,
//! at-most-one replier per name, and that every Request ultimately yields
//! exactly one Reply (synthetic if necessary).
//!
//! The crate is organised as a facade/backend split: [`Switch`] is a thin
//! client handle that sends commands across a channel to a dedicated
//! backend thread owning all mutable state, and [`EndpointHandle`] is the
//! per-connection handle obtained from it. This single backend thread is
//! the switch's one logical critical section per device.

mod binding;
mod endpoint;
mod error;
mod event_loop_msg;
mod introspect;
mod message;
mod name;
mod switch_impl;

pub mod bridge;
pub mod device;
pub mod switch_facade;

pub use binding::Role;
pub use device::Switch;
pub use event_loop_msg::DeviceId;
pub use endpoint::{EndpointId, Mode};
pub use error::{Result, SwitchError};
pub use message::{Flags, Message, MessageBuilder, MessageId, NetworkRef};
pub use name::Name;
pub use switch_facade::EndpointHandle;

/// Implementation policy limits (spec's §3 data model is silent on exact
/// values; these are the defaults this crate enforces, analogous to the
/// original's kernel-tunable `KBUS_MAX_NAME_LEN` and message-size caps).
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_name_len: usize,
    pub max_entire_data_len: usize,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_name_len: 1000,
            max_entire_data_len: 1 << 20,
        }
    }
}
