//! The canonical message value (C1).
//!
//! Grounded on the teacher's `Message` type (opaque in the retrieved
//! files but used throughout `pipe.rs`/`socket_facade.rs` as a
//! reference-counted, name-plus-body value) and on
//! `transport/stream/mod.rs`'s handshake/framing helpers for the style
//! of a hand-rolled big-endian binary codec via `byteorder`.
//!
//! Per the spec's design note (§9), the wire/construction form (name and
//! data possibly still being composed) and the settled "entire" form
//! callers observe are kept conceptually distinct: `MessageBuilder` plays
//! the role of the "pointy" message during composition, `Message` is
//! always the "entire" form.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::SwitchError;
use crate::name::Name;

/// Minimal hand-rolled bitflags, in the spirit of the teacher keeping its
/// own small helpers (`global.rs`'s `other_io_error` et al.) rather than
/// reaching for a crate for a need this small and this local.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
        pub struct $name($ty);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn bits(self) -> $ty {
                self.0
            }

            pub fn from_bits_truncate(bits: $ty) -> Self {
                let mut known = 0;
                $(known |= $value;)*
                $name(bits & known)
            }

            pub fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

/// `0x7375624B` ("subK" read little-endian) — differs from `END_GUARD`
/// only in byte order, so a reader can detect an endian mismatch by
/// comparing `start_guard.swap_bytes()` against `end_guard`.
pub const START_GUARD: u32 = 0x7375_624B;
/// `0x4B627573` ("Kbus" read little-endian).
pub const END_GUARD: u32 = 0x4B62_7573;

bitflags_like! {
    /// Message flags (spec §6).
    pub struct Flags: u32 {
        const WANT_A_REPLY      = 1 << 0;
        const WANT_YOU_TO_REPLY = 1 << 1;
        const SYNTHETIC         = 1 << 2;
        const URGENT            = 1 << 3;
        const ALL_OR_WAIT       = 1 << 8;
        const ALL_OR_FAIL       = 1 << 9;
    }
}

/// Total-ordered lexicographically by `(network_id, serial)`. `(0, 0)`
/// is the sentinel "unassigned" or "synthetic" id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MessageId {
    pub network_id: u32,
    pub serial: u32,
}

impl MessageId {
    pub const UNSET: MessageId = MessageId {
        network_id: 0,
        serial: 0,
    };

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

/// `(network_id, local_id)` pairs used by `orig_from` and `final_to` to
/// track identities across a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetworkRef {
    pub network_id: u32,
    pub local_id: u32,
}

impl NetworkRef {
    pub const UNSET: NetworkRef = NetworkRef {
        network_id: 0,
        local_id: 0,
    };

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

/// The "entire" message form: every field inline, as observed by callers
/// and as carried on the wire. Cheap to clone by construction — the
/// switch wraps instances in `Rc`/`Arc` before fanning them out so that
/// one payload copy serves every recipient.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub in_reply_to: MessageId,
    pub to: u32,
    pub from: u32,
    pub orig_from: NetworkRef,
    pub final_to: NetworkRef,
    pub flags: Flags,
    pub name: Name,
    pub data: Vec<u8>,
}

impl Message {
    /// A message under construction ("pointy" in the spec's terms: owns
    /// its name/data directly rather than by wire pointer, since this is
    /// Rust rather than C, but conceptually the same pre-admission form).
    pub fn builder(name: Name) -> MessageBuilder {
        MessageBuilder {
            name,
            data: Vec::new(),
            to: 0,
            in_reply_to: MessageId::UNSET,
            flags: Flags::empty(),
            final_to: NetworkRef::UNSET,
            preset_id: None,
        }
    }

    pub fn is_request(&self) -> bool {
        self.flags.contains(Flags::WANT_A_REPLY)
    }

    pub fn is_reply(&self) -> bool {
        !self.in_reply_to.is_unset()
    }

    pub fn is_announcement(&self) -> bool {
        !self.is_request() && !self.is_reply()
    }

    /// Serialises to the bridge wire format (spec §4.6): 16 big-endian
    /// u32 header words (pointer fields omitted, since there are none in
    /// the wire form), then padded name bytes, then padded data bytes,
    /// then a trailing end guard.
    pub fn write_wire<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name_bytes = self.name.to_string().into_bytes();
        let name_len = name_bytes.len() as u32;
        let data_len = self.data.len() as u32;

        w.write_u32::<BigEndian>(START_GUARD)?;
        w.write_u32::<BigEndian>(self.id.network_id)?;
        w.write_u32::<BigEndian>(self.id.serial)?;
        w.write_u32::<BigEndian>(self.in_reply_to.network_id)?;
        w.write_u32::<BigEndian>(self.in_reply_to.serial)?;
        w.write_u32::<BigEndian>(self.to)?;
        w.write_u32::<BigEndian>(self.from)?;
        w.write_u32::<BigEndian>(self.orig_from.network_id)?;
        w.write_u32::<BigEndian>(self.orig_from.local_id)?;
        w.write_u32::<BigEndian>(self.final_to.network_id)?;
        w.write_u32::<BigEndian>(self.final_to.local_id)?;
        w.write_u32::<BigEndian>(0)?; // extra, reserved
        w.write_u32::<BigEndian>(self.flags.bits())?;
        w.write_u32::<BigEndian>(name_len)?;
        w.write_u32::<BigEndian>(data_len)?;
        w.write_u32::<BigEndian>(START_GUARD)?; // 16th word, padding slot kept for symmetry with the original 16-word header

        write_padded(w, &name_bytes, true)?;
        write_padded(w, &self.data, false)?;

        w.write_u32::<BigEndian>(END_GUARD)?;
        Ok(())
    }

    pub fn read_wire<R: Read>(r: &mut R) -> Result<Message, SwitchError> {
        let start_guard = r.read_u32::<BigEndian>()?;
        if start_guard != START_GUARD {
            if start_guard == START_GUARD.swap_bytes() {
                return Err(SwitchError::Invalid("peer uses mismatched byte order"));
            }
            return Err(SwitchError::Invalid("bad start guard"));
        }

        let id = MessageId {
            network_id: r.read_u32::<BigEndian>()?,
            serial: r.read_u32::<BigEndian>()?,
        };
        let in_reply_to = MessageId {
            network_id: r.read_u32::<BigEndian>()?,
            serial: r.read_u32::<BigEndian>()?,
        };
        let to = r.read_u32::<BigEndian>()?;
        let from = r.read_u32::<BigEndian>()?;
        let orig_from = NetworkRef {
            network_id: r.read_u32::<BigEndian>()?,
            local_id: r.read_u32::<BigEndian>()?,
        };
        let final_to = NetworkRef {
            network_id: r.read_u32::<BigEndian>()?,
            local_id: r.read_u32::<BigEndian>()?,
        };
        let _extra = r.read_u32::<BigEndian>()?;
        let flags = Flags::from_bits_truncate(r.read_u32::<BigEndian>()?);
        let name_len = r.read_u32::<BigEndian>()? as usize;
        let data_len = r.read_u32::<BigEndian>()? as usize;
        let _padding_word = r.read_u32::<BigEndian>()?;

        let name_bytes = read_padded(r, name_len, true)?;
        let data = read_padded(r, data_len, false)?;

        let end_guard = r.read_u32::<BigEndian>()?;
        if end_guard != END_GUARD {
            return Err(SwitchError::Invalid("bad end guard"));
        }

        let name_str = String::from_utf8(name_bytes)
            .map_err(|_| SwitchError::Invalid("name is not valid utf-8"))?;
        let name = Name::parse_literal(&name_str)?;

        Ok(Message {
            id,
            in_reply_to,
            to,
            from,
            orig_from,
            final_to,
            flags,
            name,
            data,
        })
    }
}

fn padded_len(len: usize, nul_terminated: bool) -> usize {
    let raw = if nul_terminated { len + 1 } else { len };
    (raw + 3) & !3
}

fn write_padded<W: Write>(w: &mut W, bytes: &[u8], nul_terminated: bool) -> io::Result<()> {
    let total = padded_len(bytes.len(), nul_terminated);
    let mut buf = vec![0u8; total];
    buf[..bytes.len()].copy_from_slice(bytes);
    w.write_all(&buf)
}

fn read_padded<R: Read>(r: &mut R, len: usize, nul_terminated: bool) -> io::Result<Vec<u8>> {
    let total = padded_len(len, nul_terminated);
    let mut buf = vec![0u8; total];
    r.read_exact(&mut buf)?;
    buf.truncate(len);
    Ok(buf)
}

/// Pre-admission message under construction, accumulated across one or
/// more `write`s into an endpoint's send buffer (spec §4.2) before
/// `send` commits it.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    name: Name,
    data: Vec<u8>,
    to: u32,
    in_reply_to: MessageId,
    flags: Flags,
    final_to: NetworkRef,
    preset_id: Option<MessageId>,
}

impl MessageBuilder {
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Appends to the composing body — the shape of repeated `write`
    /// calls concatenating, per spec §4.2.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn set_options(
        &mut self,
        to: u32,
        in_reply_to: MessageId,
        flags: Flags,
        final_to: NetworkRef,
    ) {
        self.to = to;
        self.in_reply_to = in_reply_to;
        self.flags = flags;
        self.final_to = final_to;
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn to(mut self, to: u32) -> Self {
        self.to = to;
        self
    }

    pub fn in_reply_to(mut self, id: MessageId) -> Self {
        self.in_reply_to = id;
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn final_to(mut self, final_to: NetworkRef) -> Self {
        self.final_to = final_to;
        self
    }

    /// Pre-sets the eventual `id` outright, bypassing the switch's usual
    /// "always starts unassigned, gets a fresh serial stamped on
    /// admission" rule (spec §4.3). Not part of the ordinary control
    /// surface — a bridge uses this so that a peer-originated message
    /// keeps the exact id it already carries (both the network id and the
    /// serial the *other* switch stamped) through local admission here:
    /// `stamp_id` only ever assigns a fresh serial when `network_id == 0`,
    /// so a nonzero preset id passes through unchanged, which is what lets
    /// a later Reply's `in_reply_to` be matched back against the id this
    /// switch forwarded to its peer.
    pub fn set_preset_id(&mut self, id: MessageId) {
        self.preset_id = Some(id);
    }

    /// Validates the builder and turns it into a settled `Message`,
    /// still carrying sender `from = 0` — this is stamped by the switch
    /// on admission (spec §4.3). `id` is `preset_id` if one was set (see
    /// `set_preset_id`), else `(0, 0)`; the switch only assigns a fresh
    /// serial when `id.network_id == 0`, so ordinary sends (no preset id)
    /// are stamped as usual.
    pub fn build(self, limits: &crate::Limits) -> Result<Message, SwitchError> {
        if self.name.is_wildcard() {
            return Err(SwitchError::Invalid("sent message name must be literal"));
        }
        let name_len = self.name.to_string().len();
        if name_len > limits.max_name_len {
            return Err(SwitchError::NameTooLong {
                len: name_len,
                max: limits.max_name_len,
            });
        }
        if self.data.len() > limits.max_entire_data_len {
            return Err(SwitchError::MessageTooLarge {
                len: self.data.len(),
                max: limits.max_entire_data_len,
            });
        }
        if self.flags.contains(Flags::ALL_OR_WAIT) && self.flags.contains(Flags::ALL_OR_FAIL) {
            return Err(SwitchError::Invalid(
                "ALL_OR_WAIT and ALL_OR_FAIL are mutually exclusive",
            ));
        }

        Ok(Message {
            id: self.preset_id.unwrap_or(MessageId::UNSET),
            in_reply_to: self.in_reply_to,
            to: self.to,
            from: 0,
            orig_from: NetworkRef::UNSET,
            final_to: self.final_to,
            flags: self.flags,
            name: self.name,
            data: self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Limits;

    #[test]
    fn round_trip_entire_message_over_the_wire() {
        let limits = Limits::default();
        let name = Name::parse_literal("$.Fred.Jim").unwrap();
        let msg = Message::builder(name)
            .data(b"hello".to_vec())
            .to(7)
            .flags(Flags::WANT_A_REPLY)
            .build(&limits)
            .unwrap();

        let mut buf = Vec::new();
        msg.write_wire(&mut buf).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = Message::read_wire(&mut cursor).unwrap();

        assert_eq!(decoded.name.to_string(), "$.Fred.Jim");
        assert_eq!(decoded.data, b"hello");
        assert_eq!(decoded.to, 7);
        assert!(decoded.flags.contains(Flags::WANT_A_REPLY));
    }

    #[test]
    fn builder_rejects_wildcard_names() {
        let limits = Limits::default();
        let name = Name::parse_pattern("$.Fred.*").unwrap();
        assert!(Message::builder(name).build(&limits).is_err());
    }

    #[test]
    fn builder_rejects_contradictory_flags() {
        let limits = Limits::default();
        let name = Name::parse_literal("$.Fred").unwrap();
        let flags = Flags::ALL_OR_WAIT | Flags::ALL_OR_FAIL;
        assert!(Message::builder(name).flags(flags).build(&limits).is_err());
    }
}
