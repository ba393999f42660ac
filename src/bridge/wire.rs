//! The bridge's on-the-wire preamble (spec §4.6, §6): `HELO` followed by
//! a 4-byte big-endian network id, exchanged once before the connection
//! settles into steady-state framed `Message` traffic.
//!
//! Grounded on the teacher's `transport/stream/mod.rs`
//! `send_and_check_handshake`/`create_handshake` pair: there, a fixed
//! 8-byte nanomsg preamble (`\0SP\0` + protocol ids) is written then
//! read back and checked byte-for-byte; here the preamble is `HELO` plus
//! whichever network id we advertise, and the only check is the literal
//! string.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

const HELO: &[u8; 4] = b"HELO";

/// Writes our half of the preamble: `HELO` followed by `our_network_id`.
pub fn write_helo<W: Write>(w: &mut W, our_network_id: u32) -> io::Result<()> {
    w.write_all(HELO)?;
    w.write_u32::<BigEndian>(our_network_id)
}

/// Reads the peer's half of the preamble and returns its advertised
/// network id.
pub fn read_helo<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != HELO {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "peer did not send the HELO preamble",
        ));
    }
    r.read_u32::<BigEndian>()
}

/// Exchanges preambles over a single duplex stream. Both sides write
/// before reading, so this does not deadlock on a stream whose send
/// buffer can hold eight bytes (true of any real socket).
pub fn exchange_helo<S: Read + Write>(stream: &mut S, our_network_id: u32) -> io::Result<u32> {
    write_helo(stream, our_network_id)?;
    read_helo(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_the_preamble() {
        let mut buf = Vec::new();
        write_helo(&mut buf, 42).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_helo(&mut cursor).unwrap(), 42);
    }

    #[test]
    fn rejects_a_foreign_preamble() {
        let mut cursor = Cursor::new(b"NOPE0000".to_vec());
        assert!(read_helo(&mut cursor).is_err());
    }
}
