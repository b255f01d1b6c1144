//! Serialize/deserialize the MFS header into/from binary.

use byteorder::{ByteOrder, LittleEndian};

/// Size of the fixed MFS header on the wire.
pub const HEADER_LEN: usize = 9;

/// The fixed 9-byte MFS header.
///
/// `psize` and `dsize` are little-endian u32 path and data lengths; `op` is
/// the raw opcode byte. Encoding and decoding are total on any 9-byte
/// buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub psize: u32,
    pub dsize: u32,
    pub op: u8,
}

impl Header {
    /// Write the header into a caller-supplied 9-byte buffer.
    pub fn encode(&self, buf: &mut [u8; HEADER_LEN]) {
        LittleEndian::write_u32(&mut buf[0..4], self.psize);
        LittleEndian::write_u32(&mut buf[4..8], self.dsize);
        buf[8] = self.op;
    }

    /// Read a header back out of a 9-byte buffer.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Header {
        Header {
            psize: LittleEndian::read_u32(&buf[0..4]),
            dsize: LittleEndian::read_u32(&buf[4..8]),
            op: buf[8],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_little_endian() {
        let hdr = Header {
            psize: 2,
            dsize: 0x0102_0304,
            op: 0x81,
        };
        let mut buf = [0u8; HEADER_LEN];
        hdr.encode(&mut buf);
        assert_eq!(buf, [2, 0, 0, 0, 4, 3, 2, 1, 0x81]);
    }

    #[test]
    fn decode_inverts_encode() {
        let cases = [
            Header {
                psize: 0,
                dsize: 0,
                op: 0,
            },
            Header {
                psize: u32::MAX,
                dsize: 1,
                op: 0xff,
            },
            Header {
                psize: 10_000,
                dsize: 20_000,
                op: 30,
            },
        ];
        for expected in cases {
            let mut buf = [0u8; HEADER_LEN];
            expected.encode(&mut buf);
            assert_eq!(Header::decode(&buf), expected);
        }
    }

    #[test]
    fn encode_inverts_decode() {
        let wire = [0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04, 0x7f];
        let mut buf = [0u8; HEADER_LEN];
        Header::decode(&wire).encode(&mut buf);
        assert_eq!(buf, wire);
    }
}
