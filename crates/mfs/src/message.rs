//! MFS protocol data types and constants.
//!
//! # Protocol
//! MFS request/response framing: a 9-byte header (`psize[4] dsize[4] op[1]`,
//! little-endian) immediately followed by `psize` bytes of path and `dsize`
//! bytes of data. Responses use the same framing with the high bit of the
//! opcode set.

use enum_primitive::*;

/// High bit marking a server-to-client frame.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Opcode values strictly below this bound that are not otherwise defined
/// are reserved for future protocol revisions and must be answered with a
/// NOOP response. Values at or above it are illegal.
pub const RESERVED_OP_RANGE: u8 = 30;

/// Form the response opcode for a request opcode.
pub fn response_of(op: u8) -> u8 {
    op | RESPONSE_FLAG
}

enum_from_primitive! {
    /// Request opcodes defined by MFS.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum Opcode {
        Noop = 0,
        Read = 1,
        Write = 2,
        Ls = 3,
        Error = 4,
    }
}

impl Opcode {
    /// The opcode byte carried by the matching response frame.
    pub fn response(self) -> u8 {
        response_of(self as u8)
    }
}

/// Error codes carried in the 2-byte payload of an ERROR response.
pub mod ecode {
    /// Request exceeded the server's scratch buffers; the payloads were
    /// drained and the stream is still aligned.
    pub const TOO_LARGE: u16 = 1;
    /// The request header could not be read.
    pub const HEADER_READ: u16 = 3;
    /// No registered file matches the request path.
    pub const FILE_NOT_FOUND: u16 = 1000;
    /// The client's deadline expired.
    pub const TIMED_OUT: u16 = 3000;
    /// Opcode at or above [`RESERVED_OP_RANGE`](super::RESERVED_OP_RANGE).
    pub const ILLEGAL_OP: u16 = 3003;
}

/// A request as handed to a [`FileHandler`](crate::srv::FileHandler).
///
/// `path` and `data` borrow the server's scratch buffers for the duration
/// of the handler call; `scratch` is the unused remainder of the data
/// buffer, free for building the reply payload. The borrows end when the
/// handler returns, so no pointer into them can outlive the exchange.
#[derive(Debug)]
pub struct Request<'a> {
    /// Raw opcode byte from the wire.
    pub op: u8,
    /// Request path, exactly as received (no terminator).
    pub path: &'a [u8],
    /// Request payload.
    pub data: &'a mut [u8],
    /// Remainder of the shared data buffer.
    pub scratch: &'a mut [u8],
}

/// A response produced by a [`FileHandler`](crate::srv::FileHandler).
///
/// The server sends it verbatim: `path.len()` becomes `psize` and
/// `data.len()` becomes `dsize`, so a header/payload mismatch cannot be
/// expressed.
#[derive(Debug)]
pub struct Reply<'a> {
    /// Opcode byte to place in the response header, normally
    /// [`response_of`] the request opcode.
    pub op: u8,
    /// Path to echo back.
    pub path: &'a [u8],
    /// Response payload.
    pub data: &'a [u8],
}

impl<'a> Reply<'a> {
    /// A header-only reply with no path and no data.
    pub fn empty(op: u8) -> Reply<'a> {
        Reply {
            op,
            path: &[],
            data: &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn opcode_values_match_the_wire() {
        assert_eq!(Opcode::from_u8(0), Some(Opcode::Noop));
        assert_eq!(Opcode::from_u8(1), Some(Opcode::Read));
        assert_eq!(Opcode::from_u8(2), Some(Opcode::Write));
        assert_eq!(Opcode::from_u8(3), Some(Opcode::Ls));
        assert_eq!(Opcode::from_u8(4), Some(Opcode::Error));
        assert_eq!(Opcode::from_u8(5), None);
        assert_eq!(Opcode::from_u8(RESERVED_OP_RANGE), None);
    }

    #[test]
    fn response_sets_high_bit() {
        assert_eq!(Opcode::Noop.response(), 0x80);
        assert_eq!(Opcode::Read.response(), 0x81);
        assert_eq!(Opcode::Ls.response(), 0x83);
        assert_eq!(response_of(0x29), 0xa9);
    }
}
