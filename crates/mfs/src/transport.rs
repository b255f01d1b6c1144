//! The byte-transport seam between the server and the outside world.
//!
//! The server core never touches sockets, UARTs or clocks directly; it is
//! handed a [`Transport`] at construction and drives everything through it.

use std::fmt;
use std::io;

/// Opaque client identifier assigned by the transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u32);

impl ClientId {
    /// Create a client identifier from the transport's raw value.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Access the raw identifier value.
    #[must_use]
    pub fn into_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blocking byte-transport capabilities the server is built on.
///
/// Implementations exist per platform: a TCP listener on a hosted target,
/// a UART driver on a bare-metal one. The server calls these methods from
/// a single execution context and never re-enters them.
///
/// # Blocking contract
///
/// [`read_exact`](Transport::read_exact) and
/// [`write_all`](Transport::write_all) must block until the whole buffer
/// has been transferred, or fail. Implementations should enforce their own
/// transfer timeout: a client that sends a header and then stalls would
/// otherwise wedge the entire server, since there is only one execution
/// context.
///
/// # Errors
///
/// Any I/O error is treated by the server as an unrecoverable fault on that
/// client's stream; the protocol has no resynchronisation token, so the
/// client is dropped.
pub trait Transport {
    /// Poll for a newly connected client. Returns `None` when no client is
    /// waiting.
    fn accept(&mut self) -> Option<ClientId>;

    /// Number of bytes immediately readable from `client` without blocking.
    fn available(&mut self, client: ClientId) -> usize;

    /// Read exactly `buf.len()` bytes from `client` into `buf`.
    fn read_exact(&mut self, client: ClientId, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `buf` to `client`.
    fn write_all(&mut self, client: ClientId, buf: &[u8]) -> io::Result<()>;

    /// Close the connection to `client`.
    fn close(&mut self, client: ClientId);

    /// Milliseconds of monotonic time since an arbitrary epoch, `millis()`
    /// style. Must not go backwards while the server is running.
    fn now_ms(&mut self) -> u64;
}
