//! TCP implementation of the MFS transport capabilities.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use mfs::transport::{ClientId, Transport};
use mfs::HEADER_LEN;

/// A [`Transport`] over nonblocking TCP sockets.
///
/// Sockets stay in nonblocking mode the whole time; `read_exact` and
/// `write_all` spin on `WouldBlock` with a short sleep until the transfer
/// completes or `io_timeout` elapses, which gives the server the bounded
/// blocking behavior the transport contract asks for.
pub struct TcpTransport {
    listener: TcpListener,
    streams: HashMap<u32, TcpStream>,
    next_id: u32,
    started: Instant,
    io_timeout: Duration,
}

impl TcpTransport {
    pub fn bind(addr: &str, io_timeout: Duration) -> io::Result<TcpTransport> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(TcpTransport {
            listener,
            streams: HashMap::new(),
            next_id: 1,
            started: Instant::now(),
            io_timeout,
        })
    }
}

impl Transport for TcpTransport {
    fn accept(&mut self) -> Option<ClientId> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    warn!("failed to configure connection from {peer}: {e}");
                    return None;
                }
                let id = self.next_id;
                self.next_id += 1;
                debug!("connection from {peer} as client {id}");
                self.streams.insert(id, stream);
                Some(ClientId::from_raw(id))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("accept failed: {e}");
                None
            }
        }
    }

    fn available(&mut self, client: ClientId) -> usize {
        // The serve loop only gates on a whole header, so peeking
        // HEADER_LEN bytes is as good as a byte count.
        let mut probe = [0u8; HEADER_LEN];
        match self.streams.get(&client.into_raw()) {
            Some(stream) => match stream.peek(&mut probe) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                Err(_) => 0,
            },
            None => 0,
        }
    }

    fn read_exact(&mut self, client: ClientId, buf: &mut [u8]) -> io::Result<()> {
        let stream = self
            .streams
            .get_mut(&client.into_raw())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown client"))?;

        let deadline = Instant::now() + self.io_timeout;
        let mut filled = 0;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed mid-message",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn write_all(&mut self, client: ClientId, buf: &[u8]) -> io::Result<()> {
        let stream = self
            .streams
            .get_mut(&client.into_raw())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown client"))?;

        let deadline = Instant::now() + self.io_timeout;
        let mut written = 0;
        while written < buf.len() {
            match stream.write(&buf[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer stopped accepting data",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn close(&mut self, client: ClientId) {
        // Dropping the stream closes the socket.
        self.streams.remove(&client.into_raw());
    }

    fn now_ms(&mut self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
