//! Cooperative MFS server core.
//!
//! # Protocol
//! MFS over any byte-oriented transport.

use {
    crate::{
        error::{Error, Result},
        message::{ecode, Opcode, Reply, Request, RESERVED_OP_RANGE},
        transport::{ClientId, Transport},
        wire::{Header, HEADER_LEN},
    },
    byteorder::{ByteOrder, LittleEndian},
    log::{debug, info, warn},
    num_traits::FromPrimitive,
    std::io,
};

/// Default client timeout in milliseconds.
pub const TIMEOUT_MS: u64 = 20_000;

/// Default upper bound on advertised `psize`/`dsize`. Requests above it are
/// treated as abusive and the client is dropped without draining.
pub const HARD_LIMIT: u32 = 10_000;

/// Per-file request handlers.
///
/// A registered file is a name plus an implementation of this trait. The
/// server resolves READ and WRITE requests to the matching file and calls
/// the corresponding method; whatever [`Reply`] it returns is sent to the
/// client verbatim before control returns to the serve loop.
///
/// Methods take `&self`: the server stores a shared borrow of the handler,
/// so one handler object may back several files. Handlers that keep state
/// use interior mutability (`Cell`/`RefCell` are fine, the server is
/// single-threaded and never re-enters a handler).
///
/// # Example
/// ```
/// use mfs::srv::FileHandler;
/// use mfs::message::{response_of, Reply, Request};
///
/// /// Echoes each write back on read.
/// struct Echo;
///
/// impl FileHandler for Echo {
///     fn read<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
///         Reply {
///             op: response_of(req.op),
///             path: req.path,
///             data: req.data,
///         }
///     }
///
///     fn write<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
///         Reply {
///             op: response_of(req.op),
///             path: req.path,
///             data: &[],
///         }
///     }
/// }
/// ```
pub trait FileHandler {
    /// Service a READ request on this file.
    fn read<'a>(&'a self, req: Request<'a>) -> Reply<'a>;

    /// Service a WRITE request on this file.
    fn write<'a>(&'a self, req: Request<'a>) -> Reply<'a>;
}

#[derive(Copy, Clone, Debug)]
struct Client {
    id: ClientId,
    deadline_ms: u64,
}

/// One entry of the caller-supplied client table. Empty by default.
#[derive(Copy, Clone, Debug, Default)]
pub struct ClientSlot(Option<Client>);

impl ClientSlot {
    /// An unoccupied slot, usable in `const` and array-repeat contexts.
    pub const EMPTY: ClientSlot = ClientSlot(None);
}

#[derive(Copy, Clone)]
struct FileEntry<'h> {
    name: &'h str,
    handler: &'h dyn FileHandler,
}

/// One entry of the caller-supplied file table. Empty by default.
#[derive(Copy, Clone, Default)]
pub struct FileSlot<'h>(Option<FileEntry<'h>>);

impl<'h> FileSlot<'h> {
    /// An unoccupied slot, usable in `const` and array-repeat contexts.
    pub const EMPTY: FileSlot<'h> = FileSlot(None);
}

/// Outcome of reading one inbound message.
enum Inbound {
    /// A whole request was materialised into the scratch buffers.
    Request(Header),
    /// The request was legal but too big for our buffers; its payloads were
    /// drained and an error was sent. The stream is still aligned.
    Rejected,
    /// The stream is beyond recovery; the client must be dropped.
    Drop,
}

/// The MFS server.
///
/// All storage is supplied by the caller at construction and nothing is
/// allocated afterwards: two scratch buffers bound the largest acceptable
/// path and data payloads, and two slot tables bound the number of
/// concurrent clients and registered files.
///
/// The server is driven by ticks: the embedding loop calls
/// [`accept_clients`](Server::accept_clients) and
/// [`serve_clients`](Server::serve_clients) in alternation from a single
/// execution context. At most one request is in flight at a time, which is
/// what makes the shared scratch buffers safe to reuse across clients.
///
/// # Example
/// ```no_run
/// use mfs::srv::{ClientSlot, FileSlot, Server};
/// # struct Uart;
/// # impl mfs::transport::Transport for Uart {
/// #     fn accept(&mut self) -> Option<mfs::transport::ClientId> { None }
/// #     fn available(&mut self, _: mfs::transport::ClientId) -> usize { 0 }
/// #     fn read_exact(&mut self, _: mfs::transport::ClientId, _: &mut [u8]) -> std::io::Result<()> { Ok(()) }
/// #     fn write_all(&mut self, _: mfs::transport::ClientId, _: &[u8]) -> std::io::Result<()> { Ok(()) }
/// #     fn close(&mut self, _: mfs::transport::ClientId) {}
/// #     fn now_ms(&mut self) -> u64 { 0 }
/// # }
/// # let uart = Uart;
/// let mut path_buf = [0u8; 64];
/// let mut data_buf = [0u8; 256];
/// let mut clients = [ClientSlot::EMPTY; 4];
/// let mut files = [FileSlot::EMPTY; 8];
///
/// let mut server = Server::new(
///     uart,
///     &mut path_buf,
///     &mut data_buf,
///     &mut clients,
///     &mut files,
/// );
///
/// loop {
///     server.accept_clients();
///     server.serve_clients();
/// }
/// ```
pub struct Server<'b, 'h, T: Transport> {
    transport: T,

    path_buf: &'b mut [u8],
    data_buf: &'b mut [u8],

    clients: &'b mut [ClientSlot],
    files: &'b mut [FileSlot<'h>],

    timeout_ms: u64,
    hard_limit: u32,
}

impl<'b, 'h, T: Transport> Server<'b, 'h, T> {
    /// Build a server over `transport` with caller-supplied storage.
    ///
    /// The capacities of `path_buf` and `data_buf` bound the largest path
    /// and data payload the server will accept from a client; bigger (but
    /// within the hard limit) requests are drained and rejected with error
    /// code [`ecode::TOO_LARGE`].
    pub fn new(
        transport: T,
        path_buf: &'b mut [u8],
        data_buf: &'b mut [u8],
        clients: &'b mut [ClientSlot],
        files: &'b mut [FileSlot<'h>],
    ) -> Self {
        Server {
            transport,
            path_buf,
            data_buf,
            clients,
            files,
            timeout_ms: TIMEOUT_MS,
            hard_limit: HARD_LIMIT,
        }
    }

    /// Replace the default client timeout of [`TIMEOUT_MS`].
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Replace the default hard size limit of [`HARD_LIMIT`].
    pub fn with_hard_limit(mut self, hard_limit: u32) -> Self {
        self.hard_limit = hard_limit;
        self
    }

    /// Register a file under `name`.
    ///
    /// `name` and `handler` are borrowed until the server goes away (or the
    /// file is unregistered); the borrow makes the keep-alive contract a
    /// compile-time fact rather than a documentation footnote.
    pub fn register_file(&mut self, name: &'h str, handler: &'h dyn FileHandler) -> Result<()> {
        if self.find(name.as_bytes()).is_some() {
            return Err(Error::AlreadyRegistered);
        }
        match self.files.iter_mut().find(|slot| slot.0.is_none()) {
            Some(slot) => {
                slot.0 = Some(FileEntry { name, handler });
                debug!("registered file {name:?}");
                Ok(())
            }
            None => Err(Error::TableFull),
        }
    }

    /// Remove the file registered under `name`.
    pub fn unregister_file(&mut self, name: &str) -> Result<()> {
        let index = self.find(name.as_bytes()).ok_or(Error::NotFound)?;
        self.files[index].0 = None;
        debug!("unregistered file {name:?}");
        Ok(())
    }

    /// Fill empty client slots by polling the transport for new
    /// connections. Call once per tick.
    pub fn accept_clients(&mut self) {
        for i in 0..self.clients.len() {
            if self.clients[i].0.is_some() {
                continue;
            }
            if let Some(id) = self.transport.accept() {
                info!("accepted client {id}");
                let deadline_ms = self.transport.now_ms() + self.timeout_ms;
                self.clients[i].0 = Some(Client { id, deadline_ms });
            }
        }
    }

    /// Walk the client table once: expire overdue clients, and for every
    /// client with a whole header available, read one request, dispatch it
    /// and emit one response. Call once per tick.
    pub fn serve_clients(&mut self) {
        for i in 0..self.clients.len() {
            let Some(client) = self.clients[i].0 else {
                continue;
            };

            if client.deadline_ms <= self.transport.now_ms() {
                info!("client {}: deadline expired", client.id);
                let _ = send_error(&mut self.transport, client.id, &[], ecode::TIMED_OUT);
                self.drop_slot(i);
                continue;
            }

            if self.transport.available(client.id) < HEADER_LEN {
                continue;
            }

            match self.read_request(client.id) {
                Inbound::Request(hdr) => {
                    let deadline_ms = self.transport.now_ms() + self.timeout_ms;
                    if let Some(c) = self.clients[i].0.as_mut() {
                        c.deadline_ms = deadline_ms;
                    }
                    self.dispatch(i, client.id, hdr);
                }
                Inbound::Rejected => {}
                Inbound::Drop => self.drop_slot(i),
            }
        }
    }

    /// Read one whole message into the scratch buffers.
    fn read_request(&mut self, client: ClientId) -> Inbound {
        let mut hdr_buf = [0u8; HEADER_LEN];
        if self.transport.read_exact(client, &mut hdr_buf).is_err() {
            warn!("client {client}: header read failed");
            let _ = send_error(&mut self.transport, client, &[], ecode::HEADER_READ);
            return Inbound::Drop;
        }
        let hdr = Header::decode(&hdr_buf);

        if hdr.psize > self.hard_limit || hdr.dsize > self.hard_limit {
            warn!(
                "client {client}: advertised psize={} dsize={} above hard limit {}",
                hdr.psize, hdr.dsize, self.hard_limit
            );
            return Inbound::Drop;
        }

        let psize = hdr.psize as usize;
        let dsize = hdr.dsize as usize;

        if psize > self.path_buf.len() || dsize > self.data_buf.len() {
            // Legal size, but beyond our buffers. Both payloads must be
            // consumed so the next header lines up.
            if drain(&mut self.transport, client, self.path_buf, psize).is_err()
                || drain(&mut self.transport, client, self.data_buf, dsize).is_err()
            {
                return Inbound::Drop;
            }
            debug!("client {client}: request too large for buffers, drained {psize}+{dsize} bytes");
            if send_error(&mut self.transport, client, &[], ecode::TOO_LARGE).is_err() {
                return Inbound::Drop;
            }
            return Inbound::Rejected;
        }

        if self.transport.read_exact(client, &mut self.path_buf[..psize]).is_err() {
            warn!("client {client}: path read failed");
            let _ = send_error(&mut self.transport, client, &[], ecode::TOO_LARGE);
            return Inbound::Drop;
        }
        if self.transport.read_exact(client, &mut self.data_buf[..dsize]).is_err() {
            warn!("client {client}: data read failed");
            let _ = send_error(&mut self.transport, client, &[], ecode::TOO_LARGE);
            return Inbound::Drop;
        }

        Inbound::Request(hdr)
    }

    /// Route one materialised request to its response.
    fn dispatch(&mut self, slot: usize, client: ClientId, hdr: Header) {
        let psize = hdr.psize as usize;
        let dsize = hdr.dsize as usize;
        let opcode = Opcode::from_u8(hdr.op);

        let file = self.find(&self.path_buf[..psize]);
        if file.is_none() && !matches!(opcode, Some(Opcode::Ls) | Some(Opcode::Noop)) {
            self.reply_error(slot, client, psize, ecode::FILE_NOT_FOUND);
            return;
        }

        match opcode {
            // Clients are not supposed to send ERROR; answer as a no-op.
            Some(Opcode::Error) | Some(Opcode::Noop) => self.reply_noop(slot, client),
            Some(Opcode::Ls) => {
                if self.list_files(client).is_err() {
                    self.drop_slot(slot);
                }
            }
            Some(op @ (Opcode::Read | Opcode::Write)) => {
                let Some(index) = file else { return };
                let Some(entry) = self.files[index].0 else { return };

                let (payload, scratch) = self.data_buf.split_at_mut(dsize);
                let req = Request {
                    op: hdr.op,
                    path: &self.path_buf[..psize],
                    data: payload,
                    scratch,
                };
                let reply = match op {
                    Opcode::Read => entry.handler.read(req),
                    _ => entry.handler.write(req),
                };
                if send_message(&mut self.transport, client, reply.op, reply.path, reply.data)
                    .is_err()
                {
                    self.drop_slot(slot);
                }
            }
            None => {
                if hdr.op < RESERVED_OP_RANGE {
                    self.reply_noop(slot, client);
                } else {
                    debug!("client {client}: illegal opcode {:#04x}", hdr.op);
                    self.reply_error(slot, client, psize, ecode::ILLEGAL_OP);
                }
            }
        }
    }

    /// Answer an LS request with every registered name, zero-terminated.
    ///
    /// When the concatenated names fit in the data buffer the payload is
    /// assembled there and sent as one message; otherwise the header goes
    /// out first and the names are streamed through the transport one by
    /// one.
    fn list_files(&mut self, client: ClientId) -> io::Result<()> {
        let total: usize = self
            .files
            .iter()
            .filter_map(|slot| slot.0.as_ref())
            .map(|entry| entry.name.len() + 1)
            .sum();

        if total <= self.data_buf.len() {
            let mut used = 0;
            for entry in self.files.iter().filter_map(|slot| slot.0.as_ref()) {
                let name = entry.name.as_bytes();
                self.data_buf[used..used + name.len()].copy_from_slice(name);
                used += name.len();
                self.data_buf[used] = 0;
                used += 1;
            }
            return send_message(
                &mut self.transport,
                client,
                Opcode::Ls.response(),
                &[],
                &self.data_buf[..used],
            );
        }

        let hdr = Header {
            psize: 0,
            dsize: total as u32,
            op: Opcode::Ls.response(),
        };
        let mut hdr_buf = [0u8; HEADER_LEN];
        hdr.encode(&mut hdr_buf);
        self.transport.write_all(client, &hdr_buf)?;
        for entry in self.files.iter().filter_map(|slot| slot.0.as_ref()) {
            self.transport.write_all(client, entry.name.as_bytes())?;
            self.transport.write_all(client, &[0])?;
        }
        Ok(())
    }

    /// Linear name lookup. A path with an embedded NUL matches nothing.
    fn find(&self, path: &[u8]) -> Option<usize> {
        if path.contains(&0) {
            return None;
        }
        self.files
            .iter()
            .position(|slot| matches!(&slot.0, Some(entry) if entry.name.as_bytes() == path))
    }

    fn reply_noop(&mut self, slot: usize, client: ClientId) {
        if send_message(&mut self.transport, client, Opcode::Noop.response(), &[], &[]).is_err() {
            self.drop_slot(slot);
        }
    }

    fn reply_error(&mut self, slot: usize, client: ClientId, echo_len: usize, code: u16) {
        let path = &self.path_buf[..echo_len];
        if send_error(&mut self.transport, client, path, code).is_err() {
            self.drop_slot(slot);
        }
    }

    /// Close the transport for the client in `slot` and free the slot.
    fn drop_slot(&mut self, slot: usize) {
        if let Some(client) = self.clients[slot].0.take() {
            info!("dropping client {}", client.id);
            self.transport.close(client.id);
        }
    }
}

/// Write one whole message: header, then path, then data.
fn send_message<T: Transport>(
    transport: &mut T,
    client: ClientId,
    op: u8,
    path: &[u8],
    data: &[u8],
) -> io::Result<()> {
    let hdr = Header {
        psize: path.len() as u32,
        dsize: data.len() as u32,
        op,
    };
    let mut hdr_buf = [0u8; HEADER_LEN];
    hdr.encode(&mut hdr_buf);
    transport.write_all(client, &hdr_buf)?;
    transport.write_all(client, path)?;
    transport.write_all(client, data)
}

/// Write an ERROR response carrying `code`, echoing `path`.
fn send_error<T: Transport>(
    transport: &mut T,
    client: ClientId,
    path: &[u8],
    code: u16,
) -> io::Result<()> {
    let mut payload = [0u8; 2];
    LittleEndian::write_u16(&mut payload, code);
    send_message(transport, client, Opcode::Error.response(), path, &payload)
}

/// Read and discard `total` bytes in chunks bounded by `scratch`.
fn drain<T: Transport>(
    transport: &mut T,
    client: ClientId,
    scratch: &mut [u8],
    total: usize,
) -> io::Result<()> {
    let mut remaining = total;
    while remaining > 0 {
        let chunk = remaining.min(scratch.len());
        if chunk == 0 {
            // A zero-capacity buffer cannot make progress.
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "zero-capacity scratch buffer",
            ));
        }
        transport.read_exact(client, &mut scratch[..chunk])?;
        remaining -= chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::response_of;

    struct NullTransport;

    impl Transport for NullTransport {
        fn accept(&mut self) -> Option<ClientId> {
            None
        }
        fn available(&mut self, _: ClientId) -> usize {
            0
        }
        fn read_exact(&mut self, _: ClientId, _: &mut [u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no data"))
        }
        fn write_all(&mut self, _: ClientId, _: &[u8]) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self, _: ClientId) {}
        fn now_ms(&mut self) -> u64 {
            0
        }
    }

    struct Nop;

    impl FileHandler for Nop {
        fn read<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
            Reply::empty(response_of(req.op))
        }
        fn write<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
            Reply::empty(response_of(req.op))
        }
    }

    fn server<'b>(
        path_buf: &'b mut [u8],
        data_buf: &'b mut [u8],
        clients: &'b mut [ClientSlot],
        files: &'b mut [FileSlot<'static>],
    ) -> Server<'b, 'static, NullTransport> {
        Server::new(NullTransport, path_buf, data_buf, clients, files)
    }

    #[test]
    fn register_rejects_duplicates() {
        let (mut pb, mut db) = ([0u8; 16], [0u8; 16]);
        let mut clients = [ClientSlot::EMPTY; 2];
        let mut files = [FileSlot::EMPTY; 2];
        let mut srv = server(&mut pb, &mut db, &mut clients, &mut files);

        static NOP: Nop = Nop;
        assert_eq!(srv.register_file("hi", &NOP), Ok(()));
        assert_eq!(srv.register_file("hi", &NOP), Err(Error::AlreadyRegistered));
        assert_eq!(srv.register_file("lo", &NOP), Ok(()));
    }

    #[test]
    fn register_fails_when_table_is_full() {
        let (mut pb, mut db) = ([0u8; 16], [0u8; 16]);
        let mut clients = [ClientSlot::EMPTY; 2];
        let mut files = [FileSlot::EMPTY; 1];
        let mut srv = server(&mut pb, &mut db, &mut clients, &mut files);

        static NOP: Nop = Nop;
        assert_eq!(srv.register_file("one", &NOP), Ok(()));
        assert_eq!(srv.register_file("two", &NOP), Err(Error::TableFull));
    }

    #[test]
    fn unregister_frees_the_slot() {
        let (mut pb, mut db) = ([0u8; 16], [0u8; 16]);
        let mut clients = [ClientSlot::EMPTY; 2];
        let mut files = [FileSlot::EMPTY; 1];
        let mut srv = server(&mut pb, &mut db, &mut clients, &mut files);

        static NOP: Nop = Nop;
        assert_eq!(srv.register_file("one", &NOP), Ok(()));
        assert_eq!(srv.unregister_file("one"), Ok(()));
        assert_eq!(srv.unregister_file("one"), Err(Error::NotFound));
        assert_eq!(srv.register_file("two", &NOP), Ok(()));
    }

    #[test]
    fn lookup_rejects_embedded_nul() {
        let (mut pb, mut db) = ([0u8; 16], [0u8; 16]);
        let mut clients = [ClientSlot::EMPTY; 2];
        let mut files = [FileSlot::EMPTY; 2];
        let mut srv = server(&mut pb, &mut db, &mut clients, &mut files);

        static NOP: Nop = Nop;
        srv.register_file("hi", &NOP).unwrap();
        assert_eq!(srv.find(b"hi"), Some(0));
        assert_eq!(srv.find(b"hi\0"), None);
        assert_eq!(srv.find(b"h\0"), None);
        assert_eq!(srv.find(b"no"), None);
    }

    #[test]
    fn drain_consumes_in_chunks() {
        struct Counting {
            fed: usize,
        }
        impl Transport for Counting {
            fn accept(&mut self) -> Option<ClientId> {
                None
            }
            fn available(&mut self, _: ClientId) -> usize {
                self.fed
            }
            fn read_exact(&mut self, _: ClientId, buf: &mut [u8]) -> io::Result<()> {
                if buf.len() > self.fed {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
                }
                self.fed -= buf.len();
                Ok(())
            }
            fn write_all(&mut self, _: ClientId, _: &[u8]) -> io::Result<()> {
                Ok(())
            }
            fn close(&mut self, _: ClientId) {}
            fn now_ms(&mut self) -> u64 {
                0
            }
        }

        let mut transport = Counting { fed: 100 };
        let mut scratch = [0u8; 16];
        drain(&mut transport, ClientId::from_raw(7), &mut scratch, 100).unwrap();
        assert_eq!(transport.fed, 0);

        let mut transport = Counting { fed: 10 };
        assert!(drain(&mut transport, ClientId::from_raw(7), &mut scratch, 100).is_err());
    }
}
