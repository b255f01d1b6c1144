#![forbid(unsafe_code)]
//! Embedded MFS file-service server library.
//!
//! This crate implements the server side of MFS, a compact binary
//! request/response protocol that lets remote clients enumerate a set of
//! named "files" and invoke per-file read and write handlers. It is built
//! for resource-constrained microcontrollers: every buffer and table is
//! supplied by the caller at construction, nothing is allocated afterwards,
//! and several client connections are multiplexed cooperatively from a
//! single execution context.
//!
//! # Overview
//!
//! To stand up an MFS server you need to:
//!
//! 1. Implement [`transport::Transport`] for your platform's byte transport
//!    (TCP, serial, anything that can move bytes and tell the time)
//! 2. Implement [`srv::FileHandler`] for each file you want to expose
//! 3. Construct a [`srv::Server`] over pre-allocated buffers and slot
//!    tables, register your files, and drive it with ticks
//!
//! # Example
//!
//! ```no_run
//! use mfs::message::{response_of, Reply, Request};
//! use mfs::srv::{ClientSlot, FileHandler, FileSlot, Server};
//!
//! /// A file that answers every read with a fixed greeting.
//! struct Greeting;
//!
//! impl FileHandler for Greeting {
//!     fn read<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
//!         Reply {
//!             op: response_of(req.op),
//!             path: req.path,
//!             data: b"hello from mfs",
//!         }
//!     }
//!
//!     fn write<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
//!         Reply::empty(response_of(req.op))
//!     }
//! }
//!
//! # struct Uart;
//! # impl mfs::transport::Transport for Uart {
//! #     fn accept(&mut self) -> Option<mfs::transport::ClientId> { None }
//! #     fn available(&mut self, _: mfs::transport::ClientId) -> usize { 0 }
//! #     fn read_exact(&mut self, _: mfs::transport::ClientId, _: &mut [u8]) -> std::io::Result<()> { Ok(()) }
//! #     fn write_all(&mut self, _: mfs::transport::ClientId, _: &[u8]) -> std::io::Result<()> { Ok(()) }
//! #     fn close(&mut self, _: mfs::transport::ClientId) {}
//! #     fn now_ms(&mut self) -> u64 { 0 }
//! # }
//! # fn main() -> mfs::Result<()> {
//! # let uart = Uart;
//! let mut path_buf = [0u8; 64];
//! let mut data_buf = [0u8; 256];
//! let mut clients = [ClientSlot::EMPTY; 4];
//! let mut files = [FileSlot::EMPTY; 8];
//!
//! let mut server = Server::new(uart, &mut path_buf, &mut data_buf, &mut clients, &mut files);
//!
//! let greeting = Greeting;
//! server.register_file("motd", &greeting)?;
//!
//! loop {
//!     server.accept_clients();
//!     server.serve_clients();
//! }
//! # }
//! ```
//!
//! # Protocol
//!
//! Every frame is a fixed 9-byte header followed by two length-prefixed
//! payloads:
//!
//! | bytes | field |
//! |---|---|
//! | 0..4 | `psize`, path length (little-endian u32) |
//! | 4..8 | `dsize`, data length (little-endian u32) |
//! | 8 | `op`, opcode byte |
//! | 9.. | `psize` bytes of path, then `dsize` bytes of data |
//!
//! Requests use opcodes [`message::Opcode`]; responses echo the opcode with
//! the high bit set. Server-detected faults become ERROR responses whose
//! 2-byte payload is a little-endian [`message::ecode`] code.
//!
//! # Scheduling model
//!
//! There are no threads and no async runtime. The embedding firmware calls
//! [`srv::Server::accept_clients`] and [`srv::Server::serve_clients`] in
//! alternation; each serve tick walks the client table round-robin,
//! expires idle clients, and handles at most one request per client. The
//! transport callbacks block until their byte-count contract is met, so a
//! transport implementation should carry its own transfer timeout (see
//! [`transport::Transport`]).
//!
//! # Safety
//!
//! This crate forbids unsafe code and performs no allocation after
//! construction; peak memory is fixed by the buffers and tables the caller
//! hands to [`srv::Server::new`].
pub mod error;
pub mod message;
pub mod srv;
pub mod transport;
pub mod wire;

pub use crate::error::{Error, Result};
pub use crate::message::*;
pub use crate::srv::{ClientSlot, FileHandler, FileSlot, Server, HARD_LIMIT, TIMEOUT_MS};
pub use crate::transport::{ClientId, Transport};
pub use crate::wire::{Header, HEADER_LEN};
