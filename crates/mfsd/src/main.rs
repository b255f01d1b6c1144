use std::cell::RefCell;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;
use mfs::message::{response_of, Reply, Request};
use mfs::srv::{ClientSlot, FileHandler, FileSlot, Server};

mod tcp;
use crate::tcp::TcpTransport;

/// Demo MFS file server over TCP.
///
/// Exposes two files: "uptime", whose reads return the server uptime in
/// milliseconds as decimal text, and "echo", which stores whatever is
/// written to it and hands it back on read.
#[derive(Parser)]
#[command(name = "mfsd", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5640")]
    listen: String,

    /// Client idle timeout in milliseconds.
    #[arg(long, default_value_t = mfs::TIMEOUT_MS)]
    timeout_ms: u64,

    /// Per-transfer I/O timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    io_timeout_ms: u64,
}

struct UptimeFile {
    started: Instant,
}

impl FileHandler for UptimeFile {
    fn read<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
        let text = self.started.elapsed().as_millis().to_string();
        let scratch = req.scratch;
        let n = text.len().min(scratch.len());
        scratch[..n].copy_from_slice(&text.as_bytes()[..n]);
        Reply {
            op: response_of(req.op),
            path: req.path,
            data: &scratch[..n],
        }
    }

    fn write<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
        // Read-only; acknowledge and discard.
        Reply::empty(response_of(req.op))
    }
}

struct EchoFile {
    stored: RefCell<Vec<u8>>,
}

impl FileHandler for EchoFile {
    fn read<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
        let stored = self.stored.borrow();
        let scratch = req.scratch;
        let n = stored.len().min(scratch.len());
        scratch[..n].copy_from_slice(&stored[..n]);
        Reply {
            op: response_of(req.op),
            path: req.path,
            data: &scratch[..n],
        }
    }

    fn write<'a>(&'a self, req: Request<'a>) -> Reply<'a> {
        *self.stored.borrow_mut() = req.data.to_vec();
        Reply {
            op: response_of(req.op),
            path: req.path,
            data: &[],
        }
    }
}

fn mfsd_main(cli: Cli) -> io::Result<i32> {
    let transport = TcpTransport::bind(&cli.listen, Duration::from_millis(cli.io_timeout_ms))?;
    info!("listening on {}", cli.listen);

    let uptime = UptimeFile {
        started: Instant::now(),
    };
    let echo = EchoFile {
        stored: RefCell::new(Vec::new()),
    };

    let mut path_buf = [0u8; 128];
    let mut data_buf = [0u8; 1024];
    let mut clients = [ClientSlot::EMPTY; 8];
    let mut files = [FileSlot::EMPTY; 8];

    let mut server = Server::new(
        transport,
        &mut path_buf,
        &mut data_buf,
        &mut clients,
        &mut files,
    )
    .with_timeout_ms(cli.timeout_ms);

    server.register_file("uptime", &uptime).map_err(io::Error::other)?;
    server.register_file("echo", &echo).map_err(io::Error::other)?;

    loop {
        server.accept_clients();
        server.serve_clients();
        thread::sleep(Duration::from_millis(1));
    }
}

fn main() {
    env_logger::init();

    let exit_code = mfsd_main(Cli::parse()).unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        -1
    });

    std::process::exit(exit_code);
}
