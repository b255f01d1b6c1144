//! Errors surfaced by the public registration API.
//!
//! Network-visible failures never reach this type: per-client faults are
//! reported on the wire and resolved by dropping the offending client.

/// Errors returned by [`register_file`](crate::srv::Server::register_file)
/// and [`unregister_file`](crate::srv::Server::unregister_file).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A file with the same name is already registered.
    #[error("file name already registered")]
    AlreadyRegistered,
    /// Every file slot is occupied.
    #[error("file table is full")]
    TableFull,
    /// No registered file matches the given name.
    #[error("file not found")]
    NotFound,
}

pub type Result<T> = ::std::result::Result<T, Error>;
