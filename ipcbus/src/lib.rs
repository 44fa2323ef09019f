//! A client-side D-Bus connection library: wire codec, message framing,
//! SASL authentication and a connection runtime built around a
//! user-extensible handler pipeline (§1, §2).
//!
//! Concrete socket I/O and event-loop/executor selection are deliberately
//! left to the embedding application (§1 Non-goals): this crate defines
//! the [`socket::Socket`] seam a transport implements, and drives
//! everything above it.

pub mod address;
pub mod connection;
pub mod error;
pub mod fdo;
pub mod framer;
pub mod message;
pub mod pipeline;
pub mod registry;
pub mod sasl;
pub mod socket;

pub use address::Address;
pub use connection::{Connection, ConnectionBuilder, ConnectionConfig, ConnectionState};
pub use error::{Error, Result};
pub use message::Message;
pub use registry::ObjectRegistry;

#[cfg(unix)]
pub use std::os::fd::{BorrowedFd, OwnedFd};

/// On non-Unix targets there is no file-descriptor passing; this crate
/// still needs the names to exist for [`socket::Socket`]'s associated
/// types to type-check, so they stand in as uninhabited placeholders.
#[cfg(not(unix))]
#[derive(Debug)]
pub enum OwnedFd {}

#[cfg(not(unix))]
#[derive(Debug)]
pub enum BorrowedFd<'a> {
    #[doc(hidden)]
    _Marker(std::marker::PhantomData<&'a ()>, std::convert::Infallible),
}
