//! The standard `org.freedesktop.DBus` peer/name handlers every connection
//! needs regardless of application logic (§4.7, §5).
//!
//! These are deliberately *not* implemented as [`crate::pipeline::Handler`]
//! entries: the mandatory-name handshake and the Peer replies both need to
//! address the bus daemon directly and, for Peer, originate a reply of
//! their own — simpler to drive from the connection runtime than to give
//! pipeline handlers a back channel to the outbound queue.

pub mod names;
pub mod peer;

pub use names::acquire_unique_name;
pub use peer::{handle_peer_call, MachineId};

/// The bus daemon's own well-known destination and object path, used for
/// `Hello()` and health-probe pings alike.
pub const BUS_DESTINATION: &str = "org.freedesktop.DBus";
pub const BUS_PATH: &str = "/org/freedesktop/DBus";
pub const BUS_INTERFACE: &str = "org.freedesktop.DBus";
pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";
