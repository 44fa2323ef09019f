//! The D-Bus type system, signature grammar and binary wire codec.
//!
//! This crate owns everything in §3 and §4.1–§4.3 of the core
//! specification this workspace implements: the tagged value model, the
//! signature parser/validator, and the offset-aware encoder/decoder pair.
//! It has no notion of messages, connections or transports — those live in
//! the `ipcbus` crate, one layer up.

mod byte_order;
pub mod de;
mod error;
pub mod ser;
mod signature;
mod value;

pub use byte_order::{ByteOrder, Endian};
pub use byteorder::{BigEndian, LittleEndian};
pub use de::{decode, decode_one};
pub use error::{Error, Result};
pub use ser::encode;
pub use signature::{OwnedSignature, Signature, Type, MAX_NESTING_DEPTH, MAX_SIGNATURE_LEN};
pub use value::{
    DBusArray, DictEntry, ObjectPath, OwnedObjectPath, OwnedStr, OwnedValue, Str, Structure, Value,
};
