//! The 12-byte fixed header (§3, §4.4, §6) plus the message type and flag
//! set that ride alongside it.

use bitflags::bitflags;
use ipcbus_types::{ByteOrder, Endian};
use static_assertions::assert_impl_all;

use crate::{Error, Result};

/// Size, in bytes, of the fixed part of the header (everything before the
/// header-field array's length prefix).
pub(crate) const PRIMARY_HEADER_SIZE: usize = 12;
/// The smallest number of bytes that must be buffered before a primary
/// header plus the header-field array's length prefix can be read.
pub(crate) const MIN_MESSAGE_SIZE: usize = PRIMARY_HEADER_SIZE + 4;
/// §3 Global bounds: maximum total message length.
pub const MAX_MESSAGE_SIZE: usize = 128 * 1024 * 1024;

/// D-Bus message type byte (offset 1 of the fixed header).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Invalid = 0,
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

assert_impl_all!(Type: Send, Sync, Unpin);

impl TryFrom<u8> for Type {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self> {
        match val {
            0 => Ok(Type::Invalid),
            1 => Ok(Type::MethodCall),
            2 => Ok(Type::MethodReturn),
            3 => Ok(Type::Error),
            4 => Ok(Type::Signal),
            other => Err(Error::InconsistentMessage(format!(
                "unknown message type byte {other}"
            ))),
        }
    }
}

bitflags! {
    /// Message flags (offset 2 of the fixed header). Unknown bits received
    /// on the wire are preserved (not rejected) per the D-Bus specification.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        const NO_REPLY_EXPECTED = 0x01;
        const NO_AUTO_START = 0x02;
        const ALLOW_INTERACTIVE_AUTHORIZATION = 0x04;
    }
}

/// Protocol version this crate speaks; §1 Non-goals excludes any other.
pub const PROTOCOL_VERSION: u8 = 1;

/// The fixed 12-byte prefix of every D-Bus message, plus the body length
/// and header-field array length that are read alongside it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    endian: Endian,
    msg_type: Type,
    flags: Flags,
    body_len: u32,
    serial: u32,
}

impl PrimaryHeader {
    pub fn new(endian: Endian, msg_type: Type, flags: Flags, serial: u32, body_len: u32) -> Self {
        PrimaryHeader { endian, msg_type, flags, body_len, serial }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn msg_type(&self) -> Type {
        self.msg_type
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn body_len(&self) -> u32 {
        self.body_len
    }

    pub fn set_body_len(&mut self, len: u32) {
        self.body_len = len;
    }

    /// Parse the fixed 12-byte header plus the `u32` header-fields
    /// byte-length that immediately follows it. Returns the header and
    /// that length; the caller still owns reading the field array itself.
    ///
    /// `buf` must be at least [`MIN_MESSAGE_SIZE`] bytes.
    pub(crate) fn read(buf: &[u8]) -> Result<(PrimaryHeader, u32)> {
        if buf.len() < MIN_MESSAGE_SIZE {
            return Err(Error::InconsistentMessage("short primary header".into()));
        }
        let endian = Endian::try_from(buf[0]).map_err(|_| {
            Error::InconsistentMessage(format!("invalid byte-order byte {:#x}", buf[0]))
        })?;
        let msg_type = Type::try_from(buf[1])?;
        let flags = Flags::from_bits_truncate(buf[2]);
        let protocol = buf[3];
        if protocol != PROTOCOL_VERSION {
            return Err(Error::InconsistentMessage(format!(
                "unsupported protocol version {protocol}"
            )));
        }
        let (body_len, fields_len, serial) = match endian {
            Endian::Little => (
                u32::from_le_bytes(buf[4..8].try_into().unwrap()),
                u32::from_le_bytes(buf[12..16].try_into().unwrap()),
                u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            ),
            Endian::Big => (
                u32::from_be_bytes(buf[4..8].try_into().unwrap()),
                u32::from_be_bytes(buf[12..16].try_into().unwrap()),
                u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            ),
        };
        if serial == 0 {
            return Err(Error::InconsistentMessage("serial must be nonzero".into()));
        }
        Ok((PrimaryHeader { endian, msg_type, flags, body_len, serial }, fields_len))
    }

    /// Write the fixed 12-byte header. The header-field array length is
    /// written separately by the caller once the field array itself has
    /// been encoded (its length isn't known until then).
    pub(crate) fn write<B: ByteOrder>(&self, out: &mut Vec<u8>) {
        out.push(self.endian.wire_byte());
        out.push(self.msg_type as u8);
        out.push(self.flags.bits());
        out.push(PROTOCOL_VERSION);
        let mut tmp = [0u8; 4];
        B::write_u32(&mut tmp, self.body_len);
        out.extend_from_slice(&tmp);
        B::write_u32(&mut tmp, self.serial);
        out.extend_from_slice(&tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_types::LittleEndian;

    #[test]
    fn roundtrip_primary_header() {
        let header = PrimaryHeader::new(Endian::Little, Type::MethodCall, Flags::empty(), 7, 42);
        let mut buf = Vec::new();
        header.write::<LittleEndian>(&mut buf);
        buf.extend_from_slice(&0u32.to_le_bytes());
        let (parsed, fields_len) = PrimaryHeader::read(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(fields_len, 0);
    }

    #[test]
    fn zero_serial_rejected() {
        let header = PrimaryHeader::new(Endian::Little, Type::Signal, Flags::empty(), 0, 0);
        let mut buf = Vec::new();
        header.write::<LittleEndian>(&mut buf);
        buf.extend_from_slice(&0u32.to_le_bytes());
        assert!(PrimaryHeader::read(&buf).is_err());
    }

    #[test]
    fn bad_endian_byte_rejected() {
        let mut buf = vec![b'X', 1, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        assert!(PrimaryHeader::read(&mut buf).is_err());
    }
}
