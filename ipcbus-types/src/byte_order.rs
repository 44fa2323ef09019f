use byteorder::{BigEndian, LittleEndian};

use crate::Error;

/// The D-Bus wire byte-order code, carried as the first byte of every
/// message's primary header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endian {
    /// `'B'` — big-endian (network byte order).
    Big,
    /// `'l'` — little-endian.
    Little,
}

impl Endian {
    #[cfg(target_endian = "big")]
    pub const NATIVE: Endian = Endian::Big;
    #[cfg(target_endian = "little")]
    pub const NATIVE: Endian = Endian::Little;

    pub fn wire_byte(self) -> u8 {
        match self {
            Endian::Big => b'B',
            Endian::Little => b'l',
        }
    }
}

impl TryFrom<u8> for Endian {
    type Error = Error;

    fn try_from(val: u8) -> Result<Endian, Error> {
        match val {
            b'B' => Ok(Endian::Big),
            b'l' => Ok(Endian::Little),
            _ => Err(Error::IncorrectEndian(val)),
        }
    }
}

/// Same as [`byteorder::ByteOrder`], adding a method to retrieve the D-Bus
/// wire byte-order code for the implementer.
pub trait ByteOrder: byteorder::ByteOrder {
    fn endian() -> Endian;
}

impl ByteOrder for LittleEndian {
    fn endian() -> Endian {
        Endian::Little
    }
}

impl ByteOrder for BigEndian {
    fn endian() -> Endian {
        Endian::Big
    }
}
