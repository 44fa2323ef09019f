use std::str::Utf8Error;

/// Errors produced while parsing signatures or (de)serializing values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid signature at byte {position}: {reason}")]
    InvalidSignature { position: usize, reason: &'static str },

    #[error("signature is {0} bytes long, maximum is 255")]
    SignatureTooLong(usize),

    #[error("container nesting depth exceeds the 32-level limit")]
    NestingTooDeep,

    #[error("unexpected end of data while decoding")]
    Eof,

    #[error("length prefix {0} exceeds the remaining buffer")]
    LengthExceedsBuffer(u32),

    #[error("array body of {0} bytes exceeds the 64 MiB limit")]
    ArrayTooLarge(u32),

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8(#[from] Utf8Error),

    #[error("string contains an embedded NUL byte")]
    EmbeddedNul,

    #[error("missing trailing NUL terminator")]
    MissingNul,

    #[error("invalid object path: {0}")]
    InvalidObjectPath(String),

    #[error("boolean wire value {0} is neither 0 nor 1")]
    InvalidBoolean(u32),

    #[error("byte order byte {0:#x} is neither 'l' nor 'B'")]
    IncorrectEndian(u8),

    #[error("non-zero padding byte encountered in strict mode")]
    NonZeroPadding,

    #[error("value does not match the requested signature")]
    TypeMismatch,

    #[error("message length of {0} bytes exceeds the 128 MiB limit")]
    MessageTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
