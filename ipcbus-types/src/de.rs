//! Offset-aware unmarshalling (§4.3): decode is always driven by a
//! signature/[`Type`], never by sniffing the stream — the wire format
//! carries no type codes except inside `VARIANT` and `SIGNATURE` values.

use byteorder::ByteOrder as ByteOrderExt;

use crate::{
    ByteOrder, DBusArray, DictEntry, Error, ObjectPath, Result, Signature, Str, Structure, Type,
    Value,
};

struct Cursor<'b> {
    buf: &'b [u8],
    pos: usize,
    start_offset: usize,
    strict: bool,
}

impl<'b> Cursor<'b> {
    fn align_to(&mut self, align: usize) -> Result<()> {
        let abs = self.start_offset + self.pos;
        let rem = abs % align;
        if rem == 0 {
            return Ok(());
        }
        let pad = align - rem;
        let bytes = self.take(pad)?;
        if self.strict && bytes.iter().any(|b| *b != 0) {
            return Err(Error::NonZeroPadding);
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::Eof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Decode every single complete type named by `signature` out of `buf`,
/// starting at the absolute stream offset `start_offset`. Returns the
/// decoded values, in order, and the number of bytes consumed.
pub fn decode<B: ByteOrder>(
    signature: &Signature,
    buf: &[u8],
    start_offset: usize,
    strict: bool,
) -> Result<(Vec<Value<'static>>, usize)> {
    let types = signature.types()?;
    let mut cursor = Cursor { buf, pos: 0, start_offset, strict };
    let mut values = Vec::with_capacity(types.len());
    for t in &types {
        values.push(decode_value::<B>(&mut cursor, t)?);
    }
    Ok((values, cursor.pos))
}

/// Decode exactly one value of type `t`. Convenience wrapper used when a
/// single complete type (e.g. a VARIANT's embedded type) is known ahead of
/// time.
pub fn decode_one<B: ByteOrder>(
    t: &Type,
    buf: &[u8],
    start_offset: usize,
    strict: bool,
) -> Result<(Value<'static>, usize)> {
    let mut cursor = Cursor { buf, pos: 0, start_offset, strict };
    let v = decode_value::<B>(&mut cursor, t)?;
    Ok((v, cursor.pos))
}

fn decode_value<B: ByteOrder>(c: &mut Cursor<'_>, t: &Type) -> Result<Value<'static>> {
    Ok(match t {
        Type::Byte => Value::Byte(c.take(1)?[0]),
        Type::Bool => {
            c.align_to(4)?;
            let v = B::read_u32(c.take(4)?);
            match v {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(Error::InvalidBoolean(other)),
            }
        }
        Type::I16 => {
            c.align_to(2)?;
            Value::I16(B::read_i16(c.take(2)?))
        }
        Type::U16 => {
            c.align_to(2)?;
            Value::U16(B::read_u16(c.take(2)?))
        }
        Type::I32 => {
            c.align_to(4)?;
            Value::I32(B::read_i32(c.take(4)?))
        }
        Type::U32 => {
            c.align_to(4)?;
            Value::U32(B::read_u32(c.take(4)?))
        }
        Type::I64 => {
            c.align_to(8)?;
            Value::I64(B::read_i64(c.take(8)?))
        }
        Type::U64 => {
            c.align_to(8)?;
            Value::U64(B::read_u64(c.take(8)?))
        }
        Type::F64 => {
            c.align_to(8)?;
            Value::F64(B::read_f64(c.take(8)?))
        }
        Type::UnixFd => {
            c.align_to(4)?;
            Value::UnixFd(B::read_u32(c.take(4)?))
        }
        Type::Str => Value::Str(Str::new(&decode_string::<B>(c)?)?.to_owned()),
        Type::ObjectPath => {
            let s = decode_string::<B>(c)?;
            Value::ObjectPath(ObjectPath::try_from(s.as_str())?.to_owned())
        }
        Type::Signature => Value::Signature(decode_signature(c)?.to_owned()),
        Type::Array(elem) => decode_array::<B>(c, elem)?,
        Type::Struct(fields) => decode_struct::<B>(c, fields)?,
        Type::DictEntry(key, value) => decode_dict_entry::<B>(c, key, value)?,
        Type::Variant => decode_variant::<B>(c)?,
    })
}

fn decode_string<B: ByteOrder>(c: &mut Cursor<'_>) -> Result<String> {
    c.align_to(4)?;
    let len = B::read_u32(c.take(4)?);
    if len as usize > c.remaining() {
        return Err(Error::LengthExceedsBuffer(len));
    }
    let bytes = c.take(len as usize)?;
    let s = std::str::from_utf8(bytes)?.to_owned();
    if c.take(1)?[0] != 0 {
        return Err(Error::MissingNul);
    }
    Ok(s)
}

fn decode_signature<'b>(c: &mut Cursor<'b>) -> Result<Signature<'b>> {
    // SIGNATURE is 1-aligned.
    let len = c.take(1)?[0];
    let bytes = c.take(len as usize)?;
    let s = std::str::from_utf8(bytes)?;
    if c.take(1)?[0] != 0 {
        return Err(Error::MissingNul);
    }
    Signature::parse(s)
}

fn decode_array<B: ByteOrder>(c: &mut Cursor<'_>, elem: &Type) -> Result<Value<'static>> {
    c.align_to(4)?;
    let len = B::read_u32(c.take(4)?);
    if len > crate::ser::MAX_ARRAY_LEN {
        return Err(Error::ArrayTooLarge(len));
    }
    let elem_align = elem.alignment();
    c.align_to(elem_align)?; // padding required even for an empty array

    let target = c.pos + len as usize;
    if target > c.buf.len() {
        return Err(Error::LengthExceedsBuffer(len));
    }
    let mut elements = Vec::new();
    while c.pos < target {
        elements.push(decode_value::<B>(c, elem)?);
    }
    if c.pos != target {
        return Err(Error::TypeMismatch);
    }
    Ok(Value::Array(DBusArray { element_type: elem.clone(), elements }))
}

fn decode_struct<B: ByteOrder>(c: &mut Cursor<'_>, fields: &[Type]) -> Result<Value<'static>> {
    c.align_to(8)?;
    let mut values = Vec::with_capacity(fields.len());
    for f in fields {
        values.push(decode_value::<B>(c, f)?);
    }
    Ok(Value::Struct(Structure { fields: values }))
}

fn decode_dict_entry<B: ByteOrder>(c: &mut Cursor<'_>, key: &Type, value: &Type) -> Result<Value<'static>> {
    c.align_to(8)?;
    let k = decode_value::<B>(c, key)?;
    let v = decode_value::<B>(c, value)?;
    Ok(Value::DictEntry(DictEntry { key: Box::new(k), value: Box::new(v) }))
}

fn decode_variant<B: ByteOrder>(c: &mut Cursor<'_>) -> Result<Value<'static>> {
    let sig = decode_signature(c)?;
    let types = sig.types()?;
    if types.len() != 1 {
        return Err(Error::TypeMismatch);
    }
    let v = decode_value::<B>(c, &types[0])?;
    Ok(Value::Variant(Box::new(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser;
    use byteorder::LittleEndian;

    #[test]
    fn roundtrip_basic_values() {
        for v in [
            Value::Byte(42),
            Value::Bool(true),
            Value::I32(-7),
            Value::U64(u64::MAX),
            Value::F64(1.5),
        ] {
            let sig_string = v.value_type().to_signature_string();
            let sig = Signature::from_str_unchecked(&sig_string);
            let (_len, bytes) = ser::encode::<LittleEndian>(&v, 0).unwrap();
            let (decoded, consumed) = decode::<LittleEndian>(&sig, &bytes, 0, true).unwrap();
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0], v);
            assert_eq!(consumed, bytes.len());
        }
    }

    #[test]
    fn decode_rejects_out_of_range_bool() {
        let bytes = [5u8, 0, 0, 0];
        let sig = Signature::parse("b").unwrap();
        assert!(decode::<LittleEndian>(&sig, &bytes, 0, true).is_err());
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let sig = Signature::parse("s").unwrap();
        let bytes = [5u8, 0, 0, 0, b'h', b'e'];
        assert!(decode::<LittleEndian>(&sig, &bytes, 0, true).is_err());
    }

    #[test]
    fn strict_mode_rejects_nonzero_padding() {
        // struct(byte, int32): 1 byte + 3 bytes padding (non-zero) + int32.
        let sig = Signature::parse("(yi)").unwrap();
        let mut bytes = vec![7u8, 1, 2, 3, 9, 0, 0, 0];
        assert!(decode::<LittleEndian>(&sig, &bytes, 0, true).is_err());
        // Non-strict mode tolerates it.
        assert!(decode::<LittleEndian>(&sig, &bytes, 0, false).is_ok());
        bytes[1] = 0;
        bytes[2] = 0;
        bytes[3] = 0;
        assert!(decode::<LittleEndian>(&sig, &bytes, 0, true).is_ok());
    }
}
