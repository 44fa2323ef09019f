//! Offset-aware marshalling (§4.2 of the specification this crate
//! implements): encode any [`Value`] into a byte buffer, given the
//! absolute stream offset its first byte will land at.

use byteorder::ByteOrder as ByteOrderExt;

use crate::{ByteOrder, DictEntry, Error, Result, Signature, Structure, Value};

/// Maximum size, in bytes, of a single array's encoded element data.
pub const MAX_ARRAY_LEN: u32 = 64 * 1024 * 1024;
/// Maximum size, in bytes, of a complete message.
pub const MAX_MESSAGE_LEN: usize = 128 * 1024 * 1024;

/// Encode `value` as though its first (non-padding) byte will land at
/// `start_offset` in the containing stream. Returns the number of bytes
/// produced (including any leading alignment padding) and the bytes
/// themselves.
pub fn encode<B: ByteOrder>(value: &Value<'_>, start_offset: usize) -> Result<(usize, Vec<u8>)> {
    let mut buf = Vec::new();
    encode_value::<B>(value, start_offset, &mut buf)?;
    Ok((buf.len(), buf))
}

fn pad_to(buf: &mut Vec<u8>, start_offset: usize, align: usize) {
    let pos = start_offset + buf.len();
    let rem = pos % align;
    if rem != 0 {
        buf.extend(std::iter::repeat(0u8).take(align - rem));
    }
}

fn encode_value<B: ByteOrder>(value: &Value<'_>, start_offset: usize, buf: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Byte(b) => buf.push(*b),
        Value::Bool(b) => {
            pad_to(buf, start_offset, 4);
            write_u32::<B>(buf, if *b { 1 } else { 0 });
        }
        Value::I16(v) => {
            pad_to(buf, start_offset, 2);
            let mut tmp = [0u8; 2];
            B::write_i16(&mut tmp, *v);
            buf.extend_from_slice(&tmp);
        }
        Value::U16(v) => {
            pad_to(buf, start_offset, 2);
            let mut tmp = [0u8; 2];
            B::write_u16(&mut tmp, *v);
            buf.extend_from_slice(&tmp);
        }
        Value::I32(v) => {
            pad_to(buf, start_offset, 4);
            let mut tmp = [0u8; 4];
            B::write_i32(&mut tmp, *v);
            buf.extend_from_slice(&tmp);
        }
        Value::U32(v) => {
            pad_to(buf, start_offset, 4);
            write_u32::<B>(buf, *v);
        }
        Value::I64(v) => {
            pad_to(buf, start_offset, 8);
            let mut tmp = [0u8; 8];
            B::write_i64(&mut tmp, *v);
            buf.extend_from_slice(&tmp);
        }
        Value::U64(v) => {
            pad_to(buf, start_offset, 8);
            let mut tmp = [0u8; 8];
            B::write_u64(&mut tmp, *v);
            buf.extend_from_slice(&tmp);
        }
        Value::F64(v) => {
            pad_to(buf, start_offset, 8);
            let mut tmp = [0u8; 8];
            B::write_f64(&mut tmp, *v);
            buf.extend_from_slice(&tmp);
        }
        Value::UnixFd(v) => {
            pad_to(buf, start_offset, 4);
            write_u32::<B>(buf, *v);
        }
        Value::Str(s) => encode_string::<B>(buf, start_offset, s.as_str())?,
        Value::ObjectPath(p) => encode_string::<B>(buf, start_offset, p.as_str())?,
        Value::Signature(sig) => encode_signature(buf, sig)?,
        Value::Array(arr) => encode_array::<B>(buf, start_offset, arr)?,
        Value::Struct(s) => encode_struct::<B>(buf, start_offset, s)?,
        Value::DictEntry(d) => encode_dict_entry::<B>(buf, start_offset, d)?,
        Value::Variant(inner) => encode_variant::<B>(buf, start_offset, inner)?,
    }
    Ok(())
}

fn write_u32<B: ByteOrder>(buf: &mut Vec<u8>, v: u32) {
    let mut tmp = [0u8; 4];
    B::write_u32(&mut tmp, v);
    buf.extend_from_slice(&tmp);
}

fn encode_string<B: ByteOrder>(buf: &mut Vec<u8>, start_offset: usize, s: &str) -> Result<()> {
    pad_to(buf, start_offset, 4);
    if s.contains('\0') {
        return Err(Error::EmbeddedNul);
    }
    write_u32::<B>(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn encode_signature(buf: &mut Vec<u8>, sig: &Signature<'_>) -> Result<()> {
    // SIGNATURE is 1-aligned; no padding ever required.
    if sig.len() > 255 {
        return Err(Error::SignatureTooLong(sig.len()));
    }
    buf.push(sig.len() as u8);
    buf.extend_from_slice(sig.as_str().as_bytes());
    buf.push(0);
    Ok(())
}

fn encode_array<B: ByteOrder>(
    buf: &mut Vec<u8>,
    start_offset: usize,
    arr: &crate::DBusArray<'_>,
) -> Result<()> {
    pad_to(buf, start_offset, 4);
    let len_pos = buf.len();
    buf.extend_from_slice(&[0u8; 4]); // reserved length slot
    let elem_align = arr.element_type.alignment();
    pad_to(buf, start_offset, elem_align); // pad even if empty

    let elems_start = buf.len();
    for elem in &arr.elements {
        encode_value::<B>(elem, start_offset, buf)?;
    }
    let elems_len = buf.len() - elems_start;
    if elems_len as u64 > MAX_ARRAY_LEN as u64 {
        return Err(Error::ArrayTooLarge(elems_len as u32));
    }
    let mut tmp = [0u8; 4];
    B::write_u32(&mut tmp, elems_len as u32);
    buf[len_pos..len_pos + 4].copy_from_slice(&tmp);
    Ok(())
}

fn encode_struct<B: ByteOrder>(buf: &mut Vec<u8>, start_offset: usize, s: &Structure<'_>) -> Result<()> {
    pad_to(buf, start_offset, 8);
    for field in &s.fields {
        encode_value::<B>(field, start_offset, buf)?;
    }
    Ok(())
}

fn encode_dict_entry<B: ByteOrder>(
    buf: &mut Vec<u8>,
    start_offset: usize,
    d: &DictEntry<'_>,
) -> Result<()> {
    pad_to(buf, start_offset, 8);
    encode_value::<B>(&d.key, start_offset, buf)?;
    encode_value::<B>(&d.value, start_offset, buf)?;
    Ok(())
}

fn encode_variant<B: ByteOrder>(buf: &mut Vec<u8>, start_offset: usize, inner: &Value<'_>) -> Result<()> {
    // Variant itself is 1-aligned: no leading pad beyond what the caller
    // already applied for the outer container.
    let sig_string = inner.value_type().to_signature_string();
    let sig = Signature::from_str_unchecked(&sig_string);
    encode_signature(buf, &sig)?;
    encode_value::<B>(inner, start_offset, buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DBusArray, Type};
    use byteorder::LittleEndian;

    #[test]
    fn encode_empty_array_pads_to_element_alignment() {
        let arr = Value::Array(DBusArray { element_type: Type::I64, elements: vec![] });
        let (_len, bytes) = encode::<LittleEndian>(&arr, 0).unwrap();
        // 4-byte length (0) + 4 bytes padding to reach 8-byte alignment.
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn encode_array_too_large_fails() {
        let elements = (0..(MAX_ARRAY_LEN + 1)).map(|_| Value::Byte(0)).collect();
        let arr = Value::Array(DBusArray { element_type: Type::Byte, elements });
        assert!(encode::<LittleEndian>(&arr, 0).is_err());
    }

    #[test]
    fn encode_variant_int64_from_offset_zero() {
        // Classic textbook example: signature "x" (3 bytes) padded to the
        // next 8-byte boundary (5 bytes), followed by the 8-byte int64.
        let (len, bytes) = encode::<LittleEndian>(&Value::Variant(Box::new(Value::I64(-1))), 0).unwrap();
        assert_eq!(len, 16);
        assert_eq!(&bytes[0..3], &[1, b'x', 0]);
        assert_eq!(&bytes[3..8], &[0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &[0xff; 8]);
    }

    #[test]
    fn padding_bytes_are_always_zero() {
        let arr = Value::Array(DBusArray {
            element_type: Type::Struct(vec![Type::Byte, Type::I32]),
            elements: vec![],
        });
        let (_len, bytes) = encode::<LittleEndian>(&arr, 0).unwrap();
        assert!(bytes.iter().all(|b| *b == 0));
    }
}
