use std::borrow::Cow;
use std::fmt;

use crate::{Error, Result};

/// Maximum byte length of a signature string, per the D-Bus specification.
pub const MAX_SIGNATURE_LEN: usize = 255;
/// Combined limit on array and struct nesting depth.
pub const MAX_NESTING_DEPTH: usize = 32;

/// A single complete D-Bus type, parsed out of a signature string.
///
/// This is the one canonical type model for the crate (see the "Ambiguous
/// source behaviour" note about not preserving a second, parallel
/// hierarchy): every value, signature and codec operation is expressed in
/// terms of this tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Byte,
    Bool,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F64,
    Str,
    ObjectPath,
    Signature,
    UnixFd,
    Array(Box<Type>),
    Struct(Vec<Type>),
    /// Only ever an element of an `Array`; never appears bare at top level.
    DictEntry(Box<Type>, Box<Type>),
    Variant,
}

impl Type {
    /// The type code character this type is written as in a signature
    /// string (containers use their leading code: `a`, `(`, `v`).
    pub fn code(&self) -> char {
        match self {
            Type::Byte => 'y',
            Type::Bool => 'b',
            Type::I16 => 'n',
            Type::U16 => 'q',
            Type::I32 => 'i',
            Type::U32 => 'u',
            Type::I64 => 'x',
            Type::U64 => 't',
            Type::F64 => 'd',
            Type::Str => 's',
            Type::ObjectPath => 'o',
            Type::Signature => 'g',
            Type::UnixFd => 'h',
            Type::Array(_) => 'a',
            Type::Struct(_) => '(',
            Type::DictEntry(_, _) => '{',
            Type::Variant => 'v',
        }
    }

    /// Is this one of the fixed-width, non-container basic types.
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            Type::Array(_) | Type::Struct(_) | Type::DictEntry(_, _) | Type::Variant
        )
    }

    /// Wire alignment, in bytes, of this type's first byte (§3 Alignments).
    pub fn alignment(&self) -> usize {
        match self {
            Type::Byte | Type::Signature | Type::Variant => 1,
            Type::I16 | Type::U16 => 2,
            Type::Bool | Type::I32 | Type::U32 | Type::Str | Type::ObjectPath | Type::UnixFd => 4,
            Type::Array(_) => 4,
            Type::I64 | Type::U64 | Type::F64 | Type::Struct(_) | Type::DictEntry(_, _) => 8,
        }
    }

    /// Render this type back out as a signature fragment.
    pub fn to_signature_string(&self) -> String {
        let mut s = String::new();
        self.write_signature(&mut s);
        s
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            Type::Array(elem) => {
                out.push('a');
                elem.write_signature(out);
            }
            Type::Struct(fields) => {
                out.push('(');
                for f in fields {
                    f.write_signature(out);
                }
                out.push(')');
            }
            Type::DictEntry(k, v) => {
                out.push('{');
                k.write_signature(out);
                v.write_signature(out);
                out.push('}');
            }
            other => out.push(other.code()),
        }
    }
}

/// A parsed, validated D-Bus signature: an ordered sequence of single
/// complete types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature<'s> {
    raw: Cow<'s, str>,
}

pub type OwnedSignature = Signature<'static>;

impl<'s> Signature<'s> {
    /// Parse and validate a signature string (§4.1 failure conditions).
    pub fn parse(raw: &'s str) -> Result<Self> {
        validate(raw)?;
        Ok(Signature { raw: Cow::Borrowed(raw) })
    }

    /// Build a `Signature` from an already-validated string without
    /// re-checking the grammar. Used internally once a value has already
    /// proven its own signature is well formed.
    pub fn from_str_unchecked(raw: &'s str) -> Self {
        Signature { raw: Cow::Borrowed(raw) }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn to_owned(&self) -> OwnedSignature {
        Signature { raw: Cow::Owned(self.raw.clone().into_owned()) }
    }

    /// The top-level single complete types this signature names, in order.
    pub fn types(&self) -> Result<Vec<Type>> {
        let mut pos = 0usize;
        let bytes = self.raw.as_bytes();
        let mut out = Vec::new();
        while pos < bytes.len() {
            let (t, next) = parse_one(bytes, pos, 0)?;
            out.push(t);
            pos = next;
        }
        Ok(out)
    }

    /// True if this signature names exactly one complete type (as required
    /// for a VARIANT's embedded signature).
    pub fn is_single_complete_type(&self) -> bool {
        matches!(self.types().as_deref(), Ok([_]))
    }
}

impl<'s> fmt::Display for Signature<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<'s> From<&'s str> for Signature<'s> {
    fn from(s: &'s str) -> Self {
        Signature::from_str_unchecked(s)
    }
}

fn validate(raw: &str) -> Result<()> {
    if raw.len() > MAX_SIGNATURE_LEN {
        return Err(Error::SignatureTooLong(raw.len()));
    }
    let bytes = raw.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let (_, next) = parse_one(bytes, pos, 0)?;
        pos = next;
    }
    Ok(())
}

/// Parse one single complete type starting at `pos`, returning the type and
/// the position just past it. `depth` tracks combined array+struct nesting.
fn parse_one(bytes: &[u8], pos: usize, depth: usize) -> Result<(Type, usize)> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::NestingTooDeep);
    }
    let Some(&b) = bytes.get(pos) else {
        return Err(Error::InvalidSignature {
            position: pos,
            reason: "unexpected end of signature",
        });
    };
    match b {
        b'y' => Ok((Type::Byte, pos + 1)),
        b'b' => Ok((Type::Bool, pos + 1)),
        b'n' => Ok((Type::I16, pos + 1)),
        b'q' => Ok((Type::U16, pos + 1)),
        b'i' => Ok((Type::I32, pos + 1)),
        b'u' => Ok((Type::U32, pos + 1)),
        b'x' => Ok((Type::I64, pos + 1)),
        b't' => Ok((Type::U64, pos + 1)),
        b'd' => Ok((Type::F64, pos + 1)),
        b's' => Ok((Type::Str, pos + 1)),
        b'o' => Ok((Type::ObjectPath, pos + 1)),
        b'g' => Ok((Type::Signature, pos + 1)),
        b'h' => Ok((Type::UnixFd, pos + 1)),
        b'v' => Ok((Type::Variant, pos + 1)),
        b'a' => {
            let (elem, next) = parse_array_element(bytes, pos + 1, depth + 1)?;
            Ok((Type::Array(Box::new(elem)), next))
        }
        b'(' => {
            let mut fields = Vec::new();
            let mut cur = pos + 1;
            loop {
                match bytes.get(cur) {
                    None => {
                        return Err(Error::InvalidSignature {
                            position: pos,
                            reason: "unterminated struct",
                        })
                    }
                    Some(b')') => break,
                    _ => {
                        let (f, next) = parse_one(bytes, cur, depth + 1)?;
                        fields.push(f);
                        cur = next;
                    }
                }
            }
            if fields.is_empty() {
                return Err(Error::InvalidSignature {
                    position: pos,
                    reason: "struct must have at least one field",
                });
            }
            Ok((Type::Struct(fields), cur + 1))
        }
        b')' => Err(Error::InvalidSignature {
            position: pos,
            reason: "unbalanced ')'",
        }),
        b'{' => Err(Error::InvalidSignature {
            position: pos,
            reason: "dict-entry may only appear as an array element",
        }),
        b'}' => Err(Error::InvalidSignature {
            position: pos,
            reason: "unbalanced '}'",
        }),
        other => Err(Error::InvalidSignature {
            position: pos,
            reason: invalid_code_reason(other),
        }),
    }
}

fn invalid_code_reason(_b: u8) -> &'static str {
    "invalid type code"
}

/// Parses the element type of an array, specially allowing a dict-entry
/// (`{...}`) as that element — the only context in which one may appear.
fn parse_array_element(bytes: &[u8], pos: usize, depth: usize) -> Result<(Type, usize)> {
    if bytes.get(pos) == Some(&b'{') {
        let mut cur = pos + 1;
        let (key, next) = parse_one(bytes, cur, depth + 1)?;
        if !key.is_basic() {
            return Err(Error::InvalidSignature {
                position: pos,
                reason: "dict-entry key must be a basic type",
            });
        }
        cur = next;
        let (value, next) = parse_one(bytes, cur, depth + 1)?;
        cur = next;
        if bytes.get(cur) != Some(&b'}') {
            return Err(Error::InvalidSignature {
                position: pos,
                reason: "unterminated dict-entry",
            });
        }
        Ok((Type::DictEntry(Box::new(key), Box::new(value)), cur + 1))
    } else {
        parse_one(bytes, pos, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_types_parse() {
        let sig = Signature::parse("ybnqiuxtdsogh").unwrap();
        assert_eq!(sig.types().unwrap().len(), 13);
    }

    #[test]
    fn array_of_struct() {
        let sig = Signature::parse("a(is)").unwrap();
        let types = sig.types().unwrap();
        assert_eq!(types.len(), 1);
        match &types[0] {
            Type::Array(elem) => match elem.as_ref() {
                Type::Struct(fields) => assert_eq!(fields, &vec![Type::I32, Type::Str]),
                _ => panic!("expected struct"),
            },
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn dict_entry_only_inside_array() {
        assert!(Signature::parse("{sv}").is_err());
        assert!(Signature::parse("a{sv}").is_ok());
    }

    #[test]
    fn dict_key_must_be_basic() {
        assert!(Signature::parse("a{(i)v}").is_err());
    }

    #[test]
    fn empty_struct_rejected() {
        assert!(Signature::parse("()").is_err());
    }

    #[test]
    fn unterminated_struct_rejected() {
        assert!(Signature::parse("(i").is_err());
    }

    #[test]
    fn signature_too_long_rejected() {
        let long: String = std::iter::repeat('y').take(256).collect();
        assert!(Signature::parse(&long).is_err());
        let ok: String = std::iter::repeat('y').take(255).collect();
        assert!(Signature::parse(&ok).is_ok());
    }

    #[test]
    fn variant_is_bare_code() {
        let sig = Signature::parse("v").unwrap();
        assert_eq!(sig.types().unwrap(), vec![Type::Variant]);
    }

    #[test]
    fn nesting_depth_enforced() {
        let deep: String = std::iter::repeat('a').take(33).chain(std::iter::once('y')).collect();
        assert!(Signature::parse(&deep).is_err());
    }
}
