use std::borrow::Cow;
use std::fmt;

use crate::{Error, Result, Signature, Type};

/// A validated D-Bus object path (`/([A-Za-z0-9_]+(/[A-Za-z0-9_]+)*)?` or
/// exactly `/`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectPath<'p>(Cow<'p, str>);

pub type OwnedObjectPath = ObjectPath<'static>;

impl<'p> ObjectPath<'p> {
    pub fn try_from(path: &'p str) -> Result<Self> {
        validate_object_path(path)?;
        Ok(ObjectPath(Cow::Borrowed(path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_owned(&self) -> OwnedObjectPath {
        ObjectPath(Cow::Owned(self.0.clone().into_owned()))
    }
}

impl<'p> fmt::Display for ObjectPath<'p> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_object_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(Error::InvalidObjectPath(path.to_owned()));
    }
    for segment in path[1..].split('/') {
        if segment.is_empty()
            || !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(Error::InvalidObjectPath(path.to_owned()));
        }
    }
    Ok(())
}

/// A D-Bus `STRING` value: UTF-8, no embedded NUL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Str<'s>(Cow<'s, str>);

pub type OwnedStr = Str<'static>;

impl<'s> Str<'s> {
    pub fn new(s: &'s str) -> Result<Self> {
        if s.contains('\0') {
            return Err(Error::EmbeddedNul);
        }
        Ok(Str(Cow::Borrowed(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_owned(&self) -> OwnedStr {
        Str(Cow::Owned(self.0.clone().into_owned()))
    }
}

impl<'s> fmt::Display for Str<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An array value: every element shares `element_type`.
#[derive(Clone, Debug, PartialEq)]
pub struct DBusArray<'v> {
    pub element_type: Type,
    pub elements: Vec<Value<'v>>,
}

/// A struct value: an ordered, fixed set of heterogeneous fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Structure<'v> {
    pub fields: Vec<Value<'v>>,
}

/// A dict-entry value; only ever found as an `Array` element.
#[derive(Clone, Debug, PartialEq)]
pub struct DictEntry<'v> {
    pub key: Box<Value<'v>>,
    pub value: Box<Value<'v>>,
}

/// The single canonical in-memory representation of any D-Bus value.
///
/// See the note in DESIGN.md about resolving the two-hierarchy ambiguity
/// flagged by the source material: this is the only value type in the
/// crate.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<'v> {
    Byte(u8),
    Bool(bool),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(Str<'v>),
    ObjectPath(ObjectPath<'v>),
    Signature(Signature<'v>),
    UnixFd(u32),
    Array(DBusArray<'v>),
    Struct(Structure<'v>),
    DictEntry(DictEntry<'v>),
    Variant(Box<Value<'v>>),
}

pub type OwnedValue = Value<'static>;

impl<'v> Value<'v> {
    /// The `Type` that describes this value's shape.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Byte(_) => Type::Byte,
            Value::Bool(_) => Type::Bool,
            Value::I16(_) => Type::I16,
            Value::U16(_) => Type::U16,
            Value::I32(_) => Type::I32,
            Value::U32(_) => Type::U32,
            Value::I64(_) => Type::I64,
            Value::U64(_) => Type::U64,
            Value::F64(_) => Type::F64,
            Value::Str(_) => Type::Str,
            Value::ObjectPath(_) => Type::ObjectPath,
            Value::Signature(_) => Type::Signature,
            Value::UnixFd(_) => Type::UnixFd,
            Value::Array(a) => Type::Array(Box::new(a.element_type.clone())),
            Value::Struct(s) => Type::Struct(s.fields.iter().map(Value::value_type).collect()),
            Value::DictEntry(d) => {
                Type::DictEntry(Box::new(d.key.value_type()), Box::new(d.value.value_type()))
            }
            Value::Variant(_) => Type::Variant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_root_is_valid() {
        assert!(ObjectPath::try_from("/").is_ok());
    }

    #[test]
    fn object_path_rejects_double_slash() {
        assert!(ObjectPath::try_from("/a//b").is_err());
    }

    #[test]
    fn object_path_rejects_trailing_slash() {
        assert!(ObjectPath::try_from("/a/").is_err());
    }

    #[test]
    fn object_path_accepts_segments() {
        assert!(ObjectPath::try_from("/org/freedesktop/DBus").is_ok());
    }

    #[test]
    fn str_rejects_embedded_nul() {
        assert!(Str::new("a\0b").is_err());
    }
}
