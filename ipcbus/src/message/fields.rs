//! The header-field table: the `a(yv)` array that follows the fixed
//! 12-byte header, keyed by field code (§3, §4.4).

use ipcbus_names::{BusName, ErrorName, InterfaceName, MemberName, OwnedBusName, OwnedErrorName, OwnedInterfaceName, OwnedMemberName};
use ipcbus_types::{ByteOrder, DBusArray, OwnedObjectPath, OwnedSignature, Signature, Structure, Type, Value};

use crate::message::header;
use crate::{Error, Result};

/// Header field codes, §3.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldCode {
    Path = 1,
    Interface = 2,
    Member = 3,
    ErrorName = 4,
    ReplySerial = 5,
    Destination = 6,
    Sender = 7,
    Signature = 8,
    UnixFds = 9,
}

impl TryFrom<u8> for FieldCode {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        Ok(match v {
            1 => FieldCode::Path,
            2 => FieldCode::Interface,
            3 => FieldCode::Member,
            4 => FieldCode::ErrorName,
            5 => FieldCode::ReplySerial,
            6 => FieldCode::Destination,
            7 => FieldCode::Sender,
            8 => FieldCode::Signature,
            9 => FieldCode::UnixFds,
            other => {
                return Err(Error::InconsistentMessage(format!(
                    "unknown header field code {other}"
                )))
            }
        })
    }
}

/// The decoded header-field table for one message. Every field is
/// optional here; required-field enforcement per message type happens in
/// [`crate::message::Message::validate_required_fields`].
#[derive(Debug, Clone, Default)]
pub struct Fields {
    pub path: Option<OwnedObjectPath>,
    pub interface: Option<OwnedInterfaceName>,
    pub member: Option<OwnedMemberName>,
    pub error_name: Option<OwnedErrorName>,
    pub reply_serial: Option<u32>,
    pub destination: Option<OwnedBusName>,
    pub sender: Option<OwnedBusName>,
    pub signature: Option<OwnedSignature>,
    pub unix_fds: Option<u32>,
}

impl Fields {
    /// Encode this table as the `a(yv)` array the frame format requires,
    /// not including leading alignment padding (the caller is always at
    /// an 8-byte boundary already, offset 12).
    pub fn encode<B: ByteOrder>(&self, start_offset: usize) -> Result<Vec<u8>> {
        let mut entries = Vec::new();
        if let Some(path) = &self.path {
            entries.push(entry(FieldCode::Path, Value::ObjectPath(path.clone())));
        }
        if let Some(iface) = &self.interface {
            entries.push(entry(FieldCode::Interface, str_value(iface.as_str())?));
        }
        if let Some(member) = &self.member {
            entries.push(entry(FieldCode::Member, str_value(member.as_str())?));
        }
        if let Some(err) = &self.error_name {
            entries.push(entry(FieldCode::ErrorName, str_value(err.as_str())?));
        }
        if let Some(rs) = self.reply_serial {
            entries.push(entry(FieldCode::ReplySerial, Value::U32(rs)));
        }
        if let Some(dest) = &self.destination {
            entries.push(entry(FieldCode::Destination, str_value(dest.as_str())?));
        }
        if let Some(sender) = &self.sender {
            entries.push(entry(FieldCode::Sender, str_value(sender.as_str())?));
        }
        if let Some(sig) = &self.signature {
            entries.push(entry(FieldCode::Signature, Value::Signature(sig.clone())));
        }
        if let Some(fds) = self.unix_fds {
            entries.push(entry(FieldCode::UnixFds, Value::U32(fds)));
        }

        let array = Value::Array(DBusArray {
            element_type: Type::Struct(vec![Type::Byte, Type::Variant]),
            elements: entries,
        });
        let (_len, bytes) = ipcbus_types::ser::encode::<B>(&array, start_offset)?;
        Ok(bytes)
    }

    /// Decode the `a(yv)` array starting at `start_offset`; `bytes` holds
    /// exactly the array's own encoding (length prefix included).
    pub fn decode<B: ByteOrder>(bytes: &[u8], start_offset: usize, strict: bool) -> Result<Self> {
        let sig = Signature::parse("a(yv)").expect("static signature");
        let (mut values, _consumed) = ipcbus_types::decode::<B>(&sig, bytes, start_offset, strict)?;
        let array = values.remove(0);
        let elements = match array {
            Value::Array(DBusArray { elements, .. }) => elements,
            _ => return Err(Error::InconsistentMessage("header fields is not an array".into())),
        };

        let mut fields = Fields::default();
        for elem in elements {
            let Structure { fields: pair } = match elem {
                Value::Struct(s) => s,
                _ => return Err(Error::InconsistentMessage("header field entry is not a struct".into())),
            };
            let mut it = pair.into_iter();
            let code = match it.next() {
                Some(Value::Byte(b)) => FieldCode::try_from(b)?,
                _ => return Err(Error::InconsistentMessage("header field code is not a byte".into())),
            };
            let variant = match it.next() {
                Some(Value::Variant(v)) => *v,
                _ => return Err(Error::InconsistentMessage("header field value is not a variant".into())),
            };
            assign_field(&mut fields, code, variant)?;
        }
        Ok(fields)
    }
}

fn entry(code: FieldCode, value: Value<'static>) -> Value<'static> {
    Value::Struct(Structure { fields: vec![Value::Byte(code as u8), Value::Variant(Box::new(value))] })
}

fn str_value(s: &str) -> Result<Value<'static>> {
    Ok(Value::Str(ipcbus_types::Str::new(s)?.to_owned()))
}

fn assign_field(fields: &mut Fields, code: FieldCode, value: Value<'static>) -> Result<()> {
    fn type_mismatch() -> Error {
        Error::InconsistentMessage("header field wire type mismatch".into())
    }
    match code {
        FieldCode::Path => {
            fields.path = Some(match value {
                Value::ObjectPath(p) => p,
                _ => return Err(type_mismatch()),
            });
        }
        FieldCode::Interface => {
            let s = as_str(value)?;
            fields.interface = Some(InterfaceName::try_from(s.as_str())?.to_owned());
        }
        FieldCode::Member => {
            let s = as_str(value)?;
            fields.member = Some(MemberName::try_from(s.as_str())?.to_owned());
        }
        FieldCode::ErrorName => {
            let s = as_str(value)?;
            fields.error_name = Some(ErrorName::try_from(s.as_str())?.to_owned());
        }
        FieldCode::ReplySerial => {
            fields.reply_serial = Some(match value {
                Value::U32(v) => v,
                _ => return Err(type_mismatch()),
            });
        }
        FieldCode::Destination => {
            let s = as_str(value)?;
            fields.destination = Some(BusName::try_from(s.as_str())?.to_owned());
        }
        FieldCode::Sender => {
            let s = as_str(value)?;
            fields.sender = Some(BusName::try_from(s.as_str())?.to_owned());
        }
        FieldCode::Signature => {
            fields.signature = Some(match value {
                Value::Signature(s) => s,
                _ => return Err(type_mismatch()),
            });
        }
        FieldCode::UnixFds => {
            fields.unix_fds = Some(match value {
                Value::U32(v) => v,
                _ => return Err(type_mismatch()),
            });
        }
    }
    Ok(())
}

fn as_str(value: Value<'static>) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.as_str().to_owned()),
        _ => Err(Error::InconsistentMessage("header field wire type mismatch".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_types::{LittleEndian, ObjectPath};

    #[test]
    fn roundtrip_method_call_fields() {
        let mut fields = Fields::default();
        fields.path = Some(ObjectPath::try_from("/org/freedesktop/DBus").unwrap().to_owned());
        fields.member = Some(ipcbus_names::MemberName::try_from("Hello").unwrap().to_owned());
        fields.interface = Some(ipcbus_names::InterfaceName::try_from("org.freedesktop.DBus").unwrap().to_owned());
        fields.destination = Some(ipcbus_names::BusName::try_from("org.freedesktop.DBus").unwrap().to_owned());

        let bytes = fields.encode::<LittleEndian>(header::PRIMARY_HEADER_SIZE).unwrap();
        let decoded = Fields::decode::<LittleEndian>(&bytes, header::PRIMARY_HEADER_SIZE, true).unwrap();
        assert_eq!(decoded.path.unwrap().as_str(), "/org/freedesktop/DBus");
        assert_eq!(decoded.member.unwrap().as_str(), "Hello");
    }
}
