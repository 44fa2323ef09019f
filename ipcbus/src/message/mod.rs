//! Messages: the in-memory representation of one D-Bus method call,
//! method return, error or signal (§3, §4.4).

pub mod fields;
pub mod header;

use std::sync::atomic::{AtomicU64, Ordering};

use ipcbus_names::{BusName, ErrorName, InterfaceName, MemberName};
use ipcbus_types::{ByteOrder, Endian, OwnedSignature, OwnedValue, Signature, Value};

pub use fields::{FieldCode, Fields};
pub use header::{Flags, PrimaryHeader, Type, MAX_MESSAGE_SIZE};

use crate::{Error, Result};

/// Pad `len` up to the next multiple of 8, per §4.4's "skip padding so the
/// next offset is 8-byte aligned" rule applied after the header-field
/// array.
pub(crate) fn padding_for_8_bytes(len: usize) -> usize {
    let rem = len % 8;
    if rem == 0 {
        0
    } else {
        8 - rem
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// One fully parsed D-Bus message: primary header, header-field table,
/// and (if present) a body decoded against the SIGNATURE field.
#[derive(Debug, Clone)]
pub struct Message {
    primary_header: PrimaryHeader,
    fields: Fields,
    body_bytes: Vec<u8>,
    body: Vec<OwnedValue>,
    /// A locally monotonic receive sequence number; not part of the wire
    /// format, used to order inbound messages for diagnostics/logging.
    seq: u64,
}

impl Message {
    fn new(primary_header: PrimaryHeader, fields: Fields, body_bytes: Vec<u8>, body: Vec<OwnedValue>) -> Self {
        Message { primary_header, fields, body_bytes, body, seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed) }
    }

    pub fn primary_header(&self) -> &PrimaryHeader {
        &self.primary_header
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn msg_type(&self) -> Type {
        self.primary_header.msg_type()
    }

    pub fn serial(&self) -> u32 {
        self.primary_header.serial()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn body(&self) -> &[OwnedValue] {
        &self.body
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    /// Required/forbidden field enforcement, §3's per-message-type table.
    pub fn validate_required_fields(&self) -> Result<()> {
        let f = &self.fields;
        let missing = |what: &str| Error::InconsistentMessage(format!("missing required field {what}"));
        let forbidden = |what: &str| Error::InconsistentMessage(format!("forbidden field {what} present"));
        match self.msg_type() {
            Type::MethodCall => {
                if f.path.is_none() {
                    return Err(missing("PATH"));
                }
                if f.member.is_none() {
                    return Err(missing("MEMBER"));
                }
                if f.reply_serial.is_some() {
                    return Err(forbidden("REPLY_SERIAL"));
                }
                if f.error_name.is_some() {
                    return Err(forbidden("ERROR_NAME"));
                }
            }
            Type::MethodReturn => {
                if f.reply_serial.is_none() {
                    return Err(missing("REPLY_SERIAL"));
                }
                if f.path.is_some() || f.member.is_some() || f.interface.is_some() || f.error_name.is_some() {
                    return Err(forbidden("PATH/MEMBER/INTERFACE/ERROR_NAME"));
                }
            }
            Type::Error => {
                if f.reply_serial.is_none() {
                    return Err(missing("REPLY_SERIAL"));
                }
                if f.error_name.is_none() {
                    return Err(missing("ERROR_NAME"));
                }
                if f.path.is_some() || f.member.is_some() || f.interface.is_some() {
                    return Err(forbidden("PATH/MEMBER/INTERFACE"));
                }
            }
            Type::Signal => {
                if f.path.is_none() {
                    return Err(missing("PATH"));
                }
                if f.interface.is_none() {
                    return Err(missing("INTERFACE"));
                }
                if f.member.is_none() {
                    return Err(missing("MEMBER"));
                }
                if f.reply_serial.is_some() || f.error_name.is_some() {
                    return Err(forbidden("REPLY_SERIAL/ERROR_NAME"));
                }
            }
            Type::Invalid => return Err(Error::InconsistentMessage("message type Invalid".into())),
        }
        Ok(())
    }

    /// Build one message from an already-parsed primary header, its
    /// header-field table, and its raw body bytes. Decodes the body
    /// against the SIGNATURE field if present, per §4.4.
    pub(crate) fn from_parts(primary_header: PrimaryHeader, fields: Fields, body_bytes: Vec<u8>, strict: bool) -> Result<Self> {
        let body = if let Some(sig) = &fields.signature {
            if body_bytes.is_empty() {
                Vec::new()
            } else {
                let (values, _consumed) = match primary_header.endian() {
                    Endian::Little => ipcbus_types::decode::<ipcbus_types::LittleEndian>(sig, &body_bytes, 0, strict)?,
                    Endian::Big => ipcbus_types::decode::<ipcbus_types::BigEndian>(sig, &body_bytes, 0, strict)?,
                };
                values
            }
        } else {
            Vec::new()
        };
        let msg = Message::new(primary_header, fields, body_bytes, body);
        msg.validate_required_fields()?;
        Ok(msg)
    }

    /// Encode this message into its complete wire frame (§4.4, §6).
    pub fn to_frame_bytes<B: ByteOrder>(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.primary_header.write::<B>(&mut out);
        let fields_bytes = self.fields.encode::<B>(out.len())?;
        let fields_len = fields_bytes.len() as u32;
        out.extend_from_slice(&fields_bytes);
        let pad = padding_for_8_bytes(out.len());
        out.extend(std::iter::repeat(0u8).take(pad));

        // Patch in the header-field array's byte length (offset 12) now
        // that it is known.
        let mut len_bytes = [0u8; 4];
        B::write_u32(&mut len_bytes, fields_len);
        out[12..16].copy_from_slice(&len_bytes);

        if out.len() + self.body_bytes.len() > MAX_MESSAGE_SIZE {
            return Err(Error::InconsistentMessage("message exceeds 128 MiB".into()));
        }
        out.extend_from_slice(&self.body_bytes);
        Ok(out)
    }

    fn build<B: ByteOrder>(
        msg_type: Type,
        flags: Flags,
        serial: u32,
        mut fields: Fields,
        body: &[Value<'_>],
    ) -> Result<Self> {
        let (body_bytes, signature) = if body.is_empty() {
            (Vec::new(), None)
        } else {
            let sig_string: String = body.iter().map(|v| v.value_type().to_signature_string()).collect();
            let sig = Signature::parse(&sig_string)?.to_owned();
            let mut bytes = Vec::new();
            for v in body {
                let (_n, encoded) = ipcbus_types::ser::encode::<B>(v, bytes.len())?;
                bytes.extend_from_slice(&encoded);
            }
            (bytes, Some(sig))
        };
        fields.signature = signature.clone();
        let primary_header = PrimaryHeader::new(B::endian(), msg_type, flags, serial, body_bytes.len() as u32);
        Message::from_parts(primary_header, fields, body_bytes, true)
    }

    pub fn method_call<B: ByteOrder>(
        serial: u32,
        path: ipcbus_types::ObjectPath<'_>,
        interface: Option<InterfaceName<'_>>,
        member: MemberName<'_>,
        destination: Option<BusName<'_>>,
        flags: Flags,
        body: &[Value<'_>],
    ) -> Result<Self> {
        let fields = Fields {
            path: Some(path.to_owned()),
            interface: interface.map(|i| i.to_owned()),
            member: Some(member.to_owned()),
            destination: destination.map(|d| d.to_owned()),
            ..Fields::default()
        };
        Message::build::<B>(Type::MethodCall, flags, serial, fields, body)
    }

    pub fn method_return<B: ByteOrder>(
        serial: u32,
        reply_to: &Message,
        body: &[Value<'_>],
    ) -> Result<Self> {
        let fields = Fields {
            reply_serial: Some(reply_to.serial()),
            destination: reply_to.fields().sender.clone(),
            ..Fields::default()
        };
        Message::build::<B>(Type::MethodReturn, Flags::empty(), serial, fields, body)
    }

    pub fn error<B: ByteOrder>(
        serial: u32,
        reply_to: &Message,
        error_name: ErrorName<'_>,
        body: &[Value<'_>],
    ) -> Result<Self> {
        let fields = Fields {
            reply_serial: Some(reply_to.serial()),
            error_name: Some(error_name.to_owned()),
            destination: reply_to.fields().sender.clone(),
            ..Fields::default()
        };
        Message::build::<B>(Type::Error, Flags::empty(), serial, fields, body)
    }

    pub fn signal<B: ByteOrder>(
        serial: u32,
        path: ipcbus_types::ObjectPath<'_>,
        interface: InterfaceName<'_>,
        member: MemberName<'_>,
        body: &[Value<'_>],
    ) -> Result<Self> {
        let fields = Fields {
            path: Some(path.to_owned()),
            interface: Some(interface.to_owned()),
            member: Some(member.to_owned()),
            ..Fields::default()
        };
        Message::build::<B>(Type::Signal, Flags::empty(), serial, fields, body)
    }

    /// Get the `OwnedSignature` describing [`Message::body`], if the
    /// message carries one.
    pub fn signature(&self) -> Option<&OwnedSignature> {
        self.fields.signature.as_ref()
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.msg_type() {
            Type::MethodCall => write!(
                f,
                "Method call {}",
                self.fields.member.as_ref().map(|m| m.as_str()).unwrap_or("?")
            ),
            Type::MethodReturn => write!(f, "Method return (reply to {})", self.fields.reply_serial.unwrap_or(0)),
            Type::Error => write!(
                f,
                "Error {} (reply to {})",
                self.fields.error_name.as_ref().map(|e| e.as_str()).unwrap_or("?"),
                self.fields.reply_serial.unwrap_or(0)
            ),
            Type::Signal => write!(
                f,
                "Signal {}.{}",
                self.fields.interface.as_ref().map(|i| i.as_str()).unwrap_or("?"),
                self.fields.member.as_ref().map(|m| m.as_str()).unwrap_or("?")
            ),
            Type::Invalid => write!(f, "Invalid message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_types::{LittleEndian, ObjectPath};

    #[test]
    fn hello_call_roundtrips_through_frame_bytes() {
        let msg = Message::method_call::<LittleEndian>(
            1,
            ObjectPath::try_from("/org/freedesktop/DBus").unwrap(),
            Some(InterfaceName::try_from("org.freedesktop.DBus").unwrap()),
            MemberName::try_from("Hello").unwrap(),
            Some(BusName::try_from("org.freedesktop.DBus").unwrap()),
            Flags::empty(),
            &[],
        )
        .unwrap();

        let bytes = msg.to_frame_bytes::<LittleEndian>().unwrap();
        let (primary, fields_len) = PrimaryHeader::read(&bytes).unwrap();
        let fields_start = header::PRIMARY_HEADER_SIZE;
        let fields_bytes = &bytes[fields_start..fields_start + 4 + fields_len as usize];
        let fields = Fields::decode::<LittleEndian>(fields_bytes, fields_start, true).unwrap();
        assert_eq!(fields.member.unwrap().as_str(), "Hello");
        assert_eq!(primary.serial(), 1);
    }

    #[test]
    fn method_return_forbids_path() {
        let call = Message::method_call::<LittleEndian>(
            1,
            ObjectPath::try_from("/").unwrap(),
            None,
            MemberName::try_from("Ping").unwrap(),
            None,
            Flags::empty(),
            &[],
        )
        .unwrap();
        let mut fields = Fields::default();
        fields.reply_serial = Some(1);
        fields.path = Some(ObjectPath::try_from("/").unwrap().to_owned());
        let header = PrimaryHeader::new(Endian::Little, Type::MethodReturn, Flags::empty(), 2, 0);
        assert!(Message::from_parts(header, fields, Vec::new(), true).is_err());
        let _ = call;
    }
}
