//! Inbound frame state machine and outbound frame composition (§4.4).
//!
//! The inbound half is driven incrementally: callers feed it whatever
//! bytes the transport happened to deliver via [`Framer::feed`], and it
//! yields complete [`Message`]s as soon as enough bytes have accumulated.
//! This mirrors the socket-agnostic design in §1/§6: the framer knows
//! nothing about how bytes arrived, only how to delimit them.

use ipcbus_types::Endian;

use crate::message::{fields::Fields, header::PrimaryHeader, padding_for_8_bytes, Message, MAX_MESSAGE_SIZE};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    HeaderFixed,
    HeaderFields,
    Body,
}

/// Per-stream inbound frame splitter, §4.4's three-state machine.
#[derive(Debug)]
pub struct Framer {
    state: State,
    buf: Vec<u8>,
    /// Set once the fixed header plus the fields-array length prefix are
    /// known (16 bytes in).
    primary_header: Option<PrimaryHeader>,
    fields_len: u32,
    /// Total frame length once `primary_header` is known: 12 + 4 +
    /// fields_len + padding-to-8 + body_len.
    total_len: usize,
    strict: bool,
}

impl Framer {
    pub fn new(strict: bool) -> Self {
        Framer { state: State::HeaderFixed, buf: Vec::new(), primary_header: None, fields_len: 0, total_len: 0, strict }
    }

    /// Feed newly received bytes. Returns every complete message the
    /// accumulated buffer now contains, in stream order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Message>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            match self.state {
                State::HeaderFixed => {
                    if self.buf.len() < crate::message::header::MIN_MESSAGE_SIZE {
                        break;
                    }
                    let (header, fields_len) = PrimaryHeader::read(&self.buf)?;
                    self.primary_header = Some(header);
                    self.fields_len = fields_len;
                    self.state = State::HeaderFields;
                }
                State::HeaderFields => {
                    let header_len = crate::message::header::PRIMARY_HEADER_SIZE + 4 + self.fields_len as usize;
                    let body_padding = padding_for_8_bytes(header_len);
                    let header = self.primary_header.expect("set in HeaderFixed");
                    let body_len = header.body_len() as usize;
                    let total = header_len + body_padding + body_len;
                    if total > MAX_MESSAGE_SIZE {
                        return Err(Error::InconsistentMessage("message exceeds 128 MiB".into()));
                    }
                    self.total_len = total;
                    if self.buf.len() < header_len {
                        break;
                    }
                    self.state = State::Body;
                }
                State::Body => {
                    if self.buf.len() < self.total_len {
                        break;
                    }
                    let frame: Vec<u8> = self.buf.drain(0..self.total_len).collect();
                    out.push(self.parse_frame(&frame)?);
                    self.primary_header = None;
                    self.fields_len = 0;
                    self.total_len = 0;
                    self.state = State::HeaderFixed;
                }
            }
        }
        Ok(out)
    }

    fn parse_frame(&self, frame: &[u8]) -> Result<Message> {
        let (header, fields_len) = PrimaryHeader::read(frame)?;
        let fields_start = crate::message::header::PRIMARY_HEADER_SIZE;
        let fields_end = fields_start + 4 + fields_len as usize;
        let fields = match header.endian() {
            Endian::Little => Fields::decode::<ipcbus_types::LittleEndian>(&frame[fields_start..fields_end], fields_start, self.strict)?,
            Endian::Big => Fields::decode::<ipcbus_types::BigEndian>(&frame[fields_start..fields_end], fields_start, self.strict)?,
        };
        let header_len = fields_end;
        let body_start = header_len + padding_for_8_bytes(header_len);
        let body = frame[body_start..].to_vec();
        Message::from_parts(header, fields, body, self.strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::header::{Flags, Type};
    use ipcbus_names::{BusName, InterfaceName, MemberName};
    use ipcbus_types::{LittleEndian, ObjectPath};

    #[test]
    fn feeds_one_message_byte_at_a_time() {
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

        let mut framer = Framer::new(true);
        let mut produced = Vec::new();
        for b in &bytes {
            produced.extend(framer.feed(&[*b]).unwrap());
        }
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].msg_type(), Type::MethodCall);
    }

    #[test]
    fn truncated_frame_yields_no_message() {
        let msg = Message::method_call::<LittleEndian>(
            1,
            ObjectPath::try_from("/").unwrap(),
            None,
            MemberName::try_from("Ping").unwrap(),
            None,
            Flags::empty(),
            &[],
        )
        .unwrap();
        let bytes = msg.to_frame_bytes::<LittleEndian>().unwrap();
        let mut framer = Framer::new(true);
        let produced = framer.feed(&bytes[..bytes.len() - 1]).unwrap();
        assert!(produced.is_empty());
    }
}
