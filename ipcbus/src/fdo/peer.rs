//! `org.freedesktop.DBus.Peer` replies (§4.7): `Ping` and `GetMachineId`.

use ipcbus_types::{ByteOrder, Value};

use crate::message::Message;
use crate::Result;

use super::PEER_INTERFACE;

/// Where `GetMachineId` reads its answer from. The standard location is
/// `/etc/machine-id`; callers without one (containers, tests) can supply a
/// fixed id instead.
#[derive(Debug, Clone)]
pub enum MachineId {
    Path(std::path::PathBuf),
    Fixed(String),
}

impl Default for MachineId {
    fn default() -> Self {
        MachineId::Path("/etc/machine-id".into())
    }
}

impl MachineId {
    fn read(&self) -> String {
        match self {
            MachineId::Fixed(id) => id.clone(),
            MachineId::Path(path) => std::fs::read_to_string(path)
                .map(|s| s.trim().to_owned())
                .unwrap_or_else(|_| "0".repeat(32)),
        }
    }
}

/// If `call` is a method call on the `Peer` interface, build its reply.
/// Returns `None` for anything else, leaving it to continue through the
/// pipeline untouched.
pub fn handle_peer_call<B: ByteOrder>(call: &Message, reply_serial: u32, machine_id: &MachineId) -> Option<Result<Message>> {
    let interface = call.fields().interface.as_ref()?;
    if interface.as_str() != PEER_INTERFACE {
        return None;
    }
    let member = call.fields().member.as_ref()?.as_str();
    Some(match member {
        "Ping" => Message::method_return::<B>(reply_serial, call, &[]),
        "GetMachineId" => {
            let id = machine_id.read();
            match ipcbus_types::Str::new(&id) {
                Ok(s) => Message::method_return::<B>(reply_serial, call, &[Value::Str(s)]),
                Err(e) => Err(e.into()),
            }
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_names::{InterfaceName, MemberName};
    use ipcbus_types::{LittleEndian, ObjectPath};

    fn ping_call() -> Message {
        Message::method_call::<LittleEndian>(
            7,
            ObjectPath::try_from("/org/freedesktop/DBus").unwrap(),
            Some(InterfaceName::try_from("org.freedesktop.DBus.Peer").unwrap()),
            MemberName::try_from("Ping").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap()
    }

    #[test]
    fn ping_gets_an_empty_reply() {
        let call = ping_call();
        let reply = handle_peer_call::<LittleEndian>(&call, 1, &MachineId::default()).unwrap().unwrap();
        assert!(reply.body().is_empty());
        assert_eq!(reply.fields().reply_serial, Some(7));
    }

    #[test]
    fn get_machine_id_uses_fixed_override() {
        let mut call = ping_call();
        // Simulate a GetMachineId call by rebuilding with that member.
        call = Message::method_call::<LittleEndian>(
            8,
            ObjectPath::try_from("/org/freedesktop/DBus").unwrap(),
            Some(InterfaceName::try_from("org.freedesktop.DBus.Peer").unwrap()),
            MemberName::try_from("GetMachineId").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap();
        let id = MachineId::Fixed("abc123".into());
        let reply = handle_peer_call::<LittleEndian>(&call, 1, &id).unwrap().unwrap();
        match &reply.body()[0] {
            ipcbus_types::OwnedValue::Str(s) => assert_eq!(s.as_str(), "abc123"),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn non_peer_interface_is_ignored() {
        let call = Message::method_call::<LittleEndian>(
            9,
            ObjectPath::try_from("/").unwrap(),
            Some(InterfaceName::try_from("com.example.Other").unwrap()),
            MemberName::try_from("Ping").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap();
        assert!(handle_peer_call::<LittleEndian>(&call, 1, &MachineId::default()).is_none());
    }
}
