//! The mandatory `Hello()` exchange that acquires this connection's unique
//! bus name (§4.7). The actual send/await-reply plumbing belongs to
//! [`crate::connection`]; this module only knows how to build the call and
//! interpret the result, so it has no dependency on the connection runtime.

use ipcbus_names::{BusName, InterfaceName, MemberName, OwnedUniqueName, UniqueName};
use ipcbus_types::{ByteOrder, OwnedValue};

use crate::message::{Flags, Message};
use crate::Error;
use crate::Result;

use super::{BUS_DESTINATION, BUS_INTERFACE, BUS_PATH};

/// Build the `org.freedesktop.DBus.Hello()` call sent immediately after
/// SASL completes.
pub fn build_hello_call<B: ByteOrder>(serial: u32) -> Result<Message> {
    Message::method_call::<B>(
        serial,
        ipcbus_types::ObjectPath::try_from(BUS_PATH)?,
        Some(InterfaceName::try_from(BUS_INTERFACE)?),
        MemberName::try_from("Hello")?,
        Some(BusName::try_from(BUS_DESTINATION)?),
        Flags::empty(),
        &[],
    )
}

/// Pull the unique name (`:x.y`) out of `Hello()`'s METHOD_RETURN body.
pub fn acquire_unique_name(reply: &Message) -> Result<OwnedUniqueName> {
    match reply.body().first() {
        Some(OwnedValue::Str(s)) => {
            let unique = UniqueName::try_from(s.as_str())?;
            Ok(unique.to_owned())
        }
        _ => Err(Error::InconsistentMessage("Hello() reply did not carry a unique name string".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_types::{LittleEndian, Value};

    #[test]
    fn hello_call_targets_the_bus_daemon() {
        let call = build_hello_call::<LittleEndian>(1).unwrap();
        assert_eq!(call.fields().member.as_ref().unwrap().as_str(), "Hello");
        assert_eq!(call.fields().destination.as_ref().unwrap().to_string(), BUS_DESTINATION);
    }

    #[test]
    fn acquire_unique_name_parses_the_reply() {
        let call = build_hello_call::<LittleEndian>(1).unwrap();
        let reply = Message::method_return::<LittleEndian>(2, &call, &[Value::Str(ipcbus_types::Str::new(":1.42").unwrap())]).unwrap();
        let unique = acquire_unique_name(&reply).unwrap();
        assert_eq!(unique.as_str(), ":1.42");
    }

    #[test]
    fn acquire_unique_name_rejects_empty_body() {
        let call = build_hello_call::<LittleEndian>(1).unwrap();
        let reply = Message::method_return::<LittleEndian>(2, &call, &[]).unwrap();
        assert!(acquire_unique_name(&reply).is_err());
    }
}
