//! The explicit object/interface registry user code builds up to answer
//! inbound method calls (§9 REDESIGN FLAG: no annotation/reflection
//! scanning — objects are registered by hand, one `add` call per path).

use std::collections::HashMap;
use std::sync::Arc;

use async_lock::RwLock;
use async_trait::async_trait;
use ipcbus_names::{InterfaceName, MemberName, OwnedErrorName, OwnedInterfaceName, OwnedMemberName};
use ipcbus_types::{ByteOrder, OwnedObjectPath, OwnedSignature, OwnedValue, Signature};

use crate::error::error_name;
use crate::message::Message;
use crate::{Error, Result};

/// One method a registered interface answers. Implementors receive the
/// call's already-decoded body and return the values to marshal into the
/// METHOD_RETURN (or an error, marshalled as an ERROR message instead).
#[async_trait]
pub trait Method: Send + Sync + 'static {
    async fn call(&self, args: &[OwnedValue]) -> Result<Vec<OwnedValue>>;
}

/// A single method's registration: its wire name, argument/return
/// signatures (validated against what actually arrives/is produced), and
/// its handler.
pub struct MethodEntry {
    pub name: OwnedMemberName,
    pub in_signature: OwnedSignature,
    pub out_signature: OwnedSignature,
    pub handler: Arc<dyn Method>,
}

/// One interface's surface at a given object path: its methods, the
/// properties it exposes (read-only values for now — the property-write
/// path is a consumer-level concern per §1 Non-goals), and the signals it
/// may emit (advertised for documentation; emitting one is just sending a
/// `Message::signal`).
pub struct Interface {
    pub name: OwnedInterfaceName,
    pub methods: Vec<MethodEntry>,
    pub properties: Vec<OwnedMemberName>,
    pub signals: Vec<OwnedMemberName>,
}

impl Interface {
    pub fn new(name: InterfaceName<'_>) -> Self {
        Interface { name: name.to_owned(), methods: Vec::new(), properties: Vec::new(), signals: Vec::new() }
    }

    pub fn with_method(mut self, name: MemberName<'_>, in_signature: &str, out_signature: &str, handler: Arc<dyn Method>) -> Result<Self> {
        self.methods.push(MethodEntry {
            name: name.to_owned(),
            in_signature: Signature::parse(in_signature)?.to_owned(),
            out_signature: Signature::parse(out_signature)?.to_owned(),
            handler,
        });
        Ok(self)
    }
}

/// The registry a connection consults for inbound method calls that
/// aren't answered by the built-in Peer handler (§4.7, §9).
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<String, HashMap<String, Interface>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        ObjectRegistry { objects: RwLock::new(HashMap::new()) }
    }

    /// Register (or replace) every interface in `interfaces` at `path`.
    pub async fn add(&self, path: OwnedObjectPath, interfaces: Vec<Interface>) {
        let mut objects = self.objects.write().await;
        let entry = objects.entry(path.as_str().to_owned()).or_default();
        for interface in interfaces {
            entry.insert(interface.name.as_str().to_owned(), interface);
        }
    }

    pub async fn remove(&self, path: &str) {
        self.objects.write().await.remove(path);
    }

    /// If `call` targets a registered path/interface/method, run it and
    /// build its reply. Returns `None` for anything unregistered, leaving
    /// the caller to answer with `UnknownMethod`/`UnknownInterface`/
    /// `UnknownObject` itself.
    pub async fn try_handle<B: ByteOrder>(&self, call: &Message, reply_serial: u32) -> Option<Result<Message>> {
        let path = call.fields().path.as_ref()?;
        let interface_name = call.fields().interface.as_ref()?;
        let member = call.fields().member.as_ref()?;

        let objects = self.objects.read().await;
        let interfaces = objects.get(path.as_str())?;
        let interface = interfaces.get(interface_name.as_str())?;
        let method = interface.methods.iter().find(|m| m.name.as_str() == member.as_str())?;

        let args: Vec<OwnedValue> = call.body().to_vec();
        Some(match method.handler.call(&args).await {
            Ok(out) => Message::method_return::<B>(reply_serial, call, &out),
            Err(e) => Message::error::<B>(
                reply_serial,
                call,
                OwnedErrorName::try_from(error_name::FAILED.to_owned()).expect("well-formed constant"),
                &[OwnedValue::Str(ipcbus_types::Str::new(&e.to_string()).unwrap_or_else(|_| ipcbus_types::Str::new("").unwrap()))],
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipcbus_names::MemberName;
    use ipcbus_types::{LittleEndian, ObjectPath, Value};

    struct Echo;

    #[async_trait]
    impl Method for Echo {
        async fn call(&self, args: &[OwnedValue]) -> Result<Vec<OwnedValue>> {
            Ok(args.to_vec())
        }
    }

    #[tokio::test]
    async fn registered_method_answers_the_call() {
        let registry = ObjectRegistry::new();
        let iface = Interface::new(InterfaceName::try_from("com.example.Greeter").unwrap())
            .with_method(MemberName::try_from("Echo").unwrap(), "s", "s", Arc::new(Echo))
            .unwrap();
        registry.add(ObjectPath::try_from("/greeter").unwrap().to_owned(), vec![iface]).await;

        let call = Message::method_call::<LittleEndian>(
            1,
            ObjectPath::try_from("/greeter").unwrap(),
            Some(InterfaceName::try_from("com.example.Greeter").unwrap()),
            MemberName::try_from("Echo").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[Value::Str(ipcbus_types::Str::new("hi").unwrap())],
        )
        .unwrap();

        let reply = registry.try_handle::<LittleEndian>(&call, 2).await.unwrap().unwrap();
        assert_eq!(reply.fields().reply_serial, Some(1));
    }

    #[tokio::test]
    async fn unregistered_path_returns_none() {
        let registry = ObjectRegistry::new();
        let call = Message::method_call::<LittleEndian>(
            1,
            ObjectPath::try_from("/nope").unwrap(),
            Some(InterfaceName::try_from("com.example.Greeter").unwrap()),
            MemberName::try_from("Echo").unwrap(),
            None,
            crate::message::Flags::empty(),
            &[],
        )
        .unwrap();
        assert!(registry.try_handle::<LittleEndian>(&call, 2).await.is_none());
    }
}
