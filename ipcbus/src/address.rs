//! D-Bus address-string parsing (§6): `transport:key=value,...;...`, tried
//! left to right until one parses (connecting it is the transport's job,
//! out of scope per §1).

use std::collections::HashMap;
use std::env;

use crate::{Error, Result};

/// One parsed transport descriptor out of a semicolon-separated address
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Unix { path: Option<String>, abstract_name: Option<String>, tmpdir: Option<String>, guid: Option<String> },
    Tcp { host: Option<String>, port: Option<u16>, family: Option<String>, guid: Option<String> },
    /// A recognised but unparsed transport kind (`launchd`, `autolaunch`,
    /// ...): carried through verbatim for the caller's own transport to
    /// interpret, rather than rejected outright.
    Other { transport: String, raw: String },
}

/// Parse a full D-Bus address string into its semicolon-separated
/// alternatives, in the order they should be tried.
pub fn parse(address: &str) -> Result<Vec<Address>> {
    if address.is_empty() {
        return Err(Error::BadAddress("empty address string".into()));
    }
    address.split(';').filter(|s| !s.is_empty()).map(parse_one).collect()
}

fn parse_one(entry: &str) -> Result<Address> {
    let (transport, rest) = entry.split_once(':').ok_or_else(|| Error::BadAddress(format!("missing ':' in {entry:?}")))?;
    let kv = parse_key_values(rest)?;
    match transport {
        "unix" => Ok(Address::Unix {
            path: kv.get("path").cloned(),
            abstract_name: kv.get("abstract").cloned(),
            tmpdir: kv.get("tmpdir").cloned(),
            guid: kv.get("guid").cloned(),
        }),
        "tcp" => {
            let port = kv
                .get("port")
                .map(|p| p.parse::<u16>().map_err(|_| Error::BadAddress(format!("invalid port {p:?}"))))
                .transpose()?;
            Ok(Address::Tcp { host: kv.get("host").cloned(), port, family: kv.get("family").cloned(), guid: kv.get("guid").cloned() })
        }
        "launchd" | "autolaunch" => Ok(Address::Other { transport: transport.to_owned(), raw: rest.to_owned() }),
        other => Err(Error::BadAddress(format!("unrecognised transport {other:?}"))),
    }
}

fn parse_key_values(rest: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    if rest.is_empty() {
        return Ok(map);
    }
    for pair in rest.split(',') {
        let (key, value) = pair.split_once('=').ok_or_else(|| Error::BadAddress(format!("malformed key=value pair {pair:?}")))?;
        map.insert(key.to_owned(), percent_decode(value));
    }
    Ok(map)
}

/// D-Bus addresses percent-encode reserved bytes in values; decode them
/// back to raw bytes interpreted as UTF-8, falling back to the original
/// text if decoding fails (malformed escapes are rare enough not to be
/// worth a hard error here).
fn percent_decode(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_owned())
}

/// Resolve the session bus address from `DBUS_SESSION_BUS_ADDRESS` (§6).
pub fn session_address() -> Result<Vec<Address>> {
    let raw = env::var("DBUS_SESSION_BUS_ADDRESS")
        .map_err(|_| Error::BadAddress("DBUS_SESSION_BUS_ADDRESS is not set".into()))?;
    parse(&raw)
}

/// Resolve the system bus address from `DBUS_SYSTEM_BUS_ADDRESS`, falling
/// back to the conventional system bus socket path (§6).
pub fn system_address() -> Result<Vec<Address>> {
    match env::var("DBUS_SYSTEM_BUS_ADDRESS") {
        Ok(raw) => parse(&raw),
        Err(_) => parse("unix:path=/var/run/dbus/system_bus_socket"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_path() {
        let addrs = parse("unix:path=/run/user/1000/bus").unwrap();
        assert_eq!(addrs, vec![Address::Unix { path: Some("/run/user/1000/bus".into()), abstract_name: None, tmpdir: None, guid: None }]);
    }

    #[test]
    fn parses_unix_abstract_with_percent_escapes() {
        let addrs = parse("unix:abstract=/tmp/dbus-%2Ftest").unwrap();
        match &addrs[0] {
            Address::Unix { abstract_name, .. } => assert_eq!(abstract_name.as_deref(), Some("/tmp/dbus-/test")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_tcp_with_port() {
        let addrs = parse("tcp:host=127.0.0.1,port=1234").unwrap();
        assert_eq!(addrs, vec![Address::Tcp { host: Some("127.0.0.1".into()), port: Some(1234), family: None, guid: None }]);
    }

    #[test]
    fn fallback_list_keeps_order() {
        let addrs = parse("unix:path=/a;unix:path=/b").unwrap();
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(parse("not-an-address").is_err());
    }

    #[test]
    fn rejects_unknown_transport() {
        assert!(parse("quantum:teleport=true").is_err());
    }

    #[test]
    fn rejects_malformed_key_value() {
        assert!(parse("unix:pathonly").is_err());
    }
}
