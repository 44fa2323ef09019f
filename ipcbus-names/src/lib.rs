//! Validated newtypes for the D-Bus naming conventions used in message
//! header fields: bus names, interface names, member names, error names
//! and bus-assigned unique names.

mod bus_name;
mod error;
mod error_name;
pub(crate) mod macros;
mod member_name;
mod unique_name;
pub(crate) mod validate;

mod interface_name;

pub use bus_name::{BusName, OwnedBusName, OwnedWellKnownName, WellKnownName};
pub use error::{Error, Result};
pub use error_name::{ErrorName, OwnedErrorName};
pub use interface_name::{InterfaceName, OwnedInterfaceName};
pub use member_name::{MemberName, OwnedMemberName};
pub use unique_name::{OwnedUniqueName, UniqueName};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_name_requires_two_elements() {
        assert!(InterfaceName::try_from("org").is_err());
        assert!(InterfaceName::try_from("org.freedesktop.DBus").is_ok());
    }

    #[test]
    fn member_name_rejects_dots() {
        assert!(MemberName::try_from("Ping").is_ok());
        assert!(MemberName::try_from("org.Ping").is_err());
    }

    #[test]
    fn unique_name_roundtrip() {
        let n = UniqueName::try_from(":1.84").unwrap();
        assert_eq!(n, ":1.84");
    }

    #[test]
    fn bus_name_dispatches_on_leading_colon() {
        assert!(matches!(BusName::try_from(":1.1").unwrap(), BusName::Unique(_)));
        assert!(matches!(
            BusName::try_from("org.freedesktop.DBus").unwrap(),
            BusName::WellKnown(_)
        ));
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(InterfaceName::try_from("org..DBus").is_err());
        assert!(InterfaceName::try_from("1org.DBus").is_err());
        assert!(MemberName::try_from("").is_err());
    }
}
