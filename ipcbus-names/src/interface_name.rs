use crate::macros::name_type;
use crate::validate::validate_dotted;

fn is_valid(s: &str) -> bool {
    validate_dotted(s, false)
}

name_type!(
    /// A validated D-Bus interface name, e.g. `org.freedesktop.DBus`.
    InterfaceName,
    OwnedInterfaceName,
    InvalidInterfaceName,
    is_valid
);
