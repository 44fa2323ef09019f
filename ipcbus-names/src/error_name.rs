use crate::macros::name_type;
use crate::validate::validate_dotted;

fn is_valid(s: &str) -> bool {
    validate_dotted(s, false)
}

name_type!(
    /// A validated D-Bus error name, e.g. `org.freedesktop.DBus.Error.Failed`.
    ErrorName,
    OwnedErrorName,
    InvalidErrorName,
    is_valid
);
