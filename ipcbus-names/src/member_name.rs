use crate::macros::name_type;
use crate::validate::validate_element;

fn is_valid(s: &str) -> bool {
    s.len() <= crate::validate::MAX_NAME_LEN && validate_element(s, false, false)
}

name_type!(
    /// A validated D-Bus member name: either a method or a signal name.
    MemberName,
    OwnedMemberName,
    InvalidMemberName,
    is_valid
);
