use crate::macros::name_type;
use crate::validate::validate_unique;

name_type!(
    /// A bus-assigned unique connection name, e.g. `:1.42`.
    UniqueName,
    OwnedUniqueName,
    InvalidUniqueName,
    validate_unique
);
