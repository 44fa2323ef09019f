use std::fmt;

use static_assertions::assert_impl_all;

use crate::macros::name_type;
use crate::validate::validate_dotted;
use crate::{Error, UniqueName};

fn is_valid_well_known(s: &str) -> bool {
    validate_dotted(s, false)
}

name_type!(
    /// A well-known bus name, e.g. `org.freedesktop.DBus`.
    WellKnownName,
    OwnedWellKnownName,
    InvalidBusName,
    is_valid_well_known
);

/// A D-Bus bus name: either a well-known name or a unique connection name.
///
/// This mirrors the `DESTINATION`/`SENDER` header fields, both of which may
/// carry either kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BusName<'n> {
    WellKnown(WellKnownName<'n>),
    Unique(UniqueName<'n>),
}

pub type OwnedBusName = BusName<'static>;

assert_impl_all!(OwnedBusName: Send, Sync);

impl<'n> BusName<'n> {
    pub fn as_str(&self) -> &str {
        match self {
            BusName::WellKnown(n) => n.as_str(),
            BusName::Unique(n) => n.as_str(),
        }
    }

    pub fn to_owned(&self) -> OwnedBusName {
        match self {
            BusName::WellKnown(n) => BusName::WellKnown(n.to_owned()),
            BusName::Unique(n) => BusName::Unique(n.to_owned()),
        }
    }
}

impl<'n> fmt::Display for BusName<'n> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'n> TryFrom<&'n str> for BusName<'n> {
    type Error = Error;

    fn try_from(value: &'n str) -> Result<Self, Error> {
        if value.starts_with(':') {
            UniqueName::try_from(value).map(BusName::Unique)
        } else {
            WellKnownName::try_from(value).map(BusName::WellKnown)
        }
    }
}

impl TryFrom<String> for OwnedBusName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        if value.starts_with(':') {
            crate::OwnedUniqueName::try_from(value).map(BusName::Unique)
        } else {
            OwnedWellKnownName::try_from(value).map(BusName::WellKnown)
        }
    }
}

impl<'n> PartialEq<str> for BusName<'n> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<'n> PartialEq<&str> for BusName<'n> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
