/// Defines a validated, `Cow`-backed name newtype with borrowed/owned
/// conversions, mirroring the shape every name type in this crate shares.
macro_rules! name_type {
    ($(#[$meta:meta])* $ty:ident, $owned:ident, $err:ident, $validate:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $ty<'n>(std::borrow::Cow<'n, str>);

        pub type $owned = $ty<'static>;

        impl<'n> $ty<'n> {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn to_owned(&self) -> $owned {
                $ty(std::borrow::Cow::Owned(self.0.clone().into_owned()))
            }
        }

        impl<'n> std::ops::Deref for $ty<'n> {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl<'n> std::fmt::Display for $ty<'n> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'n> TryFrom<&'n str> for $ty<'n> {
            type Error = crate::Error;

            fn try_from(value: &'n str) -> Result<Self, Self::Error> {
                if $validate(value) {
                    Ok($ty(std::borrow::Cow::Borrowed(value)))
                } else {
                    Err(crate::Error::$err(value.to_owned()))
                }
            }
        }

        impl TryFrom<String> for $owned {
            type Error = crate::Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                if $validate(value.as_str()) {
                    Ok($ty(std::borrow::Cow::Owned(value)))
                } else {
                    Err(crate::Error::$err(value))
                }
            }
        }

        impl<'n> PartialEq<str> for $ty<'n> {
            fn eq(&self, other: &str) -> bool {
                self.0 == *other
            }
        }

        impl<'n> PartialEq<&str> for $ty<'n> {
            fn eq(&self, other: &&str) -> bool {
                self.0 == **other
            }
        }
    };
}

pub(crate) use name_type;
