use std::fmt;

/// Static description of a remote enumeration: its name under `Enums` and
/// the ordered list of its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: &'static str,
    pub variants: &'static [&'static str],
}

impl EnumType {
    pub fn variant_index(&self, variant: &str) -> Option<usize> {
        self.variants.iter().position(|v| *v == variant)
    }
}

/// A type-erased enumeration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub enum_type: EnumType,
    pub ordinal: usize,
}

impl EnumValue {
    pub fn variant(&self) -> &'static str {
        self.enum_type.variants.get(self.ordinal).copied().unwrap_or("")
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.enum_type.name, self.variant())
    }
}

/// Implemented by Rust enums that mirror a remote enumeration.
pub trait Enumeration: Copy + 'static {
    const TYPE: EnumType;

    fn ordinal(self) -> usize;

    fn from_ordinal(ordinal: usize) -> Option<Self>;

    fn to_enum_value(self) -> EnumValue {
        EnumValue {
            enum_type: Self::TYPE,
            ordinal: self.ordinal(),
        }
    }
}

/// Declare a Rust enum bound to a remote enumeration.
///
/// ```ignore
/// enumeration! {
///     pub enum OrderStatus: "OrderStatuses" { Draft, Confirmed, Closed }
/// }
/// ```
#[macro_export]
macro_rules! enumeration {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $remote:literal { $($variant:ident),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl $crate::enumeration::Enumeration for $name {
            const TYPE: $crate::enumeration::EnumType = $crate::enumeration::EnumType {
                name: $remote,
                variants: &[$(stringify!($variant)),+],
            };

            fn ordinal(self) -> usize {
                Self::ALL.iter().position(|v| *v == self).unwrap_or(0)
            }

            fn from_ordinal(ordinal: usize) -> Option<Self> {
                Self::ALL.get(ordinal).copied()
            }
        }
    };
}
