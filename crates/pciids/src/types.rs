//! Identifier newtypes and the entity records making up the two hierarchies

use ahash::AHashMap;
use compact_str::CompactString;
use compact_str::ToCompactString;

/// Error produced when a textual identifier is not fixed-width hex
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id {input:?}: expected exactly {width} hex digits")]
pub struct ParseIdError {
    kind: &'static str,
    width: usize,
    input: CompactString,
}

impl ParseIdError {
    fn new(kind: &'static str, width: usize, input: &str) -> Self {
        Self {
            kind,
            width,
            input: input.to_compact_string(),
        }
    }
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $repr:ty, $width:literal, $kind:literal) => {
        $(#[$meta])*
        ///
        /// Accepts either case on input, renders as fixed-width lowercase hex.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub $repr);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:0width$x}", self.0, width = $width)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != $width || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(ParseIdError::new($kind, $width, s));
                }
                <$repr>::from_str_radix(s, 16)
                    .map(Self)
                    .map_err(|_| ParseIdError::new($kind, $width, s))
            }
        }
    };
}

hex_id!(
    /// Identifier of a PCI vendor (also used for subsystem vendors)
    VendorId, u16, 4, "vendor"
);
hex_id!(
    /// Identifier of a device, unique within its vendor (also used for subsystem devices)
    DeviceId, u16, 4, "device"
);
hex_id!(
    /// Identifier of a device class
    ClassId, u8, 2, "class"
);
hex_id!(
    /// Identifier of a subclass, unique within its class
    SubclassId, u8, 2, "subclass"
);
hex_id!(
    /// Identifier of a programming interface, unique within its subclass
    ProgIfId, u8, 2, "programming interface"
);

/// A hardware vendor and all of its known devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub id: VendorId,
    pub name: CompactString,
    pub devices: AHashMap<DeviceId, Device>,
}

/// A product of one vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    /// Id of the vendor this device belongs to
    pub vendor: VendorId,
    pub name: CompactString,
    /// Kept in the order encountered in the file; listings sort by
    /// (subvendor, subdevice)
    pub subsystems: Vec<Subsystem>,
}

/// A board-level variant of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    pub subvendor: VendorId,
    pub subdevice: DeviceId,
    pub name: CompactString,
}

/// A device class and all of its known subclasses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceClass {
    pub id: ClassId,
    pub name: CompactString,
    pub subclasses: AHashMap<SubclassId, DeviceSubclass>,
}

/// A functional category within a device class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSubclass {
    pub id: SubclassId,
    pub name: CompactString,
    pub program_interfaces: AHashMap<ProgIfId, ProgramInterface>,
}

/// A register-level programming interface of a subclass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInterface {
    pub id: ProgIfId,
    pub name: CompactString,
}
