//! An in-memory, queryable database for the `pci.ids` hardware identifier
//! file
//!
//! The [pci.ids repository] distributes a line-oriented text database of PCI
//! vendor and device identifiers plus the device class taxonomy. This crate
//! parses that format into two hierarchies (vendor → device → subsystem and
//! class → subclass → programming interface) and answers hierarchical
//! lookups against them.
//!
//! Fetching the file is up to the caller: hand [`PciIdsDatabase::load_str`]
//! a string or [`PciIdsDatabase::load_reader`] any open stream (a file, a
//! decompressor, an HTTP response body). A load is all-or-nothing: on a
//! structural error nothing is published and the previous contents (if any)
//! stay queryable.
//!
//! # Examples
//!
//! ```
//! use pciids::PciIdsDatabase;
//!
//! let db = PciIdsDatabase::new();
//! db.load_str("0e11  Compaq Computer Corporation\n\t0046  Smart Array 64xx\n")?;
//!
//! let vendor = db.vendor("0e11")?.expect("known vendor");
//! assert_eq!(vendor.name, "Compaq Computer Corporation");
//! for device in db.devices("0e11")? {
//!     println!("{} {}", device.id, device.name);
//! }
//! # Ok::<(), pciids::Error>(())
//! ```
//!
//! [pci.ids repository]: https://pci-ids.ucw.cz/

mod database;
mod parser;
mod types;

pub use database::Error;
pub use database::PciIdsDatabase;
pub use parser::ParseError;
pub use types::ClassId;
pub use types::Device;
pub use types::DeviceClass;
pub use types::DeviceId;
pub use types::DeviceSubclass;
pub use types::ParseIdError;
pub use types::ProgIfId;
pub use types::ProgramInterface;
pub use types::SubclassId;
pub use types::Subsystem;
pub use types::Vendor;
pub use types::VendorId;
