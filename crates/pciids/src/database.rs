//! The query façade over the parsed hierarchies
//!
//! A [`PciIdsDatabase`] starts out empty and not ready. A load parses the
//! whole input into a fresh [`Hierarchies`] generation off to the side and
//! publishes it with a single swap, so queries either see the previous
//! complete generation or the new one, never a mix. Readers take no lock
//! beyond the brief `RwLock` read to clone the generation `Arc`.

use std::io::Read;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;

use crate::parser;
use crate::parser::Hierarchies;
use crate::parser::ParseError;
use crate::types::ClassId;
use crate::types::Device;
use crate::types::DeviceClass;
use crate::types::DeviceId;
use crate::types::DeviceSubclass;
use crate::types::ParseIdError;
use crate::types::ProgIfId;
use crate::types::ProgramInterface;
use crate::types::SubclassId;
use crate::types::Subsystem;
use crate::types::Vendor;
use crate::types::VendorId;

/// Errors surfaced by [`PciIdsDatabase`]
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A query was made before any successful load (or after a reset)
    #[error("database is not ready: no pci.ids data has been loaded")]
    NotReady,
    /// A query was made with a malformed identifier string
    #[error(transparent)]
    InvalidId(#[from] ParseIdError),
    /// The input was structurally invalid; nothing was published
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Reading the input stream failed; nothing was published
    #[error("failed to read pci.ids input: {0}")]
    Io(#[from] std::io::Error),
}

/// An in-memory, queryable PCI ID database
///
/// All queries require a successful load first and fail with
/// [`Error::NotReady`] otherwise. Identifier arguments are plain hex strings
/// (4 digits for vendor/device/subvendor/subdevice, 2 for
/// class/subclass/prog-if), accepted in either case.
///
/// Loads take `&self`: the database can be shared across threads as is.
/// At most one load runs at a time; a failed load leaves whatever was
/// published before (including "nothing") untouched.
#[derive(Debug, Default)]
pub struct PciIdsDatabase {
    /// Serializes the build-and-publish path; never held by queries
    load_lock: Mutex<()>,
    /// Most recent generation, `None` until the first successful load
    published: RwLock<Option<Arc<Hierarchies>>>,
}

impl PciIdsDatabase {
    /// Create a new, empty, not-ready database
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a complete generation is published and queries will succeed
    pub fn is_ready(&self) -> bool {
        self.published.read().is_some()
    }

    /// Parse `input` and publish it as the new database contents
    ///
    /// Builds the new hierarchies entirely off to the side and publishes
    /// them in one swap. On error the previously published generation (or
    /// the not-ready state) is left untouched.
    pub fn load_str(&self, input: &str) -> Result<(), Error> {
        let _guard = self.load_lock.lock();
        let parsed = parser::parse_str(input)?;
        debug!(
            vendors = parsed.vendors.len(),
            classes = parsed.classes.len(),
            "publishing new pci.ids generation"
        );
        *self.published.write() = Some(Arc::new(parsed));
        Ok(())
    }

    /// Read the whole stream and publish it as the new database contents
    ///
    /// The stream is consumed to the end; I/O errors propagate unchanged.
    pub fn load_reader(&self, mut reader: impl Read) -> Result<(), Error> {
        let mut buf = String::new();
        reader.read_to_string(&mut buf)?;
        self.load_str(&buf)
    }

    /// Drop the published generation; the database is not ready afterwards
    pub fn reset(&self) {
        let _guard = self.load_lock.lock();
        *self.published.write() = None;
    }

    /// All vendors, ascending by vendor id
    pub fn vendors(&self) -> Result<Vec<Vendor>, Error> {
        let db = self.snapshot()?;
        Ok(db.vendors.values().cloned().sorted_by_key(|v| v.id).collect())
    }

    /// One vendor by id
    pub fn vendor(&self, vendor: &str) -> Result<Option<Vendor>, Error> {
        let db = self.snapshot()?;
        let vendor: VendorId = vendor.parse()?;
        Ok(db.vendors.get(&vendor).cloned())
    }

    /// All devices of a vendor, ascending by device id
    ///
    /// An unknown vendor yields an empty list, not an error.
    pub fn devices(&self, vendor: &str) -> Result<Vec<Device>, Error> {
        let db = self.snapshot()?;
        let vendor: VendorId = vendor.parse()?;
        let Some(vendor) = db.vendors.get(&vendor) else {
            return Ok(Vec::new());
        };
        Ok(vendor.devices.values().cloned().sorted_by_key(|d| d.id).collect())
    }

    /// One device by (vendor id, device id)
    pub fn device(&self, vendor: &str, device: &str) -> Result<Option<Device>, Error> {
        let db = self.snapshot()?;
        let vendor: VendorId = vendor.parse()?;
        let device: DeviceId = device.parse()?;
        Ok(db
            .vendors
            .get(&vendor)
            .and_then(|v| v.devices.get(&device))
            .cloned())
    }

    /// All subsystems of a device, ascending by (subvendor id, subdevice id)
    ///
    /// Unknown vendor or device yields an empty list, not an error.
    pub fn subsystems(&self, vendor: &str, device: &str) -> Result<Vec<Subsystem>, Error> {
        self.subsystems_filtered(vendor, device, None)
    }

    /// Like [`Self::subsystems`], restricted to one subsystem vendor
    pub fn subsystems_by_subvendor(
        &self,
        vendor: &str,
        device: &str,
        subvendor: &str,
    ) -> Result<Vec<Subsystem>, Error> {
        self.subsystems_filtered(vendor, device, Some(subvendor))
    }

    /// All device classes, ascending by class id
    pub fn device_classes(&self) -> Result<Vec<DeviceClass>, Error> {
        let db = self.snapshot()?;
        Ok(db.classes.values().cloned().sorted_by_key(|c| c.id).collect())
    }

    /// One device class by id
    pub fn device_class(&self, class: &str) -> Result<Option<DeviceClass>, Error> {
        let db = self.snapshot()?;
        let class: ClassId = class.parse()?;
        Ok(db.classes.get(&class).cloned())
    }

    /// All subclasses of a class, ascending by subclass id
    ///
    /// An unknown class yields an empty list, not an error.
    pub fn subclasses(&self, class: &str) -> Result<Vec<DeviceSubclass>, Error> {
        let db = self.snapshot()?;
        let class: ClassId = class.parse()?;
        let Some(class) = db.classes.get(&class) else {
            return Ok(Vec::new());
        };
        Ok(class.subclasses.values().cloned().sorted_by_key(|s| s.id).collect())
    }

    /// One subclass by (class id, subclass id)
    pub fn subclass(&self, class: &str, subclass: &str) -> Result<Option<DeviceSubclass>, Error> {
        let db = self.snapshot()?;
        let class: ClassId = class.parse()?;
        let subclass: SubclassId = subclass.parse()?;
        Ok(db
            .classes
            .get(&class)
            .and_then(|c| c.subclasses.get(&subclass))
            .cloned())
    }

    /// All programming interfaces of a subclass, ascending by prog-if id
    ///
    /// Unknown class or subclass yields an empty list, not an error.
    pub fn program_interfaces(
        &self,
        class: &str,
        subclass: &str,
    ) -> Result<Vec<ProgramInterface>, Error> {
        let db = self.snapshot()?;
        let class: ClassId = class.parse()?;
        let subclass: SubclassId = subclass.parse()?;
        let Some(subclass) = db
            .classes
            .get(&class)
            .and_then(|c| c.subclasses.get(&subclass))
        else {
            return Ok(Vec::new());
        };
        Ok(subclass
            .program_interfaces
            .values()
            .cloned()
            .sorted_by_key(|p| p.id)
            .collect())
    }

    /// One programming interface by (class id, subclass id, prog-if id)
    pub fn program_interface(
        &self,
        class: &str,
        subclass: &str,
        prog_if: &str,
    ) -> Result<Option<ProgramInterface>, Error> {
        let db = self.snapshot()?;
        let class: ClassId = class.parse()?;
        let subclass: SubclassId = subclass.parse()?;
        let prog_if: ProgIfId = prog_if.parse()?;
        Ok(db
            .classes
            .get(&class)
            .and_then(|c| c.subclasses.get(&subclass))
            .and_then(|s| s.program_interfaces.get(&prog_if))
            .cloned())
    }

    fn subsystems_filtered(
        &self,
        vendor: &str,
        device: &str,
        subvendor: Option<&str>,
    ) -> Result<Vec<Subsystem>, Error> {
        let db = self.snapshot()?;
        let vendor: VendorId = vendor.parse()?;
        let device: DeviceId = device.parse()?;
        let subvendor: Option<VendorId> = subvendor.map(str::parse).transpose()?;
        let Some(device) = db.vendors.get(&vendor).and_then(|v| v.devices.get(&device)) else {
            return Ok(Vec::new());
        };
        Ok(device
            .subsystems
            .iter()
            .filter(|s| subvendor.is_none_or(|sv| s.subvendor == sv))
            .cloned()
            .sorted_by_key(|s| (s.subvendor, s.subdevice))
            .collect())
    }

    fn snapshot(&self) -> Result<Arc<Hierarchies>, Error> {
        self.published.read().clone().ok_or(Error::NotReady)
    }
}
