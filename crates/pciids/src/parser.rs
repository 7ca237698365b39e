//! Parser for the pci.ids file format
//!
//! Parsing happens in two layers: a winnow-based classifier that turns one
//! raw line into a [`Line`] record (or skips comments and blank lines), and a
//! state machine ([`HierarchyBuilder`]) that folds the classified lines into
//! the vendor and class hierarchies in a single left-to-right pass.

use ahash::AHashMap;
use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::hex_uint;
use winnow::ascii::space1;
use winnow::combinator::alt;
use winnow::combinator::trace;
use winnow::error::ContextError;
use winnow::error::StrContext;
use winnow::stream::AsChar;
use winnow::token::rest;
use winnow::token::take;

use crate::types::ClassId;
use crate::types::Device;
use crate::types::DeviceClass;
use crate::types::DeviceId;
use crate::types::DeviceSubclass;
use crate::types::ProgIfId;
use crate::types::ProgramInterface;
use crate::types::SubclassId;
use crate::types::Subsystem;
use crate::types::Vendor;
use crate::types::VendorId;

/// A structural error in the input file
///
/// Every variant carries the 1-based line number and the raw line content.
/// Any of these aborts the whole load; no partial database is ever published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("line {line}: unrecognized record ({message}): {content:?}")]
    MalformedLine {
        line: usize,
        content: String,
        message: String,
    },
    #[error("line {line}: records nest at most two levels deep: {content:?}")]
    ExcessiveIndent { line: usize, content: String },
    #[error("line {line}: device record without an open vendor: {content:?}")]
    DeviceWithoutVendor { line: usize, content: String },
    #[error("line {line}: subsystem record without an open device: {content:?}")]
    SubsystemWithoutDevice { line: usize, content: String },
    #[error("line {line}: subclass record without an open class: {content:?}")]
    SubclassWithoutClass { line: usize, content: String },
    #[error("line {line}: programming interface record without an open subclass: {content:?}")]
    ProgIfWithoutSubclass { line: usize, content: String },
    #[error("line {line}: vendor hierarchy record after the class section: {content:?}")]
    VendorAfterClasses { line: usize, content: String },
}

impl ParseError {
    fn malformed(
        line: usize,
        content: &str,
        error: &winnow::error::ParseError<&str, ContextError>,
    ) -> Self {
        Self::MalformedLine {
            line,
            content: content.to_owned(),
            message: error.inner().to_string(),
        }
    }
}

/// One load generation: both fully built hierarchies
///
/// Immutable once published; a new load builds a fresh value from scratch.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Hierarchies {
    pub(crate) vendors: AHashMap<VendorId, Vendor>,
    pub(crate) classes: AHashMap<ClassId, DeviceClass>,
}

/// Parse a whole pci.ids file into the two hierarchies
pub(crate) fn parse_str(input: &str) -> Result<Hierarchies, ParseError> {
    let mut builder = HierarchyBuilder::default();
    // str::lines tolerates a trailing \r and a missing final newline
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(line) = classify(line_no, raw)? {
            builder.push(line_no, raw, line)?;
        }
    }
    Ok(builder.finish())
}

/// One classified input line, borrowing the name from the input
#[derive(Debug, PartialEq, Eq)]
enum Line<'input> {
    Vendor {
        id: VendorId,
        name: &'input str,
    },
    Device {
        id: DeviceId,
        name: &'input str,
    },
    Subsystem {
        subvendor: VendorId,
        subdevice: DeviceId,
        name: &'input str,
    },
    Class {
        id: ClassId,
        name: &'input str,
    },
    Subclass {
        id: SubclassId,
        name: &'input str,
    },
    ProgIf {
        id: ProgIfId,
        name: &'input str,
    },
}

/// Classify one raw line, or `None` for comments and blank lines
///
/// Classification is purely lexical (leading tabs, the `C` sigil and hex
/// token widths); whether the record kind is legal in the current context is
/// decided by [`HierarchyBuilder::push`].
fn classify<'input>(line_no: usize, line: &'input str) -> Result<Option<Line<'input>>, ParseError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    if line.bytes().take_while(|b| *b == b'\t').count() > 2 {
        return Err(ParseError::ExcessiveIndent {
            line: line_no,
            content: line.to_owned(),
        });
    }
    record
        .parse(line)
        .map(Some)
        .map_err(|error| ParseError::malformed(line_no, line, &error))
}

fn record<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let alternatives = (
        class.context(StrContext::Label("class")),
        vendor.context(StrContext::Label("vendor")),
        device.context(StrContext::Label("device")),
        subclass.context(StrContext::Label("subclass")),
        subsystem.context(StrContext::Label("subsystem")),
        prog_if.context(StrContext::Label("prog_if")),
    );
    alt(alternatives).parse_next(i)
}

fn vendor<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = (hex4, space1, name).map(|(id, _, name)| Line::Vendor {
        id: VendorId(id),
        name,
    });
    trace("vendor", parser).parse_next(i)
}

fn device<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ('\t', hex4, space1, name).map(|(_, id, _, name)| Line::Device {
        id: DeviceId(id),
        name,
    });
    trace("device", parser).parse_next(i)
}

fn subsystem<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("\t\t", hex4, space1, hex4, space1, name).map(
        |(_, subvendor, _, subdevice, _, name)| Line::Subsystem {
            subvendor: VendorId(subvendor),
            subdevice: DeviceId(subdevice),
            name,
        },
    );
    trace("subsystem", parser).parse_next(i)
}

fn class<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ('C', space1, hex2, space1, name).map(|(_, _, id, _, name)| Line::Class {
        id: ClassId(id),
        name,
    });
    trace("class", parser).parse_next(i)
}

fn subclass<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ('\t', hex2, space1, name).map(|(_, id, _, name)| Line::Subclass {
        id: SubclassId(id),
        name,
    });
    trace("subclass", parser).parse_next(i)
}

fn prog_if<'input>(i: &mut &'input str) -> ModalResult<Line<'input>> {
    let parser = ("\t\t", hex2, space1, name).map(|(_, id, _, name)| Line::ProgIf {
        id: ProgIfId(id),
        name,
    });
    trace("prog_if", parser).parse_next(i)
}

/// The display name: the rest of the line, trimmed, non-empty
fn name<'input>(i: &mut &'input str) -> ModalResult<&'input str> {
    let parser = rest.verify(|s: &str| !s.trim().is_empty()).map(str::trim);
    trace("name", parser).parse_next(i)
}

fn hex2(i: &mut &str) -> ModalResult<u8> {
    trace("hex2", take(2usize).verify(is_hex))
        .and_then(hex_uint::<_, u8, _>)
        .parse_next(i)
}

fn hex4(i: &mut &str) -> ModalResult<u16> {
    trace("hex4", take(4usize).verify(is_hex))
        .and_then(hex_uint::<_, u16, _>)
        .parse_next(i)
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(AsChar::is_hex_digit)
}

/// State machine folding classified lines into the two hierarchies
///
/// The "state" is which of the cursor fields are open. A device is only ever
/// open while its vendor is, and a programming interface map only while its
/// subclass is. `in_class_section` latches on the first `C` record and is
/// never cleared: the vendor section cannot resume after it.
#[derive(Debug, Default)]
struct HierarchyBuilder {
    vendors: AHashMap<VendorId, Vendor>,
    classes: AHashMap<ClassId, DeviceClass>,
    vendor: Option<Vendor>,
    device: Option<Device>,
    class: Option<DeviceClass>,
    subclass: Option<DeviceSubclass>,
    in_class_section: bool,
}

impl HierarchyBuilder {
    fn push(&mut self, line_no: usize, raw: &str, line: Line<'_>) -> Result<(), ParseError> {
        match line {
            Line::Vendor { id, name } => {
                if self.in_class_section {
                    return Err(ParseError::VendorAfterClasses {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                }
                self.close_vendor();
                self.vendor = Some(Vendor {
                    id,
                    name: name.into(),
                    devices: AHashMap::new(),
                });
            }
            Line::Device { id, name } => {
                if self.in_class_section {
                    return Err(ParseError::VendorAfterClasses {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                }
                let Some(vendor) = self.vendor.as_ref() else {
                    return Err(ParseError::DeviceWithoutVendor {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                };
                let owner = vendor.id;
                self.close_device();
                self.device = Some(Device {
                    id,
                    vendor: owner,
                    name: name.into(),
                    subsystems: Vec::new(),
                });
            }
            Line::Subsystem {
                subvendor,
                subdevice,
                name,
            } => {
                if self.in_class_section {
                    return Err(ParseError::VendorAfterClasses {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                }
                let Some(device) = self.device.as_mut() else {
                    return Err(ParseError::SubsystemWithoutDevice {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                };
                // A list, not a map: duplicate subsystem ids coexist
                device.subsystems.push(Subsystem {
                    subvendor,
                    subdevice,
                    name: name.into(),
                });
            }
            Line::Class { id, name } => {
                self.in_class_section = true;
                self.close_vendor();
                self.close_class();
                self.class = Some(DeviceClass {
                    id,
                    name: name.into(),
                    subclasses: AHashMap::new(),
                });
            }
            Line::Subclass { id, name } => {
                if self.class.is_none() {
                    return Err(ParseError::SubclassWithoutClass {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                }
                self.close_subclass();
                self.subclass = Some(DeviceSubclass {
                    id,
                    name: name.into(),
                    program_interfaces: AHashMap::new(),
                });
            }
            Line::ProgIf { id, name } => {
                let Some(subclass) = self.subclass.as_mut() else {
                    return Err(ParseError::ProgIfWithoutSubclass {
                        line: line_no,
                        content: raw.to_owned(),
                    });
                };
                subclass
                    .program_interfaces
                    .insert(id, ProgramInterface { id, name: name.into() });
            }
        }
        Ok(())
    }

    /// End of input: open contexts are valid and get flushed
    fn finish(mut self) -> Hierarchies {
        self.close_vendor();
        self.close_class();
        Hierarchies {
            vendors: self.vendors,
            classes: self.classes,
        }
    }

    fn close_device(&mut self) {
        if let Some(device) = self.device.take() {
            if let Some(vendor) = self.vendor.as_mut() {
                // Last record with a given id wins
                vendor.devices.insert(device.id, device);
            }
        }
    }

    fn close_vendor(&mut self) {
        self.close_device();
        if let Some(vendor) = self.vendor.take() {
            self.vendors.insert(vendor.id, vendor);
        }
    }

    fn close_subclass(&mut self) {
        if let Some(subclass) = self.subclass.take() {
            if let Some(class) = self.class.as_mut() {
                class.subclasses.insert(subclass.id, subclass);
            }
        }
    }

    fn close_class(&mut self) {
        self.close_subclass();
        if let Some(class) = self.class.take() {
            self.classes.insert(class.id, class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const TEST_DATA: &str = indoc! {
    "# Comment at the start
    0001  Some ID
    0010  Some other ID
    # A comment between records
    \t8139  A device
    0014  Another ID
    \t0001  ID ID ID
    \t\t001c 0004  Sub device

    # Indented comments are comments too
    \t# like this

    C 00  CA
    \t00  CA 0
    \t01  CA 1
    C 01  CB
    \t01  CB 1
    \t\t00  CB 1 0
    \t\t05  CB 1 5
    \t02  CC\n"};

    fn vendor_names(db: &Hierarchies) -> Vec<(VendorId, &str)> {
        let mut rv: Vec<_> = db
            .vendors
            .values()
            .map(|v| (v.id, v.name.as_str()))
            .collect();
        rv.sort();
        rv
    }

    #[test]
    fn test_parse_str_builds_both_hierarchies() {
        let db = parse_str(TEST_DATA).unwrap();

        assert_eq!(
            vendor_names(&db),
            vec![
                (VendorId(0x0001), "Some ID"),
                (VendorId(0x0010), "Some other ID"),
                (VendorId(0x0014), "Another ID"),
            ]
        );
        let dev = &db.vendors[&VendorId(0x0010)].devices[&DeviceId(0x8139)];
        assert_eq!(dev.name, "A device");
        assert_eq!(dev.vendor, VendorId(0x0010));
        assert_eq!(dev.subsystems, vec![]);

        let dev = &db.vendors[&VendorId(0x0014)].devices[&DeviceId(0x0001)];
        assert_eq!(
            dev.subsystems,
            vec![Subsystem {
                subvendor: VendorId(0x001c),
                subdevice: DeviceId(0x0004),
                name: "Sub device".into(),
            }]
        );

        assert_eq!(db.classes.len(), 2);
        let ca = &db.classes[&ClassId(0x00)];
        assert_eq!(ca.name, "CA");
        assert_eq!(ca.subclasses.len(), 2);
        assert!(ca.subclasses[&SubclassId(0x00)].program_interfaces.is_empty());

        let cb = &db.classes[&ClassId(0x01)];
        assert_eq!(cb.subclasses.len(), 2);
        let cb1 = &cb.subclasses[&SubclassId(0x01)];
        assert_eq!(cb1.program_interfaces.len(), 2);
        assert_eq!(cb1.program_interfaces[&ProgIfId(0x05)].name, "CB 1 5");
        assert!(cb.subclasses[&SubclassId(0x02)].program_interfaces.is_empty());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(1, ""), Ok(None));
        assert_eq!(classify(1, "   "), Ok(None));
        assert_eq!(classify(1, "# pci.ids"), Ok(None));
        assert_eq!(classify(1, "\t\t# nested comment"), Ok(None));
        assert_eq!(
            classify(1, "0e11  Compaq Computer Corporation"),
            Ok(Some(Line::Vendor {
                id: VendorId(0x0e11),
                name: "Compaq Computer Corporation",
            }))
        );
        assert_eq!(
            classify(1, "\tb178  Smart Array 5i/532"),
            Ok(Some(Line::Device {
                id: DeviceId(0xb178),
                name: "Smart Array 5i/532",
            }))
        );
        assert_eq!(
            classify(1, "\t\t0e11 4082  Smart Array 532"),
            Ok(Some(Line::Subsystem {
                subvendor: VendorId(0x0e11),
                subdevice: DeviceId(0x4082),
                name: "Smart Array 532",
            }))
        );
        assert_eq!(
            classify(1, "C 01  Mass storage controller"),
            Ok(Some(Line::Class {
                id: ClassId(0x01),
                name: "Mass storage controller",
            }))
        );
        assert_eq!(
            classify(1, "\t05  ATA controller"),
            Ok(Some(Line::Subclass {
                id: SubclassId(0x05),
                name: "ATA controller",
            }))
        );
        assert_eq!(
            classify(1, "\t\t20  ADMA single stepping"),
            Ok(Some(Line::ProgIf {
                id: ProgIfId(0x20),
                name: "ADMA single stepping",
            }))
        );
    }

    #[test]
    fn test_classify_trims_and_keeps_names_verbatim() {
        assert_eq!(
            classify(1, "001c  PEAK-System Technik GmbH  "),
            Ok(Some(Line::Vendor {
                id: VendorId(0x001c),
                name: "PEAK-System Technik GmbH",
            }))
        );
        // Internal whitespace is preserved
        assert_eq!(
            classify(1, "\t0001  Dual   spaced	name"),
            Ok(Some(Line::Device {
                id: DeviceId(0x0001),
                name: "Dual   spaced	name",
            }))
        );
    }

    #[test]
    fn test_classify_rejects_malformed_lines() {
        // Wrong id width
        assert!(matches!(
            classify(7, "01c  Too short"),
            Err(ParseError::MalformedLine { line: 7, .. })
        ));
        // Non-hex id
        assert!(matches!(
            classify(1, "zzzz  Not hex"),
            Err(ParseError::MalformedLine { .. })
        ));
        // Missing name
        assert!(matches!(
            classify(1, "0001"),
            Err(ParseError::MalformedLine { .. })
        ));
        assert!(matches!(
            classify(1, "0001   "),
            Err(ParseError::MalformedLine { .. })
        ));
        // Leading spaces instead of tabs
        assert!(matches!(
            classify(1, "  0001  Spaces are not depth"),
            Err(ParseError::MalformedLine { .. })
        ));
        // Three tabs is out of range
        assert!(matches!(
            classify(3, "\t\t\t00  Too deep"),
            Err(ParseError::ExcessiveIndent { line: 3, .. })
        ));
    }

    #[test]
    fn test_depth1_before_any_vendor_is_an_error() {
        let err = parse_str("# only comments\n\t0001  Orphan device\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::DeviceWithoutVendor {
                line: 2,
                content: "\t0001  Orphan device".to_owned(),
            }
        );
    }

    #[test]
    fn test_depth2_without_device_is_an_error() {
        let err = parse_str("0001  Vendor\n\t\t001c 0004  Orphan subsystem\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::SubsystemWithoutDevice {
                line: 2,
                content: "\t\t001c 0004  Orphan subsystem".to_owned(),
            }
        );
    }

    #[test]
    fn test_subclass_before_any_class_is_an_error() {
        // A two-digit id at depth 1 in the vendor section
        let err = parse_str("0001  Vendor\n\t05  Orphan subclass\n").unwrap_err();
        assert!(matches!(err, ParseError::SubclassWithoutClass { line: 2, .. }));
    }

    #[test]
    fn test_prog_if_without_subclass_is_an_error() {
        let err = parse_str("C 01  Mass storage controller\n\t\t20  Orphan prog-if\n").unwrap_err();
        assert!(matches!(err, ParseError::ProgIfWithoutSubclass { line: 2, .. }));
    }

    #[test]
    fn test_class_section_is_irreversible() {
        let err = parse_str("C 01  Mass storage controller\n0e11  Compaq\n").unwrap_err();
        assert!(matches!(err, ParseError::VendorAfterClasses { line: 2, .. }));

        let err = parse_str("C 01  Mass storage controller\n\t8139  Device?\n").unwrap_err();
        assert!(matches!(err, ParseError::VendorAfterClasses { line: 2, .. }));
    }

    #[test]
    fn test_duplicate_ids_last_write_wins() {
        let input = indoc! {
        "0001  First name
        \t0001  Device A
        \t\t001c 0004  Keep me? No
        \t0001  Device A take two
        0001  Second name
        \t0002  Device B
        "};
        let db = parse_str(input).unwrap();

        assert_eq!(db.vendors.len(), 1);
        let vendor = &db.vendors[&VendorId(0x0001)];
        // The whole vendor record was replaced, including its devices
        assert_eq!(vendor.name, "Second name");
        assert_eq!(vendor.devices.len(), 1);
        assert!(vendor.devices.contains_key(&DeviceId(0x0002)));

        // Device-level replacement drops the first device's subsystems
        let input = "0001  Vendor\n\t0001  Device A\n\t\t001c 0004  Sub\n\t0001  Device A v2\n";
        let db = parse_str(input).unwrap();
        let device = &db.vendors[&VendorId(0x0001)].devices[&DeviceId(0x0001)];
        assert_eq!(device.name, "Device A v2");
        assert_eq!(device.subsystems, vec![]);
    }

    #[test]
    fn test_empty_input_is_valid() {
        let db = parse_str("").unwrap();
        assert_eq!(db, Hierarchies::default());
        let db = parse_str("# nothing but comments\n\n").unwrap();
        assert_eq!(db, Hierarchies::default());
    }

    #[test]
    fn test_crlf_line_endings() {
        let db = parse_str("0001  Vendor\r\n\t0002  Device\r\n").unwrap();
        let vendor = &db.vendors[&VendorId(0x0001)];
        assert_eq!(vendor.name, "Vendor");
        assert_eq!(vendor.devices[&DeviceId(0x0002)].name, "Device");
    }

    #[test]
    fn test_missing_final_newline() {
        let db = parse_str("0001  Vendor").unwrap();
        assert_eq!(db.vendors[&VendorId(0x0001)].name, "Vendor");
    }
}
