//! USB composite-device descriptor data (SPEC_FULL §6). The real USB device
//! controller driver is out of scope (SPEC_FULL §1 Non-goals); this models
//! only the identifiers and interface table a host-side `lsusb -v` would see,
//! behind the traits the firmware binary actually drives.

pub const VENDOR_ID: u16 = 0x1209;
pub const PRODUCT_ID: u16 = 0x2702;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    CdcEthernetControl,
    CdcEthernetData,
    CcidSmartcard,
    U2fHid,
}

#[derive(Debug, Clone, Copy)]
pub struct Interface {
    pub number: u8,
    pub function: Function,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
}

/// The four-interface composite layout: CDC-ECM control + data carries the
/// SSH management plane, CCID exposes the OpenPGP smartcard, and the U2F HID
/// interface is the black-box FIDO token.
pub const INTERFACES: [Interface; 4] = [
    Interface { number: 0, function: Function::CdcEthernetControl, class: 0x02, subclass: 0x06, protocol: 0x00 },
    Interface { number: 1, function: Function::CdcEthernetData, class: 0x0a, subclass: 0x00, protocol: 0x00 },
    Interface { number: 2, function: Function::CcidSmartcard, class: 0x0b, subclass: 0x00, protocol: 0x00 },
    Interface { number: 3, function: Function::U2fHid, class: 0x03, subclass: 0x00, protocol: 0x00 },
];

pub fn interface(function: Function) -> &'static Interface {
    INTERFACES.iter().find(|i| i.function == function).expect("every Function has a table entry")
}
