pub mod console;
pub mod transport;
pub mod u2f;
pub mod usb;
pub mod wake;
