//! USB device and interface handles over a pluggable host registry.
//!
//! This crate wraps a host device registry's plugin mechanism: services are
//! discovered through matching filters, promoted to typed device or interface
//! handles via a two-stage plugin protocol, and driven through pipe and
//! control transfers with explicit timeout pairs. A hot-plug observer reports
//! attach and detach events for a matching filter, including the devices
//! already present when observation starts.
//!
//! The registry itself is a trait ([`HostRegistry`]); [`NativeRegistry`]
//! implements it over libusb for real hardware, and anything else (a fixture,
//! a remote proxy) can stand in for tests or tooling.
//!
//! ```no_run
//! use std::sync::Arc;
//! use iousb::{
//!     HostRegistry, InterfaceCriteria, MatchingFilter, NativeRegistry, PipeTimeouts, UsbDevice,
//! };
//!
//! fn main() -> iousb::Result<()> {
//!     let registry: Arc<dyn HostRegistry> = Arc::new(NativeRegistry::new()?);
//!     let device = UsbDevice::with_ids(&registry, 0x1D50, 0x606F)?;
//!     let interface = device.find_interface(&InterfaceCriteria::any())?;
//!     interface.open_and_perform(false, || {
//!         interface.write_bytes(2, &[0x01, 0x02], PipeTimeouts::default())?;
//!         let reply = interface.read_bytes(1, Some(2), 64, PipeTimeouts::default())?;
//!         println!("{reply:02x?}");
//!         Ok(())
//!     })
//! }
//! ```

pub mod constants;
pub mod device;
pub mod error;
pub mod host;
pub mod interface;
pub mod native;
pub mod observer;
pub mod plugin;
pub mod status;
pub mod structures;

#[cfg(test)]
pub(crate) mod fake;

pub use constants::{
    TypeTag, CF_PLUGIN_INTERFACE_ID, DEFAULT_PIPE_TIMEOUT, DEFAULT_READ_CAPACITY, E_NOINTERFACE,
    FIND_INTERFACE_DONT_CARE, FIRST_MATCH_NOTIFICATION, PRODUCT_ID_KEY, S_OK,
    TERMINATED_NOTIFICATION, USB_DEVICE_CLASS_NAME, USB_DEVICE_INTERFACE_ID,
    USB_DEVICE_USER_CLIENT_TYPE, USB_HOST_DEVICE_CLASS_NAME, USB_INTERFACE_INTERFACE_ID,
    USB_INTERFACE_USER_CLIENT_TYPE, VENDOR_ID_KEY,
};
pub use device::UsbDevice;
pub use error::{Result, UsbError};
pub use host::{
    DeviceOps, HostRegistry, InterfaceOps, NotificationCallback, PluginOps, RawObject,
    TypedInterface, OBJECT_NULL,
};
pub use interface::UsbInterface;
pub use native::NativeRegistry;
pub use observer::{DeviceObserver, EventQueue, ObservingHandler, SerialQueue};
pub use plugin::PluginHandle;
pub use status::{common_err, usb_err, IoStatus, OverrideList};
pub use structures::{ControlRequest, InterfaceCriteria, MatchingFilter, PipeTimeouts};
