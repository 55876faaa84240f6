//! Registry constants
//!
//! This module contains the well-known identifiers used when talking to the
//! host's device registry: the 128-bit plugin/interface type tags, the
//! notification names understood by the registry, and the matching-dictionary
//! keys for narrowing a device search.

use std::fmt;
use std::time::Duration;

// ============================================================================
// Type tags
// ============================================================================

/// A 128-bit type tag identifying a plugin type or a versioned function table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub u128);

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (b >> 96) as u32,
            (b >> 80) as u16,
            (b >> 64) as u16,
            (b >> 48) as u16,
            b & 0xffff_ffff_ffff
        )
    }
}

/// Generic plugin function table requested at plugin creation.
pub const CF_PLUGIN_INTERFACE_ID: TypeTag = TypeTag(0xC244E858_109C11D4_91D40050_E4C6426F);

/// Plugin type for USB device user clients.
pub const USB_DEVICE_USER_CLIENT_TYPE: TypeTag = TypeTag(0x9DC7B780_9EC011D4_A54F000A_27052861);
/// Plugin type for USB interface user clients.
pub const USB_INTERFACE_USER_CLIENT_TYPE: TypeTag = TypeTag(0x2D9786C6_9EF311D4_AD51000A_27052861);

/// USB device function table, revision 650 baseline.
///
/// Fixed for binary compatibility with the device function-table layout; do
/// not bump without revisiting every `DeviceOps` call site.
pub const USB_DEVICE_INTERFACE_ID: TypeTag = TypeTag(0x4AAC1B2E_24C2476A_964D9133_3534F2CC);
/// USB interface function table, revision 700 baseline.
pub const USB_INTERFACE_INTERFACE_ID: TypeTag = TypeTag(0x17F9E59C_B0A1401D_9AC08DE2_7AC6047E);

/// The exact "OK" result a plugin query must report for the typed interface
/// to be trusted.
pub const S_OK: i32 = 0;

/// Query result when the requested interface is unavailable.
pub const E_NOINTERFACE: i32 = 0x8000_4002_u32 as i32;

// ============================================================================
// Notification names
// ============================================================================

/// A matched service appeared for the first time.
pub const FIRST_MATCH_NOTIFICATION: &str = "IOServiceFirstMatch";
/// A matched service is going away.
pub const TERMINATED_NOTIFICATION: &str = "IOServiceTerminate";

// ============================================================================
// Matching-dictionary keys and class names
// ============================================================================

/// Vendor identifier key in a matching filter.
pub const VENDOR_ID_KEY: &str = "idVendor";
/// Product identifier key in a matching filter.
pub const PRODUCT_ID_KEY: &str = "idProduct";

/// Legacy USB device class name.
pub const USB_DEVICE_CLASS_NAME: &str = "IOUSBDevice";
/// USB device class name on current hosts; the default for USB filters.
pub const USB_HOST_DEVICE_CLASS_NAME: &str = "IOUSBHostDevice";

// ============================================================================
// Interface search and pipe I/O defaults
// ============================================================================

/// Wildcard value for any `InterfaceCriteria` field.
pub const FIND_INTERFACE_DONT_CARE: u16 = 0xFFFF;

/// Default no-data and completion timeout for pipe reads and writes.
pub const DEFAULT_PIPE_TIMEOUT: Duration = Duration::from_millis(300);

/// Default read buffer capacity in bytes.
pub const DEFAULT_READ_CAPACITY: usize = 64;
