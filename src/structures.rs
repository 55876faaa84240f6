//! Matching and transfer structures
//!
//! This module contains the data structures exchanged with the host registry
//! and the transport: the matching filter used for enumeration and hot-plug
//! observation, the interface search criteria, the control-transfer request,
//! and the pipe timeout pair.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants::{
    DEFAULT_PIPE_TIMEOUT, FIND_INTERFACE_DONT_CARE, PRODUCT_ID_KEY, USB_HOST_DEVICE_CLASS_NAME,
    VENDOR_ID_KEY,
};

// ============================================================================
// Matching filter
// ============================================================================

/// An immutable device-matching filter.
///
/// Two filters describing the same class and identifiers compare equal and
/// match the same device population. Absent identifiers leave their key out
/// entirely, so the search is unconstrained on that axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchingFilter {
    class_name: String,
    properties: BTreeMap<String, u32>,
}

impl MatchingFilter {
    /// Builds a filter for an explicit device class name.
    pub fn new(class_name: &str, vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        let mut properties = BTreeMap::new();
        if let Some(vendor_id) = vendor_id {
            properties.insert(VENDOR_ID_KEY.to_string(), u32::from(vendor_id));
        }
        if let Some(product_id) = product_id {
            properties.insert(PRODUCT_ID_KEY.to_string(), u32::from(product_id));
        }
        Self {
            class_name: class_name.to_string(),
            properties,
        }
    }

    /// Builds a filter for the default USB device class.
    pub fn usb_devices(vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        Self::new(USB_HOST_DEVICE_CLASS_NAME, vendor_id, product_id)
    }

    /// Every attached USB device.
    pub fn all_usb_devices() -> Self {
        Self::usb_devices(None, None)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.properties.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn vendor_id(&self) -> Option<u16> {
        self.get(VENDOR_ID_KEY).map(|v| v as u16)
    }

    pub fn product_id(&self) -> Option<u16> {
        self.get(PRODUCT_ID_KEY).map(|v| v as u16)
    }
}

// ============================================================================
// Interface search criteria
// ============================================================================

/// Search request for a device's interfaces.
///
/// Fields are 16-bit per the transport's search request layout; every field
/// defaults to the don't-care wildcard. No range validation happens here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceCriteria {
    pub class: u16,
    pub subclass: u16,
    pub protocol: u16,
    pub alternate_setting: u16,
}

impl InterfaceCriteria {
    /// Matches every interface of the device.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches interfaces of one class, any subclass/protocol/alt setting.
    pub fn with_class(class: u16) -> Self {
        Self {
            class,
            ..Self::default()
        }
    }
}

impl Default for InterfaceCriteria {
    fn default() -> Self {
        Self {
            class: FIND_INTERFACE_DONT_CARE,
            subclass: FIND_INTERFACE_DONT_CARE,
            protocol: FIND_INTERFACE_DONT_CARE,
            alternate_setting: FIND_INTERFACE_DONT_CARE,
        }
    }
}

// ============================================================================
// Control request
// ============================================================================

/// A control-transfer request, forwarded verbatim to the transport.
///
/// For device-to-host requests `data` is sized by the caller and filled by
/// the transport; for host-to-device requests it carries the payload. The
/// transport records the transferred byte count in `len_done`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
    /// Bytes actually transferred, filled by the transport.
    pub len_done: u32,
    pub no_data_timeout: Duration,
    pub completion_timeout: Duration,
}

impl ControlRequest {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, data: Vec<u8>) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            data,
            len_done: 0,
            no_data_timeout: DEFAULT_PIPE_TIMEOUT,
            completion_timeout: DEFAULT_PIPE_TIMEOUT,
        }
    }

    /// Direction bit of `request_type`: true for device-to-host.
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

// ============================================================================
// Pipe timeouts
// ============================================================================

/// No-data and completion timeouts for one pipe transfer.
///
/// Expressed as durations at the API surface and converted to truncated
/// unsigned 32-bit milliseconds at the transport boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeTimeouts {
    pub no_data: Duration,
    pub completion: Duration,
}

impl PipeTimeouts {
    /// The same timeout for both phases.
    pub fn both(timeout: Duration) -> Self {
        Self {
            no_data: timeout,
            completion: timeout,
        }
    }

    pub(crate) fn no_data_ms(&self) -> u32 {
        self.no_data.as_millis() as u32
    }

    pub(crate) fn completion_ms(&self) -> u32 {
        self.completion.as_millis() as u32
    }
}

impl Default for PipeTimeouts {
    fn default() -> Self {
        Self::both(DEFAULT_PIPE_TIMEOUT)
    }
}
