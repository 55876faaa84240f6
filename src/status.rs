//! Status classification
//!
//! Every registry and transport call reports a raw 32-bit status code. This
//! module maps that flat code space onto a closed catalog of named conditions,
//! each with a human-readable description, and lets applications register
//! ordered override hooks (for localization or domain-specific rewording)
//! that are consulted before the built-in catalog.

use std::fmt;
use std::sync::{OnceLock, RwLock};

use crate::error::{Result, UsbError};

/// A raw status code as returned by every registry and transport call.
///
/// `IoStatus::SUCCESS` is the single success sentinel; every other value is a
/// failure. Named constants cover the cataloged conditions; codes outside the
/// catalog still classify, falling back to a generic description carrying the
/// numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoStatus(pub i32);

const COMMON_BASE: i32 = 0xe000_0000_u32 as i32;
const USB_BASE: i32 = 0xe000_4000_u32 as i32;

/// Builds a general I/O condition from the common subsystem base.
pub const fn common_err(code: i32) -> IoStatus {
    IoStatus(COMMON_BASE | code)
}

/// Builds a USB transport condition from the USB subsystem base.
pub const fn usb_err(code: i32) -> IoStatus {
    IoStatus(USB_BASE | code)
}

impl IoStatus {
    pub const SUCCESS: IoStatus = IoStatus(0);

    pub const ABORTED: IoStatus = common_err(0x2eb);
    pub const BAD_ARGUMENT: IoStatus = common_err(0x2c2);
    pub const BAD_MEDIA: IoStatus = common_err(0x2d1);
    pub const BAD_MESSAGE_ID: IoStatus = common_err(0x2c6);
    pub const BUSY: IoStatus = common_err(0x2d5);
    pub const CANNOT_LOCK: IoStatus = common_err(0x2cc);
    pub const CANNOT_WIRE: IoStatus = common_err(0x2de);
    pub const DMA_ERROR: IoStatus = common_err(0x2d4);
    pub const DEVICE_ERROR: IoStatus = common_err(0x2e9);
    pub const ERROR: IoStatus = common_err(0x2bc);
    pub const EXCLUSIVE_ACCESS: IoStatus = common_err(0x2c5);
    pub const IO_ERROR: IoStatus = common_err(0x2ca);
    pub const IPC_ERROR: IoStatus = common_err(0x2bf);
    pub const INTERNAL_ERROR: IoStatus = common_err(0x2c9);
    pub const INVALID: IoStatus = common_err(0x1);
    pub const ISO_TOO_NEW: IoStatus = common_err(0x2ef);
    pub const ISO_TOO_OLD: IoStatus = common_err(0x2ee);
    pub const LOCKED_READ: IoStatus = common_err(0x2c3);
    pub const LOCKED_WRITE: IoStatus = common_err(0x2c4);
    pub const MESSAGE_TOO_LARGE: IoStatus = common_err(0x2e1);
    pub const NO_BANDWIDTH: IoStatus = common_err(0x2ec);
    pub const NO_CHANNELS: IoStatus = common_err(0x2da);
    pub const NO_COMPLETION: IoStatus = common_err(0x2ea);
    pub const NO_DEVICE: IoStatus = common_err(0x2c0);
    pub const NO_FRAMES: IoStatus = common_err(0x2e0);
    pub const NO_INTERRUPT: IoStatus = common_err(0x2df);
    pub const NO_MEDIA: IoStatus = common_err(0x2e4);
    pub const NO_MEMORY: IoStatus = common_err(0x2bd);
    pub const NO_POWER: IoStatus = common_err(0x2e3);
    pub const NO_RESOURCES: IoStatus = common_err(0x2be);
    pub const NO_SPACE: IoStatus = common_err(0x2db);
    pub const NOT_ALIGNED: IoStatus = common_err(0x2d0);
    pub const NOT_ATTACHED: IoStatus = common_err(0x2d9);
    pub const NOT_FOUND: IoStatus = common_err(0x2f0);
    pub const NOT_OPEN: IoStatus = common_err(0x2cd);
    pub const NOT_PERMITTED: IoStatus = common_err(0x2e2);
    pub const NOT_PRIVILEGED: IoStatus = common_err(0x2c1);
    pub const NOT_READABLE: IoStatus = common_err(0x2ce);
    pub const NOT_READY: IoStatus = common_err(0x2d8);
    pub const NOT_RESPONDING: IoStatus = common_err(0x2ed);
    pub const NOT_WRITABLE: IoStatus = common_err(0x2cf);
    pub const OFFLINE: IoStatus = common_err(0x2d7);
    pub const OVERRUN: IoStatus = common_err(0x2e8);
    pub const PORT_EXISTS: IoStatus = common_err(0x2dd);
    pub const RLD_ERROR: IoStatus = common_err(0x2d3);
    pub const STILL_OPEN: IoStatus = common_err(0x2d2);
    pub const TIMEOUT: IoStatus = common_err(0x2d6);
    pub const UNDERRUN: IoStatus = common_err(0x2e7);
    pub const UNFORMATTED_MEDIA: IoStatus = common_err(0x2e5);
    pub const UNSUPPORTED: IoStatus = common_err(0x2c7);
    pub const UNSUPPORTED_MODE: IoStatus = common_err(0x2e6);
    pub const VM_ERROR: IoStatus = common_err(0x2c8);

    pub const USB_UNKNOWN_PIPE: IoStatus = usb_err(0x61);
    pub const USB_TOO_MANY_PIPES: IoStatus = usb_err(0x60);
    pub const USB_NO_ASYNC_PORT: IoStatus = usb_err(0x5f);
    pub const USB_NOT_ENOUGH_PIPES: IoStatus = usb_err(0x5e);
    pub const USB_NOT_ENOUGH_POWER: IoStatus = usb_err(0x5d);
    pub const USB_ENDPOINT_NOT_FOUND: IoStatus = usb_err(0x57);
    pub const USB_CONFIG_NOT_FOUND: IoStatus = usb_err(0x56);
    pub const USB_TRANSACTION_TIMEOUT: IoStatus = usb_err(0x51);
    pub const USB_TRANSACTION_RETURNED: IoStatus = usb_err(0x50);
    pub const USB_PIPE_STALLED: IoStatus = usb_err(0x4f);
    pub const USB_INTERFACE_NOT_FOUND: IoStatus = usb_err(0x4e);
    pub const USB_LOW_LATENCY_BUFFER_NOT_ALLOCATED: IoStatus = usb_err(0x4d);
    pub const USB_LOW_LATENCY_FRAME_LIST_NOT_ALLOCATED: IoStatus = usb_err(0x4c);
    pub const USB_HIGH_SPEED_SPLIT: IoStatus = usb_err(0x4b);
    pub const USB_SYNC_REQUEST_ON_WL_THREAD: IoStatus = usb_err(0x4a);
    pub const USB_DEVICE_NOT_HIGH_SPEED: IoStatus = usb_err(0x49);
    /// Shares a code with `USB_DEVICE_NOT_HIGH_SPEED`; the upstream headers
    /// assigned both names to 0x49 and the older name wins classification.
    pub const USB_DEVICE_TRANSFERRED_TO_COMPANION: IoStatus = usb_err(0x49);
    pub const USB_CLEAR_PIPE_STALL_NOT_RECURSIVE: IoStatus = usb_err(0x48);
    pub const USB_DEVICE_PORT_WAS_NOT_SUSPENDED: IoStatus = usb_err(0x47);
    pub const USB_ENDPOINT_COUNT_EXCEEDED: IoStatus = usb_err(0x46);
    pub const USB_DEVICE_COUNT_EXCEEDED: IoStatus = usb_err(0x45);
    pub const USB_STREAMS_NOT_SUPPORTED: IoStatus = usb_err(0x44);
    pub const USB_INVALID_SS_ENDPOINT: IoStatus = usb_err(0x43);
    pub const USB_TOO_MANY_TRANSACTIONS_PENDING: IoStatus = usb_err(0x42);

    /// Every named condition in the catalog, success excluded.
    pub const CATALOG: &'static [IoStatus] = &[
        Self::ABORTED,
        Self::BAD_ARGUMENT,
        Self::BAD_MEDIA,
        Self::BAD_MESSAGE_ID,
        Self::BUSY,
        Self::CANNOT_LOCK,
        Self::CANNOT_WIRE,
        Self::DMA_ERROR,
        Self::DEVICE_ERROR,
        Self::ERROR,
        Self::EXCLUSIVE_ACCESS,
        Self::IO_ERROR,
        Self::IPC_ERROR,
        Self::INTERNAL_ERROR,
        Self::INVALID,
        Self::ISO_TOO_NEW,
        Self::ISO_TOO_OLD,
        Self::LOCKED_READ,
        Self::LOCKED_WRITE,
        Self::MESSAGE_TOO_LARGE,
        Self::NO_BANDWIDTH,
        Self::NO_CHANNELS,
        Self::NO_COMPLETION,
        Self::NO_DEVICE,
        Self::NO_FRAMES,
        Self::NO_INTERRUPT,
        Self::NO_MEDIA,
        Self::NO_MEMORY,
        Self::NO_POWER,
        Self::NO_RESOURCES,
        Self::NO_SPACE,
        Self::NOT_ALIGNED,
        Self::NOT_ATTACHED,
        Self::NOT_FOUND,
        Self::NOT_OPEN,
        Self::NOT_PERMITTED,
        Self::NOT_PRIVILEGED,
        Self::NOT_READABLE,
        Self::NOT_READY,
        Self::NOT_RESPONDING,
        Self::NOT_WRITABLE,
        Self::OFFLINE,
        Self::OVERRUN,
        Self::PORT_EXISTS,
        Self::RLD_ERROR,
        Self::STILL_OPEN,
        Self::TIMEOUT,
        Self::UNDERRUN,
        Self::UNFORMATTED_MEDIA,
        Self::UNSUPPORTED,
        Self::UNSUPPORTED_MODE,
        Self::VM_ERROR,
        Self::USB_UNKNOWN_PIPE,
        Self::USB_TOO_MANY_PIPES,
        Self::USB_NO_ASYNC_PORT,
        Self::USB_NOT_ENOUGH_PIPES,
        Self::USB_NOT_ENOUGH_POWER,
        Self::USB_ENDPOINT_NOT_FOUND,
        Self::USB_CONFIG_NOT_FOUND,
        Self::USB_TRANSACTION_TIMEOUT,
        Self::USB_TRANSACTION_RETURNED,
        Self::USB_PIPE_STALLED,
        Self::USB_INTERFACE_NOT_FOUND,
        Self::USB_LOW_LATENCY_BUFFER_NOT_ALLOCATED,
        Self::USB_LOW_LATENCY_FRAME_LIST_NOT_ALLOCATED,
        Self::USB_HIGH_SPEED_SPLIT,
        Self::USB_SYNC_REQUEST_ON_WL_THREAD,
        Self::USB_DEVICE_NOT_HIGH_SPEED,
        Self::USB_CLEAR_PIPE_STALL_NOT_RECURSIVE,
        Self::USB_DEVICE_PORT_WAS_NOT_SUSPENDED,
        Self::USB_ENDPOINT_COUNT_EXCEEDED,
        Self::USB_DEVICE_COUNT_EXCEEDED,
        Self::USB_STREAMS_NOT_SUPPORTED,
        Self::USB_INVALID_SS_ENDPOINT,
        Self::USB_TOO_MANY_TRANSACTIONS_PENDING,
    ];

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Converts a non-success code into the classified error carrying it.
    pub fn check(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(UsbError::Status(self))
        }
    }

    /// Like [`check`](Self::check), but raises a caller-supplied condition
    /// instead. The alternate is only evaluated on the failure path.
    pub fn check_or<F>(self, alt: F) -> Result<()>
    where
        F: FnOnce() -> UsbError,
    {
        if self.is_success() {
            Ok(())
        } else {
            Err(alt())
        }
    }

    /// Stable symbolic name for a cataloged code, `None` otherwise.
    pub fn name(self) -> Option<&'static str> {
        self.catalog_entry().map(|(name, _)| name)
    }

    /// Human-readable description.
    ///
    /// Registered override handlers are consulted first, in registration
    /// order; absent any, the built-in catalog applies, with a generic
    /// fallback naming the raw code for anything uncataloged.
    pub fn description(self) -> String {
        if let Some(text) = overrides()
            .read()
            .ok()
            .and_then(|o| o.description.first_match(&self))
        {
            return text;
        }
        match self.catalog_entry() {
            Some((_, description)) => description.to_string(),
            None => format!("I/O error (0x{:08x})", self.0 as u32),
        }
    }

    /// Recovery suggestion from the registered handlers, if any supplies one.
    pub fn recovery_suggestion(self) -> Option<String> {
        overrides()
            .read()
            .ok()
            .and_then(|o| o.recovery.first_match(&self))
    }

    /// Registers a description override consulted before the built-in catalog.
    pub fn add_description_handler<F>(handler: F)
    where
        F: Fn(&IoStatus) -> Option<String> + Send + Sync + 'static,
    {
        if let Ok(mut o) = overrides().write() {
            o.description.push(handler);
        }
    }

    /// Registers a recovery-suggestion override.
    pub fn add_recovery_handler<F>(handler: F)
    where
        F: Fn(&IoStatus) -> Option<String> + Send + Sync + 'static,
    {
        if let Ok(mut o) = overrides().write() {
            o.recovery.push(handler);
        }
    }

    /// Drops every registered override. Intended for process boundaries.
    pub fn clear_handlers() {
        if let Ok(mut o) = overrides().write() {
            o.description.clear();
            o.recovery.clear();
        }
    }

    fn catalog_entry(self) -> Option<(&'static str, &'static str)> {
        let entry = match self {
            Self::ABORTED => ("aborted", "Aborted"),
            Self::BAD_ARGUMENT => ("bad_argument", "Invalid argument"),
            Self::BAD_MEDIA => ("bad_media", "Media error"),
            Self::BAD_MESSAGE_ID => (
                "bad_message_id",
                "Sent/received messages had different msg_id",
            ),
            Self::BUSY => ("busy", "Device busy"),
            Self::CANNOT_LOCK => ("cannot_lock", "Can't acquire lock"),
            Self::CANNOT_WIRE => ("cannot_wire", "Can't wire down physical memory"),
            Self::DMA_ERROR => ("dma_error", "DMA failure"),
            Self::DEVICE_ERROR => ("device_error", "The device is not working properly"),
            Self::ERROR => ("error", "General error"),
            Self::EXCLUSIVE_ACCESS => (
                "exclusive_access",
                "Exclusive access and device already open",
            ),
            Self::IO_ERROR => ("io_error", "General I/O error"),
            Self::IPC_ERROR => ("ipc_error", "Error during IPC"),
            Self::INTERNAL_ERROR => ("internal_error", "Internal error"),
            Self::INVALID => ("invalid", "Should never be seen"),
            Self::ISO_TOO_NEW => ("iso_too_new", "Isochronous I/O request for distant future"),
            Self::ISO_TOO_OLD => ("iso_too_old", "Isochronous I/O request for distant past"),
            Self::LOCKED_READ => ("locked_read", "Device read locked"),
            Self::LOCKED_WRITE => ("locked_write", "Device write locked"),
            Self::MESSAGE_TOO_LARGE => (
                "message_too_large",
                "Oversized msg received on interrupt port",
            ),
            Self::NO_BANDWIDTH => ("no_bandwidth", "Bus bandwidth would be exceeded"),
            Self::NO_CHANNELS => ("no_channels", "No DMA channels left"),
            Self::NO_COMPLETION => ("no_completion", "A completion routine is required"),
            Self::NO_DEVICE => ("no_device", "No such device"),
            Self::NO_FRAMES => ("no_frames", "No DMA frames enqueued"),
            Self::NO_INTERRUPT => ("no_interrupt", "No interrupt attached"),
            Self::NO_MEDIA => ("no_media", "Media not present"),
            Self::NO_MEMORY => ("no_memory", "Can't allocate memory"),
            Self::NO_POWER => ("no_power", "No power to device"),
            Self::NO_RESOURCES => ("no_resources", "Resource shortage"),
            Self::NO_SPACE => ("no_space", "No space for data"),
            Self::NOT_ALIGNED => ("not_aligned", "Alignment error"),
            Self::NOT_ATTACHED => ("not_attached", "Device not attached"),
            Self::NOT_FOUND => ("not_found", "Data was not found"),
            Self::NOT_OPEN => ("not_open", "Device not open"),
            Self::NOT_PERMITTED => ("not_permitted", "Not permitted"),
            Self::NOT_PRIVILEGED => ("not_privileged", "Privilege violation"),
            Self::NOT_READABLE => ("not_readable", "Read not supported"),
            Self::NOT_READY => ("not_ready", "Not ready"),
            Self::NOT_RESPONDING => ("not_responding", "Device not responding"),
            Self::NOT_WRITABLE => ("not_writable", "Write not supported"),
            Self::OFFLINE => ("offline", "Device offline"),
            Self::OVERRUN => ("overrun", "Data overrun"),
            Self::PORT_EXISTS => ("port_exists", "Port already exists"),
            Self::RLD_ERROR => ("rld_error", "RLD failure"),
            Self::STILL_OPEN => ("still_open", "Device(s) still open"),
            Self::TIMEOUT => ("timeout", "I/O timeout"),
            Self::UNDERRUN => ("underrun", "Data underrun"),
            Self::UNFORMATTED_MEDIA => ("unformatted_media", "media not formatted"),
            Self::UNSUPPORTED => ("unsupported", "Unsupported function"),
            Self::UNSUPPORTED_MODE => ("unsupported_mode", "No such mode"),
            Self::VM_ERROR => ("vm_error", "Misc. VM failure"),

            Self::USB_UNKNOWN_PIPE => ("usb_unknown_pipe", "Pipe ref not recognized"),
            Self::USB_TOO_MANY_PIPES => ("usb_too_many_pipes", "Too many pipes"),
            Self::USB_NO_ASYNC_PORT => ("usb_no_async_port", "no async port"),
            Self::USB_NOT_ENOUGH_PIPES => {
                ("usb_not_enough_pipes", "not enough pipes in interface")
            }
            Self::USB_NOT_ENOUGH_POWER => (
                "usb_not_enough_power",
                "not enough power for selected configuration",
            ),
            Self::USB_ENDPOINT_NOT_FOUND => ("usb_endpoint_not_found", "Endpoint Not found"),
            Self::USB_CONFIG_NOT_FOUND => ("usb_config_not_found", "Configuration Not found"),
            Self::USB_TRANSACTION_TIMEOUT => ("usb_transaction_timeout", "Transaction timed out"),
            Self::USB_TRANSACTION_RETURNED => (
                "usb_transaction_returned",
                "The transaction has been returned to the caller",
            ),
            Self::USB_PIPE_STALLED => (
                "usb_pipe_stalled",
                "Pipe has stalled, error needs to be cleared",
            ),
            Self::USB_INTERFACE_NOT_FOUND => {
                ("usb_interface_not_found", "Interface ref not recognized")
            }
            Self::USB_LOW_LATENCY_BUFFER_NOT_ALLOCATED => (
                "usb_low_latency_buffer_not_allocated",
                "Attempted to use user land low latency isoc calls w/out calling PrepareBuffer (on the data buffer) first",
            ),
            Self::USB_LOW_LATENCY_FRAME_LIST_NOT_ALLOCATED => (
                "usb_low_latency_frame_list_not_allocated",
                "Attempted to use user land low latency isoc calls w/out calling PrepareBuffer (on the frame list) first",
            ),
            Self::USB_HIGH_SPEED_SPLIT => (
                "usb_high_speed_split",
                "Error to hub on high speed bus trying to do split transaction",
            ),
            Self::USB_SYNC_REQUEST_ON_WL_THREAD => (
                "usb_sync_request_on_wl_thread",
                "A synchronous USB request was made on the workloop thread (from a callback?). Only async requests are permitted in that case",
            ),
            Self::USB_DEVICE_NOT_HIGH_SPEED => (
                "usb_device_not_high_speed",
                "Name is deprecated, see below",
            ),
            Self::USB_CLEAR_PIPE_STALL_NOT_RECURSIVE => (
                "usb_clear_pipe_stall_not_recursive",
                "ClearPipeStall should not be called recursively",
            ),
            Self::USB_DEVICE_PORT_WAS_NOT_SUSPENDED => {
                ("usb_device_port_was_not_suspended", "Port was not suspended")
            }
            Self::USB_ENDPOINT_COUNT_EXCEEDED => (
                "usb_endpoint_count_exceeded",
                "The endpoint was not created because the controller cannot support more endpoints",
            ),
            Self::USB_DEVICE_COUNT_EXCEEDED => (
                "usb_device_count_exceeded",
                "The device cannot be enumerated because the controller cannot support more devices",
            ),
            Self::USB_STREAMS_NOT_SUPPORTED => (
                "usb_streams_not_supported",
                "The request cannot be completed because the XHCI controller does not support streams",
            ),
            Self::USB_INVALID_SS_ENDPOINT => (
                "usb_invalid_ss_endpoint",
                "An endpoint found in a SuperSpeed device is invalid (usually because there is no Endpoint Companion Descriptor)",
            ),
            Self::USB_TOO_MANY_TRANSACTIONS_PENDING => (
                "usb_too_many_transactions_pending",
                "The transaction cannot be submitted because it would exceed the allowed number of pending transactions",
            ),
            _ => return None,
        };
        Some(entry)
    }
}

impl fmt::Display for IoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl std::error::Error for IoStatus {}

// ============================================================================
// Override hooks
// ============================================================================

/// An ordered list of override handlers; the first non-empty answer wins.
pub struct OverrideList<T> {
    handlers: Vec<Box<dyn Fn(&T) -> Option<String> + Send + Sync>>,
}

impl<T> OverrideList<T> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn push<F>(&mut self, handler: F)
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn first_match(&self, value: &T) -> Option<String> {
        self.handlers.iter().find_map(|handler| handler(value))
    }
}

impl<T> Default for OverrideList<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Overrides {
    description: OverrideList<IoStatus>,
    recovery: OverrideList<IoStatus>,
}

fn overrides() -> &'static RwLock<Overrides> {
    static OVERRIDES: OnceLock<RwLock<Overrides>> = OnceLock::new();
    OVERRIDES.get_or_init(|| {
        RwLock::new(Overrides {
            description: OverrideList::new(),
            recovery: OverrideList::new(),
        })
    })
}
