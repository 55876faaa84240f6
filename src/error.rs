//! Error types for the library
//!
//! This module defines the framework error taxonomy. Acquisition failures get
//! a distinct kind per stage of the two-step plugin protocol so callers can
//! tell a factory failure from a query failure; transport failures carry
//! their classified status code.

use std::sync::{OnceLock, RwLock};

use thiserror::Error;

use crate::status::{IoStatus, OverrideList};

/// Result type alias for registry and transport operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Error kinds raised by handle acquisition and pipe I/O
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsbError {
    /// The plugin factory reported success but produced no object
    #[error("I/O: No plugin interface.")]
    NoPluginInterface,

    /// Device enumeration found no matching service
    #[error("USB: Plugin has no device interface.")]
    PluginHasNoDeviceInterface,

    /// Interface enumeration found no matching interface
    #[error("USB: Plugin has no interface interface.")]
    PluginHasNoInterfaceInterface,

    /// A plugin query did not yield a usable function table
    #[error("I/O: Could not query interface.")]
    CouldNotQueryInterface,

    /// The device function table could not be queried from its plugin
    #[error("USB: Could not query device interface.")]
    CouldNotQueryDeviceInterface,

    /// The interface function table could not be queried from its plugin
    #[error("USB: Could not query interface interface.")]
    CouldNotQueryInterfaceInterface,

    /// A pipe read returned fewer bytes than the caller's declared minimum
    #[error("Could not get enough data.")]
    NotEnoughData,

    /// A transport call failed with a classified status code
    #[error("{0}")]
    Status(#[from] IoStatus),
}

impl UsbError {
    /// Human-readable description, override handlers consulted first.
    ///
    /// Transport failures defer to the status classifier (and its own
    /// override handlers); framework kinds fall back to their `Display` text.
    pub fn description(&self) -> String {
        if let Some(text) = overrides()
            .read()
            .ok()
            .and_then(|o| o.description.first_match(self))
        {
            return text;
        }
        match self {
            UsbError::Status(status) => status.description(),
            other => other.to_string(),
        }
    }

    /// Recovery suggestion from the registered handlers, if any supplies one.
    pub fn recovery_suggestion(&self) -> Option<String> {
        if let Some(text) = overrides()
            .read()
            .ok()
            .and_then(|o| o.recovery.first_match(self))
        {
            return Some(text);
        }
        match self {
            UsbError::Status(status) => status.recovery_suggestion(),
            _ => None,
        }
    }

    /// The raw status code, for transport failures.
    pub fn status(&self) -> Option<IoStatus> {
        match self {
            UsbError::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// Registers a description override for framework error kinds.
    pub fn add_description_handler<F>(handler: F)
    where
        F: Fn(&UsbError) -> Option<String> + Send + Sync + 'static,
    {
        if let Ok(mut o) = overrides().write() {
            o.description.push(handler);
        }
    }

    /// Registers a recovery-suggestion override for framework error kinds.
    pub fn add_recovery_handler<F>(handler: F)
    where
        F: Fn(&UsbError) -> Option<String> + Send + Sync + 'static,
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
}

struct Overrides {
    description: OverrideList<UsbError>,
    recovery: OverrideList<UsbError>,
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
