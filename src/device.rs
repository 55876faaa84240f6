//! USB device handle
//!
//! This module provides the `UsbDevice` handle built on the two-stage plugin
//! protocol: enumeration turns a matching filter into service tokens, the
//! first match becomes a typed device function table, and the remaining
//! iterator entries are drained and released so nothing leaks.

use std::sync::Arc;

use log::debug;

use crate::constants::{USB_DEVICE_INTERFACE_ID, USB_DEVICE_USER_CLIENT_TYPE};
use crate::error::{Result, UsbError};
use crate::host::{enumerate_services, DeviceOps, HostRegistry, ObjectGuard, RawObject, TypedInterface};
use crate::interface::UsbInterface;
use crate::plugin::acquire_interface;
use crate::structures::{InterfaceCriteria, MatchingFilter};

/// A reference-counted handle to one USB device.
///
/// Construction holds one reference; cloning retains, dropping releases.
/// Open/close toggle exclusive access and are independent of the handle's
/// lifetime: dropping a handle does not close the device.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use iousb::{HostRegistry, MatchingFilter, NativeRegistry, UsbDevice};
///
/// fn main() -> iousb::Result<()> {
///     let registry: Arc<dyn HostRegistry> = Arc::new(NativeRegistry::new()?);
///     let filter = MatchingFilter::usb_devices(Some(0x1D50), Some(0x606F));
///     let device = UsbDevice::first_matching(&registry, &filter)?;
///     println!("{:04x}:{:04x}", device.vendor_id()?, device.product_id()?);
///     Ok(())
/// }
/// ```
pub struct UsbDevice {
    registry: Arc<dyn HostRegistry>,
    ops: Arc<dyn DeviceOps>,
}

impl UsbDevice {
    /// Opens an enumeration against `filter` and builds a handle from the
    /// first matching service.
    ///
    /// Enumeration order is registry-defined. Remaining iterator entries are
    /// drained and released regardless of outcome. Fails with
    /// [`UsbError::PluginHasNoDeviceInterface`] when nothing matches.
    pub fn first_matching(
        registry: &Arc<dyn HostRegistry>,
        filter: &MatchingFilter,
    ) -> Result<UsbDevice> {
        let mut device = None;
        let iterator = registry.matching_services(filter)?;
        {
            let _iterator_guard = ObjectGuard::new(registry.as_ref(), iterator);
            enumerate_services(registry.as_ref(), iterator, |service, stop| {
                device = Some(UsbDevice::from_service(registry, service)?);
                *stop = true;
                Ok(())
            })?;
        }
        device.ok_or(UsbError::PluginHasNoDeviceInterface)
    }

    /// Builds a handle for every service matching `filter`, in registry
    /// order. The body may set the stop flag; undelivered services are
    /// drained and released either way.
    pub fn each_matching<F>(
        registry: &Arc<dyn HostRegistry>,
        filter: &MatchingFilter,
        mut body: F,
    ) -> Result<()>
    where
        F: FnMut(UsbDevice, &mut bool) -> Result<()>,
    {
        let iterator = registry.matching_services(filter)?;
        let _iterator_guard = ObjectGuard::new(registry.as_ref(), iterator);
        enumerate_services(registry.as_ref(), iterator, |service, stop| {
            let device = UsbDevice::from_service(registry, service)?;
            body(device, stop)
        })
    }

    /// Convenience over [`first_matching`](Self::first_matching) with the
    /// default USB device filter.
    pub fn with_ids(
        registry: &Arc<dyn HostRegistry>,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<UsbDevice> {
        let filter = MatchingFilter::usb_devices(Some(vendor_id), Some(product_id));
        Self::first_matching(registry, &filter)
    }

    /// Runs the two-stage plugin protocol against `service` with the device
    /// tag pair.
    ///
    /// The intermediate plugin is released after the query, success or
    /// failure. Fails with [`UsbError::CouldNotQueryDeviceInterface`] when
    /// the query does not produce a usable function table. The service token
    /// stays with the caller.
    pub fn from_service(registry: &Arc<dyn HostRegistry>, service: RawObject) -> Result<UsbDevice> {
        let interface = acquire_interface(
            registry.as_ref(),
            service,
            USB_DEVICE_USER_CLIENT_TYPE,
            USB_DEVICE_INTERFACE_ID,
            UsbError::CouldNotQueryDeviceInterface,
        )?;
        match interface {
            TypedInterface::Device(ops) => Ok(UsbDevice {
                registry: Arc::clone(registry),
                ops,
            }),
            TypedInterface::Interface(_) => Err(UsbError::CouldNotQueryDeviceInterface),
        }
    }

    /// The device's vendor identifier.
    pub fn vendor_id(&self) -> Result<u16> {
        let (status, vendor_id) = self.ops.vendor_id();
        status.check()?;
        Ok(vendor_id)
    }

    /// The device's product identifier.
    pub fn product_id(&self) -> Result<u16> {
        let (status, product_id) = self.ops.product_id();
        status.check()?;
        Ok(product_id)
    }

    /// Finds the first interface matching `criteria` and builds a typed
    /// interface handle from it.
    ///
    /// Remaining iterator entries are drained and released. Fails with
    /// [`UsbError::PluginHasNoInterfaceInterface`] when none match.
    pub fn find_interface(&self, criteria: &InterfaceCriteria) -> Result<UsbInterface> {
        let mut interface = None;
        let iterator = self.ops.create_interface_iterator(criteria)?;
        {
            let _iterator_guard = ObjectGuard::new(self.registry.as_ref(), iterator);
            enumerate_services(self.registry.as_ref(), iterator, |service, stop| {
                interface = Some(UsbInterface::from_service(&self.registry, service)?);
                *stop = true;
                Ok(())
            })?;
        }
        interface.ok_or(UsbError::PluginHasNoInterfaceInterface)
    }

    /// Opens the device for exclusive access. `seize` forcibly takes the
    /// device from other clients.
    pub fn open(&self, seize: bool) -> Result<()> {
        self.ops.open(seize).check()
    }

    /// Closes the device. Best-effort: a failed close is logged and
    /// swallowed, since it typically happens during teardown where the
    /// caller cannot act on it.
    pub fn close(&self) {
        let status = self.ops.close();
        if !status.is_success() {
            debug!("device close failed: {}", status);
        }
    }

    /// Opens the device, runs `body`, and closes on every exit path. The
    /// body's failure, if any, propagates unchanged after the close runs.
    pub fn open_and_perform<T, F>(&self, seize: bool, body: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.open(seize)?;
        let _close_guard = CloseGuard::Device(self);
        body()
    }

    /// Resets the device.
    pub fn reset(&self) -> Result<()> {
        self.ops.reset().check()
    }
}

impl Clone for UsbDevice {
    fn clone(&self) -> Self {
        self.ops.add_ref();
        Self {
            registry: Arc::clone(&self.registry),
            ops: Arc::clone(&self.ops),
        }
    }
}

impl Drop for UsbDevice {
    fn drop(&mut self) {
        self.ops.release();
    }
}

/// Guarantees the paired close runs on scope exit, panics included.
pub(crate) enum CloseGuard<'a> {
    Device(&'a UsbDevice),
    Interface(&'a UsbInterface),
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        match self {
            CloseGuard::Device(device) => device.close(),
            CloseGuard::Interface(interface) => interface.close(),
        }
    }
}
