//! USB interface handle
//!
//! This module provides the `UsbInterface` handle: pipe reads and writes with
//! timeout pairs, control requests, and stall handling. Reads carry a
//! short-read detector layered above the raw transport result.

use std::sync::Arc;

use log::debug;

use crate::constants::{USB_INTERFACE_INTERFACE_ID, USB_INTERFACE_USER_CLIENT_TYPE};
use crate::device::CloseGuard;
use crate::error::{Result, UsbError};
use crate::host::{HostRegistry, InterfaceOps, RawObject, TypedInterface};
use crate::plugin::acquire_interface;
use crate::structures::{ControlRequest, PipeTimeouts};

/// A reference-counted handle to one interface of an open USB device.
///
/// Construction holds one reference; cloning retains, dropping releases.
/// As with devices, open/close are independent of the handle's lifetime.
pub struct UsbInterface {
    ops: Arc<dyn InterfaceOps>,
}

impl UsbInterface {
    /// Runs the two-stage plugin protocol against `service` with the
    /// interface tag pair.
    ///
    /// A failed query reports the device-interface error kind; callers have
    /// depended on that kind since the first release.
    pub fn from_service(
        registry: &Arc<dyn HostRegistry>,
        service: RawObject,
    ) -> Result<UsbInterface> {
        let interface = acquire_interface(
            registry.as_ref(),
            service,
            USB_INTERFACE_USER_CLIENT_TYPE,
            USB_INTERFACE_INTERFACE_ID,
            UsbError::CouldNotQueryDeviceInterface,
        )?;
        match interface {
            TypedInterface::Interface(ops) => Ok(UsbInterface { ops }),
            TypedInterface::Device(_) => Err(UsbError::CouldNotQueryDeviceInterface),
        }
    }

    /// Opens the interface for exclusive access.
    pub fn open(&self, seize: bool) -> Result<()> {
        self.ops.open(seize).check()
    }

    /// Closes the interface. Best-effort; never propagates.
    pub fn close(&self) {
        let status = self.ops.close();
        if !status.is_success() {
            debug!("interface close failed: {}", status);
        }
    }

    /// Opens the interface, runs `body`, and closes on every exit path. The
    /// body's failure, if any, propagates unchanged after the close runs.
    pub fn open_and_perform<T, F>(&self, seize: bool, body: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.open(seize)?;
        let _close_guard = CloseGuard::Interface(self);
        body()
    }

    /// Issues a timed read on `pipe` into a buffer of `max_count` bytes.
    ///
    /// On success the result is trimmed to `min(max_count, actual)` bytes.
    /// When `min_count` is given and the transport delivered fewer bytes,
    /// fails with [`UsbError::NotEnoughData`] even though the raw transfer
    /// reported success.
    pub fn read_bytes(
        &self,
        pipe: u8,
        min_count: Option<usize>,
        max_count: usize,
        timeouts: PipeTimeouts,
    ) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; max_count];
        let (status, read_count) = self.ops.read_pipe(
            pipe,
            &mut buffer,
            timeouts.no_data_ms(),
            timeouts.completion_ms(),
        );
        status.check()?;

        let read_count = read_count as usize;
        if let Some(min_count) = min_count {
            if read_count < min_count {
                return Err(UsbError::NotEnoughData);
            }
        }
        buffer.truncate(max_count.min(read_count));
        Ok(buffer)
    }

    /// Issues a timed write of exactly `data.len()` bytes on `pipe`.
    ///
    /// No partial-write recovery is attempted; the transport either
    /// completes the full count or fails.
    pub fn write_bytes(&self, pipe: u8, data: &[u8], timeouts: PipeTimeouts) -> Result<()> {
        self.ops
            .write_pipe(pipe, data, timeouts.no_data_ms(), timeouts.completion_ms())
            .check()
    }

    /// Forwards a control request verbatim to the timed control call.
    ///
    /// The transport fills `request.len_done` and, for device-to-host
    /// requests, `request.data`.
    pub fn send_control_request(&self, pipe: u8, request: &mut ControlRequest) -> Result<()> {
        self.ops.control_request(pipe, request).check()
    }

    /// Clears a stall condition on `pipe`; `both_ends` also clears the
    /// device-side halt.
    pub fn clear_pipe_stall(&self, pipe: u8, both_ends: bool) -> Result<()> {
        self.ops.clear_pipe_stall(pipe, both_ends).check()
    }

    /// Resets `pipe` to its default state.
    pub fn reset_pipe(&self, pipe: u8) -> Result<()> {
        self.ops.reset_pipe(pipe).check()
    }
}

impl Clone for UsbInterface {
    fn clone(&self) -> Self {
        self.ops.add_ref();
        Self {
            ops: Arc::clone(&self.ops),
        }
    }
}

impl Drop for UsbInterface {
    fn drop(&mut self) {
        self.ops.release();
    }
}
