//! Host registry boundary
//!
//! The host's device-management subsystem is an external collaborator. This
//! module defines the seam: opaque object tokens, the [`HostRegistry`] trait
//! covering enumeration, the plugin factory and notifications, and the
//! COM-style function-table traits a plugin query can yield. The `native`
//! module implements this seam over libusb; tests implement it with fakes.

use std::sync::Arc;

use crate::constants::TypeTag;
use crate::error::Result;
use crate::status::IoStatus;
use crate::structures::{ControlRequest, InterfaceCriteria, MatchingFilter};

/// An opaque registry-assigned token identifying a service, iterator or
/// notification port. Zero is the null object.
pub type RawObject = u64;

/// The null object token.
pub const OBJECT_NULL: RawObject = 0;

/// Callback invoked by the registry when a notification iterator has new
/// entries. Receives the iterator's token.
pub type NotificationCallback = Box<dyn Fn(RawObject) + Send + Sync>;

/// The host's device registry.
///
/// Object tokens handed out by this trait are reference counted on the
/// registry side. Tokens obtained from an iterator are borrowed and must be
/// released exactly once by whichever component consumes them.
pub trait HostRegistry: Send + Sync {
    /// Increments the registry-side reference count of `object`.
    fn retain_object(&self, object: RawObject);

    /// Decrements the registry-side reference count of `object`.
    fn release_object(&self, object: RawObject);

    /// Runs an enumeration against `filter`, returning an iterator token.
    fn matching_services(&self, filter: &MatchingFilter) -> std::result::Result<RawObject, IoStatus>;

    /// Advances `iterator`, returning the next service token or null when
    /// exhausted.
    fn iterator_next(&self, iterator: RawObject) -> RawObject;

    /// Invokes the plugin factory for `service`.
    ///
    /// Reports the raw status, the plugin object when one was produced, and
    /// the factory's match score. A success status with no object is a
    /// malformed response the caller must reject.
    fn create_plugin(
        &self,
        service: RawObject,
        plugin_type: TypeTag,
    ) -> (IoStatus, Option<Arc<dyn PluginOps>>, i32);

    /// Creates a notification port for matching notifications.
    fn create_notification_port(&self) -> std::result::Result<RawObject, IoStatus>;

    /// Destroys a notification port and cancels its registrations.
    fn destroy_notification_port(&self, port: RawObject);

    /// Registers `callback` for the named notification against `filter`.
    ///
    /// Returns the notification's iterator token. The iterator may already
    /// contain currently-matching services and must be drained by the caller
    /// to arm the notification.
    fn add_matching_notification(
        &self,
        port: RawObject,
        name: &str,
        filter: &MatchingFilter,
        callback: NotificationCallback,
    ) -> std::result::Result<RawObject, IoStatus>;
}

// ============================================================================
// Function tables
// ============================================================================

/// A typed function table produced by a plugin query.
#[derive(Clone)]
pub enum TypedInterface {
    Device(Arc<dyn DeviceOps>),
    Interface(Arc<dyn InterfaceOps>),
}

/// Generic plugin object operations.
pub trait PluginOps: Send + Sync {
    /// Queries the plugin for a typed function table.
    ///
    /// Returns the raw query result and the table when the cast succeeded.
    /// The table holds its own reference, independent of the plugin's.
    fn query_interface(&self, interface_type: TypeTag) -> (i32, Option<TypedInterface>);

    fn add_ref(&self) -> u32;
    fn release(&self) -> u32;
}

/// USB device function table operations.
pub trait DeviceOps: Send + Sync {
    fn open(&self, seize: bool) -> IoStatus;
    fn close(&self) -> IoStatus;
    fn vendor_id(&self) -> (IoStatus, u16);
    fn product_id(&self) -> (IoStatus, u16);

    /// Builds an iterator over the device's interfaces matching `criteria`.
    fn create_interface_iterator(
        &self,
        criteria: &InterfaceCriteria,
    ) -> std::result::Result<RawObject, IoStatus>;

    fn reset(&self) -> IoStatus;

    fn add_ref(&self) -> u32;
    fn release(&self) -> u32;
}

/// USB interface function table operations.
pub trait InterfaceOps: Send + Sync {
    fn open(&self, seize: bool) -> IoStatus;
    fn close(&self) -> IoStatus;

    /// Timed pipe read into `buf`; reports the actual byte count on success.
    fn read_pipe(
        &self,
        pipe: u8,
        buf: &mut [u8],
        no_data_timeout_ms: u32,
        completion_timeout_ms: u32,
    ) -> (IoStatus, u32);

    /// Timed pipe write of exactly `data.len()` bytes.
    fn write_pipe(
        &self,
        pipe: u8,
        data: &[u8],
        no_data_timeout_ms: u32,
        completion_timeout_ms: u32,
    ) -> IoStatus;

    /// Timed control request; fills `request.len_done` and, for
    /// device-to-host requests, `request.data`.
    fn control_request(&self, pipe: u8, request: &mut ControlRequest) -> IoStatus;

    fn clear_pipe_stall(&self, pipe: u8, both_ends: bool) -> IoStatus;
    fn reset_pipe(&self, pipe: u8) -> IoStatus;

    fn add_ref(&self) -> u32;
    fn release(&self) -> u32;
}

// ============================================================================
// Iterator enumeration
// ============================================================================

/// Releases a borrowed registry object on scope exit.
pub(crate) struct ObjectGuard<'a> {
    registry: &'a dyn HostRegistry,
    object: RawObject,
}

impl<'a> ObjectGuard<'a> {
    pub(crate) fn new(registry: &'a dyn HostRegistry, object: RawObject) -> Self {
        Self { registry, object }
    }
}

impl Drop for ObjectGuard<'_> {
    fn drop(&mut self) {
        if self.object != OBJECT_NULL {
            self.registry.release_object(self.object);
        }
    }
}

/// Enumerates every service currently available in `iterator`.
///
/// Each yielded service is released after `handler` returns, whether or not
/// the handler consumed it. Setting the stop flag or returning an error
/// drains and releases the remaining entries, so the registry never sees
/// entries as outstanding. The iterator token itself stays with the caller.
pub(crate) fn enumerate_services<F>(
    registry: &dyn HostRegistry,
    iterator: RawObject,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(RawObject, &mut bool) -> Result<()>,
{
    loop {
        let service = registry.iterator_next(iterator);
        if service == OBJECT_NULL {
            return Ok(());
        }
        let _service_guard = ObjectGuard::new(registry, service);

        let mut stop = false;
        let result = handler(service, &mut stop);
        if result.is_err() || stop {
            drain_services(registry, iterator);
            return result;
        }
    }
}

/// Releases every service still pending in `iterator`.
pub(crate) fn drain_services(registry: &dyn HostRegistry, iterator: RawObject) {
    loop {
        let service = registry.iterator_next(iterator);
        if service == OBJECT_NULL {
            return;
        }
        registry.release_object(service);
    }
}
