//! Plugin handle
//!
//! Every typed handle in this crate is produced by the same two-step recipe:
//! create a generic plugin object for a service, then query it for a
//! strongly-typed function table. Centralizing the recipe keeps the two
//! failure points distinguishable: the factory can fail (or report success
//! while producing nothing), and the query can fail independently.

use std::sync::Arc;

use crate::constants::{TypeTag, S_OK};
use crate::error::{Result, UsbError};
use crate::host::{HostRegistry, PluginOps, RawObject, TypedInterface};

/// A reference-counted handle to a generic plugin object.
///
/// Construction holds one reference; cloning retains, dropping releases.
pub struct PluginHandle {
    ops: Arc<dyn PluginOps>,
}

impl PluginHandle {
    /// Invokes the registry's plugin factory for `service`.
    ///
    /// Returns the handle and the factory's match score. Fails with
    /// [`UsbError::NoPluginInterface`] when the factory reports success but
    /// yields no object, and with the classified status otherwise.
    pub fn create(
        registry: &dyn HostRegistry,
        service: RawObject,
        plugin_type: TypeTag,
    ) -> Result<(PluginHandle, i32)> {
        let (status, plugin, score) = registry.create_plugin(service, plugin_type);
        status.check()?;
        match plugin {
            Some(ops) => Ok((PluginHandle { ops }, score)),
            None => Err(UsbError::NoPluginInterface),
        }
    }

    /// Queries the plugin for a typed function table.
    ///
    /// The query must report exactly the generic "OK" result and yield an
    /// object; anything else fails with
    /// [`UsbError::CouldNotQueryInterface`], regardless of how far the cast
    /// got structurally.
    pub fn query_interface(&self, interface_type: TypeTag) -> Result<TypedInterface> {
        let (result, interface) = self.ops.query_interface(interface_type);
        match interface {
            Some(interface) if result == S_OK => Ok(interface),
            _ => Err(UsbError::CouldNotQueryInterface),
        }
    }
}

impl Clone for PluginHandle {
    fn clone(&self) -> Self {
        self.ops.add_ref();
        Self {
            ops: Arc::clone(&self.ops),
        }
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.ops.release();
    }
}

/// The shared two-stage acquisition: plugin creation, typed-interface query,
/// plugin release on every exit path.
///
/// Query failures are mapped to `query_failure` so device and interface
/// acquisition keep their distinct error kinds without duplicating the
/// scoped-release logic.
pub(crate) fn acquire_interface(
    registry: &dyn HostRegistry,
    service: RawObject,
    plugin_type: TypeTag,
    interface_type: TypeTag,
    query_failure: UsbError,
) -> Result<TypedInterface> {
    let (plugin, _score) = PluginHandle::create(registry, service, plugin_type)?;
    // The typed interface holds its own reference; the plugin is released
    // when `plugin` drops, success or failure.
    plugin
        .query_interface(interface_type)
        .map_err(|_| query_failure)
}
