//! Hot-plug observation
//!
//! This module provides the `DeviceObserver`: it subscribes to one or more
//! named registry notification streams for a matching filter and delivers
//! each matched service to a caller-supplied handler on a caller-chosen
//! execution context. Services already attached when observation starts are
//! reported once, exactly like services that appear afterward.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use log::{debug, trace, warn};

use crate::constants::{FIRST_MATCH_NOTIFICATION, TERMINATED_NOTIFICATION};
use crate::error::Result;
use crate::host::{enumerate_services, HostRegistry, RawObject};
use crate::structures::MatchingFilter;

/// Handler invoked once per matched service with the notification name.
///
/// The service token is released when the handler returns; retain it through
/// the registry to keep it.
pub type ObservingHandler = dyn Fn(&str, RawObject) + Send + Sync;

// ============================================================================
// Execution contexts
// ============================================================================

/// An execution context onto which observer deliveries are dispatched.
///
/// Registry events are received on the registry's own context and
/// re-dispatched here, so a slow or reentrant handler never blocks event
/// reception.
pub trait EventQueue: Send + Sync {
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>);
}

/// A serial execution context backed by one named worker thread.
///
/// Tasks run in dispatch order. Dropping the queue stops the worker after
/// the tasks already queued have run.
pub struct SerialQueue {
    sender: Mutex<Option<mpsc::Sender<Box<dyn FnOnce() + Send>>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SerialQueue {
    pub fn new(label: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Box<dyn FnOnce() + Send>>();
        let worker = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .ok();
        if worker.is_none() {
            warn!("could not spawn queue worker {label:?}; tasks will be dropped");
        }
        Self {
            sender: Mutex::new(worker.is_some().then_some(sender)),
            worker: Mutex::new(worker),
        }
    }
}

impl EventQueue for SerialQueue {
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>) {
        if let Ok(sender) = self.sender.lock() {
            if let Some(sender) = sender.as_ref() {
                let _ = sender.send(task);
            }
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Disconnect the channel so the worker drains and exits.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(worker) = worker.take() {
                let _ = worker.join();
            }
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Observes attach/detach notifications for devices matching a filter.
///
/// Dropping the observer tears observation down: the notification port is
/// destroyed and every iterator released. Deliveries already dispatched to
/// the callback context detect the teardown and no-op.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use iousb::{DeviceObserver, HostRegistry, MatchingFilter, NativeRegistry};
///
/// fn main() -> iousb::Result<()> {
///     let registry: Arc<dyn HostRegistry> = Arc::new(NativeRegistry::new()?);
///     let observer = DeviceObserver::observe(
///         &registry,
///         &MatchingFilter::all_usb_devices(),
///         |name, service| println!("{name}: service {service:#x}"),
///     )?;
///     std::thread::park(); // deliveries continue until `observer` drops
///     drop(observer);
///     Ok(())
/// }
/// ```
pub struct DeviceObserver {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    registry: Arc<dyn HostRegistry>,
    queue: Arc<dyn EventQueue>,
    handler: Box<ObservingHandler>,
    port: RawObject,
    iterators: Mutex<HashMap<String, RawObject>>,
}

impl DeviceObserver {
    /// Subscribes to the default notification set (first-match and
    /// terminated) on a dedicated serial queue.
    pub fn observe<F>(
        registry: &Arc<dyn HostRegistry>,
        filter: &MatchingFilter,
        handler: F,
    ) -> Result<DeviceObserver>
    where
        F: Fn(&str, RawObject) + Send + Sync + 'static,
    {
        Self::new(
            registry,
            filter,
            &[FIRST_MATCH_NOTIFICATION, TERMINATED_NOTIFICATION],
            Arc::new(SerialQueue::new("iousb-observer")),
            handler,
        )
    }

    /// Subscribes to `notification_names` for `filter`, delivering on
    /// `queue`.
    ///
    /// Each registration's initial iterator is drained through the delivery
    /// path immediately, so currently-attached services are reported once.
    pub fn new<F>(
        registry: &Arc<dyn HostRegistry>,
        filter: &MatchingFilter,
        notification_names: &[&str],
        queue: Arc<dyn EventQueue>,
        handler: F,
    ) -> Result<DeviceObserver>
    where
        F: Fn(&str, RawObject) + Send + Sync + 'static,
    {
        let port = registry.create_notification_port()?;
        let inner = Arc::new(ObserverInner {
            registry: Arc::clone(registry),
            queue,
            handler: Box::new(handler),
            port,
            iterators: Mutex::new(HashMap::new()),
        });

        for &name in notification_names {
            // The registry callback pairs the notification name with a weak
            // back-reference; a firing after teardown upgrades to nothing
            // and is ignored instead of acting on a destroyed observer.
            let weak = Arc::downgrade(&inner);
            let context_name = name.to_string();
            let iterator = registry.add_matching_notification(
                port,
                name,
                filter,
                Box::new(move |iterator| {
                    if let Some(inner) = weak.upgrade() {
                        ObserverInner::schedule(&inner, &context_name, iterator);
                    } else {
                        trace!("dropping {context_name} notification after teardown");
                    }
                }),
            )?;

            if let Ok(mut iterators) = inner.iterators.lock() {
                iterators.insert(name.to_string(), iterator);
            }
            // Deliver the services that were already attached.
            ObserverInner::schedule(&inner, name, iterator);
        }

        debug!(
            "observing {:?} for {} notification(s)",
            filter.class_name(),
            notification_names.len()
        );
        Ok(DeviceObserver { inner })
    }
}

impl ObserverInner {
    /// Re-dispatches one notification batch onto the callback context.
    fn schedule(inner: &Arc<ObserverInner>, name: &str, iterator: RawObject) {
        let weak = Arc::downgrade(inner);
        let name = name.to_string();
        inner.queue.dispatch(Box::new(move || {
            // An upgraded reference keeps teardown from running mid-batch;
            // a failed upgrade means the observer is already gone.
            if let Some(inner) = weak.upgrade() {
                inner.deliver(&name, iterator);
            }
        }));
    }

    /// Delivers every service currently in `iterator`, in iterator order,
    /// releasing each one after the handler returns and draining the rest.
    fn deliver(&self, name: &str, iterator: RawObject) {
        trace!("delivering {name} batch");
        let _ = enumerate_services(self.registry.as_ref(), iterator, |service, _stop| {
            (self.handler)(name, service);
            Ok(())
        });
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        self.registry.destroy_notification_port(self.port);
        if let Ok(iterators) = self.iterators.lock() {
            for iterator in iterators.values() {
                self.registry.release_object(*iterator);
            }
        }
    }
}
