//! Native backend over libusb
//!
//! [`NativeRegistry`] implements the `host` seam against real hardware using
//! `rusb`. Services are libusb devices, interface services are (device,
//! interface number) pairs resolved from the active configuration, and the
//! hot-plug notification stream comes from libusb's hotplug callbacks pumped
//! by a dedicated event thread.
//!
//! libusb carries a single timeout per transfer, so the completion timeout of
//! a timeout pair is the one forwarded; the no-data timeout has no libusb
//! equivalent.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};
use rusb::{
    Context, Device, DeviceHandle, Direction, Hotplug, HotplugBuilder, TransferType, UsbContext,
};

use crate::constants::{
    TypeTag, E_NOINTERFACE, FIND_INTERFACE_DONT_CARE, FIRST_MATCH_NOTIFICATION, S_OK,
    TERMINATED_NOTIFICATION, USB_DEVICE_INTERFACE_ID, USB_DEVICE_USER_CLIENT_TYPE,
    USB_INTERFACE_INTERFACE_ID, USB_INTERFACE_USER_CLIENT_TYPE,
};
use crate::error::Result;
use crate::host::{
    DeviceOps, HostRegistry, InterfaceOps, NotificationCallback, PluginOps, RawObject,
    TypedInterface, OBJECT_NULL,
};
use crate::status::IoStatus;
use crate::structures::{ControlRequest, InterfaceCriteria, MatchingFilter};

/// Classifies a libusb error as the nearest cataloged status code.
pub(crate) fn status_from_usb(err: rusb::Error) -> IoStatus {
    match err {
        rusb::Error::Io => IoStatus::IO_ERROR,
        rusb::Error::InvalidParam => IoStatus::BAD_ARGUMENT,
        rusb::Error::Access => IoStatus::NOT_PRIVILEGED,
        rusb::Error::NoDevice => IoStatus::NOT_ATTACHED,
        rusb::Error::NotFound => IoStatus::NOT_FOUND,
        rusb::Error::Busy => IoStatus::EXCLUSIVE_ACCESS,
        rusb::Error::Timeout => IoStatus::TIMEOUT,
        rusb::Error::Overflow => IoStatus::OVERRUN,
        rusb::Error::Pipe => IoStatus::USB_PIPE_STALLED,
        rusb::Error::Interrupted => IoStatus::ABORTED,
        rusb::Error::NoMem => IoStatus::NO_MEMORY,
        rusb::Error::NotSupported => IoStatus::UNSUPPORTED,
        rusb::Error::BadDescriptor => IoStatus::DEVICE_ERROR,
        rusb::Error::Other => IoStatus::ERROR,
    }
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Clone, Copy)]
struct EndpointSpec {
    address: u8,
    transfer: TransferType,
}

/// Everything needed to open and drive one interface, captured when the
/// interface iterator is built.
#[derive(Clone)]
struct InterfaceSpec {
    device: Device<Context>,
    number: u8,
    setting: u8,
    /// Pipe indexes are 1-based positions in this list, mirroring the
    /// descriptor order of the alternate setting.
    endpoints: Vec<EndpointSpec>,
}

enum ObjectEntry {
    Device {
        refs: u32,
        device: Device<Context>,
    },
    Interface {
        refs: u32,
        spec: InterfaceSpec,
    },
    Iterator {
        refs: u32,
        pending: VecDeque<RawObject>,
    },
    Port {
        refs: u32,
    },
}

impl ObjectEntry {
    fn refs_mut(&mut self) -> &mut u32 {
        match self {
            ObjectEntry::Device { refs, .. }
            | ObjectEntry::Interface { refs, .. }
            | ObjectEntry::Iterator { refs, .. }
            | ObjectEntry::Port { refs } => refs,
        }
    }
}

struct NotificationRecord {
    port: RawObject,
    name: String,
    filter: MatchingFilter,
    iterator: RawObject,
    callback: Arc<dyn Fn(RawObject) + Send + Sync>,
}

#[derive(Default)]
struct NativeState {
    objects: HashMap<RawObject, ObjectEntry>,
    notifications: Vec<NotificationRecord>,
}

struct Shared {
    context: Context,
    next_token: AtomicU64,
    state: Mutex<NativeState>,
}

impl Shared {
    fn mint(&self) -> RawObject {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> Option<MutexGuard<'_, NativeState>> {
        self.state.lock().ok()
    }

    fn release_entry(state: &mut NativeState, object: RawObject) {
        let remove = match state.objects.get_mut(&object) {
            Some(entry) => {
                let refs = entry.refs_mut();
                *refs = refs.saturating_sub(1);
                *refs == 0
            }
            None => false,
        };
        if !remove {
            return;
        }
        // Dropping an iterator releases whatever it still held.
        if let Some(ObjectEntry::Iterator { pending, .. }) = state.objects.remove(&object) {
            for child in pending {
                Self::release_entry(state, child);
            }
        }
    }

    fn filter_matches(filter: &MatchingFilter, vendor_id: u16, product_id: u16) -> bool {
        filter.vendor_id().map_or(true, |v| v == vendor_id)
            && filter.product_id().map_or(true, |p| p == product_id)
    }

    /// Routes one hot-plug event to the registrations listening for it.
    fn route_event(&self, event: HotplugEvent) {
        let (name, device) = match event {
            HotplugEvent::Arrived(device) => (FIRST_MATCH_NOTIFICATION, device),
            HotplugEvent::Left(device) => (TERMINATED_NOTIFICATION, device),
        };
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(err) => {
                debug!("dropping {name} event with unreadable descriptor: {err}");
                return;
            }
        };

        let mut to_fire = Vec::new();
        {
            let Some(mut state) = self.lock() else { return };
            let targets: Vec<(RawObject, Arc<dyn Fn(RawObject) + Send + Sync>)> = state
                .notifications
                .iter()
                .filter(|n| {
                    n.name == name
                        && Self::filter_matches(
                            &n.filter,
                            descriptor.vendor_id(),
                            descriptor.product_id(),
                        )
                })
                .map(|n| (n.iterator, Arc::clone(&n.callback)))
                .collect();
            for (iterator, callback) in targets {
                let token = self.mint();
                state.objects.insert(
                    token,
                    ObjectEntry::Device {
                        refs: 1,
                        device: device.clone(),
                    },
                );
                if let Some(ObjectEntry::Iterator { pending, .. }) =
                    state.objects.get_mut(&iterator)
                {
                    pending.push_back(token);
                }
                to_fire.push((iterator, callback));
            }
        }
        // Callbacks run unlocked; delivery re-enters the registry.
        for (iterator, callback) in to_fire {
            trace!("firing {name} notification");
            callback(iterator);
        }
    }
}

// ============================================================================
// Event pump
// ============================================================================

enum HotplugEvent {
    Arrived(Device<Context>),
    Left(Device<Context>),
}

/// Forwards libusb hot-plug callbacks onto a channel so routing happens off
/// the event thread.
struct EventForwarder {
    sender: mpsc::Sender<HotplugEvent>,
}

impl Hotplug<Context> for EventForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        let _ = self.sender.send(HotplugEvent::Arrived(device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        let _ = self.sender.send(HotplugEvent::Left(device));
    }
}

// ============================================================================
// Registry
// ============================================================================

/// [`HostRegistry`] implementation over libusb.
///
/// Creation spawns two threads: one pumping libusb events (the hot-plug
/// registration lives and dies on it), and one routing received events to
/// notification registrations. Both stop when the registry drops.
pub struct NativeRegistry {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    event_thread: Option<thread::JoinHandle<()>>,
    dispatch_thread: Option<thread::JoinHandle<()>>,
}

impl NativeRegistry {
    pub fn new() -> Result<NativeRegistry> {
        let context = Context::new().map_err(status_from_usb)?;
        let shared = Arc::new(Shared {
            context: context.clone(),
            next_token: AtomicU64::new(1),
            state: Mutex::new(NativeState::default()),
        });
        let running = Arc::new(AtomicBool::new(true));
        let (sender, receiver) = mpsc::channel();

        let event_thread = {
            let context = context.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("iousb-events".to_string())
                .spawn(move || {
                    // The registration must live on this thread; dropping it
                    // here unregisters the callback before the context goes.
                    let _registration = if rusb::has_hotplug() {
                        HotplugBuilder::new()
                            .enumerate(false)
                            .register(&context, Box::new(EventForwarder { sender }))
                            .map_err(|err| warn!("hot-plug registration failed: {err}"))
                            .ok()
                    } else {
                        warn!("hot-plug not supported on this platform");
                        None
                    };
                    while running.load(Ordering::Relaxed) {
                        match context.handle_events(Some(Duration::from_millis(100))) {
                            Ok(()) | Err(rusb::Error::Interrupted) => {}
                            Err(err) => {
                                warn!("event handling failed: {err}");
                                thread::sleep(Duration::from_millis(100));
                            }
                        }
                    }
                })
                .map_err(|_| IoStatus::NO_RESOURCES)?
        };

        let dispatch_thread = {
            let weak = Arc::downgrade(&shared);
            thread::Builder::new()
                .name("iousb-dispatch".to_string())
                .spawn(move || {
                    while let Ok(event) = receiver.recv() {
                        match weak.upgrade() {
                            Some(shared) => shared.route_event(event),
                            None => break,
                        }
                    }
                })
                .map_err(|_| IoStatus::NO_RESOURCES)?
        };

        Ok(NativeRegistry {
            shared,
            running,
            event_thread: Some(event_thread),
            dispatch_thread: Some(dispatch_thread),
        })
    }

    fn new_device_iterator(
        &self,
        filter: &MatchingFilter,
    ) -> std::result::Result<RawObject, IoStatus> {
        let devices = self.shared.context.devices().map_err(status_from_usb)?;
        let Some(mut state) = self.shared.lock() else {
            return Err(IoStatus::INTERNAL_ERROR);
        };
        let mut pending = VecDeque::new();
        for device in devices.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if Shared::filter_matches(filter, descriptor.vendor_id(), descriptor.product_id()) {
                let token = self.shared.mint();
                state
                    .objects
                    .insert(token, ObjectEntry::Device { refs: 1, device });
                pending.push_back(token);
            }
        }
        let iterator = self.shared.mint();
        state
            .objects
            .insert(iterator, ObjectEntry::Iterator { refs: 1, pending });
        Ok(iterator)
    }
}

impl HostRegistry for NativeRegistry {
    fn retain_object(&self, object: RawObject) {
        if let Some(mut state) = self.shared.lock() {
            if let Some(entry) = state.objects.get_mut(&object) {
                *entry.refs_mut() += 1;
            }
        }
    }

    fn release_object(&self, object: RawObject) {
        if let Some(mut state) = self.shared.lock() {
            Shared::release_entry(&mut state, object);
        }
    }

    fn matching_services(
        &self,
        filter: &MatchingFilter,
    ) -> std::result::Result<RawObject, IoStatus> {
        debug!("enumerating {:?} devices", filter.class_name());
        self.new_device_iterator(filter)
    }

    fn iterator_next(&self, iterator: RawObject) -> RawObject {
        let Some(mut state) = self.shared.lock() else {
            return OBJECT_NULL;
        };
        match state.objects.get_mut(&iterator) {
            Some(ObjectEntry::Iterator { pending, .. }) => {
                pending.pop_front().unwrap_or(OBJECT_NULL)
            }
            _ => OBJECT_NULL,
        }
    }

    fn create_plugin(
        &self,
        service: RawObject,
        plugin_type: TypeTag,
    ) -> (IoStatus, Option<Arc<dyn PluginOps>>, i32) {
        let Some(state) = self.shared.lock() else {
            return (IoStatus::INTERNAL_ERROR, None, 0);
        };
        let target = match state.objects.get(&service) {
            Some(ObjectEntry::Device { device, .. })
                if plugin_type == USB_DEVICE_USER_CLIENT_TYPE =>
            {
                PluginTarget::Device(device.clone())
            }
            Some(ObjectEntry::Interface { spec, .. })
                if plugin_type == USB_INTERFACE_USER_CLIENT_TYPE =>
            {
                PluginTarget::Interface(spec.clone())
            }
            Some(_) => return (IoStatus::UNSUPPORTED, None, 0),
            None => return (IoStatus::NOT_FOUND, None, 0),
        };
        let plugin = NativePlugin {
            shared: Arc::clone(&self.shared),
            target,
            refs: AtomicU32::new(1),
        };
        (IoStatus::SUCCESS, Some(Arc::new(plugin)), 0)
    }

    fn create_notification_port(&self) -> std::result::Result<RawObject, IoStatus> {
        let Some(mut state) = self.shared.lock() else {
            return Err(IoStatus::INTERNAL_ERROR);
        };
        let token = self.shared.mint();
        state.objects.insert(token, ObjectEntry::Port { refs: 1 });
        Ok(token)
    }

    fn destroy_notification_port(&self, port: RawObject) {
        if let Some(mut state) = self.shared.lock() {
            state.notifications.retain(|n| n.port != port);
            state.objects.remove(&port);
        }
    }

    fn add_matching_notification(
        &self,
        port: RawObject,
        name: &str,
        filter: &MatchingFilter,
        callback: NotificationCallback,
    ) -> std::result::Result<RawObject, IoStatus> {
        // The initial iterator carries the services that already match, so
        // draining it reports the current population once.
        let iterator = if name == FIRST_MATCH_NOTIFICATION {
            self.new_device_iterator(filter)?
        } else {
            let Some(mut state) = self.shared.lock() else {
                return Err(IoStatus::INTERNAL_ERROR);
            };
            let token = self.shared.mint();
            state.objects.insert(
                token,
                ObjectEntry::Iterator {
                    refs: 1,
                    pending: VecDeque::new(),
                },
            );
            token
        };

        let Some(mut state) = self.shared.lock() else {
            return Err(IoStatus::INTERNAL_ERROR);
        };
        state.notifications.push(NotificationRecord {
            port,
            name: name.to_string(),
            filter: filter.clone(),
            iterator,
            callback: Arc::from(callback),
        });
        Ok(iterator)
    }
}

impl Drop for NativeRegistry {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.shared.context.interrupt_handle_events();
        if let Some(worker) = self.event_thread.take() {
            let _ = worker.join();
        }
        if let Some(worker) = self.dispatch_thread.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// Plugin
// ============================================================================

enum PluginTarget {
    Device(Device<Context>),
    Interface(InterfaceSpec),
}

struct NativePlugin {
    shared: Arc<Shared>,
    target: PluginTarget,
    refs: AtomicU32,
}

impl PluginOps for NativePlugin {
    fn query_interface(&self, interface_type: TypeTag) -> (i32, Option<TypedInterface>) {
        match (&self.target, interface_type) {
            (PluginTarget::Device(device), tag) if tag == USB_DEVICE_INTERFACE_ID => {
                let ops = NativeDevice {
                    shared: Arc::clone(&self.shared),
                    device: device.clone(),
                    handle: Mutex::new(None),
                    refs: AtomicU32::new(1),
                };
                (S_OK, Some(TypedInterface::Device(Arc::new(ops))))
            }
            (PluginTarget::Interface(spec), tag) if tag == USB_INTERFACE_INTERFACE_ID => {
                let ops = NativeInterface {
                    spec: spec.clone(),
                    handle: Mutex::new(None),
                    refs: AtomicU32::new(1),
                };
                (S_OK, Some(TypedInterface::Interface(Arc::new(ops))))
            }
            _ => (E_NOINTERFACE, None),
        }
    }

    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release(&self) -> u32 {
        self.refs.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }
}

// ============================================================================
// Device function table
// ============================================================================

struct NativeDevice {
    shared: Arc<Shared>,
    device: Device<Context>,
    handle: Mutex<Option<DeviceHandle<Context>>>,
    refs: AtomicU32,
}

impl NativeDevice {
    fn dead(&self) -> bool {
        self.refs.load(Ordering::Acquire) == 0
    }

    fn criteria_field_matches(wanted: u16, actual: u16) -> bool {
        wanted == FIND_INTERFACE_DONT_CARE || wanted == actual
    }
}

impl DeviceOps for NativeDevice {
    fn open(&self, _seize: bool) -> IoStatus {
        if self.dead() {
            return IoStatus::NOT_ATTACHED;
        }
        let Ok(mut handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        if handle.is_some() {
            return IoStatus::EXCLUSIVE_ACCESS;
        }
        match self.device.open() {
            Ok(opened) => {
                *handle = Some(opened);
                IoStatus::SUCCESS
            }
            Err(err) => status_from_usb(err),
        }
    }

    fn close(&self) -> IoStatus {
        let Ok(mut handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        match handle.take() {
            Some(_) => IoStatus::SUCCESS,
            None => IoStatus::NOT_OPEN,
        }
    }

    fn vendor_id(&self) -> (IoStatus, u16) {
        if self.dead() {
            return (IoStatus::NOT_ATTACHED, 0);
        }
        match self.device.device_descriptor() {
            Ok(descriptor) => (IoStatus::SUCCESS, descriptor.vendor_id()),
            Err(err) => (status_from_usb(err), 0),
        }
    }

    fn product_id(&self) -> (IoStatus, u16) {
        if self.dead() {
            return (IoStatus::NOT_ATTACHED, 0);
        }
        match self.device.device_descriptor() {
            Ok(descriptor) => (IoStatus::SUCCESS, descriptor.product_id()),
            Err(err) => (status_from_usb(err), 0),
        }
    }

    fn create_interface_iterator(
        &self,
        criteria: &InterfaceCriteria,
    ) -> std::result::Result<RawObject, IoStatus> {
        if self.dead() {
            return Err(IoStatus::NOT_ATTACHED);
        }
        let config = self
            .device
            .active_config_descriptor()
            .map_err(status_from_usb)?;

        let mut pending = VecDeque::new();
        let Some(mut state) = self.shared.lock() else {
            return Err(IoStatus::INTERNAL_ERROR);
        };
        for interface in config.interfaces() {
            // First matching alternate setting wins per interface.
            let matching = interface.descriptors().find(|descriptor| {
                Self::criteria_field_matches(
                    criteria.class,
                    u16::from(descriptor.class_code()),
                ) && Self::criteria_field_matches(
                    criteria.subclass,
                    u16::from(descriptor.sub_class_code()),
                ) && Self::criteria_field_matches(
                    criteria.protocol,
                    u16::from(descriptor.protocol_code()),
                ) && Self::criteria_field_matches(
                    criteria.alternate_setting,
                    u16::from(descriptor.setting_number()),
                )
            });
            let Some(descriptor) = matching else { continue };

            let endpoints = descriptor
                .endpoint_descriptors()
                .map(|endpoint| EndpointSpec {
                    address: endpoint.address(),
                    transfer: endpoint.transfer_type(),
                })
                .collect();
            let spec = InterfaceSpec {
                device: self.device.clone(),
                number: descriptor.interface_number(),
                setting: descriptor.setting_number(),
                endpoints,
            };
            let token = self.shared.mint();
            state
                .objects
                .insert(token, ObjectEntry::Interface { refs: 1, spec });
            pending.push_back(token);
        }

        let iterator = self.shared.mint();
        state
            .objects
            .insert(iterator, ObjectEntry::Iterator { refs: 1, pending });
        Ok(iterator)
    }

    fn reset(&self) -> IoStatus {
        if self.dead() {
            return IoStatus::NOT_ATTACHED;
        }
        let Ok(mut handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        let result = match handle.as_mut() {
            Some(handle) => handle.reset(),
            // Reset does not require the device to be open; borrow a handle.
            None => match self.device.open() {
                Ok(mut handle) => handle.reset(),
                Err(err) => Err(err),
            },
        };
        match result {
            Ok(()) => IoStatus::SUCCESS,
            Err(err) => status_from_usb(err),
        }
    }

    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release(&self) -> u32 {
        let remaining = self.refs.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if remaining == 0 {
            if let Ok(mut handle) = self.handle.lock() {
                handle.take();
            }
        }
        remaining
    }
}

// ============================================================================
// Interface function table
// ============================================================================

struct NativeInterface {
    spec: InterfaceSpec,
    handle: Mutex<Option<DeviceHandle<Context>>>,
    refs: AtomicU32,
}

impl NativeInterface {
    fn dead(&self) -> bool {
        self.refs.load(Ordering::Acquire) == 0
    }

    fn endpoint(&self, pipe: u8, direction: Direction) -> Option<EndpointSpec> {
        // Pipe references are 1-based; zero is the default control pipe and
        // has no entry in the endpoint list.
        let spec = self.spec.endpoints.get(usize::from(pipe).checked_sub(1)?)?;
        let actual = if spec.address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        };
        (actual == direction).then_some(*spec)
    }
}

impl InterfaceOps for NativeInterface {
    fn open(&self, seize: bool) -> IoStatus {
        if self.dead() {
            return IoStatus::NOT_ATTACHED;
        }
        let Ok(mut handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        if handle.is_some() {
            return IoStatus::EXCLUSIVE_ACCESS;
        }
        let mut opened = match self.spec.device.open() {
            Ok(opened) => opened,
            Err(err) => return status_from_usb(err),
        };
        if let Err(err) = opened.set_auto_detach_kernel_driver(true) {
            // Not every platform can detach; claiming may still work.
            trace!("auto-detach unavailable: {err}");
        }
        if let Err(err) = opened.claim_interface(self.spec.number) {
            if !seize {
                return status_from_usb(err);
            }
            // Seizing detaches whoever holds the interface and retries.
            if let Err(err) = opened.detach_kernel_driver(self.spec.number) {
                debug!("detach before seize failed: {err}");
            }
            if let Err(err) = opened.claim_interface(self.spec.number) {
                return status_from_usb(err);
            }
        }
        if self.spec.setting != 0 {
            if let Err(err) = opened.set_alternate_setting(self.spec.number, self.spec.setting) {
                return status_from_usb(err);
            }
        }
        *handle = Some(opened);
        IoStatus::SUCCESS
    }

    fn close(&self) -> IoStatus {
        let Ok(mut handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        match handle.take() {
            Some(mut handle) => {
                if let Err(err) = handle.release_interface(self.spec.number) {
                    debug!("release interface failed: {err}");
                }
                IoStatus::SUCCESS
            }
            None => IoStatus::NOT_OPEN,
        }
    }

    fn read_pipe(
        &self,
        pipe: u8,
        buf: &mut [u8],
        _no_data_timeout_ms: u32,
        completion_timeout_ms: u32,
    ) -> (IoStatus, u32) {
        if self.dead() {
            return (IoStatus::NOT_ATTACHED, 0);
        }
        let Ok(handle) = self.handle.lock() else {
            return (IoStatus::INTERNAL_ERROR, 0);
        };
        let Some(handle) = handle.as_ref() else {
            return (IoStatus::NOT_OPEN, 0);
        };
        let Some(endpoint) = self.endpoint(pipe, Direction::In) else {
            return (IoStatus::USB_UNKNOWN_PIPE, 0);
        };
        let timeout = Duration::from_millis(u64::from(completion_timeout_ms));
        let result = match endpoint.transfer {
            TransferType::Bulk => handle.read_bulk(endpoint.address, buf, timeout),
            TransferType::Interrupt => handle.read_interrupt(endpoint.address, buf, timeout),
            _ => return (IoStatus::UNSUPPORTED, 0),
        };
        match result {
            Ok(count) => (IoStatus::SUCCESS, count as u32),
            Err(err) => (status_from_usb(err), 0),
        }
    }

    fn write_pipe(
        &self,
        pipe: u8,
        data: &[u8],
        _no_data_timeout_ms: u32,
        completion_timeout_ms: u32,
    ) -> IoStatus {
        if self.dead() {
            return IoStatus::NOT_ATTACHED;
        }
        let Ok(handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        let Some(handle) = handle.as_ref() else {
            return IoStatus::NOT_OPEN;
        };
        let Some(endpoint) = self.endpoint(pipe, Direction::Out) else {
            return IoStatus::USB_UNKNOWN_PIPE;
        };
        let timeout = Duration::from_millis(u64::from(completion_timeout_ms));
        let result = match endpoint.transfer {
            TransferType::Bulk => handle.write_bulk(endpoint.address, data, timeout),
            TransferType::Interrupt => handle.write_interrupt(endpoint.address, data, timeout),
            _ => return IoStatus::UNSUPPORTED,
        };
        match result {
            Ok(count) if count == data.len() => IoStatus::SUCCESS,
            Ok(_) => IoStatus::UNDERRUN,
            Err(err) => status_from_usb(err),
        }
    }

    fn control_request(&self, _pipe: u8, request: &mut ControlRequest) -> IoStatus {
        if self.dead() {
            return IoStatus::NOT_ATTACHED;
        }
        let Ok(handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        let Some(handle) = handle.as_ref() else {
            return IoStatus::NOT_OPEN;
        };
        let timeout = request.completion_timeout;
        let result = if request.is_device_to_host() {
            handle.read_control(
                request.request_type,
                request.request,
                request.value,
                request.index,
                &mut request.data,
                timeout,
            )
        } else {
            handle.write_control(
                request.request_type,
                request.request,
                request.value,
                request.index,
                &request.data,
                timeout,
            )
        };
        match result {
            Ok(count) => {
                request.len_done = count as u32;
                IoStatus::SUCCESS
            }
            Err(err) => status_from_usb(err),
        }
    }

    fn clear_pipe_stall(&self, pipe: u8, _both_ends: bool) -> IoStatus {
        if self.dead() {
            return IoStatus::NOT_ATTACHED;
        }
        let Ok(mut handle) = self.handle.lock() else {
            return IoStatus::INTERNAL_ERROR;
        };
        let Some(handle) = handle.as_mut() else {
            return IoStatus::NOT_OPEN;
        };
        // libusb's clear-halt issues the device-side CLEAR_FEATURE as well,
        // so one call covers both ends.
        let Some(endpoint) = self
            .endpoint(pipe, Direction::In)
            .or_else(|| self.endpoint(pipe, Direction::Out))
        else {
            return IoStatus::USB_UNKNOWN_PIPE;
        };
        match handle.clear_halt(endpoint.address) {
            Ok(()) => IoStatus::SUCCESS,
            Err(err) => status_from_usb(err),
        }
    }

    fn reset_pipe(&self, pipe: u8) -> IoStatus {
        self.clear_pipe_stall(pipe, false)
    }

    fn add_ref(&self) -> u32 {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release(&self) -> u32 {
        let remaining = self.refs.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if remaining == 0 {
            if let Ok(mut handle) = self.handle.lock() {
                if let Some(mut handle) = handle.take() {
                    let _ = handle.release_interface(self.spec.number);
                }
            }
        }
        remaining
    }
}
