//! In-memory host registry for tests
//!
//! Implements the `host` seam over plain data structures: services and
//! iterators are table entries with observable reference counts, pipes are
//! loopback byte queues, and notifications fire on demand. Tests use the
//! live counts to prove that nothing leaks and that released objects become
//! unusable.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::constants::{
    TypeTag, E_NOINTERFACE, FIND_INTERFACE_DONT_CARE, FIRST_MATCH_NOTIFICATION, S_OK,
    USB_DEVICE_INTERFACE_ID, USB_DEVICE_USER_CLIENT_TYPE, USB_INTERFACE_INTERFACE_ID,
    USB_INTERFACE_USER_CLIENT_TYPE,
};
use crate::host::{
    DeviceOps, HostRegistry, InterfaceOps, NotificationCallback, PluginOps, RawObject,
    TypedInterface, OBJECT_NULL,
};
use crate::status::IoStatus;
use crate::structures::{ControlRequest, InterfaceCriteria, MatchingFilter};

/// How the fake plugin factory behaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PluginBehavior {
    Normal,
    /// Factory reports success but yields no object.
    SuccessWithNullObject,
    /// Factory fails outright with the given status.
    FailWith(IoStatus),
    /// Factory succeeds; the plugin's query reports no interface.
    FailQuery,
}

#[derive(Default)]
struct DeviceRec {
    vendor_id: u16,
    product_id: u16,
    open: bool,
    open_status: Option<IoStatus>,
    close_status: Option<IoStatus>,
    /// Function-table references; zero means the registry destroyed it.
    refs: u32,
    interfaces: Vec<RawObject>,
}

#[derive(Default)]
struct InterfaceRec {
    class: u16,
    subclass: u16,
    protocol: u16,
    alternate_setting: u16,
    open: bool,
    refs: u32,
    pipes: HashMap<u8, VecDeque<u8>>,
    pipe_status: Option<IoStatus>,
    last_timeouts: Option<(u32, u32)>,
    control_response: Option<Vec<u8>>,
    last_control_request: Option<ControlRequest>,
    last_stall_clear: Option<(u8, bool)>,
    last_pipe_reset: Option<u8>,
}

enum ObjectRec {
    /// A bare service with no behavior, for iterator-contract tests.
    Bare { refs: u32 },
    Device { refs: u32 },
    Interface { refs: u32 },
    Iterator { refs: u32, pending: VecDeque<RawObject> },
    Port { refs: u32 },
}

impl ObjectRec {
    fn refs_mut(&mut self) -> &mut u32 {
        match self {
            ObjectRec::Bare { refs }
            | ObjectRec::Device { refs }
            | ObjectRec::Interface { refs }
            | ObjectRec::Iterator { refs, .. }
            | ObjectRec::Port { refs } => refs,
        }
    }

    fn refs(&self) -> u32 {
        match self {
            ObjectRec::Bare { refs }
            | ObjectRec::Device { refs }
            | ObjectRec::Interface { refs }
            | ObjectRec::Iterator { refs, .. }
            | ObjectRec::Port { refs } => *refs,
        }
    }
}

struct Registration {
    port: RawObject,
    name: String,
    iterator: RawObject,
    callback: Arc<dyn Fn(RawObject) + Send + Sync>,
}

#[derive(Default)]
struct State {
    objects: HashMap<RawObject, ObjectRec>,
    devices: HashMap<RawObject, DeviceRec>,
    device_order: Vec<RawObject>,
    interfaces: HashMap<RawObject, InterfaceRec>,
    registrations: Vec<Registration>,
    plugin_behavior: Option<PluginBehavior>,
    live_plugins: usize,
}

pub(crate) struct FakeRegistry {
    next_token: AtomicU64,
    state: Arc<Mutex<State>>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            state: Arc::new(Mutex::new(State {
                plugin_behavior: Some(PluginBehavior::Normal),
                ..State::default()
            })),
        }
    }

    fn token(&self) -> RawObject {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // ------------------------------------------------------------------
    // Test setup and observation
    // ------------------------------------------------------------------

    pub(crate) fn add_services(&self, count: usize) -> Vec<RawObject> {
        let mut state = self.lock();
        (0..count)
            .map(|_| {
                let token = self.token();
                state.objects.insert(token, ObjectRec::Bare { refs: 0 });
                token
            })
            .collect()
    }

    /// Builds an iterator over the given services, retaining each entry.
    pub(crate) fn make_iterator(&self, services: &[RawObject]) -> RawObject {
        let mut state = self.lock();
        for service in services {
            if let Some(rec) = state.objects.get_mut(service) {
                *rec.refs_mut() += 1;
            }
        }
        let token = self.token();
        state.objects.insert(
            token,
            ObjectRec::Iterator {
                refs: 1,
                pending: services.iter().copied().collect(),
            },
        );
        token
    }

    pub(crate) fn add_device(&self, vendor_id: u16, product_id: u16) -> RawObject {
        let token = self.token();
        let mut state = self.lock();
        state.objects.insert(token, ObjectRec::Device { refs: 0 });
        state.devices.insert(
            token,
            DeviceRec {
                vendor_id,
                product_id,
                ..DeviceRec::default()
            },
        );
        state.device_order.push(token);
        token
    }

    pub(crate) fn add_interface(
        &self,
        device: RawObject,
        class: u16,
        subclass: u16,
        protocol: u16,
        alternate_setting: u16,
    ) -> RawObject {
        let token = self.token();
        let mut state = self.lock();
        state.objects.insert(token, ObjectRec::Interface { refs: 0 });
        state.interfaces.insert(
            token,
            InterfaceRec {
                class,
                subclass,
                protocol,
                alternate_setting,
                ..InterfaceRec::default()
            },
        );
        if let Some(device) = state.devices.get_mut(&device) {
            device.interfaces.push(token);
        }
        token
    }

    pub(crate) fn set_plugin_behavior(&self, behavior: PluginBehavior) {
        self.lock().plugin_behavior = Some(behavior);
    }

    /// Outstanding references held by clients on registry tokens. Function
    /// tables are counted separately.
    pub(crate) fn live_count(&self) -> usize {
        self.lock()
            .objects
            .values()
            .map(|rec| rec.refs() as usize)
            .sum()
    }

    pub(crate) fn live_plugins(&self) -> usize {
        self.lock().live_plugins
    }

    pub(crate) fn device_is_open(&self, service: RawObject) -> bool {
        self.lock().devices.get(&service).map(|d| d.open) == Some(true)
    }

    pub(crate) fn interface_is_open(&self, service: RawObject) -> bool {
        self.lock().interfaces.get(&service).map(|i| i.open) == Some(true)
    }

    pub(crate) fn set_open_status(&self, service: RawObject, status: IoStatus) {
        if let Some(device) = self.lock().devices.get_mut(&service) {
            device.open_status = Some(status);
        }
    }

    pub(crate) fn set_close_status(&self, service: RawObject, status: IoStatus) {
        if let Some(device) = self.lock().devices.get_mut(&service) {
            device.close_status = Some(status);
        }
    }

    pub(crate) fn device_refs(&self, service: RawObject) -> u32 {
        self.lock().devices.get(&service).map(|d| d.refs).unwrap_or(0)
    }

    /// Releases one function-table reference by hand, as an external owner
    /// would.
    pub(crate) fn release_device(&self, service: RawObject) {
        if let Some(device) = self.lock().devices.get_mut(&service) {
            device.refs = device.refs.saturating_sub(1);
        }
    }

    pub(crate) fn set_pipe_status(&self, service: RawObject, status: IoStatus) {
        if let Some(interface) = self.lock().interfaces.get_mut(&service) {
            interface.pipe_status = Some(status);
        }
    }

    pub(crate) fn last_pipe_timeouts(&self, service: RawObject) -> Option<(u32, u32)> {
        self.lock().interfaces.get(&service)?.last_timeouts
    }

    pub(crate) fn set_control_response(&self, service: RawObject, response: Vec<u8>) {
        if let Some(interface) = self.lock().interfaces.get_mut(&service) {
            interface.control_response = Some(response);
        }
    }

    pub(crate) fn last_control_request(&self, service: RawObject) -> Option<ControlRequest> {
        self.lock().interfaces.get(&service)?.last_control_request.clone()
    }

    pub(crate) fn last_stall_clear(&self, service: RawObject) -> Option<(u8, bool)> {
        self.lock().interfaces.get(&service)?.last_stall_clear
    }

    pub(crate) fn last_pipe_reset(&self, service: RawObject) -> Option<u8> {
        self.lock().interfaces.get(&service)?.last_pipe_reset
    }

    pub(crate) fn notification_count(&self) -> usize {
        self.lock().registrations.len()
    }

    /// Appends retained services to the named notification's iterator and
    /// fires its callback, like a registry event would.
    pub(crate) fn fire_notification(&self, name: &str, services: &[RawObject]) {
        let mut to_fire = Vec::new();
        {
            let mut state = self.lock();
            let targets: Vec<(RawObject, Arc<dyn Fn(RawObject) + Send + Sync>)> = state
                .registrations
                .iter()
                .filter(|r| r.name == name)
                .map(|r| (r.iterator, Arc::clone(&r.callback)))
                .collect();
            for (iterator, callback) in targets {
                for service in services {
                    if let Some(rec) = state.objects.get_mut(service) {
                        *rec.refs_mut() += 1;
                    }
                }
                if let Some(ObjectRec::Iterator { pending, .. }) =
                    state.objects.get_mut(&iterator)
                {
                    pending.extend(services.iter().copied());
                }
                to_fire.push((iterator, callback));
            }
        }
        // Callbacks run unlocked; delivery re-enters the registry.
        for (iterator, callback) in to_fire {
            callback(iterator);
        }
    }

    /// Removes and returns the named notification's callback so tests can
    /// fire it after the observer is gone.
    pub(crate) fn take_notification_callback(
        &self,
        name: &str,
    ) -> Arc<dyn Fn(RawObject) + Send + Sync> {
        let mut state = self.lock();
        let index = state
            .registrations
            .iter()
            .position(|r| r.name == name)
            .expect("no registration for notification");
        state.registrations.remove(index).callback
    }

    fn filter_matches(filter: &MatchingFilter, device: &DeviceRec) -> bool {
        filter.vendor_id().map_or(true, |v| v == device.vendor_id)
            && filter.product_id().map_or(true, |p| p == device.product_id)
    }

    fn criteria_field_matches(wanted: u16, actual: u16) -> bool {
        wanted == FIND_INTERFACE_DONT_CARE || wanted == actual
    }

    fn matching_device_tokens(state: &State, filter: &MatchingFilter) -> Vec<RawObject> {
        state
            .device_order
            .iter()
            .filter(|token| {
                state
                    .devices
                    .get(*token)
                    .map(|d| Self::filter_matches(filter, d))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    fn new_iterator(state: &mut State, token: RawObject, entries: Vec<RawObject>) {
        for entry in &entries {
            if let Some(rec) = state.objects.get_mut(entry) {
                *rec.refs_mut() += 1;
            }
        }
        state.objects.insert(
            token,
            ObjectRec::Iterator {
                refs: 1,
                pending: entries.into(),
            },
        );
    }
}

impl HostRegistry for FakeRegistry {
    fn retain_object(&self, object: RawObject) {
        if let Some(rec) = self.lock().objects.get_mut(&object) {
            *rec.refs_mut() += 1;
        }
    }

    fn release_object(&self, object: RawObject) {
        let mut state = self.lock();
        let remove = match state.objects.get_mut(&object) {
            Some(rec) => {
                let refs = rec.refs_mut();
                *refs = refs.saturating_sub(1);
                *refs == 0 && matches!(rec, ObjectRec::Iterator { .. } | ObjectRec::Port { .. })
            }
            None => false,
        };
        if remove {
            // Entries still pending in a leaked iterator stay retained so
            // tests can observe the leak.
            state.objects.remove(&object);
        }
    }

    fn matching_services(
        &self,
        filter: &MatchingFilter,
    ) -> std::result::Result<RawObject, IoStatus> {
        let token = self.token();
        let mut state = self.lock();
        let matches = Self::matching_device_tokens(&state, filter);
        Self::new_iterator(&mut state, token, matches);
        Ok(token)
    }

    fn iterator_next(&self, iterator: RawObject) -> RawObject {
        match self.lock().objects.get_mut(&iterator) {
            Some(ObjectRec::Iterator { pending, .. }) => {
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
        let behavior = {
            let state = self.lock();
            state.plugin_behavior.unwrap_or(PluginBehavior::Normal)
        };
        match behavior {
            PluginBehavior::SuccessWithNullObject => (IoStatus::SUCCESS, None, 0),
            PluginBehavior::FailWith(status) => (status, None, 0),
            PluginBehavior::Normal | PluginBehavior::FailQuery => {
                let kind = {
                    let state = self.lock();
                    match state.objects.get(&service) {
                        Some(ObjectRec::Device { .. })
                            if plugin_type == USB_DEVICE_USER_CLIENT_TYPE =>
                        {
                            Some(PluginKind::Device)
                        }
                        Some(ObjectRec::Interface { .. })
                            if plugin_type == USB_INTERFACE_USER_CLIENT_TYPE =>
                        {
                            Some(PluginKind::Interface)
                        }
                        Some(_) => None,
                        None => return (IoStatus::NOT_FOUND, None, 0),
                    }
                };
                let Some(kind) = kind else {
                    return (IoStatus::UNSUPPORTED, None, 0);
                };
                self.lock().live_plugins += 1;
                let plugin = FakePlugin {
                    state: Arc::clone(&self.state),
                    service,
                    kind,
                    fail_query: behavior == PluginBehavior::FailQuery,
                    refs: Mutex::new(1),
                };
                (IoStatus::SUCCESS, Some(Arc::new(plugin)), 0)
            }
        }
    }

    fn create_notification_port(&self) -> std::result::Result<RawObject, IoStatus> {
        let token = self.token();
        self.lock().objects.insert(token, ObjectRec::Port { refs: 1 });
        Ok(token)
    }

    fn destroy_notification_port(&self, port: RawObject) {
        let mut state = self.lock();
        state.registrations.retain(|r| r.port != port);
        state.objects.remove(&port);
    }

    fn add_matching_notification(
        &self,
        port: RawObject,
        name: &str,
        filter: &MatchingFilter,
        callback: NotificationCallback,
    ) -> std::result::Result<RawObject, IoStatus> {
        let token = self.token();
        let mut state = self.lock();
        // The initial iterator carries the services that already match.
        let initial = if name == FIRST_MATCH_NOTIFICATION {
            Self::matching_device_tokens(&state, filter)
        } else {
            Vec::new()
        };
        Self::new_iterator(&mut state, token, initial);
        state.registrations.push(Registration {
            port,
            name: name.to_string(),
            iterator: token,
            callback: Arc::from(callback),
        });
        Ok(token)
    }
}

#[derive(Clone, Copy)]
enum PluginKind {
    Device,
    Interface,
}

struct FakePlugin {
    state: Arc<Mutex<State>>,
    service: RawObject,
    kind: PluginKind,
    fail_query: bool,
    refs: Mutex<u32>,
}

impl PluginOps for FakePlugin {
    fn query_interface(&self, interface_type: TypeTag) -> (i32, Option<TypedInterface>) {
        if self.fail_query {
            return (E_NOINTERFACE, None);
        }
        match (self.kind, interface_type) {
            (PluginKind::Device, tag) if tag == USB_DEVICE_INTERFACE_ID => {
                let mut state = self.state.lock().unwrap();
                if let Some(device) = state.devices.get_mut(&self.service) {
                    device.refs += 1;
                }
                let ops = FakeDeviceOps {
                    state: Arc::clone(&self.state),
                    service: self.service,
                };
                (S_OK, Some(TypedInterface::Device(Arc::new(ops))))
            }
            (PluginKind::Interface, tag) if tag == USB_INTERFACE_INTERFACE_ID => {
                let mut state = self.state.lock().unwrap();
                if let Some(interface) = state.interfaces.get_mut(&self.service) {
                    interface.refs += 1;
                }
                let ops = FakeInterfaceOps {
                    state: Arc::clone(&self.state),
                    service: self.service,
                };
                (S_OK, Some(TypedInterface::Interface(Arc::new(ops))))
            }
            _ => (E_NOINTERFACE, None),
        }
    }

    fn add_ref(&self) -> u32 {
        let mut refs = self.refs.lock().unwrap();
        *refs += 1;
        *refs
    }

    fn release(&self) -> u32 {
        let mut refs = self.refs.lock().unwrap();
        *refs = refs.saturating_sub(1);
        if *refs == 0 {
            self.state.lock().unwrap().live_plugins -= 1;
        }
        *refs
    }
}

struct FakeDeviceOps {
    state: Arc<Mutex<State>>,
    service: RawObject,
}

impl FakeDeviceOps {
    fn with_live<T>(&self, f: impl FnOnce(&mut DeviceRec) -> T) -> Result<T, IoStatus> {
        let mut state = self.state.lock().unwrap();
        match state.devices.get_mut(&self.service) {
            Some(device) if device.refs > 0 => Ok(f(device)),
            _ => Err(IoStatus::NOT_ATTACHED),
        }
    }
}

impl DeviceOps for FakeDeviceOps {
    fn open(&self, _seize: bool) -> IoStatus {
        match self.with_live(|device| {
            if let Some(status) = device.open_status {
                return status;
            }
            device.open = true;
            IoStatus::SUCCESS
        }) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn close(&self) -> IoStatus {
        match self.with_live(|device| {
            device.open = false;
            device.close_status.unwrap_or(IoStatus::SUCCESS)
        }) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn vendor_id(&self) -> (IoStatus, u16) {
        match self.with_live(|device| device.vendor_id) {
            Ok(vendor_id) => (IoStatus::SUCCESS, vendor_id),
            Err(status) => (status, 0),
        }
    }

    fn product_id(&self) -> (IoStatus, u16) {
        match self.with_live(|device| device.product_id) {
            Ok(product_id) => (IoStatus::SUCCESS, product_id),
            Err(status) => (status, 0),
        }
    }

    fn create_interface_iterator(
        &self,
        criteria: &InterfaceCriteria,
    ) -> std::result::Result<RawObject, IoStatus> {
        let criteria = *criteria;
        let mut state = self.state.lock().unwrap();
        let device = state
            .devices
            .get(&self.service)
            .filter(|d| d.refs > 0)
            .ok_or(IoStatus::NOT_ATTACHED)?;
        let matches: Vec<RawObject> = device
            .interfaces
            .iter()
            .filter(|token| {
                state.interfaces.get(*token).is_some_and(|i| {
                    FakeRegistry::criteria_field_matches(criteria.class, i.class)
                        && FakeRegistry::criteria_field_matches(criteria.subclass, i.subclass)
                        && FakeRegistry::criteria_field_matches(criteria.protocol, i.protocol)
                        && FakeRegistry::criteria_field_matches(
                            criteria.alternate_setting,
                            i.alternate_setting,
                        )
                })
            })
            .copied()
            .collect();
        // Iterator tokens share the registry object table; reuse a counter
        // slot outside the instance by deriving from the table size.
        let token = next_state_token(&mut state);
        FakeRegistry::new_iterator(&mut state, token, matches);
        Ok(token)
    }

    fn reset(&self) -> IoStatus {
        match self.with_live(|_| IoStatus::SUCCESS) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn add_ref(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        match state.devices.get_mut(&self.service) {
            Some(device) => {
                device.refs += 1;
                device.refs
            }
            None => 0,
        }
    }

    fn release(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        match state.devices.get_mut(&self.service) {
            Some(device) => {
                device.refs = device.refs.saturating_sub(1);
                device.refs
            }
            None => 0,
        }
    }
}

struct FakeInterfaceOps {
    state: Arc<Mutex<State>>,
    service: RawObject,
}

impl FakeInterfaceOps {
    fn with_live<T>(&self, f: impl FnOnce(&mut InterfaceRec) -> T) -> Result<T, IoStatus> {
        let mut state = self.state.lock().unwrap();
        match state.interfaces.get_mut(&self.service) {
            Some(interface) if interface.refs > 0 => Ok(f(interface)),
            _ => Err(IoStatus::NOT_ATTACHED),
        }
    }
}

impl InterfaceOps for FakeInterfaceOps {
    fn open(&self, _seize: bool) -> IoStatus {
        match self.with_live(|interface| {
            interface.open = true;
            IoStatus::SUCCESS
        }) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn close(&self) -> IoStatus {
        match self.with_live(|interface| {
            interface.open = false;
            IoStatus::SUCCESS
        }) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn read_pipe(
        &self,
        pipe: u8,
        buf: &mut [u8],
        no_data_timeout_ms: u32,
        completion_timeout_ms: u32,
    ) -> (IoStatus, u32) {
        let result = self.with_live(|interface| {
            interface.last_timeouts = Some((no_data_timeout_ms, completion_timeout_ms));
            if let Some(status) = interface.pipe_status {
                return (status, 0);
            }
            let queue = interface.pipes.entry(pipe).or_default();
            let count = buf.len().min(queue.len());
            for slot in buf.iter_mut().take(count) {
                *slot = queue.pop_front().unwrap_or(0);
            }
            (IoStatus::SUCCESS, count as u32)
        });
        match result {
            Ok(pair) => pair,
            Err(status) => (status, 0),
        }
    }

    fn write_pipe(
        &self,
        pipe: u8,
        data: &[u8],
        no_data_timeout_ms: u32,
        completion_timeout_ms: u32,
    ) -> IoStatus {
        let result = self.with_live(|interface| {
            interface.last_timeouts = Some((no_data_timeout_ms, completion_timeout_ms));
            if let Some(status) = interface.pipe_status {
                return status;
            }
            interface.pipes.entry(pipe).or_default().extend(data);
            IoStatus::SUCCESS
        });
        match result {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn control_request(&self, _pipe: u8, request: &mut ControlRequest) -> IoStatus {
        let result = self.with_live(|interface| {
            interface.last_control_request = Some(request.clone());
            if request.is_device_to_host() {
                if let Some(response) = &interface.control_response {
                    let count = response.len().min(request.data.len());
                    request.data[..count].copy_from_slice(&response[..count]);
                    request.len_done = count as u32;
                    return IoStatus::SUCCESS;
                }
                request.len_done = 0;
            } else {
                request.len_done = request.data.len() as u32;
            }
            IoStatus::SUCCESS
        });
        match result {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn clear_pipe_stall(&self, pipe: u8, both_ends: bool) -> IoStatus {
        match self.with_live(|interface| {
            interface.last_stall_clear = Some((pipe, both_ends));
            IoStatus::SUCCESS
        }) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn reset_pipe(&self, pipe: u8) -> IoStatus {
        match self.with_live(|interface| {
            interface.last_pipe_reset = Some(pipe);
            IoStatus::SUCCESS
        }) {
            Ok(status) => status,
            Err(status) => status,
        }
    }

    fn add_ref(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        match state.interfaces.get_mut(&self.service) {
            Some(interface) => {
                interface.refs += 1;
                interface.refs
            }
            None => 0,
        }
    }

    fn release(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        match state.interfaces.get_mut(&self.service) {
            Some(interface) => {
                interface.refs = interface.refs.saturating_sub(1);
                interface.refs
            }
            None => 0,
        }
    }
}

/// Allocates a token against the shared state, for objects created by
/// function tables rather than the registry front end.
fn next_state_token(state: &mut State) -> RawObject {
    let max = state.objects.keys().max().copied().unwrap_or(0);
    max + 1_000_000
}
