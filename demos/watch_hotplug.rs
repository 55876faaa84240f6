//! Hot-Plug Watching Example
//!
//! Observes attach and detach notifications for all USB devices and prints
//! each event as it arrives. Devices already attached when the observer
//! starts are reported once as first-match events, exactly like devices
//! plugged in afterward.
//!
//! Runs until interrupted.

use std::sync::Arc;

use iousb::{DeviceObserver, HostRegistry, MatchingFilter, NativeRegistry, UsbDevice};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> iousb::Result<()> {
    let registry: Arc<dyn HostRegistry> = Arc::new(NativeRegistry::new()?);

    let handler_registry = Arc::clone(&registry);
    let _observer = DeviceObserver::observe(
        &registry,
        &MatchingFilter::all_usb_devices(),
        move |name, service| {
            // The service token is only valid during delivery; resolve it to
            // identifiers right here.
            match UsbDevice::from_service(&handler_registry, service) {
                Ok(device) => println!(
                    "{}: {:04x}:{:04x}",
                    name,
                    device.vendor_id().unwrap_or(0),
                    device.product_id().unwrap_or(0)
                ),
                Err(e) => println!("{}: service {:#x} ({})", name, service, e),
            }
        },
    )?;

    println!("watching for USB hot-plug events, Ctrl-C to stop");
    loop {
        std::thread::park();
    }
}
