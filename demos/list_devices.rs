//! Device Listing Example
//!
//! Enumerates every USB device visible to the host registry and prints its
//! vendor/product identifiers, then narrows the search to a single id pair
//! and inspects the first interface of that device:
//!
//! 1. Enumerate all devices with the unconstrained USB filter
//! 2. Re-run the search constrained to one vendor/product pair
//! 3. Find the device's first interface and open it briefly
//!
//! Pass a `VID:PID` pair (hex) as the first argument to pick the device for
//! steps 2 and 3; without one, only the full listing runs.

use std::sync::Arc;

use iousb::{
    HostRegistry, InterfaceCriteria, MatchingFilter, NativeRegistry, UsbDevice, UsbError,
};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_ids(arg: &str) -> Option<(u16, u16)> {
    let (vid, pid) = arg.split_once(':')?;
    Some((
        u16::from_str_radix(vid, 16).ok()?,
        u16::from_str_radix(pid, 16).ok()?,
    ))
}

fn list_all(registry: &Arc<dyn HostRegistry>) -> iousb::Result<usize> {
    println!("=== Attached USB devices ===");
    let mut count = 0;
    UsbDevice::each_matching(registry, &MatchingFilter::all_usb_devices(), |device, _stop| {
        println!(
            "  {:04x}:{:04x}",
            device.vendor_id()?,
            device.product_id()?
        );
        count += 1;
        Ok(())
    })?;
    println!("{} device(s)", count);
    println!();
    Ok(count)
}

fn inspect(registry: &Arc<dyn HostRegistry>, vendor_id: u16, product_id: u16) -> iousb::Result<()> {
    println!("=== First match for {:04x}:{:04x} ===", vendor_id, product_id);
    let device = match UsbDevice::with_ids(registry, vendor_id, product_id) {
        Ok(device) => device,
        Err(UsbError::PluginHasNoDeviceInterface) => {
            println!("no such device attached");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let interface = device.find_interface(&InterfaceCriteria::any())?;
    interface.open_and_perform(false, || {
        println!("opened the device's first interface");
        Ok(())
    })?;
    println!("closed again");
    Ok(())
}

fn run() -> iousb::Result<()> {
    let registry: Arc<dyn HostRegistry> = Arc::new(NativeRegistry::new()?);

    list_all(&registry)?;

    if let Some((vendor_id, product_id)) = std::env::args().nth(1).as_deref().and_then(parse_ids) {
        inspect(&registry, vendor_id, product_id)?;
    }
    Ok(())
}
