//! See3CAM CU20 hidraw node discovery.
//!
//! The camera enumerates as one USB device carrying both a UVC video
//! interface and a vendor HID interface. Given the `/dev/videoN` node we
//! resolve the owning USB device through sysfs, then find the hidraw node
//! whose HID_ID carries the CU20 vendor/product pair and whose HID_UNIQ
//! matches the USB serial. Exactly one match is required.

use std::path::Path;

use thiserror::Error;

/// e-con Systems USB vendor id.
pub const SEE3CAM_VENDOR_ID: u16 = 0x2560;
/// See3CAM CU20 product id.
pub const SEE3CAM_PRODUCT_ID: u16 = 0xC120;

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("cannot resolve USB device for {0} via sysfs")]
    NoUsbDevice(String),
    #[error("{path} is not a See3CAM CU20: VID:PID {vendor:04x}:{product:04x}")]
    WrongDevice {
        path: String,
        vendor: u16,
        product: u16,
    },
    #[error("USB device for {0} has no serial")]
    NoSerial(String),
    #[error("no hidraw node matches serial {serial:?}")]
    NotFound { serial: String },
    #[error("{count} hidraw nodes match serial {serial:?}, expected exactly one")]
    Ambiguous { serial: String, count: usize },
    #[error("sysfs read failed: {0}")]
    Sysfs(#[from] std::io::Error),
}

/// HID identity fields parsed from a hidraw uevent file.
#[derive(Debug, PartialEq, Eq)]
struct HidIdentity {
    vendor: u16,
    product: u16,
    uniq: String,
}

/// Parse `HID_ID` (`bus:vendor:product` in hex) and `HID_UNIQ` from the
/// contents of `/sys/class/hidraw/hidrawN/device/uevent`.
fn parse_hid_uevent(uevent: &str) -> Option<HidIdentity> {
    let mut vendor = None;
    let mut product = None;
    let mut uniq = None;

    for line in uevent.lines() {
        if let Some(id) = line.strip_prefix("HID_ID=") {
            let mut fields = id.split(':');
            let _bus = fields.next()?;
            vendor = u32::from_str_radix(fields.next()?, 16).ok().map(|v| v as u16);
            product = u32::from_str_radix(fields.next()?, 16).ok().map(|v| v as u16);
        } else if let Some(u) = line.strip_prefix("HID_UNIQ=") {
            uniq = Some(u.trim().to_string());
        }
    }

    Some(HidIdentity {
        vendor: vendor?,
        product: product?,
        uniq: uniq?,
    })
}

/// Read USB VID:PID and serial from sysfs for a `/dev/videoN` device.
fn usb_identity(video_path: &str) -> Result<(u16, u16, String), DiscoverError> {
    let missing = || DiscoverError::NoUsbDevice(video_path.to_string());

    // /dev/video2 → "video2"
    let dev_name = Path::new(video_path)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(missing)?;
    // /sys/class/video4linux/video2/device is a symlink to the USB
    // interface dir; its parent is the USB device dir.
    let device_link = format!("/sys/class/video4linux/{dev_name}/device");
    let interface_dir = std::fs::canonicalize(&device_link).map_err(|_| missing())?;
    let usb_device_dir = interface_dir.parent().ok_or_else(missing)?;

    let read_hex = |name: &str| -> Result<u16, DiscoverError> {
        let s = std::fs::read_to_string(usb_device_dir.join(name))?;
        u16::from_str_radix(s.trim(), 16).map_err(|_| missing())
    };

    let vendor = read_hex("idVendor")?;
    let product = read_hex("idProduct")?;
    let serial = std::fs::read_to_string(usb_device_dir.join("serial"))
        .map_err(|_| DiscoverError::NoSerial(video_path.to_string()))?
        .trim()
        .to_string();

    Ok((vendor, product, serial))
}

/// Resolve the hidraw control node paired with a See3CAM video device.
///
/// Returns the `/dev/hidrawN` path. Zero or multiple candidate nodes are
/// both fatal: the control protocol needs exactly one channel.
pub fn hidraw_for_video_device(video_path: &str) -> Result<String, DiscoverError> {
    let (vendor, product, serial) = usb_identity(video_path)?;
    if vendor != SEE3CAM_VENDOR_ID || product != SEE3CAM_PRODUCT_ID {
        return Err(DiscoverError::WrongDevice {
            path: video_path.to_string(),
            vendor,
            product,
        });
    }

    let mut matches = Vec::new();
    for entry in std::fs::read_dir("/sys/class/hidraw")? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        let uevent_path = entry.path().join("device/uevent");
        let Ok(uevent) = std::fs::read_to_string(&uevent_path) else {
            continue;
        };
        let Some(identity) = parse_hid_uevent(&uevent) else {
            continue;
        };

        if identity.vendor == SEE3CAM_VENDOR_ID
            && identity.product == SEE3CAM_PRODUCT_ID
            && identity.uniq == serial
        {
            matches.push(format!("/dev/{name}"));
        }
    }

    match matches.len() {
        0 => Err(DiscoverError::NotFound { serial }),
        1 => {
            let node = matches.remove(0);
            tracing::info!(video = %video_path, hidraw = %node, "resolved control channel");
            Ok(node)
        }
        count => Err(DiscoverError::Ambiguous { serial, count }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hid_uevent() {
        let uevent = "DRIVER=hid-generic\n\
                      HID_ID=0003:00002560:0000C120\n\
                      HID_NAME=e-con Systems See3CAM_CU20\n\
                      HID_PHYS=usb-0000:00:14.0-2/input2\n\
                      HID_UNIQ=180B0204\n";
        let identity = parse_hid_uevent(uevent).unwrap();
        assert_eq!(identity.vendor, SEE3CAM_VENDOR_ID);
        assert_eq!(identity.product, SEE3CAM_PRODUCT_ID);
        assert_eq!(identity.uniq, "180B0204");
    }

    #[test]
    fn test_parse_hid_uevent_other_device() {
        let uevent = "HID_ID=0003:0000046D:0000C52B\nHID_UNIQ=\n";
        let identity = parse_hid_uevent(uevent).unwrap();
        assert_eq!(identity.vendor, 0x046D);
        assert_eq!(identity.product, 0xC52B);
        assert_eq!(identity.uniq, "");
    }

    #[test]
    fn test_parse_hid_uevent_missing_fields() {
        assert!(parse_hid_uevent("DRIVER=hid-generic\n").is_none());
        assert!(parse_hid_uevent("HID_ID=0003:00002560:0000C120\n").is_none());
    }
}
