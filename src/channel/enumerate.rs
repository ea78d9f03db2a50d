//! Port enumeration.

use serialport::SerialPortType;

/// Metadata of an available port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl PortInfo {
    /// Key used to store line settings for this port: `<vid>-<pid>` when
    /// both identifiers are known, the port name otherwise.
    pub fn preference_key(&self) -> String {
        if self.vendor_id != 0 && self.product_id != 0 {
            format!("{}-{}", self.vendor_id, self.product_id)
        } else {
            self.name.clone()
        }
    }

    /// Every key that may hold stored settings, most specific first
    pub fn preference_keys(&self) -> Vec<String> {
        let key = self.preference_key();
        if key == self.name {
            vec![key]
        } else {
            vec![key, self.name.clone()]
        }
    }
}

/// List the serial ports present on this machine
pub fn available_ports() -> Result<Vec<PortInfo>, serialport::Error> {
    let ports = serialport::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let mut info = PortInfo {
                name: p.port_name,
                ..PortInfo::default()
            };
            match p.port_type {
                SerialPortType::UsbPort(usb) => {
                    info.vendor_id = usb.vid;
                    info.product_id = usb.pid;
                    info.description = usb.product.unwrap_or_default();
                    info.manufacturer = usb.manufacturer.unwrap_or_default();
                    info.serial_number = usb.serial_number.unwrap_or_default();
                }
                SerialPortType::BluetoothPort => info.description = "Bluetooth".to_string(),
                SerialPortType::PciPort => info.description = "PCI".to_string(),
                SerialPortType::Unknown => {}
            }
            info
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_key_usb() {
        let info = PortInfo {
            name: "/dev/ttyUSB0".to_string(),
            vendor_id: 1027,
            product_id: 24577,
            ..PortInfo::default()
        };
        assert_eq!(info.preference_key(), "1027-24577");
        assert_eq!(info.preference_keys(), vec!["1027-24577", "/dev/ttyUSB0"]);
    }

    #[test]
    fn test_preference_key_without_ids() {
        let info = PortInfo {
            name: "COM1".to_string(),
            ..PortInfo::default()
        };
        assert_eq!(info.preference_key(), "COM1");
        assert_eq!(info.preference_keys(), vec!["COM1"]);
    }
}
