//! Serial port resolution: config cleaning and auto-detection.

use latchkey_core::constants::{ADAPTER_KEYWORDS, PORT_AUTO};
use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

/// Strip trailing `;`/`#` comments from a configured port value and trim.
///
/// Deployment `.env` files tend to carry inline comments
/// (`SERIAL_PORT=/dev/ttyUSB0 ; left connector`); the raw value must not
/// reach the OS.
#[must_use]
pub fn clean_port_value(raw: &str) -> String {
    let mut value = raw;
    for sep in [';', '#'] {
        if let Some(idx) = value.find(sep) {
            value = &value[..idx];
        }
    }
    value.trim().to_string()
}

/// Whether a configured value asks for auto-detection.
#[must_use]
pub fn wants_auto_detect(value: &str) -> bool {
    value.is_empty() || value.eq_ignore_ascii_case(PORT_AUTO)
}

/// Pick the port whose USB metadata best matches known adapter chips.
///
/// Each enumerated port is scored by the number of adapter keywords
/// (CP210x, CH340 families) appearing in its product/manufacturer strings.
/// The highest score wins; ties go to the first enumerated port. When
/// nothing scores, the first port is still returned — a single unnamed
/// adapter is more likely the device than nothing.
#[must_use]
pub fn auto_detect_port() -> Option<String> {
    let ports = serialport::available_ports().ok()?;
    pick_port(&ports)
}

fn pick_port(ports: &[SerialPortInfo]) -> Option<String> {
    if ports.is_empty() {
        return None;
    }

    let mut best = &ports[0];
    let mut best_score = score_port(best);
    for port in &ports[1..] {
        let score = score_port(port);
        if score > best_score {
            best = port;
            best_score = score;
        }
    }

    debug!(port = %best.port_name, score = best_score, "auto-detected serial port");
    Some(best.port_name.clone())
}

/// Keyword occurrences in the port's descriptive USB metadata.
fn score_port(info: &SerialPortInfo) -> usize {
    let description = match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut text = String::new();
            if let Some(product) = &usb.product {
                text.push_str(product);
                text.push(' ');
            }
            if let Some(manufacturer) = &usb.manufacturer {
                text.push_str(manufacturer);
            }
            text
        }
        _ => String::new(),
    };

    ADAPTER_KEYWORDS
        .iter()
        .filter(|keyword| description.contains(*keyword))
        .count()
}
