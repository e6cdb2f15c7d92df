//! Thin rust drivers for the instruments of the ODNP setup.
//!
//! Every driver is generic over an [`odnp_interface::InstrumentInterface`], performs no I/O in
//! its constructor, and only implements the handful of commands the command server needs:
//!
//! - [`DcSupply`]: SCPI programmable DC power supply driving the electromagnet.
//! - [`Gaussmeter`]: Hall probe gaussmeter reading the field at the sample.
//! - [`PowerMeter`]: microwave power meter on the forward coupler.
//! - [`MicrowaveBridge`]: X-band source, amplifier and reflection detector.
//!
//! # Example
//!
//! ```no_run
//! use odnp_drivers::{DcSupply, Gaussmeter, SerialInterfaceGaussmeter};
//! use odnp_interface::TcpIpInterface;
//!
//! let mut supply = DcSupply::try_new(TcpIpInterface::simple("192.168.1.20:5025").unwrap()).unwrap();
//! let mut probe = Gaussmeter::try_new(SerialInterfaceGaussmeter::simple("/dev/ttyUSB1").unwrap()).unwrap();
//!
//! println!("Supply output on: {}", supply.get_output().unwrap());
//! println!("Field: {:.2} G", probe.get_field().unwrap());
//! ```

#![deny(missing_docs)]

mod bridge;
mod gaussmeter;
mod power_meter;
mod supply;

pub use bridge::{MicrowaveBridge, SerialInterfaceBridge};
pub use gaussmeter::{Gaussmeter, SerialInterfaceGaussmeter};
pub use power_meter::PowerMeter;
pub use supply::DcSupply;

use odnp_interface::InstrumentError;

/// Parse an on/off status as reported by the instruments (`1`, `0`, `ON`, `OFF`).
fn parse_status(response: &str) -> Result<bool, InstrumentError> {
    match response.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        _ => Err(InstrumentError::ResponseParseError(response.to_string())),
    }
}

/// Ensure that a setpoint lies within `[min, max]` before it is sent to an instrument.
fn check_range(value: f64, min: f64, max: f64) -> Result<(), InstrumentError> {
    if !(min..=max).contains(&value) {
        return Err(InstrumentError::FloatValueOutOfRange { value, min, max });
    }
    Ok(())
}
