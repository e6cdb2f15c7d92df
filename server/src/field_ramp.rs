//! Closed-loop ramp of the magnetic field.
//!
//! The field is set through the current of the magnet supply, using a calibration factor in
//! A/G. The current is first ramped linearly to the calibrated setpoint, then the loop reads the
//! field and rescales the calibration until three consecutive readings are within tolerance.

use std::time::Duration;

use log::{debug, info};
use measurements::{Current, Voltage};
use odnp_interface::InstrumentError;
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    error::RampError,
    facade::{FieldSensor, MagnetSupply},
};

/// Linear ramp resolution: setpoints per ampere of travel.
const STEPS_PER_AMP: f64 = 2.0;
/// Ramps with more steps than this get the long settle time afterwards.
const LONG_SETTLE_AFTER_STEPS: usize = 4;
/// Consecutive in-tolerance readings that end the stabilization loop.
const REQUIRED_MATCHES: usize = 3;

/// Tuning of the field ramp, read from the `[field]` section of the configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldRampSettings {
    /// Initial calibration of the magnet in A/G.
    pub current_per_gauss: f64,
    /// Hard ceiling for the magnet current in A.
    pub max_current: f64,
    /// Voltage limit programmed when the supply is switched on, in V.
    pub voltage_limit: f64,
    /// A reading within this many G of the target counts as a match.
    pub tolerance_gauss: f64,
    /// Beyond this many G of error the loop waits the medium settle time.
    pub coarse_tolerance_gauss: f64,
    /// Targets below this field switch the magnet off, in G.
    pub off_threshold_gauss: f64,
    /// Iterations of the stabilization loop before giving up.
    pub max_tries: usize,
    /// Wait after every current step and every stabilization read, in ms.
    pub settle_short_ms: u64,
    /// Extra wait when the field is far off target, in ms.
    pub settle_medium_ms: u64,
    /// Extra wait after a long linear ramp, in ms.
    pub settle_long_ms: u64,
    /// Wait after zeroing the probe, in s.
    pub probe_zero_settle_s: u64,
}

impl Default for FieldRampSettings {
    fn default() -> Self {
        FieldRampSettings {
            current_per_gauss: 0.004_95,
            max_current: 25.0,
            voltage_limit: 25.0,
            tolerance_gauss: 0.8,
            coarse_tolerance_gauss: 2.0,
            off_threshold_gauss: 20.0,
            max_tries: 30,
            settle_short_ms: 500,
            settle_medium_ms: 3_000,
            settle_long_ms: 10_000,
            probe_zero_settle_s: 40,
        }
    }
}

impl FieldRampSettings {
    fn settle_short(&self) -> Duration {
        Duration::from_millis(self.settle_short_ms)
    }

    fn settle_medium(&self) -> Duration {
        Duration::from_millis(self.settle_medium_ms)
    }

    fn settle_long(&self) -> Duration {
        Duration::from_millis(self.settle_long_ms)
    }

    fn probe_zero_settle(&self) -> Duration {
        Duration::from_secs(self.probe_zero_settle_s)
    }
}

/// The A/G gain of the magnet circuit.
///
/// This is the only state that survives between ramps. The caller owns it and hands it to
/// [`ramp_field`] and [`adjust_field`], which rescale it in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    current_per_gauss: f64,
}

impl Calibration {
    /// Create a calibration from a gain in A/G.
    pub fn new(current_per_gauss: f64) -> Self {
        Calibration { current_per_gauss }
    }

    /// The gain in A/G.
    pub fn current_per_gauss(&self) -> f64 {
        self.current_per_gauss
    }

    /// The current in A expected to produce `gauss`.
    pub fn current_for(&self, gauss: f64) -> f64 {
        gauss * self.current_per_gauss
    }
}

/// Bookkeeping of one ramp invocation.
#[derive(Debug, Clone, Copy)]
struct RampState {
    setpoint: f64,
    measured: f64,
    step_count: usize,
    match_streak: usize,
}

/// Ramp the magnet to `target` gauss and return the final field reading.
///
/// 1. The calibrated current must lie between zero and the ceiling before any supply call.
/// 2. If the supply output is off, the probe is zeroed and given time to settle, then the
///    output is switched on at zero current.
/// 3. The current is ramped linearly in half-ampere steps.
/// 4. The field is read until three consecutive readings are within tolerance, rescaling the
///    calibration through [`adjust_field`] whenever a reading is off.
///
/// Targets below the off threshold switch the magnet off once the field is stable. A zero target
/// is not stabilized; the field is read once after the ramp.
pub fn ramp_field<S, P, C>(
    target: f64,
    calibration: &mut Calibration,
    sensor: &mut S,
    supply: &mut P,
    clock: &C,
    settings: &FieldRampSettings,
) -> Result<f64, RampError>
where
    S: FieldSensor + ?Sized,
    P: MagnetSupply + ?Sized,
    C: Clock + ?Sized,
{
    let setpoint = calibration.current_for(target);
    check_current(setpoint, settings.max_current)?;

    let output_on = supply.output().map_err(RampError::HardwareNotConnected)?;
    if !output_on {
        info!("Magnet supply is off, zeroing the probe before switching it on");
        sensor.zero_probe()?;
        clock.sleep(settings.probe_zero_settle());
        switch_on(supply, settings.voltage_limit).map_err(RampError::HardwareNotConnected)?;
    }

    let start = supply
        .measured_current()?
        .as_amperes()
        .max(0.0)
        .min(settings.max_current);
    let steps = (STEPS_PER_AMP * (setpoint - start).abs()).round() as usize;
    debug!("Ramping magnet from {start:.3} A to {setpoint:.3} A in {steps} steps");
    for current in linspace(start, setpoint, steps) {
        supply.set_current_limit(Current::from_amperes(current))?;
        clock.sleep(settings.settle_short());
    }
    if steps > LONG_SETTLE_AFTER_STEPS {
        clock.sleep(settings.settle_long());
    }

    // Rescaling against a zero target would collapse the calibration to zero.
    let measured = if target > 0.0 {
        let state = RampState {
            setpoint,
            measured: f64::NAN,
            step_count: steps,
            match_streak: 0,
        };
        stabilize(target, state, calibration, sensor, supply, clock, settings)?
    } else {
        sensor.read_field()?
    };

    if target < settings.off_threshold_gauss {
        info!("Target of {target:.2} G is below the off threshold, switching the magnet off");
        supply.set_current_limit(Current::from_amperes(0.0))?;
        supply.set_output(false)?;
    }
    Ok(measured)
}

fn stabilize<S, P, C>(
    target: f64,
    mut state: RampState,
    calibration: &mut Calibration,
    sensor: &mut S,
    supply: &mut P,
    clock: &C,
    settings: &FieldRampSettings,
) -> Result<f64, RampError>
where
    S: FieldSensor + ?Sized,
    P: MagnetSupply + ?Sized,
    C: Clock + ?Sized,
{
    for attempt in 1..=settings.max_tries {
        clock.sleep(settings.settle_short());
        state.measured = sensor.read_field()?;
        let error = (state.measured - target).abs();
        debug!(
            "Stabilization try {attempt}: {:.2} G (target {target:.2} G, {:.3} A after {} ramp steps)",
            state.measured, state.setpoint, state.step_count
        );
        if error > settings.coarse_tolerance_gauss {
            clock.sleep(settings.settle_medium());
        }
        if error > settings.tolerance_gauss {
            adjust_field(target, calibration, sensor, supply, settings)?;
            state.setpoint = calibration.current_for(target);
            state.match_streak = 0;
        } else {
            state.match_streak += 1;
            if state.match_streak >= REQUIRED_MATCHES {
                info!("Field stable at {:.2} G", state.measured);
                return Ok(state.measured);
            }
        }
    }
    Err(RampError::StabilizationTimeout {
        target,
        measured: state.measured,
        tries: settings.max_tries,
    })
}

/// Rescale the calibration by the ratio of wanted to measured field and apply it.
///
/// The calibration is left untouched if the reading is unusable or the rescaled current would
/// exceed the ceiling. Returns the reading that was used.
pub fn adjust_field<S, P>(
    target: f64,
    calibration: &mut Calibration,
    sensor: &mut S,
    supply: &mut P,
    settings: &FieldRampSettings,
) -> Result<f64, RampError>
where
    S: FieldSensor + ?Sized,
    P: MagnetSupply + ?Sized,
{
    let measured = sensor.read_field()?;
    if !measured.is_finite() || measured <= 0.0 {
        return Err(RampError::InvalidFieldReading(measured));
    }
    let rescaled = Calibration::new(calibration.current_per_gauss * (target / measured));
    let setpoint = rescaled.current_for(target);
    check_current(setpoint, settings.max_current)?;

    if rescaled != *calibration {
        info!(
            "Recalibrated magnet: {:.6} A/G -> {:.6} A/G ({measured:.2} G read for {target:.2} G)",
            calibration.current_per_gauss, rescaled.current_per_gauss
        );
    }
    *calibration = rescaled;
    supply.set_current_limit(Current::from_amperes(setpoint))?;
    Ok(measured)
}

fn check_current(requested: f64, limit: f64) -> Result<(), RampError> {
    // Also rejects NaN.
    if !(0.0..=limit).contains(&requested) {
        return Err(RampError::SafetyLimitExceeded { requested, limit });
    }
    Ok(())
}

fn switch_on<P: MagnetSupply + ?Sized>(
    supply: &mut P,
    voltage_limit: f64,
) -> Result<(), InstrumentError> {
    supply.set_voltage_limit(Voltage::from_volts(voltage_limit))?;
    supply.set_output(true)?;
    supply.set_current_limit(Current::from_amperes(0.0))
}

/// `num` evenly spaced values from `start` to `stop` inclusive.
fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| if i == num - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}
