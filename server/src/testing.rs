//! Scripted instruments and a recording clock for the unit tests.
//!
//! All mocks of one test share a [`Journal`] so that the order of calls across instruments and
//! sleeps can be asserted.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Read, Write},
    rc::Rc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use measurements::{Current, Frequency, Voltage};
use odnp_interface::InstrumentError;

use crate::{
    clock::{Clock, ManualClock},
    facade::{FieldSensor, MagnetSupply, MicrowaveSource, PowerSensor},
    server::Connection,
};

pub(crate) type Journal = Rc<RefCell<Vec<Event>>>;

pub(crate) fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

/// Instrument commands and sleeps, in the order they happened. Reads are not journaled.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    ZeroProbe,
    Sleep(Duration),
    VoltageLimit(f64),
    Output(bool),
    CurrentLimit(f64),
    Waveguide(bool),
    Rf(bool),
    Amplifier(bool),
    SetPower(f64),
    /// In MHz.
    Frequency(f64),
    /// Window in GHz.
    LockDip(f64, f64),
}

fn broken_pipe() -> InstrumentError {
    InstrumentError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "mock failure"))
}

/// A field sensor that plays back a list of readings and then repeats the last one.
pub(crate) struct ScriptedSensor {
    readings: VecDeque<f64>,
    last: f64,
    reads: usize,
    journal: Journal,
}

impl ScriptedSensor {
    pub(crate) fn new(readings: Vec<f64>, journal: &Journal) -> Self {
        ScriptedSensor {
            last: readings.last().copied().unwrap_or(0.0),
            readings: readings.into(),
            reads: 0,
            journal: journal.clone(),
        }
    }

    pub(crate) fn constant(reading: f64, journal: &Journal) -> Self {
        ScriptedSensor::new(vec![reading], journal)
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads
    }
}

impl FieldSensor for ScriptedSensor {
    fn read_field(&mut self) -> Result<f64, InstrumentError> {
        self.reads += 1;
        Ok(self.readings.pop_front().unwrap_or(self.last))
    }

    fn zero_probe(&mut self) -> Result<(), InstrumentError> {
        self.journal.borrow_mut().push(Event::ZeroProbe);
        Ok(())
    }
}

/// A magnet supply that remembers every current it was given.
pub(crate) struct MockSupply {
    on: bool,
    current: f64,
    history: Vec<f64>,
    queries: usize,
    fail_output: bool,
    journal: Journal,
}

impl MockSupply {
    pub(crate) fn new(on: bool, journal: &Journal) -> Self {
        MockSupply {
            on,
            current: 0.0,
            history: Vec::new(),
            queries: 0,
            fail_output: false,
            journal: journal.clone(),
        }
    }

    pub(crate) fn with_current(mut self, amperes: f64) -> Self {
        self.current = amperes;
        self
    }

    /// Make switching the output fail.
    pub(crate) fn failing_output(mut self) -> Self {
        self.fail_output = true;
        self
    }

    pub(crate) fn current_history(&self) -> Vec<f64> {
        self.history.clone()
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on
    }

    /// Number of state queries (output and current readback).
    pub(crate) fn queries(&self) -> usize {
        self.queries
    }
}

impl MagnetSupply for MockSupply {
    fn output(&mut self) -> Result<bool, InstrumentError> {
        self.queries += 1;
        Ok(self.on)
    }

    fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        if self.fail_output {
            return Err(broken_pipe());
        }
        self.journal.borrow_mut().push(Event::Output(on));
        self.on = on;
        Ok(())
    }

    fn set_voltage_limit(&mut self, limit: Voltage) -> Result<(), InstrumentError> {
        self.journal
            .borrow_mut()
            .push(Event::VoltageLimit(limit.as_volts()));
        Ok(())
    }

    fn set_current_limit(&mut self, limit: Current) -> Result<(), InstrumentError> {
        let amperes = limit.as_amperes();
        self.journal.borrow_mut().push(Event::CurrentLimit(amperes));
        self.history.push(amperes);
        self.current = amperes;
        Ok(())
    }

    fn measured_current(&mut self) -> Result<Current, InstrumentError> {
        self.queries += 1;
        Ok(Current::from_amperes(self.current))
    }
}

/// A microwave source whose readback reaches the commanded power after a number of polls.
pub(crate) struct MockSource {
    rf: bool,
    pending: Option<f64>,
    readback: f64,
    lag: usize,
    countdown: usize,
    shortfall: f64,
    dip: f64,
    fail_detector: bool,
    journal: Journal,
}

impl MockSource {
    pub(crate) fn new(readback: f64, journal: &Journal) -> Self {
        MockSource {
            rf: false,
            pending: None,
            readback,
            lag: 0,
            countdown: 0,
            shortfall: 0.0,
            dip: 9_400.0,
            fail_detector: false,
            journal: journal.clone(),
        }
    }

    pub(crate) fn with_rf(mut self, on: bool) -> Self {
        self.rf = on;
        self
    }

    /// Polls before the readback follows a new setpoint.
    pub(crate) fn with_lag(mut self, polls: usize) -> Self {
        self.lag = polls;
        self
    }

    /// The readback settles this many dB below the setpoint.
    pub(crate) fn with_shortfall(mut self, db: f64) -> Self {
        self.shortfall = db;
        self
    }

    /// Make the detector reads used by the log fail.
    pub(crate) fn with_failing_detector(mut self) -> Self {
        self.fail_detector = true;
        self
    }
}

impl MicrowaveSource for MockSource {
    fn set_waveguide(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.journal.borrow_mut().push(Event::Waveguide(on));
        Ok(())
    }

    fn set_rf(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.journal.borrow_mut().push(Event::Rf(on));
        self.rf = on;
        Ok(())
    }

    fn rf_enabled(&mut self) -> Result<bool, InstrumentError> {
        Ok(self.rf)
    }

    fn set_amplifier(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.journal.borrow_mut().push(Event::Amplifier(on));
        Ok(())
    }

    fn set_power(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.journal.borrow_mut().push(Event::SetPower(dbm));
        self.pending = Some(dbm);
        self.countdown = self.lag;
        Ok(())
    }

    fn read_power(&mut self) -> Result<f64, InstrumentError> {
        if let Some(target) = self.pending {
            if self.countdown > 0 {
                self.countdown -= 1;
            } else {
                self.readback = target - self.shortfall;
                self.pending = None;
            }
        }
        Ok(self.readback)
    }

    fn set_frequency(&mut self, freq: Frequency) -> Result<(), InstrumentError> {
        self.journal
            .borrow_mut()
            .push(Event::Frequency(freq.as_megahertz()));
        Ok(())
    }

    fn lock_dip(
        &mut self,
        start: Frequency,
        stop: Frequency,
    ) -> Result<Frequency, InstrumentError> {
        self.journal
            .borrow_mut()
            .push(Event::LockDip(start.as_gigahertz(), stop.as_gigahertz()));
        let dip = self
            .dip
            .clamp(start.as_megahertz(), stop.as_megahertz());
        Ok(Frequency::from_megahertz(dip))
    }

    fn reflected_power(&mut self) -> Result<f64, InstrumentError> {
        if self.fail_detector {
            return Err(broken_pipe());
        }
        Ok(12.5)
    }

    fn forward_power(&mut self) -> Result<f64, InstrumentError> {
        if self.fail_detector {
            return Err(broken_pipe());
        }
        Ok(250.0)
    }
}

/// A power meter with a fixed reading.
pub(crate) struct MockMeter {
    pub(crate) dbm: f64,
}

impl PowerSensor for MockMeter {
    fn read_meter_power(&mut self) -> Result<f64, InstrumentError> {
        Ok(self.dbm)
    }
}

/// A [`ManualClock`] that also journals its sleeps.
pub(crate) struct JournalClock {
    inner: ManualClock,
    journal: Journal,
}

impl JournalClock {
    pub(crate) fn new(journal: &Journal) -> Self {
        JournalClock {
            inner: ManualClock::default(),
            journal: journal.clone(),
        }
    }
}

impl Clock for JournalClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.journal.borrow_mut().push(Event::Sleep(duration));
        self.inner.sleep(duration)
    }
}

/// One read of a [`MockConnection`].
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// The client sends these bytes.
    Data(&'static [u8]),
    /// The poll timeout expires without data.
    Idle,
}

/// A client connection that plays back a script of reads and then hangs up.
pub(crate) struct MockConnection {
    script: VecDeque<Step>,
    timeout: Option<Duration>,
    pub(crate) written: Vec<u8>,
}

impl MockConnection {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        MockConnection {
            script: script.into(),
            timeout: None,
            written: Vec::new(),
        }
    }

    pub(crate) fn output(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Read for MockConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script.pop_front() {
            None => Ok(0),
            Some(Step::Data(bytes)) => {
                assert!(bytes.len() <= buf.len(), "Scripted read does not fit the buffer");
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            Some(Step::Idle) => {
                assert!(
                    self.timeout.is_some(),
                    "Idle step scripted while the server reads without timeout"
                );
                Err(io::ErrorKind::WouldBlock.into())
            }
        }
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConnection {
    fn set_poll_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}
