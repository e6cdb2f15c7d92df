//! The TCP command loop.
//!
//! One client is served at a time. Commands arrive as newline-terminated ASCII lines, possibly
//! several per read. While the log is active the socket is polled with a short timeout and every
//! timeout takes one log sample.

use std::{
    io::{self, ErrorKind, Read, Write},
    net::{TcpListener, TcpStream},
    time::Duration,
};

use log::{debug, info, warn};
use measurements::Frequency;
use odnp_interface::InstrumentError;

use crate::{
    clock::{Clock, SystemClock},
    command::{Command, LineBuffer},
    config::ServerConfig,
    error::ServerError,
    field_ramp::{Calibration, ramp_field},
    hardware::Hardware,
    log_session::{LogSession, SampleRecord},
    power_ramp::PowerRamp,
};

/// A client connection the command loop can read from and answer on.
pub trait Connection: Read + Write {
    /// Set the read timeout. `None` blocks until data arrives.
    fn set_poll_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn set_poll_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// What to send back for a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Nothing.
    None,
    /// One line, the newline is appended when sending.
    Text(String),
    /// A drained log.
    Binary(Vec<u8>),
    /// Nothing, and the connection is closed.
    Close,
}

/// The command server: owns the hardware, the magnet calibration and the log.
pub struct CommandServer<C: Clock = SystemClock> {
    hardware: Hardware,
    config: ServerConfig,
    calibration: Calibration,
    log: LogSession,
    clock: C,
}

impl<C: Clock> CommandServer<C> {
    pub fn new(hardware: Hardware, config: ServerConfig, clock: C) -> Self {
        let calibration = Calibration::new(config.field.current_per_gauss);
        CommandServer {
            hardware,
            config,
            calibration,
            log: LogSession::new(),
            clock,
        }
    }

    /// The current magnet calibration.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn log(&self) -> &LogSession {
        &self.log
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Serve clients one after another, forever.
    ///
    /// A failing connection is logged and dropped. Only a failing `accept` ends the loop.
    pub fn serve(&mut self, listener: &TcpListener) -> io::Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        loop {
            self.accept_one(listener)?;
        }
    }

    /// Accept one client and serve it until it disconnects or sends `CLOSE`.
    pub fn accept_one(&mut self, listener: &TcpListener) -> io::Result<()> {
        let (mut stream, peer) = listener.accept()?;
        info!("Client connected from {peer}");
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle's algorithm for {peer}: {e}");
        }
        match self.handle_connection(&mut stream) {
            Ok(()) => info!("Client {peer} disconnected"),
            Err(e) => warn!("Connection to {peer} failed: {e}"),
        }
        Ok(())
    }

    /// Run the command loop on one connection.
    ///
    /// Returns once the peer hangs up or sends `CLOSE`. Errors of a command are answered with an
    /// `ERROR` line and do not end the connection, only I/O errors on the connection do.
    pub fn handle_connection<S: Connection>(&mut self, conn: &mut S) -> io::Result<()> {
        let mut ramp = PowerRamp::new(self.config.power.clone());
        let mut lines = LineBuffer::new();
        let mut chunk = vec![0u8; self.config.server.read_chunk];

        loop {
            let timeout = self
                .log
                .is_active()
                .then(|| self.config.server.idle_poll());
            conn.set_poll_timeout(timeout)?;

            let n = match conn.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if self.log.is_active() {
                        self.idle_sample();
                    }
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            conn.set_poll_timeout(None)?;

            for line in lines.push(&chunk[..n]) {
                if line.is_empty() {
                    continue;
                }
                match self.handle_line(&line, &mut ramp) {
                    Ok(Reply::None) => {}
                    Ok(Reply::Text(text)) => conn.write_all(format!("{text}\n").as_bytes())?,
                    Ok(Reply::Binary(bytes)) => conn.write_all(&bytes)?,
                    Ok(Reply::Close) => {
                        conn.flush()?;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Command {line:?} failed: {e}");
                        conn.write_all(format!("ERROR {e}\n").as_bytes())?;
                        lines.clear();
                        break;
                    }
                }
            }
            conn.flush()?;
        }
    }

    /// Parse and execute one line. Lines that do not parse are answered with an error and are
    /// not logged as samples.
    fn handle_line(&mut self, line: &str, ramp: &mut PowerRamp) -> Result<Reply, ServerError> {
        let command: Command = line.parse()?;
        info!("Executing {command}");
        if self.log.is_active() {
            if let Err(e) = self.record_sample(Some(line.to_string())) {
                warn!("Could not log a sample for {line:?}: {e}");
            }
        }
        self.execute(command, ramp)
    }

    /// Execute one command.
    ///
    /// `ramp` carries the microwave state of the connection the command came from.
    pub fn execute(
        &mut self,
        command: Command,
        ramp: &mut PowerRamp,
    ) -> Result<Reply, ServerError> {
        match command {
            Command::Close => {
                self.microwave_off(ramp)?;
                Ok(Reply::Close)
            }
            Command::GetPower => {
                let dbm = self.hardware.meter.read_meter_power()?;
                Ok(Reply::Text(format!("{dbm:.1}")))
            }
            Command::MwOff => {
                self.microwave_off(ramp)?;
                Ok(Reply::None)
            }
            Command::StartLog => {
                self.log.start();
                Ok(Reply::None)
            }
            Command::StopLog => {
                let samples = self.log.len();
                let blob = self.log.stop()?;
                debug!("Sending log with {samples} samples ({} bytes)", blob.len());
                Ok(Reply::Binary(blob))
            }
            Command::GetField => {
                let gauss = self.hardware.sensor.read_field()?;
                Ok(Reply::Text(format!("{gauss:.2}")))
            }
            Command::SetPower(dbm) => {
                let report = ramp.set_power(dbm, self.hardware.source.as_mut(), &self.clock)?;
                if !report.settled() {
                    warn!(
                        "Power ramp to {dbm:.1} dBm left {} step(s) unsettled",
                        report.unsettled.len()
                    );
                }
                Ok(Reply::Text(format!("{:.1}", report.final_power)))
            }
            Command::SetFreq(mhz) => {
                self.check_frequency_interlock()?;
                self.hardware
                    .source
                    .set_frequency(Frequency::from_megahertz(mhz))?;
                Ok(Reply::None)
            }
            Command::SetField(gauss) => {
                let field = ramp_field(
                    gauss,
                    &mut self.calibration,
                    self.hardware.sensor.as_mut(),
                    self.hardware.supply.as_mut(),
                    &self.clock,
                    &self.config.field,
                )?;
                Ok(Reply::Text(format!("{field:.2}")))
            }
            Command::DipLock(start, stop) => {
                let dip = self.hardware.source.lock_dip(
                    Frequency::from_gigahertz(start),
                    Frequency::from_gigahertz(stop),
                )?;
                info!("Locked onto dip at {:.3} MHz", dip.as_megahertz());
                Ok(Reply::Text(format!("{:.0}", dip.as_hertz())))
            }
        }
    }

    fn microwave_off(&mut self, ramp: &mut PowerRamp) -> Result<(), InstrumentError> {
        self.hardware.source.set_rf(false)?;
        self.hardware.source.set_amplifier(false)?;
        ramp.reset();
        Ok(())
    }

    fn check_frequency_interlock(&mut self) -> Result<(), ServerError> {
        if !self.hardware.source.rf_enabled()? {
            return Err(ServerError::Interlock(
                "microwave output is not enabled".to_string(),
            ));
        }
        let dbm = self.hardware.source.read_power()?;
        let limit = self.config.power.freq_change_max_dbm;
        if dbm > limit {
            return Err(ServerError::Interlock(format!(
                "power is {dbm:.1} dBm, must be at most {limit:.1} dBm"
            )));
        }
        Ok(())
    }

    fn idle_sample(&mut self) {
        if let Err(e) = self.record_sample(None) {
            warn!("Idle log sample failed: {e}");
        }
    }

    fn record_sample(&mut self, command: Option<String>) -> Result<(), InstrumentError> {
        let reflected_power = self.hardware.source.reflected_power()?;
        let forward_power = self.hardware.source.forward_power()?;
        self.log.add(SampleRecord {
            timestamp: self.clock.now(),
            reflected_power,
            forward_power,
            command,
        });
        Ok(())
    }
}
