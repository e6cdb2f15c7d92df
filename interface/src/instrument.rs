//! Generic [`InstrumentInterface`] implementation over any byte stream.

use std::time::Duration;

use crate::{InstrumentError, InstrumentInterface};

/// An instrument interface built from any port that implements [`std::io::Read`] and
/// [`std::io::Write`], e.g., a [`std::net::TcpStream`] or a boxed serial port.
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use odnp_interface::Instrument;
///
/// let stream = TcpStream::connect("192.168.1.30:5025").unwrap();
/// let meter = Instrument::new(stream, Duration::from_secs(3));
/// ```
pub struct Instrument<P: std::io::Read + std::io::Write> {
    port: P,
    terminator: String,
    timeout: Duration,
}

impl<P: std::io::Read + std::io::Write> Instrument<P> {
    /// Wrap a port. The terminator defaults to `"\n"`.
    pub fn new(port: P, timeout: Duration) -> Self {
        Self {
            port,
            terminator: "\n".to_string(),
            timeout,
        }
    }
}

impl<P: std::io::Read + std::io::Write> InstrumentInterface for Instrument<P> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        self.port.read_exact(buf)?;
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }
}
