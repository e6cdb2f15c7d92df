//! Blocking TCP/IP transport, used for the LXI instruments (supply, power meter).

use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;

use crate::{Instrument, InstrumentError};

/// Constructors for an [`Instrument`] talking over a [`TcpStream`].
#[derive(Debug)]
pub struct TcpIpInterface {}

impl TcpIpInterface {
    /// Connect with a read/write timeout of three seconds.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address of the instrument, e.g. `"192.168.1.20:5025"`.
    pub fn simple<A: ToSocketAddrs>(sock_addr: A) -> Result<Instrument<TcpStream>, InstrumentError> {
        Self::full(sock_addr, Duration::from_secs(3))
    }

    /// Connect with a custom read/write timeout.
    ///
    /// A timeout is always set on the stream: a blocking read without one could hang the
    /// command server forever if an instrument stops answering.
    pub fn full<A: ToSocketAddrs>(
        sock_addr: A,
        timeout: Duration,
    ) -> Result<Instrument<TcpStream>, InstrumentError> {
        let stream = TcpStream::connect(sock_addr)?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!("Connected to instrument at {:?}", stream.peer_addr()?);
        Ok(Instrument::new(stream, timeout))
    }
}
