//! Scripted interface for testing instrument drivers without hardware.

use std::collections::VecDeque;

use crate::{InstrumentError, InstrumentInterface};

/// A self-incrementing index that starts at 0.
#[derive(Debug, Default)]
struct IncrIndex {
    index: usize,
}

impl IncrIndex {
    fn next(&mut self) -> usize {
        let current = self.index;
        self.index += 1;
        current
    }
}

/// An interface that plays back a scripted conversation with an instrument.
///
/// `from_host` lists every line the driver is expected to send, in order, and `from_inst` the
/// lines the instrument answers with. Sending an unexpected line panics, and so does dropping
/// the interface while scripted lines are left over. A test therefore fails if the driver sends
/// anything other than exactly the scripted traffic.
///
/// ```
/// use odnp_interface::{InstrumentInterface, LoopbackInterface};
///
/// let mut lbk = LoopbackInterface::new(vec!["MEAS?"], vec!["-12.5"], "\n");
/// assert_eq!(lbk.query_f64("MEAS?").unwrap(), -12.5);
/// ```
pub struct LoopbackInterface {
    from_host: Vec<String>,
    from_inst: Vec<String>,
    terminator_exp: String,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: VecDeque<u8>,
    terminator: String,
}

impl LoopbackInterface {
    /// Create a loopback interface from the expected traffic.
    ///
    /// # Arguments
    /// * `from_host` - Lines from host to instrument, without terminator.
    /// * `from_inst` - Lines from instrument to host, without terminator.
    /// * `terminator_exp` - The terminator the driver is expected to configure.
    pub fn new<S: ToString>(from_host: Vec<S>, from_inst: Vec<S>, terminator_exp: &str) -> Self {
        LoopbackInterface {
            from_host: from_host.iter().map(|s| s.to_string()).collect(),
            from_inst: from_inst.iter().map(|s| s.to_string()).collect(),
            terminator_exp: terminator_exp.to_string(),
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: VecDeque::new(),
            terminator: "\n".to_string(),
        }
    }

    /// Panic if any scripted line has not been consumed.
    ///
    /// Called automatically on drop, unless the thread is already panicking.
    pub fn finalize(&mut self) {
        if let Some(fil) = self.from_host.get(self.from_host_index.index) {
            panic!("Leftover expected commands found from host to instrument: {fil}");
        }
        if let Some(fil) = self.from_inst.get(self.from_inst_index.index) {
            panic!("Leftover expected commands found from instrument to host: {fil}");
        }
        if !self.curr_bytes.is_empty() {
            panic!(
                "Partially read response left over: {:?}",
                String::from_utf8_lossy(self.curr_bytes.make_contiguous())
            );
        }
    }

    fn get_next_from_host(&mut self) -> String {
        let line = self
            .from_host
            .get(self.from_host_index.next())
            .expect("No more commands were expected from host to instrument.");
        format!("{line}{}", self.terminator_exp)
    }

    fn get_next_from_inst(&mut self) -> String {
        let line = self
            .from_inst
            .get(self.from_inst_index.next())
            .expect("No more responses were scripted from instrument to host.");
        format!("{line}{}", self.terminator_exp)
    }

    fn read_one_byte(&mut self) -> u8 {
        match self.curr_bytes.pop_front() {
            Some(byte) => byte,
            None => {
                self.curr_bytes = self.get_next_from_inst().into_bytes().into();
                self.read_one_byte()
            }
        }
    }
}

impl InstrumentInterface for LoopbackInterface {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        for byte in buf.iter_mut() {
            *byte = self.read_one_byte();
        }
        Ok(())
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let exp = self.get_next_from_host();
        assert_eq!(
            exp.as_bytes(),
            data,
            "Expected sendcmd {exp:?}, got {:?}",
            String::from_utf8_lossy(data)
        );
        Ok(())
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }
}

impl Drop for LoopbackInterface {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.finalize();
        }
    }
}
