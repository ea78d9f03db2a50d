//! In-process channel used for loopback mode and tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use super::{Capabilities, Channel, ChannelError};
use crate::config::SerialConfig;

#[derive(Debug, Default)]
struct Shared {
    open: bool,
    loopback: bool,
    fail_open: bool,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    read_error: Option<io::ErrorKind>,
    dtr: bool,
    rts: bool,
}

/// Channel backed by memory. Clone a [`MemoryHandle`] to feed it from outside.
pub struct MemoryChannel {
    name: String,
    shared: Rc<RefCell<Shared>>,
}

/// Test/driver side of a [`MemoryChannel`]
#[derive(Clone)]
pub struct MemoryHandle {
    shared: Rc<RefCell<Shared>>,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>) -> (Self, MemoryHandle) {
        let shared = Rc::new(RefCell::new(Shared::default()));
        let channel = Self {
            name: name.into(),
            shared: Rc::clone(&shared),
        };
        (channel, MemoryHandle { shared })
    }

    /// A channel that echoes everything written back as received data
    pub fn loopback(name: impl Into<String>) -> (Self, MemoryHandle) {
        let (channel, handle) = Self::new(name);
        handle.shared.borrow_mut().loopback = true;
        (channel, handle)
    }
}

impl MemoryHandle {
    /// Queue bytes as if they arrived from the remote end
    pub fn inject(&self, data: &[u8]) {
        self.shared.borrow_mut().inbound.extend(data);
    }

    /// Take everything written to the channel so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.shared.borrow_mut().written)
    }

    /// Make the next read fail with the given error kind
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.shared.borrow_mut().read_error = Some(kind);
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.shared.borrow_mut().fail_open = refuse;
    }

    pub fn is_open(&self) -> bool {
        self.shared.borrow().open
    }

    pub fn lines(&self) -> (bool, bool) {
        let shared = self.shared.borrow();
        (shared.dtr, shared.rts)
    }
}

impl Channel for MemoryChannel {
    fn open(&mut self, _config: &SerialConfig) -> Result<(), ChannelError> {
        let mut shared = self.shared.borrow_mut();
        if shared.open || shared.fail_open {
            let reason = if shared.open {
                "the port has been opened"
            } else {
                "device refused the connection"
            };
            return Err(ChannelError::Open {
                port: self.name.clone(),
                source: io::Error::other(reason),
            });
        }
        shared.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.shared.borrow_mut().open = false;
    }

    fn is_open(&self) -> bool {
        self.shared.borrow().open
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let mut shared = self.shared.borrow_mut();
        if !shared.open {
            return Err(ChannelError::NotOpen);
        }
        shared.written.extend_from_slice(data);
        if shared.loopback {
            shared.inbound.extend(data);
        }
        Ok(data.len())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ChannelError> {
        let mut shared = self.shared.borrow_mut();
        if !shared.open {
            return Err(ChannelError::NotOpen);
        }
        if let Some(kind) = shared.read_error.take() {
            return Err(ChannelError::Read(io::Error::new(kind, "injected read failure")));
        }
        let n = shared.inbound.len();
        buf.extend(shared.inbound.drain(..));
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            flow_control_lines: true,
        }
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), ChannelError> {
        self.shared.borrow_mut().dtr = level;
        Ok(())
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), ChannelError> {
        self.shared.borrow_mut().rts = level;
        Ok(())
    }
}
