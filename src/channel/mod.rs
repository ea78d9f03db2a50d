//! Byte channels the terminal can talk through.
//!
//! A channel is a raw byte pipe. Optional features such as the modem
//! control lines are advertised through [`Capabilities`] instead of
//! checking the concrete type.

use std::io;

use crate::config::SerialConfig;

mod enumerate;
mod memory;
mod serial;

pub use enumerate::{PortInfo, available_ports};
pub use memory::{MemoryChannel, MemoryHandle};
pub use serial::SerialChannel;

/// Optional features a channel supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// DTR/RTS can be driven by the user
    pub flow_control_lines: bool,
}

pub trait Channel {
    /// Open the channel. Opening an already open channel is an error.
    fn open(&mut self, config: &SerialConfig) -> Result<(), ChannelError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Hand bytes to the channel without waiting for transmission.
    /// Returns how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError>;

    /// Append every byte that is available right now to `buf`.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ChannelError>;

    /// Display name of the remote end (port path or address)
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn hardware_flow_control(&self) -> bool {
        false
    }

    fn set_data_terminal_ready(&mut self, _level: bool) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported("DTR"))
    }

    fn set_request_to_send(&mut self, _level: bool) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported("RTS"))
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn open(&mut self, config: &SerialConfig) -> Result<(), ChannelError> {
        (**self).open(config)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        (**self).write(data)
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ChannelError> {
        (**self).read_available(buf)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn hardware_flow_control(&self) -> bool {
        (**self).hardware_flow_control()
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), ChannelError> {
        (**self).set_data_terminal_ready(level)
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), ChannelError> {
        (**self).set_request_to_send(level)
    }
}

#[derive(Debug)]
pub enum ChannelError {
    Open {
        port: String,
        source: io::Error,
    },
    Write(io::Error),
    Read(io::Error),
    NotOpen,
    Unsupported(&'static str),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Open { port, source } => {
                write!(f, "cannot open port '{}': {}", port, source)
            }
            ChannelError::Write(e) => write!(f, "write error: {}", e),
            ChannelError::Read(e) => write!(f, "read error: {}", e),
            ChannelError::NotOpen => write!(f, "no port is opened"),
            ChannelError::Unsupported(what) => write!(f, "{} is not supported by this channel", what),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Open { source, .. } => Some(source),
            ChannelError::Write(e) => Some(e),
            ChannelError::Read(e) => Some(e),
            ChannelError::NotOpen | ChannelError::Unsupported(_) => None,
        }
    }
}
