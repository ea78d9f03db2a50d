//! Hardware serial port channel.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{Capabilities, Channel, ChannelError};
use crate::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};

/// Default timeout for serial port operations
const DEFAULT_TIMEOUT_MS: u64 = 10;

/// Read chunk size per drain iteration
const READ_CHUNK: usize = 4096;

pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    flow_control: FlowControl,
}

impl SerialChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            port: None,
            name: name.into(),
            flow_control: FlowControl::None,
        }
    }

    /// Internal helper to open the port
    fn open_port(path: &str, config: &SerialConfig) -> Result<Box<dyn SerialPort>, ChannelError> {
        let open_err = |source: io::Error| ChannelError::Open {
            port: path.to_string(),
            source,
        };

        let data_bits = match config.data_bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
            StopBits::OneAndHalf => {
                return Err(open_err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "1.5 stop bits are not supported",
                )));
            }
        };
        let parity = match config.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
            other => {
                return Err(open_err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{} parity is not supported", other),
                )));
            }
        };
        let flow_control = match config.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
        };

        serialport::new(path, config.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .map_err(|e| open_err(io::Error::from(e)))
    }
}

impl Channel for SerialChannel {
    fn open(&mut self, config: &SerialConfig) -> Result<(), ChannelError> {
        if self.port.is_some() {
            return Err(ChannelError::Open {
                port: self.name.clone(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "the port has been opened"),
            });
        }
        let port = Self::open_port(&self.name, config)?;
        self.port = Some(port);
        self.flow_control = config.flow_control;
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let port = self.port.as_mut().ok_or(ChannelError::NotOpen)?;
        port.write(data).map_err(ChannelError::Write)
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, ChannelError> {
        let port = self.port.as_mut().ok_or(ChannelError::NotOpen)?;
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;

        loop {
            // Check if any bytes are available before blocking on read
            match port.bytes_to_read() {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) if total > 0 => break,
                Err(_) => {} // Can't check, fall through to read with timeout
            }

            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(ChannelError::Read(e)),
            }
        }
        Ok(total)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            flow_control_lines: true,
        }
    }

    fn hardware_flow_control(&self) -> bool {
        self.flow_control == FlowControl::Hardware
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), ChannelError> {
        let port = self.port.as_mut().ok_or(ChannelError::NotOpen)?;
        port.write_data_terminal_ready(level)
            .map_err(|e| ChannelError::Write(io::Error::from(e)))
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), ChannelError> {
        if self.hardware_flow_control() {
            return Err(ChannelError::Unsupported("RTS under hardware flow control"));
        }
        let port = self.port.as_mut().ok_or(ChannelError::NotOpen)?;
        port.write_request_to_send(level)
            .map_err(|e| ChannelError::Write(io::Error::from(e)))
    }
}
