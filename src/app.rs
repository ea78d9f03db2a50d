use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{info, warn};

use serialtest::buffer::is_hex_text;
use serialtest::channel::{Channel, MemoryChannel, PortInfo, SerialChannel, available_ports};
use serialtest::compose::SuffixKind;
use serialtest::config::{Config, parse_bool};
use serialtest::control::ControlItemSpec;
use serialtest::log::{Direction, TrafficLogger};
use serialtest::pipeline::{Frontend, Pipeline, export_file_name};
use serialtest::prefs::{Preferences, load_port_preference, save_port_preference};

/// UI refresh period
const UI_TICK: Duration = Duration::from_millis(10);
/// How often the channel is drained
const CHANNEL_POLL: Duration = Duration::from_millis(5);

const HELP: &str = "\
Lines not starting with '/' are sent as typed (start with '//' to send a leading '/').
  /open [port]               open the configured or given port
  /close                     close the port
  /hex rx|tx on|off          hex view for received data / hex input for sending
  /follow on|off             keep the receive view at the newest data
  /realtime on|off           update the receive view while data arrives
  /suffix none|crlf|lf       suffix appended to typed messages
  /suffix text <s>|hex <h>   custom suffix
  /encoding [name]           show or change the text encoding
  /repeat [ms]|off           resend the last message periodically
  /clear rx|tx               clear a buffer
  /resync                    redraw the receive view from the buffer
  /dtr on|off, /rts on|off   drive the modem control lines
  /ctrl list|add <record>|remove <n>|send <n>|set <n> <v>|toggle <n>
  /ctrl import <path>|export <path>|clear
  /export rx|tx [path]       save a raw buffer to a file
  /status                    show connection and option state
  /quit                      leave";

/// Helper macro to print status and flush stdout
macro_rules! status {
    ($($arg:tt)*) => {{
        println!($($arg)*);
        let _ = std::io::stdout().flush();
    }};
}

/// Receive view that streams straight to stdout
#[derive(Default)]
pub struct CliFrontend {
    rx_count: usize,
    tx_count: usize,
    plotted: usize,
}

impl Frontend for CliFrontend {
    fn on_decoded_text(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn on_raw_chunk(&mut self, bytes: &[u8]) {
        self.plotted += bytes.len();
    }

    fn on_resync(&mut self, text: &str) {
        if !text.is_empty() {
            status!("\n-- receive view --\n{}", text);
        }
    }

    fn on_sent_text(&mut self, text: &str) {
        status!("> {}", text.trim_end_matches(['\r', '\n']));
    }

    fn on_sent_resync(&mut self, text: &str) {
        if !text.is_empty() {
            status!("-- sent view --\n{}", text);
        }
    }

    fn on_counters(&mut self, rx: usize, tx: usize) {
        self.rx_count = rx;
        self.tx_count = tx;
    }

    fn on_connection_changed(&mut self, open: bool) {
        status!("[{}]", if open { "connected" } else { "disconnected" });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatCommand {
    /// Arm with the given interval, or the saved one
    Start(Option<Duration>),
    Stop,
}

/// Control item commands. Indices are zero-based here, one-based for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtrlCommand {
    List,
    Add(String),
    Remove(usize),
    Send(usize),
    Set(usize, i64),
    Toggle(usize),
    Import(PathBuf),
    Export(PathBuf),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Help,
    Open(Option<String>),
    Close,
    Hex(Direction, bool),
    Follow(bool),
    Realtime(bool),
    /// `None` disables the suffix
    Suffix(Option<(SuffixKind, String)>),
    Encoding(Option<String>),
    Repeat(RepeatCommand),
    Clear(Direction),
    Resync,
    Dtr(bool),
    Rts(bool),
    Ctrl(CtrlCommand),
    Export(Direction, Option<PathBuf>),
    Status,
    Quit,
}

fn split_arg(arg: &str) -> (&str, &str) {
    match arg.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (arg, ""),
    }
}

fn non_empty(arg: &str) -> Option<String> {
    (!arg.is_empty()).then(|| arg.to_string())
}

fn parse_switch(arg: &str) -> Result<bool, String> {
    parse_bool(arg).ok_or_else(|| format!("expected on or off, got '{}'", arg))
}

fn parse_direction(arg: &str) -> Result<Direction, String> {
    match arg.to_lowercase().as_str() {
        "rx" => Ok(Direction::Rx),
        "tx" => Ok(Direction::Tx),
        other => Err(format!("expected rx or tx, got '{}'", other)),
    }
}

fn parse_item(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(format!("invalid item number '{}'", arg)),
    }
}

fn parse_suffix(arg: &str) -> Result<Command, String> {
    let (kind, context) = split_arg(arg);
    let suffix = match kind.to_lowercase().as_str() {
        "none" | "off" => None,
        "crlf" => Some((SuffixKind::CrLf, String::new())),
        "lf" => Some((SuffixKind::Lf, String::new())),
        "text" => Some((SuffixKind::Text, context.to_string())),
        "hex" if is_hex_text(context) => Some((SuffixKind::Hex, context.to_string())),
        "hex" => return Err(format!("'{}' is not valid hex", context)),
        other => return Err(format!("unknown suffix '{}'", other)),
    };
    Ok(Command::Suffix(suffix))
}

fn parse_repeat(arg: &str) -> Result<Command, String> {
    let repeat = match arg.to_lowercase().as_str() {
        "" | "on" => RepeatCommand::Start(None),
        "off" | "stop" => RepeatCommand::Stop,
        ms => {
            let ms = ms
                .parse::<u64>()
                .map_err(|_| format!("invalid interval '{}'", arg))?;
            RepeatCommand::Start(Some(Duration::from_millis(ms)))
        }
    };
    Ok(Command::Repeat(repeat))
}

fn parse_ctrl(arg: &str) -> Result<CtrlCommand, String> {
    let (sub, rest) = split_arg(arg);
    let cmd = match sub {
        "" | "list" => CtrlCommand::List,
        "add" if !rest.is_empty() => CtrlCommand::Add(rest.to_string()),
        "remove" => CtrlCommand::Remove(parse_item(rest)?),
        "send" => CtrlCommand::Send(parse_item(rest)?),
        "toggle" => CtrlCommand::Toggle(parse_item(rest)?),
        "set" => {
            let (item, value) = split_arg(rest);
            let value = value
                .parse::<i64>()
                .map_err(|_| format!("invalid value '{}'", value))?;
            CtrlCommand::Set(parse_item(item)?, value)
        }
        "import" if !rest.is_empty() => CtrlCommand::Import(PathBuf::from(rest)),
        "export" if !rest.is_empty() => CtrlCommand::Export(PathBuf::from(rest)),
        "clear" => CtrlCommand::Clear,
        _ => return Err(format!("invalid /ctrl usage '{}', try /help", arg)),
    };
    Ok(cmd)
}

/// Parse one line of user input
pub fn parse_command(line: &str) -> Result<Command, String> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };
    if rest.starts_with('/') {
        return Ok(Command::Send(rest.to_string()));
    }

    let (name, arg) = split_arg(rest.trim());
    match name {
        "help" | "?" => Ok(Command::Help),
        "open" => Ok(Command::Open(non_empty(arg))),
        "close" => Ok(Command::Close),
        "hex" => {
            let (direction, switch) = split_arg(arg);
            Ok(Command::Hex(parse_direction(direction)?, parse_switch(switch)?))
        }
        "follow" => Ok(Command::Follow(parse_switch(arg)?)),
        "realtime" => Ok(Command::Realtime(parse_switch(arg)?)),
        "suffix" => parse_suffix(arg),
        "encoding" => Ok(Command::Encoding(non_empty(arg))),
        "repeat" => parse_repeat(arg),
        "clear" => Ok(Command::Clear(parse_direction(arg)?)),
        "resync" => Ok(Command::Resync),
        "dtr" => Ok(Command::Dtr(parse_switch(arg)?)),
        "rts" => Ok(Command::Rts(parse_switch(arg)?)),
        "ctrl" => parse_ctrl(arg).map(Command::Ctrl),
        "export" => {
            let (direction, path) = split_arg(arg);
            Ok(Command::Export(
                parse_direction(direction)?,
                non_empty(path).map(PathBuf::from),
            ))
        }
        "status" => Ok(Command::Status),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command /{}, try /help", other)),
    }
}

/// Look up metadata for a port, falling back to its bare name
fn find_port(name: &str) -> PortInfo {
    available_ports()
        .ok()
        .and_then(|ports| ports.into_iter().find(|p| p.name == name))
        .unwrap_or_else(|| PortInfo {
            name: name.to_string(),
            ..PortInfo::default()
        })
}

pub struct AppOptions {
    /// Use an in-memory echo channel instead of a serial port
    pub loopback: bool,
    /// Baud rate that overrides stored per-port settings
    pub baud: Option<u32>,
}

type AppPipeline = Pipeline<Box<dyn Channel>, CliFrontend>;

pub struct App {
    pub pipeline: AppPipeline,
    pub running: Arc<AtomicBool>,
    config: Config,
    loopback: bool,
    baud_override: Option<u32>,
    traffic: Option<TrafficLogger>,
    port_key: Option<String>,
}

impl App {
    pub fn new(
        config: Config,
        prefs: Box<dyn Preferences>,
        options: AppOptions,
        running: Arc<AtomicBool>,
    ) -> Self {
        let channel: Box<dyn Channel> = if options.loopback {
            let (channel, _) = MemoryChannel::loopback("loopback");
            Box::new(channel)
        } else {
            Box::new(SerialChannel::new(
                config.serial.port.clone().unwrap_or_default(),
            ))
        };

        let mut serial = config.serial.clone();
        if let Some(baud) = options.baud {
            serial.baud_rate = baud;
        }

        Self {
            pipeline: Pipeline::new(channel, CliFrontend::default(), serial, prefs),
            running,
            traffic: TrafficLogger::new(config.logging.directory.as_deref()),
            config,
            loopback: options.loopback,
            baud_override: options.baud,
            port_key: None,
        }
    }

    /// Open a port, applying and then saving its stored line settings
    pub fn open_port(&mut self, name: Option<String>) -> Result<(), String> {
        if self.pipeline.is_open() {
            self.pipeline.disconnect();
        }

        if !self.loopback {
            let name = name
                .or_else(|| self.config.serial.port.clone())
                .ok_or("no port given, use /open <port> or --port")?;
            let info = find_port(&name);

            let mut serial = self.config.serial.clone();
            serial.port = Some(name.clone());
            let keys = info.preference_keys();
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            if let Some(id) = load_port_preference(self.pipeline.preferences(), &keys, &mut serial) {
                info!("applied stored line settings of {}", id);
            }
            if let Some(baud) = self.baud_override {
                serial.baud_rate = baud;
            }

            self.pipeline.set_serial_config(serial);
            *self.pipeline.channel_mut() = Box::new(SerialChannel::new(name));
            self.port_key = Some(info.preference_key());
        }

        self.pipeline.connect().map_err(|e| e.to_string())?;

        if let Some(key) = &self.port_key {
            let serial = self.pipeline.serial_config().clone();
            save_port_preference(self.pipeline.preferences_mut(), key, &serial);
        }
        Ok(())
    }

    /// Run `f` and capture whatever it appended to the Tx buffer
    fn with_tx_capture<T>(&mut self, f: impl FnOnce(&mut AppPipeline) -> T) -> T {
        let before = self.pipeline.sent().len();
        let result = f(&mut self.pipeline);
        if let Some(traffic) = &mut self.traffic {
            let sent = self.pipeline.sent();
            if sent.len() > before {
                traffic.log(Direction::Tx, &sent[before..]);
            }
        }
        result
    }

    pub fn poll_channel(&mut self) {
        if !self.pipeline.is_open() {
            return;
        }
        let before = self.pipeline.received().len();
        if let Err(e) = self.pipeline.on_data_available() {
            status!("[{}]", e);
            return;
        }
        if let Some(traffic) = &mut self.traffic {
            let received = self.pipeline.received();
            if received.len() > before {
                traffic.log(Direction::Rx, &received[before..]);
            }
        }
    }

    fn fire_repeat(&mut self) {
        let outcome = self.with_tx_capture(|p| p.on_repeat_due(Instant::now()));
        if let Some(Err(e)) = outcome {
            status!("[repeat stopped: {}]", e);
        }
    }

    /// Handle one line of input. Returns false when the user quits.
    pub fn handle_line(&mut self, line: &str) -> bool {
        match parse_command(line) {
            Ok(command) => self.execute(command),
            Err(e) => {
                status!("{}", e);
                true
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Send(text) => {
                self.pipeline.set_input(&text);
                if let Err(e) = self.with_tx_capture(|p| p.send_input()) {
                    status!("[send failed: {}]", e);
                }
            }
            Command::Help => status!("{}", HELP),
            Command::Open(name) => {
                if let Err(e) = self.open_port(name) {
                    status!("{}", e);
                }
            }
            Command::Close => {
                if self.pipeline.is_open() {
                    self.pipeline.disconnect();
                }
            }
            Command::Hex(Direction::Rx, on) => self.pipeline.set_receive_hex(on),
            Command::Hex(Direction::Tx, on) => self.pipeline.set_send_hex(on),
            Command::Follow(on) => self.pipeline.set_follow_tail(on),
            Command::Realtime(on) => self.pipeline.set_realtime(on),
            Command::Suffix(suffix) => {
                let mut current = self.pipeline.options().suffix.clone();
                match suffix {
                    Some((kind, context)) => {
                        current.enabled = true;
                        current.kind = kind;
                        if kind.takes_context() {
                            current.context = context;
                        }
                    }
                    None => current.enabled = false,
                }
                self.pipeline.set_suffix(current);
            }
            Command::Encoding(None) => status!("encoding: {}", self.pipeline.encoding_name()),
            Command::Encoding(Some(name)) => {
                if let Err(e) = self.pipeline.set_encoding(&name) {
                    status!("{}", e);
                }
            }
            Command::Repeat(RepeatCommand::Start(interval)) => {
                if !self.pipeline.is_open() {
                    status!("no port is opened");
                } else {
                    let interval = interval.unwrap_or(self.pipeline.options().repeat_delay);
                    self.pipeline.set_repeat(true, interval, Instant::now());
                    status!("[repeating every {} ms]", interval.as_millis());
                }
            }
            Command::Repeat(RepeatCommand::Stop) => {
                let interval = self.pipeline.options().repeat_delay;
                self.pipeline.set_repeat(false, interval, Instant::now());
            }
            Command::Clear(Direction::Rx) => self.pipeline.clear_received(),
            Command::Clear(Direction::Tx) => self.pipeline.clear_sent(),
            Command::Resync => {
                self.pipeline.decode_all();
            }
            Command::Dtr(on) => {
                let rts = self.pipeline.options().flow_rts;
                if let Err(e) = self.pipeline.set_flow_lines(on, rts) {
                    status!("{}", e);
                }
            }
            Command::Rts(on) => {
                let dtr = self.pipeline.options().flow_dtr;
                if let Err(e) = self.pipeline.set_flow_lines(dtr, on) {
                    status!("{}", e);
                }
            }
            Command::Ctrl(ctrl) => self.execute_ctrl(ctrl),
            Command::Export(direction, path) => {
                let path = path.unwrap_or_else(|| PathBuf::from(export_file_name()));
                let result = match direction {
                    Direction::Rx => self.pipeline.export_received(&path),
                    Direction::Tx => self.pipeline.export_sent(&path),
                };
                match result {
                    Ok(()) => status!("saved to {}", path.display()),
                    Err(e) => status!("cannot write {}: {}", path.display(), e),
                }
            }
            Command::Status => self.print_status(),
            Command::Quit => return false,
        }
        true
    }

    fn execute_ctrl(&mut self, ctrl: CtrlCommand) {
        let item = |app: &Self, index: usize| app.pipeline.controls().id_at(index);

        match ctrl {
            CtrlCommand::List => {
                if self.pipeline.controls().is_empty() {
                    status!("(no control items)");
                }
                for (i, (_, spec)) in self.pipeline.controls().iter().enumerate() {
                    status!("{:>3}. {}", i + 1, spec);
                }
            }
            CtrlCommand::Add(record) => match ControlItemSpec::parse(&record) {
                Ok(spec) => {
                    self.pipeline.controls_mut().push(spec);
                }
                Err(e) => status!("{}", e),
            },
            CtrlCommand::Remove(index) => match item(self, index) {
                Some(id) => {
                    self.pipeline.controls_mut().remove(id);
                }
                None => status!("no item {}", index + 1),
            },
            CtrlCommand::Send(index) => {
                let outcome = item(self, index)
                    .and_then(|id| self.with_tx_capture(|p| p.trigger_control(id)));
                match outcome {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => status!("[send failed: {}]", e),
                    None => status!("no item {}", index + 1),
                }
            }
            CtrlCommand::Set(index, value) => {
                let outcome = item(self, index)
                    .and_then(|id| self.with_tx_capture(|p| p.set_control_value(id, value)));
                match outcome {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => status!("[send failed: {}]", e),
                    None => status!("item {} is not a slider or spin box", index + 1),
                }
            }
            CtrlCommand::Toggle(index) => {
                let outcome = item(self, index)
                    .and_then(|id| self.with_tx_capture(|p| p.toggle_control(id)));
                match outcome {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => status!("[send failed: {}]", e),
                    None => status!("item {} is not a check box", index + 1),
                }
            }
            CtrlCommand::Import(path) => match self.pipeline.import_controls(&path) {
                Ok(report) => status!(
                    "imported {} items, skipped {} invalid lines",
                    report.added,
                    report.skipped
                ),
                Err(e) => status!("cannot read {}: {}", path.display(), e),
            },
            CtrlCommand::Export(path) => {
                if self.pipeline.controls().is_empty() {
                    status!("(no control items, writing header only)");
                }
                if let Err(e) = self.pipeline.export_controls(&path) {
                    status!("cannot write {}: {}", path.display(), e);
                }
            }
            CtrlCommand::Clear => self.pipeline.controls_mut().clear(),
        }
    }

    fn print_status(&self) {
        let p = &self.pipeline;
        let options = p.options();
        let serial = p.serial_config();
        let frontend = p.frontend();

        status!(
            "port: {} ({})",
            p.channel().name(),
            if p.is_open() { "open" } else { "closed" }
        );
        status!(
            "line: {} baud, {} data bits, parity {}, stop bits {}",
            serial.baud_rate,
            serial.data_bits.bits(),
            serial.parity,
            serial.stop_bits
        );
        status!(
            "rx: {} bytes ({} plotted), tx: {} bytes",
            frontend.rx_count,
            frontend.plotted,
            frontend.tx_count
        );
        status!(
            "hex rx: {}, hex tx: {}, follow: {}, realtime: {}",
            options.receive_hex,
            options.send_hex,
            options.follow_tail,
            options.realtime
        );
        status!("encoding: {}", p.encoding_name());
        status!(
            "suffix: {}",
            if options.suffix.enabled {
                format!("{:?} {}", options.suffix.kind, options.suffix.context)
            } else {
                "none".to_string()
            }
        );
        match p.repeat().interval() {
            Some(interval) => status!("repeat: every {} ms", interval.as_millis()),
            None => status!("repeat: off"),
        }
        status!("control items: {}", p.controls().len());
    }

    /// Stop the session and persist preferences
    pub fn shutdown(&mut self) {
        self.pipeline.on_tick();
        if self.pipeline.is_open() {
            self.pipeline.disconnect();
        }
        if let Err(e) = self.pipeline.flush_preferences() {
            warn!("failed to save preferences: {}", e);
        }
    }

    pub async fn run(&mut self) {
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());

        let mut ui_tick = tokio::time::interval(UI_TICK);
        ui_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = tokio::time::interval(CHANNEL_POLL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            let repeat_at = self.pipeline.repeat_deadline();

            tokio::select! {
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    Some(Err(e)) => warn!("stdin: {}", e),
                    None => break,
                },
                _ = ui_tick.tick() => self.pipeline.on_tick(),
                _ = poll.tick() => self.poll_channel(),
                _ = wait_until(repeat_at), if repeat_at.is_some() => self.fire_repeat(),
            }
        }

        self.shutdown();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialtest::prefs::{DATA_GROUP, IniPreferences, MemoryPreferences};
    use tempfile::TempDir;

    fn loopback_app() -> App {
        App::new(
            Config::default(),
            Box::new(MemoryPreferences::new()),
            AppOptions {
                loopback: true,
                baud: None,
            },
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn test_plain_lines_are_sent() {
        assert_eq!(parse_command("hello"), Ok(Command::Send("hello".to_string())));
        assert_eq!(parse_command("//etc"), Ok(Command::Send("/etc".to_string())));
        assert_eq!(parse_command(""), Ok(Command::Send(String::new())));
    }

    #[test]
    fn test_parse_switches() {
        assert_eq!(parse_command("/hex rx on"), Ok(Command::Hex(Direction::Rx, true)));
        assert_eq!(parse_command("/hex TX off"), Ok(Command::Hex(Direction::Tx, false)));
        assert_eq!(parse_command("/follow on"), Ok(Command::Follow(true)));
        assert!(parse_command("/hex rx maybe").is_err());
        assert!(parse_command("/hex").is_err());
    }

    #[test]
    fn test_parse_suffix() {
        assert_eq!(parse_command("/suffix none"), Ok(Command::Suffix(None)));
        assert_eq!(
            parse_command("/suffix crlf"),
            Ok(Command::Suffix(Some((SuffixKind::CrLf, String::new()))))
        );
        assert_eq!(
            parse_command("/suffix text ;END"),
            Ok(Command::Suffix(Some((SuffixKind::Text, ";END".to_string()))))
        );
        assert!(parse_command("/suffix hex zz").is_err());
    }

    #[test]
    fn test_parse_repeat() {
        assert_eq!(
            parse_command("/repeat 250"),
            Ok(Command::Repeat(RepeatCommand::Start(Some(Duration::from_millis(250)))))
        );
        assert_eq!(parse_command("/repeat"), Ok(Command::Repeat(RepeatCommand::Start(None))));
        assert_eq!(parse_command("/repeat off"), Ok(Command::Repeat(RepeatCommand::Stop)));
        assert!(parse_command("/repeat soon").is_err());
    }

    #[test]
    fn test_parse_ctrl() {
        assert_eq!(parse_command("/ctrl"), Ok(Command::Ctrl(CtrlCommand::List)));
        assert_eq!(parse_command("/ctrl send 1"), Ok(Command::Ctrl(CtrlCommand::Send(0))));
        assert_eq!(parse_command("/ctrl set 2 -5"), Ok(Command::Ctrl(CtrlCommand::Set(1, -5))));
        assert_eq!(
            parse_command("/ctrl add command,ping,t:PING"),
            Ok(Command::Ctrl(CtrlCommand::Add("command,ping,t:PING".to_string())))
        );
        assert!(parse_command("/ctrl send 0").is_err());
        assert!(parse_command("/ctrl import").is_err());
    }

    #[test]
    fn test_parse_unknown() {
        assert!(parse_command("/frobnicate").is_err());
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("/export rx out.bin"),
            Ok(Command::Export(Direction::Rx, Some(PathBuf::from("out.bin"))))
        );
    }

    #[test]
    fn test_loopback_echo() {
        let mut app = loopback_app();
        assert!(app.handle_line("/open"));
        assert!(app.pipeline.is_open());
        assert!(app.handle_line("/suffix lf"));
        assert!(app.handle_line("hi"));
        app.poll_channel();
        assert_eq!(app.pipeline.received(), b"hi\n");
        assert_eq!(app.pipeline.sent(), b"hi\n");
        assert!(!app.handle_line("/quit"));
    }

    #[test]
    fn test_send_while_closed_keeps_buffers_empty() {
        let mut app = loopback_app();
        assert!(app.handle_line("data"));
        assert!(app.pipeline.sent().is_empty());
        assert!(app.handle_line("/repeat 10"));
        assert!(!app.pipeline.repeat().is_armed());
    }

    #[test]
    fn test_control_items_through_commands() {
        let mut app = loopback_app();
        app.handle_line("/open");
        app.handle_line("/ctrl add command,ping,h:50 49");
        app.handle_line("/ctrl add not-a-record");
        assert_eq!(app.pipeline.controls().len(), 1);
        app.handle_line("/ctrl send 1");
        app.poll_channel();
        assert_eq!(app.pipeline.received(), b"PI");
        app.handle_line("/ctrl remove 1");
        assert!(app.pipeline.controls().is_empty());
    }

    #[test]
    fn test_shutdown_persists_options() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preference.ini");
        let prefs = IniPreferences::open(&path).unwrap();
        let mut app = App::new(
            Config::default(),
            Box::new(prefs),
            AppOptions {
                loopback: true,
                baud: None,
            },
            Arc::new(AtomicBool::new(true)),
        );
        app.handle_line("/hex rx on");
        app.shutdown();

        let reopened = IniPreferences::open(&path).unwrap();
        assert!(reopened.get_bool(DATA_GROUP, "Recv_Hex", false));
    }

    #[test]
    fn test_open_without_port_fails() {
        let mut app = App::new(
            Config::default(),
            Box::new(MemoryPreferences::new()),
            AppOptions {
                loopback: false,
                baud: None,
            },
            Arc::new(AtomicBool::new(true)),
        );
        assert!(app.open_port(None).is_err());
    }
}
