//! The terminal engine.
//!
//! [`Pipeline`] owns the Rx/Tx buffers and every piece of state between
//! the channel and the views. It is driven entirely through handler
//! methods called by one event loop, so no locking is involved:
//!
//! - channel notifications: [`Pipeline::on_data_available`],
//!   [`Pipeline::on_error_occurred`]
//! - timers: [`Pipeline::on_tick`], [`Pipeline::on_repeat_due`]
//! - user actions: [`Pipeline::set_input`], [`Pipeline::send_input`],
//!   option setters, control items
//! - viewer signals: the `on_scroll_*` methods

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::buffer::{RawBuffer, to_hex_spaced};
use crate::channel::{Channel, ChannelError};
use crate::compose::{Suffix, compose};
use crate::config::SerialConfig;
use crate::control::{ControlRegistry, ImportReport, ItemId};
use crate::decode::{EncodingError, HexFormatter, StreamDecoder};
use crate::options::DataOptions;
use crate::prefs::{DATA_GROUP, Preferences};
use crate::refresh::PendingUi;
use crate::repeat::RepeatScheduler;
use crate::scroll::ScrollState;

/// Display and plot collaborator. Rendering is entirely up to the implementor.
pub trait Frontend {
    /// Text to append to the receive view
    fn on_decoded_text(&mut self, text: &str);

    /// Raw bytes of one refresh batch, for plotting
    fn on_raw_chunk(&mut self, bytes: &[u8]);

    /// Replace the whole receive view
    fn on_resync(&mut self, _text: &str) {}

    /// Text to append to the sent view
    fn on_sent_text(&mut self, _text: &str) {}

    /// Replace the whole sent view
    fn on_sent_resync(&mut self, _text: &str) {}

    /// Move the receive view's scroll position
    fn on_scroll_to(&mut self, _position: usize) {}

    fn on_counters(&mut self, _rx: usize, _tx: usize) {}

    fn on_connection_changed(&mut self, _open: bool) {}
}

pub struct Pipeline<C: Channel, F: Frontend> {
    channel: C,
    frontend: F,
    prefs: Box<dyn Preferences>,
    serial: SerialConfig,
    options: DataOptions,
    rx: RawBuffer,
    tx: RawBuffer,
    decoder: StreamDecoder,
    hex: HexFormatter,
    pending: PendingUi,
    scroll: ScrollState,
    repeat: RepeatScheduler,
    controls: ControlRegistry,
    input: String,
}

impl<C: Channel, F: Frontend> Pipeline<C, F> {
    pub fn new(channel: C, frontend: F, serial: SerialConfig, prefs: Box<dyn Preferences>) -> Self {
        let mut options = DataOptions::load(prefs.as_ref());
        let decoder = match StreamDecoder::new(&options.encoding) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("{}, falling back to UTF-8", e);
                StreamDecoder::default()
            }
        };
        options.encoding = decoder.encoding_name().to_string();
        // repeat sending never resumes on its own
        options.repeat_enabled = false;

        Self {
            channel,
            frontend,
            prefs,
            serial,
            scroll: ScrollState::new(options.follow_tail),
            options,
            rx: RawBuffer::new(),
            tx: RawBuffer::new(),
            decoder,
            hex: HexFormatter::new(),
            pending: PendingUi::new(),
            repeat: RepeatScheduler::new(),
            controls: ControlRegistry::new(),
            input: String::new(),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut F {
        &mut self.frontend
    }

    pub fn options(&self) -> &DataOptions {
        &self.options
    }

    pub fn serial_config(&self) -> &SerialConfig {
        &self.serial
    }

    pub fn set_serial_config(&mut self, serial: SerialConfig) {
        self.serial = serial;
    }

    pub fn preferences(&self) -> &dyn Preferences {
        self.prefs.as_ref()
    }

    pub fn preferences_mut(&mut self) -> &mut dyn Preferences {
        self.prefs.as_mut()
    }

    pub fn received(&self) -> &[u8] {
        self.rx.as_bytes()
    }

    pub fn sent(&self) -> &[u8] {
        self.tx.as_bytes()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn scroll(&self) -> &ScrollState {
        &self.scroll
    }

    pub fn repeat(&self) -> &RepeatScheduler {
        &self.repeat
    }

    pub fn encoding_name(&self) -> &'static str {
        self.decoder.encoding_name()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    // Connection
    // ------------------------------------------------------------------

    pub fn connect(&mut self) -> Result<(), ChannelError> {
        self.channel.open(&self.serial)?;
        info!("{} connected at {} baud", self.channel.name(), self.serial.baud_rate);
        self.apply_flow_lines();
        self.frontend.on_connection_changed(true);
        Ok(())
    }

    /// Close the channel, stop repeating and drop bytes not yet shown
    pub fn disconnect(&mut self) {
        self.channel.close();
        self.pending.discard();
        self.repeat.disarm();
        info!("{} disconnected", self.channel.name());
        self.frontend.on_connection_changed(false);
    }

    fn apply_flow_lines(&mut self) {
        if !self.channel.capabilities().flow_control_lines || !self.channel.is_open() {
            return;
        }
        if let Err(e) = self.channel.set_data_terminal_ready(self.options.flow_dtr) {
            warn!("failed to set DTR: {}", e);
        }
        if !self.channel.hardware_flow_control() {
            if let Err(e) = self.channel.set_request_to_send(self.options.flow_rts) {
                warn!("failed to set RTS: {}", e);
            }
        }
    }

    // Receive path
    // ------------------------------------------------------------------

    /// Drain whatever the channel has buffered right now
    pub fn on_data_available(&mut self) -> Result<usize, ChannelError> {
        let mut data = Vec::new();
        match self.channel.read_available(&mut data) {
            Ok(n) => {
                self.on_data_received(&data);
                Ok(n)
            }
            Err(e) => {
                self.on_error_occurred(&e);
                Err(e)
            }
        }
    }

    pub fn on_data_received(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.rx.append(data);
        let position = self.scroll.on_data_arrival();
        self.frontend.on_scroll_to(position);
        self.frontend.on_counters(self.rx.len(), self.tx.len());
        self.pending.push(data);
    }

    /// A channel failure mid-session closes the channel. No reconnect.
    pub fn on_error_occurred(&mut self, error: &ChannelError) {
        if self.channel.is_open() {
            warn!("{}: {}, closing", self.channel.name(), error);
            self.disconnect();
        }
    }

    /// UI refresh tick: forward bytes batched since the last tick
    pub fn on_tick(&mut self) {
        let Some(chunk) = self.pending.drain() else {
            return;
        };
        if self.options.realtime {
            let text = self.render_received(&chunk);
            self.frontend.on_decoded_text(&text);
            self.frontend.on_scroll_to(self.scroll.current());
        }
        self.frontend.on_raw_chunk(&chunk);
    }

    fn render_received(&mut self, chunk: &[u8]) -> String {
        if self.options.receive_hex {
            self.hex.render(chunk)
        } else {
            self.decoder.decode_increment(chunk)
        }
    }

    /// Rebuild the receive view from the whole Rx buffer
    pub fn decode_all(&mut self) -> String {
        if let Some(chunk) = self.pending.drain() {
            self.frontend.on_raw_chunk(&chunk);
        }
        self.decoder.reset();
        self.hex.reset();
        let text = if self.options.receive_hex {
            to_hex_spaced(self.rx.as_bytes())
        } else {
            self.decoder.decode_increment(self.rx.as_bytes())
        };
        self.frontend.on_resync(&text);
        self.frontend.on_scroll_to(self.scroll.current());
        text
    }

    pub fn clear_received(&mut self) {
        self.rx.clear();
        self.decoder.reset();
        self.hex.reset();
        self.pending.discard();
        self.scroll.reset();
        self.frontend.on_resync("");
        self.frontend.on_counters(self.rx.len(), self.tx.len());
    }

    // Send path
    // ------------------------------------------------------------------

    /// The input field changed. Any edit cancels repeat sending.
    pub fn set_input(&mut self, text: &str) {
        if self.repeat.is_armed() {
            debug!("input edited, repeat cancelled");
        }
        self.repeat.disarm();
        if self.options.repeat_enabled {
            self.options.repeat_enabled = false;
            self.save_options();
        }
        self.input = text.to_string();
    }

    /// The bytes a send of the current input would transmit
    pub fn compose_input(&self) -> Vec<u8> {
        compose(&self.input, self.options.send_hex, &self.options.suffix, &self.decoder)
    }

    /// Send the current input plus suffix
    pub fn send_input(&mut self) -> Result<usize, ChannelError> {
        let data = self.compose_input();
        self.send_raw(&data)
    }

    /// Send bytes as they are. A closed channel stops repeat sending.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        if !self.channel.is_open() {
            self.repeat.disarm();
            return Err(ChannelError::NotOpen);
        }
        self.tx.append(data);
        let text = self.render_sent(data);
        self.frontend.on_sent_text(&text);
        self.frontend.on_counters(self.rx.len(), self.tx.len());

        match self.channel.write(data) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.repeat.disarm();
                self.on_error_occurred(&e);
                Err(e)
            }
        }
    }

    fn render_sent(&self, data: &[u8]) -> String {
        if self.options.send_hex {
            to_hex_spaced(data)
        } else {
            self.decoder.decode_complete(data)
        }
    }

    pub fn clear_sent(&mut self) {
        self.tx.clear();
        self.frontend.on_sent_resync("");
        self.frontend.on_counters(self.rx.len(), self.tx.len());
    }

    // Repeat
    // ------------------------------------------------------------------

    pub fn start_repeat(&mut self, interval: Duration, now: Instant) {
        self.repeat.arm(interval, now);
        self.options.repeat_enabled = true;
        self.options.repeat_delay = self.repeat.interval().unwrap_or(interval);
        self.save_options();
    }

    pub fn stop_repeat(&mut self) {
        self.repeat.disarm();
        self.options.repeat_enabled = false;
        self.save_options();
    }

    pub fn set_repeat(&mut self, enabled: bool, interval: Duration, now: Instant) {
        if enabled {
            self.start_repeat(interval, now);
        } else {
            self.stop_repeat();
        }
    }

    pub fn repeat_deadline(&self) -> Option<Instant> {
        self.repeat.next_deadline()
    }

    /// Repeat timer callback. Returns the send outcome if a send was due.
    pub fn on_repeat_due(&mut self, now: Instant) -> Option<Result<usize, ChannelError>> {
        if !self.repeat.poll(now) {
            return None;
        }
        let result = self.send_input();
        if result.is_err() {
            self.options.repeat_enabled = false;
            self.save_options();
        }
        Some(result)
    }

    // Options
    // ------------------------------------------------------------------

    fn save_options(&mut self) {
        self.options.save(self.prefs.as_mut());
    }

    pub fn set_receive_hex(&mut self, hex: bool) {
        if self.options.receive_hex != hex {
            self.options.receive_hex = hex;
            self.save_options();
            self.decode_all();
        }
    }

    pub fn set_send_hex(&mut self, hex: bool) {
        if self.options.send_hex != hex {
            self.options.send_hex = hex;
            self.save_options();
            let text = self.render_sent(self.tx.as_bytes());
            self.frontend.on_sent_resync(&text);
        }
    }

    pub fn set_realtime(&mut self, realtime: bool) {
        if self.options.realtime != realtime {
            self.options.realtime = realtime;
            self.save_options();
            if realtime {
                self.decode_all();
            }
        }
    }

    pub fn set_follow_tail(&mut self, follow: bool) {
        self.options.follow_tail = follow;
        self.scroll.set_follow_tail(follow);
        self.save_options();
    }

    pub fn set_suffix(&mut self, suffix: Suffix) {
        self.options.suffix = suffix;
        self.save_options();
    }

    /// Switch the text encoding. An unknown name keeps the current one.
    pub fn set_encoding(&mut self, name: &str) -> Result<(), EncodingError> {
        self.decoder.set_encoding(name)?;
        self.options.encoding = self.decoder.encoding_name().to_string();
        self.prefs.set(DATA_GROUP, "Encoding_Name", name.trim());
        info!("encoding set to {}", self.options.encoding);
        self.decode_all();
        let text = self.render_sent(self.tx.as_bytes());
        self.frontend.on_sent_resync(&text);
        Ok(())
    }

    pub fn set_flow_lines(&mut self, dtr: bool, rts: bool) -> Result<(), ChannelError> {
        self.options.flow_dtr = dtr;
        self.options.flow_rts = rts;
        self.save_options();
        if !self.channel.is_open() {
            return Ok(());
        }
        if !self.channel.capabilities().flow_control_lines {
            return Err(ChannelError::Unsupported("DTR/RTS"));
        }
        self.channel.set_data_terminal_ready(dtr)?;
        if !self.channel.hardware_flow_control() {
            self.channel.set_request_to_send(rts)?;
        }
        Ok(())
    }

    pub fn flush_preferences(&mut self) -> io::Result<()> {
        self.prefs.flush()
    }

    // Scroll viewer signals
    // ------------------------------------------------------------------

    pub fn on_scroll_value_changed(&mut self, value: usize) {
        self.scroll.on_value_changed(value);
    }

    pub fn on_scroll_slider_moved(&mut self, value: usize) {
        self.scroll.on_slider_moved(value);
    }

    pub fn on_scroll_range_changed(&mut self, maximum: usize) {
        let position = self.scroll.on_range_changed(maximum);
        self.frontend.on_scroll_to(position);
    }

    // Control items
    // ------------------------------------------------------------------

    pub fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    /// Send the message of a control item. `None` if the item is gone.
    pub fn trigger_control(&mut self, id: ItemId) -> Option<Result<usize, ChannelError>> {
        let data = self.controls.get(id)?.message(&self.decoder);
        Some(self.send_raw(&data))
    }

    /// Change a slider/spin box value and send the new message
    pub fn set_control_value(&mut self, id: ItemId, value: i64) -> Option<Result<usize, ChannelError>> {
        if !self.controls.get_mut(id)?.set_value(value) {
            return None;
        }
        self.trigger_control(id)
    }

    /// Flip a check box and send the message for its new state
    pub fn toggle_control(&mut self, id: ItemId) -> Option<Result<usize, ChannelError>> {
        if !self.controls.get_mut(id)?.toggle() {
            return None;
        }
        self.trigger_control(id)
    }

    pub fn import_controls<P: AsRef<Path>>(&mut self, path: P) -> io::Result<ImportReport> {
        let report = self.controls.import_file(path)?;
        info!("imported {} control items, skipped {}", report.added, report.skipped);
        Ok(report)
    }

    pub fn export_controls<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.controls.export_file(path)
    }

    // Export
    // ------------------------------------------------------------------

    pub fn export_received<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.rx.as_bytes())
    }

    pub fn export_sent<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.tx.as_bytes())
    }
}

/// Default name for exported files, e.g. `2024-03-09_14-05-33.txt`
pub fn export_file_name() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S.txt").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::parse_hex;
    use crate::channel::{MemoryChannel, MemoryHandle};
    use crate::compose::SuffixKind;
    use crate::control::{ControlItemSpec, Payload};
    use crate::prefs::MemoryPreferences;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        text: String,
        raw: Vec<Vec<u8>>,
        sent: String,
        scroll: Vec<usize>,
        counters: (usize, usize),
        connected: Option<bool>,
    }

    impl Frontend for Recorder {
        fn on_decoded_text(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn on_raw_chunk(&mut self, bytes: &[u8]) {
            self.raw.push(bytes.to_vec());
        }

        fn on_resync(&mut self, text: &str) {
            self.text = text.to_string();
        }

        fn on_sent_text(&mut self, text: &str) {
            self.sent.push_str(text);
        }

        fn on_sent_resync(&mut self, text: &str) {
            self.sent = text.to_string();
        }

        fn on_scroll_to(&mut self, position: usize) {
            self.scroll.push(position);
        }

        fn on_counters(&mut self, rx: usize, tx: usize) {
            self.counters = (rx, tx);
        }

        fn on_connection_changed(&mut self, open: bool) {
            self.connected = Some(open);
        }
    }

    fn pipeline() -> (Pipeline<MemoryChannel, Recorder>, MemoryHandle) {
        let (channel, handle) = MemoryChannel::new("mem");
        let pipeline = Pipeline::new(
            channel,
            Recorder::default(),
            SerialConfig::default(),
            Box::new(MemoryPreferences::new()),
        );
        (pipeline, handle)
    }

    fn connected() -> (Pipeline<MemoryChannel, Recorder>, MemoryHandle) {
        let (mut p, handle) = pipeline();
        p.connect().unwrap();
        (p, handle)
    }

    #[test]
    fn test_rx_length_tracks_appends_and_clear() {
        let (mut p, _) = connected();
        p.on_data_received(b"abc");
        p.on_data_received(b"de");
        assert_eq!(p.received().len(), 5);
        assert_eq!(p.frontend().counters, (5, 0));

        p.clear_received();
        assert_eq!(p.received().len(), 0);
        assert_eq!(p.frontend().counters, (0, 0));
        assert_eq!(p.pending_len(), 0);
    }

    #[test]
    fn test_tick_batches_and_drains() {
        let (mut p, handle) = connected();
        handle.inject(b"hel");
        p.on_data_available().unwrap();
        handle.inject(b"lo");
        p.on_data_available().unwrap();
        assert_eq!(p.pending_len(), 5);
        assert!(p.frontend().text.is_empty());

        p.on_tick();
        assert_eq!(p.pending_len(), 0);
        assert_eq!(p.frontend().text, "hello");
        assert_eq!(p.frontend().raw, vec![b"hello".to_vec()]);

        p.on_tick();
        assert_eq!(p.frontend().raw.len(), 1);
    }

    #[test]
    fn test_realtime_off_still_feeds_plot() {
        let (mut p, _) = connected();
        p.set_realtime(false);
        p.on_data_received(b"12");
        p.on_tick();
        assert!(p.frontend().text.is_empty());
        assert_eq!(p.frontend().raw, vec![b"12".to_vec()]);

        p.set_realtime(true);
        assert_eq!(p.frontend().text, "12");
    }

    #[test]
    fn test_split_crlf_through_pipeline() {
        let (mut split, _) = connected();
        split.on_data_received(b"a\r");
        split.on_tick();
        split.on_data_received(b"\nb");
        split.on_tick();

        let (mut whole, _) = connected();
        whole.on_data_received(b"a\r\nb");
        whole.on_tick();

        assert_eq!(split.frontend().text, whole.frontend().text);
        assert_eq!(split.received(), whole.received());
        assert_eq!(split.decode_all(), whole.decode_all());
    }

    #[test]
    fn test_hex_display_breaks_and_keeps_bytes() {
        let (mut p, _) = connected();
        p.set_receive_hex(true);
        for _ in 0..6000 {
            p.on_data_received(&[0x55]);
            p.on_tick();
        }
        assert_eq!(p.received().len(), 6000);
        assert!(p.frontend().text.contains('\n'));
        assert_eq!(parse_hex(&p.frontend().text), p.received());
    }

    #[test]
    fn test_hex_resync_roundtrip() {
        let (mut p, _) = connected();
        let bytes: Vec<u8> = (0..=255).collect();
        p.on_data_received(&bytes);
        p.set_receive_hex(true);
        assert_eq!(parse_hex(&p.frontend().text), bytes);
    }

    #[test]
    fn test_follow_tail_scrolls_to_maximum() {
        let (mut p, _) = connected();
        p.set_follow_tail(true);
        for max in [10, 20, 30] {
            p.on_scroll_range_changed(max);
            p.on_data_received(b"x");
            assert_eq!(p.scroll().current(), max);
            assert_eq!(*p.frontend().scroll.last().unwrap(), max);
        }
    }

    #[test]
    fn test_user_position_kept_without_follow() {
        let (mut p, _) = connected();
        p.on_scroll_range_changed(100);
        p.on_scroll_slider_moved(40);
        p.on_scroll_value_changed(95);
        for max in [110, 120] {
            p.on_data_received(b"x");
            p.on_scroll_range_changed(max);
            p.on_tick();
            assert_eq!(p.scroll().current(), 40);
        }
    }

    #[test]
    fn test_hex_send_and_crlf_suffix() {
        let (mut p, handle) = connected();
        p.set_send_hex(true);
        p.set_input("48 65 6C 6C 6F");
        p.send_input().unwrap();
        assert_eq!(handle.take_written(), vec![0x48, 0x65, 0x6c, 0x6c, 0x6f]);

        p.set_suffix(Suffix {
            enabled: true,
            kind: SuffixKind::CrLf,
            context: String::new(),
        });
        p.send_input().unwrap();
        assert_eq!(handle.take_written(), b"Hello\r\n");

        p.set_send_hex(false);
        p.set_input("hi");
        p.send_input().unwrap();
        assert_eq!(handle.take_written(), b"hi\r\n");
        assert_eq!(p.sent().len(), 5 + 7 + 4);
        assert_eq!(p.frontend().counters.1, 16);
    }

    #[test]
    fn test_send_when_closed_fails_and_disarms() {
        let (mut p, _) = pipeline();
        p.set_input("x");
        p.start_repeat(Duration::from_millis(10), Instant::now());
        assert!(matches!(p.send_input(), Err(ChannelError::NotOpen)));
        assert!(!p.repeat().is_armed());
        assert!(p.sent().is_empty());
    }

    #[test]
    fn test_repeat_sends_k_times() {
        let (mut p, handle) = connected();
        p.set_input("ping");
        let start = Instant::now();
        let interval = Duration::from_millis(50);
        p.start_repeat(interval, start);

        let mut sends = 0;
        let mut t = start;
        while t <= start + interval * 10 {
            if let Some(result) = p.on_repeat_due(t) {
                result.unwrap();
                sends += 1;
            }
            t += Duration::from_millis(1);
        }
        assert!((9..=11).contains(&sends), "sent {} times", sends);
        assert_eq!(handle.take_written().len(), sends * 4);

        p.stop_repeat();
        assert!(p.on_repeat_due(t + interval * 5).is_none());
    }

    #[test]
    fn test_editing_input_cancels_repeat() {
        let (mut p, _) = connected();
        p.set_input("abc");
        let start = Instant::now();
        p.start_repeat(Duration::from_millis(10), start);
        assert!(p.repeat().is_armed());

        p.set_input("ab");
        assert!(!p.repeat().is_armed());
        assert!(p.on_repeat_due(start + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_cancelled_repeat_is_persisted() {
        let (mut p, _) = connected();
        p.set_input("abc");
        let start = Instant::now();
        p.start_repeat(Duration::from_millis(10), start);
        assert!(p.preferences().get_bool(DATA_GROUP, "Repeat_Enabled", false));

        p.set_input("ab");
        assert!(!p.preferences().get_bool(DATA_GROUP, "Repeat_Enabled", true));

        p.start_repeat(Duration::from_millis(10), start);
        assert!(p.preferences().get_bool(DATA_GROUP, "Repeat_Enabled", false));
        p.channel_mut().close();
        let outcome = p.on_repeat_due(start + Duration::from_millis(10));
        assert!(matches!(outcome, Some(Err(ChannelError::NotOpen))));
        assert!(!p.repeat().is_armed());
        assert!(!p.preferences().get_bool(DATA_GROUP, "Repeat_Enabled", true));
    }

    #[test]
    fn test_wide_slider_sends_through_pipeline() {
        let (mut p, handle) = connected();
        let id = p.controls_mut().push(
            ControlItemSpec::parse("slider,wide,-9223372036854775808,9223372036854775807,1,0,t:V{}").unwrap(),
        );
        p.set_control_value(id, -1).unwrap().unwrap();
        assert_eq!(handle.take_written(), b"V-1");
    }

    #[test]
    fn test_repeat_stops_when_channel_closes() {
        let (mut p, _) = connected();
        p.set_input("x");
        let start = Instant::now();
        p.start_repeat(Duration::from_millis(10), start);
        p.disconnect();
        assert!(!p.repeat().is_armed());
        assert_eq!(p.frontend().connected, Some(false));
    }

    #[test]
    fn test_read_error_closes_channel() {
        let (mut p, handle) = connected();
        p.on_data_received(b"pending");
        handle.fail_next_read(io::ErrorKind::BrokenPipe);
        assert!(p.on_data_available().is_err());
        assert!(!p.is_open());
        assert!(!handle.is_open());
        assert_eq!(p.pending_len(), 0);
        assert_eq!(p.received(), b"pending");
    }

    #[test]
    fn test_connect_failure_stays_closed() {
        let (mut p, handle) = pipeline();
        handle.refuse_open(true);
        assert!(matches!(p.connect(), Err(ChannelError::Open { .. })));
        assert!(!p.is_open());
        assert_eq!(p.frontend().connected, None);
    }

    #[test]
    fn test_flow_lines_applied_on_connect() {
        let (mut p, handle) = pipeline();
        p.set_flow_lines(true, true).unwrap();
        p.connect().unwrap();
        assert_eq!(handle.lines(), (true, true));
        p.set_flow_lines(false, true).unwrap();
        assert_eq!(handle.lines(), (false, true));
    }

    #[test]
    fn test_bad_encoding_keeps_previous() {
        let (mut p, _) = connected();
        p.set_encoding("GBK").unwrap();
        assert_eq!(p.encoding_name(), "GBK");
        assert!(p.set_encoding("klingon").is_err());
        assert_eq!(p.encoding_name(), "GBK");
        assert_eq!(
            p.preferences().get(DATA_GROUP, "Encoding_Name").as_deref(),
            Some("GBK")
        );
    }

    #[test]
    fn test_encoding_change_resyncs_view() {
        let (mut p, _) = connected();
        p.on_data_received(&[0xd6, 0xd0]);
        p.on_tick();
        p.set_encoding("gbk").unwrap();
        assert_eq!(p.frontend().text, "中");
    }

    #[test]
    fn test_options_persisted() {
        let (mut p, _) = connected();
        p.set_receive_hex(true);
        p.set_follow_tail(true);
        assert!(p.preferences().get_bool(DATA_GROUP, "Recv_Hex", false));
        assert!(p.preferences().get_bool(DATA_GROUP, "Recv_Latest", false));
    }

    #[test]
    fn test_control_items_send_without_suffix() {
        let (mut p, handle) = connected();
        p.set_suffix(Suffix {
            enabled: true,
            kind: SuffixKind::CrLf,
            context: String::new(),
        });
        let id = p
            .controls_mut()
            .push(ControlItemSpec::command("hi", Payload::Hex("01 02".to_string())));
        p.trigger_control(id).unwrap().unwrap();
        assert_eq!(handle.take_written(), vec![0x01, 0x02]);

        let slider = p
            .controls_mut()
            .push(ControlItemSpec::parse("slider,s,0,10,1,0,t:S{}").unwrap());
        p.set_control_value(slider, 7).unwrap().unwrap();
        assert_eq!(handle.take_written(), b"S7");

        let check = p
            .controls_mut()
            .push(ControlItemSpec::parse("checkbox,c,0,t:ON,t:OFF").unwrap());
        p.toggle_control(check).unwrap().unwrap();
        assert_eq!(handle.take_written(), b"ON");
        assert!(p.toggle_control(id).is_none());

        p.controls_mut().remove(id);
        assert!(p.trigger_control(id).is_none());
    }

    #[test]
    fn test_export_and_import_files() {
        let dir = TempDir::new().unwrap();
        let (mut p, _) = connected();
        p.on_data_received(b"\x00raw\xff");
        p.set_input("out");
        p.send_input().unwrap();

        let rx_path = dir.path().join("rx.bin");
        let tx_path = dir.path().join("tx.bin");
        p.export_received(&rx_path).unwrap();
        p.export_sent(&tx_path).unwrap();
        assert_eq!(fs::read(&rx_path).unwrap(), b"\x00raw\xff");
        assert_eq!(fs::read(&tx_path).unwrap(), b"out");

        p.controls_mut()
            .push(ControlItemSpec::command("a", Payload::Text("1".to_string())));
        let panel = dir.path().join("panel.txt");
        p.export_controls(&panel).unwrap();
        p.controls_mut().clear();
        assert_eq!(p.import_controls(&panel).unwrap().added, 1);
        assert!(p.export_received(dir.path().join("missing/rx.bin")).is_err());
    }

    #[test]
    fn test_export_file_name_shape() {
        let name = export_file_name();
        assert!(name.ends_with(".txt"));
        assert_eq!(name.len(), "2024-03-09_14-05-33.txt".len());
    }
}
