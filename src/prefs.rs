//! Grouped key-value preference storage.
//!
//! The engine only talks to the [`Preferences`] trait. Two stores are provided:
//! an in-memory map and an INI file that is rewritten on [`IniPreferences::flush`].

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits, parse_bool};

/// Group holding the data-view options.
pub const DATA_GROUP: &str = "SerialTest_Data";

type Groups = BTreeMap<String, BTreeMap<String, String>>;

/// Grouped key-value store injected into the engine.
pub trait Preferences {
    fn get(&self, group: &str, key: &str) -> Option<String>;
    fn set(&mut self, group: &str, key: &str, value: &str);
    fn has_group(&self, group: &str) -> bool;

    /// Persist pending changes. Stores without a backing medium do nothing.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn get_string(&self, group: &str, key: &str, default: &str) -> String {
        self.get(group, key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, group: &str, key: &str, default: bool) -> bool {
        self.get(group, key)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default)
    }

    fn get_u64(&self, group: &str, key: &str, default: u64) -> u64 {
        self.get(group, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn set_bool(&mut self, group: &str, key: &str, value: bool) {
        self.set(group, key, if value { "true" } else { "false" });
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    groups: Groups,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, group: &str, key: &str) -> Option<String> {
        self.groups.get(group)?.get(key).cloned()
    }

    fn set(&mut self, group: &str, key: &str, value: &str) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }
}

/// INI-file backed store (portable, lives next to the binary by default)
#[derive(Debug)]
pub struct IniPreferences {
    path: PathBuf,
    groups: Groups,
    dirty: bool,
}

impl IniPreferences {
    /// Open the store at `path`. A missing file starts an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PrefsError> {
        let path = path.as_ref().to_path_buf();
        let groups = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Groups::new(),
            Ok(contents) => {
                let raw: Groups = serde_ini::from_str(&contents).map_err(|e| PrefsError::Parse {
                    path: path.clone(),
                    source: e,
                })?;
                raw.into_iter()
                    .map(|(group, entries)| {
                        let entries = entries
                            .into_iter()
                            .map(|(key, value)| (key, decode_value(&value)))
                            .collect();
                        (group, entries)
                    })
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Groups::new(),
            Err(e) => {
                return Err(PrefsError::Io {
                    path: path.clone(),
                    source: e,
                });
            }
        };
        Ok(Self {
            path,
            groups,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Preferences for IniPreferences {
    fn get(&self, group: &str, key: &str) -> Option<String> {
        self.groups.get(group)?.get(key).cloned()
    }

    fn set(&mut self, group: &str, key: &str, value: &str) {
        let entry = self.groups.entry(group.to_string()).or_default();
        if entry.get(key).map(String::as_str) != Some(value) {
            entry.insert(key.to_string(), value.to_string());
            self.dirty = true;
        }
    }

    fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut file = fs::File::create(&self.path)?;
        for (group, entries) in &self.groups {
            writeln!(file, "[{}]", group)?;
            for (key, value) in entries {
                writeln!(file, "{}={}", key, encode_value(value))?;
            }
            writeln!(file)?;
        }
        file.flush()?;
        self.dirty = false;
        Ok(())
    }
}

/// Escape a value so it survives one INI line. Line breaks and backslashes
/// become escapes. Empty values, values with surrounding whitespace and
/// values starting with a quote are wrapped in double quotes.
fn encode_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    if escaped.is_empty() || escaped.trim() != escaped || escaped.starts_with('"') {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

fn decode_value(raw: &str) -> String {
    let raw = raw.trim();
    let inner = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('\\') => value.push('\\'),
            Some(other) => {
                value.push('\\');
                value.push(other);
            }
            None => value.push('\\'),
        }
    }
    value
}

/// Save the line settings of a port under its preference key.
pub fn save_port_preference(prefs: &mut dyn Preferences, id: &str, serial: &SerialConfig) {
    prefs.set(id, "BaudRate", &serial.baud_rate.to_string());
    prefs.set(id, "DataBitsID", &serial.data_bits.index().to_string());
    prefs.set(id, "StopBitsID", &serial.stop_bits.index().to_string());
    prefs.set(id, "ParityID", &serial.parity.index().to_string());
    prefs.set(id, "FlowControlID", &serial.flow_control.index().to_string());
}

/// Apply stored line settings for the first key that has a group.
///
/// Returns the key that matched, if any.
pub fn load_port_preference<'a>(
    prefs: &dyn Preferences,
    keys: &[&'a str],
    serial: &mut SerialConfig,
) -> Option<&'a str> {
    let id = keys.iter().copied().find(|k| prefs.has_group(k))?;

    if let Some(baud) = prefs.get(id, "BaudRate").and_then(|v| v.trim().parse().ok()) {
        serial.baud_rate = baud;
    }
    let index = |key: &str| prefs.get(id, key).and_then(|v| v.trim().parse::<usize>().ok());
    if let Some(bits) = index("DataBitsID").and_then(DataBits::from_index) {
        serial.data_bits = bits;
    }
    if let Some(stop) = index("StopBitsID").and_then(StopBits::from_index) {
        serial.stop_bits = stop;
    }
    if let Some(parity) = index("ParityID").and_then(Parity::from_index) {
        serial.parity = parity;
    }
    if let Some(flow) = index("FlowControlID").and_then(FlowControl::from_index) {
        serial.flow_control = flow;
    }
    Some(id)
}

#[derive(Debug)]
pub enum PrefsError {
    Io { path: PathBuf, source: io::Error },
    Parse {
        path: PathBuf,
        source: serde_ini::de::Error,
    },
}

impl std::fmt::Display for PrefsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefsError::Io { path, source } => {
                write!(f, "failed to read preferences '{}': {}", path.display(), source)
            }
            PrefsError::Parse { path, source } => {
                write!(f, "failed to parse preferences '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PrefsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrefsError::Io { source, .. } => Some(source),
            PrefsError::Parse { source, .. } => Some(source),
        }
    }
}
