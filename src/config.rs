use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesConfig {
    /// Path of the key-value preference store
    #[serde(default = "default_preferences_path")]
    pub path: String,
}

fn default_preferences_path() -> String {
    "preference.ini".to_string()
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Directory for Rx/Tx capture files (capture disabled if not set)
    #[serde(default)]
    pub directory: Option<String>,

    /// Diagnostic level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SerialConfig {
    /// Path to the serial port device (e.g., /dev/ttyUSB0)
    #[serde(default)]
    pub port: Option<String>,

    /// Baud rate for serial communication
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default, deserialize_with = "deserialize_data_bits")]
    pub data_bits: DataBits,

    #[serde(default, deserialize_with = "deserialize_stop_bits")]
    pub stop_bits: StopBits,

    #[serde(default, deserialize_with = "deserialize_parity")]
    pub parity: Parity,

    #[serde(default, deserialize_with = "deserialize_flow_control")]
    pub flow_control: FlowControl,
}

fn default_baud_rate() -> u32 {
    115200
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            stop_bits: StopBits::default(),
            parity: Parity::default(),
            flow_control: FlowControl::default(),
        }
    }
}

/// Character size. Indices follow the order 5, 6, 7, 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    const ALL: [DataBits; 4] = [DataBits::Five, DataBits::Six, DataBits::Seven, DataBits::Eight];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|b| *b == self).unwrap_or(3)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn bits(self) -> u8 {
        5 + self.index() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    const ALL: [StopBits; 3] = [StopBits::One, StopBits::OneAndHalf, StopBits::Two];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|b| *b == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopBits::One => write!(f, "1"),
            StopBits::OneAndHalf => write!(f, "1.5"),
            StopBits::Two => write!(f, "2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
    Space,
    Mark,
}

impl Parity {
    const ALL: [Parity; 5] = [Parity::None, Parity::Even, Parity::Odd, Parity::Space, Parity::Mark];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parity::None => "none",
            Parity::Even => "even",
            Parity::Odd => "odd",
            Parity::Space => "space",
            Parity::Mark => "mark",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

impl FlowControl {
    const ALL: [FlowControl; 3] = [FlowControl::None, FlowControl::Hardware, FlowControl::Software];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Deserialize a boolean from string (for INI file compatibility)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid<E: serde::de::Error>(field: &str, value: &str, expected: &str) -> E {
    E::custom(format!(
        "invalid {} value '{}', expected {}",
        field, value, expected
    ))
}

fn deserialize_data_bits<'de, D>(deserializer: D) -> Result<DataBits, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.trim() {
        "5" => Ok(DataBits::Five),
        "6" => Ok(DataBits::Six),
        "7" => Ok(DataBits::Seven),
        "8" => Ok(DataBits::Eight),
        other => Err(invalid("data_bits", other, "5/6/7/8")),
    }
}

fn deserialize_stop_bits<'de, D>(deserializer: D) -> Result<StopBits, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.trim() {
        "1" => Ok(StopBits::One),
        "1.5" => Ok(StopBits::OneAndHalf),
        "2" => Ok(StopBits::Two),
        other => Err(invalid("stop_bits", other, "1/1.5/2")),
    }
}

fn deserialize_parity<'de, D>(deserializer: D) -> Result<Parity, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.trim().to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "even" => Ok(Parity::Even),
        "odd" => Ok(Parity::Odd),
        "space" => Ok(Parity::Space),
        "mark" => Ok(Parity::Mark),
        other => Err(invalid("parity", other, "none/even/odd/space/mark")),
    }
}

fn deserialize_flow_control<'de, D>(deserializer: D) -> Result<FlowControl, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.trim().to_lowercase().as_str() {
        "none" => Ok(FlowControl::None),
        "hardware" | "rtscts" => Ok(FlowControl::Hardware),
        "software" | "xonxoff" => Ok(FlowControl::Software),
        other => Err(invalid("flow_control", other, "none/hardware/software")),
    }
}

impl Config {
    /// Load configuration from an INI file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;

        Self::parse(&contents).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_ini::de::Error> {
        serde_ini::from_str(contents)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: std::path::PathBuf,
        source: serde_ini::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let ini = "[serial]\nport=/dev/ttyUSB0\nbaud_rate=9600\ndata_bits=7\nstop_bits=2\nparity=even\nflow_control=hardware\n\n[preferences]\npath=prefs.ini\n\n[logging]\ndirectory=logs\nlevel=debug\n";
        let config = Config::parse(ini).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, DataBits::Seven);
        assert_eq!(config.serial.stop_bits, StopBits::Two);
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.flow_control, FlowControl::Hardware);
        assert_eq!(config.preferences.path, "prefs.ini");
        assert_eq!(config.logging.directory.as_deref(), Some("logs"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::parse("[serial]\nport=COM3\n").unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.data_bits, DataBits::Eight);
        assert_eq!(config.preferences.path, "preference.ini");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_invalid_parity_rejected() {
        assert!(Config::parse("[serial]\nparity=sometimes\n").is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_index_roundtrip() {
        for i in 0..4 {
            assert_eq!(DataBits::from_index(i).unwrap().index(), i);
        }
        assert_eq!(DataBits::Eight.bits(), 8);
        assert_eq!(StopBits::from_index(1), Some(StopBits::OneAndHalf));
        assert_eq!(Parity::from_index(4), Some(Parity::Mark));
        assert_eq!(FlowControl::from_index(3), None);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load_or_default("/nonexistent/serialtest.ini").unwrap();
        assert!(config.serial.port.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[serial]").unwrap();
        writeln!(file, "port=/dev/ttyACM0").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
    }
}
