//! Data-view options persisted in the preference store.

use std::time::Duration;

use crate::compose::{Suffix, SuffixKind};
use crate::prefs::{DATA_GROUP, Preferences};

pub const DEFAULT_ENCODING: &str = "UTF-8";
pub const DEFAULT_REPEAT_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataOptions {
    pub receive_hex: bool,
    pub follow_tail: bool,
    pub realtime: bool,
    pub send_hex: bool,
    pub suffix: Suffix,
    pub repeat_enabled: bool,
    pub repeat_delay: Duration,
    pub flow_dtr: bool,
    pub flow_rts: bool,
    pub encoding: String,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            receive_hex: false,
            follow_tail: false,
            realtime: true,
            send_hex: false,
            suffix: Suffix::default(),
            repeat_enabled: false,
            repeat_delay: DEFAULT_REPEAT_DELAY,
            flow_dtr: false,
            flow_rts: false,
            encoding: DEFAULT_ENCODING.to_string(),
        }
    }
}

impl DataOptions {
    pub fn load(prefs: &dyn Preferences) -> Self {
        let d = Self::default();
        let g = DATA_GROUP;
        Self {
            receive_hex: prefs.get_bool(g, "Recv_Hex", d.receive_hex),
            follow_tail: prefs.get_bool(g, "Recv_Latest", d.follow_tail),
            realtime: prefs.get_bool(g, "Recv_Realtime", d.realtime),
            send_hex: prefs.get_bool(g, "Send_Hex", d.send_hex),
            suffix: Suffix {
                enabled: prefs.get_bool(g, "Suffix_Enabled", d.suffix.enabled),
                kind: SuffixKind::from_index(
                    prefs.get_u64(g, "Suffix_Type", d.suffix.kind.index() as u64) as usize,
                )
                .unwrap_or_default(),
                context: prefs.get_string(g, "Suffix_Context", ""),
            },
            repeat_enabled: prefs.get_bool(g, "Repeat_Enabled", d.repeat_enabled),
            repeat_delay: Duration::from_millis(prefs.get_u64(
                g,
                "Repeat_Delay",
                d.repeat_delay.as_millis() as u64,
            )),
            flow_dtr: prefs.get_bool(g, "Flow_DTR", d.flow_dtr),
            flow_rts: prefs.get_bool(g, "Flow_RTS", d.flow_rts),
            encoding: prefs.get_string(g, "Encoding_Name", DEFAULT_ENCODING),
        }
    }

    /// Save everything except the encoding, which is only stored once verified
    pub fn save(&self, prefs: &mut dyn Preferences) {
        let g = DATA_GROUP;
        prefs.set_bool(g, "Recv_Hex", self.receive_hex);
        prefs.set_bool(g, "Recv_Latest", self.follow_tail);
        prefs.set_bool(g, "Recv_Realtime", self.realtime);
        prefs.set_bool(g, "Send_Hex", self.send_hex);
        prefs.set_bool(g, "Suffix_Enabled", self.suffix.enabled);
        prefs.set(g, "Suffix_Type", &self.suffix.kind.index().to_string());
        prefs.set(g, "Suffix_Context", &self.suffix.context);
        prefs.set_bool(g, "Repeat_Enabled", self.repeat_enabled);
        prefs.set(g, "Repeat_Delay", &self.repeat_delay.as_millis().to_string());
        prefs.set_bool(g, "Flow_DTR", self.flow_dtr);
        prefs.set_bool(g, "Flow_RTS", self.flow_rts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;

    #[test]
    fn test_defaults_from_empty_store() {
        let prefs = MemoryPreferences::new();
        let options = DataOptions::load(&prefs);
        assert_eq!(options, DataOptions::default());
        assert!(options.realtime);
        assert_eq!(options.suffix.kind, SuffixKind::CrLf);
        assert_eq!(options.repeat_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_save_then_load() {
        let mut prefs = MemoryPreferences::new();
        let options = DataOptions {
            receive_hex: true,
            follow_tail: true,
            send_hex: true,
            suffix: Suffix {
                enabled: true,
                kind: SuffixKind::Hex,
                context: "0D".to_string(),
            },
            repeat_delay: Duration::from_millis(250),
            flow_dtr: true,
            ..DataOptions::default()
        };
        options.save(&mut prefs);
        assert_eq!(DataOptions::load(&prefs), options);
        assert_eq!(prefs.get(DATA_GROUP, "Encoding_Name"), None);
    }
}
