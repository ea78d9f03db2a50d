//! User-defined control items and their line-oriented text format.
//!
//! One record per line, fields separated by commas:
//!
//! ```text
//! command,<label>,<payload>
//! slider,<label>,<min>,<max>,<step>,<value>,<template>
//! spinbox,<label>,<min>,<max>,<step>,<value>,<template>
//! checkbox,<label>,<0|1>,<on payload>,<off payload>
//! ```
//!
//! Payloads are `t:<text>` or `h:<hex>`. Inside a field `\\`, `\,`, `\n`,
//! `\r` and `\t` are escapes. Lines starting with `#` and blank lines are
//! skipped on import.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use crate::buffer::{is_hex_text, parse_hex};
use crate::decode::StreamDecoder;

/// Placeholder replaced by the current value in slider/spin box templates
pub const VALUE_PLACEHOLDER: &str = "{}";

const EXPORT_HEADER: [&str; 2] = [
    "# SerialTest control items, one per line: <kind>,<label>,<fields>,<payload>",
    "# To import, load this file with /ctrl import <path>.",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Hex(String),
}

impl Payload {
    pub fn to_bytes(&self, decoder: &StreamDecoder) -> Vec<u8> {
        match self {
            Payload::Text(text) => decoder.encode(text),
            Payload::Hex(hex) => parse_hex(hex),
        }
    }

    fn serialize(&self) -> String {
        match self {
            Payload::Text(text) => format!("t:{}", text),
            Payload::Hex(hex) => format!("h:{}", hex),
        }
    }

    fn parse(field: &str) -> Result<Self, ControlParseError> {
        if let Some(text) = field.strip_prefix("t:") {
            Ok(Payload::Text(text.to_string()))
        } else if let Some(hex) = field.strip_prefix("h:") {
            if !is_hex_text(&hex.replace(VALUE_PLACEHOLDER, "")) {
                return Err(ControlParseError::InvalidPayload(field.to_string()));
            }
            Ok(Payload::Hex(hex.to_string()))
        } else {
            Err(ControlParseError::InvalidPayload(field.to_string()))
        }
    }
}

/// Numeric range shared by sliders and spin boxes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranged {
    pub min: i64,
    pub max: i64,
    pub step: i64,
    pub value: i64,
    pub template: Payload,
}

impl Ranged {
    pub fn new(min: i64, max: i64, step: i64, template: Payload) -> Result<Self, ControlParseError> {
        let ranged = Self {
            min,
            max,
            step,
            value: min,
            template,
        };
        ranged.validate()?;
        Ok(ranged)
    }

    fn validate(&self) -> Result<(), ControlParseError> {
        if self.step <= 0 || self.min > self.max || !(self.min..=self.max).contains(&self.value) {
            return Err(ControlParseError::InvalidRange {
                min: self.min,
                max: self.max,
                step: self.step,
                value: self.value,
            });
        }
        Ok(())
    }

    /// Set the value, clamped to the range and snapped to the step grid
    pub fn set_value(&mut self, value: i64) {
        // i128 holds any offset across the full i64 range
        let min = i128::from(self.min);
        let max = i128::from(self.max);
        let step = i128::from(self.step);
        let clamped = i128::from(value.clamp(self.min, self.max));

        let mut snapped = min + (clamped - min + step / 2) / step * step;
        if snapped > max {
            snapped -= step;
        }
        self.value = i64::try_from(snapped).unwrap_or(self.max);
    }

    pub fn message(&self, decoder: &StreamDecoder) -> Vec<u8> {
        match &self.template {
            Payload::Text(text) => {
                let value = self.value.to_string();
                decoder.encode(&substitute(text, &value))
            }
            Payload::Hex(hex) => {
                let mut digits = if self.value < 0 {
                    format!("{:x}", self.value as u64)
                } else {
                    format!("{:x}", self.value)
                };
                if digits.len() % 2 == 1 {
                    digits.insert(0, '0');
                }
                parse_hex(&substitute(hex, &digits))
            }
        }
    }
}

fn substitute(template: &str, value: &str) -> String {
    if template.contains(VALUE_PLACEHOLDER) {
        template.replace(VALUE_PLACEHOLDER, value)
    } else {
        format!("{}{}", template, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Command,
    Slider,
    CheckBox,
    SpinBox,
}

impl ControlKind {
    pub fn name(self) -> &'static str {
        match self {
            ControlKind::Command => "command",
            ControlKind::Slider => "slider",
            ControlKind::CheckBox => "checkbox",
            ControlKind::SpinBox => "spinbox",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "command" => Some(ControlKind::Command),
            "slider" => Some(ControlKind::Slider),
            "checkbox" => Some(ControlKind::CheckBox),
            "spinbox" => Some(ControlKind::SpinBox),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Command { payload: Payload },
    Slider(Ranged),
    SpinBox(Ranged),
    CheckBox { checked: bool, on: Payload, off: Payload },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlItemSpec {
    pub label: String,
    pub control: Control,
}

impl ControlItemSpec {
    pub fn command(label: impl Into<String>, payload: Payload) -> Self {
        Self {
            label: label.into(),
            control: Control::Command { payload },
        }
    }

    pub fn kind(&self) -> ControlKind {
        match self.control {
            Control::Command { .. } => ControlKind::Command,
            Control::Slider(_) => ControlKind::Slider,
            Control::SpinBox(_) => ControlKind::SpinBox,
            Control::CheckBox { .. } => ControlKind::CheckBox,
        }
    }

    /// Bytes this item sends in its current state
    pub fn message(&self, decoder: &StreamDecoder) -> Vec<u8> {
        match &self.control {
            Control::Command { payload } => payload.to_bytes(decoder),
            Control::Slider(ranged) | Control::SpinBox(ranged) => ranged.message(decoder),
            Control::CheckBox { checked, on, off } => {
                if *checked {
                    on.to_bytes(decoder)
                } else {
                    off.to_bytes(decoder)
                }
            }
        }
    }

    /// Set the value of a slider or spin box. Returns false for other kinds.
    pub fn set_value(&mut self, value: i64) -> bool {
        match &mut self.control {
            Control::Slider(ranged) | Control::SpinBox(ranged) => {
                ranged.set_value(value);
                true
            }
            _ => false,
        }
    }

    /// Flip a check box. Returns false for other kinds.
    pub fn toggle(&mut self) -> bool {
        match &mut self.control {
            Control::CheckBox { checked, .. } => {
                *checked = !*checked;
                true
            }
            _ => false,
        }
    }

    /// Encode as one record line (without the newline)
    pub fn serialize(&self) -> String {
        let mut fields = vec![self.kind().name().to_string(), self.label.clone()];
        match &self.control {
            Control::Command { payload } => fields.push(payload.serialize()),
            Control::Slider(r) | Control::SpinBox(r) => {
                fields.push(r.min.to_string());
                fields.push(r.max.to_string());
                fields.push(r.step.to_string());
                fields.push(r.value.to_string());
                fields.push(r.template.serialize());
            }
            Control::CheckBox { checked, on, off } => {
                fields.push(if *checked { "1" } else { "0" }.to_string());
                fields.push(on.serialize());
                fields.push(off.serialize());
            }
        }
        fields.iter().map(|f| escape(f)).collect::<Vec<_>>().join(",")
    }

    /// Decode one record line
    pub fn parse(line: &str) -> Result<Self, ControlParseError> {
        let fields = split_fields(line.trim_end_matches(['\r', '\n']))?;
        let kind_name = fields.first().map(String::as_str).unwrap_or_default();
        let kind = ControlKind::from_name(kind_name)
            .ok_or_else(|| ControlParseError::UnknownKind(kind_name.to_string()))?;

        let expected = match kind {
            ControlKind::Command => 3,
            ControlKind::Slider | ControlKind::SpinBox => 7,
            ControlKind::CheckBox => 5,
        };
        if fields.len() != expected {
            return Err(ControlParseError::FieldCount {
                kind: kind.name(),
                expected,
                found: fields.len(),
            });
        }

        let label = fields[1].clone();
        let control = match kind {
            ControlKind::Command => Control::Command {
                payload: Payload::parse(&fields[2])?,
            },
            ControlKind::Slider | ControlKind::SpinBox => {
                let ranged = Ranged {
                    min: parse_number("min", &fields[2])?,
                    max: parse_number("max", &fields[3])?,
                    step: parse_number("step", &fields[4])?,
                    value: parse_number("value", &fields[5])?,
                    template: Payload::parse(&fields[6])?,
                };
                ranged.validate()?;
                if kind == ControlKind::Slider {
                    Control::Slider(ranged)
                } else {
                    Control::SpinBox(ranged)
                }
            }
            ControlKind::CheckBox => {
                let checked = match fields[2].trim() {
                    "1" => true,
                    "0" => false,
                    other => {
                        return Err(ControlParseError::InvalidNumber {
                            field: "checked",
                            value: other.to_string(),
                        });
                    }
                };
                Control::CheckBox {
                    checked,
                    on: Payload::parse(&fields[3])?,
                    off: Payload::parse(&fields[4])?,
                }
            }
        };
        Ok(Self { label, control })
    }
}

impl fmt::Display for ControlItemSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind().name(), self.label)?;
        match &self.control {
            Control::Command { payload } => write!(f, " -> {}", payload.serialize()),
            Control::Slider(r) | Control::SpinBox(r) => write!(
                f,
                " = {} ({}..={} step {}) -> {}",
                r.value,
                r.min,
                r.max,
                r.step,
                r.template.serialize()
            ),
            Control::CheckBox { checked, on, off } => write!(
                f,
                " [{}] on {} / off {}",
                if *checked { "x" } else { " " },
                on.serialize(),
                off.serialize()
            ),
        }
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<i64, ControlParseError> {
    value.trim().parse().map_err(|_| ControlParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn split_fields(line: &str) -> Result<Vec<String>, ControlParseError> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some('t') => current.push('\t'),
                Some(other) => current.push(other),
                None => return Err(ControlParseError::DanglingEscape),
            },
            ',' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    Ok(fields)
}

/// Stable handle of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

/// Outcome of an import batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
}

/// Ordered collection of control items
#[derive(Debug, Default)]
pub struct ControlRegistry {
    items: Vec<(ItemId, ControlItemSpec)>,
    next_id: u64,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert at `index` (clamped to the end) and return the new handle
    pub fn insert(&mut self, index: usize, spec: ControlItemSpec) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        let index = index.min(self.items.len());
        self.items.insert(index, (id, spec));
        id
    }

    pub fn push(&mut self, spec: ControlItemSpec) -> ItemId {
        self.insert(self.items.len(), spec)
    }

    pub fn remove(&mut self, id: ItemId) -> Option<ControlItemSpec> {
        let index = self.position(id)?;
        Some(self.items.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|(item_id, _)| *item_id == id)
    }

    pub fn id_at(&self, index: usize) -> Option<ItemId> {
        self.items.get(index).map(|(id, _)| *id)
    }

    pub fn get(&self, id: ItemId) -> Option<&ControlItemSpec> {
        self.items.iter().find(|(item_id, _)| *item_id == id).map(|(_, spec)| spec)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut ControlItemSpec> {
        self.items
            .iter_mut()
            .find(|(item_id, _)| *item_id == id)
            .map(|(_, spec)| spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &ControlItemSpec)> {
        self.items.iter().map(|(id, spec)| (*id, spec))
    }

    /// Append every valid record in `text`. Bad records are skipped.
    pub fn import_str(&mut self, text: &str) -> ImportReport {
        let mut report = ImportReport::default();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match ControlItemSpec::parse(line) {
                Ok(spec) => {
                    self.push(spec);
                    report.added += 1;
                }
                Err(e) => {
                    tracing::debug!("skipping control record on line {}: {}", number + 1, e);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    pub fn import_file<P: AsRef<Path>>(&mut self, path: P) -> io::Result<ImportReport> {
        let bytes = fs::read(path)?;
        Ok(self.import_str(&String::from_utf8_lossy(&bytes)))
    }

    pub fn export_string(&self) -> String {
        let mut out = String::new();
        for line in EXPORT_HEADER {
            out.push_str(line);
            out.push('\n');
        }
        for (_, spec) in self.iter() {
            out.push_str(&spec.serialize());
            out.push('\n');
        }
        out
    }

    pub fn export_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, self.export_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlParseError {
    UnknownKind(String),
    FieldCount {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    InvalidNumber {
        field: &'static str,
        value: String,
    },
    InvalidRange {
        min: i64,
        max: i64,
        step: i64,
        value: i64,
    },
    InvalidPayload(String),
    DanglingEscape,
}

impl fmt::Display for ControlParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlParseError::UnknownKind(kind) => write!(f, "unknown item kind '{}'", kind),
            ControlParseError::FieldCount {
                kind,
                expected,
                found,
            } => write!(f, "{} needs {} fields, found {}", kind, expected, found),
            ControlParseError::InvalidNumber { field, value } => {
                write!(f, "invalid {} '{}'", field, value)
            }
            ControlParseError::InvalidRange {
                min,
                max,
                step,
                value,
            } => write!(
                f,
                "invalid range: value {} in {}..={} step {}",
                value, min, max, step
            ),
            ControlParseError::InvalidPayload(p) => write!(f, "invalid payload '{}'", p),
            ControlParseError::DanglingEscape => write!(f, "line ends inside an escape"),
        }
    }
}

impl std::error::Error for ControlParseError {}
