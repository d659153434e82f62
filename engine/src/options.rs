//! Engine configuration.
//!
//! `MultiPV` and `Ponder` are controlled per request, so they can live on an
//! [`EngineOptions`] but never make it into a [`ConfigSnapshot`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Option names whose value is decided by each request, never by configuration.
pub const AUTO_MANAGED_OPTIONS: [&str; 2] = ["MultiPV", "Ponder"];

pub fn is_auto_managed(name: &str) -> bool {
    AUTO_MANAGED_OPTIONS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            OptionValue::Str(s) => s.trim().parse().ok(),
            OptionValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            OptionValue::Str(s) => s.trim().parse().ok(),
            OptionValue::Int(_) => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{}", v),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v.into())
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(v.into())
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

/// Provider-specific options. Auto-managed names are refused on every path in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, OptionValue>",
    into = "BTreeMap<String, OptionValue>"
)]
pub struct ExtraOptions(BTreeMap<String, OptionValue>);

impl ExtraOptions {
    /// Returns false (and stores nothing) for auto-managed names.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> bool {
        let name = name.into();
        if is_auto_managed(&name) {
            return false;
        }
        self.0.insert(name, value.into());
        true
    }

    /// Case-insensitive lookup, matching how engines treat option names.
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, OptionValue>> for ExtraOptions {
    fn from(map: BTreeMap<String, OptionValue>) -> Self {
        Self(
            map.into_iter()
                .filter(|(name, _)| !is_auto_managed(name))
                .collect(),
        )
    }
}

impl From<ExtraOptions> for BTreeMap<String, OptionValue> {
    fn from(extra: ExtraOptions) -> Self {
        extra.0
    }
}

/// Caller-facing options attached to an engine descriptor.
///
/// Serializes as one flat object (`{"Threads": 4, "Hash": 256, "Contempt": 10}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(rename = "Threads", default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    #[serde(rename = "Hash", default, skip_serializing_if = "Option::is_none")]
    pub hash_mb: Option<u32>,
    /// Negative means "disabled / full strength" and is never sent.
    #[serde(rename = "Skill Level", default, skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<i32>,
    #[serde(rename = "MultiPV", default, skip_serializing_if = "Option::is_none")]
    pub multi_pv: Option<u32>,
    #[serde(rename = "Ponder", default, skip_serializing_if = "Option::is_none")]
    pub ponder: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraOptions,
}

impl EngineOptions {
    /// Set an option by its engine-facing name.
    ///
    /// Well-known names land in their typed field; returns false when a
    /// well-known option gets a value of the wrong type.
    pub fn set(&mut self, name: &str, value: OptionValue) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "threads" => assign(&mut self.threads, value.as_i64()),
            "hash" => assign(&mut self.hash_mb, value.as_i64()),
            "skill level" => assign(&mut self.skill_level, value.as_i64()),
            "multipv" => assign(&mut self.multi_pv, value.as_i64()),
            "ponder" => match value.as_bool() {
                Some(v) => {
                    self.ponder = Some(v);
                    true
                }
                None => false,
            },
            _ => self.extra.insert(name, value),
        }
    }

    /// Merge engine-kind defaults with these options into what gets sent to the process.
    ///
    /// Order: Threads, Hash, Skill Level (when enabled), then provider options.
    pub fn configuration_snapshot(&self, defaults: &SnapshotDefaults) -> ConfigSnapshot {
        let mut snapshot = ConfigSnapshot::default();
        snapshot.set("Threads", self.threads.unwrap_or(defaults.threads));
        snapshot.set("Hash", self.hash_mb.unwrap_or(defaults.hash_mb));
        if let Some(level) = self.skill_level.filter(|level| *level >= 0) {
            snapshot.set("Skill Level", level);
        }
        for (name, value) in self.extra.iter() {
            snapshot.set(name, value.clone());
        }
        snapshot
    }

    /// Overlay `other` on top of these options; values in `other` win.
    pub fn merged_with(&self, other: &EngineOptions) -> EngineOptions {
        let mut merged = self.clone();
        merged.threads = other.threads.or(self.threads);
        merged.hash_mb = other.hash_mb.or(self.hash_mb);
        merged.skill_level = other.skill_level.or(self.skill_level);
        merged.multi_pv = other.multi_pv.or(self.multi_pv);
        merged.ponder = other.ponder.or(self.ponder);
        for (name, value) in other.extra.iter() {
            merged.extra.insert(name.clone(), value.clone());
        }
        merged
    }
}

fn assign<T: TryFrom<i64>>(slot: &mut Option<T>, value: Option<i64>) -> bool {
    match value.and_then(|v| T::try_from(v).ok()) {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

/// Values used when the caller leaves Threads/Hash unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotDefaults {
    pub threads: u32,
    pub hash_mb: u32,
}

impl SnapshotDefaults {
    /// All logical CPUs, 256 MB hash.
    pub fn modern() -> Self {
        Self {
            threads: host_cpu_count(),
            hash_mb: 256,
        }
    }

    /// Half the logical CPUs, 128 MB hash; leaves room for the rest of the application.
    pub fn avatar() -> Self {
        Self {
            threads: (host_cpu_count() / 2).max(1),
            hash_mb: 128,
        }
    }
}

pub fn host_cpu_count() -> u32 {
    std::thread::available_parallelism()
        .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
        .unwrap_or(1)
}

/// Ordered name/value pairs actually applied to a running engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot(Vec<(String, OptionValue)>);

impl ConfigSnapshot {
    /// Insert or replace a value. Auto-managed names are refused.
    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> bool {
        if is_auto_managed(name) {
            return false;
        }
        let value = value.into();
        match self
            .0
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
