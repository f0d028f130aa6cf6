//! Runtime tunables for collective algorithm selection.
//!
//! All values have defaults matching the stock behavior. Override via
//! environment variables (prefixed `NEXAR_`) or by constructing a custom
//! `SchedConfig` and handing it to the dispatcher.

use crate::error::{Result, SchedError};
use std::path::PathBuf;
use std::str::FromStr;

/// Algorithm choice for intra-group iscatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntraAlgorithm {
    /// Consult the selection table.
    #[default]
    Auto,
    /// Built-in heuristics over the schedule-based algorithms.
    SchedAuto,
    SchedBinomial,
    /// Transport-driven k-nomial tree.
    GentranTree,
}

/// Algorithm choice for inter-group iscatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterAlgorithm {
    #[default]
    Auto,
    SchedAuto,
    SchedLinear,
    SchedRemoteSendLocalScatter,
}

/// Which collectives the device layer may take over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceCollectives {
    None,
    All,
    /// Decided per collective by its own boolean tunable.
    #[default]
    Percoll,
}

impl FromStr for IntraAlgorithm {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sched_auto" => Ok(Self::SchedAuto),
            "sched_binomial" => Ok(Self::SchedBinomial),
            "gentran_tree" => Ok(Self::GentranTree),
            _ => Err(SchedError::InvalidTunable {
                name: "iscatter_intra_algorithm",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for InterAlgorithm {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sched_auto" => Ok(Self::SchedAuto),
            "sched_linear" => Ok(Self::SchedLinear),
            "sched_remote_send_local_scatter" => Ok(Self::SchedRemoteSendLocalScatter),
            _ => Err(SchedError::InvalidTunable {
                name: "iscatter_inter_algorithm",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for DeviceCollectives {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            "percoll" => Ok(Self::Percoll),
            _ => Err(SchedError::InvalidTunable {
                name: "device_collectives",
                value: s.to_string(),
            }),
        }
    }
}

/// Tunables consulted by the iscatter dispatch path at call time.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    pub iscatter_intra_algorithm: IntraAlgorithm,
    pub iscatter_inter_algorithm: InterAlgorithm,

    /// Fan-out of the transport-driven tree.
    pub iscatter_tree_kval: u32,

    /// Lets the device override iscatter when `device_collectives` is
    /// `Percoll`.
    pub iscatter_device_collective: bool,

    pub device_collectives: DeviceCollectives,

    /// Inter-group payloads below this many bytes go through
    /// remote-send-local-scatter; larger ones use the linear algorithm.
    pub scatter_inter_short_msg_size: usize,

    /// Selection table to load instead of the built-in one.
    pub tuning_json_file: Option<PathBuf>,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            iscatter_intra_algorithm: IntraAlgorithm::Auto,
            iscatter_inter_algorithm: InterAlgorithm::Auto,
            iscatter_tree_kval: 2,
            iscatter_device_collective: true,
            device_collectives: DeviceCollectives::Percoll,
            scatter_inter_short_msg_size: 2048,
            tuning_json_file: None,
        }
    }
}

impl SchedConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `NEXAR_ISCATTER_INTRA_ALGORITHM`
    /// - `NEXAR_ISCATTER_INTER_ALGORITHM`
    /// - `NEXAR_ISCATTER_TREE_KVAL`
    /// - `NEXAR_ISCATTER_DEVICE_COLLECTIVE`
    /// - `NEXAR_DEVICE_COLLECTIVES`
    /// - `NEXAR_SCATTER_INTER_SHORT_MSG_SIZE`
    /// - `NEXAR_COLL_SELECTION_TUNING_JSON_FILE`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparseable values are
    /// ignored and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("NEXAR_ISCATTER_INTRA_ALGORITHM") {
            match v.parse() {
                Ok(a) => cfg.iscatter_intra_algorithm = a,
                Err(e) => tracing::warn!("ignoring NEXAR_ISCATTER_INTRA_ALGORITHM: {e}"),
            }
        }
        if let Some(v) = lookup("NEXAR_ISCATTER_INTER_ALGORITHM") {
            match v.parse() {
                Ok(a) => cfg.iscatter_inter_algorithm = a,
                Err(e) => tracing::warn!("ignoring NEXAR_ISCATTER_INTER_ALGORITHM: {e}"),
            }
        }
        if let Some(v) = lookup("NEXAR_ISCATTER_TREE_KVAL") {
            match v.parse::<u32>() {
                Ok(k) if k >= 2 => cfg.iscatter_tree_kval = k,
                _ => tracing::warn!(value = %v, "ignoring NEXAR_ISCATTER_TREE_KVAL"),
            }
        }
        if let Some(v) = lookup("NEXAR_ISCATTER_DEVICE_COLLECTIVE") {
            match parse_bool(&v) {
                Some(b) => cfg.iscatter_device_collective = b,
                None => tracing::warn!(value = %v, "ignoring NEXAR_ISCATTER_DEVICE_COLLECTIVE"),
            }
        }
        if let Some(v) = lookup("NEXAR_DEVICE_COLLECTIVES") {
            match v.parse() {
                Ok(d) => cfg.device_collectives = d,
                Err(e) => tracing::warn!("ignoring NEXAR_DEVICE_COLLECTIVES: {e}"),
            }
        }
        if let Some(v) = lookup("NEXAR_SCATTER_INTER_SHORT_MSG_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => cfg.scatter_inter_short_msg_size = n,
                Err(_) => tracing::warn!(value = %v, "ignoring NEXAR_SCATTER_INTER_SHORT_MSG_SIZE"),
            }
        }
        if let Some(v) = lookup("NEXAR_COLL_SELECTION_TUNING_JSON_FILE")
            && !v.is_empty()
        {
            cfg.tuning_json_file = Some(PathBuf::from(v));
        }

        cfg
    }

    /// Whether the device layer gets first shot at iscatter.
    pub fn iscatter_device_override(&self) -> bool {
        match self.device_collectives {
            DeviceCollectives::All => true,
            DeviceCollectives::Percoll => self.iscatter_device_collective,
            DeviceCollectives::None => false,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
