//! Algorithm selection.
//!
//! A named algorithm from the tunables always wins. Otherwise the call's
//! signature is reduced to a [`SigKey`] and looked up in a decision tree,
//! either the built-in one or a JSON tuning file of the form
//!
//! ```json
//! {
//!   "collective=iscatter": {
//!     "comm_type=intra": {
//!       "comm_size<=8": { "algorithm=intra_sched_binomial": {} },
//!       "any": { "algorithm=intra_gentran_tree": { "k=4": {} } }
//!     },
//!     "comm_type=inter": { "algorithm=inter_sched_auto": {} }
//!   }
//! }
//! ```
//!
//! Keys are tried in file order and the first matching one is taken.

use super::scatter::ScatterArgs;
use crate::comm::{CommKind, Communicator};
use crate::config::{InterAlgorithm, IntraAlgorithm, SchedConfig};
use crate::error::{Result, SchedError};
use crate::types::Root;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Collective operation a signature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollType {
    Iscatter,
}

impl CollType {
    pub fn name(self) -> &'static str {
        match self {
            CollType::Iscatter => "iscatter",
        }
    }
}

/// A concrete algorithm and its static parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    IntraGentranTree { k: u32 },
    IntraSchedAuto,
    IntraSchedBinomial,
    InterSchedAuto,
    InterSchedLinear,
    InterSchedRemoteSendLocalScatter,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::IntraGentranTree { .. } => "intra_gentran_tree",
            Algorithm::IntraSchedAuto => "intra_sched_auto",
            Algorithm::IntraSchedBinomial => "intra_sched_binomial",
            Algorithm::InterSchedAuto => "inter_sched_auto",
            Algorithm::InterSchedLinear => "inter_sched_linear",
            Algorithm::InterSchedRemoteSendLocalScatter => "inter_sched_remote_send_local_scatter",
        }
    }

    /// Communicator kind the algorithm runs on.
    pub fn comm_kind(self) -> CommKind {
        match self {
            Algorithm::IntraGentranTree { .. }
            | Algorithm::IntraSchedAuto
            | Algorithm::IntraSchedBinomial => CommKind::Intra,
            Algorithm::InterSchedAuto
            | Algorithm::InterSchedLinear
            | Algorithm::InterSchedRemoteSendLocalScatter => CommKind::Inter,
        }
    }

    /// Parse a table leaf. `k` defaults to 2 when not given.
    pub fn from_name(name: &str, k: Option<u32>) -> Option<Self> {
        Some(match name {
            "intra_gentran_tree" => Algorithm::IntraGentranTree { k: k.unwrap_or(2) },
            "intra_sched_auto" => Algorithm::IntraSchedAuto,
            "intra_sched_binomial" => Algorithm::IntraSchedBinomial,
            "inter_sched_auto" => Algorithm::InterSchedAuto,
            "inter_sched_linear" => Algorithm::InterSchedLinear,
            "inter_sched_remote_send_local_scatter" => Algorithm::InterSchedRemoteSendLocalScatter,
            _ => return None,
        })
    }

    /// Algorithm named by the tunables, or `None` for auto selection.
    pub fn from_tunables(cfg: &SchedConfig, kind: CommKind) -> Option<Self> {
        match kind {
            CommKind::Intra => match cfg.iscatter_intra_algorithm {
                IntraAlgorithm::Auto => None,
                IntraAlgorithm::SchedAuto => Some(Algorithm::IntraSchedAuto),
                IntraAlgorithm::SchedBinomial => Some(Algorithm::IntraSchedBinomial),
                IntraAlgorithm::GentranTree => Some(Algorithm::IntraGentranTree {
                    k: cfg.iscatter_tree_kval,
                }),
            },
            CommKind::Inter => match cfg.iscatter_inter_algorithm {
                InterAlgorithm::Auto => None,
                InterAlgorithm::SchedAuto => Some(Algorithm::InterSchedAuto),
                InterAlgorithm::SchedLinear => Some(Algorithm::InterSchedLinear),
                InterAlgorithm::SchedRemoteSendLocalScatter => {
                    Some(Algorithm::InterSchedRemoteSendLocalScatter)
                }
            },
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::IntraGentranTree { k } => write!(f, "{}(k={k})", self.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Normalized form of a collective call used as the lookup key.
///
/// For inter communicators `comm_size` is the size of the receiving group,
/// so that both groups reach the same decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigKey {
    pub coll: CollType,
    pub comm_kind: CommKind,
    pub comm_size: u32,
    pub total_msg_bytes: usize,
    pub avg_msg_bytes: usize,
    pub root_is_local: bool,
}

impl SigKey {
    pub fn iscatter(args: &ScatterArgs, comm: &Communicator) -> Self {
        let (comm_size, chunk, root_is_local) = match (comm.kind(), args.root) {
            (CommKind::Intra, Root::Rank(r)) => {
                let chunk = if comm.rank() == r {
                    args.sendcount * args.sendtype.size()
                } else {
                    args.recvcount * args.recvtype.size()
                };
                (comm.local_size(), chunk, true)
            }
            (CommKind::Intra, other) => panic!("intra-group scatter called with root {other}"),
            (CommKind::Inter, Root::This) => (
                comm.remote_size(),
                args.sendcount * args.sendtype.size(),
                true,
            ),
            (CommKind::Inter, Root::Null) => (comm.remote_size(), 0, true),
            (CommKind::Inter, Root::Rank(_)) => (
                comm.local_size(),
                args.recvcount * args.recvtype.size(),
                false,
            ),
        };
        Self {
            coll: CollType::Iscatter,
            comm_kind: comm.kind(),
            comm_size,
            total_msg_bytes: chunk * comm_size as usize,
            avg_msg_bytes: chunk,
            root_is_local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cond {
    Collective(CollType),
    CommType(CommKind),
    CommSizeLe(u32),
    CommSizeLt(u32),
    CommSizePow2,
    TotalMsgSizeLe(usize),
    AvgMsgSizeLe(usize),
    IsRootLocal,
    Any,
}

impl Cond {
    fn parse(key: &str) -> Result<Self> {
        let bad = || SchedError::TuningTable(format!("unknown condition {key:?}"));
        let num = |s: &str| s.trim().parse::<usize>().map_err(|_| bad());
        let size = |s: &str| {
            u32::try_from(num(s)?).map_err(|_| {
                SchedError::TuningTable(format!("communicator size out of range in {key:?}"))
            })
        };
        Ok(match key {
            "any" => Cond::Any,
            "comm_size_pow2" => Cond::CommSizePow2,
            "is_root_local" => Cond::IsRootLocal,
            "collective=iscatter" => Cond::Collective(CollType::Iscatter),
            "comm_type=intra" => Cond::CommType(CommKind::Intra),
            "comm_type=inter" => Cond::CommType(CommKind::Inter),
            _ => {
                if let Some(v) = key.strip_prefix("comm_size<=") {
                    Cond::CommSizeLe(size(v)?)
                } else if let Some(v) = key.strip_prefix("comm_size<") {
                    Cond::CommSizeLt(size(v)?)
                } else if let Some(v) = key.strip_prefix("total_msg_size<=") {
                    Cond::TotalMsgSizeLe(num(v)?)
                } else if let Some(v) = key.strip_prefix("avg_msg_size<=") {
                    Cond::AvgMsgSizeLe(num(v)?)
                } else {
                    return Err(bad());
                }
            }
        })
    }

    fn matches(&self, key: &SigKey) -> bool {
        match *self {
            Cond::Collective(c) => key.coll == c,
            Cond::CommType(k) => key.comm_kind == k,
            Cond::CommSizeLe(n) => key.comm_size <= n,
            Cond::CommSizeLt(n) => key.comm_size < n,
            Cond::CommSizePow2 => key.comm_size.is_power_of_two(),
            Cond::TotalMsgSizeLe(n) => key.total_msg_bytes <= n,
            Cond::AvgMsgSizeLe(n) => key.avg_msg_bytes <= n,
            Cond::IsRootLocal => key.root_is_local,
            Cond::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Branch(Vec<(Cond, Node)>),
    Leaf(Algorithm),
}

impl Node {
    fn search(&self, key: &SigKey) -> Option<Algorithm> {
        match self {
            Node::Leaf(a) => Some(*a),
            Node::Branch(entries) => entries
                .iter()
                .find(|(cond, _)| cond.matches(key))
                .and_then(|(_, child)| child.search(key)),
        }
    }

    fn parse(value: &Value, path: &str) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchedError::TuningTable(format!("{path}: expected an object")))?;
        let mut entries = Vec::with_capacity(obj.len());
        for (key, child) in obj {
            let child_path = format!("{path}/{key}");
            if let Some(name) = key.strip_prefix("algorithm=") {
                entries.push((Cond::Any, Node::Leaf(parse_leaf(name, child, &child_path)?)));
            } else {
                entries.push((Cond::parse(key)?, Node::parse(child, &child_path)?));
            }
        }
        Ok(Node::Branch(entries))
    }
}

fn parse_leaf(name: &str, params: &Value, path: &str) -> Result<Algorithm> {
    let obj = params
        .as_object()
        .ok_or_else(|| SchedError::TuningTable(format!("{path}: expected an object")))?;
    let mut k = None;
    for key in obj.keys() {
        match key.strip_prefix("k=").map(str::parse::<u32>) {
            Some(Ok(v)) if v >= 2 => k = Some(v),
            _ => {
                return Err(SchedError::TuningTable(format!(
                    "{path}: bad parameter {key:?}"
                )));
            }
        }
    }
    Algorithm::from_name(name, k)
        .ok_or_else(|| SchedError::TuningTable(format!("{path}: unknown algorithm {name:?}")))
}

/// Decision tree mapping signatures to algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTable {
    root: Node,
}

impl SelectionTable {
    /// Table used when no tuning file is configured: schedule-based
    /// automatic selection for both communicator kinds.
    pub fn builtin() -> Self {
        let intra = Node::Branch(vec![(Cond::Any, Node::Leaf(Algorithm::IntraSchedAuto))]);
        let inter = Node::Branch(vec![(Cond::Any, Node::Leaf(Algorithm::InterSchedAuto))]);
        Self {
            root: Node::Branch(vec![(
                Cond::Collective(CollType::Iscatter),
                Node::Branch(vec![
                    (Cond::CommType(CommKind::Intra), intra),
                    (Cond::CommType(CommKind::Inter), inter),
                ]),
            )]),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SchedError::TuningTable(e.to_string()))?;
        Ok(Self {
            root: Node::parse(&value, "")?,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SchedError::TuningTable(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn search(&self, key: &SigKey) -> Option<Algorithm> {
        self.root.search(key)
    }
}

impl Default for SelectionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Table-driven selector.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    table: SelectionTable,
}

impl Selector {
    pub fn new(table: SelectionTable) -> Self {
        Self { table }
    }

    /// Selector for `cfg`: the configured tuning file, else the built-in
    /// table.
    pub fn load(cfg: &SchedConfig) -> Result<Self> {
        let table = match &cfg.tuning_json_file {
            Some(path) => SelectionTable::from_file(path)?,
            None => SelectionTable::builtin(),
        };
        Ok(Self::new(table))
    }

    /// Look up the algorithm for `key`.
    ///
    /// # Panics
    /// If no entry matches. A table without a match for a well-formed key
    /// is a construction error.
    pub fn select(&self, key: &SigKey) -> Algorithm {
        match self.table.search(key) {
            Some(a) => a,
            None => panic!("selection table has no entry for {key:?}"),
        }
    }
}
