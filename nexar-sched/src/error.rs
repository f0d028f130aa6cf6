use crate::types::{Endpoint, Rank};
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, SchedError>;

/// Errors surfaced by the scheduling core.
///
/// Cloneable so that a request can latch the first failure and hand it to
/// every waiter. Internal consistency failures are panics, not variants.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedError {
    #[error(
        "insufficient buffer for datatype contents: need {ints}/{addrs}/{types} \
         (ints/addrs/types), have {max_ints}/{max_addrs}/{max_types}"
    )]
    InsufficientBuffer {
        ints: usize,
        addrs: usize,
        types: usize,
        max_ints: usize,
        max_addrs: usize,
        max_types: usize,
    },

    #[error("message truncated: {actual} bytes arrived, buffer holds {capacity}")]
    Truncated { actual: usize, capacity: usize },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    #[error("rank {rank} not found in group of size {size}")]
    UnknownPeer { rank: Rank, size: u32 },

    #[error("endpoint {endpoint} is not attached to the fabric")]
    UnknownEndpoint { endpoint: Endpoint },

    #[error("datatype {datatype} is not contiguous; packing is not supported by {transport}")]
    UnsupportedLayout {
        datatype: String,
        transport: &'static str,
    },

    #[error("invalid value {value:?} for tunable {name}")]
    InvalidTunable { name: &'static str, value: String },

    #[error("selection table parse error: {0}")]
    TuningTable(String),

    #[error("device override failed: {0}")]
    Device(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl SchedError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Whether the immediate caller may retry or recover from this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SchedError::InsufficientBuffer { .. } | SchedError::InvalidTunable { .. }
        )
    }
}
