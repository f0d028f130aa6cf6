/// Rank of a participant in a communicator group (0-indexed).
pub type Rank = u32;

/// Global identifier of a process endpoint on the fabric.
///
/// Communicators translate group ranks into endpoints; the transport only
/// ever sees endpoints.
pub type Endpoint = u32;

/// Context id separating the message spaces of different communicators.
pub type ContextId = u32;

/// Message tag. Collectives draw tags from a per-communicator counter.
pub type Tag = u32;

/// Root argument of a rooted collective.
///
/// Intra-group calls always use `Rank`. Inter-group calls use `This` on the
/// root itself, `Null` on the other members of the root's group, and
/// `Rank(r)` on the receiving group, where `r` is the root's rank in the
/// remote group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Root {
    Rank(Rank),
    This,
    Null,
}

impl From<Rank> for Root {
    fn from(r: Rank) -> Self {
        Root::Rank(r)
    }
}

impl std::fmt::Display for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Root::Rank(r) => write!(f, "{r}"),
            Root::This => f.write_str("root"),
            Root::Null => f.write_str("proc_null"),
        }
    }
}

/// Receive buffer of a scatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvBuf {
    /// Caller memory at this address.
    Ptr(u64),
    /// Root of an intra-group scatter keeps its chunk in the send buffer.
    InPlace,
}

impl RecvBuf {
    pub fn ptr(self) -> Option<u64> {
        match self {
            RecvBuf::Ptr(p) => Some(p),
            RecvBuf::InPlace => None,
        }
    }

    pub fn is_in_place(self) -> bool {
        matches!(self, RecvBuf::InPlace)
    }
}
