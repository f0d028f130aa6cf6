use crate::error::{Result, SchedError};
use crate::types::{ContextId, Endpoint, Rank, Tag};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Single-group or two-group communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommKind {
    Intra,
    Inter,
}

impl std::fmt::Display for CommKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommKind::Intra => f.write_str("intra"),
            CommKind::Inter => f.write_str("inter"),
        }
    }
}

/// A process group as seen by one of its members.
///
/// Peer ranks resolve into the local group for intra communicators and into
/// the remote group for inter communicators. An inter communicator reserves
/// two context ids: its own and `context_id + 1` for the internal intra
/// communicator over its local group. Both draw collective tags from one
/// counter, so traffic on the two contexts never reuses a tag.
#[derive(Debug)]
pub struct Communicator {
    kind: CommKind,
    rank: Rank,
    context_id: ContextId,
    local: Vec<Endpoint>,
    remote: Vec<Endpoint>,
    local_comm: Option<Arc<Communicator>>,
    /// Collective tag sequence. Every member calls collectives in the same
    /// order, so the counters advance in lockstep across the group.
    coll_tag: Arc<AtomicU32>,
}

impl Communicator {
    /// Intra communicator over `endpoints`, where index = rank.
    pub fn intra(rank: Rank, context_id: ContextId, endpoints: Vec<Endpoint>) -> Self {
        Self::intra_with_tags(rank, context_id, endpoints, Arc::new(AtomicU32::new(1)))
    }

    fn intra_with_tags(
        rank: Rank,
        context_id: ContextId,
        endpoints: Vec<Endpoint>,
        coll_tag: Arc<AtomicU32>,
    ) -> Self {
        assert!(
            (rank as usize) < endpoints.len(),
            "rank {rank} outside group of size {}",
            endpoints.len()
        );
        Self {
            kind: CommKind::Intra,
            rank,
            context_id,
            local: endpoints,
            remote: Vec::new(),
            local_comm: None,
            coll_tag,
        }
    }

    /// Inter communicator between `local` (containing this process at
    /// `rank`) and the disjoint group `remote`.
    pub fn inter(
        rank: Rank,
        context_id: ContextId,
        local: Vec<Endpoint>,
        remote: Vec<Endpoint>,
    ) -> Self {
        let coll_tag = Arc::new(AtomicU32::new(1));
        let local_comm = Arc::new(Self::intra_with_tags(
            rank,
            context_id + 1,
            local.clone(),
            Arc::clone(&coll_tag),
        ));
        Self {
            kind: CommKind::Inter,
            rank,
            context_id,
            local,
            remote,
            local_comm: Some(local_comm),
            coll_tag,
        }
    }

    pub fn kind(&self) -> CommKind {
        self.kind
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn local_size(&self) -> u32 {
        self.local.len() as u32
    }

    /// Size of the remote group; 0 for intra communicators.
    pub fn remote_size(&self) -> u32 {
        self.remote.len() as u32
    }

    /// Number of ranks addressable by point-to-point calls.
    pub fn peer_count(&self) -> u32 {
        match self.kind {
            CommKind::Intra => self.local_size(),
            CommKind::Inter => self.remote_size(),
        }
    }

    /// Endpoint of this process.
    pub fn endpoint(&self) -> Endpoint {
        self.local[self.rank as usize]
    }

    /// Resolve a peer rank to its endpoint.
    pub fn peer(&self, rank: Rank) -> Result<Endpoint> {
        let group = match self.kind {
            CommKind::Intra => &self.local,
            CommKind::Inter => &self.remote,
        };
        group
            .get(rank as usize)
            .copied()
            .ok_or(SchedError::UnknownPeer {
                rank,
                size: group.len() as u32,
            })
    }

    /// Intra communicator over the local group of an inter communicator.
    pub(crate) fn local_comm(&self) -> Option<&Arc<Communicator>> {
        self.local_comm.as_ref()
    }

    /// Take the next collective tag.
    pub(crate) fn next_coll_tag(&self) -> Tag {
        self.coll_tag.fetch_add(1, Ordering::Relaxed)
    }
}
