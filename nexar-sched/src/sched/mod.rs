//! Schedules: a DAG of primitive steps executed incrementally.
//!
//! A collective algorithm records sends, receives, local copies and
//! barriers into a [`Schedule`] up front. Execution is poll driven: each
//! call to [`Schedule::progress`] issues every step whose dependencies are
//! done and tests the transport operations already in flight.

mod exec;

use crate::comm::Communicator;
use crate::datatype::Datatype;
use crate::error::Result;
use crate::transport::{MsgSpec, OpHandle};
use crate::types::{Rank, Tag};
use std::collections::VecDeque;

/// Index of a step inside its schedule.
pub type StepId = usize;

/// Index of a schedule-owned temporary buffer.
pub type TempId = usize;

/// Buffer operand of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufRef {
    /// Caller memory.
    User(u64),
    /// Byte offset into a temporary buffer owned by the schedule.
    Temp { id: TempId, offset: usize },
}

impl BufRef {
    /// The same buffer advanced by `bytes`.
    pub fn offset(self, bytes: usize) -> Self {
        match self {
            BufRef::User(p) => BufRef::User(p + bytes as u64),
            BufRef::Temp { id, offset } => BufRef::Temp {
                id,
                offset: offset + bytes,
            },
        }
    }

    pub fn temp(id: TempId) -> Self {
        BufRef::Temp { id, offset: 0 }
    }
}

/// What a step does when it is issued.
#[derive(Debug, Clone)]
pub enum StepKind {
    Send {
        rank: Rank,
        msg: MsgSpec,
        buf: BufRef,
        count: usize,
        dtype: Datatype,
    },
    Recv {
        rank: Rank,
        msg: MsgSpec,
        buf: BufRef,
        count: usize,
        dtype: Datatype,
    },
    Copy {
        src: BufRef,
        scount: usize,
        stype: Datatype,
        dst: BufRef,
        rcount: usize,
        rtype: Datatype,
    },
    /// Join point with no effect of its own.
    Barrier,
}

impl StepKind {
    /// Whether the step needs a transport operation.
    pub fn is_network(&self) -> bool {
        matches!(self, StepKind::Send { .. } | StepKind::Recv { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepState {
    Waiting,
    Issued(OpHandle),
    Done,
}

#[derive(Debug)]
pub struct Step {
    kind: StepKind,
    deps: Vec<StepId>,
    dependents: Vec<StepId>,
    /// Dependencies not yet done.
    pending: usize,
    state: StepState,
}

impl Step {
    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn deps(&self) -> &[StepId] {
        &self.deps
    }

    pub fn is_done(&self) -> bool {
        self.state == StepState::Done
    }
}

/// A collective operation as a graph of steps.
///
/// Every step added after a [`fence`](Schedule::fence) depends on that
/// fence, and a fence depends on every step added since the previous one.
/// Dependencies always point at earlier steps, so the graph is acyclic by
/// construction.
pub struct Schedule {
    tag: Tag,
    steps: Vec<Step>,
    temps: Vec<Vec<u8>>,
    last_fence: Option<StepId>,
    since_fence: Vec<StepId>,

    started: bool,
    ready: VecDeque<StepId>,
    in_flight: Vec<StepId>,
    completed: usize,
}

impl Schedule {
    /// Empty schedule whose messages carry `tag`.
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            steps: Vec::new(),
            temps: Vec::new(),
            last_fence: None,
            since_fence: Vec::new(),
            started: false,
            ready: VecDeque::new(),
            in_flight: Vec::new(),
            completed: 0,
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Allocate a zeroed temporary buffer freed together with the schedule.
    pub fn alloc_temp(&mut self, bytes: usize) -> TempId {
        self.temps.push(vec![0u8; bytes]);
        self.temps.len() - 1
    }

    pub fn temp_len(&self, id: TempId) -> usize {
        self.temps[id].len()
    }

    /// Record a send of `count` elements at `buf` to `dest` in `comm`.
    pub fn send(
        &mut self,
        comm: &Communicator,
        dest: Rank,
        buf: BufRef,
        count: usize,
        dtype: &Datatype,
    ) -> Result<StepId> {
        let msg = self.msg(comm, dest)?;
        Ok(self.add_step(
            StepKind::Send {
                rank: dest,
                msg,
                buf,
                count,
                dtype: dtype.clone(),
            },
            &[],
        ))
    }

    /// Record a receive of up to `count` elements into `buf` from `src`.
    pub fn recv(
        &mut self,
        comm: &Communicator,
        src: Rank,
        buf: BufRef,
        count: usize,
        dtype: &Datatype,
    ) -> Result<StepId> {
        let msg = self.msg(comm, src)?;
        Ok(self.add_step(
            StepKind::Recv {
                rank: src,
                msg,
                buf,
                count,
                dtype: dtype.clone(),
            },
            &[],
        ))
    }

    /// Record a local copy between two buffers.
    pub fn copy(
        &mut self,
        src: BufRef,
        scount: usize,
        stype: &Datatype,
        dst: BufRef,
        rcount: usize,
        rtype: &Datatype,
    ) -> StepId {
        self.add_step(
            StepKind::Copy {
                src,
                scount,
                stype: stype.clone(),
                dst,
                rcount,
                rtype: rtype.clone(),
            },
            &[],
        )
    }

    /// Insert a barrier: later steps start only after everything recorded
    /// so far has completed.
    pub fn fence(&mut self) -> StepId {
        let mut deps = std::mem::take(&mut self.since_fence);
        if let Some(f) = self.last_fence {
            deps.push(f);
        }
        let id = self.push(StepKind::Barrier, deps);
        self.last_fence = Some(id);
        id
    }

    /// Add a step with explicit dependencies in addition to the last fence.
    pub fn add_step(&mut self, kind: StepKind, deps: &[StepId]) -> StepId {
        let mut all: Vec<StepId> = deps.to_vec();
        if let Some(f) = self.last_fence {
            all.push(f);
        }
        let id = self.push(kind, all);
        self.since_fence.push(id);
        id
    }

    fn push(&mut self, kind: StepKind, mut deps: Vec<StepId>) -> StepId {
        assert!(!self.started, "step added to a schedule that already started");
        let id = self.steps.len();
        deps.sort_unstable();
        deps.dedup();
        for &d in &deps {
            assert!(d < id, "step {id} depends on later step {d}");
            self.steps[d].dependents.push(id);
        }
        self.steps.push(Step {
            kind,
            pending: deps.len(),
            deps,
            dependents: Vec::new(),
            state: StepState::Waiting,
        });
        id
    }

    fn msg(&self, comm: &Communicator, rank: Rank) -> Result<MsgSpec> {
        Ok(MsgSpec {
            peer: comm.peer(rank)?,
            context_id: comm.context_id(),
            tag: self.tag,
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of send and receive steps.
    pub fn network_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.kind.is_network()).count()
    }

    /// Longest dependency chain, counted in send and receive steps.
    pub fn critical_path(&self) -> usize {
        let mut depth = vec![0usize; self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            let before = step.deps.iter().map(|&d| depth[d]).max().unwrap_or(0);
            depth[i] = before + usize::from(step.kind.is_network());
        }
        depth.into_iter().max().unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.steps.len()
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("tag", &self.tag)
            .field("steps", &self.steps.len())
            .field("completed", &self.completed)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
