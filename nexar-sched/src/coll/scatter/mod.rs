//! Scatter algorithms.
//!
//! Schedule builders (`*_sched_*`) only record steps; nothing touches the
//! buffers until the schedule runs. The tree variant drives the transport
//! itself and returns a running request.

mod binomial;
mod gentran_tree;
mod inter_linear;
mod inter_remote_send;
pub mod tree;

pub use binomial::iscatter_intra_sched_binomial;
pub use gentran_tree::{TreeScatter, iscatter_intra_gentran_tree};
pub use inter_linear::iscatter_inter_sched_linear;
pub use inter_remote_send::iscatter_inter_sched_remote_send_local_scatter;

use crate::comm::{CommKind, Communicator};
use crate::config::SchedConfig;
use crate::datatype::Datatype;
use crate::error::Result;
use crate::sched::Schedule;
use crate::types::{RecvBuf, Root};

/// Operands of one scatter call.
///
/// `sendbuf`, `sendcount` and `sendtype` are significant only at the root.
/// `sendcount` is the per-destination element count.
#[derive(Debug, Clone)]
pub struct ScatterArgs {
    pub sendbuf: u64,
    pub sendcount: usize,
    pub sendtype: Datatype,
    pub recvbuf: RecvBuf,
    pub recvcount: usize,
    pub recvtype: Datatype,
    pub root: Root,
}

impl ScatterArgs {
    pub fn new(
        sendbuf: u64,
        sendcount: usize,
        sendtype: Datatype,
        recvbuf: RecvBuf,
        recvcount: usize,
        recvtype: Datatype,
        root: impl Into<Root>,
    ) -> Self {
        Self {
            sendbuf,
            sendcount,
            sendtype,
            recvbuf,
            recvcount,
            recvtype,
            root: root.into(),
        }
    }

    /// Receive address of a rank that is not an intra-group root.
    pub(crate) fn recv_ptr(&self) -> u64 {
        match self.recvbuf {
            RecvBuf::Ptr(p) => p,
            RecvBuf::InPlace => {
                panic!("in-place receive buffer is only valid at the root of an intra-group scatter")
            }
        }
    }
}

/// Strategy chosen by the inter-group size heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterSched {
    Linear,
    RemoteSendLocalScatter,
}

/// Bytes moved across the group boundary, computed the same way on both
/// sides: from the root's send side or from the receiving group.
pub fn inter_payload_bytes(args: &ScatterArgs, comm: &Communicator) -> usize {
    match args.root {
        Root::This => args.sendtype.size() * args.sendcount * comm.remote_size() as usize,
        Root::Rank(_) => args.recvtype.size() * args.recvcount * comm.local_size() as usize,
        Root::Null => 0,
    }
}

/// Short messages go through a proxy in the remote group, long ones are
/// sent directly.
pub fn choose_inter_sched(nbytes: usize, short_msg_size: usize) -> InterSched {
    if nbytes < short_msg_size {
        InterSched::RemoteSendLocalScatter
    } else {
        InterSched::Linear
    }
}

/// Intra-group schedule selection: always binomial.
pub fn iscatter_intra_sched_auto(
    args: &ScatterArgs,
    comm: &Communicator,
    s: &mut Schedule,
) -> Result<()> {
    iscatter_intra_sched_binomial(args, comm, s)
}

/// Inter-group schedule selection by payload size.
pub fn iscatter_inter_sched_auto(
    args: &ScatterArgs,
    comm: &Communicator,
    s: &mut Schedule,
    short_msg_size: usize,
) -> Result<()> {
    let nbytes = inter_payload_bytes(args, comm);
    let choice = choose_inter_sched(nbytes, short_msg_size);
    tracing::debug!(nbytes, short_msg_size, ?choice, "inter iscatter schedule");
    match choice {
        InterSched::RemoteSendLocalScatter => {
            iscatter_inter_sched_remote_send_local_scatter(args, comm, s)
        }
        InterSched::Linear => iscatter_inter_sched_linear(args, comm, s),
    }
}

/// Schedule selection for either kind of communicator.
pub fn iscatter_sched_auto(
    args: &ScatterArgs,
    comm: &Communicator,
    s: &mut Schedule,
    cfg: &SchedConfig,
) -> Result<()> {
    match comm.kind() {
        CommKind::Intra => iscatter_intra_sched_auto(args, comm, s),
        CommKind::Inter => {
            iscatter_inter_sched_auto(args, comm, s, cfg.scatter_inter_short_msg_size)
        }
    }
}
