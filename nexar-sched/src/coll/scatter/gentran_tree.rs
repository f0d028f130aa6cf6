use super::ScatterArgs;
use super::tree::{KnomialTree, absolute, relative};
use crate::coll::select::Algorithm;
use crate::comm::{CommKind, Communicator};
use crate::datatype::Datatype;
use crate::error::Result;
use crate::progress::ProgressEngine;
use crate::request::Request;
use crate::transport::{MsgSpec, OpHandle, Transport, contiguous_region, local_copy};
use crate::types::Root;
use std::sync::atomic::{AtomicUsize, Ordering};

/// k-nomial tree scatter driven straight against the transport.
///
/// The request's completion counter starts at the number of transport
/// operations this rank performs (one receive unless it is the root, plus
/// one send per child) and drops as each completes.
///
/// # Safety
/// `args` buffers must stay valid until the returned request completes.
pub unsafe fn iscatter_intra_gentran_tree(
    args: &ScatterArgs,
    comm: &Communicator,
    k: u32,
    engine: &ProgressEngine,
) -> Result<Request> {
    let tag = comm.next_coll_tag();
    let tree = unsafe { TreeScatter::new(args, comm, k, tag)? };
    tracing::debug!(
        rank = comm.rank(),
        k,
        ops = tree.pending_ops(),
        "iscatter tree started"
    );
    let req = Request::with_tree(Algorithm::IntraGentranTree { k }.name(), tree);
    engine.start(&req);
    Ok(req)
}

enum Source {
    User(u64),
    Staging,
}

enum RecvInto {
    User {
        ptr: u64,
        count: usize,
        dtype: Datatype,
    },
    Staging {
        bytes: usize,
    },
}

struct ChildSend {
    msg: MsgSpec,
    offset: usize,
    bytes: usize,
}

/// Per-rank state of one tree scatter.
pub struct TreeScatter {
    staging: Vec<u8>,
    source: Source,
    parent: Option<(MsgSpec, RecvInto)>,
    /// Own chunk to copy out of staging once the parent's data arrives.
    own_out: Option<(u64, usize, Datatype)>,
    chunk: usize,
    children: Vec<ChildSend>,

    started: bool,
    forwarded: bool,
    recv_op: Option<OpHandle>,
    sends: Vec<OpHandle>,
}

impl TreeScatter {
    fn empty() -> Self {
        Self {
            staging: Vec::new(),
            source: Source::Staging,
            parent: None,
            own_out: None,
            chunk: 0,
            children: Vec::new(),
            started: false,
            forwarded: false,
            recv_op: None,
            sends: Vec::new(),
        }
    }

    /// Plan this rank's part. The root's local copies happen here.
    ///
    /// # Safety
    /// The root's send buffer and receive buffer must be valid.
    pub(crate) unsafe fn new(
        args: &ScatterArgs,
        comm: &Communicator,
        k: u32,
        tag: u32,
    ) -> Result<Self> {
        assert_eq!(
            comm.kind(),
            CommKind::Intra,
            "tree scatter needs an intra communicator"
        );
        let root = match args.root {
            Root::Rank(r) => r,
            other => panic!("intra-group scatter called with root {other}"),
        };
        let n = comm.local_size();
        let rank = comm.rank();
        let rel = relative(rank, root, n);
        let tree = KnomialTree::new(rel, n, k);
        let byte = Datatype::BYTE;
        let msg = |rel_peer: u32| -> Result<MsgSpec> {
            Ok(MsgSpec {
                peer: comm.peer(absolute(rel_peer, root, n))?,
                context_id: comm.context_id(),
                tag,
            })
        };

        let mut me = Self::empty();

        if rank == root {
            if args.sendcount == 0 {
                return Ok(me);
            }
            let stride = args.sendcount * args.sendtype.extent() as usize;
            let own = args.sendbuf + (root as usize * stride) as u64;
            if let Some(recv) = args.recvbuf.ptr() {
                unsafe {
                    local_copy(
                        own,
                        args.sendcount,
                        &args.sendtype,
                        recv,
                        args.recvcount,
                        &args.recvtype,
                    )?
                };
            }
            me.chunk = args.sendcount * args.sendtype.size();

            if root == 0 {
                let (start, _) = contiguous_region(
                    args.sendbuf,
                    n as usize * args.sendcount,
                    &args.sendtype,
                    "tree scatter",
                )?;
                me.source = Source::User(start);
            } else {
                let head = (n - root) as usize;
                me.staging = vec![0u8; n as usize * me.chunk];
                let base = me.staging.as_mut_ptr() as u64;
                unsafe {
                    local_copy(
                        own,
                        head * args.sendcount,
                        &args.sendtype,
                        base,
                        head * me.chunk,
                        &byte,
                    )?;
                    local_copy(
                        args.sendbuf,
                        root as usize * args.sendcount,
                        &args.sendtype,
                        base + (head * me.chunk) as u64,
                        root as usize * me.chunk,
                        &byte,
                    )?;
                }
            }
        } else {
            if args.recvcount == 0 {
                return Ok(me);
            }
            let Some(parent) = tree.parent else {
                unreachable!("non-root relative rank {rel} has no parent");
            };
            me.chunk = args.recvcount * args.recvtype.size();
            let recv = args.recv_ptr();
            let into = if tree.is_leaf() {
                RecvInto::User {
                    ptr: recv,
                    count: args.recvcount,
                    dtype: args.recvtype.clone(),
                }
            } else {
                let bytes = tree.subtree_len as usize * me.chunk;
                me.staging = vec![0u8; bytes];
                me.own_out = Some((recv, args.recvcount, args.recvtype.clone()));
                RecvInto::Staging { bytes }
            };
            me.parent = Some((msg(parent)?, into));
        }

        for &(child, len) in &tree.children {
            me.children.push(ChildSend {
                msg: msg(child)?,
                offset: (child - rel) as usize * me.chunk,
                bytes: len as usize * me.chunk,
            });
        }
        Ok(me)
    }

    /// Transport operations this rank will perform.
    pub fn pending_ops(&self) -> usize {
        usize::from(self.parent.is_some()) + self.children.len()
    }

    /// Advance the scatter, decrementing `cc` for each finished operation.
    /// On error every outstanding operation is cancelled.
    pub(crate) fn progress(&mut self, transport: &dyn Transport, cc: &AtomicUsize) -> Result<bool> {
        match self.advance(transport, cc) {
            Ok(done) => Ok(done),
            Err(e) => {
                self.abort(transport);
                Err(e)
            }
        }
    }

    fn advance(&mut self, transport: &dyn Transport, cc: &AtomicUsize) -> Result<bool> {
        if !self.started {
            self.started = true;
            match &self.parent {
                Some((msg, into)) => {
                    let op = match into {
                        RecvInto::User { ptr, count, dtype } => unsafe {
                            transport.post_recv(*msg, *ptr, *count, dtype)?
                        },
                        RecvInto::Staging { bytes } => unsafe {
                            transport.post_recv(
                                *msg,
                                self.staging.as_mut_ptr() as u64,
                                *bytes,
                                &Datatype::BYTE,
                            )?
                        },
                    };
                    self.recv_op = Some(op);
                }
                None => self.forward(transport)?,
            }
        }

        if let Some(op) = self.recv_op.take() {
            if transport.test(op)? {
                cc.fetch_sub(1, Ordering::AcqRel);
                if let Some((ptr, count, dtype)) = self.own_out.take() {
                    unsafe {
                        local_copy(
                            self.staging.as_ptr() as u64,
                            self.chunk,
                            &Datatype::BYTE,
                            ptr,
                            count,
                            &dtype,
                        )?
                    };
                }
                self.forward(transport)?;
            } else {
                self.recv_op = Some(op);
            }
        }

        let mut waiting = std::mem::take(&mut self.sends).into_iter();
        while let Some(op) = waiting.next() {
            match transport.test(op) {
                Ok(true) => {
                    cc.fetch_sub(1, Ordering::AcqRel);
                }
                Ok(false) => self.sends.push(op),
                Err(e) => {
                    self.sends.extend(waiting);
                    return Err(e);
                }
            }
        }

        Ok(self.forwarded && self.recv_op.is_none() && self.sends.is_empty())
    }

    /// Post all child sends at once.
    fn forward(&mut self, transport: &dyn Transport) -> Result<()> {
        self.forwarded = true;
        let base = match self.source {
            Source::User(p) => p,
            Source::Staging => self.staging.as_ptr() as u64,
        };
        for child in &self.children {
            let op = unsafe {
                transport.post_send(
                    child.msg,
                    base + child.offset as u64,
                    child.bytes,
                    &Datatype::BYTE,
                )?
            };
            tracing::trace!(peer = child.msg.peer, bytes = child.bytes, "tree send posted");
            self.sends.push(op);
        }
        Ok(())
    }

    fn abort(&mut self, transport: &dyn Transport) {
        if let Some(op) = self.recv_op.take() {
            transport.cancel(op);
        }
        for op in self.sends.drain(..) {
            transport.cancel(op);
        }
    }
}
