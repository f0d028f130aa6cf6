use super::ScatterArgs;
use super::tree::{KnomialTree, absolute, relative};
use crate::comm::{CommKind, Communicator};
use crate::datatype::Datatype;
use crate::error::Result;
use crate::sched::{BufRef, Schedule};
use crate::types::{Rank, RecvBuf, Root};

/// Operands of a binomial scatter, with buffers that may live in the
/// schedule. `recvbuf == None` means in place at the root.
pub(crate) struct BinomialArgs<'a> {
    pub sendbuf: BufRef,
    pub sendcount: usize,
    pub sendtype: &'a Datatype,
    pub recvbuf: Option<BufRef>,
    pub recvcount: usize,
    pub recvtype: &'a Datatype,
    pub root: Rank,
}

/// Binomial tree scatter over an intra communicator.
///
/// Each rank receives the chunks of its whole subtree from its parent in
/// one message and forwards the upper part to each child, largest subtree
/// first. Leaves receive straight into the receive buffer.
pub fn iscatter_intra_sched_binomial(
    args: &ScatterArgs,
    comm: &Communicator,
    s: &mut Schedule,
) -> Result<()> {
    assert_eq!(
        comm.kind(),
        CommKind::Intra,
        "binomial scatter needs an intra communicator"
    );
    let root = match args.root {
        Root::Rank(r) => r,
        other => panic!("intra-group scatter called with root {other}"),
    };
    let recvbuf = match args.recvbuf {
        RecvBuf::Ptr(p) => Some(BufRef::User(p)),
        RecvBuf::InPlace => {
            assert_eq!(comm.rank(), root, "in-place receive buffer on non-root rank");
            None
        }
    };
    scatter_binomial(
        &BinomialArgs {
            sendbuf: BufRef::User(args.sendbuf),
            sendcount: args.sendcount,
            sendtype: &args.sendtype,
            recvbuf,
            recvcount: args.recvcount,
            recvtype: &args.recvtype,
            root,
        },
        comm,
        s,
    )
}

pub(crate) fn scatter_binomial(
    a: &BinomialArgs<'_>,
    comm: &Communicator,
    s: &mut Schedule,
) -> Result<()> {
    let n = comm.local_size();
    let rank = comm.rank();
    let is_root = rank == a.root;
    if (is_root && a.sendcount == 0) || (!is_root && a.recvcount == 0) {
        return Ok(());
    }

    let rel = relative(rank, a.root, n);
    let tree = KnomialTree::new(rel, n, 2);
    let byte = Datatype::BYTE;

    if is_root {
        let stride = a.sendcount * a.sendtype.extent() as usize;
        let own = a.sendbuf.offset(a.root as usize * stride);

        if a.root == 0 {
            for &(child, len) in &tree.children {
                s.send(
                    comm,
                    absolute(child, a.root, n),
                    a.sendbuf.offset(child as usize * stride),
                    len as usize * a.sendcount,
                    a.sendtype,
                )?;
                s.fence();
            }
        } else {
            // Rotate so that the root's chunk comes first.
            let chunk = a.sendcount * a.sendtype.size();
            let head = (n - a.root) as usize;
            let tmp = s.alloc_temp(n as usize * chunk);
            s.copy(
                own,
                head * a.sendcount,
                a.sendtype,
                BufRef::temp(tmp),
                head * chunk,
                &byte,
            );
            s.copy(
                a.sendbuf,
                a.root as usize * a.sendcount,
                a.sendtype,
                BufRef::temp(tmp).offset(head * chunk),
                a.root as usize * chunk,
                &byte,
            );
            s.fence();
            for &(child, len) in &tree.children {
                s.send(
                    comm,
                    absolute(child, a.root, n),
                    BufRef::temp(tmp).offset(child as usize * chunk),
                    len as usize * chunk,
                    &byte,
                )?;
                s.fence();
            }
        }

        if let Some(recvbuf) = a.recvbuf {
            s.copy(own, a.sendcount, a.sendtype, recvbuf, a.recvcount, a.recvtype);
        }
        return Ok(());
    }

    let Some(parent) = tree.parent else {
        unreachable!("non-root relative rank {rel} has no parent");
    };
    let parent = absolute(parent, a.root, n);
    let recvbuf = match a.recvbuf {
        Some(b) => b,
        None => panic!("in-place receive buffer on non-root rank {rank}"),
    };

    if tree.is_leaf() {
        s.recv(comm, parent, recvbuf, a.recvcount, a.recvtype)?;
        return Ok(());
    }

    let chunk = a.recvcount * a.recvtype.size();
    let subtree = tree.subtree_len as usize * chunk;
    let tmp = s.alloc_temp(subtree);
    s.recv(comm, parent, BufRef::temp(tmp), subtree, &byte)?;
    s.fence();
    for &(child, len) in &tree.children {
        s.send(
            comm,
            absolute(child, a.root, n),
            BufRef::temp(tmp).offset((child - rel) as usize * chunk),
            len as usize * chunk,
            &byte,
        )?;
        s.fence();
    }
    s.copy(
        BufRef::temp(tmp),
        chunk,
        &byte,
        recvbuf,
        a.recvcount,
        a.recvtype,
    );
    Ok(())
}
