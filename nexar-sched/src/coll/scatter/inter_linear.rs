use super::ScatterArgs;
use crate::comm::{CommKind, Communicator};
use crate::error::Result;
use crate::sched::{BufRef, Schedule};
use crate::types::Root;

/// Root sends every remote rank its chunk directly; receivers post one
/// receive each. Members of the root's group other than the root do
/// nothing.
pub fn iscatter_inter_sched_linear(
    args: &ScatterArgs,
    comm: &Communicator,
    s: &mut Schedule,
) -> Result<()> {
    assert_eq!(
        comm.kind(),
        CommKind::Inter,
        "linear inter-group scatter needs an inter communicator"
    );
    match args.root {
        Root::Null => Ok(()),
        Root::This => {
            if args.sendcount == 0 {
                return Ok(());
            }
            let stride = args.sendcount * args.sendtype.extent() as usize;
            let sendbuf = BufRef::User(args.sendbuf);
            for r in 0..comm.remote_size() {
                s.send(
                    comm,
                    r,
                    sendbuf.offset(r as usize * stride),
                    args.sendcount,
                    &args.sendtype,
                )?;
            }
            Ok(())
        }
        Root::Rank(root) => {
            if args.recvcount == 0 {
                return Ok(());
            }
            s.recv(
                comm,
                root,
                BufRef::User(args.recv_ptr()),
                args.recvcount,
                &args.recvtype,
            )?;
            Ok(())
        }
    }
}
