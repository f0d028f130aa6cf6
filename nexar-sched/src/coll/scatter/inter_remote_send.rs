use super::ScatterArgs;
use super::binomial::{BinomialArgs, scatter_binomial};
use crate::comm::{CommKind, Communicator};
use crate::datatype::Datatype;
use crate::error::Result;
use crate::sched::{BufRef, Schedule};
use crate::types::Root;

/// Root sends all chunks in one message to rank 0 of the remote group,
/// which then runs a binomial scatter over its local group.
pub fn iscatter_inter_sched_remote_send_local_scatter(
    args: &ScatterArgs,
    comm: &Communicator,
    s: &mut Schedule,
) -> Result<()> {
    assert_eq!(
        comm.kind(),
        CommKind::Inter,
        "remote-send scatter needs an inter communicator"
    );
    match args.root {
        Root::Null => Ok(()),
        Root::This => {
            if args.sendcount == 0 {
                return Ok(());
            }
            s.send(
                comm,
                0,
                BufRef::User(args.sendbuf),
                args.sendcount * comm.remote_size() as usize,
                &args.sendtype,
            )?;
            Ok(())
        }
        Root::Rank(root) => {
            if args.recvcount == 0 {
                return Ok(());
            }
            let Some(local) = comm.local_comm() else {
                panic!("inter communicator without a local communicator");
            };
            let byte = Datatype::BYTE;
            let chunk = args.recvcount * args.recvtype.size();

            // Only the proxy reads `sendbuf` in the local phase.
            let mut staged = BufRef::User(0);
            if comm.rank() == 0 {
                let total = chunk * comm.local_size() as usize;
                let tmp = s.alloc_temp(total);
                s.recv(comm, root, BufRef::temp(tmp), total, &byte)?;
                s.fence();
                staged = BufRef::temp(tmp);
            }

            scatter_binomial(
                &BinomialArgs {
                    sendbuf: staged,
                    sendcount: chunk,
                    sendtype: &byte,
                    recvbuf: Some(BufRef::User(args.recv_ptr())),
                    recvcount: args.recvcount,
                    recvtype: &args.recvtype,
                    root: 0,
                },
                local,
                s,
            )?;
            s.fence();
            Ok(())
        }
    }
}
