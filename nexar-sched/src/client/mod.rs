mod bootstrap;

use crate::coll::{Dispatcher, ScatterArgs};
use crate::comm::Communicator;
use crate::error::Result;
use crate::progress::ProgressEngine;
use crate::request::Request;
use crate::types::Rank;
use std::sync::Arc;

/// One process's handle on a communicator: the group, its progress engine
/// and the collective dispatcher.
#[derive(Clone)]
pub struct SchedClient {
    comm: Arc<Communicator>,
    engine: Arc<ProgressEngine>,
    dispatcher: Arc<Dispatcher>,
}

impl SchedClient {
    pub fn new(
        comm: Arc<Communicator>,
        engine: Arc<ProgressEngine>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            comm,
            engine,
            dispatcher,
        }
    }

    /// This process's rank in its (local) group.
    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    /// Size of the local group.
    pub fn size(&self) -> u32 {
        self.comm.local_size()
    }

    pub fn comm(&self) -> &Arc<Communicator> {
        &self.comm
    }

    pub fn engine(&self) -> &Arc<ProgressEngine> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start a non-blocking scatter on this client's communicator.
    ///
    /// # Safety
    /// - `args.sendbuf` (root only): `sendcount` elements per destination.
    /// - `args.recvbuf`: room for `recvcount` elements of `recvtype`.
    ///
    /// Both must stay valid until the returned request completes.
    pub unsafe fn iscatter(&self, args: &ScatterArgs) -> Result<Request> {
        unsafe { self.dispatcher.iscatter(args, &self.comm, &self.engine) }
    }

    pub fn test(&self, req: &Request) -> Result<bool> {
        self.engine.test(req)
    }

    pub fn wait(&self, req: &Request) -> Result<()> {
        self.engine.wait(req)
    }

    pub async fn wait_async(&self, req: &Request) -> Result<()> {
        self.engine.wait_async(req).await
    }
}
