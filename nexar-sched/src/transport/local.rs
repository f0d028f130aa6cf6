use super::{MsgSpec, OpHandle, Transport, contiguous_region};
use crate::datatype::Datatype;
use crate::error::{Result, SchedError};
use crate::types::{ContextId, Endpoint, Tag};
use bytes::Bytes;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const TRANSPORT_NAME: &str = "local";

/// (source, destination, context, tag)
type MatchKey = (Endpoint, Endpoint, ContextId, Tag);

/// In-process message fabric shared by every endpoint of a local job.
///
/// Sends are eager: the payload is copied into the destination mailbox when
/// the send is posted, so sends complete immediately. Receives are matched
/// against mailboxes during progress, in the order they were posted.
pub struct LocalFabric {
    size: u32,
    mailboxes: Mutex<HashMap<MatchKey, VecDeque<Bytes>>>,
}

impl LocalFabric {
    /// Create a fabric with endpoints `0..size`.
    pub fn new(size: u32) -> Arc<Self> {
        Arc::new(Self {
            size,
            mailboxes: Mutex::new(HashMap::new()),
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Transport for one endpoint of this fabric.
    pub fn attach(self: &Arc<Self>, endpoint: Endpoint) -> Result<Arc<LocalTransport>> {
        if endpoint >= self.size {
            return Err(SchedError::UnknownEndpoint { endpoint });
        }
        Ok(Arc::new(LocalTransport {
            fabric: Arc::clone(self),
            endpoint,
            ops: Mutex::new(OpTable::default()),
        }))
    }

    /// Number of delivered but unmatched messages.
    pub fn queued_messages(&self) -> usize {
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(VecDeque::len)
            .sum()
    }

    fn deliver(&self, key: MatchKey, payload: Bytes) -> Result<()> {
        if key.1 >= self.size {
            return Err(SchedError::UnknownEndpoint { endpoint: key.1 });
        }
        let mut boxes = self
            .mailboxes
            .lock()
            .map_err(|_| SchedError::LockPoisoned("fabric mailboxes"))?;
        boxes.entry(key).or_default().push_back(payload);
        Ok(())
    }

    fn take(&self, key: &MatchKey) -> Result<Option<Bytes>> {
        let mut boxes = self
            .mailboxes
            .lock()
            .map_err(|_| SchedError::LockPoisoned("fabric mailboxes"))?;
        // Tags only grow, so drained mailboxes are dropped.
        let Entry::Occupied(mut slot) = boxes.entry(*key) else {
            return Ok(None);
        };
        let payload = slot.get_mut().pop_front();
        if slot.get().is_empty() {
            slot.remove();
        }
        Ok(payload)
    }
}

struct PendingRecv {
    key: MatchKey,
    ptr: u64,
    capacity: usize,
}

enum OpState {
    Done,
    Recv(PendingRecv),
    Failed(SchedError),
}

#[derive(Default)]
struct OpTable {
    next_id: u64,
    ops: HashMap<u64, OpState>,
    /// Posted receives in post order.
    recv_order: VecDeque<u64>,
}

impl OpTable {
    fn insert(&mut self, state: OpState) -> OpHandle {
        let id = self.next_id;
        self.next_id += 1;
        if matches!(state, OpState::Recv(_)) {
            self.recv_order.push_back(id);
        }
        self.ops.insert(id, state);
        OpHandle(id)
    }
}

/// One endpoint's view of a [`LocalFabric`].
pub struct LocalTransport {
    fabric: Arc<LocalFabric>,
    endpoint: Endpoint,
    ops: Mutex<OpTable>,
}

impl LocalTransport {
    fn ops(&self) -> Result<MutexGuard<'_, OpTable>> {
        self.ops
            .lock()
            .map_err(|_| SchedError::LockPoisoned("local transport ops"))
    }

    /// Match posted receives against delivered messages, oldest first.
    fn progress(&self, table: &mut OpTable) -> Result<()> {
        let mut still_waiting = VecDeque::with_capacity(table.recv_order.len());
        while let Some(id) = table.recv_order.pop_front() {
            let Some(OpState::Recv(pending)) = table.ops.get(&id) else {
                continue;
            };
            match self.fabric.take(&pending.key)? {
                Some(payload) if payload.len() > pending.capacity => {
                    let err = SchedError::Truncated {
                        actual: payload.len(),
                        capacity: pending.capacity,
                    };
                    tracing::warn!(endpoint = self.endpoint, "receive failed: {err}");
                    table.ops.insert(id, OpState::Failed(err));
                }
                Some(payload) => {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            payload.as_ptr(),
                            pending.ptr as *mut u8,
                            payload.len(),
                        );
                    }
                    tracing::trace!(
                        endpoint = self.endpoint,
                        src = pending.key.0,
                        tag = pending.key.3,
                        bytes = payload.len(),
                        "receive matched"
                    );
                    table.ops.insert(id, OpState::Done);
                }
                None => still_waiting.push_back(id),
            }
        }
        table.recv_order = still_waiting;
        Ok(())
    }
}

impl Transport for LocalTransport {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    unsafe fn post_send(
        &self,
        msg: MsgSpec,
        buf: u64,
        count: usize,
        dtype: &Datatype,
    ) -> Result<OpHandle> {
        let (start, len) = contiguous_region(buf, count, dtype, TRANSPORT_NAME)?;
        let payload = if len == 0 {
            Bytes::new()
        } else {
            let data = unsafe { std::slice::from_raw_parts(start as *const u8, len) };
            Bytes::copy_from_slice(data)
        };
        self.fabric
            .deliver((self.endpoint, msg.peer, msg.context_id, msg.tag), payload)?;
        Ok(self.ops()?.insert(OpState::Done))
    }

    unsafe fn post_recv(
        &self,
        msg: MsgSpec,
        buf: u64,
        count: usize,
        dtype: &Datatype,
    ) -> Result<OpHandle> {
        if msg.peer >= self.fabric.size() {
            return Err(SchedError::UnknownEndpoint { endpoint: msg.peer });
        }
        let (ptr, capacity) = contiguous_region(buf, count, dtype, TRANSPORT_NAME)?;
        let pending = PendingRecv {
            key: (msg.peer, self.endpoint, msg.context_id, msg.tag),
            ptr,
            capacity,
        };
        Ok(self.ops()?.insert(OpState::Recv(pending)))
    }

    fn test(&self, op: OpHandle) -> Result<bool> {
        let mut table = self.ops()?;
        self.progress(&mut table)?;
        match table.ops.get(&op.0) {
            None => Err(SchedError::transport(format!(
                "unknown operation handle {}",
                op.0
            ))),
            Some(OpState::Recv(_)) => Ok(false),
            Some(OpState::Done) => {
                table.ops.remove(&op.0);
                Ok(true)
            }
            Some(OpState::Failed(_)) => match table.ops.remove(&op.0) {
                Some(OpState::Failed(e)) => Err(e),
                _ => unreachable!("state checked above"),
            },
        }
    }

    fn cancel(&self, op: OpHandle) {
        if let Ok(mut table) = self.ops() {
            table.ops.remove(&op.0);
            table.recv_order.retain(|&id| id != op.0);
        }
    }

    fn poll(&self) -> Result<()> {
        let mut table = self.ops()?;
        self.progress(&mut table)
    }
}
