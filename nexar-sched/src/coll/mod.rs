mod device;
mod dispatch;
pub mod scatter;
pub mod select;

pub use device::DeviceCollectives;
pub use dispatch::Dispatcher;
pub use scatter::ScatterArgs;
pub use select::{Algorithm, CollType, SelectionTable, Selector, SigKey};

use crate::comm::Communicator;
use crate::error::Result;
use crate::progress::ProgressEngine;
use crate::request::Request;
use crate::sched::Schedule;

/// Build a schedule with `build`, attach it to a new request and start it.
///
/// # Safety
/// Every buffer the schedule names must stay valid until the request
/// completes.
pub unsafe fn sched_wrapper(
    label: &'static str,
    comm: &Communicator,
    engine: &ProgressEngine,
    build: impl FnOnce(&mut Schedule) -> Result<()>,
) -> Result<Request> {
    let mut sched = Schedule::new(comm.next_coll_tag());
    build(&mut sched)?;
    tracing::debug!(
        algorithm = label,
        rank = comm.rank(),
        tag = sched.tag(),
        steps = sched.len(),
        network = sched.network_steps(),
        "schedule built"
    );
    let req = Request::with_schedule(label, sched);
    engine.start(&req);
    Ok(req)
}
