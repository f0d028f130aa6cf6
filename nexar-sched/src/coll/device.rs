use super::scatter::ScatterArgs;
use crate::comm::Communicator;
use crate::error::Result;
use crate::progress::ProgressEngine;
use crate::request::Request;

/// Lower-layer substitute for collectives.
///
/// When the device-collective tunables allow it, the dispatcher offers each
/// call to the device first. Returning `Ok(None)` declines the call and the
/// generic algorithms run instead; `Ok(Some(request))` means the device owns
/// the operation.
pub trait DeviceCollectives: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "device"
    }

    /// # Safety
    /// `args` buffers must stay valid until the returned request completes.
    unsafe fn iscatter(
        &self,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Option<Request>>;
}
