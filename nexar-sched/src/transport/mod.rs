//! Point-to-point transport seam and host-memory staging helpers.
//!
//! The scheduling core never talks to a network directly. It posts sends
//! and receives through [`Transport`] and learns about completion by
//! testing the returned handles.

pub mod local;

pub use local::{LocalFabric, LocalTransport};

use crate::datatype::Datatype;
use crate::error::{Result, SchedError};
use crate::types::{ContextId, Endpoint, Tag};

/// Opaque handle to a posted transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpHandle(pub u64);

/// Matching information of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgSpec {
    /// Destination for sends, source for receives.
    pub peer: Endpoint,
    pub context_id: ContextId,
    pub tag: Tag,
}

/// Non-blocking point-to-point transport of one process.
///
/// Messages between the same pair of endpoints with the same context and
/// tag are matched in the order they were posted.
pub trait Transport: Send + Sync {
    /// Endpoint this transport sends from.
    fn endpoint(&self) -> Endpoint;

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "transport"
    }

    /// Post a send of `count` elements of `dtype` starting at `buf`.
    ///
    /// # Safety
    /// `buf` must stay valid for the described layout until the operation
    /// completes or is cancelled.
    unsafe fn post_send(
        &self,
        msg: MsgSpec,
        buf: u64,
        count: usize,
        dtype: &Datatype,
    ) -> Result<OpHandle>;

    /// Post a receive of up to `count` elements of `dtype` into `buf`.
    ///
    /// # Safety
    /// `buf` must stay valid and unaliased for the described layout until
    /// the operation completes or is cancelled.
    unsafe fn post_recv(
        &self,
        msg: MsgSpec,
        buf: u64,
        count: usize,
        dtype: &Datatype,
    ) -> Result<OpHandle>;

    /// Check for completion. `Ok(true)` and `Err(_)` both release the
    /// handle; it must not be tested again.
    fn test(&self, op: OpHandle) -> Result<bool>;

    /// Abandon an operation. No further writes to its buffer happen.
    fn cancel(&self, op: OpHandle);

    /// Make progress on all outstanding operations.
    fn poll(&self) -> Result<()>;
}

/// Start address and byte length of `count` contiguous elements.
pub fn contiguous_region(
    buf: u64,
    count: usize,
    dtype: &Datatype,
    transport: &'static str,
) -> Result<(u64, usize)> {
    if count > 0 && !dtype.is_contiguous() {
        return Err(SchedError::UnsupportedLayout {
            datatype: dtype.to_string(),
            transport,
        });
    }
    let start = (buf as i64 + dtype.lb() as i64) as u64;
    Ok((start, count * dtype.size()))
}

/// Copy `scount` elements of `stype` at `src` into `rcount` elements of
/// `rtype` at `dst`.
///
/// # Safety
/// Both regions must be valid for their layouts. They may overlap.
pub unsafe fn local_copy(
    src: u64,
    scount: usize,
    stype: &Datatype,
    dst: u64,
    rcount: usize,
    rtype: &Datatype,
) -> Result<()> {
    let (src_start, sbytes) = contiguous_region(src, scount, stype, "local copy")?;
    let (dst_start, rbytes) = contiguous_region(dst, rcount, rtype, "local copy")?;
    if sbytes > rbytes {
        return Err(SchedError::Truncated {
            actual: sbytes,
            capacity: rbytes,
        });
    }
    if sbytes > 0 && src_start != dst_start {
        unsafe {
            std::ptr::copy(src_start as *const u8, dst_start as *mut u8, sbytes);
        }
    }
    Ok(())
}
