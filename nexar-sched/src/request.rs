use crate::coll::scatter::TreeScatter;
use crate::error::{Result, SchedError};
use crate::sched::Schedule;
use crate::transport::Transport;
use futures::task::AtomicWaker;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};

/// What makes a request progress.
enum Driver {
    Idle,
    Sched(Schedule),
    Tree(TreeScatter),
}

struct RequestInner {
    label: &'static str,
    /// Outstanding work; zero exactly when the request is complete.
    cc: AtomicUsize,
    error: OnceLock<SchedError>,
    driver: Mutex<Driver>,
    waker: AtomicWaker,
}

/// Handle to one in-flight non-blocking collective.
///
/// Clones share the same request: the caller keeps one and the progress
/// engine keeps another until the request completes. The schedule or tree
/// state driving the request is owned by it and dropped on completion.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    fn new(label: &'static str, cc: usize, driver: Driver) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                label,
                cc: AtomicUsize::new(cc),
                error: OnceLock::new(),
                driver: Mutex::new(driver),
                waker: AtomicWaker::new(),
            }),
        }
    }

    /// A request that is already complete.
    pub fn completed(label: &'static str) -> Self {
        Self::new(label, 0, Driver::Idle)
    }

    /// A request that is already complete with `err`.
    pub fn failed(label: &'static str, err: SchedError) -> Self {
        let req = Self::completed(label);
        let _ = req.inner.error.set(err);
        req
    }

    pub(crate) fn with_schedule(label: &'static str, sched: Schedule) -> Self {
        if sched.is_empty() {
            return Self::completed(label);
        }
        Self::new(label, 1, Driver::Sched(sched))
    }

    pub(crate) fn with_tree(label: &'static str, tree: TreeScatter) -> Self {
        match tree.pending_ops() {
            0 => Self::completed(label),
            n => Self::new(label, n, Driver::Tree(tree)),
        }
    }

    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    pub fn is_complete(&self) -> bool {
        self.inner.cc.load(Ordering::Acquire) == 0
    }

    /// Current completion counter.
    pub fn completion_counter(&self) -> usize {
        self.inner.cc.load(Ordering::Acquire)
    }

    /// The latched error, if the request failed.
    pub fn error(&self) -> Option<SchedError> {
        self.inner.error.get().cloned()
    }

    /// `None` while in flight, then the outcome.
    pub fn result(&self) -> Option<Result<()>> {
        if !self.is_complete() {
            return None;
        }
        Some(match self.error() {
            Some(e) => Err(e),
            None => Ok(()),
        })
    }

    /// Number of live handles to this request.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Drive the request once. Returns `true` when it is complete.
    pub(crate) fn progress(&self, transport: &dyn Transport) -> bool {
        if self.is_complete() {
            return true;
        }
        let mut driver = match self.inner.driver.lock() {
            Ok(d) => d,
            Err(_) => {
                self.fail(SchedError::LockPoisoned("request driver"));
                return true;
            }
        };
        let outcome = match &mut *driver {
            // Another poller finished it between the check and the lock.
            Driver::Idle => return self.is_complete(),
            Driver::Sched(s) => s.progress(transport),
            Driver::Tree(t) => t.progress(transport, &self.inner.cc),
        };
        match outcome {
            Ok(false) => false,
            Ok(true) => {
                *driver = Driver::Idle;
                drop(driver);
                self.finish();
                true
            }
            Err(e) => {
                *driver = Driver::Idle;
                drop(driver);
                self.fail(e);
                true
            }
        }
    }

    /// Latch `err` (first one wins) and complete the request.
    pub(crate) fn fail(&self, err: SchedError) {
        tracing::warn!(request = self.inner.label, "request failed: {err}");
        let _ = self.inner.error.set(err);
        self.finish();
    }

    fn finish(&self) {
        self.inner.cc.store(0, Ordering::Release);
        self.inner.waker.wake();
    }

    /// Future resolving once the request completes.
    ///
    /// It does not make progress itself; something else must poll the
    /// progress engine, e.g. [`ProgressEngine::spawn_driver`](crate::ProgressEngine::spawn_driver).
    pub fn completion(&self) -> Completion {
        Completion {
            request: self.clone(),
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("label", &self.inner.label)
            .field("cc", &self.completion_counter())
            .field("error", &self.inner.error.get())
            .finish()
    }
}

impl Drop for RequestInner {
    fn drop(&mut self) {
        let cc = *self.cc.get_mut();
        if cc != 0 {
            tracing::warn!(
                request = self.label,
                outstanding = cc,
                "request dropped before completion"
            );
        }
    }
}

/// See [`Request::completion`].
pub struct Completion {
    request: Request,
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(r) = self.request.result() {
            return Poll::Ready(r);
        }
        self.request.inner.waker.register(cx.waker());
        match self.request.result() {
            Some(r) => Poll::Ready(r),
            None => Poll::Pending,
        }
    }
}
