use crate::error::{Result, SchedError};
use crate::request::Request;
use crate::transport::Transport;
use crossbeam_queue::SegQueue;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Per-process progress engine.
///
/// Nothing advances on its own: requests move forward only when some
/// thread calls [`poll`](Self::poll), directly or through `test`, `wait`
/// or a spawned driver task. Newly started requests go through a lock-free
/// queue so that dispatch never contends with a poller.
pub struct ProgressEngine {
    transport: Arc<dyn Transport>,
    incoming: SegQueue<Request>,
    active: Mutex<Vec<Request>>,
}

impl ProgressEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            incoming: SegQueue::new(),
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Hand a request to the engine. Its first ready steps are issued
    /// before this returns.
    pub fn start(&self, req: &Request) {
        if !req.progress(&*self.transport) {
            self.incoming.push(req.clone());
        }
    }

    /// Progress the transport and every active request once.
    ///
    /// Returns the number of requests still in flight.
    pub fn poll(&self) -> Result<usize> {
        self.transport.poll()?;
        let mut active = self
            .active
            .lock()
            .map_err(|_| SchedError::LockPoisoned("progress engine"))?;
        while let Some(req) = self.incoming.pop() {
            active.push(req);
        }
        active.retain(|req| !req.progress(&*self.transport));
        Ok(active.len())
    }

    /// Number of requests the engine still holds.
    pub fn pending(&self) -> Result<usize> {
        let active = self
            .active
            .lock()
            .map_err(|_| SchedError::LockPoisoned("progress engine"))?;
        Ok(active.len() + self.incoming.len())
    }

    /// Poll once, then report whether `req` is done. A failed request
    /// reports its error.
    pub fn test(&self, req: &Request) -> Result<bool> {
        self.poll()?;
        match req.result() {
            Some(Ok(())) => Ok(true),
            Some(Err(e)) => Err(e),
            None => Ok(false),
        }
    }

    /// Block the calling thread, polling until `req` completes.
    ///
    /// Other processes of the job must be progressing concurrently or this
    /// never returns.
    pub fn wait(&self, req: &Request) -> Result<()> {
        loop {
            if let Some(r) = req.result() {
                return r;
            }
            self.poll()?;
            std::thread::yield_now();
        }
    }

    /// Poll until `req` completes, yielding to the tokio scheduler between
    /// polls.
    pub async fn wait_async(&self, req: &Request) -> Result<()> {
        loop {
            if let Some(r) = req.result() {
                return r;
            }
            self.poll()?;
            tokio::task::yield_now().await;
        }
    }

    /// Poll from a background tokio task every `interval` until the
    /// returned handle is dropped.
    pub fn spawn_driver(self: &Arc<Self>, interval: Duration) -> DriverHandle {
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if let Err(e) = engine.poll() {
                    tracing::warn!("progress driver poll failed: {e}");
                }
            }
        });
        DriverHandle { task }
    }
}

/// Background polling task; aborted on drop.
pub struct DriverHandle {
    task: JoinHandle<()>,
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Requests that can be waited on together.
#[derive(Default)]
pub struct RequestGroup {
    requests: Vec<Request>,
}

impl RequestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, req: Request) {
        self.requests.push(req);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Wait for every request. Returns the first error encountered; all
    /// requests are waited on regardless.
    pub fn wait_all(self, engine: &ProgressEngine) -> Result<()> {
        let mut first_err = None;
        for req in &self.requests {
            if let Err(e) = engine.wait(req)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Async form of [`wait_all`](Self::wait_all).
    pub async fn wait_all_async(self, engine: &ProgressEngine) -> Result<()> {
        let mut first_err = None;
        for req in &self.requests {
            if let Err(e) = engine.wait_async(req).await
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
