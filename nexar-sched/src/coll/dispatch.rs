use super::device::DeviceCollectives;
use super::sched_wrapper;
use super::scatter::{
    ScatterArgs, iscatter_inter_sched_auto, iscatter_inter_sched_linear,
    iscatter_inter_sched_remote_send_local_scatter, iscatter_intra_gentran_tree,
    iscatter_intra_sched_auto, iscatter_intra_sched_binomial, iscatter_sched_auto,
};
use super::select::{Algorithm, Selector, SigKey};
use crate::comm::Communicator;
use crate::config::SchedConfig;
use crate::error::{Result, SchedError};
use crate::progress::ProgressEngine;
use crate::request::Request;
use std::sync::{Arc, RwLock};

struct State {
    config: SchedConfig,
    selector: Arc<Selector>,
}

/// Entry points for non-blocking collectives.
///
/// Each method is one layer of the dispatch: [`iscatter`](Self::iscatter)
/// offers the call to the device, [`iscatter_impl`](Self::iscatter_impl)
/// honours an algorithm named by the tunables, and
/// [`iscatter_allcomm_auto`](Self::iscatter_allcomm_auto) asks the
/// selection table. Tunables are read once per call.
pub struct Dispatcher {
    state: RwLock<State>,
    device: Option<Arc<dyn DeviceCollectives>>,
}

impl Dispatcher {
    /// Dispatcher for `config`, loading its tuning file if one is set.
    pub fn new(config: SchedConfig) -> Result<Self> {
        let selector = Arc::new(Selector::load(&config)?);
        Ok(Self {
            state: RwLock::new(State { config, selector }),
            device: None,
        })
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceCollectives>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn config(&self) -> Result<SchedConfig> {
        Ok(self.snapshot()?.0)
    }

    /// Replace the tunables. A changed tuning file is loaded before the
    /// swap; on error the old configuration stays.
    pub fn set_config(&self, config: SchedConfig) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| SchedError::LockPoisoned("dispatcher config"))?;
        if config.tuning_json_file != state.config.tuning_json_file {
            state.selector = Arc::new(Selector::load(&config)?);
        }
        state.config = config;
        Ok(())
    }

    fn snapshot(&self) -> Result<(SchedConfig, Arc<Selector>)> {
        let state = self
            .state
            .read()
            .map_err(|_| SchedError::LockPoisoned("dispatcher config"))?;
        Ok((state.config.clone(), Arc::clone(&state.selector)))
    }

    /// Algorithm a call with these operands would run, ignoring the device.
    pub fn select_iscatter(&self, args: &ScatterArgs, comm: &Communicator) -> Result<Algorithm> {
        let (cfg, selector) = self.snapshot()?;
        Ok(Algorithm::from_tunables(&cfg, comm.kind())
            .unwrap_or_else(|| selector.select(&SigKey::iscatter(args, comm))))
    }

    /// Non-blocking scatter. Returns as soon as the request exists.
    ///
    /// # Safety
    /// `args` buffers must stay valid until the returned request completes.
    pub unsafe fn iscatter(
        &self,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Request> {
        let (cfg, selector) = self.snapshot()?;
        if cfg.iscatter_device_override()
            && let Some(device) = &self.device
        {
            if let Some(req) = unsafe { device.iscatter(args, comm, engine)? } {
                tracing::debug!(device = device.name(), "iscatter handled by device");
                return Ok(req);
            }
            tracing::debug!(device = device.name(), "device declined iscatter");
        }
        unsafe { self.impl_with(&cfg, &selector, args, comm, engine) }
    }

    /// Scatter without the device check.
    ///
    /// # Safety
    /// See [`iscatter`](Self::iscatter).
    pub unsafe fn iscatter_impl(
        &self,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Request> {
        let (cfg, selector) = self.snapshot()?;
        unsafe { self.impl_with(&cfg, &selector, args, comm, engine) }
    }

    /// Scatter with the algorithm chosen by the selection table.
    ///
    /// # Safety
    /// See [`iscatter`](Self::iscatter).
    pub unsafe fn iscatter_allcomm_auto(
        &self,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Request> {
        let (cfg, selector) = self.snapshot()?;
        unsafe { self.allcomm_with(&cfg, &selector, args, comm, engine) }
    }

    /// Scatter through the built-in schedule heuristics.
    ///
    /// # Safety
    /// See [`iscatter`](Self::iscatter).
    pub unsafe fn iscatter_sched_auto(
        &self,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Request> {
        let (cfg, _) = self.snapshot()?;
        unsafe {
            sched_wrapper("iscatter_sched_auto", comm, engine, |s| {
                iscatter_sched_auto(args, comm, s, &cfg)
            })
        }
    }

    unsafe fn impl_with(
        &self,
        cfg: &SchedConfig,
        selector: &Selector,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Request> {
        match Algorithm::from_tunables(cfg, comm.kind()) {
            Some(algo) => {
                tracing::debug!(%algo, kind = %comm.kind(), "iscatter algorithm from tunables");
                unsafe { run_algorithm(cfg, algo, args, comm, engine) }
            }
            None => unsafe { self.allcomm_with(cfg, selector, args, comm, engine) },
        }
    }

    unsafe fn allcomm_with(
        &self,
        cfg: &SchedConfig,
        selector: &Selector,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Request> {
        let key = SigKey::iscatter(args, comm);
        let algo = selector.select(&key);
        tracing::debug!(%algo, ?key, "iscatter algorithm from selection table");
        unsafe { run_algorithm(cfg, algo, args, comm, engine) }
    }
}

/// Run `algo`.
///
/// # Panics
/// If `algo` is for the other kind of communicator.
unsafe fn run_algorithm(
    cfg: &SchedConfig,
    algo: Algorithm,
    args: &ScatterArgs,
    comm: &Communicator,
    engine: &ProgressEngine,
) -> Result<Request> {
    assert_eq!(
        algo.comm_kind(),
        comm.kind(),
        "algorithm {algo} selected for {} communicator",
        comm.kind()
    );
    let label = algo.name();
    unsafe {
        match algo {
            Algorithm::IntraGentranTree { k } => iscatter_intra_gentran_tree(args, comm, k, engine),
            Algorithm::IntraSchedAuto => sched_wrapper(label, comm, engine, |s| {
                iscatter_intra_sched_auto(args, comm, s)
            }),
            Algorithm::IntraSchedBinomial => sched_wrapper(label, comm, engine, |s| {
                iscatter_intra_sched_binomial(args, comm, s)
            }),
            Algorithm::InterSchedAuto => sched_wrapper(label, comm, engine, |s| {
                iscatter_inter_sched_auto(args, comm, s, cfg.scatter_inter_short_msg_size)
            }),
            Algorithm::InterSchedLinear => sched_wrapper(label, comm, engine, |s| {
                iscatter_inter_sched_linear(args, comm, s)
            }),
            Algorithm::InterSchedRemoteSendLocalScatter => sched_wrapper(label, comm, engine, |s| {
                iscatter_inter_sched_remote_send_local_scatter(args, comm, s)
            }),
        }
    }
}
