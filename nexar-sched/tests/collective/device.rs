use nexar_sched::coll::scatter::iscatter_intra_sched_binomial;
use nexar_sched::coll::sched_wrapper;
use nexar_sched::config::DeviceCollectives as DeviceMode;
use nexar_sched::{
    Communicator, Datatype, DeviceCollectives, Dispatcher, ProgressEngine, RecvBuf, Request,
    Result, ScatterArgs, SchedClient, SchedConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Takes scatters of at least `min_bytes` per rank and runs them as its own
/// binomial schedule; declines the rest.
struct ThresholdDevice {
    min_bytes: usize,
    taken: AtomicUsize,
    declined: AtomicUsize,
}

impl DeviceCollectives for ThresholdDevice {
    fn name(&self) -> &'static str {
        "threshold"
    }

    unsafe fn iscatter(
        &self,
        args: &ScatterArgs,
        comm: &Communicator,
        engine: &ProgressEngine,
    ) -> Result<Option<Request>> {
        if args.recvcount * args.recvtype.size() < self.min_bytes {
            self.declined.fetch_add(1, Ordering::SeqCst);
            return Ok(None);
        }
        self.taken.fetch_add(1, Ordering::SeqCst);
        let req = unsafe {
            sched_wrapper("threshold_binomial", comm, engine, |s| {
                iscatter_intra_sched_binomial(args, comm, s)
            })?
        };
        Ok(Some(req))
    }
}

/// Clients sharing one device, each with its own dispatcher.
fn clients_with_device(
    n: u32,
    config: SchedConfig,
    device: &Arc<ThresholdDevice>,
) -> Vec<Arc<SchedClient>> {
    SchedClient::bootstrap_local(n, config.clone())
        .unwrap()
        .into_iter()
        .map(|c| {
            let dispatcher = Dispatcher::new(config.clone())
                .unwrap()
                .with_device(device.clone());
            Arc::new(SchedClient::new(
                Arc::clone(c.comm()),
                Arc::clone(c.engine()),
                Arc::new(dispatcher),
            ))
        })
        .collect()
}

async fn scatter_ints(clients: &[Arc<SchedClient>], per_rank: usize) -> Vec<&'static str> {
    let n = clients.len();
    let mut handles = Vec::new();
    for client in clients {
        let c = Arc::clone(client);
        handles.push(tokio::spawn(async move {
            let rank = c.rank() as usize;
            let send: Vec<i32> = if rank == 0 {
                (0..(n * per_rank) as i32).collect()
            } else {
                Vec::new()
            };
            let mut recv = vec![-1i32; per_rank];
            let args = ScatterArgs::new(
                send.as_ptr() as u64,
                per_rank,
                Datatype::INT,
                RecvBuf::Ptr(recv.as_mut_ptr() as u64),
                per_rank,
                Datatype::INT,
                0,
            );
            let req = unsafe { c.iscatter(&args).unwrap() };
            c.wait_async(&req).await.unwrap();

            let first = (rank * per_rank) as i32;
            let want: Vec<i32> = (first..first + per_rank as i32).collect();
            assert_eq!(recv, want, "rank {rank}");
            req.label()
        }));
    }
    let mut labels = Vec::new();
    for h in handles {
        labels.push(h.await.unwrap());
    }
    labels
}

#[tokio::test]
async fn test_device_takes_large_and_declines_small() {
    let device = Arc::new(ThresholdDevice {
        min_bytes: 64,
        taken: AtomicUsize::new(0),
        declined: AtomicUsize::new(0),
    });
    let clients = clients_with_device(4, SchedConfig::default(), &device);

    let labels = scatter_ints(&clients, 32).await;
    assert!(labels.iter().all(|&l| l == "threshold_binomial"));
    assert_eq!(device.taken.load(Ordering::SeqCst), 4);

    let labels = scatter_ints(&clients, 2).await;
    assert!(labels.iter().all(|&l| l == "intra_sched_auto"));
    assert_eq!(device.declined.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_device_disabled_by_tunables() {
    for config in [
        SchedConfig {
            iscatter_device_collective: false,
            ..SchedConfig::default()
        },
        SchedConfig {
            device_collectives: DeviceMode::None,
            ..SchedConfig::default()
        },
    ] {
        let device = Arc::new(ThresholdDevice {
            min_bytes: 0,
            taken: AtomicUsize::new(0),
            declined: AtomicUsize::new(0),
        });
        let clients = clients_with_device(3, config, &device);
        let labels = scatter_ints(&clients, 4).await;
        assert!(labels.iter().all(|&l| l == "intra_sched_auto"));
        assert_eq!(device.taken.load(Ordering::SeqCst), 0);
        assert_eq!(device.declined.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_device_all_overrides_per_collective_flag() {
    let device = Arc::new(ThresholdDevice {
        min_bytes: 0,
        taken: AtomicUsize::new(0),
        declined: AtomicUsize::new(0),
    });
    let config = SchedConfig {
        iscatter_device_collective: false,
        device_collectives: DeviceMode::All,
        ..SchedConfig::default()
    };
    let clients = clients_with_device(2, config, &device);
    scatter_ints(&clients, 1).await;
    assert_eq!(device.taken.load(Ordering::SeqCst), 2);
}
