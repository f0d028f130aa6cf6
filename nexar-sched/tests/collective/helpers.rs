use nexar_sched::{SchedClient, SchedConfig};
use std::sync::Arc;

/// Helper: run a collective operation across N clients concurrently.
/// Keeps all clients alive until every task completes.
pub async fn run_collective<F, Fut>(world_size: u32, config: SchedConfig, f: F)
where
    F: Fn(Arc<SchedClient>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let clients = SchedClient::bootstrap_local(world_size, config).unwrap();
    spawn_all(clients.into_iter().map(|c| (Arc::new(c), ())).collect(), move |c, ()| f(c)).await;
}

/// Helper: run across both groups of an inter communicator. The closure
/// gets `true` for members of group A.
pub async fn run_inter<F, Fut>(a: u32, b: u32, config: SchedConfig, f: F)
where
    F: Fn(Arc<SchedClient>, bool) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (group_a, group_b) = SchedClient::bootstrap_local_inter(a, b, config).unwrap();
    let clients = group_a
        .into_iter()
        .map(|c| (Arc::new(c), true))
        .chain(group_b.into_iter().map(|c| (Arc::new(c), false)))
        .collect();
    spawn_all(clients, f).await;
}

async fn spawn_all<T, F, Fut>(clients: Vec<(Arc<SchedClient>, T)>, f: F)
where
    T: Send + 'static,
    F: Fn(Arc<SchedClient>, T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let f = Arc::new(f);
    let mut handles = Vec::new();
    for (c, extra) in clients {
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(c, extra).await }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

/// Root send buffer where destination `r` gets `[10 * (r + 1) + j]`.
pub fn labelled_chunks(size: u32, per_rank: usize) -> Vec<i32> {
    (0..size as i32)
        .flat_map(|r| (0..per_rank as i32).map(move |j| 10 * (r + 1) + j))
        .collect()
}
