use super::SchedClient;
use crate::coll::Dispatcher;
use crate::comm::Communicator;
use crate::config::SchedConfig;
use crate::error::Result;
use crate::progress::ProgressEngine;
use crate::transport::LocalFabric;
use crate::types::Endpoint;
use std::sync::Arc;

impl SchedClient {
    /// Clients for an in-process job of `world_size` ranks sharing one
    /// intra communicator over a [`LocalFabric`].
    ///
    /// Meant for tests and single-process runs; every client gets its own
    /// progress engine and dispatcher, as separate processes would.
    pub fn bootstrap_local(world_size: u32, config: SchedConfig) -> Result<Vec<SchedClient>> {
        let fabric = LocalFabric::new(world_size);
        let endpoints: Vec<Endpoint> = (0..world_size).collect();
        (0..world_size)
            .map(|rank| {
                let comm = Communicator::intra(rank, 0, endpoints.clone());
                client(&fabric, comm, &config)
            })
            .collect()
    }

    /// Clients for two disjoint groups of sizes `a` and `b` joined by an
    /// inter communicator. Group A holds endpoints `0..a`, group B
    /// `a..a + b`.
    pub fn bootstrap_local_inter(
        a: u32,
        b: u32,
        config: SchedConfig,
    ) -> Result<(Vec<SchedClient>, Vec<SchedClient>)> {
        let fabric = LocalFabric::new(a + b);
        let group_a: Vec<Endpoint> = (0..a).collect();
        let group_b: Vec<Endpoint> = (a..a + b).collect();
        let side = |local: &Vec<Endpoint>, remote: &Vec<Endpoint>| -> Result<Vec<SchedClient>> {
            (0..local.len() as u32)
                .map(|rank| {
                    let comm = Communicator::inter(rank, 0, local.clone(), remote.clone());
                    client(&fabric, comm, &config)
                })
                .collect()
        };
        Ok((side(&group_a, &group_b)?, side(&group_b, &group_a)?))
    }
}

fn client(fabric: &Arc<LocalFabric>, comm: Communicator, config: &SchedConfig) -> Result<SchedClient> {
    let transport = fabric.attach(comm.endpoint())?;
    tracing::debug!(
        endpoint = comm.endpoint(),
        rank = comm.rank(),
        kind = %comm.kind(),
        "local client attached"
    );
    Ok(SchedClient::new(
        Arc::new(comm),
        Arc::new(ProgressEngine::new(transport)),
        Arc::new(Dispatcher::new(config.clone())?),
    ))
}
