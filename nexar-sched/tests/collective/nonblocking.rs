use nexar_sched::config::IntraAlgorithm;
use nexar_sched::{Datatype, RecvBuf, RequestGroup, ScatterArgs, SchedClient, SchedConfig};
use std::sync::Arc;
use std::time::Duration;

use super::helpers::labelled_chunks;

fn bootstrap_arc(n: u32, config: SchedConfig) -> Vec<Arc<SchedClient>> {
    SchedClient::bootstrap_local(n, config)
        .unwrap()
        .into_iter()
        .map(Arc::new)
        .collect()
}

/// Launch 2 scatters from different roots back to back, wait on both.
#[tokio::test]
async fn test_two_concurrent_scatters() {
    let clients = bootstrap_arc(4, SchedConfig::default());

    let mut handles = Vec::new();
    for client in &clients {
        let c = Arc::clone(client);
        handles.push(tokio::spawn(async move {
            let rank = c.rank();
            let send_a = if rank == 0 { labelled_chunks(4, 2) } else { Vec::new() };
            let send_b: Vec<i32> = if rank == 3 { (100..104).collect() } else { Vec::new() };
            let mut recv_a = vec![0i32; 2];
            let mut recv_b = vec![0i32; 1];

            let args_a = ScatterArgs::new(
                send_a.as_ptr() as u64,
                2,
                Datatype::INT,
                RecvBuf::Ptr(recv_a.as_mut_ptr() as u64),
                2,
                Datatype::INT,
                0,
            );
            let args_b = ScatterArgs::new(
                send_b.as_ptr() as u64,
                1,
                Datatype::INT,
                RecvBuf::Ptr(recv_b.as_mut_ptr() as u64),
                1,
                Datatype::INT,
                3,
            );

            // Launch both non-blocking.
            let mut group = RequestGroup::new();
            group.push(unsafe { c.iscatter(&args_a).unwrap() });
            group.push(unsafe { c.iscatter(&args_b).unwrap() });
            assert_eq!(group.len(), 2);
            group.wait_all_async(c.engine()).await.unwrap();

            let base = 10 * (rank as i32 + 1);
            assert_eq!(recv_a, vec![base, base + 1], "rank {rank} recv_a mismatch");
            assert_eq!(recv_b, vec![100 + rank as i32], "rank {rank} recv_b mismatch");
        }));
    }

    for h in handles {
        h.await.unwrap();
    }
}

/// Mixing a schedule-based and a tree-driven scatter on the same group.
#[tokio::test]
async fn test_mixed_algorithms_in_flight() {
    let clients = bootstrap_arc(5, SchedConfig::default());

    let mut handles = Vec::new();
    for client in &clients {
        let c = Arc::clone(client);
        handles.push(tokio::spawn(async move {
            let rank = c.rank();
            let send = if rank == 2 { labelled_chunks(5, 1) } else { Vec::new() };
            let mut sched_out = [0i32; 1];
            let mut tree_out = [0i32; 1];
            let args = |out: &mut [i32; 1]| {
                ScatterArgs::new(
                    send.as_ptr() as u64,
                    1,
                    Datatype::INT,
                    RecvBuf::Ptr(out.as_mut_ptr() as u64),
                    1,
                    Datatype::INT,
                    2,
                )
            };

            let first = unsafe { c.iscatter(&args(&mut sched_out)).unwrap() };
            c.dispatcher()
                .set_config(SchedConfig {
                    iscatter_intra_algorithm: IntraAlgorithm::GentranTree,
                    iscatter_tree_kval: 3,
                    ..SchedConfig::default()
                })
                .unwrap();
            let second = unsafe { c.iscatter(&args(&mut tree_out)).unwrap() };
            assert_eq!(first.label(), "intra_sched_auto");
            assert_eq!(second.label(), "intra_gentran_tree");

            let mut group = RequestGroup::new();
            group.push(first);
            group.push(second);
            group.wait_all_async(c.engine()).await.unwrap();

            let want = 10 * (rank as i32 + 1);
            assert_eq!(sched_out, [want], "rank {rank} schedule scatter");
            assert_eq!(tree_out, [want], "rank {rank} tree scatter");
        }));
    }

    for h in handles {
        h.await.unwrap();
    }
}

/// Drive progress from a background task and await completion futures.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_driver_completes_requests() {
    let clients = bootstrap_arc(3, SchedConfig::default());

    let mut handles = Vec::new();
    for client in &clients {
        let c = Arc::clone(client);
        handles.push(tokio::spawn(async move {
            let rank = c.rank();
            let _driver = c.engine().spawn_driver(Duration::from_millis(1));
            let send: Vec<i32> = if rank == 1 { vec![7, 8, 9] } else { Vec::new() };
            let mut recv = [0i32; 1];
            let args = ScatterArgs::new(
                send.as_ptr() as u64,
                1,
                Datatype::INT,
                RecvBuf::Ptr(recv.as_mut_ptr() as u64),
                1,
                Datatype::INT,
                1,
            );
            let req = unsafe { c.iscatter(&args).unwrap() };
            tokio::time::timeout(Duration::from_secs(10), req.completion())
                .await
                .expect("scatter did not complete")
                .unwrap();
            assert_eq!(recv, [7 + rank as i32]);
        }));
    }

    for h in handles {
        h.await.unwrap();
    }
}

/// `test` reports progress without blocking.
#[tokio::test]
async fn test_polling_with_test() {
    let clients = bootstrap_arc(2, SchedConfig::default());
    let (root, leaf) = (&clients[0], &clients[1]);

    let send = [1i32, 2];
    let mut root_out = [0i32; 1];
    let mut leaf_out = [0i32; 1];
    let args = |out: &mut [i32; 1]| {
        ScatterArgs::new(
            send.as_ptr() as u64,
            1,
            Datatype::INT,
            RecvBuf::Ptr(out.as_mut_ptr() as u64),
            1,
            Datatype::INT,
            0,
        )
    };

    // The leaf posts first and has nothing to receive yet.
    let leaf_req = unsafe { leaf.iscatter(&args(&mut leaf_out)).unwrap() };
    assert!(!leaf.test(&leaf_req).unwrap());
    assert_eq!(leaf.engine().pending().unwrap(), 1);

    let root_req = unsafe { root.iscatter(&args(&mut root_out)).unwrap() };
    root.wait(&root_req).unwrap();
    while !leaf.test(&leaf_req).unwrap() {
        tokio::task::yield_now().await;
    }

    assert_eq!(root_out, [1]);
    assert_eq!(leaf_out, [2]);
    assert_eq!(leaf.engine().pending().unwrap(), 0);
}
