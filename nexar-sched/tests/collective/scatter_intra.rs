use nexar_sched::config::IntraAlgorithm;
use nexar_sched::{Datatype, RecvBuf, Root, ScatterArgs, SchedConfig, SchedError};

use super::helpers::{labelled_chunks, run_collective};

#[tokio::test]
async fn test_scatter_from_nonzero_root() {
    run_collective(4, SchedConfig::default(), |client| async move {
        let rank = client.rank();
        let root = 1;
        let send: Vec<i32> = if rank == root {
            vec![10, 11, 20, 21, 30, 31, 40, 41]
        } else {
            Vec::new()
        };
        let mut recv = vec![0i32; 2];
        let args = ScatterArgs::new(
            send.as_ptr() as u64,
            2,
            Datatype::INT,
            RecvBuf::Ptr(recv.as_mut_ptr() as u64),
            2,
            Datatype::INT,
            root,
        );

        let req = unsafe { client.iscatter(&args).unwrap() };
        client.wait_async(&req).await.unwrap();

        let base = 10 * (rank as i32 + 1);
        assert_eq!(recv, vec![base, base + 1], "rank {rank} scatter failed");
        assert_eq!(req.label(), "intra_sched_auto");
        assert_eq!(req.completion_counter(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_scatter_binomial_odd_sizes() {
    for n in [2u32, 3, 5, 7, 9] {
        for root in [0, n - 1] {
            let config = SchedConfig {
                iscatter_intra_algorithm: IntraAlgorithm::SchedBinomial,
                ..SchedConfig::default()
            };
            run_collective(n, config, move |client| async move {
                let rank = client.rank();
                let send = if rank == root {
                    labelled_chunks(n, 3)
                } else {
                    Vec::new()
                };
                let mut recv = vec![-1i32; 3];
                let args = ScatterArgs::new(
                    send.as_ptr() as u64,
                    3,
                    Datatype::INT,
                    RecvBuf::Ptr(recv.as_mut_ptr() as u64),
                    3,
                    Datatype::INT,
                    root,
                );
                let req = unsafe { client.iscatter(&args).unwrap() };
                client.wait_async(&req).await.unwrap();

                let base = 10 * (rank as i32 + 1);
                assert_eq!(
                    recv,
                    vec![base, base + 1, base + 2],
                    "n={n} root={root} rank={rank}"
                );
                assert_eq!(req.label(), "intra_sched_binomial");
            })
            .await;
        }
    }
}

#[tokio::test]
async fn test_scatter_in_place_root() {
    run_collective(3, SchedConfig::default(), |client| async move {
        let rank = client.rank();
        let root = 2;
        let mut send = labelled_chunks(3, 2);
        let mut recv = vec![0i32; 2];
        let recvbuf = if rank == root {
            RecvBuf::InPlace
        } else {
            RecvBuf::Ptr(recv.as_mut_ptr() as u64)
        };
        let args = ScatterArgs::new(
            send.as_mut_ptr() as u64,
            2,
            Datatype::INT,
            recvbuf,
            2,
            Datatype::INT,
            root,
        );
        let req = unsafe { client.iscatter(&args).unwrap() };
        client.wait_async(&req).await.unwrap();

        if rank == root {
            // Root's own chunk stays where it is.
            assert_eq!(send, labelled_chunks(3, 2));
            assert_eq!(recv, vec![0, 0]);
        } else {
            let base = 10 * (rank as i32 + 1);
            assert_eq!(recv, vec![base, base + 1], "rank {rank}");
        }
    })
    .await;
}

#[tokio::test]
async fn test_scatter_single_rank() {
    run_collective(1, SchedConfig::default(), |client| async move {
        let send = [5.5f64, 6.5];
        let mut recv = [0.0f64; 2];
        let args = ScatterArgs::new(
            send.as_ptr() as u64,
            2,
            Datatype::DOUBLE,
            RecvBuf::Ptr(recv.as_mut_ptr() as u64),
            2,
            Datatype::DOUBLE,
            Root::Rank(0),
        );
        let req = unsafe { client.iscatter(&args).unwrap() };
        client.wait_async(&req).await.unwrap();
        assert_eq!(recv, [5.5, 6.5]);
    })
    .await;
}

#[tokio::test]
async fn test_scatter_zero_count_completes() {
    run_collective(4, SchedConfig::default(), |client| async move {
        let args = ScatterArgs::new(
            0,
            0,
            Datatype::INT,
            RecvBuf::Ptr(0),
            0,
            Datatype::INT,
            0,
        );
        let req = unsafe { client.iscatter(&args).unwrap() };
        assert!(req.is_complete(), "rank {} zero-count", client.rank());
        client.wait_async(&req).await.unwrap();
        assert_eq!(client.engine().pending().unwrap(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_scatter_gentran_tree_fanouts() {
    for k in [2u32, 3, 4, 8] {
        let n = 7;
        let root = 3;
        let config = SchedConfig {
            iscatter_intra_algorithm: IntraAlgorithm::GentranTree,
            iscatter_tree_kval: k,
            ..SchedConfig::default()
        };
        run_collective(n, config, move |client| async move {
            let rank = client.rank();
            let send = if rank == root {
                labelled_chunks(n, 2)
            } else {
                Vec::new()
            };
            let mut recv = vec![0i32; 2];
            let args = ScatterArgs::new(
                send.as_ptr() as u64,
                2,
                Datatype::INT,
                RecvBuf::Ptr(recv.as_mut_ptr() as u64),
                2,
                Datatype::INT,
                root,
            );
            let req = unsafe { client.iscatter(&args).unwrap() };
            assert_eq!(req.label(), "intra_gentran_tree");
            client.wait_async(&req).await.unwrap();

            let base = 10 * (rank as i32 + 1);
            assert_eq!(recv, vec![base, base + 1], "k={k} rank={rank}");
        })
        .await;
    }
}

#[tokio::test]
async fn test_scatter_mixed_type_signatures() {
    // Root sends 8 ints per rank, receivers take them as 32 bytes.
    run_collective(3, SchedConfig::default(), |client| async move {
        let rank = client.rank();
        let send: Vec<i32> = if rank == 0 {
            (0..24).collect()
        } else {
            Vec::new()
        };
        let mut recv = vec![0u8; 32];
        let args = ScatterArgs::new(
            send.as_ptr() as u64,
            8,
            Datatype::INT,
            RecvBuf::Ptr(recv.as_mut_ptr() as u64),
            32,
            Datatype::BYTE,
            0,
        );
        let req = unsafe { client.iscatter(&args).unwrap() };
        client.wait_async(&req).await.unwrap();

        let got: Vec<i32> = recv
            .chunks_exact(4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let first = 8 * rank as i32;
        assert_eq!(got, (first..first + 8).collect::<Vec<_>>(), "rank {rank}");
    })
    .await;
}

#[tokio::test]
async fn test_noncontiguous_layout_fails_request() {
    run_collective(1, SchedConfig::default(), |client| async move {
        let strided = Datatype::vector(2, 1, 2, &Datatype::INT);
        let send = [1i32, 0, 2, 0];
        let mut recv = [0i32; 4];
        let args = ScatterArgs::new(
            send.as_ptr() as u64,
            1,
            strided.clone(),
            RecvBuf::Ptr(recv.as_mut_ptr() as u64),
            1,
            strided,
            0,
        );
        let req = unsafe { client.iscatter(&args).unwrap() };
        let err = client.wait_async(&req).await.unwrap_err();
        assert!(matches!(err, SchedError::UnsupportedLayout { .. }), "{err}");
        assert!(req.is_complete());
    })
    .await;
}
