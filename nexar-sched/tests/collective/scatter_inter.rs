use nexar_sched::coll::scatter::{iscatter_inter_sched_auto, iscatter_inter_sched_linear};
use nexar_sched::config::InterAlgorithm;
use nexar_sched::sched::StepKind;
use nexar_sched::{
    Communicator, Datatype, RecvBuf, Root, ScatterArgs, SchedClient, SchedConfig, Schedule,
};

use super::helpers::{labelled_chunks, run_inter};

/// Root is rank 0 of group A; group B receives `per_rank` ints each.
fn inter_args(client: &SchedClient, in_a: bool, send: &[i32], recv: &mut [i32]) -> ScatterArgs {
    let root = match (in_a, client.rank()) {
        (true, 0) => Root::This,
        (true, _) => Root::Null,
        (false, _) => Root::Rank(0),
    };
    let n = recv.len();
    ScatterArgs::new(
        send.as_ptr() as u64,
        n,
        Datatype::INT,
        RecvBuf::Ptr(recv.as_mut_ptr() as u64),
        n,
        Datatype::INT,
        root,
    )
}

async fn check_inter_scatter(config: SchedConfig, per_rank: usize, label: &'static str) {
    run_inter(3, 5, config, move |client, in_a| async move {
        let rank = client.rank();
        let send = if in_a && rank == 0 {
            labelled_chunks(5, per_rank)
        } else {
            Vec::new()
        };
        let mut recv = vec![-1i32; per_rank];
        let args = inter_args(&client, in_a, &send, &mut recv);

        let req = unsafe { client.iscatter(&args).unwrap() };
        assert_eq!(req.label(), label);
        client.wait_async(&req).await.unwrap();

        if in_a {
            assert!(recv.iter().all(|&v| v == -1), "group A rank {rank} was written");
        } else {
            let base = 10 * (rank as i32 + 1);
            let want: Vec<i32> = (0..per_rank as i32).map(|j| base + j).collect();
            assert_eq!(recv, want, "group B rank {rank}");
        }
    })
    .await;
}

#[tokio::test]
async fn test_inter_short_message_goes_through_proxy() {
    // 5 ranks * 2 ints * 4 bytes = 40 bytes, under the 2048 default.
    check_inter_scatter(SchedConfig::default(), 2, "inter_sched_auto").await;
}

#[tokio::test]
async fn test_inter_long_message_is_linear() {
    let config = SchedConfig {
        scatter_inter_short_msg_size: 16,
        ..SchedConfig::default()
    };
    check_inter_scatter(config, 2, "inter_sched_auto").await;
}

/// Endpoint and context the receive of a non-proxy rank in group B waits on.
fn receiver_source(short_msg_size: usize) -> (u32, u32) {
    let comm = Communicator::inter(2, 0, vec![3, 4, 5, 6, 7], vec![0, 1, 2]);
    let args = ScatterArgs::new(
        0,
        2,
        Datatype::INT,
        RecvBuf::Ptr(0x1000),
        2,
        Datatype::INT,
        Root::Rank(0),
    );
    let mut s = Schedule::new(1);
    iscatter_inter_sched_auto(&args, &comm, &mut s, short_msg_size).unwrap();
    let recvs: Vec<(u32, u32)> = s
        .steps()
        .iter()
        .filter_map(|st| match st.kind() {
            StepKind::Recv { msg, .. } => Some((msg.peer, msg.context_id)),
            _ => None,
        })
        .collect();
    assert_eq!(recvs.len(), 1);
    recvs[0]
}

#[test]
fn test_inter_threshold_picks_strategy() {
    let comm = Communicator::inter(0, 0, vec![0, 1, 2], vec![3, 4, 5, 6, 7]);
    let send = labelled_chunks(5, 2);
    let args = ScatterArgs::new(
        send.as_ptr() as u64,
        2,
        Datatype::INT,
        RecvBuf::Ptr(0),
        0,
        Datatype::INT,
        Root::This,
    );
    // 40 bytes in total: above a 16 byte threshold, below the default.
    let root_sends = |short| {
        let mut s = Schedule::new(1);
        iscatter_inter_sched_auto(&args, &comm, &mut s, short).unwrap();
        s.network_steps()
    };
    assert_eq!(root_sends(16), 5);
    assert_eq!(root_sends(40), 5);
    assert_eq!(root_sends(41), 1);

    // Linear: straight from the root on the inter context. Proxied: from
    // local rank 0 (endpoint 3) on the local context.
    assert_eq!(receiver_source(16), (0, 0));
    assert_eq!(receiver_source(2048), (3, 1));
}

#[tokio::test]
async fn test_inter_named_algorithms() {
    for (algo, label) in [
        (InterAlgorithm::SchedLinear, "inter_sched_linear"),
        (
            InterAlgorithm::SchedRemoteSendLocalScatter,
            "inter_sched_remote_send_local_scatter",
        ),
    ] {
        let config = SchedConfig {
            iscatter_inter_algorithm: algo,
            ..SchedConfig::default()
        };
        check_inter_scatter(config, 3, label).await;
    }
}

#[test]
fn test_inter_root_schedule_size() {
    let comm = Communicator::inter(0, 0, vec![0, 1, 2], vec![3, 4, 5, 6, 7]);
    let send = labelled_chunks(5, 2);
    let args = ScatterArgs::new(
        send.as_ptr() as u64,
        2,
        Datatype::INT,
        RecvBuf::Ptr(0),
        0,
        Datatype::INT,
        Root::This,
    );

    let mut proxied = Schedule::new(1);
    iscatter_inter_sched_auto(&args, &comm, &mut proxied, 2048).unwrap();
    let mut linear = Schedule::new(1);
    iscatter_inter_sched_linear(&args, &comm, &mut linear).unwrap();

    assert_eq!(linear.network_steps(), 5);
    assert!(proxied.network_steps() < linear.network_steps());
    assert_eq!(proxied.network_steps(), 1);
}

#[test]
fn test_inter_non_root_of_sending_group_is_idle() {
    let comm = Communicator::inter(2, 0, vec![0, 1, 2], vec![3, 4]);
    let args = ScatterArgs::new(
        0,
        4,
        Datatype::INT,
        RecvBuf::Ptr(0),
        4,
        Datatype::INT,
        Root::Null,
    );
    for short in [0, usize::MAX] {
        let mut s = Schedule::new(1);
        iscatter_inter_sched_auto(&args, &comm, &mut s, short).unwrap();
        assert!(s.is_empty());
    }
}
