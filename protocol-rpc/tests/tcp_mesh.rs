//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::net::TcpListener;
use std::time::Duration;

use protocol::mpc::Runtime;
use rpc::connect::connect;
use rpc::connect::ConnectError;
use rpc::connect::MeshConfig;

/// First base port at or above `from` with `n` free consecutive ports.
/// Tests start from different offsets so they do not race for ports.
fn free_base_port(from: u16, n: usize) -> u16 {
    (from..from + 10000)
        .step_by(97)
        .find(|base| (0..n as u16).all(|i| TcpListener::bind(("127.0.0.1", base + i)).is_ok()))
        .unwrap()
}

fn mesh(base_port: u16, party: usize, parties: usize) -> MeshConfig {
    MeshConfig {
        base_port,
        connect_timeout: Duration::from_secs(10),
        ..MeshConfig::new(party, parties)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_party_runtime_over_tcp() {
    let base = free_base_port(20000, 3);
    let handles = (0..3)
        .map(|p| {
            tokio::spawn(async move {
                let channel = connect(&mesh(base, p, 3)).await.unwrap();
                let mut rt = Runtime::start(channel, p, 3).await.unwrap();
                let names = rt
                    .broadcast(Some(format!("party-{}", p)), &[0, 1, 2])
                    .await
                    .unwrap();
                let own = [p as f64 + 0.5];
                let mut shared = vec![];
                for owner in 0..3 {
                    let values = if owner == p { Some(&own[..]) } else { None };
                    shared.extend(rt.input(values, owner, 1).await.unwrap());
                }
                let products = rt.mul(&shared[..2], &shared[1..]).await.unwrap();
                let revealed = rt.reveal(&products).await.unwrap();
                let channel = rt.shutdown().await.unwrap();
                channel.close().await.unwrap();
                (names, revealed)
            })
        })
        .collect::<Vec<_>>();

    for h in handles {
        let (names, revealed) = h.await.unwrap();
        assert_eq!(names, vec!["party-0", "party-1", "party-2"]);
        assert!((revealed[0] - 0.75).abs() < 1e-3);
        assert!((revealed[1] - 3.75).abs() < 1e-3);
    }
}

#[tokio::test]
async fn test_unreachable_party_times_out() {
    let base = free_base_port(30000, 2);
    let config = MeshConfig {
        connect_timeout: Duration::from_millis(600),
        ..mesh(base, 1, 2)
    };
    match connect(&config).await {
        Err(ConnectError::Unreachable { party, .. }) => assert_eq!(party, 0),
        other => panic!("expected unreachable, got {:?}", other.map(|c| c.party())),
    }
}

#[tokio::test]
async fn test_lonely_listener_times_out() {
    let base = free_base_port(40000, 2);
    let config = MeshConfig {
        connect_timeout: Duration::from_millis(300),
        ..mesh(base, 0, 2)
    };
    assert!(matches!(
        connect(&config).await,
        Err(ConnectError::AcceptTimeout(1))
    ));
}
