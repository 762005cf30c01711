//! End-to-end lifecycle tests: scheduler, deployer, node handler and a
//! simulated worker speaking the wire protocol.

mod common;

use std::time::Duration;

use common::fixtures::SpecBuilder;
use common::TestCluster;
use sigma_proto::Event;
use sigma_scheduler::SchedulerError;

#[tokio::test]
async fn function_with_no_policies_gets_exactly_one_node() {
    let cluster = TestCluster::new();

    cluster
        .scheduler
        .create(SpecBuilder::new("greet").build(), None)
        .await
        .unwrap();

    cluster.wait_for_active_nodes("greet", 1).await;

    // Further ticks are satisfied by the available node; no extra deploys.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cluster.launcher.workers().len(), 1);

    cluster.scheduler.destroy("greet").await.unwrap();
}

#[tokio::test]
async fn dispatch_round_trips_through_the_worker() {
    let cluster = TestCluster::new();

    cluster
        .scheduler
        .create(SpecBuilder::new("greet").build(), None)
        .await
        .unwrap();
    let node_urn = cluster.wait_for_active_nodes("greet", 1).await;

    let (selected, data) = cluster
        .scheduler
        .dispatch("greet", Event::new("t", b"hi".to_vec()))
        .await
        .unwrap();

    assert_eq!(selected, node_urn);
    assert_eq!(data, b"hi");

    // The invocation shows up in the node statistics.
    let registration = cluster.scheduler.inspect("greet").await.unwrap();
    let node = registration
        .nodes
        .iter()
        .find(|node| node.urn == node_urn)
        .unwrap();
    assert_eq!(node.stats.invocations, 1);
    assert!(node.stats.mean_exec_time > Duration::ZERO);

    cluster.scheduler.destroy("greet").await.unwrap();
}

#[tokio::test]
async fn unhealthy_nodes_are_reaped_and_replaced() {
    let cluster = TestCluster::new();

    cluster
        .scheduler
        .create(SpecBuilder::new("greet").build(), None)
        .await
        .unwrap();
    let first_urn = cluster.wait_for_active_nodes("greet", 1).await;

    cluster.launcher.workers()[0].fail();

    // The reaper removes the failed node; the availability rule brings up
    // a replacement under a fresh URN.
    let mut replaced = false;
    for _ in 0..500 {
        let registration = cluster.scheduler.inspect("greet").await.unwrap();
        let old_gone = registration.nodes.iter().all(|node| node.urn != first_urn);
        let has_active = registration
            .nodes
            .iter()
            .any(|node| node.state.can_select());
        if old_gone && has_active {
            replaced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(replaced, "failed node was not replaced");

    cluster.scheduler.destroy("greet").await.unwrap();
}

#[tokio::test]
async fn static_count_policy_holds_the_node_count() {
    sigma_scale::register_builtins();

    let cluster = TestCluster::new();

    cluster
        .scheduler
        .create(
            SpecBuilder::new("busy")
                .policy(sigma_scale::POLICY_STATIC_COUNT, &[("count", "2")])
                .build(),
            None,
        )
        .await
        .unwrap();

    cluster.wait_for_active_nodes("busy", 2).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let registration = cluster.scheduler.inspect("busy").await.unwrap();
    assert_eq!(registration.nodes.len(), 2);

    cluster.scheduler.destroy("busy").await.unwrap();
}

#[tokio::test]
async fn destroy_stops_workers_and_forgets_the_function() {
    let cluster = TestCluster::new();

    cluster
        .scheduler
        .create(SpecBuilder::new("greet").build(), None)
        .await
        .unwrap();
    cluster.wait_for_active_nodes("greet", 1).await;

    cluster.scheduler.destroy("greet").await.unwrap();

    assert!(matches!(
        cluster.scheduler.inspect("greet").await,
        Err(SchedulerError::UnknownFunction(_))
    ));
    assert!(cluster
        .launcher
        .workers()
        .iter()
        .all(|worker| worker.is_stopped()));

    // Dispatching to a destroyed function fails cleanly.
    assert!(matches!(
        cluster
            .scheduler
            .dispatch("greet", Event::new("t", Vec::new()))
            .await,
        Err(SchedulerError::UnknownFunction(_))
    ));
}

#[tokio::test]
async fn inspect_reports_spec_and_nodes() {
    let cluster = TestCluster::new();

    let spec = SpecBuilder::new("greet").parameter("region", "eu").build();
    let urn = cluster.scheduler.create(spec.clone(), None).await.unwrap();
    cluster.wait_for_active_nodes("greet", 1).await;

    let registration = cluster.scheduler.inspect("greet").await.unwrap();
    assert_eq!(registration.urn, urn);
    assert_eq!(registration.spec, spec);
    assert_eq!(registration.nodes.len(), 1);

    cluster.scheduler.destroy("greet").await.unwrap();
}
