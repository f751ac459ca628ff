//! End-to-end coordination tests over the deterministic backing stores.

use std::sync::Arc;
use std::time::Duration;

use alder_cache::CacheClient;
use alder_jobs::JobCoordinator;
use alder_jobs::JobError;
use alder_jobs::TaskStatus;
use alder_jobs::TreeNamespace;
use alder_testing::DeterministicCacheConnector;
use alder_testing::DeterministicCacheServer;
use alder_testing::DeterministicTree;
use alder_testing::DeterministicTreeSession;

type Locks = CacheClient<DeterministicCacheConnector>;
type Coordinator = JobCoordinator<DeterministicTreeSession, Locks>;

struct Cluster {
    tree: DeterministicTree,
    cache: Arc<DeterministicCacheServer>,
}

impl Cluster {
    fn new() -> Self {
        Self {
            tree: DeterministicTree::new(),
            cache: DeterministicCacheServer::new(),
        }
    }

    /// A coordinator instance with its own store session, plus the session
    /// handle for fault injection.
    async fn instance(&self) -> (Coordinator, Arc<DeterministicTreeSession>) {
        let session = self.tree.session().await;
        let locks = Arc::new(
            CacheClient::connect(
                DeterministicCacheConnector::new(Arc::clone(&self.cache)),
                Duration::from_secs(1),
            )
            .await
            .unwrap(),
        );
        let coordinator = JobCoordinator::new(Arc::clone(&session), locks, TreeNamespace::default());
        coordinator.bootstrap().await.unwrap();
        (coordinator, session)
    }
}

#[tokio::test]
async fn create_job_stores_first_config_only() {
    let cluster = Cluster::new();
    let (a, _sa) = cluster.instance().await;
    let (b, _sb) = cluster.instance().await;

    assert!(a.create_job("etl", b"first").await.unwrap());
    assert!(!b.create_job("etl", b"second").await.unwrap());

    assert_eq!(a.get_job_config("etl").await.unwrap(), b"first");
    assert_eq!(b.get_job_config("etl").await.unwrap(), b"first");
}

#[tokio::test]
async fn terminate_purges_only_on_last_reference() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;

    coordinator.create_job("etl", b"cfg").await.unwrap();
    coordinator.create_job("etl", b"ignored").await.unwrap();
    let task = coordinator.add_task("etl", b"payload").await.unwrap();

    // First terminate drops one reference; everything durable stays.
    coordinator.terminate_job("etl").await.unwrap();
    assert_eq!(coordinator.get_job_config("etl").await.unwrap(), b"cfg");
    assert_eq!(coordinator.task_status("etl", &task).await.unwrap(), TaskStatus::Waiting);

    // Second terminate is the last reference; the job is gone.
    coordinator.terminate_job("etl").await.unwrap();
    assert!(matches!(
        coordinator.get_job_config("etl").await.unwrap_err(),
        JobError::NotFound { .. }
    ));
    assert_eq!(coordinator.task_status("etl", &task).await.unwrap(), TaskStatus::NotExists);
    assert!(matches!(
        coordinator.add_task("etl", b"x").await.unwrap_err(),
        JobError::NotFound { .. }
    ));
}

#[tokio::test]
async fn tasks_are_taken_in_fifo_order() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;

    coordinator.create_job("etl", b"cfg").await.unwrap();
    let first = coordinator.add_task("etl", b"d1").await.unwrap();
    let second = coordinator.add_task("etl", b"d2").await.unwrap();
    assert!(first < second);

    coordinator.register_worker().await.unwrap();

    let taken = coordinator.take_task(Some("etl")).await.unwrap();
    assert_eq!(taken.task, first);
    assert_eq!(taken.data, b"d1");
    coordinator.finish_task("etl", &first).await.unwrap();

    let taken = coordinator.take_task(Some("etl")).await.unwrap();
    assert_eq!(taken.task, second);
    assert_eq!(taken.data, b"d2");
}

#[tokio::test]
async fn lifecycle_scenario_end_to_end() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;

    let config = serde_json::json!({ "parallelism": 4 }).to_string();
    coordinator.create_job("reports", config.as_bytes()).await.unwrap();
    assert_eq!(coordinator.get_job_config("reports").await.unwrap(), config.as_bytes());

    let task = coordinator.add_task("reports", b"d1").await.unwrap();
    coordinator.register_worker().await.unwrap();

    let taken = coordinator.take_task(Some("reports")).await.unwrap();
    assert_eq!((taken.job.as_str(), taken.task.as_str()), ("reports", task.as_str()));
    assert_eq!(taken.data, b"d1");
    assert_eq!(coordinator.task_status("reports", &task).await.unwrap(), TaskStatus::Running);

    coordinator.finish_task("reports", &task).await.unwrap();
    assert_eq!(coordinator.task_status("reports", &task).await.unwrap(), TaskStatus::NotExists);
}

#[tokio::test]
async fn take_requires_worker_and_waiting_task() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;
    coordinator.create_job("etl", b"cfg").await.unwrap();

    assert!(matches!(
        coordinator.take_task(Some("etl")).await.unwrap_err(),
        JobError::NotInitialized { .. }
    ));

    coordinator.register_worker().await.unwrap();
    assert!(matches!(
        coordinator.take_task(Some("etl")).await.unwrap_err(),
        JobError::NotFound { .. }
    ));
}

#[tokio::test]
async fn one_lease_per_worker() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;

    coordinator.create_job("etl", b"cfg").await.unwrap();
    coordinator.add_task("etl", b"d1").await.unwrap();
    coordinator.add_task("etl", b"d2").await.unwrap();
    coordinator.register_worker().await.unwrap();

    coordinator.take_task(Some("etl")).await.unwrap();
    assert!(matches!(
        coordinator.take_task(Some("etl")).await.unwrap_err(),
        JobError::AlreadyExists { .. }
    ));
}

#[tokio::test]
async fn released_task_is_selectable_again() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;

    coordinator.create_job("etl", b"cfg").await.unwrap();
    let task = coordinator.add_task("etl", b"d1").await.unwrap();
    coordinator.register_worker().await.unwrap();

    let taken = coordinator.take_task(Some("etl")).await.unwrap();
    assert_eq!(taken.task, task);
    coordinator.release_task("etl", &task).await.unwrap();
    assert_eq!(coordinator.task_status("etl", &task).await.unwrap(), TaskStatus::Waiting);

    let retaken = coordinator.take_task(Some("etl")).await.unwrap();
    assert_eq!(retaken.task, task);
    assert_eq!(retaken.data, b"d1");
}

#[tokio::test]
async fn lease_is_never_granted_twice_and_survives_worker_crash() {
    let cluster = Cluster::new();
    let (w1, s1) = cluster.instance().await;
    let (w2, _s2) = cluster.instance().await;

    w1.create_job("etl", b"cfg").await.unwrap();
    let task = w1.add_task("etl", b"d1").await.unwrap();
    w1.register_worker().await.unwrap();
    w2.register_worker().await.unwrap();

    let taken = w1.take_task(Some("etl")).await.unwrap();
    assert_eq!(taken.task, task);

    // The task is leased; the second worker finds nothing waiting.
    assert!(matches!(
        w2.take_task(Some("etl")).await.unwrap_err(),
        JobError::NotFound { .. }
    ));

    // First worker's session ends ungracefully; its ephemeral working entry
    // vanishes and the same task becomes takeable.
    s1.expire().await;
    let retaken = w2.take_task(Some("etl")).await.unwrap();
    assert_eq!(retaken.task, task);
    assert_eq!(retaken.data, b"d1");
}

#[tokio::test]
async fn worker_registry_counts_and_unregisters() {
    let cluster = Cluster::new();
    let (a, _sa) = cluster.instance().await;
    let (b, _sb) = cluster.instance().await;

    let name_a = a.register_worker().await.unwrap();
    let name_b = b.register_worker().await.unwrap();
    assert_ne!(name_a, name_b);
    assert!(matches!(
        a.register_worker().await.unwrap_err(),
        JobError::AlreadyExists { .. }
    ));

    assert_eq!(a.worker_count().await.unwrap(), 2);
    a.unregister_worker().await.unwrap();
    assert_eq!(b.worker_count().await.unwrap(), 1);
    assert!(a.worker_name().await.is_none());
    assert!(matches!(
        a.unregister_worker().await.unwrap_err(),
        JobError::NotFound { .. }
    ));
}

#[tokio::test]
async fn unregister_releases_held_lease() {
    let cluster = Cluster::new();
    let (w1, _s1) = cluster.instance().await;
    let (w2, _s2) = cluster.instance().await;

    w1.create_job("etl", b"cfg").await.unwrap();
    let task = w1.add_task("etl", b"d1").await.unwrap();
    w1.register_worker().await.unwrap();
    w2.register_worker().await.unwrap();

    w1.take_task(Some("etl")).await.unwrap();
    assert_eq!(w1.task_status("etl", &task).await.unwrap(), TaskStatus::Running);

    w1.unregister_worker().await.unwrap();
    assert_eq!(w2.task_status("etl", &task).await.unwrap(), TaskStatus::Waiting);
    assert_eq!(w2.take_task(Some("etl")).await.unwrap().task, task);
}

#[tokio::test]
async fn wait_with_zero_budget_never_blocks() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;
    coordinator.create_job("etl", b"cfg").await.unwrap();
    coordinator.register_worker().await.unwrap();

    assert!(matches!(
        coordinator.wait_for_new_task(Some("etl"), Some(Duration::ZERO)).await.unwrap_err(),
        JobError::TimedOut { .. }
    ));

    // Fast path beats the zero budget when a task is already waiting.
    coordinator.add_task("etl", b"d1").await.unwrap();
    coordinator.wait_for_new_task(Some("etl"), Some(Duration::ZERO)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_within_budget_and_slack() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;
    coordinator.create_job("etl", b"cfg").await.unwrap();
    coordinator.register_worker().await.unwrap();

    let started = tokio::time::Instant::now();
    let err = coordinator
        .wait_for_new_task(Some("etl"), Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::TimedOut { .. }));

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_millis(1500));
}

#[tokio::test]
async fn wait_wakes_on_new_task_from_another_session() {
    let cluster = Cluster::new();
    let (waiter, _s1) = cluster.instance().await;
    let (producer, _s2) = cluster.instance().await;

    waiter.create_job("etl", b"cfg").await.unwrap();
    waiter.register_worker().await.unwrap();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.add_task("etl", b"d1").await.unwrap();
    });

    waiter
        .wait_for_new_task(Some("etl"), Some(Duration::from_secs(5)))
        .await
        .unwrap();

    let taken = waiter.take_task(Some("etl")).await.unwrap();
    assert_eq!(taken.data, b"d1");
    handle.await.unwrap();
}

#[tokio::test]
async fn take_without_job_filter_scans_all_jobs() {
    let cluster = Cluster::new();
    let (coordinator, _session) = cluster.instance().await;

    coordinator.create_job("idle", b"cfg").await.unwrap();
    coordinator.create_job("busy", b"cfg").await.unwrap();
    coordinator.add_task("busy", b"d1").await.unwrap();
    coordinator.register_worker().await.unwrap();

    let taken = coordinator.take_task(None).await.unwrap();
    assert_eq!(taken.job, "busy");
    assert_eq!(taken.data, b"d1");
}
