//! Loading point queue admission under concurrent requests

use chrono::Duration;
use futures::future::join_all;
use std::sync::Arc;

use haul_core::error::HaulError;
use haul_core::models::{LoadingPoint, QueueAction};
use haul_core::queue::LoadingPointQueueManager;
use haul_core::repository::InMemoryRepository;

use crate::common::failing_repository::FailingRepository;
use crate::common::t0;

fn manager(max_queue_size: usize) -> (LoadingPointQueueManager, Arc<InMemoryRepository>) {
    let repository = Arc::new(InMemoryRepository::new());
    let manager = LoadingPointQueueManager::new(repository.clone());
    manager.register_point(&LoadingPoint::new("LP-01", "SITE-01", max_queue_size));
    (manager, repository)
}

#[tokio::test]
async fn test_fourth_truck_waits_and_is_promoted_on_release() {
    let (queue, repository) = manager(3);

    let admissions = join_all(
        ["TRK-01", "TRK-02", "TRK-03"]
            .into_iter()
            .map(|truck| queue.admit(truck, "LP-01", t0())),
    )
    .await;
    assert!(admissions.iter().all(|a| a.as_ref().is_ok_and(|a| a.admitted)));
    assert_eq!(queue.occupancy("LP-01"), 3);

    let fourth = queue
        .admit("TRK-04", "LP-01", t0() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(!fourth.admitted);
    assert_eq!(fourth.queue_position, 4);
    assert_eq!(queue.backlog_len("LP-01"), 1);
    let ticket = fourth.ticket.expect("backlogged admission carries a ticket");

    let promoted = queue
        .release("LP-01", "TRK-02", t0() + Duration::minutes(7))
        .await
        .unwrap();
    assert_eq!(promoted, vec!["TRK-04".to_string()]);
    assert_eq!(ticket.promoted().await.unwrap(), t0() + Duration::minutes(7));
    assert_eq!(queue.occupancy("LP-01"), 3);
    assert_eq!(queue.backlog_len("LP-01"), 0);

    let actions: Vec<QueueAction> = repository
        .queue_logs()
        .into_iter()
        .filter(|entry| entry.truck_id == "TRK-04")
        .map(|entry| entry.action)
        .collect();
    assert!(matches!(actions.as_slice(), [QueueAction::Queued, QueueAction::Promoted]));
}

#[tokio::test]
async fn test_concurrent_admissions_never_exceed_capacity() {
    let (queue, _) = manager(2);
    let trucks: Vec<String> = (1..=8).map(|i| format!("TRK-{i:02}")).collect();

    let admissions = join_all(
        trucks
            .iter()
            .enumerate()
            .map(|(i, truck)| queue.admit(truck, "LP-01", t0() + Duration::minutes(i as i64))),
    )
    .await;

    let admitted = admissions
        .iter()
        .filter(|a| a.as_ref().is_ok_and(|a| a.admitted))
        .count();
    assert_eq!(admitted, 2);
    assert_eq!(queue.occupancy("LP-01"), 2);
    assert_eq!(queue.backlog_len("LP-01"), 6);

    // Backlog positions are unique and follow request order
    let mut positions: Vec<usize> = admissions
        .iter()
        .filter_map(|a| a.as_ref().ok())
        .filter(|a| !a.admitted)
        .map(|a| a.queue_position)
        .collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![3, 4, 5, 6, 7, 8]);
}

#[tokio::test]
async fn test_withdrawn_backlog_truck_is_not_promoted() {
    let (queue, _) = manager(1);
    queue.admit("TRK-01", "LP-01", t0()).await.unwrap();
    let waiting = queue.admit("TRK-02", "LP-01", t0()).await.unwrap();
    // Keep the ticket alive; dropped tickets are skipped on promotion
    let _third = queue.admit("TRK-03", "LP-01", t0() + Duration::minutes(1)).await.unwrap();

    assert!(queue.withdraw("LP-01", "TRK-02", t0()).await.unwrap());
    let ticket = waiting.ticket.unwrap();
    assert!(ticket.promoted().await.is_err());

    let promoted = queue.release("LP-01", "TRK-01", t0() + Duration::minutes(5)).await.unwrap();
    assert_eq!(promoted, vec!["TRK-03".to_string()]);
    assert!(!queue.withdraw("LP-01", "TRK-02", t0()).await.unwrap());
}

#[tokio::test]
async fn test_inactive_point_rejects_without_enrolling() {
    let (queue, repository) = manager(3);
    queue.set_active("LP-01", false).unwrap();

    let err = queue.admit("TRK-01", "LP-01", t0()).await.unwrap_err();
    assert!(matches!(err, HaulError::PointUnavailable { .. }));
    assert!(err.is_recoverable());
    assert_eq!(queue.occupancy("LP-01"), 0);
    assert!(repository.queue_logs().is_empty());

    let err = queue.admit("TRK-01", "LP-99", t0()).await.unwrap_err();
    assert!(matches!(err, HaulError::PointUnavailable { .. }));
}

#[tokio::test]
async fn test_failed_queue_log_rolls_back_admission() {
    let repository = Arc::new(FailingRepository::new());
    let queue = LoadingPointQueueManager::new(repository.clone());
    queue.register_point(&LoadingPoint::new("LP-01", "SITE-01", 1));

    repository.fail_queue_logs(1);
    let err = queue.admit("TRK-01", "LP-01", t0()).await.unwrap_err();
    assert!(matches!(err, HaulError::Repository(_)));
    assert_eq!(queue.occupancy("LP-01"), 0);

    // The truck is not left enrolled, so it can be admitted on the next try
    let admission = queue.admit("TRK-01", "LP-01", t0() + Duration::minutes(1)).await.unwrap();
    assert!(admission.admitted);

    repository.fail_queue_logs(1);
    assert!(queue.admit("TRK-02", "LP-01", t0() + Duration::minutes(2)).await.is_err());
    assert_eq!(queue.backlog_len("LP-01"), 0);
    assert_eq!(queue.occupancy("LP-01"), 1);

    let actions: Vec<QueueAction> = repository.inner.queue_logs().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![QueueAction::Admitted]);
}
