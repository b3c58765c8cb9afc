use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use deadpool::managed::RecycleResult;

use super::*;

#[derive(Debug)]
struct FakeConn {
    id: usize,
    alive: Arc<AtomicBool>,
}

/// Hands out numbered connections; can be told to refuse the next N dials.
#[derive(Debug, Default)]
struct FakeManager {
    next_id: AtomicUsize,
    refuse: AtomicUsize,
    dials: AtomicUsize,
    probes: AtomicUsize,
    ttl: Duration,
}

impl FakeManager {
    fn probing_every_borrow() -> Self {
        Self::default()
    }

    fn refusing(n: usize) -> Self {
        let manager = Self::default();
        manager.refuse.store(n, Ordering::SeqCst);
        manager
    }
}

impl Manager for FakeManager {
    type Type = FakeConn;
    type Error = QueueError;

    async fn create(&self) -> std::result::Result<FakeConn, QueueError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(QueueError::Transport("connection refused".to_string()));
        }
        Ok(FakeConn {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            alive: Arc::new(AtomicBool::new(true)),
        })
    }

    async fn recycle(&self, conn: &mut FakeConn, metrics: &Metrics) -> RecycleResult<QueueError> {
        if !needs_probe(metrics, self.ttl) {
            return Ok(());
        }
        self.probes.fetch_add(1, Ordering::SeqCst);
        if conn.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(deadpool::managed::RecycleError::Backend(QueueError::Transport(
                "dead".to_string(),
            )))
        }
    }
}

fn settings(max_size: usize) -> PoolSettings {
    PoolSettings {
        max_size,
        max_idle: max_size,
        wait_timeout: Some(Duration::from_millis(100)),
        create_timeout: Some(Duration::from_millis(100)),
        idle_timeout: None,
        maintenance_interval: Duration::from_secs(3600),
    }
}

#[tokio::test]
async fn test_concurrent_borrowers_get_distinct_connections() {
    let pool = Arc::new(ConnectionPool::new(FakeManager::default(), settings(4)).unwrap());
    let in_use = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let in_use = in_use.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                let conn = pool.borrow().await.unwrap();
                assert!(
                    in_use.lock().unwrap().insert(conn.id),
                    "connection {} handed out twice",
                    conn.id
                );
                tokio::task::yield_now().await;
                in_use.lock().unwrap().remove(&conn.id);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(pool.status().size <= 4);
}

#[tokio::test]
async fn test_two_held_connections_differ() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(2)).unwrap();
    let a = pool.borrow().await.unwrap();
    let b = pool.borrow().await.unwrap();
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_exhaustion_is_reported() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(1)).unwrap();
    let _held = pool.borrow().await.unwrap();

    let err = pool.borrow().await.unwrap_err();
    assert!(matches!(err, QueueError::PoolExhausted));
}

#[tokio::test]
async fn test_returned_connection_is_reused() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(1)).unwrap();
    let first = pool.borrow().await.unwrap().id;
    let second = pool.borrow().await.unwrap().id;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_dead_connection_replaced_on_borrow() {
    let pool = ConnectionPool::new(FakeManager::probing_every_borrow(), settings(1)).unwrap();

    let conn = pool.borrow().await.unwrap();
    let dead_id = conn.id;
    conn.alive.store(false, Ordering::SeqCst);
    drop(conn);

    let conn = pool.borrow().await.unwrap();
    assert_ne!(conn.id, dead_id);
    assert!(conn.alive.load(Ordering::SeqCst));
    assert!(pool.inner.manager().probes.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_fresh_connection_skips_probe() {
    let manager = FakeManager {
        ttl: Duration::from_secs(3600),
        ..Default::default()
    };
    let pool = ConnectionPool::new(manager, settings(1)).unwrap();

    drop(pool.borrow().await.unwrap());
    drop(pool.borrow().await.unwrap());

    let status = pool.status();
    assert_eq!(status.size, 1);
    assert_eq!(pool.inner.manager().probes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dial_failures_bounded() {
    let pool = ConnectionPool::new(FakeManager::refusing(10), settings(1)).unwrap();

    let err = pool.borrow().await.unwrap_err();

    assert!(matches!(err, QueueError::Transport(_)));
    assert_eq!(pool.inner.manager().dials.load(Ordering::SeqCst), MAX_BORROW_ATTEMPTS);
}

#[tokio::test(start_paused = true)]
async fn test_transient_dial_failure_recovers() {
    let pool = ConnectionPool::new(FakeManager::refusing(2), settings(1)).unwrap();

    assert!(pool.borrow().await.is_ok());
    assert_eq!(pool.inner.manager().dials.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_discard_removes_connection() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(1)).unwrap();
    let conn = pool.borrow().await.unwrap();
    let id = discard(conn).id;

    assert_eq!(pool.status().size, 0);
    assert_ne!(pool.borrow().await.unwrap().id, id);
}

#[tokio::test]
async fn test_released_lease_returns_connection() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(1)).unwrap();
    let lease = Lease::new(pool.borrow().await.unwrap());
    let id = lease.id;
    lease.release();

    assert_eq!(pool.status().size, 1);
    assert_eq!(pool.borrow().await.unwrap().id, id);
}

#[tokio::test]
async fn test_dropped_lease_discards_connection() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(1)).unwrap();
    let lease = Lease::new(pool.borrow().await.unwrap());
    let id = lease.id;
    drop(lease);

    assert_eq!(pool.status().size, 0);
    assert_ne!(pool.borrow().await.unwrap().id, id);
}

#[tokio::test]
async fn test_trim_idle_keeps_max_idle() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(3)).unwrap();
    let held: Vec<_> = vec![
        pool.borrow().await.unwrap(),
        pool.borrow().await.unwrap(),
        pool.borrow().await.unwrap(),
    ];
    drop(held);
    assert_eq!(pool.status().size, 3);

    trim_idle(&pool.inner, 1, None);
    assert_eq!(pool.status().size, 1);
}

#[tokio::test]
async fn test_trim_idle_evicts_expired() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(2)).unwrap();
    drop(pool.borrow().await.unwrap());

    trim_idle(&pool.inner, 2, Some(Duration::ZERO));
    assert_eq!(pool.status().size, 0);
}

#[tokio::test]
async fn test_borrow_after_close() {
    let pool = ConnectionPool::new(FakeManager::default(), settings(1)).unwrap();
    pool.close();
    assert!(pool.is_closed());
    assert!(matches!(pool.borrow().await, Err(QueueError::Closed)));
}
