// Session pool behavior against an in-memory backend
use anyhow::{Result, bail};
use async_trait::async_trait;
use kodegen_tools_listingscrape::browser_pool::{
    BrowserPoolConfig, PoolError, ResourcePool, SessionBackend,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct FakeSession {
    serial: u64,
}

#[derive(Default)]
struct FakeBackend {
    failing: AtomicBool,
    next_serial: AtomicU64,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl FakeBackend {
    fn failing() -> Self {
        let backend = Self::default();
        backend.failing.store(true, Ordering::SeqCst);
        backend
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    type Handle = FakeSession;

    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self) -> Result<FakeSession> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            serial: self.next_serial.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn destroy(&self, _handle: Arc<FakeSession>) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config(max_pool_size: usize) -> BrowserPoolConfig {
    BrowserPoolConfig {
        max_pool_size,
        idle_timeout: Duration::from_secs(300),
        poll_interval: Duration::from_millis(100),
        ..BrowserPoolConfig::default()
    }
}

fn pool_with(
    config: BrowserPoolConfig,
    primary: &Arc<FakeBackend>,
    secondary: Option<&Arc<FakeBackend>>,
) -> Arc<ResourcePool<FakeSession>> {
    let primary: Arc<dyn SessionBackend<Handle = FakeSession>> = primary.clone();
    let secondary =
        secondary.map(|b| -> Arc<dyn SessionBackend<Handle = FakeSession>> { b.clone() });
    ResourcePool::new(config, primary, secondary)
}

#[tokio::test(start_paused = true)]
async fn test_extra_caller_waits_for_release() {
    let backend = Arc::new(FakeBackend::default());
    let pool = pool_with(config(2), &backend, None);

    let first = pool.acquire().await.expect("first session");
    let second = pool.acquire().await.expect("second session");
    assert_eq!(backend.created.load(Ordering::SeqCst), 2);

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await.map(|s| s.id()) })
    };

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!waiter.is_finished(), "third caller must wait while pool is full");

    let released_id = first.id();
    drop(first);

    let got = waiter.await.expect("task joins").expect("session after release");
    assert_eq!(got, released_id);
    assert_eq!(backend.created.load(Ordering::SeqCst), 2);

    let status = pool.status();
    assert_eq!(status.total, 2);
    drop(second);
}

#[tokio::test(start_paused = true)]
async fn test_idle_sweep_destroys_only_free_sessions() {
    let backend = Arc::new(FakeBackend::default());
    let pool = pool_with(config(3), &backend, None);

    let idle = pool.acquire().await.expect("session");
    let busy = pool.acquire().await.expect("session");
    drop(idle);

    tokio::time::advance(Duration::from_secs(301)).await;

    assert_eq!(pool.sweep_idle().await, 1);
    assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);

    let status = pool.status();
    assert_eq!(status.total, 1);
    assert_eq!(status.busy, 1);
    assert_eq!(busy.handle().serial, 1);
}

#[tokio::test(start_paused = true)]
async fn test_recently_used_session_survives_sweep() {
    let backend = Arc::new(FakeBackend::default());
    let pool = pool_with(config(1), &backend, None);

    drop(pool.acquire().await.expect("session"));
    tokio::time::advance(Duration::from_secs(200)).await;

    assert_eq!(pool.sweep_idle().await, 0);
    assert_eq!(pool.status().free, 1);
}

#[tokio::test]
async fn test_falls_back_to_secondary_backend() {
    let primary = Arc::new(FakeBackend::failing());
    let secondary = Arc::new(FakeBackend::default());
    let pool = pool_with(config(2), &primary, Some(&secondary));

    let session = pool.acquire().await.expect("fallback session");
    assert_eq!(secondary.created.load(Ordering::SeqCst), 1);
    assert_eq!(primary.created.load(Ordering::SeqCst), 0);
    drop(session);

    pool.shutdown().await;
    assert_eq!(secondary.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(primary.destroyed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_both_backends_failing_times_out() {
    let primary = Arc::new(FakeBackend::failing());
    let secondary = Arc::new(FakeBackend::failing());
    let pool = pool_with(
        BrowserPoolConfig {
            acquire_timeout: Some(Duration::from_millis(500)),
            ..config(2)
        },
        &primary,
        Some(&secondary),
    );

    match pool.acquire().await {
        Err(PoolError::Exhausted { waited }) => assert!(waited >= Duration::from_millis(500)),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("no backend can create sessions"),
    }

    let status = pool.status();
    assert_eq!(status.total, 0);
    assert_eq!(status.creating, 0);
}

#[tokio::test(start_paused = true)]
async fn test_recovered_backend_is_retried_by_waiter() {
    let backend = Arc::new(FakeBackend::failing());
    let pool = pool_with(config(1), &backend, None);

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await.map(|s| s.handle().serial) })
    };

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(!waiter.is_finished());

    backend.failing.store(false, Ordering::SeqCst);
    let serial = waiter.await.expect("task joins").expect("session once backend recovers");
    assert_eq!(serial, 0);
}

#[tokio::test]
async fn test_release_untracked_handle_is_noop() {
    let backend = Arc::new(FakeBackend::default());
    let pool = pool_with(config(1), &backend, None);

    let stranger = Arc::new(FakeSession { serial: 99 });
    assert!(!pool.release(&stranger));

    let session = pool.acquire().await.expect("session");
    let handle = session.handle_arc();
    assert!(pool.release(&handle));
    assert!(!pool.release(&handle), "second release of a free slot is a no-op");

    // The slot is re-leased; the stale guard must not free it
    let current = pool.acquire().await.expect("re-acquire");
    drop(session);
    assert_eq!(pool.status().busy, 1);
    drop(current);
    assert_eq!(pool.status().busy, 0);
}

#[tokio::test]
async fn test_shutdown_destroys_everything() {
    let backend = Arc::new(FakeBackend::default());
    let pool = pool_with(config(3), &backend, None);

    let busy = pool.acquire().await.expect("session");
    drop(pool.acquire().await.expect("session"));

    pool.shutdown().await;
    assert_eq!(backend.destroyed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.status().total, 0);
    assert!(matches!(pool.acquire().await, Err(PoolError::ShutDown)));

    // Dropping a guard after shutdown must not panic or resurrect the slot
    drop(busy);
    assert_eq!(pool.status().total, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_wakes_blocked_waiter() {
    let backend = Arc::new(FakeBackend::default());
    let pool = pool_with(
        BrowserPoolConfig {
            poll_interval: Duration::from_secs(3_600),
            ..config(1)
        },
        &backend,
        None,
    );

    let _held = pool.acquire().await.expect("only session");
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await.map(|s| s.id()) })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    let shutdown_at = tokio::time::Instant::now();
    pool.shutdown().await;
    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter woken before its poll interval")
        .expect("waiter task");

    assert!(matches!(result, Err(PoolError::ShutDown)));
    assert!(shutdown_at.elapsed() < Duration::from_secs(2));
}
