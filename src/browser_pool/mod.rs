//! Fixed-capacity pool of expensive sessions (headless browsers)
//!
//! Slot lifecycle: `free -> busy` on acquire, `busy -> free` on release,
//! `free -> destroyed` on idle sweep. The pool is the only place busy/free
//! state changes, and every change happens under one slot-table lock.
//!
//! Waiting: when the pool is full and every slot is busy, `acquire()` parks
//! on a [`Notify`] that each release signals, re-checking at
//! `poll_interval` as a fallback (so a failed backend is retried). There is
//! no FIFO guarantee: a caller arriving just after a release can take the
//! slot ahead of one that has been waiting longer.

pub mod backend;
pub mod chromium;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use backend::SessionBackend;
pub use chromium::{BrowserSession, BrowserSource, ChromiumBackend};

use crate::utils::{
    DEFAULT_MAX_POOL_SIZE, DEFAULT_POOL_POLL_INTERVAL, DEFAULT_POOL_SWEEP_INTERVAL,
    DEFAULT_SESSION_IDLE_TIMEOUT,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the session pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserPoolConfig {
    /// Maximum sessions alive at once (default: 3)
    pub max_pool_size: usize,
    /// Free sessions idle longer than this are destroyed (default: 5 minutes)
    #[serde(rename = "idle_timeout_ms", with = "crate::utils::serde_millis")]
    pub idle_timeout: Duration,
    /// Period of the background idle sweep (default: 60s)
    #[serde(rename = "sweep_interval_ms", with = "crate::utils::serde_millis")]
    pub sweep_interval: Duration,
    /// Re-check period while waiting for a slot (default: 100ms)
    #[serde(rename = "poll_interval_ms", with = "crate::utils::serde_millis")]
    pub poll_interval: Duration,
    /// Upper bound on waiting for a slot; `None` waits indefinitely
    #[serde(rename = "acquire_timeout_ms", with = "crate::utils::serde_millis::option")]
    pub acquire_timeout: Option<Duration>,
    /// Run browsers in headless mode (default: true)
    pub headless: bool,
}

impl Default for BrowserPoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_POOL_SWEEP_INTERVAL,
            poll_interval: DEFAULT_POOL_POLL_INTERVAL,
            acquire_timeout: None,
            headless: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Session pool is shut down")]
    ShutDown,

    #[error("No session became available within {waited:?}")]
    Exhausted { waited: Duration },
}

/// Point-in-time slot counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub busy: usize,
    pub free: usize,
    /// Sessions currently being launched
    pub creating: usize,
}

// =============================================================================
// Slots
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Primary,
    Secondary,
}

struct Slot<H> {
    id: u64,
    handle: Arc<H>,
    origin: Origin,
    busy: bool,
    /// Changes on every acquire so a stale guard cannot free a re-leased slot
    lease: u64,
    last_used: Instant,
}

struct PoolState<H> {
    slots: Vec<Slot<H>>,
    creating: usize,
}

// =============================================================================
// Pool
// =============================================================================

/// Pool of sessions created by a primary backend, with an optional fallback
pub struct ResourcePool<H: Send + Sync + 'static> {
    config: BrowserPoolConfig,
    primary: Arc<dyn SessionBackend<Handle = H>>,
    secondary: Option<Arc<dyn SessionBackend<Handle = H>>>,
    state: Mutex<PoolState<H>>,
    released: Notify,
    next_id: AtomicU64,
    next_lease: AtomicU64,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// Pool of headless Chrome sessions
pub type BrowserPool = ResourcePool<BrowserSession>;

impl<H: Send + Sync + 'static> ResourcePool<H> {
    /// Create an empty pool (does NOT start the idle sweeper)
    pub fn new(
        config: BrowserPoolConfig,
        primary: Arc<dyn SessionBackend<Handle = H>>,
        secondary: Option<Arc<dyn SessionBackend<Handle = H>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            primary,
            secondary,
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                creating: 0,
            }),
            released: Notify::new(),
            next_id: AtomicU64::new(0),
            next_lease: AtomicU64::new(0),
            sweeper_handle: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &BrowserPoolConfig {
        &self.config
    }

    /// Start the background idle sweeper
    pub fn start(self: &Arc<Self>) {
        info!("Starting session pool with config: {:?}", self.config);
        let pool = Arc::clone(self);
        let sweeper = tokio::spawn(async move {
            sweeper_loop(pool).await;
        });
        if let Some(previous) = self.sweeper_handle.lock().replace(sweeper) {
            previous.abort();
        }
    }

    /// Take a free session, launching one if below capacity, else wait
    ///
    /// The returned guard releases the slot when dropped.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledSession<H>, PoolError> {
        let started = Instant::now();
        let mut logged_wait = false;

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(PoolError::ShutDown);
            }

            // Register for wakeups before inspecting the table so a release
            // between the check and the wait is not lost
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let reserved = {
                let mut state = self.state.lock();
                if let Some(slot) = state.slots.iter_mut().find(|s| !s.busy) {
                    let session = self.lease(slot);
                    debug!("Acquired session {} from pool", session.id);
                    return Ok(session);
                }
                if state.slots.len() + state.creating < self.config.max_pool_size {
                    state.creating += 1;
                    true
                } else {
                    false
                }
            };

            if reserved {
                let reservation = Reservation {
                    pool: self.as_ref(),
                    armed: true,
                };
                if let Some(session) = self.create_and_lease(reservation).await? {
                    return Ok(session);
                }
            } else if !logged_wait {
                debug!(
                    "Session pool at max capacity ({}), waiting...",
                    self.config.max_pool_size
                );
                logged_wait = true;
            }

            if let Some(limit) = self.config.acquire_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    warn!("Gave up waiting for a pooled session after {:?}", waited);
                    return Err(PoolError::Exhausted { waited });
                }
            }

            let _ = tokio::time::timeout(self.config.poll_interval, notified).await;
        }
    }

    /// Mark the slot holding `handle` free
    ///
    /// Returns `false` (and does nothing) when the handle is not tracked or
    /// its slot is already free.
    pub fn release(&self, handle: &Arc<H>) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state
            .slots
            .iter_mut()
            .find(|s| Arc::ptr_eq(&s.handle, handle))
        else {
            return false;
        };
        if !slot.busy {
            return false;
        }
        slot.busy = false;
        slot.last_used = Instant::now();
        let id = slot.id;
        drop(state);

        self.released.notify_one();
        debug!("Released session {} back to pool", id);
        true
    }

    fn release_lease(&self, id: u64, lease: u64) {
        let mut state = self.state.lock();
        let Some(slot) = state
            .slots
            .iter_mut()
            .find(|s| s.id == id && s.busy && s.lease == lease)
        else {
            return;
        };
        slot.busy = false;
        slot.last_used = Instant::now();
        drop(state);

        self.released.notify_one();
        debug!("Released session {} back to pool", id);
    }

    /// Destroy every free session idle longer than `idle_timeout`
    ///
    /// Busy sessions are never touched, however old. Returns the number of
    /// sessions destroyed.
    pub async fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let expired: Vec<Slot<H>> = {
            let mut state = self.state.lock();
            let (expired, kept) = std::mem::take(&mut state.slots)
                .into_iter()
                .partition(|s| !s.busy && now.duration_since(s.last_used) > idle_timeout);
            state.slots = kept;
            expired
        };

        let count = expired.len();
        for slot in expired {
            debug!(
                "Removing idle session {} (idle {:?})",
                slot.id,
                now.duration_since(slot.last_used)
            );
            self.destroy_slot(slot).await;
        }
        if count > 0 {
            info!("Idle sweep destroyed {} session(s)", count);
        }
        count
    }

    /// Destroy every tracked session, busy or free, and refuse new acquires
    ///
    /// Individual destroy failures are logged and skipped.
    pub async fn shutdown(&self) {
        info!("Shutting down session pool");
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.sweeper_handle.lock().take() {
            handle.abort();
        }

        let slots = std::mem::take(&mut self.state.lock().slots);
        self.released.notify_waiters();

        let count = slots.len();
        for slot in slots {
            if slot.busy {
                warn!("Destroying session {} while still in use", slot.id);
            }
            self.destroy_slot(slot).await;
        }

        info!("Session pool shutdown complete: {} session(s) destroyed", count);
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        let busy = state.slots.iter().filter(|s| s.busy).count();
        PoolStatus {
            total: state.slots.len(),
            busy,
            free: state.slots.len() - busy,
            creating: state.creating,
        }
    }

    fn lease(self: &Arc<Self>, slot: &mut Slot<H>) -> PooledSession<H> {
        let lease = self.next_lease.fetch_add(1, Ordering::Relaxed);
        slot.busy = true;
        slot.lease = lease;
        slot.last_used = Instant::now();
        PooledSession {
            pool: Arc::clone(self),
            id: slot.id,
            lease,
            handle: Arc::clone(&slot.handle),
        }
    }

    /// Launch a session into a reserved slot; `Ok(None)` when both backends fail
    async fn create_and_lease(
        self: &Arc<Self>,
        mut reservation: Reservation<'_, H>,
    ) -> Result<Option<PooledSession<H>>, PoolError> {
        let Some((handle, origin)) = self.create_session().await else {
            // No wakeup: waiters would only retry the same failing backends
            reservation.cancel();
            return Ok(None);
        };

        if self.shutdown.load(Ordering::Acquire) {
            drop(reservation);
            let backend = self.backend(origin);
            if let Err(e) = backend.destroy(Arc::new(handle)).await {
                warn!("Failed to destroy session launched during shutdown: {:#}", e);
            }
            return Err(PoolError::ShutDown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut slot = Slot {
            id,
            handle: Arc::new(handle),
            origin,
            busy: false,
            lease: 0,
            last_used: Instant::now(),
        };
        let session = self.lease(&mut slot);

        let mut state = self.state.lock();
        state.creating -= 1;
        reservation.armed = false;
        state.slots.push(slot);
        drop(state);

        info!("Launched new session {} for acquire", id);
        Ok(Some(session))
    }

    /// Try the primary backend, then the secondary one
    async fn create_session(&self) -> Option<(H, Origin)> {
        match self.primary.create().await {
            Ok(handle) => return Some((handle, Origin::Primary)),
            Err(e) => warn!(
                "Primary backend {} failed to create session: {:#}",
                self.primary.name(),
                e
            ),
        }

        let secondary = self.secondary.as_ref()?;
        match secondary.create().await {
            Ok(handle) => {
                info!("Created session with fallback backend {}", secondary.name());
                Some((handle, Origin::Secondary))
            }
            Err(e) => {
                warn!(
                    "Fallback backend {} failed to create session: {:#}",
                    secondary.name(),
                    e
                );
                None
            }
        }
    }

    fn backend(&self, origin: Origin) -> &Arc<dyn SessionBackend<Handle = H>> {
        match (origin, &self.secondary) {
            (Origin::Secondary, Some(secondary)) => secondary,
            _ => &self.primary,
        }
    }

    async fn destroy_slot(&self, slot: Slot<H>) {
        let backend = self.backend(slot.origin);
        if let Err(e) = backend.destroy(slot.handle).await {
            warn!("Failed to destroy session {}: {:#}", slot.id, e);
        }
    }
}

/// Capacity held for a session being launched; given back if the launch
/// fails or the acquiring future is dropped mid-launch
struct Reservation<'a, H: Send + Sync + 'static> {
    pool: &'a ResourcePool<H>,
    armed: bool,
}

impl<H: Send + Sync + 'static> Reservation<'_, H> {
    fn cancel(mut self) {
        self.pool.state.lock().creating -= 1;
        self.armed = false;
    }
}

impl<H: Send + Sync + 'static> Drop for Reservation<'_, H> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().creating -= 1;
            self.pool.released.notify_one();
        }
    }
}

// =============================================================================
// RAII Guard
// =============================================================================

/// Exclusive hold on one pooled session; releases the slot on drop
pub struct PooledSession<H: Send + Sync + 'static> {
    pool: Arc<ResourcePool<H>>,
    id: u64,
    lease: u64,
    handle: Arc<H>,
}

impl<H: Send + Sync + 'static> PooledSession<H> {
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Shared handle for passing into spawned tasks
    pub fn handle_arc(&self) -> Arc<H> {
        Arc::clone(&self.handle)
    }

    /// The session's unique pool ID
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<H: Send + Sync + 'static> Drop for PooledSession<H> {
    fn drop(&mut self) {
        self.pool.release_lease(self.id, self.lease);
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

async fn sweeper_loop<H: Send + Sync + 'static>(pool: Arc<ResourcePool<H>>) {
    let mut interval = tokio::time::interval(pool.config.sweep_interval);
    interval.tick().await;

    while !pool.shutdown.load(Ordering::Acquire) {
        interval.tick().await;
        pool.sweep_idle().await;
    }

    debug!("Sweeper loop exiting");
}
