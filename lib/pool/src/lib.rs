//! Generic bounded resource pool (C6): fixed-initial, bounded-max, guarded
//! by one mutex and one condition variable. Used both for the SQL
//! connection pool and the Redis connection pool, since both just need a
//! fixed-max pool of verified connections guarded by a mutex+condvar, so one
//! generic type backs both rather than duplicating the locking discipline.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use flux::error::{ChatError, ChatResult};

/// Creates a fresh connection. Pools never persist a known-broken
/// connection; a new one is created lazily the next time `acquire` needs
/// one.
pub trait Factory<T>: Send + Sync {
    fn create(&self) -> ChatResult<T>;
}

impl<T, F> Factory<T> for F
where
    F: Fn() -> ChatResult<T> + Send + Sync,
{
    fn create(&self) -> ChatResult<T> {
        (self)()
    }
}

struct State<T> {
    idle: VecDeque<T>,
    size: usize,
    running: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
    max: usize,
    factory: Box<dyn Factory<T>>,
}

/// A bounded pool of `T`. Clone is cheap (it's a handle around an `Arc`);
/// every clone shares the same underlying connections and limit.
#[derive(Clone)]
pub struct Pool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Pool<T> {
    /// Builds a pool with no connections yet (lazy creation on first
    /// `acquire`) and a hard ceiling of `max` live connections.
    pub fn new<F>(max: usize, factory: F) -> Pool<T>
    where
        F: Factory<T> + 'static,
    {
        Pool {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    idle: VecDeque::new(),
                    size: 0,
                    running: true,
                }),
                cond: Condvar::new(),
                max,
                factory: Box::new(factory),
            }),
        }
    }

    /// Blocks while the idle queue is empty and the pool is at capacity.
    /// Grows by one (via the factory) if under `max`; otherwise waits for a
    /// release. Returns `PoolStopped` if `stop()` was called while waiting
    /// or before the call began.
    pub fn acquire(&self) -> ChatResult<Pooled<T>> {
        let mut state = self.inner.state.lock().unwrap();

        loop {
            if !state.running {
                return Err(ChatError::PoolStopped);
            }

            if let Some(conn) = state.idle.pop_front() {
                return Ok(Pooled {
                    conn: Some(conn),
                    pool: self.clone(),
                });
            }

            if state.size < self.inner.max {
                state.size += 1;
                // Create outside the lock isn't possible without dropping
                // and reacquiring the guard; since `create` only dials out
                // (SQL connect, Redis connect) and never touches the pool
                // itself, holding the lock across it is safe but not
                // reentrant-safe -- acceptable for this pool's usage.
                drop(state);
                let created = self.inner.factory.create();
                state = self.inner.state.lock().unwrap();

                match created {
                    Ok(conn) => {
                        return Ok(Pooled {
                            conn: Some(conn),
                            pool: self.clone(),
                        });
                    }
                    Err(e) => {
                        state.size -= 1;
                        return Err(e);
                    }
                }
            }

            state = self.inner.cond.wait(state).unwrap();
        }
    }

    /// Sets `running = false` and wakes every waiter, which then observe
    /// the flag and abort with `PoolStopped`.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.running = false;
        self.inner.cond.notify_all();
    }

    fn release(&self, conn: T) {
        let mut state = self.inner.state.lock().unwrap();
        state.idle.push_back(conn);
        self.inner.cond.notify_one();
    }

    fn discard(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.size = state.size.saturating_sub(1);
        self.inner.cond.notify_one();
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().unwrap().idle.len()
    }

    pub fn size(&self) -> usize {
        self.inner.state.lock().unwrap().size
    }
}

/// RAII handle around a pooled connection. Dropping it normally returns the
/// connection to the idle queue; call `discard()` first if the connection
/// errored and should not be reused.
pub struct Pooled<T> {
    conn: Option<T>,
    pool: Pool<T>,
}

impl<T> Pooled<T> {
    /// Marks the connection as broken: it is not returned to the pool, and
    /// the pool's live count drops by one so a later `acquire` can create a
    /// fresh replacement.
    pub fn discard(mut self) {
        self.conn.take();
        self.pool.discard();
    }
}

impl<T> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<T> std::ops::DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn counting_pool(max: usize) -> (Pool<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let created_for_factory = created.clone();
        let pool = Pool::new(max, move || {
            Ok(created_for_factory.fetch_add(1, Ordering::SeqCst))
        });
        (pool, created)
    }

    #[test]
    fn acquire_creates_lazily_up_to_max() {
        let (pool, created) = counting_pool(2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.size(), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn release_reuses_idle_connection_without_growing() {
        let (pool, created) = counting_pool(1);

        let conn = pool.acquire().unwrap();
        drop(conn);

        let _conn2 = pool.acquire().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn acquire_blocks_at_capacity_until_release() {
        let (pool, _created) = counting_pool(1);

        let conn = pool.acquire().unwrap();
        let pool2 = pool.clone();

        let handle = thread::spawn(move || pool2.acquire().unwrap());

        thread::sleep(Duration::from_millis(50));
        drop(conn);

        let _second = handle.join().unwrap();
    }

    #[test]
    fn stop_wakes_waiters_with_pool_stopped() {
        let (pool, _created) = counting_pool(1);

        let _conn = pool.acquire().unwrap();
        let pool2 = pool.clone();
        let handle = thread::spawn(move || pool2.acquire());

        thread::sleep(Duration::from_millis(20));
        pool.stop();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(ChatError::PoolStopped)));
    }

    #[test]
    fn discard_allows_a_fresh_connection_to_be_created() {
        let (pool, created) = counting_pool(1);

        let conn = pool.acquire().unwrap();
        conn.discard();

        let _conn2 = pool.acquire().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
