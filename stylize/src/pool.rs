/*!
    Bounded pool of reusable output buffers.
*/

use std::{collections::VecDeque, sync::Arc};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use media_sink::FrameBuffer;
use media_types::{Error, Geometry, Result};

/**
    A fixed number of writable frame buffers shared between the video lane
    and the sink.

    [`BufferPool::acquire`] hands out a recycled buffer when one of the
    right geometry is idle, allocates a new one while fewer than `capacity`
    exist, and otherwise blocks until a buffer is released. A buffer is
    released when it is dropped, which normally happens once the sink has
    finished with it, so a slow sink holds the lane back instead of the
    pool growing.

    Blocked callers are served in arrival order and each release wakes
    exactly one of them.

    Cloning a pool gives another handle to the same buffers.
*/
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    capacity: usize,
    state: Mutex<PoolState>,
    released: Condvar,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<(Geometry, Vec<u8>)>,
    outstanding: usize,
    waiters: VecDeque<u64>,
    next_ticket: u64,
    closed: bool,
}

impl BufferPool {
    /**
        Create a pool holding at most `capacity` buffers. A capacity of zero
        is raised to one.
    */
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                state: Mutex::new(PoolState::default()),
                released: Condvar::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /**
        Number of buffers currently handed out.
    */
    pub fn in_use(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    /**
        Number of released buffers kept for reuse.
    */
    pub fn idle(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /**
        Number of callers blocked in [`BufferPool::acquire`].
    */
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /**
        Take a buffer laid out as `geometry`, blocking while the pool is
        exhausted.

        The contents of a recycled buffer are whatever its last user left
        there. Fails with [`Error::Cancelled`] once the pool is closed,
        including for callers already blocked.
    */
    pub fn acquire(&self, geometry: Geometry) -> Result<PooledBuffer> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.closed {
            return Err(Error::Cancelled);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);

        loop {
            if state.closed {
                state.waiters.retain(|&t| t != ticket);
                return Err(Error::Cancelled);
            }
            if state.waiters.front() == Some(&ticket) && state.outstanding < inner.capacity {
                state.waiters.pop_front();
                break;
            }
            inner.released.wait(&mut state);
        }

        let data = match state.idle.iter().position(|(g, _)| *g == geometry) {
            Some(index) => state.idle.swap_remove(index).1,
            None => {
                // Keep the total number of live allocations within capacity
                if state.idle.len() + state.outstanding >= inner.capacity {
                    state.idle.pop();
                }
                trace!(?geometry, "allocating pooled buffer");
                vec![0u8; geometry.byte_len()]
            }
        };
        state.outstanding += 1;

        // The next waiter in line may be able to proceed too
        if !state.waiters.is_empty() {
            inner.released.notify_all();
        }

        Ok(PooledBuffer {
            geometry,
            data,
            pool: Arc::clone(inner),
        })
    }

    /**
        Return a buffer to the pool. Equivalent to dropping it.
    */
    pub fn release(&self, buffer: PooledBuffer) {
        drop(buffer);
    }

    /**
        Free every idle buffer. Buffers still handed out are unaffected and
        rejoin the pool when released.
    */
    pub fn drain(&self) {
        let mut state = self.inner.state.lock();
        let freed = state.idle.len();
        state.idle.clear();
        trace!(freed, "buffer pool drained");
    }

    /**
        Close the pool. Blocked and future acquires fail with
        [`Error::Cancelled`]; released buffers are freed instead of kept.
    */
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        state.idle.clear();
        self.inner.released.notify_all();
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BufferPool")
            .field("capacity", &self.inner.capacity)
            .field("in_use", &state.outstanding)
            .field("idle", &state.idle.len())
            .field("waiting", &state.waiters.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl PoolInner {
    fn release(&self, geometry: Geometry, data: Vec<u8>) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if !state.closed {
            state.idle.push((geometry, data));
        }
        if !state.waiters.is_empty() {
            self.released.notify_all();
        }
    }
}

/**
    A buffer checked out of a [`BufferPool`]. Returns to the pool on drop.
*/
pub struct PooledBuffer {
    geometry: Geometry,
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl FrameBuffer for PooledBuffer {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.release(self.geometry, data);
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("geometry", &self.geometry)
            .field("len", &self.data.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(BufferPool: Send, Sync);
static_assertions::assert_impl_all!(PooledBuffer: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::PixelFormat;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc,
        },
        thread,
        time::{Duration, Instant},
    };

    fn geometry() -> Geometry {
        Geometry::new(4, 2, PixelFormat::Bgra)
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn released_buffers_are_recycled() {
        let pool = BufferPool::new(2);
        let mut buffer = pool.acquire(geometry()).unwrap();
        assert_eq!(buffer.data().len(), 32);
        buffer.data_mut()[0] = 42;
        pool.release(buffer);
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.in_use(), 0);

        let buffer = pool.acquire(geometry()).unwrap();
        assert_eq!(buffer.data()[0], 42);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn mismatched_geometry_allocates_fresh() {
        let pool = BufferPool::new(1);
        drop(pool.acquire(geometry()).unwrap());
        let other = Geometry::new(2, 2, PixelFormat::Bgra);
        let buffer = pool.acquire(other).unwrap();
        assert_eq!(buffer.geometry(), other);
        assert_eq!(buffer.data().len(), 16);
        // The stale idle buffer was freed to stay within capacity
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn over_capacity_acquire_blocks() {
        let pool = BufferPool::new(1);
        let held = pool.acquire(geometry()).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let buffer = pool.acquire(geometry()).unwrap();
                tx.send(()).unwrap();
                drop(buffer);
            })
        };

        wait_for(|| pool.waiting() == 1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        drop(held);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn one_release_unblocks_one_waiter() {
        let pool = BufferPool::new(2);
        let first = pool.acquire(geometry()).unwrap();
        let second = pool.acquire(geometry()).unwrap();

        let acquired = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let done_rx = Arc::new(Mutex::new(done_rx));
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                let acquired = Arc::clone(&acquired);
                let done_rx = Arc::clone(&done_rx);
                thread::spawn(move || {
                    let buffer = pool.acquire(geometry()).unwrap();
                    acquired.fetch_add(1, Ordering::SeqCst);
                    // Hold the buffer until the test says so
                    let _ = done_rx.lock().recv();
                    drop(buffer);
                })
            })
            .collect();

        wait_for(|| pool.waiting() == 2);
        drop(first);
        wait_for(|| acquired.load(Ordering::SeqCst) == 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(pool.waiting(), 1);

        drop(second);
        wait_for(|| acquired.load(Ordering::SeqCst) == 2);

        drop(done_tx);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn waiters_are_served_in_order() {
        let pool = BufferPool::new(1);
        let held = pool.acquire(geometry()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for id in 0..3 {
            let pool_clone = pool.clone();
            let order = Arc::clone(&order);
            waiters.push(thread::spawn(move || {
                let buffer = pool_clone.acquire(geometry()).unwrap();
                order.lock().push(id);
                drop(buffer);
            }));
            wait_for(|| pool.waiting() == id + 1);
        }

        drop(held);
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn close_cancels_blocked_acquires() {
        let pool = BufferPool::new(1);
        let held = pool.acquire(geometry()).unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire(geometry()).map(drop))
        };
        wait_for(|| pool.waiting() == 1);

        pool.close();
        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(matches!(pool.acquire(geometry()), Err(Error::Cancelled)));

        // Buffers released after close are freed
        drop(held);
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn drain_frees_idle_buffers() {
        let pool = BufferPool::new(3);
        let a = pool.acquire(geometry()).unwrap();
        let b = pool.acquire(geometry()).unwrap();
        let c = pool.acquire(geometry()).unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);

        pool.drain();
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.in_use(), 1);

        drop(c);
        assert_eq!(pool.idle(), 1);
        assert!(pool.acquire(geometry()).is_ok());
    }
}
