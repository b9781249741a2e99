//! Thread identity and the main-thread rendezvous.
//!
//! The job table and history are owned by the main thread; background expansions (e.g. from
//! completion threads) must not touch them directly. [`perform_on_main`] enqueues a request on
//! a bounded channel and blocks until the main thread services it through
//! [`service_main_thread_requests`].

use crate::FLOG;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, OnceLock};

/// The thread id of the main thread, as set by [`init()`] at startup. If `init()` is never
/// called, the first thread to ask becomes the main thread.
static MAIN_THREAD_ID: OnceLock<usize> = OnceLock::new();

/// Used to bypass thread affinity when testing: the test harness runs every test on its own
/// thread, so under cfg(test) each of them counts as the main thread and main-thread requests
/// run inline.
const THREAD_AFFINITY_CFG_FOR_TESTING: bool = cfg!(test);

/// How many main-thread requests may be queued before senders block.
const MAIN_REQUEST_QUEUE_DEPTH: usize = 16;

/// A request to run a closure on the main thread.
type MainThreadRequest = Box<dyn FnOnce() + Send>;

/// The sending side of the main-thread request channel.
static MAIN_REQUEST_TX: OnceLock<mpsc::SyncSender<MainThreadRequest>> = OnceLock::new();
/// The receiving side, owned by the main thread.
static MAIN_REQUEST_RX: OnceLock<MainThread<mpsc::Receiver<MainThreadRequest>>> = OnceLock::new();

/// Initialize the main thread and the request channel. Must be called at startup from the main
/// thread.
pub fn init() {
    MAIN_THREAD_ID
        .set(thread_id())
        .expect("threads::init() must only be called once (at startup)!");
    let (tx, rx) = mpsc::sync_channel(MAIN_REQUEST_QUEUE_DEPTH);
    MAIN_REQUEST_TX
        .set(tx)
        .expect("request channel already initialized");
    MAIN_REQUEST_RX
        .set(MainThread::new(rx))
        .expect("request channel already initialized");
}

#[inline(always)]
fn main_thread_id() -> usize {
    *MAIN_THREAD_ID.get_or_init(thread_id)
}

/// Get a cheap thread id. Rust's own `std::thread::current().id()` is slow and allocates via
/// `Arc`.
#[inline(always)]
fn thread_id() -> usize {
    static THREAD_COUNTER: AtomicUsize = AtomicUsize::new(0);
    thread_local! {
        static THREAD_ID: usize = THREAD_COUNTER.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| *id)
}

#[inline(always)]
pub fn is_main_thread() -> bool {
    thread_id() == main_thread_id() || THREAD_AFFINITY_CFG_FOR_TESTING
}

#[inline(always)]
pub fn assert_is_main_thread() {
    #[cold]
    fn not_main_thread() -> ! {
        panic!("Function is not running on the main thread!");
    }

    if !is_main_thread() {
        not_main_thread();
    }
}

/// A `Sync` and `Send` wrapper for non-`Sync`/`Send` types.
/// Only allows access from the main thread.
pub struct MainThread<T> {
    data: T,
    // Make type !Send and !Sync by default
    _marker: PhantomData<*const ()>,
}

impl<T> std::fmt::Debug for MainThread<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThread").finish_non_exhaustive()
    }
}

// Manually implement Send and Sync for MainThread<T> to ensure it can be shared across threads
// as long as T is 'static.
unsafe impl<T: 'static> Send for MainThread<T> {}
unsafe impl<T: 'static> Sync for MainThread<T> {}

impl<T> MainThread<T> {
    pub const fn new(value: T) -> Self {
        Self {
            data: value,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> &T {
        assert_is_main_thread();
        &self.data
    }
}

/// Run the given closure on the main thread and return its result, blocking until the main
/// thread has serviced it. If we are already on the main thread, the closure runs inline.
///
/// The main thread must pump [`service_main_thread_requests`], or callers block forever.
pub fn perform_on_main<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if is_main_thread() {
        return f();
    }

    let Some(tx) = MAIN_REQUEST_TX.get() else {
        panic!("threads::init() was not called at startup!");
    };
    let (result_tx, result_rx) = mpsc::sync_channel(1);
    FLOG!(iothread, "notifying main thread from", std::thread::current().id());
    tx.send(Box::new(move || {
        let _ = result_tx.send(f());
    }))
    .expect("Main thread request channel is closed");
    result_rx
        .recv()
        .expect("Main thread dropped our request without running it")
}

/// Service any queued main-thread requests. Called from the main thread's event loop.
pub fn service_main_thread_requests() {
    assert_is_main_thread();
    let Some(rx) = MAIN_REQUEST_RX.get() else {
        return;
    };
    while let Ok(request) = rx.get().try_recv() {
        request();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_ids() {
        let start_thread_id = thread_id();
        assert_eq!(start_thread_id, thread_id());
        let spawned_thread_id = std::thread::spawn(thread_id).join();
        assert_ne!(start_thread_id, spawned_thread_id.unwrap());
    }

    #[test]
    fn test_perform_on_main_inline() {
        // Under cfg(test) every thread counts as main, so this runs inline.
        let value = perform_on_main(|| 42);
        assert_eq!(value, 42);
    }
}
