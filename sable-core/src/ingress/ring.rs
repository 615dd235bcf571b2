//! Lock-free single-producer / single-consumer ring buffer
//!
//! The hand-off between the hardware poll loop and the strategy core.
//! Power-of-two capacity for mask-based index wrap, one slot reserved so
//! full and empty stay distinguishable, and both indices on their own
//! cache line to prevent false sharing.
//!
//! Memory ordering protocol:
//! - producer: relaxed-load own `tail`, acquire-load `head`, release-store
//!   `tail` after writing the slot
//! - consumer: relaxed-load own `head`, acquire-load `tail`, release-store
//!   `head` after reading the slot
//!
//! `push`/`pop` never block; full and empty are ordinary `false`/`None`
//! returns and the caller decides policy (typically drop-newest on the
//! producer, spin on the consumer).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

/// Shared ring state, co-owned by the two endpoints for the ring's
/// lifetime. The index atomics are the only synchronization.
struct Shared<T, const N: usize> {
    /// Consumer index
    head: CachePadded<AtomicUsize>,
    /// Producer index
    tail: CachePadded<AtomicUsize>,
    /// Slot storage; slot `i` is valid iff `head <= i < tail` (mod N)
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// The protocol guarantees a slot is never read and written concurrently:
// the producer only writes slots outside [head, tail), the consumer only
// reads slots inside it.
unsafe impl<T: Send, const N: usize> Sync for Shared<T, N> {}
unsafe impl<T: Send, const N: usize> Send for Shared<T, N> {}

/// SPSC ring buffer of power-of-two capacity `N`, parameterized over a
/// trivially-copyable payload.
///
/// Usable capacity is `N - 1`: one slot stays reserved.
pub struct SpscRing<T: Copy, const N: usize>(std::marker::PhantomData<T>);

impl<T: Copy + Send, const N: usize> SpscRing<T, N> {
    // Referenced from `split`, evaluated at monomorphization time.
    const CAPACITY_OK: () = assert!(N.is_power_of_two() && N >= 2, "ring capacity must be a power of two >= 2");

    /// Create a ring and split it into its two endpoints.
    pub fn split() -> (Producer<T, N>, Consumer<T, N>) {
        #[allow(clippy::let_unit_value)]
        let _ = Self::CAPACITY_OK;

        let mut buffer = Vec::with_capacity(N);
        for _ in 0..N {
            buffer.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        let shared = Arc::new(Shared::<T, N> {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            buffer: buffer.into_boxed_slice(),
        });

        (
            Producer {
                shared: shared.clone(),
            },
            Consumer { shared },
        )
    }
}

#[inline(always)]
const fn wrap<const N: usize>(idx: usize) -> usize {
    idx & (N - 1)
}

/// Producer endpoint. `!Clone`; exactly one producer exists.
pub struct Producer<T: Copy, const N: usize> {
    shared: Arc<Shared<T, N>>,
}

impl<T: Copy + Send, const N: usize> Producer<T, N> {
    /// Push an item. Returns `false` when the ring is full
    /// (`(tail + 1) mod N == head`); the item is dropped by the caller.
    #[inline(always)]
    pub fn push(&self, item: T) -> bool {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let next = wrap::<N>(tail + 1);

        if next == self.shared.head.load(Ordering::Acquire) {
            return false; // full
        }

        unsafe {
            (*self.shared.buffer[tail].get()).write(item);
        }

        self.shared.tail.store(next, Ordering::Release);
        true
    }

    /// Items currently queued
    #[inline]
    pub fn len(&self) -> usize {
        len_of(&self.shared)
    }

    /// True when no items are queued
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity (one slot reserved)
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

/// Consumer endpoint. `!Clone`; exactly one consumer exists.
pub struct Consumer<T: Copy, const N: usize> {
    shared: Arc<Shared<T, N>>,
}

impl<T: Copy + Send, const N: usize> Consumer<T, N> {
    /// Pop the oldest item, or `None` when the ring is empty
    /// (`head == tail`).
    #[inline(always)]
    pub fn pop(&self) -> Option<T> {
        let head = self.shared.head.load(Ordering::Relaxed);

        if head == self.shared.tail.load(Ordering::Acquire) {
            return None; // empty
        }

        let item = unsafe { (*self.shared.buffer[head].get()).assume_init() };

        self.shared.head.store(wrap::<N>(head + 1), Ordering::Release);
        Some(item)
    }

    /// Read the oldest item without removing it.
    ///
    /// Safe on the consumer only: the producer never overwrites a slot in
    /// `[head, tail)`.
    #[inline(always)]
    pub fn peek(&self) -> Option<&T> {
        let head = self.shared.head.load(Ordering::Relaxed);

        if head == self.shared.tail.load(Ordering::Acquire) {
            return None;
        }

        Some(unsafe { (*self.shared.buffer[head].get()).assume_init_ref() })
    }

    /// Bounded-spin pop for the dedicated polling loop: hot-poll up to
    /// `max_spins` times without yielding, then give up.
    ///
    /// Never sleeps; intended for an isolated core.
    #[inline]
    pub fn spin_pop(&self, max_spins: usize) -> Option<T> {
        for _ in 0..max_spins {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            core::hint::spin_loop();
        }
        None
    }

    /// Items currently queued
    #[inline]
    pub fn len(&self) -> usize {
        len_of(&self.shared)
    }

    /// True when no items are queued
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity (one slot reserved)
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

/// `(tail - head) mod N`
#[inline]
fn len_of<T, const N: usize>(shared: &Shared<T, N>) -> usize {
    let head = shared.head.load(Ordering::Acquire);
    let tail = shared.tail.load(Ordering::Acquire);
    if tail >= head {
        tail - head
    } else {
        N - head + tail
    }
}
