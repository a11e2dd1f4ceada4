// Lock-free SPSC input event ring, laid out directly in a shared
// memory region so the compositor (producer) and a client (consumer)
// can hand pointer/key events back and forth without a syscall per
// event.
//
// Grounded on `comp.h`'s comp_rx_ring_t / comp_input_ring_try_pop and
// the futex-style wait flags comp_wait_events spins on. This crate
// does not wire up an actual futex(2) syscall (`nix` doesn't expose
// one portably); instead the WAIT_R/WAIT_W bits are published the same
// way and a caller willing to block polls them with a short sleep or
// an `FdWatch` timeout, same as the reference's fallback path when
// FUTEX_WAIT isn't available.
//
// Layout (all fields little-endian u32, header is `HEADER_LEN` bytes
// followed by `cap` fixed-size event slots):
//
//   [magic][version][cap][mask][head][tail][flags][dropped]
//
// `head` is only ever written by the producer, `tail` only by the
// consumer - that split is what makes this safe without a lock.

use crate::messages::{Input, InputKind};
use bitflags::bitflags;
use std::sync::atomic::{AtomicU32, Ordering};

pub const RING_MAGIC: u32 = u32::from_le_bytes(*b"YCIR");
pub const RING_VERSION: u32 = 1;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RingFlags: u32 {
        /// The ring has been fully initialized and is safe to consume.
        const READY = 0x1;
        /// The consumer has gone to sleep waiting for data; producer
        /// should wake it after publishing.
        const WAIT_R = 0x2;
        /// The producer is waiting for space; unused by this protocol
        /// today (producer always overwrites), kept for parity with
        /// the reference layout.
        const WAIT_W = 0x4;
    }
}

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_CAP: usize = 8;
const OFF_MASK: usize = 12;
const OFF_HEAD: usize = 16;
const OFF_TAIL: usize = 20;
const OFF_FLAGS: usize = 24;
const OFF_DROPPED: usize = 28;
pub const HEADER_LEN: usize = 32;
pub const EVENT_LEN: usize = Input::LEN;

pub fn region_size(cap: u32) -> usize {
    HEADER_LEN + cap as usize * EVENT_LEN
}

/// Write a freshly-mapped region's header. Must be called exactly once
/// by whichever side allocates the shm object, before the name is
/// handed to the peer.
///
/// # Safety
/// `base` must point to at least `region_size(cap)` writable bytes,
/// and `cap` must be a power of two.
pub unsafe fn init(base: *mut u8, cap: u32) {
    assert!(cap.is_power_of_two(), "input ring capacity must be a power of two");
    atomic_at(base, OFF_MAGIC).store(RING_MAGIC, Ordering::Relaxed);
    atomic_at(base, OFF_VERSION).store(RING_VERSION, Ordering::Relaxed);
    atomic_at(base, OFF_CAP).store(cap, Ordering::Relaxed);
    atomic_at(base, OFF_MASK).store(cap - 1, Ordering::Relaxed);
    atomic_at(base, OFF_HEAD).store(0, Ordering::Relaxed);
    atomic_at(base, OFF_TAIL).store(0, Ordering::Relaxed);
    atomic_at(base, OFF_FLAGS).store(RingFlags::READY.bits(), Ordering::Release);
    atomic_at(base, OFF_DROPPED).store(0, Ordering::Relaxed);
}

unsafe fn atomic_at(base: *mut u8, offset: usize) -> &'static AtomicU32 {
    &*(base.add(offset) as *const AtomicU32)
}

fn event_slot(base: *mut u8, slot: u32) -> *mut u8 {
    unsafe { base.add(HEADER_LEN + slot as usize * EVENT_LEN) }
}

fn encode_event(ev: &Input, dst: *mut u8) {
    let bytes = ev.encode();
    debug_assert_eq!(bytes.len(), EVENT_LEN);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, EVENT_LEN);
    }
}

fn decode_event(src: *const u8) -> Option<Input> {
    let slice = unsafe { std::slice::from_raw_parts(src, EVENT_LEN) };
    Input::decode(slice).ok()
}

/// The producer side of the ring (the compositor). `base` must point
/// at a region already `init`-ed with the same `cap`.
pub struct InputRingProducer {
    base: *mut u8,
    cap: u32,
    mask: u32,
}

unsafe impl Send for InputRingProducer {}

impl InputRingProducer {
    /// # Safety
    /// `base` must point to a live, `init`-ed shared memory mapping of
    /// at least `region_size(cap)` bytes that outlives this handle.
    pub unsafe fn from_raw(base: *mut u8, cap: u32) -> Self {
        InputRingProducer { base, cap, mask: cap - 1 }
    }

    /// Publish `ev`. Returns `true` if the ring was full and the
    /// oldest unread event was dropped to make room - the producer
    /// never blocks.
    pub fn push(&self, ev: &Input) -> bool {
        let head = unsafe { atomic_at(self.base, OFF_HEAD) }.load(Ordering::Relaxed);
        let tail = unsafe { atomic_at(self.base, OFF_TAIL) }.load(Ordering::Acquire);
        let full = head.wrapping_sub(tail) >= self.cap;

        if full {
            unsafe { atomic_at(self.base, OFF_TAIL) }.store(tail.wrapping_add(1), Ordering::Release);
            unsafe { atomic_at(self.base, OFF_DROPPED) }.fetch_add(1, Ordering::Relaxed);
        }

        encode_event(ev, event_slot(self.base, head & self.mask));
        unsafe { atomic_at(self.base, OFF_HEAD) }.store(head.wrapping_add(1), Ordering::Release);

        let flags = unsafe { atomic_at(self.base, OFF_FLAGS) }.load(Ordering::Acquire);
        if flags & RingFlags::WAIT_R.bits() != 0 {
            unsafe { atomic_at(self.base, OFF_FLAGS) }
                .fetch_and(!RingFlags::WAIT_R.bits(), Ordering::Release);
        }

        full
    }

    pub fn dropped(&self) -> u32 {
        unsafe { atomic_at(self.base, OFF_DROPPED) }.load(Ordering::Relaxed)
    }
}

/// The consumer side of the ring (a client). Same safety contract as
/// [`InputRingProducer::from_raw`].
pub struct InputRingConsumer {
    base: *mut u8,
    mask: u32,
}

unsafe impl Send for InputRingConsumer {}

impl InputRingConsumer {
    /// # Safety
    /// Same contract as `InputRingProducer::from_raw`.
    pub unsafe fn from_raw(base: *mut u8, cap: u32) -> Self {
        InputRingConsumer { base, mask: cap - 1 }
    }

    /// Pop the oldest unread event, if any, without blocking.
    pub fn try_pop(&self) -> Option<Input> {
        let tail = unsafe { atomic_at(self.base, OFF_TAIL) }.load(Ordering::Relaxed);
        let head = unsafe { atomic_at(self.base, OFF_HEAD) }.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let ev = decode_event(event_slot(self.base, tail & self.mask));
        unsafe { atomic_at(self.base, OFF_TAIL) }.store(tail.wrapping_add(1), Ordering::Release);
        ev
    }

    /// Mark this side as asleep waiting for data; the producer clears
    /// this bit the next time it pushes. A caller combines this with a
    /// short timed sleep/poll rather than a real futex wait.
    pub fn mark_waiting(&self) {
        unsafe { atomic_at(self.base, OFF_FLAGS) }
            .fetch_or(RingFlags::WAIT_R.bits(), Ordering::Release);
    }

    pub fn dropped(&self) -> u32 {
        unsafe { atomic_at(self.base, OFF_DROPPED) }.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_region(cap: u32) -> Vec<u8> {
        let mut region = vec![0u8; region_size(cap)];
        unsafe { init(region.as_mut_ptr(), cap) };
        region
    }

    fn sample_event(n: u32) -> Input {
        Input {
            kind: InputKind::Pointer,
            surface_id: n,
            sx: n as i32,
            sy: n as i32 * 2,
            keycode: 0,
            key_state: 0,
            buttons: 1,
        }
    }

    #[test]
    fn push_then_pop_preserves_order() {
        let mut region = make_region(4);
        let base = region.as_mut_ptr();
        let producer = unsafe { InputRingProducer::from_raw(base, 4) };
        let consumer = unsafe { InputRingConsumer::from_raw(base, 4) };

        producer.push(&sample_event(1));
        producer.push(&sample_event(2));

        assert_eq!(consumer.try_pop().unwrap().surface_id, 1);
        assert_eq!(consumer.try_pop().unwrap().surface_id, 2);
        assert!(consumer.try_pop().is_none());
    }

    #[test]
    fn overflow_drops_oldest_and_counts_it() {
        let mut region = make_region(2);
        let base = region.as_mut_ptr();
        let producer = unsafe { InputRingProducer::from_raw(base, 2) };
        let consumer = unsafe { InputRingConsumer::from_raw(base, 2) };

        producer.push(&sample_event(1));
        producer.push(&sample_event(2));
        let dropped = producer.push(&sample_event(3));

        assert!(dropped);
        assert_eq!(producer.dropped(), 1);
        assert_eq!(consumer.try_pop().unwrap().surface_id, 2);
        assert_eq!(consumer.try_pop().unwrap().surface_id, 3);
    }
}
