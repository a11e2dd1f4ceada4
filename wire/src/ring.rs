// Byte ring used to stage raw bytes pulled off a pipe/socket before the
// parser carves frames out of them.
//
// Grounded on `compositor_ipc_ring.c`'s ipc_rx_ring_t: a power-of-two
// capacity byte buffer with a running read/write cursor (not masked
// until indexing), push-with-drop-oldest-on-overflow, peek-without-
// consuming, and drop-prefix to advance the read cursor after the
// parser has consumed a frame.

/// A power-of-two sized byte ring. Overwrites the oldest bytes when a
/// push would exceed capacity, same as the C reference - a slow/stuck
/// reader loses old data rather than the ring growing unbounded.
pub struct RecvRing {
    buf: Vec<u8>,
    mask: u32,
    r: u32,
    w: u32,
}

impl RecvRing {
    /// `cap` must be a power of two.
    pub fn with_capacity(cap: u32) -> Self {
        assert!(cap.is_power_of_two(), "RecvRing capacity must be a power of two");
        RecvRing {
            buf: vec![0u8; cap as usize],
            mask: cap - 1,
            r: 0,
            w: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Bytes currently buffered and unread.
    pub fn count(&self) -> u32 {
        self.w.wrapping_sub(self.r)
    }

    pub fn space(&self) -> u32 {
        self.capacity() - self.count()
    }

    fn write_at(&mut self, pos: u32, src: &[u8]) {
        let cap = self.capacity();
        let start = pos & self.mask;
        let first = std::cmp::min(src.len() as u32, cap - start);
        self.buf[start as usize..(start + first) as usize]
            .copy_from_slice(&src[..first as usize]);
        if (first as usize) < src.len() {
            let rest = &src[first as usize..];
            self.buf[0..rest.len()].copy_from_slice(rest);
        }
    }

    /// Append `src` to the ring, dropping the oldest buffered bytes if
    /// it doesn't fit. Returns the number of previously-buffered bytes
    /// that were dropped to make room.
    pub fn push(&mut self, src: &[u8]) -> u32 {
        if src.len() as u32 > self.capacity() {
            // Only the tail end of an over-long write can ever survive.
            let overflow = src.len() as u32 - self.capacity();
            let tail = &src[overflow as usize..];
            self.r = 0;
            self.w = 0;
            self.write_at(self.w, tail);
            self.w = self.capacity();
            return overflow + self.count();
        }

        let mut dropped = 0u32;
        let needed = src.len() as u32;
        if needed > self.space() {
            dropped = needed - self.space();
            self.r = self.r.wrapping_add(dropped);
        }
        self.write_at(self.w, src);
        self.w = self.w.wrapping_add(needed);
        dropped
    }

    /// Copy `dst.len()` bytes starting `off` bytes past the read
    /// cursor into `dst`, without consuming them. Caller must ensure
    /// `off + dst.len() <= count()`.
    pub fn peek(&self, off: u32, dst: &mut [u8]) {
        let cap = self.capacity();
        let start = (self.r.wrapping_add(off)) & self.mask;
        let first = std::cmp::min(dst.len() as u32, cap - start);
        dst[..first as usize]
            .copy_from_slice(&self.buf[start as usize..(start + first) as usize]);
        if (first as usize) < dst.len() {
            let rest_len = dst.len() - first as usize;
            dst[first as usize..].copy_from_slice(&self.buf[0..rest_len]);
        }
    }

    /// Advance the read cursor past `n` bytes, discarding them.
    pub fn drop_prefix(&mut self, n: u32) {
        debug_assert!(n <= self.count());
        self.r = self.r.wrapping_add(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_peek_round_trip() {
        let mut ring = RecvRing::with_capacity(16);
        ring.push(b"hello");
        assert_eq!(ring.count(), 5);
        let mut out = [0u8; 5];
        ring.peek(0, &mut out);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn drop_prefix_advances_read_cursor() {
        let mut ring = RecvRing::with_capacity(16);
        ring.push(b"abcdef");
        ring.drop_prefix(3);
        assert_eq!(ring.count(), 3);
        let mut out = [0u8; 3];
        ring.peek(0, &mut out);
        assert_eq!(&out, b"def");
    }

    #[test]
    fn wraps_around_buffer_boundary() {
        let mut ring = RecvRing::with_capacity(8);
        ring.push(b"12345");
        ring.drop_prefix(5);
        ring.push(b"abcde");
        let mut out = [0u8; 5];
        ring.peek(0, &mut out);
        assert_eq!(&out, b"abcde");
    }

    #[test]
    fn overflow_drops_oldest_bytes() {
        let mut ring = RecvRing::with_capacity(8);
        ring.push(b"12345678");
        let dropped = ring.push(b"ab");
        assert_eq!(dropped, 2);
        assert_eq!(ring.count(), 8);
        let mut out = [0u8; 8];
        ring.peek(0, &mut out);
        assert_eq!(&out, b"345678ab");
    }
}
