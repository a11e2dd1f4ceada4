// Per-client frame parser.
//
// Grounded on `compositor_client_pump.c`'s drain-then-parse loop: bytes
// are pulled off the transport in bounded chunks into a `RecvRing`,
// then complete frames are carved out of the ring one at a time. A
// frame whose header fails to validate causes the parser to resync by
// dropping a single byte and retrying, rather than tearing down the
// connection - a transient scheduling hiccup that corrupts one frame
// should not take the whole session down.

use crate::frame::{Frame, FrameHeader, HEADER_LEN, MAX_PAYLOAD};
use crate::ring::RecvRing;

/// How a non-blocking read attempt came back. Mirrors the C reference's
/// `pipe_try_read`, which returns a negative number for a closed/error
/// transport and zero for "nothing available right now" - two outcomes
/// Rust's `Read::read` collapses into the same `Ok(0)`.
pub enum ReadOutcome {
    NoData,
    Data(usize),
    Eof,
}

pub trait NonBlockingRead {
    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome;
}

const DRAIN_CHUNK: usize = 4096;
const RING_CAPACITY: u32 = 16384;

pub struct FrameParser {
    ring: RecvRing,
    eof: bool,
    next_seq: u32,
}

impl FrameParser {
    pub fn new() -> Self {
        FrameParser {
            ring: RecvRing::with_capacity(RING_CAPACITY),
            eof: false,
            next_seq: 0,
        }
    }

    /// True once the transport has reported end-of-file. The caller
    /// should keep draining frames with `next_frame` until it returns
    /// `None`, then tear the session down.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Pull as many bytes as are immediately available (in bounded
    /// chunks) from `src` into the internal ring. Each read is capped to
    /// the ring's remaining space minus one max-sized frame, mirroring
    /// `comp_client_pump`'s `space - reserve` cap: the ring must always
    /// have room for a full incoming frame, so draining never forces
    /// `RecvRing::push` to evict not-yet-parsed bytes. Returns the
    /// number of bytes read this call.
    pub fn fill_from<R: NonBlockingRead>(&mut self, src: &mut R) -> usize {
        let reserve = HEADER_LEN as u32 + MAX_PAYLOAD;
        let mut total = 0usize;
        let mut chunk = [0u8; DRAIN_CHUNK];
        loop {
            let budget = self.ring.space().saturating_sub(reserve);
            if budget == 0 {
                break;
            }
            let want = std::cmp::min(DRAIN_CHUNK as u32, budget) as usize;
            match src.try_read(&mut chunk[..want]) {
                ReadOutcome::Data(n) if n > 0 => {
                    self.ring.push(&chunk[..n]);
                    total += n;
                    if n < want {
                        break;
                    }
                }
                ReadOutcome::Data(_) | ReadOutcome::NoData => break,
                ReadOutcome::Eof => {
                    self.eof = true;
                    break;
                }
            }
        }
        total
    }

    /// Try to carve the next complete frame out of the ring. Returns
    /// `None` when there isn't one yet. Skips a single byte and retries
    /// on a header that fails validation, so one corrupt length field
    /// doesn't wedge the whole stream.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.ring.count() < HEADER_LEN as u32 {
                return None;
            }
            let mut hdr_bytes = [0u8; HEADER_LEN];
            self.ring.peek(0, &mut hdr_bytes);
            let header = FrameHeader::decode(&hdr_bytes);

            if header.validate().is_err() || header.len > MAX_PAYLOAD {
                self.ring.drop_prefix(1);
                continue;
            }

            let total_len = HEADER_LEN as u32 + header.len;
            if self.ring.count() < total_len {
                return None;
            }

            let mut payload = vec![0u8; header.len as usize];
            if header.len > 0 {
                self.ring.peek(HEADER_LEN as u32, &mut payload);
            }
            self.ring.drop_prefix(total_len);
            return Some(Frame { header, payload });
        }
    }

    /// The sequence number to stamp on the next frame this side sends.
    pub fn alloc_seq(&mut self) -> u32 {
        let s = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        s
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for FrameParser {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource {
        chunks: Vec<Vec<u8>>,
        eof_after: bool,
    }

    impl NonBlockingRead for FakeSource {
        fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
            if let Some(chunk) = self.chunks.first().cloned() {
                self.chunks.remove(0);
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                ReadOutcome::Data(n)
            } else if self.eof_after {
                ReadOutcome::Eof
            } else {
                ReadOutcome::NoData
            }
        }
    }

    #[test]
    fn parses_one_frame_delivered_whole() {
        let frame = Frame::new(3, 0, vec![1, 2, 3, 4]);
        let mut src = FakeSource {
            chunks: vec![frame.to_bytes()],
            eof_after: false,
        };
        let mut parser = FrameParser::new();
        parser.fill_from(&mut src);
        let got = parser.next_frame().expect("frame should parse");
        assert_eq!(got.header.msg_type, 3);
        assert_eq!(got.payload, vec![1, 2, 3, 4]);
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn parses_frame_split_across_reads() {
        let frame = Frame::new(9, 1, vec![9, 9, 9]);
        let bytes = frame.to_bytes();
        let (a, b) = bytes.split_at(5);
        let mut src = FakeSource {
            chunks: vec![a.to_vec(), b.to_vec()],
            eof_after: false,
        };
        let mut parser = FrameParser::new();
        parser.fill_from(&mut src);
        assert!(parser.next_frame().is_none(), "only half the frame arrived");
        parser.fill_from(&mut src);
        let got = parser.next_frame().expect("frame should now be complete");
        assert_eq!(got.header.msg_type, 9);
    }

    #[test]
    fn resyncs_past_a_corrupt_header() {
        let mut garbage = vec![0xffu8; 20];
        let frame = Frame::new(5, 0, vec![7, 7]);
        garbage.extend(frame.to_bytes());
        let mut src = FakeSource {
            chunks: vec![garbage],
            eof_after: false,
        };
        let mut parser = FrameParser::new();
        parser.fill_from(&mut src);
        let got = parser.next_frame().expect("should resync onto the real frame");
        assert_eq!(got.header.msg_type, 5);
        assert_eq!(got.payload, vec![7, 7]);
    }

    #[test]
    fn fill_from_stops_short_of_evicting_buffered_frames() {
        let mut parser = FrameParser::new();
        let chunks = (0..10).map(|_| vec![0x42u8; DRAIN_CHUNK]).collect();
        let mut src = FakeSource { chunks, eof_after: false };
        parser.fill_from(&mut src);
        let reserve = HEADER_LEN as u32 + MAX_PAYLOAD;
        assert!(parser.ring.space() >= reserve, "a full frame must always still fit");
    }

    #[test]
    fn eof_is_latched() {
        let mut src = FakeSource {
            chunks: vec![],
            eof_after: true,
        };
        let mut parser = FrameParser::new();
        parser.fill_from(&mut src);
        assert!(parser.eof());
    }
}
