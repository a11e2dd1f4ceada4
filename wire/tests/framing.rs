// End-to-end framing test: bytes trickling in a few at a time should
// still produce exactly the frames that were sent, in order, with a
// garbage prefix thrown in to exercise the parser's resync-by-one-byte
// behavior.

use wire::parser::{FrameParser, NonBlockingRead, ReadOutcome};
use wire::{Commit, CommitFlags, Frame, Message};

struct ChunkedSource {
    bytes: Vec<u8>,
    pos: usize,
    chunk_size: usize,
    eof_sent: bool,
}

impl ChunkedSource {
    fn new(bytes: Vec<u8>, chunk_size: usize) -> Self {
        ChunkedSource { bytes, pos: 0, chunk_size, eof_sent: false }
    }
}

impl NonBlockingRead for ChunkedSource {
    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        if self.pos >= self.bytes.len() {
            if self.eof_sent {
                return ReadOutcome::NoData;
            }
            self.eof_sent = true;
            return ReadOutcome::Eof;
        }
        let n = self.chunk_size.min(buf.len()).min(self.bytes.len() - self.pos);
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        ReadOutcome::Data(n)
    }
}

#[test]
fn reassembles_many_frames_delivered_in_small_chunks() {
    let messages: Vec<Message> = (0..20)
        .map(|i| {
            Message::Commit(Commit {
                surface_id: i,
                x: i as i32,
                y: -(i as i32),
                flags: if i % 2 == 0 { CommitFlags::ACK } else { CommitFlags::empty() },
            })
        })
        .collect();

    let mut wire_bytes = Vec::new();
    for (seq, msg) in messages.iter().cloned().enumerate() {
        wire_bytes.extend(msg.into_frame(seq as u32).to_bytes());
    }

    let mut src = ChunkedSource::new(wire_bytes, 3);
    let mut parser = FrameParser::new();
    let mut got = Vec::new();

    loop {
        parser.fill_from(&mut src);
        while let Some(frame) = parser.next_frame() {
            got.push(Message::from_frame(&frame).unwrap());
        }
        if parser.eof() {
            break;
        }
    }

    assert_eq!(got, messages);
}

#[test]
fn drops_one_byte_of_noise_before_a_real_frame() {
    let real = Frame::new(wire::MsgType::Hello as u16, 0, wire::Hello { pid: 4242 }.encode());
    let mut bytes = vec![0xab];
    bytes.extend(real.to_bytes());

    let mut src = ChunkedSource::new(bytes, 64);
    let mut parser = FrameParser::new();
    parser.fill_from(&mut src);

    let frame = parser.next_frame().expect("parser should resync past the noise byte");
    let msg = Message::from_frame(&frame).unwrap();
    assert_eq!(msg, Message::Hello(wire::Hello { pid: 4242 }));
}
