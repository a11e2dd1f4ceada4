// Client-side half of the same framed Unix-socket transport
// `compositor::ipc::Connection` implements server-side. The wm opens
// two such connections (the `compositor_wm` bridge, and a second,
// ordinary `compositor` connection it drives itself for the bar), so
// this wrapper is transport-only and agnostic to which typed message
// set rides on top of it.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use wire::{Frame, FrameParser, NonBlockingRead, ReadOutcome};

pub struct Conn {
    stream: Option<UnixStream>,
    parser: FrameParser,
    eof_latched: bool,
}

impl Conn {
    pub fn new() -> Self {
        Conn { stream: None, parser: FrameParser::new(), eof_latched: false }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Non-blocking connect attempt. `true` on fresh success.
    pub fn connect(&mut self, path: &str) -> bool {
        match UnixStream::connect(path) {
            Ok(stream) => {
                let _ = stream.set_nonblocking(true);
                self.stream = Some(stream);
                self.parser = FrameParser::new();
                self.eof_latched = false;
                true
            }
            Err(_) => false,
        }
    }

    pub fn pump(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let Some(stream) = self.stream.as_mut() else { return frames };
        self.parser.fill_from(&mut SocketSource(stream));
        if self.parser.eof() {
            self.eof_latched = true;
        }
        while let Some(f) = self.parser.next_frame() {
            frames.push(f);
        }
        frames
    }

    pub fn is_done(&mut self) -> bool {
        self.eof_latched && self.parser.next_frame().is_none()
    }

    pub fn send_frame(&mut self, frame: Frame) -> Result<()> {
        let stream = self.stream.as_mut().context("not connected")?;
        stream.write_all(&frame.to_bytes()).context("write failed")
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.eof_latched = false;
    }

    /// Block (via short non-blocking polls) until a frame carrying
    /// `req_type`/`seq` with the given msg_type arrives, or `timeout`
    /// elapses. Mirrors the reference's `comp_send_*_sync` helpers,
    /// used only at bar setup time, never in the steady-state loop.
    pub fn send_and_wait(&mut self, frame: Frame, reply_type: u16, timeout: Duration) -> Result<Frame> {
        let seq = frame.header.seq;
        self.send_frame(frame)?;
        let deadline = Instant::now() + timeout;
        loop {
            for reply in self.pump() {
                if reply.header.seq == seq && reply.header.msg_type == reply_type {
                    return Ok(reply);
                }
            }
            if self.is_done() {
                anyhow::bail!("connection closed while waiting for reply");
            }
            if Instant::now() >= deadline {
                anyhow::bail!("timed out waiting for reply");
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Default for Conn {
    fn default() -> Self {
        Self::new()
    }
}

struct SocketSource<'a>(&'a mut UnixStream);

impl<'a> NonBlockingRead for SocketSource<'a> {
    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        match self.0.read(buf) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => ReadOutcome::Data(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => ReadOutcome::NoData,
            Err(_) => ReadOutcome::Eof,
        }
    }
}
