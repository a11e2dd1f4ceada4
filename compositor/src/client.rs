// Per-client session: connection, surface table, input-ring producer
// handshake.
//
// Grounded on `compositor_client_pump.c`'s per-client struct (pipe
// pair, receive ring, fixed surface array, input ring state) and
// `comp_client_send_input_ring_name`'s offer/ack handshake sequence.

use anyhow::Result;
use wire::input_ring::InputRingProducer;
use wire::{
    input_ring, Ack, AttachShmName, Commit, CommitFlags, DestroySurface, ErrorCode, ErrorReply,
    Hello, Input, InputRingName, Message, MsgType, ProtoError, ShmName, ShmRegion,
};

use crate::config::MAX_SURFACES;
use crate::ipc::Connection;
use crate::surface::Surface;

/// Capacity of the shared-memory input ring negotiated with each
/// client (§4.2 names this `CAP`, left to the implementation).
const INPUT_RING_CAP: u32 = 128;

enum InputRing {
    /// HELLO not yet processed, or HELLO processing failed to allocate
    /// a region - input for this client falls back to framed messages.
    Unavailable,
    /// `INPUT_RING_NAME` has been sent; waiting for the client's
    /// `INPUT_RING_ACK` before trusting the ring is mapped.
    Offered { region: ShmRegion, producer: InputRingProducer },
    /// Client acked the mapping; the region's name has been unlinked
    /// so only this mapping (and the client's) survive, per §4.2.
    Ready { _region: ShmRegion, producer: InputRingProducer },
}

/// Something that happened to a surface as a result of dispatching one
/// message, which the caller turns into a `WM_EVENT` once it knows
/// whether a WM is connected to send it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Mapped(u32),
    Committed(u32),
    Unmapped(u32),
}

pub struct Client {
    pub id: u32,
    pub pid: Option<u32>,
    conn: Connection,
    surfaces: Vec<Surface>,
    input_ring: InputRing,
    /// Name of the just-offered ring's shm object, stashed between
    /// `offer_input_ring` and the `INPUT_RING_NAME` announcement that
    /// follows it in the same HELLO reply.
    pending_ring_name: Option<String>,
}

impl Client {
    pub fn new(id: u32, conn: Connection) -> Self {
        Client {
            id,
            pid: None,
            conn,
            surfaces: Vec::with_capacity(4),
            input_ring: InputRing::Unavailable,
            pending_ring_name: None,
        }
    }

    pub fn pump(&mut self) -> Vec<wire::Frame> {
        self.conn.pump()
    }

    pub fn is_done(&mut self) -> bool {
        self.conn.is_done()
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut [Surface] {
        &mut self.surfaces
    }

    pub fn find_surface(&self, id: u32) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id == id)
    }

    pub fn find_surface_mut(&mut self, id: u32) -> Option<&mut Surface> {
        self.surfaces.iter_mut().find(|s| s.id == id)
    }

    /// Every surface this client had mapped, for UNMAP synthesis on
    /// teardown (disconnect or transport failure).
    pub fn mapped_surface_ids(&self) -> Vec<u32> {
        self.surfaces
            .iter()
            .filter(|s| s.mapped_to_wm)
            .map(|s| s.id)
            .collect()
    }

    /// Deliver an input event to this client: through the shared ring
    /// if negotiated and acked, else as an ordinary framed message -
    /// the fallback path §4.2 calls for when the ring isn't in use.
    pub fn deliver_input(&mut self, ev: Input) -> Result<()> {
        match &self.input_ring {
            InputRing::Ready { producer, .. } => {
                producer.push(&ev);
                Ok(())
            }
            _ => self.send_async(Message::Input(ev)),
        }
    }

    fn send_async(&mut self, msg: Message) -> Result<()> {
        self.conn.send(msg, 0)
    }

    fn reply(&mut self, msg: Message, seq: u32) -> Result<()> {
        self.conn.send(msg, seq)
    }

    /// Dispatch one decoded frame. Returns the surface-level side
    /// effects the caller (the frame loop) should turn into WM events;
    /// replies are written straight to the connection here, matching
    /// §4.1's "every request carries a seq, the reply shares it."
    pub fn handle_frame(
        &mut self,
        frame: &wire::Frame,
        shm_name_prefix: &str,
        wm_connected: bool,
        next_commit_gen: &mut u64,
        next_z: &mut u64,
    ) -> Result<Vec<SurfaceEvent>> {
        let seq = frame.header.seq;
        let msg = match Message::from_frame(frame) {
            Ok(m) => m,
            Err(_) => {
                self.reply(
                    Message::Error(ErrorReply { req_type: frame.header.msg_type, code: ErrorCode::Invalid as u16, surface_id: 0 }),
                    seq,
                )?;
                return Ok(Vec::new());
            }
        };

        match msg {
            Message::Hello(Hello { pid }) => {
                self.pid = Some(pid);
                self.offer_input_ring(shm_name_prefix)?;
                self.reply(Message::Ack(Ack { req_type: MsgType::Hello as u16, surface_id: 0 }), seq)?;
                if let Some(name) = self.pending_ring_name.take() {
                    if let Ok(wire_name) = ShmName::from_str(&name) {
                        self.send_async(Message::InputRingName(InputRingName {
                            size_bytes: input_ring::region_size(INPUT_RING_CAP) as u32,
                            cap: INPUT_RING_CAP,
                            name: wire_name,
                        }))?;
                    }
                }
                Ok(Vec::new())
            }

            Message::InputRingAck => {
                self.ack_input_ring();
                self.reply(Message::Ack(Ack { req_type: MsgType::InputRingAck as u16, surface_id: 0 }), seq)?;
                Ok(Vec::new())
            }

            Message::AttachShmName(req) => self.handle_attach(req, seq),

            Message::Commit(req) => self.handle_commit(req, seq, wm_connected, next_commit_gen, next_z),

            Message::DestroySurface(req) => self.handle_destroy(req, seq),

            Message::Input(_) | Message::Ack(_) | Message::Error(_) | Message::InputRingName(_) => {
                self.reply(
                    Message::Error(ErrorReply { req_type: frame.header.msg_type, code: ErrorCode::Invalid as u16, surface_id: 0 }),
                    seq,
                )?;
                Ok(Vec::new())
            }
        }
    }

    fn offer_input_ring(&mut self, shm_name_prefix: &str) -> Result<()> {
        let name = format!("{}_input_{}", shm_name_prefix, self.id);
        let size = input_ring::region_size(INPUT_RING_CAP);
        let region = match ShmRegion::create(&name, size) {
            Ok(r) => r,
            Err(_) => {
                self.input_ring = InputRing::Unavailable;
                return Ok(());
            }
        };
        unsafe { input_ring::init(region.as_ptr(), INPUT_RING_CAP) };
        let producer = unsafe { InputRingProducer::from_raw(region.as_ptr(), INPUT_RING_CAP) };
        self.input_ring = InputRing::Offered { region, producer };
        self.pending_ring_name = Some(name);
        Ok(())
    }

    fn ack_input_ring(&mut self) {
        if let InputRing::Offered { mut region, producer } =
            std::mem::replace(&mut self.input_ring, InputRing::Unavailable)
        {
            region.unlink();
            self.input_ring = InputRing::Ready { _region: region, producer };
        }
    }

    fn handle_attach(&mut self, req: AttachShmName, seq: u32) -> Result<Vec<SurfaceEvent>> {
        if self.find_surface(req.surface_id).is_none() {
            if self.surfaces.len() >= MAX_SURFACES {
                self.reply(
                    Message::Error(ErrorReply {
                        req_type: MsgType::AttachShmName as u16,
                        code: ErrorCode::Invalid as u16,
                        surface_id: req.surface_id,
                    }),
                    seq,
                )?;
                return Ok(Vec::new());
            }
            self.surfaces.push(Surface::new(req.surface_id));
        }

        let name = req.name.as_str().unwrap_or("").to_string();
        let region = match ShmRegion::open(&name, req.size_bytes as usize, false) {
            Ok(r) => r,
            Err(e) => {
                let code = e.code().unwrap_or(ErrorCode::ShmOpen);
                self.reply(
                    Message::Error(ErrorReply { req_type: MsgType::AttachShmName as u16, code: code as u16, surface_id: req.surface_id }),
                    seq,
                )?;
                return Ok(Vec::new());
            }
        };

        let surface = self.find_surface_mut(req.surface_id).expect("just inserted");
        surface.attach(region, req.width, req.height, req.stride);
        self.reply(Message::Ack(Ack { req_type: MsgType::AttachShmName as u16, surface_id: req.surface_id }), seq)?;
        Ok(Vec::new())
    }

    fn handle_commit(
        &mut self,
        req: Commit,
        seq: u32,
        wm_connected: bool,
        next_commit_gen: &mut u64,
        next_z: &mut u64,
    ) -> Result<Vec<SurfaceEvent>> {
        let is_bar;
        let was_first_commit;
        let client_id = self.id;
        {
            let surface = match self.find_surface_mut(req.surface_id) {
                Some(s) => s,
                None => {
                    self.reply(
                        Message::Error(ErrorReply { req_type: MsgType::Commit as u16, code: ErrorCode::NoSurface as u16, surface_id: req.surface_id }),
                        seq,
                    )?;
                    return Ok(Vec::new());
                }
            };

            is_bar = surface.is_bar();
            was_first_commit = surface.is_first_commit();

            *next_commit_gen += 1;
            let gen = *next_commit_gen;

            // Once a WM is attached it is authoritative for position; an
            // ordinary client COMMIT must not move the surface out from
            // under a WM-issued MOVE (e.g. mid-drag or post-drag).
            let (x, y) = if is_bar {
                (0, 0)
            } else if !wm_connected {
                (req.x, req.y)
            } else {
                (surface.x, surface.y)
            };

            let should_raise = is_bar
                || was_first_commit
                || (req.flags.contains(CommitFlags::RAISE) && !wm_connected);
            if should_raise {
                *next_z += 1;
                surface.z = *next_z;
            }

            if let Some(buffer) = surface.buffer.as_ref() {
                let w = surface.w;
                let h = surface.h;
                let stride = surface.stride;
                let pixels = unsafe {
                    std::slice::from_raw_parts(buffer.as_ptr() as *const u32, buffer.size() / 4)
                };
                let name_prefix = format!("ycm_shadow_{}_{}", client_id, req.surface_id);
                if surface.shadow.ensure(&name_prefix, w, h, stride).is_ok() {
                    surface.shadow.snapshot_try(pixels, w, h, stride);
                }
            }

            surface.commit(x, y, gen);
            surface.mapped_to_wm = true;
        }

        self.reply(Message::Ack(Ack { req_type: MsgType::Commit as u16, surface_id: req.surface_id }), seq)?;

        if is_bar {
            return Ok(Vec::new());
        }
        Ok(vec![if was_first_commit {
            SurfaceEvent::Mapped(req.surface_id)
        } else {
            SurfaceEvent::Committed(req.surface_id)
        }])
    }

    fn handle_destroy(&mut self, req: DestroySurface, seq: u32) -> Result<Vec<SurfaceEvent>> {
        let idx = self.surfaces.iter().position(|s| s.id == req.surface_id);
        let idx = match idx {
            Some(i) => i,
            None => {
                self.reply(
                    Message::Error(ErrorReply { req_type: MsgType::DestroySurface as u16, code: ErrorCode::NoSurface as u16, surface_id: req.surface_id }),
                    seq,
                )?;
                return Ok(Vec::new());
            }
        };
        let was_mapped = self.surfaces[idx].mapped_to_wm && !self.surfaces[idx].is_bar();
        self.surfaces.remove(idx);
        self.reply(Message::Ack(Ack { req_type: MsgType::DestroySurface as u16, surface_id: req.surface_id }), seq)?;
        if was_mapped {
            Ok(vec![SurfaceEvent::Unmapped(req.surface_id)])
        } else {
            Ok(Vec::new())
        }
    }
}
