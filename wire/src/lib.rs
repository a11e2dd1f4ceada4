// Binary IPC protocol shared by the compositor and its wm companion
// process: frame codec, a per-client byte ring and parser, the typed
// message sets for both the client<->compositor and compositor<->wm
// connections, the shared-memory input ring, and the shm RAII wrapper
// surfaces are attached through.
//
// Grounded throughout on `original_source/usr/comp.h` (the reference
// client-side IPC helper library) and `compositor_ipc_ring.c`.

pub mod error;
pub mod frame;
pub mod input_ring;
pub mod messages;
pub mod parser;
pub mod ring;
pub mod shm;
pub mod wm_proto;

pub use error::{ErrorCode, ProtoError};
pub use frame::{Frame, FrameHeader, HEADER_LEN, MAGIC, MAX_PAYLOAD, VERSION};
pub use messages::{
    Ack, AttachShmName, Commit, CommitFlags, DestroySurface, ErrorReply, Hello, Input,
    InputKind, InputRingName, Message, MsgType, ShmName, UI_BAR_SURFACE_ID,
};
pub use parser::{FrameParser, NonBlockingRead, ReadOutcome};
pub use ring::RecvRing;
pub use shm::ShmRegion;
pub use wm_proto::{Geometry, WmCmd, WmEvent, WmEventFlags};
