//! Battle protocol - framing and envelope schema shared by relay and clients
//!
//! # Wire Format
//!
//! Every message on the TCP stream is a **frame**:
//!
//! ```text
//! +------------------------------+---------------------------+
//! | length: 10 ASCII digits      | payload: `length` bytes   |
//! | zero-padded, e.g. 0000000047 | JSON envelope (UTF-8)     |
//! +------------------------------+---------------------------+
//! ```
//!
//! The payload is a versioned JSON **envelope**, tagged by `type`:
//!
//! ```text
//! {"v":1,"type":"control","signal":"WAITING"}
//! {"v":1,"type":"state","grid":[[0,0,...],...],"score":0,"level":1,"next":["I","O","T"],"held":null}
//! ```
//!
//! # Control Signals
//!
//! - **WAITING**: only one player connected (resent every few seconds)
//! - **STARTED**: both players connected; sent once per pairing
//! - **ROSTER_FULL**: a battle is already running; the relay closes next
//! - **HEARTBEAT**: keepalive while a battle is running
//!
//! # Untrusted Input
//!
//! Peers are treated as untrusted even on a LAN: lengths are capped before
//! allocation ([`framing::read_frame`]), the version is checked first, and
//! snapshot grids and queues are size-bounded ([`StateSnapshot::validate`]).
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use tetris_battle_protocol::{recv_envelope, send_envelope, ControlSignal, Envelope};
//! use tetris_battle_protocol::types::DEFAULT_MAX_FRAME_LEN;
//!
//! let mut wire = Vec::new();
//! send_envelope(&mut wire, &Envelope::control(ControlSignal::Started)).unwrap();
//! assert!(wire[..10].iter().all(u8::is_ascii_digit));
//!
//! let got = recv_envelope(&mut Cursor::new(wire), DEFAULT_MAX_FRAME_LEN).unwrap();
//! assert_eq!(got, Envelope::control(ControlSignal::Started));
//! ```

pub mod framing;
pub mod message;

pub use tetris_battle_types as types;

pub use framing::{
    encode_frame, read_frame, read_frame_async, recv_envelope, recv_envelope_async, send_envelope,
    send_envelope_async, write_frame, write_frame_async, FramingError,
};
pub use message::{
    decode_envelope, encode_envelope, ControlSignal, DecodeError, Envelope, Grid, NextQueue,
    PieceId, SnapshotError, StateSnapshot, PROTOCOL_VERSION,
};
