//! Shared battle types - plain data and constants
//!
//! Everything here is pure data with no external dependencies, so the wire
//! protocol, the relay server and the client can all agree on the same
//! vocabulary without pulling each other in.
//!
//! # Board Dimensions
//!
//! The standard playfield is 10 columns by 20 rows. Snapshots exchanged over
//! the wire may use other rectangular sizes (bounded by [`MAX_GRID_ROWS`] and
//! [`MAX_GRID_COLS`]) so a peer running a taller "danger area" board is still
//! mirrored faithfully.
//!
//! # Protocol Constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `DEFAULT_PORT` | 5555 | Relay server port |
//! | `FRAME_PREFIX_LEN` | 10 | ASCII decimal digits in the length prefix |
//! | `DEFAULT_MAX_FRAME_LEN` | 4 MiB | Largest accepted payload |
//! | `WAIT_NOTIFY_INTERVAL_MS` | 5000 | "waiting" resend period |
//! | `HEARTBEAT_INTERVAL_MS` | 5000 | Keepalive period while relaying |
//! | `CONNECT_TIMEOUT_MS` | 30000 | Client connect timeout |
//! | `READ_TIMEOUT_MS` | 30000 | Client receive timeout |
//!
//! # Examples
//!
//! ```
//! use tetris_battle_types::{PieceKind, BOARD_WIDTH, BOARD_HEIGHT};
//!
//! let piece = PieceKind::from_str("t").unwrap();
//! assert_eq!(piece, PieceKind::T);
//! assert_eq!(piece.as_str(), "T");
//!
//! // Cell codes used on the wire: 0 = empty, 1..=7 = piece colour
//! assert_eq!(PieceKind::from_code(piece.code()), Some(PieceKind::T));
//!
//! assert_eq!((BOARD_WIDTH, BOARD_HEIGHT), (10, 20));
//! ```

/// Board width in cells (10 columns)
pub const BOARD_WIDTH: u8 = 10;

/// Board height in cells (20 rows)
pub const BOARD_HEIGHT: u8 = 20;

/// Largest grid height accepted from a peer.
pub const MAX_GRID_ROWS: usize = 64;

/// Largest grid width accepted from a peer.
pub const MAX_GRID_COLS: usize = 32;

/// Largest upcoming-piece queue accepted from a peer.
pub const MAX_NEXT_PIECES: usize = 8;

/// Default relay port.
pub const DEFAULT_PORT: u16 = 5555;

/// Width of the ASCII decimal length prefix in front of every frame.
pub const FRAME_PREFIX_LEN: usize = 10;

/// Default upper bound on a single frame payload (4 MiB).
///
/// The prefix format alone would allow payloads just under 10^10 bytes; this
/// bound keeps a hostile prefix from forcing a huge allocation.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Interval between "waiting for second player" resends.
pub const WAIT_NOTIFY_INTERVAL_MS: u64 = 5_000;

/// Interval between relay heartbeats once a battle is running.
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Client connect timeout.
pub const CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Client receive timeout. Must stay above [`HEARTBEAT_INTERVAL_MS`].
pub const READ_TIMEOUT_MS: u64 = 30_000;

/// Capacity of the relay roster. A battle is strictly one-on-one.
pub const ROSTER_CAPACITY: usize = 2;

/// The seven tetromino piece kinds
///
/// Each piece has a distinct shape and color:
/// - **I**: Cyan, horizontal bar
/// - **O**: Yellow, 2x2 square
/// - **T**: Magenta, T-shaped
/// - **S**: Green, S-shaped
/// - **Z**: Red, Z-shaped (mirror of S)
/// - **J**: Blue, J-shaped
/// - **L**: Orange, L-shaped (mirror of J)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    /// All kinds in cell-code order.
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    /// Parse piece kind from string (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use tetris_battle_types::PieceKind;
    ///
    /// assert_eq!(PieceKind::from_str("i"), Some(PieceKind::I));
    /// assert_eq!(PieceKind::from_str("O"), Some(PieceKind::O));
    /// assert_eq!(PieceKind::from_str("unknown"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i" => Some(PieceKind::I),
            "o" => Some(PieceKind::O),
            "t" => Some(PieceKind::T),
            "s" => Some(PieceKind::S),
            "z" => Some(PieceKind::Z),
            "j" => Some(PieceKind::J),
            "l" => Some(PieceKind::L),
            _ => None,
        }
    }

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PieceKind::I => "I",
            PieceKind::O => "O",
            PieceKind::T => "T",
            PieceKind::S => "S",
            PieceKind::Z => "Z",
            PieceKind::J => "J",
            PieceKind::L => "L",
        }
    }

    /// Non-zero cell code for a cell filled by this kind.
    pub fn code(&self) -> u8 {
        match self {
            PieceKind::I => 1,
            PieceKind::O => 2,
            PieceKind::T => 3,
            PieceKind::S => 4,
            PieceKind::Z => 5,
            PieceKind::J => 6,
            PieceKind::L => 7,
        }
    }

    /// Inverse of [`PieceKind::code`]. Returns `None` for 0 and for codes > 7.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1..=7 => Some(Self::ALL[(code - 1) as usize]),
            _ => None,
        }
    }
}

/// A cell on the game board
///
/// - `None`: Empty cell
/// - `Some(PieceKind)`: Cell filled with the specified piece kind
pub type Cell = Option<PieceKind>;

/// Game actions a player can apply to their local simulation
///
/// The battle layer never interprets these; it only forwards them from the
/// input collaborator to the local simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    /// Move piece one cell left
    MoveLeft,
    /// Move piece one cell right
    MoveRight,
    /// Drop piece one cell down
    SoftDrop,
    /// Instantly drop piece to lowest valid position
    HardDrop,
    /// Rotate piece 90° clockwise
    RotateCw,
    /// Swap the active piece with the held piece (once per piece)
    Hold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_codes_cover_every_kind() {
        for kind in PieceKind::ALL {
            assert_eq!(PieceKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(PieceKind::from_code(0), None);
        assert_eq!(PieceKind::from_code(8), None);
    }

    #[test]
    fn wire_names_parse_back() {
        for kind in PieceKind::ALL {
            assert_eq!(PieceKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn read_timeout_outlives_heartbeat() {
        assert!(READ_TIMEOUT_MS > HEARTBEAT_INTERVAL_MS);
        assert!(DEFAULT_MAX_FRAME_LEN >= 1_000_000);
    }
}
