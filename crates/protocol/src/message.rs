//! Envelope schema - versioned JSON messages carried inside frames
//!
//! Every payload is a single JSON object with a protocol version `v` and a
//! `type` tag. Control signals and state snapshots share one channel but are
//! told apart by the tag, never by guessing at the value's shape.

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::types::{
    Cell, PieceKind, BOARD_HEIGHT, BOARD_WIDTH, MAX_GRID_COLS, MAX_GRID_ROWS, MAX_NEXT_PIECES,
};

/// Current envelope version. Peers reject anything else.
pub const PROTOCOL_VERSION: u16 = 1;

// ============== Control ==============

/// Session lifecycle signals sent by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    /// Only one player is connected; resent periodically until a second joins.
    Waiting,
    /// Both players are present; sent once per pairing.
    Started,
    /// The roster already holds two players; the connection is closed next.
    RosterFull,
    /// Keepalive while relaying.
    Heartbeat,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::Waiting => "WAITING",
            ControlSignal::Started => "STARTED",
            ControlSignal::RosterFull => "ROSTER_FULL",
            ControlSignal::Heartbeat => "HEARTBEAT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("waiting") {
            Some(Self::Waiting)
        } else if s.eq_ignore_ascii_case("started") {
            Some(Self::Started)
        } else if s.eq_ignore_ascii_case("roster_full") {
            Some(Self::RosterFull)
        } else if s.eq_ignore_ascii_case("heartbeat") {
            Some(Self::Heartbeat)
        } else {
            None
        }
    }
}

impl Serialize for ControlSignal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ControlSignal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).ok_or_else(|| serde::de::Error::custom("unknown control signal"))
    }
}

// ============== Pieces ==============

/// Wire form of a piece kind: upper-case letter, parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceId {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl From<PieceKind> for PieceId {
    fn from(value: PieceKind) -> Self {
        match value {
            PieceKind::I => Self::I,
            PieceKind::O => Self::O,
            PieceKind::T => Self::T,
            PieceKind::S => Self::S,
            PieceKind::Z => Self::Z,
            PieceKind::J => Self::J,
            PieceKind::L => Self::L,
        }
    }
}

impl From<PieceId> for PieceKind {
    fn from(value: PieceId) -> Self {
        match value {
            PieceId::I => PieceKind::I,
            PieceId::O => PieceKind::O,
            PieceId::T => PieceKind::T,
            PieceId::S => PieceKind::S,
            PieceId::Z => PieceKind::Z,
            PieceId::J => PieceKind::J,
            PieceId::L => PieceKind::L,
        }
    }
}

impl Serialize for PieceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(PieceKind::from(*self).as_str())
    }
}

impl<'de> Deserialize<'de> for PieceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PieceKind::from_str(&s)
            .map(PieceId::from)
            .ok_or_else(|| serde::de::Error::custom("invalid piece id"))
    }
}

/// Upcoming pieces, bounded at decode time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextQueue(pub ArrayVec<PieceId, MAX_NEXT_PIECES>);

impl NextQueue {
    /// Build from kinds, keeping at most `MAX_NEXT_PIECES`.
    pub fn from_kinds<I: IntoIterator<Item = PieceKind>>(kinds: I) -> Self {
        Self(
            kinds
                .into_iter()
                .take(MAX_NEXT_PIECES)
                .map(PieceId::from)
                .collect(),
        )
    }

    pub fn kinds(&self) -> impl Iterator<Item = PieceKind> + '_ {
        self.0.iter().copied().map(PieceKind::from)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for NextQueue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for piece in &self.0 {
            seq.serialize_element(piece)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for NextQueue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;
        impl<'de> serde::de::Visitor<'de> for V {
            type Value = NextQueue;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "an array of at most {} piece ids", MAX_NEXT_PIECES)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut out = ArrayVec::<PieceId, MAX_NEXT_PIECES>::new();
                while let Some(p) = seq.next_element::<PieceId>()? {
                    out.try_push(p)
                        .map_err(|_| serde::de::Error::custom("too many next pieces"))?;
                }
                Ok(NextQueue(out))
            }
        }

        deserializer.deserialize_seq(V)
    }
}

// ============== State ==============

/// Rows of cell codes: 0 = empty, 1-7 = piece kind (see [`PieceKind::code`]).
pub type Grid = Vec<Vec<u8>>;

/// One player's observable state, as mirrored on the opponent's screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub grid: Grid,
    pub score: u32,
    pub level: u32,
    pub next: NextQueue,
    pub held: Option<PieceId>,
}

/// Structural problems found in a decoded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("grid has no rows")]
    EmptyGrid,
    #[error("grid has {0} rows (max {max})", max = MAX_GRID_ROWS)]
    TooManyRows(usize),
    #[error("row {row} has width {width} (expected 1..={max})", max = MAX_GRID_COLS)]
    RowWidth { row: usize, width: usize },
    #[error("row {row} has width {width}, row 0 has {expected}")]
    Ragged {
        row: usize,
        width: usize,
        expected: usize,
    },
    #[error("cell ({row}, {col}) has invalid code {code}")]
    CellCode { row: usize, col: usize, code: u8 },
}

impl StateSnapshot {
    /// All-empty board of the given size, score 0, level 1.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            grid: vec![vec![0u8; cols]; rows],
            score: 0,
            level: 1,
            next: NextQueue::default(),
            held: None,
        }
    }

    /// Empty standard 20x10 board.
    pub fn standard() -> Self {
        Self::empty(BOARD_HEIGHT as usize, BOARD_WIDTH as usize)
    }

    pub fn height(&self) -> usize {
        self.grid.len()
    }

    pub fn width(&self) -> usize {
        self.grid.first().map(Vec::len).unwrap_or(0)
    }

    /// Cell at column `x`, row `y`. Out of range reads as empty.
    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.grid
            .get(y)
            .and_then(|row| row.get(x))
            .and_then(|&code| PieceKind::from_code(code))
    }

    /// Set a cell; returns false when out of range.
    pub fn set_cell(&mut self, x: usize, y: usize, cell: Cell) -> bool {
        match self.grid.get_mut(y).and_then(|row| row.get_mut(x)) {
            Some(slot) => {
                *slot = cell.map(|k| k.code()).unwrap_or(0);
                true
            }
            None => false,
        }
    }

    pub fn held_kind(&self) -> Option<PieceKind> {
        self.held.map(PieceKind::from)
    }

    /// Check the shape bounds a peer is allowed to send.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.grid.is_empty() {
            return Err(SnapshotError::EmptyGrid);
        }
        if self.grid.len() > MAX_GRID_ROWS {
            return Err(SnapshotError::TooManyRows(self.grid.len()));
        }
        let expected = self.grid[0].len();
        for (row, cells) in self.grid.iter().enumerate() {
            let width = cells.len();
            if width == 0 || width > MAX_GRID_COLS {
                return Err(SnapshotError::RowWidth { row, width });
            }
            if width != expected {
                return Err(SnapshotError::Ragged {
                    row,
                    width,
                    expected,
                });
            }
            if let Some((col, &code)) = cells.iter().enumerate().find(|&(_, &c)| c > 7) {
                return Err(SnapshotError::CellCode { row, col, code });
            }
        }
        Ok(())
    }
}

// ============== Envelope ==============

/// Everything that travels inside a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "control")]
    Control { signal: ControlSignal },
    #[serde(rename = "state")]
    State(StateSnapshot),
}

impl Envelope {
    pub fn control(signal: ControlSignal) -> Self {
        Envelope::Control { signal }
    }
}

/// Reasons a complete payload cannot become an [`Envelope`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported protocol version {0:?} (expected {expected})", expected = PROTOCOL_VERSION)]
    Version(Option<u16>),
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Serialize an envelope with the current protocol version.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    #[derive(Serialize)]
    struct Versioned<'a> {
        v: u16,
        #[serde(flatten)]
        body: &'a Envelope,
    }

    serde_json::to_vec(&Versioned {
        v: PROTOCOL_VERSION,
        body: envelope,
    })
}

/// Parse and validate an envelope received from an untrusted peer.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    // Version first, so a future schema fails with a clear error rather than
    // a confusing field mismatch.
    #[derive(Debug, Deserialize)]
    struct VersionOnly {
        v: Option<u16>,
    }

    let version = serde_json::from_slice::<VersionOnly>(bytes)?.v;
    if version != Some(PROTOCOL_VERSION) {
        return Err(DecodeError::Version(version));
    }

    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if let Envelope::State(snapshot) = &envelope {
        snapshot.validate()?;
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_snapshot() -> StateSnapshot {
        let mut s = StateSnapshot::standard();
        s.next = NextQueue::from_kinds([PieceKind::I, PieceKind::O, PieceKind::T]);
        s
    }

    #[test]
    fn test_control_wire_shape() {
        let bytes = encode_envelope(&Envelope::control(ControlSignal::Waiting)).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["v"], 1);
        assert_eq!(v["type"], "control");
        assert_eq!(v["signal"], "WAITING");
    }

    #[test]
    fn test_state_wire_shape() {
        let bytes = encode_envelope(&Envelope::State(scenario_snapshot())).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["type"], "state");
        assert_eq!(v["score"], 0);
        assert_eq!(v["level"], 1);
        assert_eq!(v["next"], serde_json::json!(["I", "O", "T"]));
        assert!(v["held"].is_null());
        assert_eq!(v["grid"].as_array().unwrap().len(), 20);
        assert_eq!(v["grid"][0].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_decode_state_preserves_fields() {
        let mut snap = scenario_snapshot();
        snap.score = 1200;
        snap.level = 3;
        snap.held = Some(PieceId::L);
        snap.set_cell(4, 19, Some(PieceKind::Z));

        let bytes = encode_envelope(&Envelope::State(snap.clone())).unwrap();
        match decode_envelope(&bytes).unwrap() {
            Envelope::State(decoded) => {
                assert_eq!(decoded, snap);
                assert_eq!(decoded.cell(4, 19), Some(PieceKind::Z));
                assert_eq!(decoded.held_kind(), Some(PieceKind::L));
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_accepts_lowercase_names() {
        let json = r#"{"v":1,"type":"control","signal":"started"}"#;
        assert_eq!(
            decode_envelope(json.as_bytes()).unwrap(),
            Envelope::control(ControlSignal::Started)
        );

        let json = r#"{"v":1,"type":"state","grid":[[0,1]],"score":5,"level":2,"next":["t","S"],"held":"o"}"#;
        match decode_envelope(json.as_bytes()).unwrap() {
            Envelope::State(s) => {
                assert_eq!(s.next.0.as_slice(), &[PieceId::T, PieceId::S]);
                assert_eq!(s.held, Some(PieceId::O));
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_missing_or_wrong_version() {
        let json = r#"{"type":"control","signal":"WAITING"}"#;
        assert!(matches!(
            decode_envelope(json.as_bytes()),
            Err(DecodeError::Version(None))
        ));

        let json = r#"{"v":2,"type":"control","signal":"WAITING"}"#;
        assert!(matches!(
            decode_envelope(json.as_bytes()),
            Err(DecodeError::Version(Some(2)))
        ));
    }

    #[test]
    fn test_decode_rejects_untagged_values() {
        // A bare string is what an untyped sender would produce for a control message.
        assert!(matches!(
            decode_envelope(br#""WAITING""#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_envelope(br#"{"v":1,"type":"attack","lines":4}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(decode_envelope(b"").is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_next_queue() {
        let json = r#"{"v":1,"type":"state","grid":[[0]],"score":0,"level":1,"next":["I","I","I","I","I","I","I","I","I"],"held":null}"#;
        assert!(matches!(
            decode_envelope(json.as_bytes()),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_validate_grid_bounds() {
        assert_eq!(
            StateSnapshot::empty(0, 10).validate(),
            Err(SnapshotError::EmptyGrid)
        );
        assert_eq!(
            StateSnapshot::empty(MAX_GRID_ROWS + 1, 10).validate(),
            Err(SnapshotError::TooManyRows(MAX_GRID_ROWS + 1))
        );
        assert_eq!(
            StateSnapshot::empty(20, MAX_GRID_COLS + 1).validate(),
            Err(SnapshotError::RowWidth {
                row: 0,
                width: MAX_GRID_COLS + 1
            })
        );

        let mut ragged = StateSnapshot::standard();
        ragged.grid[3].push(0);
        assert_eq!(
            ragged.validate(),
            Err(SnapshotError::Ragged {
                row: 3,
                width: 11,
                expected: 10
            })
        );

        let mut bad_code = StateSnapshot::standard();
        bad_code.grid[2][5] = 9;
        assert_eq!(
            bad_code.validate(),
            Err(SnapshotError::CellCode {
                row: 2,
                col: 5,
                code: 9
            })
        );

        // Older boards carried three extra "danger" rows.
        assert!(StateSnapshot::empty(23, 10).validate().is_ok());
    }

    #[test]
    fn test_decode_rejects_invalid_grid() {
        let json = r#"{"v":1,"type":"state","grid":[[0,0],[0]],"score":0,"level":1,"next":[],"held":null}"#;
        assert!(matches!(
            decode_envelope(json.as_bytes()),
            Err(DecodeError::Snapshot(SnapshotError::Ragged { .. }))
        ));
    }

    #[test]
    fn test_cell_accessors() {
        let mut s = StateSnapshot::standard();
        assert_eq!(s.cell(0, 0), None);
        assert!(s.set_cell(9, 19, Some(PieceKind::I)));
        assert_eq!(s.cell(9, 19), Some(PieceKind::I));
        assert!(!s.set_cell(10, 0, Some(PieceKind::I)));
        assert_eq!(s.cell(10, 0), None);
        assert_eq!((s.width(), s.height()), (10, 20));
    }
}
