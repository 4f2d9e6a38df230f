///! Per-source change detection
///!
///! Decides whether a spot is news compared to what was last announced for
///! the same operator. Rules, first match wins:
///! 1. operator never seen
///! 2. location changed
///! 3. frequency moved by at least 999 Hz
///! 4. comment carries a status Q-code the stored comment did not
///!
///! Anything else is suppressed and leaves the state untouched.

use spotbot_common::Spot;
use std::collections::HashMap;
use std::fmt;

/// Smallest frequency move, in Hz, that counts as a new channel
pub const FREQUENCY_THRESHOLD_HZ: u64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QCode {
    /// Going off air
    Qrt,
    /// Ready to receive
    Qrv,
    /// Changing frequency
    Qsy,
}

impl QCode {
    pub const ALL: [QCode; 3] = [QCode::Qrt, QCode::Qrv, QCode::Qsy];

    pub fn as_str(&self) -> &'static str {
        match self {
            QCode::Qrt => "QRT",
            QCode::Qrv => "QRV",
            QCode::Qsy => "QSY",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            QCode::Qrt => 0b001,
            QCode::Qrv => 0b010,
            QCode::Qsy => 0b100,
        }
    }
}

/// Set of status Q-codes found in a comment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommentFlags(u8);

impl CommentFlags {
    pub fn from_comment(comment: &str) -> Self {
        let upper = comment.to_uppercase();
        QCode::ALL
            .iter()
            .filter(|code| upper.contains(code.as_str()))
            .fold(Self::default(), |flags, code| flags.with(*code))
    }

    pub fn with(self, code: QCode) -> Self {
        Self(self.0 | code.bit())
    }

    pub fn contains(&self, code: QCode) -> bool {
        self.0 & code.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when `self` holds a code that `previous` lacks
    pub fn gained_since(&self, previous: CommentFlags) -> bool {
        self.0 & !previous.0 != 0
    }
}

impl fmt::Display for CommentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<_> = QCode::ALL
            .iter()
            .filter(|code| self.contains(**code))
            .map(QCode::as_str)
            .collect();
        write!(f, "{{{}}}", codes.join(", "))
    }
}

/// What was last announced for an operator
#[derive(Debug, Clone, PartialEq)]
pub struct LastSeen {
    pub location_ref: String,
    pub frequency_khz: f64,
    pub comment_flags: CommentFlags,
}

impl LastSeen {
    fn from_spot(spot: &Spot) -> Self {
        Self {
            location_ref: spot.location_ref.clone(),
            frequency_khz: spot.frequency_khz,
            comment_flags: CommentFlags::from_comment(&spot.comment),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitReason {
    FirstSight,
    LocationChanged,
    FrequencyChanged,
    StatusChanged,
}

impl fmt::Display for EmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EmitReason::FirstSight => "first sight",
            EmitReason::LocationChanged => "location changed",
            EmitReason::FrequencyChanged => "frequency changed",
            EmitReason::StatusChanged => "status changed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Emit(EmitReason),
    Suppress,
}

/// Saturates at the `i64` range
fn to_hz(khz: f64) -> i64 {
    (khz * 1000.0).round() as i64
}

fn hz_apart(a: f64, b: f64) -> u64 {
    to_hz(a).saturating_sub(to_hz(b)).unsigned_abs()
}

/// Compare a spot against the stored record for its operator
pub fn decide(previous: Option<&LastSeen>, spot: &Spot) -> Decision {
    let Some(previous) = previous else {
        return Decision::Emit(EmitReason::FirstSight);
    };

    if previous.location_ref != spot.location_ref {
        return Decision::Emit(EmitReason::LocationChanged);
    }

    if hz_apart(spot.frequency_khz, previous.frequency_khz) >= FREQUENCY_THRESHOLD_HZ {
        return Decision::Emit(EmitReason::FrequencyChanged);
    }

    if CommentFlags::from_comment(&spot.comment).gained_since(previous.comment_flags) {
        return Decision::Emit(EmitReason::StatusChanged);
    }

    Decision::Suppress
}

/// Last announced record per operator, for one source
#[derive(Debug, Default)]
pub struct SourceState {
    entries: HashMap<String, LastSeen>,
}

impl SourceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, operator_id: &str) -> Option<&LastSeen> {
        self.entries.get(&operator_id.to_uppercase())
    }

    /// Decide on `spot` and, when it is emitted, overwrite the operator's record
    pub fn observe(&mut self, spot: &Spot) -> Decision {
        let key = spot.operator_key();
        let decision = decide(self.entries.get(&key), spot);
        if let Decision::Emit(_) = decision {
            self.entries.insert(key, LastSeen::from_spot(spot));
        }
        decision
    }
}
