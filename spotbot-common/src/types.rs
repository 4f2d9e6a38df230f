/// Activity program a spot was reported for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ParkActivation,
    SummitActivation,
    BunkerActivation,
    LighthouseOrLightship,
    BeachAnnouncement,
}

impl SourceKind {
    /// Human readable program name used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::ParkActivation => "POTA",
            SourceKind::SummitActivation => "SOTA",
            SourceKind::BunkerActivation => "WWBOTA",
            SourceKind::LighthouseOrLightship => "LLOTA",
            SourceKind::BeachAnnouncement => "BOTA",
        }
    }
}

/// Posting time split into its date and time-of-day parts, e.g.
/// ("2024-05-01", "14:30:00")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotTime {
    pub date: String,
    pub time: String,
}

impl SpotTime {
    pub fn unknown() -> Self {
        Self {
            date: "??".to_string(),
            time: "??".to_string(),
        }
    }
}

/// Split a provider timestamp into date and time-of-day.
///
/// Accepts `T` or a single space as separator, drops fractional seconds and a
/// trailing `Z`. Anything else comes back as `(raw, "??")`.
pub fn parse_timestamp(raw: &str) -> SpotTime {
    let raw = raw.trim();
    let separator = if raw.contains('T') {
        Some('T')
    } else if raw.contains(' ') {
        Some(' ')
    } else {
        None
    };

    if let Some((date, rest)) = separator.and_then(|sep| raw.split_once(sep)) {
        let time = rest.split('.').next().unwrap_or_default().trim_end_matches('Z');
        if !date.is_empty() && !time.is_empty() {
            return SpotTime {
                date: date.to_string(),
                time: time.to_string(),
            };
        }
    }

    SpotTime {
        date: raw.to_string(),
        time: "??".to_string(),
    }
}

/// Source-specific text that only ever ends up in the notification body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayFields {
    /// Operator's own name (SOTA)
    pub operator_name: Option<String>,
    /// Park / summit / lighthouse name
    pub location_name: Option<String>,
    /// Region or country description
    pub region: Option<String>,
    /// Free comment shown instead of `comment` when present (WWBOTA)
    pub note: Option<String>,
}

/// A normalized activation report, uniform across providers
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    pub source: SourceKind,
    /// Callsign of the activating station
    pub operator_id: String,
    /// Reference code of the activated location
    pub location_ref: String,
    pub frequency_khz: f64,
    pub mode: String,
    pub comment: String,
    pub posted_at: Option<SpotTime>,
    /// Locality code the per-source filter matches against
    /// (grid square, association, country, ...)
    pub locality: Option<String>,
    pub display: DisplayFields,
}

impl Spot {
    pub fn new(
        source: SourceKind,
        operator_id: impl Into<String>,
        location_ref: impl Into<String>,
        frequency_khz: f64,
    ) -> Self {
        Self {
            source,
            operator_id: operator_id.into().trim().to_string(),
            location_ref: location_ref.into().trim().to_string(),
            frequency_khz,
            mode: String::new(),
            comment: String::new(),
            posted_at: None,
            locality: None,
            display: DisplayFields::default(),
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_posted_at(mut self, posted_at: Option<SpotTime>) -> Self {
        self.posted_at = posted_at;
        self
    }

    pub fn with_locality(mut self, locality: Option<String>) -> Self {
        self.locality = locality.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_display(mut self, display: DisplayFields) -> Self {
        self.display = display;
        self
    }

    /// Operator and location are mandatory and the frequency, when unknown,
    /// is zero rather than a non-finite value
    pub fn is_valid(&self) -> bool {
        !self.operator_id.is_empty()
            && !self.location_ref.is_empty()
            && self.frequency_khz.is_finite()
    }

    /// Case-insensitive identity used as the dedup key
    pub fn operator_key(&self) -> String {
        self.operator_id.to_uppercase()
    }

    /// Keep only spots that satisfy the operator / location invariant
    pub fn validated(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }
}
