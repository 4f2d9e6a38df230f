use super::detector::{Decision, SourceState};
use spotbot_common::{SourceKind, Spot, format_spot};
use spotbot_frontend::{DeliveryOutcome, DeliverySender};

/// Callsign fragments worth announcing
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    tokens: Vec<String>,
}

impl Watchlist {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .flat_map(|t| {
                t.as_ref()
                    .split_whitespace()
                    .map(str::to_uppercase)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Case-insensitive substring match against any token
    pub fn matches(&self, operator_id: &str) -> bool {
        let operator = operator_id.to_uppercase();
        self.tokens.iter().any(|t| operator.contains(t.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackReport {
    /// Spots on the watchlist
    pub watched: usize,
    pub emitted: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl TrackReport {
    pub fn merge(&mut self, other: TrackReport) {
        self.watched += other.watched;
        self.emitted += other.emitted;
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Change detection and delivery for the spots of one source
pub struct SpotTracker {
    kind: SourceKind,
    watchlist: Watchlist,
    state: SourceState,
}

impl SpotTracker {
    pub fn new(kind: SourceKind, watchlist: Watchlist) -> Self {
        Self {
            kind,
            watchlist,
            state: SourceState::new(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// An empty watchlist means there is nothing to track
    pub fn is_active(&self) -> bool {
        !self.watchlist.is_empty()
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    /// Run detection over a snapshot in order and deliver every emitted spot.
    /// State is updated before delivery, so a failed delivery is not retried
    /// by later snapshots.
    pub async fn process(&mut self, spots: &[Spot], sender: &DeliverySender) -> TrackReport {
        let mut report = TrackReport::default();

        for spot in spots.iter().filter(|s| self.watchlist.matches(&s.operator_id)) {
            report.watched += 1;

            let reason = match self.state.observe(spot) {
                Decision::Suppress => continue,
                Decision::Emit(reason) => reason,
            };
            report.emitted += 1;
            tracing::info!(
                "{}: announcing {} at {} ({})",
                self.kind.label(),
                spot.operator_id,
                spot.location_ref,
                reason
            );

            match sender.deliver(&format_spot(spot)).await {
                DeliveryOutcome::Delivered { .. } => report.delivered += 1,
                DeliveryOutcome::Failed { error, .. } => {
                    tracing::warn!(
                        "{}: spot for {} was not delivered: {}",
                        self.kind.label(),
                        spot.operator_id,
                        error
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}
