// ── Discovery sequencer ──
//
// No single query returns the full topology, so discovery walks a fixed
// list of categories, one query in flight at a time, merging each answer
// into an accumulator. A sequencer is bound to one connection generation;
// replies from an older connection or for a query we no longer wait on
// are reported as stale and never touch the accumulator.

use icbridge_api::Request;
use serde_json::Value;

use crate::merge::merge;

/// Hardware-definition categories, in query order.
pub const DISCOVERY_CATEGORIES: [&str; 7] = [
    "CIRCUITS", "PUMPS", "CHEMS", "VALVES", "HEATERS", "SENSORS", "GROUPS",
];

/// What to do after a reply has been accepted.
#[derive(Debug)]
pub enum DiscoveryStep {
    /// Send this query next.
    Next(Request),
    /// All categories merged; here is the composite tree.
    Complete(Value),
    /// Reply belongs to another connection or query; ignored.
    Stale,
}

/// Progress of one discovery run.
#[derive(Debug)]
pub struct Discovery {
    generation: u64,
    /// Index of the category whose reply we are waiting for.
    index: usize,
    pending_message_id: Option<String>,
    accumulator: Option<Value>,
}

impl Discovery {
    /// Begin discovery for `generation`; returns the first query to send.
    pub fn start(generation: u64) -> (Self, Request) {
        let request = Request::hardware_definition(DISCOVERY_CATEGORIES[0]);
        let discovery = Self {
            generation,
            index: 0,
            pending_message_id: Some(request.message_id.clone()),
            accumulator: None,
        };
        (discovery, request)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Category currently awaited, if discovery has not finished.
    pub fn current_category(&self) -> Option<&'static str> {
        DISCOVERY_CATEGORIES.get(self.index).copied()
    }

    /// Merge a reply. Replies without a `messageID` are matched to the
    /// outstanding query by order alone.
    pub fn accept(&mut self, generation: u64, message_id: Option<&str>, answer: Value) -> DiscoveryStep {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "discarding discovery reply from previous connection"
            );
            return DiscoveryStep::Stale;
        }
        let Some(expected) = self.pending_message_id.as_deref() else {
            return DiscoveryStep::Stale;
        };
        if message_id.is_some_and(|id| id != expected) {
            tracing::debug!(?message_id, expected, "discarding unexpected discovery reply");
            return DiscoveryStep::Stale;
        }

        match self.accumulator.as_mut() {
            Some(acc) => merge(acc, answer),
            None => self.accumulator = Some(answer),
        }
        self.index += 1;

        tracing::debug!(
            merged = self.index,
            total = DISCOVERY_CATEGORIES.len(),
            "merged discovery reply"
        );

        match DISCOVERY_CATEGORIES.get(self.index) {
            Some(category) => {
                let request = Request::hardware_definition(category);
                self.pending_message_id = Some(request.message_id.clone());
                DiscoveryStep::Next(request)
            }
            None => {
                self.pending_message_id = None;
                DiscoveryStep::Complete(self.accumulator.take().unwrap_or(Value::Array(Vec::new())))
            }
        }
    }
}
