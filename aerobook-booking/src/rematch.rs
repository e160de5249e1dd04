use aerobook_core::search::CandidateItinerary;
use aerobook_core::{BookingError, LegDescriptor};

const BASE_SCORE: i64 = 100;
const SEGMENT_MATCH_BONUS: i64 = 50;
const SEGMENT_MISMATCH_PENALTY: i64 = 10;
const CARRIER_BONUS: i64 = 20;
const FLIGHT_NUMBER_BONUS: i64 = 10;
const TIME_WINDOW_MINUTES: i64 = 60;
const NEAR_TIME_BONUS: i64 = 5;
const FAR_TIME_PENALTY: i64 = 5;

/// Best candidate found for a stale leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rematch {
    pub candidate: CandidateItinerary,
    pub score: i64,
    /// Position in the search results.
    pub position: usize,
}

/// Finds, in a fresh search, the itinerary that best corresponds to a leg
/// whose session expired. Offer ids change between searches, so this scores
/// route, shape, carrier and time instead of looking anything up by key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlightRematcher;

impl FlightRematcher {
    pub fn new() -> Self {
        Self
    }

    /// Score of `candidate` against `stale`, or `None` when route or date differ.
    pub fn score(&self, stale: &LegDescriptor, candidate: &CandidateItinerary) -> Option<i64> {
        let first = candidate.first_segment()?;
        if candidate.origin() != Some(stale.origin.as_str())
            || candidate.destination() != Some(stale.destination.as_str())
            || first.departure_time.date() != stale.departure_date()
        {
            return None;
        }

        let mut score = BASE_SCORE;

        let segment_delta = (candidate.segments.len() as i64 - stale.segment_count as i64).abs();
        if segment_delta == 0 {
            score += SEGMENT_MATCH_BONUS;
        } else {
            score -= SEGMENT_MISMATCH_PENALTY * segment_delta;
        }

        if first.carrier_code == stale.carrier_code {
            score += CARRIER_BONUS;
            if first.flight_number == stale.flight_number {
                score += FLIGHT_NUMBER_BONUS;
            }
        }

        let minutes = (first.departure_time - stale.departure_time).num_minutes().abs();
        if minutes <= TIME_WINDOW_MINUTES {
            score += NEAR_TIME_BONUS - minutes / 10;
        } else {
            score -= FAR_TIME_PENALTY;
        }

        Some(score)
    }

    /// Highest scoring candidate; ties go to the earlier search result.
    pub fn rematch(
        &self,
        stale: &LegDescriptor,
        leg_index: usize,
        candidates: &[CandidateItinerary],
    ) -> Result<Rematch, BookingError> {
        let mut best: Option<(usize, i64)> = None;

        for (position, candidate) in candidates.iter().enumerate() {
            let Some(score) = self.score(stale, candidate) else {
                continue;
            };
            tracing::trace!(position, score, handle = %candidate.offer_handle, "Scored rematch candidate");
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((position, score));
            }
        }

        let (position, score) = best.ok_or_else(|| BookingError::NoMatchFound {
            leg_index,
            route: stale.route(),
        })?;

        Ok(Rematch {
            candidate: candidates[position].clone(),
            score,
            position,
        })
    }
}
