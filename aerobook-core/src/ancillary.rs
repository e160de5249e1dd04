use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::itinerary::LegKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AncillaryKind {
    Meal,
    Baggage,
    Seat,
}

/// A special-service request (SSR) picked for one passenger on one leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncillarySelection {
    pub kind: AncillaryKind,
    pub code: String,
    pub description: Option<String>,
    /// Price delta in minor units.
    pub price: i64,
}

/// Wire form of one selection together with where it applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncillaryEntry {
    pub leg: LegKey,
    pub passenger_index: usize,
    pub selection: AncillarySelection,
}

type SlotKey = (LegKey, usize, AncillaryKind);

/// All ancillary selections of a booking, one slot per (leg, passenger, kind).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AncillaryEntry>", into = "Vec<AncillaryEntry>")]
pub struct AncillarySelections {
    slots: BTreeMap<SlotKey, AncillarySelection>,
}

impl AncillarySelections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one selection. A newer selection for the same leg, passenger and
    /// kind replaces the older one; every other slot is left as is.
    pub fn merge(&mut self, entry: AncillaryEntry) -> Option<AncillarySelection> {
        let key = (entry.leg, entry.passenger_index, entry.selection.kind);
        self.slots.insert(key, entry.selection)
    }

    pub fn merge_all(&mut self, entries: impl IntoIterator<Item = AncillaryEntry>) {
        for entry in entries {
            self.merge(entry);
        }
    }

    pub fn for_passenger(&self, leg: LegKey, passenger_index: usize) -> Vec<AncillarySelection> {
        self.slots
            .iter()
            .filter(|((l, p, _), _)| *l == leg && *p == passenger_index)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn has_meal(&self, leg: LegKey) -> bool {
        self.slots
            .keys()
            .any(|(l, _, kind)| *l == leg && *kind == AncillaryKind::Meal)
    }

    pub fn total_for(&self, leg: LegKey) -> i64 {
        self.slots
            .iter()
            .filter(|((l, _, _), _)| *l == leg)
            .map(|(_, s)| s.price)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<Vec<AncillaryEntry>> for AncillarySelections {
    fn from(entries: Vec<AncillaryEntry>) -> Self {
        let mut selections = Self::new();
        selections.merge_all(entries);
        selections
    }
}

impl From<AncillarySelections> for Vec<AncillaryEntry> {
    fn from(selections: AncillarySelections) -> Self {
        selections
            .slots
            .into_iter()
            .map(|((leg, passenger_index, _), selection)| AncillaryEntry {
                leg,
                passenger_index,
                selection,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(leg: LegKey, pax: usize, kind: AncillaryKind, code: &str, price: i64) -> AncillaryEntry {
        AncillaryEntry {
            leg,
            passenger_index: pax,
            selection: AncillarySelection {
                kind,
                code: code.to_string(),
                description: None,
                price,
            },
        }
    }

    #[test]
    fn test_latest_selection_wins_per_slot() {
        let mut selections = AncillarySelections::new();
        selections.merge(entry(LegKey::Outbound, 0, AncillaryKind::Meal, "VGML", 250));
        let replaced = selections.merge(entry(LegKey::Outbound, 0, AncillaryKind::Meal, "NVML", 300));

        assert_eq!(replaced.map(|s| s.code), Some("VGML".to_string()));
        let meals = selections.for_passenger(LegKey::Outbound, 0);
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].code, "NVML");
    }

    #[test]
    fn test_other_slots_untouched() {
        let mut selections = AncillarySelections::new();
        selections.merge_all(vec![
            entry(LegKey::Outbound, 0, AncillaryKind::Meal, "VGML", 250),
            entry(LegKey::Outbound, 0, AncillaryKind::Baggage, "XBAG15", 1500),
            entry(LegKey::Return, 0, AncillaryKind::Meal, "AVML", 200),
        ]);

        assert_eq!(selections.len(), 3);
        assert!(selections.has_meal(LegKey::Outbound));
        assert!(selections.has_meal(LegKey::Return));
        assert!(!selections.has_meal(LegKey::OneWay));
        assert_eq!(selections.total_for(LegKey::Outbound), 1750);
    }

    #[test]
    fn test_json_shape_is_entry_list() {
        let mut selections = AncillarySelections::new();
        selections.merge(entry(LegKey::City(1), 0, AncillaryKind::Seat, "12A", 400));

        let json = serde_json::to_value(&selections).unwrap();
        assert_eq!(json[0]["leg"]["tag"], "CITY");
        assert_eq!(json[0]["leg"]["index"], 1);

        let back: AncillarySelections = serde_json::from_value(json).unwrap();
        assert_eq!(back, selections);
    }
}
