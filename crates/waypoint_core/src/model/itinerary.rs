//! Trip, day and itinerary item domain model.
//!
//! # Responsibility
//! - Define the closed struct model for trips, days and placed items.
//! - Validate construction once so downstream code can trust the shape.
//!
//! # Invariants
//! - Items inside one day are ordered by strictly increasing `sequence`.
//! - `item.day_id` always names the day whose list holds the item.
//! - `duration_minutes`, when set, lies in `1..=1440`.

use crate::model::place::PlaceId;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable trip identifier.
pub type TripId = Uuid;
/// Stable itinerary day identifier.
pub type DayId = Uuid;
/// Stable itinerary item identifier.
pub type ItemId = Uuid;

/// Upper bound for one stay or transport leg, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Transport mode from one item to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Walk,
    Subway,
    Taxi,
    Drive,
    Bus,
}

impl TransportMode {
    /// Stable storage string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Subway => "subway",
            Self::Taxi => "taxi",
            Self::Drive => "drive",
            Self::Bus => "bus",
        }
    }

    /// Parses one storage string. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "walk" => Some(Self::Walk),
            "subway" => Some(Self::Subway),
            "taxi" => Some(Self::Taxi),
            "drive" => Some(Self::Drive),
            "bus" => Some(Self::Bus),
            _ => None,
        }
    }
}

/// Validation failures for trip/day/item shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelValidationError {
    /// Sequence key is NaN or infinite.
    NonFiniteSequence { item_id: ItemId },
    /// Two neighbors in one day are not strictly increasing.
    SequenceOutOfOrder {
        day_id: DayId,
        previous: f64,
        next: f64,
    },
    /// Item sits in a day list other than its `day_id`.
    DayMismatch {
        item_id: ItemId,
        expected: DayId,
        actual: DayId,
    },
    /// Same item id appears more than once.
    DuplicateItem(ItemId),
    /// Same day id appears more than once.
    DuplicateDay(DayId),
    /// Day belongs to a different trip.
    TripMismatch { day_id: DayId, trip_id: TripId },
    /// Duration is zero or above one day.
    InvalidDuration { field: &'static str, minutes: u32 },
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteSequence { item_id } => {
                write!(f, "item {item_id} has a non-finite sequence key")
            }
            Self::SequenceOutOfOrder {
                day_id,
                previous,
                next,
            } => write!(
                f,
                "day {day_id} sequence keys must strictly increase, got {previous} then {next}"
            ),
            Self::DayMismatch {
                item_id,
                expected,
                actual,
            } => write!(
                f,
                "item {item_id} is listed under day {expected} but owned by day {actual}"
            ),
            Self::DuplicateItem(id) => write!(f, "duplicate itinerary item: {id}"),
            Self::DuplicateDay(id) => write!(f, "duplicate itinerary day: {id}"),
            Self::TripMismatch { day_id, trip_id } => {
                write!(f, "day {day_id} does not belong to trip {trip_id}")
            }
            Self::InvalidDuration { field, minutes } => write!(
                f,
                "{field} must be within 1..={MAX_DURATION_MINUTES} minutes, got {minutes}"
            ),
        }
    }
}

impl Error for ModelValidationError {}

/// Trip header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: TripId,
    pub name: String,
    /// First calendar day; later day dates derive from it.
    pub start_date: Option<NaiveDate>,
}

/// One placed place inside a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    /// Stable item id.
    pub item_id: ItemId,
    /// Owning day.
    pub day_id: DayId,
    /// Referenced catalog place.
    pub place_id: PlaceId,
    /// Fractional order key within the owning day.
    pub sequence: f64,
    pub scheduled_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub notes: Option<String>,
    pub transport_to_next: Option<TransportMode>,
    pub transport_duration_minutes: Option<u32>,
    /// Epoch ms revision stamp issued by the authoritative store. `0` until
    /// the store has confirmed the item.
    pub updated_at: i64,
}

impl ItineraryItem {
    /// Creates an unconfirmed item with a generated id.
    pub fn new(day_id: DayId, place_id: PlaceId, sequence: f64) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            day_id,
            place_id,
            sequence,
            scheduled_time: None,
            duration_minutes: None,
            notes: None,
            transport_to_next: None,
            transport_duration_minutes: None,
            updated_at: 0,
        }
    }

    /// Builds a new entity carrying this item's place and descriptive fields.
    ///
    /// Identity, sequence and the transport link are not carried over.
    pub fn copy_into(&self, day_id: DayId, sequence: f64) -> Self {
        let mut copy = Self::new(day_id, self.place_id, sequence);
        copy.scheduled_time = self.scheduled_time;
        copy.duration_minutes = self.duration_minutes;
        copy.notes = self.notes.clone();
        copy
    }

    /// Drops the transport-to-next link.
    pub fn clear_transport(&mut self) {
        self.transport_to_next = None;
        self.transport_duration_minutes = None;
    }

    /// Validates field-level invariants.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if !self.sequence.is_finite() {
            return Err(ModelValidationError::NonFiniteSequence {
                item_id: self.item_id,
            });
        }
        validate_duration("duration_minutes", self.duration_minutes)?;
        if let Some(minutes) = self.transport_duration_minutes {
            if minutes > MAX_DURATION_MINUTES {
                return Err(ModelValidationError::InvalidDuration {
                    field: "transport_duration_minutes",
                    minutes,
                });
            }
        }
        Ok(())
    }
}

/// Partial field edit for one item.
///
/// Outer `None` leaves a field unchanged; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub scheduled_time: Option<Option<NaiveTime>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub duration_minutes: Option<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub transport_to_next: Option<Option<TransportMode>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub transport_duration_minutes: Option<Option<u32>>,
}

impl ItemPatch {
    /// Returns whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies set fields onto `item`.
    pub fn apply_to(&self, item: &mut ItineraryItem) {
        if let Some(value) = self.scheduled_time {
            item.scheduled_time = value;
        }
        if let Some(value) = self.duration_minutes {
            item.duration_minutes = value;
        }
        if let Some(value) = &self.notes {
            item.notes = value.clone();
        }
        if let Some(value) = self.transport_to_next {
            item.transport_to_next = value;
        }
        if let Some(value) = self.transport_duration_minutes {
            item.transport_duration_minutes = value;
        }
    }
}

/// Reads a present field, `null` included, as `Some(..)`.
fn patch_field<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One day of a trip with its ordered items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day_id: DayId,
    pub trip_id: TripId,
    /// 1-based ordinal within the trip.
    pub day_number: u32,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub default_transport: Option<TransportMode>,
    /// Items sorted by ascending `sequence`.
    pub items: Vec<ItineraryItem>,
}

impl ItineraryDay {
    /// Creates an empty day with a generated id.
    pub fn new(trip_id: TripId, day_number: u32, date: Option<NaiveDate>) -> Self {
        Self {
            day_id: Uuid::new_v4(),
            trip_id,
            day_number,
            date,
            notes: None,
            default_transport: None,
            items: Vec::new(),
        }
    }

    /// Current keys in display order.
    pub fn sequences(&self) -> Vec<f64> {
        self.items.iter().map(|item| item.sequence).collect()
    }

    /// Index of one item in display order.
    pub fn position_of(&self, item_id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.item_id == item_id)
    }

    /// Inserts `item` keeping ascending key order.
    pub fn insert_sorted(&mut self, item: ItineraryItem) -> usize {
        let index = self
            .items
            .partition_point(|existing| existing.sequence < item.sequence);
        self.items.insert(index, item);
        index
    }

    /// Validates ownership and strict key ordering.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        for item in &self.items {
            item.validate()?;
            if item.day_id != self.day_id {
                return Err(ModelValidationError::DayMismatch {
                    item_id: item.item_id,
                    expected: self.day_id,
                    actual: item.day_id,
                });
            }
        }
        for pair in self.items.windows(2) {
            if pair[1].sequence <= pair[0].sequence {
                return Err(ModelValidationError::SequenceOutOfOrder {
                    day_id: self.day_id,
                    previous: pair[0].sequence,
                    next: pair[1].sequence,
                });
            }
        }
        Ok(())
    }
}

/// Partial field edit for one day. Same clearing rules as [`ItemPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPatch {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "patch_field")]
    pub default_transport: Option<Option<TransportMode>>,
}

impl DayPatch {
    /// Returns whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies set fields onto `day`.
    pub fn apply_to(&self, day: &mut ItineraryDay) {
        if let Some(value) = &self.notes {
            day.notes = value.clone();
        }
        if let Some(value) = self.default_transport {
            day.default_transport = value;
        }
    }
}

/// Validates an optional stay duration.
pub fn validate_duration(
    field: &'static str,
    minutes: Option<u32>,
) -> Result<(), ModelValidationError> {
    match minutes {
        Some(value) if value == 0 || value > MAX_DURATION_MINUTES => {
            Err(ModelValidationError::InvalidDuration {
                field,
                minutes: value,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ItemPatch, ItineraryDay, ItineraryItem, ModelValidationError, TransportMode,
    };
    use chrono::NaiveTime;
    use uuid::Uuid;

    fn day_with_keys(keys: &[f64]) -> ItineraryDay {
        let mut day = ItineraryDay::new(Uuid::new_v4(), 1, None);
        for key in keys {
            day.items
                .push(ItineraryItem::new(day.day_id, Uuid::new_v4(), *key));
        }
        day
    }

    #[test]
    fn day_validation_rejects_equal_neighbor_keys() {
        let day = day_with_keys(&[1.0, 1.0]);
        let err = day.validate().unwrap_err();
        assert!(matches!(err, ModelValidationError::SequenceOutOfOrder { .. }));
    }

    #[test]
    fn day_validation_rejects_foreign_item() {
        let mut day = day_with_keys(&[1.0]);
        day.items[0].day_id = Uuid::new_v4();
        assert!(matches!(
            day.validate().unwrap_err(),
            ModelValidationError::DayMismatch { .. }
        ));
    }

    #[test]
    fn insert_sorted_places_item_between_neighbors() {
        let mut day = day_with_keys(&[1.0, 2.0]);
        let item = ItineraryItem::new(day.day_id, Uuid::new_v4(), 1.5);
        assert_eq!(day.insert_sorted(item), 1);
        assert_eq!(day.sequences(), vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn copy_into_drops_identity_and_transport() {
        let day_id = Uuid::new_v4();
        let mut source = ItineraryItem::new(day_id, Uuid::new_v4(), 3.0);
        source.notes = Some("bring cash".to_string());
        source.duration_minutes = Some(45);
        source.scheduled_time = NaiveTime::from_hms_opt(9, 30, 0);
        source.transport_to_next = Some(TransportMode::Taxi);
        source.transport_duration_minutes = Some(12);

        let target_day = Uuid::new_v4();
        let copy = source.copy_into(target_day, 1.0);

        assert_ne!(copy.item_id, source.item_id);
        assert_eq!(copy.day_id, target_day);
        assert_eq!(copy.place_id, source.place_id);
        assert_eq!(copy.sequence, 1.0);
        assert_eq!(copy.notes, source.notes);
        assert_eq!(copy.duration_minutes, Some(45));
        assert_eq!(copy.scheduled_time, source.scheduled_time);
        assert_eq!(copy.transport_to_next, None);
        assert_eq!(copy.transport_duration_minutes, None);
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut item = ItineraryItem::new(Uuid::new_v4(), Uuid::new_v4(), 1.0);
        item.notes = Some("keep".to_string());
        let patch = ItemPatch {
            duration_minutes: Some(Some(90)),
            ..ItemPatch::default()
        };
        patch.apply_to(&mut item);
        assert_eq!(item.duration_minutes, Some(90));
        assert_eq!(item.notes.as_deref(), Some("keep"));
        assert!(ItemPatch::default().is_empty());
    }

    #[test]
    fn json_shape_uses_snake_case_transport() {
        let mut item = ItineraryItem::new(Uuid::new_v4(), Uuid::new_v4(), 2.5);
        item.transport_to_next = Some(TransportMode::Subway);

        let value = serde_json::to_value(&item).expect("item should serialize");
        assert_eq!(value["transport_to_next"], "subway");
        assert_eq!(value["sequence"], 2.5);

        let decoded: ItineraryItem = serde_json::from_value(value).expect("item should decode");
        assert_eq!(decoded, item);
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let mut item = ItineraryItem::new(Uuid::new_v4(), Uuid::new_v4(), 1.0);
        item.scheduled_time = NaiveTime::from_hms_opt(10, 0, 0);
        item.notes = Some("old".to_string());
        item.transport_to_next = Some(TransportMode::Bus);
        item.duration_minutes = Some(30);

        let patch = ItemPatch {
            scheduled_time: Some(None),
            notes: Some(None),
            transport_to_next: Some(None),
            ..ItemPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply_to(&mut item);

        assert_eq!(item.scheduled_time, None);
        assert_eq!(item.notes, None);
        assert_eq!(item.transport_to_next, None);
        assert_eq!(item.duration_minutes, Some(30));
    }

    #[test]
    fn patch_json_distinguishes_null_from_missing() {
        let patch: ItemPatch =
            serde_json::from_str(r#"{"notes":null,"duration_minutes":15}"#).expect("patch should decode");
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.duration_minutes, Some(Some(15)));
        assert_eq!(patch.scheduled_time, None);

        let value = serde_json::to_value(&patch).expect("patch should serialize");
        assert!(value["notes"].is_null());
        assert!(value.get("scheduled_time").is_none());
    }

    #[test]
    fn zero_duration_is_invalid() {
        let mut item = ItineraryItem::new(Uuid::new_v4(), Uuid::new_v4(), 1.0);
        item.duration_minutes = Some(0);
        assert!(matches!(
            item.validate().unwrap_err(),
            ModelValidationError::InvalidDuration { .. }
        ));
    }
}
