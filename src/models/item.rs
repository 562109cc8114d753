use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Kind of report an item record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    Lost,
    Found,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lost => "LOST",
            ItemType::Found => "FOUND",
        }
    }
}

impl FromStr for ItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOST" => Ok(ItemType::Lost),
            "FOUND" => Ok(ItemType::Found),
            _ => Err(AppError::InvalidInput(format!(
                "item type must be LOST or FOUND, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an item record. Any state may replace any other via a
/// status update; there is no enforced transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemStatus {
    Active,
    Matched,
    Resolved,
    Archived,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "ACTIVE",
            ItemStatus::Matched => "MATCHED",
            ItemStatus::Resolved => "RESOLVED",
            ItemStatus::Archived => "ARCHIVED",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(ItemStatus::Active),
            "MATCHED" => Ok(ItemStatus::Matched),
            "RESOLVED" => Ok(ItemStatus::Resolved),
            "ARCHIVED" => Ok(ItemStatus::Archived),
            _ => Err(AppError::InvalidInput(format!(
                "status must be ACTIVE, MATCHED, RESOLVED or ARCHIVED, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (longitude, latitude) position. Both components always travel together;
/// a partially-set position is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    /// Builds a position only when both components are supplied.
    pub fn from_parts(longitude: Option<f64>, latitude: Option<f64>) -> Option<Self> {
        match (longitude, latitude) {
            (Some(longitude), Some(latitude)) => Some(Coordinates {
                longitude,
                latitude,
            }),
            _ => None,
        }
    }
}

/// A lost/found item report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub user_id: i64,
    pub organization_id: Option<i64>,
    pub item_type: ItemType,
    pub status: ItemStatus,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub date_lost_found: Option<DateTime<Utc>>,
    pub date_reported: DateTime<Utc>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub preferred_contact: Option<String>,
    pub reward: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new report. The store assigns the id, forces
/// ACTIVE status and stamps date_reported/created_at/updated_at.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub user_id: i64,
    pub organization_id: Option<i64>,
    pub item_type: ItemType,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub date_lost_found: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub preferred_contact: Option<String>,
    pub reward: Option<f64>,
}

/// Descriptive fields overwritten as a block by a full update. Type, status,
/// ownership and created_at never appear here.
#[derive(Debug, Clone)]
pub struct ItemDetails {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub date_lost_found: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub preferred_contact: Option<String>,
    pub reward: Option<f64>,
}

/// Partial update applied to a stored item. Absent parts leave the record
/// untouched; coordinates in particular are only replaced when a complete
/// pair was supplied. updated_at refreshes on every applied patch.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub details: Option<ItemDetails>,
    pub coordinates: Option<Coordinates>,
    pub status: Option<ItemStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_parses_case_insensitively() {
        assert_eq!("LOST".parse::<ItemType>().unwrap(), ItemType::Lost);
        assert_eq!("found".parse::<ItemType>().unwrap(), ItemType::Found);
        assert_eq!("Lost".parse::<ItemType>().unwrap(), ItemType::Lost);
    }

    #[test]
    fn item_type_rejects_unknown_values() {
        assert!("MISPLACED".parse::<ItemType>().is_err());
        assert!("".parse::<ItemType>().is_err());
    }

    #[test]
    fn item_status_round_trips_through_strings() {
        for status in [
            ItemStatus::Active,
            ItemStatus::Matched,
            ItemStatus::Resolved,
            ItemStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
    }

    #[test]
    fn item_status_rejects_unknown_values() {
        assert!("DELETED".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn coordinates_require_both_parts() {
        assert!(Coordinates::from_parts(Some(139.7), None).is_none());
        assert!(Coordinates::from_parts(None, Some(35.6)).is_none());
        assert!(Coordinates::from_parts(None, None).is_none());

        let position = Coordinates::from_parts(Some(139.7), Some(35.6)).unwrap();
        assert_eq!(position.longitude, 139.7);
        assert_eq!(position.latitude, 35.6);
    }
}
