use crate::models::DormRoom;
use chrono::NaiveDate;
use std::str::FromStr;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Error while checking filters for room {room}: invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { room: String, value: String },

    #[error("Invalid preference '{0}' (expected yes, no or any)")]
    InvalidPreference(String),
}

/// Tri-state preference for a yes/no room feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    #[default]
    Any,
    Required,
    Excluded,
}

impl Preference {
    pub fn admits(self, value: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Required => value,
            Self::Excluded => !value,
        }
    }
}

impl FromStr for Preference {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "either" | "2" => Ok(Self::Any),
            "yes" | "y" | "true" | "1" => Ok(Self::Required),
            "no" | "n" | "false" | "0" => Ok(Self::Excluded),
            other => Err(FilterError::InvalidPreference(other.to_string())),
        }
    }
}

/// Search criteria for the room list. `None` / `Any` criteria always pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomFilter {
    pub min_price: Option<u32>,
    pub max_price: Option<u32>,
    pub city: Option<String>,
    pub live_in_landlord: Preference,
    pub max_roommates: Option<u32>,
    pub bills_included: Preference,
    pub shared_bathroom: Preference,
    pub language: Option<String>,
    /// Rooms must be available on or before this `YYYY-MM-DD` date.
    pub available_from: Option<String>,
}

impl RoomFilter {
    /// Whether `room` satisfies every criterion.
    ///
    /// Fails when the filter date or the room's availability date is not a valid date.
    pub fn matches(&self, room: &DormRoom) -> Result<bool, FilterError> {
        let price = room.price_per_month_gbp;

        let checks = self.min_price.is_none_or(|min| price >= min)
            && self.max_price.is_none_or(|max| price <= max)
            && self
                .city
                .as_deref()
                .is_none_or(|city| room.location.city.eq_ignore_ascii_case(city.trim()))
            && self.live_in_landlord.admits(room.details.live_in_landlord)
            && self
                .max_roommates
                .is_none_or(|max| room.details.shared_with <= max)
            && self.bills_included.admits(room.details.bills_included)
            && self.shared_bathroom.admits(room.details.bathroom_shared)
            && self.language.as_deref().is_none_or(|language| {
                room.spoken_languages
                    .iter()
                    .any(|spoken| spoken.eq_ignore_ascii_case(language.trim()))
            });

        if !checks {
            return Ok(false);
        }

        match &self.available_from {
            None => Ok(true),
            Some(wanted) => {
                let wanted = parse_date(&room.name, wanted)?;
                let available = parse_date(&room.name, &room.availability_date)?;
                Ok(available <= wanted)
            }
        }
    }

    /// Rooms passing the filter, in input order. Stops at the first invalid date.
    pub fn apply<'a>(&self, rooms: &'a [DormRoom]) -> Result<Vec<&'a DormRoom>, FilterError> {
        let mut matching = Vec::new();
        for room in rooms {
            if self.matches(room)? {
                matching.push(room);
            }
        }
        Ok(matching)
    }
}

fn parse_date(room: &str, value: &str) -> Result<NaiveDate, FilterError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| FilterError::InvalidDate {
        room: room.to_string(),
        value: value.to_string(),
    })
}
