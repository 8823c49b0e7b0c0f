use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub county: String,
    pub postcode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetails {
    pub furnished: bool,
    pub amenities: Vec<String>,
    pub live_in_landlord: bool,
    pub shared_with: u32,
    pub bills_included: bool,
    pub bathroom_shared: bool,
}

/// A dormitory room as listed by `viewAllDormRooms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DormRoom {
    pub id: i64,
    pub name: String,
    pub location: Location,
    pub details: RoomDetails,
    pub price_per_month_gbp: u32,
    /// `YYYY-MM-DD`
    pub availability_date: String,
    pub spoken_languages: Vec<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub weather: String,
    pub temp_min: i32,
    pub temp_max: i32,
    pub date: String,
}

/// A room together with today's weather at its postcode,
/// as returned by `fetchDormRoomCombinedInformation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedDormRoom {
    #[serde(flatten)]
    pub room: DormRoom,
    pub current_weather: CurrentWeather,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomListResponse {
    pub status: String,
    #[serde(default)]
    pub data: Vec<DormRoom>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CombinedRoomResponse {
    pub status: String,
    pub data: CombinedDormRoom,
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

impl fmt::Display for DormRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let availability = if self.is_available {
            "Available"
        } else {
            "Not Available"
        };
        let bills = if self.details.bills_included {
            "Included"
        } else {
            "Not Included"
        };
        let bathroom = if self.details.bathroom_shared {
            "Shared"
        } else {
            "Private"
        };
        let people = if self.details.shared_with == 1 {
            "person"
        } else {
            "people"
        };

        writeln!(f, "Room Name: {}", self.name)?;
        writeln!(
            f,
            "Location: {}, {} ({})",
            self.location.city, self.location.county, self.location.postcode
        )?;
        writeln!(f, "Price per Month: \u{00A3}{}", self.price_per_month_gbp)?;
        writeln!(f, "Availability Date: {}", self.availability_date)?;
        writeln!(f, "Availability Status: {}", availability)?;
        writeln!(f)?;
        writeln!(f, "Room Details:")?;
        writeln!(f, "- Furnished: {}", yes_no(self.details.furnished))?;
        writeln!(f, "- Amenities: {}", self.details.amenities.join(", "))?;
        writeln!(f, "- Live-in Landlord: {}", yes_no(self.details.live_in_landlord))?;
        writeln!(f, "- Shared with: {} {}", self.details.shared_with, people)?;
        writeln!(f, "- Bills: {}", bills)?;
        writeln!(f, "- Bathroom: {}", bathroom)?;
        writeln!(f)?;
        writeln!(f, "Spoken Languages: {}", self.spoken_languages.join(", "))
    }
}

impl fmt::Display for CombinedDormRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.room)?;
        writeln!(f)?;
        writeln!(f, "Current Weather:")?;
        writeln!(f, "- Weather: {}", self.current_weather.weather)?;
        writeln!(f, "- Minimum Temperature: {}\u{00b0}C", self.current_weather.temp_min)?;
        writeln!(f, "- Maximum Temperature: {}\u{00b0}C", self.current_weather.temp_max)?;
        writeln!(f, "- Date: {}", self.current_weather.date)
    }
}
