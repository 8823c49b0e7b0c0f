//! Data models for the GlobalDorm client.
//!
//! - [`ClientConfig`]: servers, request timeout and broker settings loaded from `GlobalDorm Client.yaml`
//! - [`DormRoom`] / [`CombinedDormRoom`]: room records from the database API
//! - [`WeatherForecast`], [`CrimeSummary`], [`RouteSummary`]: area information for a postcode
//! - [`ApiStatus`] / [`ApplicationHistory`]: user and application responses
//!
//! Response models derive `Deserialize` and implement `Display` with the text
//! the shell prints.

pub mod application;
pub mod config;
pub mod crime;
pub mod room;
pub mod route;
pub mod weather;

pub use application::{ApiStatus, Application, ApplicationHistory};
pub use config::{ClientConfig, ClientSettings, NotificationSettings};
pub use crime::{CrimeRecord, CrimeRisk, CrimeSummary};
pub use room::{
    CombinedDormRoom, CombinedRoomResponse, CurrentWeather, DormRoom, Location, RoomDetails,
    RoomListResponse,
};
pub use route::{RouteResponse, RouteSummary};
pub use weather::{WeatherDay, WeatherForecast};
