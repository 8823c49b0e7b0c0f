use crate::models::{
    ApiStatus, ApplicationHistory, CombinedRoomResponse, CrimeRecord, CrimeSummary,
    RoomListResponse, RouteResponse, RouteSummary, WeatherDay, WeatherForecast,
};
use crate::services::filter::{FilterError, RoomFilter};
use crate::state::{SessionManager, UserCredentials};
use regex::Regex;
use reqwest::{Client, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

pub const ROOMS_UPDATED: &str = "Rooms updated.";
pub const NO_MATCHING_ROOMS: &str = "No rooms available that match the filters.";

/// Errors from calls to the GlobalDorm REST API
///
/// Each variant is a distinct outcome the shell reports differently.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Input rejected before any request was sent
    #[error("{0}")]
    Validation(String),

    /// The API answered but reported a failure
    #[error("Error: {0}")]
    Rejected(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Network(String),

    #[error("Failed: {status} - {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// Room names passing a filter, with the status line to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomListing {
    pub names: Vec<String>,
    pub message: String,
}

/// Formatted room description and the room's postcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub text: String,
    pub postcode: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewApplication<'a> {
    dorm_name: &'a str,
    applicant_name: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Cancellation<'a> {
    username: &'a str,
    password: &'a str,
    dorm_room_name: &'a str,
    applicant_name: &'a str,
}

/// Client for the GlobalDorm database and area-information services
///
/// Base URLs come from the [`SessionManager`]'s current server on every call,
/// so switching servers takes effect immediately. All requests share one
/// timeout.
#[derive(Clone)]
pub struct ServiceClient {
    session: SessionManager,
    http: Client,
    timeout: Duration,
    postcode_pattern: Regex,
}

impl ServiceClient {
    pub fn new(session: SessionManager, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            session,
            http,
            timeout,
            // UK postcode: outward code, optional space, inward code
            postcode_pattern: Regex::new(r"(?i)^[A-Z]{1,2}[0-9][A-Z0-9]?\s?[0-9][A-Z]{2}$")
                .expect("Invalid postcode regex"),
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create an account. Fails with `Validation` before any I/O when the
    /// passwords differ or a field is empty.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        confirm: &str,
    ) -> Result<ApiStatus, ServiceError> {
        require("Username", username)?;
        require("Password", password)?;
        if password != confirm {
            return Err(ServiceError::Validation("Passwords do not match".to_string()));
        }

        let url = format!("{}/addUser", self.session.endpoints().database);
        let status: ApiStatus = self
            .send(self.http.post(url).json(&Credentials { username, password }))
            .await?;

        let status = expect_success(status)?;
        tracing::info!("Registered user '{}'", username);
        Ok(status)
    }

    /// Check credentials against the database without touching the session.
    pub async fn verify(&self, username: &str, password: &str) -> Result<ApiStatus, ServiceError> {
        require("Username", username)?;
        require("Password", password)?;

        let url = format!("{}/verifyUser", self.session.endpoints().database);
        let status: ApiStatus = self
            .send(
                self.http
                    .get(url)
                    .query(&[("username", username), ("password", password)]),
            )
            .await?;

        expect_success(status)
    }

    /// Verify credentials, then mark the user as logged in.
    pub async fn login(&self, username: &str, password: &str) -> Result<ApiStatus, ServiceError> {
        let status = self.verify(username, password).await?;
        self.session.login(username, password);
        Ok(status)
    }

    /// Fetch every room and keep the names of those passing `filter`.
    pub async fn list_room_names(&self, filter: &RoomFilter) -> Result<RoomListing, ServiceError> {
        let url = format!("{}/viewAllDormRooms", self.session.endpoints().database);
        let response: RoomListResponse = self.send(self.http.get(url)).await?;

        let names: Vec<String> = filter
            .apply(&response.data)?
            .into_iter()
            .map(|room| room.name.clone())
            .collect();

        tracing::debug!(
            total = response.data.len(),
            matching = names.len(),
            "Filtered room list"
        );

        let message = if names.is_empty() {
            NO_MATCHING_ROOMS
        } else {
            ROOMS_UPDATED
        };

        Ok(RoomListing {
            names,
            message: message.to_string(),
        })
    }

    /// Full description of one room, including today's weather.
    pub async fn fetch_room_details(&self, room_name: &str) -> Result<RoomInfo, ServiceError> {
        require("Room name", room_name)?;

        let url = format!(
            "{}/fetchDormRoomCombinedInformation",
            self.session.endpoints().database
        );
        let response: CombinedRoomResponse = self
            .send(self.http.get(url).query(&[("roomName", room_name)]))
            .await?;

        Ok(RoomInfo {
            postcode: response.data.room.location.postcode.clone(),
            text: response.data.to_string(),
        })
    }

    /// Apply for `dorm_name` on behalf of `applicant_name`.
    ///
    /// Requires a logged-in user whose password matches `password`.
    pub async fn apply_for_room(
        &self,
        dorm_name: &str,
        applicant_name: &str,
        password: &str,
    ) -> Result<String, ServiceError> {
        let user = self.reauthenticate(password)?;
        require("Dorm name", dorm_name)?;
        require("Applicant name", applicant_name)?;

        let url = format!("{}/addApplication", self.session.endpoints().database);
        let body = NewApplication {
            dorm_name,
            applicant_name,
            username: &user.username,
            password: &user.password,
        };
        let status: ApiStatus = self.send(self.http.post(url).json(&body)).await?;
        expect_success(status)?;

        tracing::info!("Application submitted for {} by {}", dorm_name, applicant_name);
        Ok(format!(
            "Application added successfully for {} by {}.",
            dorm_name, applicant_name
        ))
    }

    /// Cancel an application. Same login requirements as [`apply_for_room`](Self::apply_for_room).
    pub async fn cancel_application(
        &self,
        dorm_name: &str,
        applicant_name: &str,
        password: &str,
    ) -> Result<String, ServiceError> {
        let user = self.reauthenticate(password)?;
        require("Dorm name", dorm_name)?;
        require("Applicant name", applicant_name)?;

        let url = format!("{}/cancelApplication", self.session.endpoints().database);
        let body = Cancellation {
            username: &user.username,
            password: &user.password,
            dorm_room_name: dorm_name,
            applicant_name,
        };
        let status: ApiStatus = self.send(self.http.patch(url).json(&body)).await?;
        expect_success(status)?;

        tracing::info!("Application cancelled for {} by {}", dorm_name, applicant_name);
        Ok(format!(
            "Cancellation successful for {} by {}.",
            dorm_name, applicant_name
        ))
    }

    /// Every application made for `dorm_name`, formatted for display.
    pub async fn view_history(&self, dorm_name: &str) -> Result<String, ServiceError> {
        require("Dorm name", dorm_name)?;

        let mut url = Url::parse(&format!(
            "{}/viewRoomApplicationHistory",
            self.session.endpoints().database
        ))
        .map_err(|e| ServiceError::Validation(format!("Invalid server address: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Validation("Invalid server address".to_string()))?
            .push(dorm_name);

        let history: ApplicationHistory = self.send(self.http.get(url)).await?;
        let applications = history.applications();

        if applications.is_empty() {
            return Ok(format!("No application history for '{}'.", dorm_name));
        }
        Ok(applications.iter().map(ToString::to_string).collect())
    }

    pub async fn fetch_weather(&self, postcode: &str) -> Result<WeatherForecast, ServiceError> {
        let postcode = self.validate_postcode(postcode)?;

        let url = format!("{}/weather", self.session.endpoints().globaldorm);
        let days: Vec<WeatherDay> = self
            .send(self.http.get(url).query(&[("postcode", postcode)]))
            .await?;

        WeatherForecast::from_days(days).ok_or_else(|| {
            ServiceError::Malformed("expected weather for today and tomorrow".to_string())
        })
    }

    pub async fn fetch_crime(&self, postcode: &str) -> Result<CrimeSummary, ServiceError> {
        let postcode = self.validate_postcode(postcode)?;

        let url = format!("{}/crime", self.session.endpoints().globaldorm);
        let records: Vec<CrimeRecord> = self
            .send(
                self.http
                    .get(url)
                    .query(&[("crime", "all-crime"), ("postcode", postcode)]),
            )
            .await?;

        Ok(CrimeSummary::from_records(&records))
    }

    /// Driving time and distance between two postcodes.
    pub async fn fetch_route_distance(
        &self,
        from_postcode: &str,
        to_postcode: &str,
    ) -> Result<RouteSummary, ServiceError> {
        let from = self.validate_postcode(from_postcode)?;
        let to = self.validate_postcode(to_postcode)?;

        let url = format!("{}/route", self.session.endpoints().globaldorm);
        let response: RouteResponse = self
            .send(self.http.get(url).query(&[
                ("mode", "driving"),
                ("startPostcode", from),
                ("endPostcode", to),
            ]))
            .await?;

        RouteSummary::from_response(from, to, &response)
            .ok_or_else(|| ServiceError::Rejected("No routes found in the response.".to_string()))
    }

    /// Trimmed postcode, or `Validation` if it is not a UK postcode.
    pub fn validate_postcode<'a>(&self, postcode: &'a str) -> Result<&'a str, ServiceError> {
        let postcode = postcode.trim();
        if self.postcode_pattern.is_match(postcode) {
            Ok(postcode)
        } else {
            Err(ServiceError::Validation(format!(
                "'{}' is not a valid postcode",
                postcode
            )))
        }
    }

    fn reauthenticate(&self, password: &str) -> Result<UserCredentials, ServiceError> {
        let credentials = self.session.credentials().ok_or_else(|| {
            ServiceError::Validation("You must be logged in to do that".to_string())
        })?;

        if !self.session.authenticate(&credentials.username, password) {
            return Err(ServiceError::Validation(
                "Password does not match the logged-in user".to_string(),
            ));
        }
        Ok(credentials)
    }

    /// Send a request and decode a JSON body, mapping every failure to a `ServiceError`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            tracing::warn!("{} returned {}", url.path(), status);
            return Err(ServiceError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("Could not parse response from {}: {}", url.path(), e);
            ServiceError::Malformed(e.to_string())
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> ServiceError {
        if error.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else {
            tracing::debug!("HTTP request failed: {:?}", error);
            ServiceError::Network(error.to_string())
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        Err(ServiceError::Validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}

fn expect_success(status: ApiStatus) -> Result<ApiStatus, ServiceError> {
    if status.is_success() {
        Ok(status)
    } else {
        Err(ServiceError::Rejected(status.message))
    }
}
