use serde::{Deserialize, Serialize};

/// Metres per mile as used by the GlobalDorm route display.
const METRES_PER_MILE: f64 = 1600.0;

const SIGN_OFFS: [&str; 5] = [
    "Have a great journey!",
    "Enjoy the ride!",
    "Wishing you a smooth trip!",
    "Bon voyage!",
    "Take care and travel well!",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
    #[serde(default)]
    pub summary: Option<String>,
    pub weight: f64,
    pub duration: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub weight_name: String,
    pub weight: f64,
    /// Seconds
    pub duration: f64,
    /// Metres
    pub distance: f64,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub hint: String,
    pub distance: f64,
    #[serde(default)]
    pub name: Option<String>,
    pub location: Vec<f64>,
}

/// OSRM route response relayed by the `route` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub code: String,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

/// Driving time and distance between two postcodes.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSummary {
    pub duration_minutes: f64,
    pub distance_miles: f64,
    pub message: String,
}

impl RouteSummary {
    /// Summarise the first route of `response`; `None` when OSRM found no route.
    pub fn from_response(from: &str, to: &str, response: &RouteResponse) -> Option<Self> {
        let route = response.routes.first()?;
        let duration_minutes = route.duration / 60.0;
        let distance_miles = route.distance / METRES_PER_MILE;

        let source = waypoint_name(&response.waypoints, 0).unwrap_or("your starting point");
        let target = waypoint_name(&response.waypoints, 1).unwrap_or("your destination");
        let sign_off = SIGN_OFFS[route.duration as usize % SIGN_OFFS.len()];

        let message = format!(
            "Route from {} ({}) to {} ({}):\n\
             It will take about {:.2} minutes to travel a distance of {:.2} miles.\n\
             {}",
            from.to_uppercase(),
            source,
            to.to_uppercase(),
            target,
            duration_minutes,
            distance_miles,
            sign_off
        );

        Some(Self {
            duration_minutes,
            distance_miles,
            message,
        })
    }
}

fn waypoint_name(waypoints: &[Waypoint], index: usize) -> Option<&str> {
    waypoints
        .get(index)
        .and_then(|w| w.name.as_deref())
        .filter(|name| !name.is_empty())
}
