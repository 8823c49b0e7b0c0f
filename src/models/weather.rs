use serde::{Deserialize, Serialize};
use std::fmt;

/// One day of the forecast returned by the `weather` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    pub date: String,
    pub weather: String,
    pub temp_min: i32,
    pub temp_max: i32,
}

/// Today's and tomorrow's weather for a postcode.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherForecast {
    pub today: WeatherDay,
    pub tomorrow: WeatherDay,
}

impl WeatherForecast {
    /// Build from the raw day list; `None` unless at least two days are present.
    pub fn from_days(days: Vec<WeatherDay>) -> Option<Self> {
        let mut days = days.into_iter();
        let today = days.next()?;
        let tomorrow = days.next()?;
        Some(Self { today, tomorrow })
    }
}

impl fmt::Display for WeatherForecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Today's Weather: {} - with highs of {}\u{00b0}C and lows of {}\u{00b0}C.",
            self.today.weather, self.today.temp_max, self.today.temp_min
        )?;
        write!(
            f,
            "Tomorrow's Weather: {} - expect highs of {}\u{00b0}C and lows of {}\u{00b0}C.",
            self.tomorrow.weather, self.tomorrow.temp_max, self.tomorrow.temp_min
        )
    }
}
