// Shell command parsing
//
// Multi-word arguments (room names, postcodes) are separated with '|':
//   apply Lenton House | Sam Smith | hunter2
// The room filter takes key=value pairs; words without '=' extend the
// previous value, so `rooms city=Milton Keynes max=500` works.

use crate::services::{Preference, RoomFilter};

pub const HELP: &str = "\
Commands:
  login <username> <password>          Log in
  register <username> <password> <confirm>
  logout
  server [name]                        Switch server (no name: next one)
  rooms [key=value ...]                List rooms; keys: min, max, city, landlord,
                                       roommates, bills, bathroom, language, from
  room <name>                          Show room details
  apply <dorm> | <applicant> | <password>
  cancel <dorm> | <applicant> | <password>
  history <dorm>                       Application history for a room
  weather [postcode]                   Forecast (default: last room viewed)
  crime [postcode]                     Crime summary (default: last room viewed)
  route <from> [| <to>]                Driving distance (default <to>: last room viewed)
  notify on|off                        Toggle push notifications
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Register { username: String, password: String, confirm: String },
    Logout,
    Server(Option<String>),
    Rooms(RoomFilter),
    Room(String),
    Apply { dorm: String, applicant: String, password: String },
    Cancel { dorm: String, applicant: String, password: String },
    History(String),
    Weather(Option<String>),
    Crime(Option<String>),
    Route { from: String, to: Option<String> },
    Notify(bool),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "login" => {
                let [username, password] = words(rest, "login <username> <password>")?;
                Self::Login { username, password }
            }
            "register" => {
                let [username, password, confirm] =
                    words(rest, "register <username> <password> <confirm>")?;
                Self::Register {
                    username,
                    password,
                    confirm,
                }
            }
            "logout" => Self::Logout,
            "server" => Self::Server(optional(rest)),
            "rooms" => Self::Rooms(parse_filter(rest)?),
            "room" => Self::Room(required(rest, "room <name>")?),
            "apply" => {
                let [dorm, applicant, password] =
                    fields(rest, "apply <dorm> | <applicant> | <password>")?;
                Self::Apply {
                    dorm,
                    applicant,
                    password,
                }
            }
            "cancel" => {
                let [dorm, applicant, password] =
                    fields(rest, "cancel <dorm> | <applicant> | <password>")?;
                Self::Cancel {
                    dorm,
                    applicant,
                    password,
                }
            }
            "history" => Self::History(required(rest, "history <dorm>")?),
            "weather" => Self::Weather(optional(rest)),
            "crime" => Self::Crime(optional(rest)),
            "route" => {
                let mut parts = rest.split('|').map(str::trim).filter(|p| !p.is_empty());
                let from = parts
                    .next()
                    .ok_or_else(|| "Usage: route <from> [| <to>]".to_string())?
                    .to_string();
                let to = parts.next().map(str::to_string);
                Self::Route { from, to }
            }
            "notify" => match rest.to_ascii_lowercase().as_str() {
                "on" => Self::Notify(true),
                "off" => Self::Notify(false),
                _ => return Err("Usage: notify on|off".to_string()),
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
        };

        Ok(Some(command))
    }
}

fn optional(rest: &str) -> Option<String> {
    (!rest.is_empty()).then(|| rest.to_string())
}

fn required(rest: &str, usage: &str) -> Result<String, String> {
    optional(rest).ok_or_else(|| format!("Usage: {}", usage))
}

fn words<const N: usize>(rest: &str, usage: &str) -> Result<[String; N], String> {
    let parts: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    parts.try_into().map_err(|_| format!("Usage: {}", usage))
}

fn fields<const N: usize>(rest: &str, usage: &str) -> Result<[String; N], String> {
    let parts: Vec<String> = rest.split('|').map(|p| p.trim().to_string()).collect();
    if parts.iter().any(String::is_empty) {
        return Err(format!("Usage: {}", usage));
    }
    parts.try_into().map_err(|_| format!("Usage: {}", usage))
}

fn parse_filter(rest: &str) -> Result<RoomFilter, String> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for word in rest.split_whitespace() {
        match word.split_once('=') {
            Some((key, value)) => pairs.push((key.to_ascii_lowercase(), value.to_string())),
            None => match pairs.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(word);
                }
                None => return Err(format!("Expected key=value, got '{}'", word)),
            },
        }
    }

    let mut filter = RoomFilter::default();
    for (key, value) in pairs {
        match key.as_str() {
            "min" => filter.min_price = Some(number(&key, &value)?),
            "max" => filter.max_price = Some(number(&key, &value)?),
            "city" => filter.city = Some(value),
            "landlord" => filter.live_in_landlord = preference(&value)?,
            "roommates" => filter.max_roommates = Some(number(&key, &value)?),
            "bills" => filter.bills_included = preference(&value)?,
            "bathroom" => filter.shared_bathroom = preference(&value)?,
            "language" => filter.language = Some(value),
            "from" => filter.available_from = Some(value),
            other => return Err(format!("Unknown filter '{}'", other)),
        }
    }
    Ok(filter)
}

fn number(key: &str, value: &str) -> Result<u32, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' expects a whole number, got '{}'", key, value))
}

fn preference(value: &str) -> Result<Preference, String> {
    value.parse().map_err(|e: crate::services::FilterError| e.to_string())
}
