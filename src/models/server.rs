// src/models/server.rs
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppVersion {
    pub build_mode: String,
    pub build_version: i64,
    pub game_version: String,
    pub platform: String,
}

/// Minutes of play reported by the upstream API.
///
/// The upstream field has no fixed type (number, string, null). Strings are
/// read as a duration with an implied trailing minute unit, so `"42"` is 42
/// minutes and `"1h30"` is 90. Anything that does not read as a non-negative
/// duration is `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ElapsedTime {
    Known(u64),
    #[default]
    Unknown,
}

impl ElapsedTime {
    /// Reads the value the way a `"<value>m"` duration string would parse.
    pub fn from_value(value: &Value) -> Self {
        let minutes = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_duration_minutes(&format!("{}m", s.trim())),
            _ => None,
        };
        match minutes {
            Some(m) if m.is_finite() && m >= 0.0 => ElapsedTime::Known(m.trunc() as u64),
            _ => ElapsedTime::Unknown,
        }
    }

    pub fn minutes(&self) -> u64 {
        match self {
            ElapsedTime::Known(m) => *m,
            ElapsedTime::Unknown => 0,
        }
    }
}

/// Parses a duration like `1h30m`, `2.5s` or `-4m` into fractional minutes.
/// Every number needs a unit: `ns`, `us`/`µs`, `ms`, `s`, `m` or `h`.
fn parse_duration_minutes(input: &str) -> Option<f64> {
    let (negative, mut rest) = match input.chars().next() {
        Some('-') => (true, &input[1..]),
        Some('+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest.is_empty() {
        return None;
    }

    let mut total = 0.0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_end];
        if !number.bytes().any(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: f64 = number.parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let per_minute = match &rest[..unit_end] {
            "ns" => 1.0 / 60e9,
            "us" | "µs" | "μs" => 1.0 / 60e6,
            "ms" => 1.0 / 60e3,
            "s" => 1.0 / 60.0,
            "m" => 1.0,
            "h" => 60.0,
            _ => return None,
        };
        total += value * per_minute;
        rest = &rest[unit_end..];
    }

    Some(if negative { -total } else { total })
}

impl Serialize for ElapsedTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ElapsedTime::Known(m) => serializer.serialize_u64(*m),
            ElapsedTime::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ElapsedTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(ElapsedTime::from_value(&value))
    }
}

/// A server exactly as the matchmaking API describes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub application_version: AppVersion,
    pub description: String,
    pub game_time_elapsed: ElapsedTime,
    pub has_password: bool,
    pub host_address: String,
    pub mod_count: u32,
    pub name: String,
    pub players: Vec<String>,
    pub tags: Vec<String>,
}

/// Display data derived once, when the record is normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerMeta {
    pub connect_url: String,
    pub time_str: String,
    pub minutes: u64,
    pub modded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    #[serde(flatten)]
    pub info: ServerInfo,
    #[serde(default)]
    pub local: ServerMeta,
}

impl ServerRecord {
    pub fn player_count(&self) -> usize {
        self.info.players.len()
    }

    pub fn has_players(&self) -> bool {
        !self.info.players.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCount {
    pub version: String,
    pub count: usize,
}
