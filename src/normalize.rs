// src/normalize.rs
//! Turns upstream server entries into display-ready records.
//!
//! Normalization never fails: a field that cannot be interpreted falls back
//! to a neutral value and the record is kept.

use lazy_static::lazy_static;
use regex::Regex;
use crate::models::server::{ServerInfo, ServerMeta, ServerRecord};

lazy_static! {
    static ref KEYED_TAG: Regex = Regex::new(r"\[[^\[\]=]+=[^\[\]]*\]").expect("valid keyed tag regex");
    static ref PLAIN_TAG: Regex = Regex::new(r"\[/?[^\[\]]+\]").expect("valid plain tag regex");
}

const CONNECT_URL_PREFIX: &str = "https://go-game.net/gosteam/427520.--mp-connect%20";

const MINUTE_UNITS: [(u64, &str, &str); 5] = [
    (365 * 24 * 60, "yr", "yrs"),
    (7 * 24 * 60, "wk", "wks"),
    (24 * 60, "day", "days"),
    (60, "hr", "hrs"),
    (1, "min", "mins"),
];

/// Removes rich-text markup and flattens line breaks into a single line.
pub fn clean_text(input: &str) -> String {
    let buf = KEYED_TAG.replace_all(input, "");
    let buf = PLAIN_TAG.replace_all(&buf, "");

    buf.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("\n\n", "\n")
        .replace('\n', "  ")
}

/// Formats minutes using the two largest non-zero units, e.g. "2 hrs 15 mins".
pub fn format_minutes(minutes: u64) -> String {
    if minutes == 0 {
        return "0 min".to_string();
    }

    let mut remaining = minutes;
    let mut parts = Vec::with_capacity(2);
    for (size, singular, plural) in MINUTE_UNITS {
        let amount = remaining / size;
        remaining %= size;
        if amount == 0 {
            continue;
        }
        let unit = if amount == 1 { singular } else { plural };
        parts.push(format!("{} {}", amount, unit));
        if parts.len() == 2 {
            break;
        }
    }
    parts.join(" ")
}

/// One-click connect link for a host address.
pub fn connect_url(host: &str) -> String {
    format!("{}{}", CONNECT_URL_PREFIX, host)
}

pub fn normalize(mut info: ServerInfo) -> ServerRecord {
    info.name = clean_text(&info.name);
    info.description = clean_text(&info.description);
    for tag in info.tags.iter_mut() {
        *tag = clean_text(tag);
    }

    let minutes = info.game_time_elapsed.minutes();
    let local = ServerMeta {
        connect_url: connect_url(&info.host_address),
        time_str: format_minutes(minutes),
        minutes,
        modded: info.mod_count > 0,
    };

    ServerRecord { info, local }
}

pub fn normalize_all(list: Vec<ServerInfo>) -> Vec<ServerRecord> {
    list.into_iter().map(normalize).collect()
}
