use chrono::{Datelike, Duration, NaiveDate};
use sha2::{Digest, Sha256};

/// `1.5` -> `"1h 30m"`, `0.25` -> `"15m"`, `2.0` -> `"2h"`.
pub fn format_hours_as_hours_minutes(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    let sign = if total_minutes < 0 { "-" } else { "" };
    let total_minutes = total_minutes.abs();
    let h = total_minutes / 60;
    let m = total_minutes % 60;
    match (h, m) {
        (0, m) => format!("{sign}{m}m"),
        (h, 0) => format!("{sign}{h}h"),
        (h, m) => format!("{sign}{h}h {m}m"),
    }
}

/// `HH:MM:SS` for a running timer.
pub fn format_elapsed(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

pub fn iso_week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// Monday and Sunday of the ISO week containing `date`.
pub fn iso_week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

/// Stable color for a seed (user email, repository name, ...).
/// Same seed, same color, across runs and machines.
pub fn seeded_color(seed: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(seed.as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    hsl_to_rgb(hue as f64, 0.55, 0.5)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r1), to_byte(g1), to_byte(b1))
}

/// Avatar initials: first letter of the first and last word.
pub fn initials(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let pick = |w: &str| w.chars().next().map(|c| c.to_uppercase().to_string());
    match words.as_slice() {
        [] => "?".to_string(),
        [only] => pick(*only).unwrap_or_default(),
        [first, .., last] => {
            let mut out = pick(*first).unwrap_or_default();
            out.push_str(&pick(*last).unwrap_or_default());
            out
        }
    }
}
