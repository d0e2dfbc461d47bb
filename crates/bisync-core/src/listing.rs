use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;

use crate::entry::Entry;
use crate::error::ListingError;

/// An ordered mapping from path to [`Entry`], sorted ascending by path.
///
/// A `BTreeMap` is used deliberately so iteration order is always the sort
/// order: this determinism is relied on by the engine to make logs
/// diffable and runs reproducible (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing(BTreeMap<String, Entry>);

impl Listing {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, entry: Entry) {
        self.0.insert(entry.path.clone(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.0.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl FromIterator<Entry> for Listing {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        let mut listing = Listing::new();
        for entry in iter {
            listing.insert(entry);
        }
        listing
    }
}

fn line_pattern() -> Regex {
    Regex::new(r"^(\d+) (\d{4}-\d{2}-\d{2}) (\d{2}:\d{2}:\d{2})\.(\d+) (.+)$")
        .expect("listing line pattern is a valid regex")
}

/// Parse a textual listing (spec §6 snapshot/listing file format).
///
/// Lines that do not match the expected `<size> <date> <time>.<frac> <path>`
/// shape are logged at warning level and skipped; they never fail the
/// overall parse, matching spec §4.1.
pub fn parse(text: &str) -> Result<Listing, ListingError> {
    let pattern = line_pattern();
    let mut listing = Listing::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(captures) = pattern.captures(line) else {
            log::warn!("skipping unparseable listing line: {line:?}");
            continue;
        };

        let size: u64 = match captures[1].parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("skipping listing line with unparseable size: {line:?}");
                continue;
            }
        };
        let date = &captures[2];
        let time = &captures[3];
        let frac = &captures[4];
        let path = &captures[5];

        let mtime_ns = match parse_local_timestamp(date, time, frac) {
            Ok(ns) => ns,
            Err(err) => {
                log::warn!("skipping listing line with bad timestamp: {line:?}: {err}");
                continue;
            }
        };

        listing.insert(Entry::new(path.to_string(), size, mtime_ns));
    }

    Ok(listing)
}

/// Parse `date`/`time`/fractional-seconds components as local civil time
/// and return nanoseconds since the Unix epoch.
fn parse_local_timestamp(date: &str, time: &str, frac: &str) -> Result<i64, ListingError> {
    let naive = NaiveDateTime::parse_from_str(
        &format!("{date} {time}"),
        "%Y-%m-%d %H:%M:%S",
    )
    .map_err(|e| ListingError::Timestamp {
        raw: format!("{date} {time}"),
        reason: e.to_string(),
    })?;

    let local = match Local.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => {
            return Err(ListingError::Timestamp {
                raw: format!("{date} {time}"),
                reason: "local time does not exist (DST gap)".to_string(),
            })
        }
    };

    let mut digits = frac.to_string();
    digits.truncate(9);
    while digits.len() < 9 {
        digits.push('0');
    }
    let nanos_fraction: i64 = digits.parse().map_err(|_| ListingError::Timestamp {
        raw: frac.to_string(),
        reason: "fractional seconds are not numeric".to_string(),
    })?;

    Ok(local.timestamp() * 1_000_000_000 + nanos_fraction)
}

/// Render a listing back into the exact snapshot-file text format: one
/// record per line, sorted by path, trailing newline after each record.
pub fn render(listing: &Listing) -> String {
    let mut out = String::new();
    for (path, entry) in listing.iter() {
        let local = Local
            .timestamp_opt(entry.mtime_ns / 1_000_000_000, 0)
            .single()
            .unwrap_or_else(|| Local.timestamp_opt(0, 0).single().unwrap());
        let frac = (entry.mtime_ns.rem_euclid(1_000_000_000)) as u32;
        let _ = writeln!(
            out,
            "{} {}.{:09} {}",
            entry.size,
            local.format("%Y-%m-%d %H:%M:%S"),
            frac,
            path
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_listing() {
        let mut listing = Listing::new();
        listing.insert(Entry::new("b/two.txt", 20, 1_700_000_002_123_456_000));
        listing.insert(Entry::new("a/one.txt", 10, 1_700_000_001_000_000_000));

        let text = render(&listing);
        let reloaded = parse(&text).unwrap();

        assert_eq!(listing, reloaded);
        // Sort order is preserved: "a/one.txt" before "b/two.txt".
        let paths: Vec<_> = reloaded.paths().collect();
        assert_eq!(paths, vec!["a/one.txt", "b/two.txt"]);
    }

    #[test]
    fn skips_unparseable_lines_without_failing() {
        let text = "not a valid line at all\n10 2024-01-01 00:00:00.0 ok/path\n";
        let listing = parse(text).unwrap();
        assert_eq!(listing.len(), 1);
        assert!(listing.contains("ok/path"));
    }

    #[test]
    fn path_may_contain_spaces() {
        let text = "42 2024-06-01 12:30:45.500 some dir/with spaces.txt\n";
        let listing = parse(text).unwrap();
        assert_eq!(listing.get("some dir/with spaces.txt").unwrap().size, 42);
    }
}
