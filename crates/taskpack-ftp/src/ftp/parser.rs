//! Directory listing parser.
//!
//! A listing body is split into lines and each line is offered to the
//! known formats in order:
//! 1. RFC 3659 fact lines from MLSD: `type=file;size=10;modify=20230101000000; name`
//! 2. `ls -l` lines from Unix servers
//! 3. DOS lines from IIS: `03-15-24  04:05PM       <DIR> name`
//!
//! A line no format accepts is kept as a bare name of unknown kind (NLST).
//! [`to_find_data`] turns entries into the records find-first/find-next hand out.

use crate::ftp::types::{FileAttributes, FileTime, FindData, FtpEntry, FtpEntryKind};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref LS_RE: Regex = Regex::new(
        r"(?x)
        ^(?P<mode>[-dlbcps][-rwxsStT]{9})[+.@]?\s+
        \d+\s+                                  # links
        \S+\s+\S+\s+                            # owner group
        (?P<size>\d+)\s+
        (?P<stamp>[A-Za-z]{3}\s+\d{1,2}\s+(?:\d{4}|\d{1,2}:\d{2}))\s
        (?P<name>.+)$
        ",
    )
    .unwrap();
    static ref DOS_RE: Regex = Regex::new(
        r"(?x)
        ^(?P<date>\d{2}-\d{2}-(?:\d{4}|\d{2}))\s+
        (?P<time>\d{1,2}:\d{2}(?:[AP]M)?)\s+
        (?P<size><DIR>|\d+)\s+
        (?P<name>.+)$
        ",
    )
    .unwrap();
}

type LineParser = fn(&str) -> Option<FtpEntry>;

const FORMATS: [LineParser; 3] = [parse_facts, parse_ls, parse_dos];

/// Every entry in a listing body, minus `.`/`..` and `total N` lines.
pub fn parse_listing(body: &str) -> Vec<FtpEntry> {
    let mut entries = Vec::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with("total ") {
            continue;
        }
        let entry = FORMATS
            .iter()
            .find_map(|parse| parse(line))
            .unwrap_or_else(|| blank_entry(line.trim(), FtpEntryKind::Unknown));
        if entry.name != "." && entry.name != ".." {
            entries.push(entry);
        }
    }
    entries
}

fn blank_entry(name: &str, kind: FtpEntryKind) -> FtpEntry {
    FtpEntry {
        name: name.to_string(),
        kind,
        size: 0,
        modified: None,
        created: None,
        permissions: None,
        link_target: None,
        facts: HashMap::new(),
    }
}

// ─── MLSD ────────────────────────────────────────────────────────────

fn parse_facts(line: &str) -> Option<FtpEntry> {
    if !line.contains('=') {
        return None;
    }
    let (fact_text, name) = line.split_once(' ')?;
    if name.is_empty() || !fact_text.ends_with(';') {
        return None;
    }

    let facts: HashMap<String, String> = fact_text
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();
    if facts.is_empty() {
        return None;
    }

    let kind = match facts.get("type").map(|t| t.to_ascii_lowercase()) {
        Some(t) if matches!(t.as_str(), "dir" | "cdir" | "pdir") => FtpEntryKind::Directory,
        Some(t) if t == "file" => FtpEntryKind::File,
        Some(t) if t.starts_with("os.unix=sl") || t == "os.unix=symlink" => FtpEntryKind::Symlink,
        _ => FtpEntryKind::Unknown,
    };

    let mut entry = blank_entry(name, kind);
    entry.size = facts.get("size").and_then(|s| s.parse().ok()).unwrap_or(0);
    entry.modified = facts.get("modify").and_then(|s| parse_mlsd_time(s));
    entry.created = facts.get("create").and_then(|s| parse_mlsd_time(s));
    entry.permissions = facts.get("unix.mode").cloned();
    entry.facts = facts;
    Some(entry)
}

/// `YYYYMMDDHHMMSS` with an optional `.fraction` of up to nine digits.
pub(crate) fn parse_mlsd_time(value: &str) -> Option<DateTime<Utc>> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    let base = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S").ok()?;
    let nanos = match fraction.len() {
        0 => 0,
        1..=9 => format!("{:0<9}", fraction).parse::<i64>().ok()?,
        _ => return None,
    };
    Some(Utc.from_utc_datetime(&base) + chrono::Duration::nanoseconds(nanos))
}

// ─── ls -l ───────────────────────────────────────────────────────────

fn parse_ls(line: &str) -> Option<FtpEntry> {
    let caps = LS_RE.captures(line)?;
    let mode = &caps["mode"];
    let kind = match mode.as_bytes()[0] {
        b'd' => FtpEntryKind::Directory,
        b'l' => FtpEntryKind::Symlink,
        b'-' => FtpEntryKind::File,
        _ => FtpEntryKind::Unknown,
    };

    let raw_name = caps["name"].trim_start();
    let mut entry = match raw_name.split_once(" -> ") {
        Some((name, target)) if kind == FtpEntryKind::Symlink => {
            let mut e = blank_entry(name, kind);
            e.link_target = Some(target.to_string());
            e
        }
        _ => blank_entry(raw_name, kind),
    };
    entry.size = caps["size"].parse().unwrap_or(0);
    entry.modified = parse_unix_date(&caps["stamp"], Utc::now());
    entry.permissions = Some(mode.to_string());
    Some(entry)
}

/// `Mon DD YYYY` or `Mon DD HH:MM`.
///
/// Without a year the stamp is placed in the twelve months up to `now`
/// (one day of slack for clock skew).
fn parse_unix_date(stamp: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let stamp = stamp.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Ok(day) = NaiveDate::parse_from_str(&stamp, "%b %d %Y") {
        return Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?));
    }

    let in_year = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{} {}", year, stamp), "%Y %b %d %H:%M")
            .ok()
            .map(|dt| Utc.from_utc_datetime(&dt))
    };
    let this_year = in_year(now.year())?;
    if this_year > now + chrono::Duration::days(1) {
        in_year(now.year() - 1)
    } else {
        Some(this_year)
    }
}

// ─── DOS / IIS ───────────────────────────────────────────────────────

fn parse_dos(line: &str) -> Option<FtpEntry> {
    let caps = DOS_RE.captures(line)?;
    let mut entry = match &caps["size"] {
        "<DIR>" => blank_entry(&caps["name"], FtpEntryKind::Directory),
        bytes => {
            let mut e = blank_entry(&caps["name"], FtpEntryKind::File);
            e.size = bytes.parse().unwrap_or(0);
            e
        }
    };
    entry.modified = parse_dos_date(&caps["date"], &caps["time"]);
    Some(entry)
}

fn parse_dos_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    const LAYOUTS: [&str; 4] = [
        "%m-%d-%y %I:%M%p",
        "%m-%d-%Y %I:%M%p",
        "%m-%d-%y %H:%M",
        "%m-%d-%Y %H:%M",
    ];
    let joined = format!("{} {}", date, time);
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&joined, layout).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
}

// ─── Find records ────────────────────────────────────────────────────

/// Native find record for a listing entry.
pub fn to_find_data(entry: &FtpEntry) -> FindData {
    let mut attributes = match entry.kind {
        FtpEntryKind::Directory => FileAttributes::DIRECTORY,
        FtpEntryKind::Symlink => FileAttributes::REPARSE_POINT,
        FtpEntryKind::File | FtpEntryKind::Unknown => FileAttributes::empty(),
    };
    attributes.set(FileAttributes::HIDDEN, entry.name.starts_with('.'));
    attributes.set(FileAttributes::READONLY, is_read_only(entry));
    if attributes.is_empty() {
        attributes = FileAttributes::NORMAL;
    }

    let file_size = match entry.kind {
        FtpEntryKind::Directory => 0,
        _ => entry.size,
    };

    FindData {
        file_name: entry.name.clone(),
        attributes,
        creation_time: FileTime::from(entry.created),
        last_access_time: FileTime::ZERO,
        last_write_time: FileTime::from(entry.modified),
        file_size,
    }
}

/// A file whose MLSD `perm` fact grants neither `w` nor `a`, or whose
/// `ls -l` mode lacks the owner write bit.
fn is_read_only(entry: &FtpEntry) -> bool {
    match (entry.facts.get("perm"), entry.permissions.as_deref()) {
        (Some(perm), _) => {
            entry.kind == FtpEntryKind::File && !perm.contains(|c: char| c == 'w' || c == 'a')
        }
        (None, Some(mode)) if mode.len() == 10 => mode.as_bytes()[2] == b'-',
        _ => false,
    }
}
