//! LIST response helpers.
//!
//! The engine hands raw LIST lines to its collaborator untouched
//! ([`split_listing`]). [`parse_list_line`] is offered on top for callers
//! that want structure out of the common Unix `ls -l` format:
//!
//! ```text
//! drwxr-xr-x   2 user group  4096 Jan  1 12:00 dirname
//! -rw-r--r--   1 user group  1234 Jan  1  2025 file.txt
//! lrwxrwxrwx   1 user group    42 Jan  1 12:00 link -> target
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref UNIX_LINE: Regex = Regex::new(
        r"(?x)
        ^([dlcbps-][rwxsStT-]{9})[+@.]?\s+  # permissions
        ([0-9]+)\s+                          # link count
        (\S+)\s+                             # owner
        (\S+)\s+                             # group
        ([0-9]+)\s+                          # size
        (\S+\s+[0-9]{1,2}\s+[0-9:]+)\s+      # date
        (.+)$                                # name (possibly with -> target)
        ",
    )
    .unwrap();
}

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FtpEntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One entry parsed from a Unix-style LIST line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FtpEntry {
    pub name: String,
    pub kind: FtpEntryKind,
    pub size: u64,
    /// Permission bits without the type character, e.g. `rwxr-xr-x`.
    pub permissions: String,
    pub owner: String,
    pub group: String,
    /// Date column as sent, whitespace-normalised (`Jan 1 12:00`).
    pub modified: String,
    pub link_target: Option<String>,
}

/// Split a LIST body into lines. The element after the final CRLF is
/// dropped when empty; invalid UTF-8 is replaced.
pub fn split_listing(raw: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    let mut lines: Vec<String> = text.split("\r\n").map(str::to_string).collect();
    if lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Parse one `ls -l` line. Returns `None` for lines in other formats
/// (totals, Windows/IIS listings, ...).
pub fn parse_list_line(line: &str) -> Option<FtpEntry> {
    let caps = UNIX_LINE.captures(line.trim_end())?;

    let perms = caps.get(1)?.as_str();
    let kind = match perms.as_bytes().first() {
        Some(b'd') => FtpEntryKind::Directory,
        Some(b'l') => FtpEntryKind::Symlink,
        Some(b'-') => FtpEntryKind::File,
        _ => FtpEntryKind::Other,
    };

    let name_raw = caps.get(7)?.as_str();
    let (name, link_target) = match (kind, name_raw.find(" -> ")) {
        (FtpEntryKind::Symlink, Some(pos)) => (
            name_raw[..pos].to_string(),
            Some(name_raw[pos + 4..].to_string()),
        ),
        _ => (name_raw.to_string(), None),
    };

    Some(FtpEntry {
        name,
        kind,
        size: caps.get(5)?.as_str().parse().ok()?,
        permissions: perms[1..].to_string(),
        owner: caps.get(3)?.as_str().to_string(),
        group: caps.get(4)?.as_str().to_string(),
        modified: caps
            .get(6)?
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
        link_target,
    })
}

/// Parse every line that looks like `ls -l` output, skipping `.` and `..`.
pub fn parse_listing(lines: &[String]) -> Vec<FtpEntry> {
    lines
        .iter()
        .filter_map(|l| parse_list_line(l))
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drops_trailing_terminator_only() {
        assert_eq!(split_listing(b"a\r\nb\r\n"), vec!["a", "b"]);
        assert_eq!(split_listing(b"a\r\nb"), vec!["a", "b"]);
        assert!(split_listing(b"").is_empty());
        assert_eq!(split_listing(b"a\r\n\r\n"), vec!["a", ""]);
    }

    #[test]
    fn split_tolerates_bad_utf8() {
        let lines = split_listing(b"caf\xe9.txt\r\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("caf"));
    }

    #[test]
    fn unix_file() {
        let e = parse_list_line("-rw-r--r--   1 user group  1234 Jan  1 12:00 readme.txt").unwrap();
        assert_eq!(e.name, "readme.txt");
        assert_eq!(e.kind, FtpEntryKind::File);
        assert_eq!(e.size, 1234);
        assert_eq!(e.permissions, "rw-r--r--");
        assert_eq!(e.owner, "user");
        assert_eq!(e.modified, "Jan 1 12:00");
    }

    #[test]
    fn unix_dir_with_spaces_in_name() {
        let e = parse_list_line("drwxr-xr-x   2 root root  4096 Mar  1  2024 My Documents").unwrap();
        assert_eq!(e.kind, FtpEntryKind::Directory);
        assert_eq!(e.name, "My Documents");
        assert_eq!(e.modified, "Mar 1 2024");
    }

    #[test]
    fn unix_symlink() {
        let e = parse_list_line("lrwxrwxrwx   1 root root    22 Jan  5 08:00 link -> /var/target").unwrap();
        assert_eq!(e.kind, FtpEntryKind::Symlink);
        assert_eq!(e.name, "link");
        assert_eq!(e.link_target.as_deref(), Some("/var/target"));
    }

    #[test]
    fn foreign_lines_are_skipped() {
        assert!(parse_list_line("total 12").is_none());
        assert!(parse_list_line("01-01-26  12:00AM      <DIR> My Documents").is_none());
        let lines = vec![
            "total 8".to_string(),
            "drwxr-xr-x 2 u g 4096 Jan 1 12:00 .".to_string(),
            "-rw-r--r-- 1 u g 10 Jan 1 12:00 a.txt".to_string(),
        ];
        let entries = parse_listing(&lines);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }
}
