use crate::error::FileOpError;
use crate::path::{directory_prefix, join_remote};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Serialize, Serializer};

const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirRecord {
    pub filename: String,
    pub longname: String,
    pub size: Option<u64>,
    pub mtime: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionSummary {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub owner: String,
    pub group: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoteFileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    #[serde(serialize_with = "iso_millis")]
    pub modified: Option<DateTime<Utc>>,
    pub path: String,
    pub permissions: PermissionSummary,
}

pub fn normalize_listing(
    parent: &str,
    records: Vec<DirRecord>,
) -> Result<Vec<RemoteFileEntry>, FileOpError> {
    let parent = directory_prefix(parent);
    records
        .into_iter()
        .filter(|r| r.filename != "." && r.filename != "..")
        .map(|r| normalize_entry(&parent, r))
        .collect()
}

pub fn normalize_entry(parent: &str, record: DirRecord) -> Result<RemoteFileEntry, FileOpError> {
    if record.filename.is_empty() || record.filename.contains('/') {
        return Err(FileOpError::MalformedResponse(format!(
            "unusable file name {:?} in {}",
            record.filename, parent
        )));
    }
    if record.longname.is_empty() {
        return Err(FileOpError::MalformedResponse(format!(
            "{:?} in {} has no long-format attributes",
            record.filename, parent
        )));
    }

    let flags = record.longname.as_bytes();
    let flag_at = |idx: usize, expected: u8| flags.get(idx) == Some(&expected);
    let kind = if flag_at(0, b'd') {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    let mut tokens = record.longname.split_whitespace().skip(2);
    let owner_token = tokens.next();
    let group_token = tokens.next();
    let owner = record
        .user
        .or_else(|| owner_token.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let group = record
        .group
        .or_else(|| group_token.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let permissions = PermissionSummary {
        read: flag_at(1, b'r'),
        write: flag_at(2, b'w'),
        execute: flag_at(3, b'x'),
        owner,
        group,
    };

    let size = match kind {
        EntryKind::Directory => 0,
        EntryKind::File => record.size.unwrap_or(0),
    };

    Ok(RemoteFileEntry {
        path: join_remote(parent, &record.filename),
        name: record.filename,
        kind,
        size,
        modified: record
            .mtime
            .and_then(|secs| Utc.timestamp_opt(i64::from(secs), 0).single()),
        permissions,
    })
}

fn iso_millis<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(ts) => s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(filename: &str, longname: &str) -> DirRecord {
        DirRecord {
            filename: filename.to_string(),
            longname: longname.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn wp_content_directory() {
        let raw = DirRecord {
            mtime: Some(1_700_000_000),
            ..record("wp-content", "drwxr-xr-x 2 www-data www-data")
        };
        let entry = normalize_entry("/var/www/html/", raw).unwrap();
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "name": "wp-content",
                "type": "directory",
                "size": 0,
                "modified": "2023-11-14T22:13:20.000Z",
                "path": "/var/www/html/wp-content",
                "permissions": {
                    "read": true,
                    "write": true,
                    "execute": true,
                    "owner": "www-data",
                    "group": "www-data"
                }
            })
        );
    }

    #[test]
    fn directory_size_is_zero_even_when_reported() {
        let raw = DirRecord {
            size: Some(4096),
            ..record("uploads", "drwxr-xr-x 2 www-data www-data 4096 Nov 14 22:13 uploads")
        };
        let entry = normalize_entry("/var/www/html/wp-content", raw).unwrap();
        assert_eq!(entry.kind, EntryKind::Directory);
        assert_eq!(entry.size, 0);
    }

    #[test]
    fn openssh_long_format_with_padding() {
        let raw = DirRecord {
            size: Some(4211),
            mtime: Some(1_700_000_000),
            ..record(
                "index.php",
                "-r--r-----    1 deploy   webteam      4211 Nov 14 22:13 index.php",
            )
        };
        let entry = normalize_entry("/var/www/html", raw).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 4211);
        assert_eq!(entry.path, "/var/www/html/index.php");
        assert!(entry.permissions.read);
        assert!(!entry.permissions.write);
        assert!(!entry.permissions.execute);
        assert_eq!(entry.permissions.owner, "deploy");
        assert_eq!(entry.permissions.group, "webteam");
    }

    #[test]
    fn short_long_format_degrades_to_unknown() {
        for longname in ["drwx", "-rw-r--r-- 1", "lrwxrwxrwx 1 root"] {
            let entry = normalize_entry("/etc", record("x", longname)).unwrap();
            assert_eq!(entry.permissions.group, "unknown", "{}", longname);
        }
        let entry = normalize_entry("/etc", record("x", "-rw-r--r-- 1")).unwrap();
        assert_eq!(entry.permissions.owner, "unknown");
        let entry = normalize_entry("/etc", record("x", "lrwxrwxrwx 1 root")).unwrap();
        assert_eq!(entry.permissions.owner, "root");
        assert_eq!(entry.kind, EntryKind::File);
    }

    #[test]
    fn structured_names_take_precedence() {
        let raw = DirRecord {
            user: Some("alice".into()),
            group: Some("staff".into()),
            ..record("notes", "-rw-r--r-- 1 1000 50 10 Jan 1 00:00 notes")
        };
        let entry = normalize_entry("/home/alice", raw).unwrap();
        assert_eq!(entry.permissions.owner, "alice");
        assert_eq!(entry.permissions.group, "staff");
    }

    #[test]
    fn kind_follows_first_flag_only() {
        let listing = normalize_listing(
            "/srv",
            vec![
                record("a", "drwxr-xr-x 2 u g"),
                record("b", "-rwxr-xr-x 1 u g"),
                record("c", "lrwxrwxrwx 1 u g"),
                record("d", "Drwxr-xr-x 1 u g"),
            ],
        )
        .unwrap();
        let kinds: Vec<_> = listing.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntryKind::Directory,
                EntryKind::File,
                EntryKind::File,
                EntryKind::File
            ]
        );
        for entry in &listing {
            assert_eq!(entry.path, format!("/srv/{}", entry.name));
        }
    }

    #[test]
    fn dot_entries_dropped_order_kept() {
        let listing = normalize_listing(
            "/srv/",
            vec![
                record(".", "drwxr-xr-x 2 u g"),
                record("zeta", "-rw-r--r-- 1 u g"),
                record("..", "drwxr-xr-x 9 u g"),
                record("alpha", "-rw-r--r-- 1 u g"),
            ],
        )
        .unwrap();
        let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn missing_mtime_serializes_null() {
        let entry = normalize_entry("/", record("boot", "drwxr-xr-x 3 root root")).unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["modified"], serde_json::Value::Null);
        assert_eq!(value["path"], "/boot");
    }

    #[test]
    fn unparseable_records_fail_the_listing() {
        let err = normalize_listing(
            "/srv",
            vec![record("ok", "-rw-r--r-- 1 u g"), record("", "-rw-r--r-- 1 u g")],
        )
        .unwrap_err();
        assert!(matches!(err, FileOpError::MalformedResponse(_)));
        assert!(normalize_entry("/srv", record("a/b", "-rw-r--r-- 1 u g")).is_err());
        assert!(normalize_entry("/srv", record("plain", "")).is_err());
    }
}
