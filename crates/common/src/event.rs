//! Change notifications emitted by the remote store.
//!
//! A [`NotificationBatch`] groups the files touched by a single upstream
//! operation. Each file becomes a [`ChangeEvent`] carrying the batch action
//! and a snapshot of the file's metadata. Events are handed to the pipeline
//! by shared reference only; nothing downstream mutates them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to a file upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Download,
    Upload,
    Write,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Download,
        Action::Upload,
        Action::Write,
        Action::Delete,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Download => write!(f, "DOWNLOAD"),
            Action::Upload => write!(f, "UPLOAD"),
            Action::Write => write!(f, "WRITE"),
            Action::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    File,
    Directory,
}

/// Metadata snapshot of a single file as reported by the remote store.
///
/// Times are milliseconds since the Unix epoch. `permissions` is stored the
/// way the store reports it: a decimal integer whose digits are octal mode
/// digits (see [`FileInfo::octal_mode`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileInfo {
    /// Store-relative path; identity of the file
    pub file_path: String,
    pub file_name: String,
    pub file_type: FileType,
    pub size: i64,
    pub atime: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub permissions: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub symlink: bool,
    pub symlink_path: Option<String>,

    // Reporting only
    pub hidden: bool,
    pub execute: bool,
    pub read: bool,
    pub write: bool,
    pub file_guid: Option<String>,
    pub map_guid: Option<String>,
    pub id: Option<String>,
    pub hash_code: i64,
    pub importing: bool,
    pub open: bool,
}

impl FileInfo {
    /// A regular file at `path` with every other field zeroed.
    pub fn at(path: impl Into<String>) -> Self {
        let file_path = path.into();
        let file_name = file_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string();
        Self {
            file_path,
            file_name,
            ..Default::default()
        }
    }

    /// Reinterpret the stored permission value as octal digits.
    ///
    /// A stored `644` yields mode `0o644`. Returns `None` when the value is
    /// not positive or contains a digit that is not octal.
    pub fn octal_mode(&self) -> Option<u32> {
        if self.permissions <= 0 {
            return None;
        }
        u32::from_str_radix(&self.permissions.to_string(), 8)
            .ok()
            .filter(|mode| *mode > 0)
    }
}

/// One notification about a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub action: Action,
    pub file: FileInfo,
}

impl ChangeEvent {
    pub fn new(action: Action, file: FileInfo) -> Self {
        Self { action, file }
    }

    pub fn path(&self) -> &str {
        &self.file.file_path
    }
}

/// A non-empty, ordered group of events sharing one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBatch {
    action: Action,
    events: Vec<ChangeEvent>,
}

impl NotificationBatch {
    /// Build a batch, stamping every file with `action`.
    ///
    /// Returns `None` for an empty file list: an empty batch is the
    /// end-of-stream sentinel, not a batch.
    pub fn new(action: Action, files: Vec<FileInfo>) -> Option<Self> {
        if files.is_empty() {
            return None;
        }
        let events = files
            .into_iter()
            .map(|file| ChangeEvent::new(action, file))
            .collect();
        Some(Self { action, events })
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_permissions(permissions: i64) -> FileInfo {
        FileInfo {
            permissions,
            ..FileInfo::at("a/b.txt")
        }
    }

    #[test]
    fn test_octal_mode_reads_decimal_digits_as_octal() {
        assert_eq!(with_permissions(644).octal_mode(), Some(0o644));
        assert_eq!(with_permissions(755).octal_mode(), Some(0o755));
        assert_eq!(with_permissions(4755).octal_mode(), Some(0o4755));
        assert_eq!(with_permissions(7).octal_mode(), Some(0o7));
    }

    #[test]
    fn test_octal_mode_rejects_non_positive_and_non_octal() {
        assert_eq!(with_permissions(0).octal_mode(), None);
        assert_eq!(with_permissions(-644).octal_mode(), None);
        assert_eq!(with_permissions(689).octal_mode(), None);
        assert_eq!(with_permissions(18).octal_mode(), None);
    }

    #[test]
    fn test_file_name_from_path() {
        assert_eq!(FileInfo::at("docs/readme.txt").file_name, "readme.txt");
        assert_eq!(FileInfo::at("/top").file_name, "top");
        assert_eq!(FileInfo::at("dir/").file_name, "dir");
        assert_eq!(FileInfo::at("").file_name, "");
    }

    #[test]
    fn test_batch_stamps_action() {
        let batch = NotificationBatch::new(
            Action::Write,
            vec![FileInfo::at("a"), FileInfo::at("b")],
        )
        .unwrap();

        assert_eq!(batch.action(), Action::Write);
        assert_eq!(batch.events().len(), 2);
        assert!(batch.events().iter().all(|e| e.action == Action::Write));
        assert_eq!(batch.events()[0].path(), "a");
        assert_eq!(batch.events()[1].path(), "b");
    }

    #[test]
    fn test_empty_batch_is_sentinel() {
        assert!(NotificationBatch::new(Action::Upload, Vec::new()).is_none());
    }

    #[test]
    fn test_file_info_wire_format() {
        let json = r#"{"filePath":"docs/a.txt","size":12,"permissions":644,"userId":1000,"groupId":1000,"fileType":"file"}"#;
        let info: FileInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.file_path, "docs/a.txt");
        assert_eq!(info.size, 12);
        assert_eq!(info.user_id, 1000);
        assert_eq!(info.octal_mode(), Some(0o644));
        assert!(!info.symlink);

        let action: Action = serde_json::from_str(r#""DELETE""#).unwrap();
        assert_eq!(action, Action::Delete);
        assert_eq!(action.to_string(), "DELETE");
    }
}
