//! Human-readable dump of change events, for `--debug` runs.

use std::io::Write;

use chrono::DateTime;
use comfy_table::{presets, Table};
use parking_lot::Mutex;

use crate::event::{ChangeEvent, FileType};

/// Render one event as a two-column table.
pub fn render(event: &ChangeEvent) -> String {
    let f = &event.file;
    let mut table = Table::new();
    table.load_preset(presets::ASCII_FULL);
    table.set_header(vec!["File Name", f.file_name.as_str()]);

    let mut row = |label: &str, value: String| {
        table.add_row(vec![label.to_string(), value]);
    };

    row("Size", f.size.to_string());
    if f.file_type == FileType::File {
        row("File GUID", f.file_guid.clone().unwrap_or_default());
        row("Map GUID", f.map_guid.clone().unwrap_or_default());
    }
    row("File Path", f.file_path.clone());
    row("Access Time", timestamp(f.atime));
    row("Create Time", timestamp(f.ctime));
    row("Modified Time", timestamp(f.mtime));
    row("Execute", f.execute.to_string());
    row("Read", f.read.to_string());
    row("Write", f.write.to_string());
    row("Hidden", f.hidden.to_string());
    row("Hash Code", f.hash_code.to_string());
    if f.file_type == FileType::File {
        row("ID", f.id.clone().unwrap_or_default());
        row("Importing", f.importing.to_string());
    }
    row("Unix Permissions", f.permissions.to_string());
    row("Group ID", f.group_id.to_string());
    row("User ID", f.user_id.to_string());
    if f.file_type == FileType::File {
        row("File Open", f.open.to_string());
    }
    row("Symlink", f.symlink.to_string());
    row("Symlink Path", f.symlink_path.clone().unwrap_or_default());
    row("File Type", format!("{:?}", f.file_type));
    row("Event Type", event.action.to_string());

    table.to_string()
}

fn timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

/// Writes rendered events to an output stream.
pub struct EventReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl EventReporter {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn report(&self, event: &ChangeEvent) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", render(event)) {
            tracing::warn!(error = %e, "failed to write event report");
        }
    }
}

impl std::fmt::Debug for EventReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::{Action, FileInfo};

    #[test]
    fn test_render_file() {
        let event = ChangeEvent::new(
            Action::Write,
            FileInfo {
                size: 42,
                permissions: 644,
                mtime: 0,
                file_guid: Some("guid-1".into()),
                ..FileInfo::at("docs/readme.txt")
            },
        );
        let out = render(&event);

        assert!(out.contains("readme.txt"));
        assert!(out.contains("docs/readme.txt"));
        assert!(out.contains("42"));
        assert!(out.contains("644"));
        assert!(out.contains("guid-1"));
        assert!(out.contains("1970-01-01T00:00:00+00:00"));
        assert!(out.contains("WRITE"));
    }

    #[test]
    fn test_render_directory_omits_file_only_rows() {
        let event = ChangeEvent::new(
            Action::Upload,
            FileInfo {
                file_type: FileType::Directory,
                ..FileInfo::at("photos")
            },
        );
        let out = render(&event);

        assert!(!out.contains("File GUID"));
        assert!(!out.contains("Importing"));
        assert!(out.contains("Directory"));
        assert!(out.contains("UPLOAD"));
    }
}
