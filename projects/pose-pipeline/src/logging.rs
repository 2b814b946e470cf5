use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Initialize tracing to stdout and to `<log_dir>/app.log`.
pub fn init(log_dir: &Path) -> Result<()> {
    let file = open_log_file(log_dir)?;

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .init();

    Ok(())
}

/// Creates `dir` if needed and opens `app.log` inside it for appending.
fn open_log_file(dir: &Path) -> Result<File> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;
    let path = dir.join("app.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_is_created_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("log");

        writeln!(open_log_file(&log_dir).unwrap(), "first").unwrap();
        writeln!(open_log_file(&log_dir).unwrap(), "second").unwrap();

        let contents = std::fs::read_to_string(log_dir.join("app.log")).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}
