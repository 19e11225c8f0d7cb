//! File-backed sink for the teardown fallback write

use modux_core::{StrategyError, StrategyOperation, StrategyResult, UnloadSink};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SINK_NAME: &str = "file";

/// Writes each fallback blob to its own file under a directory
#[derive(Debug, Clone)]
pub struct FileUnloadSink {
    dir: PathBuf,
}

impl FileUnloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.blob", name))
    }
}

fn sink_error(operation: StrategyOperation, path: &Path, cause: std::io::Error) -> StrategyError {
    StrategyError::new(SINK_NAME, operation, format!("{}: {}", path.display(), cause))
}

impl UnloadSink for FileUnloadSink {
    fn write(&self, key: &str, value: &str) -> StrategyResult<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| sink_error(StrategyOperation::Save, &self.dir, e))?;
        let target = self.file_for(key);
        // staged write; the rename replaces the blob in one step
        let staging = target.with_extension("tmp");
        fs::write(&staging, value).map_err(|e| sink_error(StrategyOperation::Save, &staging, e))?;
        fs::rename(&staging, &target).map_err(|e| sink_error(StrategyOperation::Save, &target, e))
    }

    fn read(&self, key: &str) -> StrategyResult<Option<String>> {
        let path = self.file_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(sink_error(StrategyOperation::Load, &path, e)),
        }
    }

    fn remove(&self, key: &str) -> StrategyResult<()> {
        let path = self.file_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(sink_error(StrategyOperation::Remove, &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_round_trip() {
        let tmp = TempDir::new().unwrap();
        let sink = FileUnloadSink::new(tmp.path().join("unload"));

        assert_eq!(sink.read("modux:__unload").unwrap(), None);
        sink.write("modux:__unload", "blob").unwrap();
        assert_eq!(sink.read("modux:__unload").unwrap(), Some("blob".to_string()));
        assert!(sink.dir().join("modux___unload.blob").exists());

        sink.remove("modux:__unload").unwrap();
        sink.remove("modux:__unload").unwrap();
        assert_eq!(sink.read("modux:__unload").unwrap(), None);
    }

    #[test]
    fn test_write_failure_names_sink_and_operation() {
        let tmp = TempDir::new().unwrap();
        // a regular file where the sink directory should be
        let blocked = tmp.path().join("unload");
        fs::write(&blocked, "not a directory").unwrap();
        let sink = FileUnloadSink::new(blocked.clone());

        let err = sink.write("modux:__unload", "blob").unwrap_err();
        assert_eq!(err.strategy, "file");
        assert_eq!(err.operation, StrategyOperation::Save);
        assert!(err.message.contains("unload"));
    }
}
