use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// A configuration snapshot written to disk
#[derive(Debug, Clone)]
pub struct SavedBackup {
    pub file_path: String,
    pub file_size: i64,
}

/// On-disk archive of OLT configuration snapshots under `<backup_dir>/olt`
#[derive(Debug, Clone)]
pub struct BackupArchive {
    root: PathBuf,
}

impl BackupArchive {
    pub fn new(backup_dir: &str) -> Self {
        Self {
            root: Path::new(backup_dir).join("olt"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a snapshot as `{name}_{YYYYmmdd_HHMMSS}.cfg`
    pub async fn save(&self, device_name: &str, config: &str) -> Result<SavedBackup> {
        // Ensure backup directory exists
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.cfg", safe_name(device_name), timestamp);
        let file_path = self.root.join(&filename);

        tokio::fs::write(&file_path, config)
            .await
            .with_context(|| format!("Failed to write {}", file_path.display()))?;

        Ok(SavedBackup {
            file_path: file_path.to_string_lossy().into_owned(),
            file_size: config.len() as i64,
        })
    }

    /// Read a stored snapshot; None when the file is gone
    pub async fn read(&self, file_path: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(file_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", file_path)),
        }
    }

    pub async fn exists(&self, file_path: &str) -> bool {
        tokio::fs::metadata(file_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}

/// Device names become file name stems
fn safe_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "olt".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("OLT Core/1"), "OLT_Core_1");
        assert_eq!(safe_name("  "), "olt");
        assert_eq!(safe_name("edge-2.pop"), "edge-2.pop");
    }

    #[tokio::test]
    async fn test_save_read_exists() {
        let dir = tempfile::tempdir().unwrap();
        let archive = BackupArchive::new(dir.path().to_str().unwrap());

        let saved = archive.save("olt-a", "sysname olt-a\n").await.unwrap();
        assert_eq!(saved.file_size, 14);
        assert!(saved.file_path.contains("olt-a_"));
        assert!(saved.file_path.ends_with(".cfg"));
        assert!(Path::new(&saved.file_path).starts_with(archive.root()));
        assert!(archive.exists(&saved.file_path).await);

        let bytes = archive.read(&saved.file_path).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(b"sysname olt-a\n".as_slice()));

        tokio::fs::remove_file(&saved.file_path).await.unwrap();
        assert!(!archive.exists(&saved.file_path).await);
        assert!(archive.read(&saved.file_path).await.unwrap().is_none());
    }
}
