use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

/// UTC timestamp embedded in archive file names.
pub(crate) fn archive_timestamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// Moves a staged file into the archive directory under `file_name`.
/// Rename fails across filesystems, so a copy + remove fallback covers
/// archive directories mounted on separate volumes.
pub(crate) fn archive_staged_file(
    staged: &Path,
    archive_dir: &Path,
    file_name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(archive_dir)
        .with_context(|| format!("failed to create archive dir {}", archive_dir.display()))?;
    let target = archive_dir.join(file_name);
    if std::fs::rename(staged, &target).is_err() {
        std::fs::copy(staged, &target).with_context(|| {
            format!(
                "failed to archive {} as {}",
                staged.display(),
                target.display()
            )
        })?;
        std::fs::remove_file(staged)
            .with_context(|| format!("failed to remove staged file {}", staged.display()))?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDateTime;

    #[test]
    fn unit_archive_timestamp_is_compact_utc() {
        let stamp = archive_timestamp();
        assert_eq!(stamp.len(), 16);
        NaiveDateTime::parse_from_str(&stamp, "%Y%m%dT%H%M%SZ").expect("round-trip");
    }

    #[test]
    fn functional_archive_moves_staged_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let staged = temp.path().join("summary.json");
        std::fs::write(&staged, b"{\"kind\":\"summary\"}").expect("stage");
        let archive_dir = temp.path().join("archive");

        let target = archive_staged_file(&staged, &archive_dir, "ew1665147160_x.json")
            .expect("archive");

        assert_eq!(target, archive_dir.join("ew1665147160_x.json"));
        assert!(!staged.exists());
        let archived = std::fs::read_to_string(&target).expect("read archived");
        assert_eq!(archived, "{\"kind\":\"summary\"}");
    }

    #[test]
    fn functional_archive_reports_missing_staged_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let staged = temp.path().join("never-staged.json");
        let error = archive_staged_file(&staged, temp.path(), "gone.json")
            .expect_err("missing staged file");
        assert!(error.to_string().contains("never-staged.json"));
    }
}
