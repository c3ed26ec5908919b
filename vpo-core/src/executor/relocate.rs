//! File relocation: destination templates and atomic moves.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use vpo_model::ParsedFilename;

use crate::error::{CoreError, Result};

/// Renders a destination template using parsed filename metadata.
///
/// Placeholders: `{title}`, `{year}`, `{season}`, `{episode}`,
/// `{season:02}`, `{episode:02}`, `{resolution}`, `{filename}`, `{ext}`.
/// Fields that did not parse render as the fallback string.
pub fn render_destination(
    template: &str,
    parsed: &ParsedFilename,
    source: &Path,
    fallback: &str,
) -> PathBuf {
    let filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let title = if parsed.title.is_empty() {
        fallback.to_string()
    } else {
        parsed.title.clone()
    };

    let rendered = template
        .replace("{title}", &title)
        .replace(
            "{year}",
            &parsed
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| fallback.to_string()),
        )
        .replace(
            "{season:02}",
            &parsed
                .season
                .map(|s| format!("{s:02}"))
                .unwrap_or_else(|| fallback.to_string()),
        )
        .replace(
            "{episode:02}",
            &parsed
                .episode
                .map(|e| format!("{e:02}"))
                .unwrap_or_else(|| fallback.to_string()),
        )
        .replace(
            "{season}",
            &parsed
                .season
                .map(|s| s.to_string())
                .unwrap_or_else(|| fallback.to_string()),
        )
        .replace(
            "{episode}",
            &parsed
                .episode
                .map(|e| e.to_string())
                .unwrap_or_else(|| fallback.to_string()),
        )
        .replace(
            "{resolution}",
            parsed.resolution.as_deref().unwrap_or(fallback),
        )
        .replace("{filename}", filename)
        .replace("{ext}", ext);

    PathBuf::from(rendered)
}

/// Moves a file to its destination: atomic rename on the same filesystem,
/// copy + fsync + unlink across filesystems. Parent directories are
/// created as needed. Refuses to overwrite an existing destination.
pub async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        return Err(CoreError::Internal(format!(
            "destination already exists: {}",
            destination.display()
        )));
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(source, destination).await {
        Ok(()) => {
            info!(from = %source.display(), to = %destination.display(), "moved file");
            Ok(())
        }
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            debug!(
                from = %source.display(),
                to = %destination.display(),
                "cross-filesystem move, falling back to copy"
            );
            tokio::fs::copy(source, destination).await?;
            let file = tokio::fs::File::open(destination).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::remove_file(source).await?;
            info!(from = %source.display(), to = %destination.display(), "moved file (copied)");
            Ok(())
        }
        Err(e) => Err(CoreError::Io(e)),
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    17 // ERROR_NOT_SAME_DEVICE maps differently; treat as marker only
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_renders_parsed_fields() {
        let parsed = ParsedFilename {
            title: "The Matrix".to_string(),
            year: Some(1999),
            resolution: Some("1080p".to_string()),
            ..ParsedFilename::default()
        };
        let destination = render_destination(
            "/library/{title} ({year})/{filename}",
            &parsed,
            Path::new("/downloads/The.Matrix.1999.1080p.mkv"),
            "Unknown",
        );
        assert_eq!(
            destination,
            PathBuf::from("/library/The Matrix (1999)/The.Matrix.1999.1080p.mkv")
        );
    }

    #[test]
    fn missing_fields_render_fallback() {
        let parsed = ParsedFilename::default();
        let destination = render_destination(
            "/library/{title}/{year}/S{season:02}E{episode:02}.{ext}",
            &parsed,
            Path::new("/x/raw.mkv"),
            "Unknown",
        );
        assert_eq!(
            destination,
            PathBuf::from("/library/Unknown/Unknown/SUnknownEUnknown.mkv")
        );
    }

    #[tokio::test]
    async fn move_creates_parents_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mkv");
        std::fs::write(&source, b"bytes").unwrap();
        let destination = dir.path().join("nested/dir/b.mkv");

        move_file(&source, &destination).await.unwrap();
        assert!(!source.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn move_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mkv");
        let destination = dir.path().join("b.mkv");
        std::fs::write(&source, b"new").unwrap();
        std::fs::write(&destination, b"existing").unwrap();

        assert!(move_file(&source, &destination).await.is_err());
        assert_eq!(std::fs::read(&destination).unwrap(), b"existing");
    }
}
