use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};

/// Largest image we inline into a chat request
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// An image read from disk and held as a data URL until the message is sent
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub path: PathBuf,
    pub mime: String,
    pub size: usize,
    data_url: String,
}

impl ImageAttachment {
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self> {
        let path = path.into();
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(anyhow!(
                "{} is not an image ({})",
                path.display(),
                mime.essence_str()
            ));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(anyhow!(
                "{} is too large ({} bytes, limit {})",
                path.display(),
                bytes.len(),
                MAX_IMAGE_BYTES
            ));
        }

        let data_url = format!(
            "data:{};base64,{}",
            mime.essence_str(),
            general_purpose::STANDARD.encode(bytes)
        );

        Ok(Self {
            mime: mime.essence_str().to_string(),
            size: bytes.len(),
            path,
            data_url,
        })
    }

    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_home(path.as_ref());
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_bytes(path, &bytes)
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// One-line preview for the input area
    pub fn preview(&self) -> String {
        format!("{} ({}, {})", self.file_name(), self.mime, human_size(self.size))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    path.to_path_buf()
}

fn human_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_becomes_data_url() {
        let attachment = ImageAttachment::from_bytes("shot.png", &[0x89, b'P', b'N', b'G']).unwrap();
        assert_eq!(attachment.mime, "image/png");
        assert_eq!(attachment.data_url(), "data:image/png;base64,iVBORw==");
        assert_eq!(attachment.preview(), "shot.png (image/png, 4 B)");
    }

    #[test]
    fn non_image_is_rejected() {
        let err = ImageAttachment::from_bytes("notes.txt", b"hello").unwrap_err();
        assert!(err.to_string().contains("not an image"));
    }

    #[test]
    fn oversized_image_is_rejected() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
        assert!(ImageAttachment::from_bytes("big.jpg", &bytes).is_err());
    }

    #[tokio::test]
    async fn reads_image_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagram.jpeg");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let attachment = ImageAttachment::read(&path).await.unwrap();
        assert_eq!(attachment.mime, "image/jpeg");
        assert_eq!(attachment.size, 3);
        assert_eq!(attachment.file_name(), "diagram.jpeg");
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }
}
