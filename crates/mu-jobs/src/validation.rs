//! Upload file checks

use std::path::Path;

use mu_core::{UnmixResult, ValidationError, ValidationKind, bytes_to_mb};

pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["wav", "mp3"];
pub const ACCEPTED_MIME: [&str; 4] = ["audio/wav", "audio/x-wav", "audio/mpeg", "audio/mp3"];

/// A file picked for upload
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(file_name: impl Into<String>, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime,
            bytes,
        }
    }

    /// Read from disk; the MIME type is inferred from the extension.
    pub async fn read(path: &Path) -> UnmixResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime_for(&file_name).map(str::to_string);
        Ok(Self::new(file_name, mime, bytes))
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes())
    }
}

pub fn mime_for(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".wav") {
        Some("audio/wav")
    } else if lower.ends_with(".mp3") {
        Some("audio/mpeg")
    } else {
        None
    }
}

/// An upload needs a file
pub fn require_selection(file: Option<SelectedFile>) -> Result<SelectedFile, ValidationError> {
    file.ok_or_else(|| ValidationError::new(ValidationKind::Empty, "No file selected."))
}

/// Type (extension or MIME may vouch for it), then size.
pub fn validate_audio_file(file: &SelectedFile, max_bytes: u64) -> Result<(), ValidationError> {
    let lower = file.file_name.to_ascii_lowercase();
    let ext_ok = ACCEPTED_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")));
    let mime_ok = file
        .mime
        .as_deref()
        .map(|mime| ACCEPTED_MIME.contains(&mime.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    if !ext_ok && !mime_ok {
        return Err(ValidationError::new(
            ValidationKind::Type,
            "Only WAV and MP3 files are accepted.",
        ));
    }

    if file.size_bytes() > max_bytes {
        return Err(ValidationError::new(
            ValidationKind::Size,
            format!("The size limit is {} MB.", max_bytes / (1024 * 1024)),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 50 * 1024 * 1024;

    fn file(name: &str, mime: Option<&str>, len: usize) -> SelectedFile {
        SelectedFile::new(name, mime.map(str::to_string), vec![0; len])
    }

    fn kind(result: Result<(), ValidationError>) -> Option<ValidationKind> {
        result.err().map(|e| e.kind)
    }

    #[test]
    fn test_empty_selection() {
        assert_eq!(require_selection(None).unwrap_err().kind, ValidationKind::Empty);
    }

    #[test]
    fn test_type_by_extension_or_mime() {
        assert!(validate_audio_file(&file("a.WAV", None, 10), LIMIT).is_ok());
        assert!(validate_audio_file(&file("a.bin", Some("audio/mpeg"), 10), LIMIT).is_ok());
        assert_eq!(
            kind(validate_audio_file(&file("a.flac", Some("audio/flac"), 10), LIMIT)),
            Some(ValidationKind::Type)
        );
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let exact = SelectedFile::new("a.mp3", None, vec![0; 1024]);
        assert!(validate_audio_file(&exact, 1024).is_ok());

        let over = SelectedFile::new("a.mp3", None, vec![0; 1025]);
        assert_eq!(kind(validate_audio_file(&over, 1024)), Some(ValidationKind::Size));
    }

    #[tokio::test]
    async fn test_read_infers_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Take 1.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        let selected = SelectedFile::read(&path).await.unwrap();

        assert_eq!(selected.file_name, "Take 1.mp3");
        assert_eq!(selected.mime.as_deref(), Some("audio/mpeg"));
        assert_eq!(selected.size_bytes(), 3);
    }
}
