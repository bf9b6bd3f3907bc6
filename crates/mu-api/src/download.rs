//! Stem download naming and saving

use std::path::{Path, PathBuf};

use mu_core::{ApiResponse, Stem, UnmixResult};
use percent_encoding::percent_decode_str;

/// Downloaded stem (or archive) held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct StemDownload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl StemDownload {
    pub fn from_response(response: ApiResponse, title: &str, stem: Stem) -> Self {
        let content_type = response.header("content-type").map(str::to_string);
        let file_name = response
            .header("content-disposition")
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| fallback_filename(title, stem, content_type.as_deref()));

        Self {
            file_name,
            content_type,
            bytes: response.body,
        }
    }

    /// Write into `dir` under the resolved name
    pub async fn save_to(&self, dir: &Path) -> UnmixResult<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes).await?;
        log::info!("[Http] Saved {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Pull a file name out of a `Content-Disposition` value.
///
/// `filename*=UTF-8''...` wins over `filename=...`. Only the final path
/// component survives, so a hostile header cannot escape the target directory.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = match value.find("''") {
                    Some(idx) => &value[idx + 2..],
                    None => value,
                };
                extended = Some(encoded.to_string());
            }
            "filename" => plain = Some(value.to_string()),
            _ => {}
        }
    }

    extended
        .or(plain)
        .map(|raw| percent_decode_str(&raw).decode_utf8_lossy().into_owned())
        .and_then(|name| sanitize_filename(&name))
}

/// `<title with whitespace as underscores>-<stem>.<zip|wav>`
pub fn fallback_filename(title: &str, stem: Stem, content_type: Option<&str>) -> String {
    let base = title.split_whitespace().collect::<Vec<_>>().join("_");
    let base = sanitize_filename(&base).unwrap_or_else(|| "audio".to_string());

    let is_zip = stem.is_archive()
        || content_type
            .map(|ct| ct.to_ascii_lowercase().contains("zip"))
            .unwrap_or(false);
    let ext = if is_zip { "zip" } else { "wav" };

    format!("{}-{}.{}", base, stem.as_str(), ext)
}

fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_filename_is_decoded() {
        let header = "attachment; filename=\"fallback.zip\"; filename*=UTF-8''Canci%C3%B3n%20uno-stems.zip";
        assert_eq!(
            filename_from_disposition(header).as_deref(),
            Some("Canción uno-stems.zip")
        );
    }

    #[test]
    fn test_plain_filename() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"song-vocals.wav\"").as_deref(),
            Some("song-vocals.wav")
        );
        assert_eq!(
            filename_from_disposition("attachment; FILENAME=song.wav").as_deref(),
            Some("song.wav")
        );
        assert_eq!(filename_from_disposition("attachment"), None);
    }

    #[test]
    fn test_path_components_are_dropped() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"../../etc/passwd\"").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            filename_from_disposition("attachment; filename*=UTF-8''..%2F..%2Fevil.wav").as_deref(),
            Some("evil.wav")
        );
        assert_eq!(filename_from_disposition("attachment; filename=\"..\""), None);
    }

    #[test]
    fn test_fallback_names() {
        assert_eq!(
            fallback_filename("My  Song", Stem::Vocals, Some("audio/wav")),
            "My_Song-vocals.wav"
        );
        assert_eq!(fallback_filename("My Song", Stem::All, None), "My_Song-all.zip");
        assert_eq!(
            fallback_filename("", Stem::Drums, Some("application/zip")),
            "audio-drums.zip"
        );
    }

    #[test]
    fn test_from_response_prefers_header() {
        let response = ApiResponse::new(200, vec![1, 2, 3])
            .with_header("Content-Type", "audio/wav")
            .with_header("Content-Disposition", "attachment; filename=\"x-bass.wav\"");
        let download = StemDownload::from_response(response, "ignored", Stem::Bass);

        assert_eq!(download.file_name, "x-bass.wav");
        assert_eq!(download.content_type.as_deref(), Some("audio/wav"));
        assert_eq!(download.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_save_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let download = StemDownload {
            file_name: "song-other.wav".into(),
            content_type: None,
            bytes: b"RIFF".to_vec(),
        };

        let path = download.save_to(&dir.path().join("stems")).await.unwrap();

        assert_eq!(path, dir.path().join("stems").join("song-other.wav"));
        assert_eq!(std::fs::read(path).unwrap(), b"RIFF");
    }
}
