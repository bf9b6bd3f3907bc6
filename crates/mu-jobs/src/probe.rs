//! Best-effort duration probe for uploads

use std::io::Cursor;

use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Duration in seconds, or `None` when the container can't tell us.
///
/// WAV goes through hound; everything else through symphonia. Runs on the
/// blocking pool since both parse the whole buffer synchronously.
pub async fn probe_duration(file_name: &str, bytes: Vec<u8>) -> Option<f64> {
    let extension = extension_of(file_name);
    tokio::task::spawn_blocking(move || probe_blocking(extension.as_deref(), bytes))
        .await
        .unwrap_or_else(|e| {
            log::warn!("[Upload] Duration probe task failed: {}", e);
            None
        })
}

pub fn probe_blocking(extension: Option<&str>, bytes: Vec<u8>) -> Option<f64> {
    let duration = if extension == Some("wav") {
        probe_wav(&bytes).or_else(|| probe_symphonia(extension, bytes))
    } else {
        probe_symphonia(extension, bytes)
    };
    duration.filter(|d| d.is_finite() && *d > 0.0)
}

fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn probe_wav(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}

fn probe_symphonia(extension: Option<&str>, bytes: Vec<u8>) -> Option<f64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| log::debug!("[Upload] Could not probe audio: {}", e))
        .ok()?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate;
    let time_base = track.codec_params.time_base;

    if let (Some(frames), Some(rate)) = (track.codec_params.n_frames, sample_rate) {
        if rate > 0 {
            return Some(frames as f64 / rate as f64);
        }
    }

    // No frame count in the header (common for MP3 without a Xing tag):
    // walk the packets and add up their durations.
    let time_base = time_base?;
    let mut total_ts: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total_ts += packet.dur,
            Ok(_) => {}
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => {
                log::debug!("[Upload] Stopped scanning packets: {}", e);
                break;
            }
        }
    }

    if total_ts == 0 {
        return None;
    }
    let time = time_base.calc_time(total_ts);
    Some(time.seconds as f64 + time.frac)
}
