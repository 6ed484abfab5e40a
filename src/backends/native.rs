use super::PlaybackBackend;
use crate::error::{Result, SpeakError};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Plays through the default output device without an external process.
pub struct RodioPlayer;

impl PlaybackBackend for RodioPlayer {
    fn id(&self) -> &'static str {
        "rodio"
    }

    fn is_available(&self) -> bool {
        OutputStream::try_default().is_ok()
    }

    fn play(&self, path: &Path) -> Result<()> {
        // The stream must outlive the sink
        let (_stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| SpeakError::Dependency(format!("no audio output device: {}", e)))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| SpeakError::Playback(format!("failed to create sink: {}", e)))?;

        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| SpeakError::Playback(format!("failed to decode {}: {}", path.display(), e)))?;

        sink.append(source.convert_samples::<f32>());
        sink.sleep_until_end();
        Ok(())
    }
}
