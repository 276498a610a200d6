//! WAV probing and slicing.
//!
//! The pipeline never reads samples; these helpers exist for the CLI (duration
//! probe) and for aligner backends that need a window's audio as its own file.

use crate::error::{ChapalignError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

fn audio_error(context: &str, path: &Path, e: impl std::fmt::Display) -> ChapalignError {
    ChapalignError::Audio {
        message: format!("{context} {}: {e}", path.display()),
    }
}

/// Duration of a WAV file in milliseconds.
pub fn duration_ms(path: &Path) -> Result<u64> {
    let reader = WavReader::open(path).map_err(|e| audio_error("failed to open", path, e))?;
    Ok(frames_to_ms(u64::from(reader.duration()), reader.spec().sample_rate))
}

fn frames_to_ms(frames: u64, sample_rate: u32) -> u64 {
    frames * 1000 / u64::from(sample_rate.max(1))
}

fn ms_to_frames(ms: u64, sample_rate: u32) -> u64 {
    ms * u64::from(sample_rate) / 1000
}

/// Copies `[start_ms, end_ms)` of `source` into a new WAV file at `dest`.
///
/// The slice keeps the source's sample format and channel layout. Ranges past
/// the end of the source are clipped.
pub fn write_slice(source: &Path, start_ms: u64, end_ms: u64, dest: &Path) -> Result<()> {
    let mut reader = WavReader::open(source).map_err(|e| audio_error("failed to open", source, e))?;
    let spec = reader.spec();
    let total_frames = u64::from(reader.duration());

    let start_frame = ms_to_frames(start_ms, spec.sample_rate).min(total_frames);
    let end_frame = ms_to_frames(end_ms, spec.sample_rate).min(total_frames);
    let frames = end_frame.saturating_sub(start_frame);

    // start_frame <= duration(), which is itself a u32
    reader
        .seek(start_frame as u32)
        .map_err(|e| audio_error("failed to seek in", source, e))?;

    let mut writer = WavWriter::create(dest, spec).map_err(|e| audio_error("failed to create", dest, e))?;
    let count = frames * u64::from(spec.channels);
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => copy_samples::<f32, _>(&mut reader, &mut writer, count, source)?,
        (SampleFormat::Int, bits) if bits <= 8 => {
            copy_samples::<i8, _>(&mut reader, &mut writer, count, source)?
        }
        (SampleFormat::Int, bits) if bits <= 16 => {
            copy_samples::<i16, _>(&mut reader, &mut writer, count, source)?
        }
        (SampleFormat::Int, _) => copy_samples::<i32, _>(&mut reader, &mut writer, count, source)?,
    }
    writer
        .finalize()
        .map_err(|e| audio_error("failed to finalize", dest, e))
}

fn copy_samples<S, R>(
    reader: &mut WavReader<R>,
    writer: &mut WavWriter<std::io::BufWriter<File>>,
    count: u64,
    source: &Path,
) -> Result<()>
where
    S: hound::Sample + Copy,
    R: Read + Seek,
{
    for sample in reader.samples::<S>().take(count as usize) {
        let sample = sample.map_err(|e| audio_error("failed to read samples from", source, e))?;
        writer
            .write_sample(sample)
            .map_err(|e| audio_error("failed to write slice of", source, e))?;
    }
    Ok(())
}

/// Writes a mono 16-bit WAV of `samples`; used to build fixtures.
pub fn write_mono_i16(path: &Path, sample_rate: u32, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|e| audio_error("failed to create", path, e))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| audio_error("failed to write", path, e))?;
    }
    writer
        .finalize()
        .map_err(|e| audio_error("failed to finalize", path, e))
}

/// Reads every sample of a 16-bit WAV.
pub fn read_i16(path: &Path) -> Result<Vec<i16>> {
    let reader: WavReader<BufReader<File>> =
        WavReader::open(path).map_err(|e| audio_error("failed to open", path, e))?;
    reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| audio_error("failed to read samples from", path, e))
}
