//! Sequential stream decoding.

use std::io::{Read, Seek, SeekFrom};

use anyhow::{Result, bail};
use log::warn;

use crate::process::decode::FrameDecoder;
use crate::process::scan::SeekIndex;
use crate::structs::stream_info::{StreamInfo, read_stream_start};
use crate::utils::errors::{BitstreamError, StreamError};

/// Output format descriptor derived from StreamInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl WaveFormat {
    /// Bytes per interleaved sample frame.
    pub fn block_align(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    pub fn avg_bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align()
    }
}

/// Top-level sequential decoder over a seekable FLAC stream.
///
/// `read` produces interleaved little-endian PCM; sample bytes a caller's
/// buffer cannot hold are kept in an overflow buffer and drained first on
/// the next call. With a seek index the decoder can jump to arbitrary
/// sample positions and skip past damaged regions.
///
/// # Example
///
/// ```rust,no_run
/// use std::fs::File;
/// use flacd::process::stream::StreamDecoder;
///
/// let file = File::open("audio.flac")?;
/// let mut decoder = StreamDecoder::with_seek_index(file)?;
///
/// let format = decoder.wave_format();
/// println!("{} Hz, {} ch, {} bits", format.sample_rate, format.channels, format.bits_per_sample);
///
/// let mut pcm = vec![0u8; 64 * 1024];
/// loop {
///     let read = decoder.read(&mut pcm)?;
///     if read == 0 {
///         break;
///     }
///     // feed pcm[..read] to playback or a file writer
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct StreamDecoder<R: Read + Seek> {
    stream: R,
    stream_info: StreamInfo,
    first_frame_offset: u64,
    decoder: FrameDecoder,
    seek_index: Option<SeekIndex>,
    frame_index: usize,
    frame_pcm: Vec<u8>,
    overflow: Vec<u8>,
    overflow_offset: usize,
    position: u64,
}

impl<R: Read + Seek> StreamDecoder<R> {
    /// Opens a stream without building a seek index: decode is sequential
    /// only, recovery advances byte-by-byte, seeking is unavailable.
    pub fn new(mut stream: R) -> Result<Self> {
        let (stream_info, first_frame_offset) = read_stream_start(&mut stream)?;

        if !matches!(stream_info.bits_per_sample, 8 | 16 | 24) {
            bail!(StreamError::UnsupportedBitsPerSample(
                stream_info.bits_per_sample as u32
            ));
        }

        Ok(Self {
            stream,
            stream_info,
            first_frame_offset,
            decoder: FrameDecoder::default(),
            seek_index: None,
            frame_index: 0,
            frame_pcm: Vec::new(),
            overflow: Vec::new(),
            overflow_offset: 0,
            position: 0,
        })
    }

    /// Opens a stream and scans it for frame boundaries first. The scan
    /// reads the whole stream once before the first decode.
    pub fn with_seek_index(stream: R) -> Result<Self> {
        let mut decoder = Self::new(stream)?;

        let index = SeekIndex::scan(
            &mut decoder.stream,
            decoder.first_frame_offset,
            &decoder.stream_info,
        )?;
        decoder
            .stream
            .seek(SeekFrom::Start(decoder.first_frame_offset))?;
        decoder.seek_index = Some(index);

        Ok(decoder)
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    pub fn seek_index(&self) -> Option<&SeekIndex> {
        self.seek_index.as_ref()
    }

    pub fn is_seekable(&self) -> bool {
        self.seek_index.is_some()
    }

    /// Number of frames decoded so far, or the index of the next frame to
    /// decode when a seek repositioned the stream.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Sets the failure level for frame validation, see
    /// [`FrameDecoder::set_fail_level`].
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.decoder.set_fail_level(level);
    }

    pub fn wave_format(&self) -> WaveFormat {
        WaveFormat {
            sample_rate: self.stream_info.sample_rate,
            bits_per_sample: self.stream_info.bits_per_sample as u16,
            channels: self.stream_info.channels as u16,
        }
    }

    /// Decoded length in PCM bytes, when known: the scanned sample count,
    /// or the StreamInfo total for unscanned streams that declare one.
    pub fn len_bytes(&self) -> Option<u64> {
        let samples = match &self.seek_index {
            Some(index) => index.total_samples(),
            None if self.stream_info.total_samples > 0 => self.stream_info.total_samples,
            None => return None,
        };

        Some(samples * self.wave_format().block_align() as u64)
    }

    /// Current decode-order position in PCM bytes.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads up to `buf.len()` PCM bytes, truncated to whole interleaved
    /// sample frames. Returns 0 at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let block_align = self.wave_format().block_align() as usize;
        let count = buf.len() - buf.len() % block_align;
        let buf = &mut buf[..count];

        let mut read = self.drain_overflow(buf);

        while read < count {
            if !self.decode_next_frame()? {
                break;
            }

            let produced = self.frame_pcm.len();
            let to_copy = produced.min(count - read);
            buf[read..read + to_copy].copy_from_slice(&self.frame_pcm[..to_copy]);
            read += to_copy;

            if to_copy < produced {
                self.overflow.clear();
                self.overflow.extend_from_slice(&self.frame_pcm[to_copy..]);
                self.overflow_offset = 0;
            }
        }

        self.position += read as u64;
        Ok(read)
    }

    /// Repositions decoding at the frame holding `sample`: the indexed frame
    /// with the greatest sample offset not exceeding it, then decode-skips
    /// to the exact sample. Requires a seek index.
    pub fn seek_to_sample(&mut self, sample: u64) -> Result<()> {
        let block_align = self.wave_format().block_align() as u64;

        let Some(index) = &self.seek_index else {
            return Err(StreamError::NotSeekable.into());
        };
        let Some((entry_index, entry)) = index.entry_for_sample(sample) else {
            return Err(StreamError::NotSeekable.into());
        };

        let stream_offset = entry.stream_offset;
        let entry_sample = entry.sample_offset;

        self.stream.seek(SeekFrom::Start(stream_offset))?;
        self.frame_index = entry_index;
        self.overflow.clear();
        self.overflow_offset = 0;
        self.position = entry_sample * block_align;

        let mut remaining = (sample - entry_sample) * block_align;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let want = (scratch.len() as u64).min(remaining) as usize;
            let skipped = self.read(&mut scratch[..want])?;
            if skipped == 0 {
                break;
            }
            remaining -= skipped as u64;
        }

        Ok(())
    }

    /// Byte-position variant of [`Self::seek_to_sample`].
    pub fn set_position(&mut self, bytes: u64) -> Result<()> {
        let block_align = self.wave_format().block_align() as u64;
        self.seek_to_sample(bytes / block_align)
    }

    fn drain_overflow(&mut self, buf: &mut [u8]) -> usize {
        let pending = self.overflow.len() - self.overflow_offset;
        if pending == 0 || buf.is_empty() {
            return 0;
        }

        let to_copy = pending.min(buf.len());
        buf[..to_copy]
            .copy_from_slice(&self.overflow[self.overflow_offset..self.overflow_offset + to_copy]);
        self.overflow_offset += to_copy;

        if self.overflow_offset == self.overflow.len() {
            self.overflow.clear();
            self.overflow_offset = 0;
        }

        to_copy
    }

    /// Decodes the next frame into `frame_pcm`, resynchronizing past
    /// recoverable failures. Returns false at end of stream.
    fn decode_next_frame(&mut self) -> Result<bool> {
        loop {
            let frame_start = self.stream.stream_position()?;

            match self
                .decoder
                .decode(&mut self.stream, &self.stream_info, &mut self.frame_pcm)
            {
                Ok(_) => {
                    self.frame_index += 1;
                    return Ok(true);
                }
                Err(err) => {
                    if err.downcast_ref::<StreamError>().is_some()
                        || err.downcast_ref::<std::io::Error>().is_some()
                    {
                        // unsupported output configuration and transport
                        // failures are never swallowed
                        return Err(err);
                    }
                    if let Some(BitstreamError::InsufficientData { .. }) =
                        err.downcast_ref::<BitstreamError>()
                    {
                        return Ok(false);
                    }

                    warn!("frame at byte {frame_start} failed to decode: {err:#}");

                    if let Some(index) = &self.seek_index {
                        let Some((next_index, entry)) = index.entry_after_offset(frame_start)
                        else {
                            return Ok(false);
                        };
                        self.stream.seek(SeekFrom::Start(entry.stream_offset))?;
                        self.frame_index = next_index;
                    } else {
                        self.stream.seek(SeekFrom::Start(frame_start + 1))?;
                    }
                }
            }
        }
    }
}
