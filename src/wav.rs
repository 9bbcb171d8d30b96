use std::io::{self, BufWriter, Seek, SeekFrom, Write};

/// RIFF/WAVE file writer for interleaved little-endian PCM (8/16/24-bit).
///
/// The decoder already produces WAV-ready sample bytes, so writing is a
/// pass-through; the RIFF and data chunk sizes are patched on [`finish`].
///
/// [`finish`]: WavWriter::finish
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    riff_size_position: u64,
    data_size_position: u64,
    data_written: u64,
    sample_rate: u32,
    channels: u32,
    bits_per_sample: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            riff_size_position: 0,
            data_size_position: 0,
            data_written: 0,
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
        }
    }

    /// Configure audio format parameters
    pub fn configure_audio_format(
        &mut self,
        sample_rate: u32,
        channels: u32,
        bits_per_sample: u32,
    ) -> io::Result<()> {
        if self.data_written > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot change format after writing data",
            ));
        }

        self.sample_rate = sample_rate;
        self.channels = channels;
        self.bits_per_sample = bits_per_sample;
        Ok(())
    }

    /// Write the RIFF/WAVE header
    pub fn write_header(&mut self) -> io::Result<()> {
        self.writer.write_all(b"RIFF")?;
        self.riff_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // RIFF size (patched later)
        self.writer.write_all(b"WAVE")?;

        self.writer.write_all(b"fmt ")?;
        self.writer.write_all(&16u32.to_le_bytes())?;
        self.writer.write_all(&1u16.to_le_bytes())?; // PCM format
        self.writer
            .write_all(&(self.channels as u16).to_le_bytes())?;
        self.writer.write_all(&self.sample_rate.to_le_bytes())?;

        let byte_rate = self.sample_rate * self.channels * (self.bits_per_sample / 8);
        self.writer.write_all(&byte_rate.to_le_bytes())?;

        let block_align = self.channels * (self.bits_per_sample / 8);
        self.writer.write_all(&(block_align as u16).to_le_bytes())?;
        self.writer
            .write_all(&(self.bits_per_sample as u16).to_le_bytes())?;

        self.writer.write_all(b"data")?;
        self.data_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // data size (patched later)

        Ok(())
    }

    /// Write interleaved PCM bytes as produced by the decoder
    pub fn write_pcm_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// Finish writing and patch the size fields
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.riff_size_position))?;
        self.writer.write_all(&((end - 8) as u32).to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer
            .write_all(&(self.data_written as u32).to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;

        Ok(())
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }

    /// Get statistics about written data
    pub fn stats(&self) -> WavStats {
        WavStats {
            data_written: self.data_written,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

/// Statistics about WAV file writing
#[derive(Debug, Clone)]
pub struct WavStats {
    pub data_written: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
}
