//! StreamInfo metadata and stream-start handling.
//!
//! A FLAC stream opens with the `fLaC` marker followed by metadata blocks,
//! the first of which is always StreamInfo. Only StreamInfo is parsed here;
//! every other block is skipped by its declared length.

use std::io::{Read, Seek, SeekFrom};

use anyhow::{Result, bail};

use crate::utils::bitstream::BitReader;
use crate::utils::errors::StreamError;

/// Stream marker opening every FLAC stream.
pub const STREAM_MARKER: [u8; 4] = *b"fLaC";

/// Metadata block type code for StreamInfo.
pub const BLOCK_TYPE_STREAMINFO: u8 = 0;

/// Size of the StreamInfo block body in bytes.
pub const STREAMINFO_SIZE: usize = 34;

/// Stream-wide parameters from the mandatory StreamInfo metadata block.
///
/// Parsed once before any frame. Frame headers with table index 0 inherit
/// `sample_rate` and `bits_per_sample` from here, and
/// `min_block_size != max_block_size` marks the stream as variable block
/// size, which selects the sample-number form of the frame position field.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
    pub md5: [u8; 16],
}

impl StreamInfo {
    pub fn read(reader: &mut BitReader) -> Result<Self> {
        let mut si = Self {
            min_block_size: reader.read_bits(16)? as u16,
            max_block_size: reader.read_bits(16)? as u16,
            min_frame_size: reader.read_bits(24)?,
            max_frame_size: reader.read_bits(24)?,
            sample_rate: reader.read_bits(20)?,
            channels: reader.read_bits(3)? as u8 + 1,
            bits_per_sample: reader.read_bits(5)? as u8 + 1,
            total_samples: reader.read_bits64(36)?,
            md5: [0; 16],
        };

        for byte in si.md5.iter_mut() {
            *byte = reader.read_bits(8)? as u8;
        }

        Ok(si)
    }

    /// Whether frames in this stream carry sample numbers rather than frame
    /// numbers in their position field.
    pub fn is_variable_block_size(&self) -> bool {
        self.min_block_size != self.max_block_size
    }
}

/// Reads the `fLaC` marker and the metadata section, returning the parsed
/// StreamInfo and the byte offset of the first frame.
///
/// The stream is left positioned at that offset.
pub fn read_stream_start<R: Read + Seek>(stream: &mut R) -> Result<(StreamInfo, u64)> {
    let mut marker = [0u8; 4];
    stream.read_exact(&mut marker)?;
    if marker != STREAM_MARKER {
        bail!(StreamError::MissingStreamMarker);
    }

    let mut stream_info = None;
    loop {
        let mut block_header = [0u8; 4];
        stream.read_exact(&mut block_header)?;

        let last_block = block_header[0] & 0x80 != 0;
        let block_type = block_header[0] & 0x7F;
        let length = u32::from_be_bytes([0, block_header[1], block_header[2], block_header[3]]);

        if block_type == BLOCK_TYPE_STREAMINFO && stream_info.is_none() {
            let mut body = [0u8; STREAMINFO_SIZE];
            stream.read_exact(&mut body)?;
            stream_info = Some(StreamInfo::read(&mut BitReader::from_slice(&body))?);

            if length as usize > STREAMINFO_SIZE {
                stream.seek(SeekFrom::Current(length as i64 - STREAMINFO_SIZE as i64))?;
            }
        } else {
            stream.seek(SeekFrom::Current(length as i64))?;
        }

        if last_block {
            break;
        }
    }

    let Some(stream_info) = stream_info else {
        bail!(StreamError::MissingStreamInfo);
    };

    Ok((stream_info, stream.stream_position()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::stream_info_block;
    use std::io::Cursor;

    fn sample_info() -> StreamInfo {
        StreamInfo {
            min_block_size: 192,
            max_block_size: 4096,
            min_frame_size: 14,
            max_frame_size: 12000,
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 88200,
            md5: [0xAB; 16],
        }
    }

    #[test]
    fn stream_info_round_trip() -> Result<()> {
        let si = sample_info();
        let body = stream_info_block(&si);
        assert_eq!(body.len(), STREAMINFO_SIZE);

        let parsed = StreamInfo::read(&mut BitReader::from_slice(&body))?;
        assert_eq!(parsed.min_block_size, 192);
        assert_eq!(parsed.max_block_size, 4096);
        assert_eq!(parsed.min_frame_size, 14);
        assert_eq!(parsed.max_frame_size, 12000);
        assert_eq!(parsed.sample_rate, 44100);
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.bits_per_sample, 16);
        assert_eq!(parsed.total_samples, 88200);
        assert_eq!(parsed.md5, [0xAB; 16]);
        assert!(parsed.is_variable_block_size());
        Ok(())
    }

    #[test]
    fn stream_start_skips_other_metadata() -> Result<()> {
        let si = sample_info();

        let mut data = Vec::new();
        data.extend(STREAM_MARKER);
        data.extend([0x00, 0x00, 0x00, STREAMINFO_SIZE as u8]);
        data.extend(stream_info_block(&si));
        // a padding block, marked last
        data.extend([0x81, 0x00, 0x00, 0x05]);
        data.extend([0u8; 5]);
        let first_frame = data.len() as u64;
        data.extend([0xFF, 0xF8]);

        let mut cursor = Cursor::new(data);
        let (parsed, offset) = read_stream_start(&mut cursor)?;
        assert_eq!(parsed.sample_rate, 44100);
        assert_eq!(offset, first_frame);
        Ok(())
    }

    #[test]
    fn stream_start_rejects_bad_marker() {
        let mut cursor = Cursor::new(b"OggS\x00\x00\x00\x00".to_vec());
        assert!(read_stream_start(&mut cursor).is_err());
    }
}
