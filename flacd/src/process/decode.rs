//! Frame decoding to interleaved PCM.

use std::io::{Read, Seek, SeekFrom};

use anyhow::Result;
use log::Level::Warn;

use crate::log_or_err;
use crate::process::{DEFAULT_FRAME_BUFFER_SIZE, read_fully};
use crate::structs::frame::{ChannelAssignment, FrameHeader, MAX_FRAME_HEADER_SIZE};
use crate::structs::stream_info::StreamInfo;
use crate::structs::subframe::{Subframe, SubframeData};
use crate::utils::bitstream::BitReader;
use crate::utils::crc::CRC_FRAME;
use crate::utils::errors::{FrameError, StreamError};

/// Decodes single frames into interleaved little-endian PCM bytes.
///
/// One decoder owns the destination, residual and Rice-parameter scratch
/// buffers and reuses them across frames; it must not be shared between
/// concurrent decode calls.
///
/// # Example
///
/// ```rust,no_run
/// use std::fs::File;
/// use std::io::{Seek, SeekFrom};
/// use flacd::process::decode::FrameDecoder;
/// use flacd::structs::stream_info::read_stream_start;
///
/// let mut file = File::open("audio.flac")?;
/// let (stream_info, first_frame) = read_stream_start(&mut file)?;
/// file.seek(SeekFrom::Start(first_frame))?;
///
/// let mut decoder = FrameDecoder::default();
/// let mut pcm = Vec::new();
/// let header = decoder.decode(&mut file, &stream_info, &mut pcm)?;
/// println!("decoded {} samples to {} bytes", header.block_size, pcm.len());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    frame_buffer: Vec<u8>,
    dest: Vec<i32>,
    residual: Vec<i32>,
    rice_parameters: Vec<u32>,
    pub(crate) fail_level: log::Level,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            frame_buffer: Vec::new(),
            dest: Vec::new(),
            residual: Vec::new(),
            rice_parameters: Vec::new(),
            fail_level: log::Level::Error,
        }
    }
}

impl FrameDecoder {
    /// Sets the failure level for frame validation.
    ///
    /// - `log::Level::Error`: only fail on Error level findings (default;
    ///   a frame CRC-16 mismatch is reported at Warn and tolerated)
    /// - `log::Level::Warn`: fail on Warning and above (strict mode;
    ///   CRC-16 mismatches discard the frame)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Decodes the frame at the current stream position.
    ///
    /// On success the stream is left at the first byte after the frame,
    /// `out` holds `block_size * channels * bytes_per_sample` interleaved
    /// little-endian PCM bytes, and the parsed header is returned. On error
    /// the stream position is unspecified; the caller resynchronizes.
    pub fn decode<R: Read + Seek>(
        &mut self,
        stream: &mut R,
        stream_info: &StreamInfo,
        out: &mut Vec<u8>,
    ) -> Result<FrameHeader> {
        let frame_start = stream.stream_position()?;

        let want = if stream_info.max_frame_size > 0 {
            stream_info.max_frame_size as usize + MAX_FRAME_HEADER_SIZE
        } else {
            DEFAULT_FRAME_BUFFER_SIZE
        };
        self.frame_buffer.resize(want, 0);
        let read = read_fully(stream, &mut self.frame_buffer)?;

        let mut reader = BitReader::from_slice(&self.frame_buffer[..read]);
        let header = FrameHeader::read(&mut reader, Some(stream_info))?;

        let block_size = header.block_size as usize;
        let needed = header.channels * block_size;
        if self.dest.len() < needed {
            self.dest.resize(needed, 0);
            self.residual.resize(needed, 0);
        }

        for (channel, (dest, residual)) in self
            .dest
            .chunks_exact_mut(block_size)
            .zip(self.residual.chunks_exact_mut(block_size))
            .take(header.channels)
            .enumerate()
        {
            let mut data = SubframeData {
                dest,
                residual,
                rice_parameters: &mut self.rice_parameters,
            };
            Subframe::read(
                &mut reader,
                block_size,
                header.channel_bits_per_sample(channel),
                &mut data,
            )?;
        }

        reader.align_to_byte();
        let calculated = reader.crc16_check(&CRC_FRAME, 0, reader.position())?;
        let crc16 = reader.read_bits(16)? as u16;
        if crc16 != calculated {
            log_or_err!(
                self,
                Warn,
                FrameError::CrcMismatch {
                    calculated,
                    read: crc16,
                }
            );
        }

        let frame_len = reader.position() >> 3;
        stream.seek(SeekFrom::Start(frame_start + frame_len))?;

        if header.channels == 2 && header.channel_assignment != ChannelAssignment::Independent {
            let (ch0, ch1) = self.dest.split_at_mut(block_size);
            undo_channel_decorrelation(
                header.channel_assignment,
                &mut ch0[..block_size],
                &mut ch1[..block_size],
            );
        }

        self.serialize(&header, out)?;

        Ok(header)
    }

    /// Packs the decoded channels into interleaved little-endian bytes.
    fn serialize(&self, header: &FrameHeader, out: &mut Vec<u8>) -> Result<()> {
        let block_size = header.block_size as usize;
        let channels = header.channels;

        out.clear();
        out.reserve(block_size * channels * (header.bits_per_sample as usize).div_ceil(8));

        match header.bits_per_sample {
            8 => {
                for i in 0..block_size {
                    for c in 0..channels {
                        out.push((self.dest[c * block_size + i] + 0x80) as u8);
                    }
                }
            }
            16 => {
                for i in 0..block_size {
                    for c in 0..channels {
                        let value = self.dest[c * block_size + i] as i16;
                        out.extend(value.to_le_bytes());
                    }
                }
            }
            24 => {
                for i in 0..block_size {
                    for c in 0..channels {
                        let value = self.dest[c * block_size + i];
                        out.extend(&value.to_le_bytes()[..3]);
                    }
                }
            }
            bits => return Err(StreamError::UnsupportedBitsPerSample(bits).into()),
        }

        Ok(())
    }
}

/// Reverses stereo decorrelation in place after both subframes decoded.
pub fn undo_channel_decorrelation(
    assignment: ChannelAssignment,
    ch0: &mut [i32],
    ch1: &mut [i32],
) {
    match assignment {
        ChannelAssignment::LeftSide => {
            for (left, side) in ch0.iter().zip(ch1.iter_mut()) {
                *side = left - *side;
            }
        }
        ChannelAssignment::RightSide => {
            for (right, side) in ch0.iter_mut().zip(ch1.iter()) {
                *right += side;
            }
        }
        ChannelAssignment::MidSide => {
            for (mid, side) in ch0.iter_mut().zip(ch1.iter_mut()) {
                let m = (*mid << 1) | (*side & 1);
                let s = *side;

                *mid = (m + s) >> 1;
                *side = (m - s) >> 1;
            }
        }
        ChannelAssignment::Independent => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::frame::FramePosition;
    use crate::testutil::{BitWriter, streaminfo_mono_16, with_crc8, with_crc16};
    use std::io::Cursor;

    #[test]
    fn mid_side_recombination() {
        let mut mid = [10];
        let mut side = [3];
        undo_channel_decorrelation(ChannelAssignment::MidSide, &mut mid, &mut side);
        // mid' = (10 << 1) | 1 = 21, left = (21 + 3) >> 1, right = (21 - 3) >> 1
        assert_eq!(mid, [12]);
        assert_eq!(side, [9]);

        // left - right always equals the side value
        let mut mid = [-4, 0, 1000];
        let mut side = [-9, 1, 333];
        undo_channel_decorrelation(ChannelAssignment::MidSide, &mut mid, &mut side);
        assert_eq!(mid[0] - side[0], -9);
        assert_eq!(mid[1] - side[1], 1);
        assert_eq!(mid[2] - side[2], 333);
    }

    #[test]
    fn left_side_recombination() {
        let mut left = [100, -50];
        let mut side = [3, -7];
        undo_channel_decorrelation(ChannelAssignment::LeftSide, &mut left, &mut side);
        assert_eq!(left, [100, -50]);
        assert_eq!(side, [97, -43]);
    }

    #[test]
    fn right_side_recombination() {
        let mut derived = [3, -7];
        let mut right = [100, -50];
        undo_channel_decorrelation(ChannelAssignment::RightSide, &mut derived, &mut right);
        assert_eq!(derived, [103, -57]);
        assert_eq!(right, [100, -50]);
    }

    /// A 4-sample 16-bit stereo verbatim frame with the given channel field.
    fn verbatim_stereo_frame(channel_field: u32, ch0: &[i32], ch1: &[i32]) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(0x3FFE, 14);
        w.push_bit(false);
        w.push_bit(false);
        w.push_bits(6, 4); // 8-bit block size hint
        w.push_bits(9, 4);
        w.push_bits(channel_field as u64, 4);
        w.push_bits(4, 3);
        w.push_bit(false);
        w.push_utf8(0);
        w.push_bits(ch0.len() as u64 - 1, 8);
        let header = with_crc8(w.into_bytes());

        let mut w = BitWriter::new();
        let side = channel_field >= 0x8;
        for (channel, samples) in [ch0, ch1].into_iter().enumerate() {
            let bps = match (channel_field, channel) {
                (0x8 | 0xA, 1) if side => 17,
                (0x9, 0) => 17,
                _ => 16,
            };
            w.push_bits(0x02, 8);
            for &v in samples {
                w.push_bits(v as u32 as u64 & ((1 << bps) - 1), bps);
            }
        }
        w.align();

        let mut frame = header;
        frame.extend(w.into_bytes());
        with_crc16(frame)
    }

    fn decode_frame(bytes: &[u8]) -> Result<(FrameHeader, Vec<u8>)> {
        let mut si = streaminfo_mono_16();
        si.channels = 2;
        si.max_frame_size = bytes.len() as u32;

        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        let header = decoder.decode(&mut Cursor::new(bytes), &si, &mut out)?;
        Ok((header, out))
    }

    fn samples_le16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn independent_stereo_frame() -> Result<()> {
        let frame = verbatim_stereo_frame(1, &[1, 2, 3, 4], &[-1, -2, -3, -4]);
        let (header, pcm) = decode_frame(&frame)?;

        assert_eq!(header.block_size, 4);
        assert_eq!(header.position, FramePosition::FrameNumber(0));
        assert_eq!(pcm.len(), 4 * 2 * 2);
        assert_eq!(
            samples_le16(&pcm),
            [1, -1, 2, -2, 3, -3, 4, -4],
        );
        Ok(())
    }

    #[test]
    fn left_side_stereo_frame() -> Result<()> {
        // left = [10, 20], side = [3, -4] -> right = [7, 24]
        let frame = verbatim_stereo_frame(0x8, &[10, 20, 0, 0], &[3, -4, 0, 0]);
        let (_, pcm) = decode_frame(&frame)?;
        assert_eq!(&samples_le16(&pcm)[..4], [10, 7, 20, 24]);
        Ok(())
    }

    #[test]
    fn mid_side_stereo_frame() -> Result<()> {
        // mid = [10], side = [3] -> left 12, right 9
        let frame = verbatim_stereo_frame(0xA, &[10, 0, 0, 0], &[3, 0, 0, 0]);
        let (_, pcm) = decode_frame(&frame)?;
        assert_eq!(&samples_le16(&pcm)[..2], [12, 9]);
        Ok(())
    }

    #[test]
    fn frame_crc_mismatch_is_strict_mode_error() -> Result<()> {
        let mut frame = verbatim_stereo_frame(1, &[1, 2, 3, 4], &[5, 6, 7, 8]);
        let last = frame.len() - 1;
        frame[last] ^= 0x55;

        // default policy: decoded content delivered, mismatch logged
        let (_, pcm) = decode_frame(&frame)?;
        assert_eq!(pcm.len(), 16);

        // strict policy: frame discarded
        let mut si = streaminfo_mono_16();
        si.channels = 2;
        let mut decoder = FrameDecoder::default();
        decoder.set_fail_level(log::Level::Warn);
        let mut out = Vec::new();
        let err = decoder
            .decode(&mut Cursor::new(&frame), &si, &mut out)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameError>(),
            Some(FrameError::CrcMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn unsupported_bit_depth_is_fatal() {
        // 12-bit samples decode but cannot serialize
        let mut w = BitWriter::new();
        w.push_bits(0x3FFE, 14);
        w.push_bits(0, 2);
        w.push_bits(1, 4);
        w.push_bits(9, 4);
        w.push_bits(0, 4);
        w.push_bits(2, 3); // 12 bits per sample
        w.push_bit(false);
        w.push_utf8(0);
        let header = with_crc8(w.into_bytes());

        let mut w = BitWriter::new();
        w.push_bits(0x00, 8);
        w.push_bits(0, 12);
        w.align();

        let mut frame = header;
        frame.extend(w.into_bytes());
        let frame = with_crc16(frame);

        let si = streaminfo_mono_16();
        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        let err = decoder
            .decode(&mut Cursor::new(&frame), &si, &mut out)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StreamError>(),
            Some(StreamError::UnsupportedBitsPerSample(12))
        ));
    }

    #[test]
    fn stream_lands_after_frame() -> Result<()> {
        let mut data = verbatim_stereo_frame(1, &[1, 2, 3, 4], &[5, 6, 7, 8]);
        let frame_len = data.len() as u64;
        data.extend([0xDE, 0xAD, 0xBE, 0xEF]);

        let mut si = streaminfo_mono_16();
        si.channels = 2;
        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        let mut cursor = Cursor::new(&data);
        decoder.decode(&mut cursor, &si, &mut out)?;
        assert_eq!(cursor.position(), frame_len);
        Ok(())
    }

    #[test]
    fn eight_bit_output_is_offset_binary() -> Result<()> {
        let mut w = BitWriter::new();
        w.push_bits(0x3FFE, 14);
        w.push_bits(0, 2);
        w.push_bits(6, 4);
        w.push_bits(9, 4);
        w.push_bits(0, 4);
        w.push_bits(1, 3); // 8 bits per sample
        w.push_bit(false);
        w.push_utf8(0);
        w.push_bits(2, 8); // 3 samples
        let header = with_crc8(w.into_bytes());

        let mut w = BitWriter::new();
        w.push_bits(0x02, 8);
        for v in [-128i32, 0, 127] {
            w.push_bits(v as u32 as u64 & 0xFF, 8);
        }
        w.align();

        let mut frame = header;
        frame.extend(w.into_bytes());
        let frame = with_crc16(frame);

        let si = streaminfo_mono_16();
        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        decoder.decode(&mut Cursor::new(&frame), &si, &mut out)?;
        assert_eq!(out, [0x00, 0x80, 0xFF]);
        Ok(())
    }
}
