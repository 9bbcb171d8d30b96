//! Frame header parsing.
//!
//! Every frame opens with a CRC-8-protected header: a 14-bit sync pattern,
//! a blocking-strategy bit, table-coded block size / sample rate / channel
//! assignment / sample depth fields, a UTF-8-style coded position, and
//! optional trailing hint bytes for the two table escape values.

use anyhow::{Result, bail};

use crate::structs::stream_info::StreamInfo;
use crate::utils::bitstream::BitReader;
use crate::utils::crc::CRC_FRAME_HEADER;
use crate::utils::errors::{BitstreamError, HeaderError};

/// 14-bit frame sync pattern.
pub const SYNC_PATTERN: u32 = 0x3FFE;

/// Largest possible encoded frame header in bytes: 4 fixed bytes, a 7-byte
/// coded position, 2 hint bytes each for block size and sample rate, CRC-8.
pub const MAX_FRAME_HEADER_SIZE: usize = 16;

const SAMPLE_RATE_TABLE: [u32; 12] = [
    0, 88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

const BITS_PER_SAMPLE_TABLE: [u32; 8] = [0, 8, 12, 0, 16, 20, 24, 0];

/// How a stereo frame's two subframes relate to the output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    Independent,
    LeftSide,
    RightSide,
    MidSide,
}

/// Discriminated frame position: sample number for variable-block-size
/// streams, frame number for fixed. The blocking-strategy bit (or a
/// StreamInfo with differing block-size bounds) selects the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePosition {
    SampleNumber(u64),
    FrameNumber(u32),
}

#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub block_size: u32,
    pub sample_rate: u32,
    pub channels: usize,
    pub channel_assignment: ChannelAssignment,
    pub bits_per_sample: u32,
    pub position: FramePosition,
    pub crc8: u8,
}

impl FrameHeader {
    /// Parses one frame header from a byte-aligned sync point, validating
    /// the trailing CRC-8. `stream_info` supplies defaults for table index 0
    /// fields; without it such headers are rejected.
    pub fn read(reader: &mut BitReader, stream_info: Option<&StreamInfo>) -> Result<Self> {
        let start = reader.position();

        let sync = reader.read_bits(14)?;
        if sync != SYNC_PATTERN {
            bail!(HeaderError::InvalidSync(sync));
        }
        if reader.read_bit()? {
            bail!(HeaderError::ReservedBitSet);
        }
        let variable_blocking = reader.read_bit()?;

        let block_size_index = reader.read_bits(4)? as u8;
        let sample_rate_index = reader.read_bits(4)? as u8;
        let channel_field = reader.read_bits(4)? as u8;
        let bps_index = reader.read_bits(3)? as u8;
        if reader.read_bit()? {
            bail!(HeaderError::ReservedBitSet);
        }

        let mut block_size = match block_size_index {
            0 => bail!(HeaderError::InvalidBlockSizeIndex(0)),
            1 => 192,
            2..=5 => 576 << (block_size_index - 2),
            // 6 and 7 defer to a hint byte after the position field
            6 | 7 => 0,
            _ => 256 << (block_size_index - 8),
        };

        let mut sample_rate = match sample_rate_index {
            0 => match stream_info {
                Some(si) => si.sample_rate,
                None => bail!(HeaderError::MissingSampleRate),
            },
            1..=11 => SAMPLE_RATE_TABLE[sample_rate_index as usize],
            // 12 to 14 defer to hint bytes after the position field
            12..=14 => 0,
            _ => bail!(HeaderError::InvalidSampleRateIndex(sample_rate_index)),
        };

        let (channels, channel_assignment) = if channel_field & 0x8 != 0 {
            let assignment = match channel_field & 0x7 {
                0 => ChannelAssignment::LeftSide,
                1 => ChannelAssignment::RightSide,
                2 => ChannelAssignment::MidSide,
                _ => bail!(HeaderError::InvalidChannelAssignment(channel_field)),
            };
            (2, assignment)
        } else {
            (channel_field as usize + 1, ChannelAssignment::Independent)
        };

        let bits_per_sample = match bps_index {
            0 => match stream_info {
                Some(si) => si.bits_per_sample as u32,
                None => bail!(HeaderError::MissingBitsPerSample),
            },
            3 | 7 => bail!(HeaderError::InvalidBitsPerSampleIndex(bps_index)),
            _ => BITS_PER_SAMPLE_TABLE[bps_index as usize],
        };

        let variable = variable_blocking
            || stream_info.is_some_and(StreamInfo::is_variable_block_size);
        let position = if variable {
            match reader.read_utf8_u64() {
                Ok(sample) => FramePosition::SampleNumber(sample),
                Err(BitstreamError::InvalidCodedNumber) => bail!(HeaderError::InvalidPosition),
                Err(e) => return Err(e.into()),
            }
        } else {
            match reader.read_utf8_u32() {
                Ok(frame) => FramePosition::FrameNumber(frame),
                Err(BitstreamError::InvalidCodedNumber) => bail!(HeaderError::InvalidPosition),
                Err(e) => return Err(e.into()),
            }
        };

        if block_size_index == 6 || block_size_index == 7 {
            let mut hint = reader.read_bits(8)?;
            if block_size_index == 7 {
                hint = (hint << 8) | reader.read_bits(8)?;
            }
            block_size = hint + 1;
        }

        if (12..=14).contains(&sample_rate_index) {
            let mut hint = reader.read_bits(8)?;
            if sample_rate_index != 12 {
                hint = (hint << 8) | reader.read_bits(8)?;
            }
            sample_rate = match sample_rate_index {
                12 => hint * 1000,
                13 => hint,
                _ => hint * 10,
            };
        }

        let calculated = reader.crc8_check(&CRC_FRAME_HEADER, start, reader.position() - start)?;
        let crc8 = reader.read_bits(8)? as u8;
        if crc8 != calculated {
            bail!(HeaderError::CrcMismatch {
                calculated,
                read: crc8,
            });
        }

        Ok(Self {
            block_size,
            sample_rate,
            channels,
            channel_assignment,
            bits_per_sample,
            position,
            crc8,
        })
    }

    /// Format equality used by the seek scan to reject sync-pattern false
    /// positives: a genuine frame keeps the stream's rate, layout and depth.
    pub fn matches_format(&self, other: &FrameHeader) -> bool {
        self.sample_rate == other.sample_rate
            && self.channels == other.channels
            && self.bits_per_sample == other.bits_per_sample
    }

    /// Effective sample depth for one channel: the side channel of a
    /// decorrelated pair carries one extra bit.
    pub fn channel_bits_per_sample(&self, channel: usize) -> u32 {
        let extra = match self.channel_assignment {
            ChannelAssignment::LeftSide | ChannelAssignment::MidSide => channel == 1,
            ChannelAssignment::RightSide => channel == 0,
            ChannelAssignment::Independent => false,
        };

        self.bits_per_sample + extra as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{BitWriter, with_crc8};

    fn header_bytes(
        variable: bool,
        block_size_index: u32,
        sample_rate_index: u32,
        channel_field: u32,
        bps_index: u32,
        position: u64,
        hints: &[u32],
    ) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.push_bits(SYNC_PATTERN as u64, 14);
        w.push_bit(false);
        w.push_bit(variable);
        w.push_bits(block_size_index as u64, 4);
        w.push_bits(sample_rate_index as u64, 4);
        w.push_bits(channel_field as u64, 4);
        w.push_bits(bps_index as u64, 3);
        w.push_bit(false);
        w.push_utf8(position);
        for &hint in hints {
            w.push_bits(hint as u64, 8);
        }
        with_crc8(w.into_bytes())
    }

    #[test]
    fn parse_fixed_blocking_header() -> Result<()> {
        // 4096 samples, 44.1 kHz, stereo, 16 bits, frame 17
        let bytes = header_bytes(false, 12, 9, 1, 4, 17, &[]);

        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
        assert_eq!(header.block_size, 4096);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channels, 2);
        assert_eq!(header.channel_assignment, ChannelAssignment::Independent);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.position, FramePosition::FrameNumber(17));
        Ok(())
    }

    #[test]
    fn parse_variable_blocking_header() -> Result<()> {
        let bytes = header_bytes(true, 1, 10, 0, 6, 1 << 21, &[]);

        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
        assert_eq!(header.block_size, 192);
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(header.channels, 1);
        assert_eq!(header.bits_per_sample, 24);
        assert_eq!(header.position, FramePosition::SampleNumber(1 << 21));
        Ok(())
    }

    #[test]
    fn block_size_and_sample_rate_hints() -> Result<()> {
        // 16-bit block size hint 0x12FF -> 4864 samples, 8-bit kHz hint 32 -> 32000 Hz
        let bytes = header_bytes(false, 7, 12, 0, 4, 0, &[0x12, 0xFF, 32]);

        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
        assert_eq!(header.block_size, 0x1300);
        assert_eq!(header.sample_rate, 32000);

        // 8-bit block size hint, 16-bit rate hint in tens of Hz
        let bytes = header_bytes(false, 6, 14, 0, 4, 0, &[99, 0x11, 0x2A]);
        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
        assert_eq!(header.block_size, 100);
        assert_eq!(header.sample_rate, 0x112A * 10);
        Ok(())
    }

    #[test]
    fn stereo_decorrelation_modes() -> Result<()> {
        for (field, assignment) in [
            (0x8, ChannelAssignment::LeftSide),
            (0x9, ChannelAssignment::RightSide),
            (0xA, ChannelAssignment::MidSide),
        ] {
            let bytes = header_bytes(false, 1, 9, field, 4, 0, &[]);
            let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
            assert_eq!(header.channels, 2);
            assert_eq!(header.channel_assignment, assignment);
        }

        let bytes = header_bytes(false, 1, 9, 0xB, 4, 0, &[]);
        assert!(FrameHeader::read(&mut BitReader::from_slice(&bytes), None).is_err());
        Ok(())
    }

    #[test]
    fn side_channel_gains_a_bit() -> Result<()> {
        let bytes = header_bytes(false, 1, 9, 0x8, 4, 0, &[]);
        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
        assert_eq!(header.channel_bits_per_sample(0), 16);
        assert_eq!(header.channel_bits_per_sample(1), 17);

        let bytes = header_bytes(false, 1, 9, 0x9, 4, 0, &[]);
        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), None)?;
        assert_eq!(header.channel_bits_per_sample(0), 17);
        assert_eq!(header.channel_bits_per_sample(1), 16);
        Ok(())
    }

    #[test]
    fn defaults_come_from_stream_info() -> Result<()> {
        let si = crate::testutil::streaminfo_mono_16();

        let bytes = header_bytes(false, 1, 0, 0, 0, 3, &[]);
        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), Some(&si))?;
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.bits_per_sample, 16);

        // the same header is unparsable without StreamInfo
        assert!(FrameHeader::read(&mut BitReader::from_slice(&bytes), None).is_err());
        Ok(())
    }

    #[test]
    fn variable_stream_info_selects_sample_numbers() -> Result<()> {
        let mut si = crate::testutil::streaminfo_mono_16();
        si.max_block_size = 4096;

        // blocking-strategy bit clear, but StreamInfo says variable
        let bytes = header_bytes(false, 1, 9, 0, 4, 5, &[]);
        let header = FrameHeader::read(&mut BitReader::from_slice(&bytes), Some(&si))?;
        assert_eq!(header.position, FramePosition::SampleNumber(5));
        Ok(())
    }

    #[test]
    fn rejected_headers() {
        // bad sync
        let mut bytes = header_bytes(false, 1, 9, 0, 4, 0, &[]);
        bytes[0] = 0xFE;
        assert!(FrameHeader::read(&mut BitReader::from_slice(&bytes), None).is_err());

        // reserved block size index
        let bytes = header_bytes(false, 0, 9, 0, 4, 0, &[]);
        assert!(FrameHeader::read(&mut BitReader::from_slice(&bytes), None).is_err());

        // reserved sample rate index
        let bytes = header_bytes(false, 1, 15, 0, 4, 0, &[]);
        assert!(FrameHeader::read(&mut BitReader::from_slice(&bytes), None).is_err());

        // reserved bits-per-sample indices
        for bps_index in [3, 7] {
            let bytes = header_bytes(false, 1, 9, 0, bps_index, 0, &[]);
            assert!(FrameHeader::read(&mut BitReader::from_slice(&bytes), None).is_err());
        }

        // flipped CRC byte
        let mut bytes = header_bytes(false, 1, 9, 0, 4, 0, &[]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = FrameHeader::read(&mut BitReader::from_slice(&bytes), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HeaderError>(),
            Some(HeaderError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn format_comparison_ignores_block_size() -> Result<()> {
        let a = FrameHeader::read(
            &mut BitReader::from_slice(&header_bytes(false, 1, 9, 1, 4, 0, &[])),
            None,
        )?;
        let b = FrameHeader::read(
            &mut BitReader::from_slice(&header_bytes(false, 12, 9, 1, 4, 7, &[])),
            None,
        )?;
        let c = FrameHeader::read(
            &mut BitReader::from_slice(&header_bytes(false, 1, 10, 1, 4, 0, &[])),
            None,
        )?;

        assert!(a.matches_format(&b));
        assert!(!a.matches_format(&c));
        Ok(())
    }
}
