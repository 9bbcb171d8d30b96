//! Seek index construction by header-only stream scanning.
//!
//! The scan walks the byte stream looking for the two-byte sync prefix
//! (0xFF, top five bits of the next byte all ones) and validates each
//! candidate with a full header parse, CRC-8 included, without touching
//! subframe data. The first parsed header fixes the stream format; later
//! candidates that disagree on sample rate, channel count or sample depth
//! are coincidental bit patterns inside frame payloads and are skipped.

use std::io::{Read, Seek, SeekFrom};

use anyhow::Result;
use log::debug;

use crate::process::read_fully;
use crate::structs::frame::{FrameHeader, MAX_FRAME_HEADER_SIZE};
use crate::structs::stream_info::StreamInfo;
use crate::utils::bitstream::BitReader;

const SCAN_BUFFER_SIZE: usize = 50_000;

/// One indexed frame: where it starts in the stream and how many samples
/// precede it.
#[derive(Debug, Clone)]
pub struct FrameInformation {
    pub stream_offset: u64,
    pub sample_offset: u64,
    pub header: FrameHeader,
}

/// Immutable sample-to-byte index over a whole stream.
///
/// Entries are strictly increasing in both stream offset and sample offset.
/// Building the index borrows the stream exclusively; run it on a separate
/// handle if the scan should happen off-thread.
#[derive(Debug)]
pub struct SeekIndex {
    frames: Vec<FrameInformation>,
    total_samples: u64,
}

impl SeekIndex {
    /// Scans from `first_frame_offset` to end of stream. The stream position
    /// is left unspecified; callers reposition before decoding.
    pub fn scan<R: Read + Seek>(
        stream: &mut R,
        first_frame_offset: u64,
        stream_info: &StreamInfo,
    ) -> Result<Self> {
        stream.seek(SeekFrom::Start(first_frame_offset))?;

        let mut buffer = vec![0u8; SCAN_BUFFER_SIZE];
        let mut frames: Vec<FrameInformation> = Vec::new();
        let mut base_header: Option<FrameHeader> = None;
        let mut total_samples = 0u64;

        loop {
            let chunk_start = stream.stream_position()?;
            let read = read_fully(stream, &mut buffer)?;

            // Inside the stream a candidate must fit the chunk whole so a
            // header never spans the boundary; the overlap rescan covers the
            // tail. At end of stream there is no next chunk, scan it all.
            let at_end = read < buffer.len();
            let scan_limit = if at_end {
                read.saturating_sub(1)
            } else {
                read - MAX_FRAME_HEADER_SIZE
            };

            let chunk = &buffer[..read];
            let mut i = 0;
            while i < scan_limit {
                if chunk[i] != 0xFF || chunk[i + 1] & 0xF8 != 0xF8 {
                    i += 1;
                    continue;
                }

                let mut reader = BitReader::from_slice(&chunk[i..]);
                let Ok(header) = FrameHeader::read(&mut reader, Some(stream_info)) else {
                    i += 1;
                    continue;
                };

                if let Some(base) = &base_header {
                    if !base.matches_format(&header) {
                        debug!(
                            "sync-patterned bytes at offset {} do not match the stream format",
                            chunk_start + i as u64
                        );
                        i += 1;
                        continue;
                    }
                } else {
                    base_header = Some(header.clone());
                }

                let block_size = header.block_size as u64;
                frames.push(FrameInformation {
                    stream_offset: chunk_start + i as u64,
                    sample_offset: total_samples,
                    header,
                });
                total_samples += block_size;

                i += (reader.position() >> 3) as usize;
            }

            if at_end {
                break;
            }
            stream.seek(SeekFrom::Current(-(MAX_FRAME_HEADER_SIZE as i64)))?;
        }

        debug!(
            "scan finished: {} frames, {} samples",
            frames.len(),
            total_samples
        );

        Ok(Self {
            frames,
            total_samples,
        })
    }

    pub fn frames(&self) -> &[FrameInformation] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total samples covered by the indexed frames.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// The last entry whose sample offset does not exceed `sample`.
    pub fn entry_for_sample(&self, sample: u64) -> Option<(usize, &FrameInformation)> {
        let upper = self
            .frames
            .partition_point(|frame| frame.sample_offset <= sample);
        let index = upper.checked_sub(1)?;

        Some((index, &self.frames[index]))
    }

    /// The first entry starting strictly after the given stream offset,
    /// used to resynchronize past a broken frame.
    pub fn entry_after_offset(&self, offset: u64) -> Option<(usize, &FrameInformation)> {
        let index = self
            .frames
            .partition_point(|frame| frame.stream_offset <= offset);

        self.frames.get(index).map(|frame| (index, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{constant_frame_mono_16, streaminfo_mono_16};
    use std::io::Cursor;

    #[test]
    fn scan_indexes_every_frame() -> Result<()> {
        let si = streaminfo_mono_16();

        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for n in 0..5u32 {
            offsets.push(data.len() as u64);
            data.extend(constant_frame_mono_16(n, n as i32));
        }
        let index = SeekIndex::scan(&mut Cursor::new(&data), 0, &si)?;
        assert_eq!(index.len(), 5);
        assert_eq!(index.total_samples(), 5 * 192);

        for (n, frame) in index.frames().iter().enumerate() {
            assert_eq!(frame.stream_offset, offsets[n]);
            assert_eq!(frame.sample_offset, n as u64 * 192);
            assert_eq!(frame.header.block_size, 192);
        }
        Ok(())
    }

    #[test]
    fn corrupted_header_is_skipped() -> Result<()> {
        let si = streaminfo_mono_16();

        let mut data = Vec::new();
        data.extend(constant_frame_mono_16(0, 1));

        // frame with a flipped CRC-8: a sync candidate that fails validation
        let mut broken = constant_frame_mono_16(1, 2);
        broken[5] ^= 0xFF;
        data.extend(&broken);

        let good_offset = data.len() as u64;
        data.extend(constant_frame_mono_16(2, 3));

        let index = SeekIndex::scan(&mut Cursor::new(&data), 0, &si)?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.frames()[1].stream_offset, good_offset);
        assert_eq!(index.frames()[1].sample_offset, 192);
        Ok(())
    }

    #[test]
    fn format_mismatches_are_false_positives() -> Result<()> {
        let si = streaminfo_mono_16();

        let mut data = Vec::new();
        data.extend(constant_frame_mono_16(0, 1));

        // a valid-looking stereo header cannot belong to this mono stream
        let mut w = crate::testutil::BitWriter::new();
        w.push_bits(0x3FFE, 14);
        w.push_bits(0, 2);
        w.push_bits(1, 4);
        w.push_bits(9, 4);
        w.push_bits(1, 4);
        w.push_bits(4, 3);
        w.push_bit(false);
        w.push_utf8(1);
        data.extend(crate::testutil::with_crc8(w.into_bytes()));

        data.extend(constant_frame_mono_16(1, 2));

        let index = SeekIndex::scan(&mut Cursor::new(&data), 0, &si)?;
        assert_eq!(index.len(), 2);
        Ok(())
    }

    #[test]
    fn entry_lookup_by_sample() -> Result<()> {
        let si = streaminfo_mono_16();

        let mut data = Vec::new();
        for n in 0..4u32 {
            data.extend(constant_frame_mono_16(n, 0));
        }

        let index = SeekIndex::scan(&mut Cursor::new(&data), 0, &si)?;

        let (i, entry) = index.entry_for_sample(0).unwrap();
        assert_eq!((i, entry.sample_offset), (0, 0));

        let (i, entry) = index.entry_for_sample(191).unwrap();
        assert_eq!((i, entry.sample_offset), (0, 0));

        let (i, entry) = index.entry_for_sample(192).unwrap();
        assert_eq!((i, entry.sample_offset), (1, 192));

        let (i, entry) = index.entry_for_sample(1_000_000).unwrap();
        assert_eq!((i, entry.sample_offset), (3, 3 * 192));
        Ok(())
    }

    #[test]
    fn empty_input_builds_empty_index() -> Result<()> {
        let si = streaminfo_mono_16();
        let index = SeekIndex::scan(&mut Cursor::new(&[0u8; 8]), 0, &si)?;
        assert!(index.is_empty());
        assert!(index.entry_for_sample(0).is_none());
        Ok(())
    }
}
