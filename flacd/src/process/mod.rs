use std::io::Read;

/// Frame decoding to interleaved PCM.
///
/// Provides the [`FrameDecoder`](decode::FrameDecoder) that turns one frame
/// at the current stream position into interleaved little-endian samples.
pub mod decode;

/// Seek index construction.
///
/// Provides the [`SeekIndex`](scan::SeekIndex) built by a header-only scan
/// over the whole stream, mapping sample offsets to byte offsets.
pub mod scan;

/// Sequential stream decoding.
///
/// Provides the [`StreamDecoder`](stream::StreamDecoder), the top-level
/// read/seek loop over a seekable FLAC stream.
pub mod stream;

/// Fallback frame buffer size when StreamInfo does not bound frame sizes.
pub(crate) const DEFAULT_FRAME_BUFFER_SIZE: usize = 0x20000;

/// Reads until `buf` is full or the source is exhausted, returning the
/// number of bytes read.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled)
}

#[test]
fn read_fully_short_source() {
    let mut source = std::io::Cursor::new(vec![1u8, 2, 3]);
    let mut buf = [0u8; 8];
    assert_eq!(read_fully(&mut source, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], &[1, 2, 3]);
}
