#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder for the frame layer of FLAC (Free Lossless Audio Codec) streams.
//!
//! ### Bitstream Organization
//!
//! **External structure**: a `fLaC` marker, metadata blocks (StreamInfo
//! first), then a sequence of CRC-16-protected frames.
//! **Internal structure**: per frame, a CRC-8-protected header followed by
//! one subframe per channel (Constant, Verbatim, Fixed or LPC) whose
//! residuals are partitioned-Rice coded.
//!
//! ### Processing Steps
//!
//! 1. Parse the stream start with [`structs::stream_info::read_stream_start`]
//! 2. Optionally index the stream with [`process::scan::SeekIndex`]
//! 3. Decode audio with [`process::stream::StreamDecoder`] (or frame by
//!    frame with [`process::decode::FrameDecoder`])

/// Decoding pipelines for audio streams.
///
/// 1. **Frame decoding** ([`process::decode`]): one frame to interleaved PCM.
/// 2. **Stream scanning** ([`process::scan`]): header-only seek indexing.
/// 3. **Stream decoding** ([`process::stream`]): sequential read/seek loop.
pub mod process;

/// Data structures representing FLAC syntax elements.
///
/// - **StreamInfo** ([`structs::stream_info`]): stream-wide parameters
/// - **Frame headers** ([`structs::frame`]): per-frame format and position
/// - **Subframes** ([`structs::subframe`]): per-channel prediction data
/// - **Residuals** ([`structs::residual`]): partitioned-Rice entropy coding
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream reading** ([`utils::bitstream`]): MSB-first bit cursor
/// - **CRC validation** ([`utils::crc`]): frame and header checksums
/// - **Error handling** ([`utils::errors`]): per-layer error types
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;
