#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum BitstreamError {
    #[error("Out of bounds read of {needed} bits at bit {position}")]
    InsufficientData { needed: u64, position: u64 },

    #[error("Invalid coded number")]
    InvalidCodedNumber,
}

#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("Invalid sync pattern. Read {0:#06X}, expected 0x3FFE")]
    InvalidSync(u32),

    #[error("Reserved frame header bit must be 0")]
    ReservedBitSet,

    #[error("Block size index {0} is invalid")]
    InvalidBlockSizeIndex(u8),

    #[error("Sample rate index {0} is reserved")]
    InvalidSampleRateIndex(u8),

    #[error("Sample rate index 0 requires StreamInfo")]
    MissingSampleRate,

    #[error("Invalid channel assignment field {0:#03X}")]
    InvalidChannelAssignment(u8),

    #[error("Bits-per-sample index {0} is reserved")]
    InvalidBitsPerSampleIndex(u8),

    #[error("Bits-per-sample index 0 requires StreamInfo")]
    MissingBitsPerSample,

    #[error("Invalid coded frame position")]
    InvalidPosition,

    #[error("Header CRC mismatch. Calculated {calculated:#04X}, read {read:#04X}")]
    CrcMismatch { calculated: u8, read: u8 },
}

#[derive(thiserror::Error, Debug)]
pub enum SubframeError {
    #[error("Reserved subframe header bit must be 0")]
    ReservedBitSet,

    #[error("Invalid subframe type field {0:#04X}")]
    InvalidType(u8),

    #[error("Wasted bits count {wasted} leaves no sample bits (bits per sample = {bits_per_sample})")]
    InvalidWastedBits { wasted: u32, bits_per_sample: u32 },

    #[error("Predictor order {order} exceeds block size {block_size}")]
    PredictorOrderTooLarge { order: usize, block_size: usize },

    #[error("Invalid LPC coefficient precision code")]
    InvalidCoefficientPrecision,

    #[error("Negative LPC prediction shift: {0}")]
    NegativeShift(i32),

    #[error("Reserved residual coding method {0}")]
    InvalidResidualMethod(u8),

    #[error("Partition order {0} does not divide the block")]
    InvalidPartitionOrder(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Frame CRC mismatch. Calculated {calculated:#06X}, read {read:#06X}")]
    CrcMismatch { calculated: u16, read: u16 },
}

#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Missing \"fLaC\" stream marker")]
    MissingStreamMarker,

    #[error("Missing StreamInfo metadata block")]
    MissingStreamInfo,

    #[error("Unsupported output bit depth: {0}")]
    UnsupportedBitsPerSample(u32),

    #[error("Seeking requires a seek index")]
    NotSeekable,
}
