pub mod frame;
pub mod residual;
pub mod stream_info;
pub mod subframe;
