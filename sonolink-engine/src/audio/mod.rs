//! Audio format handling: sample conversion, streaming resampling,
//! file decoding, and local device output.

pub mod convert;
pub mod decode;
pub mod output;
pub mod resampler;

pub use output::{CpalOutput, PcmOutput};
pub use resampler::StreamResampler;
