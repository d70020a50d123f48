// Audio decoding and DSP analysis.

pub mod analyze;
pub mod bpm;
pub mod decoder;
pub mod key;
