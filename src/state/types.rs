//! Loop state record

/// Mirrored state of one engine loop
///
/// All fields default to zero; a record exists from the first time any code
/// path references its index.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopState {
    /// Current recording-mode state code
    pub state: i32,
    /// Pending state code (what the loop switches to at the next boundary)
    pub next_state: i32,
    /// Normalized playback position, nominally 0..1
    pub loop_pos: f32,
    /// Input peak meter amplitude
    pub in_peak: f32,
    /// Output peak meter amplitude
    pub out_peak: f32,
    /// Wet level amplitude
    pub gain: f32,
}
