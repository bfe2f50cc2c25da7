use thiserror::Error;

/// Failures inside one scheduler tick.
///
/// These never terminate the loop: the tick reports a status event and the
/// next tick proceeds normally.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Matcher error: {0}")]
    Matcher(String),

    #[error("Frame source error: {0}")]
    FrameSource(String),
}
