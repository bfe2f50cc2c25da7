//! Frame and matcher interfaces supplied from outside the core.

use crate::error::RecognitionError;
use crate::overlay::FaceRegion;

/// Pull-based source of the most recent camera frame.
pub trait FrameSource: Send + 'static {
    type Frame: Send;

    /// The latest frame, or `None` when the camera has nothing.
    fn latest(&mut self) -> Option<Self::Frame>;
}

/// One recognition pass over a frame.
pub trait FaceMatcher<F>: Send + 'static {
    /// Locate the dominant face and compare it to the enrolled gallery.
    ///
    /// # Errors
    /// Returns an error when the matcher backend fails; the scheduler
    /// reports it as a status event and keeps ticking.
    fn match_with_box(
        &mut self,
        frame: &F,
        threshold: f32,
    ) -> Result<MatchOutcome, RecognitionError>;
}

/// What one matching pass produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Whether the best candidate cleared the distance threshold.
    pub matched: bool,

    /// Best candidate's name, when matched.
    pub name: Option<String>,

    /// Embedding distance of the best candidate (smaller is closer).
    pub distance: f32,

    /// Where the face was located, when one was found.
    pub region: Option<FaceRegion>,
}

impl MatchOutcome {
    /// No face located at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            matched: false,
            name: None,
            distance: f32::MAX,
            region: None,
        }
    }
}
