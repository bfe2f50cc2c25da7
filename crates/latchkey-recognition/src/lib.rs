//! Periodic face-recognition scheduler.
//!
//! Frames come from a pull-based source and matching is comparatively
//! expensive, so recognition runs as a fixed-period polling loop rather
//! than event-driven: the period bounds CPU cost and doubles as a debounce
//! window. A first qualifying match is *armed* and held for a confirmation
//! window before the hit callback commits it; door events pause and resume
//! the loop so a closing door never inherits a stale detection.
//!
//! Camera mechanics and embedding/matching internals stay behind
//! [`FrameSource`] and [`FaceMatcher`].

pub mod error;
pub mod overlay;
pub mod scheduler;
pub mod traits;

pub use error::RecognitionError;
pub use overlay::{FaceRegion, MATCHED_COLOR, Overlay, UNKNOWN_COLOR};
pub use scheduler::{PendingMatch, RecognitionCallbacks, RecognitionScheduler, SchedulerConfig};
pub use traits::{FaceMatcher, FrameSource, MatchOutcome};
