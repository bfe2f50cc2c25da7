//! Visual annotation published for live UI feedback.

use serde::{Deserialize, Serialize};

/// Overlay color for a matched face (green).
pub const MATCHED_COLOR: (u8, u8, u8) = (60, 220, 100);

/// Overlay color for an unknown face (amber).
pub const UNKNOWN_COLOR: (u8, u8, u8) = (60, 180, 255);

/// Axis-aligned face bounding box in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

/// Bounding box plus label plus color, published every tick a face region
/// was located — regardless of match outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub region: FaceRegion,
    pub label: String,
    pub color: (u8, u8, u8),
}

impl Overlay {
    /// Overlay for a recognized face.
    #[must_use]
    pub fn matched(region: FaceRegion, label: impl Into<String>) -> Self {
        Self {
            region,
            label: label.into(),
            color: MATCHED_COLOR,
        }
    }

    /// Overlay for a located but unrecognized face.
    #[must_use]
    pub fn unknown(region: FaceRegion) -> Self {
        Self {
            region,
            label: "Unknown".to_string(),
            color: UNKNOWN_COLOR,
        }
    }
}
