//! Media device interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::frame::Frame;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front-facing.
    User,
    Environment,
}

/// What a capture session asks the platform for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            ideal_width: 640,
            ideal_height: 480,
            audio: false,
        }
    }
}

/// A live camera stream. Owned by exactly one capture session.
pub trait MediaStream: Send {
    /// Natural dimensions of the video; `(0, 0)` until the first frame.
    fn video_dimensions(&self) -> (u32, u32);

    /// The frame currently shown in the preview.
    fn current_frame(&mut self) -> Option<Frame>;

    /// Stop every track. Returns how many tracks were stopped.
    fn stop_tracks(&mut self) -> usize;
}

/// Platform camera access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;
}
