//! Camera capture: device access, the one-shot session, frame encoding.

pub mod device;
pub mod frame;
mod session;

pub use device::{FacingMode, MediaDevices, MediaStream, StreamConstraints};
pub use frame::{encode_mirrored_jpeg, to_data_url, Frame};
pub use session::{
    CaptureConfig, CaptureGuard, CapturePhase, CaptureSession, CaptureStep, CapturedImage,
    FrameCache, SkipReason, PERMISSION_MESSAGE,
};
