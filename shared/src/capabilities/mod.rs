mod camera;
mod inference;

pub use self::camera::{
    Camera, CameraError, CameraFacing, CameraOperation, CameraOutput, CameraResult, CaptureConfig,
    CapturedImage, ImageFormat, PermissionStatus, DEFAULT_CAPTURE_QUALITY,
    DEFAULT_CAPTURE_TIMEOUT_MS, MAX_IMAGE_SIZE_BYTES,
};
pub use self::inference::{
    GenerateRequest, Inference, InferenceError, InferenceOperation, InferenceOutput,
    InferenceResult, InlineImage, DEFAULT_INFERENCE_TIMEOUT_MS, MAX_INFERENCE_TIMEOUT_MS,
    MIN_INFERENCE_TIMEOUT_MS,
};

// Render comes straight from Crux; camera and inference are resolved by the shell.
pub use crux_core::render::Render;

use crate::event::Event;
use crate::App;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub camera: Camera<Event>,
    pub inference: Inference<Event>,
}
