use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::capabilities::{CameraResult, InferenceResult};

// --- Request correlation ---

/// Tags one inference submission so late completions can be matched or dropped.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Event enum: capability results are boxed to keep the enum small ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Lifecycle & permission
    AppStarted,
    PermissionRequested,
    PermissionStatusReceived(Box<CameraResult>),

    // Preview & capture
    IntroDismissed,
    ToggleFacingRequested,
    CaptureRequested,
    CancelRequested,
    PreviewCommandCompleted(Box<CameraResult>),
    PhotoCaptured(Box<CameraResult>),

    // Inference
    SubmitRequested,
    InferenceCancelRequested,
    InferenceCompleted {
        request_id: RequestId,
        result: Box<InferenceResult>,
    },

    // Overlays
    ResultDismissed,
    NoticeDismissed,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::AppStarted => "app_started",
            Event::PermissionRequested => "permission_requested",
            Event::PermissionStatusReceived(_) => "permission_status_received",
            Event::IntroDismissed => "intro_dismissed",
            Event::ToggleFacingRequested => "toggle_facing_requested",
            Event::CaptureRequested => "capture_requested",
            Event::CancelRequested => "cancel_requested",
            Event::PreviewCommandCompleted(_) => "preview_command_completed",
            Event::PhotoCaptured(_) => "photo_captured",
            Event::SubmitRequested => "submit_requested",
            Event::InferenceCancelRequested => "inference_cancel_requested",
            Event::InferenceCompleted { .. } => "inference_completed",
            Event::ResultDismissed => "result_dismissed",
            Event::NoticeDismissed => "notice_dismissed",
        }
    }

    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Event::PermissionRequested
                | Event::IntroDismissed
                | Event::ToggleFacingRequested
                | Event::CaptureRequested
                | Event::CancelRequested
                | Event::SubmitRequested
                | Event::InferenceCancelRequested
                | Event::ResultDismissed
                | Event::NoticeDismissed
        )
    }
}
