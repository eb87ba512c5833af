use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{CameraFacing, CaptureConfig, CapturedImage, PermissionStatus};
use crate::event::RequestId;
use crate::{AppError, ErrorKind};

#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Denied,
    Granted,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    Live,
    Frozen,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InferenceRequestState {
    Idle,
    InFlight { request_id: RequestId },
    Succeeded { text: String },
    Failed { error: AppError },
}

impl InferenceRequestState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }
}

/// A held still only exists while the preview is frozen, and a request only exists
/// alongside the still it was made from.
#[derive(Clone, Debug, Default, PartialEq)]
enum Preview {
    #[default]
    Live,
    Frozen {
        image: CapturedImage,
        request: InferenceRequestState,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingCapture {
    facing: CameraFacing,
    invalidated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("camera permission has not been granted")]
    PermissionNotGranted,
    #[error("a permission prompt is already showing")]
    PermissionPromptPending,
    #[error("preview is not live")]
    NotLive,
    #[error("preview is not frozen")]
    NotFrozen,
    #[error("a capture is already in progress")]
    CaptureInProgress,
    #[error("no capture is outstanding")]
    NoCaptureOutstanding,
    #[error("capture completed for a preview that no longer exists")]
    StaleCapture,
    #[error("an inference request is already in flight")]
    RequestInFlight,
    #[error("a result is showing and must be dismissed first")]
    ResultShowing,
    #[error("no inference request is in flight")]
    NoRequestInFlight,
    #[error("no result or error to dismiss")]
    NoResult,
    #[error("response does not belong to the in-flight request")]
    StaleResponse,
}

#[derive(Clone, Debug)]
pub struct Model {
    permission: PermissionState,
    settings_required: bool,
    permission_prompt_pending: bool,
    preview_started: bool,
    facing: CameraFacing,
    preview: Preview,
    capture: Option<PendingCapture>,
    first_run: bool,
    notice: Option<AppError>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            permission: PermissionState::Unknown,
            settings_required: false,
            permission_prompt_pending: false,
            preview_started: false,
            facing: CameraFacing::default(),
            preview: Preview::Live,
            capture: None,
            first_run: true,
            notice: None,
        }
    }
}

impl Model {
    // --- Accessors ---

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn settings_required(&self) -> bool {
        self.settings_required
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn preview_mode(&self) -> PreviewMode {
        match self.preview {
            Preview::Live => PreviewMode::Live,
            Preview::Frozen { .. } => PreviewMode::Frozen,
        }
    }

    pub fn pending_image(&self) -> Option<&CapturedImage> {
        match &self.preview {
            Preview::Frozen { image, .. } => Some(image),
            Preview::Live => None,
        }
    }

    /// `None` while live: a request cannot exist without a held still.
    pub fn request_state(&self) -> Option<&InferenceRequestState> {
        match &self.preview {
            Preview::Frozen { request, .. } => Some(request),
            Preview::Live => None,
        }
    }

    pub fn in_flight_request(&self) -> Option<RequestId> {
        match self.request_state() {
            Some(InferenceRequestState::InFlight { request_id }) => Some(*request_id),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight_request().is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn first_run(&self) -> bool {
        self.first_run
    }

    pub fn notice(&self) -> Option<&AppError> {
        self.notice.as_ref()
    }

    // --- Permission gate ---

    pub fn begin_permission_request(&mut self) -> Result<(), Rejection> {
        if self.permission_prompt_pending {
            return Err(Rejection::PermissionPromptPending);
        }
        self.permission_prompt_pending = true;
        Ok(())
    }

    /// Applies a status reported by the host. Returns `true` exactly once per grant,
    /// when the live preview should be started.
    pub fn apply_permission(&mut self, status: PermissionStatus) -> bool {
        self.permission_prompt_pending = false;

        if status.is_granted() {
            self.permission = PermissionState::Granted;
            self.settings_required = false;
            let start = !self.preview_started;
            self.preview_started = true;
            return start;
        }

        self.deny(status.should_show_settings_prompt());
        false
    }

    pub fn fail_permission(&mut self, error: AppError) {
        self.permission_prompt_pending = false;
        self.deny(false);
        self.notice = Some(error);
    }

    fn deny(&mut self, settings_required: bool) {
        self.permission = PermissionState::Denied;
        self.settings_required = settings_required;
        self.preview = Preview::Live;
        self.preview_started = false;
        if let Some(pending) = self.capture.as_mut() {
            pending.invalidated = true;
        }
    }

    // --- Capture/preview controller ---

    pub fn begin_capture(&mut self) -> Result<CaptureConfig, Rejection> {
        if self.permission != PermissionState::Granted {
            return Err(Rejection::PermissionNotGranted);
        }
        if !matches!(self.preview, Preview::Live) {
            return Err(Rejection::NotLive);
        }
        if self.capture.is_some() {
            return Err(Rejection::CaptureInProgress);
        }

        self.capture = Some(PendingCapture {
            facing: self.facing,
            invalidated: false,
        });
        Ok(CaptureConfig::default().with_facing(self.facing))
    }

    pub fn complete_capture(&mut self, image: CapturedImage) -> Result<(), Rejection> {
        let pending = self.capture.take().ok_or(Rejection::NoCaptureOutstanding)?;
        if pending.invalidated
            || pending.facing != self.facing
            || self.permission != PermissionState::Granted
            || !matches!(self.preview, Preview::Live)
        {
            return Err(Rejection::StaleCapture);
        }

        self.preview = Preview::Frozen {
            image,
            request: InferenceRequestState::Idle,
        };
        Ok(())
    }

    /// Clears the outstanding capture. A notice is recorded only for a capture that
    /// still belongs to the current preview.
    pub fn fail_capture(&mut self, error: Option<AppError>) -> Result<(), Rejection> {
        let pending = self.capture.take().ok_or(Rejection::NoCaptureOutstanding)?;
        if pending.invalidated || pending.facing != self.facing {
            return Err(Rejection::StaleCapture);
        }
        if let Some(error) = error {
            self.notice = Some(error);
        }
        Ok(())
    }

    /// Returns to live, dropping the held still and any request made from it.
    pub fn cancel(&mut self) -> Result<Option<RequestId>, Rejection> {
        let abandoned = self.in_flight_request();
        match self.preview {
            Preview::Frozen { .. } => {
                self.preview = Preview::Live;
                Ok(abandoned)
            }
            Preview::Live => Err(Rejection::NotFrozen),
        }
    }

    /// Flips the facing and forces the preview live. Returns whether a frozen still was dropped.
    pub fn toggle_facing(&mut self) -> Result<bool, Rejection> {
        if self.permission != PermissionState::Granted {
            return Err(Rejection::PermissionNotGranted);
        }

        self.facing = self.facing.toggled();
        if let Some(pending) = self.capture.as_mut() {
            pending.invalidated = true;
        }

        let was_frozen = matches!(self.preview, Preview::Frozen { .. });
        self.preview = Preview::Live;
        Ok(was_frozen)
    }

    // --- Inference request flow ---

    pub fn begin_submit(&mut self, request_id: RequestId) -> Result<&CapturedImage, Rejection> {
        match &mut self.preview {
            Preview::Live => Err(Rejection::NotFrozen),
            Preview::Frozen { image, request } => match request {
                InferenceRequestState::InFlight { .. } => Err(Rejection::RequestInFlight),
                InferenceRequestState::Succeeded { .. } => Err(Rejection::ResultShowing),
                InferenceRequestState::Idle | InferenceRequestState::Failed { .. } => {
                    *request = InferenceRequestState::InFlight { request_id };
                    Ok(&*image)
                }
            },
        }
    }

    /// Settles the in-flight request. Blank text is treated as a malformed response.
    pub fn complete_submit(
        &mut self,
        request_id: RequestId,
        outcome: Result<String, AppError>,
    ) -> Result<(), Rejection> {
        let request = match &mut self.preview {
            Preview::Frozen { request, .. } => request,
            Preview::Live => return Err(Rejection::StaleResponse),
        };

        match request {
            InferenceRequestState::InFlight { request_id: current } if *current == request_id => {}
            _ => return Err(Rejection::StaleResponse),
        }

        *request = match outcome {
            Ok(text) if text.trim().is_empty() => InferenceRequestState::Failed {
                error: AppError::new(
                    ErrorKind::MalformedResponse,
                    "inference returned no text",
                ),
            },
            Ok(text) => InferenceRequestState::Succeeded { text },
            Err(error) => InferenceRequestState::Failed { error },
        };
        Ok(())
    }

    /// Drops the in-flight request and keeps the still frozen for a resubmit.
    pub fn abandon_submit(&mut self) -> Result<RequestId, Rejection> {
        match &mut self.preview {
            Preview::Frozen { request, .. } => match *request {
                InferenceRequestState::InFlight { request_id } => {
                    *request = InferenceRequestState::Idle;
                    Ok(request_id)
                }
                _ => Err(Rejection::NoRequestInFlight),
            },
            Preview::Live => Err(Rejection::NoRequestInFlight),
        }
    }

    pub fn dismiss_result(&mut self) -> Result<(), Rejection> {
        match self.request_state() {
            Some(InferenceRequestState::Succeeded { .. } | InferenceRequestState::Failed { .. }) => {
                self.preview = Preview::Live;
                Ok(())
            }
            _ => Err(Rejection::NoResult),
        }
    }

    // --- Overlays ---

    pub fn dismiss_intro(&mut self) {
        self.first_run = false;
    }

    pub fn set_notice(&mut self, error: AppError) {
        self.notice = Some(error);
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ImageFormat;

    fn image() -> CapturedImage {
        CapturedImage::new("file:///tmp/leaf.jpg", None, ImageFormat::Jpeg, 640, 480, 1).unwrap()
    }

    fn granted() -> Model {
        let mut model = Model::default();
        assert!(model.apply_permission(PermissionStatus::Granted));
        model
    }

    fn frozen() -> Model {
        let mut model = granted();
        model.begin_capture().unwrap();
        model.complete_capture(image()).unwrap();
        model
    }

    #[test]
    fn defaults() {
        let model = Model::default();
        assert_eq!(model.permission(), PermissionState::Unknown);
        assert_eq!(model.facing(), CameraFacing::Back);
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert!(model.first_run());
        assert!(model.request_state().is_none());
    }

    #[test]
    fn grant_starts_preview_once() {
        let mut model = Model::default();
        assert!(model.apply_permission(PermissionStatus::Granted));
        assert!(!model.apply_permission(PermissionStatus::Granted));
    }

    #[test]
    fn downgrade_rearms_preview_start() {
        let mut model = frozen();
        assert!(!model.apply_permission(PermissionStatus::DeniedPermanently));
        assert_eq!(model.permission(), PermissionState::Denied);
        assert!(model.settings_required());
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert!(model.apply_permission(PermissionStatus::Granted));
        assert!(!model.settings_required());
    }

    #[test]
    fn not_determined_counts_as_denied() {
        let mut model = Model::default();
        model.apply_permission(PermissionStatus::NotDetermined);
        assert_eq!(model.permission(), PermissionState::Denied);
        assert!(!model.settings_required());
    }

    #[test]
    fn duplicate_permission_prompt_rejected() {
        let mut model = Model::default();
        model.begin_permission_request().unwrap();
        assert_eq!(
            model.begin_permission_request(),
            Err(Rejection::PermissionPromptPending)
        );
        model.apply_permission(PermissionStatus::Denied);
        assert!(model.begin_permission_request().is_ok());
    }

    #[test]
    fn capture_requires_permission() {
        let mut model = Model::default();
        assert_eq!(model.begin_capture(), Err(Rejection::PermissionNotGranted));
    }

    #[test]
    fn capture_freezes_preview() {
        let model = frozen();
        assert_eq!(model.preview_mode(), PreviewMode::Frozen);
        assert!(model.pending_image().is_some());
        assert_eq!(model.request_state(), Some(&InferenceRequestState::Idle));
    }

    #[test]
    fn capture_uses_fixed_parameters() {
        let mut model = granted();
        let config = model.begin_capture().unwrap();
        assert_eq!(config.quality, 50);
        assert_eq!(config.format, ImageFormat::Jpeg);
        assert!(config.include_payload);
        assert!(config.strip_metadata);
    }

    #[test]
    fn second_capture_rejected_while_outstanding() {
        let mut model = granted();
        model.begin_capture().unwrap();
        assert_eq!(model.begin_capture(), Err(Rejection::CaptureInProgress));
    }

    #[test]
    fn capture_not_allowed_while_frozen() {
        let mut model = frozen();
        assert_eq!(model.begin_capture(), Err(Rejection::NotLive));
    }

    #[test]
    fn capture_after_toggle_is_stale() {
        let mut model = granted();
        model.begin_capture().unwrap();
        model.toggle_facing().unwrap();
        assert_eq!(model.complete_capture(image()), Err(Rejection::StaleCapture));
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert!(!model.is_capturing());
    }

    #[test]
    fn capture_after_double_toggle_is_still_stale() {
        let mut model = granted();
        model.begin_capture().unwrap();
        model.toggle_facing().unwrap();
        model.toggle_facing().unwrap();
        assert_eq!(model.complete_capture(image()), Err(Rejection::StaleCapture));
    }

    #[test]
    fn failed_capture_records_notice() {
        let mut model = granted();
        model.begin_capture().unwrap();
        model
            .fail_capture(Some(AppError::new(ErrorKind::CaptureFailure, "boom")))
            .unwrap();
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert_eq!(model.notice().map(|e| e.kind), Some(ErrorKind::CaptureFailure));
    }

    #[test]
    fn cancel_returns_to_live() {
        let mut model = frozen();
        assert_eq!(model.cancel(), Ok(None));
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert!(model.pending_image().is_none());
        assert_eq!(model.cancel(), Err(Rejection::NotFrozen));
    }

    #[test]
    fn toggle_while_frozen_discards_still() {
        let mut model = frozen();
        assert_eq!(model.toggle_facing(), Ok(true));
        assert_eq!(model.facing(), CameraFacing::Front);
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert!(model.pending_image().is_none());
    }

    #[test]
    fn submit_rejected_while_in_flight() {
        let mut model = frozen();
        let first = RequestId::generate();
        model.begin_submit(first).unwrap();
        assert_eq!(
            model.begin_submit(RequestId::generate()).err(),
            Some(Rejection::RequestInFlight)
        );
        assert_eq!(model.in_flight_request(), Some(first));
    }

    #[test]
    fn submit_requires_frozen() {
        let mut model = granted();
        assert_eq!(
            model.begin_submit(RequestId::generate()).err(),
            Some(Rejection::NotFrozen)
        );
    }

    #[test]
    fn completion_stores_text() {
        let mut model = frozen();
        let id = RequestId::generate();
        model.begin_submit(id).unwrap();
        model.complete_submit(id, Ok("Healthy".into())).unwrap();
        assert_eq!(
            model.request_state(),
            Some(&InferenceRequestState::Succeeded { text: "Healthy".into() })
        );
        assert!(!model.is_loading());
    }

    #[test]
    fn blank_text_is_malformed() {
        let mut model = frozen();
        let id = RequestId::generate();
        model.begin_submit(id).unwrap();
        model.complete_submit(id, Ok("  \n".into())).unwrap();
        match model.request_state() {
            Some(InferenceRequestState::Failed { error }) => {
                assert_eq!(error.kind, ErrorKind::MalformedResponse);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn stale_completion_dropped() {
        let mut model = frozen();
        let id = RequestId::generate();
        model.begin_submit(id).unwrap();
        assert_eq!(
            model.complete_submit(RequestId::generate(), Ok("x".into())),
            Err(Rejection::StaleResponse)
        );
        assert_eq!(model.abandon_submit(), Ok(id));
        assert_eq!(
            model.complete_submit(id, Ok("x".into())),
            Err(Rejection::StaleResponse)
        );
        assert_eq!(model.request_state(), Some(&InferenceRequestState::Idle));
    }

    #[test]
    fn failed_request_can_be_retried() {
        let mut model = frozen();
        let id = RequestId::generate();
        model.begin_submit(id).unwrap();
        model
            .complete_submit(id, Err(AppError::new(ErrorKind::NetworkFailure, "down")))
            .unwrap();
        assert!(model.begin_submit(RequestId::generate()).is_ok());
    }

    #[test]
    fn dismiss_result_returns_to_live() {
        let mut model = frozen();
        assert_eq!(model.dismiss_result(), Err(Rejection::NoResult));
        let id = RequestId::generate();
        model.begin_submit(id).unwrap();
        model.complete_submit(id, Ok("fine".into())).unwrap();
        model.dismiss_result().unwrap();
        assert_eq!(model.preview_mode(), PreviewMode::Live);
        assert!(model.pending_image().is_none());
    }

    #[test]
    fn intro_dismissal_is_one_shot() {
        let mut model = Model::default();
        model.dismiss_intro();
        assert!(!model.first_run());
    }
}
