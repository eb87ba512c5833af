#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod capabilities;
pub mod event;
pub mod image_processing;
pub mod model;

#[cfg(feature = "native")]
pub mod native;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::capabilities::{CameraError, CameraFacing, InferenceError};
use crate::image_processing::ImageProcessingError;
use crate::model::{InferenceRequestState, Model, PermissionState, PreviewMode};

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use crux_core::App as CruxApp;
pub use event::{Event, RequestId};

pub const MAX_PROCESSED_DIMENSION: u32 = 1920;

pub const ANALYSIS_PROMPT: &str = "Analyze the provided image. If it contains a plant, give a brief summary of its overall condition, including any signs of health or disease you observe. If it does not contain a plant, say that you cannot provide information about it.";

pub const PERMISSION_DENIED_MESSAGE: &str = "To use this app, we need access to your camera.";
pub const PERMISSION_RETRY_LABEL: &str = "Grant permission";
pub const PERMISSION_SETTINGS_HINT: &str =
    "Camera access is turned off. Please enable it for this app in Settings.";

pub const FIRST_RUN_NOTICE: &str = "Welcome to the plant analysis app. Use it to capture images of plants and get a quick analysis of their overall condition. Press \"Close\" to continue.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    CaptureFailure,
    NetworkFailure,
    MalformedResponse,
    Timeout,
    ImageProcessing,
    Configuration,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::PermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::CaptureFailure => "CAPTURE_FAILED",
            Self::NetworkFailure => "NETWORK_ERROR",
            Self::MalformedResponse => "MALFORMED_RESPONSE",
            Self::Timeout => "TIMEOUT",
            Self::ImageProcessing => "IMAGE_PROCESSING_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::CaptureFailure
            | Self::NetworkFailure
            | Self::MalformedResponse
            | Self::Timeout => ErrorSeverity::Transient,

            Self::PermissionDenied | Self::ImageProcessing | Self::Configuration => {
                ErrorSeverity::Permanent
            }

            Self::Internal => ErrorSeverity::Fatal,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::CaptureFailure
                | Self::NetworkFailure
                | Self::MalformedResponse
                | Self::Timeout
        )
    }

    /// A malformed or late reply is reported to the user exactly like a lost connection.
    #[must_use]
    pub const fn is_network_failure(self) -> bool {
        matches!(
            self,
            Self::NetworkFailure | Self::MalformedResponse | Self::Timeout
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub const fn is_network_failure(&self) -> bool {
        self.kind.is_network_failure()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::PermissionDenied => PERMISSION_DENIED_MESSAGE.into(),
            ErrorKind::CaptureFailure => {
                "The photo could not be taken. Please try again.".into()
            }
            ErrorKind::NetworkFailure | ErrorKind::MalformedResponse => {
                "Unable to analyze the image. Please check your internet connection and try again."
                    .into()
            }
            ErrorKind::Timeout => "The analysis took too long. Please try again.".into(),
            ErrorKind::ImageProcessing => {
                "Unable to process the image. Please take another photo.".into()
            }
            ErrorKind::Configuration => {
                "The analysis service is not configured. Please contact support.".into()
            }
            ErrorKind::Internal => {
                "An unexpected error occurred. Please try again or restart the app.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<CameraError> for AppError {
    fn from(e: CameraError) -> Self {
        let kind = if e.is_permission_error() {
            ErrorKind::PermissionDenied
        } else {
            ErrorKind::CaptureFailure
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<InferenceError> for AppError {
    fn from(e: InferenceError) -> Self {
        match &e {
            InferenceError::Network { .. } | InferenceError::Cancelled => {
                AppError::new(ErrorKind::NetworkFailure, e.to_string())
            }
            InferenceError::Timeout { timeout_ms } => AppError::new(ErrorKind::Timeout, e.to_string())
                .with_context("timeout_ms", timeout_ms.to_string()),
            InferenceError::Api { status, .. } => {
                let kind = match status {
                    401 | 403 => ErrorKind::Configuration,
                    _ => ErrorKind::NetworkFailure,
                };
                AppError::new(kind, e.to_string()).with_context("http_status", status.to_string())
            }
            InferenceError::MalformedResponse { .. } => {
                AppError::new(ErrorKind::MalformedResponse, e.to_string())
            }
            InferenceError::MissingApiKey => AppError::new(ErrorKind::Configuration, e.to_string()),
        }
    }
}

impl From<ImageProcessingError> for AppError {
    fn from(e: ImageProcessingError) -> Self {
        AppError::new(ErrorKind::ImageProcessing, e.to_string())
    }
}

// --- View model ---

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Overlay {
    Result { text: String },
    Error { error: UserFacingError },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CameraView {
    pub facing: CameraFacing,
    pub mode: PreviewMode,
    pub frozen_image_uri: Option<String>,
    pub can_capture: bool,
    pub can_cancel: bool,
    pub can_submit: bool,
    pub can_toggle: bool,
    pub can_cancel_request: bool,
    pub is_loading: bool,
    pub overlay: Option<Overlay>,
    pub intro: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Screen {
    Blank,
    PermissionDenied {
        message: String,
        retry_label: String,
        settings_hint: Option<String>,
    },
    Camera(CameraView),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub screen: Screen,
    pub notice: Option<UserFacingError>,
}

impl ViewModel {
    pub fn camera(&self) -> Option<&CameraView> {
        match &self.screen {
            Screen::Camera(view) => Some(view),
            _ => None,
        }
    }
}

pub mod app {
    use tracing::{debug, info, warn};

    use super::*;
    use crate::capabilities::{
        CameraOutput, CameraResult, Capabilities, GenerateRequest, InferenceResult,
    };
    use crate::image_processing::ImageProcessor;

    #[derive(Default)]
    pub struct App {
        processor: ImageProcessor,
    }

    impl App {
        fn preview_completed(result: CameraResult) -> Event {
            Event::PreviewCommandCompleted(Box::new(result))
        }

        fn handle_permission_result(result: CameraResult, model: &mut Model, caps: &Capabilities) {
            match result {
                Ok(CameraOutput::PermissionStatus(status)) => {
                    info!(?status, "camera permission reported");
                    if model.apply_permission(status) {
                        caps.camera.start_preview(model.facing(), Self::preview_completed);
                    }
                }
                Ok(other) => {
                    warn!(?other, "unexpected camera output for permission query");
                    model.fail_permission(
                        AppError::new(ErrorKind::PermissionDenied, "unexpected camera output")
                            .with_internal(format!("{other:?}")),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "camera permission query failed");
                    model.fail_permission(AppError::new(ErrorKind::PermissionDenied, e.to_string()));
                }
            }
        }

        fn handle_photo(result: CameraResult, model: &mut Model, caps: &Capabilities) {
            let outcome = match result {
                Ok(CameraOutput::Photo(image)) => {
                    let uri = image.uri().to_string();
                    let captured_at = image.capture_time_ms();
                    let outcome = model.complete_capture(image);
                    if outcome.is_ok() {
                        info!(%uri, captured_at, "frame captured");
                        caps.camera.pause_preview(Self::preview_completed);
                    }
                    outcome
                }
                Ok(CameraOutput::Cancelled) => {
                    debug!("capture cancelled by shell");
                    model.fail_capture(None)
                }
                Ok(other) => {
                    warn!(?other, "unexpected camera output for capture");
                    model.fail_capture(Some(AppError::new(
                        ErrorKind::CaptureFailure,
                        "unexpected camera output",
                    )))
                }
                Err(e) => {
                    warn!(error = %e, "capture failed");
                    model.fail_capture(Some(e.into()))
                }
            };

            if let Err(rejection) = outcome {
                debug!(%rejection, "capture result dropped");
            }
        }

        fn submit(&self, model: &mut Model, caps: &Capabilities) {
            let request_id = RequestId::generate();
            let prepared = match model.begin_submit(request_id) {
                Ok(image) => self.processor.prepare_for_inference(image),
                Err(rejection) => {
                    debug!(%rejection, "submit rejected");
                    return;
                }
            };

            match prepared {
                Ok(inline) => {
                    info!(%request_id, mime_type = %inline.mime_type, bytes = inline.len(), "submitting frame");
                    caps.inference.generate(
                        GenerateRequest::new(ANALYSIS_PROMPT, inline),
                        move |result| Event::InferenceCompleted {
                            request_id,
                            result: Box::new(result),
                        },
                    );
                }
                Err(e) => {
                    if let Err(rejection) = model.complete_submit(request_id, Err(e.into())) {
                        warn!(%rejection, "could not record payload failure");
                    }
                }
            }
        }

        fn handle_inference(
            request_id: RequestId,
            result: InferenceResult,
            model: &mut Model,
        ) {
            let outcome = result
                .map(|output| output.text)
                .map_err(|e| {
                    warn!(%request_id, error = %e, "inference failed");
                    AppError::from(e)
                });

            match model.complete_submit(request_id, outcome) {
                Ok(()) => info!(%request_id, "inference settled"),
                Err(rejection) => debug!(%request_id, %rejection, "inference completion dropped"),
            }
        }
    }

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            let event_name = event.name();
            if event.is_user_initiated() {
                info!(event = event_name, "user action");
            } else {
                debug!(event = event_name, "update");
            }

            match event {
                Event::AppStarted => {
                    caps.camera
                        .check_permission(|result| Event::PermissionStatusReceived(Box::new(result)));
                    caps.render.render();
                }

                Event::PermissionRequested => {
                    match model.begin_permission_request() {
                        Ok(()) => caps.camera.request_permission(|result| {
                            Event::PermissionStatusReceived(Box::new(result))
                        }),
                        Err(rejection) => debug!(%rejection, "permission request ignored"),
                    }
                    caps.render.render();
                }

                Event::PermissionStatusReceived(result) => {
                    Self::handle_permission_result(*result, model, caps);
                    caps.render.render();
                }

                Event::PreviewCommandCompleted(result) => match *result {
                    Ok(_) => debug!("preview command completed"),
                    Err(e) => {
                        warn!(error = %e, "preview command failed");
                        model.set_notice(e.into());
                        caps.render.render();
                    }
                },

                Event::IntroDismissed => {
                    model.dismiss_intro();
                    caps.render.render();
                }

                Event::ToggleFacingRequested => {
                    match model.toggle_facing() {
                        Ok(was_frozen) => {
                            if was_frozen {
                                caps.camera.resume_preview(Self::preview_completed);
                            }
                            caps.camera.start_preview(model.facing(), Self::preview_completed);
                        }
                        Err(rejection) => debug!(%rejection, "toggle ignored"),
                    }
                    caps.render.render();
                }

                Event::CaptureRequested => {
                    match model.begin_capture() {
                        Ok(config) => caps
                            .camera
                            .capture_photo(config, |result| Event::PhotoCaptured(Box::new(result))),
                        Err(rejection) => debug!(%rejection, "capture ignored"),
                    }
                    caps.render.render();
                }

                Event::PhotoCaptured(result) => {
                    Self::handle_photo(*result, model, caps);
                    caps.render.render();
                }

                Event::CancelRequested => {
                    match model.cancel() {
                        Ok(abandoned) => {
                            if let Some(request_id) = abandoned {
                                info!(%request_id, "in-flight request abandoned");
                            }
                            caps.camera.resume_preview(Self::preview_completed);
                        }
                        Err(rejection) => debug!(%rejection, "cancel ignored"),
                    }
                    caps.render.render();
                }

                Event::SubmitRequested => {
                    self.submit(model, caps);
                    caps.render.render();
                }

                Event::InferenceCompleted { request_id, result } => {
                    Self::handle_inference(request_id, *result, model);
                    caps.render.render();
                }

                Event::InferenceCancelRequested => {
                    match model.abandon_submit() {
                        Ok(request_id) => info!(%request_id, "request cancelled by user"),
                        Err(rejection) => debug!(%rejection, "request cancel ignored"),
                    }
                    caps.render.render();
                }

                Event::ResultDismissed => {
                    match model.dismiss_result() {
                        Ok(()) => caps.camera.resume_preview(Self::preview_completed),
                        Err(rejection) => debug!(%rejection, "dismiss ignored"),
                    }
                    caps.render.render();
                }

                Event::NoticeDismissed => {
                    model.dismiss_notice();
                    caps.render.render();
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            let screen = match model.permission() {
                PermissionState::Unknown => Screen::Blank,

                PermissionState::Denied => Screen::PermissionDenied {
                    message: PERMISSION_DENIED_MESSAGE.into(),
                    retry_label: PERMISSION_RETRY_LABEL.into(),
                    settings_hint: model
                        .settings_required()
                        .then(|| PERMISSION_SETTINGS_HINT.to_string()),
                },

                PermissionState::Granted => {
                    let mode = model.preview_mode();
                    let is_loading = model.is_loading();

                    let overlay = match model.request_state() {
                        Some(InferenceRequestState::Succeeded { text }) => {
                            Some(Overlay::Result { text: text.clone() })
                        }
                        Some(InferenceRequestState::Failed { error }) => Some(Overlay::Error {
                            error: UserFacingError::from(error),
                        }),
                        _ => None,
                    };

                    let can_submit = matches!(
                        model.request_state(),
                        Some(InferenceRequestState::Idle | InferenceRequestState::Failed { .. })
                    );

                    Screen::Camera(CameraView {
                        facing: model.facing(),
                        mode,
                        frozen_image_uri: model.pending_image().map(|img| img.uri().to_string()),
                        can_capture: mode == PreviewMode::Live && !model.is_capturing(),
                        can_cancel: mode == PreviewMode::Frozen && !is_loading && overlay.is_none(),
                        can_submit,
                        can_toggle: !is_loading,
                        can_cancel_request: is_loading,
                        is_loading,
                        overlay,
                        intro: model.first_run().then(|| FIRST_RUN_NOTICE.to_string()),
                    })
                }
            };

            ViewModel {
                screen,
                notice: model.notice().map(UserFacingError::from),
            }
        }
    }
}
