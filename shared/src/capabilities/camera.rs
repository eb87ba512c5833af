use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_IMAGE_SIZE_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_CAPTURE_QUALITY: u8 = 50;
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 30_000;

pub struct Camera<E> {
    context: CapabilityContext<CameraOperation, E>,
}

impl<Ev> Capability<Ev> for Camera<Ev> {
    type Operation = CameraOperation;
    type MappedSelf<MappedEv> = Camera<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Camera::new(self.context.map_event(f))
    }
}

impl<E> Camera<E>
where
    E: Send + 'static,
{
    pub fn new(context: CapabilityContext<CameraOperation, E>) -> Self {
        Self { context }
    }

    pub fn check_permission<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::CheckPermission, callback);
    }

    pub fn request_permission<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::RequestPermission, callback);
    }

    pub fn start_preview<F>(&self, facing: CameraFacing, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::StartPreview { facing }, callback);
    }

    pub fn pause_preview<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::PausePreview, callback);
    }

    pub fn resume_preview<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::ResumePreview, callback);
    }

    pub fn capture_photo<F>(&self, config: CaptureConfig, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        let config = config.validated();
        self.request(CameraOperation::CapturePhoto { config }, callback);
    }

    fn request<F>(&self, operation: CameraOperation, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraOperation {
    CheckPermission,
    RequestPermission,
    StartPreview { facing: CameraFacing },
    PausePreview,
    ResumePreview,
    CapturePhoto { config: CaptureConfig },
}

impl Operation for CameraOperation {
    type Output = CameraResult;
}

impl CameraOperation {
    pub fn name(&self) -> &'static str {
        match self {
            CameraOperation::CheckPermission => "check_permission",
            CameraOperation::RequestPermission => "request_permission",
            CameraOperation::StartPreview { .. } => "start_preview",
            CameraOperation::PausePreview => "pause_preview",
            CameraOperation::ResumePreview => "resume_preview",
            CameraOperation::CapturePhoto { .. } => "capture_photo",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

impl CameraFacing {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Heic,
    WebP,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Heic => "image/heic",
            ImageFormat::WebP => "image/webp",
        }
    }

    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(ImageFormat::Png);
        }

        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        if &data[4..8] == b"ftyp" {
            let brand = &data[8..12];
            if brand == b"heic" || brand == b"heix" || brand == b"mif1" {
                return Some(ImageFormat::Heic);
            }
        }

        None
    }
}

/// Fixed capture parameters for the analysis flow. Only `facing` varies per shot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    pub facing: CameraFacing,
    pub format: ImageFormat,
    pub quality: u8,
    pub include_payload: bool,
    pub strip_metadata: bool,
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Back,
            format: ImageFormat::Jpeg,
            quality: DEFAULT_CAPTURE_QUALITY,
            include_payload: true,
            strip_metadata: true,
            timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.clamp(1000, 300_000);
        self
    }

    pub fn validated(mut self) -> Self {
        self.quality = self.quality.min(100);
        self.timeout_ms = self.timeout_ms.clamp(1000, 300_000);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    DeniedPermanently,
    Restricted,
    NotDetermined,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    pub fn should_show_settings_prompt(&self) -> bool {
        matches!(self, PermissionStatus::DeniedPermanently | PermissionStatus::Restricted)
    }
}

/// Handle to a captured still: the shell's URI plus, when requested, the encoded bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapturedImage {
    uri: String,
    data: Option<Vec<u8>>,
    format: ImageFormat,
    width: u32,
    height: u32,
    capture_time_ms: u64,
}

impl CapturedImage {
    pub fn new(
        uri: impl Into<String>,
        data: Option<Vec<u8>>,
        format: ImageFormat,
        width: u32,
        height: u32,
        capture_time_ms: u64,
    ) -> Result<Self, CameraError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(CameraError::InvalidImage {
                reason: "image uri is empty".to_string(),
            });
        }

        if let Some(bytes) = &data {
            if bytes.is_empty() {
                return Err(CameraError::InvalidImage {
                    reason: "image data is empty".to_string(),
                });
            }

            if bytes.len() > MAX_IMAGE_SIZE_BYTES {
                return Err(CameraError::ImageTooLarge {
                    size: bytes.len(),
                    max: MAX_IMAGE_SIZE_BYTES,
                });
            }

            if let Some(detected) = ImageFormat::from_magic_bytes(bytes) {
                if detected != format {
                    return Err(CameraError::InvalidImage {
                        reason: format!(
                            "format mismatch: declared {:?} but detected {:?}",
                            format, detected
                        ),
                    });
                }
            }
        }

        Ok(Self {
            uri,
            data,
            format,
            width,
            height,
            capture_time_ms,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn file_size(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    pub fn capture_time_ms(&self) -> u64 {
        self.capture_time_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraOutput {
    PermissionStatus(PermissionStatus),
    PreviewUpdated,
    Photo(CapturedImage),
    Cancelled,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("camera {facing:?} not available on this device")]
    CameraNotFound { facing: CameraFacing },

    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("capture timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("image too large: {size} bytes exceeds maximum of {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CameraError {
    pub fn is_permission_error(&self) -> bool {
        matches!(self, CameraError::PermissionDenied)
    }
}

pub type CameraResult = Result<CameraOutput, CameraError>;
