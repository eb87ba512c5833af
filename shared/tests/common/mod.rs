#![allow(dead_code)]

use std::collections::VecDeque;

use crux_core::testing::{AppTester, Update};
use crux_core::Request;
use image::{ExtendedColorType, ImageEncoder};

use leafscan_shared::capabilities::{
    CameraFacing, CameraOperation, CameraOutput, CameraResult, CapturedImage, GenerateRequest,
    ImageFormat, InferenceOperation, InferenceOutput, InferenceResult, PermissionStatus,
};
use leafscan_shared::model::Model;
use leafscan_shared::{App, CameraView, Effect, Event, ViewModel};

pub const HEALTHY: &str = "Healthy plant, no visible disease";

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height)
        .flat_map(|i| [(i % 251) as u8, 120, 40])
        .collect();
    let mut buffer = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 50)
        .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buffer
}

pub fn photo(uri: &str) -> CapturedImage {
    CapturedImage::new(uri, Some(jpeg_bytes(16, 12)), ImageFormat::Jpeg, 16, 12, 1_700_000_000_000)
        .unwrap()
}

pub fn granted() -> CameraResult {
    Ok(CameraOutput::PermissionStatus(PermissionStatus::Granted))
}

pub fn status(status: PermissionStatus) -> CameraResult {
    Ok(CameraOutput::PermissionStatus(status))
}

pub fn preview_ok() -> CameraResult {
    Ok(CameraOutput::PreviewUpdated)
}

pub fn text(text: &str) -> InferenceResult {
    Ok(InferenceOutput::new(text))
}

fn is_preview_command(op: &CameraOperation) -> bool {
    matches!(
        op,
        CameraOperation::StartPreview { .. }
            | CameraOperation::PausePreview
            | CameraOperation::ResumePreview
    )
}

/// Drives the app through `AppTester`, feeding follow-up events back in and
/// queueing shell-bound effects until a test resolves them.
pub struct Harness {
    app: AppTester<App, Effect>,
    pub model: Model,
    pending: VecDeque<Effect>,
    pub renders: usize,
    pub inference_requests: usize,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            app: AppTester::default(),
            model: Model::default(),
            pending: VecDeque::new(),
            renders: 0,
            inference_requests: 0,
        }
    }

    /// Starts the app and grants permission, leaving a live back-facing preview.
    pub fn started() -> Self {
        let mut harness = Self::new();
        harness.send(Event::AppStarted);
        assert_eq!(
            harness.resolve_camera(granted()),
            CameraOperation::CheckPermission
        );
        assert_eq!(
            harness.resolve_camera(preview_ok()),
            CameraOperation::StartPreview {
                facing: CameraFacing::Back
            }
        );
        harness.send(Event::IntroDismissed);
        harness
    }

    /// A started app holding a frozen capture.
    pub fn frozen() -> Self {
        let mut harness = Self::started();
        harness.send(Event::CaptureRequested);
        harness.resolve_camera(Ok(CameraOutput::Photo(photo("file:///leaf.jpg"))));
        assert_eq!(harness.resolve_camera(preview_ok()), CameraOperation::PausePreview);
        harness
    }

    pub fn send(&mut self, event: Event) {
        let update = self.app.update(event, &mut self.model);
        self.absorb(update);
    }

    fn absorb(&mut self, update: Update<Effect, Event>) {
        for effect in update.effects {
            match effect {
                Effect::Render(_) => self.renders += 1,
                Effect::Inference(request) => {
                    self.inference_requests += 1;
                    self.pending.push_back(Effect::Inference(request));
                }
                other => self.pending.push_back(other),
            }
        }
        for event in update.events {
            self.send(event);
        }
    }

    pub fn camera_ops(&self) -> Vec<CameraOperation> {
        self.pending
            .iter()
            .filter_map(|effect| match effect {
                Effect::Camera(request) => Some(request.operation.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pending_inference(&self) -> usize {
        self.pending
            .iter()
            .filter(|effect| matches!(effect, Effect::Inference(_)))
            .count()
    }

    fn take_camera<P>(&mut self, wanted: P) -> Request<CameraOperation>
    where
        P: Fn(&CameraOperation) -> bool,
    {
        let index = self
            .pending
            .iter()
            .position(|effect| matches!(effect, Effect::Camera(request) if wanted(&request.operation)))
            .expect("no matching camera request");
        match self.pending.remove(index) {
            Some(Effect::Camera(request)) => request,
            _ => unreachable!(),
        }
    }

    fn resolve_camera_request(
        &mut self,
        mut request: Request<CameraOperation>,
        output: CameraResult,
    ) -> CameraOperation {
        let operation = request.operation.clone();
        let update = self.app.resolve(&mut request, output).expect("resolve camera");
        self.absorb(update);
        operation
    }

    /// Resolves the oldest pending camera request and returns its operation.
    pub fn resolve_camera(&mut self, output: CameraResult) -> CameraOperation {
        let request = self.take_camera(|_| true);
        self.resolve_camera_request(request, output)
    }

    /// Resolves every pending preview command successfully, leaving captures queued.
    pub fn settle_preview(&mut self) -> Vec<CameraOperation> {
        let mut settled = Vec::new();
        while self.camera_ops().iter().any(is_preview_command) {
            let request = self.take_camera(is_preview_command);
            settled.push(self.resolve_camera_request(request, preview_ok()));
        }
        settled
    }

    pub fn take_inference(&mut self) -> Request<InferenceOperation> {
        let index = self
            .pending
            .iter()
            .position(|effect| matches!(effect, Effect::Inference(_)))
            .expect("no pending inference request");
        match self.pending.remove(index) {
            Some(Effect::Inference(request)) => request,
            _ => unreachable!(),
        }
    }

    pub fn resolve_held(&mut self, request: &mut Request<InferenceOperation>, output: InferenceResult) {
        let update = self.app.resolve(request, output).expect("resolve inference");
        self.absorb(update);
    }

    /// Resolves the oldest pending inference request and returns what was sent.
    pub fn resolve_inference(&mut self, output: InferenceResult) -> GenerateRequest {
        let mut request = self.take_inference();
        let InferenceOperation::Generate(sent) = request.operation.clone();
        self.resolve_held(&mut request, output);
        sent
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    pub fn camera_view(&self) -> CameraView {
        self.view().camera().cloned().expect("camera screen")
    }
}
