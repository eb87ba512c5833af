//! Headless effect loop that drives the core with real or fake devices.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use crux_core::{Core, Request};
use tracing::{debug, warn};

use crate::capabilities::{
    CameraError, CameraOperation, CameraResult, GenerateRequest, InferenceError,
    InferenceOperation, InferenceResult,
};
use crate::{App, Capabilities, Effect, Event, ViewModel};

#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn perform(&self, operation: CameraOperation) -> CameraResult;
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> InferenceResult;
}

/// Stands in for a backend that could not be configured.
#[async_trait]
impl<T: InferenceBackend> InferenceBackend for Option<T> {
    async fn generate(&self, request: GenerateRequest) -> InferenceResult {
        match self {
            Some(backend) => backend.generate(request).await,
            None => Err(InferenceError::MissingApiKey),
        }
    }
}

/// Drives the core with a camera device and an inference backend.
///
/// Camera effects are performed as soon as they appear. Inference requests are parked
/// until [`Shell::settle`], so callers can observe the loading view and cancel in between.
pub struct Shell<C, I> {
    core: Core<Effect, App>,
    camera: C,
    inference: I,
    parked: VecDeque<Request<InferenceOperation>>,
    renders: usize,
}

impl<C, I> Shell<C, I>
where
    C: CameraDevice,
    I: InferenceBackend,
{
    pub fn new(camera: C, inference: I) -> Self {
        Self {
            core: Core::new::<Capabilities>(),
            camera,
            inference,
            parked: VecDeque::new(),
            renders: 0,
        }
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn inference(&self) -> &I {
        &self.inference
    }

    pub fn render_count(&self) -> usize {
        self.renders
    }

    pub fn parked_requests(&self) -> usize {
        self.parked.len()
    }

    pub fn view(&self) -> ViewModel {
        self.core.view()
    }

    /// Sends `event` and then settles every inference request it leads to.
    pub async fn dispatch(&mut self, event: Event) -> ViewModel {
        self.send(event).await;
        self.settle().await
    }

    /// Processes `event` and its camera effects, parking any inference request.
    pub async fn send(&mut self, event: Event) -> ViewModel {
        debug!(event = event.name(), "dispatch");
        let effects = self.core.process_event(event);
        self.run(effects).await;
        self.core.view()
    }

    /// Resolves parked inference requests oldest first, along with whatever they lead to.
    pub async fn settle(&mut self) -> ViewModel {
        while let Some(mut request) = self.parked.pop_front() {
            let InferenceOperation::Generate(generate) = request.operation.clone();
            let output = self.generate(generate).await;
            let effects = self.core.resolve(&mut request, output);
            self.run(effects).await;
        }
        self.core.view()
    }

    async fn run(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Render(_) => self.renders += 1,

                Effect::Camera(mut request) => {
                    let output = self.perform_camera(request.operation.clone()).await;
                    queue.extend(self.core.resolve(&mut request, output));
                }

                Effect::Inference(request) => {
                    debug!(parked = self.parked.len() + 1, "inference request parked");
                    self.parked.push_back(request);
                }
            }
        }
    }

    async fn perform_camera(&self, operation: CameraOperation) -> CameraResult {
        let name = operation.name();
        let timeout_ms = match &operation {
            CameraOperation::CapturePhoto { config } => Some(config.timeout_ms),
            _ => None,
        };

        let result = match timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.camera.perform(operation),
            )
            .await
            .unwrap_or_else(|_| {
                warn!(timeout_ms, "capture timed out");
                Err(CameraError::Timeout { timeout_ms })
            }),
            None => self.camera.perform(operation).await,
        };

        if let Err(e) = &result {
            warn!(operation = name, error = %e, "camera operation failed");
        }
        result
    }

    async fn generate(&self, request: GenerateRequest) -> InferenceResult {
        let timeout_ms = request.timeout_ms;
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.inference.generate(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms, "inference timed out");
                Err(InferenceError::Timeout { timeout_ms })
            }
        }
    }
}
