use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 60_000;
pub const MIN_INFERENCE_TIMEOUT_MS: u64 = 1_000;
pub const MAX_INFERENCE_TIMEOUT_MS: u64 = 300_000;

/// Sends a prompt plus one inline image to a remote text-and-image model.
pub struct Inference<E> {
    context: CapabilityContext<InferenceOperation, E>,
}

impl<Ev> Capability<Ev> for Inference<Ev> {
    type Operation = InferenceOperation;
    type MappedSelf<MappedEv> = Inference<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Inference::new(self.context.map_event(f))
    }
}

impl<E> Inference<E>
where
    E: Send + 'static,
{
    pub fn new(context: CapabilityContext<InferenceOperation, E>) -> Self {
        Self { context }
    }

    pub fn generate<F>(&self, request: GenerateRequest, callback: F)
    where
        F: FnOnce(InferenceResult) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context
                .request_from_shell(InferenceOperation::Generate(request))
                .await;
            context.update_app(callback(result));
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InferenceOperation {
    Generate(GenerateRequest),
}

impl Operation for InferenceOperation {
    type Output = InferenceResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: InlineImage,
    pub timeout_ms: u64,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self {
            prompt: prompt.into(),
            image,
            timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.clamp(MIN_INFERENCE_TIMEOUT_MS, MAX_INFERENCE_TIMEOUT_MS);
        self
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InferenceOutput {
    pub text: String,
}

impl InferenceOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum InferenceError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("inference timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("inference API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed inference response: {reason}")]
    MalformedResponse { reason: String },

    #[error("inference API key is not configured")]
    MissingApiKey,

    #[error("inference request cancelled")]
    Cancelled,
}

pub type InferenceResult = Result<InferenceOutput, InferenceError>;
