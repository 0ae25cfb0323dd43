use crate::gemini::{DesignService, GeminiError};
use crate::media;
use crate::models::{DesignConfiguration, GearCategory, GeneratedVariant};
use crate::session::{reduce, Action, Failure, FailureKind, Operation, SessionState};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn, error};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("no image has been uploaded")]
    NoImage,
    #[error("{:?} failed: {}", .0.operation, .0.message)]
    Failed(Failure),
    /// A newer request of the same kind started while this one was in flight.
    #[error("result superseded by a newer request")]
    Superseded,
}

fn failure_kind(err: &GeminiError) -> FailureKind {
    if err.is_malformed() { FailureKind::MalformedResponse } else { FailureKind::Network }
}

/// A generation that has been started but not yet sent.
#[derive(Debug)]
pub struct PendingGeneration {
    ticket: u64,
    original: String,
    config: DesignConfiguration,
}

/// One design session: its state plus the service that feeds it.
pub struct Studio {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    last_active: Mutex<DateTime<Utc>>,
    state: RwLock<SessionState>,
    service: Arc<dyn DesignService>,
}

impl Studio {
    pub fn new(service: Arc<dyn DesignService>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_active: Mutex::new(now),
            state: RwLock::new(SessionState::default()),
            service,
        }
    }

    pub fn touch(&self) {
        *self.last_active.lock() = Utc::now();
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.state.read().is_busy()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn dispatch(&self, action: Action) {
        self.dispatch_then(action, |_| ());
    }

    /// Applies `action` and reads from the resulting state under the same lock.
    fn dispatch_then<R>(&self, action: Action, read: impl FnOnce(&SessionState) -> R) -> R {
        let mut guard = self.state.write();
        let current = std::mem::take(&mut *guard);
        *guard = reduce(current, action);
        read(&guard)
    }

    /// Stores the image as both original and active, then asks the service for an analysis.
    pub async fn upload(&self, bytes: &[u8], declared_mime: Option<&str>) -> Result<SessionState, StudioError> {
        let ticket = self.begin_upload(bytes, declared_mime);
        self.analyze(ticket, bytes).await
    }

    /// Synchronous half of [`Studio::upload`]: the image is visible and the
    /// session is marked as analysing once this returns.
    pub fn begin_upload(&self, bytes: &[u8], declared_mime: Option<&str>) -> u64 {
        let mime = media::sniff_mime(bytes, declared_mime);
        let data_uri = media::encode_data_uri(&mime, bytes);
        info!(session = %self.id, %mime, "📸 Image uploaded ({} bytes)", bytes.len());
        self.dispatch_then(Action::ImageUploaded { data_uri }, |s| s.analysis_ticket)
    }

    pub async fn analyze(&self, ticket: u64, bytes: &[u8]) -> Result<SessionState, StudioError> {
        let mut in_flight = InFlight::new(self, Operation::Analysis, ticket);
        let result = self.service.analyze(bytes).await;
        in_flight.disarm();

        match result {
            Ok(analysis) => {
                let category = GearCategory::from_analysis(&analysis.category);
                if category.is_none() {
                    warn!(session = %self.id, "🤷 No category matches '{}', keeping current selection", analysis.category);
                }
                let landed = self.dispatch_then(Action::AnalysisCompleted { ticket, analysis, category }, |s| s.analysis_ticket == ticket);
                if !landed {
                    return Err(StudioError::Superseded);
                }
                info!(session = %self.id, "✅ Analysis applied");
                Ok(self.snapshot())
            }
            Err(e) => {
                error!(session = %self.id, "❌ Analysis failed: {}", e);
                Err(self.fail(Operation::Analysis, ticket, failure_kind(&e), e.to_string()))
            }
        }
    }

    /// Renders a new variant from the original image and the current configuration.
    pub async fn generate(&self) -> Result<GeneratedVariant, StudioError> {
        let pending = self.begin_generation()?;
        self.render(pending).await
    }

    /// Marks the session as generating and captures what the request will use.
    pub fn begin_generation(&self) -> Result<PendingGeneration, StudioError> {
        self.dispatch_then(Action::GenerationStarted, |s| {
            s.original_image.clone().map(|original| PendingGeneration {
                ticket: s.generation_ticket,
                original,
                config: s.config.clone(),
            })
        })
        .ok_or(StudioError::NoImage)
    }

    pub async fn render(&self, pending: PendingGeneration) -> Result<GeneratedVariant, StudioError> {
        let PendingGeneration { ticket, original, config } = pending;
        let mut in_flight = InFlight::new(self, Operation::Generation, ticket);

        let base = match media::decode_data_uri(&original) {
            Ok(decoded) => decoded.bytes,
            Err(e) => {
                in_flight.disarm();
                return Err(self.fail(Operation::Generation, ticket, FailureKind::MalformedResponse, e.to_string()));
            }
        };

        info!(session = %self.id, "🎨 Generating {} {} in {}", config.style.label(), config.category.label(), config.material.label());
        let result = self.service.render_variant(&base, &config).await;
        in_flight.disarm();

        match result {
            Ok(image_url) => {
                let created_at = Utc::now();
                let action = Action::GenerationCompleted { ticket, image_url, config, created_at };
                let outcome = self.dispatch_then(action, |s| {
                    if s.generation_ticket != ticket {
                        return Err(StudioError::Superseded);
                    }
                    match s.variants.first() {
                        Some(v) if v.created_at == created_at => Ok(v.clone()),
                        _ => Err(StudioError::Failed(s.last_failure.clone().unwrap_or_else(|| Failure {
                            operation: Operation::Generation,
                            kind: FailureKind::MalformedResponse,
                            message: "empty image".into(),
                            at: created_at,
                        }))),
                    }
                });
                if let Ok(v) = &outcome {
                    info!(session = %self.id, variant = %v.id, "✅ Variant generated");
                }
                outcome
            }
            Err(e) => {
                error!(session = %self.id, "❌ Generation failed: {}", e);
                Err(self.fail(Operation::Generation, ticket, failure_kind(&e), e.to_string()))
            }
        }
    }

    fn fail(&self, operation: Operation, ticket: u64, kind: FailureKind, message: String) -> StudioError {
        let failure = Failure { operation, kind, message, at: Utc::now() };
        let action = match operation {
            Operation::Analysis => Action::AnalysisFailed { ticket, failure: failure.clone() },
            Operation::Generation => Action::GenerationFailed { ticket, failure: failure.clone() },
        };
        let current = self.dispatch_then(action, |s| match operation {
            Operation::Analysis => s.analysis_ticket == ticket,
            Operation::Generation => s.generation_ticket == ticket,
        });
        if current { StudioError::Failed(failure) } else { StudioError::Superseded }
    }
}

/// Clears the in-flight flag if the owning future is dropped mid-request.
struct InFlight<'a> {
    studio: &'a Studio,
    operation: Operation,
    ticket: u64,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(studio: &'a Studio, operation: Operation, ticket: u64) -> Self {
        Self { studio, operation, ticket, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(session = %self.studio.id, "⏹️ {:?} abandoned before completion", self.operation);
            self.studio.fail(self.operation, self.ticket, FailureKind::Interrupted, "request abandoned".into());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{DesignStyle, GearAnalysis, KeyPoint, KeyPointKind};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Scripted stand-in for the Gemini client.
    #[derive(Default)]
    pub(crate) struct FakeService {
        pub analysis: Mutex<Option<Result<GearAnalysis, String>>>,
        pub images: Mutex<Vec<String>>,
        pub hang: bool,
        pub seen_configs: Mutex<Vec<DesignConfiguration>>,
        pub seen_images: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeService {
        pub(crate) fn analysing(category: &str) -> Self {
            let analysis = GearAnalysis {
                category: category.into(),
                analysis: "Two straps around a hinged shell.".into(),
                keypoints: vec![KeyPoint { x: 0.25, y: 0.75, label: "Hinge".into(), kind: KeyPointKind::Joint }],
            };
            Self { analysis: Mutex::new(Some(Ok(analysis))), ..Default::default() }
        }

        pub(crate) fn with_images(self, images: &[&str]) -> Self {
            *self.images.lock() = images.iter().rev().map(|s| s.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl DesignService for FakeService {
        async fn analyze(&self, image: &[u8]) -> Result<GearAnalysis, GeminiError> {
            self.seen_images.lock().push(image.to_vec());
            if self.hang {
                std::future::pending::<()>().await;
            }
            match self.analysis.lock().clone() {
                Some(Ok(a)) => Ok(a),
                Some(Err(msg)) => Err(GeminiError::Malformed(msg)),
                None => Err(GeminiError::NoImage),
            }
        }

        async fn render_variant(&self, image: &[u8], config: &DesignConfiguration) -> Result<String, GeminiError> {
            self.seen_images.lock().push(image.to_vec());
            self.seen_configs.lock().push(config.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.images.lock().pop().ok_or(GeminiError::NoImage)
        }
    }

    fn studio(service: FakeService) -> (Studio, Arc<FakeService>) {
        let service = Arc::new(service);
        (Studio::new(service.clone()), service)
    }

    #[tokio::test]
    async fn upload_then_analysis_updates_category_and_points() {
        let (studio, _) = studio(FakeService::analysing("Knee Support"));
        studio.dispatch(Action::Configure(crate::models::ConfigPatch { category: Some(GearCategory::Ankle), ..Default::default() }));

        let state = studio.upload(b"jpeg-bytes", Some("image/jpeg")).await.unwrap();
        assert_eq!(state.config.category, GearCategory::Knee);
        assert_eq!(state.keypoints.len(), 1);
        assert!(!state.processing);
        assert_eq!(state.original_image.as_deref(), Some("data:image/jpeg;base64,anBlZy1ieXRlcw=="));
    }

    #[tokio::test]
    async fn unmatched_category_keeps_selection_but_applies_points() {
        let (studio, _) = studio(FakeService::analysing("Helmet"));
        studio.dispatch(Action::Configure(crate::models::ConfigPatch { category: Some(GearCategory::Elbow), ..Default::default() }));

        let state = studio.upload(b"jpeg-bytes", None).await.unwrap();
        assert_eq!(state.config.category, GearCategory::Elbow);
        assert_eq!(state.keypoints.len(), 1);
        assert_eq!(state.analysis.as_deref(), Some("Two straps around a hinged shell."));
    }

    #[tokio::test]
    async fn failed_analysis_keeps_category() {
        let service = FakeService { analysis: Mutex::new(Some(Err("not json".into()))), ..Default::default() };
        let (studio, _) = studio(service);
        studio.dispatch(Action::Configure(crate::models::ConfigPatch { category: Some(GearCategory::Wrist), ..Default::default() }));

        let err = studio.upload(b"img", None).await.unwrap_err();
        let state = studio.snapshot();
        assert!(matches!(err, StudioError::Failed(ref f) if f.kind == FailureKind::MalformedResponse));
        assert_eq!(state.config.category, GearCategory::Wrist);
        assert!(!state.processing);
        assert!(state.active_image.is_some());
    }

    #[tokio::test]
    async fn generate_without_upload_is_rejected() {
        let (studio, service) = studio(FakeService::default());
        assert!(matches!(studio.generate().await, Err(StudioError::NoImage)));
        assert!(service.seen_configs.lock().is_empty());
        assert!(!studio.snapshot().generating);
    }

    #[tokio::test]
    async fn two_generations_in_sequence() {
        let (studio, service) = studio(FakeService::analysing("knee").with_images(&["data:image/png;base64,AAAA", "data:image/png;base64,BBBB"]));
        studio.upload(b"orig", Some("image/jpeg")).await.unwrap();
        studio.dispatch(Action::Configure(crate::models::ConfigPatch { style: Some(DesignStyle::Futuristic), ..Default::default() }));

        let first = studio.generate().await.unwrap();
        let second = studio.generate().await.unwrap();
        let state = studio.snapshot();

        assert_eq!(state.variants.len(), 2);
        assert_eq!(state.variants[0].id, second.id);
        assert_eq!(state.variants[1].id, first.id);
        assert_ne!(first.id, second.id);
        assert_eq!(state.active_image.as_deref(), Some("data:image/png;base64,BBBB"));
        assert_eq!(first.config.style, DesignStyle::Futuristic);
        // the base image is always the original upload
        let seen = service.seen_images.lock();
        assert!(seen.iter().all(|img| img == b"orig"));
    }

    #[tokio::test]
    async fn missing_image_part_leaves_variants_alone() {
        let (studio, _) = studio(FakeService::analysing("knee"));
        studio.upload(b"orig", None).await.unwrap();
        let before = studio.snapshot().active_image;

        let err = studio.generate().await.unwrap_err();
        let state = studio.snapshot();
        assert!(matches!(err, StudioError::Failed(ref f) if f.kind == FailureKind::MalformedResponse));
        assert!(state.variants.is_empty());
        assert_eq!(state.active_image, before);
        assert!(!state.generating);
    }

    #[test]
    fn started_work_is_visible_before_the_service_answers() {
        let (studio, service) = studio(FakeService::default());
        let ticket = studio.begin_upload(b"orig", Some("image/jpeg"));
        let state = studio.snapshot();
        assert_eq!(state.analysis_ticket, ticket);
        assert!(state.processing);
        assert!(state.is_busy());
        assert!(state.active_image.is_some());

        let pending = studio.begin_generation().unwrap();
        assert!(studio.snapshot().generating);
        assert_eq!(pending.config, state.config);
        assert!(service.seen_images.lock().is_empty());
    }

    #[tokio::test]
    async fn dropped_generation_clears_flag() {
        let (studio, _) = studio(FakeService { hang: true, ..Default::default() });
        studio.dispatch(Action::ImageUploaded { data_uri: media::encode_data_uri("image/jpeg", b"x") });

        let timed_out = tokio::time::timeout(Duration::from_millis(20), studio.generate()).await;
        assert!(timed_out.is_err());
        let state = studio.snapshot();
        assert!(!state.generating);
        assert_eq!(state.last_failure.map(|f| f.kind), Some(FailureKind::Interrupted));
    }

    #[tokio::test]
    async fn dropped_analysis_clears_flag() {
        let (studio, _) = studio(FakeService { hang: true, ..Default::default() });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), studio.upload(b"x", None)).await;
        assert!(timed_out.is_err());
        assert!(!studio.snapshot().processing);
    }
}
