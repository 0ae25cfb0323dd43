//! Session state and its reducer.
//!
//! Every change to a session goes through [`reduce`]: the old state and one
//! [`Action`] in, the new state out. Network results carry the ticket that was
//! current when their request started; a result whose ticket has since been
//! superseded is dropped without touching the state.

use crate::models::{ConfigPatch, DesignConfiguration, GearAnalysis, GearCategory, GeneratedVariant, KeyPoint};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Analysis,
    Generation,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    MalformedResponse,
    /// The request was abandoned before a result came back.
    Interrupted,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Failure {
    pub operation: Operation,
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SessionState {
    pub config: DesignConfiguration,
    pub original_image: Option<String>,
    pub active_image: Option<String>,
    pub keypoints: Vec<KeyPoint>,
    pub analysis: Option<String>,
    /// Newest first.
    pub variants: Vec<GeneratedVariant>,
    pub processing: bool,
    pub generating: bool,
    pub overlay_visible: bool,
    pub analysis_ticket: u64,
    pub generation_ticket: u64,
    pub last_failure: Option<Failure>,
    #[serde(skip)]
    last_variant_stamp: i64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            config: DesignConfiguration::default(),
            original_image: None,
            active_image: None,
            keypoints: Vec::new(),
            analysis: None,
            variants: Vec::new(),
            processing: false,
            generating: false,
            overlay_visible: true,
            analysis_ticket: 0,
            generation_ticket: 0,
            last_failure: None,
            last_variant_stamp: 0,
        }
    }
}

impl SessionState {
    pub fn variant(&self, id: &str) -> Option<&GeneratedVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    pub fn is_busy(&self) -> bool {
        self.processing || self.generating
    }

    fn clear_failure_of(&mut self, operation: Operation) {
        if self.last_failure.as_ref().is_some_and(|f| f.operation == operation) {
            self.last_failure = None;
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    /// A freshly read image; starts a new analysis.
    ImageUploaded { data_uri: String },
    /// `category` is the closed-set match for `analysis.category`, if any.
    AnalysisCompleted { ticket: u64, analysis: GearAnalysis, category: Option<GearCategory> },
    AnalysisFailed { ticket: u64, failure: Failure },
    /// Ignored unless an image has been uploaded.
    GenerationStarted,
    GenerationCompleted {
        ticket: u64,
        image_url: String,
        config: DesignConfiguration,
        created_at: DateTime<Utc>,
    },
    GenerationFailed { ticket: u64, failure: Failure },
    Configure(ConfigPatch),
    SelectOriginal,
    SelectVariant { id: String },
    DeleteVariant { id: String },
    ToggleOverlay,
}

pub fn reduce(mut state: SessionState, action: Action) -> SessionState {
    match action {
        Action::ImageUploaded { data_uri } => {
            state.original_image = Some(data_uri.clone());
            state.active_image = Some(data_uri);
            state.processing = true;
            state.analysis_ticket += 1;
        }
        Action::AnalysisCompleted { ticket, analysis, category } => {
            if ticket != state.analysis_ticket {
                return state;
            }
            state.processing = false;
            state.keypoints = analysis.keypoints;
            state.analysis = Some(analysis.analysis);
            if let Some(category) = category {
                state.config.category = category;
            }
            state.clear_failure_of(Operation::Analysis);
        }
        Action::AnalysisFailed { ticket, failure } => {
            if ticket != state.analysis_ticket {
                return state;
            }
            state.processing = false;
            state.last_failure = Some(failure);
        }
        Action::GenerationStarted => {
            if state.original_image.is_none() {
                return state;
            }
            state.generating = true;
            state.generation_ticket += 1;
        }
        Action::GenerationCompleted { ticket, image_url, config, created_at } => {
            if ticket != state.generation_ticket {
                return state;
            }
            state.generating = false;
            if image_url.trim().is_empty() {
                state.last_failure = Some(Failure {
                    operation: Operation::Generation,
                    kind: FailureKind::MalformedResponse,
                    message: "empty image".into(),
                    at: created_at,
                });
                return state;
            }
            let stamp = created_at.timestamp_millis().max(state.last_variant_stamp + 1);
            state.last_variant_stamp = stamp;
            let variant = GeneratedVariant {
                id: stamp.to_string(),
                image_url: image_url.clone(),
                prompt_summary: format!("New {} {}", config.style.label(), config.category.label()),
                created_at,
                config,
            };
            state.variants.insert(0, variant);
            state.active_image = Some(image_url);
            state.clear_failure_of(Operation::Generation);
        }
        Action::GenerationFailed { ticket, failure } => {
            if ticket != state.generation_ticket {
                return state;
            }
            state.generating = false;
            state.last_failure = Some(failure);
        }
        Action::Configure(patch) => patch.apply(&mut state.config),
        Action::SelectOriginal => {
            if state.original_image.is_some() {
                state.active_image = state.original_image.clone();
            }
        }
        Action::SelectVariant { id } => {
            if let Some(v) = state.variant(&id).cloned() {
                state.active_image = Some(v.image_url);
                state.config = v.config;
            }
        }
        // The displayed image is left alone even if it belonged to this variant.
        Action::DeleteVariant { id } => state.variants.retain(|v| v.id != id),
        Action::ToggleOverlay => state.overlay_visible = !state.overlay_visible,
    }
    state
}
