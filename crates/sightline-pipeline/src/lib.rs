//! Sightline Pipeline
//!
//! Turns a natural-language prompt plus an image into an annotated image.
//!
//! ```text
//! prompt ──► ClassifierPort ──► is_question
//!                                   │
//! image ───► DescriberPort (plain)  │         initial description
//!        └─► DescriberPort (hint) ──┴─► Branch
//!                                         ├─ Question  → answer is the label text
//!                                         └─ Statement → TextTransformPort chain
//!                                                          (direct | elaborate)
//!                                   label text
//!                                         │
//!                                         ▼
//!                       DetectionClient submit + poll ──► objects
//!                                         │
//!                                         ▼
//!                       render_detections ──► FinalArtifact
//! ```
//!
//! Each run is independent: the orchestrator holds only configuration and
//! shared clients, and every run owns its [`PromptContext`], its chain of
//! [`StageResult`]s and its detection task.

mod context;
mod error;
mod events;
mod orchestrator;
mod stage;
mod state;

pub use context::PromptContext;
pub use error::PipelineError;
pub use events::{ChannelNotifier, NoopNotifier, PipelineEvent, PipelineNotifier};
pub use orchestrator::{PipelineOrchestrator, Ports, RunSettings};
pub use stage::{Branch, BranchKind, StageResult, StageTag};
pub use state::RunState;

pub use sightline_artifact::{ArtifactKind, FinalArtifact};
