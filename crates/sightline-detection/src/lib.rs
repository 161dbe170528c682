//! Sightline Detection
//!
//! Client for a remote, asynchronous detection service. A job is submitted
//! with an image reference and one text prompt per label, the service answers
//! with a task id, and the client polls that id until the task reaches a
//! terminal status or the retry budget runs out.
//!
//! ```text
//!   submit ──► task_uuid ──► GET status ──► waiting/running ──► wait ──┐
//!                                 ▲                                    │
//!                                 └────────────────────────────────────┘
//!                                 │
//!                                 ├─► success  → DetectionTask with result
//!                                 ├─► failed   → DetectionTask marked failed
//!                                 └─► budget exhausted → status unknown (timeout)
//! ```
//!
//! Transport failures and non-200 responses are never retried. The wait
//! between polls goes through the [`Delay`] trait so a cancelled run stops
//! between attempts.

mod client;
mod delay;
mod error;
mod request;
mod task;

pub use client::DetectionClient;
pub use delay::{Delay, TokioDelay, cancellable};
pub use error::DetectionError;
pub use request::{DetectionRequest, DetectionRequestBuilder, PromptEntry, parse_labels};
pub use task::{DetectedObject, DetectionResult, DetectionTask, RetryBudget, TaskStatus};
