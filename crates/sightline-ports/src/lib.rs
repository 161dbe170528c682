//! Sightline Ports
//!
//! The three text-producing collaborators the pipeline orchestrator drives:
//!
//! - [`ClassifierPort`] decides whether a prompt is a question
//! - [`DescriberPort`] answers a prompt about an image
//! - [`TextTransformPort`] rewrites text according to an [`Instruction`]
//!
//! Each port is an async trait so the orchestrator can hold them as trait
//! objects. The crate also ships adapters backed by an OpenAI-compatible chat
//! endpoint ([`ChatClient`]) and a rule-based [`HeuristicClassifier`].

mod chat;
mod classifier;
mod describer;
mod error;
mod image;
mod template;
mod transform;

pub use chat::{ChatClient, ChatMessage, ContentPart, ImageUrl, MessageContent};
pub use classifier::{ChatClassifier, ClassifierPort, HeuristicClassifier};
pub use describer::{ChatDescriber, DescriberPort};
pub use error::{PortError, truncate_body};
pub use image::ImageRef;
pub use template::render_template;
pub use transform::{ChatTransformer, Instruction, TextTransformPort};
