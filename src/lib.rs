//! # Skin Flow
//!
//! Onboarding flow for a skincare analysis: who you are, where you live, a
//! photo, and the demographic prediction that comes back for it.
//!
//! ## Architecture
//! - **Session Store**: per-browser key/value state (`userName`, `userLocation`, `apiResponse`)
//! - **Step Flow**: name -> location state machine with input validation
//! - **Gateway**: same-origin relay to the upstream identity and classification APIs
//! - **Image Submission**: encode -> classify -> persist, with a minimum loading time
//! - **Results**: category tabs over the stored prediction
//!
//! ## Flow
//! introduction (name, location) -> identity submitted -> photo uploaded ->
//! classification stored -> demographics

pub mod types;
pub mod places;
pub mod session;
pub mod flow;
pub mod gateway;
pub mod submission;
pub mod results;
pub mod config;
pub mod error;
pub mod server;
pub mod web_ui;

pub use types::*;
pub use places::{is_disallowed_candidate, PlaceFilter, DEFAULT_DENYLIST};
pub use session::{MemorySessionStore, NavigationType, Session, SessionRegistry, SessionStore};
pub use flow::{FlowError, FlowStep, StepFlowController, StepInput, Transition};
pub use gateway::{ClassificationGateway, Endpoint, GatewayError, HttpGateway, Relayed, ServerAck};
pub use submission::{Completion, ImageFile, ImageSubmission, SubmissionError};
pub use results::{ConfidenceRow, MissingResult, Navigation, ResultsView};
pub use config::{Config, ConfigError};
