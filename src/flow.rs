//! Step Flow Controller - name and location capture
//!
//! A two-step state machine:
//!
//! ```text
//! NameEntry --advance--> LocationEntry --advance--> Submit(profile)
//!     ^                       |
//!     +-------retreat---------+
//! ```
//!
//! Input is validated before any forward move, and accepted values are
//! written to the [`Session`] as soon as they are accepted. The starting step
//! is computed once from what the session already holds.

use thiserror::Error;
use tracing::{debug, info};

use crate::gateway::GatewayError;
use crate::places::PlaceFilter;
use crate::session::Session;
use crate::types::{LocationCandidate, UserProfile};

/// Identity phase steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    NameEntry,
    LocationEntry,
}

impl FlowStep {
    /// Step reached by a successful advance, `None` when the identity phase ends
    pub fn next(self) -> Option<FlowStep> {
        match self {
            FlowStep::NameEntry => Some(FlowStep::LocationEntry),
            FlowStep::LocationEntry => None,
        }
    }

    /// Step reached by retreat, `None` at the start of the flow
    pub fn prev(self) -> Option<FlowStep> {
        match self {
            FlowStep::NameEntry => None,
            FlowStep::LocationEntry => Some(FlowStep::NameEntry),
        }
    }

    /// Label shown above the input while it has focus
    pub fn prompt(self) -> &'static str {
        match self {
            FlowStep::NameEntry => "INTRODUCE YOURSELF",
            FlowStep::LocationEntry => "WHERE ARE YOU FROM?",
        }
    }
}

/// Why a step could not be completed. The display text is shown inline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Please enter your name")]
    MissingName,
    #[error("Please enter a residential address, not a business or commercial address.")]
    LocationRejected,
    #[error("Please select a valid location.")]
    NoPlaceSelected,
    #[error("Please enter a valid location")]
    InvalidLocation,
    #[error("An error occurred while submitting the form. Please try again.")]
    SubmitFailed,
}

/// Input for the current step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    Name(String),
    /// A freshly picked candidate, or `None` to keep the accepted one
    Location(Option<LocationCandidate>),
}

/// Outcome of a successful advance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Moved(FlowStep),
    /// Identity is complete and ready to send
    Submit(UserProfile),
}

pub struct StepFlowController {
    session: Session,
    filter: PlaceFilter,
    step: FlowStep,
    name: String,
    location: Option<String>,
    error: Option<FlowError>,
}

impl StepFlowController {
    /// Seed from the session. A stored name skips straight to the location
    /// step and a stored location counts as already accepted.
    pub fn seed(session: Session, filter: PlaceFilter) -> Self {
        let name = session.user_name().unwrap_or_default();
        let location = session.user_location();
        let step = if name.trim().is_empty() {
            FlowStep::NameEntry
        } else {
            FlowStep::LocationEntry
        };
        debug!("Flow seeded at {:?} (location restored: {})", step, location.is_some());

        Self {
            session,
            filter,
            step,
            name,
            location,
            error: None,
        }
    }

    pub fn current_step(&self) -> FlowStep {
        self.step
    }

    pub fn validation_error(&self) -> Option<&FlowError> {
        self.error.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted location, if any
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Complete identity when both fields are accepted
    pub fn profile(&self) -> Option<UserProfile> {
        if self.name.trim().is_empty() {
            return None;
        }
        Some(UserProfile {
            name: self.name.clone(),
            location: self.location.clone()?,
        })
    }

    pub fn advance(&mut self, input: StepInput) -> Result<Transition, FlowError> {
        let result = match (self.step, input) {
            (FlowStep::NameEntry, StepInput::Name(name)) => self.accept_name(name),
            (FlowStep::NameEntry, StepInput::Location(_)) => Err(FlowError::MissingName),
            (FlowStep::LocationEntry, StepInput::Location(candidate)) => {
                if let Some(candidate) = candidate {
                    self.select_candidate(Some(candidate))?;
                }
                self.accept_location()
            }
            (FlowStep::LocationEntry, StepInput::Name(_)) => Err(FlowError::InvalidLocation),
        };
        self.record(result)
    }

    /// Move back one step. Returns false at the first step.
    pub fn retreat(&mut self) -> bool {
        self.error = None;
        match self.step.prev() {
            Some(prev) => {
                self.step = prev;
                true
            }
            None => false,
        }
    }

    /// A suggestion was picked from the places lookup. Accepted candidates
    /// are stored right away; rejected ones wipe any previous location.
    pub fn select_candidate(
        &mut self,
        candidate: Option<LocationCandidate>,
    ) -> Result<(), FlowError> {
        let result = match candidate {
            None => {
                self.location = None;
                Err(FlowError::NoPlaceSelected)
            }
            Some(c) if self.filter.is_disallowed(&c.place_types) => {
                info!("Rejected non-residential place: {:?}", c.place_types);
                self.location = None;
                self.session.clear_user_location();
                Err(FlowError::LocationRejected)
            }
            Some(c) if c.formatted_address.trim().is_empty() => {
                self.location = None;
                Err(FlowError::InvalidLocation)
            }
            Some(c) => {
                self.session.set_user_location(&c.formatted_address);
                self.location = Some(c.formatted_address);
                Ok(())
            }
        };
        self.record(result)
    }

    /// Free typing in the location box drops the accepted candidate
    pub fn edit_location(&mut self) {
        self.location = None;
        if self.error == Some(FlowError::LocationRejected) {
            self.error = None;
        }
    }

    /// The identity submission failed upstream
    pub fn fail_submission(&mut self, err: &GatewayError) {
        info!("Identity submission failed: {}", err);
        self.error = Some(FlowError::SubmitFailed);
    }

    fn accept_name(&mut self, name: String) -> Result<Transition, FlowError> {
        if name.trim().is_empty() {
            return Err(FlowError::MissingName);
        }
        self.session.set_user_name(&name);
        self.name = name;
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(Transition::Moved(self.step))
    }

    fn accept_location(&mut self) -> Result<Transition, FlowError> {
        let location = match self.location.as_deref() {
            Some(l) if !l.trim().is_empty() => l.to_string(),
            _ => return Err(FlowError::InvalidLocation),
        };
        self.session.set_user_location(&location);
        Ok(Transition::Submit(UserProfile {
            name: self.name.clone(),
            location,
        }))
    }

    fn record<T>(&mut self, result: Result<T, FlowError>) -> Result<T, FlowError> {
        match &result {
            Ok(_) => self.error = None,
            Err(e) => self.error = Some(e.clone()),
        }
        result
    }
}
