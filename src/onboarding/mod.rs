//! Guest onboarding: the check-in wizard that identifies a guest, collects
//! consent and a profile, and records the visit.
//!
//! Each session is an [`OnboardingFlow`] held in the [`SessionRegistry`] and
//! driven over REST. Steps move only through [`OnboardingStep::apply`].

pub mod manager;
pub mod model;
pub mod routes;
pub mod search;
pub mod sessions;
pub mod state;
pub mod validation;

pub use manager::{FlowServices, FlowStatus, OnboardingFlow};
pub use model::{GuestDraft, PersonalInfo, ProfileAnswers};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use search::{DirectorySnapshot, SearchOutcome, parse_name_from_search};
pub use sessions::{SessionRegistry, spawn_session_pruner};
pub use state::{OnboardingStep, StepEvent, TransitionError};
