//! Onboarding state machine: which step of the check-in wizard the guest is
//! on, and which events move it.

use serde::{Deserialize, Serialize};

/// The steps of the check-in wizard.
///
/// `Welcome → {ReturningCheck | Rules} → PersonalInfo → ProfilePicture →
/// ProfileQuestions → Complete`. A returning guest jumps from
/// `ReturningCheck` straight to `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnboardingStep {
    Welcome,
    ReturningCheck,
    Rules,
    PersonalInfo,
    ProfilePicture,
    ProfileQuestions,
    Complete,
}

/// Something that happened which may move the wizard.
///
/// Events that depend on remote results (`ReturningCheckedIn`,
/// `CheckedIn`) are only dispatched after the result has been confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// Guest says they have been here before.
    ChooseReturning,
    /// Guest says this is their first visit.
    ChooseFirstTime,
    /// Search found nothing and the guest continues as new.
    ContinueAsNew,
    /// A returning guest's visit was recorded.
    ReturningCheckedIn,
    /// Guest ticked (or did not tick) the house-rules box.
    AcceptRules { agreed: bool },
    /// Name and contact details passed validation.
    PersonalInfoSaved,
    /// A picture was captured and held for upload.
    PictureCaptured,
    /// Guest chose not to add a picture.
    PictureSkipped,
    /// Guest and visit records were created.
    CheckedIn,
    /// Look up returning guests by name. Does not move the wizard.
    Search,
    /// Go to the previous step.
    Back,
}

impl std::fmt::Display for StepEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ChooseReturning => "choose_returning",
            Self::ChooseFirstTime => "choose_first_time",
            Self::ContinueAsNew => "continue_as_new",
            Self::ReturningCheckedIn => "returning_checked_in",
            Self::AcceptRules { .. } => "accept_rules",
            Self::PersonalInfoSaved => "personal_info_saved",
            Self::PictureCaptured => "picture_captured",
            Self::PictureSkipped => "picture_skipped",
            Self::CheckedIn => "checked_in",
            Self::Search => "search",
            Self::Back => "back",
        };
        write!(f, "{s}")
    }
}

/// Why an event was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("You must agree to the house rules to continue")]
    ConsentRequired,

    #[error("Check-in is already complete")]
    Terminal,

    #[error("Cannot {event} from the {from} step")]
    NotAllowed {
        from: OnboardingStep,
        event: StepEvent,
    },
}

const PROGRESS_ORDER: [OnboardingStep; 6] = [
    OnboardingStep::Welcome,
    OnboardingStep::Rules,
    OnboardingStep::PersonalInfo,
    OnboardingStep::ProfilePicture,
    OnboardingStep::ProfileQuestions,
    OnboardingStep::Complete,
];

impl OnboardingStep {
    /// The single transition function: the next step for `event`, or why
    /// it is refused.
    pub fn apply(self, event: StepEvent) -> Result<OnboardingStep, TransitionError> {
        use OnboardingStep::*;
        use StepEvent::*;

        if self.is_terminal() {
            return Err(TransitionError::Terminal);
        }

        match (self, event) {
            (Welcome, ChooseReturning) => Ok(ReturningCheck),
            (Welcome, ChooseFirstTime) => Ok(Rules),
            (ReturningCheck, ChooseFirstTime) | (ReturningCheck, ContinueAsNew) => Ok(Rules),
            (ReturningCheck, ReturningCheckedIn) => Ok(Complete),
            (ReturningCheck, Search) => Ok(ReturningCheck),
            (Rules, AcceptRules { agreed: true }) => Ok(PersonalInfo),
            (Rules, AcceptRules { agreed: false }) => Err(TransitionError::ConsentRequired),
            (PersonalInfo, PersonalInfoSaved) => Ok(ProfilePicture),
            (ProfilePicture, PictureCaptured) | (ProfilePicture, PictureSkipped) => {
                Ok(ProfileQuestions)
            }
            (ProfileQuestions, CheckedIn) => Ok(Complete),
            (from, Back) => from.previous().ok_or(TransitionError::NotAllowed { from, event }),
            (from, event) => Err(TransitionError::NotAllowed { from, event }),
        }
    }

    /// Immediate predecessor for `Back`. `Welcome` and `Complete` have none.
    pub fn previous(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            Welcome | Complete => None,
            ReturningCheck | Rules => Some(Welcome),
            PersonalInfo => Some(Rules),
            ProfilePicture => Some(PersonalInfo),
            ProfileQuestions => Some(ProfilePicture),
        }
    }

    /// Whether the session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the wizard shows a progress bar on this step.
    pub fn shows_progress(&self) -> bool {
        !matches!(self, Self::Welcome | Self::Complete)
    }

    /// Percent through the new-guest path. `ReturningCheck` is off that
    /// path and reports 0.
    pub fn progress_percent(&self) -> f32 {
        PROGRESS_ORDER
            .iter()
            .position(|s| s == self)
            .map(|i| (i as f32 + 1.0) / PROGRESS_ORDER.len() as f32 * 100.0)
            .unwrap_or(0.0)
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::Welcome
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Welcome => "welcome",
            Self::ReturningCheck => "returning-check",
            Self::Rules => "rules",
            Self::PersonalInfo => "personal-info",
            Self::ProfilePicture => "profile-picture",
            Self::ProfileQuestions => "profile-questions",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OnboardingStep; 7] = [
        OnboardingStep::Welcome,
        OnboardingStep::ReturningCheck,
        OnboardingStep::Rules,
        OnboardingStep::PersonalInfo,
        OnboardingStep::ProfilePicture,
        OnboardingStep::ProfileQuestions,
        OnboardingStep::Complete,
    ];

    #[test]
    fn new_guest_path() {
        use OnboardingStep::*;
        use StepEvent::*;
        let events = [
            (ChooseFirstTime, Rules),
            (AcceptRules { agreed: true }, PersonalInfo),
            (PersonalInfoSaved, ProfilePicture),
            (PictureSkipped, ProfileQuestions),
            (CheckedIn, Complete),
        ];
        let mut step = Welcome;
        for (event, expected) in events {
            step = step.apply(event).unwrap();
            assert_eq!(step, expected, "after {event}");
        }
    }

    #[test]
    fn returning_guest_path() {
        use OnboardingStep::*;
        let step = Welcome.apply(StepEvent::ChooseReturning).unwrap();
        assert_eq!(step, ReturningCheck);
        assert_eq!(step.apply(StepEvent::ReturningCheckedIn).unwrap(), Complete);
        assert_eq!(step.apply(StepEvent::ContinueAsNew).unwrap(), Rules);
        assert_eq!(step.apply(StepEvent::ChooseFirstTime).unwrap(), Rules);
    }

    #[test]
    fn consent_required_to_leave_rules() {
        let err = OnboardingStep::Rules
            .apply(StepEvent::AcceptRules { agreed: false })
            .unwrap_err();
        assert_eq!(err, TransitionError::ConsentRequired);
    }

    #[test]
    fn picture_capture_and_skip_converge() {
        let a = OnboardingStep::ProfilePicture
            .apply(StepEvent::PictureCaptured)
            .unwrap();
        let b = OnboardingStep::ProfilePicture
            .apply(StepEvent::PictureSkipped)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn skipping_steps_is_refused() {
        use OnboardingStep::*;
        assert!(Welcome.apply(StepEvent::PersonalInfoSaved).is_err());
        assert!(Welcome.apply(StepEvent::AcceptRules { agreed: true }).is_err());
        assert!(Rules.apply(StepEvent::CheckedIn).is_err());
        assert!(PersonalInfo.apply(StepEvent::ReturningCheckedIn).is_err());
    }

    #[test]
    fn search_only_on_returning_check() {
        use OnboardingStep::*;
        assert_eq!(ReturningCheck.apply(StepEvent::Search), Ok(ReturningCheck));
        assert!(matches!(
            Rules.apply(StepEvent::Search),
            Err(TransitionError::NotAllowed { from: Rules, .. })
        ));
        assert!(Welcome.apply(StepEvent::Search).is_err());
    }

    #[test]
    fn complete_is_terminal() {
        for event in [StepEvent::Back, StepEvent::ChooseReturning, StepEvent::CheckedIn] {
            assert_eq!(
                OnboardingStep::Complete.apply(event),
                Err(TransitionError::Terminal)
            );
        }
    }

    #[test]
    fn back_goes_to_immediate_predecessor() {
        use OnboardingStep::*;
        assert_eq!(ProfileQuestions.apply(StepEvent::Back).unwrap(), ProfilePicture);
        assert_eq!(ProfilePicture.apply(StepEvent::Back).unwrap(), PersonalInfo);
        assert_eq!(PersonalInfo.apply(StepEvent::Back).unwrap(), Rules);
        assert_eq!(Rules.apply(StepEvent::Back).unwrap(), Welcome);
        assert_eq!(ReturningCheck.apply(StepEvent::Back).unwrap(), Welcome);
        assert!(Welcome.apply(StepEvent::Back).is_err());
    }

    #[test]
    fn progress_only_between_welcome_and_complete() {
        for step in ALL {
            let expected = !matches!(step, OnboardingStep::Welcome | OnboardingStep::Complete);
            assert_eq!(step.shows_progress(), expected, "{step}");
        }
    }

    #[test]
    fn progress_percentages() {
        assert_eq!(OnboardingStep::ReturningCheck.progress_percent(), 0.0);
        assert!((OnboardingStep::Rules.progress_percent() - 33.333_332).abs() < 0.01);
        assert_eq!(OnboardingStep::Complete.progress_percent(), 100.0);
    }

    #[test]
    fn display_matches_serde() {
        for step in ALL {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json, "Display and serde should match");
        }
    }
}
