//! OnboardingFlow: one guest's check-in session. Owns the wizard state and
//! runs the directory, ledger and image calls each step needs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{FieldError, FlowError, RemoteError};
use crate::images::{CapturedImage, ImagePipeline, validate_image};
use crate::store::model::RETURNING_VISIT_PURPOSE;
use crate::store::{GuestDirectory, GuestRecord, NewVisit, VisitLedger, VisitRecord};

use super::model::{GuestDraft, PersonalInfo, ProfileAnswers};
use super::search::{DirectorySnapshot, SearchOutcome, parse_name_from_search};
use super::state::{OnboardingStep, StepEvent};
use super::validation::{validate_personal_info, validate_profile_answers};

/// Remote collaborators shared by every session.
#[derive(Clone)]
pub struct FlowServices {
    pub directory: Arc<dyn GuestDirectory>,
    pub ledger: Arc<dyn VisitLedger>,
    pub images: Arc<dyn ImagePipeline>,
    /// Upper bound on the image upload inside check-in completion.
    pub image_upload_timeout: Duration,
}

/// Mutable state of one session.
struct FlowSession {
    step: OnboardingStep,
    draft: GuestDraft,
    is_returning: bool,
    /// Set before the visit create call; cleared only by `reset_identity`
    /// or a failed completion.
    visit_guard: bool,
    busy: bool,
    error: Option<String>,
    field_errors: Vec<FieldError>,
    /// Bumped whenever the target identity changes. Results computed for an
    /// older epoch are discarded.
    epoch: u64,
    /// Returning guest currently being checked in.
    target_guest: Option<Uuid>,
    /// Guest created by an earlier completion attempt in this session.
    committed_guest: Option<GuestRecord>,
    visit: Option<VisitRecord>,
    previous_visits: Option<usize>,
    snapshot: Arc<OnceCell<DirectorySnapshot>>,
    last_active: Instant,
}

impl FlowSession {
    fn new(epoch: u64) -> Self {
        Self {
            step: OnboardingStep::Welcome,
            draft: GuestDraft::default(),
            is_returning: false,
            visit_guard: false,
            busy: false,
            error: None,
            field_errors: Vec::new(),
            epoch,
            target_guest: None,
            committed_guest: None,
            visit: None,
            previous_visits: None,
            snapshot: Arc::new(OnceCell::new()),
            last_active: Instant::now(),
        }
    }

    /// The guest being checked in changed: re-arm the guard and invalidate
    /// anything still in flight for the previous one.
    fn reset_identity(&mut self) {
        self.visit_guard = false;
        self.epoch += 1;
        self.target_guest = None;
        self.visit = None;
        self.previous_visits = None;
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn clear_errors(&mut self) {
        self.error = None;
        self.field_errors.clear();
    }

    fn record(&mut self, err: &FlowError) {
        self.error = Some(err.to_string());
        self.field_errors = match err {
            FlowError::Validation(v) => v.errors.clone(),
            _ => Vec::new(),
        };
    }

    fn ensure_idle(&self) -> Result<(), FlowError> {
        if self.busy {
            Err(FlowError::Busy)
        } else {
            Ok(())
        }
    }

    /// Check that `event` is legal here without moving.
    fn check(&mut self, event: StepEvent) -> Result<OnboardingStep, FlowError> {
        self.step.apply(event).map_err(|e| {
            let err = FlowError::from(e);
            self.record(&err);
            err
        })
    }
}

/// Snapshot of a session handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStatus {
    pub session_id: Uuid,
    pub step: OnboardingStep,
    pub progress: f32,
    pub show_progress: bool,
    pub is_returning: bool,
    pub busy: bool,
    pub error: Option<String>,
    pub field_errors: Vec<FieldError>,
    pub draft: GuestDraft,
    pub has_picture: bool,
    pub guest_id: Option<Uuid>,
    pub visit_id: Option<Uuid>,
    pub previous_visits: Option<usize>,
}

/// Drives one onboarding session from `welcome` to `complete`.
pub struct OnboardingFlow {
    id: Uuid,
    services: FlowServices,
    session: Arc<RwLock<FlowSession>>,
}

/// How a completion attempt ended, decided under the lock.
enum Admission {
    Proceed(u64),
    Duplicate,
}

impl OnboardingFlow {
    pub fn new(services: FlowServices) -> Self {
        Self {
            id: Uuid::new_v4(),
            services,
            session: Arc::new(RwLock::new(FlowSession::new(0))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn status(&self) -> FlowStatus {
        let s = self.session.read().await;
        self.status_of(&s)
    }

    /// Time since the last call that touched this session.
    pub async fn idle_for(&self) -> Duration {
        self.session.read().await.last_active.elapsed()
    }

    fn status_of(&self, s: &FlowSession) -> FlowStatus {
        FlowStatus {
            session_id: self.id,
            step: s.step,
            progress: s.step.progress_percent(),
            show_progress: s.step.shows_progress(),
            is_returning: s.is_returning,
            busy: s.busy,
            error: s.error.clone(),
            field_errors: s.field_errors.clone(),
            draft: s.draft.clone(),
            has_picture: s.draft.has_captured_image(),
            guest_id: s.draft.id,
            visit_id: s.visit.as_ref().map(|v| v.id),
            previous_visits: s.previous_visits,
        }
    }

    /// Move on a side-effect-free event, running `mutate` first.
    async fn transition(
        &self,
        event: StepEvent,
        mutate: impl FnOnce(&mut FlowSession),
    ) -> Result<FlowStatus, FlowError> {
        let mut s = self.session.write().await;
        s.touch();
        s.ensure_idle()?;
        let next = s.check(event)?;
        mutate(&mut *s);
        tracing::debug!(session_id = %self.id, from = %s.step, to = %next, "Onboarding step");
        s.step = next;
        s.clear_errors();
        Ok(self.status_of(&s))
    }

    /// Welcome: "I've been here before".
    pub async fn choose_returning(&self) -> Result<FlowStatus, FlowError> {
        self.transition(StepEvent::ChooseReturning, |s| s.is_returning = true)
            .await
    }

    /// Welcome or returning-check: "this is my first time".
    pub async fn choose_first_time(&self) -> Result<FlowStatus, FlowError> {
        self.transition(StepEvent::ChooseFirstTime, |s| {
            if s.target_guest.is_some() {
                s.reset_identity();
            }
            s.is_returning = false;
        })
        .await
    }

    /// Look a returning guest up by name.
    ///
    /// The directory is listed once per session; later searches filter the
    /// cached snapshot.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, FlowError> {
        let cell = {
            let mut s = self.session.write().await;
            s.touch();
            s.check(StepEvent::Search)?;
            s.snapshot.clone()
        };

        let directory = self.services.directory.clone();
        let loaded = cell
            .get_or_try_init(|| async move {
                let guests = directory.list(None).await?;
                tracing::debug!(count = guests.len(), "Loaded directory snapshot");
                Ok::<_, RemoteError>(DirectorySnapshot::new(guests))
            })
            .await;

        match loaded {
            Ok(snapshot) => Ok(snapshot.search(query)),
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Guest search failed");
                let err = FlowError::Remote(e);
                self.session.write().await.record(&err);
                Err(err)
            }
        }
    }

    /// Returning-check: a guest was picked from the results. Records a visit
    /// and completes the session.
    pub async fn select_guest(&self, guest_id: Uuid) -> Result<FlowStatus, FlowError> {
        let (epoch, snapshot) = {
            let mut s = self.session.write().await;
            s.touch();
            if s.visit_guard && s.target_guest == Some(guest_id) {
                tracing::debug!(session_id = %self.id, %guest_id, "Duplicate returning check-in ignored");
                return Ok(self.status_of(&s));
            }
            s.ensure_idle()?;
            s.check(StepEvent::ReturningCheckedIn)?;
            if s.target_guest != Some(guest_id) {
                s.reset_identity();
                s.target_guest = Some(guest_id);
            }
            s.visit_guard = true;
            s.busy = true;
            s.clear_errors();
            (s.epoch, s.snapshot.clone())
        };

        let result = self.check_in_returning(guest_id, snapshot).await;

        let mut s = self.session.write().await;
        if s.epoch != epoch {
            return Err(self.superseded(&s));
        }
        s.busy = false;
        match result {
            Ok((guest, history_count, visit)) => {
                tracing::info!(
                    session_id = %self.id,
                    guest_id = %guest.id,
                    visit_id = %visit.id,
                    previous_visits = history_count,
                    "Returning guest checked in"
                );
                s.draft = GuestDraft::from_record(&guest);
                s.is_returning = true;
                s.previous_visits = Some(history_count);
                s.visit = Some(visit);
                s.step = OnboardingStep::Complete;
                Ok(self.status_of(&s))
            }
            Err(err) => {
                tracing::warn!(session_id = %self.id, %guest_id, error = %err, "Returning check-in failed");
                s.visit_guard = false;
                s.record(&err);
                Err(err)
            }
        }
    }

    async fn check_in_returning(
        &self,
        guest_id: Uuid,
        snapshot: Arc<OnceCell<DirectorySnapshot>>,
    ) -> Result<(GuestRecord, usize, VisitRecord), FlowError> {
        let cached = snapshot.get().and_then(|snap| snap.get(guest_id)).cloned();
        let guest = match cached {
            Some(guest) => guest,
            None => match self.services.directory.get_by_id(guest_id).await {
                Ok(guest) => guest,
                Err(RemoteError::NotFound { .. }) => return Err(FlowError::UnknownGuest(guest_id)),
                Err(e) => return Err(e.into()),
            },
        };

        let history = self.services.ledger.history_for_guest(guest_id).await?;
        let visit = self
            .services
            .ledger
            .create(&NewVisit {
                guest_id,
                purpose: Some(RETURNING_VISIT_PURPOSE.to_string()),
                notes: None,
            })
            .await?;
        Ok((guest, history.total_visits, visit))
    }

    /// Returning-check: nobody matched. Starts a new profile pre-filled with
    /// the name split out of the query.
    pub async fn continue_as_new(&self, query: &str) -> Result<FlowStatus, FlowError> {
        let (first_name, last_name) = parse_name_from_search(query);
        self.transition(StepEvent::ContinueAsNew, move |s| {
            s.reset_identity();
            s.is_returning = false;
            s.draft = GuestDraft::with_name(first_name, last_name);
        })
        .await
    }

    /// Rules: consent checkbox submitted.
    pub async fn accept_rules(&self, agreed: bool) -> Result<FlowStatus, FlowError> {
        self.transition(StepEvent::AcceptRules { agreed }, |s| {
            s.draft.agreed_to_rules = true
        })
        .await
    }

    /// Personal-info: name and contact details.
    pub async fn submit_personal_info(&self, info: PersonalInfo) -> Result<FlowStatus, FlowError> {
        let mut s = self.session.write().await;
        s.touch();
        s.ensure_idle()?;
        let next = s.check(StepEvent::PersonalInfoSaved)?;

        let info = info.normalized();
        if let Err(errors) = validate_personal_info(&info) {
            let err = FlowError::Validation(errors);
            s.record(&err);
            return Err(err);
        }

        s.draft.apply_personal_info(info);
        s.step = next;
        s.clear_errors();
        Ok(self.status_of(&s))
    }

    /// Profile-picture: hold a captured image until completion.
    pub async fn capture_image(&self, image: CapturedImage) -> Result<FlowStatus, FlowError> {
        let mut s = self.session.write().await;
        s.touch();
        s.ensure_idle()?;
        let next = s.check(StepEvent::PictureCaptured)?;

        if let Err(e) = validate_image(&image) {
            let err = FlowError::Image(e);
            s.record(&err);
            return Err(err);
        }

        tracing::debug!(session_id = %self.id, size = image.len(), "Profile picture captured");
        s.draft.captured_image = Some(image);
        s.draft.image_url = None;
        s.step = next;
        s.clear_errors();
        Ok(self.status_of(&s))
    }

    /// Profile-picture: continue without a picture.
    pub async fn skip_picture(&self) -> Result<FlowStatus, FlowError> {
        self.transition(StepEvent::PictureSkipped, |s| {
            s.draft.captured_image = None;
            // A committed guest already points at any uploaded picture.
            if s.committed_guest.is_none() {
                s.draft.image_url = None;
            }
        })
        .await
    }

    /// Profile-questions: last answers, then create guest, upload the
    /// picture, record the visit.
    pub async fn submit_profile_questions(
        &self,
        answers: ProfileAnswers,
    ) -> Result<FlowStatus, FlowError> {
        let admission = {
            let mut s = self.session.write().await;
            s.touch();
            if s.visit_guard {
                tracing::debug!(session_id = %self.id, "Duplicate check-in completion ignored");
                Admission::Duplicate
            } else {
                s.ensure_idle()?;
                s.check(StepEvent::CheckedIn)?;
                let answers = answers.normalized();
                if let Err(errors) = validate_profile_answers(&answers) {
                    let err = FlowError::Validation(errors);
                    s.record(&err);
                    return Err(err);
                }
                s.draft.apply_answers(answers);
                s.visit_guard = true;
                s.busy = true;
                s.clear_errors();
                Admission::Proceed(s.epoch)
            }
        };

        match admission {
            Admission::Duplicate => Ok(self.status().await),
            Admission::Proceed(epoch) => self.complete_new_guest(epoch).await,
        }
    }

    /// Create guest (unless already committed), upload the picture if any,
    /// then create the visit. Only a confirmed visit completes the session.
    async fn complete_new_guest(&self, epoch: u64) -> Result<FlowStatus, FlowError> {
        let (draft, committed) = {
            let s = self.session.read().await;
            (s.draft.clone(), s.committed_guest.clone())
        };

        let guest = match committed {
            Some(guest) => {
                tracing::debug!(session_id = %self.id, guest_id = %guest.id, "Reusing committed guest");
                guest
            }
            None => match self.services.directory.create(&draft.to_new_guest()).await {
                Ok(guest) => {
                    let mut s = self.session.write().await;
                    if s.epoch != epoch {
                        return Err(self.superseded(&s));
                    }
                    tracing::info!(session_id = %self.id, guest_id = %guest.id, "Guest profile created");
                    s.committed_guest = Some(guest.clone());
                    s.draft.id = Some(guest.id);
                    guest
                }
                Err(e) => return self.fail_completion(epoch, "Guest create failed", e.into()).await,
            },
        };

        let image_url = match (&draft.image_url, &draft.captured_image) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(image)) => self.upload_image(image.clone(), guest.id).await,
            (None, None) => None,
        };

        let visit = self
            .services
            .ledger
            .create(&NewVisit {
                guest_id: guest.id,
                purpose: draft.why_here.clone(),
                notes: None,
            })
            .await;

        let mut s = self.session.write().await;
        if s.epoch != epoch {
            return Err(self.superseded(&s));
        }
        if image_url.is_some() {
            s.draft.image_url = image_url;
        }
        match visit {
            Ok(visit) => {
                tracing::info!(
                    session_id = %self.id,
                    guest_id = %guest.id,
                    visit_id = %visit.id,
                    "New guest checked in"
                );
                s.busy = false;
                s.draft.captured_image = None;
                s.visit = Some(visit);
                s.step = OnboardingStep::Complete;
                Ok(self.status_of(&s))
            }
            Err(e) => {
                drop(s);
                self.fail_completion(epoch, "Visit create failed", e.into())
                    .await
            }
        }
    }

    /// Upload bounded by the configured timeout. Failure never blocks
    /// check-in; the guest simply has no picture.
    async fn upload_image(&self, image: CapturedImage, guest_id: Uuid) -> Option<String> {
        let timeout = self.services.image_upload_timeout;
        match tokio::time::timeout(timeout, self.services.images.upload(image, guest_id)).await {
            Ok(Ok(url)) => Some(url),
            Ok(Err(e)) => {
                tracing::warn!(session_id = %self.id, %guest_id, error = %e, "Profile image upload failed; continuing without picture");
                None
            }
            Err(_) => {
                tracing::warn!(session_id = %self.id, %guest_id, ?timeout, "Profile image upload timed out; continuing without picture");
                None
            }
        }
    }

    async fn fail_completion(
        &self,
        epoch: u64,
        what: &str,
        err: FlowError,
    ) -> Result<FlowStatus, FlowError> {
        let mut s = self.session.write().await;
        if s.epoch != epoch {
            return Err(self.superseded(&s));
        }
        tracing::warn!(session_id = %self.id, error = %err, "{what}");
        s.busy = false;
        s.visit_guard = false;
        s.record(&err);
        Err(err)
    }

    fn superseded(&self, s: &FlowSession) -> FlowError {
        tracing::warn!(session_id = %self.id, epoch = s.epoch, "Discarding result for superseded session state");
        FlowError::Remote(RemoteError::Rejected {
            service: "onboarding".into(),
            reason: "Session changed while checking in".into(),
        })
    }

    /// Previous step. No remote calls; committed records stay committed.
    pub async fn back(&self) -> Result<FlowStatus, FlowError> {
        self.transition(StepEvent::Back, |s| {
            if s.step == OnboardingStep::ReturningCheck {
                s.is_returning = false;
            }
        })
        .await
    }

    /// Start over from `welcome` with an empty draft.
    pub async fn restart(&self) -> FlowStatus {
        let mut s = self.session.write().await;
        let epoch = s.epoch + 1;
        *s = FlowSession::new(epoch);
        tracing::debug!(session_id = %self.id, "Onboarding restarted");
        self.status_of(&s)
    }
}
