//! Pipeline coordinators
//!
//! One session object per enrollment or verification attempt, driven by
//! the sequential capture event stream. Sessions own the bridge between
//! the accumulator's `Ready` state and persistence (and between retrieval
//! and the matcher) without embedding storage concerns in either.
//!
//! Dropping a session between notifications persists nothing: the store
//! is only touched once a template is complete.

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::biometric::extractor::{ExtractError, FeatureExtractor};
use crate::biometric::matcher::{MatchError, Matcher, VerificationResult};
use crate::biometric::{QualityFeedback, SamplePurpose, Template, TemplateError, UserId};
use crate::capture::CaptureEvent;
use crate::enroll::{EnrollError, Enroller, EnrollmentConfig, EnrollmentStatus};
use crate::store::{StoreError, TemplateStore};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("user {0} has no enrolled template")]
    NotEnrolled(UserId),

    #[error("stored template for user {0} is undecodable")]
    CorruptTemplate(UserId, #[source] TemplateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Enroll(#[from] EnrollError),
}

/// Summary of a completed, persisted enrollment.
#[derive(Debug, Clone)]
pub struct ProfileInfo {
    pub user: UserId,
    pub samples: u32,
}

/// Per-event enrollment progress.
#[derive(Debug)]
pub enum EnrollProgress {
    /// Observability event with no effect on session state
    Ignored,
    /// Sample failed the quality gate; rescan, progress unchanged
    Rejected(QualityFeedback),
    /// Sample accepted, more scans required
    NeedMore { remaining: u32 },
    /// Accumulation failed; session cleared, all scans must be redone
    RestartRequired,
    /// Template synthesized and persisted
    Enrolled(ProfileInfo),
    /// Template synthesized but the store write failed; the template is
    /// handed back so the write can be retried without redoing scans
    EnrolledUnsaved {
        template: Template,
        error: StoreError,
    },
    /// Reader gone before the session completed
    DeviceUnavailable,
}

/// Terminal result of an enrollment session.
#[derive(Debug)]
pub enum EnrollmentOutcome {
    Enrolled(ProfileInfo),
    EnrolledUnsaved {
        template: Template,
        error: StoreError,
    },
    DeviceUnavailable,
}

/// One enrollment attempt for one user.
pub struct EnrollmentSession<'a, E, S> {
    user: UserId,
    extractor: &'a E,
    store: &'a S,
    enroller: Enroller,
}

impl<'a, E: FeatureExtractor, S: TemplateStore> EnrollmentSession<'a, E, S> {
    pub fn new(user: UserId, extractor: &'a E, store: &'a S, config: &EnrollmentConfig) -> Self {
        log::info!(
            "enrollment session started for user {} ({} samples required)",
            user,
            config.required_samples
        );
        Self {
            user,
            extractor,
            store,
            enroller: Enroller::new(config),
        }
    }

    /// Remaining number of good scans before the template is complete.
    pub fn features_needed(&self) -> u32 {
        self.enroller.features_needed()
    }

    /// Handle one capture notification to completion.
    pub fn handle_event(&mut self, event: CaptureEvent) -> Result<EnrollProgress, SessionError> {
        let sample = match event {
            CaptureEvent::SampleCaptured(sample) => sample,
            CaptureEvent::ReaderDisconnected(serial) => {
                log::warn!("reader '{serial}' disconnected mid-enrollment");
                return Ok(EnrollProgress::DeviceUnavailable);
            }
            other => {
                log::debug!("capture event: {other:?}");
                return Ok(EnrollProgress::Ignored);
            }
        };

        let (features, feedback) = self
            .extractor
            .extract(&sample, SamplePurpose::Enrollment)?;
        if !feedback.is_good() {
            log::info!("sample rejected ({feedback}), waiting for rescan");
            return Ok(EnrollProgress::Rejected(feedback));
        }

        match self.enroller.add_features(features)? {
            EnrollmentStatus::Accumulating => Ok(EnrollProgress::NeedMore {
                remaining: self.enroller.features_needed(),
            }),
            EnrollmentStatus::Failed => {
                log::warn!("accumulation failed for user {}, restarting session", self.user);
                self.enroller.clear();
                Ok(EnrollProgress::RestartRequired)
            }
            EnrollmentStatus::Ready => {
                let template = self.enroller.take_template()?;
                match self.store.put(self.user, &template.to_bytes()) {
                    Ok(()) => {
                        log::info!("enrollment complete for user {}", self.user);
                        Ok(EnrollProgress::Enrolled(ProfileInfo {
                            user: self.user,
                            samples: template.samples(),
                        }))
                    }
                    Err(error) => {
                        log::error!(
                            "template ready but persistence failed for user {}: {}",
                            self.user,
                            error
                        );
                        Ok(EnrollProgress::EnrolledUnsaved { template, error })
                    }
                }
            }
        }
    }

    /// Drive the session from a capture channel until a terminal outcome,
    /// reporting every progress step through `on_progress`.
    pub fn run<F>(
        &mut self,
        events: &Receiver<CaptureEvent>,
        mut on_progress: F,
    ) -> Result<EnrollmentOutcome, SessionError>
    where
        F: FnMut(&EnrollProgress),
    {
        loop {
            let event = match events.recv() {
                Ok(event) => event,
                Err(_) => {
                    log::warn!("capture channel closed mid-enrollment");
                    return Ok(EnrollmentOutcome::DeviceUnavailable);
                }
            };

            let progress = self.handle_event(event)?;
            on_progress(&progress);
            match progress {
                EnrollProgress::Enrolled(info) => {
                    return Ok(EnrollmentOutcome::Enrolled(info));
                }
                EnrollProgress::EnrolledUnsaved { template, error } => {
                    return Ok(EnrollmentOutcome::EnrolledUnsaved { template, error });
                }
                EnrollProgress::DeviceUnavailable => {
                    return Ok(EnrollmentOutcome::DeviceUnavailable);
                }
                _ => {}
            }
        }
    }
}

/// Per-event verification progress.
#[derive(Debug)]
pub enum VerifyProgress {
    Ignored,
    Rejected(QualityFeedback),
    Decided(VerificationResult),
    DeviceUnavailable,
}

/// Terminal result of a verification session.
#[derive(Debug)]
pub enum VerificationOutcome {
    Matched(VerificationResult),
    NotMatched(VerificationResult),
    DeviceUnavailable,
}

/// One verification attempt for one user against their stored template.
pub struct VerificationSession<'a, E, M> {
    user: UserId,
    extractor: &'a E,
    matcher: &'a M,
    template: Template,
}

impl<'a, E: FeatureExtractor, M: Matcher> VerificationSession<'a, E, M> {
    /// Retrieve and decode the stored template before any capture happens.
    ///
    /// A missing record short-circuits as `NotEnrolled` and never reaches
    /// the matcher; an undecodable record is `CorruptTemplate`. Neither is
    /// ever conflated with a failed match.
    pub fn open<S: TemplateStore>(
        user: UserId,
        store: &S,
        extractor: &'a E,
        matcher: &'a M,
    ) -> Result<Self, SessionError> {
        let bytes = store.get(user)?.ok_or(SessionError::NotEnrolled(user))?;
        let template =
            Template::from_bytes(&bytes).map_err(|e| SessionError::CorruptTemplate(user, e))?;

        log::info!(
            "verification session started for user {} (template from {} samples)",
            user,
            template.samples()
        );
        Ok(Self {
            user,
            extractor,
            matcher,
            template,
        })
    }

    /// Handle one capture notification; the first good sample decides.
    pub fn handle_event(&mut self, event: CaptureEvent) -> Result<VerifyProgress, SessionError> {
        let sample = match event {
            CaptureEvent::SampleCaptured(sample) => sample,
            CaptureEvent::ReaderDisconnected(serial) => {
                log::warn!("reader '{serial}' disconnected mid-verification");
                return Ok(VerifyProgress::DeviceUnavailable);
            }
            other => {
                log::debug!("capture event: {other:?}");
                return Ok(VerifyProgress::Ignored);
            }
        };

        let (features, feedback) = self
            .extractor
            .extract(&sample, SamplePurpose::Verification)?;
        if !feedback.is_good() {
            log::info!("sample rejected ({feedback}), waiting for rescan");
            return Ok(VerifyProgress::Rejected(feedback));
        }

        let result = self.matcher.compare(&features, &self.template)?;
        log::info!(
            "verification decision for user {}: {}",
            self.user,
            if result.verified { "match" } else { "no match" }
        );
        Ok(VerifyProgress::Decided(result))
    }

    /// Drive the session from a capture channel until a decision or the
    /// device goes away.
    pub fn run<F>(
        &mut self,
        events: &Receiver<CaptureEvent>,
        mut on_progress: F,
    ) -> Result<VerificationOutcome, SessionError>
    where
        F: FnMut(&VerifyProgress),
    {
        loop {
            let event = match events.recv() {
                Ok(event) => event,
                Err(_) => {
                    log::warn!("capture channel closed mid-verification");
                    return Ok(VerificationOutcome::DeviceUnavailable);
                }
            };

            let progress = self.handle_event(event)?;
            on_progress(&progress);
            match progress {
                VerifyProgress::Decided(result) => {
                    return Ok(if result.verified {
                        VerificationOutcome::Matched(result)
                    } else {
                        VerificationOutcome::NotMatched(result)
                    });
                }
                VerifyProgress::DeviceUnavailable => {
                    return Ok(VerificationOutcome::DeviceUnavailable);
                }
                _ => {}
            }
        }
    }
}
