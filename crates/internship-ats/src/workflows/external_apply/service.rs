use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::NotificationConfig;
use crate::telemetry::AUDIT_TARGET;

use super::dispatch::SideEffects;
use super::domain::{
    ApplicationId, ApplicationRecord, AtsInviteStatus, Caller, EmployerAtsDefaults, ListingId,
    ListingRecord, Role,
};
use super::repository::{
    AnalyticsEvent, AnalyticsSink, AtsStore, Notification, NotificationDispatcher,
    NotificationType, RepositoryError,
};
use super::requests::{employer_defaults_from_json, parse_json_body, ListingConfigRequest};
use super::resolver::{resolve, EffectiveAtsConfig};

/// Coordinates ATS configuration, submissions, bulk invite actions and the
/// click-through redirect over one store.
pub struct ExternalApplyService<S, N, E> {
    pub(crate) store: Arc<S>,
    pub(crate) effects: SideEffects<N, E>,
}

impl<S, N, E> ExternalApplyService<S, N, E>
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        analytics: Arc<E>,
        delivery: NotificationConfig,
    ) -> Self {
        Self {
            store,
            effects: SideEffects::new(notifier, analytics, delivery),
        }
    }

    /// Resolve a loaded listing against its owner's current defaults.
    pub fn effective_config_for(
        &self,
        listing: &ListingRecord,
    ) -> Result<EffectiveAtsConfig, ExternalApplyError> {
        let defaults = self.store.ats_defaults(&listing.employer_id)?;
        Ok(resolve(&listing.ats, &defaults))
    }

    /// Effective configuration of an active listing.
    pub fn effective_config(
        &self,
        listing_id: &ListingId,
    ) -> Result<EffectiveAtsConfig, ExternalApplyError> {
        let listing = self.active_listing(listing_id)?;
        self.effective_config_for(&listing)
    }

    pub(crate) fn active_listing(
        &self,
        listing_id: &ListingId,
    ) -> Result<ListingRecord, ExternalApplyError> {
        self.store
            .fetch_listing(listing_id)?
            .filter(|listing| listing.is_active)
            .ok_or_else(|| ExternalApplyError::NotFound("Internship not found.".to_string()))
    }

    /// Save employer-wide defaults. Listings that inherit pick them up on their
    /// next resolution.
    pub fn update_employer_defaults(
        &self,
        caller: &Caller,
        body: &[u8],
    ) -> Result<EmployerAtsDefaults, ExternalApplyError> {
        require_employer(caller)?;
        let body = parse_json_body(body)?;
        let defaults = employer_defaults_from_json(&body);

        self.store
            .save_ats_defaults(&caller.user_id, defaults.clone())?;

        info!(
            target: AUDIT_TARGET,
            employer_id = %caller.user_id,
            default_ats_stage_mode = defaults.default_ats_stage_mode.label(),
            has_default_url = defaults.default_external_apply_url.is_some(),
            "employer ats defaults updated"
        );
        Ok(defaults)
    }

    /// Persist a listing override and return the configuration now in effect.
    pub fn configure_listing(
        &self,
        caller: &Caller,
        body: &[u8],
    ) -> Result<EffectiveAtsConfig, ExternalApplyError> {
        require_employer(caller)?;
        let body = parse_json_body(body)?;
        let request = ListingConfigRequest::from_json(&body)?;

        let listing = self
            .store
            .fetch_listing(&request.internship_id)?
            .ok_or_else(|| ExternalApplyError::NotFound("Internship not found.".to_string()))?;
        if listing.employer_id != caller.user_id {
            return Err(ExternalApplyError::Forbidden(
                "You do not own this internship.".to_string(),
            ));
        }

        let config = request.to_internship_config();
        self.store
            .update_ats_config(&listing.id, &caller.user_id, config.clone())
            .map_err(|error| match error {
                RepositoryError::NotFound => {
                    ExternalApplyError::Forbidden("You do not own this internship.".to_string())
                }
                other => ExternalApplyError::Repository(other),
            })?;

        let defaults = self.store.ats_defaults(&caller.user_id)?;
        let effective = resolve(&config, &defaults);

        info!(
            target: AUDIT_TARGET,
            employer_id = %caller.user_id,
            listing_id = %listing.id,
            apply_mode = effective.apply_mode.label(),
            source = ?effective.source,
            "listing ats config updated"
        );
        Ok(effective)
    }

    /// Create the platform-side application for a student. The external step,
    /// if any, happens later through the click-through redirect.
    pub fn submit_application(
        &self,
        caller: &Caller,
        listing_id: &ListingId,
    ) -> Result<SubmittedApplication, ExternalApplyError> {
        if caller.role != Some(Role::Student) {
            return Err(ExternalApplyError::Forbidden(
                "Only students can apply to internships.".to_string(),
            ));
        }

        let listing = self.active_listing(listing_id)?;
        let effective = self.effective_config_for(&listing)?;

        if effective.is_immediate_flow() && effective.validated_destination().is_none() {
            self.effects.track(
                AnalyticsEvent::new("apply_blocked", caller.user_id)
                    .with("listing_id", listing.id.to_string())
                    .with("reason", "ats_not_configured"),
            );
            return Err(ExternalApplyError::Misconfigured(
                "This listing's external application link is not configured yet.".to_string(),
            ));
        }

        let record = ApplicationRecord::submitted(
            caller.user_id,
            listing.id,
            Utc::now(),
            effective.is_immediate_flow(),
        );
        let stored = self.store.insert(record).map_err(|error| match error {
            RepositoryError::Conflict => ExternalApplyError::Conflict(
                "You have already applied to this internship.".to_string(),
            ),
            other => ExternalApplyError::Repository(other),
        })?;

        info!(
            target: AUDIT_TARGET,
            application_id = %stored.id,
            listing_id = %listing.id,
            student_id = %caller.user_id,
            apply_mode = effective.apply_mode.label(),
            "application submitted"
        );

        self.effects.track(
            AnalyticsEvent::new("quick_apply_submitted", caller.user_id)
                .with("listing_id", listing.id.to_string())
                .with("application_id", stored.id.to_string())
                .with("apply_mode", effective.apply_mode.label()),
        );

        let mut metadata = BTreeMap::new();
        metadata.insert("application_id".to_string(), stored.id.to_string());
        metadata.insert("internship_id".to_string(), listing.id.to_string());
        let delivered = self.effects.notify(vec![Notification {
            user_id: listing.employer_id,
            kind: NotificationType::ApplicationSubmitted,
            title: format!("New application: {}", listing.title),
            body: "A student submitted an application to your internship.".to_string(),
            href: Some(format!("/dashboard/employer/applicants?internship_id={}", listing.id)),
            metadata,
        }]);
        if delivered == 0 {
            warn!(application_id = %stored.id, "employer was not notified of submission");
        }

        Ok(SubmittedApplication {
            application_id: stored.id,
            ats_invite_status: stored.ats_invite_status,
            external_apply_required: stored.external_apply_required,
            external_apply_url: if stored.external_apply_required {
                effective.validated_destination()
            } else {
                None
            },
        })
    }
}

pub(crate) fn require_employer(caller: &Caller) -> Result<(), ExternalApplyError> {
    if caller.is_employer() {
        Ok(())
    } else {
        Err(ExternalApplyError::Forbidden(
            "Only employers can manage ATS settings.".to_string(),
        ))
    }
}

/// Response body for a new submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedApplication {
    pub application_id: ApplicationId,
    pub ats_invite_status: AtsInviteStatus,
    pub external_apply_required: bool,
    pub external_apply_url: Option<String>,
}

/// Error raised by the external-apply workflow. The message is safe to show
/// to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ExternalApplyError {
    #[error("Unauthorized.")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Misconfigured(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ExternalApplyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExternalApplyError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ExternalApplyError::Forbidden(_) => StatusCode::FORBIDDEN,
            ExternalApplyError::InvalidInput(_) | ExternalApplyError::Misconfigured(_) => {
                StatusCode::BAD_REQUEST
            }
            ExternalApplyError::NotFound(_) => StatusCode::NOT_FOUND,
            ExternalApplyError::Conflict(_) => StatusCode::CONFLICT,
            ExternalApplyError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            ExternalApplyError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            ExternalApplyError::Internal(_)
            | ExternalApplyError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
