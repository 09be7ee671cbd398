//! Student click-through to the employer's ATS. Every failure becomes an
//! in-app redirect with a readable `error` parameter; only success leaves the
//! platform.

use chrono::Utc;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::telemetry::AUDIT_TARGET;

use super::domain::{ApplicationId, AtsInviteStatus, Caller, ListingId};
use super::invite::{check_click_gate, ClickGate};
use super::repository::{
    AnalyticsEvent, AnalyticsSink, AtsStore, NotificationDispatcher, RepositoryError,
};
use super::service::{ExternalApplyError, ExternalApplyService};

/// Why a click-through was turned back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectRejection {
    SignInRequired,
    MissingApplicationContext,
    ApplicationNotFound,
    ListingNotFound,
    InviteRequired,
    NotConfigured,
    Unavailable,
}

impl RedirectRejection {
    pub const fn message(self) -> &'static str {
        match self {
            RedirectRejection::SignInRequired => "Sign in to continue your application",
            RedirectRejection::MissingApplicationContext => "Missing application context",
            RedirectRejection::ApplicationNotFound => "Application not found",
            RedirectRejection::ListingNotFound => "Listing not found",
            RedirectRejection::InviteRequired => {
                "You need an ATS invite from the employer before continuing."
            }
            RedirectRejection::NotConfigured => "External application link is not configured",
            RedirectRejection::Unavailable => {
                "We could not open the external application right now. Please try again."
            }
        }
    }

    /// In-app location to send the student to. `listing` is `None` when the
    /// path segment was not a usable identifier.
    pub fn location(self, listing: Option<&ListingId>) -> String {
        let apply_path = match listing {
            Some(id) => format!("/apply/{id}"),
            None => "/applications".to_string(),
        };

        match self {
            RedirectRejection::SignInRequired => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("next", &apply_path)
                    .finish();
                format!("/signup/student?{query}")
            }
            RedirectRejection::InviteRequired => with_error("/applications", self.message()),
            _ => with_error(&apply_path, self.message()),
        }
    }
}

fn with_error(path: &str, message: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("error", message)
        .finish();
    format!("{path}?{query}")
}

/// Successful click-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRedirect {
    pub location: String,
    pub status: AtsInviteStatus,
    pub clicks: u32,
}

impl<S, N, E> ExternalApplyService<S, N, E>
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    pub fn external_click(
        &self,
        caller: Option<&Caller>,
        listing_id: Option<&ListingId>,
        application: Option<&str>,
    ) -> Result<ExternalRedirect, RedirectRejection> {
        let caller = caller.ok_or(RedirectRejection::SignInRequired)?;
        let application = application
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or(RedirectRejection::MissingApplicationContext)?;

        // A malformed id on either side cannot match a row the caller owns.
        let listing_id = listing_id.ok_or(RedirectRejection::ApplicationNotFound)?;
        let application_id =
            ApplicationId::parse(application).ok_or(RedirectRejection::ApplicationNotFound)?;

        self.click_through(caller, listing_id, &application_id)
            .map_err(|error| match error {
                ClickError::Rejected(rejection) => rejection,
                ClickError::Workflow(error) => {
                    warn!(
                        application_id = %application_id,
                        listing_id = %listing_id,
                        %error,
                        "external apply redirect failed"
                    );
                    RedirectRejection::Unavailable
                }
            })
    }

    fn click_through(
        &self,
        caller: &Caller,
        listing_id: &ListingId,
        application_id: &ApplicationId,
    ) -> Result<ExternalRedirect, ClickError> {
        let application = self
            .store
            .fetch(application_id)?
            .filter(|row| row.student_id == caller.user_id && row.internship_id == *listing_id)
            .ok_or(RedirectRejection::ApplicationNotFound)?;

        let listing = self
            .store
            .fetch_listing(listing_id)?
            .filter(|listing| listing.is_active)
            .ok_or(RedirectRejection::ListingNotFound)?;

        // Eligibility follows the listing's current configuration, not the
        // configuration at submission time.
        let effective = self.effective_config_for(&listing)?;
        let gate = if effective.is_curated_invite_flow {
            ClickGate::InviteRequired
        } else {
            ClickGate::Open
        };
        check_click_gate(application.ats_invite_status, gate)
            .map_err(|_| RedirectRejection::InviteRequired)?;

        if !effective.has_configured_destination {
            return Err(RedirectRejection::NotConfigured.into());
        }
        let destination = effective
            .validated_destination()
            .ok_or(RedirectRejection::NotConfigured)?;

        let outcome = self
            .store
            .record_click(application_id, &caller.user_id, Utc::now())?
            .ok_or(RedirectRejection::ApplicationNotFound)?;

        if outcome.previous != outcome.current {
            info!(
                target: AUDIT_TARGET,
                application_id = %application_id,
                actor_id = %caller.user_id,
                action = "click",
                from = outcome.previous.label(),
                to = outcome.current.label(),
                "ats invite status changed"
            );
        }

        self.effects.track(
            AnalyticsEvent::new("external_apply_clicked", caller.user_id)
                .with("listing_id", listing_id.to_string())
                .with("application_id", application_id.to_string())
                .with("apply_mode", effective.apply_mode.label()),
        );

        Ok(ExternalRedirect {
            location: destination,
            status: outcome.current,
            clicks: outcome.clicks,
        })
    }
}

enum ClickError {
    Rejected(RedirectRejection),
    Workflow(ExternalApplyError),
}

impl From<RedirectRejection> for ClickError {
    fn from(value: RedirectRejection) -> Self {
        Self::Rejected(value)
    }
}

impl From<ExternalApplyError> for ClickError {
    fn from(value: ExternalApplyError) -> Self {
        Self::Workflow(value)
    }
}

impl From<RepositoryError> for ClickError {
    fn from(value: RepositoryError) -> Self {
        Self::Workflow(ExternalApplyError::Repository(value))
    }
}
