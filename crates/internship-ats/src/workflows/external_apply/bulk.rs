//! Employer and admin batch actions over applications.
//!
//! Authorization is all-or-nothing for employers: one application on a listing
//! they do not own rejects the batch. Invite integrity is also checked for
//! every referenced listing. Only after both gates pass are rows filtered by
//! status, so retried or partially processed batches report an honest count.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::telemetry::AUDIT_TARGET;

use super::domain::{ApplicationRecord, Caller, ListingId, ListingRecord};
use super::invite::StatusChange;
use super::repository::{
    AnalyticsSink, AtsStore, Notification, NotificationDispatcher, NotificationType,
};
use super::requests::{parse_json_body, BulkAction, BulkRequest};
use super::service::{ExternalApplyError, ExternalApplyService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub updated: usize,
}

impl<S, N, E> ExternalApplyService<S, N, E>
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    pub fn bulk_update(
        &self,
        caller: &Caller,
        body: &[u8],
    ) -> Result<BulkOutcome, ExternalApplyError> {
        if !caller.is_admin() && !caller.is_employer() {
            return Err(ExternalApplyError::Forbidden(
                "Only employers or admins can manage ATS invites.".to_string(),
            ));
        }
        let body = parse_json_body(body)?;
        let request = BulkRequest::from_json(&body)?;

        let rows = self.store.fetch_many(&request.application_ids)?;
        if rows.is_empty() {
            return Err(ExternalApplyError::NotFound(
                "No matching applications found.".to_string(),
            ));
        }

        let listing_ids: Vec<ListingId> = rows
            .iter()
            .map(|row| row.internship_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let listings: HashMap<ListingId, ListingRecord> = self
            .store
            .fetch_listings(&listing_ids)?
            .into_iter()
            .map(|listing| (listing.id, listing))
            .collect();

        if !caller.is_admin() {
            let owns_all = listing_ids.iter().all(|id| {
                listings
                    .get(id)
                    .map(|listing| listing.employer_id == caller.user_id)
                    .unwrap_or(false)
            });
            if !owns_all {
                return Err(ExternalApplyError::Forbidden(
                    "You can only manage applications for your own internships.".to_string(),
                ));
            }
        }

        let change = match request.action {
            BulkAction::Invite => {
                self.ensure_invitable(&listing_ids, &listings)?;
                StatusChange::Invite {
                    invited_at: Utc::now(),
                    invited_by: caller.user_id,
                    message: request.message.clone(),
                }
            }
            BulkAction::Confirm => StatusChange::Confirm,
        };

        let eligible: Vec<&ApplicationRecord> = rows
            .iter()
            .filter(|row| row.ats_invite_status == change.expected_from())
            .collect();
        if eligible.is_empty() {
            info!(
                action = request.action.label(),
                requested = request.application_ids.len(),
                "bulk ats action matched no eligible applications"
            );
            return Ok(BulkOutcome { updated: 0 });
        }

        let eligible_ids: Vec<_> = eligible.iter().map(|row| row.id).collect();
        let moved: BTreeSet<_> = self
            .store
            .transition_many(&eligible_ids, &change)?
            .into_iter()
            .collect();

        let updated: Vec<&ApplicationRecord> = eligible
            .into_iter()
            .filter(|row| moved.contains(&row.id))
            .collect();

        for row in &updated {
            info!(
                target: AUDIT_TARGET,
                application_id = %row.id,
                actor_id = %caller.user_id,
                action = request.action.label(),
                from = change.expected_from().label(),
                to = change.target().label(),
                "ats invite status changed"
            );
        }

        if request.action == BulkAction::Invite {
            let notifications = updated
                .iter()
                .map(|row| invite_notification(row, &listings, request.message.as_deref()))
                .collect();
            self.effects.notify(notifications);
        }

        Ok(BulkOutcome {
            updated: updated.len(),
        })
    }

    fn ensure_invitable(
        &self,
        listing_ids: &[ListingId],
        listings: &HashMap<ListingId, ListingRecord>,
    ) -> Result<(), ExternalApplyError> {
        for id in listing_ids {
            let listing = listings
                .get(id)
                .ok_or_else(|| ExternalApplyError::NotFound("Internship not found.".to_string()))?;
            let effective = self.effective_config_for(listing)?;

            if !effective.is_curated_invite_flow {
                return Err(ExternalApplyError::Misconfigured(
                    "ATS invites are only available for listings using curated ATS mode."
                        .to_string(),
                ));
            }
            if effective.validated_destination().is_none() {
                return Err(ExternalApplyError::Misconfigured(
                    "ATS not configured for this listing.".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn invite_notification(
    row: &ApplicationRecord,
    listings: &HashMap<ListingId, ListingRecord>,
    message: Option<&str>,
) -> Notification {
    let title = listings
        .get(&row.internship_id)
        .map(|listing| format!("Next step for {}", listing.title))
        .unwrap_or_else(|| "Next step for your application".to_string());
    let body = match message {
        Some(message) => format!("The employer invited you to continue on their site: {message}"),
        None => "The employer invited you to continue your application on their site.".to_string(),
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("application_id".to_string(), row.id.to_string());
    metadata.insert("internship_id".to_string(), row.internship_id.to_string());

    Notification {
        user_id: row.student_id,
        kind: NotificationType::AtsInviteSent,
        title,
        body,
        href: Some("/applications".to_string()),
        metadata,
    }
}
