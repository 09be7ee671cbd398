use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationRecord, AtsInviteStatus, Caller, ListingId, ListingRecord};
use super::repository::{AnalyticsSink, AtsStore, NotificationDispatcher};
use super::service::{ExternalApplyError, ExternalApplyService};

/// Pipeline tab an export is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTab {
    New,
    Invited,
    Completed,
    Finalists,
    All,
}

impl ExportTab {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("new") => Self::New,
            Some("invited") => Self::Invited,
            Some("completed") => Self::Completed,
            Some("finalists") => Self::Finalists,
            _ => Self::All,
        }
    }

    pub fn includes(self, status: AtsInviteStatus) -> bool {
        match self {
            ExportTab::New => status == AtsInviteStatus::NotInvited,
            ExportTab::Invited => {
                matches!(status, AtsInviteStatus::Invited | AtsInviteStatus::Clicked)
            }
            ExportTab::Completed => status == AtsInviteStatus::SelfReportedComplete,
            ExportTab::Finalists => status == AtsInviteStatus::EmployerConfirmed,
            ExportTab::All => true,
        }
    }
}

/// Query string accepted by the export endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    pub internship_id: Option<String>,
    pub tab: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExport {
    Csv(String),
    Summary(PipelineSummary),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub text: String,
    pub count: usize,
}

#[derive(Serialize)]
struct ExportRow<'a> {
    application_id: String,
    internship_id: String,
    internship_title: &'a str,
    submitted_at: String,
    status: &'static str,
    ats_invited_at: String,
    ats_invite_message: &'a str,
    external_apply_clicks: u32,
    external_apply_last_clicked_at: String,
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

impl<S, N, E> ExternalApplyService<S, N, E>
where
    S: AtsStore + 'static,
    N: NotificationDispatcher + 'static,
    E: AnalyticsSink + 'static,
{
    /// Export the caller's ATS pipeline. Employers see their own listings,
    /// admins see every listing.
    pub fn export_pipeline(
        &self,
        caller: &Caller,
        query: &ExportQuery,
    ) -> Result<PipelineExport, ExternalApplyError> {
        if !caller.is_admin() && !caller.is_employer() {
            return Err(ExternalApplyError::Forbidden(
                "Only employers or admins can export the ATS pipeline.".to_string(),
            ));
        }

        let scope = (!caller.is_admin()).then_some(&caller.user_id);
        let mut listings = self.store.listings_for_employer(scope)?;
        if let Some(only) = query.internship_id.as_deref().and_then(ListingId::parse) {
            listings.retain(|listing| listing.id == only);
        }
        if listings.is_empty() {
            return Err(ExternalApplyError::NotFound(
                "No internships available to export.".to_string(),
            ));
        }

        let listing_ids: Vec<ListingId> = listings.iter().map(|listing| listing.id).collect();
        let tab = ExportTab::parse(query.tab.as_deref());
        let mut rows: Vec<ApplicationRecord> = self
            .store
            .for_listings(&listing_ids)?
            .into_iter()
            .filter(|row| tab.includes(row.ats_invite_status))
            .collect();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let titles: HashMap<ListingId, &ListingRecord> =
            listings.iter().map(|listing| (listing.id, listing)).collect();

        let summary_requested = query
            .mode
            .as_deref()
            .map(|mode| mode.trim().eq_ignore_ascii_case("summary"))
            .unwrap_or(false);
        if summary_requested {
            return Ok(PipelineExport::Summary(summarize(&rows)));
        }

        render_csv(&rows, &titles).map(PipelineExport::Csv)
    }
}

fn render_csv(
    rows: &[ApplicationRecord],
    listings: &HashMap<ListingId, &ListingRecord>,
) -> Result<String, ExternalApplyError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer
            .write_record([
                "application_id",
                "internship_id",
                "internship_title",
                "submitted_at",
                "status",
                "ats_invited_at",
                "ats_invite_message",
                "external_apply_clicks",
                "external_apply_last_clicked_at",
            ])
            .map_err(export_failure)?;
    }

    for row in rows {
        writer
            .serialize(ExportRow {
                application_id: row.id.to_string(),
                internship_id: row.internship_id.to_string(),
                internship_title: listings
                    .get(&row.internship_id)
                    .map(|listing| listing.title.as_str())
                    .unwrap_or_default(),
                submitted_at: timestamp(Some(row.submitted_at)),
                status: row.ats_invite_status.label(),
                ats_invited_at: timestamp(row.ats_invited_at),
                ats_invite_message: row.ats_invite_message.as_deref().unwrap_or_default(),
                external_apply_clicks: row.external_apply_clicks,
                external_apply_last_clicked_at: timestamp(row.external_apply_last_clicked_at),
            })
            .map_err(export_failure)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| export_failure(error.to_string()))?;
    String::from_utf8(bytes).map_err(export_failure)
}

fn export_failure(error: impl ToString) -> ExternalApplyError {
    ExternalApplyError::Internal(format!("Could not build export: {}", error.to_string()))
}

fn summarize(rows: &[ApplicationRecord]) -> PipelineSummary {
    let count_where = |wanted: &[AtsInviteStatus]| {
        rows.iter()
            .filter(|row| wanted.contains(&row.ats_invite_status))
            .count()
    };
    let invited = count_where(&[AtsInviteStatus::Invited, AtsInviteStatus::Clicked]);
    let completed = count_where(&[AtsInviteStatus::SelfReportedComplete]);
    let confirmed = count_where(&[AtsInviteStatus::EmployerConfirmed]);

    PipelineSummary {
        text: format!(
            "ATS pipeline summary\nTotal applicants: {}\nInvited: {invited}\nCompleted externally: {completed}\nEmployer confirmed: {confirmed}",
            rows.len()
        ),
        count: rows.len(),
    }
}
