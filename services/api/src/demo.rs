use crate::infra::{
    seed_sample_catalog, ApiService, InMemoryAnalyticsSink, InMemoryAtsStore,
    InMemoryNotificationOutbox,
};
use clap::Args;
use internship_ats::config::NotificationConfig;
use internship_ats::error::AppError;
use internship_ats::workflows::external_apply::normalize::{
    normalize_employer_default_mode, normalize_external_apply_type,
};
use internship_ats::workflows::external_apply::{
    resolve, ApplicationId, Caller, EffectiveAtsConfig, EmployerAtsDefaults, ExportQuery,
    ExternalApplyError, InternshipAtsConfig, ListingId, PipelineExport, Role, UserId,
};
use serde_json::json;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct ResolveArgs {
    /// Employer default stage mode: none, curated or immediate
    #[arg(long)]
    pub(crate) employer_mode: Option<String>,
    /// Employer default external application URL, taken as stored
    #[arg(long)]
    pub(crate) employer_url: Option<String>,
    /// Employer default open behavior: new_tab or redirect
    #[arg(long)]
    pub(crate) employer_type: Option<String>,
    /// Whether the listing inherits employer defaults (omit for legacy rows)
    #[arg(long)]
    pub(crate) use_employer_defaults: Option<bool>,
    /// Listing apply mode: native, ats_link or hybrid
    #[arg(long)]
    pub(crate) listing_apply_mode: Option<String>,
    /// Listing stage mode: curated or immediate
    #[arg(long)]
    pub(crate) listing_stage_mode: Option<String>,
    /// Listing external application URL
    #[arg(long)]
    pub(crate) listing_url: Option<String>,
    /// Listing open behavior: new_tab or redirect
    #[arg(long)]
    pub(crate) listing_type: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// External ATS destination used by the sample listings
    #[arg(long, default_value = "https://ats.example.com/apply")]
    pub(crate) ats_url: String,
    /// Message attached to the sample invite
    #[arg(long)]
    pub(crate) message: Option<String>,
}

pub(crate) fn resolve_from_args(args: &ResolveArgs) -> EffectiveAtsConfig {
    let defaults = EmployerAtsDefaults {
        default_ats_stage_mode: normalize_employer_default_mode(args.employer_mode.as_deref()),
        default_external_apply_url: args.employer_url.clone(),
        default_external_apply_type: normalize_external_apply_type(args.employer_type.as_deref()),
    };
    let listing = InternshipAtsConfig {
        apply_mode: args.listing_apply_mode.clone(),
        ats_stage_mode: args.listing_stage_mode.clone(),
        external_apply_url: args.listing_url.clone(),
        external_apply_type: args.listing_type.clone(),
        use_employer_ats_defaults: args.use_employer_defaults,
    };
    resolve(&listing, &defaults)
}

pub(crate) fn run_resolve(args: ResolveArgs) -> Result<(), AppError> {
    let effective = resolve_from_args(&args);
    let rendered = serde_json::to_string_pretty(&effective)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    println!("{rendered}");
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    println!("Internship external-apply demo");
    for line in walkthrough(&args.ats_url, args.message.as_deref())? {
        println!("{line}");
    }
    Ok(())
}

fn body(value: serde_json::Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

fn click_line(
    service: &ApiService,
    student: &Caller,
    listing: &ListingId,
    application: &ApplicationId,
) -> String {
    let application = application.to_string();
    match service.external_click(Some(student), Some(listing), Some(&application)) {
        Ok(redirect) => format!(
            "  307 -> {} (status {}, clicks {})",
            redirect.location,
            redirect.status.label(),
            redirect.clicks
        ),
        Err(rejection) => format!(
            "  303 -> {} ({})",
            rejection.location(Some(listing)),
            rejection.message()
        ),
    }
}

/// Run the sample flow and return the lines to print.
pub(crate) fn walkthrough(ats_url: &str, message: Option<&str>) -> Result<Vec<String>, AppError> {
    let store = InMemoryAtsStore::default();
    let outbox = InMemoryNotificationOutbox::default();
    let analytics = InMemoryAnalyticsSink::default();
    let catalog = seed_sample_catalog(&store, ats_url).map_err(ExternalApplyError::from)?;
    let service = ApiService::new(
        Arc::new(store.clone()),
        Arc::new(outbox.clone()),
        Arc::new(analytics.clone()),
        NotificationConfig::default(),
    );

    let employer = Caller::new(catalog.employer, Role::Employer);
    let curated_student = Caller::new(UserId::new_v4(), Role::Student);
    let immediate_student = Caller::new(UserId::new_v4(), Role::Student);
    let mut lines = Vec::new();

    lines.push("\n1. Curated listing: the invite gate".to_string());
    let curated = service.submit_application(&curated_student, &catalog.curated_listing)?;
    lines.push(format!(
        "- Student applied ({}) -> {}",
        curated.application_id,
        curated.ats_invite_status.label()
    ));
    lines.push("- Student clicks through before an invite:".to_string());
    lines.push(click_line(
        &service,
        &curated_student,
        &catalog.curated_listing,
        &curated.application_id,
    ));

    let invite = body(json!({
        "action": "invite",
        "application_ids": [curated.application_id.to_string(), "not-an-id"],
        "message": message,
    }));
    let first = service.bulk_update(&employer, &invite)?;
    let retry = service.bulk_update(&employer, &invite)?;
    lines.push(format!(
        "- Employer bulk invite -> updated {} (retry of same batch -> updated {})",
        first.updated, retry.updated
    ));
    lines.push("- Student clicks through after the invite:".to_string());
    lines.push(click_line(
        &service,
        &curated_student,
        &catalog.curated_listing,
        &curated.application_id,
    ));

    lines.push("\n2. Immediate listing: no invite needed".to_string());
    let immediate = service.submit_application(&immediate_student, &catalog.immediate_listing)?;
    lines.push(format!(
        "- Student applied ({}) -> external step required: {}",
        immediate.application_id, immediate.external_apply_required
    ));
    lines.push(click_line(
        &service,
        &immediate_student,
        &catalog.immediate_listing,
        &immediate.application_id,
    ));

    lines.push("\n3. Completion and confirmation".to_string());
    store
        .record_self_report(&curated.application_id)
        .map_err(ExternalApplyError::from)?;
    let confirm = body(json!({
        "action": "confirm",
        "application_ids": [
            curated.application_id.to_string(),
            immediate.application_id.to_string(),
        ],
    }));
    let confirmed = service.bulk_update(&employer, &confirm)?;
    lines.push(format!(
        "- Curated applicant self-reported completion; employer confirm -> updated {}",
        confirmed.updated
    ));

    lines.push("\n4. Pipeline summary".to_string());
    let export = service.export_pipeline(
        &employer,
        &ExportQuery {
            mode: Some("summary".to_string()),
            ..Default::default()
        },
    )?;
    if let PipelineExport::Summary(summary) = export {
        lines.extend(summary.text.lines().map(|line| format!("  {line}")));
    }

    lines.push(format!(
        "\nSide effects: {} notifications, analytics events [{}]",
        outbox.delivered().len(),
        analytics.event_names().join(", ")
    ));
    Ok(lines)
}
