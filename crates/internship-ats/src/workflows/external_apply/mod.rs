//! External-apply workflow: where a student's application goes after the
//! platform, who may send them there, and what is recorded on the way.

pub mod bulk;
pub mod dispatch;
pub mod domain;
pub mod export;
pub mod invite;
pub mod normalize;
pub mod redirect;
pub mod repository;
pub mod requests;
pub mod resolver;
pub mod router;
pub mod service;

pub use bulk::BulkOutcome;
pub use domain::{
    ApplicationId, ApplicationRecord, ApplyMode, AtsInviteStatus, AtsStageMode, Caller,
    EmployerAtsDefaultMode, EmployerAtsDefaults, ExternalApplyType, InternshipAtsConfig,
    ListingId, ListingRecord, Role, UserId,
};
pub use export::{ExportQuery, ExportTab, PipelineExport, PipelineSummary};
pub use invite::{ClickOutcome, StatusChange, TransitionError};
pub use redirect::{ExternalRedirect, RedirectRejection};
pub use repository::{
    AnalyticsEvent, AnalyticsSink, ApplicationRepository, AtsStore, DispatchError,
    EmployerSettingsRepository, ListingRepository, Notification, NotificationDispatcher,
    NotificationType, RepositoryError,
};
pub use resolver::{resolve, ConfigSource, EffectiveAtsConfig};
pub use router::{caller_from_headers, external_apply_router, USER_ID_HEADER, USER_ROLE_HEADER};
pub use service::{ExternalApplyError, ExternalApplyService, SubmittedApplication};

#[cfg(test)]
mod tests;
