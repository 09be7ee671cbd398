use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationId, ApplicationRecord, EmployerAtsDefaults, InternshipAtsConfig, ListingId,
    ListingRecord, UserId,
};
use super::invite::{ClickOutcome, StatusChange};

/// Application rows. Status writes are conditional on the row's current status
/// and click recording is atomic; implementations must preserve both.
pub trait ApplicationRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the student already applied to the listing.
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn fetch_many(&self, ids: &[ApplicationId]) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn for_listings(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    /// Apply `change` to every listed row still in `change.expected_from()`,
    /// returning the ids that actually moved.
    fn transition_many(
        &self,
        ids: &[ApplicationId],
        change: &StatusChange,
    ) -> Result<Vec<ApplicationId>, RepositoryError>;
    /// Atomic counterpart of [`super::invite::apply_click`]. `None` when no row
    /// matches the id and student.
    fn record_click(
        &self,
        id: &ApplicationId,
        student_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<ClickOutcome>, RepositoryError>;
}

pub trait ListingRepository: Send + Sync {
    fn fetch_listing(&self, id: &ListingId) -> Result<Option<ListingRecord>, RepositoryError>;
    fn fetch_listings(&self, ids: &[ListingId]) -> Result<Vec<ListingRecord>, RepositoryError>;
    fn listings_for_employer(
        &self,
        employer_id: Option<&UserId>,
    ) -> Result<Vec<ListingRecord>, RepositoryError>;
    /// Writes only when `employer_id` still owns the listing.
    fn update_ats_config(
        &self,
        id: &ListingId,
        employer_id: &UserId,
        config: InternshipAtsConfig,
    ) -> Result<(), RepositoryError>;
}

pub trait EmployerSettingsRepository: Send + Sync {
    /// Employers without stored settings get [`EmployerAtsDefaults::default`].
    fn ats_defaults(&self, employer_id: &UserId) -> Result<EmployerAtsDefaults, RepositoryError>;
    fn save_ats_defaults(
        &self,
        employer_id: &UserId,
        defaults: EmployerAtsDefaults,
    ) -> Result<(), RepositoryError>;
}

/// Everything the external-apply workflow reads and writes.
pub trait AtsStore: ApplicationRepository + ListingRepository + EmployerSettingsRepository {}

impl<T> AtsStore for T where T: ApplicationRepository + ListingRepository + EmployerSettingsRepository
{}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationSubmitted,
    AtsInviteSent,
}

impl NotificationType {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationType::ApplicationSubmitted => "application_submitted",
            NotificationType::AtsInviteSent => "ats_invite_sent",
        }
    }
}

/// In-app notification row handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub body: String,
    pub href: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Outbound in-app notification storage.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notifications: Vec<Notification>) -> Result<(), DispatchError>;
}

/// Product analytics event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub user_id: UserId,
    pub properties: BTreeMap<String, String>,
}

impl AnalyticsEvent {
    pub fn new(name: &str, user_id: UserId) -> Self {
        Self {
            name: name.to_string(),
            user_id,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: AnalyticsEvent) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch transport unavailable: {0}")]
    Transport(String),
}
