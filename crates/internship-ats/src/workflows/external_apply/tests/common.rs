use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::NotificationConfig;
use crate::workflows::external_apply::domain::{
    ApplicationId, ApplicationRecord, AtsInviteStatus, Caller, EmployerAtsDefaultMode,
    EmployerAtsDefaults, ExternalApplyType, InternshipAtsConfig, ListingId, ListingRecord, Role,
    UserId,
};
use crate::workflows::external_apply::invite::{apply_click, ClickOutcome, StatusChange};
use crate::workflows::external_apply::repository::{
    AnalyticsEvent, AnalyticsSink, ApplicationRepository, DispatchError,
    EmployerSettingsRepository, ListingRepository, Notification, NotificationDispatcher,
    RepositoryError,
};
use crate::workflows::external_apply::router::{USER_ID_HEADER, USER_ROLE_HEADER};
use crate::workflows::external_apply::ExternalApplyService;

pub(super) const ATS_URL: &str = "https://ats.example.com/apply";

#[derive(Default)]
struct StoreState {
    applications: BTreeMap<ApplicationId, ApplicationRecord>,
    listings: BTreeMap<ListingId, ListingRecord>,
    defaults: HashMap<UserId, EmployerAtsDefaults>,
}

/// Row store double holding everything behind one lock, so conditional
/// writes behave like single-row transactions.
#[derive(Default)]
pub(super) struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub(super) fn put_listing(&self, listing: ListingRecord) {
        self.state
            .lock()
            .unwrap()
            .listings
            .insert(listing.id, listing);
    }

    pub(super) fn put_application(&self, record: ApplicationRecord) {
        self.state
            .lock()
            .unwrap()
            .applications
            .insert(record.id, record);
    }

    pub(super) fn put_defaults(&self, employer: UserId, defaults: EmployerAtsDefaults) {
        self.state.lock().unwrap().defaults.insert(employer, defaults);
    }

    pub(super) fn application(&self, id: &ApplicationId) -> ApplicationRecord {
        self.state.lock().unwrap().applications[id].clone()
    }

    pub(super) fn listing(&self, id: &ListingId) -> ListingRecord {
        self.state.lock().unwrap().listings[id].clone()
    }

    pub(super) fn application_count(&self) -> usize {
        self.state.lock().unwrap().applications.len()
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.applications.values().any(|existing| {
            existing.student_id == record.student_id
                && existing.internship_id == record.internship_id
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        state.applications.insert(record.id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.state.lock().unwrap().applications.get(id).cloned())
    }

    fn fetch_many(&self, ids: &[ApplicationId]) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.applications.get(id).cloned())
            .collect())
    }

    fn for_listings(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .applications
            .values()
            .filter(|row| listing_ids.contains(&row.internship_id))
            .cloned()
            .collect())
    }

    fn transition_many(
        &self,
        ids: &[ApplicationId],
        change: &StatusChange,
    ) -> Result<Vec<ApplicationId>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter(|id| {
                state
                    .applications
                    .get_mut(*id)
                    .map(|row| change.apply_to(row))
                    .unwrap_or(false)
            })
            .copied()
            .collect())
    }

    fn record_click(
        &self,
        id: &ApplicationId,
        student_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<ClickOutcome>, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .applications
            .get_mut(id)
            .filter(|row| row.student_id == *student_id)
            .map(|row| apply_click(row, at)))
    }
}

impl ListingRepository for MemoryStore {
    fn fetch_listing(&self, id: &ListingId) -> Result<Option<ListingRecord>, RepositoryError> {
        Ok(self.state.lock().unwrap().listings.get(id).cloned())
    }

    fn fetch_listings(&self, ids: &[ListingId]) -> Result<Vec<ListingRecord>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.listings.get(id).cloned())
            .collect())
    }

    fn listings_for_employer(
        &self,
        employer_id: Option<&UserId>,
    ) -> Result<Vec<ListingRecord>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .listings
            .values()
            .filter(|listing| employer_id.map_or(true, |id| listing.employer_id == *id))
            .cloned()
            .collect())
    }

    fn update_ats_config(
        &self,
        id: &ListingId,
        employer_id: &UserId,
        config: InternshipAtsConfig,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let listing = state
            .listings
            .get_mut(id)
            .filter(|listing| listing.employer_id == *employer_id)
            .ok_or(RepositoryError::NotFound)?;
        listing.ats = config;
        Ok(())
    }
}

impl EmployerSettingsRepository for MemoryStore {
    fn ats_defaults(&self, employer_id: &UserId) -> Result<EmployerAtsDefaults, RepositoryError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .defaults
            .get(employer_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_ats_defaults(
        &self,
        employer_id: &UserId,
        defaults: EmployerAtsDefaults,
    ) -> Result<(), RepositoryError> {
        self.put_defaults(*employer_id, defaults);
        Ok(())
    }
}

/// Store whose every call fails, for exercising the 500 and redirect paths.
pub(super) struct UnavailableStore;

fn unavailable<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("connection refused".to_string()))
}

impl ApplicationRepository for UnavailableStore {
    fn insert(&self, _: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        unavailable()
    }
    fn fetch(&self, _: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        unavailable()
    }
    fn fetch_many(&self, _: &[ApplicationId]) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        unavailable()
    }
    fn for_listings(&self, _: &[ListingId]) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        unavailable()
    }
    fn transition_many(
        &self,
        _: &[ApplicationId],
        _: &StatusChange,
    ) -> Result<Vec<ApplicationId>, RepositoryError> {
        unavailable()
    }
    fn record_click(
        &self,
        _: &ApplicationId,
        _: &UserId,
        _: DateTime<Utc>,
    ) -> Result<Option<ClickOutcome>, RepositoryError> {
        unavailable()
    }
}

impl ListingRepository for UnavailableStore {
    fn fetch_listing(&self, _: &ListingId) -> Result<Option<ListingRecord>, RepositoryError> {
        unavailable()
    }
    fn fetch_listings(&self, _: &[ListingId]) -> Result<Vec<ListingRecord>, RepositoryError> {
        unavailable()
    }
    fn listings_for_employer(
        &self,
        _: Option<&UserId>,
    ) -> Result<Vec<ListingRecord>, RepositoryError> {
        unavailable()
    }
    fn update_ats_config(
        &self,
        _: &ListingId,
        _: &UserId,
        _: InternshipAtsConfig,
    ) -> Result<(), RepositoryError> {
        unavailable()
    }
}

impl EmployerSettingsRepository for UnavailableStore {
    fn ats_defaults(&self, _: &UserId) -> Result<EmployerAtsDefaults, RepositoryError> {
        unavailable()
    }
    fn save_ats_defaults(&self, _: &UserId, _: EmployerAtsDefaults) -> Result<(), RepositoryError> {
        unavailable()
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    pub(super) sent: Mutex<Vec<Notification>>,
}

impl NotificationDispatcher for MemoryNotifier {
    fn dispatch(&self, notifications: Vec<Notification>) -> Result<(), DispatchError> {
        self.sent.lock().unwrap().extend(notifications);
        Ok(())
    }
}

impl MemoryNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub(super) struct MemoryAnalytics {
    pub(super) events: Mutex<Vec<AnalyticsEvent>>,
}

impl AnalyticsSink for MemoryAnalytics {
    fn track(&self, event: AnalyticsEvent) -> Result<(), DispatchError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

impl MemoryAnalytics {
    pub(super) fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.name.clone())
            .collect()
    }

    pub(super) fn last(&self) -> Option<AnalyticsEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

/// Transport that is always down.
pub(super) struct FailingTransport;

impl NotificationDispatcher for FailingTransport {
    fn dispatch(&self, _: Vec<Notification>) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("smtp relay offline".to_string()))
    }
}

impl AnalyticsSink for FailingTransport {
    fn track(&self, _: AnalyticsEvent) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("collector offline".to_string()))
    }
}

pub(super) type TestService = ExternalApplyService<MemoryStore, MemoryNotifier, MemoryAnalytics>;

/// One employer with a listing-ready store, a student and an admin.
pub(super) struct Fixture {
    pub(super) store: Arc<MemoryStore>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) analytics: Arc<MemoryAnalytics>,
    pub(super) service: Arc<TestService>,
    pub(super) employer: Caller,
    pub(super) student: Caller,
    pub(super) admin: Caller,
}

impl Fixture {
    pub(super) fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let analytics = Arc::new(MemoryAnalytics::default());
        let service = Arc::new(ExternalApplyService::new(
            store.clone(),
            notifier.clone(),
            analytics.clone(),
            NotificationConfig::default(),
        ));

        Self {
            store,
            notifier,
            analytics,
            service,
            employer: Caller::new(UserId::new_v4(), Role::Employer),
            student: Caller::new(UserId::new_v4(), Role::Student),
            admin: Caller::new(UserId::new_v4(), Role::OpsAdmin),
        }
    }

    /// Active listing owned by the fixture employer.
    pub(super) fn listing(&self, ats: InternshipAtsConfig) -> ListingRecord {
        self.listing_owned_by(self.employer.user_id, ats)
    }

    pub(super) fn listing_owned_by(&self, owner: UserId, ats: InternshipAtsConfig) -> ListingRecord {
        let listing = ListingRecord {
            id: ListingId::new_v4(),
            employer_id: owner,
            title: "Data Engineering Intern".to_string(),
            is_active: true,
            ats,
        };
        self.store.put_listing(listing.clone());
        listing
    }

    /// Application by the fixture student.
    pub(super) fn application(
        &self,
        listing: &ListingRecord,
        status: AtsInviteStatus,
    ) -> ApplicationRecord {
        self.application_by(UserId::new_v4(), listing, status, 0)
    }

    pub(super) fn student_application(
        &self,
        listing: &ListingRecord,
        status: AtsInviteStatus,
    ) -> ApplicationRecord {
        self.application_by(self.student.user_id, listing, status, 0)
    }

    pub(super) fn application_by(
        &self,
        student: UserId,
        listing: &ListingRecord,
        status: AtsInviteStatus,
        age_days: i64,
    ) -> ApplicationRecord {
        let mut record =
            ApplicationRecord::submitted(student, listing.id, submitted_at(age_days), false);
        record.ats_invite_status = status;
        self.store.put_application(record.clone());
        record
    }
}

pub(super) fn submitted_at(age_days: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 20, 9, 30, 0).unwrap() - Duration::days(age_days)
}

pub(super) fn curated_listing(url: Option<&str>) -> InternshipAtsConfig {
    InternshipAtsConfig {
        apply_mode: Some("hybrid".to_string()),
        ats_stage_mode: Some("curated".to_string()),
        external_apply_url: url.map(str::to_string),
        external_apply_type: Some("new_tab".to_string()),
        use_employer_ats_defaults: Some(false),
    }
}

pub(super) fn immediate_listing(url: Option<&str>) -> InternshipAtsConfig {
    InternshipAtsConfig {
        apply_mode: Some("ats_link".to_string()),
        ats_stage_mode: Some("immediate".to_string()),
        external_apply_url: url.map(str::to_string),
        external_apply_type: Some("redirect".to_string()),
        use_employer_ats_defaults: Some(false),
    }
}

pub(super) fn employer_defaults(
    mode: EmployerAtsDefaultMode,
    url: Option<&str>,
) -> EmployerAtsDefaults {
    EmployerAtsDefaults {
        default_ats_stage_mode: mode,
        default_external_apply_url: url.map(str::to_string),
        default_external_apply_type: ExternalApplyType::NewTab,
    }
}

pub(super) fn json_body(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

pub(super) fn request_as(
    caller: Option<&Caller>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(USER_ID_HEADER, caller.user_id.to_string());
        if let Some(role) = caller.role {
            builder = builder.header(USER_ROLE_HEADER, role.label());
        }
    }
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(json_body(value)))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(super) async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub(super) async fn read_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub(super) fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
