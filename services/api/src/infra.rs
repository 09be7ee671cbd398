use chrono::{DateTime, Utc};
use internship_ats::workflows::external_apply::invite::apply_click;
use internship_ats::workflows::external_apply::{
    AnalyticsEvent, AnalyticsSink, ApplicationId, ApplicationRecord, ApplicationRepository,
    AtsInviteStatus, ClickOutcome, DispatchError, EmployerAtsDefaults,
    EmployerSettingsRepository, ExternalApplyService, InternshipAtsConfig, ListingId,
    ListingRecord, ListingRepository, Notification, NotificationDispatcher, RepositoryError,
    StatusChange, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiService =
    ExternalApplyService<InMemoryAtsStore, InMemoryNotificationOutbox, InMemoryAnalyticsSink>;

#[derive(Default)]
struct StoreState {
    applications: BTreeMap<ApplicationId, ApplicationRecord>,
    listings: BTreeMap<ListingId, ListingRecord>,
    defaults: HashMap<UserId, EmployerAtsDefaults>,
}

/// Process-local row store. A single lock makes each conditional write and
/// each click increment atomic.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAtsStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryAtsStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    pub(crate) fn add_listing(&self, listing: ListingRecord) -> Result<(), RepositoryError> {
        self.lock()?.listings.insert(listing.id, listing);
        Ok(())
    }

    /// Stand-in for the upstream self-report step, which this service never
    /// performs itself.
    pub(crate) fn record_self_report(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        let mut state = self.lock()?;
        let Some(row) = state.applications.get_mut(id) else {
            return Ok(false);
        };
        if row.ats_invite_status != AtsInviteStatus::Clicked {
            return Ok(false);
        }
        row.ats_invite_status = AtsInviteStatus::SelfReportedComplete;
        Ok(true)
    }
}

impl ApplicationRepository for InMemoryAtsStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut state = self.lock()?;
        let duplicate = state.applications.values().any(|existing| {
            existing.student_id == record.student_id
                && existing.internship_id == record.internship_id
        });
        if duplicate || state.applications.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        state.applications.insert(record.id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.lock()?.applications.get(id).cloned())
    }

    fn fetch_many(&self, ids: &[ApplicationId]) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.applications.get(id).cloned())
            .collect())
    }

    fn for_listings(
        &self,
        listing_ids: &[ListingId],
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let state = self.lock()?;
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
        let mut state = self.lock()?;
        let mut moved = Vec::new();
        for id in ids {
            if let Some(row) = state.applications.get_mut(id) {
                if change.apply_to(row) {
                    moved.push(*id);
                }
            }
        }
        Ok(moved)
    }

    fn record_click(
        &self,
        id: &ApplicationId,
        student_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<ClickOutcome>, RepositoryError> {
        let mut state = self.lock()?;
        Ok(state
            .applications
            .get_mut(id)
            .filter(|row| row.student_id == *student_id)
            .map(|row| apply_click(row, at)))
    }
}

impl ListingRepository for InMemoryAtsStore {
    fn fetch_listing(&self, id: &ListingId) -> Result<Option<ListingRecord>, RepositoryError> {
        Ok(self.lock()?.listings.get(id).cloned())
    }

    fn fetch_listings(&self, ids: &[ListingId]) -> Result<Vec<ListingRecord>, RepositoryError> {
        let state = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.listings.get(id).cloned())
            .collect())
    }

    fn listings_for_employer(
        &self,
        employer_id: Option<&UserId>,
    ) -> Result<Vec<ListingRecord>, RepositoryError> {
        let state = self.lock()?;
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
        let mut state = self.lock()?;
        let listing = state
            .listings
            .get_mut(id)
            .filter(|listing| listing.employer_id == *employer_id)
            .ok_or(RepositoryError::NotFound)?;
        listing.ats = config;
        Ok(())
    }
}

impl EmployerSettingsRepository for InMemoryAtsStore {
    fn ats_defaults(&self, employer_id: &UserId) -> Result<EmployerAtsDefaults, RepositoryError> {
        Ok(self
            .lock()?
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
        self.lock()?.defaults.insert(*employer_id, defaults);
        Ok(())
    }
}

/// Keeps delivered notifications in memory and logs each one.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationOutbox {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationDispatcher for InMemoryNotificationOutbox {
    fn dispatch(&self, notifications: Vec<Notification>) -> Result<(), DispatchError> {
        let mut guard = self
            .delivered
            .lock()
            .map_err(|_| DispatchError::Transport("outbox mutex poisoned".to_string()))?;
        for notification in notifications {
            info!(
                user_id = %notification.user_id,
                notification_type = notification.kind.label(),
                title = %notification.title,
                "notification stored"
            );
            guard.push(notification);
        }
        Ok(())
    }
}

impl InMemoryNotificationOutbox {
    pub(crate) fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAnalyticsSink {
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

impl AnalyticsSink for InMemoryAnalyticsSink {
    fn track(&self, event: AnalyticsEvent) -> Result<(), DispatchError> {
        debug!(event = %event.name, user_id = %event.user_id, "analytics event recorded");
        self.events
            .lock()
            .map_err(|_| DispatchError::Transport("analytics mutex poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl InMemoryAnalyticsSink {
    pub(crate) fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|guard| guard.iter().map(|event| event.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// Identities and listings the server and demo start with.
#[derive(Debug, Clone)]
pub(crate) struct SampleCatalog {
    pub(crate) employer: UserId,
    pub(crate) curated_listing: ListingId,
    pub(crate) immediate_listing: ListingId,
    pub(crate) native_listing: ListingId,
}

pub(crate) fn seed_sample_catalog(
    store: &InMemoryAtsStore,
    ats_url: &str,
) -> Result<SampleCatalog, RepositoryError> {
    let employer = UserId::new_v4();
    let listing = |title: &str, ats: InternshipAtsConfig| ListingRecord {
        id: ListingId::new_v4(),
        employer_id: employer,
        title: title.to_string(),
        is_active: true,
        ats,
    };

    let curated = listing(
        "Backend Engineering Intern",
        InternshipAtsConfig {
            apply_mode: Some("hybrid".to_string()),
            ats_stage_mode: Some("curated".to_string()),
            external_apply_url: Some(ats_url.to_string()),
            external_apply_type: Some("new_tab".to_string()),
            use_employer_ats_defaults: Some(false),
        },
    );
    let immediate = listing(
        "Product Design Intern",
        InternshipAtsConfig {
            apply_mode: Some("ats_link".to_string()),
            ats_stage_mode: Some("immediate".to_string()),
            external_apply_url: Some(ats_url.to_string()),
            external_apply_type: Some("redirect".to_string()),
            use_employer_ats_defaults: Some(false),
        },
    );
    let native = listing("Marketing Intern", InternshipAtsConfig::inherit());

    let catalog = SampleCatalog {
        employer,
        curated_listing: curated.id,
        immediate_listing: immediate.id,
        native_listing: native.id,
    };
    store.add_listing(curated)?;
    store.add_listing(immediate)?;
    store.add_listing(native)?;
    Ok(catalog)
}
