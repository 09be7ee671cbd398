//! Typed views of untrusted JSON bodies. Parsing is lenient about shape (wrong
//! types read as absent) and strict about the values that matter.

use std::collections::HashSet;

use serde_json::Value;

use super::domain::{
    ApplicationId, ApplyMode, AtsStageMode, EmployerAtsDefaults, ExternalApplyType,
    InternshipAtsConfig, ListingId,
};
use super::invite::sanitize_invite_message;
use super::normalize::{
    normalize_employer_default_mode, normalize_external_apply_type, normalize_external_apply_url,
};
use super::service::ExternalApplyError;

pub(crate) fn parse_json_body(body: &[u8]) -> Result<Value, ExternalApplyError> {
    serde_json::from_slice(body)
        .map_err(|_| ExternalApplyError::InvalidInput("Invalid JSON body.".to_string()))
}

fn string_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

/// Mode an employer picks for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingApplyMode {
    Native,
    Curated,
    Immediate,
}

impl ListingApplyMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "native" => Some(Self::Native),
            "curated" => Some(Self::Curated),
            "immediate" => Some(Self::Immediate),
            _ => None,
        }
    }

    pub fn requires_url(self) -> bool {
        !matches!(self, Self::Native)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingConfigRequest {
    pub internship_id: ListingId,
    pub mode: ListingApplyMode,
    pub external_apply_url: Option<String>,
    pub external_apply_type: ExternalApplyType,
    pub use_employer_ats_defaults: bool,
}

impl ListingConfigRequest {
    pub fn from_json(body: &Value) -> Result<Self, ExternalApplyError> {
        let internship_raw = string_field(body, "internship_id")
            .map(str::trim)
            .unwrap_or_default();
        if internship_raw.is_empty() {
            return Err(ExternalApplyError::InvalidInput(
                "internship_id is required.".to_string(),
            ));
        }
        let internship_id = ListingId::parse(internship_raw).ok_or_else(|| {
            ExternalApplyError::InvalidInput("internship_id must be a valid identifier.".to_string())
        })?;

        let mode = string_field(body, "mode")
            .and_then(ListingApplyMode::parse)
            .ok_or_else(|| {
                ExternalApplyError::InvalidInput(
                    "mode must be native, curated, or immediate.".to_string(),
                )
            })?;

        let external_apply_url = normalize_external_apply_url(string_field(body, "external_apply_url"));
        if mode.requires_url() && external_apply_url.is_none() {
            return Err(ExternalApplyError::InvalidInput(
                "A valid http(s) official application URL is required.".to_string(),
            ));
        }

        Ok(Self {
            internship_id,
            mode,
            external_apply_url,
            external_apply_type: normalize_external_apply_type(string_field(
                body,
                "external_apply_type",
            )),
            use_employer_ats_defaults: body
                .get("use_employer_ats_defaults")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Listing fields as they will be stored.
    pub fn to_internship_config(&self) -> InternshipAtsConfig {
        let (apply_mode, stage) = match self.mode {
            ListingApplyMode::Native => {
                return InternshipAtsConfig {
                    apply_mode: Some(ApplyMode::Native.label().to_string()),
                    ats_stage_mode: None,
                    external_apply_url: None,
                    external_apply_type: None,
                    use_employer_ats_defaults: Some(self.use_employer_ats_defaults),
                }
            }
            ListingApplyMode::Curated => (ApplyMode::Hybrid, AtsStageMode::Curated),
            ListingApplyMode::Immediate => (ApplyMode::AtsLink, AtsStageMode::Immediate),
        };

        InternshipAtsConfig {
            apply_mode: Some(apply_mode.label().to_string()),
            ats_stage_mode: Some(stage.label().to_string()),
            external_apply_url: self.external_apply_url.clone(),
            external_apply_type: Some(self.external_apply_type.label().to_string()),
            use_employer_ats_defaults: Some(self.use_employer_ats_defaults),
        }
    }
}

/// Employer settings body. Every field is normalized; nothing here is rejected.
pub fn employer_defaults_from_json(body: &Value) -> EmployerAtsDefaults {
    EmployerAtsDefaults {
        default_ats_stage_mode: normalize_employer_default_mode(string_field(
            body,
            "default_ats_stage_mode",
        )),
        default_external_apply_url: normalize_external_apply_url(string_field(
            body,
            "default_external_apply_url",
        )),
        default_external_apply_type: normalize_external_apply_type(string_field(
            body,
            "default_external_apply_type",
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Invite,
    Confirm,
}

impl BulkAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "invite" => Some(Self::Invite),
            "confirm" => Some(Self::Confirm),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            BulkAction::Invite => "invite",
            BulkAction::Confirm => "confirm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub application_ids: Vec<ApplicationId>,
    pub message: Option<String>,
}

impl BulkRequest {
    pub fn from_json(body: &Value) -> Result<Self, ExternalApplyError> {
        let action = string_field(body, "action")
            .and_then(BulkAction::parse)
            .ok_or_else(|| ExternalApplyError::InvalidInput("Invalid action.".to_string()))?;

        let application_ids = normalize_application_ids(body.get("application_ids"));
        if application_ids.is_empty() {
            return Err(ExternalApplyError::InvalidInput(
                "No valid application IDs supplied.".to_string(),
            ));
        }

        Ok(Self {
            action,
            application_ids,
            message: sanitize_invite_message(string_field(body, "message")),
        })
    }
}

/// Keep well-formed ids in first-seen order; drop duplicates and junk silently.
pub fn normalize_application_ids(value: Option<&Value>) -> Vec<ApplicationId> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(ApplicationId::parse)
        .filter(|id| seen.insert(*id))
        .collect()
}
