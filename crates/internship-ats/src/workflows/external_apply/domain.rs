use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parse an identifier, accepting only RFC 4122 UUIDs of versions 1 through 5.
pub fn parse_identifier(raw: &str) -> Option<Uuid> {
    let parsed = Uuid::parse_str(raw.trim()).ok()?;
    let version_ok = matches!(parsed.get_version_num(), 1..=5);
    let variant_ok = parsed.get_variant() == uuid::Variant::RFC4122;
    (version_ok && variant_ok).then_some(parsed)
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn parse(raw: &str) -> Option<Self> {
                parse_identifier(raw).map(Self)
            }

            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

identifier!(
    /// Identifier of a student's application to one listing.
    ApplicationId
);
identifier!(
    /// Identifier of an internship listing.
    ListingId
);
identifier!(
    /// Identifier of any platform user (student, employer, or admin).
    UserId
);

/// Platform roles as resolved by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Employer,
    OpsAdmin,
    SuperAdmin,
    Support,
}

impl Role {
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "employer" => Some(Self::Employer),
            "ops_admin" => Some(Self::OpsAdmin),
            "super_admin" => Some(Self::SuperAdmin),
            "support" => Some(Self::Support),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Employer => "employer",
            Role::OpsAdmin => "ops_admin",
            Role::SuperAdmin => "super_admin",
            Role::Support => "support",
        }
    }

    pub const fn is_admin(self) -> bool {
        matches!(self, Role::OpsAdmin | Role::SuperAdmin)
    }
}

/// The signed-in user behind a request. `role` is `None` when the role lookup
/// produced nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Option<Role>,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role: Some(role),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.map(Role::is_admin).unwrap_or(false)
    }

    pub fn is_employer(&self) -> bool {
        self.role == Some(Role::Employer)
    }
}

/// How a listing accepts applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    Native,
    AtsLink,
    Hybrid,
}

impl ApplyMode {
    pub const fn label(self) -> &'static str {
        match self {
            ApplyMode::Native => "native",
            ApplyMode::AtsLink => "ats_link",
            ApplyMode::Hybrid => "hybrid",
        }
    }

    pub const fn requires_external_apply(self) -> bool {
        matches!(self, ApplyMode::AtsLink | ApplyMode::Hybrid)
    }
}

/// Whether the external step is gated behind an invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsStageMode {
    Curated,
    Immediate,
}

impl AtsStageMode {
    pub const fn label(self) -> &'static str {
        match self {
            AtsStageMode::Curated => "curated",
            AtsStageMode::Immediate => "immediate",
        }
    }
}

/// Employer-wide default stage mode; `None` means listings apply natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployerAtsDefaultMode {
    #[default]
    None,
    Curated,
    Immediate,
}

impl EmployerAtsDefaultMode {
    pub const fn label(self) -> &'static str {
        match self {
            EmployerAtsDefaultMode::None => "none",
            EmployerAtsDefaultMode::Curated => "curated",
            EmployerAtsDefaultMode::Immediate => "immediate",
        }
    }
}

/// How the browser should open the external destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalApplyType {
    #[default]
    NewTab,
    Redirect,
}

impl ExternalApplyType {
    pub const fn label(self) -> &'static str {
        match self {
            ExternalApplyType::NewTab => "new_tab",
            ExternalApplyType::Redirect => "redirect",
        }
    }
}

/// Forward-only lifecycle of an application through the external-apply flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsInviteStatus {
    #[default]
    NotInvited,
    Invited,
    Clicked,
    SelfReportedComplete,
    EmployerConfirmed,
}

impl AtsInviteStatus {
    pub const ALL: [AtsInviteStatus; 5] = [
        AtsInviteStatus::NotInvited,
        AtsInviteStatus::Invited,
        AtsInviteStatus::Clicked,
        AtsInviteStatus::SelfReportedComplete,
        AtsInviteStatus::EmployerConfirmed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            AtsInviteStatus::NotInvited => "not_invited",
            AtsInviteStatus::Invited => "invited",
            AtsInviteStatus::Clicked => "clicked",
            AtsInviteStatus::SelfReportedComplete => "self_reported_complete",
            AtsInviteStatus::EmployerConfirmed => "employer_confirmed",
        }
    }
}

/// Employer-wide ATS defaults stored with the employer's settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmployerAtsDefaults {
    pub default_ats_stage_mode: EmployerAtsDefaultMode,
    pub default_external_apply_url: Option<String>,
    pub default_external_apply_type: ExternalApplyType,
}

/// Listing-level ATS fields exactly as persisted. Values are kept raw because
/// legacy rows may carry anything; the resolver normalizes them on read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InternshipAtsConfig {
    pub apply_mode: Option<String>,
    pub ats_stage_mode: Option<String>,
    pub external_apply_url: Option<String>,
    pub external_apply_type: Option<String>,
    pub use_employer_ats_defaults: Option<bool>,
}

impl InternshipAtsConfig {
    /// Config assigned to a freshly created listing: native, inheriting defaults.
    pub fn inherit() -> Self {
        Self {
            apply_mode: Some(ApplyMode::Native.label().to_string()),
            use_employer_ats_defaults: Some(true),
            ..Self::default()
        }
    }
}

/// Internship listing as seen by the external-apply workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: ListingId,
    pub employer_id: UserId,
    pub title: String,
    pub is_active: bool,
    pub ats: InternshipAtsConfig,
}

/// Application row with its ATS tracking fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub student_id: UserId,
    pub internship_id: ListingId,
    pub submitted_at: DateTime<Utc>,
    pub ats_invite_status: AtsInviteStatus,
    pub ats_invited_at: Option<DateTime<Utc>>,
    pub ats_invited_by: Option<UserId>,
    pub ats_invite_message: Option<String>,
    pub external_apply_clicks: u32,
    pub external_apply_last_clicked_at: Option<DateTime<Utc>>,
    pub external_apply_required: bool,
}

impl ApplicationRecord {
    pub fn submitted(
        student_id: UserId,
        internship_id: ListingId,
        submitted_at: DateTime<Utc>,
        external_apply_required: bool,
    ) -> Self {
        Self {
            id: ApplicationId::new_v4(),
            student_id,
            internship_id,
            submitted_at,
            ats_invite_status: AtsInviteStatus::NotInvited,
            ats_invited_at: None,
            ats_invited_by: None,
            ats_invite_message: None,
            external_apply_clicks: 0,
            external_apply_last_clicked_at: None,
            external_apply_required,
        }
    }
}
