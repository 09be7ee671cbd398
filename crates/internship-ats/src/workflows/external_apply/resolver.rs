//! The single place where "what should happen when a student applies here" is
//! decided. Resolution is pure so display, authorization and invite
//! eligibility can all call it without drifting apart.

use serde::{Deserialize, Serialize};

use super::domain::{
    ApplyMode, AtsStageMode, EmployerAtsDefaultMode, EmployerAtsDefaults, ExternalApplyType,
    InternshipAtsConfig,
};
use super::normalize::{
    normalize_apply_mode, normalize_ats_stage_mode, normalize_external_apply_type,
    normalize_external_apply_url,
};

/// Which tier the effective configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    EmployerDefaults,
    ListingOverride,
}

/// Read-only view of apply behavior after inheritance rules are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAtsConfig {
    pub source: ConfigSource,
    pub apply_mode: ApplyMode,
    pub ats_stage_mode: Option<AtsStageMode>,
    pub external_apply_url: Option<String>,
    pub external_apply_type: Option<ExternalApplyType>,
    pub requires_external_apply: bool,
    pub is_curated_invite_flow: bool,
    pub has_configured_destination: bool,
}

impl EffectiveAtsConfig {
    /// Destination re-validated at use time. Inherited employer URLs are carried
    /// through resolution untouched, so a bad one only surfaces here.
    pub fn validated_destination(&self) -> Option<String> {
        if !self.requires_external_apply {
            return None;
        }
        normalize_external_apply_url(self.external_apply_url.as_deref())
    }

    /// True when the listing sends students straight to the ATS without an invite.
    pub fn is_immediate_flow(&self) -> bool {
        self.requires_external_apply && self.ats_stage_mode == Some(AtsStageMode::Immediate)
    }
}

/// The two configuration tiers a listing can draw from.
#[derive(Debug, Clone, Copy)]
pub enum AtsConfigTier<'a> {
    Inherited(&'a EmployerAtsDefaults),
    Override(&'a InternshipAtsConfig),
}

impl<'a> AtsConfigTier<'a> {
    /// An absent flag means "inherit", which is what legacy rows expect.
    pub fn select(internship: &'a InternshipAtsConfig, defaults: &'a EmployerAtsDefaults) -> Self {
        if internship.use_employer_ats_defaults != Some(false) {
            Self::Inherited(defaults)
        } else {
            Self::Override(internship)
        }
    }

    pub fn source(&self) -> ConfigSource {
        match self {
            Self::Inherited(_) => ConfigSource::EmployerDefaults,
            Self::Override(_) => ConfigSource::ListingOverride,
        }
    }

    fn settings(&self) -> ApplySettings {
        match self {
            Self::Inherited(defaults) => derive_from_employer_defaults(defaults),
            Self::Override(listing) => derive_from_listing(listing),
        }
    }
}

/// Tier-specific settings before the cross-tier stale-data guards run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySettings {
    pub apply_mode: ApplyMode,
    pub ats_stage_mode: Option<AtsStageMode>,
    pub external_apply_url: Option<String>,
    pub external_apply_type: Option<ExternalApplyType>,
}

pub fn derive_from_employer_defaults(defaults: &EmployerAtsDefaults) -> ApplySettings {
    let (apply_mode, stage) = match defaults.default_ats_stage_mode {
        EmployerAtsDefaultMode::None => {
            return ApplySettings {
                apply_mode: ApplyMode::Native,
                ats_stage_mode: None,
                external_apply_url: None,
                external_apply_type: None,
            }
        }
        EmployerAtsDefaultMode::Curated => (ApplyMode::Hybrid, AtsStageMode::Curated),
        EmployerAtsDefaultMode::Immediate => (ApplyMode::AtsLink, AtsStageMode::Immediate),
    };

    ApplySettings {
        apply_mode,
        ats_stage_mode: Some(stage),
        external_apply_url: defaults
            .default_external_apply_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string),
        external_apply_type: Some(defaults.default_external_apply_type),
    }
}

fn derive_from_listing(listing: &InternshipAtsConfig) -> ApplySettings {
    ApplySettings {
        apply_mode: normalize_apply_mode(listing.apply_mode.as_deref()),
        ats_stage_mode: Some(normalize_ats_stage_mode(listing.ats_stage_mode.as_deref())),
        external_apply_url: normalize_external_apply_url(listing.external_apply_url.as_deref()),
        external_apply_type: Some(normalize_external_apply_type(
            listing.external_apply_type.as_deref(),
        )),
    }
}

pub fn resolve(
    internship: &InternshipAtsConfig,
    employer_defaults: &EmployerAtsDefaults,
) -> EffectiveAtsConfig {
    let tier = AtsConfigTier::select(internship, employer_defaults);
    let settings = tier.settings();

    let apply_mode = settings.apply_mode;
    let requires_external_apply = apply_mode.requires_external_apply();
    let native = apply_mode == ApplyMode::Native;

    let ats_stage_mode = if native { None } else { settings.ats_stage_mode };
    let external_apply_type = if native {
        None
    } else {
        settings.external_apply_type
    };
    let external_apply_url = if requires_external_apply {
        settings.external_apply_url
    } else {
        None
    };

    EffectiveAtsConfig {
        source: tier.source(),
        apply_mode,
        ats_stage_mode,
        is_curated_invite_flow: apply_mode == ApplyMode::Hybrid
            && ats_stage_mode == Some(AtsStageMode::Curated),
        has_configured_destination: !requires_external_apply || external_apply_url.is_some(),
        external_apply_url,
        external_apply_type,
        requires_external_apply,
    }
}
