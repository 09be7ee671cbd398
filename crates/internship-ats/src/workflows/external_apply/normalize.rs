//! Total canonicalization of raw apply settings.
//!
//! Every function here accepts arbitrary input (missing, empty, garbage) and
//! returns a valid value. Resolved configuration feeds authorization checks, so
//! none of these may fail.

use url::Url;

use super::domain::{ApplyMode, AtsStageMode, EmployerAtsDefaultMode, ExternalApplyType};

fn canonical(raw: Option<&str>) -> String {
    raw.unwrap_or_default().trim().to_ascii_lowercase()
}

/// Unrecognized input falls back to `native`.
pub fn normalize_apply_mode(raw: Option<&str>) -> ApplyMode {
    match canonical(raw).as_str() {
        "ats_link" => ApplyMode::AtsLink,
        "hybrid" => ApplyMode::Hybrid,
        _ => ApplyMode::Native,
    }
}

/// Unrecognized input falls back to `curated`, the invite-gated option.
pub fn normalize_ats_stage_mode(raw: Option<&str>) -> AtsStageMode {
    match canonical(raw).as_str() {
        "immediate" => AtsStageMode::Immediate,
        _ => AtsStageMode::Curated,
    }
}

pub fn normalize_external_apply_type(raw: Option<&str>) -> ExternalApplyType {
    match canonical(raw).as_str() {
        "redirect" => ExternalApplyType::Redirect,
        _ => ExternalApplyType::NewTab,
    }
}

pub fn normalize_employer_default_mode(raw: Option<&str>) -> EmployerAtsDefaultMode {
    match canonical(raw).as_str() {
        "curated" => EmployerAtsDefaultMode::Curated,
        "immediate" => EmployerAtsDefaultMode::Immediate,
        _ => EmployerAtsDefaultMode::None,
    }
}

/// Returns the URL only when it parses as an absolute http(s) URL.
pub fn normalize_external_apply_url(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = Url::parse(trimmed).ok()?;
    let is_web = matches!(parsed.scheme(), "http" | "https") && parsed.has_host();
    is_web.then(|| String::from(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_mode_defaults_to_native() {
        assert_eq!(normalize_apply_mode(Some("hybrid")), ApplyMode::Hybrid);
        assert_eq!(normalize_apply_mode(Some(" ATS_LINK ")), ApplyMode::AtsLink);
        assert_eq!(normalize_apply_mode(Some("native")), ApplyMode::Native);
        assert_eq!(normalize_apply_mode(Some("")), ApplyMode::Native);
        assert_eq!(normalize_apply_mode(Some("ats-link")), ApplyMode::Native);
        assert_eq!(normalize_apply_mode(None), ApplyMode::Native);
    }

    #[test]
    fn stage_mode_defaults_to_curated() {
        assert_eq!(
            normalize_ats_stage_mode(Some("Immediate")),
            AtsStageMode::Immediate
        );
        assert_eq!(normalize_ats_stage_mode(Some("curated")), AtsStageMode::Curated);
        assert_eq!(normalize_ats_stage_mode(Some("\u{0}\u{7f}")), AtsStageMode::Curated);
        assert_eq!(normalize_ats_stage_mode(None), AtsStageMode::Curated);
    }

    #[test]
    fn employer_default_mode_falls_back_to_none() {
        assert_eq!(
            normalize_employer_default_mode(Some("curated")),
            EmployerAtsDefaultMode::Curated
        );
        assert_eq!(
            normalize_employer_default_mode(Some("native")),
            EmployerAtsDefaultMode::None
        );
        assert_eq!(normalize_employer_default_mode(None), EmployerAtsDefaultMode::None);
    }

    #[test]
    fn apply_type_only_recognizes_redirect() {
        assert_eq!(
            normalize_external_apply_type(Some(" redirect")),
            ExternalApplyType::Redirect
        );
        assert_eq!(
            normalize_external_apply_type(Some("popup")),
            ExternalApplyType::NewTab
        );
        assert_eq!(normalize_external_apply_type(None), ExternalApplyType::NewTab);
    }

    #[test]
    fn url_accepts_absolute_http_and_https() {
        assert_eq!(
            normalize_external_apply_url(Some("  https://ats.example.com/apply  ")).as_deref(),
            Some("https://ats.example.com/apply")
        );
        assert_eq!(
            normalize_external_apply_url(Some("http://jobs.example.org/apply?req=42")).as_deref(),
            Some("http://jobs.example.org/apply?req=42")
        );
    }

    #[test]
    fn url_rejects_everything_else() {
        for raw in [
            "",
            "   ",
            "ats.example.com/apply",
            "/relative/path",
            "ftp://files.example.com/form",
            "javascript:alert(1)",
            "mailto:hr@example.com",
            "https://",
            "not a url at all",
        ] {
            assert_eq!(normalize_external_apply_url(Some(raw)), None, "input {raw:?}");
        }
        assert_eq!(normalize_external_apply_url(None), None);
    }
}
