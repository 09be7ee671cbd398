//! Invite status transition table.
//!
//! | from                     | trigger          | to                       |
//! |--------------------------|------------------|--------------------------|
//! | `not_invited`            | employer invite  | `invited`                |
//! | `not_invited`            | click (open)     | `clicked`                |
//! | `invited`                | click            | `clicked`                |
//! | `self_reported_complete` | employer confirm | `employer_confirmed`     |
//!
//! `clicked -> self_reported_complete` happens upstream and is never written
//! here. Clicks on later states keep the status and only bump the counter.

use std::fmt;

use chrono::{DateTime, Utc};

use super::domain::{ApplicationRecord, AtsInviteStatus, UserId};

/// Longest invite message kept on an application, in characters.
pub const INVITE_MESSAGE_LIMIT: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteTrigger {
    EmployerInvite,
    ExternalClick,
    EmployerConfirm,
}

impl fmt::Display for InviteTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InviteTrigger::EmployerInvite => "invite",
            InviteTrigger::ExternalClick => "click through",
            InviteTrigger::EmployerConfirm => "confirm",
        };
        f.write_str(label)
    }
}

/// Whether a click must be preceded by an invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickGate {
    InviteRequired,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {trigger} an application that is {}", .from.label())]
    NotAllowed {
        from: AtsInviteStatus,
        trigger: InviteTrigger,
    },
    #[error("an ATS invite from the employer is required before continuing")]
    InviteRequired,
}

impl AtsInviteStatus {
    /// Statuses that have passed the curated invite gate.
    pub const fn has_invite_access(self) -> bool {
        !matches!(self, AtsInviteStatus::NotInvited)
    }

    const fn after_click(self) -> Self {
        match self {
            AtsInviteStatus::NotInvited | AtsInviteStatus::Invited => AtsInviteStatus::Clicked,
            other => other,
        }
    }
}

pub fn check_click_gate(status: AtsInviteStatus, gate: ClickGate) -> Result<(), TransitionError> {
    match gate {
        ClickGate::InviteRequired if !status.has_invite_access() => {
            Err(TransitionError::InviteRequired)
        }
        _ => Ok(()),
    }
}

/// Compute the status a trigger leads to. Never yields an earlier status.
pub fn advance(
    from: AtsInviteStatus,
    trigger: InviteTrigger,
    gate: ClickGate,
) -> Result<AtsInviteStatus, TransitionError> {
    match (from, trigger) {
        (AtsInviteStatus::NotInvited, InviteTrigger::EmployerInvite) => Ok(AtsInviteStatus::Invited),
        (status, InviteTrigger::ExternalClick) => {
            check_click_gate(status, gate)?;
            Ok(status.after_click())
        }
        (AtsInviteStatus::SelfReportedComplete, InviteTrigger::EmployerConfirm) => {
            Ok(AtsInviteStatus::EmployerConfirmed)
        }
        (from, trigger) => Err(TransitionError::NotAllowed { from, trigger }),
    }
}

/// A batch transition written with compare-and-swap semantics: it lands only on
/// rows still sitting in [`StatusChange::expected_from`] at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Invite {
        invited_at: DateTime<Utc>,
        invited_by: UserId,
        message: Option<String>,
    },
    Confirm,
}

impl StatusChange {
    pub fn trigger(&self) -> InviteTrigger {
        match self {
            StatusChange::Invite { .. } => InviteTrigger::EmployerInvite,
            StatusChange::Confirm => InviteTrigger::EmployerConfirm,
        }
    }

    pub fn expected_from(&self) -> AtsInviteStatus {
        match self {
            StatusChange::Invite { .. } => AtsInviteStatus::NotInvited,
            StatusChange::Confirm => AtsInviteStatus::SelfReportedComplete,
        }
    }

    pub fn target(&self) -> AtsInviteStatus {
        match self {
            StatusChange::Invite { .. } => AtsInviteStatus::Invited,
            StatusChange::Confirm => AtsInviteStatus::EmployerConfirmed,
        }
    }

    /// Returns `false` and leaves the record untouched when the row has moved on.
    pub fn apply_to(&self, record: &mut ApplicationRecord) -> bool {
        if record.ats_invite_status != self.expected_from() {
            return false;
        }
        let Ok(next) = advance(record.ats_invite_status, self.trigger(), ClickGate::Open) else {
            return false;
        };

        record.ats_invite_status = next;
        if let StatusChange::Invite {
            invited_at,
            invited_by,
            message,
        } = self
        {
            record.ats_invited_at = Some(*invited_at);
            record.ats_invited_by = Some(*invited_by);
            record.ats_invite_message = message.clone();
            record.external_apply_required = true;
        }
        true
    }
}

/// Result of recording one click-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickOutcome {
    pub previous: AtsInviteStatus,
    pub current: AtsInviteStatus,
    pub clicks: u32,
}

/// Bump the counter, stamp the time and advance the status. Stores call this
/// inside one critical section so concurrent clicks are never lost.
pub fn apply_click(record: &mut ApplicationRecord, at: DateTime<Utc>) -> ClickOutcome {
    let previous = record.ats_invite_status;
    record.external_apply_clicks = record.external_apply_clicks.saturating_add(1);
    record.external_apply_last_clicked_at = Some(at);
    record.ats_invite_status = previous.after_click();

    ClickOutcome {
        previous,
        current: record.ats_invite_status,
        clicks: record.external_apply_clicks,
    }
}

/// Trim and cap an employer-supplied invite message; blank becomes `None`.
pub fn sanitize_invite_message(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(INVITE_MESSAGE_LIMIT).collect())
}
