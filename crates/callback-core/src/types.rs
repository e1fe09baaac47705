//! Callback entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use voicedesk_audit_core::CallerFingerprint;
use voicedesk_infra_common::{AgentId, AttemptId, CallbackId, DepartmentId, SessionId, TenantId};

/// Grace period after the scheduled time before a callback counts as
/// overdue for priority purposes.
pub const OVERDUE_GRACE: Duration = Duration::hours(1);

/// Default expiry horizon when a request carries no window end.
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;

/// Retry backoff table, indexed by attempt count (1-based):
/// first retry after 15 minutes, then 1 hour, then 4 hours.
const BACKOFF_MINUTES: [i64; 3] = [15, 60, 240];

/// Delay before the next attempt, given how many attempts have been made.
pub fn backoff_delay(attempts: u32) -> Duration {
    let index = (attempts.max(1) as usize - 1).min(BACKOFF_MINUTES.len() - 1);
    Duration::minutes(BACKOFF_MINUTES[index])
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl CallbackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallbackStatus::Completed
                | CallbackStatus::Failed
                | CallbackStatus::Cancelled
                | CallbackStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Pending => "pending",
            CallbackStatus::Scheduled => "scheduled",
            CallbackStatus::InProgress => "in_progress",
            CallbackStatus::Completed => "completed",
            CallbackStatus::Failed => "failed",
            CallbackStatus::Cancelled => "cancelled",
            CallbackStatus::Expired => "expired",
        }
    }

    /// The lifecycle DAG: `pending <-> scheduled -> in_progress ->
    /// {pending, completed, failed}`; cancelled/expired are sinks from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: CallbackStatus) -> bool {
        use CallbackStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Pending, Scheduled) | (Scheduled, Pending) => true,
            (Pending, InProgress) | (Scheduled, InProgress) => true,
            (InProgress, Pending) | (InProgress, Completed) | (InProgress, Failed) => true,
            // Exhausted retries fail without an in-flight attempt
            (Pending, Failed) | (Scheduled, Failed) => true,
            (_, Cancelled) | (_, Expired) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackPriority {
    Low,
    Normal,
    High,
    Urgent,
    Vip,
}

impl CallbackPriority {
    /// Numeric tier used in the priority score
    pub fn tier(&self) -> i64 {
        match self {
            CallbackPriority::Low => 1,
            CallbackPriority::Normal => 2,
            CallbackPriority::High => 3,
            CallbackPriority::Urgent => 4,
            CallbackPriority::Vip => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackType {
    General,
    Sales,
    Support,
    Technical,
    Billing,
    Complaint,
    FollowUp,
}

/// Outcome of one callback attempt
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Connected,
    NoAnswer,
    Busy,
    Invalid,
    Failed,
}

impl AttemptOutcome {
    /// Whether this outcome leaves the request retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::NoAnswer | AttemptOutcome::Busy | AttemptOutcome::Failed
        )
    }
}

/// A caller's request to be called back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub id: CallbackId,
    pub tenant_id: TenantId,
    /// Hashed caller number; the raw number is never stored
    pub caller: CallerFingerprint,
    pub caller_name: Option<String>,
    pub caller_email: Option<String>,
    pub reason: Option<String>,
    pub callback_type: CallbackType,
    pub priority: CallbackPriority,
    /// Caller's preferred time
    pub requested_time: Option<DateTime<Utc>>,
    /// Time assigned by the scheduler
    pub scheduled_time: Option<DateTime<Utc>>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: DateTime<Utc>,
    pub timezone: String,
    pub department_id: Option<DepartmentId>,
    pub preferred_agent_id: Option<AgentId>,
    pub assigned_agent_id: Option<AgentId>,
    pub status: CallbackStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<AttemptOutcome>,
    pub follow_up_required: bool,
    pub tags: Vec<String>,
    /// Opaque forward-compatibility bag
    pub extras: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl CallbackRequest {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_time {
            Some(scheduled) => now > scheduled + OVERDUE_GRACE,
            None => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_end
    }

    pub fn can_retry(&self, now: DateTime<Utc>) -> bool {
        self.attempts < self.max_attempts && !self.is_expired(now)
    }

    /// Scheduler ordering score: `10·priority + 5·attempts + 20 if
    /// overdue`. Higher runs first.
    pub fn priority_score(&self, now: DateTime<Utc>) -> i64 {
        let mut score = self.priority.tier() * 10 + self.attempts as i64 * 5;
        if self.is_overdue(now) {
            score += 20;
        }
        score
    }

    /// Whether the request is due for an attempt
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !matches!(
            self.status,
            CallbackStatus::Pending | CallbackStatus::Scheduled
        ) {
            return false;
        }
        let scheduled_due = self.scheduled_time.map(|t| t <= now).unwrap_or(false);
        let retry_due = self.next_attempt_at.map(|t| t <= now).unwrap_or(false);
        // A fresh pending request with no schedule is due immediately
        let unscheduled = self.scheduled_time.is_none() && self.next_attempt_at.is_none();
        scheduled_due || retry_due || unscheduled
    }
}

/// One append-only record of a callback attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAttempt {
    pub id: AttemptId,
    pub callback_id: CallbackId,
    pub tenant_id: TenantId,
    /// 1-based sequence number
    pub sequence: u32,
    pub attempted_at: DateTime<Utc>,
    pub agent_id: Option<AgentId>,
    pub outcome: AttemptOutcome,
    /// Egress call session if one was opened
    pub session_id: Option<SessionId>,
    pub notes: Option<String>,
}
