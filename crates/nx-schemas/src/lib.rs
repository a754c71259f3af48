//! Shared domain vocabulary for the NX portal.
//!
//! Status/role enums stored as text columns, plus the provider wire types
//! used by nx-payments. No business logic lives here: every enum is a
//! `as_str`/`parse` pair so the DB layer and the API agree on spellings.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declare a text-backed enum with `as_str` / `parse` and serde renames.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(anyhow!(concat!("invalid ", stringify!($name), ": {}"), other)),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

text_enum! {
    /// Portal-level role carried on the user's profile.
    /// `Admin` is provider staff; `Client` is a tenant-side user whose
    /// visibility comes entirely from client memberships.
    UserRole {
        Admin => "admin",
        Client => "client",
    }
}

text_enum! {
    /// Role of a user inside one client organization.
    MemberRole {
        Owner => "owner",
        Admin => "admin",
        Member => "member",
        Viewer => "viewer",
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

text_enum! {
    ClientStatus {
        Prospect => "prospect",
        Active => "active",
        Inactive => "inactive",
        Archived => "archived",
    }
}

// ---------------------------------------------------------------------------
// Projects / tasks
// ---------------------------------------------------------------------------

text_enum! {
    ProjectStatus {
        Draft => "draft",
        Active => "active",
        OnHold => "on_hold",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

text_enum! {
    MilestoneStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Blocked => "blocked",
    }
}

text_enum! {
    TaskStatus {
        Todo => "todo",
        InProgress => "in_progress",
        Review => "review",
        Done => "done",
        Blocked => "blocked",
        Cancelled => "cancelled",
    }
}

text_enum! {
    TaskKind {
        Feature => "feature",
        Bug => "bug",
        Task => "task",
        Improvement => "improvement",
        Documentation => "documentation",
        Testing => "testing",
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

text_enum! {
    /// Who may see a document. `Internal` rows are invisible to client
    /// members even when the owning client matches their membership.
    DocVisibility {
        Public => "public",
        Internal => "internal",
        Restricted => "restricted",
    }
}

text_enum! {
    VersionStatus {
        Draft => "draft",
        Review => "review",
        Approved => "approved",
        Archived => "archived",
    }
}

text_enum! {
    DocumentAction {
        View => "view",
        Download => "download",
        Share => "share",
        Delete => "delete",
    }
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

text_enum! {
    QuoteStatus {
        Draft => "draft",
        Sent => "sent",
        Accepted => "accepted",
        Rejected => "rejected",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

text_enum! {
    InvoiceStatus {
        Draft => "draft",
        Sent => "sent",
        Paid => "paid",
        PartiallyPaid => "partially_paid",
        Overdue => "overdue",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

text_enum! {
    PaymentStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Refunded => "refunded",
        Disputed => "disputed",
    }
}

impl PaymentStatus {
    /// Terminal statuses never regress; duplicate confirmations are no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Refunded | PaymentStatus::Disputed
        )
    }
}

text_enum! {
    PaymentMethod {
        Card => "card",
        MobileMoney => "mobile_money",
        BankTransfer => "bank_transfer",
        Wallet => "wallet",
        Other => "other",
    }
}

text_enum! {
    /// Processing state of a stored webhook row.
    WebhookStatus {
        Received => "received",
        Processed => "processed",
        Ignored => "ignored",
        Failed => "failed",
    }
}

// ---------------------------------------------------------------------------
// Support
// ---------------------------------------------------------------------------

text_enum! {
    TicketStatus {
        Open => "open",
        InProgress => "in_progress",
        WaitingClient => "waiting_client",
        WaitingInternal => "waiting_internal",
        Resolved => "resolved",
        Closed => "closed",
        Cancelled => "cancelled",
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

text_enum! {
    AuditAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Login => "login",
        Logout => "logout",
        View => "view",
        Download => "download",
        Export => "export",
        Send => "send",
        Approve => "approve",
        Reject => "reject",
        Archive => "archive",
        Restore => "restore",
        Payment => "payment",
        Refund => "refund",
        Other => "other",
    }
}

text_enum! {
    AuditLevel {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

// ---------------------------------------------------------------------------
// Provider wire types (payment gateway)
// ---------------------------------------------------------------------------

/// Body sent to the provider's `/v2/payment` init endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInitRequest {
    pub amount: f64,
    pub currency: String,
    pub apikey: String,
    pub site_id: String,
    pub transaction_id: String,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
    pub customer_name: String,
    pub customer_email: String,
}

/// Provider responses are loosely shaped; `data` carries the useful fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<ProviderResponseData>,
    /// Everything else the provider sent, preserved verbatim for audit.
    #[serde(flatten)]
    pub extra: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponseData {
    #[serde(default)]
    pub payment_url: Option<String>,
    #[serde(default)]
    pub payment_token: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

impl ProviderResponse {
    /// Status string the provider reports for a transaction, if any.
    pub fn status(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.status.as_deref())
    }
}

/// Notification body posted to our webhook endpoint. Field names vary
/// between provider versions, hence the aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, alias = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "status_payment")]
    pub status: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

// ---------------------------------------------------------------------------
// Cross-crate envelope types
// ---------------------------------------------------------------------------

/// Issued on login; the raw token travels once, only the digest is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_round_trip_through_db_spelling() {
        assert_eq!(TaskStatus::parse("in_progress").unwrap(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(InvoiceStatus::parse("partially_paid").unwrap(), InvoiceStatus::PartiallyPaid);
        assert_eq!(MemberRole::Owner.as_str(), "owner");
        assert!(PaymentStatus::parse("nope").is_err());
    }

    #[test]
    fn terminal_payment_statuses_identified() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(!PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn webhook_payload_accepts_both_field_spellings() {
        let a: WebhookPayload =
            serde_json::from_str(r#"{"transaction_id":"t-1","status":"ACCEPTED"}"#).unwrap();
        assert_eq!(a.transaction_id.as_deref(), Some("t-1"));

        let b: WebhookPayload =
            serde_json::from_str(r#"{"transactionId":"t-2","status_payment":"PENDING"}"#).unwrap();
        assert_eq!(b.transaction_id.as_deref(), Some("t-2"));
        assert_eq!(b.status.as_deref(), Some("PENDING"));
    }
}
