// src/services/notifier.rs
//! Outbound notification seam
//!
//! Delivery mechanics (SES, SMS gateways) live outside this core; handlers
//! and services call the `Notifier` trait fire-and-forget. A failed delivery
//! must never fail the request that triggered it, so dispatch always goes
//! through a spawned task.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PasswordReset,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PasswordReset => "password_reset",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, account_id: &str, kind: NotificationKind, payload: serde_json::Value);
}

/// Fire-and-forget dispatch. The spawned task owns the payload; the caller
/// returns immediately.
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    account_id: String,
    kind: NotificationKind,
    payload: serde_json::Value,
) {
    tokio::spawn(async move {
        notifier.notify(&account_id, kind, payload).await;
    });
}

/// Logs notifications instead of delivering them. The default wiring until a
/// real delivery collaborator is plugged in.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, account_id: &str, kind: NotificationKind, _payload: serde_json::Value) {
        info!(
            account_id = %account_id,
            kind = kind.as_str(),
            "Notification dispatched"
        );
    }
}

/// Render the password-reset email body handed to the notifier payload.
pub fn generate_password_reset_email(reset_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        .header {{ background-color: #4F46E5; color: white; padding: 20px; text-align: center; }}
        .content {{ padding: 20px; background-color: #f9f9f9; }}
        .footer {{ padding: 20px; text-align: center; font-size: 12px; color: #666; }}
        .button {{ display: inline-block; padding: 12px 24px; background-color: #4F46E5; color: white; text-decoration: none; border-radius: 5px; margin: 10px 0; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Password Reset</h1>
        </div>
        <div class="content">
            <p>We received a request to reset the password for your account.</p>

            <p><a class="button" href="{}">Reset your password</a></p>

            <p>This link expires in one hour and can only be used once. If you did not request a reset, you can safely ignore this email.</p>
        </div>
        <div class="footer">
            <p>This is an automated message. Please do not reply directly to this email.</p>
        </div>
    </div>
</body>
</html>"#,
        reset_url
    )
}
