//! SMTP configuration.

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    /// Sender mailbox, e.g. `numrent <noreply@example.com>`.
    pub from: String,
    /// Recipient of operational alerts.
    pub admin_address: Option<String>,
}
