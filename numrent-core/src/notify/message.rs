//! Structured chat/e-mail message content.
//!
//! Channels never concatenate strings themselves: an event is first turned
//! into a [`ChatMessage`] and then rendered for the transport.

use super::NotificationEvent;
use numrent_sdk::objects::{DepositState, OrderState, Severity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub title: String,
    /// Prominent one-line status, e.g. "Successfully Credited".
    pub status: Option<String>,
    /// Labelled values shown in order.
    pub fields: Vec<(String, String)>,
    pub footer: Option<String>,
}

impl ChatMessage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: None,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn field(mut self, label: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((label.into(), value.to_string()));
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Build the message for `event` as seen at `now`.
    pub fn from_event(event: &NotificationEvent, now: time::OffsetDateTime) -> Self {
        match event {
            NotificationEvent::Deposit(p) | NotificationEvent::DepositCountdown(p) => {
                let mut msg = ChatMessage::new("Wallet Deposit")
                    .status(deposit_status_line(p.status, p.valid_until, now))
                    .field("Amount", p.amount)
                    .field("Method", p.method.to_uppercase())
                    .field("Deposit ID", &p.deposit_id);
                if let Some(balance) = p.balance {
                    msg = msg.field("New balance", balance);
                }
                msg
            }
            NotificationEvent::OrderUpdate(p) => {
                let mut msg = ChatMessage::new(format!("Order · {}", p.service))
                    .status(order_status_line(p.status))
                    .field("Order ID", &p.order_id)
                    .field("Price", p.price);
                if let Some(number) = &p.phone_number {
                    msg = msg.field("Number", number);
                }
                if let Some(code) = &p.sms_code {
                    msg = msg.field("Code", code);
                }
                msg
            }
            NotificationEvent::Alert(p) => ChatMessage::new(p.title.clone())
                .status(severity_line(p.severity))
                .footer(p.message.clone()),
            NotificationEvent::Metrics(p) => ChatMessage::new("Account Overview")
                .field("Balance", p.balance)
                .field("Total deposited", p.total_deposited)
                .field("Total spent", p.total_spent)
                .field("Numbers rented", p.purchases)
                .footer(format!("Updated {}", format_utc(now))),
            NotificationEvent::Redeem(n) => ChatMessage::new("Code Redeemed")
                .status("Successfully Credited")
                .field("Code", &n.code)
                .field("Amount", n.amount)
                .field("New balance", n.balance),
        }
    }

    /// Render as Telegram HTML.
    pub fn render_html(&self) -> String {
        let mut out = format!("<b>{}</b>", escape_html(&self.title));
        if let Some(status) = &self.status {
            out.push_str(&format!("\n{}", escape_html(status)));
        }
        if !self.fields.is_empty() {
            out.push('\n');
            for (label, value) in &self.fields {
                out.push_str(&format!(
                    "\n{}: <code>{}</code>",
                    escape_html(label),
                    escape_html(value)
                ));
            }
        }
        if let Some(footer) = &self.footer {
            out.push_str(&format!("\n\n<i>{}</i>", escape_html(footer)));
        }
        out
    }

    /// Render as plain text (e-mail bodies).
    pub fn render_text(&self) -> String {
        let mut out = self.title.clone();
        if let Some(status) = &self.status {
            out.push_str(&format!("\n{status}"));
        }
        if !self.fields.is_empty() {
            out.push('\n');
            for (label, value) in &self.fields {
                out.push_str(&format!("\n{label}: {value}"));
            }
        }
        if let Some(footer) = &self.footer {
            out.push_str(&format!("\n\n{footer}"));
        }
        out
    }

    /// Subject line for e-mail: title plus status.
    pub fn subject(&self) -> String {
        match &self.status {
            Some(status) => format!("{}: {}", self.title, status),
            None => self.title.clone(),
        }
    }
}

fn deposit_status_line(status: DepositState, valid_until: i64, now: time::OffsetDateTime) -> String {
    match status {
        DepositState::Pending => {
            let secs_left = (valid_until - now.unix_timestamp()).max(0);
            let mins_left = (secs_left + 59) / 60;
            format!("Awaiting payment ({mins_left} min left)")
        }
        DepositState::Completed => "Successfully Credited".to_owned(),
        DepositState::Failed => "Payment Failed".to_owned(),
        DepositState::Expired => "Expired".to_owned(),
        DepositState::Cancelled => "Cancelled".to_owned(),
    }
}

fn order_status_line(status: OrderState) -> &'static str {
    match status {
        OrderState::Pending => "Waiting for number",
        OrderState::Active => "Waiting for SMS",
        OrderState::Completed => "Completed",
        OrderState::Cancelled => "Cancelled",
        OrderState::Refunded => "Refunded",
    }
}

fn severity_line(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "Info",
        Severity::Warning => "Warning",
        Severity::High => "High severity",
        Severity::Critical => "CRITICAL",
    }
}

fn format_utc(t: time::OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02} UTC",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute()
    )
}

/// Escape the three characters Telegram's HTML mode requires.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use numrent_sdk::objects::DepositPayload;
    use rust_decimal_macros::dec;

    fn pending(valid_until: i64) -> NotificationEvent {
        NotificationEvent::Deposit(DepositPayload {
            deposit_id: "dep<1>".into(),
            user_id: 1,
            amount: dec!(25.00),
            method: "upi".into(),
            status: DepositState::Pending,
            valid_until,
            balance: None,
        })
    }

    #[test]
    fn test_pending_deposit_shows_minutes_left() {
        let now = time::OffsetDateTime::from_unix_timestamp(1_000).unwrap();
        let msg = ChatMessage::from_event(&pending(1_000 + 9 * 60 + 1), now);
        assert_eq!(msg.status.as_deref(), Some("Awaiting payment (10 min left)"));

        let past = ChatMessage::from_event(&pending(900), now);
        assert_eq!(past.status.as_deref(), Some("Awaiting payment (0 min left)"));
    }

    #[test]
    fn test_html_rendering_escapes_values() {
        let now = time::OffsetDateTime::from_unix_timestamp(0).unwrap();
        let html = ChatMessage::from_event(&pending(600), now).render_html();
        assert!(html.starts_with("<b>Wallet Deposit</b>"));
        assert!(html.contains("Deposit ID: <code>dep&lt;1&gt;</code>"));
        assert!(html.contains("Amount: <code>25.00</code>"));
        assert!(!html.contains("dep<1>"));
    }

    #[test]
    fn test_text_rendering_and_subject() {
        let msg = ChatMessage::new("Title")
            .status("Done")
            .field("A", 1)
            .footer("bye");
        assert_eq!(msg.render_text(), "Title\nDone\n\nA: 1\n\nbye");
        assert_eq!(msg.subject(), "Title: Done");
    }
}
