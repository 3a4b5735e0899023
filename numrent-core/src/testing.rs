//! In-memory fakes shared by unit tests.

use crate::entities::{Credit, Deposit, DepositStatus};
use crate::gateway::{GatewayError, GatewayVerdict, SettlementGateway};
use crate::ledger::{LedgerError, LedgerStore};
use crate::notify::{ChatApi, ChatApiError, MailError, Mailer, NotificationChannel, NotificationEvent};
use async_trait::async_trait;
use numrent_sdk::objects::UserMetricsPayload;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    deposits: HashMap<String, Deposit>,
    balances: HashMap<i64, Decimal>,
    /// (user, amount, reference) per credit.
    credits: Vec<(i64, Decimal, String)>,
    emails: HashMap<i64, String>,
    fail: bool,
}

/// [`LedgerStore`] over a mutex-guarded map.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_deposit(
        &self,
        id: &str,
        user_id: i64,
        amount: Decimal,
        valid_until: time::OffsetDateTime,
    ) -> Deposit {
        let deposit = Deposit {
            id: id.to_owned(),
            user_id,
            amount,
            method: "upi".to_owned(),
            created_at: time::OffsetDateTime::now_utc(),
            valid_until,
            status: DepositStatus::Pending,
        };
        self.state
            .lock()
            .await
            .deposits
            .insert(id.to_owned(), deposit.clone());
        deposit
    }

    pub async fn status(&self, id: &str) -> Option<DepositStatus> {
        self.state.lock().await.deposits.get(id).map(|d| d.status)
    }

    pub async fn balance(&self, user_id: i64) -> Decimal {
        self.state
            .lock()
            .await
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn credit_count(&self) -> usize {
        self.state.lock().await.credits.len()
    }

    pub async fn set_email(&self, user_id: i64, email: &str) {
        self.state
            .lock()
            .await
            .emails
            .insert(user_id, email.to_owned());
    }

    /// Make every call fail with a database error.
    pub async fn fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }
}

fn check(state: &LedgerState) -> Result<(), LedgerError> {
    if state.fail {
        Err(LedgerError::Database(sqlx::Error::PoolTimedOut))
    } else {
        Ok(())
    }
}

fn credit(state: &mut LedgerState, user_id: i64, amount: Decimal, reference: String) -> Credit {
    let balance = state.balances.entry(user_id).or_default();
    *balance += amount;
    let balance_after = *balance;
    state.credits.push((user_id, amount, reference));
    Credit {
        user_id,
        amount,
        balance_after,
        transaction_id: state.credits.len() as i64,
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn pending_deposits(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Deposit>, LedgerError> {
        let state = self.state.lock().await;
        check(&state)?;
        let mut pending: Vec<Deposit> = state
            .deposits
            .values()
            .filter(|d| d.status == DepositStatus::Pending)
            .filter(|d| after.is_none_or(|after| d.id.as_str() > after))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn credit_deposit(&self, deposit_id: &str) -> Result<Option<Credit>, LedgerError> {
        let mut state = self.state.lock().await;
        check(&state)?;
        let Some(deposit) = state.deposits.get_mut(deposit_id) else {
            return Ok(None);
        };
        if deposit.status != DepositStatus::Pending {
            return Ok(None);
        }
        deposit.status = DepositStatus::Completed;
        let (user_id, amount) = (deposit.user_id, deposit.amount);
        Ok(Some(credit(&mut state, user_id, amount, deposit_id.to_owned())))
    }

    async fn close_deposit(
        &self,
        deposit_id: &str,
        status: DepositStatus,
    ) -> Result<bool, LedgerError> {
        if !status.is_terminal() || status == DepositStatus::Completed {
            return Err(LedgerError::InvalidTransition {
                deposit_id: deposit_id.to_owned(),
                status,
            });
        }
        let mut state = self.state.lock().await;
        check(&state)?;
        match state.deposits.get_mut(deposit_id) {
            Some(d) if d.status == DepositStatus::Pending => {
                d.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit_redemption(
        &self,
        user_id: i64,
        amount: Decimal,
        reference: &str,
    ) -> Result<Credit, LedgerError> {
        let mut state = self.state.lock().await;
        check(&state)?;
        Ok(credit(&mut state, user_id, amount, reference.to_owned()))
    }

    async fn user_metrics(&self, user_id: i64) -> Result<UserMetricsPayload, LedgerError> {
        let state = self.state.lock().await;
        check(&state)?;
        let total_deposited = state
            .credits
            .iter()
            .filter(|(user, _, _)| *user == user_id)
            .map(|(_, amount, _)| *amount)
            .sum();
        Ok(UserMetricsPayload {
            user_id,
            balance: state.balances.get(&user_id).copied().unwrap_or_default(),
            total_deposited,
            total_spent: Decimal::ZERO,
            purchases: 0,
        })
    }

    async fn user_email(&self, user_id: i64) -> Result<Option<String>, LedgerError> {
        let state = self.state.lock().await;
        check(&state)?;
        Ok(state.emails.get(&user_id).cloned())
    }
}

/// Gateway answering from per-deposit scripts.
///
/// Each check pops the next scripted answer; the last one repeats. Deposits
/// without a script are pending. `Err(())` stands for a transport error.
#[derive(Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<String, VecDeque<Result<GatewayVerdict, ()>>>>,
    calls: AtomicUsize,
    fail_all: AtomicBool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script(&self, deposit_id: &str, answers: Vec<Result<GatewayVerdict, ()>>) {
        self.scripts
            .lock()
            .await
            .insert(deposit_id.to_owned(), answers.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettlementGateway for ScriptedGateway {
    async fn check(&self, deposit_id: &str) -> Result<GatewayVerdict, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(GatewayError::Status { status: 503 });
        }
        let mut scripts = self.scripts.lock().await;
        let answer = match scripts.get_mut(deposit_id) {
            None => Ok(GatewayVerdict::Pending),
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(GatewayVerdict::Pending)),
            Some(queue) => queue.front().copied().unwrap_or(Ok(GatewayVerdict::Pending)),
        };
        answer.map_err(|()| GatewayError::Parse("scripted failure".to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    CreateThread { name: String, thread: i64 },
    Send {
        thread: Option<i64>,
        message_id: i64,
        html: String,
    },
    Edit { message_id: i64, html: String },
    Pin { message_id: i64 },
}

#[derive(Default)]
struct ChatState {
    calls: Vec<ChatCall>,
    next_id: i64,
    threads: HashSet<i64>,
    /// Current text of every live message.
    messages: HashMap<i64, String>,
    fail: bool,
}

/// Chat API that records calls and behaves like a forum supergroup.
#[derive(Default)]
pub struct FakeChatApi {
    state: Mutex<ChatState>,
}

impl FakeChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<ChatCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn threads_created(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| matches!(c, ChatCall::CreateThread { .. }))
            .count()
    }

    pub async fn sent(&self) -> Vec<(Option<i64>, String)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Send { thread, html, .. } => Some((thread, html)),
                _ => None,
            })
            .collect()
    }

    /// Every edit attempt, including ones rejected as unchanged.
    pub async fn edits(&self) -> Vec<(i64, String)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Edit { message_id, html } => Some((message_id, html)),
                _ => None,
            })
            .collect()
    }

    pub async fn pins(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| matches!(c, ChatCall::Pin { .. }))
            .count()
    }

    /// Simulate every message being deleted by the user.
    pub async fn forget_messages(&self) {
        self.state.lock().await.messages.clear();
    }

    /// Simulate every thread being deleted by an admin.
    pub async fn forget_threads(&self) {
        self.state.lock().await.threads.clear();
    }

    pub async fn fail_all(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }
}

fn unavailable() -> ChatApiError {
    ChatApiError::Api {
        code: 502,
        description: "Bad Gateway".to_owned(),
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn create_thread(&self, name: &str, _icon_color: u32) -> Result<i64, ChatApiError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(unavailable());
        }
        state.next_id += 1;
        let thread = state.next_id;
        state.threads.insert(thread);
        state.calls.push(ChatCall::CreateThread {
            name: name.to_owned(),
            thread,
        });
        Ok(thread)
    }

    async fn send_message(&self, thread: Option<i64>, html: &str) -> Result<i64, ChatApiError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(unavailable());
        }
        if thread.is_some_and(|t| !state.threads.contains(&t)) {
            return Err(ChatApiError::ThreadNotFound);
        }
        state.next_id += 1;
        let message_id = state.next_id;
        state.messages.insert(message_id, html.to_owned());
        state.calls.push(ChatCall::Send {
            thread,
            message_id,
            html: html.to_owned(),
        });
        Ok(message_id)
    }

    async fn edit_message(&self, message_id: i64, html: &str) -> Result<(), ChatApiError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(unavailable());
        }
        state.calls.push(ChatCall::Edit {
            message_id,
            html: html.to_owned(),
        });
        match state.messages.get_mut(&message_id) {
            None => Err(ChatApiError::MessageNotFound),
            Some(current) if current == html => Err(ChatApiError::NotModified),
            Some(current) => {
                *current = html.to_owned();
                Ok(())
            }
        }
    }

    async fn pin_message(&self, message_id: i64) -> Result<(), ChatApiError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(unavailable());
        }
        state.calls.push(ChatCall::Pin { message_id });
        Ok(())
    }
}

/// Channel that records every event and answers with a fixed result.
pub struct RecordingChannel {
    name: &'static str,
    result: bool,
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingChannel {
    pub fn new(name: &'static str, result: bool) -> Self {
        Self {
            name,
            result,
            events: Mutex::new(Vec::new()),
        }
    }

    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, event: &NotificationEvent) -> bool {
        self.events.lock().await.push(event.clone());
        self.result
    }
}

/// Mailer that records (to, subject, body).
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Recipient("mailbox unavailable".to_owned()));
        }
        self.sent
            .lock()
            .await
            .push((to.to_owned(), subject.to_owned(), body.to_owned()));
        Ok(())
    }
}
