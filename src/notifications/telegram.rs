//! Telegram delivery for lifecycle alerts.
//!
//! Delivery is event-aware rather than a flat per-key rate limit. Milestones
//! (project start, project complete) go out once per run, keyed by the
//! project and its launch anchor, so a machine that loops back through
//! discovery never re-announces the same launch. Progress events ride a
//! floor interval tuned below their publish cadence, which keeps a restart
//! from double-posting but never silences a scheduled update. Stall alerts
//! bypass everything: the spend ledger already guarantees at most one per
//! quiet period.

use super::{NotificationEvent, NotificationService};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Telegram API request budget.
const API_TIMEOUT: Duration = Duration::from_secs(8);
/// Floor between progress posts of the same kind. The machine publishes tax
/// every 5 minutes and buyback every 10; one minute under the faster cadence.
const PROGRESS_FLOOR: Duration = Duration::from_secs(4 * 60);
/// Floor between repeated error posts for one component.
const ERROR_FLOOR: Duration = Duration::from_secs(2 * 60);
/// Segments of the buyback progress bar.
const BAR_SEGMENTS: usize = 10;

/// How an event is allowed onto the wire.
enum Delivery {
    /// Send unconditionally.
    Always,
    /// Send only if this key was never sent in this process.
    OncePerRun(String),
    /// Send if at least `floor` passed since the same key went out.
    Floored { key: String, floor: Duration },
}

fn delivery_policy(event: &NotificationEvent) -> Delivery {
    match event {
        // The ledger de-duplicates stalls; relay every one it emits.
        NotificationEvent::BuybackStalled { .. } => Delivery::Always,
        NotificationEvent::ProjectStarted { symbol, t0, .. } => {
            Delivery::OncePerRun(format!("started:{}:{}", symbol, t0.timestamp()))
        }
        NotificationEvent::ProjectCompleted { name, tax_total, .. } => {
            Delivery::OncePerRun(format!("completed:{}:{}", name, tax_total))
        }
        NotificationEvent::TaxUpdate { .. } => Delivery::Floored {
            key: "tax".to_string(),
            floor: PROGRESS_FLOOR,
        },
        NotificationEvent::BuybackUpdate { .. } => Delivery::Floored {
            key: "buyback".to_string(),
            floor: PROGRESS_FLOOR,
        },
        NotificationEvent::MonitorError { component, .. } => Delivery::Floored {
            key: format!("error:{}", component),
            floor: ERROR_FLOOR,
        },
    }
}

/// Render one event as a Telegram HTML message.
fn render(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::ProjectStarted { name, symbol, t0, t1 } => {
            format!(
                "▶️ Tracking <b>{}</b> (${})\nTax window {} → {} UTC",
                name,
                symbol,
                t0.format("%H:%M"),
                t1.format("%H:%M")
            )
        }
        NotificationEvent::TaxUpdate {
            net_inflow,
            elapsed_minutes,
            remaining_minutes,
        } => {
            format!(
                "💰 Tax collected: <code>{}</code> VIRTUAL\n{}m elapsed · {}m left in window",
                net_inflow, elapsed_minutes, remaining_minutes
            )
        }
        NotificationEvent::BuybackUpdate {
            spent,
            progress,
            eta_hours,
        } => {
            let eta = if eta_hours.is_finite() {
                format!("{:.1}h", eta_hours)
            } else {
                "—".to_string()
            };
            format!(
                "🔄 Buyback {} {:.1}%\n<code>{}</code> VIRTUAL spent · ETA {}",
                progress_bar(*progress),
                progress,
                spent,
                eta
            )
        }
        NotificationEvent::BuybackStalled { idle_minutes } => {
            format!(
                "⚠️ <b>Buyback stalled</b>: receiver quiet for {} minutes",
                idle_minutes
            )
        }
        NotificationEvent::ProjectCompleted {
            name,
            tax_total,
            spent_total,
        } => {
            format!(
                "🏁 <b>{}</b> complete\nTax <code>{}</code> · bought back <code>{}</code> VIRTUAL",
                name, tax_total, spent_total
            )
        }
        NotificationEvent::MonitorError { component, message } => {
            format!("🚨 <b>{}</b>: {}", component, message)
        }
    }
}

/// Ten-segment progress bar, e.g. `▓▓▓░░░░░░░` at 30%.
fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0 * BAR_SEGMENTS as f64).floor() as usize).min(BAR_SEGMENTS);
    let mut bar = String::with_capacity(BAR_SEGMENTS * 3);
    for _ in 0..filled {
        bar.push('▓');
    }
    for _ in filled..BAR_SEGMENTS {
        bar.push('░');
    }
    bar
}

struct DeliveryState {
    sent_once: HashSet<String>,
    last_sent: HashMap<String, Instant>,
}

impl DeliveryState {
    fn new() -> Self {
        Self {
            sent_once: HashSet::new(),
            last_sent: HashMap::new(),
        }
    }

    /// Apply the policy and record the send decision atomically.
    fn admit(&mut self, policy: Delivery) -> bool {
        match policy {
            Delivery::Always => true,
            Delivery::OncePerRun(key) => self.sent_once.insert(key),
            Delivery::Floored { key, floor } => {
                let due = self
                    .last_sent
                    .get(&key)
                    .map_or(true, |at| at.elapsed() >= floor);
                if due {
                    self.last_sent.insert(key, Instant::now());
                }
                due
            }
        }
    }
}

/// Telegram notification service
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
    state: Mutex<DeliveryState>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            bot_token,
            chat_id,
            client,
            state: Mutex::new(DeliveryState::new()),
        }
    }

    /// Build from `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`; `None` when
    /// either is absent or blank.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
            return None;
        }
        Some(Self::new(bot_token, chat_id))
    }

    async fn post(&self, text: &str) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
                ("disable_web_page_preview", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "sendMessage returned {}: {}",
                status,
                response.text().await.unwrap_or_default()
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationService for TelegramNotifier {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        let admitted = self.state.lock().admit(delivery_policy(&event));
        if !admitted {
            tracing::debug!(level = %event.level(), "Delivery policy suppressed Telegram message");
            return Ok(());
        }

        self.post(&render(&event)).await?;
        tracing::info!(level = %event.level(), "Sent Telegram notification");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}
