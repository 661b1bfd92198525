// USD -> JPY rate with a persisted, time-limited cache and a hardcoded fallback.
//
// Resolution order on a read: in-memory quote (if younger than the TTL), then the
// persisted entry (if younger than the TTL), then a live fetch. A failed fetch never
// propagates: it degrades to the persisted entry, then to the default rate, and the
// failure is carried on the quote as a status message.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::currency::{self, Currency};

pub const DEFAULT_RATE: f64 = 142.08;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "cache")]
    Cached,
    #[serde(rename = "default")]
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    pub rate: f64,
    pub source: RateSource,
    pub fetched_at: DateTime<Utc>,
    /// Set when this quote is a fallback after a failed fetch.
    pub error: Option<String>,
}

/// The `{rate, timestamp}` pair kept between sessions. `timestamp` is epoch millis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedRate {
    pub rate: f64,
    pub timestamp: i64,
}

impl PersistedRate {
    pub fn new(rate: f64, fetched_at: DateTime<Utc>) -> Self {
        Self { rate, timestamp: fetched_at.timestamp_millis() }
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match (now - fetched_at).to_std() {
        Ok(age) => age < ttl,
        // Timestamp in the future: clock skew, treat as just fetched
        Err(_) => true,
    }
}

fn valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

// --- Provider ---

#[derive(Debug, Error)]
pub enum RateFetchError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("response did not contain a JPY rate")]
    MissingRate,
    #[error("response contained an unusable JPY rate: {0}")]
    InvalidRate(f64),
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rate(&self) -> Result<f64, RateFetchError>;
}

/// Fetches a USD-based quote document and reads its JPY entry.
pub struct HttpRateProvider {
    client: Arc<Client>,
    endpoint: String,
}

impl HttpRateProvider {
    pub fn new(client: Arc<Client>, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }
}

// Accepts `{"rates": {"JPY": ..}}` and the `conversion_rates` variant some
// providers use.
fn extract_jpy_rate(body: &Value) -> Result<f64, RateFetchError> {
    let rate = ["rates", "conversion_rates"]
        .iter()
        .find_map(|key| body.get(key).and_then(|rates| rates.get("JPY")))
        .and_then(Value::as_f64)
        .ok_or(RateFetchError::MissingRate)?;
    if valid_rate(rate) { Ok(rate) } else { Err(RateFetchError::InvalidRate(rate)) }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_rate(&self) -> Result<f64, RateFetchError> {
        debug!(endpoint = %self.endpoint, "Fetching USD/JPY rate");
        let body: Value = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        extract_jpy_rate(&body)
    }
}

// --- Persistence ---

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedRate>>;
    async fn save(&self, entry: &PersistedRate) -> Result<()>;
}

/// Keeps the entry as a small JSON file.
pub struct FileRateStore {
    path: PathBuf,
}

impl FileRateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RateStore for FileRateStore {
    async fn load(&self) -> Result<Option<PersistedRate>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read rate cache {}", self.path.display())));
            }
        };
        let entry: PersistedRate = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse rate cache {}", self.path.display()))?;
        Ok(Some(entry))
    }

    async fn save(&self, entry: &PersistedRate) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string(entry).context("Failed to serialize rate cache")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write rate cache {}", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryRateStore {
    entry: std::sync::Mutex<Option<PersistedRate>>,
}

impl MemoryRateStore {
    pub fn with_entry(entry: PersistedRate) -> Self {
        Self { entry: std::sync::Mutex::new(Some(entry)) }
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn load(&self) -> Result<Option<PersistedRate>> {
        let guard = self.entry.lock().map_err(|_| anyhow::anyhow!("rate store lock poisoned"))?;
        Ok(*guard)
    }

    async fn save(&self, entry: &PersistedRate) -> Result<()> {
        let mut guard = self.entry.lock().map_err(|_| anyhow::anyhow!("rate store lock poisoned"))?;
        *guard = Some(*entry);
        Ok(())
    }
}

// --- Service ---

pub struct ExchangeRateService {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    ttl: Duration,
    default_rate: f64,
    current: RwLock<Option<RateQuote>>,
    // Held while a read resolves a stale quote, so concurrent readers share one fetch
    resolving: Mutex<()>,
}

impl ExchangeRateService {
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        ttl: Duration,
        default_rate: f64,
    ) -> Self {
        let default_rate = if valid_rate(default_rate) { default_rate } else { DEFAULT_RATE };
        let ttl = if ttl.is_zero() {
            warn!("Exchange rate TTL must be positive, using {:?}", DEFAULT_TTL);
            DEFAULT_TTL
        } else {
            ttl
        };
        Self {
            provider,
            store,
            ttl,
            default_rate,
            current: RwLock::new(None),
            resolving: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current quote, resolving it if nothing fresh is held.
    pub async fn get_rate(&self) -> RateQuote {
        if let Some(quote) = self.fresh_current(Utc::now()).await {
            return quote;
        }

        let _resolving = self.resolving.lock().await;
        // Another reader may have resolved it while this one waited
        let now = Utc::now();
        if let Some(quote) = self.fresh_current(now).await {
            return quote;
        }

        if let Some(quote) = self.fresh_persisted(now, None).await {
            info!(rate = quote.rate, "Using cached exchange rate");
            *self.current.write().await = Some(quote.clone());
            return quote;
        }

        self.refresh().await
    }

    /// Fetch a live rate now, falling back on failure.
    pub async fn refresh(&self) -> RateQuote {
        let flag = AtomicBool::new(false);
        match self.refresh_unless(&flag).await {
            Some(quote) => quote,
            // Unreachable: nothing else can see `flag`
            None => self.default_quote(Utc::now(), None),
        }
    }

    /// Like `refresh`, but a result arriving after `cancelled` is set is dropped
    /// and `None` returned.
    pub(crate) async fn refresh_unless(&self, cancelled: &AtomicBool) -> Option<RateQuote> {
        let fetched = self.provider.fetch_rate().await;
        if cancelled.load(Ordering::Acquire) {
            debug!("Discarding exchange rate fetched after cancellation");
            return None;
        }

        let now = Utc::now();
        let quote = match fetched {
            Ok(rate) => {
                info!(rate, "Fetched live exchange rate");
                if let Err(e) = self.store.save(&PersistedRate::new(rate, now)).await {
                    warn!(error = %e, "Failed to persist exchange rate");
                }
                RateQuote { rate, source: RateSource::Live, fetched_at: now, error: None }
            }
            Err(e) => {
                warn!(error = %e, "Exchange rate fetch failed, falling back");
                let message = e.to_string();
                match self.fresh_persisted(now, Some(message.clone())).await {
                    Some(quote) => {
                        info!(rate = quote.rate, "Falling back to cached exchange rate");
                        quote
                    }
                    None => {
                        info!(rate = self.default_rate, "Falling back to default exchange rate");
                        self.default_quote(now, Some(message))
                    }
                }
            }
        };

        let mut write_guard = self.current.write().await;
        if cancelled.load(Ordering::Acquire) {
            debug!("Discarding exchange rate resolved after cancellation");
            return None;
        }
        *write_guard = Some(quote.clone());
        Some(quote)
    }

    pub async fn convert(&self, amount_usd: f64) -> f64 {
        currency::convert(amount_usd, self.get_rate().await.rate)
    }

    pub async fn convert_back(&self, amount_jpy: f64) -> f64 {
        currency::convert_back(amount_jpy, self.get_rate().await.rate)
    }

    pub fn format(&self, amount: f64, currency: Currency) -> String {
        currency::format(amount, currency)
    }

    /// Re-fetch once per TTL until the returned handle is cancelled or dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> RefreshHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let service = Arc::clone(self);
        let period = self.ttl;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // First tick is immediate

            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                match service.refresh_unless(&flag).await {
                    Some(quote) => {
                        debug!(rate = quote.rate, source = ?quote.source, "Scheduled exchange rate refresh")
                    }
                    None => break,
                }
            }
            debug!("Exchange rate auto-refresh stopped");
        });

        RefreshHandle { cancelled, task: Some(task) }
    }

    async fn fresh_current(&self, now: DateTime<Utc>) -> Option<RateQuote> {
        let read_guard = self.current.read().await;
        read_guard.as_ref().filter(|quote| is_fresh(quote.fetched_at, now, self.ttl)).cloned()
    }

    async fn fresh_persisted(&self, now: DateTime<Utc>, error: Option<String>) -> Option<RateQuote> {
        let entry = match self.store.load().await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted exchange rate");
                return None;
            }
        };
        let fetched_at = entry.fetched_at()?;
        if !valid_rate(entry.rate) || !is_fresh(fetched_at, now, self.ttl) {
            return None;
        }
        Some(RateQuote { rate: entry.rate, source: RateSource::Cached, fetched_at, error })
    }

    fn default_quote(&self, now: DateTime<Utc>, error: Option<String>) -> RateQuote {
        RateQuote { rate: self.default_rate, source: RateSource::Default, fetched_at: now, error }
    }
}

/// Owns the auto-refresh task. Cancelling (or dropping) stops the timer and
/// discards any fetch still in flight.
pub struct RefreshHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
