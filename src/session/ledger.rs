use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::VoiceResult;

/// Per-user, per-day voice usage
#[async_trait::async_trait]
pub trait UsageLedger: Send + Sync {
    /// Seconds of voice time the user has left today
    async fn remaining_seconds_today(&self, user_id: &str) -> VoiceResult<i64>;

    /// Add consumed seconds to today's counter
    async fn record_usage(&self, user_id: &str, delta_seconds: u64) -> VoiceResult<()>;
}

/// Ledger kept in memory, keyed by (user, UTC calendar day)
pub struct InMemoryUsageLedger {
    daily_allowance_secs: u64,
    usage: RwLock<HashMap<(String, NaiveDate), u64>>,
}

impl InMemoryUsageLedger {
    pub fn new(daily_allowance_secs: u64) -> Self {
        Self {
            daily_allowance_secs,
            usage: RwLock::new(HashMap::new()),
        }
    }

    pub fn daily_allowance_secs(&self) -> u64 {
        self.daily_allowance_secs
    }

    pub async fn used_on(&self, user_id: &str, day: NaiveDate) -> u64 {
        let usage = self.usage.read().await;
        usage.get(&(user_id.to_string(), day)).copied().unwrap_or(0)
    }

    pub async fn used_today(&self, user_id: &str) -> u64 {
        self.used_on(user_id, Utc::now().date_naive()).await
    }
}

#[async_trait::async_trait]
impl UsageLedger for InMemoryUsageLedger {
    async fn remaining_seconds_today(&self, user_id: &str) -> VoiceResult<i64> {
        let used = self.used_today(user_id).await;
        Ok(self.daily_allowance_secs as i64 - used as i64)
    }

    async fn record_usage(&self, user_id: &str, delta_seconds: u64) -> VoiceResult<()> {
        let day = Utc::now().date_naive();
        let total = {
            let mut usage = self.usage.write().await;
            let entry = usage.entry((user_id.to_string(), day)).or_insert(0);
            *entry += delta_seconds;
            *entry
        };

        info!(
            "Recorded {}s of voice usage for {} on {} (total {}s)",
            delta_seconds, user_id, day, total
        );

        Ok(())
    }
}
