use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use libsql::{Row, params};
use std::time::SystemTime;
use tracing::warn;
use uuid::Uuid;

use super::models::{MonitoredSite, NewTick, Tick, Validator, i64_to_timestamp, timestamp_to_i64};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Narrow read/write interface the hub core uses for durable state
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a validator by its public key
    async fn find_validator_by_public_key(&self, public_key: &str) -> Result<Option<Validator>>;

    /// Create a validator with zero pending payout. If a validator with the
    /// same key already exists it is returned unchanged.
    async fn create_validator(&self, ip: &str, public_key: &str, location: &str) -> Result<Validator>;

    /// Get a validator by id
    async fn get_validator(&self, id: &str) -> Result<Option<Validator>>;

    /// All sites that are not disabled
    async fn list_active_sites(&self) -> Result<Vec<MonitoredSite>>;

    /// Register a site to monitor
    async fn create_site(&self, url: &str, user_id: &str) -> Result<MonitoredSite>;

    /// Enable or disable a site
    async fn set_site_disabled(&self, site_id: &str, disabled: bool) -> Result<()>;

    /// Insert the tick and credit its validator `reward` in one transaction.
    /// Either both happen or neither does.
    async fn record_observation(&self, tick: &NewTick, reward: u32) -> Result<String>;

    /// Most recent ticks for a site, newest first
    async fn recent_ticks(&self, site_id: &str, limit: usize) -> Result<Vec<Tick>>;
}

/// LibSQL store implementation
pub struct LibsqlStore {
    pool: LibsqlPool,
}

const VALIDATOR_COLUMNS: &str = "id, public_key, ip, location, pending_payouts, created_at";

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    /// Number of validator rows
    pub async fn count_validators(&self) -> Result<i64> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM validators", ()).await?;
        let row = rows.next().await?.ok_or_else(|| anyhow!("COUNT returned no rows"))?;
        Ok(row.get::<i64>(0)?)
    }

    fn validator_from_row(row: &Row) -> Result<Validator> {
        Ok(Validator {
            id: row.get(0)?,
            public_key: row.get(1)?,
            ip: row.get(2)?,
            location: row.get(3)?,
            pending_payouts: row.get(4)?,
            created_at: i64_to_timestamp(row.get(5)?),
        })
    }

    fn site_from_row(row: &Row) -> Result<MonitoredSite> {
        Ok(MonitoredSite {
            id: row.get(0)?,
            url: row.get(1)?,
            user_id: row.get(2)?,
            disabled: row.get::<i64>(3)? != 0,
        })
    }
}

#[async_trait]
impl Store for LibsqlStore {
    async fn find_validator_by_public_key(&self, public_key: &str) -> Result<Option<Validator>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {VALIDATOR_COLUMNS} FROM validators WHERE public_key = ?"),
                params![public_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::validator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_validator(&self, ip: &str, public_key: &str, location: &str) -> Result<Validator> {
        let conn = self.get_conn().await?;
        let id = Uuid::new_v4().to_string();
        let created_at = timestamp_to_i64(SystemTime::now());

        // Two signups racing on the same key both land on the one row
        conn.execute(
            "INSERT INTO validators (id, public_key, ip, location, pending_payouts, created_at) VALUES (?, ?, ?, ?, 0, ?) ON CONFLICT(public_key) DO NOTHING",
            params![id.as_str(), public_key, ip, location, created_at],
        )
        .await?;
        drop(conn);

        self.find_validator_by_public_key(public_key)
            .await?
            .ok_or_else(|| anyhow!("validator for {public_key} missing after insert"))
    }

    async fn get_validator(&self, id: &str) -> Result<Option<Validator>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {VALIDATOR_COLUMNS} FROM validators WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::validator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_active_sites(&self) -> Result<Vec<MonitoredSite>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, url, user_id, disabled FROM websites WHERE disabled = 0 ORDER BY created_at, id",
                (),
            )
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(Self::site_from_row(&row)?);
        }

        Ok(sites)
    }

    async fn create_site(&self, url: &str, user_id: &str) -> Result<MonitoredSite> {
        let conn = self.get_conn().await?;
        let site = MonitoredSite {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            user_id: user_id.to_string(),
            disabled: false,
        };

        conn.execute(
            "INSERT INTO websites (id, url, user_id, disabled, created_at) VALUES (?, ?, ?, 0, ?)",
            params![
                site.id.as_str(),
                site.url.as_str(),
                site.user_id.as_str(),
                timestamp_to_i64(SystemTime::now())
            ],
        )
        .await?;

        Ok(site)
    }

    async fn set_site_disabled(&self, site_id: &str, disabled: bool) -> Result<()> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE websites SET disabled = ? WHERE id = ?",
                params![if disabled { 1 } else { 0 }, site_id],
            )
            .await?;

        if updated == 0 {
            bail!("website {site_id} not found");
        }
        Ok(())
    }

    async fn record_observation(&self, tick: &NewTick, reward: u32) -> Result<String> {
        let latency = i64::try_from(tick.latency_ms)
            .with_context(|| format!("latency {} out of range", tick.latency_ms))?;
        let conn = self.get_conn().await?;
        let tick_id = Uuid::new_v4().to_string();
        let tx = conn.transaction().await?;

        let applied = async {
            tx.execute(
                "INSERT INTO website_ticks (id, website_id, validator_id, status, latency, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    tick_id.as_str(),
                    tick.site_id.as_str(),
                    tick.validator_id.as_str(),
                    tick.status.as_str(),
                    latency,
                    timestamp_to_i64(tick.timestamp)
                ],
            )
            .await?;

            let credited = tx
                .execute(
                    "UPDATE validators SET pending_payouts = pending_payouts + ? WHERE id = ?",
                    params![i64::from(reward), tick.validator_id.as_str()],
                )
                .await?;

            if credited != 1 {
                bail!("validator {} not found, cannot credit payout", tick.validator_id);
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        match applied {
            Ok(()) => {
                tx.commit().await?;
                Ok(tick_id)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed observation write also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn recent_ticks(&self, site_id: &str, limit: usize) -> Result<Vec<Tick>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, website_id, validator_id, status, latency, created_at FROM website_ticks WHERE website_id = ? ORDER BY created_at DESC, id LIMIT ?",
                params![site_id, limit as i64],
            )
            .await?;

        let mut ticks = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(3)?;
            ticks.push(Tick {
                id: row.get(0)?,
                site_id: row.get(1)?,
                validator_id: row.get(2)?,
                status: status.parse().map_err(|e: String| anyhow!(e))?,
                latency_ms: row.get::<i64>(4)?.max(0) as u64,
                created_at: i64_to_timestamp(row.get(5)?),
            });
        }

        Ok(ticks)
    }
}
