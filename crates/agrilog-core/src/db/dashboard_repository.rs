//! Aggregate queries for the dashboard

use libsql::Connection;

use crate::error::Result;
use crate::models::{
    BlockActivity, DashboardStats, HarvestSummary, PlantStatus, QualityTotal, StatusCount,
};

/// Read-only aggregates across every device's records
pub struct LibSqlDashboardRepository<'a> {
    conn: &'a Connection,
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl<'a> LibSqlDashboardRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Plant health counts and the harvest total of `month` (`YYYY-MM`).
    pub async fn stats(&self, month: &str) -> Result<DashboardStats> {
        let mut stats = DashboardStats::default();
        for StatusCount { status, count } in self.health_distribution().await? {
            stats.total_plants += count;
            match status {
                PlantStatus::Healthy => stats.healthy = count,
                PlantStatus::Attention => stats.attention = count,
                PlantStatus::Sick => stats.sick = count,
            }
        }

        let pattern = format!("{month}%");
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(SUM(quantity), 0.0) FROM harvest_records
                 WHERE deleted = 0 AND date LIKE ?",
                [pattern.as_str()],
            )
            .await?;
        if let Some(row) = rows.next().await? {
            stats.harvest_this_month = row.get(0)?;
        }

        Ok(stats)
    }

    /// Count of plants in each status, every status included.
    pub async fn health_distribution(&self) -> Result<Vec<StatusCount>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM plants WHERE deleted = 0 GROUP BY status",
                (),
            )
            .await?;

        let mut counts: Vec<StatusCount> = PlantStatus::ALL
            .into_iter()
            .map(|status| StatusCount { status, count: 0 })
            .collect();
        while let Some(row) = rows.next().await? {
            let raw: String = row.get(0)?;
            let Ok(status) = raw.parse::<PlantStatus>() else {
                tracing::warn!(status = %raw, "Ignoring plants with unknown status");
                continue;
            };
            if let Some(entry) = counts.iter_mut().find(|entry| entry.status == status) {
                entry.count += count(row.get(1)?);
            }
        }
        Ok(counts)
    }

    /// Harvest totals between two dates, inclusive.
    pub async fn harvest_summary(&self, from: &str, to: &str) -> Result<HarvestSummary> {
        let mut rows = self
            .conn
            .query(
                "SELECT quality, COUNT(*), COALESCE(SUM(quantity), 0.0) FROM harvest_records
                 WHERE deleted = 0 AND date >= ? AND date <= ?
                 GROUP BY quality ORDER BY quality",
                [from, to],
            )
            .await?;

        let mut summary = HarvestSummary::default();
        while let Some(row) = rows.next().await? {
            let quantity: f64 = row.get(2)?;
            summary.records += count(row.get(1)?);
            summary.total_quantity += quantity;
            summary.by_quality.push(QualityTotal {
                quality: row.get(0)?,
                quantity,
            });
        }
        Ok(summary)
    }

    /// Log entries per block since a date, busiest first.
    pub async fn block_activity(&self, since: &str) -> Result<Vec<BlockActivity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT block, COUNT(*) AS entries FROM log_entries
                 WHERE deleted = 0 AND date >= ?
                 GROUP BY block ORDER BY entries DESC, block ASC",
                [since],
            )
            .await?;

        let mut activity = Vec::new();
        while let Some(row) = rows.next().await? {
            activity.push(BlockActivity {
                block: row.get(0)?,
                entries: count(row.get(1)?),
            });
        }
        Ok(activity)
    }
}
