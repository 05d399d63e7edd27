use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::models::{date_key, dec_text, ItemRow, SnapshotRow};
use super::{RankUpdate, SnapshotRepository};
use crate::error::Result;
use crate::types::{DerivedMetrics, Item, MetricSnapshot};

const SNAPSHOT_COLUMNS: &str = r#"
    item_id, date, floor_price, active_listings_count, boxes_sold_per_day, daily_volume,
    volume_7d_ema, volume_30d_sma, absorption_rate, liquidity_score, boxes_sold_30d_avg,
    expected_days_to_sell, visible_market_cap, current_rank, previous_rank, rank_change
"#;

/// Ranking-metric order. Persisted ranks come first since they were assigned on
/// exact decimals; unranked rows fall back to the metric compared through REAL,
/// which loses digits past ~15 significant figures.
const RANKING_ORDER: &str = "ORDER BY current_rank ASC NULLS LAST, \
     CAST(volume_7d_ema AS REAL) DESC NULLS LAST, item_id ASC";

/// SQLite-backed snapshot store.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_snapshots(&self, sql: &str, binds: &[String]) -> Result<Vec<MetricSnapshot>> {
        let mut query = sqlx::query_as::<_, SnapshotRow>(sql);
        for b in binds {
            query = query.bind(b.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(MetricSnapshot::try_from).collect()
    }
}

#[async_trait]
impl SnapshotRepository for SqliteRepository {
    async fn upsert_item(&self, item: &Item) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, category, supply_estimate)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                supply_estimate = excluded.supply_estimate
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.supply_estimate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT id, name, category, supply_estimate FROM items WHERE id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Item::from))
    }

    async fn items_by_ids(&self, ids: &[String]) -> Result<HashMap<String, Item>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, category, supply_estimate FROM items WHERE id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.clone());
        }
        sep.push_unseparated(")");

        let rows = qb.build_query_as::<ItemRow>().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.id.clone(), Item::from(r)))
            .collect())
    }

    async fn upsert_snapshot(&self, s: &MetricSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_snapshots (
                item_id, date, floor_price, active_listings_count,
                boxes_sold_per_day, daily_volume
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id, date) DO UPDATE SET
                floor_price = excluded.floor_price,
                active_listings_count = excluded.active_listings_count,
                boxes_sold_per_day = excluded.boxes_sold_per_day,
                daily_volume = excluded.daily_volume
            "#,
        )
        .bind(&s.item_id)
        .bind(date_key(s.date))
        .bind(dec_text(s.floor_price))
        .bind(s.active_listings_count)
        .bind(dec_text(s.boxes_sold_per_day))
        .bind(dec_text(s.daily_volume))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        item_id: &str,
        date: NaiveDate,
    ) -> Result<Option<MetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots WHERE item_id = ? AND date = ?"
        );
        let mut rows = self
            .fetch_snapshots(&sql, &[item_id.to_string(), date_key(date)])
            .await?;
        Ok(rows.pop())
    }

    async fn latest_snapshot(&self, item_id: &str) -> Result<Option<MetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots \
             WHERE item_id = ? ORDER BY date DESC LIMIT 1"
        );
        let mut rows = self.fetch_snapshots(&sql, &[item_id.to_string()]).await?;
        Ok(rows.pop())
    }

    async fn snapshots_in_range(
        &self,
        item_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots \
             WHERE item_id = ? AND date >= ? AND date <= ? ORDER BY date ASC"
        );
        self.fetch_snapshots(&sql, &[item_id.to_string(), date_key(start), date_key(end)])
            .await
    }

    async fn snapshots_for_date(&self, date: NaiveDate) -> Result<Vec<MetricSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots WHERE date = ? {RANKING_ORDER}"
        );
        self.fetch_snapshots(&sql, &[date_key(date)]).await
    }

    async fn latest_snapshots(&self) -> Result<Vec<MetricSnapshot>> {
        let sql = format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS} FROM metric_snapshots
            WHERE (item_id, date) IN (
                SELECT item_id, MAX(date) FROM metric_snapshots GROUP BY item_id
            )
            {RANKING_ORDER}
            "#
        );
        self.fetch_snapshots(&sql, &[]).await
    }

    async fn item_ids_for_date(&self, date: NaiveDate) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT item_id FROM metric_snapshots WHERE date = ? ORDER BY item_id",
        )
        .bind(date_key(date))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn update_derived(
        &self,
        item_id: &str,
        date: NaiveDate,
        d: &DerivedMetrics,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE metric_snapshots SET
                volume_7d_ema = ?,
                volume_30d_sma = ?,
                absorption_rate = ?,
                liquidity_score = ?,
                boxes_sold_30d_avg = ?,
                expected_days_to_sell = ?,
                visible_market_cap = ?
            WHERE item_id = ? AND date = ?
            "#,
        )
        .bind(dec_text(d.volume_7d_ema))
        .bind(dec_text(d.volume_30d_sma))
        .bind(dec_text(d.absorption_rate))
        .bind(dec_text(d.liquidity_score))
        .bind(dec_text(d.boxes_sold_30d_avg))
        .bind(dec_text(d.expected_days_to_sell))
        .bind(dec_text(d.visible_market_cap))
        .bind(item_id)
        .bind(date_key(date))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_ranks(&self, date: NaiveDate, updates: &[RankUpdate]) -> Result<()> {
        let day = date_key(date);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE metric_snapshots \
             SET current_rank = NULL, previous_rank = NULL, rank_change = NULL \
             WHERE date = ?",
        )
        .bind(&day)
        .execute(&mut *tx)
        .await?;

        for u in updates {
            sqlx::query(
                r#"
                UPDATE metric_snapshots SET current_rank = ?, previous_rank = ?, rank_change = ?
                WHERE item_id = ? AND date = ?
                "#,
            )
            .bind(u.rank.current_rank.map(i64::from))
            .bind(u.rank.previous_rank.map(i64::from))
            .bind(u.rank.rank_change)
            .bind(&u.item_id)
            .bind(&day)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(date = %day, rows = updates.len(), "rank batch committed");
        Ok(())
    }
}
