//! Price history repository: daily bars per symbol

use crate::{parse_date, DbResult};
use chrono::NaiveDate;
use engine::PricePoint;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// A stored daily bar
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: String,
    pub timestamp_seconds: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceRecord {
    pub fn into_point(self) -> DbResult<PricePoint> {
        Ok(PricePoint {
            date: parse_date(&self.date)?,
            timestamp_seconds: self.timestamp_seconds,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Repository for daily price bars
pub struct PriceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PriceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert bars keyed by (symbol, date). Returns the number of rows written.
    pub async fn save_prices(&self, symbol: &str, points: &[PricePoint]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;

        for p in points {
            let result = sqlx::query(
                r#"INSERT INTO price_history
                    (symbol, date, timestamp_seconds, open, high, low, close, volume)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                   ON CONFLICT(symbol, date) DO UPDATE SET
                     timestamp_seconds = excluded.timestamp_seconds,
                     open = excluded.open,
                     high = excluded.high,
                     low = excluded.low,
                     close = excluded.close,
                     volume = excluded.volume
                "#,
            )
            .bind(symbol)
            .bind(p.date.to_string())
            .bind(p.timestamp_seconds)
            .bind(p.open)
            .bind(p.high)
            .bind(p.low)
            .bind(p.close)
            .bind(p.volume)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!(symbol, written, "Saved price history");
        Ok(written)
    }

    /// Bars for a symbol in ascending date order.
    /// With `limit`, only the most recent `limit` bars are returned.
    pub async fn get_prices(&self, symbol: &str, limit: Option<i64>) -> DbResult<Vec<PricePoint>> {
        let records = sqlx::query_as::<_, PriceRecord>(
            r#"SELECT * FROM (
                 SELECT * FROM price_history
                 WHERE symbol = ?1
                 ORDER BY date DESC
                 LIMIT ?2
               ) ORDER BY date ASC"#,
        )
        .bind(symbol)
        .bind(limit.unwrap_or(-1))
        .fetch_all(self.pool)
        .await?;

        records.into_iter().map(PriceRecord::into_point).collect()
    }

    pub async fn latest_date(&self, symbol: &str) -> DbResult<Option<NaiveDate>> {
        let (latest,): (Option<String>,) =
            sqlx::query_as("SELECT MAX(date) FROM price_history WHERE symbol = ?1")
                .bind(symbol)
                .fetch_one(self.pool)
                .await?;

        latest.as_deref().map(parse_date).transpose()
    }

    /// Every symbol with stored history
    pub async fn symbols(&self) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT symbol FROM price_history ORDER BY symbol")
                .fetch_all(self.pool)
                .await?;

        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn make_points(closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                timestamp_seconds: 1_704_067_200 + i as i64 * 86_400,
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_prices_round_trip_in_order() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.prices();
        let points = make_points(&[100.0, 101.0, 102.0, 103.0]);

        assert_eq!(repo.save_prices("SPY", &points).await.unwrap(), 4);
        assert_eq!(repo.get_prices("SPY", None).await.unwrap(), points);

        let recent = repo.get_prices("SPY", Some(2)).await.unwrap();
        assert_eq!(recent, points[2..].to_vec());
        assert!(repo.get_prices("QQQ", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_prices_upserts() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.prices();
        let mut points = make_points(&[100.0, 101.0]);
        repo.save_prices("SPY", &points).await.unwrap();

        points[1].close = 99.5;
        repo.save_prices("SPY", &points).await.unwrap();

        let stored = repo.get_prices("SPY", None).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].close, 99.5);
    }

    #[tokio::test]
    async fn test_latest_date_and_symbols() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.prices();
        assert_eq!(repo.latest_date("SPY").await.unwrap(), None);

        let points = make_points(&[100.0, 101.0, 102.0]);
        repo.save_prices("SPY", &points).await.unwrap();
        repo.save_prices("AAPL", &points[..1]).await.unwrap();

        assert_eq!(repo.latest_date("SPY").await.unwrap(), Some(points[2].date));
        assert_eq!(repo.symbols().await.unwrap(), vec!["AAPL", "SPY"]);
    }
}
