//! Analysis repository: daily aggregates and classified setups

use crate::{parse_date, DbError, DbResult};
use chrono::NaiveDate;
use engine::{MarketAggregate, SetupType, TradeSetup};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AggregateRecord {
    pub symbol: String,
    pub date: String,
    pub pcr: f64,
    pub max_pain: Option<f64>,
    pub gamma_exposure: f64,
    pub iv_percentile: f64,
    pub atm_iv: Option<f64>,
}

impl AggregateRecord {
    pub fn into_aggregate(self) -> DbResult<MarketAggregate> {
        Ok(MarketAggregate {
            symbol: self.symbol,
            date: parse_date(&self.date)?,
            pcr: self.pcr,
            max_pain: self.max_pain,
            gamma_exposure: self.gamma_exposure,
            iv_percentile: self.iv_percentile,
        })
    }
}

/// A persisted setup, with the full classification breakdown as JSON
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SetupRecord {
    pub id: Option<i64>,
    pub ticker: String,
    pub date: String,
    pub setup_type: String,
    pub strength: i64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub risk_reward_ratio: f64,
    pub classification_json: Option<String>,
    pub created_at: Option<i64>,
}

impl SetupRecord {
    pub fn into_setup(self) -> DbResult<TradeSetup> {
        let setup_type: SetupType = self.setup_type.parse().map_err(DbError::Query)?;
        let strength = u8::try_from(self.strength)
            .map_err(|_| DbError::Query(format!("strength out of range: {}", self.strength)))?;
        Ok(TradeSetup {
            ticker: self.ticker,
            date: parse_date(&self.date)?,
            setup_type,
            strength,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            target_price: self.target_price,
            risk_reward_ratio: self.risk_reward_ratio,
        })
    }
}

/// Repository for aggregates and setups
pub struct AnalysisRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AnalysisRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert the aggregate for (symbol, date), along with that day's ATM IV
    pub async fn save_aggregate(
        &self,
        aggregate: &MarketAggregate,
        atm_iv: Option<f64>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO market_aggregates
                (symbol, date, pcr, max_pain, gamma_exposure, iv_percentile, atm_iv)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(symbol, date) DO UPDATE SET
                 pcr = excluded.pcr,
                 max_pain = excluded.max_pain,
                 gamma_exposure = excluded.gamma_exposure,
                 iv_percentile = excluded.iv_percentile,
                 atm_iv = excluded.atm_iv
            "#,
        )
        .bind(&aggregate.symbol)
        .bind(aggregate.date.to_string())
        .bind(aggregate.pcr)
        .bind(aggregate.max_pain)
        .bind(aggregate.gamma_exposure)
        .bind(aggregate.iv_percentile)
        .bind(atm_iv)
        .execute(self.pool)
        .await?;

        debug!(symbol = %aggregate.symbol, date = %aggregate.date, "Saved aggregate");
        Ok(())
    }

    pub async fn get_aggregates(&self, symbol: &str) -> DbResult<Vec<MarketAggregate>> {
        let records = sqlx::query_as::<_, AggregateRecord>(
            r#"SELECT symbol, date, pcr, max_pain, gamma_exposure, iv_percentile, atm_iv
               FROM market_aggregates WHERE symbol = ?1 ORDER BY date ASC"#,
        )
        .bind(symbol)
        .fetch_all(self.pool)
        .await?;

        records.into_iter().map(AggregateRecord::into_aggregate).collect()
    }

    /// ATM IV for up to `limit` days strictly before `before`, newest first
    pub async fn iv_history(
        &self,
        symbol: &str,
        before: NaiveDate,
        limit: i64,
    ) -> DbResult<Vec<f64>> {
        let rows: Vec<(f64,)> = sqlx::query_as(
            r#"SELECT atm_iv FROM market_aggregates
               WHERE symbol = ?1 AND date < ?2 AND atm_iv IS NOT NULL
               ORDER BY date DESC LIMIT ?3"#,
        )
        .bind(symbol)
        .bind(before.to_string())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(iv,)| iv).collect())
    }

    /// PCR from the most recent aggregate strictly before `before`
    pub async fn previous_pcr(&self, symbol: &str, before: NaiveDate) -> DbResult<Option<f64>> {
        let row: Option<(f64,)> = sqlx::query_as(
            r#"SELECT pcr FROM market_aggregates
               WHERE symbol = ?1 AND date < ?2
               ORDER BY date DESC LIMIT 1"#,
        )
        .bind(symbol)
        .bind(before.to_string())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(pcr,)| pcr))
    }

    /// Store a setup. A later analysis for the same (ticker, date) supersedes the earlier row.
    pub async fn save_setup(
        &self,
        setup: &TradeSetup,
        classification_json: Option<&str>,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO trade_setups
                (ticker, date, setup_type, strength, entry_price, stop_loss, target_price,
                 risk_reward_ratio, classification_json, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, strftime('%s', 'now'))
               ON CONFLICT(ticker, date) DO UPDATE SET
                 setup_type = excluded.setup_type,
                 strength = excluded.strength,
                 entry_price = excluded.entry_price,
                 stop_loss = excluded.stop_loss,
                 target_price = excluded.target_price,
                 risk_reward_ratio = excluded.risk_reward_ratio,
                 classification_json = excluded.classification_json,
                 created_at = strftime('%s', 'now')
            "#,
        )
        .bind(&setup.ticker)
        .bind(setup.date.to_string())
        .bind(setup.setup_type.as_str())
        .bind(setup.strength as i64)
        .bind(setup.entry_price)
        .bind(setup.stop_loss)
        .bind(setup.target_price)
        .bind(setup.risk_reward_ratio)
        .bind(classification_json)
        .execute(self.pool)
        .await?;

        debug!(
            ticker = %setup.ticker,
            date = %setup.date,
            setup = %setup.setup_type,
            "Saved setup"
        );
        Ok(result.last_insert_rowid())
    }

    /// Most recent setups for a ticker, newest first
    pub async fn get_setups(&self, ticker: &str, limit: i64) -> DbResult<Vec<TradeSetup>> {
        let records = sqlx::query_as::<_, SetupRecord>(
            "SELECT * FROM trade_setups WHERE ticker = ?1 ORDER BY date DESC LIMIT ?2",
        )
        .bind(ticker)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        records.into_iter().map(SetupRecord::into_setup).collect()
    }

    /// Latest setup per ticker of the given type, strongest first
    pub async fn setups_by_type(
        &self,
        setup_type: SetupType,
        min_strength: u8,
    ) -> DbResult<Vec<TradeSetup>> {
        let records = sqlx::query_as::<_, SetupRecord>(
            r#"SELECT s.* FROM trade_setups s
               JOIN (SELECT ticker, MAX(date) AS date FROM trade_setups GROUP BY ticker) latest
                 ON s.ticker = latest.ticker AND s.date = latest.date
               WHERE s.setup_type = ?1 AND s.strength >= ?2
               ORDER BY s.strength DESC, s.ticker ASC"#,
        )
        .bind(setup_type.as_str())
        .bind(min_strength as i64)
        .fetch_all(self.pool)
        .await?;

        records.into_iter().map(SetupRecord::into_setup).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn aggregate(date: NaiveDate, pcr: f64) -> MarketAggregate {
        MarketAggregate {
            symbol: "SPY".to_string(),
            date,
            pcr,
            max_pain: Some(510.0),
            gamma_exposure: 750_000.0,
            iv_percentile: 40.0,
        }
    }

    fn setup(ticker: &str, date: NaiveDate, setup_type: SetupType, strength: u8) -> TradeSetup {
        TradeSetup {
            ticker: ticker.to_string(),
            date,
            setup_type,
            strength,
            entry_price: 100.0,
            stop_loss: 97.0,
            target_price: 106.0,
            risk_reward_ratio: 2.0,
        }
    }

    #[tokio::test]
    async fn test_aggregate_history_queries() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.analysis();
        repo.save_aggregate(&aggregate(day(11), 0.9), Some(0.20)).await.unwrap();
        repo.save_aggregate(&aggregate(day(12), 1.1), Some(0.25)).await.unwrap();
        repo.save_aggregate(&aggregate(day(13), 1.3), None).await.unwrap();

        assert_eq!(repo.previous_pcr("SPY", day(13)).await.unwrap(), Some(1.1));
        assert_eq!(repo.previous_pcr("SPY", day(11)).await.unwrap(), None);
        assert_eq!(repo.iv_history("SPY", day(14), 10).await.unwrap(), vec![0.25, 0.20]);

        let all = repo.get_aggregates("SPY").await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], aggregate(day(11), 0.9));
    }

    #[tokio::test]
    async fn test_setup_supersedes_same_day() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.analysis();
        repo.save_setup(&setup("SPY", day(15), SetupType::Neutral, 60), None)
            .await
            .unwrap();
        let latest = setup("SPY", day(15), SetupType::Bullish, 80);
        repo.save_setup(&latest, Some(r#"{"setupType":"bullish"}"#))
            .await
            .unwrap();

        let stored = repo.get_setups("SPY", 10).await.unwrap();
        assert_eq!(stored, vec![latest]);
    }

    #[tokio::test]
    async fn test_setups_by_type_uses_latest_per_ticker() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.analysis();
        repo.save_setup(&setup("SPY", day(14), SetupType::Bullish, 80), None).await.unwrap();
        repo.save_setup(&setup("SPY", day(15), SetupType::Bearish, 60), None).await.unwrap();
        repo.save_setup(&setup("QQQ", day(15), SetupType::Bullish, 100), None).await.unwrap();
        repo.save_setup(&setup("IWM", day(15), SetupType::Bullish, 40), None).await.unwrap();

        let bullish = repo.setups_by_type(SetupType::Bullish, 50).await.unwrap();
        assert_eq!(bullish.len(), 1);
        assert_eq!(bullish[0].ticker, "QQQ");
    }
}
