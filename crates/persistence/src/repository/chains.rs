//! Option chain repository: strike-level snapshots

use crate::{parse_date, DbResult};
use engine::{OptionChain, OptionQuote, StrikeQuote};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// One stored strike row, both sides flattened
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChainStrikeRecord {
    pub symbol: String,
    pub expiration: String,
    pub as_of_timestamp: i64,
    pub spot: f64,
    pub strike: f64,
    pub call_oi: i64,
    pub call_volume: i64,
    pub call_iv: f64,
    pub call_gamma: f64,
    pub call_charm: f64,
    pub call_vanna: f64,
    pub call_vomma: f64,
    pub put_oi: i64,
    pub put_volume: i64,
    pub put_iv: f64,
    pub put_gamma: f64,
    pub put_charm: f64,
    pub put_vanna: f64,
    pub put_vomma: f64,
}

impl ChainStrikeRecord {
    fn strike_quote(&self) -> StrikeQuote {
        StrikeQuote {
            strike: self.strike,
            call: OptionQuote {
                oi: self.call_oi,
                volume: self.call_volume,
                iv: self.call_iv,
                gamma: self.call_gamma,
                charm: self.call_charm,
                vanna: self.call_vanna,
                vomma: self.call_vomma,
            },
            put: OptionQuote {
                oi: self.put_oi,
                volume: self.put_volume,
                iv: self.put_iv,
                gamma: self.put_gamma,
                charm: self.put_charm,
                vanna: self.put_vanna,
                vomma: self.put_vomma,
            },
        }
    }
}

/// Repository for option chain snapshots
pub struct ChainRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChainRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store every strike of a chain snapshot. Saving the same
    /// (symbol, expiration, as_of_timestamp) again replaces all of its strikes.
    pub async fn save_chain(&self, chain: &OptionChain) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let expiration = chain.expiration.to_string();

        sqlx::query(
            r#"DELETE FROM option_chain_strikes
               WHERE symbol = ?1 AND expiration = ?2 AND as_of_timestamp = ?3"#,
        )
        .bind(&chain.symbol)
        .bind(&expiration)
        .bind(chain.as_of_timestamp)
        .execute(&mut *tx)
        .await?;

        for s in &chain.strikes {
            sqlx::query(
                r#"INSERT OR REPLACE INTO option_chain_strikes
                    (symbol, expiration, as_of_timestamp, spot, strike,
                     call_oi, call_volume, call_iv, call_gamma, call_charm, call_vanna, call_vomma,
                     put_oi, put_volume, put_iv, put_gamma, put_charm, put_vanna, put_vomma)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                           ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                "#,
            )
            .bind(&chain.symbol)
            .bind(&expiration)
            .bind(chain.as_of_timestamp)
            .bind(chain.spot)
            .bind(s.strike)
            .bind(s.call.oi)
            .bind(s.call.volume)
            .bind(s.call.iv)
            .bind(s.call.gamma)
            .bind(s.call.charm)
            .bind(s.call.vanna)
            .bind(s.call.vomma)
            .bind(s.put.oi)
            .bind(s.put.volume)
            .bind(s.put.iv)
            .bind(s.put.gamma)
            .bind(s.put.charm)
            .bind(s.put.vanna)
            .bind(s.put.vomma)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            symbol = %chain.symbol,
            expiration = %expiration,
            strikes = chain.strikes.len(),
            "Saved option chain"
        );
        Ok(chain.strikes.len())
    }

    /// Most recent snapshot for a symbol (nearest expiration within it), if any
    pub async fn latest_chain(&self, symbol: &str) -> DbResult<Option<OptionChain>> {
        let records = sqlx::query_as::<_, ChainStrikeRecord>(
            r#"SELECT * FROM option_chain_strikes
               WHERE symbol = ?1
                 AND as_of_timestamp = (
                   SELECT MAX(as_of_timestamp) FROM option_chain_strikes WHERE symbol = ?1
                 )
               ORDER BY expiration ASC, strike ASC"#,
        )
        .bind(symbol)
        .fetch_all(self.pool)
        .await?;

        let Some(first) = records.first() else {
            return Ok(None);
        };
        let expiration = first.expiration.clone();

        let mut chain = OptionChain {
            symbol: first.symbol.clone(),
            expiration: parse_date(&expiration)?,
            as_of_timestamp: first.as_of_timestamp,
            spot: first.spot,
            strikes: records
                .iter()
                .filter(|r| r.expiration == expiration)
                .map(ChainStrikeRecord::strike_quote)
                .collect(),
        };
        chain.normalize();
        Ok(Some(chain))
    }
}
