//! Database schema definitions

/// SQL to create all tables
/// NOTE: dates are stored as ISO-8601 TEXT (YYYY-MM-DD), prices as REAL
pub const CREATE_TABLES: &str = r#"
-- Daily OHLCV bars, one row per symbol and trading day
CREATE TABLE IF NOT EXISTS price_history (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    timestamp_seconds INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (symbol, date)
);

-- Option chain snapshots, one row per strike with both sides flattened
CREATE TABLE IF NOT EXISTS option_chain_strikes (
    symbol TEXT NOT NULL,
    expiration TEXT NOT NULL,
    as_of_timestamp INTEGER NOT NULL,
    spot REAL NOT NULL,
    strike REAL NOT NULL,
    call_oi INTEGER NOT NULL DEFAULT 0,
    call_volume INTEGER NOT NULL DEFAULT 0,
    call_iv REAL NOT NULL DEFAULT 0,
    call_gamma REAL NOT NULL DEFAULT 0,
    call_charm REAL NOT NULL DEFAULT 0,
    call_vanna REAL NOT NULL DEFAULT 0,
    call_vomma REAL NOT NULL DEFAULT 0,
    put_oi INTEGER NOT NULL DEFAULT 0,
    put_volume INTEGER NOT NULL DEFAULT 0,
    put_iv REAL NOT NULL DEFAULT 0,
    put_gamma REAL NOT NULL DEFAULT 0,
    put_charm REAL NOT NULL DEFAULT 0,
    put_vanna REAL NOT NULL DEFAULT 0,
    put_vomma REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (symbol, expiration, as_of_timestamp, strike)
);

-- Chain-wide aggregates per symbol and day
CREATE TABLE IF NOT EXISTS market_aggregates (
    symbol TEXT NOT NULL,
    date TEXT NOT NULL,
    pcr REAL NOT NULL,
    max_pain REAL,
    gamma_exposure REAL NOT NULL,
    iv_percentile REAL NOT NULL,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (symbol, date)
);

-- Classified trade setups
CREATE TABLE IF NOT EXISTS trade_setups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    date TEXT NOT NULL,
    setup_type TEXT NOT NULL,
    strength INTEGER NOT NULL,
    entry_price REAL NOT NULL,
    stop_loss REAL NOT NULL,
    target_price REAL NOT NULL,
    risk_reward_ratio REAL NOT NULL,
    classification_json TEXT,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),
    UNIQUE (ticker, date)
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_chain_latest ON option_chain_strikes(symbol, as_of_timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_setups_ticker ON trade_setups(ticker, date DESC);
CREATE INDEX IF NOT EXISTS idx_setups_type ON trade_setups(setup_type, strength DESC)
"#;

/// Column additions applied after CREATE_TABLES; "duplicate column name" is tolerated
pub const MIGRATIONS: &[&str] = &[
    // ATM IV per day feeds the IV percentile history
    "ALTER TABLE market_aggregates ADD COLUMN atm_iv REAL",
];
