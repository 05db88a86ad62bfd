//! SQLite data adapter.
//!
//! Every query checks a connection out of the r2d2 pool for its own scope; the
//! connection goes back to the pool when the guard drops.

use crate::domain::error::WalkforwardError;
use crate::domain::price::{PriceField, PriceRecord};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    table: String,
}

fn pool_err(e: r2d2::Error) -> WalkforwardError {
    WalkforwardError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> WalkforwardError {
    WalkforwardError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, WalkforwardError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| WalkforwardError::Database {
        reason: format!("invalid date '{s}': {e}"),
    })
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table(table: &str) -> Result<(), WalkforwardError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(WalkforwardError::invalid(
            "sqlite",
            "table",
            format!("'{table}' is not a valid table name"),
        ))
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, WalkforwardError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let table = config
            .get_string("sqlite", "table")
            .unwrap_or_else(|| "prices".to_string());
        validate_table(&table)?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        tracing::debug!(path = %db_path, pool_size, table = %table, "opened sqlite pool");
        Ok(Self { pool, table })
    }

    /// Single-connection in-memory database, so every checkout sees the same data.
    pub fn in_memory() -> Result<Self, WalkforwardError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self {
            pool,
            table: "prices".to_string(),
        })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, WalkforwardError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), WalkforwardError> {
        let table = &self.table;
        self.conn()?
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    ticker TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    PRIMARY KEY (ticker, date)
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(date);"
            ))
            .map_err(query_err)
    }

    pub fn insert_records(&self, records: &[PriceRecord]) -> Result<(), WalkforwardError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {} (ticker, date, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    self.table
                ))
                .map_err(query_err)?;
            for record in records {
                stmt.execute(params![
                    record.ticker(),
                    record.date().format(DATE_FORMAT).to_string(),
                    record.open(),
                    record.high(),
                    record.low(),
                    record.close(),
                    record.volume()
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        tracing::debug!(rows = records.len(), "inserted price records");
        Ok(())
    }
}

impl MarketDataPort for SqliteAdapter {
    fn dates(&self) -> Result<Vec<NaiveDate>, WalkforwardError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT DISTINCT date FROM {} ORDER BY date ASC",
                self.table
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_err)?;

        let mut dates = Vec::new();
        for row in rows {
            dates.push(parse_date(&row.map_err(query_err)?)?);
        }
        Ok(dates)
    }

    fn fetch_records(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, WalkforwardError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT date, open, high, low, close, volume
                 FROM {}
                 WHERE ticker = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
                self.table
            ))
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    ticker,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (date, open, high, low, close, volume) = row.map_err(query_err)?;
            records.push(PriceRecord::new(
                ticker,
                parse_date(&date)?,
                open,
                high,
                low,
                close,
                volume,
            )?);
        }
        Ok(records)
    }

    fn list_tickers(&self) -> Result<Vec<String>, WalkforwardError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT DISTINCT ticker FROM {} ORDER BY ticker",
                self.table
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_err)?;

        let mut tickers = Vec::new();
        for row in rows {
            tickers.push(row.map_err(query_err)?);
        }
        Ok(tickers)
    }

    fn data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, WalkforwardError> {
        let result: (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT MIN(date), MAX(date), COUNT(*) FROM {} WHERE ticker = ?1",
                    self.table
                ),
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((parse_date(&min)?, parse_date(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn price_on_date(
        &self,
        ticker: &str,
        date: NaiveDate,
        field: PriceField,
    ) -> Result<f64, WalkforwardError> {
        let column = match field {
            PriceField::Average => "(high + low) / 2.0",
            PriceField::Close => "close",
        };
        let price: Option<f64> = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {column} FROM {} WHERE ticker = ?1 AND date = ?2",
                    self.table
                ),
                params![ticker, date.format(DATE_FORMAT).to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(query_err(other)),
            })?;

        price.ok_or_else(|| WalkforwardError::PriceNotFound {
            ticker: ticker.to_string(),
            date,
        })
    }
}
