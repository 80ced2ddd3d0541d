use crate::errors::ApiError;
use crate::models::{Employee, Ledger, PayrollBatch};
use chrono::{DateTime, Utc};
use payroll_zk::Amount;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type Db = Pool<Sqlite>;

fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "database error");
    ApiError::Internal
}

pub async fn connect(db_url: &str) -> Result<Db, ApiError> {
    let options = SqliteConnectOptions::from_str(db_url)
        .map_err(internal)?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(internal)
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // Records are stored whole as JSON; sealed values and proofs stay opaque strings inside them.
    // Ledgers live in their own columns, which are authoritative over the copy inside record_json.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS employees (
  id TEXT PRIMARY KEY,
  position INTEGER NOT NULL UNIQUE,
  wallet TEXT NOT NULL UNIQUE,
  record_json TEXT NOT NULL,
  total_paid TEXT NOT NULL,
  payments_count INTEGER NOT NULL,
  last_paid_at TEXT
);

CREATE TABLE IF NOT EXISTS batches (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL,
  record_json TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(internal)?;

    Ok(())
}

fn count_column(count: u64) -> Result<i64, ApiError> {
    i64::try_from(count).map_err(internal)
}

/// `position` is the employee's registration index in memory.
pub async fn insert_employee(db: &Db, employee: &Employee, position: usize) -> Result<(), ApiError> {
    let record_json = serde_json::to_string(employee).map_err(internal)?;

    sqlx::query(
        r#"INSERT INTO employees (id, position, wallet, record_json, total_paid, payments_count, last_paid_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(employee.id.to_string())
    .bind(count_column(position as u64)?)
    .bind(employee.wallet.as_str())
    .bind(record_json)
    .bind(employee.total_paid.to_string())
    .bind(count_column(employee.payments_count)?)
    .bind(employee.last_paid_at)
    .execute(db)
    .await
    .map_err(internal)?;

    Ok(())
}

/// Store an edit to name, role or salary. Ledger columns are left alone.
pub async fn update_employee(db: &Db, employee: &Employee) -> Result<(), ApiError> {
    let record_json = serde_json::to_string(employee).map_err(internal)?;

    sqlx::query(r#"UPDATE employees SET record_json = ? WHERE id = ?"#)
        .bind(record_json)
        .bind(employee.id.to_string())
        .execute(db)
        .await
        .map_err(internal)?;

    Ok(())
}

/// Store a committed batch and the ledgers its commit produced in one transaction.
///
/// A ledger only replaces the stored one when it is further along, so batches recorded out of
/// commit order never move a ledger backwards.
pub async fn record_batch(db: &Db, batch: &PayrollBatch, ledgers: &[Ledger]) -> Result<(), ApiError> {
    let mut tx = db.begin().await.map_err(internal)?;

    sqlx::query(r#"INSERT INTO batches (id, created_at, record_json) VALUES (?, ?, ?)"#)
        .bind(batch.id.to_string())
        .bind(batch.created_at.to_rfc3339())
        .bind(serde_json::to_string(batch).map_err(internal)?)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

    for ledger in ledgers {
        let payments_count = count_column(ledger.payments_count)?;
        sqlx::query(
            r#"UPDATE employees SET total_paid = ?, payments_count = ?, last_paid_at = ?
               WHERE id = ? AND payments_count < ?"#,
        )
        .bind(ledger.total_paid.to_string())
        .bind(payments_count)
        .bind(ledger.last_paid_at)
        .bind(ledger.employee_id.to_string())
        .bind(payments_count)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    }

    tx.commit().await.map_err(internal)?;
    Ok(())
}

/// Employees in registration order, with their stored ledgers.
pub async fn load_employees(db: &Db) -> Result<Vec<Employee>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT record_json, total_paid, payments_count, last_paid_at FROM employees ORDER BY position"#,
    )
    .fetch_all(db)
    .await
    .map_err(internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let record_json: String = row.get(0);
        let total_paid: String = row.get(1);
        let payments_count: i64 = row.get(2);

        let mut employee: Employee = serde_json::from_str(&record_json).map_err(internal)?;
        employee.total_paid = total_paid.parse::<Amount>().map_err(internal)?;
        employee.payments_count = u64::try_from(payments_count).map_err(internal)?;
        employee.last_paid_at = row.get::<Option<DateTime<Utc>>, _>(3);
        out.push(employee);
    }
    Ok(out)
}

/// Batches, most recent first.
pub async fn load_batches(db: &Db) -> Result<Vec<PayrollBatch>, ApiError> {
    let rows = sqlx::query(r#"SELECT record_json FROM batches ORDER BY seq DESC"#)
        .fetch_all(db)
        .await
        .map_err(internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let record_json: String = row.get(0);
        out.push(serde_json::from_str(&record_json).map_err(internal)?);
    }
    Ok(out)
}
