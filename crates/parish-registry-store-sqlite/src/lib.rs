#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use parish_registry_core::{
    format_date, format_timestamp, now_utc, parse_date, parse_timestamp, truncate_to_micros,
    AgeBracket, Baptized, Direction, MaritalStatus, Member, NewMember, NewPastoralRequest,
    NewTransaction, PastoralRequest, RecordKind, RegistryError, RequestStatus, Transaction,
};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

const SCHEMA_TABLES_V1: &str = r"
CREATE TABLE IF NOT EXISTS members (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  marital_status TEXT NOT NULL CHECK (
    marital_status IN ('single', 'married', 'widowed', 'divorced')
  ),
  age INTEGER NOT NULL CHECK (age >= 0),
  bracket TEXT NOT NULL CHECK (bracket IN ('children', 'youth', 'parents', 'elders')),
  residence TEXT NOT NULL,
  baptized TEXT NOT NULL CHECK (baptized IN ('yes', 'no')),
  years_in_congregation INTEGER NOT NULL CHECK (years_in_congregation >= 0),
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pastoral_requests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  description TEXT NOT NULL,
  requested_at TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'attended'))
);

CREATE TABLE IF NOT EXISTS transactions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  direction TEXT NOT NULL CHECK (direction IN ('income', 'expense')),
  category TEXT NOT NULL,
  amount REAL NOT NULL CHECK (amount > 0),
  date TEXT NOT NULL,
  note TEXT NOT NULL DEFAULT ''
);
";

const SCHEMA_GUARDS_V1: &str = r"
CREATE INDEX IF NOT EXISTS idx_members_recency
  ON members(created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_pastoral_requests_recency
  ON pastoral_requests(requested_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_recency
  ON transactions(date DESC, id DESC);

CREATE TRIGGER IF NOT EXISTS trg_members_no_update
BEFORE UPDATE ON members
BEGIN
  SELECT RAISE(FAIL, 'members are never updated in place');
END;

CREATE TRIGGER IF NOT EXISTS trg_transactions_no_update
BEFORE UPDATE ON transactions
BEGIN
  SELECT RAISE(FAIL, 'transactions are never updated in place');
END;

CREATE TRIGGER IF NOT EXISTS trg_pastoral_requests_status_forward
BEFORE UPDATE OF status ON pastoral_requests
WHEN OLD.status = 'attended' AND NEW.status <> 'attended'
BEGIN
  SELECT RAISE(FAIL, 'pastoral request status cannot leave attended');
END;
";

/// Static SQL for one record store. Table names never come from caller input.
struct TableSpec {
    table: &'static str,
    columns: &'static [&'static str],
    delete_one: &'static str,
    delete_all: &'static str,
}

static MEMBERS: TableSpec = TableSpec {
    table: "members",
    columns: &[
        "id",
        "name",
        "marital_status",
        "age",
        "bracket",
        "residence",
        "baptized",
        "years_in_congregation",
        "created_at",
    ],
    delete_one: "DELETE FROM members WHERE id = ?1",
    delete_all: "DELETE FROM members",
};

static PASTORAL_REQUESTS: TableSpec = TableSpec {
    table: "pastoral_requests",
    columns: &["id", "name", "description", "requested_at", "status"],
    delete_one: "DELETE FROM pastoral_requests WHERE id = ?1",
    delete_all: "DELETE FROM pastoral_requests",
};

static TRANSACTIONS: TableSpec = TableSpec {
    table: "transactions",
    columns: &["id", "direction", "category", "amount", "date", "note"],
    delete_one: "DELETE FROM transactions WHERE id = ?1",
    delete_all: "DELETE FROM transactions",
};

fn table_spec(kind: RecordKind) -> &'static TableSpec {
    match kind {
        RecordKind::Member => &MEMBERS,
        RecordKind::PastoralRequest => &PASTORAL_REQUESTS,
        RecordKind::Transaction => &TRANSACTIONS,
    }
}

/// Input for [`SqliteRecordStore::insert`].
pub trait NewRecord {
    const KIND: RecordKind;
    const INSERT_SQL: &'static str;

    fn validate(&self) -> Result<(), RegistryError>;

    /// Column values in `INSERT_SQL` parameter order.
    fn bind(&self, recorded_at: OffsetDateTime) -> Result<Vec<Value>>;
}

/// Row type returned by [`SqliteRecordStore::list_all`].
pub trait StoredRecord: Sized {
    const KIND: RecordKind;
    /// Selects every row, most recent first.
    const SELECT_ALL_SQL: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl NewRecord for NewMember {
    const KIND: RecordKind = RecordKind::Member;
    const INSERT_SQL: &'static str = "INSERT INTO members(
            name, marital_status, age, bracket, residence,
            baptized, years_in_congregation, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

    fn validate(&self) -> Result<(), RegistryError> {
        NewMember::validate(self)
    }

    fn bind(&self, recorded_at: OffsetDateTime) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.name.clone()),
            Value::Text(self.marital_status.as_str().to_string()),
            Value::Integer(i64::from(self.age)),
            Value::Text(self.bracket().as_str().to_string()),
            Value::Text(self.residence.clone()),
            Value::Text(self.baptized.as_str().to_string()),
            Value::Integer(i64::from(self.years_in_congregation)),
            Value::Text(format_timestamp(recorded_at)?),
        ])
    }
}

impl NewRecord for NewPastoralRequest {
    const KIND: RecordKind = RecordKind::PastoralRequest;
    const INSERT_SQL: &'static str = "INSERT INTO pastoral_requests(
            name, description, requested_at, status
         ) VALUES (?1, ?2, ?3, 'pending')";

    fn validate(&self) -> Result<(), RegistryError> {
        NewPastoralRequest::validate(self)
    }

    fn bind(&self, recorded_at: OffsetDateTime) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.name.clone()),
            Value::Text(self.description.clone()),
            Value::Text(format_timestamp(recorded_at)?),
        ])
    }
}

impl NewRecord for NewTransaction {
    const KIND: RecordKind = RecordKind::Transaction;
    const INSERT_SQL: &'static str = "INSERT INTO transactions(
            direction, category, amount, date, note
         ) VALUES (?1, ?2, ?3, ?4, ?5)";

    fn validate(&self) -> Result<(), RegistryError> {
        NewTransaction::validate(self)
    }

    fn bind(&self, _recorded_at: OffsetDateTime) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(self.direction.as_str().to_string()),
            Value::Text(self.category.clone()),
            Value::Real(self.amount),
            Value::Text(format_date(self.date)?),
            Value::Text(self.note.clone()),
        ])
    }
}

impl StoredRecord for Member {
    const KIND: RecordKind = RecordKind::Member;
    const SELECT_ALL_SQL: &'static str = "SELECT
            id, name, marital_status, age, bracket, residence,
            baptized, years_in_congregation, created_at
         FROM members
         ORDER BY created_at DESC, id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let marital_status_raw: String = row.get(2)?;
        let bracket_raw: String = row.get(4)?;
        let baptized_raw: String = row.get(6)?;
        let created_at_raw: String = row.get(8)?;

        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            marital_status: decode_code(
                2,
                &marital_status_raw,
                "marital_status",
                MaritalStatus::parse,
            )?,
            age: decode_u32(3, row.get(3)?, "age")?,
            bracket: decode_code(4, &bracket_raw, "bracket", AgeBracket::parse)?,
            residence: row.get(5)?,
            baptized: decode_code(6, &baptized_raw, "baptized", Baptized::parse)?,
            years_in_congregation: decode_u32(7, row.get(7)?, "years_in_congregation")?,
            created_at: decode_timestamp(8, &created_at_raw)?,
        })
    }
}

impl StoredRecord for PastoralRequest {
    const KIND: RecordKind = RecordKind::PastoralRequest;
    const SELECT_ALL_SQL: &'static str = "SELECT id, name, description, requested_at, status
         FROM pastoral_requests
         ORDER BY requested_at DESC, id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let requested_at_raw: String = row.get(3)?;
        let status_raw: String = row.get(4)?;

        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            requested_at: decode_timestamp(3, &requested_at_raw)?,
            status: decode_code(4, &status_raw, "status", RequestStatus::parse)?,
        })
    }
}

impl StoredRecord for Transaction {
    const KIND: RecordKind = RecordKind::Transaction;
    const SELECT_ALL_SQL: &'static str = "SELECT id, direction, category, amount, date, note
         FROM transactions
         ORDER BY date DESC, id DESC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let direction_raw: String = row.get(1)?;
        let date_raw: String = row.get(4)?;

        Ok(Self {
            id: row.get(0)?,
            direction: decode_code(1, &direction_raw, "direction", Direction::parse)?,
            category: row.get(2)?,
            amount: row.get(3)?,
            date: decode_date(4, &date_raw)?,
            note: row.get(5)?,
        })
    }
}

/// Record store over a single `SQLite` file.
///
/// No connection is held between calls: every operation opens the database,
/// runs as one atomic statement or transaction, and closes it again.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    path: PathBuf,
}

impl SqliteRecordStore {
    /// Checks that the database at `path` can be opened and returns a handle.
    ///
    /// Failures carry [`RegistryError::StorageUnavailable`].
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self {
            path: path.to_path_buf(),
        };
        drop(store.connect()?);
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the three record tables, their indexes and guard triggers when
    /// missing, then verifies that every declared column is present. Existing
    /// rows are left untouched.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA_TABLES_V1)
            .context("failed to create registry tables")?;

        for kind in RecordKind::ALL {
            let spec = table_spec(kind);
            ensure_table_has_columns(&conn, spec.table, spec.columns)?;
        }

        conn.execute_batch(SCHEMA_GUARDS_V1)
            .context("failed to create registry indexes and triggers")?;

        info!(path = %self.path.display(), "registry schema ensured");
        Ok(())
    }

    /// Validates and appends a record stamped with the current time.
    pub fn insert<R: NewRecord>(&self, record: &R) -> Result<i64> {
        self.insert_at(record, now_utc())
    }

    /// Validates and appends a record with an explicit creation timestamp, for
    /// imports of historical data. Transactions carry no creation timestamp
    /// and ignore it.
    ///
    /// Storage keeps whole microseconds, so `recorded_at` is truncated with
    /// [`truncate_to_micros`] before it is written and reads back truncated.
    pub fn insert_at<R: NewRecord>(&self, record: &R, recorded_at: OffsetDateTime) -> Result<i64> {
        record
            .validate()
            .with_context(|| format!("{} validation failed", R::KIND.as_str()))?;
        let values = record.bind(truncate_to_micros(recorded_at))?;

        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("failed to start insert transaction")?;
        tx.execute(R::INSERT_SQL, params_from_iter(values))
            .with_context(|| format!("failed to insert {}", R::KIND.as_str()))?;
        let id = tx.last_insert_rowid();
        tx.commit().context("failed to commit insert transaction")?;

        debug!(kind = R::KIND.as_str(), id, "record inserted");
        Ok(id)
    }

    /// Reads every record of `R`, most recent first.
    pub fn list_all<R: StoredRecord>(&self) -> Result<Vec<R>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(R::SELECT_ALL_SQL)?;
        let rows = stmt.query_map([], R::from_row)?;
        let records = collect_rows(rows)
            .with_context(|| format!("failed to read {} records", R::KIND.as_str()))?;
        Ok(records)
    }

    /// Moves a pastoral request to attended. Returns `false` when no request
    /// has the given id.
    pub fn mark_request_attended(&self, id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn
            .execute(
                "UPDATE pastoral_requests SET status = ?1 WHERE id = ?2",
                params![RequestStatus::Attended.as_str(), id],
            )
            .context("failed to update pastoral request status")?;

        if changed == 0 {
            debug!(id, "pastoral request not found; status unchanged");
        } else {
            info!(id, "pastoral request marked attended");
        }
        Ok(changed > 0)
    }

    /// Removes one record. Returns `false` when it was already absent.
    pub fn delete(&self, kind: RecordKind, id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let removed = conn
            .execute(table_spec(kind).delete_one, params![id])
            .with_context(|| format!("failed to delete {} {}", kind.as_str(), id))?;

        if removed > 0 {
            info!(kind = kind.as_str(), id, "record deleted");
        }
        Ok(removed > 0)
    }

    /// Removes every record of `kind` and returns how many were removed.
    pub fn clear(&self, kind: RecordKind) -> Result<usize> {
        let conn = self.connect()?;
        let removed = conn
            .execute(table_spec(kind).delete_all, [])
            .with_context(|| format!("failed to clear {} records", kind.as_str()))?;

        warn!(kind = kind.as_str(), removed, "record store cleared");
        Ok(removed)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(|err| {
            anyhow::Error::new(RegistryError::StorageUnavailable(format!(
                "failed to open sqlite database at {}: {err}",
                self.path.display()
            )))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|err| {
            anyhow::Error::new(RegistryError::StorageUnavailable(format!(
                "failed to configure sqlite database at {}: {err}",
                self.path.display()
            )))
        })?;

        Ok(conn)
    }

    #[cfg(test)]
    fn connection(&self) -> Result<Connection> {
        self.connect()
    }
}

fn decode_code<T>(
    index: usize,
    raw: &str,
    field: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| invalid_column(index, Type::Text, format!("invalid {field}: {raw}")))
}

fn decode_u32(index: usize, raw: i64, field: &str) -> rusqlite::Result<u32> {
    u32::try_from(raw)
        .map_err(|_| invalid_column(index, Type::Integer, format!("invalid {field}: {raw}")))
}

fn decode_timestamp(index: usize, raw: &str) -> rusqlite::Result<OffsetDateTime> {
    parse_timestamp(raw).map_err(|err| to_sql_error(index, &err))
}

fn decode_date(index: usize, raw: &str) -> rusqlite::Result<Date> {
    parse_date(raw).map_err(|err| to_sql_error(index, &err))
}

fn invalid_column(index: usize, column_type: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        column_type,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn to_sql_error(index: usize, err: &RegistryError) -> rusqlite::Error {
    invalid_column(index, Type::Text, err.to_string())
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1
             LIMIT 1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .context("failed to query sqlite_master")?
        .is_some();

    Ok(exists)
}

fn ensure_table_has_columns(conn: &Connection, table_name: &str, columns: &[&str]) -> Result<()> {
    if !table_exists(conn, table_name)? {
        return Err(anyhow!("registry schema check failed: missing table {table_name}"));
    }

    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .with_context(|| format!("failed to inspect table_info for {table_name}"))?;
    let mut rows = stmt.query(params![table_name])?;

    let mut available = Vec::new();
    while let Some(row) = rows.next()? {
        available.push(row.get::<_, String>(0)?);
    }

    for required in columns {
        if !available.iter().any(|candidate| candidate == required) {
            return Err(anyhow::Error::new(RegistryError::Configuration(format!(
                "registry schema check failed: missing column {table_name}.{required}"
            ))));
        }
    }

    Ok(())
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
