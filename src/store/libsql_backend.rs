//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Workflow writes run inside
//! a transaction on the shared connection; an async mutex keeps two
//! transactions from interleaving on it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{Document, Employee, StagedDocument, StagedProfile};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn fetch_employee(
        conn: &Connection,
        column: &str,
        value: String,
    ) -> Result<Option<Employee>, DatabaseError> {
        let mut rows = conn
            .query(
                &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE {column} = ?1"),
                params![value],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_employee: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let employee = row_to_employee(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_employee row parse: {e}")))?;
                Ok(Some(employee))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_employee: {e}"))),
        }
    }

    /// Statements of a profile commit, run inside the caller's transaction.
    async fn write_commit(
        conn: &Connection,
        employee_id: Uuid,
        profile: &StagedProfile,
        documents: &[StagedDocument],
        submitted_at: DateTime<Utc>,
    ) -> Result<Employee, DatabaseError> {
        let submitted_at = submitted_at.to_rfc3339();
        let updated = conn
            .execute(
                "UPDATE employees SET name = ?1, email = ?2, department = ?3, profile_image_url = ?4, is_submitted = 1, submitted_at = ?5 WHERE id = ?6 AND is_submitted = 0",
                params![
                    profile.name.as_str(),
                    profile.email.as_str(),
                    profile.department.as_str(),
                    opt_text(profile.profile_image_url.as_deref()),
                    submitted_at.as_str(),
                    employee_id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("commit_profile update", e))?;

        if updated == 0 {
            return match Self::fetch_employee(conn, "id", employee_id.to_string()).await? {
                Some(_) => Err(DatabaseError::Constraint(format!(
                    "employee {employee_id} is already submitted"
                ))),
                None => Err(DatabaseError::NotFound {
                    entity: "employee".into(),
                    id: employee_id.to_string(),
                }),
            };
        }

        for doc in documents {
            conn.execute(
                "INSERT INTO documents (id, employee_id, file_url, file_name, file_type, uploaded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    employee_id.to_string(),
                    doc.url.as_str(),
                    doc.name.as_str(),
                    doc.file_type.as_str(),
                    submitted_at.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("commit_profile document", e))?;
        }

        Self::fetch_employee(conn, "id", employee_id.to_string())
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "employee".into(),
                id: employee_id.to_string(),
            })
    }

    /// Statements of a profile reset, run inside the caller's transaction.
    async fn write_reset(conn: &Connection, employee_id: Uuid) -> Result<(), DatabaseError> {
        let removed = conn
            .execute(
                "DELETE FROM documents WHERE employee_id = ?1",
                params![employee_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("reset_profile documents", e))?;

        let updated = conn
            .execute(
                "UPDATE employees SET name = NULL, department = NULL, profile_image_url = NULL, is_submitted = 0, submitted_at = NULL WHERE id = ?1",
                params![employee_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("reset_profile update", e))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "employee".into(),
                id: employee_id.to_string(),
            });
        }

        debug!(employee_id = %employee_id, documents = removed, "Profile rows reset");
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

const EMPLOYEE_COLUMNS: &str =
    "id, user_id, name, email, department, profile_image_url, is_submitted, submitted_at, created_at";

const DOCUMENT_COLUMNS: &str = "id, employee_id, file_url, file_name, file_type, uploaded_at";

/// Map a libsql Row to an Employee (column order matches EMPLOYEE_COLUMNS).
fn row_to_employee(row: &libsql::Row) -> Result<Employee, libsql::Error> {
    let id_str: String = row.get(0)?;
    let submitted: i64 = row.get(6)?;
    let submitted_at: Option<String> = row.get(7).ok();
    let created_str: String = row.get(8)?;

    Ok(Employee {
        id: parse_uuid(&id_str),
        user_id: row.get(1)?,
        name: row.get(2).ok(),
        email: row.get(3)?,
        department: row.get(4).ok(),
        profile_image_url: row.get(5).ok(),
        is_submitted: submitted != 0,
        submitted_at: parse_optional_datetime(&submitted_at),
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a Document (column order matches DOCUMENT_COLUMNS).
fn row_to_document(row: &libsql::Row) -> Result<Document, libsql::Error> {
    let id_str: String = row.get(0)?;
    let employee_str: String = row.get(1)?;
    let uploaded_str: String = row.get(5)?;

    Ok(Document {
        id: parse_uuid(&id_str),
        employee_id: parse_uuid(&employee_str),
        file_url: row.get(2)?,
        file_name: row.get(3)?,
        file_type: row.get(4)?,
        uploaded_at: parse_datetime(&uploaded_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Employees ───────────────────────────────────────────────────

    async fn create_employee(&self, user_id: &str, email: &str) -> Result<Employee, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let employee = Employee::new(user_id, email);

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO employees ({EMPLOYEE_COLUMNS}) VALUES (?1, ?2, NULL, ?3, NULL, NULL, 0, NULL, ?4)"
                ),
                params![
                    employee.id.to_string(),
                    employee.user_id.as_str(),
                    employee.email.as_str(),
                    employee.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::from_libsql("create_employee", e))?;

        info!(user_id = %user_id, employee_id = %employee.id, "Employee provisioned");
        Ok(employee)
    }

    async fn get_employee_by_user(&self, user_id: &str) -> Result<Option<Employee>, DatabaseError> {
        Self::fetch_employee(self.conn(), "user_id", user_id.to_string()).await
    }

    async fn get_employee_by_email(&self, email: &str) -> Result<Option<Employee>, DatabaseError> {
        Self::fetch_employee(self.conn(), "email", email.to_string()).await
    }

    async fn list_employees(&self) -> Result<Vec<Employee>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees ORDER BY created_at ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_employees: {e}")))?;

        let mut employees = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_employee(&row) {
                Ok(employee) => employees.push(employee),
                Err(e) => warn!("Skipping employee row: {e}"),
            }
        }
        Ok(employees)
    }

    // ── Documents ───────────────────────────────────────────────────

    async fn list_documents(&self, employee_id: Uuid) -> Result<Vec<Document>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE employee_id = ?1 ORDER BY uploaded_at ASC, rowid ASC"
                ),
                params![employee_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_documents: {e}")))?;

        let mut documents = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_document(&row) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!("Skipping document row: {e}"),
            }
        }
        Ok(documents)
    }

    // ── Workflow writes ─────────────────────────────────────────────

    async fn commit_profile(
        &self,
        employee_id: Uuid,
        profile: &StagedProfile,
        documents: &[StagedDocument],
        submitted_at: DateTime<Utc>,
    ) -> Result<Employee, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("commit_profile begin: {e}")))?;

        match Self::write_commit(&tx, employee_id, profile, documents, submitted_at).await {
            Ok(employee) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("commit_profile commit: {e}")))?;
                info!(
                    employee_id = %employee_id,
                    documents = documents.len(),
                    "Profile committed"
                );
                Ok(employee)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(employee_id = %employee_id, "Rollback failed: {rb}");
                }
                Err(e)
            }
        }
    }

    async fn reset_profile(&self, employee_id: Uuid) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("reset_profile begin: {e}")))?;

        match Self::write_reset(&tx, employee_id).await {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| DatabaseError::Query(format!("reset_profile commit: {e}"))),
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(employee_id = %employee_id, "Rollback failed: {rb}");
                }
                Err(e)
            }
        }
    }
}
