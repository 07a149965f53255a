use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{LogRecord, Requester, Requirement, Role, User, VerificationStatus};
use crate::store::ProgressStore;

const LOG_SELECT: &str = r#"
    SELECT le.id, le.intern_id, u.full_name AS intern_name,
           p.id AS procedure_id, p.name AS procedure_name,
           r.id AS rotation_id, r.name AS rotation_name,
           le.performed_at, le.count, le.notes, le.created_at,
           v.status, vu.full_name AS verifier_name, v.verified_at, v.reason
    FROM intern_progress.log_entries le
    JOIN intern_progress.users u ON u.id = le.intern_id
    JOIN intern_progress.procedures p ON p.id = le.procedure_id
    JOIN intern_progress.rotations r ON r.id = p.rotation_id
    JOIN intern_progress.verifications v ON v.log_entry_id = le.id
    LEFT JOIN intern_progress.users vu ON vu.id = v.verifier_id
"#;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed [`ProgressStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        role: role.parse()?,
    })
}

fn log_from_row(row: &PgRow) -> anyhow::Result<LogRecord> {
    let status: String = row.try_get("status")?;
    Ok(LogRecord {
        id: row.try_get("id")?,
        intern_id: row.try_get("intern_id")?,
        intern_name: row.try_get("intern_name")?,
        procedure_id: row.try_get("procedure_id")?,
        procedure_name: row.try_get("procedure_name")?,
        rotation_id: row.try_get("rotation_id")?,
        rotation_name: row.try_get("rotation_name")?,
        performed_at: row.try_get("performed_at")?,
        count: row.try_get("count")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        status: status.parse()?,
        verifier_name: row.try_get("verifier_name")?,
        verified_at: row.try_get("verified_at")?,
        reason: row.try_get("reason")?,
    })
}

impl ProgressStore for PgStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role FROM intern_progress.users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_interns(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, full_name, email, role
            FROM intern_progress.users
            WHERE role = 'INTERN'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn active_requirements(&self) -> anyhow::Result<Vec<Requirement>> {
        let rows = sqlx::query(
            r#"
            SELECT rq.rotation_id, r.name AS rotation_name,
                   rq.procedure_id, p.name AS procedure_name,
                   rq.min_count, rq.training_level
            FROM intern_progress.requirements rq
            JOIN intern_progress.rotations r ON r.id = rq.rotation_id
            JOIN intern_progress.procedures p ON p.id = rq.procedure_id
            WHERE r.is_active
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut requirements = Vec::with_capacity(rows.len());
        for row in rows {
            requirements.push(Requirement {
                rotation_id: row.try_get("rotation_id")?,
                rotation_name: row.try_get("rotation_name")?,
                procedure_id: row.try_get("procedure_id")?,
                procedure_name: row.try_get("procedure_name")?,
                min_count: row.try_get("min_count")?,
                training_level: row.try_get("training_level")?,
            });
        }
        Ok(requirements)
    }

    async fn logs_for_intern(&self, intern_id: Uuid) -> anyhow::Result<Vec<LogRecord>> {
        let query = format!("{LOG_SELECT} WHERE le.intern_id = $1");
        let rows = sqlx::query(&query)
            .bind(intern_id)
            .fetch_all(&self.pool)
            .await?;
        debug!(%intern_id, rows = rows.len(), "fetched intern logs");
        rows.iter().map(log_from_row).collect()
    }

    async fn all_logs(&self) -> anyhow::Result<Vec<LogRecord>> {
        let rows = sqlx::query(LOG_SELECT).fetch_all(&self.pool).await?;
        rows.iter().map(log_from_row).collect()
    }
}

async fn upsert_user(pool: &PgPool, name: &str, email: &str, role: Role) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO intern_progress.users (id, full_name, email, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn upsert_rotation(pool: &PgPool, name: &str, is_active: bool) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO intern_progress.rotations (id, name, is_active)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE SET is_active = EXCLUDED.is_active
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(is_active)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn upsert_required_procedure(
    pool: &PgPool,
    rotation_id: Uuid,
    name: &str,
    min_count: i32,
) -> anyhow::Result<Uuid> {
    let procedure_id: Uuid = sqlx::query(
        r#"
        INSERT INTO intern_progress.procedures (id, rotation_id, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (rotation_id, name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(rotation_id)
    .bind(name)
    .fetch_one(pool)
    .await?
    .try_get("id")?;

    sqlx::query(
        r#"
        INSERT INTO intern_progress.requirements (id, rotation_id, procedure_id, min_count)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (rotation_id, procedure_id) DO UPDATE SET min_count = EXCLUDED.min_count
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(rotation_id)
    .bind(procedure_id)
    .bind(min_count)
    .execute(pool)
    .await?;

    Ok(procedure_id)
}

struct NewLogEntry<'a> {
    source_key: &'a str,
    intern_id: Uuid,
    procedure_id: Uuid,
    performed_at: DateTime<Utc>,
    count: i32,
    notes: Option<&'a str>,
}

/// Inserts a log entry together with its PENDING verification. Returns the
/// new entry id, or `None` when the source key was already imported.
async fn insert_log(
    tx: &mut Transaction<'_, Postgres>,
    entry: &NewLogEntry<'_>,
) -> anyhow::Result<Option<Uuid>> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO intern_progress.log_entries
        (id, intern_id, procedure_id, performed_at, count, notes, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.intern_id)
    .bind(entry.procedure_id)
    .bind(entry.performed_at)
    .bind(entry.count)
    .bind(entry.notes)
    .bind(entry.source_key)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = inserted else {
        return Ok(None);
    };
    let log_entry_id: Uuid = row.try_get("id")?;

    sqlx::query(
        r#"
        INSERT INTO intern_progress.verifications (id, log_entry_id, status)
        VALUES ($1, $2, 'PENDING')
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(log_entry_id)
    .execute(&mut **tx)
    .await?;

    Ok(Some(log_entry_id))
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let noa = upsert_user(pool, "Noa Levi", "noa.levi@hospital.example", Role::Intern).await?;
    let amir = upsert_user(pool, "Amir Haddad", "amir.haddad@hospital.example", Role::Intern).await?;
    let tutor = upsert_user(pool, "Dr. Miriam Cohen", "miriam.cohen@hospital.example", Role::Tutor).await?;
    upsert_user(pool, "Eli Ben-David", "eli.bendavid@hospital.example", Role::Admin).await?;

    let icu = upsert_rotation(pool, "ICU", true).await?;
    let emergency = upsert_rotation(pool, "Emergency Medicine", true).await?;
    let pediatrics = upsert_rotation(pool, "Pediatrics", false).await?;

    let central_line = upsert_required_procedure(pool, icu, "Central line insertion", 5).await?;
    let arterial_line = upsert_required_procedure(pool, icu, "Arterial line insertion", 3).await?;
    let intubation = upsert_required_procedure(pool, emergency, "Endotracheal intubation", 2).await?;
    let suturing = upsert_required_procedure(pool, emergency, "Laceration repair", 4).await?;
    upsert_required_procedure(pool, pediatrics, "Lumbar puncture", 2).await?;

    let day = |y, m, d| -> anyhow::Result<DateTime<Utc>> {
        let date = NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?;
        Ok(Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).context("invalid time")?))
    };

    let logs = vec![
        ("seed-001", noa, central_line, day(2026, 2, 2)?, 3, VerificationStatus::Approved, None),
        ("seed-002", noa, central_line, day(2026, 2, 9)?, 2, VerificationStatus::Pending, None),
        ("seed-003", noa, intubation, day(2026, 2, 12)?, 5, VerificationStatus::Approved, None),
        (
            "seed-004",
            noa,
            arterial_line,
            day(2026, 2, 15)?,
            1,
            VerificationStatus::Rejected,
            Some("No supervising physician recorded"),
        ),
        ("seed-005", amir, suturing, day(2026, 1, 28)?, 2, VerificationStatus::Approved, None),
        ("seed-006", amir, intubation, day(2026, 2, 3)?, 1, VerificationStatus::Pending, None),
    ];

    let tutor_requester = Requester {
        id: tutor,
        role: Role::Tutor,
    };

    for (source_key, intern_id, procedure_id, performed_at, count, status, reason) in logs {
        let mut tx = pool.begin().await?;
        let entry = NewLogEntry {
            source_key,
            intern_id,
            procedure_id,
            performed_at,
            count,
            notes: None,
        };
        if let Some(log_entry_id) = insert_log(&mut tx, &entry).await? {
            if status != VerificationStatus::Pending {
                record_verification(
                    &mut *tx,
                    log_entry_id,
                    &tutor_requester,
                    status,
                    reason,
                    performed_at + Duration::days(1),
                )
                .await?;
            }
        }
        tx.commit().await?;
    }

    info!("seed data loaded");
    Ok(())
}

/// One log entry as it appears in an import file.
#[derive(Debug, serde::Deserialize)]
pub struct ImportRow {
    pub intern_email: String,
    pub rotation: String,
    pub procedure: String,
    pub date: NaiveDate,
    pub count: i32,
    pub notes: Option<String>,
    pub source_key: Option<String>,
}

/// Reads and validates every record before anything touches the database.
pub fn parse_import<R: std::io::Read>(input: R) -> anyhow::Result<Vec<ImportRow>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut rows = Vec::new();

    for (line, result) in reader.deserialize::<ImportRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV record {}", line + 1))?;
        if row.count <= 0 {
            anyhow::bail!("record {}: count must be positive", line + 1);
        }
        if row.rotation.trim().is_empty() || row.procedure.trim().is_empty() {
            anyhow::bail!("record {}: rotation and procedure are required", line + 1);
        }
        rows.push(row);
    }

    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = parse_import(file)?;
    let mut inserted = 0usize;

    for (line, row) in rows.into_iter().enumerate() {
        let intern_id: Uuid = sqlx::query(
            "SELECT id FROM intern_progress.users WHERE email = $1 AND role = 'INTERN'",
        )
        .bind(&row.intern_email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("record {}: no intern with email {}", line + 1, row.intern_email))?
        .try_get("id")?;

        // Procedure names are only unique within a rotation.
        let procedure_id: Uuid = sqlx::query(
            r#"
            SELECT p.id
            FROM intern_progress.procedures p
            JOIN intern_progress.rotations r ON r.id = p.rotation_id
            WHERE r.name = $1 AND p.name = $2
            "#,
        )
        .bind(row.rotation.trim())
        .bind(row.procedure.trim())
        .fetch_optional(pool)
        .await?
        .with_context(|| {
            format!(
                "record {}: unknown procedure {} in rotation {}",
                line + 1,
                row.procedure,
                row.rotation
            )
        })?
        .try_get("id")?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let performed_at = Utc.from_utc_datetime(&row.date.and_hms_opt(12, 0, 0).context("invalid time")?);

        let mut tx = pool.begin().await?;
        let entry = NewLogEntry {
            source_key: &source_key,
            intern_id,
            procedure_id,
            performed_at,
            count: row.count,
            notes: row.notes.as_deref(),
        };
        if insert_log(&mut tx, &entry).await?.is_some() {
            inserted += 1;
        }
        tx.commit().await?;
    }

    info!(inserted, path = %csv_path.display(), "imported log entries");
    Ok(inserted)
}

fn validate_decision(verifier: &Requester, status: VerificationStatus) -> anyhow::Result<()> {
    if !verifier.role.can_review() {
        anyhow::bail!("{} {} may not verify log entries", verifier.role, verifier.id);
    }
    if status == VerificationStatus::Pending {
        anyhow::bail!("a verification decision must be APPROVED or REJECTED");
    }
    Ok(())
}

/// Records a reviewer's decision on a PENDING log entry.
pub async fn record_verification(
    conn: &mut PgConnection,
    log_entry_id: Uuid,
    verifier: &Requester,
    status: VerificationStatus,
    reason: Option<&str>,
    verified_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    validate_decision(verifier, status)?;

    let result = sqlx::query(
        r#"
        UPDATE intern_progress.verifications
        SET status = $2, reason = $3, verifier_id = $4, verified_at = $5
        WHERE log_entry_id = $1 AND status = 'PENDING'
        "#,
    )
    .bind(log_entry_id)
    .bind(status.as_str())
    .bind(reason)
    .bind(verifier.id)
    .bind(verified_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("log entry {log_entry_id} not found or already verified");
    }

    info!(%log_entry_id, verifier = %verifier.id, %status, "recorded verification");
    Ok(())
}
