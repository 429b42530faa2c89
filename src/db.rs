use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AttendanceEvent, StudentRecord, SubjectRef};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("8a9c31f2-5d44-4b6e-9d27-1f3a8c55e0b1")?,
            "Priya Nair",
            "priya.nair@brookfield.example",
            184,
            171,
        ),
        (
            Uuid::parse_str("4be07d21-6c3f-49aa-b1e4-92d84f0c6a55")?,
            "Marcus Webb",
            "marcus.webb@brookfield.example",
            190,
            122,
        ),
        (
            Uuid::parse_str("c6d1aa90-08e2-47f5-8b3a-7e55c2d9c4f8")?,
            "Sofia Ramos",
            "sofia.ramos@brookfield.example",
            0,
            0,
        ),
    ];

    for (id, name, email, total, attended) in students {
        sqlx::query(
            r#"
            INSERT INTO attendance_insights.students (id, full_name, email, total_classes, attended_classes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                total_classes = EXCLUDED.total_classes,
                attended_classes = EXCLUDED.attended_classes
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(total)
        .bind(attended)
        .fetch_one(pool)
        .await?;
    }

    let subjects = vec![
        ("MATH", "Mathematics"),
        ("PHY", "Physics"),
        ("CHEM", "Chemistry"),
        ("ENG", "English"),
    ];

    for (code, name) in subjects {
        sqlx::query(
            r#"
            INSERT INTO attendance_insights.subjects (code, name)
            VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(code)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let enrollments = vec![
        ("priya.nair@brookfield.example", "MATH"),
        ("priya.nair@brookfield.example", "PHY"),
        ("priya.nair@brookfield.example", "CHEM"),
        ("marcus.webb@brookfield.example", "MATH"),
        ("marcus.webb@brookfield.example", "ENG"),
        ("sofia.ramos@brookfield.example", "MATH"),
        ("sofia.ramos@brookfield.example", "PHY"),
    ];

    for (email, code) in enrollments {
        sqlx::query(
            r#"
            INSERT INTO attendance_insights.enrollments (student_id, subject_code)
            SELECT id, $2 FROM attendance_insights.students WHERE email = $1
            ON CONFLICT (student_id, subject_code) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(code)
        .execute(pool)
        .await?;
    }

    let events = vec![
        (
            "seed-001",
            "priya.nair@brookfield.example",
            Some("MATH"),
            Some("Mathematics"),
            "present",
            NaiveDate::from_ymd_opt(2026, 7, 27).context("invalid date")?,
        ),
        (
            "seed-002",
            "priya.nair@brookfield.example",
            Some("MATH"),
            Some("Mathematics"),
            "late",
            NaiveDate::from_ymd_opt(2026, 7, 27).context("invalid date")?,
        ),
        (
            "seed-003",
            "priya.nair@brookfield.example",
            Some("PHY"),
            Some("Physics"),
            "absent",
            NaiveDate::from_ymd_opt(2026, 7, 28).context("invalid date")?,
        ),
        (
            "seed-004",
            "priya.nair@brookfield.example",
            Some("CHEM"),
            Some("Chemistry"),
            "present",
            NaiveDate::from_ymd_opt(2026, 7, 30).context("invalid date")?,
        ),
        (
            "seed-005",
            "priya.nair@brookfield.example",
            None,
            Some("Homeroom"),
            "present",
            NaiveDate::from_ymd_opt(2026, 8, 3).context("invalid date")?,
        ),
        (
            "seed-006",
            "marcus.webb@brookfield.example",
            Some("MATH"),
            Some("Mathematics"),
            "absent",
            NaiveDate::from_ymd_opt(2026, 7, 29).context("invalid date")?,
        ),
        (
            "seed-007",
            "marcus.webb@brookfield.example",
            Some("ENG"),
            Some("English"),
            "late",
            NaiveDate::from_ymd_opt(2026, 8, 3).context("invalid date")?,
        ),
        (
            "seed-008",
            "marcus.webb@brookfield.example",
            Some("MATH"),
            Some("Mathematics"),
            "present",
            NaiveDate::from_ymd_opt(2026, 8, 4).context("invalid date")?,
        ),
    ];

    for (source_key, email, subject_code, subject_name, status, occurred_on) in events {
        let student_id: Uuid = sqlx::query(
            "SELECT id FROM attendance_insights.students WHERE email = $1",
        )
        .bind(email)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO attendance_insights.attendance_events
            (id, student_id, occurred_on, subject_code, subject_name, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(occurred_on)
        .bind(subject_code)
        .bind(subject_name)
        .bind(status)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn fetch_student(pool: &PgPool, email: &str) -> anyhow::Result<Option<StudentRecord>> {
    let Some(row) = sqlx::query(
        "SELECT id, full_name, email, total_classes, attended_classes
         FROM attendance_insights.students
         WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let id: Uuid = row.get("id");
    let subject_rows = sqlx::query(
        "SELECT s.code, s.name
         FROM attendance_insights.enrollments e
         JOIN attendance_insights.subjects s ON s.code = e.subject_code
         WHERE e.student_id = $1
         ORDER BY s.code",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let subjects = subject_rows
        .iter()
        .map(|subject| SubjectRef {
            code: subject.get("code"),
            name: subject.get("name"),
        })
        .collect();

    Ok(Some(StudentRecord {
        id,
        full_name: row.get("full_name"),
        email: row.get("email"),
        total_classes: row.get("total_classes"),
        attended_classes: row.get("attended_classes"),
        subjects,
    }))
}

pub async fn fetch_events(
    pool: &PgPool,
    student_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<AttendanceEvent>> {
    let rows = sqlx::query(
        "SELECT occurred_on, subject_code, subject_name, status
         FROM attendance_insights.attendance_events
         WHERE student_id = $1 AND occurred_on >= $2 AND occurred_on <= $3",
    )
    .bind(student_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    let mut events = Vec::new();
    for row in rows {
        events.push(AttendanceEvent {
            occurred_on: row.get("occurred_on"),
            subject_code: row.get("subject_code"),
            subject_name: row.get("subject_name"),
            status: row.get("status"),
        });
    }

    debug!(count = events.len(), %student_id, "fetched attendance events");
    Ok(events)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        subject_code: Option<String>,
        subject_name: Option<String>,
        status: String,
        occurred_on: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let student_id: Uuid = sqlx::query(
            r#"
            INSERT INTO attendance_insights.students (id, full_name, email, total_classes, attended_classes)
            VALUES ($1, $2, $3, 0, 0)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(&row.email)
        .fetch_one(pool)
        .await?
        .get("id");

        if let Some(code) = row.subject_code.as_deref().filter(|code| !code.trim().is_empty()) {
            sqlx::query(
                r#"
                INSERT INTO attendance_insights.subjects (code, name)
                VALUES ($1, $2)
                ON CONFLICT (code) DO NOTHING
                "#,
            )
            .bind(code)
            .bind(row.subject_name.as_deref().unwrap_or(code))
            .execute(pool)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO attendance_insights.enrollments (student_id, subject_code)
                VALUES ($1, $2)
                ON CONFLICT (student_id, subject_code) DO NOTHING
                "#,
            )
            .bind(student_id)
            .bind(code)
            .execute(pool)
            .await?;
        }

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO attendance_insights.attendance_events
            (id, student_id, occurred_on, subject_code, subject_name, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(row.occurred_on)
        .bind(&row.subject_code)
        .bind(&row.subject_name)
        .bind(&row.status)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
