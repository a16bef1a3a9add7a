use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::institute::Registry;
use crate::models::{FeedbackItem, NewFeedback, NewInstitute, Role, DEFAULT_INSTITUTE};
use crate::store::FeedbackStore;

/// Validate a submission and append it to the institute's feedback.
pub async fn submit(store: &dyn FeedbackStore, input: NewFeedback) -> Result<Uuid, ServiceError> {
    let item = validate(input)?;
    store.insert_feedback(&item).await?;
    debug!(
        "Stored feedback {} for {} ({}, {})",
        item.id, item.institute_id, item.role, item.category
    );
    Ok(item.id)
}

pub fn validate(input: NewFeedback) -> Result<FeedbackItem, ServiceError> {
    let category = input.category.trim();
    let text = input.text.trim();

    if category.is_empty() {
        return Err(ServiceError::Validation("Category is required".to_string()));
    }
    if text.is_empty() {
        return Err(ServiceError::Validation("Feedback text is required".to_string()));
    }

    let role = match input.role.as_deref() {
        Some(raw) => raw.parse::<Role>().map_err(ServiceError::Validation)?,
        None => Role::Anonymous,
    };

    let submitted_at = match input.timestamp.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_timestamp(raw)?,
        _ => Utc::now(),
    };

    Ok(FeedbackItem {
        id: Uuid::new_v4(),
        institute_id: non_empty_or(input.institute_id.as_deref(), DEFAULT_INSTITUTE),
        role,
        user_name: non_empty_or(input.user_name.as_deref(), "Anonymous"),
        category: category.to_string(),
        text: text.to_string(),
        submitted_at,
    })
}

fn non_empty_or(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Accepts RFC 3339 and naive ISO-8601 timestamps (read as UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ServiceError::Validation(format!("Invalid timestamp '{raw}'")))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Import feedback rows (`category,text[,role,timestamp,user_name]`) into one institute.
pub async fn import_csv(
    store: &dyn FeedbackStore,
    csv_path: &Path,
    institute_id: &str,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        category: String,
        text: String,
        role: Option<String>,
        timestamp: Option<String>,
        user_name: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let input = NewFeedback {
            institute_id: Some(institute_id.to_string()),
            role: row.role.filter(|r| !r.trim().is_empty()),
            user_name: row.user_name,
            category: row.category,
            text: row.text,
            timestamp: row.timestamp,
        };

        match submit(store, input).await {
            Ok(_) => summary.inserted += 1,
            Err(ServiceError::Validation(reason)) => {
                warn!("Skipping CSV row {}: {reason}", line + 2);
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        "Imported {} feedback rows into {institute_id} ({} skipped)",
        summary.inserted, summary.skipped
    );
    Ok(summary)
}

/// Load the default institute and a realistic batch of campus feedback.
pub async fn seed(store: &dyn FeedbackStore) -> anyhow::Result<usize> {
    let registry = Registry::new(store);
    if registry.find(DEFAULT_INSTITUTE).await?.is_none() {
        registry
            .register(NewInstitute {
                name: "Default Institute".to_string(),
                email: "admin@default.edu".to_string(),
                address: "123 Main St".to_string(),
                code: Some(DEFAULT_INSTITUTE.to_string()),
                admin_id: "admin".to_string(),
                password: "admin".to_string(),
            })
            .await?;
    }

    let feedback = vec![
        ("Student", "course_content", "The new AI curriculum is fantastic! Loving the hands-on labs."),
        ("Student", "course_content", "Great explanation of Neural Networks in the ML class."),
        ("Student", "mess food", "The cafeteria food hygiene is really bad. I found an insect in my meal."),
        ("Student", "mess food", "Food poisoning cases are rising. Please check the mess kitchen immediately."),
        ("Student", "mess food", "Mess food quality has degraded significantly this week."),
        ("Faculty", "facilities", "Projector in Lab 3 is flickering constantly. Hinders lectures."),
        ("Faculty", "facilities", "We need more whiteboard markers in the staff room."),
        ("Staff", "safety", "Corridor lights near the library are out. Safety concern at night."),
        ("Student", "exams", "Exam schedule is too tight. Two major papers in one day."),
    ];

    let mut inserted = 0usize;
    for (role, category, text) in feedback {
        submit(
            store,
            NewFeedback {
                institute_id: Some(DEFAULT_INSTITUTE.to_string()),
                role: Some(role.to_string()),
                user_name: None,
                category: category.to_string(),
                text: text.to_string(),
                timestamp: None,
            },
        )
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn feedback(category: &str, text: &str) -> NewFeedback {
        NewFeedback {
            category: category.to_string(),
            text: text.to_string(),
            ..NewFeedback::default()
        }
    }

    #[tokio::test]
    async fn valid_submission_is_stored_with_defaults() {
        let store = MemoryStore::new();
        let id = submit(&store, feedback("wifi", "Wifi drops in the library"))
            .await
            .unwrap();

        let items = store.list_feedback(DEFAULT_INSTITUTE).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].role, Role::Anonymous);
        assert_eq!(items[0].user_name, "Anonymous");
    }

    #[tokio::test]
    async fn empty_text_is_rejected_and_not_stored() {
        let store = MemoryStore::new();
        let result = submit(&store, feedback("wifi", "   ")).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let result = submit(&store, feedback("", "Something")).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        assert!(store.list_feedback(DEFAULT_INSTITUTE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicates_create_separate_records() {
        let store = MemoryStore::new();
        let first = submit(&store, feedback("exams", "Too many exams")).await.unwrap();
        let second = submit(&store, feedback("exams", "Too many exams")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list_feedback(DEFAULT_INSTITUTE).await.unwrap().len(), 2);
    }

    #[test]
    fn timestamps_accept_rfc3339_and_naive_iso() {
        let mut input = feedback("exams", "Too many exams");
        input.timestamp = Some("2026-02-02T10:15:00.000Z".to_string());
        let item = validate(input.clone()).unwrap();
        assert_eq!(item.submitted_at.to_rfc3339(), "2026-02-02T10:15:00+00:00");

        input.timestamp = Some("2026-02-02T10:15:00.123456".to_string());
        assert!(validate(input.clone()).is_ok());

        input.timestamp = Some("yesterday".to_string());
        assert!(matches!(validate(input), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn unknown_role_is_a_validation_error() {
        let mut input = feedback("exams", "Too many exams");
        input.role = Some("Parent".to_string());
        assert!(matches!(validate(input), Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn csv_import_skips_invalid_rows() {
        let dir = std::env::temp_dir().join(format!("aits-import-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feedback.csv");
        std::fs::write(
            &path,
            "category,text,role,timestamp,user_name\n\
             wifi,Wifi is unusable in hostel B,Student,,\n\
             wifi,,Student,,\n\
             exams,Exam hall is too warm,Faculty,2026-01-30T09:00:00Z,Dr. Rao\n",
        )
        .unwrap();

        let store = MemoryStore::new();
        let summary = import_csv(&store, &path, "AITS-1").await.unwrap();
        assert_eq!(summary, ImportSummary { inserted: 2, skipped: 1 });

        let items = store.list_feedback("AITS-1").await.unwrap();
        assert_eq!(items[1].user_name, "Dr. Rao");
        assert_eq!(items[1].role, Role::Faculty);
    }

    #[tokio::test]
    async fn seed_registers_default_institute_once() {
        let store = MemoryStore::new();
        assert_eq!(seed(&store).await.unwrap(), 9);
        assert_eq!(seed(&store).await.unwrap(), 9);
        assert!(store.find_institute(DEFAULT_INSTITUTE).await.unwrap().is_some());
        assert_eq!(store.list_feedback(DEFAULT_INSTITUTE).await.unwrap().len(), 18);
    }
}
