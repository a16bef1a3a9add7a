use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};
use uuid::Uuid;

use crate::models::{Cluster, ClusterSet, FeedbackItem, Institute, Role};
use crate::store::FeedbackStore;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedbackStore for PgStore {
    async fn insert_feedback(&self, item: &FeedbackItem) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aits.feedback
            (id, institute_id, role, user_name, category, body, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id)
        .bind(&item.institute_id)
        .bind(item.role.as_str())
        .bind(&item.user_name)
        .bind(&item.category)
        .bind(&item.text)
        .bind(item.submitted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_feedback(&self, institute_id: &str) -> anyhow::Result<Vec<FeedbackItem>> {
        let rows = sqlx::query(
            "SELECT id, institute_id, role, user_name, category, body, submitted_at \
             FROM aits.feedback \
             WHERE institute_id = $1 \
             ORDER BY submitted_at, id",
        )
        .bind(institute_id)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.get("role");
            items.push(FeedbackItem {
                id: row.get("id"),
                institute_id: row.get("institute_id"),
                role: role.parse::<Role>().map_err(|e| anyhow!(e))?,
                user_name: row.get("user_name"),
                category: row.get("category"),
                text: row.get("body"),
                submitted_at: row.get("submitted_at"),
            });
        }

        Ok(items)
    }

    async fn latest_clusters(&self, institute_id: &str) -> anyhow::Result<Option<ClusterSet>> {
        let row = sqlx::query(
            "SELECT computed_at, clusters FROM aits.cluster_sets WHERE institute_id = $1",
        )
        .bind(institute_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let computed_at: DateTime<Utc> = row.get("computed_at");
            let Json(clusters): Json<Vec<Cluster>> = row.get("clusters");
            ClusterSet {
                institute_id: institute_id.to_string(),
                computed_at: Some(computed_at),
                clusters,
            }
        }))
    }

    async fn replace_clusters(&self, set: &ClusterSet) -> anyhow::Result<()> {
        let computed_at = set.computed_at.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO aits.cluster_runs (id, institute_id, computed_at, cluster_count, clusters)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&set.institute_id)
        .bind(computed_at)
        .bind(set.clusters.len() as i32)
        .bind(Json(&set.clusters))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO aits.cluster_sets (institute_id, computed_at, clusters)
            VALUES ($1, $2, $3)
            ON CONFLICT (institute_id) DO UPDATE
            SET computed_at = EXCLUDED.computed_at, clusters = EXCLUDED.clusters
            "#,
        )
        .bind(&set.institute_id)
        .bind(computed_at)
        .bind(Json(&set.clusters))
        .execute(&mut *tx)
        .await?;

        tx.commit().await.context("failed to commit cluster set")?;
        Ok(())
    }

    async fn insert_institute(&self, institute: &Institute) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO aits.institutes
            (id, name, email, address, admin_id, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&institute.id)
        .bind(&institute.name)
        .bind(&institute.email)
        .bind(&institute.address)
        .bind(&institute.admin_id)
        .bind(&institute.password_hash)
        .bind(institute.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_institute(&self, id: &str) -> anyhow::Result<Option<Institute>> {
        let row = sqlx::query(
            "SELECT id, name, email, address, admin_id, password_hash, created_at \
             FROM aits.institutes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Institute {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            address: row.get("address"),
            admin_id: row.get("admin_id"),
            password_hash: row.get("password_hash"),
            created_at: row.get("created_at"),
        }))
    }
}
