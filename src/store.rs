//! Persistence seam shared by ingestion, clustering and reporting.
//!
//! Each institute is an independent partition: its feedback list, its latest
//! committed cluster set and its registry record. Cluster sets are only ever
//! replaced whole, so readers see either the previous or the next set.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{ClusterSet, FeedbackItem, Institute};

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn insert_feedback(&self, item: &FeedbackItem) -> anyhow::Result<()>;

    /// Feedback for one institute in submission order.
    async fn list_feedback(&self, institute_id: &str) -> anyhow::Result<Vec<FeedbackItem>>;

    async fn latest_clusters(&self, institute_id: &str) -> anyhow::Result<Option<ClusterSet>>;

    /// Replace every cluster of `set.institute_id` in a single commit.
    async fn replace_clusters(&self, set: &ClusterSet) -> anyhow::Result<()>;

    /// Returns false when an institute with the same id already exists.
    async fn insert_institute(&self, institute: &Institute) -> anyhow::Result<bool>;

    async fn find_institute(&self, id: &str) -> anyhow::Result<Option<Institute>>;
}

#[derive(Default)]
struct MemoryData {
    feedback: HashMap<String, Vec<FeedbackItem>>,
    clusters: HashMap<String, ClusterSet>,
    institutes: HashMap<String, Institute>,
}

/// Process-local store used when no `DATABASE_URL` is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn insert_feedback(&self, item: &FeedbackItem) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        data.feedback
            .entry(item.institute_id.clone())
            .or_default()
            .push(item.clone());
        Ok(())
    }

    async fn list_feedback(&self, institute_id: &str) -> anyhow::Result<Vec<FeedbackItem>> {
        let data = self.data.read().await;
        Ok(data.feedback.get(institute_id).cloned().unwrap_or_default())
    }

    async fn latest_clusters(&self, institute_id: &str) -> anyhow::Result<Option<ClusterSet>> {
        let data = self.data.read().await;
        Ok(data.clusters.get(institute_id).cloned())
    }

    async fn replace_clusters(&self, set: &ClusterSet) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        data.clusters.insert(set.institute_id.clone(), set.clone());
        Ok(())
    }

    async fn insert_institute(&self, institute: &Institute) -> anyhow::Result<bool> {
        let mut data = self.data.write().await;
        if data.institutes.contains_key(&institute.id) {
            return Ok(false);
        }
        data.institutes
            .insert(institute.id.clone(), institute.clone());
        Ok(true)
    }

    async fn find_institute(&self, id: &str) -> anyhow::Result<Option<Institute>> {
        let data = self.data.read().await;
        Ok(data.institutes.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::Role;

    fn item(institute_id: &str, text: &str) -> FeedbackItem {
        FeedbackItem {
            id: Uuid::new_v4(),
            institute_id: institute_id.to_string(),
            role: Role::Student,
            user_name: "Anonymous".to_string(),
            category: "facilities".to_string(),
            text: text.to_string(),
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn feedback_is_scoped_by_institute() {
        let store = MemoryStore::new();
        store.insert_feedback(&item("A", "one")).await.unwrap();
        store.insert_feedback(&item("A", "two")).await.unwrap();
        store.insert_feedback(&item("B", "three")).await.unwrap();

        let a = store.list_feedback("A").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].text, "one");
        assert_eq!(store.list_feedback("B").await.unwrap().len(), 1);
        assert!(store.list_feedback("C").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_institute_is_rejected() {
        let store = MemoryStore::new();
        let institute = Institute {
            id: "AITS-1".to_string(),
            name: "AITS".to_string(),
            email: "admin@aits.edu".to_string(),
            address: "Campus Road".to_string(),
            admin_id: "admin".to_string(),
            password_hash: "x".to_string(),
            created_at: Utc::now(),
        };
        assert!(store.insert_institute(&institute).await.unwrap());
        assert!(!store.insert_institute(&institute).await.unwrap());
    }
}
