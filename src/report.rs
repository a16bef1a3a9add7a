use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::alerts::{critical_alerts, is_critical, UrgencyLexicon};
use crate::error::ServiceError;
use crate::models::{Cluster, ClusterSet, ExportFormat, FeedbackItem, Stats};
use crate::store::FeedbackStore;

pub const EXPORT_ROUTE: &str = "/exports";

pub fn compute_stats(items: &[FeedbackItem]) -> Stats {
    let mut stats = Stats::default();

    for item in items {
        stats.total += 1;
        *stats.roles.entry(item.role.to_string()).or_insert(0) += 1;
        *stats.categories.entry(item.category.clone()).or_insert(0) += 1;
    }

    stats
}

/// Read side over committed clusters and stored feedback.
pub struct Reporter {
    store: Arc<dyn FeedbackStore>,
    lexicon: UrgencyLexicon,
    export_dir: PathBuf,
}

impl Reporter {
    pub fn new(store: Arc<dyn FeedbackStore>, lexicon: UrgencyLexicon, export_dir: PathBuf) -> Self {
        Self {
            store,
            lexicon,
            export_dir,
        }
    }

    pub async fn results(&self, institute_id: &str) -> Result<ClusterSet, ServiceError> {
        Ok(self
            .store
            .latest_clusters(institute_id)
            .await?
            .unwrap_or_else(|| ClusterSet::empty(institute_id)))
    }

    pub async fn stats(&self, institute_id: &str) -> Result<Stats, ServiceError> {
        let items = self.store.list_feedback(institute_id).await?;
        Ok(compute_stats(&items))
    }

    pub async fn critical_alerts(&self, institute_id: &str) -> Result<Vec<Cluster>, ServiceError> {
        let set = self.results(institute_id).await?;
        Ok(critical_alerts(&set.clusters, &self.lexicon))
    }

    /// Write a report file and return the URL it is served under.
    ///
    /// `supplied` lets a caller export the set it is currently displaying;
    /// otherwise the latest committed set is used.
    pub async fn export(
        &self,
        institute_id: &str,
        format: ExportFormat,
        supplied: Option<ClusterSet>,
    ) -> Result<String, ServiceError> {
        let set = match supplied.filter(|set| !set.clusters.is_empty()) {
            Some(mut set) => {
                if set.institute_id.is_empty() {
                    set.institute_id = institute_id.to_string();
                }
                set
            }
            None => self.results(institute_id).await?,
        };

        if set.clusters.is_empty() {
            return Err(ServiceError::Export(format!(
                "no analysis results for institute {institute_id}"
            )));
        }

        let body = render(&set, format, &self.lexicon)?;
        let file_name = format!(
            "{}-{}-{}.{}",
            file_safe(&set.institute_id),
            Utc::now().format("%Y%m%dT%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8],
            format.extension()
        );

        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .with_context(|| format!("creating {}", self.export_dir.display()))?;
        let path = self.export_dir.join(&file_name);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        info!(
            "Exported {} clusters for {} to {}",
            set.clusters.len(),
            set.institute_id,
            path.display()
        );
        Ok(format!("{EXPORT_ROUTE}/{file_name}"))
    }
}

fn file_safe(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "report".to_string()
    } else {
        cleaned
    }
}

pub fn render(
    set: &ClusterSet,
    format: ExportFormat,
    lexicon: &UrgencyLexicon,
) -> anyhow::Result<String> {
    match format {
        ExportFormat::Csv => build_csv_report(set, lexicon),
        ExportFormat::Markdown => Ok(build_markdown_report(set, lexicon)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(set)?),
    }
}

/// One flattened line of a CSV report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub theme: String,
    pub count: usize,
    pub problem_statement: String,
    pub primary_solution: String,
    pub sentiment: String,
    pub estimated_cost: String,
    pub required_tools: String,
    pub critical: bool,
}

pub fn build_csv_report(set: &ClusterSet, lexicon: &UrgencyLexicon) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for cluster in &set.clusters {
        let primary = cluster.solutions.first();
        writer.serialize(ReportRow {
            theme: cluster.theme.clone(),
            count: cluster.count,
            problem_statement: cluster.problem_statement.clone(),
            primary_solution: primary
                .map(|s| s.solution_title.clone())
                .unwrap_or_default(),
            sentiment: cluster.primary_sentiment().to_string(),
            estimated_cost: primary
                .and_then(|s| s.total_estimated_cost.clone())
                .unwrap_or_else(|| "N/A".to_string()),
            required_tools: primary
                .and_then(|s| s.required_tools.clone())
                .unwrap_or_default(),
            critical: is_critical(cluster, lexicon),
        })?;
    }

    let bytes = writer.into_inner().context("flushing csv report")?;
    Ok(String::from_utf8(bytes)?)
}

pub fn read_csv_report(data: &str) -> anyhow::Result<Vec<ReportRow>> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut rows = Vec::new();
    for row in reader.deserialize::<ReportRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn read_json_report(data: &str) -> anyhow::Result<ClusterSet> {
    Ok(serde_json::from_str(data)?)
}

pub fn build_markdown_report(set: &ClusterSet, lexicon: &UrgencyLexicon) -> String {
    let mut output = String::new();
    let total: usize = set.clusters.iter().map(|c| c.count).sum();
    let alerts = critical_alerts(&set.clusters, lexicon);

    let _ = writeln!(output, "# Feedback Insight Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} feedback items across {} themes{})",
        set.institute_id,
        total,
        set.clusters.len(),
        set.computed_at
            .map(|at| format!(", analysed {}", at.format("%Y-%m-%d %H:%M UTC")))
            .unwrap_or_default()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Critical Alerts");

    if alerts.is_empty() {
        let _ = writeln!(output, "All systems nominal.");
    } else {
        for alert in alerts.iter() {
            let _ = writeln!(
                output,
                "- {} ({} reports): {}",
                alert.theme, alert.count, alert.problem_statement
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Themes");

    for cluster in set.clusters.iter() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {} ({} reports)", cluster.theme, cluster.count);
        let _ = writeln!(output, "{}", cluster.problem_statement);

        for (rank, solution) in cluster.solutions.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} [{}] cost: {}",
                rank + 1,
                solution.solution_title,
                solution.sentiment,
                solution.total_estimated_cost.as_deref().unwrap_or("N/A")
            );
            for step in solution.steps.iter() {
                let _ = writeln!(output, "   - {step}");
            }
            if let Some(tools) = solution.required_tools.as_deref() {
                let _ = writeln!(output, "   - tools: {tools}");
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::tests::mess_and_wifi;
    use crate::cluster::{build_clusters, ClusterOptions, KeywordSimilarity, RuleSynthesizer};
    use crate::models::Role;
    use crate::store::MemoryStore;

    async fn analysed_set() -> ClusterSet {
        let clusters = build_clusters(
            "AITS",
            &mess_and_wifi(),
            &KeywordSimilarity,
            &RuleSynthesizer,
            &ClusterOptions::default(),
        )
        .await
        .unwrap();
        ClusterSet {
            institute_id: "AITS".to_string(),
            computed_at: Some(Utc::now()),
            clusters,
        }
    }

    fn temp_export_dir() -> PathBuf {
        std::env::temp_dir().join(format!("aits-export-{}", Uuid::new_v4()))
    }

    #[test]
    fn stats_count_roles_and_categories() {
        let mut items = mess_and_wifi();
        items[1].role = Role::Faculty;

        let stats = compute_stats(&items);
        assert_eq!(stats.total, 10);
        assert_eq!(stats.roles.get("Student"), Some(&9));
        assert_eq!(stats.roles.get("Faculty"), Some(&1));
        assert_eq!(stats.categories.get("mess food"), Some(&6));
        assert_eq!(stats.categories.get("wifi"), Some(&4));
    }

    #[tokio::test]
    async fn empty_institute_reads_as_zero_values() {
        let reporter = Reporter::new(
            Arc::new(MemoryStore::new()),
            UrgencyLexicon::default(),
            temp_export_dir(),
        );

        let stats = reporter.stats("NEW").await.unwrap();
        assert_eq!(stats, Stats::default());
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!({"total": 0, "roles": {}, "categories": {}})
        );

        let results = reporter.results("NEW").await.unwrap();
        assert!(results.clusters.is_empty());
        assert!(reporter.critical_alerts("NEW").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scenario_flags_only_the_food_cluster() {
        let store = Arc::new(MemoryStore::new());
        store.replace_clusters(&analysed_set().await).await.unwrap();
        let reporter = Reporter::new(store, UrgencyLexicon::default(), temp_export_dir());

        let alerts = reporter.critical_alerts("AITS").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].count, 6);
        assert_eq!(alerts[0].theme, "mess food");
    }

    #[tokio::test]
    async fn export_without_results_fails() {
        let reporter = Reporter::new(
            Arc::new(MemoryStore::new()),
            UrgencyLexicon::default(),
            temp_export_dir(),
        );
        let result = reporter.export("AITS", ExportFormat::Csv, None).await;
        assert!(matches!(result, Err(ServiceError::Export(_))));
    }

    #[tokio::test]
    async fn csv_export_round_trips_themes_and_count() {
        let set = analysed_set().await;
        let store = Arc::new(MemoryStore::new());
        store.replace_clusters(&set).await.unwrap();
        let dir = temp_export_dir();
        let reporter = Reporter::new(store, UrgencyLexicon::default(), dir.clone());

        let url = reporter.export("AITS", ExportFormat::Csv, None).await.unwrap();
        assert!(url.starts_with("/exports/AITS-"));
        assert!(url.ends_with(".csv"));

        let file = dir.join(url.trim_start_matches("/exports/"));
        let rows = read_csv_report(&std::fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(rows.len(), set.clusters.len());
        let themes: Vec<&str> = rows.iter().map(|r| r.theme.as_str()).collect();
        assert_eq!(themes, vec!["mess food", "wifi"]);
        assert!(rows[0].critical);
        assert!(!rows[1].critical);
    }

    #[tokio::test]
    async fn json_export_of_supplied_results_round_trips() {
        let set = analysed_set().await;
        let dir = temp_export_dir();
        let reporter = Reporter::new(
            Arc::new(MemoryStore::new()),
            UrgencyLexicon::default(),
            dir.clone(),
        );

        let url = reporter
            .export("AITS", ExportFormat::Json, Some(set.clone()))
            .await
            .unwrap();
        let file = dir.join(url.trim_start_matches("/exports/"));
        let reread = read_json_report(&std::fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(reread.clusters.len(), set.clusters.len());
        assert_eq!(reread.clusters[0].theme, set.clusters[0].theme);
        assert_eq!(reread.clusters[1].theme, set.clusters[1].theme);
    }

    #[tokio::test]
    async fn markdown_report_lists_alerts_and_themes() {
        let set = analysed_set().await;
        let report = build_markdown_report(&set, &UrgencyLexicon::default());

        assert!(report.starts_with("# Feedback Insight Report"));
        assert!(report.contains("10 feedback items across 2 themes"));
        assert!(report.contains("- mess food (6 reports)"));
        assert!(report.contains("### wifi (4 reports)"));
        assert!(!report.contains("All systems nominal."));
    }

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(file_safe("NEXUS-AB12"), "NEXUS-AB12");
        assert_eq!(file_safe("../etc/passwd"), "___etc_passwd");
        assert_eq!(file_safe(""), "report");
    }
}
