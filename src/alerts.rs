use crate::models::{Cluster, Sentiment};

pub const DEFAULT_URGENCY_TERMS: &[&str] =
    &["food", "ragging", "harassment", "safety", "hygiene", "poison"];

/// Trigger terms that mark a negative cluster as needing urgent attention.
#[derive(Debug, Clone)]
pub struct UrgencyLexicon {
    terms: Vec<String>,
}

impl UrgencyLexicon {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.terms.iter().any(|term| text.contains(term.as_str()))
    }
}

impl Default for UrgencyLexicon {
    fn default() -> Self {
        Self::new(DEFAULT_URGENCY_TERMS)
    }
}

pub fn is_critical(cluster: &Cluster, lexicon: &UrgencyLexicon) -> bool {
    cluster.primary_sentiment() == Sentiment::Negative
        && lexicon.matches(&cluster.problem_statement)
}

/// Critical clusters, in the order they appear in `clusters`.
pub fn critical_alerts(clusters: &[Cluster], lexicon: &UrgencyLexicon) -> Vec<Cluster> {
    clusters
        .iter()
        .filter(|cluster| is_critical(cluster, lexicon))
        .cloned()
        .collect()
}
