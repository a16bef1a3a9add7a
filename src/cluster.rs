//! Thematic grouping of feedback and per-cluster insight synthesis.
//!
//! Items are linked when their keyword similarity reaches the configured
//! threshold and groups are the connected components of that graph, so every
//! item lands in exactly one group. Groups smaller than `min_cluster_size`
//! are pooled into a residual cluster or dropped, depending on
//! [`ResidualPolicy`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Cluster, FeedbackItem, Sentiment, Solution};

pub const RESIDUAL_THEME: &str = "Miscellaneous";

const SAMPLE_TEXTS: usize = 3;
const MAX_KEYWORDS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "being", "but", "by", "can", "could", "day", "did", "do", "does", "during", "each",
    "even", "every", "for", "from", "get", "got", "had", "has", "have", "he", "her", "here",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "made", "make", "me",
    "more", "most", "much", "my", "near", "need", "no", "not", "now", "of", "on", "one", "or",
    "our", "out", "over", "please", "she", "should", "so", "some", "still", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "to",
    "too", "two", "up", "us", "very", "was", "we", "week", "were", "what", "when", "which",
    "while", "who", "why", "will", "with", "would", "you", "your",
];

const NEGATIVE_WORDS: &[&str] = &[
    "awful", "bad", "broken", "cold", "complaint", "concern", "dangerous", "dirty", "disgusting",
    "harassment", "horrible", "hot", "insect", "insects", "issue", "lacking", "late", "leaking",
    "missing", "pathetic", "poison", "poisoning", "poor", "problem", "ragging", "rude", "sick",
    "slow", "stale", "terrible", "unhygienic", "unsafe", "unusable", "worst", "worse",
];

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "appreciate", "awesome", "best", "clean", "excellent", "fantastic", "good",
    "great", "happy", "helpful", "improved", "love", "loving", "nice", "thanks", "useful",
    "wonderful",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualPolicy {
    /// Pool undersized groups into one "Miscellaneous" cluster.
    Miscellaneous,
    /// Leave undersized groups out of the cluster set.
    Drop,
}

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub min_cluster_size: usize,
    pub similarity_threshold: f64,
    pub residual: ResidualPolicy,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            similarity_threshold: 0.25,
            residual: ResidualPolicy::Miscellaneous,
        }
    }
}

pub trait Similarity: Send + Sync {
    /// Normalized token set of `text`, computed once per item per run.
    fn features(&self, text: &str) -> BTreeSet<String>;

    /// Score in `0.0..=1.0` between two feature sets; higher means more alike.
    fn score(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64;

    fn score_texts(&self, a: &str, b: &str) -> f64 {
        self.score(&self.features(a), &self.features(b))
    }
}

/// Dice coefficient over normalized keyword sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordSimilarity;

impl Similarity for KeywordSimilarity {
    fn features(&self, text: &str) -> BTreeSet<String> {
        keywords(text)
    }

    fn score(&self, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(b).count();
        (2 * shared) as f64 / (a.len() + b.len()) as f64
    }
}

/// Lowercased words with markup and punctuation removed.
pub fn words(text: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(text.len());
    let mut in_tag = false;

    for (at, ch) in text.char_indices() {
        match ch {
            // Only a complete `<...>` counts as markup.
            '<' if !in_tag && closes_tag(&text[at + 1..]) => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                cleaned.push(' ');
            }
            _ if in_tag => {}
            c if c.is_ascii_alphanumeric() => cleaned.push(c.to_ascii_lowercase()),
            _ => cleaned.push(' '),
        }
    }

    cleaned.split_whitespace().map(str::to_string).collect()
}

fn closes_tag(rest: &str) -> bool {
    matches!(rest.find('>'), Some(end) if end > 0)
}

pub fn keywords(text: &str) -> BTreeSet<String> {
    words(text)
        .into_iter()
        .filter(|word| word.len() > 1 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

pub fn classify_tone(text: &str) -> Sentiment {
    let mut score = 0i32;
    for word in words(text) {
        if NEGATIVE_WORDS.contains(&word.as_str()) {
            score -= 1;
        } else if POSITIVE_WORDS.contains(&word.as_str()) {
            score += 1;
        }
    }

    match score {
        s if s < 0 => Sentiment::Negative,
        s if s > 0 => Sentiment::Positive,
        _ => Sentiment::Neutral,
    }
}

/// Majority tone of a group; ties resolve Negative, then Neutral, then Positive.
pub fn dominant_tone<'a>(texts: impl IntoIterator<Item = &'a str>) -> Sentiment {
    let mut counts: HashMap<Sentiment, usize> = HashMap::new();
    for text in texts {
        *counts.entry(classify_tone(text)).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive]
        .into_iter()
        .find(|tone| counts.get(tone).copied().unwrap_or(0) == max)
        .unwrap_or_default()
}

/// Connected components of the similarity graph, as sorted index lists
/// ordered by their first member.
///
/// Yields to the runtime after every row of comparisons so a caller's
/// timeout can interrupt large inputs.
pub async fn group_by_similarity(
    features: &[BTreeSet<String>],
    similarity: &dyn Similarity,
    threshold: f64,
) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..features.len()).collect();

    fn find(parent: &mut [usize], mut node: usize) -> usize {
        while parent[node] != node {
            parent[node] = parent[parent[node]];
            node = parent[node];
        }
        node
    }

    for i in 0..features.len() {
        for j in (i + 1)..features.len() {
            if similarity.score(&features[i], &features[j]) >= threshold {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
        tokio::task::yield_now().await;
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..features.len() {
        let root = find(&mut parent, index);
        groups.entry(root).or_default().push(index);
    }
    groups.into_values().collect()
}

/// What a synthesizer sees of one group.
#[derive(Debug, Clone)]
pub struct Draft {
    pub theme: String,
    pub texts: Vec<String>,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn problem_statement(&self, draft: &Draft) -> anyhow::Result<String>;

    /// Ranked remediations, primary first.
    async fn solutions(&self, draft: &Draft, problem_statement: &str)
        -> anyhow::Result<Vec<Solution>>;
}

struct Remedy {
    triggers: &'static [&'static str],
    title: &'static str,
    steps: &'static [&'static str],
    cost: &'static str,
    tools: &'static str,
}

const REMEDIES: &[Remedy] = &[
    Remedy {
        triggers: &["food", "mess", "hygiene", "canteen", "cafeteria", "meal", "kitchen", "poisoning", "poison"],
        title: "Commission a food safety audit of the mess and enforce kitchen hygiene standards.",
        steps: &[
            "Schedule an unannounced inspection of kitchen and storage areas",
            "Publish a daily hygiene checklist signed by the mess supervisor",
            "Set up a student food committee for weekly tasting and review",
        ],
        cost: "Medium ($1,000 - $3,000 for audit and deep cleaning)",
        tools: "Food safety checklist, Pest control service",
    },
    Remedy {
        triggers: &["safety", "harassment", "ragging", "security", "lights", "unsafe", "dark"],
        title: "Strengthen campus safety through an anti-ragging cell, night patrols and lighting repairs.",
        steps: &[
            "Repair or install lighting on reported routes",
            "Staff a confidential incident helpline",
            "Schedule night patrols near hostels and the library",
        ],
        cost: "Medium ($2,000+)",
        tools: "CCTV, Incident reporting helpline",
    },
    Remedy {
        triggers: &["internet", "wifi", "network", "connectivity", "bandwidth"],
        title: "Upgrade the campus Wi-Fi infrastructure with high-density access points in study areas.",
        steps: &[
            "Survey signal strength across hostels, labs and the library",
            "Install additional access points in dead zones",
            "Publish a support contact for connectivity issues",
        ],
        cost: "High ($10,000+)",
        tools: "Enterprise Wi-Fi Access Points, Network Controller",
    },
    Remedy {
        triggers: &["teaching", "fast", "pace", "lecture", "lectures"],
        title: "Implement a 'pause-and-ask' policy during lectures and provide recorded sessions for review.",
        steps: &[
            "Agree on pause points with course faculty",
            "Record lectures and share them within a day",
        ],
        cost: "Low (Time investment)",
        tools: "Lecture Recording Software (e.g., Panopto, OBS)",
    },
    Remedy {
        triggers: &["explanation", "understand", "concept", "concepts", "doubt", "doubts"],
        title: "Organize supplementary tutorial sessions and peer-led study groups for complex topics.",
        steps: &[
            "Identify the topics raised most often",
            "Schedule weekly tutorial slots",
            "Pair senior students with study groups",
        ],
        cost: "Medium ($500 - $2000 for tutor stipends)",
        tools: "Classroom booking system",
    },
    Remedy {
        triggers: &["facilities", "broken", "ac", "hot", "projector", "repair", "fan", "leaking"],
        title: "Dispatch facilities team for immediate repair and schedule preventive maintenance checks.",
        steps: &[
            "Log each reported fault in the maintenance system",
            "Repair critical equipment within 48 hours",
            "Add the affected rooms to the monthly inspection round",
        ],
        cost: "Medium ($1000+ for repairs)",
        tools: "Maintenance Request System",
    },
    Remedy {
        triggers: &["trees", "environment", "playground", "garden", "green"],
        title: "Allocate budget for green space development and outdoor student recreational areas.",
        steps: &[
            "Shortlist sites with the estates office",
            "Run a student design poll",
        ],
        cost: "High ($5000+)",
        tools: "Landscaping tools, Outdoor furniture",
    },
];

const COMMITTEE: Remedy = Remedy {
    triggers: &[],
    title: "Initiate a student-faculty joint committee to investigate and address these specific concerns.",
    steps: &[
        "Nominate student and faculty representatives",
        "Collect detailed accounts through a short survey",
        "Report agreed actions back to the institute",
    ],
    cost: "Low",
    tools: "Meeting room, Survey tool",
};

const RECOGNITION: Remedy = Remedy {
    triggers: &[],
    title: "Recognise the practice students are praising and extend it to other departments.",
    steps: &[
        "Share the feedback with the responsible team",
        "Document what works so other departments can adopt it",
    ],
    cost: "Low",
    tools: "Internal newsletter",
};

impl Remedy {
    fn to_solution(&self, sentiment: Sentiment) -> Solution {
        Solution {
            solution_title: self.title.to_string(),
            steps: self.steps.iter().map(|s| s.to_string()).collect(),
            sentiment,
            total_estimated_cost: Some(self.cost.to_string()),
            required_tools: Some(self.tools.to_string()),
        }
    }
}

/// Deterministic synthesizer driven by keyword rules; used when no model
/// backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleSynthesizer;

#[async_trait]
impl Synthesizer for RuleSynthesizer {
    async fn problem_statement(&self, draft: &Draft) -> anyhow::Result<String> {
        let count = draft.texts.len();
        let noun = if count == 1 { "submission" } else { "submissions" };
        let verb = match (draft.sentiment, count == 1) {
            (Sentiment::Negative, false) => "raise concerns about",
            (Sentiment::Negative, true) => "raises concerns about",
            (Sentiment::Positive, false) => "praise",
            (Sentiment::Positive, true) => "praises",
            (Sentiment::Neutral, false) => "mention",
            (Sentiment::Neutral, true) => "mentions",
        };

        if draft.keywords.is_empty() {
            return Ok(format!("{}: {count} {noun} share a common theme.", draft.theme));
        }
        Ok(format!(
            "{}: {count} {noun} {verb} {}.",
            draft.theme,
            join_list(&draft.keywords)
        ))
    }

    async fn solutions(
        &self,
        draft: &Draft,
        problem_statement: &str,
    ) -> anyhow::Result<Vec<Solution>> {
        if draft.sentiment == Sentiment::Positive {
            return Ok(vec![RECOGNITION.to_solution(draft.sentiment)]);
        }

        let mut vocabulary: BTreeSet<String> = words(problem_statement).into_iter().collect();
        vocabulary.extend(words(&draft.theme));
        vocabulary.extend(draft.keywords.iter().cloned());

        let mut ranked: Vec<Solution> = REMEDIES
            .iter()
            .filter(|remedy| remedy.triggers.iter().any(|t| vocabulary.contains(*t)))
            .take(2)
            .map(|remedy| remedy.to_solution(draft.sentiment))
            .collect();
        ranked.push(COMMITTEE.to_solution(draft.sentiment));
        Ok(ranked)
    }
}

fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Most frequent keywords across a group, preferring terms shared by
/// several members.
fn top_keywords(texts: &[String]) -> Vec<String> {
    let mut frequency: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        for word in keywords(text) {
            if NEGATIVE_WORDS.contains(&word.as_str()) || POSITIVE_WORDS.contains(&word.as_str()) {
                continue;
            }
            *frequency.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let shared: Vec<String> = ranked
        .iter()
        .filter(|(_, count)| *count >= 2)
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word.clone())
        .collect();
    if !shared.is_empty() {
        return shared;
    }
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _)| word)
        .collect()
}

/// Most common category among members, first-seen spelling wins ties.
fn theme_label(members: &[&FeedbackItem]) -> String {
    let mut counts: Vec<(String, String, usize)> = Vec::new();
    for item in members {
        let key = item.category.trim().to_lowercase();
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => counts.push((key, item.category.trim().to_string(), 1)),
        }
    }

    let max = counts.iter().map(|(_, _, c)| *c).max().unwrap_or(0);
    counts
        .into_iter()
        .find(|(_, _, c)| *c == max)
        .map(|(_, label, _)| label)
        .unwrap_or_else(|| RESIDUAL_THEME.to_string())
}

/// Partition `items` into clusters and synthesize insights for each.
///
/// Clusters come back ordered by member count (largest first), then theme.
pub async fn build_clusters(
    institute_id: &str,
    items: &[FeedbackItem],
    similarity: &dyn Similarity,
    synthesizer: &dyn Synthesizer,
    options: &ClusterOptions,
) -> Result<Vec<Cluster>, ServiceError> {
    let texts: Vec<String> = items
        .iter()
        .map(|item| format!("{} {}", item.category, item.text))
        .collect();
    let features: Vec<BTreeSet<String>> =
        texts.iter().map(|text| similarity.features(text)).collect();
    let groups = group_by_similarity(&features, similarity, options.similarity_threshold).await;
    let min_size = options.min_cluster_size.max(1);

    let mut selected: Vec<(Option<&str>, Vec<usize>)> = Vec::new();
    let mut residual: Vec<usize> = Vec::new();
    for group in groups {
        if group.len() >= min_size {
            selected.push((None, group));
        } else {
            residual.extend(group);
        }
    }

    if !residual.is_empty() {
        match options.residual {
            ResidualPolicy::Miscellaneous => {
                residual.sort_unstable();
                selected.push((Some(RESIDUAL_THEME), residual));
            }
            ResidualPolicy::Drop => {
                debug!("Dropping {} unclustered feedback items", residual.len());
            }
        }
    }

    let mut clusters = Vec::with_capacity(selected.len());
    for (fixed_theme, indices) in selected {
        let members: Vec<&FeedbackItem> = indices.iter().map(|&i| &items[i]).collect();
        let member_texts: Vec<String> = indices.iter().map(|&i| texts[i].clone()).collect();

        let draft = Draft {
            theme: fixed_theme
                .map(str::to_string)
                .unwrap_or_else(|| theme_label(&members)),
            keywords: top_keywords(&member_texts),
            sentiment: dominant_tone(members.iter().map(|item| item.text.as_str())),
            texts: members.iter().map(|item| item.text.clone()).collect(),
        };

        let problem_statement = synthesizer
            .problem_statement(&draft)
            .await
            .map_err(|e| {
                warn!("Problem statement for '{}' failed: {e:#}", draft.theme);
                ServiceError::Processing(format!("problem statement: {e}"))
            })?
            .trim()
            .to_string();
        if problem_statement.is_empty() {
            return Err(ServiceError::Processing(format!(
                "empty problem statement for theme '{}'",
                draft.theme
            )));
        }

        let solutions = synthesizer
            .solutions(&draft, &problem_statement)
            .await
            .map_err(|e| {
                warn!("Solutions for '{}' failed: {e:#}", draft.theme);
                ServiceError::Processing(format!("solutions: {e}"))
            })?;
        if solutions.is_empty() {
            return Err(ServiceError::Processing(format!(
                "no solutions for theme '{}'",
                draft.theme
            )));
        }

        clusters.push(Cluster {
            id: Uuid::new_v4(),
            institute_id: institute_id.to_string(),
            count: members.len(),
            feedback_ids: members.iter().map(|item| item.id).collect(),
            sample_texts: draft.texts.iter().take(SAMPLE_TEXTS).cloned().collect(),
            theme: draft.theme,
            problem_statement,
            solutions,
        });
    }

    clusters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.theme.cmp(&b.theme)));
    Ok(clusters)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::Role;

    pub(crate) fn item(category: &str, text: &str) -> FeedbackItem {
        FeedbackItem {
            id: Uuid::new_v4(),
            institute_id: "AITS".to_string(),
            role: Role::Student,
            user_name: "Anonymous".to_string(),
            category: category.to_string(),
            text: text.to_string(),
            submitted_at: Utc::now(),
        }
    }

    /// Six negative mess-food complaints and four neutral wifi remarks.
    pub(crate) fn mess_and_wifi() -> Vec<FeedbackItem> {
        vec![
            item("mess food", "The mess food is stale and cold"),
            item("wifi", "Wifi signal in the library"),
            item("mess food", "Mess food hygiene is poor, found insects"),
            item("mess food", "Food in the mess made students sick"),
            item("wifi", "Wifi access in hostel rooms"),
            item("mess food", "Mess food tastes terrible every night"),
            item("wifi", "Wifi coverage near the labs"),
            item("mess food", "Dirty plates in the mess, bad food"),
            item("wifi", "Wifi login page for the hostel"),
            item("mess food", "Mess food quality is awful"),
        ]
    }

    pub(crate) struct FailingSynthesizer;

    #[async_trait]
    impl Synthesizer for FailingSynthesizer {
        async fn problem_statement(&self, _draft: &Draft) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model unavailable"))
        }

        async fn solutions(&self, _draft: &Draft, _problem: &str) -> anyhow::Result<Vec<Solution>> {
            Err(anyhow::anyhow!("model unavailable"))
        }
    }

    #[test]
    fn keywords_strip_markup_punctuation_and_stop_words() {
        let found = keywords("<b>The</b> Wi-Fi is SLOW in the library!!");
        let expected: BTreeSet<String> = ["wi", "fi", "slow", "library"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn unclosed_angle_bracket_keeps_the_rest_of_the_text() {
        let text = "Hostel fee < 5000 but mess food is terrible and unsafe";
        let found = words(text);
        assert!(found.contains(&"5000".to_string()));
        assert!(found.contains(&"terrible".to_string()));
        assert!(found.contains(&"unsafe".to_string()));
        assert_eq!(classify_tone(text), Sentiment::Negative);

        assert_eq!(words("a <> b"), vec!["a", "b"]);
        assert_eq!(words("<p>mess</p> food"), vec!["mess", "food"]);
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let sim = KeywordSimilarity;
        let a = "mess food is stale";
        let b = "stale food in the mess";
        assert_eq!(sim.score_texts(a, b), sim.score_texts(b, a));
        assert_eq!(sim.score_texts(a, a), 1.0);
        assert_eq!(sim.score_texts(a, "wifi signal"), 0.0);
        assert_eq!(sim.score_texts("", a), 0.0);
    }

    #[test]
    fn tone_follows_lexicon_balance() {
        assert_eq!(classify_tone("The food is terrible and stale"), Sentiment::Negative);
        assert_eq!(classify_tone("Great labs, loving it"), Sentiment::Positive);
        assert_eq!(classify_tone("Wifi signal in the library"), Sentiment::Neutral);
        assert_eq!(classify_tone("Good teachers but terrible food"), Sentiment::Neutral);
    }

    #[test]
    fn dominant_tone_prefers_negative_on_ties() {
        assert_eq!(
            dominant_tone(["great food", "terrible food"]),
            Sentiment::Negative
        );
        assert_eq!(
            dominant_tone(["great food", "fine food", "ok food"]),
            Sentiment::Neutral
        );
    }

    #[tokio::test]
    async fn groups_form_a_partition() {
        let texts: Vec<BTreeSet<String>> = mess_and_wifi()
            .iter()
            .map(|i| KeywordSimilarity.features(&format!("{} {}", i.category, i.text)))
            .collect();
        let groups = group_by_similarity(&texts, &KeywordSimilarity, 0.25).await;

        let mut seen: Vec<usize> = groups.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..texts.len()).collect::<Vec<_>>());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec![0, 2, 3, 5, 7, 9]);
        assert_eq!(groups[1], vec![1, 4, 6, 8]);
    }

    #[tokio::test]
    async fn mess_and_wifi_become_two_clusters() {
        let items = mess_and_wifi();
        let clusters = build_clusters(
            "AITS",
            &items,
            &KeywordSimilarity,
            &RuleSynthesizer,
            &ClusterOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].theme, "mess food");
        assert_eq!(clusters[0].count, 6);
        assert_eq!(clusters[0].primary_sentiment(), Sentiment::Negative);
        assert!(clusters[0].problem_statement.contains("food"));
        assert_eq!(clusters[1].theme, "wifi");
        assert_eq!(clusters[1].count, 4);
        assert_eq!(clusters[1].primary_sentiment(), Sentiment::Neutral);
        assert!(clusters[1].solutions[0].solution_title.contains("Wi-Fi"));

        let mut ids: Vec<Uuid> = clusters
            .iter()
            .flat_map(|c| c.feedback_ids.iter().copied())
            .collect();
        ids.sort();
        let mut expected: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        expected.sort();
        assert_eq!(ids, expected);

        for cluster in &clusters {
            assert_eq!(cluster.count, cluster.feedback_ids.len());
            assert!(cluster.sample_texts.len() <= 3);
        }
    }

    #[tokio::test]
    async fn residual_items_follow_policy() {
        let mut items = mess_and_wifi();
        items.push(item("exams", "Exam schedule clashes with the sports meet"));

        let pooled = build_clusters(
            "AITS",
            &items,
            &KeywordSimilarity,
            &RuleSynthesizer,
            &ClusterOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(pooled.len(), 3);
        let misc = pooled.iter().find(|c| c.theme == RESIDUAL_THEME).unwrap();
        assert_eq!(misc.count, 1);

        let dropped = build_clusters(
            "AITS",
            &items,
            &KeywordSimilarity,
            &RuleSynthesizer,
            &ClusterOptions {
                residual: ResidualPolicy::Drop,
                ..ClusterOptions::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(dropped.len(), 2);
        assert_eq!(dropped.iter().map(|c| c.count).sum::<usize>(), 10);
    }

    #[tokio::test]
    async fn no_items_means_no_clusters() {
        let clusters = build_clusters(
            "AITS",
            &[],
            &KeywordSimilarity,
            &RuleSynthesizer,
            &ClusterOptions::default(),
        )
        .await
        .unwrap();
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn synthesis_failure_is_a_processing_error() {
        let result = build_clusters(
            "AITS",
            &mess_and_wifi(),
            &KeywordSimilarity,
            &FailingSynthesizer,
            &ClusterOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::Processing(_))));
    }

    #[tokio::test]
    async fn positive_groups_get_recognition() {
        let draft = Draft {
            theme: "course_content".to_string(),
            texts: vec!["Great labs".to_string()],
            keywords: vec!["labs".to_string()],
            sentiment: Sentiment::Positive,
        };
        let statement = RuleSynthesizer.problem_statement(&draft).await.unwrap();
        assert_eq!(statement, "course_content: 1 submission praises labs.");
        let solutions = RuleSynthesizer.solutions(&draft, &statement).await.unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].sentiment, Sentiment::Positive);
    }

    #[test]
    fn lists_join_naturally() {
        assert_eq!(join_list(&["food".to_string()]), "food");
        assert_eq!(
            join_list(&["food".to_string(), "mess".to_string(), "hygiene".to_string()]),
            "food, mess and hygiene"
        );
    }
}
