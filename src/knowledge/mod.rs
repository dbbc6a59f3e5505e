//! Static knowledge-base catalog: load, summarize, and rank.
//!
//! The catalog is optional context for prompt augmentation, never a
//! requirement. Fetch failures degrade to "no knowledge base" without
//! surfacing an error to the user.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Sentinel summary used when no catalog could be loaded. Downstream
/// consumers treat this as a valid summary, not an error.
pub const NO_KNOWLEDGE_BASE: &str = "No knowledge base is available.";

/// Number of example document names listed per category in the summary.
const EXAMPLES_PER_CATEGORY: usize = 5;

/// Keywords shorter than this never contribute to ranking.
const MIN_KEYWORD_LEN: usize = 3;

/// One reference document in the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    /// Stable resource identifier.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Path inside the reference library.
    #[serde(default)]
    pub path: String,
    /// Top-level category.
    #[serde(default)]
    pub category: String,
    /// Optional finer grouping.
    #[serde(default)]
    pub subcategory: String,
    /// Declared MIME type.
    #[serde(default, rename = "mimeType")]
    pub mime_type: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// The static reference-document catalog.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LawResourceIndex {
    /// When the catalog was generated.
    #[serde(default, rename = "generatedAt")]
    pub generated_at: String,
    /// Total number of files described.
    #[serde(default, rename = "totalFiles")]
    pub total_files: usize,
    /// Category names in catalog order.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Resources in catalog order.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// Lazily loaded, process-wide knowledge base.
pub struct KnowledgeBase {
    client: reqwest::Client,
    index_url: String,
    index: OnceCell<Option<LawResourceIndex>>,
    summary: OnceCell<String>,
}

impl KnowledgeBase {
    /// Create a knowledge base that will fetch its catalog from `index_url`
    /// on first use.
    #[must_use]
    pub fn new(client: reqwest::Client, index_url: impl Into<String>) -> Self {
        Self {
            client,
            index_url: index_url.into(),
            index: OnceCell::new(),
            summary: OnceCell::new(),
        }
    }

    /// Create a knowledge base from an already-loaded catalog.
    #[must_use]
    pub fn preloaded(index: LawResourceIndex) -> Self {
        Self {
            client: reqwest::Client::new(),
            index_url: String::new(),
            index: OnceCell::new_with(Some(Some(index))),
            summary: OnceCell::new(),
        }
    }

    /// Load the catalog, fetching at most once per process lifetime.
    ///
    /// Returns `None` (with a warning logged) when the fetch fails; the
    /// catalog is optional context and its absence is not an error.
    pub async fn load(&self) -> Option<&LawResourceIndex> {
        self.index
            .get_or_init(|| async {
                match self.fetch().await {
                    Ok(index) => {
                        debug!(
                            "Loaded knowledge base: {} resources in {} categories",
                            index.resources.len(),
                            index.categories.len()
                        );
                        Some(index)
                    }
                    Err(err) => {
                        warn!("Knowledge base unavailable: {err}");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn fetch(&self) -> Result<LawResourceIndex, reqwest::Error> {
        self.client
            .get(&self.index_url)
            .send()
            .await?
            .error_for_status()?
            .json::<LawResourceIndex>()
            .await
    }

    /// Textual briefing of the catalog for prompt augmentation.
    ///
    /// Generated once and cached. Yields the [`NO_KNOWLEDGE_BASE`] sentinel
    /// when the catalog is unavailable.
    pub async fn summary(&self) -> &str {
        let index = self.load().await;
        self.summary
            .get_or_init(|| async {
                index.map_or_else(|| NO_KNOWLEDGE_BASE.to_string(), summarize)
            })
            .await
    }

    /// Case-insensitive substring search over resource name and category.
    pub async fn search(&self, query: &str) -> Vec<Resource> {
        let Some(index) = self.load().await else {
            return Vec::new();
        };
        let needle = query.to_lowercase();
        index
            .resources
            .iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&needle)
                    || r.category.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    /// Token-overlap ranking of resources against a query.
    pub async fn rank(&self, query: &str, limit: usize) -> Vec<Resource> {
        let Some(index) = self.load().await else {
            return Vec::new();
        };
        rank_resources(index, query, limit)
    }
}

/// Produce the per-category briefing for a loaded catalog.
#[must_use]
pub fn summarize(index: &LawResourceIndex) -> String {
    let mut lines = vec![format!(
        "Knowledge base: {} reference documents.",
        index.resources.len()
    )];

    let mut categories = index.categories.clone();
    if categories.is_empty() {
        for resource in &index.resources {
            if !categories.contains(&resource.category) {
                categories.push(resource.category.clone());
            }
        }
    }

    for category in &categories {
        let names: Vec<&str> = index
            .resources
            .iter()
            .filter(|r| &r.category == category)
            .map(|r| r.name.as_str())
            .collect();
        if names.is_empty() {
            continue;
        }
        let examples = names
            .iter()
            .take(EXAMPLES_PER_CATEGORY)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        let overflow = names.len().saturating_sub(EXAMPLES_PER_CATEGORY);
        if overflow > 0 {
            lines.push(format!(
                "- {category} ({} documents): {examples} ... and {overflow} more",
                names.len()
            ));
        } else {
            lines.push(format!("- {category} ({} documents): {examples}", names.len()));
        }
    }

    lines.join("\n")
}

/// Score resources by keyword overlap and return the top `limit`.
///
/// Keywords longer than [`MIN_KEYWORD_LEN`] score +1 when found as a
/// substring of name + category + subcategory and +2 more when present as a
/// whole token. Ties keep catalog order.
#[must_use]
pub fn rank_resources(index: &LawResourceIndex, query: &str, limit: usize) -> Vec<Resource> {
    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > MIN_KEYWORD_LEN)
        .map(ToString::to_string)
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(u32, &Resource)> = index
        .resources
        .iter()
        .filter_map(|resource| {
            let haystack = format!(
                "{} {} {}",
                resource.name, resource.category, resource.subcategory
            )
            .to_lowercase();
            let tokens: Vec<&str> = haystack
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .collect();
            let mut score = 0;
            for keyword in &keywords {
                if haystack.contains(keyword.as_str()) {
                    score += 1;
                    if tokens.contains(&keyword.as_str()) {
                        score += 2;
                    }
                }
            }
            (score > 0).then_some((score, resource))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, r)| r.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, category: &str) -> Resource {
        Resource {
            id: String::new(),
            name: name.to_string(),
            path: format!("{category}/{name}"),
            category: category.to_string(),
            subcategory: String::new(),
            mime_type: "application/pdf".to_string(),
            size: 1024,
        }
    }

    fn index() -> LawResourceIndex {
        LawResourceIndex {
            generated_at: "2025-11-02T10:00:00Z".to_string(),
            total_files: 8,
            categories: vec!["Tort law".to_string(), "Contract law".to_string()],
            resources: vec![
                resource("Caparo duty of care case", "Tort law"),
                resource("Donoghue v Stevenson", "Tort law"),
                resource("Consideration basics", "Contract law"),
                resource("Offer and acceptance", "Contract law"),
                resource("Misrepresentation", "Contract law"),
                resource("Frustration", "Contract law"),
                resource("Penalty clauses", "Contract law"),
                resource("Privity", "Contract law"),
            ],
        }
    }

    #[test]
    fn test_summary_lists_up_to_five_examples_with_overflow() {
        let summary = summarize(&index());
        assert!(summary.contains("Tort law (2 documents)"));
        assert!(summary.contains("Contract law (6 documents)"));
        assert!(summary.contains("... and 1 more"));
        assert!(!summary.contains("Privity"));
    }

    #[test]
    fn test_rank_prefers_keyword_overlap() {
        let ranked = rank_resources(&index(), "duty of care negligence", 5);
        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].name, "Caparo duty of care case");
        assert!(!ranked.iter().any(|r| r.name == "Penalty clauses"));
    }

    #[test]
    fn test_rank_whole_token_bonus_beats_substring() {
        let idx = LawResourceIndex {
            resources: vec![
                resource("carelessness digest", "Tort law"),
                resource("duty of care handbook", "Tort law"),
            ],
            ..Default::default()
        };
        let ranked = rank_resources(&idx, "care", 5);
        // "care" is a 4-char keyword: both match as substring, only the
        // handbook contains it as a whole token.
        assert_eq!(ranked[0].name, "duty of care handbook");
    }

    #[test]
    fn test_short_keywords_ignored() {
        let ranked = rank_resources(&index(), "of v a", 5);
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let kb = KnowledgeBase::preloaded(index());
        let hits = kb.search("TORT").await;
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_summary_sentinel_when_unavailable() {
        let kb = KnowledgeBase::new(reqwest::Client::new(), "http://127.0.0.1:1/none.json");
        assert_eq!(kb.summary().await, NO_KNOWLEDGE_BASE);
    }
}
