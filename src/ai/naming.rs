//! Cluster naming
//!
//! [`KeywordNamer`] is deterministic and offline. [`LlmNamer`] asks Claude and
//! falls back to keywords per cluster.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::client::AnthropicClient;
use super::prompts::{build_cluster_naming_prompt, CLUSTER_NAMING_SYSTEM_PROMPT};
use super::NamingError;
use crate::models::{fallback_cluster_name, Assignments, ClusterId, ClusterNames, NOISE_CLUSTER};
use crate::utils::truncate_chars;

const MAX_KEYWORDS: usize = 3;
const MIN_KEYWORD_LEN: usize = 3;
const MAX_SUMMARIES: usize = 5;
const SUMMARY_CHARS: usize = 200;
const NAMING_MAX_TOKENS: u32 = 50;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "because", "been",
    "before", "being", "below", "between", "both", "but", "can", "could", "did", "does", "doing", "down",
    "during", "each", "few", "for", "from", "further", "had", "has", "have", "having", "her", "here",
    "hers", "herself", "him", "himself", "his", "how", "into", "its", "itself", "just", "may", "more",
    "most", "must", "myself", "nor", "not", "now", "off", "once", "only", "other", "our", "ours",
    "ourselves", "out", "over", "own", "same", "she", "should", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "too", "under", "until", "very", "was", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Turns a clustering result into folder names
///
/// Every cluster id present in `assignments` gets a name; `-1` is always
/// "Uncategorized".
pub trait ClusterNamer: Send {
    fn generate(
        &self,
        assignments: &Assignments,
        previews: &HashMap<PathBuf, String>,
    ) -> Result<ClusterNames, NamingError>;
}

fn group_by_cluster(assignments: &Assignments) -> BTreeMap<ClusterId, Vec<&PathBuf>> {
    let mut clusters: BTreeMap<ClusterId, Vec<&PathBuf>> = BTreeMap::new();
    for (identifier, cluster_id) in assignments {
        clusters.entry(*cluster_id).or_default().push(identifier);
    }
    clusters
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The `n` most frequent words, ties broken alphabetically
fn top_words(counts: HashMap<String, usize>, n: usize) -> Vec<String> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(word, _)| word).collect()
}

/// Frequency-based keyword namer
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordNamer;

impl KeywordNamer {
    /// Name one cluster from its members' previews, then their file names
    pub fn name_cluster(&self, cluster_id: ClusterId, members: &[&PathBuf], previews: &HashMap<PathBuf, String>) -> String {
        if cluster_id == NOISE_CLUSTER {
            return fallback_cluster_name(NOISE_CLUSTER);
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for member in members {
            let Some(text) = previews.get(*member) else { continue };
            for token in text.split(|c: char| !c.is_alphabetic()) {
                let token = token.to_lowercase();
                if token.chars().count() >= MIN_KEYWORD_LEN && !STOP_WORDS.contains(&token.as_str()) {
                    *counts.entry(token).or_default() += 1;
                }
            }
        }

        let keywords = top_words(counts, MAX_KEYWORDS);
        if !keywords.is_empty() {
            return keywords.iter().map(|k| capitalize(k)).collect::<Vec<_>>().join("_");
        }

        let mut stem_counts: HashMap<String, usize> = HashMap::new();
        for member in members {
            let stem = member
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            for word in stem.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                *stem_counts.entry(word.to_string()).or_default() += 1;
            }
        }

        let words = top_words(stem_counts, MAX_KEYWORDS);
        if words.is_empty() {
            fallback_cluster_name(cluster_id)
        } else {
            capitalize(&words.join("_"))
        }
    }
}

impl ClusterNamer for KeywordNamer {
    fn generate(
        &self,
        assignments: &Assignments,
        previews: &HashMap<PathBuf, String>,
    ) -> Result<ClusterNames, NamingError> {
        let names = group_by_cluster(assignments)
            .into_iter()
            .map(|(cluster_id, members)| (cluster_id, self.name_cluster(cluster_id, &members, previews)))
            .collect();
        Ok(names)
    }
}

/// Claude-backed namer
///
/// Without a client it names exactly like [`KeywordNamer`].
pub struct LlmNamer {
    client: Option<AnthropicClient>,
    fallback: KeywordNamer,
}

impl LlmNamer {
    pub fn new(client: Option<AnthropicClient>) -> Self {
        if client.is_none() {
            tracing::info!("No API key configured, using keyword naming");
        }
        Self {
            client,
            fallback: KeywordNamer,
        }
    }

    fn ask(&self, client: &AnthropicClient, members: &[&PathBuf], previews: &HashMap<PathBuf, String>) -> Result<Option<String>, NamingError> {
        let summaries: Vec<(String, String)> = members
            .iter()
            .take(MAX_SUMMARIES)
            .filter_map(|member| {
                let content = previews.get(*member).filter(|c| !c.is_empty())?;
                let stem = member
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                Some((stem, truncate_chars(content, SUMMARY_CHARS).replace('\n', " ")))
            })
            .collect();

        if summaries.is_empty() {
            return Ok(None);
        }

        let prompt = build_cluster_naming_prompt(members.len(), &summaries);
        let reply = client.send_message(CLUSTER_NAMING_SYSTEM_PROMPT, &prompt, NAMING_MAX_TOKENS)?;
        let name = clean_folder_name(&reply);
        Ok((!name.is_empty()).then_some(name))
    }
}

impl ClusterNamer for LlmNamer {
    fn generate(
        &self,
        assignments: &Assignments,
        previews: &HashMap<PathBuf, String>,
    ) -> Result<ClusterNames, NamingError> {
        let Some(client) = &self.client else {
            return self.fallback.generate(assignments, previews);
        };

        let mut names = ClusterNames::new();
        for (cluster_id, members) in group_by_cluster(assignments) {
            if cluster_id == NOISE_CLUSTER {
                names.insert(cluster_id, fallback_cluster_name(NOISE_CLUSTER));
                continue;
            }

            let name = match self.ask(client, &members, previews) {
                Ok(Some(name)) => {
                    tracing::info!(cluster_id, name = %name, "Generated cluster name");
                    name
                }
                Ok(None) => self.fallback.name_cluster(cluster_id, &members, previews),
                Err(e) => {
                    tracing::warn!(cluster_id, error = %e, "AI naming failed, using keywords");
                    self.fallback.name_cluster(cluster_id, &members, previews)
                }
            };
            names.insert(cluster_id, name);
        }
        Ok(names)
    }
}

/// Reduce a model reply to a folder-safe name
///
/// Keeps the first line up to the first `.`, turns spaces into `_` and drops
/// anything that is not ASCII alphanumeric or `_`.
pub fn clean_folder_name(reply: &str) -> String {
    let trimmed = reply.trim().trim_matches(|c| c == '"' || c == '\'');
    let first_line = trimmed.lines().next().unwrap_or_default();
    let sentence = first_line.split('.').next().unwrap_or_default();

    sentence
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
