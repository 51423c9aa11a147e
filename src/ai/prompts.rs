/// System prompt for naming a cluster folder
pub const CLUSTER_NAMING_SYSTEM_PROMPT: &str = r#"You are an expert at analyzing document content and creating descriptive, professional folder names. You identify the core theme shared by a group of documents.

RULES:
1. Output ONLY the folder name, nothing else
2. 2-4 words maximum
3. Use underscores instead of spaces (e.g., Machine_Learning_Papers)
4. Capitalize each word
5. Be specific and descriptive
6. Avoid generic terms like "Files" or "Documents""#;

/// Build the user prompt for one cluster
///
/// `summaries` are `(file stem, content excerpt)` pairs.
pub fn build_cluster_naming_prompt(file_count: usize, summaries: &[(String, String)]) -> String {
    let listing = summaries
        .iter()
        .map(|(stem, summary)| format!("- {}: {}", stem, summary))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze these {} files and generate a concise, professional folder name:

{}

Respond with ONLY the folder name."#,
        file_count, listing
    )
}
