//! `resolve-library-id`: free-form library name → canonical identifier
//! (spec §4.E.2).

use crate::config::Config;
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::errors::AppError;
use crate::models::Library;
use crate::store::{LibraryFilter, Store};

/// Candidates within this margin of the top score are returned as
/// alternatives rather than silently discarded.
const TIE_BAND: f64 = 0.02;
const MAX_ALTERNATIVES: usize = 5;

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub selected: Library,
    pub alternatives: Vec<Library>,
    pub score: f64,
}

/// Normalizes a free-form library name: lowercase, collapse whitespace,
/// spaces become hyphens, surrounding punctuation stripped.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let collapsed: String = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let hyphenated = collapsed.replace(' ', "-");
    hyphenated.trim_matches(|c: char| !c.is_alphanumeric()).to_string()
}

enum MatchKind {
    Exact,
    Alias,
    Substring { coverage: f64 },
}

fn name_proximity(kind: &MatchKind) -> f64 {
    match kind {
        MatchKind::Exact => 1.0,
        MatchKind::Alias => 0.9,
        MatchKind::Substring { coverage } => *coverage,
    }
}

fn best_match_kind(normalized_query: &str, library: &Library) -> Option<MatchKind> {
    let normalized_name = normalize_name(&library.name);
    if normalized_name == normalized_query {
        return Some(MatchKind::Exact);
    }
    if library.aliases.iter().any(|a| normalize_name(a) == normalized_query) {
        return Some(MatchKind::Alias);
    }

    // `normalize_name` already folds spaces to hyphens; stripping hyphens
    // here too makes "solid-start" and "solidstart" compare equal, the same
    // hyphen/space equivalence `normalize_name` establishes everywhere else.
    let query_key = normalized_query.replace('-', "");
    let haystacks = std::iter::once(normalized_name).chain(library.keywords.iter().map(|k| normalize_name(k)));
    for haystack in haystacks {
        let haystack_key = haystack.replace('-', "");
        if haystack_key.contains(&query_key) || query_key.contains(&haystack_key) {
            let longer = haystack_key.len().max(query_key.len()) as f64;
            let shorter = haystack_key.len().min(query_key.len()) as f64;
            if longer > 0.0 {
                return Some(MatchKind::Substring { coverage: (shorter / longer).clamp(0.0, 1.0) });
            }
        }
    }
    None
}

/// Runs the full scoring algorithm over libraries already gathered as
/// candidates by name (spec §4.E.2 steps 2-5).
pub async fn resolve_library_id(store: &dyn Store, embedder: &dyn Embedder, library_name: &str, query: &str) -> Result<ResolveOutcome, AppError> {
    let normalized_query = normalize_name(library_name);
    let all_libraries = store.list_libraries(&LibraryFilter::default(), 10_000, 0).await?;

    let mut candidates: Vec<(Library, MatchKind)> = Vec::new();
    for library in all_libraries {
        if let Some(kind) = best_match_kind(&normalized_query, &library) {
            candidates.push((library, kind));
        }
    }

    if candidates.is_empty() {
        return Err(AppError::not_found("library.not_found", format!("no library matches '{library_name}'")));
    }

    let query_vector = embed_query(embedder, query).await?;
    let mut scored: Vec<(Library, f64)> = Vec::with_capacity(candidates.len());
    for (library, kind) in candidates {
        let proximity = name_proximity(&kind);
        let relevance_text = format!("{} {}", library.description.clone().unwrap_or_default(), library.keywords.join(" "));
        let relevance_vector = embed_query(embedder, &relevance_text).await?;
        let relevance = cosine_similarity(&query_vector, &relevance_vector) as f64;
        let popularity = (library.popularity_score as f64 / 100.0).clamp(0.0, 1.0);
        let score = proximity * 0.5 + relevance * 0.3 + popularity * 0.2;
        scored.push((library, score));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (top_library, top_score) = scored.remove(0);
    let alternatives: Vec<Library> = scored.into_iter().filter(|(_, score)| top_score - score <= TIE_BAND).take(MAX_ALTERNATIVES).map(|(lib, _)| lib).collect();

    Ok(ResolveOutcome { selected: top_library, alternatives, score: top_score })
}

/// Resolves via the upstream Context7-compatible mirror when no local
/// candidate exists and the caller opted in (spec §4.E.2 step 3, §6).
pub async fn resolve_or_fetch(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    http_client: &reqwest::Client,
    library_name: &str,
    query: &str,
    fetch_if_missing: bool,
) -> Result<ResolveOutcome, AppError> {
    match resolve_library_id(store, embedder, library_name, query).await {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.kind == crate::errors::ErrorKind::NotFound && fetch_if_missing => {
            let upstream_base = config
                .upstream_context7_url
                .as_deref()
                .ok_or_else(|| AppError::validation("library.upstream_not_configured", "UPSTREAM_CONTEXT7_URL is not configured"))?;

            let normalized = normalize_name(library_name);
            let context7_id = format!("/unknown/{normalized}");
            let body = crate::fetch::fetch_upstream_llms_txt(http_client, upstream_base, &context7_id, query, config.fetch_timeout).await?;

            let now = chrono::Utc::now();
            let library = Library {
                id: uuid::Uuid::new_v4().to_string(),
                name: library_name.to_string(),
                context7_id: context7_id.clone(),
                language: "unknown".to_string(),
                ecosystem: "unknown".to_string(),
                description: None,
                short_description: None,
                aliases: Vec::new(),
                keywords: Vec::new(),
                category: None,
                homepage_url: None,
                repository_url: None,
                author: None,
                license: None,
                status: crate::models::LibraryStatus::Active,
                popularity_score: 0,
                created_at: now,
                updated_at: now,
            };
            store.upsert_library(&library).await?;

            crate::ingest::ingest_document(
                store,
                embedder,
                config,
                crate::ingest::IngestRequest {
                    library_id: &library.id,
                    title: library_name,
                    content: &body,
                    source: &context7_id,
                    source_type: "markdown",
                    document_id: None,
                    created_at: None,
                },
            )
            .await?;

            Ok(ResolveOutcome { selected: library, alternatives: Vec::new(), score: 1.0 })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spaces_and_punctuation() {
        assert_eq!(normalize_name("  Next.js  "), "next.js");
        assert_eq!(normalize_name("Solid JS"), "solid-js");
        assert_eq!(normalize_name("***React***"), "react");
    }

    #[tokio::test]
    async fn resolves_exact_match_over_substring() {
        use crate::embedding::HashEmbedder;
        use crate::store::MemoryStore;

        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let now = chrono::Utc::now();
        let make = |name: &str, ctx: &str, pop: i64| Library {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            context7_id: ctx.to_string(),
            language: "javascript".to_string(),
            ecosystem: "npm".to_string(),
            description: Some("a ui library".to_string()),
            short_description: None,
            aliases: Vec::new(),
            keywords: vec!["ui".to_string()],
            category: None,
            homepage_url: None,
            repository_url: None,
            author: None,
            license: None,
            status: crate::models::LibraryStatus::Active,
            popularity_score: pop,
            created_at: now,
            updated_at: now,
        };

        store.upsert_library(&make("react", "/npm/react", 90)).await.unwrap();
        store.upsert_library(&make("react-dom", "/npm/react-dom", 50)).await.unwrap();

        let outcome = resolve_library_id(&store, &embedder, "React", "how do hooks work").await.unwrap();
        assert_eq!(outcome.selected.name, "react");
    }

    #[tokio::test]
    async fn errors_when_no_candidate_matches() {
        use crate::embedding::HashEmbedder;
        use crate::store::MemoryStore;

        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let result = resolve_library_id(&store, &embedder, "totally-unknown-lib", "anything").await;
        assert!(result.is_err());
    }
}
