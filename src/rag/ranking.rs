//! Ranking and fusion of local and web passages.
//!
//! Scores are a weighted sum of semantic relevance, authority tier and
//! recency, normalised by the weight total. Duplicates are removed greedily
//! in score order so the better-scored copy always survives.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use url::Url;

use super::types::{AuthorityTier, Origin, Passage};
use crate::core::config::RankingConfig;
use crate::tools::vector_math::cosine_similarity;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Default)]
pub struct RankOutcome {
    pub passages: Vec<Passage>,
    pub duplicates_removed: usize,
    pub truncated: usize,
}

/// Scores, deduplicates, orders and truncates `passages`.
///
/// Pure given its inputs: `now` is supplied by the caller so repeated calls
/// over the same passages produce the same order.
pub fn rank(
    config: &RankingConfig,
    query_text: &str,
    query_embedding: Option<&[f32]>,
    now: DateTime<Utc>,
    passages: Vec<Passage>,
    max_passages: usize,
) -> RankOutcome {
    let query_terms = terms(query_text);

    let mut scored: Vec<Passage> = passages
        .into_iter()
        .map(|mut passage| {
            passage.relevance_score =
                score_passage(config, &query_terms, query_embedding, now, &passage);
            passage
        })
        .collect();
    scored.sort_by(compare_ranked);

    let mut kept: Vec<(Passage, String, HashSet<String>)> = Vec::new();
    let mut duplicates_removed = 0;
    for passage in scored {
        let locator = identity(&passage);
        let words = terms(&passage.text);
        let duplicate = kept.iter().any(|(other, other_locator, other_words)| {
            *other_locator == locator
                || jaccard(&words, other_words) > config.dedup_threshold
                || embeddings_match(&passage, other, config.embedding_dedup_threshold)
        });
        if duplicate {
            tracing::debug!(locator = %passage.document.locator, "Dropping duplicate passage");
            duplicates_removed += 1;
        } else {
            kept.push((passage, locator, words));
        }
    }

    let mut passages: Vec<Passage> = kept.into_iter().map(|(passage, _, _)| passage).collect();
    let truncated = passages.len().saturating_sub(max_passages);
    passages.truncate(max_passages);

    RankOutcome {
        passages,
        duplicates_removed,
        truncated,
    }
}

/// Normalised locator, narrowed to the chunk for local passages.
fn identity(passage: &Passage) -> String {
    let locator = normalize_locator(&passage.document.locator);
    match passage.chunk_id {
        Some(chunk_id) => format!("{}#{}", locator, chunk_id),
        None => locator,
    }
}

/// Score descending, then local before web, then insertion order.
pub fn compare_ranked(a: &Passage, b: &Passage) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| a.origin().cmp(&b.origin()))
        .then_with(|| a.insertion.cmp(&b.insertion))
}

fn score_passage(
    config: &RankingConfig,
    query_terms: &HashSet<String>,
    query_embedding: Option<&[f32]>,
    now: DateTime<Utc>,
    passage: &Passage,
) -> f64 {
    let semantic = semantic_relevance(query_terms, query_embedding, passage);
    let authority = passage.document.authority_tier.bonus();
    let recency = recency_bonus(config, now, passage);

    let weights = config.weights;
    let total = weights.total();
    if total <= 0.0 {
        return semantic;
    }
    (weights.semantic * semantic + weights.authority * authority + weights.recency * recency)
        / total
}

fn semantic_relevance(
    query_terms: &HashSet<String>,
    query_embedding: Option<&[f32]>,
    passage: &Passage,
) -> f64 {
    let raw = match (passage.similarity, query_embedding, passage.embedding.as_deref()) {
        (Some(similarity), _, _) => similarity,
        (None, Some(query), Some(embedding)) if query.len() == embedding.len() => {
            cosine_similarity(query, embedding)
        }
        _ => lexical_overlap(query_terms, &passage.text),
    };
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn recency_bonus(config: &RankingConfig, now: DateTime<Utc>, passage: &Passage) -> f64 {
    if passage.origin() != Origin::Web || config.recency_half_life_days <= 0.0 {
        return 0.0;
    }
    let Some(published) = passage.document.published_at else {
        return 0.0;
    };
    let age_days = ((now - published).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    0.5_f64.powf(age_days / config.recency_half_life_days)
}

fn embeddings_match(a: &Passage, b: &Passage, threshold: f64) -> bool {
    match (a.embedding.as_deref(), b.embedding.as_deref()) {
        (Some(x), Some(y)) if x.len() == y.len() => cosine_similarity(x, y) >= threshold,
        _ => false,
    }
}

/// Fraction of query terms present in `text`.
pub fn lexical_overlap(query_terms: &HashSet<String>, text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let words = terms(text);
    let hits = query_terms.iter().filter(|term| words.contains(*term)).count();
    hits as f64 / query_terms.len() as f64
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Lowercased alphanumeric words of two or more characters.
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Canonical form of a locator for duplicate detection.
///
/// URLs lose scheme, `www.`, fragments, tracking parameters and trailing
/// slashes; anything else (local paths) is compared trimmed with forward
/// slashes.
pub fn normalize_locator(locator: &str) -> String {
    let trimmed = locator.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.replace('\\', "/");
    };
    if !matches!(url.scheme(), "http" | "https") {
        return trimmed.replace('\\', "/");
    }

    let host = url
        .host_str()
        .unwrap_or("")
        .to_lowercase()
        .trim_start_matches("www.")
        .to_string();
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let query: Vec<String> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("utm_"))
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    if query.is_empty() {
        format!("{}{}{}", host, port, path)
    } else {
        format!("{}{}{}?{}", host, port, path, query.join("&"))
    }
}

/// Tier for a web URL: configured domain lists first, then the adapter's
/// default.
pub fn authority_tier_for(
    config: &RankingConfig,
    url: &str,
    fallback: AuthorityTier,
) -> AuthorityTier {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return fallback;
    };

    let listed = |domains: &[String]| {
        domains.iter().any(|domain| {
            let domain = domain.trim().to_lowercase();
            !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
        })
    };

    if listed(&config.academic_domains) {
        AuthorityTier::Academic
    } else if listed(&config.editorial_domains) {
        AuthorityTier::Editorial
    } else if listed(&config.forum_domains) {
        AuthorityTier::Forum
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::{Document, InsertionKey};
    use chrono::Duration;

    fn passage(origin: Origin, locator: &str, text: &str, insertion: InsertionKey) -> Passage {
        Passage {
            text: text.to_string(),
            document: Document {
                origin,
                locator: locator.to_string(),
                title: locator.to_string(),
                author: None,
                retrieved_at: None,
                published_at: None,
                authority_tier: AuthorityTier::Unranked,
            },
            relevance_score: 0.0,
            chunk_id: None,
            similarity: None,
            embedding: None,
            insertion,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .map(|d| d.with_timezone(&Utc))
            .expect("date")
    }

    #[test]
    fn output_is_sorted_and_bounded() {
        let config = RankingConfig::default();
        let passages = vec![
            passage(Origin::Web, "https://a.org/1", "justice in the city", InsertionKey::web(0, 0)),
            passage(Origin::Web, "https://b.org/2", "justice and the soul of the city", InsertionKey::web(0, 1)),
            passage(Origin::Web, "https://c.org/3", "unrelated cooking recipe", InsertionKey::web(1, 0)),
        ];

        let outcome = rank(&config, "justice soul city", None, now(), passages, 2);

        assert_eq!(outcome.passages.len(), 2);
        assert_eq!(outcome.truncated, 1);
        assert_eq!(outcome.passages[0].document.locator, "https://b.org/2");
        assert!(outcome
            .passages
            .windows(2)
            .all(|w| w[0].relevance_score >= w[1].relevance_score));
    }

    #[test]
    fn equal_scores_put_local_first_then_insertion_order() {
        let config = RankingConfig::default();
        let mut web_late = passage(Origin::Web, "https://x.org/b", "alpha beta", InsertionKey::web(1, 0));
        let mut web_early = passage(Origin::Web, "https://y.org/a", "gamma delta", InsertionKey::web(0, 3));
        let mut local = passage(Origin::Local, "texts/a.txt", "epsilon zeta", InsertionKey::local(0));
        for p in [&mut web_late, &mut web_early, &mut local] {
            p.similarity = Some(0.5);
            p.document.authority_tier = AuthorityTier::Forum;
        }

        let outcome = rank(&config, "q", None, now(), vec![web_late, web_early, local], 10);
        let locators: Vec<&str> = outcome
            .passages
            .iter()
            .map(|p| p.document.locator.as_str())
            .collect();
        assert_eq!(locators, vec!["texts/a.txt", "https://y.org/a", "https://x.org/b"]);
    }

    #[test]
    fn same_locator_keeps_the_better_passage() {
        let config = RankingConfig::default();
        let mut weak = passage(Origin::Web, "https://www.Plato.org/republic/#book1", "weak", InsertionKey::web(0, 0));
        weak.similarity = Some(0.1);
        let mut strong = passage(Origin::Web, "http://plato.org/republic?utm_source=x", "strong", InsertionKey::web(1, 0));
        strong.similarity = Some(0.9);

        let outcome = rank(&config, "q", None, now(), vec![weak, strong], 5);
        assert_eq!(outcome.passages.len(), 1);
        assert_eq!(outcome.passages[0].text, "strong");
        assert_eq!(outcome.duplicates_removed, 1);
    }

    #[test]
    fn chunks_of_one_document_are_kept_apart() {
        let config = RankingConfig::default();
        let texts = [
            "Of all existing things some are in our power and others are not",
            "Men are disturbed not by things but by the opinions about things",
            "Never say of anything that you have lost it but that you have returned it",
        ];
        let chunks: Vec<Passage> = texts
            .iter()
            .enumerate()
            .map(|(id, text)| {
                let mut p = passage(Origin::Local, "texts/enchiridion.txt", text, InsertionKey::local(id));
                p.chunk_id = Some(id);
                p.similarity = Some(0.8 - id as f64 * 0.1);
                p
            })
            .collect();

        let outcome = rank(&config, "things in our power", None, now(), chunks, 5);
        assert_eq!(outcome.passages.len(), 3);
        assert_eq!(outcome.duplicates_removed, 0);
        assert_eq!(
            outcome.passages.iter().map(|p| p.chunk_id).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn repeated_chunk_is_still_a_duplicate() {
        let config = RankingConfig::default();
        let mut first = passage(Origin::Local, "texts/a.txt", "first wording", InsertionKey::local(0));
        first.chunk_id = Some(7);
        let mut again = passage(Origin::Local, "texts/a.txt", "other wording", InsertionKey::local(1));
        again.chunk_id = Some(7);

        let outcome = rank(&config, "q", None, now(), vec![first, again], 5);
        assert_eq!(outcome.passages.len(), 1);
        assert_eq!(outcome.duplicates_removed, 1);
    }

    #[test]
    fn near_identical_text_is_a_duplicate() {
        let config = RankingConfig::default();
        let text = "the unexamined life is not worth living said socrates at his trial in athens";
        let a = passage(Origin::Web, "https://a.org", text, InsertionKey::web(0, 0));
        let b = passage(Origin::Web, "https://b.org", &format!("{} today", text), InsertionKey::web(0, 1));

        let outcome = rank(&config, "unexamined life", None, now(), vec![a, b], 5);
        assert_eq!(outcome.passages.len(), 1);
        assert_eq!(outcome.duplicates_removed, 1);
    }

    #[test]
    fn near_identical_embeddings_are_duplicates() {
        let config = RankingConfig::default();
        let mut a = passage(Origin::Local, "texts/a.txt", "one text", InsertionKey::local(0));
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = passage(Origin::Web, "https://b.org", "another wording", InsertionKey::web(0, 0));
        b.embedding = Some(vec![0.999, 0.01]);

        let outcome = rank(&config, "q", Some(&[1.0, 0.0][..]), now(), vec![a, b], 5);
        assert_eq!(outcome.passages.len(), 1);
        assert_eq!(outcome.passages[0].origin(), Origin::Local);
    }

    #[test]
    fn recent_web_passages_get_a_bonus() {
        let config = RankingConfig::default();
        let mut fresh = passage(Origin::Web, "https://a.org", "same words", InsertionKey::web(0, 1));
        fresh.document.published_at = Some(now() - Duration::days(10));
        let mut stale = passage(Origin::Web, "https://b.org", "other words", InsertionKey::web(0, 0));
        stale.document.published_at = Some(now() - Duration::days(3650));
        for p in [&mut fresh, &mut stale] {
            p.similarity = Some(0.5);
        }

        let outcome = rank(&config, "q", None, now(), vec![stale, fresh], 5);
        assert_eq!(outcome.passages[0].document.locator, "https://a.org");
    }

    #[test]
    fn authority_outweighs_nothing_when_semantics_differ() {
        let config = RankingConfig::default();
        let mut academic = passage(Origin::Web, "https://a.org", "x", InsertionKey::web(0, 0));
        academic.similarity = Some(0.2);
        academic.document.authority_tier = AuthorityTier::Academic;
        let mut relevant = passage(Origin::Web, "https://b.org", "y", InsertionKey::web(0, 1));
        relevant.similarity = Some(0.9);

        let outcome = rank(&config, "q", None, now(), vec![academic, relevant], 5);
        assert_eq!(outcome.passages[0].document.locator, "https://b.org");
    }

    #[test]
    fn locators_normalise_scheme_host_and_tracking() {
        assert_eq!(
            normalize_locator("https://WWW.Example.org/Path/?utm_medium=a&id=3#frag"),
            "example.org/Path?id=3"
        );
        assert_eq!(
            normalize_locator("http://example.org/Path"),
            normalize_locator("https://example.org/Path/")
        );
        assert_eq!(normalize_locator(" texts\\meditations.txt "), "texts/meditations.txt");
    }

    #[test]
    fn domain_lists_override_adapter_tier() {
        let config = RankingConfig::default();
        assert_eq!(
            authority_tier_for(&config, "https://plato.stanford.edu/entries/kant/", AuthorityTier::Unranked),
            AuthorityTier::Academic
        );
        assert_eq!(
            authority_tier_for(&config, "https://old.reddit.com/r/x", AuthorityTier::Unranked),
            AuthorityTier::Forum
        );
        assert_eq!(
            authority_tier_for(&config, "https://blog.example.net/post", AuthorityTier::Editorial),
            AuthorityTier::Editorial
        );
    }

    #[test]
    fn lexical_overlap_counts_query_terms() {
        let query = terms("stoic virtue");
        assert!((lexical_overlap(&query, "Virtue, for the Stoic, is sufficient.") - 1.0).abs() < 1e-9);
        assert!((lexical_overlap(&query, "virtue alone") - 0.5).abs() < 1e-9);
        assert_eq!(lexical_overlap(&HashSet::new(), "anything"), 0.0);
    }
}
