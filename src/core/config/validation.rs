use super::types::{AppConfig, ModeConfig, RankingConfig};
use crate::core::errors::ConfigError;
use crate::tools::search::KNOWN_ADAPTERS;

/// Minimum share of the total score that semantic relevance must carry.
pub const MIN_SEMANTIC_SHARE: f64 = 0.6;

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.retrieval.fetch_pool_size == 0 {
        return Err(ConfigError::invalid(
            "retrieval.fetch_pool_size",
            "must be at least 1",
        ));
    }
    validate_mode("retrieval.fast", &config.retrieval.fast)?;
    validate_mode("retrieval.full", &config.retrieval.full)?;

    for name in config.search.search_order() {
        if !KNOWN_ADAPTERS.contains(&name.as_str()) {
            return Err(ConfigError::invalid(
                "search.adapters",
                format!("unknown adapter '{}'", name),
            ));
        }
    }

    if config.fetcher.min_passage_chars > config.fetcher.max_passage_chars {
        return Err(ConfigError::invalid(
            "fetcher.min_passage_chars",
            "must not exceed fetcher.max_passage_chars",
        ));
    }
    if config.fetcher.max_bytes == 0 {
        return Err(ConfigError::invalid("fetcher.max_bytes", "must be at least 1"));
    }
    if config.embedding.timeout_ms == 0 {
        return Err(ConfigError::invalid("embedding.timeout_ms", "must be at least 1"));
    }

    if config.context.max_context_chars == 0 {
        return Err(ConfigError::invalid(
            "context.max_context_chars",
            "must be at least 1",
        ));
    }

    validate_ranking(&config.ranking)
}

fn validate_mode(prefix: &str, mode: &ModeConfig) -> Result<(), ConfigError> {
    if mode.max_passages == 0 {
        return Err(ConfigError::invalid(
            format!("{}.max_passages", prefix),
            "must be at least 1",
        ));
    }
    if mode.deadline_ms == 0 {
        return Err(ConfigError::invalid(
            format!("{}.deadline_ms", prefix),
            "must be at least 1",
        ));
    }
    for (field, value) in [
        ("adapter_timeout_ms", mode.adapter_timeout_ms),
        ("fetch_timeout_ms", mode.fetch_timeout_ms),
    ] {
        if value == 0 || value >= mode.deadline_ms {
            return Err(ConfigError::invalid(
                format!("{}.{}", prefix, field),
                format!("must be between 1 and deadline_ms ({})", mode.deadline_ms),
            ));
        }
    }
    if mode.local_top_k == 0 {
        return Err(ConfigError::invalid(
            format!("{}.local_top_k", prefix),
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_ranking(ranking: &RankingConfig) -> Result<(), ConfigError> {
    let weights = &ranking.weights;
    for (field, value) in [
        ("semantic", weights.semantic),
        ("authority", weights.authority),
        ("recency", weights.recency),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::invalid(
                format!("ranking.weights.{}", field),
                "must be a non-negative number",
            ));
        }
    }
    if weights.total() <= 0.0 {
        return Err(ConfigError::invalid(
            "ranking.weights",
            "at least one weight must be positive",
        ));
    }
    if weights.semantic_share() < MIN_SEMANTIC_SHARE {
        return Err(ConfigError::invalid(
            "ranking.weights.semantic",
            format!(
                "semantic weight must carry at least {:.0}% of the total",
                MIN_SEMANTIC_SHARE * 100.0
            ),
        ));
    }

    for (field, value) in [
        ("dedup_threshold", ranking.dedup_threshold),
        ("embedding_dedup_threshold", ranking.embedding_dedup_threshold),
    ] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(ConfigError::invalid(
                format!("ranking.{}", field),
                "must be in (0, 1]",
            ));
        }
    }
    if !(ranking.recency_half_life_days > 0.0) {
        return Err(ConfigError::invalid(
            "ranking.recency_half_life_days",
            "must be positive",
        ));
    }
    Ok(())
}
