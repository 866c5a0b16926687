//! Built-in defaults for the retrieval engine configuration.

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_FETCH_POOL_SIZE: usize = 8;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Lyceum/0.4; +https://example.invalid/lyceum)";

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 1_500;

pub const DEFAULT_FETCH_MAX_BYTES: usize = 2_000_000;
pub const DEFAULT_MIN_PASSAGE_CHARS: usize = 200;
pub const DEFAULT_MAX_PASSAGE_CHARS: usize = 2_000;

pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.70;
pub const DEFAULT_AUTHORITY_WEIGHT: f64 = 0.20;
pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.10;
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 0.85;
pub const DEFAULT_EMBEDDING_DEDUP_THRESHOLD: f64 = 0.97;
pub const DEFAULT_RECENCY_HALF_LIFE_DAYS: f64 = 365.0;

pub const DEFAULT_REDDIT_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_REDDIT_PER_SUBREDDIT: usize = 5;

pub fn default_adapters() -> Vec<String> {
    to_strings(&["duckduckgo", "academic", "reddit", "forums", "news"])
}

pub fn default_subreddits() -> Vec<String> {
    to_strings(&["philosophy", "askphilosophy", "stoicism"])
}

pub fn default_academic_sites() -> Vec<String> {
    to_strings(&["plato.stanford.edu", "iep.utm.edu"])
}

pub fn default_forum_sites() -> Vec<String> {
    to_strings(&[
        "philosophyforums.com",
        "thephilosophyforum.com",
        "philosophy-forums.org",
    ])
}

pub fn default_news_sites() -> Vec<String> {
    to_strings(&[
        "aeon.co",
        "philosophynow.org",
        "thenewatlantis.com",
        "theguardian.com",
    ])
}

pub fn default_modern_topic_keywords() -> Vec<String> {
    to_strings(&[
        "ai",
        "artificial intelligence",
        "technology",
        "internet",
        "social media",
        "climate change",
        "pandemic",
        "covid",
        "bitcoin",
        "cryptocurrency",
        "metaverse",
        "virtual reality",
        "automation",
        "future",
        "modern",
        "contemporary",
        "today",
        "current",
        "now",
        "recent",
    ])
}

pub fn default_academic_domains() -> Vec<String> {
    to_strings(&[
        "plato.stanford.edu",
        "iep.utm.edu",
        "philpapers.org",
        "britannica.com",
        "en.wikipedia.org",
        "jstor.org",
        "gutenberg.org",
    ])
}

pub fn default_editorial_domains() -> Vec<String> {
    to_strings(&[
        "aeon.co",
        "philosophynow.org",
        "thenewatlantis.com",
        "theguardian.com",
        "nytimes.com",
        "newyorker.com",
    ])
}

pub fn default_forum_domains() -> Vec<String> {
    to_strings(&[
        "reddit.com",
        "philosophyforums.com",
        "thephilosophyforum.com",
        "philosophy-forums.org",
        "quora.com",
        "stackexchange.com",
    ])
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
