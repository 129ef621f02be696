//! Keyword-based text analysis
//!
//! Stand-ins for a real model: topic classification for complaints and a
//! sentiment score for feedback. Results are deterministic for a given
//! `text_hash`, which is what the cache tables key on.

use serde::{Deserialize, Serialize};

/// Category used when no keyword matches
pub const GENERAL_CATEGORY: &str = "general";

/// Matches needed for full confidence
const FULL_CONFIDENCE_MATCHES: f64 = 3.0;

/// Sentiment label threshold on the normalized score
const SENTIMENT_THRESHOLD: f64 = 0.2;

const TOPICS: &[(&str, &[&str])] = &[
    (
        "maintenance",
        &[
            "leak", "leaking", "broken", "repair", "elevator", "lift", "plumbing", "pipe",
            "heating", "boiler", "light", "bulb", "door", "lock", "mold",
        ],
    ),
    (
        "noise",
        &["noise", "noisy", "loud", "music", "party", "barking", "shouting", "night"],
    ),
    (
        "security",
        &[
            "security", "theft", "stolen", "stranger", "intruder", "camera", "gate", "guard",
            "break-in", "unsafe",
        ],
    ),
    (
        "parking",
        &["parking", "parked", "car", "vehicle", "garage", "spot", "tow", "blocked"],
    ),
    (
        "cleanliness",
        &[
            "trash", "garbage", "dirty", "smell", "rubbish", "litter", "pest", "rats",
            "cockroach", "bins",
        ],
    ),
    (
        "billing",
        &["bill", "billing", "fee", "fees", "charge", "charged", "payment", "invoice", "rent"],
    ),
    (
        "amenities",
        &["pool", "gym", "playground", "garden", "clubhouse", "wifi", "laundry", "bbq"],
    ),
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "happy", "helpful", "clean", "friendly", "thanks",
    "thank", "appreciate", "amazing", "nice", "quick", "safe", "wonderful", "satisfied",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "angry", "dirty", "rude", "slow", "broken", "unsafe",
    "noisy", "worst", "disappointed", "poor", "annoying", "never", "ignored",
];

/// Result of topic classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicClassification {
    pub category: String,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
}

/// Result of sentiment analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub sentiment: String,
    pub score: f64,
}

/// Normalize text so trivially different inputs share a cache row.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Cache key for a piece of text: md5 hex of the normalized text.
pub fn text_hash(text: &str) -> String {
    format!("{:x}", md5::compute(normalize(text).as_bytes()))
}

/// Classify text into a complaint topic by keyword overlap.
///
/// Ties go to the topic listed first.
pub fn classify_topic(text: &str) -> TopicClassification {
    let words = tokens(text);

    let mut best: Option<(&str, Vec<String>)> = None;
    for (category, keywords) in TOPICS {
        let mut matched: Vec<String> = Vec::new();
        for word in &words {
            if keywords.contains(&word.as_str()) && !matched.contains(word) {
                matched.push(word.clone());
            }
        }
        let better = match &best {
            Some((_, current)) => matched.len() > current.len(),
            None => !matched.is_empty(),
        };
        if better {
            best = Some((*category, matched));
        }
    }

    match best {
        Some((category, matched)) => TopicClassification {
            category: category.to_owned(),
            confidence: round2((matched.len() as f64 / FULL_CONFIDENCE_MATCHES).min(1.0)),
            matched_keywords: matched,
        },
        None => TopicClassification {
            category: GENERAL_CATEGORY.to_owned(),
            confidence: 0.0,
            matched_keywords: Vec::new(),
        },
    }
}

/// Score sentiment as (positive - negative) / (positive + negative).
pub fn analyze_sentiment(text: &str) -> SentimentAnalysis {
    let words = tokens(text);
    let positive = words
        .iter()
        .filter(|w| POSITIVE_WORDS.contains(&w.as_str()))
        .count() as f64;
    let negative = words
        .iter()
        .filter(|w| NEGATIVE_WORDS.contains(&w.as_str()))
        .count() as f64;

    let total = positive + negative;
    let score = if total == 0.0 {
        0.0
    } else {
        round2((positive - negative) / total)
    };

    let sentiment = if score > SENTIMENT_THRESHOLD {
        "positive"
    } else if score < -SENTIMENT_THRESHOLD {
        "negative"
    } else {
        "neutral"
    };

    SentimentAnalysis {
        sentiment: sentiment.to_owned(),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_case_and_spacing() {
        assert_eq!(text_hash("Broken  lift\n"), text_hash("broken lift"));
        assert_ne!(text_hash("broken lift"), text_hash("broken gate"));
        assert_eq!(text_hash("x").len(), 32);
    }

    #[test]
    fn classifies_maintenance() {
        let result = classify_topic("The elevator is broken and the pipe is leaking");
        assert_eq!(result.category, "maintenance");
        assert_eq!(result.confidence, 1.0);
        assert!(result.matched_keywords.contains(&"elevator".to_string()));
    }

    #[test]
    fn partial_confidence() {
        let result = classify_topic("Someone keeps parking in my spot");
        assert_eq!(result.category, "parking");
        assert_eq!(result.confidence, 0.67);
    }

    #[test]
    fn falls_back_to_general() {
        let result = classify_topic("Hello neighbours");
        assert_eq!(result.category, GENERAL_CATEGORY);
        assert_eq!(result.confidence, 0.0);
        assert!(result.matched_keywords.is_empty());
    }

    #[test]
    fn sentiment_labels() {
        assert_eq!(analyze_sentiment("Great job, thanks!").sentiment, "positive");
        assert_eq!(analyze_sentiment("Rude and slow staff").sentiment, "negative");
        assert_eq!(analyze_sentiment("The meeting is on Monday").sentiment, "neutral");
        assert_eq!(analyze_sentiment("good but slow").score, 0.0);
    }
}
