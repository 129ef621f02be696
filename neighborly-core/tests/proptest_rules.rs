use neighborly_core::poll::VoteSelection;
use neighborly_core::{analyze_sentiment, classify_topic, text_hash, JoinCode};
use proptest::prelude::*;
use uuid::Uuid;

proptest! {
    /// Property: join code parsing is case-insensitive
    #[test]
    fn prop_join_code_case_insensitive(code in "[A-Za-z0-9]{4,12}") {
        let lower = JoinCode::parse(&code.to_lowercase()).unwrap();
        let upper = JoinCode::parse(&code.to_uppercase()).unwrap();
        prop_assert_eq!(lower, upper);
    }

    /// Property: surrounding whitespace never changes the parsed code
    #[test]
    fn prop_join_code_trims(code in "[A-Z0-9]{4,12}", pad in " {0,3}") {
        let padded = format!("{}{}{}", pad, code, pad);
        let parsed = JoinCode::parse(&padded).unwrap();
        prop_assert_eq!(parsed.as_str(), code.as_str());
    }

    /// Property: classification and sentiment never panic and stay in range
    #[test]
    fn prop_analysis_bounded(text in ".{0,200}") {
        let topic = classify_topic(&text);
        prop_assert!((0.0..=1.0).contains(&topic.confidence));

        let sentiment = analyze_sentiment(&text);
        prop_assert!((-1.0..=1.0).contains(&sentiment.score));
    }

    /// Property: the cache key is stable under case and whitespace changes
    #[test]
    fn prop_text_hash_normalizes(words in prop::collection::vec("[a-z]{1,8}", 1..10)) {
        let single = words.join(" ");
        let messy = format!("  {}  ", words.join("   ").to_uppercase());
        prop_assert_eq!(text_hash(&single), text_hash(&messy));
    }

    /// Property: a single-select ballot never validates with more than one option
    #[test]
    fn prop_single_select_at_most_one(count in 1usize..6) {
        let options: Vec<Uuid> = (0..count).map(|_| Uuid::new_v4()).collect();
        let result = VoteSelection::validate(&options, false, &options);
        if count == 1 {
            prop_assert_eq!(result.unwrap().len(), 1);
        } else {
            prop_assert!(result.is_err());
        }
    }
}
