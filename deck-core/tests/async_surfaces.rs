//! Paraphrasing, prior persistence and buffering under tokio.

use deck_core::games;
use deck_core::persist::{JsonPriorStore, PriorStore};
use deck_core::filler::word_count;
use deck_core::testing::{assert_no_placeholders, fixture_config, fixture_engine, fixture_engine_with, MockCompleter};
use deck_core::{CardBuffer, CardSource, GenerationRequest, Rating};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn roast_request(session: &str) -> GenerationRequest {
    GenerationRequest::new(session)
        .for_game(games::ROAST_CONSENSUS)
        .with_players(["Alice", "Bob", "Cam"])
}

// =============================================================================
// Paraphrasing
// =============================================================================

#[tokio::test]
async fn test_paraphrase_replaces_generated_text() {
    let completer = Arc::new(MockCompleter::new(vec![
        "Who would skip chores during a video call?".to_string(),
    ]));
    let engine = fixture_engine(3).with_augmentor(completer.clone());

    let result = engine.next_async(&roast_request("p1")).await;
    assert_eq!(result.source, CardSource::Generated);
    assert_eq!(result.card.text, "Who would skip chores during a video call?");
    assert!(result.card.metadata.contains_key("original_text"));
    assert_eq!(completer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_completion_keeps_original() {
    let completer = MockCompleter::new(vec!["Never arrives in time".to_string()])
        .with_delay(Duration::from_secs(30));
    let config = fixture_config(3).with_completion_timeout(Duration::from_millis(200));
    let engine = fixture_engine_with(config).with_augmentor(Arc::new(completer));

    let result = engine.next_async(&roast_request("p2")).await;
    assert_ne!(result.card.text, "Never arrives in time");
    assert!(!result.card.metadata.contains_key("paraphrased"));
}

#[tokio::test]
async fn test_failing_service_is_absorbed() {
    let engine = fixture_engine(4).with_augmentor(Arc::new(MockCompleter::failing()));
    let result = engine.next_async(&roast_request("p3")).await;
    assert!(!result.card.text.is_empty());
    assert!(!result.card.metadata.contains_key("paraphrased"));
}

fn assert_kept_original(result: &deck_core::GenerationResult, rejected: &str) {
    assert_ne!(result.card.text, rejected);
    assert!(!result.card.metadata.contains_key("paraphrased"));
    assert_no_placeholders(result);
    assert!(word_count(&result.card.text) >= fixture_config(0).rules.min_words());
}

#[tokio::test]
async fn test_short_paraphrase_keeps_original() {
    let completer = Arc::new(MockCompleter::new(vec!["Who wins?".to_string()]));
    let engine = fixture_engine(3).with_augmentor(completer.clone());

    let result = engine.next_async(&roast_request("p4")).await;
    assert_eq!(result.source, CardSource::Generated);
    assert_eq!(completer.calls(), 1);
    assert_kept_original(&result, "Who wins?");
}

#[tokio::test]
async fn test_unfit_paraphrases_keep_original() {
    let rewrites = [
        "Who would quietly skip every single chore on the list, blame the family cat for the mess, invent a fake work emergency, and then nap through the whole weekend while everyone else scrubs the kitchen floor until midnight on Sunday?",
        "Who would skip {chore} during a video call?",
        "chores chores chores chores chores maybe",
        "Who would say heck during a video call?",
    ];
    for (i, rewrite) in rewrites.iter().enumerate() {
        let completer = Arc::new(MockCompleter::new(vec![rewrite.to_string()]));
        let engine = fixture_engine(3).with_augmentor(completer.clone());
        let result = engine.next_async(&roast_request(&format!("unfit-{}", i))).await;
        assert_eq!(completer.calls(), 1);
        assert_kept_original(&result, rewrite);
    }
}

#[tokio::test]
async fn test_paraphrase_cannot_repeat_shown_text() {
    let line = "Who would skip chores during a video call?";
    let completer = Arc::new(MockCompleter::new(vec![line.to_string(), line.to_string()]));
    let engine = fixture_engine(3).with_augmentor(completer.clone());

    let first = engine.next_async(&roast_request("dup")).await;
    assert_eq!(first.card.text, line);

    let second = engine.next_async(&roast_request("dup")).await;
    assert_eq!(completer.calls(), 2);
    assert_kept_original(&second, line);

    // A different session may still see the same line.
    let completer = Arc::new(MockCompleter::new(vec![line.to_string()]));
    let other = fixture_engine(3).with_augmentor(completer);
    assert_eq!(other.next_async(&roast_request("dup-2")).await.card.text, line);
}

// =============================================================================
// Prior persistence
// =============================================================================

#[tokio::test]
async fn test_ratings_survive_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("priors.json");

    let store = Arc::new(JsonPriorStore::open(&path).await.unwrap());
    let engine = fixture_engine(5).with_prior_store(store.clone());
    engine.record_rating("roast_fame", Rating::Lol);
    engine.record_rating("roast_fame", Rating::Lol);
    store.flush().await.unwrap();
    assert!(path.exists());

    let reopened = Arc::new(JsonPriorStore::open(&path).await.unwrap());
    assert_eq!(reopened.load_priors()["roast_fame"].alpha, 3.0);

    let restarted = fixture_engine(6).with_prior_store(reopened);
    assert_eq!(restarted.prior("roast_fame").alpha, 3.0);
}

// =============================================================================
// Buffering
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_buffer_serves_many_cards() {
    let buffer = CardBuffer::new(Arc::new(fixture_engine(7)));
    buffer.start(roast_request("b1")).await;

    for _ in 0..8 {
        let result = buffer.next().await.unwrap();
        assert!(!result.card.text.contains('{'));
    }
    let stats = buffer.stats().await;
    assert_eq!(stats.hits + stats.misses, 8);
    assert!(stats.hit_rate >= 0.0 && stats.hit_rate <= 1.0);

    buffer.stop().await;
    assert!(!buffer.is_running());
}
