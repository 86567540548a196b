//! Simulated play session over the demo content pack.
//!
//! Draws cards for a few games, rates them with a fake audience and prints
//! how the learned priors move. Run with
//! `RUST_LOG=deck_core=debug cargo run -p deck-core --example play_session`.

use deck_core::{
    CardBuffer, CardSource, ContentEngine, ContentPack, EngineConfig, GenerationRequest, Rating,
    SelectionMode,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const GAMES: [&str; 4] = ["ROAST_CONSENSUS", "POISON_PITCH", "TABOO_TIMER", "SCATTERBLAST"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/assets/demo_pack.json");
    let pack = ContentPack::load_json(path).await?;
    println!("=== Loaded pack: {} blueprints, {} gold cards ===\n", pack.blueprints.len(), pack.gold.len());

    let config = EngineConfig::new()
        .with_seed(7)
        .with_selection(SelectionMode::Thompson);
    let engine = Arc::new(ContentEngine::from_pack(config, &pack)?);
    let players = ["Alice", "Bob", "Cam", "Dee"];
    let mut audience = StdRng::seed_from_u64(99);

    // 1. Synchronous draws with ratings
    println!("1. Drawing twelve cards...");
    for round in 0..12 {
        let game = GAMES[round % GAMES.len()];
        let request = GenerationRequest::new("demo")
            .for_game(game)
            .with_players(players)
            .with_spice_max(2);
        let result = engine.next(&request);

        // The fake audience likes roasts a bit more than the rest.
        let lean = if game == "ROAST_CONSENSUS" { 0.6 } else { 0.35 };
        let rating = match audience.gen::<f64>() {
            x if x < lean => Rating::Lol,
            x if x < lean + 0.3 => Rating::Meh,
            _ => Rating::Trash,
        };
        if matches!(result.source, CardSource::Generated | CardSource::Bandit) {
            engine.record_rating(&result.card.id, rating);
        }

        println!(
            "   [{:>2}] {:<16} {:<9} {:?} ({}s) -> {:?}",
            round + 1,
            game,
            format!("{:?}", result.source),
            result.card.text,
            result.timer_secs,
            rating
        );
    }

    // 2. Learned priors
    println!("\n2. Priors after the session:");
    let mut priors: Vec<_> = engine.priors().into_iter().collect();
    priors.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, stats) in priors {
        println!("   {:<22} alpha={:.2} beta={:.2} mean={:.2}", id, stats.alpha, stats.beta, stats.mean());
    }

    // 3. Buffered draws
    println!("\n3. Buffered draws...");
    engine.end_session("demo");
    let buffer = CardBuffer::new(engine.clone());
    buffer
        .start(GenerationRequest::new("demo-buffer").for_game("ROAST_CONSENSUS").with_players(players))
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    for _ in 0..4 {
        let result = buffer.next().await?;
        println!("   {}", result.card.text);
    }
    let stats = buffer.stats().await;
    println!("   hits={} misses={} hit_rate={:.2}", stats.hits, stats.misses, stats.hit_rate);
    buffer.stop().await;

    println!("\n=== Done ===");
    Ok(())
}
