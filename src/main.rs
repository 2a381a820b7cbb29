//! `router` CLI: exercise the cognitive routing core from the command line.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use divinesense::cache::RoutingCache;
use divinesense::capability::KeywordCapabilitySource;
use divinesense::config;
use divinesense::feedback::{FeedbackCollector, FlatDefaults, InMemoryWeightStore, RedbWeightStore};
use divinesense::lifecycle::LifecycleManager;
use divinesense::paths::RouterPaths;
use divinesense::registry::IntentRegistry;
use divinesense::router::Router;
use divinesense::types::Utterance;

#[derive(Parser)]
#[command(name = "router", version, about = "Cognitive routing and dispatch core")]
struct Cli {
    /// Use an on-disk redb weight store under the XDG data dir instead of an
    /// in-memory one (feedback does not persist across runs by default).
    #[arg(long, global = true)]
    persistent_weights: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an utterance and print the routing decision.
    Classify {
        /// Text to classify.
        utterance: String,

        /// User id for per-user weight lookup and feedback history (default: 0).
        #[arg(long, default_value = "0")]
        user_id: i64,
    },

    /// Run the classification hot path repeatedly and report throughput.
    Bench {
        /// Utterance to classify on each iteration.
        #[arg(long, default_value = "提醒我明天下午3点开会")]
        utterance: String,

        /// Number of iterations.
        #[arg(long, default_value = "1000")]
        iterations: usize,
    },

    /// Registry inspection.
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// Dump the priority-sorted intent table.
    Dump,
}

fn build_router(persistent_weights: bool) -> Result<(Arc<Router>, LifecycleManager)> {
    let registry = Arc::new(IntentRegistry::with_defaults().into_diagnostic()?);
    let cache = Arc::new(RoutingCache::with_default_capacity());
    let capability_source = Arc::new(KeywordCapabilitySource::defaults());
    let lifecycle = LifecycleManager::new();

    let mut router = Router::new(registry, cache, capability_source, lifecycle.clone());

    // The weight store is shared: the router only reads from it during
    // classification, while the feedback collector owns the write side
    // (spec §4.4, Weight Store contract).
    if persistent_weights {
        let paths = RouterPaths::resolve().into_diagnostic()?;
        paths.ensure_dirs().into_diagnostic()?;
        let store: Arc<RedbWeightStore> = Arc::new(RedbWeightStore::open(&paths.weight_store_dir()).into_diagnostic()?);
        let _collector = FeedbackCollector::new(store.clone(), Box::new(FlatDefaults::default()), &lifecycle);
        router = router.with_weight_store(store);
    } else {
        let store: Arc<InMemoryWeightStore> = Arc::new(InMemoryWeightStore::new());
        let _collector = FeedbackCollector::new(store.clone(), Box::new(FlatDefaults::default()), &lifecycle);
        router = router.with_weight_store(store);
    }

    Ok((Arc::new(router), lifecycle))
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = config::global();

    let cli = Cli::parse();
    let (router, lifecycle) = build_router(cli.persistent_weights)?;

    match cli.command {
        Commands::Classify { utterance, user_id } => {
            let ctx = CancellationToken::new();
            let query = Utterance::new(utterance).with_user(user_id);
            let decision = router.classify(&ctx, &query).await.into_diagnostic()?;
            println!("intent:              {}", decision.intent);
            println!("confidence:          {:.3}", decision.confidence);
            println!("source:              {:?}", decision.source);
            println!("needs_orchestration: {}", decision.needs_orchestration);
        }

        Commands::Bench { utterance, iterations } => {
            let ctx = CancellationToken::new();
            let query = Utterance::new(utterance).with_user(0);
            let started = std::time::Instant::now();
            for _ in 0..iterations {
                let _ = router.classify(&ctx, &query).await.into_diagnostic()?;
            }
            let elapsed = started.elapsed();
            println!(
                "{iterations} classifications in {:.3}s ({:.1} classifications/sec)",
                elapsed.as_secs_f64(),
                iterations as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
            );
            let stats = router.cache_stats();
            println!(
                "cache: {} hits, {} misses, hit_rate={:.3}",
                stats.hits, stats.misses, stats.hit_rate
            );
        }

        Commands::Registry { action } => match action {
            RegistryAction::Dump => {
                for (intent, agent_type, priority, route_type) in router.registry_dump() {
                    println!("{intent:<20} {agent_type:<12?} priority={priority:<4} {route_type}");
                }
            }
        },
    }

    lifecycle.shutdown().await;
    Ok(())
}
