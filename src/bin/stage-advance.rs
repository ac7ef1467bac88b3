//! stage-advance CLI: run the pipeline stage and inspect its articles.

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use stage_advance::analysis;
use stage_advance::bus::{Publisher, RetryPolicy, RetryingPublisher};
use stage_advance::config::Config;
use stage_advance::config::secrets::ExposeSecret;
use stage_advance::db::Db;
use stage_advance::engine::{ClaimEngine, EngineConfig, ReconcileConfig, Reconciler, RunOutcome};
use stage_advance::model::{Article, ItemId, Trigger};
use stage_advance::store::WorkItemStore;
use stage_advance::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use stage_advance::trigger::pull::{PullConfig, QueueTrigger};
use stage_advance::trigger::push;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(
    name = "stage-advance",
    about = "Claim staged articles and hand them to the next pipeline stage"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve triggers and run the reconciliation sweep
    Serve {
        /// How triggers arrive
        #[arg(long, value_enum, default_value_t = Transport::Push)]
        transport: Transport,
    },
    /// Run one reconciliation sweep over stale claimed articles
    Reconcile {
        /// Maximum articles to resume in this pass
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Run the engine once, as if a trigger had arrived
    Advance {
        /// Claim this article instead of any pending one
        #[arg(long)]
        id: Option<String>,
    },
    /// Article operations
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },
}

#[derive(Subcommand)]
enum ItemAction {
    /// Show an article
    Show {
        /// Article ID
        id: String,
    },
    /// Insert a received article (local development)
    Seed {
        /// Article ID; a random UUID when omitted
        #[arg(long)]
        id: Option<String>,
        /// Raw article text
        #[arg(long)]
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Push,
    Pull,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { transport } => cmd_serve(config, transport).await,
        Command::Reconcile { batch_size } => cmd_reconcile(config, batch_size).await,
        Command::Advance { id } => cmd_advance(config, id).await,
        Command::Item { action } => {
            let db = connect(&config).await?;
            match action {
                ItemAction::Show { id } => cmd_item_show(&db, id).await,
                ItemAction::Seed { id, text } => cmd_item_seed(&db, id, text).await,
            }
        }
    }
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "stage-advance".to_string(),
        namespace: Some(config.project_id.clone()),
        default_filter: config.log_level.clone(),
    })?)
}

async fn connect(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret(), &config.store_collection).await?;
    db.migrate().await?;
    db.ensure_collection().await?;
    db.create_queue(&config.downstream_channel).await?;
    Ok(db)
}

/// Retry policy for downstream publishes, plus the overall deadline it implies.
fn publish_policy(config: &Config) -> (RetryPolicy, std::time::Duration) {
    let policy = RetryPolicy {
        max_attempts: config.publish_max_attempts,
        attempt_timeout: config.publish_timeout,
        base_delay: config.publish_backoff,
        max_delay: config.publish_backoff.saturating_mul(16),
    };
    let deadline = (policy.attempt_timeout + policy.max_delay).saturating_mul(policy.max_attempts);
    (policy, deadline)
}

fn build(config: &Config, db: Arc<Db>) -> anyhow::Result<(ClaimEngine, Reconciler)> {
    let (policy, publish_deadline) = publish_policy(config);
    let engine_config = EngineConfig {
        channel: config.downstream_channel.clone(),
        store_timeout: config.store_timeout,
        publish_timeout: publish_deadline,
        analysis_timeout: config.analysis_timeout,
        max_conflict_retries: 1,
    };
    let reconcile_config = ReconcileConfig {
        store_timeout: config.store_timeout,
        stale_after: config.reconcile_stale_after,
        ..ReconcileConfig::new(config.downstream_channel.clone())
    };
    reconcile_config.check_window(&engine_config)?;

    let publisher: Arc<dyn Publisher> = Arc::new(RetryingPublisher::new(db.clone(), policy));
    let store: Arc<dyn WorkItemStore> = db;

    let engine = ClaimEngine::new(store.clone(), publisher.clone(), engine_config)
        .with_analyzer(analysis::from_kind(config.analyzer));
    let reconciler = Reconciler::new(store, publisher, reconcile_config);

    Ok((engine, reconciler))
}

async fn cmd_serve(config: Config, transport: Transport) -> anyhow::Result<()> {
    let _guard = telemetry(&config)?;
    let pull_queue = match transport {
        Transport::Pull => Some(config.require_trigger_queue()?.to_string()),
        Transport::Push => None,
    };

    let db = Arc::new(connect(&config).await?);
    let (engine, reconciler) = build(&config, db.clone())?;
    let engine = Arc::new(engine);

    let trigger_shutdown = Arc::new(Notify::new());
    let sweep_shutdown = Arc::new(Notify::new());
    {
        let trigger_shutdown = trigger_shutdown.clone();
        let sweep_shutdown = sweep_shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            trigger_shutdown.notify_one();
            sweep_shutdown.notify_one();
        });
    }

    let interval = config.reconcile_interval;
    let sweeper = {
        let sweep_shutdown = sweep_shutdown.clone();
        tokio::spawn(async move { reconciler.run_periodic(interval, sweep_shutdown).await })
    };

    let served = match pull_queue {
        Some(queue) => {
            QueueTrigger::new(db, engine, PullConfig::new(queue), trigger_shutdown)
                .run()
                .await
        }
        None => {
            let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
            push::serve(listener, engine, trigger_shutdown).await
        }
    };

    sweep_shutdown.notify_one();
    sweeper.await?;
    served?;
    Ok(())
}

async fn cmd_reconcile(config: Config, batch_size: usize) -> anyhow::Result<()> {
    let _guard = telemetry(&config)?;
    let db = Arc::new(connect(&config).await?);
    let (policy, _) = publish_policy(&config);
    let publisher: Arc<dyn Publisher> = Arc::new(RetryingPublisher::new(db.clone(), policy));

    let reconciler = Reconciler::new(
        db,
        publisher,
        ReconcileConfig {
            store_timeout: config.store_timeout,
            stale_after: config.reconcile_stale_after,
            batch_size,
            ..ReconcileConfig::new(config.downstream_channel.clone())
        },
    );
    let report = reconciler.sweep().await?;

    println!(
        "Examined {}, resumed {}, skipped {}, failed {}",
        report.examined, report.resumed, report.skipped, report.failed
    );
    if report.failed > 0 {
        bail!("{} article(s) are still claimed", report.failed);
    }
    Ok(())
}

async fn cmd_advance(config: Config, id: Option<String>) -> anyhow::Result<()> {
    let _guard = telemetry(&config)?;
    let db = Arc::new(connect(&config).await?);
    let (engine, _) = build(&config, db)?;

    let trigger = match id {
        Some(id) => Trigger::for_item(id),
        None => Trigger::wake(),
    };

    match engine.run(&trigger).await? {
        RunOutcome::Advanced { id } => println!("Advanced: {id}"),
        RunOutcome::NoCandidate(reason) => println!("Nothing to do ({reason:?})"),
    }
    Ok(())
}

async fn cmd_item_show(db: &Db, id: String) -> anyhow::Result<()> {
    let Some(item) = db.get_by_id(&ItemId::from(id.as_str())).await? else {
        bail!("no article with id '{id}' in {}", db.collection());
    };

    println!("ID:         {}", item.id);
    println!("Status:     {}", item.status);
    println!("Updated:    {}", item.updated_at);
    println!("Text:       {} chars", item.content.raw_text.chars().count());
    if let Some(ref ai) = item.ai_generated {
        println!("Categories: {}", ai.categories.join(", "));
        println!("Tags:       {}", ai.tags.join(", "));
    }
    Ok(())
}

async fn cmd_item_seed(db: &Db, id: Option<String>, text: String) -> anyhow::Result<()> {
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let article = Article::received(id, text);

    if db.insert_article(&article).await? {
        println!("Seeded: {} (status: {})", article.id, article.status);
    } else {
        println!("Exists: {} (left untouched)", article.id);
    }
    Ok(())
}
