//! End-to-end demo of the encore coordination core: a simulated flaky remote,
//! a toggle with optimistic update and retries, and a projection re-pulling
//! on the refresh signal.

use async_trait::async_trait;
use clap::Parser;
use encore_core::{
    Ack, EntityId, Flags, Projection, RefreshBus, RemoteAuthority, RemoteError, RetryPolicy, Song,
    SongPage, SubscriptionCache, ToggleCoordinator,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "encore-demo", about = "Toggle a simulated artist subscription")]
struct Cli {
    /// Artist to subscribe to
    #[arg(long, default_value = "ltj-bukem")]
    artist: String,

    /// Number of remote calls that fail before the remote recovers
    #[arg(long, default_value = "2")]
    fail_first: u32,

    /// Attempt budget for the confirm loop
    #[arg(long, default_value = "3")]
    attempts: u32,

    /// Delay between attempts, in milliseconds
    #[arg(long, default_value = "500")]
    delay_ms: u64,
}

/// Remote that fails its first `fail_first` mutation calls, then recovers.
struct SimulatedRemote {
    fail_first: u32,
    set_calls: AtomicU32,
    subscribed: std::sync::Mutex<bool>,
}

#[async_trait]
impl RemoteAuthority for SimulatedRemote {
    async fn set_subscription(&self, _entity: &EntityId, desired: bool) -> Result<(), RemoteError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let call = self.set_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(RemoteError::Transport("simulated outage".into()));
        }
        *self.subscribed.lock().unwrap() = desired;
        Ok(())
    }

    async fn fetch_entity(&self, entity: &EntityId) -> Result<SongPage, RemoteError> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let songs = if *self.subscribed.lock().unwrap() {
            vec![
                Song {
                    title: "Horizons".to_string(),
                    explicit: false,
                    downloaded: true,
                },
                Song {
                    title: "Demon's Theme".to_string(),
                    explicit: true,
                    downloaded: false,
                },
            ]
        } else {
            vec![]
        };
        Ok(SongPage {
            entity: entity.clone(),
            songs,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let artist = EntityId::new(cli.artist);
    let remote = Arc::new(SimulatedRemote {
        fail_first: cli.fail_first,
        set_calls: AtomicU32::new(0),
        subscribed: std::sync::Mutex::new(false),
    });

    // Composition root: the bus is built once here and handed to producers
    // and consumers by clone.
    let bus = RefreshBus::new();
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
    let coordinator = ToggleCoordinator::new(
        Arc::new(SubscriptionCache::new()),
        remote.clone(),
        bus.clone(),
        ack_tx,
        RetryPolicy {
            attempts: cli.attempts,
            delay_ms: cli.delay_ms,
        },
    );

    let (flags_tx, flags_rx) = watch::channel(Flags::new());
    let projection = Projection::new(
        flags_rx,
        bus.subscribe(),
        SongPage::default(),
        |flags: &Flags| flags.flag("explicit_allowed"),
        {
            let remote = remote.clone();
            let artist = artist.clone();
            move |explicit_allowed: bool| {
                let remote = remote.clone();
                let artist = artist.clone();
                async move {
                    let mut page = remote.fetch_entity(&artist).await.unwrap_or_default();
                    if !explicit_allowed {
                        page.songs.retain(|s| !s.explicit);
                    }
                    page
                }
            }
        },
    );
    let mut page_rx = projection.subscribe();
    page_rx.changed().await?;
    tracing::info!(songs = page_rx.borrow().songs.len(), "initial page");

    tracing::info!(artist = %artist, "toggling subscription");
    coordinator.toggle(&artist);
    tracing::info!(
        subscribed = coordinator.cache().get(&artist),
        "optimistic local state"
    );

    let ack = ack_rx
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("acknowledgment channel closed"))?;
    tracing::info!(?ack, "acknowledgment");

    if matches!(ack, Ack::Subscribed { .. } | Ack::Unsubscribed { .. }) {
        // The confirmed toggle fired the bus; the projection re-pulls.
        page_rx.changed().await?;
        tracing::info!(songs = page_rx.borrow().songs.len(), "page after refresh");
    }

    // Allowing explicit songs changes the combined key and re-queries.
    flags_tx.send_replace(Flags::new().with("explicit_allowed", true));
    page_rx.changed().await?;
    for song in &page_rx.borrow().songs {
        tracing::info!(title = %song.title, explicit = song.explicit, "song");
    }

    Ok(())
}
