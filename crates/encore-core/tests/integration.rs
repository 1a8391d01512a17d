use async_trait::async_trait;
use encore_core::{
    Ack, EntityId, Flags, Projection, RefreshBus, RemoteAuthority, RemoteError, RetryPolicy, Song,
    SongPage, SubscriptionCache, ToggleCoordinator, ToggleStart,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Remote with real state: `set_subscription` consumes a failure script
/// before applying, `fetch_entity` serves the artist's songs only while
/// subscribed.
struct FlakyRemote {
    script: Mutex<VecDeque<Result<(), RemoteError>>>,
    calls: Mutex<Vec<tokio::time::Instant>>,
    subscribed: Mutex<HashMap<EntityId, bool>>,
}

impl FlakyRemote {
    fn new(script: Vec<Result<(), RemoteError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            subscribed: Mutex::new(HashMap::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteAuthority for FlakyRemote {
    async fn set_subscription(&self, entity: &EntityId, desired: bool) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(tokio::time::Instant::now());
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            outcome?;
        }
        self.subscribed.lock().unwrap().insert(entity.clone(), desired);
        Ok(())
    }

    async fn fetch_entity(&self, entity: &EntityId) -> Result<SongPage, RemoteError> {
        let songs = if *self
            .subscribed
            .lock()
            .unwrap()
            .get(entity)
            .unwrap_or(&false)
        {
            vec![
                Song {
                    title: "Opener".to_string(),
                    explicit: false,
                    downloaded: true,
                },
                Song {
                    title: "Deep Cut".to_string(),
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

fn transient() -> Result<(), RemoteError> {
    Err(RemoteError::Transport("connection reset".into()))
}

struct Harness {
    coord: ToggleCoordinator,
    acks: mpsc::UnboundedReceiver<Ack>,
    bus: RefreshBus,
}

fn harness(remote: Arc<FlakyRemote>) -> Harness {
    let bus = RefreshBus::new();
    let (ack_tx, acks) = mpsc::unbounded_channel();
    let coord = ToggleCoordinator::new(
        Arc::new(SubscriptionCache::new()),
        remote,
        bus.clone(),
        ack_tx,
        RetryPolicy::default(),
    );
    Harness { coord, acks, bus }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Entity "X", unsubscribed, toggled on; the remote fails twice and
/// succeeds on the third attempt.
#[tokio::test(start_paused = true)]
async fn fail_fail_succeed_trace() {
    let remote = FlakyRemote::new(vec![transient(), transient()]);
    let mut h = harness(remote.clone());
    let mut listener = h.bus.subscribe();
    let id = EntityId::from("X");

    let start = tokio::time::Instant::now();
    assert_eq!(h.coord.toggle(&id), ToggleStart::Started);
    // Local state reads subscribed at t=0.
    assert!(h.coord.cache().get(&id));

    let ack = h.acks.recv().await.unwrap();
    assert_eq!(ack, Ack::Subscribed { entity: id.clone() });

    assert_eq!(remote.call_count(), 3);
    assert!(start.elapsed() >= Duration::from_millis(1_000));
    // Exactly one emission attributable to this action.
    assert!(listener.try_changed());
    assert!(!listener.try_changed());
    // Remote truth converged.
    assert!(*remote.subscribed.lock().unwrap().get(&id).unwrap());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_local_and_remote_divergent() {
    let remote = FlakyRemote::new(vec![transient(), transient(), transient()]);
    let mut h = harness(remote.clone());
    let mut listener = h.bus.subscribe();
    let id = EntityId::from("X");

    h.coord.toggle(&id);
    let ack = h.acks.recv().await.unwrap();
    assert_eq!(
        ack,
        Ack::ToggleFailed {
            entity: id.clone(),
            desired: true
        }
    );

    assert_eq!(remote.call_count(), 3);
    assert!(!listener.try_changed());
    // Known gap, preserved deliberately: local optimistic value stays while
    // the remote never applied it.
    assert!(h.coord.cache().get(&id));
    assert!(remote.subscribed.lock().unwrap().get(&id).is_none());
}

/// Tearing down the scope that triggered the toggle must not cancel the
/// confirm loop.
#[tokio::test(start_paused = true)]
async fn confirm_loop_outlives_aborted_caller_scope() {
    let remote = FlakyRemote::new(vec![transient(), transient()]);
    let mut h = harness(remote.clone());
    let mut listener = h.bus.subscribe();
    let id = EntityId::from("X");

    let caller = tokio::spawn({
        let coord = h.coord.clone();
        let id = id.clone();
        async move {
            coord.toggle(&id);
            // Simulate a UI scope that lingers until dismissed.
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
    });

    // Wait for the optimistic flip, proof that toggle() ran, then tear the
    // caller down mid-confirmation.
    while !h.coord.cache().get(&id) {
        tokio::task::yield_now().await;
    }
    caller.abort();

    let ack = h.acks.recv().await.unwrap();
    assert_eq!(ack, Ack::Subscribed { entity: id });
    assert_eq!(remote.call_count(), 3);
    assert!(listener.try_changed());
}

/// Confirmed toggle -> bus emission -> projection re-pulls the song page.
#[tokio::test(start_paused = true)]
async fn confirmed_toggle_drives_projection_refresh() {
    let remote = FlakyRemote::new(vec![]);
    let mut h = harness(remote.clone());
    let id = EntityId::from("X");

    let (_flags_tx, flags_rx) = watch::channel(Flags::new());
    let projection = Projection::new(
        flags_rx,
        h.bus.subscribe(),
        SongPage::default(),
        |flags: &Flags| flags.flag("explicit_allowed"),
        {
            let remote = remote.clone();
            let id = id.clone();
            move |explicit_allowed: bool| {
                let remote = remote.clone();
                let id = id.clone();
                async move {
                    let mut page = remote.fetch_entity(&id).await.unwrap_or_default();
                    if !explicit_allowed {
                        page.songs.retain(|s| !s.explicit);
                    }
                    page
                }
            }
        },
    );

    let mut page_rx = projection.subscribe();
    // First pull: not subscribed, empty page.
    page_rx.changed().await.unwrap();
    assert!(page_rx.borrow().songs.is_empty());

    h.coord.toggle(&id);
    let ack = h.acks.recv().await.unwrap();
    assert_eq!(ack, Ack::Subscribed { entity: id.clone() });

    // The refresh signal makes the projection re-pull; explicit songs are
    // filtered out by the default flags.
    page_rx.changed().await.unwrap();
    let page = page_rx.borrow().clone();
    assert_eq!(page.songs.len(), 1);
    assert_eq!(page.songs[0].title, "Opener");
}

/// A second toggle queued behind nothing: the first terminal outcome frees
/// the entity for the next action, and directions alternate.
#[tokio::test(start_paused = true)]
async fn sequential_toggles_alternate_direction() {
    let remote = FlakyRemote::new(vec![]);
    let mut h = harness(remote.clone());
    let id = EntityId::from("X");

    h.coord.toggle(&id);
    assert_eq!(
        h.acks.recv().await.unwrap(),
        Ack::Subscribed { entity: id.clone() }
    );

    h.coord.toggle(&id);
    assert_eq!(
        h.acks.recv().await.unwrap(),
        Ack::Unsubscribed { entity: id.clone() }
    );

    assert!(!h.coord.cache().get(&id));
    assert!(!*remote.subscribed.lock().unwrap().get(&id).unwrap());
}
