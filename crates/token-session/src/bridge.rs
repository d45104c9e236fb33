//! Auth event bridge.
//!
//! Identity providers fire "user changed" in bursts: a sign-in may report the
//! same user several times while the provider refreshes claims, and a buggy
//! integration can echo our own writes back as new notifications. The bridge
//! collapses each burst into one commit and refuses to commit in a tight loop.
//!
//! All debounce state lives in one actor task. Callers only ever send into an
//! unbounded channel, so notifying is cheap and safe from any thread.

use crate::bridge_fsm::{BridgeMachine, BridgeMachineInput, BridgeState};
use crate::collaborators::{
    AuthUser, IdentityProvider, PersistedSession, PersistenceSink, ProfileLoader, Subscription,
};
use crate::manager::TokenSessionManager;
use crate::state::SessionAction;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use session_config_and_utils::{
    Config, DEFAULT_BURST_WINDOW_MS, DEFAULT_MAX_BURST, DEFAULT_SETTLE_DELAY_MS,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bridge timing.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long notifications are coalesced before a commit.
    pub settle_delay: Duration,
    /// Commits closer together than this count towards a burst.
    pub burst_window: Duration,
    /// Notifications past this many back-to-back commits are dropped.
    pub max_burst: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            burst_window: Duration::from_millis(DEFAULT_BURST_WINDOW_MS),
            max_burst: DEFAULT_MAX_BURST,
        }
    }
}

impl From<&Config> for BridgeConfig {
    fn from(config: &Config) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            burst_window: config.burst_window(),
            max_burst: config.max_burst,
        }
    }
}

/// Collaborators a commit needs.
#[derive(Clone)]
pub struct BridgeDeps {
    pub manager: Arc<TokenSessionManager>,
    pub profiles: Arc<dyn ProfileLoader>,
    pub sink: Arc<dyn PersistenceSink>,
}

/// Counters describing what the bridge did with its notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub received: u64,
    /// Replaced by a later notification in the same settle window.
    pub coalesced: u64,
    /// Rejected by the loop guard.
    pub dropped: u64,
    /// Commits issued, sign-outs included.
    pub commits: u64,
    pub sign_outs: u64,
}

#[derive(Default)]
struct StatsCounters {
    received: AtomicU64,
    coalesced: AtomicU64,
    dropped: AtomicU64,
    commits: AtomicU64,
    sign_outs: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            received: self.received.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            sign_outs: self.sign_outs.load(Ordering::Relaxed),
        }
    }
}

enum BridgeMessage {
    UserChanged(Option<AuthUser>),
    Shutdown,
}

/// Cloneable sender for user-changed notifications.
#[derive(Clone)]
pub struct UserChangedNotifier {
    tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl UserChangedNotifier {
    pub fn notify(&self, user: Option<AuthUser>) {
        if self.tx.send(BridgeMessage::UserChanged(user)).is_err() {
            debug!("auth event bridge stopped, notification ignored");
        }
    }
}

/// Turns identity provider notifications into settled session commits.
pub struct AuthEventBridge {
    notifier: UserChangedNotifier,
    state: watch::Receiver<BridgeState>,
    stats: Arc<StatsCounters>,
    subscriptions: Mutex<Vec<Subscription>>,
    worker: JoinHandle<()>,
}

impl AuthEventBridge {
    /// Start the bridge actor. Must be called inside a Tokio runtime.
    pub fn spawn(deps: BridgeDeps, config: BridgeConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(BridgeState::Idle);
        let stats = Arc::new(StatsCounters::default());

        let worker = BridgeWorker {
            guard: LoopGuard::new(config.burst_window, config.max_burst),
            config,
            deps,
            fsm: BridgeMachine::new(),
            state_tx,
            pending: None,
            deadline: None,
            committed_user: None,
            sign_in: None,
            sign_out: None,
            stats: stats.clone(),
        };

        Self {
            notifier: UserChangedNotifier { tx },
            state,
            stats,
            subscriptions: Mutex::new(Vec::new()),
            worker: tokio::spawn(worker.run(rx)),
        }
    }

    pub fn notify(&self, user: Option<AuthUser>) {
        self.notifier.notify(user);
    }

    pub fn notifier(&self) -> UserChangedNotifier {
        self.notifier.clone()
    }

    /// Subscribe to `provider`. The subscription lives as long as the bridge.
    pub fn attach(&self, provider: &dyn IdentityProvider) {
        let notifier = self.notifier();
        let subscription = provider.on_user_changed(Arc::new(move |user| notifier.notify(user)));
        self.subscriptions.lock().push(subscription);
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats.snapshot()
    }

    /// Unsubscribe from every provider, process what is already queued and
    /// wait for the in-flight commit.
    pub async fn shutdown(self) {
        self.subscriptions.lock().drain(..).for_each(Subscription::unsubscribe);
        let _ = self.notifier.tx.send(BridgeMessage::Shutdown);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "auth event bridge worker failed");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Admitted,
    Dropped { burst: u32 },
}

/// Counts commits that follow each other within the burst window.
#[derive(Debug)]
struct LoopGuard {
    window: Duration,
    max_burst: u32,
    last_commit: Option<Instant>,
    burst: u32,
}

impl LoopGuard {
    fn new(window: Duration, max_burst: u32) -> Self {
        Self {
            window,
            max_burst,
            last_commit: None,
            burst: 0,
        }
    }

    fn admit(&mut self, now: Instant) -> Admission {
        let in_burst = self
            .last_commit
            .is_some_and(|last| now.saturating_duration_since(last) < self.window);
        if !in_burst {
            self.burst = 0;
            return Admission::Admitted;
        }
        self.burst = self.burst.saturating_add(1);
        if self.burst > self.max_burst {
            Admission::Dropped { burst: self.burst }
        } else {
            Admission::Admitted
        }
    }

    fn record_commit(&mut self, now: Instant) {
        self.last_commit = Some(now);
    }
}

/// A spawned sign-out that every later commit must wait for.
type SignOutTask = Shared<BoxFuture<'static, ()>>;

enum Wake {
    Message(Option<BridgeMessage>),
    SettleElapsed,
}

struct BridgeWorker {
    config: BridgeConfig,
    deps: BridgeDeps,
    fsm: BridgeMachine,
    state_tx: watch::Sender<BridgeState>,
    guard: LoopGuard,
    pending: Option<AuthUser>,
    deadline: Option<Instant>,
    committed_user: Option<String>,
    sign_in: Option<JoinHandle<()>>,
    sign_out: Option<SignOutTask>,
    stats: Arc<StatsCounters>,
}

impl BridgeWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BridgeMessage>) {
        debug!("auth event bridge started");
        loop {
            let wake = match self.deadline {
                Some(deadline) => tokio::select! {
                    message = rx.recv() => Wake::Message(message),
                    _ = tokio::time::sleep_until(deadline) => Wake::SettleElapsed,
                },
                None => Wake::Message(rx.recv().await),
            };

            match wake {
                Wake::SettleElapsed => self.commit_pending(),
                Wake::Message(Some(BridgeMessage::UserChanged(user))) => self.on_user_changed(user),
                Wake::Message(Some(BridgeMessage::Shutdown)) | Wake::Message(None) => break,
            }
        }

        if let Some(user) = self.pending.take() {
            debug!(user_id = %user.id, "bridge stopping, discarding unsettled notification");
        }
        if let Some(sign_in) = self.sign_in.take() {
            let _ = sign_in.await;
        }
        if let Some(sign_out) = self.sign_out.take() {
            sign_out.await;
        }
        debug!("auth event bridge stopped");
    }

    fn on_user_changed(&mut self, user: Option<AuthUser>) {
        StatsCounters::bump(&self.stats.received);

        let Some(user) = user else {
            self.commit_sign_out();
            return;
        };

        let now = Instant::now();
        if let Admission::Dropped { burst } = self.guard.admit(now) {
            StatsCounters::bump(&self.stats.dropped);
            warn!(
                user_id = %user.id,
                burst,
                max_burst = self.config.max_burst,
                "auth notification dropped, commits are looping"
            );
            return;
        }

        if self.pending.is_some() {
            StatsCounters::bump(&self.stats.coalesced);
        } else {
            self.deadline = Some(now + self.config.settle_delay);
        }
        self.transition(BridgeMachineInput::Notified);
        debug!(user_id = %user.id, "auth notification pending");
        self.pending = Some(user);
    }

    fn commit_pending(&mut self) {
        self.deadline = None;
        let Some(user) = self.pending.take() else {
            return;
        };

        self.transition(BridgeMachineInput::SettleElapsed);
        self.guard.record_commit(Instant::now());
        StatsCounters::bump(&self.stats.commits);

        self.deps
            .manager
            .store()
            .dispatch(SessionAction::UserChanged(Some(user.session_user())));
        self.committed_user = Some(user.id.clone());

        // An older sign-in is superseded. An unfinished sign-out is not: the
        // new commit starts only once it is done.
        if let Some(previous) = self.sign_in.take() {
            previous.abort();
        }
        let sign_out = self.unfinished_sign_out();

        info!(user_id = %user.id, "auth transition committed");
        self.sign_in = Some(tokio::spawn(run_sign_in(self.deps.clone(), user, sign_out)));
        self.transition(BridgeMachineInput::CommitIssued);
    }

    fn commit_sign_out(&mut self) {
        if let Some(user) = self.pending.take() {
            debug!(user_id = %user.id, "sign-out supersedes pending notification");
        }
        self.deadline = None;

        self.transition(BridgeMachineInput::SignedOut);
        self.guard.record_commit(Instant::now());
        StatsCounters::bump(&self.stats.commits);
        StatsCounters::bump(&self.stats.sign_outs);

        if let Some(sign_in) = self.sign_in.take() {
            sign_in.abort();
        }
        let earlier = self.unfinished_sign_out();

        self.deps
            .manager
            .store()
            .dispatch(SessionAction::UserChanged(None));
        let previous_user = self.committed_user.take();

        info!(user_id = ?previous_user, "sign-out committed");
        let handle = tokio::spawn(run_sign_out(self.deps.clone(), previous_user, earlier));
        self.sign_out = Some(handle.map(|_| ()).boxed().shared());
        self.transition(BridgeMachineInput::CommitIssued);
    }

    fn unfinished_sign_out(&mut self) -> Option<SignOutTask> {
        if self
            .sign_out
            .as_ref()
            .is_some_and(|task| task.peek().is_some())
        {
            self.sign_out = None;
        }
        self.sign_out.clone()
    }

    fn transition(&mut self, input: BridgeMachineInput) {
        let old_state = BridgeState::from(self.fsm.state());
        if let Err(e) = self.fsm.consume(&input) {
            warn!(?old_state, ?input, error = ?e, "invalid bridge transition");
            return;
        }
        let new_state = BridgeState::from(self.fsm.state());
        debug!(?old_state, ?new_state, "bridge state transition");
        self.state_tx.send_replace(new_state);
    }
}

async fn run_sign_in(deps: BridgeDeps, user: AuthUser, sign_out: Option<SignOutTask>) {
    if let Some(sign_out) = sign_out {
        sign_out.await;
    }

    if let Some(tokens) = user.tokens.clone() {
        if let Err(e) = deps.manager.save(&user.id, tokens).await {
            warn!(user_id = %user.id, error = %e, "failed to save tokens from auth event");
        }
    }

    let profile = match deps.profiles.load_profile(&user.id).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "profile load failed");
            None
        }
    };

    let session = PersistedSession {
        user: Some(user.session_user()),
        profile,
    };
    if let Err(e) = deps.sink.persist(session).await {
        warn!(user_id = %user.id, error = %e, "failed to persist session");
    }
}

async fn run_sign_out(
    deps: BridgeDeps,
    previous_user: Option<String>,
    earlier: Option<SignOutTask>,
) {
    if let Some(earlier) = earlier {
        earlier.await;
    }
    if let Err(e) = deps.sink.persist(PersistedSession::signed_out()).await {
        warn!(error = %e, "failed to persist signed-out session");
    }
    if let Err(e) = deps.manager.clear_all(previous_user.as_deref()).await {
        warn!(error = %e, "failed to clear session tokens on sign-out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_config_from_config() {
        let mut config = Config::new();
        config.settle_delay_ms = 50;
        config.max_burst = 2;

        let bridge_config = BridgeConfig::from(&config);
        assert_eq!(bridge_config.settle_delay, Duration::from_millis(50));
        assert_eq!(bridge_config.burst_window, Duration::from_millis(500));
        assert_eq!(bridge_config.max_burst, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_guard_drops_past_max_burst() {
        let mut guard = LoopGuard::new(Duration::from_millis(500), 2);
        let start = Instant::now();

        assert_eq!(guard.admit(start), Admission::Admitted);
        guard.record_commit(start);

        let soon = start + Duration::from_millis(100);
        assert_eq!(guard.admit(soon), Admission::Admitted);
        assert_eq!(guard.admit(soon), Admission::Admitted);
        assert_eq!(guard.admit(soon), Admission::Dropped { burst: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_guard_resets_after_window() {
        let mut guard = LoopGuard::new(Duration::from_millis(500), 1);
        let start = Instant::now();
        guard.record_commit(start);

        let soon = start + Duration::from_millis(10);
        assert_eq!(guard.admit(soon), Admission::Admitted);
        assert!(matches!(guard.admit(soon), Admission::Dropped { .. }));

        let later = start + Duration::from_millis(600);
        assert_eq!(guard.admit(later), Admission::Admitted);
        assert_eq!(guard.burst, 0);
    }
}
