// src/session/mod.rs

//! Client-side driver of one active attempt.
//!
//! Owns the countdown and the autosave schedule. User input mutates the local
//! `Progress`; the driver pushes full snapshots to the server on every
//! autosave, on teardown and on submit. When time runs out it submits the
//! last known state on its own.

pub mod timer;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::{
    config::{Config, DEFAULT_AUTOSAVE_INTERVAL_SECS},
    error::AppError,
    models::{
        attempt::{Attempt, AttemptPatch, SubmitAttemptRequest},
        identity::Identity,
    },
    services::attempt::AttemptService,
};
use timer::{Countdown, CountdownEnd, remaining_secs};

/// Transport used by a session to reach the attempt engine.
#[async_trait]
pub trait AttemptGateway: Send + Sync {
    async fn save_progress(&self, attempt_id: i64, progress: &Progress) -> Result<Attempt, AppError>;

    async fn submit(&self, attempt_id: i64, progress: &Progress) -> Result<Attempt, AppError>;
}

/// Gateway calling an in-process `AttemptService` on behalf of one user.
pub struct LocalGateway {
    service: Arc<AttemptService>,
    identity: Identity,
}

impl LocalGateway {
    pub fn new(service: Arc<AttemptService>, identity: Identity) -> Self {
        Self { service, identity }
    }
}

#[async_trait]
impl AttemptGateway for LocalGateway {
    async fn save_progress(&self, attempt_id: i64, progress: &Progress) -> Result<Attempt, AppError> {
        self.service
            .update(&self.identity, attempt_id, progress.to_patch())
            .await
    }

    async fn submit(&self, attempt_id: i64, progress: &Progress) -> Result<Attempt, AppError> {
        self.service
            .submit(
                &self.identity,
                attempt_id,
                SubmitAttemptRequest {
                    answers: progress.answers.clone(),
                    time_spent: progress.time_spent,
                },
            )
            .await
    }
}

/// Locally known state of the attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub answers: Vec<Option<u32>>,
    pub marked_for_review: BTreeSet<u32>,
    pub time_spent: u32,
}

impl Progress {
    pub fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            answers: attempt.answers.clone(),
            marked_for_review: attempt.marked_for_review.clone(),
            time_spent: attempt.time_spent,
        }
    }

    /// Full snapshot, never a delta.
    pub fn to_patch(&self) -> AttemptPatch {
        AttemptPatch {
            answers: Some(self.answers.clone()),
            marked_for_review: Some(self.marked_for_review.clone()),
            time_spent: Some(self.time_spent),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub autosave_every: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autosave_every: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            autosave_every: config.autosave_interval,
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The user submitted.
    Submitted(Attempt),
    /// The countdown reached zero and the session submitted on its own.
    TimedOut(Attempt),
    /// The user navigated away; progress was saved best-effort.
    Left(Progress),
    /// Submit failed twice. The local state is handed back untouched.
    SubmitFailed { progress: Progress, error: AppError },
}

enum Command {
    Submit,
    Leave,
}

/// Handle held by the UI while the session runs.
pub struct SessionHandle {
    progress: Arc<Mutex<Progress>>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<SessionEnd>,
}

impl SessionHandle {
    /// Records the choice for question `index` (`None` clears it).
    pub fn answer(&self, index: usize, choice: Option<u32>) -> Result<(), AppError> {
        let mut progress = lock(&self.progress)?;
        let slot = progress.answers.get_mut(index).ok_or_else(|| {
            AppError::Validation(format!("question index {} is out of range", index))
        })?;
        *slot = choice;
        Ok(())
    }

    /// Flips the review mark of question `index`; returns the new state.
    pub fn toggle_review(&self, index: u32) -> Result<bool, AppError> {
        let mut progress = lock(&self.progress)?;
        if index as usize >= progress.answers.len() {
            return Err(AppError::Validation(format!(
                "question index {} is out of range",
                index
            )));
        }
        if progress.marked_for_review.remove(&index) {
            Ok(false)
        } else {
            progress.marked_for_review.insert(index);
            Ok(true)
        }
    }

    pub fn progress(&self) -> Result<Progress, AppError> {
        Ok(lock(&self.progress)?.clone())
    }

    pub async fn submit(self) -> Result<SessionEnd, AppError> {
        self.finish_with(Command::Submit).await
    }

    /// Teardown: stops the countdown and saves one last time.
    pub async fn leave(self) -> Result<SessionEnd, AppError> {
        self.finish_with(Command::Leave).await
    }

    /// Waits for the session to end on its own (timeout).
    pub async fn finished(self) -> Result<SessionEnd, AppError> {
        // The sender must outlive the wait; dropping it reads as a leave.
        let SessionHandle { commands, task, .. } = self;
        let end = join(task).await;
        drop(commands);
        end
    }

    async fn finish_with(self, command: Command) -> Result<SessionEnd, AppError> {
        // A closed channel means the session already ended; the join below reports how.
        let _ = self.commands.send(command).await;
        join(self.task).await
    }
}

async fn join(task: JoinHandle<SessionEnd>) -> Result<SessionEnd, AppError> {
    task.await
        .map_err(|e| AppError::Internal(format!("session task failed: {}", e)))
}

fn lock(progress: &Mutex<Progress>) -> Result<std::sync::MutexGuard<'_, Progress>, AppError> {
    progress
        .lock()
        .map_err(|_| AppError::Internal("session progress lock poisoned".to_string()))
}

/// Moves `time_spent` forward to `spent`, never back.
fn record_elapsed(progress: &Mutex<Progress>, budget_secs: u32, spent: u32) {
    if let Ok(mut progress) = progress.lock() {
        progress.time_spent = progress.time_spent.max(spent.min(budget_secs));
    }
}

async fn stop_clock(cancel: &watch::Sender<bool>, clock: JoinHandle<CountdownEnd>) {
    // The countdown may have finished on its own already.
    let _ = cancel.send(true);
    match clock.await {
        Ok(end) => tracing::debug!("Countdown stopped: {:?}", end),
        Err(e) => tracing::warn!("Countdown task failed: {}", e),
    }
}

fn snapshot(progress: &Mutex<Progress>) -> Progress {
    match progress.lock() {
        Ok(p) => p.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Starts driving `attempt` with a `budget_secs` time limit.
pub fn start_session<G>(
    gateway: Arc<G>,
    attempt: &Attempt,
    budget_secs: u32,
    options: SessionOptions,
) -> SessionHandle
where
    G: AttemptGateway + 'static,
{
    let progress = Arc::new(Mutex::new(Progress::from_attempt(attempt)));
    let (commands, rx) = mpsc::channel(4);

    let driver = Driver {
        gateway,
        attempt_id: attempt.id,
        budget_secs,
        progress: progress.clone(),
        autosave_every: options.autosave_every,
    };
    let task = tokio::spawn(driver.run(rx));

    SessionHandle {
        progress,
        commands,
        task,
    }
}

struct Driver<G> {
    gateway: Arc<G>,
    attempt_id: i64,
    budget_secs: u32,
    progress: Arc<Mutex<Progress>>,
    autosave_every: Duration,
}

impl<G: AttemptGateway> Driver<G> {
    async fn run(self, mut commands: mpsc::Receiver<Command>) -> SessionEnd {
        let started = Instant::now();
        let spent = snapshot(&self.progress).time_spent;
        let countdown = Countdown::new(remaining_secs(self.budget_secs, spent));

        tracing::debug!(
            "Session for attempt {} started with {}s left",
            self.attempt_id,
            countdown.remaining()
        );

        let (cancel, cancelled) = watch::channel(false);
        let (expire, mut expired) = oneshot::channel();
        let clock = {
            let progress = self.progress.clone();
            let budget = self.budget_secs;
            tokio::spawn(countdown.run(
                cancelled,
                move |left| record_elapsed(&progress, budget, budget - left.min(budget)),
                move || {
                    let _ = expire.send(());
                },
            ))
        };

        let mut clock_running = true;
        let mut autosave = interval_at(started + self.autosave_every, self.autosave_every);
        autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => {
                    stop_clock(&cancel, clock).await;
                    self.sync_elapsed(spent, started);
                    return match command {
                        Some(Command::Submit) => self.submit_with_retry(SessionEnd::Submitted).await,
                        Some(Command::Leave) | None => {
                            self.autosave().await;
                            SessionEnd::Left(snapshot(&self.progress))
                        }
                    };
                }
                fired = &mut expired, if clock_running => match fired {
                    Ok(()) => {
                        self.sync_elapsed(spent, started);
                        tracing::info!("Time is up for attempt {}, submitting", self.attempt_id);
                        return self.submit_with_retry(SessionEnd::TimedOut).await;
                    }
                    Err(_) => {
                        tracing::warn!("Countdown of attempt {} stopped without expiring", self.attempt_id);
                        clock_running = false;
                    }
                },
                _ = autosave.tick() => {
                    self.sync_elapsed(spent, started);
                    self.autosave().await;
                }
            }
        }
    }

    /// Brings `time_spent` up to the wall time since the session started, so a
    /// snapshot never lags behind a countdown tick that is still in flight.
    fn sync_elapsed(&self, initial_spent: u32, started: Instant) {
        let elapsed = u32::try_from(started.elapsed().as_secs()).unwrap_or(u32::MAX);
        let spent = initial_spent.saturating_add(elapsed).min(self.budget_secs);
        record_elapsed(&self.progress, self.budget_secs, spent);
    }

    /// Best-effort save; a failure only costs the changes since the last success.
    async fn autosave(&self) {
        let progress = snapshot(&self.progress);
        if let Err(e) = self.gateway.save_progress(self.attempt_id, &progress).await {
            tracing::warn!("Autosave of attempt {} failed: {}", self.attempt_id, e);
        }
    }

    async fn submit_with_retry(&self, done: fn(Attempt) -> SessionEnd) -> SessionEnd {
        let progress = snapshot(&self.progress);

        let error = match self.gateway.submit(self.attempt_id, &progress).await {
            Ok(attempt) => return done(attempt),
            Err(e) => {
                tracing::warn!("Submit of attempt {} failed, retrying once: {}", self.attempt_id, e);
                match self.gateway.submit(self.attempt_id, &progress).await {
                    Ok(attempt) => return done(attempt),
                    Err(e) => e,
                }
            }
        };

        tracing::error!("Submit of attempt {} failed twice: {}", self.attempt_id, error);
        SessionEnd::SubmitFailed { progress, error }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::config::AttemptPolicy;
    use crate::fixtures::demo_catalog;
    use crate::services::scoring::MarkingScheme;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingGateway {
        saves: Mutex<Vec<Progress>>,
        submits: Mutex<Vec<Progress>>,
        failing_submits: AtomicUsize,
        failing_saves: AtomicUsize,
    }

    impl RecordingGateway {
        fn failing_submits(n: usize) -> Self {
            let gw = Self::default();
            gw.failing_submits.store(n, Ordering::SeqCst);
            gw
        }

        fn attempt_from(&self, progress: &Progress, completed: bool) -> Attempt {
            Attempt {
                id: 1,
                user_id: 1,
                test_id: 1,
                start_time: Utc::now(),
                end_time: completed.then(Utc::now),
                is_completed: completed,
                answers: progress.answers.clone(),
                marked_for_review: progress.marked_for_review.clone(),
                time_spent: progress.time_spent,
                score: completed.then_some(0),
            }
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl AttemptGateway for RecordingGateway {
        async fn save_progress(&self, _id: i64, progress: &Progress) -> Result<Attempt, AppError> {
            if take_one(&self.failing_saves) {
                return Err(AppError::Internal("connection reset".into()));
            }
            self.saves.lock().unwrap().push(progress.clone());
            Ok(self.attempt_from(progress, false))
        }

        async fn submit(&self, _id: i64, progress: &Progress) -> Result<Attempt, AppError> {
            self.submits.lock().unwrap().push(progress.clone());
            if take_one(&self.failing_submits) {
                return Err(AppError::Internal("connection reset".into()));
            }
            Ok(self.attempt_from(progress, true))
        }
    }

    fn fresh_attempt(n: usize, time_spent: u32) -> Attempt {
        Attempt {
            id: 1,
            user_id: 1,
            test_id: 1,
            start_time: Utc::now(),
            end_time: None,
            is_completed: false,
            answers: vec![None; n],
            marked_for_review: BTreeSet::new(),
            time_spent,
            score: None,
        }
    }

    fn every(secs: u64) -> SessionOptions {
        SessionOptions {
            autosave_every: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_autosaves_then_submits() {
        let gateway = Arc::new(RecordingGateway::default());
        let handle = start_session(gateway.clone(), &fresh_attempt(3, 0), 5, every(2));
        handle.answer(1, Some(3)).unwrap();

        let end = handle.finished().await.unwrap();
        let SessionEnd::TimedOut(attempt) = end else {
            panic!("expected timeout, got {:?}", end);
        };
        assert!(attempt.is_completed);

        let saves = gateway.saves.lock().unwrap();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[0].time_spent, 2);
        assert_eq!(saves[1].time_spent, 4);

        let submits = gateway.submits.lock().unwrap();
        assert_eq!(submits.len(), 1);
        assert_eq!(submits[0].time_spent, 5);
        assert_eq!(submits[0].answers, vec![None, Some(3), None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_advance_local_time() {
        let gateway = Arc::new(RecordingGateway::default());
        let handle = start_session(gateway.clone(), &fresh_attempt(1, 10), 600, every(300));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(handle.progress().unwrap().time_spent, 13);

        let SessionEnd::Left(progress) = handle.leave().await.unwrap() else {
            panic!("expected leave");
        };
        assert_eq!(progress.time_spent, 13);
        assert_eq!(gateway.saves.lock().unwrap()[0].time_spent, 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_session_counts_from_saved_time() {
        let gateway = Arc::new(RecordingGateway::default());
        let handle = start_session(gateway.clone(), &fresh_attempt(2, 57), 60, every(30));

        let end = handle.finished().await.unwrap();
        assert!(matches!(end, SessionEnd::TimedOut(_)));
        assert!(gateway.saves.lock().unwrap().is_empty());
        assert_eq!(gateway.submits.lock().unwrap()[0].time_spent, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_saves_and_stops() {
        let gateway = Arc::new(RecordingGateway::default());
        let handle = start_session(gateway.clone(), &fresh_attempt(3, 0), 600, every(30));
        handle.answer(0, Some(1)).unwrap();
        assert!(handle.toggle_review(2).unwrap());

        let end = handle.leave().await.unwrap();
        let SessionEnd::Left(progress) = end else {
            panic!("expected leave, got {:?}", end);
        };
        assert_eq!(progress.answers, vec![Some(1), None, None]);

        let saves = gateway.saves.lock().unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].marked_for_review, BTreeSet::from([2]));

        // Nothing fires after teardown.
        drop(saves);
        tokio::time::sleep(Duration::from_secs(700)).await;
        assert!(gateway.submits.lock().unwrap().is_empty());
        assert_eq!(gateway.saves.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_autosave_is_not_fatal() {
        let gateway = Arc::new(RecordingGateway::default());
        gateway.failing_saves.store(1, Ordering::SeqCst);
        let handle = start_session(gateway.clone(), &fresh_attempt(1, 0), 7, every(3));

        let end = handle.finished().await.unwrap();
        assert!(matches!(end, SessionEnd::TimedOut(_)));
        // First save at 3s failed, second at 6s landed.
        let saves = gateway.saves.lock().unwrap();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].time_spent, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_is_retried_once() {
        let gateway = Arc::new(RecordingGateway::failing_submits(1));
        let handle = start_session(gateway.clone(), &fresh_attempt(2, 0), 600, every(30));

        let end = handle.submit().await.unwrap();
        assert!(matches!(end, SessionEnd::Submitted(_)));
        assert_eq!(gateway.submits.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_failure_keeps_local_state() {
        let gateway = Arc::new(RecordingGateway::failing_submits(5));
        let handle = start_session(gateway.clone(), &fresh_attempt(2, 0), 600, every(30));
        handle.answer(1, Some(0)).unwrap();

        let end = handle.submit().await.unwrap();
        let SessionEnd::SubmitFailed { progress, error } = end else {
            panic!("expected failure, got {:?}", end);
        };
        assert_eq!(progress.answers, vec![None, Some(0)]);
        assert!(matches!(error, AppError::Internal(_)));
        assert_eq!(gateway.submits.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_out_of_range() {
        let gateway = Arc::new(RecordingGateway::default());
        let handle = start_session(gateway, &fresh_attempt(2, 0), 600, every(30));
        assert!(matches!(handle.answer(2, Some(0)), Err(AppError::Validation(_))));
        assert!(matches!(handle.toggle_review(5), Err(AppError::Validation(_))));
        handle.leave().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_gateway_timeout_scores_attempt() {
        let store = Arc::new(MemoryStore::new());
        let demo = demo_catalog(&store).unwrap();
        let service = Arc::new(AttemptService::new(
            store.clone(),
            MarkingScheme::default(),
            AttemptPolicy::Resume,
        ));
        let me = Identity::new(7);

        let attempt = service.start(&me, demo.general_test).await.unwrap().attempt;
        let gateway = Arc::new(LocalGateway::new(service.clone(), me));
        let handle = start_session(gateway, &attempt, 10 * 60, every(30));
        handle.answer(0, Some(1)).unwrap();
        handle.answer(2, Some(1)).unwrap();

        let end = handle.finished().await.unwrap();
        let SessionEnd::TimedOut(done) = end else {
            panic!("expected timeout, got {:?}", end);
        };
        assert_eq!(done.score, Some(2));
        assert_eq!(done.time_spent, 600);

        // A late autosave after the timeout is refused.
        let err = service
            .update(&me, attempt.id, AttemptPatch {
                time_spent: Some(1),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }
}
