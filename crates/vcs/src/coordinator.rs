//! Debounced Commit Coordinator — C10. A single-writer serialization layer
//! that batches mutation notifications into atomic commit+rebase+push
//! sequences, with an adaptive debounce ceiling so an adversarially chatty
//! client can never starve the commit indefinitely.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::subprocess::{self, VcsError};

const MAX_PENDING: usize = 1000;

struct PendingCommit {
    descriptions: Vec<String>,
    first_pending_at: Option<Instant>,
}

impl PendingCommit {
    fn new() -> Self {
        Self {
            descriptions: Vec::new(),
            first_pending_at: None,
        }
    }
}

pub struct CoordinatorConfig {
    pub vault_path: PathBuf,
    pub remote_url: String,
    pub remote_branch: String,
    pub user_name: String,
    pub user_email: String,
    pub debounce: Duration,
    pub secret_env_vars: Vec<String>,
}

/// Singleton coordinator. Construct once at startup, share behind an `Arc`.
pub struct DebouncedCommitCoordinator {
    config: CoordinatorConfig,
    pending: Mutex<PendingCommit>,
    /// Woken whenever `schedule` re-arms the timer, so the background loop
    /// recomputes its sleep instead of firing on the previous duration.
    rearm: Notify,
    in_progress: Mutex<bool>,
    timer_task: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedCommitCoordinator {
    pub fn new(config: CoordinatorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            pending: Mutex::new(PendingCommit::new()),
            rearm: Notify::new(),
            in_progress: Mutex::new(false),
            timer_task: Mutex::new(None),
        })
    }

    /// Append `description` to the pending list (silently dropped at the
    /// 1000-entry cap — logged, not surfaced as an error since callers
    /// cannot meaningfully react), and (re)arm the debounce timer.
    pub fn schedule(self: &Arc<Self>, description: impl Into<String>) {
        let description = description.into();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if pending.descriptions.len() >= MAX_PENDING {
                warn!("pending commit list at capacity ({MAX_PENDING}); dropping description");
                return;
            }
            pending.descriptions.push(description);
            if pending.first_pending_at.is_none() {
                pending.first_pending_at = Some(Instant::now());
            }
        }
        self.arm_timer();
    }

    /// `min(D, max(0, 3·D − (now − firstPendingAt)))` — the effective delay
    /// before the next timer fire, capping the wait on the *first* unflushed
    /// entry rather than resetting on every schedule call.
    fn effective_delay(&self) -> Duration {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(first_pending_at) = pending.first_pending_at else {
            return self.config.debounce;
        };
        let ceiling = self.config.debounce.saturating_mul(3);
        let elapsed = first_pending_at.elapsed();
        let remaining_to_ceiling = ceiling.saturating_sub(elapsed);
        self.config.debounce.min(remaining_to_ceiling)
    }

    fn arm_timer(self: &Arc<Self>) {
        let mut task_slot = self.timer_task.lock().unwrap_or_else(|e| e.into_inner());
        if task_slot.is_some() {
            // A timer is already running; wake it so it recomputes the
            // (now-shorter) delay against the unchanged firstPendingAt.
            self.rearm.notify_one();
            return;
        }
        let coordinator = Arc::clone(self);
        *task_slot = Some(tokio::spawn(async move {
            loop {
                let delay = coordinator.effective_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => break,
                    _ = coordinator.rearm.notified() => continue,
                }
            }
            *coordinator.timer_task.lock().unwrap_or_else(|e| e.into_inner()) = None;
            coordinator.fire().await;
        }));
    }

    /// Timer fired: if a sequence is already running, no-op — that sequence
    /// will drain the newly-arrived descriptions on its own next iteration.
    async fn fire(self: &Arc<Self>) {
        {
            let mut in_progress = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
            if *in_progress {
                return;
            }
            *in_progress = true;
        }
        self.run_sequence().await;
        *self.in_progress.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    /// Drains the pending list in a loop: splice everything out, run one
    /// commit+push sequence, then check again before returning (so anything
    /// scheduled mid-sequence is observed before the sequence ends).
    async fn run_sequence(&self) {
        loop {
            let batch = {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                if pending.descriptions.is_empty() {
                    return;
                }
                let batch = std::mem::take(&mut pending.descriptions);
                pending.first_pending_at = None;
                batch
            };
            if let Err(e) = self.commit_and_push(&batch).await {
                error!(error = %e, "commit sequence failed; will retry on next schedule");
            }
        }
    }

    async fn commit_and_push(&self, descriptions: &[String]) -> Result<(), VcsError> {
        let secret_env_vars: Vec<&str> = self.config.secret_env_vars.iter().map(String::as_str).collect();

        subprocess::run(&["add", "."], &self.config.vault_path, &secret_env_vars).await?;

        let status = subprocess::run(
            &["status", "--porcelain"],
            &self.config.vault_path,
            &secret_env_vars,
        )
        .await?;
        if status.stdout.trim().is_empty() {
            return Ok(());
        }

        let message = build_commit_message(descriptions);
        let user_name_arg = format!("user.name={}", self.config.user_name);
        let user_email_arg = format!("user.email={}", self.config.user_email);
        subprocess::run(
            &[
                "-c",
                &user_name_arg,
                "-c",
                &user_email_arg,
                "commit",
                "-m",
                &message,
            ],
            &self.config.vault_path,
            &secret_env_vars,
        )
        .await?;

        // Idempotent: keeps "origin" pointed at the configured remote even if
        // the working tree was seeded without it (or with a stale URL).
        if subprocess::run(
            &["remote", "set-url", "origin", &self.config.remote_url],
            &self.config.vault_path,
            &secret_env_vars,
        )
        .await
        .is_err()
        {
            subprocess::run(
                &["remote", "add", "origin", &self.config.remote_url],
                &self.config.vault_path,
                &secret_env_vars,
            )
            .await?;
        }

        if let Err(e) = subprocess::run(
            &["pull", "--rebase", "origin", &self.config.remote_branch],
            &self.config.vault_path,
            &secret_env_vars,
        )
        .await
        {
            warn!(error = %e, "best-effort rebase-pull failed; proceeding to push anyway");
        }

        subprocess::run(
            &["push", "origin", &self.config.remote_branch],
            &self.config.vault_path,
            &secret_env_vars,
        )
        .await?;

        vaultgate_security::record_audit_event(&vaultgate_security::AuditEvent::CommitPushed {
            description_count: descriptions.len(),
        });
        info!(count = descriptions.len(), "committed and pushed vault changes");
        Ok(())
    }

    /// Cancel the timer, await any in-flight sequence, then if pending is
    /// non-empty run one more sequence synchronously. Used at shutdown.
    pub async fn flush(self: &Arc<Self>) {
        if let Some(task) = self.timer_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        while *self.in_progress.lock().unwrap_or_else(|e| e.into_inner()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.run_sequence().await;
    }

    /// Test-only: cancel the timer and clear pending state.
    pub fn stop(&self) {
        if let Some(task) = self.timer_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.descriptions.clear();
        pending.first_pending_at = None;
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().descriptions.len()
    }
}

fn build_commit_message(descriptions: &[String]) -> String {
    let raw = match descriptions {
        [single] => single.clone(),
        many => format!(
            "vault sync: {} operations - {}",
            many.len(),
            many.join(", ")
        ),
    };
    subprocess::sanitize_commit_message(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            vault_path: std::env::temp_dir(),
            remote_url: "https://example.com/vault.git".into(),
            remote_branch: "main".into(),
            user_name: "vaultgate".into(),
            user_email: "vaultgate@example.com".into(),
            debounce: Duration::from_millis(50),
            secret_env_vars: vec![],
        }
    }

    #[test]
    fn single_description_used_verbatim() {
        assert_eq!(build_commit_message(&["update notes.md".into()]), "update notes.md");
    }

    #[test]
    fn multiple_descriptions_are_joined_with_a_prefix() {
        let message = build_commit_message(&["a".into(), "b".into()]);
        assert!(message.starts_with("vault sync: 2 operations"));
        assert!(message.contains("a, b"));
    }

    #[tokio::test]
    async fn commit_and_push_succeeds_without_an_ambient_git_identity() {
        // Simulates the containerized vault deployment, where the git
        // binary has no global user.name/user.email configured.
        let remote = tempfile::tempdir().unwrap();
        subprocess::run(&["init", "--bare"], remote.path(), &[]).await.unwrap();

        let working = tempfile::tempdir().unwrap();
        subprocess::run(&["init", "-b", "main"], working.path(), &[]).await.unwrap();
        std::fs::write(working.path().join("note.md"), "hello").unwrap();

        let mut cfg = config();
        cfg.vault_path = working.path().to_path_buf();
        cfg.remote_url = remote.path().to_string_lossy().to_string();
        let coordinator = DebouncedCommitCoordinator::new(cfg);
        coordinator.stop();

        coordinator
            .commit_and_push(&["initial vault sync".into()])
            .await
            .unwrap();

        let log = subprocess::run(
            &["log", "-1", "--format=%an <%ae>"],
            working.path(),
            &[],
        )
        .await
        .unwrap();
        assert_eq!(log.stdout.trim(), "vaultgate <vaultgate@example.com>");
    }

    #[tokio::test]
    async fn schedule_drops_beyond_capacity() {
        let coordinator = DebouncedCommitCoordinator::new(config());
        coordinator.stop();
        for i in 0..MAX_PENDING + 10 {
            let mut pending = coordinator.pending.lock().unwrap();
            if pending.descriptions.len() >= MAX_PENDING {
                break;
            }
            pending.descriptions.push(format!("op-{i}"));
        }
        assert_eq!(coordinator.pending_count(), MAX_PENDING);
    }

    #[test]
    fn effective_delay_never_exceeds_configured_debounce() {
        let coordinator = DebouncedCommitCoordinator::new(config());
        coordinator
            .pending
            .lock()
            .unwrap()
            .descriptions
            .push("x".into());
        coordinator.pending.lock().unwrap().first_pending_at = Some(Instant::now());
        assert!(coordinator.effective_delay() <= coordinator.config.debounce);
    }

    #[test]
    fn effective_delay_shrinks_toward_the_ceiling() {
        let mut cfg = config();
        cfg.debounce = Duration::from_secs(1);
        let coordinator = DebouncedCommitCoordinator::new(cfg);
        let long_ago = Instant::now() - Duration::from_millis(2900);
        coordinator.pending.lock().unwrap().first_pending_at = Some(long_ago);
        let delay = coordinator.effective_delay();
        assert!(delay <= Duration::from_millis(150));
    }

    #[test]
    fn stop_clears_pending_state() {
        let coordinator = DebouncedCommitCoordinator::new(config());
        coordinator.schedule_for_test("a");
        coordinator.stop();
        assert_eq!(coordinator.pending_count(), 0);
    }

    impl DebouncedCommitCoordinator {
        fn schedule_for_test(&self, description: &str) {
            let mut pending = self.pending.lock().unwrap();
            pending.descriptions.push(description.to_string());
            pending.first_pending_at.get_or_insert(Instant::now());
        }
    }
}
