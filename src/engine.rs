use crate::config::{Config, Polling, Window};
use crate::db::{Database, Decision, ThreadUpdate};
use crate::error::{EngineError, EngineResult};
use crate::messaging::ThreadMessaging;
use crate::models::{Reply, RequestStatus, TimeOffRequest, User};
use crate::sync::CheckState;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Serialize)]
pub struct CheckOutcome {
    pub new_replies: Vec<Reply>,
    /// Requests on threads that produced new messages, as written.
    pub updated_requests: Vec<TimeOffRequest>,
    pub total_checked: usize,
    pub failures: Vec<ThreadFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadFailure {
    pub thread_id: String,
    pub request_ids: Vec<i64>,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub checked: Vec<(String, CheckOutcome)>,
    /// Users skipped because they were checked recently or are being checked right now.
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileOutcome {
    pub linked_request: TimeOffRequest,
    pub all_updated_requests: Vec<TimeOffRequest>,
}

#[derive(Debug, Serialize)]
pub struct PendingReview {
    pub request: TimeOffRequest,
    pub replies: Vec<Reply>,
}

#[derive(Debug, Default)]
struct ThreadCheck {
    new_replies: Vec<Reply>,
    updated: Vec<TimeOffRequest>,
}

/// Async mutexes keyed by thread id. Everything that writes a thread's
/// requests holds its mutex for the whole read-fetch-write sequence.
#[derive(Default)]
struct ThreadLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    fn lock_for(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops the mutexes nobody holds or waits on.
    fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Releases the user's in-flight slot however the check ends.
struct InFlight<'a> {
    state: &'a Mutex<CheckState>,
    user_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_state(self.state).finish(&self.user_id);
    }
}

fn lock_state(state: &Mutex<CheckState>) -> MutexGuard<'_, CheckState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ReplyChecker {
    db: Database,
    messaging: Arc<dyn ThreadMessaging>,
    polling: Polling,
    window: Window,
    state: Mutex<CheckState>,
    thread_locks: ThreadLocks,
}

impl ReplyChecker {
    pub fn new(db: Database, messaging: Arc<dyn ThreadMessaging>, config: &Config) -> Self {
        Self {
            db,
            messaging,
            polling: config.polling.clone(),
            window: config.window.clone(),
            state: Mutex::new(CheckState::default()),
            thread_locks: ThreadLocks::default(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Polls every thread of the user's dispatched pending requests once.
    /// A failing thread is reported in `failures`; the others still run.
    pub async fn check_user_replies(&self, user_id: &str) -> EngineResult<CheckOutcome> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        if !lock_state(&self.state).begin(&user.id) {
            return Err(EngineError::CheckInProgress {
                user_id: user.id.clone(),
            });
        }
        let _in_flight = InFlight {
            state: &self.state,
            user_id: user.id.clone(),
        };

        let window = self
            .db
            .check_window(
                Utc::now(),
                self.window.lookback_days,
                self.window.fallback_period_count,
            )
            .await?;
        let candidates = self.db.requests_to_check(&user.id, &window).await?;
        let total_checked = candidates.len();

        let mut threads: BTreeMap<String, Vec<TimeOffRequest>> = BTreeMap::new();
        for request in candidates {
            if let Some(thread_id) = request.gmail_thread_id.clone() {
                threads.entry(thread_id).or_default().push(request);
            }
        }

        tracing::info!(
            user_id = %user.id,
            requests = total_checked,
            threads = threads.len(),
            window_start = %window.start,
            window_end = %window.end,
            "checking replies"
        );

        let user = &user;
        let results: Vec<_> = stream::iter(threads)
            .map(|(thread_id, requests)| async move {
                let result = self.check_thread(user, &thread_id, &requests).await;
                (thread_id, requests, result)
            })
            .buffer_unordered(self.polling.max_concurrent_threads.max(1))
            .collect()
            .await;

        let mut outcome = CheckOutcome {
            total_checked,
            ..Default::default()
        };
        for (thread_id, requests, result) in results {
            match result {
                Ok(check) => {
                    outcome.new_replies.extend(check.new_replies);
                    outcome.updated_requests.extend(check.updated);
                }
                Err(e) => {
                    let request_ids: Vec<i64> = requests.iter().map(|r| r.id).collect();
                    tracing::warn!(
                        user_id = %user.id,
                        thread_id = %thread_id,
                        request_ids = ?request_ids,
                        transient = e.is_transient(),
                        error = %e,
                        "reply check failed for thread"
                    );
                    outcome.failures.push(ThreadFailure {
                        thread_id,
                        request_ids,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome.new_replies.sort_by_key(|r| r.id);
        outcome.updated_requests.sort_by_key(|r| r.id);
        Ok(outcome)
    }

    async fn check_thread(
        &self,
        user: &User,
        thread_id: &str,
        requests: &[TimeOffRequest],
    ) -> EngineResult<ThreadCheck> {
        let Some(anchor) = requests.first() else {
            return Ok(ThreadCheck::default());
        };

        let lock = self.thread_locks.lock_for(thread_id);
        let _guard = lock.lock().await;

        let cursor = self.db.resume_cursor(&user.id, thread_id).await?;
        let timeout = self.polling.messaging_timeout();
        let messages = match tokio::time::timeout(
            timeout,
            self.messaging
                .check_for_replies(user, thread_id, cursor.as_deref()),
        )
        .await
        {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                return Err(EngineError::Messaging {
                    thread_id: thread_id.to_string(),
                    message: format!("{:#}", e),
                });
            }
            Err(_) => {
                return Err(EngineError::MessagingTimeout {
                    thread_id: thread_id.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let checked_at = Utc::now();
        if messages.is_empty() {
            self.db
                .touch_last_reply_check(&user.id, thread_id, checked_at)
                .await?;
            return Ok(ThreadCheck::default());
        }

        let written = self
            .db
            .apply_thread_update(&ThreadUpdate {
                user_id: &user.id,
                thread_id,
                anchor_request_id: anchor.id,
                messages: &messages,
                checked_at,
            })
            .await?;

        if written.new_message_count == 0 {
            tracing::debug!(thread_id, "only already recorded messages returned");
            return Ok(ThreadCheck::default());
        }

        let updated = self
            .db
            .pending_requests_for_thread(&user.id, thread_id)
            .await?;
        tracing::info!(
            user_id = %user.id,
            thread_id,
            new_messages = written.new_message_count,
            new_replies = written.new_replies.len(),
            needs_review = updated.first().map(|r| r.needs_review).unwrap_or_default(),
            "thread updated"
        );

        Ok(ThreadCheck {
            new_replies: written.new_replies,
            updated,
        })
    }

    /// One scheduled pass over every user with open threads. Users checked within
    /// `min_recheck_secs` or with a check still running are skipped.
    pub async fn check_all_users(&self) -> EngineResult<BatchOutcome> {
        let users = self.db.users_with_open_threads().await?;
        let grace = self.polling.min_recheck();
        lock_state(&self.state).cleanup_expired(grace);

        let mut batch = BatchOutcome::default();
        for user in users {
            if lock_state(&self.state).is_recently_checked(&user.id, grace) {
                batch.skipped.push(user.id);
                continue;
            }

            match self.check_user_replies(&user.id).await {
                Ok(outcome) => batch.checked.push((user.id, outcome)),
                Err(EngineError::CheckInProgress { user_id }) => batch.skipped.push(user_id),
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %e, "reply check failed for user");
                    batch.failed.push((user.id, e.to_string()));
                }
            }
        }
        self.thread_locks.prune();
        Ok(batch)
    }

    /// Applies a reviewer decision carried by a reply to every pending request
    /// sharing its thread.
    pub async fn process_reply(
        &self,
        reply_id: i64,
        decision: RequestStatus,
        acting_user_id: &str,
    ) -> EngineResult<ReconcileOutcome> {
        let reply = self
            .db
            .get_reply(reply_id)
            .await?
            .ok_or_else(|| EngineError::not_found("reply", reply_id))?;
        let anchor = self
            .db
            .get_request(reply.time_off_request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("request", reply.time_off_request_id))?;
        let acting = self
            .db
            .get_user(acting_user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", acting_user_id))?;

        if anchor.user_id != acting.id && !acting.is_admin {
            return Err(EngineError::not_found("reply", reply_id));
        }

        let lock = self.thread_locks.lock_for(&reply.gmail_thread_id);
        let _guard = lock.lock().await;

        let ids = self
            .db
            .apply_decision(&Decision {
                reply_id,
                owner_id: &anchor.user_id,
                thread_id: &reply.gmail_thread_id,
                status: decision,
                acting_user_id: &acting.id,
                decided_at: Utc::now(),
            })
            .await?
            .ok_or_else(|| EngineError::StateConflict {
                thread_id: reply.gmail_thread_id.clone(),
                message: format!("no pending request left to decide for reply {}", reply_id),
            })?;

        let linked_request = self
            .db
            .get_request(anchor.id)
            .await?
            .ok_or_else(|| EngineError::not_found("request", anchor.id))?;
        let mut all_updated_requests = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(request) = self.db.get_request(*id).await? {
                all_updated_requests.push(request);
            }
        }

        tracing::info!(
            reply_id,
            thread_id = %reply.gmail_thread_id,
            decision = %decision,
            acting_user_id = %acting.id,
            request_ids = ?ids,
            "reply processed"
        );

        Ok(ReconcileOutcome {
            linked_request,
            all_updated_requests,
        })
    }

    /// The user answered inside the thread. Applied right away rather than
    /// waiting for the next poll to see the user's message.
    pub async fn record_user_response(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &str,
    ) -> EngineResult<Vec<TimeOffRequest>> {
        if self.db.requests_for_thread(user_id, thread_id).await?.is_empty() {
            return Err(EngineError::not_found("thread", thread_id));
        }

        let lock = self.thread_locks.lock_for(thread_id);
        let _guard = lock.lock().await;

        let reply_id = self
            .db
            .record_user_response(user_id, thread_id, content, Utc::now())
            .await?;
        tracing::info!(user_id, thread_id, reply_id = ?reply_id, "user response recorded");

        Ok(self.db.requests_for_thread(user_id, thread_id).await?)
    }

    /// Manual status change outside the email flow.
    pub async fn override_status(
        &self,
        request_id: i64,
        status: RequestStatus,
        acting_user_id: &str,
    ) -> EngineResult<TimeOffRequest> {
        let request = self
            .db
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("request", request_id))?;
        let acting = self
            .db
            .get_user(acting_user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", acting_user_id))?;
        if request.user_id != acting.id && !acting.is_admin {
            return Err(EngineError::not_found("request", request_id));
        }

        let lock = request
            .gmail_thread_id
            .as_deref()
            .map(|thread_id| self.thread_locks.lock_for(thread_id));
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        self.db
            .set_status_manual(request_id, status, Utc::now())
            .await?;
        tracing::info!(request_id, status = %status, acting_user_id = %acting.id, "status overridden");

        self.db
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("request", request_id))
    }

    /// Requests awaiting the user's attention, with the open replies of their thread.
    pub async fn pending_reviews(&self, user_id: &str) -> EngineResult<Vec<PendingReview>> {
        let requests = self.db.requests_needing_review(user_id).await?;
        let mut reviews = Vec::with_capacity(requests.len());
        for request in requests {
            let replies = match request.gmail_thread_id.as_deref() {
                Some(thread_id) => self.db.unprocessed_replies_for_thread(thread_id).await?,
                None => Vec::new(),
            };
            reviews.push(PendingReview { request, replies });
        }
        Ok(reviews)
    }
}
