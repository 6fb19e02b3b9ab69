use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use timeoff_replies::config::Config;
use timeoff_replies::db::Database;
use timeoff_replies::engine::ReplyChecker;
use timeoff_replies::error::EngineError;
use timeoff_replies::messaging::ThreadMessaging;
use timeoff_replies::models::{
    EmailMode, NewTimeOffRequest, RequestStatus, RequestType, ThreadMessage, TimeOffRequest, User,
};

/// In-memory stand-in for the mailbox: each thread holds the messages posted
/// after the opening request, oldest first.
#[derive(Default)]
struct ScriptedMessaging {
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    slow: Mutex<HashSet<String>>,
    ignore_cursor: bool,
}

impl ScriptedMessaging {
    fn post(&self, thread_id: &str, message: ThreadMessage) {
        self.threads
            .lock()
            .unwrap()
            .entry(thread_id.to_string())
            .or_default()
            .push(message);
    }

    fn calls(&self, thread_id: &str) -> usize {
        self.calls.lock().unwrap().get(thread_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ThreadMessaging for ScriptedMessaging {
    async fn check_for_replies(
        &self,
        _user: &User,
        thread_id: &str,
        since_message_id: Option<&str>,
    ) -> anyhow::Result<Vec<ThreadMessage>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(thread_id.to_string())
            .or_default() += 1;

        if self.failing.lock().unwrap().contains(thread_id) {
            anyhow::bail!("connection reset");
        }
        let slow = self.slow.lock().unwrap().contains(thread_id);
        if slow {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }

        let messages = self
            .threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        if self.ignore_cursor {
            return Ok(messages);
        }
        let start = since_message_id
            .and_then(|id| messages.iter().position(|m| m.id == id))
            .map_or(0, |pos| pos + 1);
        Ok(messages[start..].to_vec())
    }
}

fn base_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0) - Duration::hours(6)
}

fn counterpart(id: &str, at: DateTime<Utc>) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        from_email: "roster@example.com".to_string(),
        from_name: Some("Rostering".to_string()),
        body: Some(format!("Re: your request ({})", id)),
        received_at: at,
        is_user_reply: false,
    }
}

fn from_user(id: &str, at: DateTime<Utc>) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        from_email: "pilot@example.com".to_string(),
        from_name: None,
        body: Some("Any update?".to_string()),
        received_at: at,
        is_user_reply: true,
    }
}

struct Harness {
    checker: ReplyChecker,
    mail: Arc<ScriptedMessaging>,
}

impl Harness {
    async fn new(mail: ScriptedMessaging) -> Self {
        Self::with_config(mail, Config::default()).await
    }

    async fn with_config(mail: ScriptedMessaging, config: Config) -> Self {
        let db = Database::in_memory().await.unwrap();
        for (id, email, admin) in [
            ("u1", "pilot@example.com", false),
            ("u2", "other@example.com", false),
            ("admin", "admin@example.com", true),
        ] {
            db.upsert_user(&User {
                id: id.to_string(),
                email: email.to_string(),
                name: None,
                is_admin: admin,
            })
            .await
            .unwrap();
        }

        let today = Utc::now().date_naive();
        db.insert_roster_period(
            Some("current"),
            today - Duration::days(10),
            today + Duration::days(60),
            true,
        )
        .await
        .unwrap();

        let mail = Arc::new(mail);
        let checker = ReplyChecker::new(db, mail.clone(), &config);
        Self { checker, mail }
    }

    fn db(&self) -> &Database {
        self.checker.db()
    }

    /// Submits consecutive days as one group and dispatches them on `thread_id`.
    async fn sent_group(&self, user_id: &str, group: &str, thread_id: &str, days: &[i64]) -> Vec<i64> {
        let today = Utc::now().date_naive();
        let mut ids = Vec::new();
        for offset in days {
            let date: NaiveDate = today + Duration::days(*offset);
            let request = self
                .db()
                .insert_request(&NewTimeOffRequest {
                    user_id: user_id.to_string(),
                    group_id: Some(group.to_string()),
                    start_date: date,
                    end_date: date,
                    request_type: RequestType::DayOff,
                    flight_number: None,
                    notes: None,
                    email_mode: EmailMode::Automatic,
                })
                .await
                .unwrap();
            ids.push(request.id);
        }
        self.db()
            .mark_email_sent(ids[0], thread_id, base_time())
            .await
            .unwrap();
        ids
    }

    async fn request(&self, id: i64) -> TimeOffRequest {
        self.db().get_request(id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn group_reply_then_approval_resolves_every_request() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    let t1 = base_time() + Duration::hours(1);
    h.mail.post("T1", counterpart("M1", t1));

    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(outcome.total_checked, 2);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.new_replies.len(), 1);
    assert_eq!(outcome.updated_requests.len(), 2);
    assert_eq!(h.mail.calls("T1"), 1, "a shared thread is fetched once");

    let reply = &outcome.new_replies[0];
    assert_eq!(reply.gmail_message_id, "M1");
    assert_eq!(reply.gmail_thread_id, "T1");
    assert_eq!(reply.time_off_request_id, ids[0], "reply is anchored to the first request");

    for id in &ids {
        let r = h.request(*id).await;
        assert!(r.needs_review);
        assert_eq!(r.reply_count, 1);
        assert_eq!(r.last_reply_at, Some(t1));
        assert!(r.last_reply_check.is_some());
    }

    let result = h
        .checker
        .process_reply(reply.id, RequestStatus::Approved, "u1")
        .await
        .unwrap();
    assert_eq!(result.linked_request.id, ids[0]);
    assert_eq!(result.all_updated_requests.len(), 2);

    for id in &ids {
        let r = h.request(*id).await;
        assert_eq!(r.status, RequestStatus::Approved);
        assert!(!r.needs_review);
        assert!(r.approval_date.is_some());
    }
    let reply = h.db().get_reply(reply.id).await.unwrap().unwrap();
    assert!(reply.is_processed);
    assert_eq!(reply.processed_by.as_deref(), Some("u1"));
}

#[tokio::test]
async fn user_speaking_last_means_no_review_needed() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    let t1 = base_time() + Duration::hours(1);
    let t2 = base_time() + Duration::hours(2);
    h.mail.post("T1", counterpart("M1", t1));
    h.mail.post("T1", from_user("M2", t2));

    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(outcome.new_replies.len(), 1, "only the counterpart message is recorded");
    assert_eq!(outcome.new_replies[0].gmail_message_id, "M1");

    for id in &ids {
        let r = h.request(*id).await;
        assert!(!r.needs_review);
        assert_eq!(r.last_reply_at, Some(t2));
    }
    assert_eq!(h.db().unprocessed_replies_for_thread("T1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn repolling_without_new_messages_only_moves_the_check_time() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.mail.post("T1", from_user("M2", base_time() + Duration::hours(2)));

    h.checker.check_user_replies("u1").await.unwrap();
    let before: Vec<TimeOffRequest> = futures::future::join_all(ids.iter().map(|id| h.request(*id))).await;

    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert!(outcome.new_replies.is_empty());
    assert!(outcome.updated_requests.is_empty());

    for old in before {
        let now = h.request(old.id).await;
        assert_eq!(now.reply_count, old.reply_count);
        assert_eq!(now.needs_review, old.needs_review);
        assert_eq!(now.last_reply_at, old.last_reply_at);
        assert!(now.last_reply_check >= old.last_reply_check);
    }
    assert_eq!(h.db().replies_for_thread("T1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn already_recorded_messages_are_never_duplicated() {
    let h = Harness::new(ScriptedMessaging {
        ignore_cursor: true,
        ..Default::default()
    })
    .await;
    let ids = h.sent_group("u1", "g1", "T1", &[5]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));

    h.checker.check_user_replies("u1").await.unwrap();
    let second = h.checker.check_user_replies("u1").await.unwrap();
    let third = h.checker.check_user_replies("u1").await.unwrap();

    assert!(second.new_replies.is_empty());
    assert!(third.new_replies.is_empty());
    assert_eq!(h.db().replies_for_thread("T1").await.unwrap().len(), 1);
    assert_eq!(h.request(ids[0]).await.reply_count, 1);
}

#[tokio::test]
async fn rereturned_user_messages_do_not_inflate_reply_count() {
    let h = Harness::new(ScriptedMessaging {
        ignore_cursor: true,
        ..Default::default()
    })
    .await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.mail.post("T1", from_user("M2", base_time() + Duration::hours(2)));

    for poll in 1..=3 {
        let outcome = h.checker.check_user_replies("u1").await.unwrap();
        if poll > 1 {
            assert!(outcome.updated_requests.is_empty(), "poll {}", poll);
        }
        for id in &ids {
            let r = h.request(*id).await;
            assert_eq!(r.reply_count, 2, "poll {}", poll);
            assert!(!r.needs_review);
        }
    }

    h.mail.post("T1", from_user("M3", base_time() + Duration::hours(3)));
    h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(h.request(ids[0]).await.reply_count, 3);
}

#[tokio::test]
async fn review_flag_follows_the_last_message_of_each_poll() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6, 7]).await;

    let script = [false, true, false, false, true];
    for (i, user_authored) in script.iter().enumerate() {
        let at = base_time() + Duration::minutes(10 * (i as i64 + 1));
        let id = format!("M{}", i + 1);
        let message = if *user_authored {
            from_user(&id, at)
        } else {
            counterpart(&id, at)
        };
        h.mail.post("T1", message);

        h.checker.check_user_replies("u1").await.unwrap();
        for request_id in &ids {
            let r = h.request(*request_id).await;
            assert_eq!(r.needs_review, !user_authored, "after message {}", id);
            assert_eq!(r.reply_count, i as i64 + 1);
        }
    }
}

#[tokio::test]
async fn reconciliation_leaves_resolved_requests_alone() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6, 7]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    let outcome = h.checker.check_user_replies("u1").await.unwrap();

    h.checker
        .override_status(ids[1], RequestStatus::Denied, "u1")
        .await
        .unwrap();

    let result = h
        .checker
        .process_reply(outcome.new_replies[0].id, RequestStatus::Approved, "u1")
        .await
        .unwrap();
    let updated: Vec<i64> = result.all_updated_requests.iter().map(|r| r.id).collect();
    assert_eq!(updated, vec![ids[0], ids[2]]);

    assert_eq!(h.request(ids[0]).await.status, RequestStatus::Approved);
    assert_eq!(h.request(ids[1]).await.status, RequestStatus::Denied);
    assert_eq!(h.request(ids[2]).await.status, RequestStatus::Approved);
}

#[tokio::test]
async fn reconciling_a_fully_resolved_thread_is_a_conflict() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    h.sent_group("u1", "g1", "T1", &[5]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.mail.post("T1", counterpart("M2", base_time() + Duration::hours(2)));
    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(outcome.new_replies.len(), 2);

    h.checker
        .process_reply(outcome.new_replies[0].id, RequestStatus::Denied, "u1")
        .await
        .unwrap();
    let err = h
        .checker
        .process_reply(outcome.new_replies[1].id, RequestStatus::Approved, "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StateConflict { .. }), "got {:?}", err);

    let untouched = h
        .db()
        .get_reply(outcome.new_replies[1].id)
        .await
        .unwrap()
        .unwrap();
    assert!(!untouched.is_processed, "a rejected decision leaves the reply open");
}

#[tokio::test]
async fn keeping_pending_clears_review_only_once_every_reply_is_handled() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    let outcome = h.checker.check_user_replies("u1").await.unwrap();

    h.checker
        .process_reply(outcome.new_replies[0].id, RequestStatus::Pending, "u1")
        .await
        .unwrap();
    for id in &ids {
        let r = h.request(*id).await;
        assert_eq!(r.status, RequestStatus::Pending);
        assert!(!r.needs_review);
        assert!(r.status_update_method.is_none());
        assert!(r.status_updated_at.is_none());
    }

    h.mail.post("T1", counterpart("M2", base_time() + Duration::hours(2)));
    h.checker.check_user_replies("u1").await.unwrap();
    for id in &ids {
        assert!(h.request(*id).await.needs_review);
    }
}

#[tokio::test]
async fn unknown_or_foreign_replies_are_not_found() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    h.sent_group("u1", "g1", "T1", &[5]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    let reply_id = outcome.new_replies[0].id;

    let missing = h
        .checker
        .process_reply(9999, RequestStatus::Approved, "u1")
        .await
        .unwrap_err();
    assert!(matches!(missing, EngineError::NotFound { entity: "reply", .. }));

    let foreign = h
        .checker
        .process_reply(reply_id, RequestStatus::Approved, "u2")
        .await
        .unwrap_err();
    assert!(matches!(foreign, EngineError::NotFound { .. }));

    let by_admin = h
        .checker
        .process_reply(reply_id, RequestStatus::Denied, "admin")
        .await
        .unwrap();
    assert_eq!(by_admin.linked_request.status, RequestStatus::Denied);
}

#[tokio::test]
async fn a_failing_thread_does_not_stop_the_others() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let good = h.sent_group("u1", "g1", "T1", &[5]).await;
    let bad = h.sent_group("u1", "g2", "T2", &[9]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.mail.post("T2", counterpart("M9", base_time() + Duration::hours(1)));
    h.mail.failing.lock().unwrap().insert("T2".to_string());

    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(outcome.total_checked, 2);
    assert_eq!(outcome.new_replies.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].thread_id, "T2");
    assert_eq!(outcome.failures[0].request_ids, bad);
    assert!(outcome.updated_requests.iter().all(|r| r.id == good[0]));

    assert!(h.request(good[0]).await.needs_review);
    let untouched = h.request(bad[0]).await;
    assert!(!untouched.needs_review);
    assert!(untouched.last_reply_check.is_none());
}

#[tokio::test]
async fn slow_threads_time_out_individually() {
    let mut config = Config::default();
    config.polling.messaging_timeout_secs = 1;
    let h = Harness::with_config(ScriptedMessaging::default(), config).await;
    h.sent_group("u1", "g1", "T1", &[5]).await;
    h.sent_group("u1", "g2", "T2", &[9]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.mail.slow.lock().unwrap().insert("T2".to_string());

    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(outcome.new_replies.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].error.contains("timed out"));
}

#[tokio::test]
async fn requests_outside_the_window_or_unsent_are_not_polled() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    h.sent_group("u1", "g1", "T1", &[200]).await;
    let today = Utc::now().date_naive();
    h.db()
        .insert_request(&NewTimeOffRequest {
            user_id: "u1".to_string(),
            group_id: None,
            start_date: today + Duration::days(3),
            end_date: today + Duration::days(3),
            request_type: RequestType::AnnualLeave,
            flight_number: Some("XY123".to_string()),
            notes: None,
            email_mode: EmailMode::Automatic,
        })
        .await
        .unwrap();

    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert_eq!(outcome.total_checked, 0);
    assert_eq!(h.mail.calls("T1"), 0);
}

#[tokio::test]
async fn threaded_response_marks_latest_reply_and_clears_review() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.mail.post("T1", counterpart("M2", base_time() + Duration::hours(2)));
    let outcome = h.checker.check_user_replies("u1").await.unwrap();
    assert!(h.request(ids[0]).await.needs_review);

    let updated = h
        .checker
        .record_user_response("u1", "T1", "Thanks, I'll swap with a colleague.")
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert!(updated.iter().all(|r| !r.needs_review));

    let newest = outcome
        .new_replies
        .iter()
        .find(|r| r.gmail_message_id == "M2")
        .unwrap();
    let newest = h.db().get_reply(newest.id).await.unwrap().unwrap();
    assert!(newest.is_processed);
    assert!(newest.user_reply_sent);
    assert_eq!(
        newest.user_reply_content.as_deref(),
        Some("Thanks, I'll swap with a colleague.")
    );

    let unprocessed = h.db().unprocessed_replies_for_thread("T1").await.unwrap();
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(unprocessed[0].gmail_message_id, "M1");

    let missing = h
        .checker
        .record_user_response("u1", "nope", "hello")
        .await
        .unwrap_err();
    assert!(matches!(missing, EngineError::NotFound { entity: "thread", .. }));
}

#[tokio::test]
async fn scheduled_pass_skips_recently_checked_users() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    h.sent_group("u1", "g1", "T1", &[5]).await;
    h.sent_group("u2", "g2", "T2", &[6]).await;

    let first = h.checker.check_all_users().await.unwrap();
    let checked: Vec<&str> = first.checked.iter().map(|(u, _)| u.as_str()).collect();
    assert_eq!(checked, vec!["u1", "u2"]);

    let second = h.checker.check_all_users().await.unwrap();
    assert!(second.checked.is_empty());
    assert_eq!(second.skipped, vec!["u1".to_string(), "u2".to_string()]);
}

#[tokio::test]
async fn pending_reviews_lists_open_replies() {
    let h = Harness::new(ScriptedMessaging::default()).await;
    let ids = h.sent_group("u1", "g1", "T1", &[5, 6]).await;
    h.mail.post("T1", counterpart("M1", base_time() + Duration::hours(1)));
    h.checker.check_user_replies("u1").await.unwrap();

    let reviews = h.checker.pending_reviews("u1").await.unwrap();
    let reviewed: Vec<i64> = reviews.iter().map(|r| r.request.id).collect();
    assert_eq!(reviewed, ids);
    assert!(reviews.iter().all(|r| r.replies.len() == 1));
    assert_eq!(reviews[0].replies[0].snippet(), "Re: your request (M1)");
}
