use crate::models::{
    self, EmailMode, NewTimeOffRequest, Reply, RequestStatus, RosterPeriod, StatusUpdateMethod,
    ThreadMessage, TimeOffRequest, User,
};
use crate::window::{self, CheckWindow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

const REQUEST_COLUMNS: &str = "id, user_id, group_id, start_date, end_date, request_type, \
     flight_number, notes, status, status_update_method, status_updated_at, approval_date, \
     email_mode, email_sent, manual_email_confirmed, gmail_thread_id, needs_review, reply_count, \
     last_reply_at, last_reply_check, created_at";

const REPLY_COLUMNS: &str = "id, time_off_request_id, gmail_message_id, gmail_thread_id, \
     from_email, from_name, body, received_at, is_processed, processed_at, processed_by, \
     user_reply_sent, user_reply_content, user_reply_at, created_at";

/// Everything one poll of a thread wants to write.
#[derive(Debug, Clone)]
pub struct ThreadUpdate<'a> {
    pub user_id: &'a str,
    pub thread_id: &'a str,
    pub anchor_request_id: i64,
    pub messages: &'a [ThreadMessage],
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ThreadUpdateResult {
    pub new_replies: Vec<Reply>,
    /// Messages of either author that were not recorded before.
    pub new_message_count: i64,
}

/// A reviewer decision to apply to every pending request of a thread.
#[derive(Debug, Clone)]
pub struct Decision<'a> {
    pub reply_id: i64,
    pub owner_id: &'a str,
    pub thread_id: &'a str,
    pub status: RequestStatus,
    pub acting_user_id: &'a str,
    pub decided_at: DateTime<Utc>,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        use sqlx::sqlite::SqliteConnectOptions;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database. Pinned to one connection since every
    /// `:memory:` connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");
        sqlx::query(schema).execute(&self.pool).await?;
        Ok(())
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub async fn upsert_user(&self, user: &User) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, name, is_admin) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET email=excluded.email, name=excluded.name,
             is_admin=excluded.is_admin",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.is_admin)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> sqlx::Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, is_admin FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    /// Users with at least one dispatched, still pending request.
    pub async fn users_with_open_threads(&self) -> sqlx::Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT DISTINCT u.id, u.email, u.name, u.is_admin
             FROM users u
             JOIN time_off_requests r ON r.user_id = u.id
             WHERE r.status = 'PENDING'
               AND r.email_sent IS NOT NULL
               AND r.gmail_thread_id IS NOT NULL
             ORDER BY u.id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    // ── Roster periods ───────────────────────────────────────────────────────

    pub async fn insert_roster_period(
        &self,
        name: Option<&str>,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
        is_active: bool,
    ) -> sqlx::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO roster_periods (name, start_period, end_period, is_active) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(start)
        .bind(end)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn roster_periods(&self) -> sqlx::Result<Vec<RosterPeriod>> {
        let rows = sqlx::query(
            "SELECT id, name, start_period, end_period, is_active FROM roster_periods
             ORDER BY start_period DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RosterPeriod {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    start_period: row.try_get("start_period")?,
                    end_period: row.try_get("end_period")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }

    pub async fn check_window(
        &self,
        now: DateTime<Utc>,
        lookback_days: i64,
        fallback_count: usize,
    ) -> sqlx::Result<CheckWindow> {
        let periods = self.roster_periods().await?;
        Ok(window::select_check_window(
            &periods,
            now,
            lookback_days,
            fallback_count,
        ))
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    pub async fn insert_request(&self, new: &NewTimeOffRequest) -> sqlx::Result<TimeOffRequest> {
        let result = sqlx::query(
            "INSERT INTO time_off_requests (user_id, group_id, start_date, end_date, request_type,
             flight_number, notes, status, email_mode, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, ?)",
        )
        .bind(&new.user_id)
        .bind(&new.group_id)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.request_type.as_str())
        .bind(&new.flight_number)
        .bind(&new.notes)
        .bind(new.email_mode.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_request(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_request(&self, id: i64) -> sqlx::Result<Option<TimeOffRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM time_off_requests WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| request_from_row(&r)).transpose()
    }

    /// The request itself plus, when it belongs to a group, every other member.
    pub async fn request_with_group(&self, id: i64) -> sqlx::Result<Vec<TimeOffRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM time_off_requests
             WHERE id = ?1
                OR (group_id IS NOT NULL
                    AND group_id = (SELECT group_id FROM time_off_requests WHERE id = ?1))
             ORDER BY start_date, id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    /// Records that the outbound message went out. Writes the whole group so its
    /// members can never end up on different threads.
    pub async fn mark_email_sent(
        &self,
        request_id: i64,
        thread_id: &str,
        sent_at: DateTime<Utc>,
    ) -> sqlx::Result<Vec<TimeOffRequest>> {
        sqlx::query(
            "UPDATE time_off_requests
             SET email_sent = ?1, gmail_thread_id = ?2, email_mode = 'automatic'
             WHERE id = ?3
                OR (group_id IS NOT NULL
                    AND group_id = (SELECT group_id FROM time_off_requests WHERE id = ?3))",
        )
        .bind(sent_at)
        .bind(thread_id)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        self.request_with_group(request_id).await
    }

    pub async fn confirm_manual_email(&self, request_id: i64) -> sqlx::Result<Vec<TimeOffRequest>> {
        sqlx::query(
            "UPDATE time_off_requests
             SET manual_email_confirmed = 1, email_mode = 'manual'
             WHERE id = ?1
                OR (group_id IS NOT NULL
                    AND group_id = (SELECT group_id FROM time_off_requests WHERE id = ?1))",
        )
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        self.request_with_group(request_id).await
    }

    /// Pending, dispatched requests of a user whose date falls inside the window.
    pub async fn requests_to_check(
        &self,
        user_id: &str,
        window: &CheckWindow,
    ) -> sqlx::Result<Vec<TimeOffRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM time_off_requests
             WHERE user_id = ?
               AND status = 'PENDING'
               AND email_sent IS NOT NULL
               AND gmail_thread_id IS NOT NULL
               AND start_date >= ?
               AND start_date <= ?
             ORDER BY start_date, id"
        ))
        .bind(user_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    pub async fn requests_for_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> sqlx::Result<Vec<TimeOffRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM time_off_requests
             WHERE user_id = ? AND gmail_thread_id = ?
             ORDER BY start_date, id"
        ))
        .bind(user_id)
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    pub async fn pending_requests_for_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> sqlx::Result<Vec<TimeOffRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM time_off_requests
             WHERE user_id = ? AND gmail_thread_id = ? AND status = 'PENDING'
             ORDER BY start_date, id"
        ))
        .bind(user_id)
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    pub async fn requests_needing_review(&self, user_id: &str) -> sqlx::Result<Vec<TimeOffRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM time_off_requests
             WHERE user_id = ? AND needs_review = 1
             ORDER BY start_date, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    pub async fn set_status_manual(
        &self,
        request_id: i64,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE time_off_requests
             SET status = ?, status_update_method = ?, status_updated_at = ?,
                 approval_date = CASE WHEN ? = 'APPROVED' THEN ? ELSE approval_date END,
                 needs_review = 0
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(StatusUpdateMethod::Manual.as_str())
        .bind(updated_at)
        .bind(status.as_str())
        .bind(updated_at)
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Cursors & polling writes ─────────────────────────────────────────────

    /// Where the next poll of a thread should resume: the last message of any
    /// author seen on it, else the most recently received recorded reply.
    pub async fn resume_cursor(&self, user_id: &str, thread_id: &str) -> sqlx::Result<Option<String>> {
        let cursor: Option<String> = sqlx::query_scalar(
            "SELECT last_message_id FROM thread_cursors WHERE user_id = ? AND gmail_thread_id = ?",
        )
        .bind(user_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        match cursor {
            Some(id) => Ok(Some(id)),
            None => self.latest_reply_message_id(thread_id).await,
        }
    }

    pub async fn latest_reply_message_id(&self, thread_id: &str) -> sqlx::Result<Option<String>> {
        sqlx::query_scalar(
            "SELECT gmail_message_id FROM email_replies WHERE gmail_thread_id = ?
             ORDER BY received_at DESC, id DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// A poll that found nothing: only the check timestamp moves.
    pub async fn touch_last_reply_check(
        &self,
        user_id: &str,
        thread_id: &str,
        checked_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE time_off_requests SET last_reply_check = ?
             WHERE user_id = ? AND gmail_thread_id = ? AND status = 'PENDING'",
        )
        .bind(checked_at)
        .bind(user_id)
        .bind(thread_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records new replies, advances the cursor and refreshes the review state of
    /// the thread's pending requests in one transaction.
    pub async fn apply_thread_update(
        &self,
        update: &ThreadUpdate<'_>,
    ) -> sqlx::Result<ThreadUpdateResult> {
        let mut tx = self.pool.begin().await?;
        let mut result = ThreadUpdateResult::default();

        for msg in update.messages {
            if msg.is_user_reply {
                let seen = sqlx::query(
                    "INSERT OR IGNORE INTO thread_messages (user_id, gmail_thread_id,
                     gmail_message_id, received_at) VALUES (?, ?, ?, ?)",
                )
                .bind(update.user_id)
                .bind(update.thread_id)
                .bind(&msg.id)
                .bind(msg.received_at)
                .execute(&mut *tx)
                .await?;
                if seen.rows_affected() > 0 {
                    result.new_message_count += 1;
                }
                continue;
            }

            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO email_replies (time_off_request_id, gmail_message_id,
                 gmail_thread_id, from_email, from_name, body, received_at, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(update.anchor_request_id)
            .bind(&msg.id)
            .bind(update.thread_id)
            .bind(&msg.from_email)
            .bind(&msg.from_name)
            .bind(&msg.body)
            .bind(msg.received_at)
            .bind(update.checked_at)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                continue;
            }

            let row = sqlx::query(&format!("SELECT {REPLY_COLUMNS} FROM email_replies WHERE id = ?"))
                .bind(inserted.last_insert_rowid())
                .fetch_one(&mut *tx)
                .await?;
            result.new_replies.push(reply_from_row(&row)?);
            result.new_message_count += 1;
        }

        let latest = crate::messaging::latest_message(update.messages);

        match latest {
            Some(latest) if result.new_message_count > 0 => {
                sqlx::query(
                    "UPDATE time_off_requests
                     SET reply_count = reply_count + ?, last_reply_at = ?, last_reply_check = ?,
                         needs_review = ?
                     WHERE user_id = ? AND gmail_thread_id = ? AND status = 'PENDING'",
                )
                .bind(result.new_message_count)
                .bind(latest.received_at)
                .bind(update.checked_at)
                .bind(!latest.is_user_reply)
                .bind(update.user_id)
                .bind(update.thread_id)
                .execute(&mut *tx)
                .await?;
            }
            _ => {
                sqlx::query(
                    "UPDATE time_off_requests SET last_reply_check = ?
                     WHERE user_id = ? AND gmail_thread_id = ? AND status = 'PENDING'",
                )
                .bind(update.checked_at)
                .bind(update.user_id)
                .bind(update.thread_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(latest) = latest {
            sqlx::query(
                "INSERT INTO thread_cursors (user_id, gmail_thread_id, last_message_id, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(user_id, gmail_thread_id) DO UPDATE SET
                 last_message_id=excluded.last_message_id, updated_at=excluded.updated_at",
            )
            .bind(update.user_id)
            .bind(update.thread_id)
            .bind(&latest.id)
            .bind(update.checked_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(result)
    }

    // ── Replies ──────────────────────────────────────────────────────────────

    pub async fn get_reply(&self, id: i64) -> sqlx::Result<Option<Reply>> {
        let row = sqlx::query(&format!("SELECT {REPLY_COLUMNS} FROM email_replies WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| reply_from_row(&r)).transpose()
    }

    pub async fn replies_for_thread(&self, thread_id: &str) -> sqlx::Result<Vec<Reply>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPLY_COLUMNS} FROM email_replies WHERE gmail_thread_id = ?
             ORDER BY received_at, id"
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reply_from_row).collect()
    }

    pub async fn unprocessed_replies_for_thread(&self, thread_id: &str) -> sqlx::Result<Vec<Reply>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPLY_COLUMNS} FROM email_replies
             WHERE gmail_thread_id = ? AND is_processed = 0
             ORDER BY received_at, id"
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reply_from_row).collect()
    }

    /// Marks the reply processed and writes the decision to every pending request
    /// of the owner on the thread. Returns the ids written, or `None` when no
    /// pending request was left to decide.
    pub async fn apply_decision(&self, decision: &Decision<'_>) -> sqlx::Result<Option<Vec<i64>>> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock before it reads.
        sqlx::query(
            "UPDATE email_replies SET is_processed = 1, processed_at = ?, processed_by = ?
             WHERE id = ?",
        )
        .bind(decision.decided_at)
        .bind(decision.acting_user_id)
        .bind(decision.reply_id)
        .execute(&mut *tx)
        .await?;

        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM time_off_requests
             WHERE user_id = ? AND gmail_thread_id = ? AND status = 'PENDING'
             ORDER BY start_date, id",
        )
        .bind(decision.owner_id)
        .bind(decision.thread_id)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(None);
        }

        let approval_date = (decision.status == RequestStatus::Approved).then_some(decision.decided_at);
        for id in &ids {
            let update = if decision.status == RequestStatus::Pending {
                sqlx::query(
                    "UPDATE time_off_requests SET needs_review = 0
                     WHERE id = ? AND status = 'PENDING'",
                )
                .bind(id)
            } else {
                sqlx::query(
                    "UPDATE time_off_requests
                     SET status = ?, needs_review = 0, status_update_method = ?,
                         status_updated_at = ?, approval_date = COALESCE(?, approval_date)
                     WHERE id = ? AND status = 'PENDING'",
                )
                .bind(decision.status.as_str())
                .bind(StatusUpdateMethod::EmailReply.as_str())
                .bind(decision.decided_at)
                .bind(approval_date)
                .bind(id)
            };
            update.execute(&mut *tx).await?;
        }

        let unprocessed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM email_replies WHERE gmail_thread_id = ? AND is_processed = 0",
        )
        .bind(decision.thread_id)
        .fetch_one(&mut *tx)
        .await?;

        if unprocessed == 0 {
            sqlx::query(
                "UPDATE time_off_requests SET needs_review = 0
                 WHERE user_id = ? AND gmail_thread_id = ?",
            )
            .bind(decision.owner_id)
            .bind(decision.thread_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(ids))
    }

    /// The user answered inside the thread: the newest open reply counts as
    /// handled and the thread no longer needs review. Returns the reply marked.
    pub async fn record_user_response(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> sqlx::Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE time_off_requests SET needs_review = 0
             WHERE user_id = ? AND gmail_thread_id = ?",
        )
        .bind(user_id)
        .bind(thread_id)
        .execute(&mut *tx)
        .await?;

        let reply_id: Option<i64> = sqlx::query_scalar(
            "SELECT rep.id FROM email_replies rep
             JOIN time_off_requests r ON r.id = rep.time_off_request_id
             WHERE rep.gmail_thread_id = ? AND r.user_id = ? AND rep.is_processed = 0
             ORDER BY rep.received_at DESC, rep.id DESC LIMIT 1",
        )
        .bind(thread_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(id) = reply_id {
            sqlx::query(
                "UPDATE email_replies
                 SET is_processed = 1, processed_at = ?, processed_by = ?, user_reply_sent = 1,
                     user_reply_content = ?, user_reply_at = ?
                 WHERE id = ?",
            )
            .bind(sent_at)
            .bind(user_id)
            .bind(content)
            .bind(sent_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(reply_id)
    }
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> sqlx::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        is_admin: row.try_get("is_admin")?,
    })
}

fn request_from_row(row: &SqliteRow) -> sqlx::Result<models::TimeOffRequest> {
    let status_update_method = row
        .try_get::<Option<String>, _>("status_update_method")?
        .map(|raw| {
            raw.parse::<StatusUpdateMethod>()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: "status_update_method".to_string(),
                    source: e.into(),
                })
        })
        .transpose()?;

    Ok(models::TimeOffRequest {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        group_id: row.try_get("group_id")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        request_type: parse_column(row, "request_type")?,
        flight_number: row.try_get("flight_number")?,
        notes: row.try_get("notes")?,
        status: parse_column(row, "status")?,
        status_update_method,
        status_updated_at: row.try_get("status_updated_at")?,
        approval_date: row.try_get("approval_date")?,
        email_mode: parse_column::<EmailMode>(row, "email_mode")?,
        email_sent: row.try_get("email_sent")?,
        manual_email_confirmed: row.try_get("manual_email_confirmed")?,
        gmail_thread_id: row.try_get("gmail_thread_id")?,
        needs_review: row.try_get("needs_review")?,
        reply_count: row.try_get("reply_count")?,
        last_reply_at: row.try_get("last_reply_at")?,
        last_reply_check: row.try_get("last_reply_check")?,
        created_at: row.try_get("created_at")?,
    })
}

fn reply_from_row(row: &SqliteRow) -> sqlx::Result<Reply> {
    Ok(Reply {
        id: row.try_get("id")?,
        time_off_request_id: row.try_get("time_off_request_id")?,
        gmail_message_id: row.try_get("gmail_message_id")?,
        gmail_thread_id: row.try_get("gmail_thread_id")?,
        from_email: row.try_get("from_email")?,
        from_name: row.try_get("from_name")?,
        body: row.try_get("body")?,
        received_at: row.try_get("received_at")?,
        is_processed: row.try_get("is_processed")?,
        processed_at: row.try_get("processed_at")?,
        processed_by: row.try_get("processed_by")?,
        user_reply_sent: row.try_get("user_reply_sent")?,
        user_reply_content: row.try_get("user_reply_content")?,
        user_reply_at: row.try_get("user_reply_at")?,
        created_at: row.try_get("created_at")?,
    })
}
