use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <thread_id> [database_url]", args[0]);
        eprintln!("Shows every request and recorded reply on a thread.");
        std::process::exit(1);
    }

    let thread_id = &args[1];
    let database_url = args.get(2).map(String::as_str).unwrap_or("sqlite://timeoff.db");
    let pool = SqlitePoolOptions::new()
        .connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let requests = sqlx::query(
        "SELECT id, user_id, group_id, start_date, status, needs_review, reply_count,
                last_reply_at, last_reply_check
         FROM time_off_requests
         WHERE gmail_thread_id = ?
         ORDER BY start_date, id",
    )
    .bind(thread_id)
    .fetch_all(&pool)
    .await?;

    if requests.is_empty() {
        println!("No requests found on thread '{}'", thread_id);
        return Ok(());
    }

    println!("Requests on {}:", thread_id);
    for row in &requests {
        let id: i64 = row.get("id");
        let user_id: String = row.get("user_id");
        let group_id: Option<String> = row.get("group_id");
        let start_date: String = row.get("start_date");
        let status: String = row.get("status");
        let needs_review: bool = row.get("needs_review");
        let reply_count: i64 = row.get("reply_count");
        let last_reply_at: Option<String> = row.get("last_reply_at");
        let last_reply_check: Option<String> = row.get("last_reply_check");

        println!(
            "  #{} user={} group={} date={} status={} needs_review={} replies={} last_reply={} last_check={}",
            id,
            user_id,
            group_id.as_deref().unwrap_or("-"),
            start_date,
            status,
            needs_review,
            reply_count,
            last_reply_at.as_deref().unwrap_or("-"),
            last_reply_check.as_deref().unwrap_or("-"),
        );
    }
    println!(
        "--------------------------------------------------------------------------------"
    );

    let replies = sqlx::query(
        "SELECT id, gmail_message_id, from_email, received_at, is_processed, processed_by,
                user_reply_sent, body
         FROM email_replies
         WHERE gmail_thread_id = ?
         ORDER BY received_at, id",
    )
    .bind(thread_id)
    .fetch_all(&pool)
    .await?;

    println!("Replies ({}):", replies.len());
    for row in &replies {
        let id: i64 = row.get("id");
        let message_id: String = row.get("gmail_message_id");
        let from: String = row.get("from_email");
        let received_at: String = row.get("received_at");
        let is_processed: bool = row.get("is_processed");
        let processed_by: Option<String> = row.get("processed_by");
        let user_reply_sent: bool = row.get("user_reply_sent");
        let body: Option<String> = row.get("body");

        println!(
            "  #{} {} from {} at {} processed={} by={} answered={}",
            id,
            message_id,
            from,
            received_at,
            is_processed,
            processed_by.as_deref().unwrap_or("-"),
            user_reply_sent,
        );
        println!("    {:?}", body);
    }

    Ok(())
}
