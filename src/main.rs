use anyhow::{Context, bail};
use std::sync::Arc;
use timeoff_replies::auth;
use timeoff_replies::config::Config;
use timeoff_replies::db::Database;
use timeoff_replies::engine::ReplyChecker;
use timeoff_replies::messaging::GmailThreadService;
use timeoff_replies::models::RequestStatus;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: timeoff-replies [--debug] <command>

commands:
  check <user-id>                                  poll every open thread of one user
  check-all                                        one pass over all users with open threads
  watch                                            check-all every polling interval
  process <reply-id> <approved|denied|pending> <acting-user-id>
  respond <user-id> <thread-id> <message>          record a reply the user sent in the thread
  override <request-id> <status> <acting-user-id>  set a status by hand
  reviews <user-id>                                list requests awaiting the user
  reset-token <email>                              forget the stored Gmail token";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug_logging = std::env::args().any(|arg| arg == "--debug");
    let default_filter = if debug_logging {
        "timeoff_replies=debug"
    } else {
        "timeoff_replies=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| arg != "--debug")
        .collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    // Handle token reset
    if command == "reset-token" {
        let email = args.get(1).context("reset-token needs an email")?;
        auth::RingStorage::for_account(email).clear_token().await?;
        println!("Token cleared for {}. The next check will ask for consent again.", email);
        return Ok(());
    }

    let config = Config::load();
    let db = Database::new(&config.database_url).await?;
    db.run_migrations().await?;

    let secret = auth::Authenticator::load_secret(&config.credentials_path).await?;
    let messaging = Arc::new(GmailThreadService::new(secret));
    let checker = ReplyChecker::new(db, messaging, &config);

    match (command, &args[1..]) {
        ("check", [user_id]) => {
            let outcome = checker.check_user_replies(user_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        ("check-all", []) => {
            let batch = checker.check_all_users().await?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        ("watch", []) => watch(&checker, &config).await?,
        ("process", [reply_id, decision, acting_user_id]) => {
            let reply_id: i64 = reply_id.parse().context("reply id must be a number")?;
            let decision: RequestStatus = decision.parse().map_err(anyhow::Error::msg)?;
            let outcome = checker
                .process_reply(reply_id, decision, acting_user_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        ("respond", [user_id, thread_id, message @ ..]) if !message.is_empty() => {
            let updated = checker
                .record_user_response(user_id, thread_id, &message.join(" "))
                .await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        ("override", [request_id, status, acting_user_id]) => {
            let request_id: i64 = request_id.parse().context("request id must be a number")?;
            let status: RequestStatus = status.parse().map_err(anyhow::Error::msg)?;
            let request = checker
                .override_status(request_id, status, acting_user_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        ("reviews", [user_id]) => {
            for review in checker.pending_reviews(user_id).await? {
                let r = &review.request;
                println!(
                    "#{} {} {} ({} replies, last {})",
                    r.id,
                    r.start_date,
                    r.request_type.display_name(),
                    r.reply_count,
                    r.last_reply_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string())
                );
                for reply in &review.replies {
                    println!(
                        "    reply #{} from {}: {}",
                        reply.id,
                        reply.from_name.as_deref().unwrap_or(&reply.from_email),
                        reply.snippet()
                    );
                }
            }
        }
        _ => bail!("unrecognized command\n\n{}", USAGE),
    }

    Ok(())
}

async fn watch(checker: &ReplyChecker, config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        interval_secs = config.polling.interval_secs,
        "watching for replies"
    );
    loop {
        match checker.check_all_users().await {
            Ok(batch) => {
                let new_replies: usize = batch
                    .checked
                    .iter()
                    .map(|(_, outcome)| outcome.new_replies.len())
                    .sum();
                tracing::info!(
                    users = batch.checked.len(),
                    skipped = batch.skipped.len(),
                    failed = batch.failed.len(),
                    new_replies,
                    "check pass finished"
                );
            }
            Err(e) => tracing::error!(error = %e, "check pass failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(config.polling.interval()) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopping");
                return Ok(());
            }
        }
    }
}
