use anyhow::{Result, Context};
use keyring::Entry;
use yup_oauth2::{InstalledFlowAuthenticator, InstalledFlowReturnMethod, ApplicationSecret, read_application_secret};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use google_gmail1::oauth2;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use yup_oauth2::storage::{TokenStorage, TokenInfo};
use serde::{Serialize, Deserialize};
use async_trait::async_trait;

const APP_NAME: &str = "timeoff-replies";

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

pub type GmailAuthenticator =
    oauth2::authenticator::Authenticator<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

/// Keyring-backed token cache, one entry per mailbox.
pub struct RingStorage {
    account: String,
}

impl RingStorage {
    pub fn for_account(email: &str) -> Self {
        Self {
            account: email.to_lowercase(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(APP_NAME, &format!("gmail_token:{}", self.account))
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
    }

    async fn get_all(&self) -> Result<TokenData> {
        match self.entry()?.get_password() {
            Ok(serialized) => serde_json::from_str(&serialized)
                .context("Failed to deserialize tokens"),
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }

    pub async fn clear_token(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> Result<()> {
        let mut data = self.get_all().await.unwrap_or_default();
        data.tokens.clear();
        data.tokens.push(token);

        let serialized = serde_json::to_string(&data)
            .context("Failed to serialize tokens")?;

        self.entry()?
            .set_password(&serialized)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.get_all().await.ok().and_then(|data| data.tokens.first().cloned())
    }
}

/// Opens the consent page in a browser; the redirect flow picks up the code.
pub struct BrowserDelegate {
    account: String,
}

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(account = %self.account, "Gmail consent required");
            if let Err(e) = open::that(url) {
                tracing::warn!(error = %e, "could not open a browser");
                println!("Authorize {} by visiting:\n{}", self.account, url);
            }
            Ok(String::new())
        })
    }
}

pub struct Authenticator;

impl Authenticator {
    pub async fn load_secret<P: AsRef<Path>>(path: P) -> Result<ApplicationSecret> {
        read_application_secret(path).await.context("Failed to read application secret")
    }

    pub async fn authenticate(secret: ApplicationSecret, account: &str) -> Result<GmailAuthenticator> {
        let auth = InstalledFlowAuthenticator::builder(
            secret,
            InstalledFlowReturnMethod::HTTPRedirect,
        )
        .with_storage(Box::new(RingStorage::for_account(account)))
        .flow_delegate(Box::new(BrowserDelegate {
            account: account.to_string(),
        }))
        .build()
        .await
        .context("Failed to build authenticator")?;

        Ok(auth)
    }
}
