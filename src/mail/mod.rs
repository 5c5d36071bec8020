//! Outbound email collaborator.
//!
//! Delivery is best effort: callers go through [`deliver`], which bounds
//! the call and logs failures instead of returning them.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MailConfig;

pub mod templates;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}

/// Posts mails as JSON to a transactional mail API.
pub struct HttpMailer {
    client: Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct SendBody<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(cfg: &MailConfig, url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            client,
            url,
            api_key: cfg.api_key.clone(),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let body = SendBody {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            html: &mail.html,
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail api request")?
            .error_for_status()
            .context("mail api rejected message")?;
        Ok(())
    }
}

/// Writes mails to the log instead of sending them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "mail not sent: no mail api configured");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match &cfg.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(cfg, url.clone())?)),
        None => {
            warn!("MAIL_API_URL not set; emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Sends under a deadline. Returns whether the mail went out.
pub async fn deliver(mailer: &dyn Mailer, timeout: Duration, mail: &OutgoingMail) -> bool {
    match tokio::time::timeout(timeout, mailer.send(mail)).await {
        Ok(Ok(())) => {
            info!(to = %mail.to, subject = %mail.subject, "mail delivered");
            true
        }
        Ok(Err(e)) => {
            warn!(error = %format!("{e:#}"), to = %mail.to, "mail delivery failed");
            false
        }
        Err(_) => {
            warn!(to = %mail.to, ?timeout, "mail delivery timed out");
            false
        }
    }
}

/// Runs [`deliver`] on its own task so the caller's latency never depends
/// on the mail API.
pub fn dispatch(
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
    mail: OutgoingMail,
) -> tokio::task::JoinHandle<bool> {
    tokio::spawn(async move { deliver(mailer.as_ref(), timeout, &mail).await })
}
