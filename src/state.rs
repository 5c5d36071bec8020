use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::locks::KeyedLocks;
use crate::mail::{self, Mailer};
use crate::store::{DocumentStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn Mailer>,
    /// Keyed write serialization: time entries per user, and registration.
    pub locks: Arc<KeyedLocks>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn DocumentStore> = match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url).await?;
                info!("connected to postgres document store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
                Arc::new(MemoryStore::new())
            }
        };
        let mailer = mail::from_config(&config.mail)?;

        Ok(Self::from_parts(config, store, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            store,
            mailer,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.config.store_timeout_secs)
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(
            Arc::new(MemoryStore::new()),
            Arc::new(mail::testing::RecordingMailer::default()),
        )
    }

    #[cfg(test)]
    pub fn fake_with(store: Arc<dyn DocumentStore>, mailer: Arc<dyn Mailer>) -> Self {
        use crate::config::{JwtConfig, MailConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                session_ttl_minutes: 5,
                reset_ttl_minutes: 60,
                verification_ttl_minutes: 1440,
            },
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "test@timekeep.local".into(),
                timeout_secs: 1,
            },
            app_base_url: "http://localhost:3000".into(),
            store_timeout_secs: 5,
        });
        Self::from_parts(config, store, mailer)
    }
}
