use crate::completion::OpenAIClient;
use crate::config::{AppConfig, Credentials, HTTPConfig};
use crate::http::{create_app, HttpState};
use crate::line::client::LineClient;
use crate::relay::mention::BotIdentity;
use crate::relay::prompt::PromptBuilder;
use crate::relay::Relay;
use crate::TracingReloadHandle;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::log::{error, info, warn};

#[cfg(feature = "sentry")]
pub type SentryGuard = Option<sentry::ClientInitGuard>;

#[cfg(not(feature = "sentry"))]
pub type SentryGuard = Option<()>;

pub struct AppHandles {
    server: JoinHandle<()>,
    _sentry_guard: SentryGuard,
}
impl AppHandles {
    pub fn new(
        config: AppConfig,
        credentials: Credentials,
        tracing_reload: TracingReloadHandle,
        _sentry_guard: SentryGuard,
    ) -> Result<AppHandles> {
        let completion = OpenAIClient::new(&config.openai, credentials.openai_api_key)?;
        let replies = LineClient::new(&config.line, credentials.channel_access_token)?;

        if config.line.bot_user_id.is_none() {
            warn!("No bot user ID configured, group and room mentions rely on LINE's isSelf flag only");
        }
        let relay = Relay::new(
            BotIdentity::new(config.line.bot_user_id.clone()),
            PromptBuilder::new(config.prompt),
            Arc::new(completion),
            Arc::new(replies),
        );

        let state = HttpState {
            relay,
            channel_secret: Arc::from(credentials.channel_secret),
            tracing_reload: Some(tracing_reload),
        };
        let app = create_app(state, credentials.admin_token, _sentry_guard.is_some());
        let server = Self::start_http_server(config.http, app);

        Ok(AppHandles {
            server,
            _sentry_guard,
        })
    }

    pub async fn run(self) {
        info!("Starting task: HTTP Server");
        match self.server.await {
            Ok(_) => error!("HTTP Server task completed!"),
            Err(e) => error!("HTTP Server task failed: {e:?}!"),
        }
    }

    fn start_http_server(config: HTTPConfig, app: axum::Router) -> JoinHandle<()> {
        let address = config.address;
        tokio::spawn(async move {
            let result = match config.tls {
                Some(_tls_config) => {
                    #[cfg(any(feature = "tls-rustls", feature = "tls-native"))]
                    {
                        info!("Starting HTTPS (secure) server on {address}");

                        #[cfg(feature = "tls-rustls")]
                        {
                            let _ = rustls::crypto::CryptoProvider::install_default(
                                rustls::crypto::aws_lc_rs::default_provider(),
                            );
                            match axum_server::tls_rustls::RustlsConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            )
                            .await
                            {
                                Ok(tls) => axum_server::bind_rustls(address, tls)
                                    .serve(app.into_make_service())
                                    .await
                                    .map_err(anyhow::Error::from),
                                Err(e) => Err(anyhow::anyhow!(
                                    "Failed to load rustls TLS certificates: {e}"
                                )),
                            }
                        }

                        #[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
                        {
                            match axum_server::tls_openssl::OpenSSLConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            ) {
                                Ok(tls) => axum_server::bind_openssl(address, tls)
                                    .serve(app.into_make_service())
                                    .await
                                    .map_err(anyhow::Error::from),
                                Err(e) => Err(anyhow::anyhow!(
                                    "Failed to load openssl TLS certificates: {e}"
                                )),
                            }
                        }
                    }

                    #[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
                    Err(anyhow::anyhow!(
                        "HTTP Server TLS configuration provided but no TLS features enabled. Compile with a TLS backend feature!"
                    ))
                }
                None => {
                    info!("Starting HTTP (insecure) server on {address}");
                    axum_server::bind(address)
                        .serve(app.into_make_service())
                        .await
                        .map_err(anyhow::Error::from)
                }
            };

            if let Err(e) = result {
                #[cfg(feature = "sentry")]
                sentry_anyhow::capture_anyhow(&e);

                error!("Server error: {e:?}");
            }
        })
    }
}
