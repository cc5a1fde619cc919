//! CLI route: single route table and run context. Builds the host and dispatches
//! each command through it.

use crate::agent::HttpPageAgent;
use crate::channel::StdoutConnection;
use crate::cli::output::to_pretty_json;
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, TabmindConfig};
use crate::error::ApiError;
use crate::host::Host;
use crate::protocol::{Request, Response};
use crate::provider::{ModelProvider, OllamaProvider};
use crate::types::ContextId;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Context id used for the single page of `suggest`
const CLI_CONTEXT: ContextId = ContextId(1);

/// Runtime context for CLI execution: loaded configuration.
pub struct RunContext {
    config: TabmindConfig,
}

impl RunContext {
    /// Load configuration with `ConfigLoader`, layering `config_path` when given.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load()?,
        };
        Ok(Self { config })
    }

    pub fn from_config(config: TabmindConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TabmindConfig {
        &self.config
    }

    /// Execute a command. Must run inside a tokio runtime.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Check => self.handle_check().await,
            Commands::Prompt {
                prompt,
                context,
                session_id,
            } => {
                self.handle_prompt(prompt.clone(), context.clone(), session_id.clone())
                    .await
            }
            Commands::Suggest { url, title } => self.handle_suggest(url, title.as_deref()).await,
            Commands::Serve => self.handle_serve().await,
        }
    }

    fn build_host(&self) -> Result<Host, ApiError> {
        let provider: Arc<dyn ModelProvider> = Arc::new(OllamaProvider::new(&self.config.provider)?);
        let agent = Arc::new(HttpPageAgent::new()?);
        info!(
            provider = provider.provider_name(),
            model = %self.config.provider.model,
            "Host constructed"
        );
        Ok(Host::new(&self.config, Some(provider), agent))
    }

    async fn handle_check(&self) -> Result<String, ApiError> {
        let host = self.build_host()?;
        match host.dispatch(Request::CheckApiAvailability).await {
            Some(response) => to_pretty_json(&response),
            None => Err(ApiError::Protocol("no availability report".to_string())),
        }
    }

    async fn handle_prompt(
        &self,
        prompt: String,
        context: Option<String>,
        session_id: Option<String>,
    ) -> Result<String, ApiError> {
        let host = self.build_host()?;
        let out = Arc::new(StdoutConnection::new());
        let connection = host.channels().register(out.clone());

        let response = host
            .dispatch(Request::PromptApi {
                prompt,
                context,
                session_id,
            })
            .await;
        host.channels().unregister(connection);
        if let Err(err) = out.flush().await {
            warn!(error = %err, "Failed to flush streamed output");
        }

        match response {
            Some(Response::Prompt(prompt)) if !prompt.success => Err(ApiError::GenerationFailed(
                prompt
                    .original_error
                    .unwrap_or_else(|| "generation failed".to_string()),
            )),
            Some(response) => to_pretty_json(&response),
            None => Err(ApiError::Protocol("no prompt response".to_string())),
        }
    }

    async fn handle_suggest(&self, url: &str, title: Option<&str>) -> Result<String, ApiError> {
        let host = self.build_host()?;
        host.dispatch(Request::ContextActivated {
            context_id: CLI_CONTEXT,
            url: url.to_string(),
            title: title.unwrap_or_default().to_string(),
        })
        .await;

        match host
            .dispatch(Request::GetPageContent {
                context_id: Some(CLI_CONTEXT),
            })
            .await
        {
            Some(response) => to_pretty_json(&response),
            None => Err(ApiError::Protocol("no page content response".to_string())),
        }
    }

    /// JSON-lines host over stdio. Requests run as local tasks so a
    /// `cancelSession` line is handled while a prompt is still streaming.
    async fn handle_serve(&self) -> Result<String, ApiError> {
        let host = Rc::new(self.build_host()?);
        let out = Arc::new(StdoutConnection::new());
        let connection = host.channels().register(out.clone());
        info!(connection_id = %connection, "Serving requests on stdio");

        let stats = serve_lines(
            host.clone(),
            out.clone(),
            BufReader::new(tokio::io::stdin()),
        )
        .await;
        let served = stats.served;

        host.channels().unregister(connection);
        if let Err(err) = out.flush().await {
            warn!(error = %err, "Failed to flush responses");
        }
        Ok(format!("served {} requests", served))
    }
}

/// Counters for one `serve` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub served: usize,
    pub peak_in_flight: usize,
}

/// Answer JSON-lines requests from `input` until it closes. Each request runs
/// as a local task; finished tasks are reaped after every line.
pub async fn serve_lines<R>(host: Rc<Host>, out: Arc<StdoutConnection>, input: R) -> ServeStats
where
    R: AsyncBufRead + Unpin,
{
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let mut lines = input.lines();
            let mut in_flight = JoinSet::new();
            let mut stats = ServeStats::default();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read request line");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let host = host.clone();
                let out = out.clone();
                in_flight.spawn_local(async move {
                    if let Some(envelope) = host.handle_line(&line).await {
                        if let Err(err) = out.write_line(&envelope).await {
                            warn!(error = %err, "Failed to write response");
                        }
                    }
                });
                stats.served += 1;
                while let Some(result) = in_flight.try_join_next() {
                    log_request_result(result);
                }
                stats.peak_in_flight = stats.peak_in_flight.max(in_flight.len());
            }
            debug!(pending = in_flight.len(), "Input closed; waiting for requests in flight");
            while let Some(result) = in_flight.join_next().await {
                log_request_result(result);
            }
            stats
        })
        .await
}

fn log_request_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        warn!(error = %err, "Request task failed");
    }
}
