//! Agency agent server
//!
//! Runs the echo agent behind the task protocol, publishes its descriptor
//! and keeps itself listed in a registry for as long as it is up.

use std::sync::Arc;
use std::time::Duration;

use agency_framework::prelude::{
    AgentServerConfig, Credentials, InMemoryTaskStore, QueueMode, RegistrationHook,
    StreamingExecutor,
};
use anyhow::Result;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod card;
mod echo;
mod error;
mod server;

use auth::Authenticator;
use echo::EchoAgent;
use server::{AgentAppState, agent_router};

/// Command-line arguments for the agent server
#[derive(Parser, Debug)]
#[clap(name = "agency-agent", about = "Echo agent speaking the Agency task protocol")]
struct Args {
    /// Host to bind to
    #[clap(long, env = "AGENT_HOST", default_value = "localhost")]
    host: String,

    /// Port to listen on
    #[clap(short, long, env = "AGENT_PORT", default_value = "10010")]
    port: u16,

    /// Public address of this agent, if it differs from http://host:port
    #[clap(long, env = "AGENT_URL")]
    url: Option<String>,

    /// Registry to register with on startup
    #[clap(long, env = "REGISTRY_URL", default_value = "http://localhost:6000")]
    registry_url: String,

    /// Skip registry registration entirely
    #[clap(long)]
    no_register: bool,

    #[clap(long, env = "AGENT_NAME", default_value = "echo_agent")]
    agent_name: String,

    #[clap(
        long,
        env = "AGENT_DESCRIPTION",
        default_value = "Echoes messages back in small increments."
    )]
    description: String,

    /// Require authentication on every non-public path
    #[clap(long, env = "SECURE_AGENT")]
    secure_agent: bool,

    /// API keys as `user:key` pairs, comma separated
    #[clap(long, env = "AGENT_API_KEYS", default_value = "")]
    api_keys: String,

    /// Basic auth users as `user:password` pairs, comma separated
    #[clap(long, env = "AGENT_USERS", default_value = "")]
    users: String,

    /// Bound the per-task event queue; unbounded when unset
    #[clap(long, env = "AGENT_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Delay between words of the echo, in milliseconds
    #[clap(long, default_value = "50")]
    echo_delay_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[clap(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<AgentServerConfig> {
        let credentials = Credentials {
            api_keys: Credentials::parse_pairs(&self.api_keys)?,
            users: Credentials::parse_pairs(&self.users)?,
        };
        let queue_mode = match self.queue_capacity {
            Some(capacity) => QueueMode::Bounded { capacity },
            None => QueueMode::Unbounded,
        };
        Ok(AgentServerConfig {
            host: self.host,
            port: self.port,
            url: self.url,
            registry_url: self.registry_url,
            agent_name: self.agent_name,
            description: self.description,
            secure_agent: self.secure_agent,
            credentials,
            queue_mode,
            ..AgentServerConfig::default()
        })
    }
}

fn build_app(config: &AgentServerConfig, echo_delay: Duration) -> Router {
    let agent = EchoAgent::new(&config.agent_name).with_delay(echo_delay);
    let state = AgentAppState {
        descriptor: card::build_descriptor(config),
        executor: Arc::new(StreamingExecutor::new(agent)),
        tasks: InMemoryTaskStore::new(),
        queue_mode: config.queue_mode,
    };
    agent_router(state, Authenticator::from_config(config)).layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let log_level = args.log_level.clone();
    let register = !args.no_register;
    let echo_delay = Duration::from_millis(args.echo_delay_ms);
    let config = args.into_config()?;

    // Setup tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let agent_url = config.effective_url();
    info!("Starting agent '{}' at {}", config.agent_name, agent_url);
    if config.auth_enabled() {
        info!("Authentication enabled");
    }

    let app = build_app(&config, echo_delay);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Agent listening on {}", addr);

    // Registration runs alongside the server; its failure never stops the agent
    let hook = RegistrationHook::new(&agent_url, &config.registry_url, config.registration.clone());
    if register {
        hook.spawn_registration();
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if hook.deregister().await {
        info!("Deregistered from {}", config.registry_url);
    }
    info!("Agent stopped");
    Ok(())
}
