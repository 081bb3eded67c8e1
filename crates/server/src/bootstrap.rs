use std::sync::Arc;

use chatrelay_agent::tools::ImageGenerationTool;
use chatrelay_agent::{
    CompletionError, GatewayError, OpenAiCompletionClient, ToolRegistry, TurnDependencies,
    TurnOrchestrator, TurnQueue, TurnSettings,
};
use chatrelay_core::config::{AppConfig, ConfigError, LoadOptions};
use chatrelay_db::{connect_with_settings, migrations, DbPool, Repositories};
use chatrelay_gateway::FonnteClient;
use thiserror::Error;
use tracing::info;

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repositories: Repositories,
    pub queue: TurnQueue,
}

impl Application {
    pub fn state(&self) -> AppState {
        AppState {
            db_pool: self.db_pool.clone(),
            stats: self.repositories.stats.clone(),
            queue: self.queue.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("completion client setup failed: {0}")]
    Completion(#[source] CompletionError),
    #[error("messaging gateway setup failed: {0}")]
    Gateway(#[source] GatewayError),
    #[error("image tool setup failed: {0}")]
    ImageTool(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repositories = Repositories::sql(db_pool.clone());
    let registry = build_registry(&config)?;
    let completion =
        OpenAiCompletionClient::from_config(&config.llm).map_err(BootstrapError::Completion)?;
    let gateway = FonnteClient::from_config(&config.gateway).map_err(BootstrapError::Gateway)?;

    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        tools = registry.len(),
        "turn orchestrator wired"
    );

    let orchestrator = TurnOrchestrator::new(
        TurnDependencies {
            completion: Arc::new(completion),
            gateway: Arc::new(gateway),
            registry: Arc::new(registry),
            repositories: repositories.clone(),
        },
        TurnSettings::from_config(&config),
    );
    let queue = TurnQueue::new(Arc::new(orchestrator), config.agent.sender_idle());

    Ok(Application { config, db_pool, repositories, queue })
}

fn build_registry(config: &AppConfig) -> Result<ToolRegistry, BootstrapError> {
    let mut registry = ToolRegistry::default();
    let image_tool = ImageGenerationTool::from_config(&config.image, &config.llm)
        .map_err(BootstrapError::ImageTool)?;
    registry.register(image_tool);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use chatrelay_agent::tools::IMAGE_TOOL_NAME;
    use chatrelay_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap, build_registry};

    #[tokio::test]
    async fn bootstrap_fails_fast_without_gateway_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_api_key: Some("sk-test".to_string()),
                gateway_api_key: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("gateway.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_queue() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('conversation', 'message', 'tool_execution')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("conversation store tables should exist after bootstrap");
        assert_eq!(table_count, 3);

        let counts = app.repositories.stats.counts().await.expect("counts");
        assert_eq!(counts.messages, 0);
        assert_eq!(app.queue.pending(), 0);

        app.db_pool.close().await;
    }

    #[test]
    fn registry_exposes_the_image_tool() {
        let mut config = AppConfig::default();
        config.llm.api_key = "sk-test".to_string().into();

        let registry = build_registry(&config).expect("registry");

        let names: Vec<_> =
            registry.descriptors().into_iter().map(|descriptor| descriptor.name).collect();
        assert_eq!(names, vec![IMAGE_TOOL_NAME.to_string()]);
    }

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_api_key: Some("sk-test".to_string()),
                gateway_api_key: Some("fonnte-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }
}
