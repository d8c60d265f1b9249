use std::sync::Arc;

use anyhow::{Error, Result};
use settlement_service::{
    api::{AppState, run_api_server},
    clients::{
        database::PostgresInstructionRepository, gateway::QueueGateway, health::HealthChecker,
        memory::InMemoryInstructionRepository, rbmq::RabbitMqGateway, template::TemplateLibrary,
    },
    config::Config,
    services::{
        correlation::{CorrelationStore, InstructionRepository},
        dispatcher::OutboundDispatcher,
        message_builder::MessageBuilder,
        poller::{QueueStateRegistry, StatusPoller},
    },
    utils::init_tracing,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::load()?;

    let gateway: Arc<dyn QueueGateway> = Arc::new(RabbitMqGateway::connect(&config).await?);

    let repository: Arc<dyn InstructionRepository> = match &config.database_url {
        Some(database_url) => {
            let repository =
                PostgresInstructionRepository::connect(database_url, config.retry_config()).await?;
            repository.init_schema().await?;
            Arc::new(repository)
        }
        None => {
            warn!("DATABASE_URL not set, instructions are kept in memory only");
            Arc::new(InMemoryInstructionRepository::new())
        }
    };

    let store = Arc::new(CorrelationStore::new(Arc::clone(&repository)));
    let templates = Arc::new(TemplateLibrary::new(&config.template_dir));
    let registry = Arc::new(QueueStateRegistry::new(&config.status_queue_configs()));

    let dispatcher = Arc::new(OutboundDispatcher::new(
        Arc::clone(&gateway),
        Arc::clone(&store),
        templates,
        config.remote_address.clone(),
    ));

    let poller = Arc::new(StatusPoller::new(
        Arc::clone(&gateway),
        Arc::clone(&store),
        Arc::clone(&registry),
        config.poller_config(),
    ));
    let pollers = poller.spawn();

    let state = Arc::new(AppState {
        health_checker: HealthChecker::new(repository, gateway, Arc::clone(&registry)),
        registry,
        dispatcher,
        store,
        builder: MessageBuilder::new(),
        outbound_queue_name: config.outbound_queue_name.clone(),
        default_environment: config.default_environment,
    });

    let served = run_api_server(state, config.server_port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    })
    .await;

    pollers.shutdown().await;

    served
}
