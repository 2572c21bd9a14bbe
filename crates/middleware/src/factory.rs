use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use mdrelay_metadata::{RelayConfig, TransportType};

use crate::error::TransportError;
use crate::memory::InMemoryTransport;
use crate::nats::{NatsTransport, SubjectBuilder};
use crate::transport::Transport;

/// Error creating middleware
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unsupported transport type: {0:?}")]
    UnsupportedTransport(TransportType),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Factory for creating middleware instances based on relay config
pub struct MiddlewareFactory;

impl MiddlewareFactory {
    /// Connect a transport for the relay link on the given port.
    /// When a stream is configured, the JetStream stream covering
    /// `subjects.all()` is created before the transport is returned.
    pub async fn connect_transport(
        config: &RelayConfig,
        port: u16,
        subjects: &SubjectBuilder,
    ) -> Result<Arc<dyn Transport>, FactoryError> {
        match config.transport_type {
            TransportType::Memory => Ok(Arc::new(InMemoryTransport::new())),
            TransportType::Nats => {
                let url = config.url(port);
                let client_name = format!("mdrelay-{}", subjects.channel_token());
                let transport = NatsTransport::connect(&url, &client_name).await?;
                if config.stream.is_some() {
                    transport
                        .ensure_stream(
                            subjects.stream_name(),
                            vec![subjects.all().to_string()],
                            Duration::from_secs(config.duplicate_window_secs),
                        )
                        .await?;
                    info!(
                        stream = %subjects.stream_name(),
                        subjects = %subjects.all(),
                        "JetStream stream ready"
                    );
                }
                Ok(Arc::new(transport))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_relay_config(transport_type: TransportType) -> RelayConfig {
        RelayConfig {
            transport_type,
            host: "127.0.0.1".to_string(),
            port: 1,
            subject_prefix: None,
            stream: None,
            duplicate_window_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_create_memory_transport() {
        let config = make_relay_config(TransportType::Memory);
        let subjects = SubjectBuilder::new("test", "Kraken/BTC/USD");
        let transport = MiddlewareFactory::connect_transport(&config, config.port, &subjects)
            .await
            .unwrap();
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_nats_connect_failure_is_reported() {
        let config = make_relay_config(TransportType::Nats);
        let subjects = SubjectBuilder::new("test", "Kraken/BTC/USD");
        let result = MiddlewareFactory::connect_transport(&config, config.port, &subjects).await;
        assert!(matches!(
            result,
            Err(FactoryError::Transport(TransportError::ConnectionFailed(_)))
        ));
    }
}
