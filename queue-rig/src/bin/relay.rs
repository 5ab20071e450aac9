//! QueueLoop Relay - re-publishes every message back onto its own queue.
//!
//! This binary:
//! 1. Resolves the configured queue and builds a [`Relayer`] for it
//! 2. Consumes the same queue, grouping ready deliveries into batches
//! 3. Hands each batch to the relayer, which re-publishes every body verbatim
//! 4. ACKs a batch that relayed fully, NACKs (with requeue) one that did not
//!
//! IMPORTANT: output goes to the SAME queue the relay reads from. This is an
//! intentional infinite loop used for performance testing.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use queueloop::config::amqp_url_from_env;
use queueloop::telemetry::{init_tracing, shutdown_signal};
use queueloop::{settle_batch, AmqpQueueClient, DeliveredMessage, RelayConfig, Relayer, Settlement};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("relay_starting");

    let config = RelayConfig::from_env().context("configuration error")?;
    info!(
        queue = %config.queue_name,
        delay_ms = config.delay.as_millis() as u64,
        batch_size = config.batch_size,
        prefetch = config.prefetch,
        "config_loaded"
    );

    run(config).await
}

/// Consume batches until shutdown.
async fn run(config: RelayConfig) -> Result<()> {
    let amqp_url = amqp_url_from_env();
    let client = AmqpQueueClient::new(amqp_url.clone());
    let cancel = CancellationToken::new();

    let relayer = Relayer::bootstrap(Arc::new(client.clone()), &config)
        .await
        .context("getting URL error")?
        .with_cancellation(cancel.clone());

    // Deliveries arrive on their own connection, separate from the publisher
    info!(url_length = amqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    channel
        .basic_qos(config.prefetch, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = config.prefetch, "rabbitmq_qos_set");

    let consumer = channel
        .basic_consume(
            &config.queue_name,
            "queueloop-relay",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = %config.queue_name, "rabbitmq_consumer_started");
    info!("relay_ready");

    let channel = Arc::new(channel);
    let mut batches = consumer.ready_chunks(config.batch_size);
    let mut in_flight = JoinSet::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("relay_stopping");
                break;
            }
            // Reap finished invocations so the set stays small
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "relay_batch_task_aborted");
                }
            }
            batch = batches.next() => {
                let Some(batch) = batch else {
                    warn!("rabbitmq_consumer_closed");
                    break;
                };

                let deliveries: Vec<Delivery> = batch
                    .into_iter()
                    .filter_map(|delivery| match delivery {
                        Ok(delivery) => Some(delivery),
                        Err(e) => {
                            error!(error = %e, "rabbitmq_delivery_error");
                            None
                        }
                    })
                    .collect();
                if deliveries.is_empty() {
                    continue;
                }

                let relayer = relayer.clone();
                let channel = Arc::clone(&channel);
                let queue_name = config.queue_name.clone();

                // Each batch is one independent invocation
                in_flight.spawn(async move {
                    invoke(&relayer, &channel, &queue_name, deliveries).await;
                });
            }
        }
    }

    cancel.cancel();
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "relay_batch_task_aborted");
        }
    }

    client.close().await;
    if let Err(e) = conn.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("relay_shutdown_complete");
    Ok(())
}

/// Run the relayer over one batch and settle every delivery in it.
async fn invoke(relayer: &Relayer, channel: &Channel, queue_name: &str, deliveries: Vec<Delivery>) {
    let messages: Vec<DeliveredMessage> = deliveries
        .iter()
        .map(|d| {
            DeliveredMessage::from_amqp(
                d.properties.message_id().as_ref().map(|s| s.as_str()),
                d.delivery_tag,
                queue_name,
                &d.data,
            )
        })
        .collect();

    let outcome = relayer.handle_batch(&messages).await;
    match &outcome {
        Ok(()) => info!(batch_size = deliveries.len(), "relay_batch_completed"),
        Err(e) => error!(
            batch_size = deliveries.len(),
            failed_index = e.index(),
            error = %e,
            "relay_batch_failed"
        ),
    }

    let tags: Vec<u64> = deliveries.iter().map(|d| d.delivery_tag).collect();
    for settlement in settle_batch(&tags, &outcome) {
        match settlement {
            Settlement::Ack { delivery_tag } => {
                if let Err(e) = channel
                    .basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
                {
                    error!(delivery_tag, error = %e, "rabbitmq_ack_failed");
                }
            }
            Settlement::NackRequeue { delivery_tag } => {
                if let Err(e) = channel
                    .basic_nack(
                        delivery_tag,
                        BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        },
                    )
                    .await
                {
                    error!(delivery_tag, error = %e, "rabbitmq_nack_failed");
                }
            }
        }
    }
}
