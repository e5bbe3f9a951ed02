//! RabbitMQ adapter built on `lapin`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

use crate::message::{Headers, Message};
use crate::topology::{Destination, ExchangeKind, Topology};
use crate::transport::{Acknowledger, Broker, Delivery, Subscription};
use crate::{BrokerError, Result};

const PERSISTENT: u8 = 2;

pub struct AmqpBroker {
    url: String,
    connection: Connection,
    /// Publisher channel in confirm mode.
    publisher: Channel,
}

impl AmqpBroker {
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let publisher = connection.create_channel().await?;
        publisher
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        tracing::info!(url = %redact(url), "Connected to AMQP broker");
        Ok(Self {
            url: redact(url),
            connection,
            publisher,
        })
    }
}

/// Strips credentials from a broker URL for logging.
fn redact(url: &str) -> String {
    match (url.split_once("://"), url.rfind('@')) {
        (Some((scheme, _)), Some(at)) => format!("{scheme}://***{}", &url[at..]),
        _ => url.to_string(),
    }
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

fn properties(message: &Message) -> BasicProperties {
    let mut table = FieldTable::default();
    for (name, value) in &message.headers {
        table.insert(
            ShortString::from(name.as_str()),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }

    let mut properties = BasicProperties::default()
        .with_message_id(ShortString::from(message.id.as_str()))
        .with_content_type(ShortString::from(crate::headers::APPLICATION_JSON))
        .with_headers(table);
    if message.persistent {
        properties = properties.with_delivery_mode(PERSISTENT);
    }
    if let Some(timestamp) = message.timestamp {
        properties = properties.with_timestamp(timestamp.timestamp().max(0) as u64);
    }
    properties
}

fn message_from(delivery: &lapin::message::Delivery) -> Message {
    let props = &delivery.properties;
    let mut headers = Headers::new();
    if let Some(table) = props.headers() {
        for (name, value) in table.inner() {
            let value = match value {
                AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
                AMQPValue::ShortString(s) => s.as_str().to_string(),
                other => format!("{other:?}"),
            };
            headers.insert(name.as_str().to_string(), value);
        }
    }

    Message {
        id: props
            .message_id()
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default(),
        payload: delivery.data.clone(),
        headers,
        timestamp: (*props.timestamp())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0)),
        persistent: *props.delivery_mode() == Some(PERSISTENT),
        key: None,
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    fn name(&self) -> &str {
        &self.url
    }

    async fn declare(&self, topology: &Topology) -> Result<()> {
        let channel = self.connection.create_channel().await?;
        for exchange in &topology.exchanges {
            channel
                .exchange_declare(
                    &exchange.name,
                    exchange_kind(exchange.kind),
                    ExchangeDeclareOptions {
                        durable: exchange.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        for queue in &topology.queues {
            channel
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions {
                        durable: queue.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }
        for binding in &topology.bindings {
            channel
                .queue_bind(
                    &binding.queue,
                    &binding.exchange,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        channel.close(200, "declared").await?;
        Ok(())
    }

    async fn publish(&self, destination: &Destination, message: Message) -> Result<()> {
        let confirm = self
            .publisher
            .basic_publish(
                &destination.exchange,
                &destination.routing_key,
                BasicPublishOptions::default(),
                &message.payload,
                properties(&message),
            )
            .await?
            .await?;

        if confirm.is_nack() {
            return Err(BrokerError::Unavailable(format!(
                "broker refused message {} for {destination}",
                message.id
            )));
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Subscription>> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(prefetch.max(1), BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue, prefetch, "Consuming AMQP queue");
        Ok(Box::new(AmqpSubscription {
            queue: queue.to_string(),
            channel,
            consumer,
        }))
    }

    async fn ping(&self) -> Result<()> {
        if self.connection.status().connected() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable(format!("{} disconnected", self.url)))
        }
    }

    async fn close(&self) -> Result<()> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

struct AmqpSubscription {
    queue: String,
    channel: Channel,
    consumer: Consumer,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn next(&mut self) -> Option<Result<Delivery>> {
        let delivery = match self.consumer.next().await? {
            Ok(delivery) => delivery,
            Err(err) => return Some(Err(err.into())),
        };
        let message = message_from(&delivery);
        let redelivered = delivery.redelivered;
        Some(Ok(Delivery::new(
            message,
            redelivered,
            Box::new(AmqpAcker(delivery.acker)),
        )))
    }

    async fn close(&mut self) -> Result<()> {
        self.channel
            .basic_cancel(self.consumer.tag().as_str(), BasicCancelOptions::default())
            .await?;
        // Unacked deliveries are requeued by the broker when the channel closes.
        self.channel.close(200, "subscription closed").await?;
        Ok(())
    }
}

struct AmqpAcker(lapin::acker::Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<()> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}
