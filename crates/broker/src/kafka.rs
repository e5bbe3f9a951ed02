//! Kafka adapter built on `rdkafka`.
//!
//! Exchanges map to topics and queues to consumer groups; routing keys are
//! not used. Offsets are committed manually when a delivery is settled, so an
//! unsettled message is read again after a restart. Kafka cannot put one
//! message back, so a requeue republishes it to its topic with an incremented
//! delivery count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message as _, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use crate::message::{Headers, Message, headers};
use crate::topology::{Destination, Topology};
use crate::transport::{Acknowledger, Broker, Delivery, Subscription};
use crate::{BrokerError, Result};

/// Header carrying the message identity, which Kafka records lack.
const MESSAGE_ID: &str = "message-id";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaBroker {
    name: String,
    brokers: String,
    producer: FutureProducer,
    /// Topics each consumer group reads, from declared bindings.
    groups: Mutex<HashMap<String, Vec<String>>>,
}

impl KafkaBroker {
    pub fn connect(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()?;

        tracing::info!(brokers, "Kafka producer created");
        Ok(Self {
            name: format!("kafka://{brokers}"),
            brokers: brokers.to_string(),
            producer,
            groups: Mutex::new(HashMap::new()),
        })
    }

    fn topics_for(&self, queue: &str) -> Result<Vec<String>> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))
    }
}

fn record_headers(message: &Message) -> OwnedHeaders {
    let mut owned = OwnedHeaders::new().insert(Header {
        key: MESSAGE_ID,
        value: Some(message.id.as_str()),
    });
    for (name, value) in &message.headers {
        owned = owned.insert(Header {
            key: name.as_str(),
            value: Some(value.as_str()),
        });
    }
    owned
}

fn message_from(record: &BorrowedMessage<'_>) -> Message {
    let mut found = Headers::new();
    if let Some(record_headers) = record.headers() {
        for header in record_headers.iter() {
            if let Some(value) = header.value {
                found.insert(
                    header.key.to_string(),
                    String::from_utf8_lossy(value).into_owned(),
                );
            }
        }
    }

    let id = found.remove(MESSAGE_ID).unwrap_or_else(|| {
        format!("{}-{}-{}", record.topic(), record.partition(), record.offset())
    });
    Message {
        id,
        payload: record.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers: found,
        timestamp: record
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        persistent: true,
        key: record
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn declare(&self, topology: &Topology) -> Result<()> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()?;
        let topics: Vec<NewTopic<'_>> = topology
            .exchanges
            .iter()
            .map(|e| NewTopic::new(&e.name, 1, TopicReplication::Fixed(1)))
            .collect();

        for result in admin.create_topics(&topics, &AdminOptions::new()).await? {
            if let Err((topic, code)) = result
                && code != RDKafkaErrorCode::TopicAlreadyExists
            {
                return Err(BrokerError::Unavailable(format!(
                    "cannot create topic {topic}: {code}"
                )));
            }
        }

        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        for binding in &topology.bindings {
            let topics = groups.entry(binding.queue.clone()).or_default();
            if !topics.contains(&binding.exchange) {
                topics.push(binding.exchange.clone());
            }
        }
        Ok(())
    }

    async fn publish(&self, destination: &Destination, message: Message) -> Result<()> {
        let key = message.key.as_deref().unwrap_or(message.id.as_str());
        let mut record = FutureRecord::to(&destination.exchange)
            .payload(&message.payload)
            .key(key)
            .headers(record_headers(&message));
        if let Some(timestamp) = message.timestamp {
            record = record.timestamp(timestamp.timestamp_millis());
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(err, _)| err)?;
        tracing::debug!(topic = %destination.exchange, partition, offset, message_id = %message.id, "Record published");
        Ok(())
    }

    /// Consumes every topic bound to `queue`, one record at a time.
    async fn subscribe(&self, queue: &str, _prefetch: u16) -> Result<Box<dyn Subscription>> {
        let topics = self.topics_for(queue)?;
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", queue)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;

        tracing::info!(group = queue, topics = ?topics, "Subscribed to Kafka topics");
        Ok(Box::new(KafkaSubscription {
            queue: queue.to_string(),
            consumer: Arc::new(consumer),
            producer: self.producer.clone(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(SEND_TIMEOUT))
                .map(|_| ())
        })
        .await
        .map_err(|err| BrokerError::Unavailable(err.to_string()))??;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(SEND_TIMEOUT)))
            .await
            .map_err(|err| BrokerError::Unavailable(err.to_string()))??;
        Ok(())
    }
}

struct KafkaSubscription {
    queue: String,
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn next(&mut self) -> Option<Result<Delivery>> {
        let record = match self.consumer.recv().await {
            Ok(record) => record,
            Err(err) => return Some(Err(err.into())),
        };
        let message = message_from(&record);
        let acker = KafkaAcker {
            consumer: Arc::clone(&self.consumer),
            producer: self.producer.clone(),
            topic: record.topic().to_string(),
            partition: record.partition(),
            offset: record.offset(),
            message: message.clone(),
        };
        let redelivered = message.delivery_count() > 0;
        Some(Ok(Delivery::new(message, redelivered, Box::new(acker))))
    }

    async fn close(&mut self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

struct KafkaAcker {
    consumer: Arc<StreamConsumer>,
    producer: FutureProducer,
    topic: String,
    partition: i32,
    offset: i64,
    message: Message,
}

impl KafkaAcker {
    fn commit(&self) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for KafkaAcker {
    async fn ack(&self) -> Result<()> {
        self.commit()
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        if requeue {
            let retry = self.message.clone().with_header(
                headers::DELIVERY_COUNT,
                (self.message.delivery_count() + 1).to_string(),
            );
            let key = retry.key.as_deref().unwrap_or(retry.id.as_str());
            let record = FutureRecord::to(&self.topic)
                .payload(&retry.payload)
                .key(key)
                .headers(record_headers(&retry));
            self.producer
                .send(record, Timeout::After(SEND_TIMEOUT))
                .await
                .map_err(|(err, _)| err)?;
        }
        self.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::Headers as _;

    #[test]
    fn headers_carry_message_identity() {
        let message = Message::new("evt-1", b"{}".to_vec())
            .with_header(headers::CORRELATION_ID, "corr-1");
        let owned = record_headers(&message);

        let keys: Vec<&str> = owned.iter().map(|h| h.key).collect();
        assert_eq!(keys, vec![MESSAGE_ID, headers::CORRELATION_ID]);
    }
}
