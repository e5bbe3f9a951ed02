//! Exchanges, queues and bindings a service declares on startup.
//!
//! The model is AMQP's. On Kafka an exchange is a topic, a queue is a
//! consumer group, and a binding subscribes that group to the topic.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeKind {
    #[default]
    Topic,
    Direct,
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Topic => "topic",
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
        }
    }

    /// Whether a message published with `routing_key` reaches a binding with `pattern`.
    pub fn routes(&self, pattern: &str, routing_key: &str) -> bool {
        match self {
            ExchangeKind::Fanout => true,
            ExchangeKind::Direct => pattern == routing_key,
            ExchangeKind::Topic => {
                let pattern: Vec<&str> = pattern.split('.').collect();
                let key: Vec<&str> = routing_key.split('.').collect();
                topic_matches(&pattern, &key)
            }
        }
    }
}

/// `*` matches one word, `#` matches zero or more.
fn topic_matches(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            topic_matches(rest, key) || (!key.is_empty() && topic_matches(pattern, &key[1..]))
        }
        (Some((p, prest)), Some((k, krest))) => {
            (*p == "*" || p == k) && topic_matches(prest, krest)
        }
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// Where a message is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub exchange: String,
    pub routing_key: String,
}

impl Destination {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange, self.routing_key)
    }
}

/// A set of declarations. Declaring the same topology twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub exchanges: Vec<Exchange>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<Binding>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a durable topic exchange.
    pub fn exchange(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.exchanges.iter().any(|e| e.name == name) {
            self.exchanges.push(Exchange {
                name,
                kind: ExchangeKind::Topic,
                durable: true,
            });
        }
        self
    }

    /// Adds a durable queue.
    pub fn queue(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.queues.iter().any(|q| q.name == name) {
            self.queues.push(QueueSpec {
                name,
                durable: true,
            });
        }
        self
    }

    pub fn bind(
        mut self,
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        let binding = Binding {
            queue: queue.into(),
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        };
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
        self
    }

    /// Declares the exchange, a queue and the binding between them.
    pub fn route(self, queue: &str, destination: &Destination) -> Self {
        self.exchange(destination.exchange.as_str())
            .queue(queue)
            .bind(queue, destination.exchange.as_str(), destination.routing_key.as_str())
    }

    pub fn merge(mut self, other: Topology) -> Self {
        for exchange in other.exchanges {
            if !self.exchanges.iter().any(|e| e.name == exchange.name) {
                self.exchanges.push(exchange);
            }
        }
        for queue in other.queues {
            if !self.queues.iter().any(|q| q.name == queue.name) {
                self.queues.push(queue);
            }
        }
        for binding in other.bindings {
            if !self.bindings.contains(&binding) {
                self.bindings.push(binding);
            }
        }
        self
    }

    /// Exchanges a queue is bound to.
    pub fn sources_of(&self, queue: &str) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |b| b.queue == queue)
    }
}
