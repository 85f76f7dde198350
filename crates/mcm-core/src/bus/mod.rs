//! In-process publish/subscribe bus.
//!
//! Topics are the closed set in [`Topic`]. Subscribers of one topic run sequentially, in
//! subscription order, and every outcome is collected into a [`Delivery`]. A subscriber may
//! publish further events while handling one.

mod event;
pub use event::{Event, EventPayload, Reply};

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, Weak},
};

use async_trait::async_trait;
use mcm_model::Topic;
use tracing::{debug, instrument, trace, warn};

use crate::error::{BusError, HandlerError};

/// Handler attached to one or more topics.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// Short label used in logs and in [`Outcome::subscriber`].
    fn name(&self) -> &'static str;

    /// Handle one event. `Ok(None)` means the subscriber observed the event without answering.
    async fn on_event(&self, event: &Event) -> Result<Option<Reply>, HandlerError>;
}

/// Result of one subscriber for one event.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub subscriber: &'static str,
    pub result: Result<Option<Reply>, HandlerError>,
}

/// All outcomes of one publish, in subscription order.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: Topic,
    pub outcomes: Vec<Outcome>,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Collapse into a single answer: the first error if any subscriber failed, otherwise the
    /// last reply.
    pub fn into_result(self) -> Result<Reply, BusError> {
        if self.outcomes.is_empty() {
            return Err(BusError::NoSubscribers(self.topic));
        }

        let mut last = None;
        for outcome in self.outcomes {
            match outcome.result {
                Err(e) => return Err(BusError::Handler(e)),
                Ok(Some(reply)) => last = Some(reply),
                Ok(None) => {}
            }
        }
        last.ok_or(BusError::NoReply(self.topic))
    }
}

type Subscriptions = HashMap<Topic, Vec<Arc<dyn Subscriber>>>;

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscriptions: RwLock<Subscriptions>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `subscriber` to the handlers of `topic`.
    pub fn subscribe(&self, topic: Topic, subscriber: Arc<dyn Subscriber>) -> Topic {
        let mut subs = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let list = subs.entry(topic).or_default();
        list.push(subscriber);

        debug!(target: "mcm.bus", %topic, subscribers = list.len(), "subscribed");
        topic
    }

    #[inline]
    pub fn topic(&self, name: &str) -> Option<Topic> {
        Topic::lookup(name)
    }

    /// Build an event for a topic given by name.
    pub fn create_event(&self, name: &str, payload: EventPayload) -> Result<Event, BusError> {
        let topic = self
            .topic(name)
            .ok_or_else(|| BusError::UnknownTopic(name.to_string()))?;
        Ok(Event::new(topic, payload))
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.snapshot(topic).len()
    }

    /// Deliver `event` to each subscriber of its topic in turn.
    #[instrument(level = "trace", target = "mcm.bus", skip(self, event), fields(topic = %event.topic))]
    pub async fn publish(&self, event: Event) -> Delivery {
        let subscribers = self.snapshot(event.topic);
        if subscribers.is_empty() {
            warn!(target: "mcm.bus", topic = %event.topic, "event published with no subscribers");
        }

        let mut outcomes = Vec::with_capacity(subscribers.len());
        for sub in subscribers {
            let result = sub.on_event(&event).await;
            match &result {
                Ok(_) => trace!(target: "mcm.bus", subscriber = sub.name(), "handled"),
                Err(e) => debug!(target: "mcm.bus", subscriber = sub.name(), error = %e, "handler failed"),
            }
            outcomes.push(Outcome {
                subscriber: sub.name(),
                result,
            });
        }

        Delivery {
            topic: event.topic,
            outcomes,
        }
    }

    /// Create, publish and collapse in one step.
    pub async fn dispatch(&self, name: &str, payload: EventPayload) -> Result<Reply, BusError> {
        let event = self.create_event(name, payload)?;
        self.publish(event).await.into_result()
    }

    /// Handle that does not keep the bus alive, for subscribers that publish back into it.
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn snapshot(&self, topic: Topic) -> Vec<Arc<dyn Subscriber>> {
        let subs = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.get(&topic).cloned().unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}
