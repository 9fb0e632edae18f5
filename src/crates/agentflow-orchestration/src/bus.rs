//! In-process topic bus for orchestration actors.
//!
//! A minimal pub/sub fabric: actors subscribe to a named topic under their
//! own actor name and publish [`ActorMessage`]s to it. A publication reaches
//! every subscriber of the topic except its sender, so actors never react to
//! their own broadcasts.

use agentflow_agents::ChatMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Messages exchanged on an orchestration topic.
#[derive(Debug, Clone)]
pub enum ActorMessage {
    /// Initial input for the orchestration.
    InputTask(Vec<ChatMessage>),
    /// Broadcast of new conversation messages.
    Group(Vec<ChatMessage>),
    /// Signal for one named agent to produce its turn.
    Speak {
        /// Name of the agent that should speak.
        agent: String,
    },
    /// Terminal signal carrying the orchestration's final message.
    Result(String),
}

struct Subscriber {
    name: String,
    sender: mpsc::UnboundedSender<ActorMessage>,
}

/// Named-topic pub/sub bus.
#[derive(Clone, Default)]
pub struct TopicBus {
    topics: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl TopicBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `actor` to `topic`.
    pub async fn subscribe(
        &self,
        topic: &str,
        actor: &str,
    ) -> mpsc::UnboundedReceiver<ActorMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                name: actor.to_string(),
                sender,
            });
        receiver
    }

    /// Publish to every subscriber of `topic` except the sender itself.
    /// Subscribers whose receiver is gone are pruned.
    pub async fn publish(&self, topic: &str, from: &str, message: ActorMessage) {
        let mut topics = self.topics.write().await;
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.retain(|subscriber| {
                if subscriber.name == from {
                    return true;
                }
                subscriber.sender.send(message.clone()).is_ok()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publications_skip_the_sender() {
        let bus = TopicBus::new();
        let mut a = bus.subscribe("chat", "a").await;
        let mut b = bus.subscribe("chat", "b").await;

        bus.publish("chat", "a", ActorMessage::Speak { agent: "b".into() })
            .await;

        assert!(a.try_recv().is_err());
        assert!(matches!(
            b.try_recv().unwrap(),
            ActorMessage::Speak { agent } if agent == "b"
        ));
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus = TopicBus::new();
        let mut a = bus.subscribe("one", "a").await;
        bus.publish("two", "x", ActorMessage::Result("done".into()))
            .await;
        assert!(a.try_recv().is_err());
    }
}
