//! Topic bus - publish/subscribe between plugins
//!
//! The bus only stores plugin ids. At publish time it snapshots the
//! subscriber list, releases its lock, and asks the caller to resolve each id
//! to something it can deliver to. That keeps the bus independent of the
//! registry and lets message handlers subscribe or publish re-entrantly.

mod topic;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hermod_plugin_api::{Message, PluginDelegator, PluginError, PluginId};

pub use topic::{BusError, Topic};

/// Something a message can be handed to
pub trait Recipient {
    fn name(&self) -> &str;

    fn deliver(&self, message: &Message) -> Result<(), PluginError>;
}

impl Recipient for Arc<PluginDelegator> {
    fn name(&self) -> &str {
        self.plugin_name()
    }

    fn deliver(&self, message: &Message) -> Result<(), PluginError> {
        PluginDelegator::deliver(self, message)
    }
}

/// Subscription table and fan-out
#[derive(Default)]
pub struct TopicBus {
    subscriptions: Mutex<HashMap<String, Vec<PluginId>>>,
}

impl TopicBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Vec<PluginId>>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `plugin` to the subscribers of `topic`. Subscribing twice is a no-op.
    pub fn subscribe(&self, plugin: PluginId, topic: &str) -> Result<(), BusError> {
        let topic = Topic::parse(topic)?;
        let mut table = self.table();
        let subscribers = table.entry(topic.to_string()).or_default();
        if !subscribers.contains(&plugin) {
            subscribers.push(plugin);
            tracing::debug!(topic = %topic, plugin = %plugin, "Subscribed");
        }
        Ok(())
    }

    pub fn unsubscribe(&self, plugin: PluginId, topic: &str) -> Result<(), BusError> {
        let topic = Topic::parse(topic)?;
        if let Some(subscribers) = self.table().get_mut(topic.as_str()) {
            subscribers.retain(|id| *id != plugin);
        }
        Ok(())
    }

    /// Snapshot of the current subscribers of `topic`, in subscription order.
    /// Creates an empty entry for a topic nobody has used yet.
    pub fn subscribers(&self, topic: &str) -> Result<Vec<PluginId>, BusError> {
        let topic = Topic::parse(topic)?;
        Ok(self.table().entry(topic.to_string()).or_default().clone())
    }

    /// Deliver `payload` to every current subscriber of `topic`
    ///
    /// `resolve` maps a subscriber id to its live recipient; ids it cannot
    /// resolve (plugin already unloaded) are skipped. A handler that fails
    /// or panics is logged and does not stop delivery to the others. Returns
    /// the number of recipients the message was handed to.
    pub fn publish<R, F>(&self, topic: &str, payload: serde_json::Value, resolve: F) -> Result<usize, BusError>
    where
        R: Recipient,
        F: Fn(PluginId) -> Option<R>,
    {
        let subscribers = self.subscribers(topic)?;
        let message = Message::new(topic, payload);
        let mut delivered = 0;

        for id in subscribers {
            let Some(recipient) = resolve(id) else {
                tracing::trace!(topic = %topic, plugin = %id, "Subscriber no longer registered");
                continue;
            };

            match std::panic::catch_unwind(AssertUnwindSafe(|| recipient.deliver(&message))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    delivered += 1;
                    tracing::warn!(
                        topic = %topic,
                        plugin = %recipient.name(),
                        error = %e,
                        "Message handler returned error"
                    );
                }
                Err(_) => {
                    tracing::error!(topic = %topic, plugin = %recipient.name(), "Message handler panicked");
                }
            }
        }

        Ok(delivered)
    }

    /// Every known topic with its subscriber count, sorted by topic
    pub fn topics(&self) -> Vec<(String, usize)> {
        let mut topics: Vec<_> = self
            .table()
            .iter()
            .map(|(topic, subscribers)| (topic.clone(), subscribers.len()))
            .collect();
        topics.sort();
        topics
    }

    /// Drop `plugin` from every subscriber list. Entries stay, possibly empty.
    pub fn remove_plugin(&self, plugin: PluginId) {
        for subscribers in self.table().values_mut() {
            subscribers.retain(|id| *id != plugin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermod_plugin_api::HostServices;
    use std::collections::HashMap as Map;
    use std::sync::Weak;

    struct NoHost;

    impl HostServices for NoHost {
        fn subscribe(&self, _: PluginId, _: &str) -> Result<(), PluginError> {
            Ok(())
        }
        fn unsubscribe(&self, _: PluginId, _: &str) -> Result<(), PluginError> {
            Ok(())
        }
        fn publish(&self, _: &str, _: serde_json::Value) -> Result<usize, PluginError> {
            Ok(0)
        }
        fn execute_command(&self, _: &[String]) -> hermod_plugin_api::CommandResult {
            hermod_plugin_api::CommandResult::empty()
        }
        fn get_config(&self, key: &str) -> Result<serde_json::Value, PluginError> {
            Err(PluginError::config(key))
        }
        fn set_config(&self, _: &str, _: serde_json::Value) -> Result<(), PluginError> {
            Ok(())
        }
        fn log(&self, _: &str, _: tracing::Level, _: &str) {}
    }

    fn delegators(n: u64) -> Map<PluginId, Arc<PluginDelegator>> {
        (1..=n)
            .map(|raw| {
                let id = PluginId::new(raw);
                let host: Weak<dyn HostServices> = Weak::<NoHost>::new();
                (id, Arc::new(PluginDelegator::new(id, format!("p{raw}"), host)))
            })
            .collect()
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let bus = TopicBus::new();
        let id = PluginId::new(1);
        bus.subscribe(id, "/t/1").unwrap();
        bus.subscribe(id, "/t/1").unwrap();
        assert_eq!(bus.subscribers("/t/1").unwrap(), vec![id]);
    }

    #[test]
    fn test_malformed_topics_rejected_everywhere() {
        let bus = TopicBus::new();
        let id = PluginId::new(1);
        assert!(bus.subscribe(id, "/t/").is_err());
        assert!(bus.unsubscribe(id, "t").is_err());
        assert!(bus.publish("", serde_json::Value::Null, |_| None::<Arc<PluginDelegator>>).is_err());
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_publish_without_subscribers_creates_entry() {
        let bus = TopicBus::new();
        let delivered = bus
            .publish("/nobody/home", serde_json::json!(1), |_| None::<Arc<PluginDelegator>>)
            .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(bus.topics(), vec![("/nobody/home".to_string(), 0)]);
    }

    #[test]
    fn test_publish_reaches_only_subscribers() {
        let bus = TopicBus::new();
        let plugins = delegators(3);
        bus.subscribe(PluginId::new(1), "/t/1").unwrap();
        bus.subscribe(PluginId::new(3), "/t/1").unwrap();
        bus.subscribe(PluginId::new(2), "/t/2").unwrap();

        let delivered = bus
            .publish("/t/1", serde_json::json!(42), |id| plugins.get(&id).cloned())
            .unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(plugins[&PluginId::new(1)].received_count(), 1);
        assert_eq!(plugins[&PluginId::new(2)].received_count(), 0);
        assert_eq!(plugins[&PluginId::new(3)].received_count(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = TopicBus::new();
        let plugins = delegators(1);
        let id = PluginId::new(1);
        bus.subscribe(id, "/t").unwrap();
        bus.unsubscribe(id, "/t").unwrap();
        // Unknown topic is fine too
        bus.unsubscribe(id, "/never/used").unwrap();

        let delivered = bus
            .publish("/t", serde_json::Value::Null, |id| plugins.get(&id).cloned())
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = TopicBus::new();
        let plugins = delegators(2);
        plugins[&PluginId::new(1)].on_message(|_| panic!("handler blew up"));
        bus.subscribe(PluginId::new(1), "/t").unwrap();
        bus.subscribe(PluginId::new(2), "/t").unwrap();

        let delivered = bus
            .publish("/t", serde_json::Value::Null, |id| plugins.get(&id).cloned())
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(plugins[&PluginId::new(2)].received_count(), 1);
    }

    #[test]
    fn test_remove_plugin_keeps_empty_entries() {
        let bus = TopicBus::new();
        let id = PluginId::new(9);
        bus.subscribe(id, "/a").unwrap();
        bus.subscribe(id, "/b").unwrap();
        bus.remove_plugin(id);

        assert_eq!(
            bus.topics(),
            vec![("/a".to_string(), 0), ("/b".to_string(), 0)]
        );
    }
}
