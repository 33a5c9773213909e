//! Channel transport with sticky failover.
//!
//! Publishing goes to the primary exchange channel until a send fails,
//! at which point the publisher flips to the hidden backup channel and
//! stays there. The flip announces itself exactly once on the emergency
//! channel; flipping back only happens on an explicit `backup/hide`
//! control message from the fleet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use warden_core::types::ChannelId;

use crate::envelope::Envelope;
use crate::error::Result;

/// Minimal transport surface the publisher needs from the platform.
///
/// Implementations return `false` on delivery failure rather than an
/// error; the publisher decides what a failure means.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Posts a text message to a channel.
    async fn send_text(&self, channel: ChannelId, text: &str) -> bool;

    /// Posts a document with a caption to a channel.
    async fn send_document(
        &self,
        channel: ChannelId,
        caption: &str,
        filename: &str,
        bytes: &[u8],
    ) -> bool;
}

/// Decides which exchange channel outbound traffic uses.
///
/// The hidden flag is sticky: once set by a delivery failure or a
/// `backup/hide` control message it stays set until explicitly reverted.
pub struct ChannelSelector {
    primary: ChannelId,
    hidden: ChannelId,
    hidden_active: AtomicBool,
}

impl ChannelSelector {
    /// Creates a selector starting on the primary channel.
    pub fn new(primary: ChannelId, hidden: ChannelId) -> Self {
        ChannelSelector {
            primary,
            hidden,
            hidden_active: AtomicBool::new(false),
        }
    }

    /// The channel outbound traffic should currently use.
    pub fn current(&self) -> ChannelId {
        if self.is_hidden() {
            self.hidden
        } else {
            self.primary
        }
    }

    /// Whether the hidden channel is active.
    pub fn is_hidden(&self) -> bool {
        self.hidden_active.load(Ordering::SeqCst)
    }

    /// Applies a `backup/hide` control message from the fleet.
    pub fn apply_hide(&self, hide: bool) {
        self.hidden_active.store(hide, Ordering::SeqCst);
        debug!(hidden = hide, "exchange channel selection updated");
    }

    /// Flips to the hidden channel. Returns true only for the call that
    /// actually performed the flip.
    fn activate_hidden(&self) -> bool {
        self.hidden_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

enum Payload<'a> {
    Text,
    Document {
        filename: &'a str,
        bytes: &'a [u8],
    },
}

/// Publishes envelopes to the exchange channel with sticky failover.
pub struct Publisher<C: BroadcastChannel + ?Sized> {
    transport: Arc<C>,
    selector: Arc<ChannelSelector>,
    emergency: ChannelId,
}

impl<C: BroadcastChannel + ?Sized> Publisher<C> {
    /// Creates a publisher over the given transport and channel pair.
    pub fn new(transport: Arc<C>, selector: Arc<ChannelSelector>, emergency: ChannelId) -> Self {
        Publisher {
            transport,
            selector,
            emergency,
        }
    }

    /// The selector this publisher drives.
    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    /// Publishes an envelope as a text message.
    ///
    /// An envelope with no receivers is a successful no-op.
    pub async fn publish(&self, envelope: &Envelope) -> Result<bool> {
        if envelope.to.is_empty() {
            return Ok(true);
        }
        let text = envelope.encode()?;
        Ok(self.deliver(&text, Payload::Text).await)
    }

    /// Publishes an envelope whose bulk payload rides as a document.
    ///
    /// The encoded envelope becomes the document caption so receivers can
    /// route the attachment before opening it.
    pub async fn publish_with_attachment(
        &self,
        envelope: &Envelope,
        filename: &str,
        bytes: &[u8],
    ) -> Result<bool> {
        if envelope.to.is_empty() {
            return Ok(true);
        }
        let caption = envelope.encode()?;
        Ok(self
            .deliver(&caption, Payload::Document { filename, bytes })
            .await)
    }

    async fn deliver(&self, text: &str, payload: Payload<'_>) -> bool {
        let channel = self.selector.current();
        if self.send(channel, text, &payload).await {
            return true;
        }
        if self.selector.is_hidden() {
            // Already failed over; nothing further to fall back to.
            // One retry covers transient hiccups on the backup channel.
            return self.send(channel, text, &payload).await;
        }
        self.fail_over().await;
        self.send(self.selector.current(), text, &payload).await
    }

    async fn send(&self, channel: ChannelId, text: &str, payload: &Payload<'_>) -> bool {
        match payload {
            Payload::Text => self.transport.send_text(channel, text).await,
            Payload::Document { filename, bytes } => {
                self.transport
                    .send_document(channel, text, filename, bytes)
                    .await
            }
        }
    }

    async fn fail_over(&self) {
        if self.selector.activate_hidden() {
            warn!("primary exchange channel unreachable, failing over to hidden channel");
            self.transport
                .send_text(
                    self.emergency,
                    "EMERGENCY: exchange channel unreachable, switched to backup",
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::Value;
    use warden_core::types::ProcessId;

    use crate::envelope::ExchangeAction;

    const PRIMARY: ChannelId = ChannelId::new(-1001);
    const HIDDEN: ChannelId = ChannelId::new(-1002);
    const EMERGENCY: ChannelId = ChannelId::new(-1003);

    #[derive(Default)]
    struct MockTransport {
        // channel -> number of sends that should fail before succeeding
        failures: Mutex<HashMap<i64, u32>>,
        sent: Mutex<Vec<(ChannelId, String)>>,
    }

    impl MockTransport {
        fn fail_next(&self, channel: ChannelId, count: u32) {
            self.failures.lock().unwrap().insert(channel.as_i64(), count);
        }

        fn sent_to(&self, channel: ChannelId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == channel)
                .map(|(_, t)| t.clone())
                .collect()
        }

        fn attempt(&self, channel: ChannelId, text: &str) -> bool {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&channel.as_i64()) {
                if *left > 0 {
                    *left -= 1;
                    return false;
                }
            }
            drop(failures);
            self.sent
                .lock()
                .unwrap()
                .push((channel, text.to_string()));
            true
        }
    }

    #[async_trait]
    impl BroadcastChannel for MockTransport {
        async fn send_text(&self, channel: ChannelId, text: &str) -> bool {
            self.attempt(channel, text)
        }

        async fn send_document(
            &self,
            channel: ChannelId,
            caption: &str,
            _filename: &str,
            _bytes: &[u8],
        ) -> bool {
            self.attempt(channel, caption)
        }
    }

    fn publisher() -> (Arc<MockTransport>, Publisher<MockTransport>) {
        let transport = Arc::new(MockTransport::default());
        let selector = Arc::new(ChannelSelector::new(PRIMARY, HIDDEN));
        let publisher = Publisher::new(Arc::clone(&transport), selector, EMERGENCY);
        (transport, publisher)
    }

    fn envelope() -> Envelope {
        Envelope::new(
            ProcessId::new("WARN"),
            vec![ProcessId::new("USER")],
            ExchangeAction::UpdateScore,
            Value::Null,
        )
    }

    #[tokio::test]
    async fn test_publish_uses_primary() {
        let (transport, publisher) = publisher();
        assert!(publisher.publish(&envelope()).await.unwrap());
        assert_eq!(transport.sent_to(PRIMARY).len(), 1);
        assert!(transport.sent_to(HIDDEN).is_empty());
        assert!(!publisher.selector().is_hidden());
    }

    #[tokio::test]
    async fn test_empty_receivers_is_noop_success() {
        let (transport, publisher) = publisher();
        let envelope = Envelope::new(
            ProcessId::new("WARN"),
            vec![ProcessId::new("WARN")],
            ExchangeAction::UpdateScore,
            Value::Null,
        );
        assert!(publisher.publish(&envelope).await.unwrap());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failover_is_sticky_and_announces_once() {
        let (transport, publisher) = publisher();
        transport.fail_next(PRIMARY, 100);

        assert!(publisher.publish(&envelope()).await.unwrap());
        assert!(publisher.selector().is_hidden());
        assert_eq!(transport.sent_to(HIDDEN).len(), 1);
        assert_eq!(transport.sent_to(EMERGENCY).len(), 1);

        // Subsequent publishes stay on the hidden channel without
        // touching the primary or re-announcing.
        assert!(publisher.publish(&envelope()).await.unwrap());
        assert_eq!(transport.sent_to(HIDDEN).len(), 2);
        assert_eq!(transport.sent_to(EMERGENCY).len(), 1);
        assert!(transport.sent_to(PRIMARY).is_empty());
    }

    #[tokio::test]
    async fn test_hidden_channel_gets_one_retry() {
        let (transport, publisher) = publisher();
        publisher.selector().apply_hide(true);
        transport.fail_next(HIDDEN, 1);

        assert!(publisher.publish(&envelope()).await.unwrap());
        assert_eq!(transport.sent_to(HIDDEN).len(), 1);
        // No failover announcement: we were already on the backup.
        assert!(transport.sent_to(EMERGENCY).is_empty());
    }

    #[tokio::test]
    async fn test_hidden_failure_twice_reports_false() {
        let (transport, publisher) = publisher();
        publisher.selector().apply_hide(true);
        transport.fail_next(HIDDEN, 2);

        assert!(!publisher.publish(&envelope()).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_hide_revert() {
        let (transport, publisher) = publisher();
        transport.fail_next(PRIMARY, 1);
        assert!(publisher.publish(&envelope()).await.unwrap());
        assert!(publisher.selector().is_hidden());

        publisher.selector().apply_hide(false);
        assert!(publisher.publish(&envelope()).await.unwrap());
        assert_eq!(transport.sent_to(PRIMARY).len(), 1);
    }

    #[tokio::test]
    async fn test_attachment_follows_failover() {
        let (transport, publisher) = publisher();
        transport.fail_next(PRIMARY, 100);
        assert!(publisher
            .publish_with_attachment(&envelope(), "ledger.dat", b"blob")
            .await
            .unwrap());
        assert!(publisher.selector().is_hidden());
        assert_eq!(transport.sent_to(HIDDEN).len(), 1);
    }
}
