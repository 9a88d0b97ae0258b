//! Alert sinks
//!
//! A sink turns an honored dispatch into something the driver notices
//! (sound, vibration) or forwards it to an external actuator. Delivery is
//! fire-and-forget: `notify` never blocks and nothing waits for an answer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::manager::AlertTrigger;

/// Receiver of alert dispatches
pub trait AlertSink: Send + Sync {
    fn notify(&self, trigger: &AlertTrigger);
}

impl<S: AlertSink + ?Sized> AlertSink for Arc<S> {
    fn notify(&self, trigger: &AlertTrigger) {
        (**self).notify(trigger)
    }
}

impl<S: AlertSink + ?Sized> AlertSink for Box<S> {
    fn notify(&self, trigger: &AlertTrigger) {
        (**self).notify(trigger)
    }
}

/// Writes every dispatch to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, trigger: &AlertTrigger) {
        match serde_json::to_string(trigger) {
            Ok(json) => warn!(target: "drowsiness_alert", "{}", json),
            Err(_) => warn!(
                target: "drowsiness_alert",
                "Drowsiness alert #{} (eyes closed {}ms)",
                trigger.sequence, trigger.closed_for_ms
            ),
        }
    }
}

/// Forwards dispatches over a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    sender: mpsc::Sender<AlertTrigger>,
}

impl ChannelAlertSink {
    pub fn new(sender: mpsc::Sender<AlertTrigger>) -> Self {
        Self { sender }
    }

    /// Create a sink and the receiving end for an actuator task
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlertTrigger>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&self, trigger: &AlertTrigger) {
        if let Err(e) = self.sender.try_send(trigger.clone()) {
            warn!("Alert #{} not forwarded: {}", trigger.sequence, e);
        }
    }
}

/// Forwards each dispatch to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for FanoutSink {
    fn notify(&self, trigger: &AlertTrigger) {
        for sink in &self.sinks {
            sink.notify(trigger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(sequence: u64) -> AlertTrigger {
        AlertTrigger {
            sequence,
            closed_for_ms: 2000,
            frame_sequence: 60,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelAlertSink::channel(4);
        sink.notify(&trigger(1));
        assert_eq!(rx.recv().await.unwrap(), trigger(1));
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelAlertSink::channel(1);
        sink.notify(&trigger(1));
        sink.notify(&trigger(2));

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelAlertSink::channel(1);
        drop(rx);
        sink.notify(&trigger(1));
    }

    #[tokio::test]
    async fn test_fanout() {
        let (a, mut rx_a) = ChannelAlertSink::channel(1);
        let (b, mut rx_b) = ChannelAlertSink::channel(1);
        let fanout = FanoutSink::new().with(a).with(b).with(LogAlertSink);
        assert_eq!(fanout.len(), 3);

        fanout.notify(&trigger(7));
        assert_eq!(rx_a.recv().await.unwrap().sequence, 7);
        assert_eq!(rx_b.recv().await.unwrap().sequence, 7);
    }
}
