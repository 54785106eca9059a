//! Live candle stream routing
//!
//! Transport-free fan-out for the candle stream. The transport feeds raw
//! text frames into [`StreamRouter::dispatch`]; the router routes `candle`
//! frames to every live subscriber of the frame's instrument and hands back
//! the control frames the transport must send upstream.
//!
//! Flow: subscribe → `subscribe` frame (first subscriber only) → candles →
//! unsubscribe → `unsubscribe` frame (last subscriber only).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use types::candle::RawCandle;
use types::ids::InstrumentId;

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Subscribe,
    Unsubscribe,
    Candle,
    Error,
}

/// A stream frame, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<InstrumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StreamMessage {
    pub fn subscribe(instrument: &InstrumentId) -> Self {
        Self {
            kind: MessageKind::Subscribe,
            symbol: Some(instrument.clone()),
            data: None,
        }
    }

    pub fn unsubscribe(instrument: &InstrumentId) -> Self {
        Self {
            kind: MessageKind::Unsubscribe,
            symbol: Some(instrument.clone()),
            data: None,
        }
    }

    /// Wrap a candle record as a `candle` frame.
    pub fn candle(candle: &RawCandle) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: MessageKind::Candle,
            symbol: None,
            data: Some(serde_json::to_value(candle)?),
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Unique subscriber identifier.
pub type SubscriberId = u64;

/// A live subscription. Candles arrive on `receiver`.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    instrument: InstrumentId,
    pub receiver: mpsc::UnboundedReceiver<RawCandle>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }
}

/// Router shared between the transport reader and chart sessions.
pub type SharedStreamRouter = Arc<Mutex<StreamRouter>>;

/// Per-instrument subscriber registry.
#[derive(Debug, Default)]
pub struct StreamRouter {
    subscribers: BTreeMap<InstrumentId, BTreeMap<SubscriberId, mpsc::UnboundedSender<RawCandle>>>,
    next_id: SubscriberId,
    /// Control frames for the transport, when one is attached.
    outbox: Option<mpsc::UnboundedSender<StreamMessage>>,
    frames_received: u64,
    frames_malformed: u64,
    candles_delivered: u64,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router that also pushes every control frame to `outbox`.
    pub fn with_outbox(outbox: mpsc::UnboundedSender<StreamMessage>) -> Self {
        Self {
            outbox: Some(outbox),
            ..Self::default()
        }
    }

    pub fn into_shared(self) -> SharedStreamRouter {
        Arc::new(Mutex::new(self))
    }

    fn emit(&self, frame: &StreamMessage) {
        if let Some(outbox) = &self.outbox {
            if outbox.send(frame.clone()).is_err() {
                debug!(kind = ?frame.kind, "Transport outbox closed; control frame not sent");
            }
        }
    }

    /// Register a subscriber. Returns the `subscribe` control frame when
    /// this is the instrument's first subscriber.
    pub fn subscribe(&mut self, instrument: &InstrumentId) -> (Subscription, Option<StreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id;
        self.next_id += 1;

        let subscribers = self.subscribers.entry(instrument.clone()).or_default();
        let first = subscribers.is_empty();
        subscribers.insert(id, tx);

        let frame = first.then(|| StreamMessage::subscribe(instrument));
        if let Some(frame) = &frame {
            self.emit(frame);
        }
        info!(instrument = %instrument, subscriber = id, first, "Stream subscription added");

        (
            Subscription {
                id,
                instrument: instrument.clone(),
                receiver: rx,
            },
            frame,
        )
    }

    /// Remove a subscriber. Returns the `unsubscribe` control frame when the
    /// last subscriber leaves; repeated calls return `None`.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> Option<StreamMessage> {
        let instrument = &subscription.instrument;
        let subscribers = self.subscribers.get_mut(instrument)?;
        subscribers.remove(&subscription.id)?;
        info!(instrument = %instrument, subscriber = subscription.id, "Stream subscription removed");

        if subscribers.is_empty() {
            self.subscribers.remove(instrument);
            let frame = StreamMessage::unsubscribe(instrument);
            self.emit(&frame);
            Some(frame)
        } else {
            None
        }
    }

    /// Route one inbound text frame. Returns the number of subscribers the
    /// candle was delivered to.
    pub fn dispatch(&mut self, text: &str) -> usize {
        self.frames_received += 1;
        let message = match StreamMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                self.frames_malformed += 1;
                warn!(error = %err, "Failed to parse stream frame");
                return 0;
            }
        };

        match message.kind {
            MessageKind::Candle => match message.data {
                Some(data) => match serde_json::from_value::<RawCandle>(data) {
                    Ok(candle) => self.route(candle),
                    Err(err) => {
                        self.frames_malformed += 1;
                        warn!(error = %err, "Malformed candle payload");
                        0
                    }
                },
                None => 0,
            },
            MessageKind::Error => {
                error!(data = ?message.data, "Stream reported an error");
                0
            }
            MessageKind::Subscribe | MessageKind::Unsubscribe => {
                debug!(kind = ?message.kind, symbol = ?message.symbol, "Ignoring control frame echo");
                0
            }
        }
    }

    fn route(&mut self, candle: RawCandle) -> usize {
        let Some(instrument) = candle.instrument_id.clone() else {
            warn!("Candle frame without instrumentId");
            return 0;
        };
        let Some(subscribers) = self.subscribers.get_mut(&instrument) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|id, tx| match tx.send(candle.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                debug!(instrument = %instrument, subscriber = *id, "Dropping closed subscriber");
                false
            }
        });

        if subscribers.is_empty() {
            self.subscribers.remove(&instrument);
            self.emit(&StreamMessage::unsubscribe(&instrument));
        }
        self.candles_delivered += delivered as u64;
        delivered
    }

    /// `subscribe` frames for every instrument with live subscribers, to
    /// replay after the transport reconnects.
    pub fn resubscribe_frames(&self) -> Vec<StreamMessage> {
        self.subscribers.keys().map(StreamMessage::subscribe).collect()
    }

    pub fn subscriber_count(&self, instrument: &InstrumentId) -> usize {
        self.subscribers.get(instrument).map_or(0, BTreeMap::len)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.subscribers.keys()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn frames_malformed(&self) -> u64 {
        self.frames_malformed
    }

    pub fn candles_delivered(&self) -> u64 {
        self.candles_delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_frame(instrument: &str, time: i64) -> String {
        format!(
            r#"{{"type":"candle","data":{{"instrumentId":"{instrument}","interval":"1m","time":{time},"open":1,"high":2,"low":0.5,"close":1.5,"volume":3}}}}"#
        )
    }

    #[test]
    fn test_first_subscriber_emits_frame() {
        let mut router = StreamRouter::new();
        let aapl = InstrumentId::new("AAPL");
        let (_a, frame) = router.subscribe(&aapl);
        assert_eq!(frame, Some(StreamMessage::subscribe(&aapl)));
        let (_b, frame) = router.subscribe(&aapl);
        assert!(frame.is_none());
        assert_eq!(router.subscriber_count(&aapl), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut router = StreamRouter::new();
        let aapl = InstrumentId::new("AAPL");
        let (a, _) = router.subscribe(&aapl);
        let (b, _) = router.subscribe(&aapl);
        assert!(router.unsubscribe(&a).is_none());
        assert!(router.unsubscribe(&a).is_none());
        assert_eq!(router.unsubscribe(&b), Some(StreamMessage::unsubscribe(&aapl)));
        assert!(router.unsubscribe(&b).is_none());
        assert_eq!(router.subscriber_count(&aapl), 0);
    }

    #[test]
    fn test_dispatch_routes_by_instrument() {
        let mut router = StreamRouter::new();
        let (mut aapl, _) = router.subscribe(&InstrumentId::new("AAPL"));
        let (mut msft, _) = router.subscribe(&InstrumentId::new("MSFT"));

        assert_eq!(router.dispatch(&candle_frame("AAPL", 60)), 1);
        assert_eq!(router.dispatch(&candle_frame("TSLA", 60)), 0);

        let got = aapl.receiver.try_recv().unwrap();
        assert_eq!(got.time.to_epoch_secs().unwrap(), 60);
        assert!(msft.receiver.try_recv().is_err());
        assert_eq!(router.candles_delivered(), 1);
    }

    #[test]
    fn test_dispatch_ignores_malformed_and_errors() {
        let mut router = StreamRouter::new();
        let (_sub, _) = router.subscribe(&InstrumentId::new("AAPL"));
        assert_eq!(router.dispatch("not json"), 0);
        assert_eq!(router.dispatch(r#"{"type":"candle","data":{"open":1}}"#), 0);
        assert_eq!(router.dispatch(r#"{"type":"error","data":"auth expired"}"#), 0);
        assert_eq!(router.frames_malformed(), 2);
        assert_eq!(router.frames_received(), 3);
    }

    #[test]
    fn test_closed_receivers_are_pruned() {
        let (tx, mut outbox) = mpsc::unbounded_channel();
        let mut router = StreamRouter::with_outbox(tx);
        let aapl = InstrumentId::new("AAPL");
        let (sub, _) = router.subscribe(&aapl);
        assert_eq!(outbox.try_recv().unwrap().kind, MessageKind::Subscribe);

        drop(sub);
        assert_eq!(router.dispatch(&candle_frame("AAPL", 60)), 0);
        assert_eq!(router.subscriber_count(&aapl), 0);
        assert_eq!(outbox.try_recv().unwrap(), StreamMessage::unsubscribe(&aapl));
    }

    #[test]
    fn test_resubscribe_frames_and_wire_shape() {
        let mut router = StreamRouter::new();
        let (_a, _) = router.subscribe(&InstrumentId::new("MSFT"));
        let (_b, _) = router.subscribe(&InstrumentId::new("AAPL"));
        let frames = router.resubscribe_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(
            serde_json::to_string(&frames[0]).unwrap(),
            r#"{"type":"subscribe","symbol":"AAPL"}"#
        );
    }
}
