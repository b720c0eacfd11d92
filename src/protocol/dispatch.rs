//! Inbound message routing: correlated responses vs. subscription events

use super::pending::PendingRequests;
use super::types::{
    parse_balance, parse_candle, parse_contract_update, parse_tick, ClientEvent, Envelope,
    Subscription, SubscriptionId, SubscriptionKind,
};
use std::collections::HashMap;

/// Acknowledged subscriptions keyed by venue id
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_id: HashMap<SubscriptionId, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.by_id.insert(subscription.id.clone(), subscription);
    }

    pub fn remove(&mut self, id: &str) -> Option<Subscription> {
        self.by_id.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Find the stream for a kind/target pair
    pub fn find(&self, kind: SubscriptionKind, target: &str) -> Option<&Subscription> {
        self.by_id
            .values()
            .find(|s| s.kind == kind && s.target == target)
    }

    /// Invalidate everything (the session is gone)
    pub fn clear(&mut self) {
        self.by_id.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Subscription> {
        self.by_id.values().cloned().collect()
    }
}

/// Where an inbound message went
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Resolved a pending request
    Response { req_id: u64 },
    /// Unsolicited message for the consumer
    Event(ClientEvent),
    /// Nothing to do with it
    Dropped,
}

/// Route one parsed message
///
/// A message whose `req_id` is pending completes that request and nothing
/// else. Everything else is matched on `msg_type`; stream messages are only
/// forwarded while their subscription is registered.
pub fn route(
    envelope: Envelope,
    pending: &mut PendingRequests,
    subscriptions: &mut SubscriptionRegistry,
) -> Routed {
    if let Some(request) = envelope.req_id.and_then(|id| pending.take(id)) {
        let req_id = request.req_id;
        if envelope.error.is_none() {
            if let (Some(intent), Some(id)) = (&request.subscribe, &envelope.subscription_id) {
                subscriptions.insert(Subscription {
                    id: id.clone(),
                    kind: intent.kind,
                    target: intent.target.clone(),
                });
            }
        }
        request.complete(envelope.into_result());
        return Routed::Response { req_id };
    }

    let parsed = match envelope.msg_type.as_str() {
        "tick" | "proposal_open_contract" | "balance" | "ohlc" => {
            match envelope.subscription_id.as_deref() {
                Some(id) if subscriptions.contains(id) => {}
                Some(id) => {
                    tracing::debug!(
                        msg_type = %envelope.msg_type,
                        subscription_id = %id,
                        "Dropping message for unknown subscription"
                    );
                    return Routed::Dropped;
                }
                None => {
                    tracing::debug!(msg_type = %envelope.msg_type, "Dropping stream message without subscription");
                    return Routed::Dropped;
                }
            }
            to_event(&envelope)
        }
        "ping" => return Routed::Dropped,
        other => {
            tracing::debug!(msg_type = %other, req_id = ?envelope.req_id, "Dropping unsolicited message");
            return Routed::Dropped;
        }
    };

    match parsed {
        Ok(Some(event)) => Routed::Event(event),
        Ok(None) => Routed::Dropped,
        Err(e) => {
            tracing::warn!(msg_type = %envelope.msg_type, error = %e, "Dropping malformed event");
            Routed::Dropped
        }
    }
}

fn to_event(envelope: &Envelope) -> Result<Option<ClientEvent>, super::ProtocolError> {
    let body = &envelope.body;
    Ok(match envelope.msg_type.as_str() {
        "tick" => Some(ClientEvent::Tick(parse_tick(body)?)),
        "proposal_open_contract" => parse_contract_update(body)?.map(ClientEvent::Contract),
        "balance" => {
            let (balance, currency) = parse_balance(body)?;
            Some(ClientEvent::Balance { balance, currency })
        }
        "ohlc" => Some(ClientEvent::Candle(parse_candle(body)?)),
        _ => None,
    })
}
