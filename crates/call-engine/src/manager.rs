//! Call manager (C10): call_id -> CallContext bookkeeping, answer/hangup
//! lifecycle, and the idle-context cleanup sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rvoip_media_core::config::CallManagerConfig;
use rvoip_media_core::{Error, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::scenario::{
    dispatch_inbound, dispatch_outbound, CallContext, CallOrchestrator, CallScenario, Party, RoutingInputs, SignallingMessage, SignallingSink,
};

/// The DTLS-SRTP handshake (or equivalent secure-media bring-up) is an
/// external black box; the call manager only needs to know when it's ready,
/// or that it timed out.
#[async_trait]
pub trait SecureMediaContext: Send + Sync {
    async fn wait_ready(&self) -> Result<()>;
}

/// A `SecureMediaContext` that's ready immediately, for scenarios/tests that
/// don't model the handshake at all.
pub struct ImmediateSecureContext;

#[async_trait]
impl SecureMediaContext for ImmediateSecureContext {
    async fn wait_ready(&self) -> Result<()> {
        Ok(())
    }
}

fn now_unix_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

pub struct CallManager {
    contexts: DashMap<String, CallContext>,
    config: CallManagerConfig,
    signalling: Arc<dyn SignallingSink>,
    orchestrator: Option<Arc<dyn CallOrchestrator>>,
}

impl CallManager {
    /// `orchestrator` drives the C7 AI auto-responder for the `WebToServer`/
    /// `MobileToServer` scenarios; pass `None` if this deployment never routes
    /// a call to the AI agent (those two scenarios will then fail with
    /// `Error::NotInitialized` rather than connecting to nobody).
    pub fn new(config: CallManagerConfig, signalling: Arc<dyn SignallingSink>, orchestrator: Option<Arc<dyn CallOrchestrator>>) -> Arc<Self> {
        Arc::new(Self {
            contexts: DashMap::new(),
            config,
            signalling,
            orchestrator,
        })
    }

    /// Start the background idle-context sweep. The returned handle may be
    /// dropped without affecting the sweep; abort it to stop sweeping.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(manager.config.cleanup_interval).await;
                manager.sweep_idle_contexts();
            }
        })
    }

    fn sweep_idle_contexts(&self) {
        let ttl = self.config.idle_context_ttl;
        let now = Instant::now();
        let mut doomed = Vec::new();
        for entry in self.contexts.iter() {
            let ctx = entry.value();
            let callee_missing_too_long = ctx.callee.is_none() && now.duration_since(ctx.created_at) > ttl;
            let both_idle = ctx.ended || now.duration_since(ctx.last_activity) > ttl;
            if callee_missing_too_long || both_idle {
                doomed.push(entry.key().clone());
            }
        }
        for call_id in doomed {
            if self.contexts.remove(&call_id).is_some() {
                debug!(call_id = %call_id, "reaped idle call context");
            }
        }
    }

    /// Retry a signalling send up to 3 times with exponential backoff starting
    /// at 1s, capped at 10s, per the delivery-failure recovery policy. A send
    /// that still fails after exhausting retries is logged and dropped rather
    /// than failing the call.
    async fn notify_with_retry(&self, to_user: &str, message: SignallingMessage) {
        let mut delay = Duration::from_secs(1);
        for attempt in 1..=3u32 {
            match self.signalling.send(to_user, message.clone()).await {
                Ok(()) => return,
                Err(err) if attempt < 3 => {
                    warn!(to_user, attempt, error = %err, "signalling delivery failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                }
                Err(err) => {
                    warn!(
                        to_user,
                        attempts = attempt,
                        error = %err,
                        "signalling delivery failed after exhausting retries, dropping"
                    );
                }
            }
        }
    }

    /// Place an outbound call: select the scenario from the endpoint kinds
    /// involved, create and register a context, and run the scenario's
    /// inbound signalling sequence toward the callee.
    pub async fn make_call(
        &self,
        caller: Party,
        callee: Party,
        offer_sdp: Option<String>,
        routing: RoutingInputs,
    ) -> Result<String> {
        let scenario = CallScenario::select(routing)?;
        let call_id = format!("AI_Caller_{}", Uuid::new_v4());

        let mut ctx = CallContext::new(call_id.clone(), scenario, Some(caller));
        ctx.callee = Some(callee);
        self.contexts.insert(call_id.clone(), ctx.clone());

        info!(call_id = %call_id, %scenario, "call context created");

        let orchestrator = self.orchestrator.as_deref();
        if let Err(err) = dispatch_inbound(scenario, &ctx, offer_sdp, now_unix_ms(), self.signalling.as_ref(), orchestrator).await {
            warn!(call_id = %call_id, error = %err, "inbound scenario dispatch failed");
            self.contexts.remove(&call_id);
            return Err(err);
        }

        Ok(call_id)
    }

    /// Mark the callee's client as ringing; ties ringback playback to the
    /// `CallRinging` signalling event.
    pub async fn start_ringback(&self, call_id: &str) -> Result<()> {
        let caller = {
            let mut entry = self.contexts.get_mut(call_id).ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;
            entry.ringback_active = true;
            entry.touch();
            entry.caller.clone()
        };
        if let Some(caller) = caller {
            self.notify_with_retry(&caller.user, SignallingMessage::CallRinging).await;
        }
        Ok(())
    }

    fn stop_ringback(&self, call_id: &str) {
        if let Some(mut entry) = self.contexts.get_mut(call_id) {
            entry.ringback_active = false;
        }
    }

    /// Accept an answer for `call_id`: stop ringback, wait for the secure
    /// media context, then notify the caller. Aborts with
    /// `Error::SecureContextTimeout` if the context doesn't become ready in
    /// time, per the secure-context timeout recovery policy (the caller is
    /// still notified the call failed via `CallEnded`, left to the invoker).
    pub async fn answer(&self, call_id: &str, answer_sdp: String, secure_ctx: &dyn SecureMediaContext) -> Result<()> {
        self.stop_ringback(call_id);

        let scenario = {
            let mut entry = self.contexts.get_mut(call_id).ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;
            entry.touch();
            entry.scenario
        };

        match tokio::time::timeout(self.config.secure_context_timeout, secure_ctx.wait_ready()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(Error::SecureContextTimeout(self.config.secure_context_timeout)),
        }

        let ctx = self
            .contexts
            .get(call_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;

        dispatch_outbound(scenario, &ctx, answer_sdp, self.signalling.as_ref()).await
    }

    /// Tear down `call_id`. The initiating party receives `HangupInitiated`
    /// (it asked to end the call); the other party receives `CallEnded`. If
    /// signalling hasn't settled within `hangup_timeout`, both parties are
    /// notified `HangupFailed` and local state is force-terminated regardless.
    pub async fn hangup(&self, call_id: &str, initiating_user: &str) -> Result<()> {
        let ctx = self
            .contexts
            .get(call_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;

        let teardown = async {
            if let Some(party) = ctx.party_for(initiating_user) {
                self.notify_with_retry(&party.user, SignallingMessage::HangupInitiated).await;
            }
            for party in ctx.caller.iter().chain(ctx.callee.iter()) {
                if party.user != initiating_user {
                    self.notify_with_retry(
                        &party.user,
                        SignallingMessage::CallEnded {
                            message: "remote party hung up".into(),
                            timestamp: now_unix_ms(),
                        },
                    )
                    .await;
                }
            }
        };

        if tokio::time::timeout(self.config.hangup_timeout, teardown).await.is_err() {
            warn!(call_id, "hangup signalling timed out, force-terminating");
            for party in ctx.caller.iter().chain(ctx.callee.iter()) {
                self.notify_with_retry(&party.user, SignallingMessage::HangupFailed).await;
            }
        }

        if let Some(mut entry) = self.contexts.get_mut(call_id) {
            entry.ended = true;
        }
        self.contexts.remove(call_id);
        Ok(())
    }

    /// Forward an ICE candidate generated by `user_id` to the other party on
    /// the call.
    pub async fn add_ice_candidate(&self, call_id: &str, user_id: &str, candidate: String) -> Result<()> {
        let other = {
            let entry = self.contexts.get(call_id).ok_or_else(|| Error::CallNotFound(call_id.to_string()))?;
            entry.other_party(user_id).cloned()
        };
        if let Some(other) = other {
            self.notify_with_retry(&other.user, SignallingMessage::ReceiveIceCandidate { candidate }).await;
        }
        Ok(())
    }

    pub fn context(&self, call_id: &str) -> Option<CallContext> {
        self.contexts.get(call_id).map(|e| e.value().clone())
    }

    pub fn active_call_count(&self) -> usize {
        self.contexts.len()
    }
}
