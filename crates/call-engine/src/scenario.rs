//! Call-scenario state machine (C9).
//!
//! Selects one of seven call topologies from the endpoint kinds involved and
//! drives the signalling sequence each topology implies. The SIP/RTP stack
//! and the concrete "acquire a client, set an SDP offer" machinery are
//! external black boxes here (same posture `media-core`'s audio bridge takes
//! toward RTP) — what this module owns is strictly which messages get sent,
//! to whom, and in what order, for a given topology.

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use rvoip_media_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One endpoint of a call: who they are, their dialled number, and an opaque
/// handle to whatever client/session object the (external) SIP stack uses to
/// address them. This crate never interprets `client_handle`; it only stores
/// and forwards it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub user: String,
    pub number: String,
    pub client_handle: String,
}

/// The seven call topologies this system routes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallScenario {
    WebToWeb,
    WebToMobile,
    MobileToWeb,
    ServerToWeb,
    WebToServer,
    ServerToMobile,
    MobileToServer,
}

impl fmt::Display for CallScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Endpoint-kind inputs used to select a [`CallScenario`]. The distilled
/// three-flag selection key (`caller_is_web`, `callee_is_web`,
/// `caller_is_server`) from the routing table is under-determined on its own
/// — it can't tell a mobile callee from a server-side AI-enabled callee, which
/// the literal end-to-end scenario (inbound from a non-web caller to an
/// AI-enabled user selects `MobileToServer`) requires distinguishing. This
/// adds `callee_is_server` to resolve that ambiguity; see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingInputs {
    pub caller_is_web: bool,
    pub callee_is_web: bool,
    pub caller_is_server: bool,
    pub callee_is_server: bool,
}

impl CallScenario {
    /// Select the scenario variant for `inputs`, or [`Error::NoHandler`] if no
    /// variant's topology matches (e.g. both endpoints server-side, or both
    /// endpoints claiming to be the server).
    pub fn select(inputs: RoutingInputs) -> Result<Self> {
        use CallScenario::*;
        let key = (
            inputs.caller_is_web,
            inputs.callee_is_web,
            inputs.caller_is_server,
            inputs.callee_is_server,
        );
        match key {
            (true, true, false, false) => Ok(WebToWeb),
            (true, false, false, false) => Ok(WebToMobile),
            (false, true, false, false) => Ok(MobileToWeb),
            (false, true, true, false) => Ok(ServerToWeb),
            (true, false, false, true) => Ok(WebToServer),
            (false, false, true, false) => Ok(ServerToMobile),
            (false, false, false, true) => Ok(MobileToServer),
            _ => Err(Error::NoHandler),
        }
    }
}

/// Directional messages the core emits to signalling consumers (§6). Every
/// variant is JSON-serializable, matching the spec's "abstract signalling"
/// contract; `call_id` is the opaque, `AI_Caller_`-prefixed string unique to
/// one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignallingMessage {
    /// Sent to a callee: a new call is incoming.
    InCalling {
        caller: String,
        callee: String,
        offer_sdp: Option<String>,
        call_id: String,
        timestamp: i64,
    },
    /// Sent to a caller: the call is being dialled.
    CallTrying,
    /// Sent to a caller: the callee's phone/client is ringing (may accompany early media).
    CallRinging,
    /// Sent to a caller: the callee answered with this SDP.
    SdpAnswered { sdp: String },
    /// Sent to either party: an ICE candidate generated by the other side.
    ReceiveIceCandidate { candidate: String },
    /// Sent to a caller: the callee fully answered.
    Answered,
    /// Sent to either party: the call ended.
    CallEnded { message: String, timestamp: i64 },
    /// Sent to a caller: the call timed out before being answered.
    CallTimeout,
    /// Sent to either party: hangup signalling has begun.
    HangupInitiated,
    /// Sent to either party: hangup signalling did not complete in time and
    /// the call was force-terminated locally.
    HangupFailed,
}

/// The per-user signalling channel. An external black box: this crate only
/// ever calls `send` and treats delivery failure as retryable (see
/// [`crate::manager::CallManager::notify_with_retry`]).
#[async_trait]
pub trait SignallingSink: Send + Sync {
    async fn send(&self, to_user: &str, message: SignallingMessage) -> Result<()>;
}

/// Drives the C7-backed AI auto-responder for a call's server-side leg. The
/// concrete `AiAutoResponder` (and the `AudioBridge`/`TtsEngine` it needs) are
/// wired up outside this crate, same as `SignallingSink`; this is the seam
/// `dispatch_inbound` calls through for the `WebToServer`/`MobileToServer`
/// variants, which the spec requires to "invoke the orchestrator" rather than
/// ring a human callee over signalling.
#[async_trait]
pub trait CallOrchestrator: Send + Sync {
    /// Start (or resume) the AI agent's side of `ctx`'s call, given the
    /// remote party's SDP offer. Implementations are expected to construct
    /// or look up the `AiAutoResponder` bound to this call's media session,
    /// `start()` it, and begin a `play_script` call.
    async fn handle_server_leg(&self, ctx: &CallContext, offer_sdp: Option<String>) -> Result<()>;
}

/// State owned by the call manager (C10) for one call's lifetime.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: String,
    pub scenario: CallScenario,
    pub caller: Option<Party>,
    pub callee: Option<Party>,
    pub ringback_active: bool,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub ended: bool,
}

impl CallContext {
    pub fn new(call_id: String, scenario: CallScenario, caller: Option<Party>) -> Self {
        let now = Instant::now();
        Self {
            call_id,
            scenario,
            caller,
            callee: None,
            ringback_active: false,
            created_at: now,
            last_activity: now,
            ended: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether `user` is a party to this call.
    pub fn party_for(&self, user: &str) -> Option<&Party> {
        self.caller
            .iter()
            .chain(self.callee.iter())
            .find(|p| p.user == user)
    }

    /// The party on the other side of `user` (for ICE candidate forwarding).
    pub fn other_party(&self, user: &str) -> Option<&Party> {
        match (&self.caller, &self.callee) {
            (Some(c), Some(_)) if c.user == user => self.callee.as_ref(),
            (Some(_), Some(cle)) if cle.user == user => self.caller.as_ref(),
            _ => None,
        }
    }
}

/// Runs one scenario's inbound signalling sequence: accept the inbound
/// request, ring the callee (or invoke the AI agent, for the `*ToServer`
/// variants), and offer the caller's SDP onward. Each variant is a pure
/// function of `(scenario, ctx)` plus the signalling sink and the
/// orchestrator seam — no hidden state.
///
/// `orchestrator` is only consulted for `WebToServer`/`MobileToServer`: those
/// variants have no human callee to ring over signalling, only the AI agent's
/// side of C7 to start. A missing orchestrator on one of those variants is a
/// configuration error (`Error::NotInitialized`), not a silent no-op, since
/// the call would otherwise connect to nobody.
pub async fn dispatch_inbound(
    scenario: CallScenario,
    ctx: &CallContext,
    offer_sdp: Option<String>,
    timestamp: i64,
    sink: &dyn SignallingSink,
    orchestrator: Option<&dyn CallOrchestrator>,
) -> Result<()> {
    use CallScenario::*;

    let caller = ctx.caller.as_ref().ok_or_else(|| Error::InvalidState("inbound dispatch requires a caller".into()))?;

    match scenario {
        WebToWeb | WebToMobile | ServerToWeb => {
            // Web-originated legs get session-progress (early media) back to
            // the caller before the callee side is wired up.
            sink.send(&caller.user, SignallingMessage::CallRinging).await?;
            if let Some(callee) = &ctx.callee {
                sink.send(
                    &callee.user,
                    SignallingMessage::InCalling {
                        caller: caller.user.clone(),
                        callee: callee.user.clone(),
                        offer_sdp,
                        call_id: ctx.call_id.clone(),
                        timestamp,
                    },
                )
                .await?;
            }
            Ok(())
        }
        WebToServer => {
            // Session-progress still goes back to the web caller, but the
            // other side is the AI agent, not a human callee to ring.
            sink.send(&caller.user, SignallingMessage::CallRinging).await?;
            invoke_orchestrator(orchestrator, ctx, offer_sdp).await
        }
        MobileToWeb => {
            // Non-web callers don't get session-progress; go straight to
            // offering the web callee the SDP.
            if let Some(callee) = &ctx.callee {
                sink.send(
                    &callee.user,
                    SignallingMessage::InCalling {
                        caller: caller.user.clone(),
                        callee: callee.user.clone(),
                        offer_sdp,
                        call_id: ctx.call_id.clone(),
                        timestamp,
                    },
                )
                .await?;
            }
            Ok(())
        }
        MobileToServer => invoke_orchestrator(orchestrator, ctx, offer_sdp).await,
        ServerToMobile => {
            // Handled entirely as an outbound placement; nothing to do on
            // the inbound leg.
            Ok(())
        }
    }
}

async fn invoke_orchestrator(orchestrator: Option<&dyn CallOrchestrator>, ctx: &CallContext, offer_sdp: Option<String>) -> Result<()> {
    match orchestrator {
        Some(orchestrator) => orchestrator.handle_server_leg(ctx, offer_sdp).await,
        None => Err(Error::NotInitialized(format!(
            "no call orchestrator configured to drive the AI agent leg of {:?}",
            ctx.scenario
        ))),
    }
}

/// Runs one scenario's outbound signalling sequence: the callee side having
/// answered (or the AI agent having decided to answer immediately), tell the
/// caller.
pub async fn dispatch_outbound(scenario: CallScenario, ctx: &CallContext, answer_sdp: String, sink: &dyn SignallingSink) -> Result<()> {
    use CallScenario::*;

    let caller = ctx.caller.as_ref().ok_or_else(|| Error::InvalidState("outbound dispatch requires a caller".into()))?;

    match scenario {
        WebToWeb | WebToMobile | ServerToWeb | ServerToMobile | MobileToServer => {
            sink.send(&caller.user, SignallingMessage::SdpAnswered { sdp: answer_sdp }).await?;
            sink.send(&caller.user, SignallingMessage::Answered).await
        }
        MobileToWeb | WebToServer => {
            // These variants invoke the orchestrator directly rather than
            // round-tripping an SDP answer back through signalling.
            sink.send(&caller.user, SignallingMessage::Answered).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn selects_all_seven_documented_combinations() {
        let cases = [
            (true, true, false, false, CallScenario::WebToWeb),
            (true, false, false, false, CallScenario::WebToMobile),
            (false, true, false, false, CallScenario::MobileToWeb),
            (false, true, true, false, CallScenario::ServerToWeb),
            (true, false, false, true, CallScenario::WebToServer),
            (false, false, true, false, CallScenario::ServerToMobile),
            (false, false, false, true, CallScenario::MobileToServer),
        ];
        for (caller_is_web, callee_is_web, caller_is_server, callee_is_server, expected) in cases {
            let inputs = RoutingInputs {
                caller_is_web,
                callee_is_web,
                caller_is_server,
                callee_is_server,
            };
            assert_eq!(CallScenario::select(inputs).unwrap(), expected);
        }
    }

    #[test]
    fn unmapped_combination_is_no_handler() {
        let inputs = RoutingInputs {
            caller_is_web: true,
            callee_is_web: true,
            caller_is_server: true,
            callee_is_server: false,
        };
        assert!(matches!(CallScenario::select(inputs), Err(Error::NoHandler)));
    }

    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SignallingSink for RecordingSink {
        async fn send(&self, to_user: &str, message: SignallingMessage) -> Result<()> {
            let label = match message {
                SignallingMessage::CallRinging => "CallRinging",
                SignallingMessage::InCalling { .. } => "InCalling",
                SignallingMessage::SdpAnswered { .. } => "SdpAnswered",
                SignallingMessage::Answered => "Answered",
                _ => "Other",
            };
            self.sent.lock().unwrap().push((to_user.to_string(), label.to_string()));
            Ok(())
        }
    }

    fn ctx_with_both_parties(scenario: CallScenario) -> CallContext {
        let mut ctx = CallContext::new(
            "AI_Caller_test".into(),
            scenario,
            Some(Party {
                user: "caller1".into(),
                number: "+15550001".into(),
                client_handle: "handle-caller".into(),
            }),
        );
        ctx.callee = Some(Party {
            user: "callee1".into(),
            number: "+15550002".into(),
            client_handle: "handle-callee".into(),
        });
        ctx
    }

    #[tokio::test]
    async fn web_to_web_sends_ringback_then_offers_callee() {
        let ctx = ctx_with_both_parties(CallScenario::WebToWeb);
        let sink = RecordingSink::new();
        dispatch_inbound(CallScenario::WebToWeb, &ctx, Some("v=0".into()), 0, &sink, None).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0], ("caller1".to_string(), "CallRinging".to_string()));
        assert_eq!(sent[1], ("callee1".to_string(), "InCalling".to_string()));
    }

    #[tokio::test]
    async fn mobile_to_web_skips_ringback() {
        let ctx = ctx_with_both_parties(CallScenario::MobileToWeb);
        let sink = RecordingSink::new();
        dispatch_inbound(CallScenario::MobileToWeb, &ctx, Some("v=0".into()), 0, &sink, None).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("callee1".to_string(), "InCalling".to_string()));
    }

    #[tokio::test]
    async fn outbound_answer_reaches_caller() {
        let ctx = ctx_with_both_parties(CallScenario::WebToMobile);
        let sink = RecordingSink::new();
        dispatch_outbound(CallScenario::WebToMobile, &ctx, "v=0 answer".into(), &sink).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert!(sent.iter().any(|(user, kind)| user == "caller1" && kind == "SdpAnswered"));
        assert!(sent.iter().any(|(user, kind)| user == "caller1" && kind == "Answered"));
    }

    struct RecordingOrchestrator {
        invoked: Mutex<Vec<(String, Option<String>)>>,
    }

    impl RecordingOrchestrator {
        fn new() -> Self {
            Self { invoked: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl CallOrchestrator for RecordingOrchestrator {
        async fn handle_server_leg(&self, ctx: &CallContext, offer_sdp: Option<String>) -> Result<()> {
            self.invoked.lock().unwrap().push((ctx.call_id.clone(), offer_sdp));
            Ok(())
        }
    }

    #[tokio::test]
    async fn mobile_to_server_invokes_orchestrator_without_ringing_a_callee() {
        let ctx = ctx_with_both_parties(CallScenario::MobileToServer);
        let sink = RecordingSink::new();
        let orchestrator = RecordingOrchestrator::new();
        dispatch_inbound(CallScenario::MobileToServer, &ctx, Some("v=0".into()), 0, &sink, Some(&orchestrator))
            .await
            .unwrap();

        assert!(sink.sent.lock().unwrap().is_empty());
        let invoked = orchestrator.invoked.lock().unwrap();
        assert_eq!(invoked.len(), 1);
        assert_eq!(invoked[0], (ctx.call_id.clone(), Some("v=0".to_string())));
    }

    #[tokio::test]
    async fn web_to_server_rings_caller_then_invokes_orchestrator() {
        let ctx = ctx_with_both_parties(CallScenario::WebToServer);
        let sink = RecordingSink::new();
        let orchestrator = RecordingOrchestrator::new();
        dispatch_inbound(CallScenario::WebToServer, &ctx, Some("v=0".into()), 0, &sink, Some(&orchestrator))
            .await
            .unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent, &vec![("caller1".to_string(), "CallRinging".to_string())]);
        assert_eq!(orchestrator.invoked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn server_scenario_without_orchestrator_is_not_initialized() {
        let ctx = ctx_with_both_parties(CallScenario::MobileToServer);
        let sink = RecordingSink::new();
        let result = dispatch_inbound(CallScenario::MobileToServer, &ctx, None, 0, &sink, None).await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
    }
}
