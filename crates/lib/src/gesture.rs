//! Gesture-to-intent bridge: turns discrete classifier labels into natural
//! language and drives them through the completion relay.
//!
//! The classifier fires on every video frame while a gesture is held, so the
//! bridge is an explicit state machine (Idle -> Submitting -> CoolingDown ->
//! Idle). A frame triggers a submission only when the bridge is Idle and the
//! label differs from the last emitted one; frames are ignored while
//! Submitting, so submissions never overlap, and the cooldown starts only
//! after the submission completes.

use crate::relay::CompletionRelay;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Cooldown after a submission completes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1200);

/// Classifies the current video frame into an optional gesture label.
/// The recognition model itself is an external collaborator.
pub trait GestureClassifier: Send {
    fn classify(&mut self) -> Option<String>;
}

/// Fixed mapping from classifier labels to utterances; unknown labels fall
/// through to a generic templated phrase.
pub fn intent_for(label: &str) -> String {
    match label {
        "Palm" => "Hello! I'm here to communicate through sign language.",
        "Fist" => "I'm feeling tense or stressed right now.",
        "Thumb_Up" => "Yes, I agree or I'm feeling okay.",
        "Thumb_Down" => "No, I don't agree or I feel sad.",
        "Victory" => "I'm feeling peaceful or I've achieved something.",
        "Pointing_Up" => "I have a question or I want to say something.",
        "ILoveYou" => "I appreciate your help and care.",
        "Open_Pinch" => "Something small is bothering me.",
        "Closed_Pinch" => "I want to share something important.",
        "None" => "No gesture detected.",
        other => return format!("User performed gesture: {}", other),
    }
    .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Idle,
    Submitting,
    CoolingDown,
}

/// One completed exchange: the recognized gesture and the bot's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureExchange {
    pub gesture: String,
    pub reply: String,
}

/// The bridge state machine plus its transcript of exchanges.
pub struct GestureBridge {
    relay: Arc<dyn CompletionRelay>,
    cooldown: Duration,
    phase: BridgePhase,
    last_gesture: Option<String>,
    cooldown_until: Option<Instant>,
    transcript: Vec<GestureExchange>,
    running: Arc<AtomicBool>,
}

impl GestureBridge {
    pub fn new(relay: Arc<dyn CompletionRelay>) -> Self {
        Self::with_cooldown(relay, DEFAULT_COOLDOWN)
    }

    pub fn with_cooldown(relay: Arc<dyn CompletionRelay>, cooldown: Duration) -> Self {
        Self {
            relay,
            cooldown,
            phase: BridgePhase::Idle,
            last_gesture: None,
            cooldown_until: None,
            transcript: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn phase(&self) -> BridgePhase {
        self.phase
    }

    pub fn transcript(&self) -> &[GestureExchange] {
        &self.transcript
    }

    /// Handle to stop a running poll loop.
    pub fn stopper(&self) -> BridgeStopper {
        BridgeStopper(self.running.clone())
    }

    /// Process one classifier frame.
    ///
    /// Timer-driven transition (cooldown expiry) and completion-driven
    /// transition (submission finished) are both taken here, at the poll
    /// point, so the whole machine advances on the frame cadence.
    pub async fn on_frame(&mut self, label: Option<&str>) {
        if self.phase == BridgePhase::CoolingDown {
            let expired = self
                .cooldown_until
                .map(|until| Instant::now() >= until)
                .unwrap_or(true);
            if expired {
                self.phase = BridgePhase::Idle;
                self.cooldown_until = None;
            }
        }
        if self.phase != BridgePhase::Idle {
            return;
        }
        let Some(label) = label else { return };
        if self.last_gesture.as_deref() == Some(label) {
            return;
        }

        self.phase = BridgePhase::Submitting;
        self.last_gesture = Some(label.to_string());
        let utterance = intent_for(label);
        match self.relay.chat(&utterance).await {
            Ok(reply) => self.transcript.push(GestureExchange {
                gesture: label.to_string(),
                reply,
            }),
            Err(e) => log::warn!("gesture submission failed: {}", e),
        }
        self.phase = BridgePhase::CoolingDown;
        self.cooldown_until = Some(Instant::now() + self.cooldown);
    }

    /// Poll the classifier on a fixed frame cadence until stopped.
    pub async fn run<C: GestureClassifier>(&mut self, classifier: &mut C, frame_interval: Duration) {
        self.running.store(true, Ordering::SeqCst);
        let mut ticker = tokio::time::interval(frame_interval);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            let label = classifier.classify();
            self.on_frame(label.as_deref()).await;
        }
        log::info!("gesture bridge: poll loop stopped");
    }
}

/// Stops the bridge's poll loop at the next frame.
pub struct BridgeStopper(Arc<AtomicBool>);

impl BridgeStopper {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
