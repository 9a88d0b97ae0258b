//! Monitoring session
//!
//! One task owns the gate's pipeline, the state machine, and the cooldown
//! clock. Frames reach it with their gate permit over a one-slot channel;
//! dismiss commands and cooldown ticks arrive on the same task, so the
//! debounce state has exactly one mutator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alerting::AlertSink;
use camera_capture::RawFrame;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analysis::FrameAnalysis;
use crate::config::DmsConfig;
use crate::detector::FaceDetector;
use crate::gate::{GateOutcome, GatePermit, ProcessingGate};
use crate::state::{DrowsinessStateMachine, StateEvent};
use crate::DmsError;

const EVENT_CAPACITY: usize = 64;

struct AdmittedFrame {
    frame: RawFrame,
    permit: GatePermit,
}

enum Command {
    Dismiss,
    Shutdown,
}

/// Counters reported when the session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_dropped: u64,
    pub alerts_dispatched: u64,
}

/// Producer side: offers frames to the session
#[derive(Clone)]
pub struct FrameFeed {
    gate: ProcessingGate,
    sender: mpsc::Sender<AdmittedFrame>,
    rejected: Arc<AtomicU64>,
}

impl FrameFeed {
    /// Hand a frame to the session. Returns false when it was dropped
    /// because a frame is already in flight, or rejected because the
    /// session has ended.
    pub fn offer(&self, frame: RawFrame) -> bool {
        let Some(permit) = self.gate.try_acquire() else {
            debug!("Frame {} dropped: pipeline busy", frame.sequence);
            return false;
        };
        let sequence = frame.sequence;
        // The permit travels with the frame, so the slot is always free here
        // while the session runs; a failure means the session is gone.
        match self.sender.try_send(AdmittedFrame { frame, permit }) {
            Ok(()) => true,
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("dms_frames_rejected_total").increment(1);
                warn!("Frame {} rejected: {}", sequence, e);
                false
            }
        }
    }

    /// Frames admitted by the gate that the session could not take
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Frames dropped because the pipeline was busy
    pub fn dropped(&self) -> u64 {
        self.gate.dropped()
    }
}

/// Caller side of a running session
pub struct MonitorHandle {
    feed: FrameFeed,
    snapshots: watch::Receiver<FrameAnalysis>,
    events: broadcast::Sender<StateEvent>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<SessionSummary>,
}

impl MonitorHandle {
    pub fn feed(&self) -> FrameFeed {
        self.feed.clone()
    }

    /// Latest per-frame analysis
    pub fn snapshots(&self) -> watch::Receiver<FrameAnalysis> {
        self.snapshots.clone()
    }

    /// State transitions as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Acknowledge the alert dialog
    pub async fn dismiss(&self) -> Result<(), DmsError> {
        self.commands
            .send(Command::Dismiss)
            .await
            .map_err(|_| DmsError::SessionClosed)
    }

    /// Stop the session and wait for it to finish
    pub async fn shutdown(self) -> Result<SessionSummary, DmsError> {
        // A closed channel means the task is already gone; join reports it
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|e| DmsError::Session(e.to_string()))
    }
}

/// The session task
pub struct MonitorSession<D, S> {
    gate: ProcessingGate,
    detector: D,
    sink: S,
    machine: DrowsinessStateMachine,
    frames: mpsc::Receiver<AdmittedFrame>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<FrameAnalysis>,
    events: broadcast::Sender<StateEvent>,
    cooldown_tick: Duration,
    summary: SessionSummary,
}

impl<D, S> MonitorSession<D, S>
where
    D: FaceDetector + 'static,
    S: AlertSink + 'static,
{
    /// Start a session on the current tokio runtime
    pub fn spawn(config: DmsConfig, detector: D, sink: S) -> Result<MonitorHandle, DmsError> {
        config.validate()?;
        info!("Starting monitoring session with config: {:?}", config);

        let gate = ProcessingGate::new(&config);
        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (snapshot_tx, snapshot_rx) = watch::channel(FrameAnalysis::default());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let session = MonitorSession {
            gate: gate.clone(),
            detector,
            sink,
            machine: DrowsinessStateMachine::new(&config),
            frames: frame_rx,
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx.clone(),
            cooldown_tick: config.cooldown_tick(),
            summary: SessionSummary::default(),
        };
        let task = tokio::spawn(session.run());

        Ok(MonitorHandle {
            feed: FrameFeed {
                gate,
                sender: frame_tx,
                rejected: Arc::new(AtomicU64::new(0)),
            },
            snapshots: snapshot_rx,
            events: event_tx,
            commands: command_tx,
            task,
        })
    }

    async fn run(mut self) -> SessionSummary {
        let mut tick = tokio::time::interval(self.cooldown_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(admitted) = self.frames.recv() => self.handle_frame(admitted).await,
                command = self.commands.recv() => match command {
                    Some(Command::Dismiss) => {
                        let events = self.machine.dismiss();
                        self.publish(events);
                        let state = self.machine.state();
                        self.snapshots.send_modify(|s| {
                            s.status = state.status;
                            s.alert_dialog_visible = state.alert_dialog_visible;
                        });
                    }
                    Some(Command::Shutdown) | None => break,
                },
                _ = tick.tick() => {
                    let events = self.machine.tick(now());
                    self.publish(events);
                }
            }
        }

        self.summary.frames_dropped = self.gate.dropped();
        self.summary.alerts_dispatched = self.machine.alerts_dispatched();
        info!("Monitoring session stopped: {:?}", self.summary);
        self.summary
    }

    async fn handle_frame(&mut self, admitted: AdmittedFrame) {
        let AdmittedFrame { frame, permit } = admitted;

        match self.gate.run(&permit, &frame, &self.detector).await {
            GateOutcome::Processed(processed) => {
                self.summary.frames_processed += 1;
                let events = self
                    .machine
                    .on_verdict(&processed.verdict, processed.sequence, now());
                self.publish(events);
                let analysis = FrameAnalysis::new(processed, self.machine.state());
                self.snapshots.send_replace(analysis);
            }
            GateOutcome::Skipped(_) => self.summary.frames_skipped += 1,
            GateOutcome::Dropped => {}
        }

        // Frame is fully handled; the next one may be admitted
        drop(permit);
    }

    fn publish(&self, events: Vec<StateEvent>) {
        for event in events {
            if let StateEvent::DispatchAlert(trigger) = &event {
                self.sink.notify(trigger);
            }
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

/// Session clock; follows tokio's clock so paused-time tests stay deterministic
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
