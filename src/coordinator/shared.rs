//! State shared between producer threads and the main loop
//!
//! Three independent lock domains:
//!
//! - the frame buffer (data queue, rate limiter, buffer settings)
//! - the pending user-data slot
//! - the command stack
//!
//! None of them is held across a blocking wait. The pause and running flags
//! are atomics.

use super::command_queue::{Command, CommandStack, QueuedCommand};
use super::data_queue::DataQueue;
use super::rate_limiter::{Admission, RateLimiter};
use super::wake::WakeSignal;
use crate::config::{BufferSettings, ParametersMap};
use crate::types::OdometryEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug)]
struct FrameBuffer {
    queue: DataQueue,
    limiter: RateLimiter,
    settings: BufferSettings,
}

#[derive(Debug)]
pub(crate) struct SharedState {
    buffer: Mutex<FrameBuffer>,
    user_data: Mutex<Option<Vec<u8>>>,
    commands: CommandStack,
    wake: WakeSignal,
    paused: AtomicBool,
    running: AtomicBool,
}

impl SharedState {
    pub fn new(settings: BufferSettings) -> Self {
        Self {
            buffer: Mutex::new(FrameBuffer {
                queue: DataQueue::new(settings.max_size),
                limiter: RateLimiter::new(),
                settings,
            }),
            user_data: Mutex::new(None),
            commands: CommandStack::new(),
            wake: WakeSignal::new(),
            paused: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    /// Queue a command, or toggle pause right away
    pub fn submit_command(&self, cmd: Command) {
        if matches!(cmd, Command::Pause) {
            let paused = !self.paused.fetch_xor(true, Ordering::SeqCst);
            tracing::info!("Mapping {}", if paused { "paused" } else { "resumed" });
            return;
        }
        self.push_command(cmd.into());
    }

    pub fn push_command(&self, cmd: QueuedCommand) {
        tracing::debug!("Queued command {}", cmd.state());
        self.commands.push(cmd);
        self.wake.signal();
    }

    /// Run the admission policy for a frame arriving at `now`
    ///
    /// Signals the main loop once if an entry was written, evicted or not.
    /// Frames are dropped while paused or once the main loop has stopped.
    pub fn submit_frame_at(&self, event: OdometryEvent, now: Instant) -> Admission {
        if self.is_paused() {
            return Admission::Dropped;
        }
        if !self.is_running() {
            tracing::debug!("Ignoring frame {}, mapping worker stopped", event.id());
            return Admission::Dropped;
        }

        let OdometryEvent {
            frame,
            pose,
            uncertainty,
        } = event;
        let decision = {
            let mut buffer = self.buffer.lock();
            let settings = buffer.settings;
            let decision = buffer.limiter.evaluate(now, &settings, pose, uncertainty);
            match decision.admission {
                Admission::Full => {
                    buffer
                        .queue
                        .push(OdometryEvent::new(frame, pose, decision.uncertainty));
                }
                Admission::Intermediate => {
                    buffer
                        .queue
                        .push(OdometryEvent::new(frame.stripped(), pose, decision.uncertainty));
                }
                Admission::Dropped => {}
            }
            decision
        };

        if decision.odometry_reset {
            self.push_command(Command::TriggerNewMap.into());
        }
        if decision.admission.is_queued() {
            self.wake.signal();
        }
        decision.admission
    }

    /// Record lost odometry
    pub fn mark_lost(&self) {
        tracing::debug!("Odometry lost");
        self.buffer.lock().limiter.mark_lost();
    }

    /// Store a user-data blob in the single pending slot
    ///
    /// Ignored while paused, so a blob never lands on a node created after
    /// the pause ends.
    pub fn submit_user_data(&self, data: Vec<u8>) {
        if data.is_empty() || self.is_paused() {
            return;
        }
        let was_empty = {
            let mut slot = self.user_data.lock();
            let was_empty = slot.is_none();
            if !was_empty {
                tracing::warn!(
                    "New user data received before the last one was processed. Overwriting \
                     the user data with the new one. Consider lowering the user data rate."
                );
            }
            *slot = Some(data);
            was_empty
        };
        if was_empty {
            self.push_command(QueuedCommand::AddUserData);
        }
    }

    pub fn take_user_data(&self) -> Option<Vec<u8>> {
        self.user_data.lock().take()
    }

    /// Drop queued frames, pose and variance state and the pending user data
    pub fn clear_buffered_data(&self) {
        {
            let mut buffer = self.buffer.lock();
            buffer.queue.clear();
            buffer.limiter.reset();
        }
        *self.user_data.lock() = None;
    }

    /// Apply buffering keys from `parameters`
    pub fn apply_parameters(&self, parameters: &ParametersMap) {
        let mut buffer = self.buffer.lock();
        buffer.settings.apply_parameters(parameters);
        let max_size = buffer.settings.max_size;
        buffer.queue.set_max_size(max_size);
    }

    pub fn pop_command(&self) -> Option<QueuedCommand> {
        self.commands.pop()
    }

    pub fn pop_frame(&self) -> Option<OdometryEvent> {
        self.buffer.lock().queue.pop()
    }

    /// Entries waiting in the data queue (full and intermediate)
    pub fn buffered(&self) -> usize {
        self.buffer.lock().queue.len()
    }

    pub fn buffered_ids(&self) -> Vec<i32> {
        self.buffer.lock().queue.ids()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn has_user_data(&self) -> bool {
        self.user_data.lock().is_some()
    }

    pub fn settings(&self) -> BufferSettings {
        self.buffer.lock().settings
    }

    /// (rotational, translational) variance accumulators
    pub fn variances(&self) -> (f64, f64) {
        self.buffer.lock().limiter.variances()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear buffered data and wake the main loop so it exits
    ///
    /// Only the first call signals.
    pub fn shutdown(&self) {
        self.clear_buffered_data();
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("Stopping mapping worker");
            self.wake.signal();
        }
    }

    pub fn wait(&self) {
        self.wake.wait();
    }

    pub fn try_wait(&self) -> bool {
        self.wake.try_wait()
    }

    pub fn pending_wakeups(&self) -> usize {
        self.wake.pending()
    }
}
