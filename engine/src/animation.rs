use std::cell::Cell;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::rc::Rc;
use crate::objects::ObjectId;

pub const PULSE_PERIOD_MS: f64 = 1200.0;
pub const PULSE_MIN_OPACITY: f64 = 0.4;

/// Shared cancel flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Rc<Cell<bool>>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug)]
struct Pulse {
    token: CancellationToken,
    started_at: f64,
    rest_opacity: f64,
}

/// Opacity pulses on objects awaiting a backend result. At most one pulse per
/// object.
#[derive(Debug, Default)]
pub struct Animator {
    pulses: HashMap<ObjectId, Pulse>,
}

impl Animator {
    pub fn new() -> Self {
        Animator::default()
    }

    /// Starts pulsing `id`, cancelling any pulse already running on it.
    pub fn start_pulse(&mut self, id: ObjectId, now: f64, rest_opacity: f64) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.pulses.insert(id, Pulse { token: token.clone(), started_at: now, rest_opacity });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        token
    }

    /// Stops the pulse and returns the opacity to restore.
    pub fn cancel(&mut self, id: ObjectId) -> Option<f64> {
        let pulse = self.pulses.remove(&id)?;
        pulse.token.cancel();
        Some(pulse.rest_opacity)
    }

    pub fn cancel_all(&mut self) -> Vec<(ObjectId, f64)> {
        self.pulses
            .drain()
            .map(|(id, pulse)| {
                pulse.token.cancel();
                (id, pulse.rest_opacity)
            })
            .collect()
    }

    pub fn is_pulsing(&self, id: ObjectId) -> bool {
        self.pulses.contains_key(&id)
    }

    /// Opacity for every live pulse at `now`. Pulses whose token was cancelled
    /// from outside are dropped and report their rest opacity once.
    pub fn tick(&mut self, now: f64) -> Vec<(ObjectId, f64)> {
        let mut frame = Vec::with_capacity(self.pulses.len());
        self.pulses.retain(|id, pulse| {
            if pulse.token.is_cancelled() {
                frame.push((*id, pulse.rest_opacity));
                return false;
            }
            let phase = ((now - pulse.started_at).max(0.0) / PULSE_PERIOD_MS) * 2.0 * PI;
            let wave = (phase.cos() + 1.0) / 2.0;
            let opacity = PULSE_MIN_OPACITY + (pulse.rest_opacity - PULSE_MIN_OPACITY).max(0.0) * wave;
            frame.push((*id, opacity));
            true
        });
        frame.sort_by_key(|(id, _)| *id);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restarting_cancels_previous_token() {
        let mut animator = Animator::new();
        let first = animator.start_pulse(3, 0.0, 1.0);
        let second = animator.start_pulse(3, 100.0, 1.0);
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(animator.is_pulsing(3));
    }

    #[test]
    fn pulse_swings_between_bounds() {
        let mut animator = Animator::new();
        animator.start_pulse(1, 0.0, 1.0);
        assert_eq!(animator.tick(0.0), vec![(1, 1.0)]);
        let (_, trough) = animator.tick(PULSE_PERIOD_MS / 2.0)[0];
        assert!((trough - PULSE_MIN_OPACITY).abs() < 1e-9);
    }

    #[test]
    fn cancel_restores_rest_opacity() {
        let mut animator = Animator::new();
        let token = animator.start_pulse(7, 0.0, 0.8);
        assert_eq!(animator.cancel(7), Some(0.8));
        assert!(token.is_cancelled());
        assert!(animator.tick(50.0).is_empty());
        assert_eq!(animator.cancel(7), None);
    }

    #[test]
    fn externally_cancelled_pulse_reports_once() {
        let mut animator = Animator::new();
        let token = animator.start_pulse(2, 0.0, 0.9);
        token.cancel();
        assert_eq!(animator.tick(10.0), vec![(2, 0.9)]);
        assert!(animator.tick(20.0).is_empty());
    }
}
