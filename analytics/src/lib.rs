use bevy::{
    app::{App, Plugin},
    prelude::{Component, Query},
    reflect::Reflect,
};
use bevy_trait_query::One;
use soma_core::Neuron;

pub struct SomaAnalyticsPlugin;

impl Plugin for SomaAnalyticsPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<PotentialWindow>();
    }
}

/// Caller-owned rolling window of baseline-relative membrane potentials.
/// The newest sample sits at index 0 and the oldest is discarded. Attach it
/// to a neuron entity and the simulator fills it every step.
#[derive(Debug, Component, Reflect)]
pub struct PotentialWindow {
    samples: Vec<f64>,
}

impl PotentialWindow {
    /// A window of `len` slots, zero-filled.
    pub fn new(len: usize) -> Self {
        PotentialWindow {
            samples: vec![0.0; len],
        }
    }

    /// Shift older samples back one slot and write `value` at the head.
    pub fn push(&mut self, value: f64) {
        if self.samples.is_empty() {
            return;
        }
        self.samples.rotate_right(1);
        self.samples[0] = value;
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Write each neuron's `vm - vrest` into its attached window. The simulator
/// chains this right after the network update so the head slot always holds
/// the potential just computed.
pub fn update_windows(mut window_query: Query<(One<&dyn Neuron>, &mut PotentialWindow)>) {
    for (neuron, mut window) in window_query.iter_mut() {
        window.push(neuron.membrane_potential() - neuron.resting_potential());
    }
}
