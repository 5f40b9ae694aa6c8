use bevy::{prelude::Resource, reflect::Reflect};

#[bevy_trait_query::queryable]
/// Observer-facing view of a neuron. Sampling systems query for this trait
/// instead of a concrete model type.
pub trait Neuron {
    fn membrane_potential(&self) -> f64;
    fn resting_potential(&self) -> f64;
}

/// Simulation clock. `time` is the step currently being processed; the
/// simulator ticks it by `tau` after every pass over the roster.
#[derive(Resource, Reflect)]
pub struct Clock {
    pub time: f64,
    pub tau: f64,
    /// Whether neurons sample (time, potential) into their recording
    /// buffers this step.
    pub recording: bool,
}

impl Default for Clock {
    fn default() -> Self {
        Clock {
            time: 0.0,
            tau: 1.0,
            recording: true,
        }
    }
}
