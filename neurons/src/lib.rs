use bevy::app::{App, Plugin};
use bevy_trait_query::RegisterExt;
use soma_core::Neuron;

pub mod iaf;
pub mod kernel;
pub mod spontaneous;

pub use iaf::{IfNeuron, Receptor, SynapticInput, ABSOLUTE_REFRACTORY_MS};
pub use spontaneous::{
    FixedIntervals, IntervalDistribution, SpontaneousActivity, SpontaneousConfigError,
    TruncatedNormal,
};

pub struct NeuronPlugin;

impl Plugin for NeuronPlugin {
    fn build(&self, app: &mut App) {
        app.register_component_as::<dyn Neuron, IfNeuron>();
    }
}
