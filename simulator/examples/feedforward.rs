//! The five-neuron feed-forward network: A and B inhibit C, excite D, and
//! C and D drive E. A and B are stimulated directly; everything downstream
//! follows from the synaptic kernels.

use bevy::app::App;
use neurons::{IfNeuron, NeuronPlugin};
use simulator::{Roster, SimulationPlugin, SimulationRng};
use soma_core::Clock;

fn main() {
    let mut app = App::new();
    app.add_plugins((NeuronPlugin, SimulationPlugin));
    app.insert_resource(SimulationRng::seeded(42));

    let mut neuron_a = IfNeuron::new("Neuron_A");
    neuron_a.schedule_stimulation(10.0);
    neuron_a.schedule_stimulation(50.0);
    neuron_a.schedule_stimulation(90.0);
    let a = app.world.spawn(neuron_a).id();

    let mut neuron_b = IfNeuron::new("Neuron_B");
    neuron_b.schedule_stimulation(11.0);
    neuron_b.schedule_stimulation(60.0);
    let b = app.world.spawn(neuron_b).id();

    let mut neuron_c = IfNeuron::new("Neuron_C");
    neuron_c.add_receptor(a, -0.1);
    neuron_c.add_receptor(b, -0.5);
    let c = app.world.spawn(neuron_c).id();

    let mut neuron_d = IfNeuron::new("Neuron_D");
    neuron_d.add_receptor(a, 0.4);
    neuron_d.add_receptor(b, 0.5);
    let d = app.world.spawn(neuron_d).id();

    let mut neuron_e = IfNeuron::new("Neuron_E");
    neuron_e.add_receptor(c, 1.5);
    neuron_e.add_receptor(d, 1.0);
    let e = app.world.spawn(neuron_e).id();

    app.world.resource_mut::<Roster>().order = vec![a, b, c, d, e];

    let duration_ms = 200.0;
    let tau = app.world.resource::<Clock>().tau;
    let steps = (duration_ms / tau) as usize + 1;
    for _ in 0..steps {
        app.update();
    }

    for entity in [a, b, c, d, e] {
        let neuron = app.world.get::<IfNeuron>(entity).unwrap();
        let exported = neuron.export_recording();
        println!(
            "{}: spikes at {:?} ({} recorded samples)",
            neuron.id(),
            neuron.spike_times(),
            exported["Vm"].len(),
        );
    }
}
