use std::collections::{HashMap, VecDeque};

use bevy::prelude::{Component, Entity};
use rand::RngCore;
use soma_core::Neuron;

use crate::kernel::dual_exp;
use crate::spontaneous::{SpontaneousActivity, SpontaneousConfigError};

/// Absolute refractory window following any spike.
pub const ABSOLUTE_REFRACTORY_MS: f64 = 1.0;

/// Flat depolarization while inside the absolute refractory window. The
/// spike's own rising edge is not modeled as a shape.
const SPIKE_PLATEAU_MV: f64 = 60.0;

/// Gap reported for a neuron that has never spiked: far enough in the past
/// that every kernel evaluates to ~0.
const NEVER_SPIKED_GAP_MS: f64 = 99_999_999.9;

/// Incoming synaptic edge: a non-owning handle to the source neuron plus a
/// connection weight. Negative weights are inhibitory. Multiple edges from
/// the same source and self-loops are permitted.
#[derive(Clone, Copy, Debug)]
pub struct Receptor {
    pub source: Entity,
    pub weight: f64,
}

/// One receptor's input for the current step, resolved by the simulator:
/// the edge weight and the source's most recent spike time, if any.
#[derive(Clone, Copy, Debug)]
pub struct SynapticInput {
    pub weight: f64,
    pub source_last_spike_ms: Option<f64>,
}

/// Spike-history snapshot for one evaluation time, computed once per step
/// and passed to the term functions.
#[derive(Clone, Copy, Debug)]
struct SpikeContext {
    has_spiked: bool,
    gap_ms: f64,
    in_refractory: bool,
}

/// A simple integrate-and-fire neuron.
///
/// The membrane potential is not integrated incrementally; it is recomputed
/// each step from closed-form kernels over the spike history:
/// `vm = vrest + plateau + AHP + PSP`.
#[derive(Component, Debug)]
pub struct IfNeuron {
    id: String,
    /// Membrane potential. Starts at rest by construction; meaningful from
    /// the first `advance` on.
    pub vm_mv: f64,
    /// Resting membrane potential.
    pub vrest_mv: f64,
    /// Action potential firing threshold.
    pub vact_mv: f64,
    /// After-hyperpolarization peak (negative: below rest).
    pub vahp_mv: f64,
    pub tau_ahp_ms: f64,
    /// All receptors share the same PSP shape.
    pub tau_psp_rise_ms: f64,
    pub tau_psp_decay_ms: f64,
    /// Unit PSP amplitude, scaled by each edge weight.
    pub vpsp_mv: f64,
    receptors: Vec<Receptor>,
    stimulation_queue: VecDeque<f64>,
    spontaneous: Option<SpontaneousActivity>,
    spike_times_ms: Vec<f64>,
    last_update_ms: Option<f64>,
    in_refractory: bool,
    t_recorded_ms: Vec<f64>,
    vm_recorded_mv: Vec<f64>,
}

impl IfNeuron {
    /// Create a neuron with the stock parameter set: -60 mV rest, -50 mV
    /// threshold, -20 mV AHP peak with tau 30 ms, 5/25 ms PSP rise/decay and
    /// 20 mV unit PSP amplitude. Override the public fields before
    /// simulation start.
    pub fn new(id: impl Into<String>) -> Self {
        IfNeuron {
            id: id.into(),
            vm_mv: -60.0,
            vrest_mv: -60.0,
            vact_mv: -50.0,
            vahp_mv: -20.0,
            tau_ahp_ms: 30.0,
            tau_psp_rise_ms: 5.0,
            tau_psp_decay_ms: 25.0,
            vpsp_mv: 20.0,
            receptors: Vec::new(),
            stimulation_queue: VecDeque::new(),
            spontaneous: None,
            spike_times_ms: Vec::new(),
            last_update_ms: None,
            in_refractory: false,
            t_recorded_ms: Vec::new(),
            vm_recorded_mv: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach an incoming edge from `source`.
    pub fn add_receptor(&mut self, source: Entity, weight: f64) {
        self.receptors.push(Receptor { source, weight });
    }

    pub fn receptors(&self) -> &[Receptor] {
        &self.receptors
    }

    /// Schedule a forced spike at `at_ms`, regardless of the membrane state
    /// at that time. Callers must keep the schedule ascending.
    pub fn schedule_stimulation(&mut self, at_ms: f64) {
        self.stimulation_queue.push_back(at_ms);
    }

    pub fn pending_stimulations(&self) -> usize {
        self.stimulation_queue.len()
    }

    /// Configure spontaneous firing with the given inter-spike interval
    /// statistics. A zero mean disables spontaneous activity; a negative
    /// mean or a non-positive standard deviation is a configuration error.
    pub fn set_spontaneous_activity(
        &mut self,
        mean_ms: f64,
        stdev_ms: f64,
    ) -> Result<(), SpontaneousConfigError> {
        if mean_ms == 0.0 {
            self.spontaneous = None;
            return Ok(());
        }
        self.spontaneous = Some(SpontaneousActivity::new(mean_ms, stdev_ms)?);
        Ok(())
    }

    /// Install a pre-built generator, e.g. one with a substituted interval
    /// distribution.
    pub fn set_spontaneous_with(&mut self, activity: SpontaneousActivity) {
        self.spontaneous = Some(activity);
    }

    pub fn spontaneous(&self) -> Option<&SpontaneousActivity> {
        self.spontaneous.as_ref()
    }

    /// All spike times so far, non-decreasing.
    pub fn spike_times(&self) -> &[f64] {
        &self.spike_times_ms
    }

    pub fn last_spike_ms(&self) -> Option<f64> {
        self.spike_times_ms.last().copied()
    }

    /// True iff the most recent spike was at most 1.0 ms before the last
    /// processed step.
    pub fn in_refractory(&self) -> bool {
        self.in_refractory
    }

    /// Recorded samples as parallel (times, potentials) slices.
    pub fn recording(&self) -> (&[f64], &[f64]) {
        (&self.t_recorded_ms, &self.vm_recorded_mv)
    }

    /// Recorded potential series under the fixed `"Vm"` key used for
    /// interchange with reporting tools.
    pub fn export_recording(&self) -> HashMap<&'static str, Vec<f64>> {
        HashMap::from([("Vm", self.vm_recorded_mv.clone())])
    }

    /// Advance the neuron one discrete step to `t_ms`.
    ///
    /// Performs, strictly in order: direct-stimulation consumption, membrane
    /// potential update (which refreshes the refractory flag and, when
    /// `record` is set, samples into the recording buffers), threshold
    /// detection, and the spontaneous-activity step. A call with `t_ms` not
    /// after the previous update is ignored.
    ///
    /// Returns true when any spike was recorded during this step.
    pub fn advance(
        &mut self,
        t_ms: f64,
        record: bool,
        inputs: &[SynapticInput],
        rng: &mut dyn RngCore,
    ) -> bool {
        if self.last_update_ms.is_some_and(|last_ms| t_ms <= last_ms) {
            return false;
        }
        let spikes_before = self.spike_times_ms.len();

        // At most one overdue forced stimulus is consumed per step; the
        // spike is recorded at its scheduled time, not at `t_ms`. A second
        // overdue entry waits for the next step.
        if let Some(&due_ms) = self.stimulation_queue.front() {
            if due_ms <= t_ms {
                self.stimulation_queue.pop_front();
                self.spike_times_ms.push(due_ms);
            }
        }

        let ctx = self.spike_context(t_ms);
        self.in_refractory = ctx.in_refractory;
        self.update_potential(t_ms, record, &ctx, inputs);
        self.detect_threshold(t_ms, &ctx);
        self.spontaneous_step(t_ms, &ctx, rng);

        self.last_update_ms = Some(t_ms);
        self.spike_times_ms.len() > spikes_before
    }

    fn spike_context(&self, t_ms: f64) -> SpikeContext {
        match self.spike_times_ms.last() {
            Some(&last_ms) => {
                let gap_ms = t_ms - last_ms;
                SpikeContext {
                    has_spiked: true,
                    gap_ms,
                    in_refractory: gap_ms <= ABSOLUTE_REFRACTORY_MS,
                }
            }
            None => SpikeContext {
                has_spiked: false,
                gap_ms: NEVER_SPIKED_GAP_MS,
                in_refractory: false,
            },
        }
    }

    /// `vm = vrest + plateau + AHP + PSP`, in that order.
    fn update_potential(
        &mut self,
        t_ms: f64,
        record: bool,
        ctx: &SpikeContext,
        inputs: &[SynapticInput],
    ) {
        let plateau_mv = self.plateau_term(ctx);
        let ahp_mv = self.ahp_term(ctx);
        let psp_mv = self.psp_term(t_ms, inputs);
        self.vm_mv = self.vrest_mv + plateau_mv + ahp_mv + psp_mv;
        if record {
            self.t_recorded_ms.push(t_ms);
            self.vm_recorded_mv.push(self.vm_mv);
        }
    }

    /// The spike event itself, confined to the absolute refractory window.
    fn plateau_term(&self, ctx: &SpikeContext) -> f64 {
        if ctx.has_spiked && ctx.in_refractory {
            SPIKE_PLATEAU_MV
        } else {
            0.0
        }
    }

    /// Single-exponential decay from the AHP peak back toward rest.
    fn ahp_term(&self, ctx: &SpikeContext) -> f64 {
        if !ctx.has_spiked || ctx.in_refractory {
            return 0.0;
        }
        self.vahp_mv * (-ctx.gap_ms / self.tau_ahp_ms).exp()
    }

    /// Sum of the dual-exponential responses to each source's most recent
    /// spike, scaled by edge weight.
    fn psp_term(&self, t_ms: f64, inputs: &[SynapticInput]) -> f64 {
        inputs
            .iter()
            .filter_map(|input| {
                input.source_last_spike_ms.map(|spike_ms| {
                    dual_exp(
                        input.weight * self.vpsp_mv,
                        self.tau_psp_rise_ms,
                        self.tau_psp_decay_ms,
                        t_ms - spike_ms,
                    )
                })
            })
            .sum()
    }

    /// The only endogenous spike path: threshold crossing outside the
    /// absolute refractory window.
    fn detect_threshold(&mut self, t_ms: f64, ctx: &SpikeContext) {
        if ctx.in_refractory {
            return;
        }
        if self.vm_mv >= self.vact_mv {
            self.spike_times_ms.push(t_ms);
        }
    }

    fn spontaneous_step(&mut self, t_ms: f64, ctx: &SpikeContext, rng: &mut dyn RngCore) {
        if ctx.in_refractory {
            return;
        }
        let Some(spontaneous) = self.spontaneous.as_mut() else {
            return;
        };
        if spontaneous.step(t_ms, rng) {
            self.spike_times_ms.push(t_ms);
        }
    }
}

impl Neuron for IfNeuron {
    fn membrane_potential(&self) -> f64 {
        self.vm_mv
    }

    fn resting_potential(&self) -> f64 {
        self.vrest_mv
    }
}
