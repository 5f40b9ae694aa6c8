use bevy::prelude::ResMut;
use soma_core::Clock;

pub(crate) fn advance_clock(mut clock: ResMut<Clock>) {
    clock.time += clock.tau;
}
