//! Mutable state of the simulated machine.

use deckhand_common::consts::HOME_POSITION;
use deckhand_common::hal::backend::Lights;
use deckhand_common::types::{Axis, AxisMap};
use std::collections::BTreeMap;

/// Everything the simulator remembers between calls.
#[derive(Debug, Clone)]
pub struct SimState {
    /// Raw axis positions.
    pub position: AxisMap,
    /// Motor enable state per axis.
    pub engaged: BTreeMap<Axis, bool>,
    /// Active motor currents (A).
    pub currents: BTreeMap<Axis, f64>,
    /// Saved current settings, innermost last.
    pub current_stack: Vec<BTreeMap<Axis, f64>>,
    pub lights: Lights,
    pub paused: bool,
}

/// Raw home position per axis.
pub fn home_position() -> AxisMap {
    Axis::ALL.iter().copied().zip(HOME_POSITION).collect()
}

impl SimState {
    pub fn new() -> Self {
        Self {
            position: home_position(),
            engaged: Axis::ALL.iter().map(|a| (*a, false)).collect(),
            currents: Axis::ALL.iter().map(|a| (*a, 0.0)).collect(),
            current_stack: Vec::new(),
            lights: Lights::default(),
            paused: false,
        }
    }

    /// Send `axes` to their home positions and engage them.
    pub fn home(&mut self, axes: &[Axis]) {
        let home = home_position();
        for axis in axes {
            if let Some(value) = home.get(axis) {
                self.position.insert(*axis, *value);
            }
            self.engaged.insert(*axis, true);
        }
    }

    pub fn move_to(&mut self, target: &AxisMap) {
        for (axis, value) in target {
            self.position.insert(*axis, *value);
            self.engaged.insert(*axis, true);
        }
    }

    pub fn push_current(&mut self) {
        self.current_stack.push(self.currents.clone());
    }

    pub fn pop_current(&mut self) {
        if let Some(saved) = self.current_stack.pop() {
            self.currents = saved;
        }
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_position_is_home() {
        let state = SimState::new();
        assert_eq!(state.position[&Axis::X], 418.0);
        assert_eq!(state.position[&Axis::A], 218.0);
        assert_eq!(state.position[&Axis::C], 19.0);
        assert!(state.engaged.values().all(|e| !e));
    }

    #[test]
    fn test_current_stack_restores() {
        let mut state = SimState::new();
        state.currents.insert(Axis::Z, 0.8);
        state.push_current();
        state.currents.insert(Axis::Z, 0.1);
        state.pop_current();
        assert_eq!(state.currents[&Axis::Z], 0.8);
        // Unbalanced pop leaves currents untouched.
        state.pop_current();
        assert_eq!(state.currents[&Axis::Z], 0.8);
    }
}
