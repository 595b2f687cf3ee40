//! # Summary states and simulation modes.
//!
//! ```text
//! STANDBY --start--> DISABLED --enable--> ENABLED
//! ENABLED --disable--> DISABLED --standby--> STANDBY
//! STANDBY --exitControl--> OFFLINE (terminal)
//! STANDBY|DISABLED|ENABLED --fault--> FAULT --standby--> STANDBY
//! ```

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::ControllerError;

/// Controller summary state. Exactly one is current at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    Standby,
    Disabled,
    Enabled,
    Fault,
    /// Terminal: the process may exit.
    Offline,
}

impl State {
    /// True if background loops may be active in this state.
    pub fn permits_loops(self) -> bool {
        matches!(self, State::Enabled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Standby => "STANDBY",
            State::Disabled => "DISABLED",
            State::Enabled => "ENABLED",
            State::Fault => "FAULT",
            State::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulation mode, fixed per controller until changed in STANDBY.
///
/// Each mode carries the tick period of the simulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SimulationMode {
    /// Real hardware; no simulation loop.
    #[default]
    Real = 0,
    /// Synthetic telemetry every second.
    Fast = 1,
    /// Synthetic telemetry every 30 seconds.
    Slow = 2,
}

impl SimulationMode {
    /// Tick period used by the simulation loop.
    pub fn period(self) -> Duration {
        match self {
            SimulationMode::Real => Duration::ZERO,
            SimulationMode::Fast => Duration::from_secs(1),
            SimulationMode::Slow => Duration::from_secs(30),
        }
    }

    pub fn is_simulated(self) -> bool {
        !matches!(self, SimulationMode::Real)
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for SimulationMode {
    type Error = ControllerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SimulationMode::Real),
            1 => Ok(SimulationMode::Fast),
            2 => Ok(SimulationMode::Slow),
            other => Err(ControllerError::InvalidMode(other)),
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulationMode::Real => "real",
            SimulationMode::Fast => "fast",
            SimulationMode::Slow => "slow",
        };
        write!(f, "{name}({})", self.as_i64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_periods() {
        assert_eq!(SimulationMode::Real.period(), Duration::ZERO);
        assert_eq!(SimulationMode::Fast.period(), Duration::from_secs(1));
        assert_eq!(SimulationMode::Slow.period(), Duration::from_secs(30));
    }

    #[test]
    fn test_mode_out_of_range() {
        assert!(matches!(
            SimulationMode::try_from(3),
            Err(ControllerError::InvalidMode(3))
        ));
        assert!(SimulationMode::try_from(-1).is_err());
        assert_eq!(SimulationMode::try_from(2).unwrap(), SimulationMode::Slow);
    }

    #[test]
    fn test_loops_permitted_states() {
        assert!(State::Enabled.permits_loops());
        assert!(!State::Disabled.permits_loops());
        assert!(!State::Standby.permits_loops());
        assert!(!State::Fault.permits_loops());
        assert!(!State::Offline.permits_loops());
    }
}
