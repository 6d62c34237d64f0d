//! Clock and battery collaborator.
//!
//! The engine only touches power management at the edges into and out of `Playing`.

use std::sync::Mutex;

use player_types::{BatteryState, ClockPair};

/// Clock scaling, power-save and battery telemetry provided by the host.
pub trait PowerControl: Send + Sync {
    /// Request a CPU/bus clock pair.
    fn set_clock(&self, clock: ClockPair);
    /// Current CPU/bus clock pair.
    fn read_clock(&self) -> ClockPair;
    /// Current battery state.
    fn read_battery(&self) -> BatteryState;
    /// Enable (`true`) or disable power-save.
    fn set_power_save(&self, enabled: bool);
}

/// Power collaborator for desktop hosts.
///
/// Clock requests are recorded and logged; nothing is actually rescaled.
#[derive(Debug)]
pub struct HostPower {
    state: Mutex<HostPowerState>,
}

#[derive(Debug)]
struct HostPowerState {
    clock: ClockPair,
    power_save: bool,
}

impl HostPower {
    /// Start with `clock` as the reported clock pair and power-save enabled.
    pub fn new(clock: ClockPair) -> Self {
        Self {
            state: Mutex::new(HostPowerState {
                clock,
                power_save: true,
            }),
        }
    }

    pub fn power_save(&self) -> bool {
        self.state.lock().map(|s| s.power_save).unwrap_or(true)
    }
}

impl Default for HostPower {
    fn default() -> Self {
        Self::new(ClockPair::new(222, 111))
    }
}

impl PowerControl for HostPower {
    fn set_clock(&self, clock: ClockPair) {
        tracing::debug!(cpu = clock.cpu, bus = clock.bus, "set clock");
        if let Ok(mut s) = self.state.lock() {
            s.clock = clock;
        }
    }

    fn read_clock(&self) -> ClockPair {
        self.state
            .lock()
            .map(|s| s.clock)
            .unwrap_or_default()
    }

    fn read_battery(&self) -> BatteryState {
        BatteryState {
            external_power: true,
            ..BatteryState::default()
        }
    }

    fn set_power_save(&self, enabled: bool) {
        tracing::debug!(enabled, "power save");
        if let Ok(mut s) = self.state.lock() {
            s.power_save = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_power_records_requests() {
        let power = HostPower::default();
        assert_eq!(power.read_clock(), ClockPair::new(222, 111));
        power.set_clock(ClockPair::new(49, 16));
        power.set_power_save(false);
        assert_eq!(power.read_clock(), ClockPair::new(49, 16));
        assert!(!power.power_save());
        assert!(power.read_battery().external_power);
    }
}
