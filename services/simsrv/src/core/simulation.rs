//! Background simulation engine
//!
//! One periodic task per running device. Each tick advances every
//! simulation-enabled point and runs feedback propagation, taking the same
//! per-unit mutation lock as protocol writes. A tick never performs network
//! I/O, so a stalled master cannot delay simulation.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::device::ModbusDevice;

/// Spawn the simulation task for a running device.
///
/// The task ends when the device's cancellation token fires. Devices with
/// no simulation-enabled points still get a (cheap) ticker so that points
/// enabled by a later configuration update are picked up after a restart.
pub fn spawn(device: Arc<ModbusDevice>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(device.simulation_interval());
        // a burst after a delayed tick would draw several values at once
        // for no gain; skip straight to the next slot instead
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let mut updated = 0;
                    for unit in device.units() {
                        updated += unit.apply_simulation();
                    }
                    if updated > 0 {
                        trace!(
                            "simulation tick on '{}' updated {updated} points",
                            device.file_name()
                        );
                    }
                },
            }
        }
        debug!("simulation task stopped for '{}'", device.file_name());
    })
}
