//! Peripheral module orchestration.

use crate::error::ControlError;
use crate::hardware::HardwareControl;
use deckhand_common::hal::module::DeviceInfo;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Serializable snapshot of one connected module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub display_name: String,
    pub port: String,
    pub simulated: bool,
    pub status: String,
    pub device_info: Option<DeviceInfo>,
    pub data: serde_json::Value,
}

impl HardwareControl {
    /// Reconcile connected modules with what the backend reports.
    ///
    /// Modules that disappeared are disconnected and dropped; new ones are
    /// built and connected. A module that fails to build is skipped.
    pub async fn discover_modules(&self) -> Result<(), ControlError> {
        let present = self.backend.attached_modules();
        let ports: BTreeSet<&str> = present.iter().map(|a| a.port.as_str()).collect();
        let mut modules = self.modules.lock().await;

        let gone: Vec<String> = modules
            .keys()
            .filter(|port| !ports.contains(port.as_str()))
            .cloned()
            .collect();
        for port in gone {
            if let Some(mut module) = modules.remove(&port) {
                info!("Module {} on {} removed", module.name(), port);
                if let Err(e) = module.disconnect().await {
                    warn!("Failed to disconnect module on {}: {}", port, e);
                }
            }
        }

        for address in present {
            if modules.contains_key(&address.port) {
                continue;
            }
            match self.backend.build_module(&address).await {
                Ok(module) => {
                    info!("Module {} connected on {}", address.name, address.port);
                    modules.insert(address.port.clone(), module);
                }
                Err(e) => warn!("Failed to build module {} on {}: {}", address.name, address.port, e),
            }
        }
        debug!("{} module(s) attached", modules.len());
        Ok(())
    }

    /// Snapshot of every connected module, ordered by port.
    pub async fn attached_modules(&self) -> Vec<ModuleSummary> {
        self.modules
            .lock()
            .await
            .values()
            .map(|module| ModuleSummary {
                name: module.name().to_string(),
                display_name: module.display_name().to_string(),
                port: module.port().to_string(),
                simulated: module.is_simulated(),
                status: module.status(),
                device_info: module.device_info(),
                data: module.live_data(),
            })
            .collect()
    }

    /// Send a raw command to the module on `port`.
    pub async fn send_module_command(&self, port: &str, command: &str) -> Result<String, ControlError> {
        let mut modules = self.modules.lock().await;
        let module = modules
            .get_mut(port)
            .ok_or_else(|| ControlError::UnknownModule(port.to_string()))?;
        debug!("Module {} <- {}", port, command);
        Ok(module.send(command).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_common::config::RobotConfig;
    use deckhand_hal::Simulator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_discover_and_command() {
        let sim = Simulator::new()
            .with_module("thermocycler", "/dev/modules/tc_1")
            .with_module("magdeck", "/dev/modules/mag_1");
        let hw = HardwareControl::new(Arc::new(sim), RobotConfig::default()).unwrap();
        hw.discover_modules().await.unwrap();

        // Unknown module types are skipped.
        let modules = hw.attached_modules().await;
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].port, "/dev/modules/tc_1");
        assert!(modules[0].simulated);
        assert_eq!(modules[0].status, "idle");

        hw.send_module_command("/dev/modules/tc_1", "M104 S40")
            .await
            .unwrap();
        let modules = hw.attached_modules().await;
        assert_eq!(modules[0].status, "holding at target");

        assert!(matches!(
            hw.send_module_command("/dev/ttyACM9", "M119").await,
            Err(ControlError::UnknownModule(_))
        ));
    }
}
