//! Device registry and lifecycle orchestration
//!
//! The manager owns the two disjoint collections (devices and templates),
//! serializes mutating operations per file name through a per-entry lock,
//! and guarantees at most one bound listener per device at any time.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::device::{DeviceConfig, ModbusDevice};
use super::log::{LogLevel, LogRecord};
use super::simulation;
use super::value::DataValue;
use crate::error::{Result, SimSrvError};
use crate::protocol::server::{ClientInfo, ProtocolServer};
use crate::storage::{DeviceKind, DeviceStore};

/// Live resources of a started device
struct DeviceRuntime {
    server: ProtocolServer,
    sim_handle: JoinHandle<()>,
    cancel: CancellationToken,
    port: u16,
}

/// One registry entry; the entry mutex serializes mutations per file name
struct ManagedDevice {
    device: Arc<ModbusDevice>,
    runtime: Option<DeviceRuntime>,
}

impl ManagedDevice {
    fn is_running(&self) -> bool {
        self.runtime.is_some()
    }
}

/// Summary row returned by list operations
#[derive(Debug, Clone, Serialize)]
pub struct DeviceOverview {
    pub file_name: String,
    pub name: String,
    pub port: u16,
    pub enabled: bool,
    pub template: bool,
    pub running: bool,
    pub unit_count: usize,
}

type Registry = RwLock<HashMap<String, Arc<Mutex<ManagedDevice>>>>;

/// Process-wide registry of devices and templates
pub struct DeviceManager {
    store: Arc<dyn DeviceStore>,
    devices: Registry,
    templates: Registry,
    /// actual bound port -> file name of the running holder
    running_ports: parking_lot::Mutex<HashMap<u16, String>>,
}

fn validate_file_name(file_name: &str) -> Result<()> {
    let valid = !file_name.is_empty()
        && !file_name.starts_with('.')
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(SimSrvError::Validation(vec![format!(
            "invalid file name '{file_name}': use letters, digits, '.', '_' and '-'"
        )]))
    }
}

impl DeviceManager {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            devices: RwLock::new(HashMap::new()),
            templates: RwLock::new(HashMap::new()),
            running_ports: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn collection(&self, kind: DeviceKind) -> &Registry {
        match kind {
            DeviceKind::Device => &self.devices,
            DeviceKind::Template => &self.templates,
        }
    }

    fn build_device(
        kind: DeviceKind,
        file_name: &str,
        mut config: DeviceConfig,
    ) -> Result<(DeviceConfig, Arc<ModbusDevice>)> {
        // the collection decides the flag, whatever the payload claims
        config.template = kind == DeviceKind::Template;
        let device = ModbusDevice::from_config(file_name, config.clone())?;
        Ok((config, Arc::new(device)))
    }

    async fn entry(&self, kind: DeviceKind, file_name: &str) -> Result<Arc<Mutex<ManagedDevice>>> {
        self.collection(kind)
            .read()
            .await
            .get(file_name)
            .cloned()
            .ok_or_else(|| SimSrvError::DeviceNotFound(file_name.to_string()))
    }

    /// Load every stored device and template into the registry.
    ///
    /// A file that fails to parse or validate is skipped with a warning;
    /// one bad file must not take the service down.
    pub async fn load_all(&self) -> Result<()> {
        for kind in [DeviceKind::Device, DeviceKind::Template] {
            let names = self.store.list(kind).await?;
            let mut loaded = 0usize;
            for name in names {
                let result = match self.store.load(kind, &name).await {
                    Ok(config) => Self::build_device(kind, &name, config),
                    Err(e) => Err(e),
                };
                match result {
                    Ok((_, device)) => {
                        self.collection(kind).write().await.insert(
                            name,
                            Arc::new(Mutex::new(ManagedDevice {
                                device,
                                runtime: None,
                            })),
                        );
                        loaded += 1;
                    },
                    Err(e) => warn!("skipping {} '{name}': {e}", kind.as_str()),
                }
            }
            info!("loaded {loaded} {}(s)", kind.as_str());
        }
        Ok(())
    }

    /// Create a new device or template and persist it
    pub async fn create(
        &self,
        kind: DeviceKind,
        file_name: &str,
        config: DeviceConfig,
    ) -> Result<()> {
        validate_file_name(file_name)?;
        let (config, device) = Self::build_device(kind, file_name, config)?;

        let mut collection = self.collection(kind).write().await;
        if collection.contains_key(file_name) {
            return Err(SimSrvError::DuplicateName(file_name.to_string()));
        }
        self.store.save(kind, file_name, &config).await?;
        collection.insert(
            file_name.to_string(),
            Arc::new(Mutex::new(ManagedDevice {
                device,
                runtime: None,
            })),
        );
        info!("created {} '{file_name}'", kind.as_str());
        Ok(())
    }

    pub async fn get_config(&self, kind: DeviceKind, file_name: &str) -> Result<DeviceConfig> {
        let entry = self.entry(kind, file_name).await?;
        let guard = entry.lock().await;
        Ok(guard.device.config().clone())
    }

    pub async fn list(&self, kind: DeviceKind) -> Vec<DeviceOverview> {
        let collection = self.collection(kind).read().await;
        let mut overviews = Vec::with_capacity(collection.len());
        for (file_name, entry) in collection.iter() {
            let guard = entry.lock().await;
            overviews.push(DeviceOverview {
                file_name: file_name.clone(),
                name: guard.device.name().to_string(),
                port: guard.device.port(),
                enabled: guard.device.enabled(),
                template: guard.device.is_template(),
                running: guard.is_running(),
                unit_count: guard.device.unit_ids().len(),
            });
        }
        overviews.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        overviews
    }

    /// Replace a stored configuration. The device must be stopped.
    pub async fn update(
        &self,
        kind: DeviceKind,
        file_name: &str,
        config: DeviceConfig,
    ) -> Result<()> {
        let entry = self.entry(kind, file_name).await?;
        let mut guard = entry.lock().await;
        if guard.is_running() {
            return Err(SimSrvError::DeviceRunning(file_name.to_string()));
        }

        let (config, device) = Self::build_device(kind, file_name, config)?;
        self.store.save(kind, file_name, &config).await?;
        guard.device = device;
        Ok(())
    }

    /// Start a device: bind its listener, seed point values, spawn the
    /// simulation task. Fails without side effects on any error.
    pub async fn start(&self, file_name: &str) -> Result<SocketAddr> {
        let entry = match self.entry(DeviceKind::Device, file_name).await {
            Ok(entry) => entry,
            Err(e) => {
                // a template of that name exists: tell the caller why this
                // can never start rather than "not found"
                if self.entry(DeviceKind::Template, file_name).await.is_ok() {
                    return Err(SimSrvError::TemplateNotStartable(file_name.to_string()));
                }
                return Err(e);
            },
        };

        let mut guard = entry.lock().await;
        if guard.is_running() {
            return Err(SimSrvError::DeviceRunning(file_name.to_string()));
        }

        let device = guard.device.clone();
        let port = device.port();
        if port != 0 && self.running_ports.lock().contains_key(&port) {
            return Err(SimSrvError::PortInUse(port));
        }

        device.reset_values();
        let cancel = CancellationToken::new();
        let server = ProtocolServer::bind(device.clone(), cancel.clone()).await?;
        let local_addr = server.local_addr();

        self.running_ports
            .lock()
            .insert(local_addr.port(), file_name.to_string());

        let sim_handle = simulation::spawn(device.clone(), cancel.clone());
        guard.runtime = Some(DeviceRuntime {
            server,
            sim_handle,
            cancel,
            port: local_addr.port(),
        });

        device
            .log()
            .append(LogLevel::Info, format!("device started on {local_addr}"));
        info!("started device '{file_name}' on {local_addr}");
        Ok(local_addr)
    }

    /// Stop a running device: close the listener, cancel connection and
    /// simulation tasks, release the port.
    pub async fn stop(&self, file_name: &str) -> Result<()> {
        let entry = self.entry(DeviceKind::Device, file_name).await?;
        let mut guard = entry.lock().await;
        let runtime = guard
            .runtime
            .take()
            .ok_or_else(|| SimSrvError::DeviceNotRunning(file_name.to_string()))?;

        runtime.cancel.cancel();
        runtime.server.shutdown().await;
        if let Err(e) = runtime.sim_handle.await {
            if !e.is_cancelled() {
                warn!("simulation task for '{file_name}' ended abnormally: {e}");
            }
        }
        self.running_ports.lock().remove(&runtime.port);

        guard
            .device
            .log()
            .append(LogLevel::Info, "device stopped".to_string());
        info!("stopped device '{file_name}'");
        Ok(())
    }

    /// Delete a stored device or template. Running devices must be stopped
    /// first.
    pub async fn delete(&self, kind: DeviceKind, file_name: &str) -> Result<()> {
        let mut collection = self.collection(kind).write().await;
        let entry = collection
            .get(file_name)
            .ok_or_else(|| SimSrvError::DeviceNotFound(file_name.to_string()))?;

        {
            let guard = entry.lock().await;
            if guard.is_running() {
                return Err(SimSrvError::DeviceRunning(file_name.to_string()));
            }
        }

        self.store.delete(kind, file_name).await?;
        collection.remove(file_name);
        info!("deleted {} '{file_name}'", kind.as_str());
        Ok(())
    }

    /// Persist the current configuration of an entry
    pub async fn save(&self, kind: DeviceKind, file_name: &str) -> Result<()> {
        let entry = self.entry(kind, file_name).await?;
        let guard = entry.lock().await;
        self.store.save(kind, file_name, guard.device.config()).await
    }

    /// Copy a template into the device collection under a new file name
    pub async fn instantiate_template(
        &self,
        template_name: &str,
        file_name: &str,
    ) -> Result<()> {
        let config = self.get_config(DeviceKind::Template, template_name).await?;
        self.create(DeviceKind::Device, file_name, config).await
    }

    pub async fn is_running(&self, file_name: &str) -> Result<bool> {
        let entry = self.entry(DeviceKind::Device, file_name).await?;
        let guard = entry.lock().await;
        Ok(guard.is_running())
    }

    /// Activity log of a device, oldest first
    pub async fn logs(&self, file_name: &str) -> Result<Vec<LogRecord>> {
        let entry = self.entry(DeviceKind::Device, file_name).await?;
        let guard = entry.lock().await;
        Ok(guard.device.log().records())
    }

    /// Masters currently connected to a running device
    pub async fn clients(&self, file_name: &str) -> Result<Vec<ClientInfo>> {
        let entry = self.entry(DeviceKind::Device, file_name).await?;
        let guard = entry.lock().await;
        match &guard.runtime {
            Some(runtime) => Ok(runtime.server.clients().await),
            None => Ok(Vec::new()),
        }
    }

    /// Current value of one data point
    pub async fn point_value(
        &self,
        file_name: &str,
        unit_id: u8,
        point_id: &str,
    ) -> Result<DataValue> {
        let entry = self.entry(DeviceKind::Device, file_name).await?;
        let guard = entry.lock().await;
        let unit = guard
            .device
            .unit(unit_id)
            .ok_or(SimSrvError::UnitNotFound(unit_id))?;
        unit.point_value(point_id)
            .ok_or_else(|| SimSrvError::PointNotFound(point_id.to_string()))
    }

    /// Start every enabled device; failures are logged and skipped.
    /// Returns the number of devices started.
    pub async fn start_enabled(&self) -> usize {
        let names: Vec<String> = {
            let collection = self.devices.read().await;
            let mut names = Vec::new();
            for (name, entry) in collection.iter() {
                let guard = entry.lock().await;
                if guard.device.enabled() && !guard.is_running() {
                    names.push(name.clone());
                }
            }
            names
        };

        let mut started = 0;
        for name in names {
            match self.start(&name).await {
                Ok(_) => started += 1,
                Err(e) => warn!("could not start device '{name}': {e}"),
            }
        }
        started
    }

    /// Stop every running device (service shutdown)
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.devices.read().await.keys().cloned().collect();
        for name in names {
            match self.stop(&name).await {
                Ok(()) => {},
                Err(SimSrvError::DeviceNotRunning(_)) => {},
                Err(e) => warn!("error stopping device '{name}': {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::Endianness;
    use crate::core::device::{UnitConfig, DEFAULT_SIMULATION_INTERVAL_MS};
    use crate::core::point::DataPointConfig;
    use crate::core::value::{AccessMode, DataArea, DataType};
    use crate::storage::JsonFileStore;

    fn manager(dir: &std::path::Path) -> DeviceManager {
        let store = Arc::new(JsonFileStore::new(dir).unwrap());
        DeviceManager::new(store)
    }

    fn config(port: u16) -> DeviceConfig {
        DeviceConfig {
            name: "test device".to_string(),
            enabled: false,
            port,
            endianness: Endianness::default(),
            template: false,
            gateway: false,
            simulation_interval_ms: DEFAULT_SIMULATION_INTERVAL_MS,
            units: vec![UnitConfig {
                unit_id: 1,
                points: vec![DataPointConfig {
                    id: "value".to_string(),
                    areas: vec![DataArea::HoldingRegister],
                    data_type: DataType::UInt16,
                    address: 0,
                    access: AccessMode::ReadWrite,
                    default_value: None,
                    length: None,
                    simulation: None,
                    feedback_point: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        mgr.create(DeviceKind::Device, "plc", config(0)).await.unwrap();
        let err = mgr
            .create(DeviceKind::Device, "plc", config(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SimSrvError::DuplicateName(_)));

        // the template namespace is disjoint
        mgr.create(DeviceKind::Template, "plc", config(0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_file_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let err = mgr
            .create(DeviceKind::Device, "../escape", config(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SimSrvError::Validation(_)));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(DeviceKind::Device, "plc", config(0)).await.unwrap();

        let addr = mgr.start("plc").await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(mgr.is_running("plc").await.unwrap());

        // starting twice is rejected
        assert!(matches!(
            mgr.start("plc").await.unwrap_err(),
            SimSrvError::DeviceRunning(_)
        ));

        mgr.stop("plc").await.unwrap();
        assert!(!mgr.is_running("plc").await.unwrap());
        assert!(matches!(
            mgr.stop("plc").await.unwrap_err(),
            SimSrvError::DeviceNotRunning(_)
        ));
    }

    #[tokio::test]
    async fn test_port_in_use_leaves_first_device_running() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(DeviceKind::Device, "first", config(0)).await.unwrap();

        let addr = mgr.start("first").await.unwrap();

        let mut second = config(addr.port());
        second.name = "second".to_string();
        mgr.create(DeviceKind::Device, "second", second).await.unwrap();

        let err = mgr.start("second").await.unwrap_err();
        assert!(matches!(err, SimSrvError::PortInUse(p) if p == addr.port()));

        assert!(mgr.is_running("first").await.unwrap());
        assert!(!mgr.is_running("second").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_running_device_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(DeviceKind::Device, "plc", config(0)).await.unwrap();
        mgr.start("plc").await.unwrap();

        let err = mgr.delete(DeviceKind::Device, "plc").await.unwrap_err();
        assert!(matches!(err, SimSrvError::DeviceRunning(_)));

        mgr.stop("plc").await.unwrap();
        mgr.delete(DeviceKind::Device, "plc").await.unwrap();
        assert!(matches!(
            mgr.get_config(DeviceKind::Device, "plc").await.unwrap_err(),
            SimSrvError::DeviceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_templates_never_start() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(DeviceKind::Template, "blueprint", config(0))
            .await
            .unwrap();

        let err = mgr.start("blueprint").await.unwrap_err();
        assert!(matches!(err, SimSrvError::TemplateNotStartable(_)));
    }

    #[tokio::test]
    async fn test_instantiate_template() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(DeviceKind::Template, "blueprint", config(0))
            .await
            .unwrap();

        mgr.instantiate_template("blueprint", "plc-7").await.unwrap();
        let cfg = mgr.get_config(DeviceKind::Device, "plc-7").await.unwrap();
        assert!(!cfg.template);
        mgr.start("plc-7").await.unwrap();
        mgr.stop("plc-7").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_requires_stopped_device() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        mgr.create(DeviceKind::Device, "plc", config(0)).await.unwrap();
        mgr.start("plc").await.unwrap();

        let err = mgr
            .update(DeviceKind::Device, "plc", config(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SimSrvError::DeviceRunning(_)));

        mgr.stop("plc").await.unwrap();
        let mut updated = config(0);
        updated.name = "renamed".to_string();
        mgr.update(DeviceKind::Device, "plc", updated).await.unwrap();
        assert_eq!(
            mgr.get_config(DeviceKind::Device, "plc").await.unwrap().name,
            "renamed"
        );
    }

    #[tokio::test]
    async fn test_load_all_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mgr = manager(dir.path());
            mgr.create(DeviceKind::Device, "good", config(0)).await.unwrap();
        }
        std::fs::write(dir.path().join("devices/broken.json"), "{oops").unwrap();

        let mgr = manager(dir.path());
        mgr.load_all().await.unwrap();
        assert_eq!(mgr.list(DeviceKind::Device).await.len(), 1);
        assert!(mgr.get_config(DeviceKind::Device, "good").await.is_ok());
    }
}
