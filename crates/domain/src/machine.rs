use serde::{Deserialize, Serialize};

/// Number of ports a storage instance occupies.
pub const STORAGE_PORT_STRIDE: u16 = 3;

/// Number of ports a computer instance occupies.
pub const COMPUTE_PORT_STRIDE: u16 = 1;

/// Lowest ports instances of each class may be assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortFloors {
    pub storage: u16,
    pub compute: u16,
}

impl Default for PortFloors {
    fn default() -> Self {
        Self {
            storage: 57000,
            compute: 47000,
        }
    }
}

/// Instances already placed on a [`Machine`], as recorded in the metadata
/// store. Ports are `0` if there are no instances of the class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstanceUsage {
    pub storage_instances: u32,
    pub compute_instances: u32,
    pub max_storage_port: u16,
    pub max_compute_port: u16,
}

/// The next instance of a class doesn't fit in the port range of a
/// [`Machine`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("No free {class} ports on {hostaddr} above {recorded}")]
pub struct PortsExhaustedError {
    pub hostaddr: String,
    pub class: &'static str,
    pub recorded: u16,
}

/// Physical or virtual host instances are placed on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Machine {
    pub hostaddr: String,
    pub rack_id: Option<String>,
    pub total_mem: u64,
    pub total_cpu_cores: u32,

    pub storage_instances: u32,
    pub compute_instances: u32,

    /// Port the next storage instance placed on this machine should use.
    pub next_storage_port: u16,

    /// Port the next computer instance placed on this machine should use.
    pub next_compute_port: u16,
}

impl Machine {
    pub fn new(hostaddr: impl Into<String>) -> Self {
        Self {
            hostaddr: hostaddr.into(),
            ..Self::default()
        }
    }

    /// Total number of instances placed on this [`Machine`].
    pub fn instances(&self) -> u32 {
        self.storage_instances + self.compute_instances
    }

    /// Recomputes instance counts and next free ports from the recorded
    /// [`InstanceUsage`].
    ///
    /// The [`Machine`] is left untouched if either class ran out of ports.
    pub fn assign_ports(
        &mut self,
        usage: InstanceUsage,
        floors: PortFloors,
    ) -> Result<(), PortsExhaustedError> {
        let exhausted = |class, recorded| PortsExhaustedError {
            hostaddr: self.hostaddr.clone(),
            class,
            recorded,
        };

        let storage = next_port(usage.max_storage_port, floors.storage, STORAGE_PORT_STRIDE)
            .ok_or_else(|| exhausted("storage", usage.max_storage_port))?;
        let compute = next_port(usage.max_compute_port, floors.compute, COMPUTE_PORT_STRIDE)
            .ok_or_else(|| exhausted("compute", usage.max_compute_port))?;

        self.storage_instances = usage.storage_instances;
        self.compute_instances = usage.compute_instances;
        self.next_storage_port = storage;
        self.next_compute_port = compute;
        Ok(())
    }
}

/// Returns the port following `recorded`, or `floor` if `recorded` is below
/// it.
///
/// An instance occupies `stride` consecutive ports, so `None` is returned if
/// they don't all fit below [`u16::MAX`].
pub fn next_port(recorded: u16, floor: u16, stride: u16) -> Option<u16> {
    let next = if recorded < floor {
        floor
    } else {
        recorded.checked_add(stride)?
    };

    next.checked_add(stride.saturating_sub(1))?;
    Some(next)
}
