use std::path::PathBuf;
use std::sync::Arc;

use hwi_app::Backend;
use hwi_common::bitcoin::{Network, NetworkKind};
use hwi_common::{DeviceDescriptor, DeviceType, Error};
use hwi_ledger::{Ledger, Transport};
use hwi_signer::{AnyDevice, Coldcard, DigitalBitBox, Trezor};

use crate::{
    SimulatedBitBox, SimulatedColdcard, SimulatedLedger, SimulatedTrezor, Stats, TestSeed,
};

/// A simulated device of any vendor
#[derive(Clone)]
pub enum Simulated {
    Ledger(SimulatedLedger),
    Trezor(SimulatedTrezor),
    DigitalBitBox(SimulatedBitBox),
    KeepKey(SimulatedTrezor),
    Coldcard(SimulatedColdcard),

    /// Listed by the probe, but opening it fails
    Unreachable(DeviceType),
}

impl Simulated {
    fn device_type(&self) -> DeviceType {
        match self {
            Simulated::Ledger(_) => DeviceType::LedgerNanoS,
            Simulated::Trezor(_) => DeviceType::TrezorOne,
            Simulated::DigitalBitBox(_) => DeviceType::DigitalBitBox,
            Simulated::KeepKey(_) => DeviceType::KeepKey,
            Simulated::Coldcard(_) => DeviceType::Coldcard,
            Simulated::Unreachable(device_type) => *device_type,
        }
    }
}

struct Entry {
    descriptor: DeviceDescriptor,
    simulated: Simulated,
    stats: Arc<Stats>,
}

/// A [`Backend`] listing and opening simulated devices
pub struct SimulatedBackend {
    network: NetworkKind,
    entries: Vec<Entry>,
    failing_probes: Vec<DeviceType>,
    backup_dir: PathBuf,
}

impl SimulatedBackend {
    pub fn new(network: NetworkKind) -> Self {
        Self {
            network,
            entries: vec![],
            failing_probes: vec![],
            backup_dir: std::env::temp_dir(),
        }
    }

    fn address_network(&self) -> Network {
        match self.network {
            NetworkKind::Main => Network::Bitcoin,
            NetworkKind::Test => Network::Testnet,
        }
    }

    /// Add a device of the given type at `path`, holding the test seed
    pub fn with_device(self, device_type: DeviceType, path: &str) -> Self {
        self.with_seeded_device(device_type, path, TestSeed::default())
    }

    pub fn with_seeded_device(self, device_type: DeviceType, path: &str, seed: TestSeed) -> Self {
        let stats = Arc::new(Stats::default());
        let network = self.address_network();
        let simulated = match device_type {
            DeviceType::LedgerNanoS => {
                Simulated::Ledger(SimulatedLedger::new(seed, network, stats.clone()))
            }
            DeviceType::TrezorOne => Simulated::Trezor(SimulatedTrezor::new(seed, stats.clone())),
            DeviceType::DigitalBitBox => {
                Simulated::DigitalBitBox(SimulatedBitBox::new(seed, stats.clone()))
            }
            DeviceType::KeepKey => {
                Simulated::KeepKey(SimulatedTrezor::keepkey(seed, stats.clone()))
            }
            DeviceType::Coldcard => {
                Simulated::Coldcard(SimulatedColdcard::new(seed, network, stats.clone()))
            }
        };
        self.with_simulated(path, simulated, stats)
    }

    /// Add a device built by the caller, `stats` must be the ones the device updates
    pub fn with_simulated(mut self, path: &str, simulated: Simulated, stats: Arc<Stats>) -> Self {
        self.entries.push(Entry {
            descriptor: DeviceDescriptor::new(simulated.device_type(), path),
            simulated,
            stats,
        });
        self
    }

    /// Probing the given device type fails
    pub fn with_failing_probe(mut self, device_type: DeviceType) -> Self {
        self.failing_probes.push(device_type);
        self
    }

    pub fn with_backup_dir(mut self, backup_dir: PathBuf) -> Self {
        self.backup_dir = backup_dir;
        self
    }

    fn entry(&self, path: &str) -> &Entry {
        self.entries
            .iter()
            .find(|e| e.descriptor.path == path)
            .expect("simulated device")
    }

    /// The counters of the device at `path`
    pub fn stats(&self, path: &str) -> Arc<Stats> {
        self.entry(path).stats.clone()
    }

    /// The device at `path`, sharing state with the one opened by the backend
    pub fn simulated(&self, path: &str) -> Simulated {
        self.entry(path).simulated.clone()
    }

    pub fn total_opened(&self) -> usize {
        self.entries.iter().map(|e| e.stats.opened()).sum()
    }

    pub fn total_calls(&self) -> usize {
        self.entries.iter().map(|e| e.stats.calls()).sum()
    }

    pub fn total_closed(&self) -> usize {
        self.entries.iter().map(|e| e.stats.closed()).sum()
    }
}

impl Backend for SimulatedBackend {
    fn probe(&self, device_type: DeviceType) -> Result<Vec<DeviceDescriptor>, Error> {
        if self.failing_probes.contains(&device_type) {
            return Err(Error::Connection(format!("simulated failure probing {device_type}")));
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| e.descriptor.device_type == device_type)
            .map(|e| e.descriptor.clone())
            .collect())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<AnyDevice, Error> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor == *descriptor)
            .ok_or_else(|| Error::Connection(format!("cannot open {}", descriptor.path)))?;

        let device = match &entry.simulated {
            Simulated::Ledger(s) => {
                let transport: Box<dyn Transport> = Box::new(s.clone());
                AnyDevice::Ledger(Ledger::new(transport, self.network))
            }
            Simulated::Trezor(s) => {
                AnyDevice::Trezor(Trezor::new(Box::new(s.clone()), self.network, ""))
            }
            Simulated::DigitalBitBox(s) => {
                AnyDevice::DigitalBitBox(DigitalBitBox::new(Box::new(s.clone()), self.network))
            }
            Simulated::KeepKey(s) => {
                AnyDevice::KeepKey(Trezor::keepkey(Box::new(s.clone()), self.network, ""))
            }
            Simulated::Coldcard(s) => AnyDevice::Coldcard(Coldcard::new(
                Box::new(s.clone()),
                self.network,
                self.backup_dir.clone(),
            )),
            Simulated::Unreachable(_) => {
                return Err(Error::Connection(format!(
                    "simulated failure opening {}",
                    descriptor.path
                )))
            }
        };
        entry.stats.open();
        Ok(device)
    }
}
