//! Process-wide table of running buses, keyed by peripheral.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;

use log::debug;

use crate::bus::LcdBus;
use crate::sync::lock;
use crate::Error;
use crate::Result;

/// Room for every display peripheral a chip can drive at once.
pub const MAX_BUSES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusKind {
    Spi,
    I2c,
    I80,
    Rgb,
    Led,
}

/// A bus type plus the index of its hardware peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusId {
    pub kind: BusKind,
    pub index: u8,
}

impl BusId {
    pub const fn new(kind: BusKind, index: u8) -> Self {
        Self { kind, index }
    }
}

#[derive(Default)]
pub struct BusRegistry {
    buses: Mutex<heapless::Vec<(BusId, Arc<LcdBus>), MAX_BUSES>>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static BusRegistry {
        static REGISTRY: OnceLock<BusRegistry> = OnceLock::new();
        REGISTRY.get_or_init(BusRegistry::new)
    }

    /// # Errors
    ///
    /// `InvalidState` if `id` is taken, `OutOfMemory` if the table is full.
    pub fn insert(&self, id: BusId, bus: Arc<LcdBus>) -> Result<()> {
        let mut buses = lock(&self.buses);
        if buses.iter().any(|(taken, _)| *taken == id) {
            return Err(Error::InvalidState);
        }
        buses.push((id, bus)).map_err(|_| Error::OutOfMemory)?;
        debug!("registered {id:?}");
        Ok(())
    }

    pub fn get(&self, id: BusId) -> Option<Arc<LcdBus>> {
        lock(&self.buses)
            .iter()
            .find(|(taken, _)| *taken == id)
            .map(|(_, bus)| Arc::clone(bus))
    }

    /// Takes `id` out of the table. The bus itself stops once its last
    /// handle is dropped.
    pub fn remove(&self, id: BusId) -> Option<Arc<LcdBus>> {
        let mut buses = lock(&self.buses);
        let position = buses.iter().position(|(taken, _)| *taken == id)?;
        let (_, bus) = buses.swap_remove(position);
        debug!("unregistered {id:?}");
        Some(bus)
    }

    pub fn ids(&self) -> heapless::Vec<BusId, MAX_BUSES> {
        lock(&self.buses).iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.buses).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.buses).is_empty()
    }
}
