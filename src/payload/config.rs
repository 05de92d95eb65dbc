//! Result shaping limits.

use super::types::ObjectClass;
use serde::{Deserialize, Serialize};

/// Per-class object quotas. Keys other than the four classes are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassQuotas {
    pub vehicle: usize,
    pub human: usize,
    pub parking_area: usize,
    pub ambulance_area: usize,
}

impl Default for ClassQuotas {
    fn default() -> Self {
        Self {
            vehicle: 40,
            human: 40,
            parking_area: 10,
            ambulance_area: 10,
        }
    }
}

impl ClassQuotas {
    pub fn for_class(&self, class: ObjectClass) -> usize {
        match class {
            ObjectClass::Vehicle => self.vehicle,
            ObjectClass::Human => self.human,
            ObjectClass::ParkingArea => self.parking_area,
            ObjectClass::AmbulanceArea => self.ambulance_area,
        }
    }
}

/// Limits applied to every outgoing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Global maximum of detected objects per payload
    pub max_objects: usize,
    pub class_quota: ClassQuotas,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_objects: 100,
            class_quota: ClassQuotas::default(),
        }
    }
}
