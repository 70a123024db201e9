//! Configuration writes and the acquisition cycle.
//!
//! Both halves talk to the control plane through [`Endpoints`], which resolves
//! leaf names and bounds every put-with-completion by the acknowledgement
//! timeout.

pub mod config;
pub mod driver;

pub use config::{AcquisitionConfig, ConfigurationApplier};
pub use driver::AcquisitionDriver;

use crate::error::{CaseFailure, CycleError};
use crate::pv::{ControlPlane, Leaf, PvNames, PvValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Named access to the detector and plugin endpoints
#[derive(Clone)]
pub struct Endpoints {
    plane: Arc<dyn ControlPlane>,
    names: PvNames,
    ack_timeout: Duration,
}

impl Endpoints {
    /// Bind `names` on `plane`; every put-with-wait is bounded by `ack_timeout`
    pub fn new(plane: Arc<dyn ControlPlane>, names: PvNames, ack_timeout: Duration) -> Self {
        Self {
            plane,
            names,
            ack_timeout,
        }
    }

    /// Endpoint naming in use
    pub fn names(&self) -> &PvNames {
        &self.names
    }

    /// Bound applied to every acknowledged write
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Fire-and-forget write
    pub async fn put(&self, leaf: Leaf, value: PvValue) -> Result<(), CycleError> {
        let pv = self.names.name(leaf);
        trace!(%pv, %value, "put");
        self.plane.write(&pv, value, false).await?;
        Ok(())
    }

    /// Write and wait for the IOC to finish processing it.
    ///
    /// Expiry of the acknowledgement timeout is an `AckTimeout` case failure.
    pub async fn put_wait(&self, leaf: Leaf, value: PvValue) -> Result<(), CycleError> {
        let pv = self.names.name(leaf);
        trace!(%pv, %value, "put with completion");
        match tokio::time::timeout(self.ack_timeout, self.plane.write(&pv, value, true)).await {
            Ok(result) => result.map_err(CycleError::from),
            Err(_) => Err(CaseFailure::AckTimeout {
                pv: pv.to_string(),
                timeout: self.ack_timeout,
            }
            .into()),
        }
    }

    /// Read a leaf
    pub async fn get(&self, leaf: Leaf, count: Option<usize>) -> Result<PvValue, CycleError> {
        let pv = self.names.name(leaf);
        Ok(self.plane.read(&pv, count).await?)
    }

    /// Read a scalar leaf; an array is a protocol failure
    pub async fn get_int(&self, leaf: Leaf) -> Result<i32, CycleError> {
        let value = self.get(leaf, None).await?;
        value.as_int().ok_or_else(|| {
            CaseFailure::Protocol {
                pv: self.names.name(leaf).to_string(),
                reason: format!("expected a scalar, got {}", value.kind()),
            }
            .into()
        })
    }
}
