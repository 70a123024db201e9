//! One acquisition cycle: arm, inject, wait, read back.

use super::{AcquisitionConfig, Endpoints};
use crate::config::ArmStrategy;
use crate::error::{CaseFailure, CycleError};
use crate::frame::{ElementBuffer, Frame};
use crate::params::{AcquireState, ArrayMode, DetectorState};
use crate::pv::{Leaf, PvValue};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Drives the detector through one acquisition per call to [`run`](Self::run)
pub struct AcquisitionDriver {
    endpoints: Endpoints,
    arm: ArmStrategy,
}

impl AcquisitionDriver {
    /// Driver that waits for arming according to `arm`
    pub fn new(endpoints: Endpoints, arm: ArmStrategy) -> Self {
        Self { endpoints, arm }
    }

    /// Inject `frame` and return what the plugin publishes.
    ///
    /// `config` must already be active on the IOC. The returned frame has the
    /// geometry of `frame`; a read-back of the wrong length is a shape failure.
    ///
    /// # Errors
    ///
    /// - `CycleError::Fatal` if an endpoint is unreachable
    /// - `CycleError::Case` for arm or acknowledgement timeouts, rejected writes
    ///   and shape mismatches
    pub async fn run(&self, config: &AcquisitionConfig, frame: &Frame) -> Result<Frame, CycleError> {
        // A completion on Acquire would not arrive until the acquisition ends.
        self.endpoints
            .put(Leaf::Acquire, PvValue::Int(AcquireState::Acquire.code()))
            .await?;
        self.wait_armed().await?;

        match config.array_mode {
            ArrayMode::Overwrite => {
                self.endpoints
                    .put_wait(Leaf::ArrayIn, PvValue::Array(frame.data().clone()))
                    .await?;
            }
            ArrayMode::Append => self.inject_chunked(frame.data(), config.num_elements).await?,
        }

        let count = frame.shape().element_count();
        let value = self.endpoints.get(Leaf::ArrayData, Some(count)).await?;
        let data = match value {
            PvValue::Array(data) => data,
            PvValue::Int(_) => {
                return Err(CaseFailure::Protocol {
                    pv: self.endpoints.names().name(Leaf::ArrayData).to_string(),
                    reason: "expected an array, got a scalar".to_string(),
                }
                .into())
            }
        };
        trace!(elements = data.len(), data_type = %data.data_type(), "read back");

        Ok(Frame::reshape(frame.shape(), data)?)
    }

    /// Leave acquire mode; used after multiple and continuous scenarios
    pub async fn stop(&self) -> Result<(), CycleError> {
        self.endpoints
            .put_wait(Leaf::Acquire, PvValue::Int(AcquireState::Idle.code()))
            .await
    }

    async fn wait_armed(&self) -> Result<(), CycleError> {
        match self.arm {
            ArmStrategy::FixedDelay { delay } => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            ArmStrategy::Poll { interval, timeout } => {
                let deadline = Instant::now() + timeout;
                loop {
                    let code = self.endpoints.get_int(Leaf::DetectorState).await?;
                    match DetectorState::from_code(code) {
                        Some(DetectorState::Idle) => {}
                        Some(state) => {
                            debug!(%state, "detector armed");
                            return Ok(());
                        }
                        None => {
                            return Err(CaseFailure::Protocol {
                                pv: self.endpoints.names().name(Leaf::DetectorState).to_string(),
                                reason: format!("unknown detector state code {code}"),
                            }
                            .into())
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(CaseFailure::ArmTimeout { timeout }.into());
                    }
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    async fn inject_chunked(&self, data: &ElementBuffer, chunk: i32) -> Result<(), CycleError> {
        let len = data.len();
        let chunk = usize::try_from(chunk).ok().filter(|n| *n > 0).unwrap_or(len).max(1);

        self.endpoints.put_wait(Leaf::NewArray, PvValue::Int(1)).await?;
        let mut start = 0;
        while start < len {
            let n = chunk.min(len - start);
            self.endpoints
                .put_wait(Leaf::ArrayIn, PvValue::Array(data.slice(start, n)))
                .await?;
            start += n;
        }
        self.endpoints
            .put_wait(Leaf::ArrayComplete, PvValue::Int(1))
            .await?;
        debug!(elements = len, chunk, "appended array completed");
        Ok(())
    }
}
