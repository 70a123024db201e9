//! In-process simulated detector and image plugin.
//!
//! Models a standard-arrays software detector feeding an image plugin, close
//! enough to the real IOC that the harness exercises the same sequencing:
//!
//! - Writes are queued to a background task and processed strictly in order.
//! - `Acquire=1` arms the detector after `arm_latency`; until then
//!   `DetectorState_RBV` reads idle and `ArrayIn` writes are silently dropped.
//! - A completed array is published to the plugin's `ArrayData` after
//!   `plugin_latency`, and only then is a put-with-completion acknowledged.
//! - Faults can be injected per data type to check that one broken case does
//!   not leak into the others.

use super::{ControlPlane, Leaf, PvName, PvNames, PvValue};
use crate::config::SimulatorConfig;
use crate::error::TransportError;
use crate::frame::ElementBuffer;
use crate::params::{
    AcquireState, ArrayMode, CallbackState, ColorMode, DataType, DetectorState, ImageMode,
    TriggerMode,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Misbehaviour to inject into the simulated IOC
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Publish only the first `keep` elements while `data_type` is configured
    TruncateReadback {
        /// Affected type
        data_type: DataType,
        /// Elements left in the published array
        keep: usize,
    },
    /// Publish a wrong value at `index` while `data_type` is configured
    CorruptElement {
        /// Affected type
        data_type: DataType,
        /// Flat index of the corrupted element
        index: usize,
    },
    /// Never acknowledge array writes while `data_type` is configured
    WithholdCompletion {
        /// Affected type
        data_type: DataType,
    },
    /// Reject every write to `leaf`
    RejectWrites {
        /// Affected endpoint
        leaf: Leaf,
    },
    /// Make `leaf` unreachable for reads and writes
    Disconnect {
        /// Affected endpoint
        leaf: Leaf,
    },
}

/// One call made against the simulated IOC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// A write, with or without completion
    Write {
        /// Endpoint written
        leaf: Leaf,
        /// Whether completion was requested
        wait: bool,
    },
    /// A read
    Read {
        /// Endpoint read
        leaf: Leaf,
    },
}

/// Parameter values visible to clients
#[derive(Debug, Clone, PartialEq)]
pub struct ObservableState {
    /// `NDimensions`
    pub ndimensions: i32,
    /// `Dimensions`, fastest-varying first
    pub dimensions: Vec<i32>,
    /// `DataType`
    pub data_type: DataType,
    /// `ColorMode`
    pub color_mode: ColorMode,
    /// `NumImages`
    pub num_images: i32,
    /// `ArrayMode`
    pub array_mode: ArrayMode,
    /// `NumElements`
    pub num_elements: i32,
    /// `ImageMode`
    pub image_mode: ImageMode,
    /// `TriggerMode`
    pub trigger_mode: TriggerMode,
    /// Detector `ArrayCallbacks`
    pub array_callbacks: CallbackState,
    /// Plugin `EnableCallbacks`
    pub plugin_callbacks: CallbackState,
    /// `Acquire` is set
    pub acquiring: bool,
    /// Arrays completed since the last `Acquire=1`
    pub images_counter: i32,
    /// Arrays published to the plugin since startup
    pub arrays_published: u64,
}

impl Default for ObservableState {
    fn default() -> Self {
        Self {
            ndimensions: 2,
            dimensions: vec![0, 0],
            data_type: DataType::UInt8,
            color_mode: ColorMode::Mono,
            num_images: 100,
            array_mode: ArrayMode::Overwrite,
            num_elements: 0,
            image_mode: ImageMode::Single,
            trigger_mode: TriggerMode::Internal,
            array_callbacks: CallbackState::Enable,
            plugin_callbacks: CallbackState::Disable,
            acquiring: false,
            images_counter: 0,
            arrays_published: 0,
        }
    }
}

struct IocState {
    params: ObservableState,
    arm_latency: Duration,
    armed_at: Option<Instant>,
    raw: Option<ElementBuffer>,
    next_element: usize,
    new_array: bool,
    plugin_array: ElementBuffer,
}

impl IocState {
    fn new(arm_latency: Duration) -> Self {
        Self {
            params: ObservableState::default(),
            arm_latency,
            armed_at: None,
            raw: None,
            next_element: 0,
            new_array: true,
            plugin_array: ElementBuffer::UInt8(Vec::new()),
        }
    }

    fn is_armed(&self, now: Instant) -> bool {
        self.params.acquiring && self.armed_at.map_or(false, |t| now >= t)
    }

    fn detector_state(&self) -> DetectorState {
        if self.is_armed(Instant::now()) {
            DetectorState::Acquire
        } else {
            DetectorState::Idle
        }
    }

    fn allocated_elements(&self) -> usize {
        let ndims = usize::try_from(self.params.ndimensions).unwrap_or(0);
        if ndims == 0 {
            return 0;
        }
        self.params
            .dimensions
            .iter()
            .take(ndims)
            .map(|&d| usize::try_from(d).unwrap_or(0))
            .product()
    }

    fn write_scalar(&mut self, leaf: Leaf, value: i32) {
        let p = &mut self.params;
        match leaf {
            Leaf::Acquire => {
                if value != 0 {
                    p.images_counter = 0;
                    if !p.acquiring {
                        p.acquiring = true;
                        self.armed_at = Some(Instant::now() + self.arm_latency);
                    }
                } else {
                    p.acquiring = false;
                    self.armed_at = None;
                }
            }
            Leaf::NDimensions => p.ndimensions = value,
            Leaf::NumImages => p.num_images = value,
            Leaf::NumElements => p.num_elements = value,
            Leaf::DataType => {
                if let Some(v) = DataType::from_code(value) {
                    p.data_type = v;
                }
            }
            Leaf::ColorMode => {
                if let Some(v) = ColorMode::from_code(value) {
                    p.color_mode = v;
                }
            }
            Leaf::ArrayMode => {
                if let Some(v) = ArrayMode::from_code(value) {
                    p.array_mode = v;
                }
            }
            Leaf::ImageMode => {
                if let Some(v) = ImageMode::from_code(value) {
                    p.image_mode = v;
                }
            }
            Leaf::TriggerMode => {
                if let Some(v) = TriggerMode::from_code(value) {
                    p.trigger_mode = v;
                }
            }
            Leaf::ArrayCallbacks => {
                if let Some(v) = CallbackState::from_code(value) {
                    p.array_callbacks = v;
                }
            }
            Leaf::EnableCallbacks => {
                if let Some(v) = CallbackState::from_code(value) {
                    p.plugin_callbacks = v;
                }
            }
            Leaf::NewArray => {
                if value != 0 {
                    self.new_array = true;
                    self.next_element = 0;
                }
            }
            _ => {}
        }
    }

    /// Copy injected elements into the raw array. Returns the array to publish, if
    /// the write completed one.
    fn write_array(&mut self, buf: &ElementBuffer) -> Option<ElementBuffer> {
        if !self.is_armed(Instant::now()) {
            debug!(elements = buf.len(), "ArrayIn ignored, detector not armed");
            return None;
        }

        let overwrite = self.params.array_mode == ArrayMode::Overwrite;
        if overwrite || self.new_array || self.raw.is_none() {
            self.raw = Some(ElementBuffer::zeros(
                self.params.data_type,
                self.allocated_elements(),
            ));
            self.new_array = false;
            self.next_element = 0;
        }

        let copied = match self.raw.as_mut() {
            Some(raw) => raw.write_at(self.next_element, buf),
            None => 0,
        };
        self.next_element += copied;
        trace!(copied, next_element = self.next_element, "ArrayIn copied");

        if overwrite {
            self.complete_array()
        } else {
            None
        }
    }

    fn complete_array(&mut self) -> Option<ElementBuffer> {
        let p = &mut self.params;
        p.images_counter += 1;

        let done = match p.image_mode {
            ImageMode::Single => true,
            ImageMode::Multiple => p.images_counter >= p.num_images,
            ImageMode::Continuous => false,
        };
        if done {
            p.acquiring = false;
            self.armed_at = None;
        }

        if p.array_callbacks.is_enabled() && p.plugin_callbacks.is_enabled() {
            self.raw.clone()
        } else {
            None
        }
    }

    fn read(&self, leaf: Leaf, count: Option<usize>) -> PvValue {
        let p = &self.params;
        match leaf {
            Leaf::Acquire => PvValue::Int(if p.acquiring {
                AcquireState::Acquire.code()
            } else {
                AcquireState::Idle.code()
            }),
            Leaf::DetectorState => PvValue::Int(self.detector_state().code()),
            Leaf::ArrayData => PvValue::Array(
                self.plugin_array
                    .truncated(count.unwrap_or(self.plugin_array.len())),
            ),
            Leaf::ArrayIn => {
                let raw = self
                    .raw
                    .clone()
                    .unwrap_or_else(|| ElementBuffer::zeros(p.data_type, 0));
                PvValue::Array(raw.truncated(count.unwrap_or(raw.len())))
            }
            Leaf::Dimensions => PvValue::Array(ElementBuffer::Int32(p.dimensions.clone())),
            Leaf::NDimensions => PvValue::Int(p.ndimensions),
            Leaf::DataType => PvValue::Int(p.data_type.code()),
            Leaf::ColorMode => PvValue::Int(p.color_mode.code()),
            Leaf::NumImages => PvValue::Int(p.num_images),
            Leaf::ArrayMode => PvValue::Int(p.array_mode.code()),
            Leaf::NumElements => PvValue::Int(p.num_elements),
            Leaf::ImageMode => PvValue::Int(p.image_mode.code()),
            Leaf::TriggerMode => PvValue::Int(p.trigger_mode.code()),
            Leaf::ArrayCallbacks => PvValue::Int(p.array_callbacks.code()),
            Leaf::EnableCallbacks => PvValue::Int(p.plugin_callbacks.code()),
            Leaf::NewArray | Leaf::ArrayComplete => PvValue::Int(0),
        }
    }
}

/// Check a write before it is queued; returns the rejection reason.
fn validate(leaf: Leaf, value: &PvValue) -> Result<(), String> {
    let code_ok = |ok: bool, code: i32| {
        if ok {
            Ok(())
        } else {
            Err(format!("invalid {leaf} code {code}"))
        }
    };
    match (leaf, value) {
        (Leaf::DetectorState | Leaf::ArrayData, _) => Err(format!("{leaf} is read-only")),
        (Leaf::ArrayIn, PvValue::Array(_)) => Ok(()),
        (Leaf::Dimensions, PvValue::Array(buf)) => {
            if buf.iter_f64().all(|d| d >= 0.0 && d <= i32::MAX as f64) {
                Ok(())
            } else {
                Err("negative or oversized dimension".to_string())
            }
        }
        (Leaf::ArrayIn | Leaf::Dimensions, PvValue::Int(_)) => {
            Err(format!("{leaf} expects an array"))
        }
        (_, PvValue::Array(_)) => Err(format!("{leaf} expects a scalar")),
        (Leaf::DataType, PvValue::Int(c)) => code_ok(DataType::from_code(*c).is_some(), *c),
        (Leaf::ColorMode, PvValue::Int(c)) => code_ok(ColorMode::from_code(*c).is_some(), *c),
        (Leaf::ArrayMode, PvValue::Int(c)) => code_ok(ArrayMode::from_code(*c).is_some(), *c),
        (Leaf::ImageMode, PvValue::Int(c)) => code_ok(ImageMode::from_code(*c).is_some(), *c),
        (Leaf::TriggerMode, PvValue::Int(c)) => code_ok(TriggerMode::from_code(*c).is_some(), *c),
        (Leaf::ArrayCallbacks | Leaf::EnableCallbacks, PvValue::Int(c)) => {
            code_ok(CallbackState::from_code(*c).is_some(), *c)
        }
        (Leaf::NDimensions, PvValue::Int(c)) => code_ok((0..=10).contains(c), *c),
        (Leaf::NumImages | Leaf::NumElements, PvValue::Int(c)) => code_ok(*c >= 0, *c),
        (_, PvValue::Int(_)) => Ok(()),
    }
}

enum Request {
    Write {
        leaf: Leaf,
        value: PvValue,
        done: Option<oneshot::Sender<()>>,
    },
    Barrier(oneshot::Sender<()>),
    ReleaseWithheld,
}

enum Completion {
    Done,
    Withheld,
}

struct Worker {
    state: Arc<Mutex<IocState>>,
    faults: Arc<Mutex<Vec<Fault>>>,
    plugin_latency: Duration,
    // Acknowledgements held back by `WithholdCompletion`; kept alive so the
    // waiting client never sees the channel close. Released on `clear_faults`.
    withheld: Vec<oneshot::Sender<()>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(request) = rx.recv().await {
            match request {
                Request::Barrier(tx) => {
                    let _ = tx.send(());
                }
                Request::ReleaseWithheld => {
                    debug!(count = self.withheld.len(), "releasing withheld completions");
                    for done in self.withheld.drain(..) {
                        let _ = done.send(());
                    }
                }
                Request::Write { leaf, value, done } => {
                    let completion = self.process(leaf, value).await;
                    if let Some(done) = done {
                        match completion {
                            Completion::Done => {
                                let _ = done.send(());
                            }
                            Completion::Withheld => {
                                debug!(%leaf, "completion withheld");
                                // Clients that already timed out dropped their receiver.
                                self.withheld.retain(|held| !held.is_closed());
                                self.withheld.push(done);
                            }
                        }
                    }
                }
            }
        }
    }

    async fn process(&mut self, leaf: Leaf, value: PvValue) -> Completion {
        let (published, data_type) = {
            let mut state = self.state.lock().await;
            let published = match (leaf, value) {
                (Leaf::ArrayIn, PvValue::Array(buf)) => state.write_array(&buf),
                (Leaf::ArrayComplete, PvValue::Int(v)) => {
                    if v != 0 && state.params.array_mode == ArrayMode::Append {
                        state.complete_array()
                    } else {
                        None
                    }
                }
                (Leaf::Dimensions, PvValue::Array(buf)) => {
                    state.params.dimensions = buf.iter_f64().map(|d| d as i32).collect();
                    None
                }
                (leaf, PvValue::Int(v)) => {
                    state.write_scalar(leaf, v);
                    None
                }
                _ => None,
            };
            (published, state.params.data_type)
        };

        if let Some(array) = published {
            self.publish(array, data_type).await;
        }

        let array_write = matches!(leaf, Leaf::ArrayIn | Leaf::ArrayComplete);
        let withhold = array_write
            && self.faults.lock().await.iter().any(|f| {
                matches!(f, Fault::WithholdCompletion { data_type: dt } if *dt == data_type)
            });
        if withhold {
            Completion::Withheld
        } else {
            Completion::Done
        }
    }

    async fn publish(&self, mut array: ElementBuffer, data_type: DataType) {
        if !self.plugin_latency.is_zero() {
            tokio::time::sleep(self.plugin_latency).await;
        }

        for fault in self.faults.lock().await.iter() {
            match fault {
                Fault::TruncateReadback { data_type: dt, keep } if *dt == data_type => {
                    array = array.truncated(*keep);
                }
                Fault::CorruptElement { data_type: dt, index } if *dt == data_type => {
                    array.perturb(*index);
                }
                _ => {}
            }
        }

        let mut state = self.state.lock().await;
        trace!(elements = array.len(), %data_type, "plugin published array");
        state.plugin_array = array;
        state.params.arrays_published += 1;
    }
}

/// Simulated IOC reachable through [`ControlPlane`]
///
/// # Example
///
/// ```no_run
/// use ad_roundtrip::config::SimulatorConfig;
/// use ad_roundtrip::pv::{ControlPlane, Leaf, PvNames, PvValue, SimulatedIoc};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let names = PvNames::default();
/// let ioc = SimulatedIoc::spawn(names.clone(), &SimulatorConfig::default());
/// ioc.write(&names.name(Leaf::Acquire), PvValue::Int(1), false).await?;
/// # Ok(())
/// # }
/// ```
pub struct SimulatedIoc {
    names: PvNames,
    leaves: HashMap<PvName, Leaf>,
    state: Arc<Mutex<IocState>>,
    faults: Arc<Mutex<Vec<Fault>>>,
    call_log: Arc<Mutex<Vec<Call>>>,
    requests: mpsc::Sender<Request>,
    worker: JoinHandle<()>,
}

impl SimulatedIoc {
    /// Start the IOC worker on the current tokio runtime
    pub fn spawn(names: PvNames, settings: &SimulatorConfig) -> Self {
        let leaves = Leaf::ALL
            .iter()
            .map(|&leaf| (names.name(leaf), leaf))
            .collect();
        let state = Arc::new(Mutex::new(IocState::new(settings.arm_latency)));
        let faults = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));

        let worker = Worker {
            state: state.clone(),
            faults: faults.clone(),
            plugin_latency: settings.plugin_latency,
            withheld: Vec::new(),
        };
        let worker = tokio::spawn(worker.run(rx));
        debug!(prefix = %names.prefix, "simulated IOC started");

        Self {
            names,
            leaves,
            state,
            faults,
            call_log: Arc::new(Mutex::new(Vec::new())),
            requests: tx,
            worker,
        }
    }

    /// Names this IOC answers to
    pub fn names(&self) -> &PvNames {
        &self.names
    }

    /// Add a fault; it stays active until [`clear_faults`](Self::clear_faults)
    pub async fn inject(&self, fault: Fault) {
        self.faults.lock().await.push(fault);
    }

    /// Remove every injected fault and acknowledge any withheld completions
    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
        let _ = self.requests.send(Request::ReleaseWithheld).await;
    }

    /// Calls made so far, in order
    pub async fn call_log(&self) -> Vec<Call> {
        self.call_log.lock().await.clone()
    }

    /// Leaves written so far, in order
    pub async fn written_leaves(&self) -> Vec<Leaf> {
        self.call_log
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::Write { leaf, .. } => Some(*leaf),
                Call::Read { .. } => None,
            })
            .collect()
    }

    /// Clear the call log
    pub async fn clear_log(&self) {
        self.call_log.lock().await.clear();
    }

    /// Current parameter values
    pub async fn snapshot(&self) -> ObservableState {
        self.state.lock().await.params.clone()
    }

    /// Wait until every write queued so far has been processed.
    ///
    /// Withheld completions do not block the barrier; only processing does.
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Barrier(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    fn resolve(&self, pv: &PvName) -> Result<Leaf, TransportError> {
        self.leaves
            .get(pv)
            .copied()
            .ok_or_else(|| TransportError::Unreachable {
                pv: pv.to_string(),
                reason: "no such channel".to_string(),
            })
    }

    async fn check_faults(&self, pv: &PvName, leaf: Leaf, writing: bool) -> Result<(), TransportError> {
        for fault in self.faults.lock().await.iter() {
            match fault {
                Fault::Disconnect { leaf: l } if *l == leaf => {
                    return Err(TransportError::Unreachable {
                        pv: pv.to_string(),
                        reason: "channel disconnected".to_string(),
                    });
                }
                Fault::RejectWrites { leaf: l } if writing && *l == leaf => {
                    return Err(TransportError::Rejected {
                        pv: pv.to_string(),
                        reason: "write refused by device support".to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn enqueue(&self, pv: &PvName, request: Request) -> Result<(), TransportError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| TransportError::Unreachable {
                pv: pv.to_string(),
                reason: "IOC worker stopped".to_string(),
            })
    }
}

impl Drop for SimulatedIoc {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait]
impl ControlPlane for SimulatedIoc {
    async fn write(&self, pv: &PvName, value: PvValue, wait: bool) -> Result<(), TransportError> {
        let leaf = self.resolve(pv)?;
        self.call_log.lock().await.push(Call::Write { leaf, wait });
        self.check_faults(pv, leaf, true).await?;
        validate(leaf, &value).map_err(|reason| TransportError::Rejected {
            pv: pv.to_string(),
            reason,
        })?;
        trace!(%pv, %value, wait, "write");

        if !wait {
            return self
                .enqueue(pv, Request::Write { leaf, value, done: None })
                .await;
        }

        let (tx, rx) = oneshot::channel();
        self.enqueue(pv, Request::Write { leaf, value, done: Some(tx) })
            .await?;
        rx.await.map_err(|_| TransportError::Unreachable {
            pv: pv.to_string(),
            reason: "IOC worker stopped before completion".to_string(),
        })
    }

    async fn read(&self, pv: &PvName, count: Option<usize>) -> Result<PvValue, TransportError> {
        let leaf = self.resolve(pv)?;
        self.call_log.lock().await.push(Call::Read { leaf });
        self.check_faults(pv, leaf, false).await?;
        let value = self.state.lock().await.read(leaf, count);
        trace!(%pv, %value, "read");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SimulatorConfig {
        SimulatorConfig {
            arm_latency: Duration::from_millis(5),
            plugin_latency: Duration::from_millis(1),
            queue_capacity: 16,
        }
    }

    async fn configure(ioc: &SimulatedIoc, width: i32, height: i32) {
        let n = ioc.names().clone();
        ioc.write(&n.name(Leaf::NDimensions), PvValue::Int(2), false).await.unwrap();
        ioc.write(
            &n.name(Leaf::Dimensions),
            PvValue::Array(ElementBuffer::Int32(vec![width, height])),
            false,
        )
        .await
        .unwrap();
        ioc.write(&n.name(Leaf::EnableCallbacks), PvValue::Int(1), true).await.unwrap();
    }

    async fn arm(ioc: &SimulatedIoc) {
        let n = ioc.names().clone();
        ioc.write(&n.name(Leaf::Acquire), PvValue::Int(1), false).await.unwrap();
        ioc.settle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_unknown_channel_is_unreachable() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        let err = ioc.read(&PvName::new("OTHER:cam1:Acquire"), None).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_code_is_rejected() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        let pv = ioc.names().name(Leaf::DataType);
        let err = ioc.write(&pv, PvValue::Int(12), false).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));
        let err = ioc
            .write(&ioc.names().name(Leaf::DetectorState), PvValue::Int(1), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn test_detector_state_follows_arm_latency() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        let state_pv = ioc.names().name(Leaf::DetectorState);
        assert_eq!(ioc.read(&state_pv, None).await.unwrap(), PvValue::Int(0));
        arm(&ioc).await;
        assert_eq!(ioc.read(&state_pv, None).await.unwrap(), PvValue::Int(1));
    }

    #[tokio::test]
    async fn test_array_round_trip_with_completion() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        let n = ioc.names().clone();
        configure(&ioc, 3, 2).await;
        arm(&ioc).await;

        let payload = ElementBuffer::UInt8(vec![1, 2, 3, 4, 5, 6]);
        ioc.write(&n.name(Leaf::ArrayIn), PvValue::Array(payload.clone()), true)
            .await
            .unwrap();
        let back = ioc.read(&n.name(Leaf::ArrayData), Some(6)).await.unwrap();
        assert_eq!(back, PvValue::Array(payload));

        let snap = ioc.snapshot().await;
        assert!(!snap.acquiring, "single mode returns to idle");
        assert_eq!(snap.arrays_published, 1);
    }

    #[tokio::test]
    async fn test_array_write_while_idle_is_ignored() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        let n = ioc.names().clone();
        configure(&ioc, 2, 1).await;
        ioc.write(
            &n.name(Leaf::ArrayIn),
            PvValue::Array(ElementBuffer::UInt8(vec![7, 7])),
            true,
        )
        .await
        .unwrap();
        assert_eq!(ioc.snapshot().await.arrays_published, 0);
    }

    #[tokio::test]
    async fn test_disconnect_fault() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        ioc.inject(Fault::Disconnect { leaf: Leaf::Acquire }).await;
        let err = ioc
            .write(&ioc.names().name(Leaf::Acquire), PvValue::Int(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
        ioc.clear_faults().await;
        assert!(ioc
            .write(&ioc.names().name(Leaf::Acquire), PvValue::Int(1), false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_clearing_faults_releases_withheld_completion() {
        let ioc = Arc::new(SimulatedIoc::spawn(PvNames::default(), &settings()));
        let n = ioc.names().clone();
        configure(&ioc, 2, 1).await;
        ioc.write(&n.name(Leaf::DataType), PvValue::Int(DataType::UInt8.code()), false)
            .await
            .unwrap();
        ioc.inject(Fault::WithholdCompletion { data_type: DataType::UInt8 }).await;
        arm(&ioc).await;

        // A client that gives up leaves nothing behind to acknowledge.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            ioc.write(
                &n.name(Leaf::ArrayIn),
                PvValue::Array(ElementBuffer::UInt8(vec![1, 2])),
                true,
            ),
        )
        .await;
        assert!(abandoned.is_err());

        arm(&ioc).await;
        let pending = {
            let ioc = ioc.clone();
            let pv = n.name(Leaf::ArrayIn);
            tokio::spawn(async move {
                ioc.write(&pv, PvValue::Array(ElementBuffer::UInt8(vec![3, 4])), true)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ioc.settle().await;
        assert!(!pending.is_finished());

        ioc.clear_faults().await;
        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("completion released")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_call_log_records_order() {
        let ioc = SimulatedIoc::spawn(PvNames::default(), &settings());
        configure(&ioc, 1, 1).await;
        let _ = ioc.read(&ioc.names().name(Leaf::DetectorState), None).await;
        let log = ioc.call_log().await;
        assert_eq!(log.len(), 4);
        assert_eq!(log[0], Call::Write { leaf: Leaf::NDimensions, wait: false });
        assert_eq!(log[3], Call::Read { leaf: Leaf::DetectorState });
        assert_eq!(
            ioc.written_leaves().await,
            vec![Leaf::NDimensions, Leaf::Dimensions, Leaf::EnableCallbacks]
        );
    }
}
