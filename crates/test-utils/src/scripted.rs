//! A scripted renderer for supervisor and engine tests.
//!
//! Each `start` call pops the next [`Script`] (falling back to a default),
//! so a test can describe exactly how every render attempt behaves:
//! succeed, fail, time out, or come back without an image.

use async_trait::async_trait;
use renderer::{RenderError, RenderJob, RenderRequest, RenderedImage, Renderer, RendererCapabilities};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Behaviour of one render attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Finish immediately with a solid image.
    Solid([u8; 4]),
    /// Finish with a solid image once `Duration` has elapsed.
    Delayed(Duration, [u8; 4]),
    /// Never finish on its own.
    Hang,
    /// Finish with an error.
    Fail(String),
    /// Finish without producing an image.
    Empty,
    /// Refuse the request at submission.
    Reject(String),
}

pub struct ScriptedRenderer {
    capabilities: RendererCapabilities,
    scripts: Mutex<VecDeque<Script>>,
    default: Script,
    requests: Mutex<Vec<RenderRequest>>,
    cancels: Arc<AtomicUsize>,
    pumps: Arc<AtomicUsize>,
}

impl ScriptedRenderer {
    pub fn new(default: Script) -> Self {
        Self {
            capabilities: Self::default_capabilities(),
            scripts: Mutex::new(VecDeque::new()),
            default,
            requests: Mutex::new(Vec::new()),
            cancels: Arc::new(AtomicUsize::new(0)),
            pumps: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every attempt succeeds with `rgba`.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(Script::Solid(rgba))
    }

    /// Scripts consumed in order before the default applies.
    pub fn with_scripts(self, scripts: impl IntoIterator<Item = Script>) -> Self {
        if let Ok(mut queue) = self.scripts.lock() {
            queue.extend(scripts);
        }
        self
    }

    pub fn with_capabilities(mut self, capabilities: RendererCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn default_capabilities() -> RendererCapabilities {
        RendererCapabilities {
            name: "scripted".to_string(),
            cancellable: true,
            reports_activity: true,
            requires_event_pump: false,
            max_output_size: 4096,
        }
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn pump_count(&self) -> usize {
        self.pumps.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        self.scripts
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Renderer for ScriptedRenderer {
    fn capabilities(&self) -> RendererCapabilities {
        self.capabilities.clone()
    }

    fn start(&self, request: RenderRequest) -> Result<Box<dyn RenderJob>, RenderError> {
        let script = self.next_script();
        let (width, height) = (request.width, request.height);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Script::Reject(message) = script {
            return Err(RenderError::Failed(message));
        }

        let ready_at = match &script {
            Script::Delayed(delay, _) => Instant::now() + *delay,
            _ => Instant::now(),
        };
        Ok(Box::new(ScriptedJob {
            script,
            width,
            height,
            ready_at,
            cancelled: false,
            cancels: Arc::clone(&self.cancels),
            pumps: Arc::clone(&self.pumps),
        }))
    }
}

pub struct ScriptedJob {
    script: Script,
    width: u32,
    height: u32,
    ready_at: Instant,
    cancelled: bool,
    cancels: Arc<AtomicUsize>,
    pumps: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderJob for ScriptedJob {
    fn is_active(&self) -> bool {
        !self.cancelled && !self.is_finished()
    }

    fn is_finished(&self) -> bool {
        match self.script {
            Script::Hang => false,
            Script::Delayed(..) => Instant::now() >= self.ready_at,
            _ => true,
        }
    }

    async fn pump_events(&mut self) {
        self.pumps.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn finish(self: Box<Self>) -> Result<Option<RenderedImage>, RenderError> {
        match self.script {
            Script::Solid(rgba) | Script::Delayed(_, rgba) => {
                Ok(Some(RenderedImage::filled(self.width, self.height, rgba)))
            }
            Script::Fail(message) => Err(RenderError::Failed(message)),
            Script::Empty => Ok(None),
            Script::Hang if self.cancelled => Err(RenderError::Cancelled),
            Script::Hang => Err(RenderError::Failed("job still running".to_string())),
            Script::Reject(message) => Err(RenderError::Failed(message)),
        }
    }
}
