use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::entry::{ContentSender, Entry, EntryHandler, EntryStream};
use super::extra::ExtraFieldRegistry;
use super::records::Archive;
use super::routine::{Event, ParseContext, Routine, Step};
use super::window::Window;
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::io::ChunkSource;

/// Streaming ZIP extractor
///
/// Decodes one archive per [`consume`](Self::consume) call from a
/// forward-only chunk source, reporting entries to an [`EntryHandler`] as soon
/// as their local headers have been read. Memory use is bounded by the window
/// size plus the entry stream capacity, whatever the archive size.
///
/// One instance runs one task at a time. Starting a second task while one is
/// active fails with [`Error::ConcurrentUseViolation`].
pub struct StreamExtractor {
    config: ExtractorConfig,
    registry: ExtraFieldRegistry,
    window: Mutex<Window>,
    running: AtomicBool,
}

impl Default for StreamExtractor {
    fn default() -> Self {
        Self::build(ExtractorConfig::default(), ExtraFieldRegistry::default())
    }
}

impl StreamExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor with custom sizing.
    pub fn with_config(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, ExtraFieldRegistry::default()))
    }

    fn build(config: ExtractorConfig, registry: ExtraFieldRegistry) -> Self {
        Self {
            window: Mutex::new(Window::new(config.window_size)),
            config,
            registry,
            running: AtomicBool::new(false),
        }
    }

    /// Replace the extra-field parsers.
    pub fn with_registry(mut self, registry: ExtraFieldRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut ExtraFieldRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Drop buffered bytes left over from a failed task.
    pub fn reset(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::ResetWhileRunning);
        }
        let mut window = self
            .window
            .try_lock()
            .map_err(|_| Error::ResetWhileRunning)?;
        window.reset();
        Ok(())
    }

    /// Decode one archive from `source`.
    ///
    /// Returns once the end of central directory record has been read and the
    /// source is drained, or on the first error. On error the entry stream
    /// open at that moment receives the same error before this returns.
    pub async fn consume<S, H>(&self, source: &mut S, handler: &mut H) -> Result<()>
    where
        S: ChunkSource + ?Sized,
        H: EntryHandler + ?Sized,
    {
        let claim = Claim::take(self)?;
        claim.run(source, handler).await
    }

    /// Run [`consume`](Self::consume) on a new task, queueing entries on the
    /// returned receiver.
    ///
    /// The instance counts as running as soon as this returns, so it fails
    /// with [`Error::ConcurrentUseViolation`] while another task is active.
    pub fn spawn<S>(
        self: &Arc<Self>,
        mut source: S,
    ) -> Result<(mpsc::UnboundedReceiver<Entry>, JoinHandle<Result<()>>)>
    where
        S: ChunkSource + 'static,
    {
        let claim = Claim::take(Arc::clone(self))?;
        let (mut tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move { claim.run(&mut source, &mut tx).await });
        Ok((rx, task))
    }

    /// Decode with the running flag already held by the caller.
    async fn run_claimed<S, H>(&self, source: &mut S, handler: &mut H) -> Result<()>
    where
        S: ChunkSource + ?Sized,
        H: EntryHandler + ?Sized,
    {
        let mut window = self.window.lock().await;
        let mut driver = Driver {
            window: &mut window,
            archive: Archive::new(),
            events: Vec::new(),
            current: None,
            requested: 0,
            config: &self.config,
            registry: &self.registry,
            handler,
        };

        let result = driver.run(source).await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "extraction failed");
            driver.abort(e.clone()).await;
        }
        result
    }
}

/// Holds the running flag of an extractor until dropped.
struct Claim<E: Deref<Target = StreamExtractor>>(E);

impl<E: Deref<Target = StreamExtractor>> Claim<E> {
    fn take(extractor: E) -> Result<Self> {
        extractor
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::ConcurrentUseViolation)?;
        Ok(Self(extractor))
    }

    async fn run<S, H>(&self, source: &mut S, handler: &mut H) -> Result<()>
    where
        S: ChunkSource + ?Sized,
        H: EntryHandler + ?Sized,
    {
        self.0.run_claimed(source, handler).await
    }
}

impl<E: Deref<Target = StreamExtractor>> Drop for Claim<E> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// State of one `consume` call.
struct Driver<'a, H: ?Sized> {
    window: &'a mut Window,
    archive: Archive,
    events: Vec<Event>,
    /// Content channel of the entry being streamed.
    current: Option<ContentSender>,
    /// Bytes the archive routine asked for last.
    requested: usize,
    config: &'a ExtractorConfig,
    registry: &'a ExtraFieldRegistry,
    handler: &'a mut H,
}

impl<H: EntryHandler + ?Sized> Driver<'_, H> {
    async fn run<S: ChunkSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        let max_sub_chunk = self.config.max_sub_chunk();
        let mut terminated = false;
        let mut discarded = 0u64;

        while let Some(chunk) = source.next_chunk().await? {
            if terminated {
                discarded += chunk.len() as u64;
                continue;
            }
            for piece in chunk.chunks(max_sub_chunk) {
                self.window.flush();
                self.window.set(piece)?;

                while self.requested <= self.window.available() {
                    match self.resume(false).await? {
                        Step::Need(n) => self.requested = n,
                        Step::Terminate => {
                            self.terminate();
                            terminated = true;
                            break;
                        }
                        Step::Ready(()) => return Ok(()),
                    }
                }
                if terminated {
                    break;
                }
            }
        }

        if discarded > 0 {
            tracing::debug!(discarded, "ignored input after end of archive");
        }

        // Input is over: let the routine finish or report what is missing.
        loop {
            match self.resume(true).await? {
                Step::Ready(()) => return Ok(()),
                Step::Terminate => self.terminate(),
                Step::Need(n) if n > self.window.available() => {
                    return Err(Error::MalformedHeader {
                        record: "archive",
                        needed: n,
                        available: self.window.available(),
                    });
                }
                Step::Need(_) => {}
            }
        }
    }

    async fn resume(&mut self, eof: bool) -> Result<Step<()>> {
        let step = {
            let mut cx = ParseContext {
                window: &mut *self.window,
                events: &mut self.events,
                registry: self.registry,
                max_name_length: self.config.max_name_length,
                eof,
            };
            self.archive.resume(&mut cx)
        };
        self.dispatch().await;

        let step = step?;
        if let Step::Need(n) = step {
            if n > self.config.max_request_size {
                return Err(Error::BufferOverflow(format!(
                    "request of {n} bytes exceeds the {} byte limit",
                    self.config.max_request_size
                )));
            }
            tracing::trace!(n, available = self.window.available(), "waiting for input");
        }
        Ok(step)
    }

    /// End of archive: everything after it is ignored.
    fn terminate(&mut self) {
        tracing::debug!(offset = self.window.absolute_offset(), "end of archive");
        self.window.reset();
        self.requested = 0;
    }

    /// Forward parser events to the handler and the open entry stream.
    async fn dispatch(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        for event in events.drain(..) {
            match event {
                Event::Directory(report) => self.handler.on_directory(report),
                Event::File(report) => {
                    let (tx, stream) = EntryStream::channel(self.config.channel_capacity);
                    self.current = Some(tx);
                    self.handler.on_file(report, stream);
                }
                Event::Content(piece) => {
                    if let Some(tx) = &self.current {
                        if !tx.send(Ok(piece)).await {
                            tracing::debug!("entry stream dropped, discarding its content");
                            self.current = None;
                        }
                    }
                }
                Event::EndOfEntry => {
                    if let Some(tx) = self.current.take() {
                        tx.finish();
                    }
                }
            }
        }
        self.events = events;
    }

    /// Close the open entry stream with `error`.
    async fn abort(&mut self, error: Error) {
        if let Some(tx) = self.current.take() {
            tx.send(Err(error)).await;
        }
    }
}
