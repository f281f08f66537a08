//! Stream plumbing for deferred opening and guaranteed release
//!
//! [`LazyReader`] postpones acquiring a reader until the first byte is requested,
//! which keeps at most one entry source open while thousands may be queued.
//! [`NotifyingReader`] runs a list of release hooks exactly once when its inner
//! reader is released: at end of stream, on explicit `close()` or on drop.

use log::warn;
use std::fmt;
use std::io::{self, Read};

type Hook = Box<dyn FnOnce() -> io::Result<()>>;

/// Ordered list of "on release" closures, each run at most once
///
/// A failing hook is logged and skipped; it never stops the hooks after it.
#[derive(Default)]
pub struct ReleaseHooks {
    hooks: Vec<Hook>,
}

impl ReleaseHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, hook: F)
    where
        F: FnOnce() -> io::Result<()> + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every pending hook in registration order
    pub fn release(&mut self) {
        for (index, hook) in self.hooks.drain(..).enumerate() {
            if let Err(err) = hook() {
                warn!("release hook #{} failed: {}", index, err);
            }
        }
    }
}

impl fmt::Debug for ReleaseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHooks")
            .field("pending", &self.hooks.len())
            .finish()
    }
}

impl Drop for ReleaseHooks {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reader that releases its inner reader and fires hooks once it is done with it
pub struct NotifyingReader<R> {
    inner: Option<R>,
    hooks: ReleaseHooks,
}

impl<R: Read> NotifyingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            hooks: ReleaseHooks::new(),
        }
    }

    /// Register a hook to run after the inner reader has been dropped
    pub fn on_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + 'static,
    {
        self.hooks.push(hook);
        self
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Drop the inner reader and run the hooks; later calls do nothing
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            self.hooks.release();
        }
    }
}

impl<R: Read> Read for NotifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(0);
        };
        let n = inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.close();
        }
        Ok(n)
    }
}

impl<R> Drop for NotifyingReader<R> {
    fn drop(&mut self) {
        // inner goes first so file handles are closed before any hook touches the file
        self.inner = None;
        self.hooks.release();
    }
}

/// Reader whose inner reader is produced by a closure on first use
pub struct LazyReader<F, R> {
    init: Option<F>,
    inner: Option<R>,
    failed: bool,
}

impl<F, R> LazyReader<F, R>
where
    F: FnOnce() -> io::Result<R>,
    R: Read,
{
    pub fn new(init: F) -> Self {
        Self {
            init: Some(init),
            inner: None,
            failed: false,
        }
    }

    pub fn is_opened(&self) -> bool {
        self.inner.is_some()
    }

    /// Drop the inner reader, or the pending initializer if it never ran
    pub fn close(&mut self) {
        self.init = None;
        self.inner = None;
        self.failed = false;
    }

    /// A failed initializer is spent, so every later read fails too
    fn get(&mut self) -> io::Result<Option<&mut R>> {
        if self.failed {
            return Err(io::Error::other("reader failed to open"));
        }
        if self.inner.is_none() {
            if let Some(init) = self.init.take() {
                match init() {
                    Ok(inner) => self.inner = Some(inner),
                    Err(err) => {
                        self.failed = true;
                        return Err(err);
                    }
                }
            }
        }
        Ok(self.inner.as_mut())
    }
}

impl<F, R> Read for LazyReader<F, R>
where
    F: FnOnce() -> io::Result<R>,
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.get()? {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }
}
