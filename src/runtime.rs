// src/runtime.rs

//! Cooperation with a host runtime around blocking engine calls.
//!
//! A decode step may block for as long as the caller's read function blocks, because the
//! engine calls back into it for more bytes. Hosts with a collector or a cooperative scheduler
//! need to release their lock for the duration of the engine call, and take it again while
//! their own code (the read function) runs.
//!
//! We model that as two complementary scoped guards:
//! - `UnmanagedRegion` wraps an engine call: `release` on entry, `acquire` on exit.
//! - `ManagedRegion` wraps each call into caller code from inside that engine call:
//!   `acquire` on entry, `release` on exit.

use std::sync::Arc;

/// Hooks a host runtime provides to let other work proceed during blocking engine calls.
pub trait HostRuntime: Send + Sync {
    /// Give up the host lock before a call that may block.
    fn release(&self);

    /// Take the host lock back before touching host-owned values.
    fn acquire(&self);
}

/// Runtime for plain Rust callers: nothing to release.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRuntime;

impl HostRuntime for NoRuntime {
    fn release(&self) {}
    fn acquire(&self) {}
}

pub(crate) fn no_runtime() -> Arc<dyn HostRuntime> {
    Arc::new(NoRuntime)
}

/// Scope during which the host lock is released.
#[must_use = "the host lock is re-acquired when the region is dropped"]
pub struct UnmanagedRegion<'a> {
    runtime: &'a dyn HostRuntime,
}

impl<'a> UnmanagedRegion<'a> {
    pub fn enter(runtime: &'a dyn HostRuntime) -> Self {
        runtime.release();
        Self { runtime }
    }
}

impl Drop for UnmanagedRegion<'_> {
    fn drop(&mut self) {
        self.runtime.acquire();
    }
}

/// Scope, nested inside an `UnmanagedRegion`, during which host code runs.
#[must_use = "the host lock is released again when the region is dropped"]
pub struct ManagedRegion<'a> {
    runtime: &'a dyn HostRuntime,
}

impl<'a> ManagedRegion<'a> {
    pub fn enter(runtime: &'a dyn HostRuntime) -> Self {
        runtime.acquire();
        Self { runtime }
    }
}

impl Drop for ManagedRegion<'_> {
    fn drop(&mut self) {
        self.runtime.release();
    }
}
