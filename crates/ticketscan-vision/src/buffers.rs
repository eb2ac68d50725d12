// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Working-buffer pool. Grayscale buffers produced during a cycle are checked
// out of a bounded pool and handed back when their guard drops, on the
// success path, on an early `?` return and while unwinding from a panic.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use image::GrayImage;
use ticketscan_core::error::{Result, ScanError};
use tracing::{debug, trace};

#[derive(Default)]
struct PoolState {
    /// Released allocations, ready for reuse.
    free: Vec<Vec<u8>>,
    /// Guards currently alive.
    in_flight: usize,
}

/// Bounded pool of reusable grayscale working buffers.
pub struct BufferPool {
    capacity: usize,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently checked out.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Number of released allocations kept for reuse.
    pub fn idle(&self) -> usize {
        self.lock().free.len()
    }

    /// Check out a zeroed `width` x `height` buffer, reusing a released
    /// allocation when one is available.
    pub fn acquire(&self, width: u32, height: u32) -> Result<WorkingBuffer<'_>> {
        let len = width as usize * height as usize;
        let mut raw = {
            let mut state = self.lock();
            self.reserve(&mut state)?;
            state.free.pop().unwrap_or_default()
        };
        raw.clear();
        raw.resize(len, 0);

        let image = GrayImage::from_raw(width, height, raw).ok_or_else(|| {
            // Unreachable in practice: the vector was sized above. Give the
            // slot back before reporting.
            self.lock().in_flight -= 1;
            ScanError::Image(format!("cannot shape a {width}x{height} working buffer"))
        })?;
        trace!(width, height, "working buffer acquired");
        Ok(WorkingBuffer { pool: self, image })
    }

    /// Track an image produced by a library routine as a pooled buffer; its
    /// allocation joins the pool once the guard drops.
    pub fn adopt(&self, image: GrayImage) -> Result<WorkingBuffer<'_>> {
        self.reserve(&mut self.lock())?;
        Ok(WorkingBuffer { pool: self, image })
    }

    /// Drop every idle allocation. Called on session teardown.
    pub fn clear(&self) {
        let mut state = self.lock();
        let released = state.free.len();
        state.free.clear();
        debug!(released, in_flight = state.in_flight, "buffer pool cleared");
    }

    fn reserve(&self, state: &mut PoolState) -> Result<()> {
        if state.in_flight >= self.capacity {
            return Err(ScanError::BufferPoolExhausted {
                capacity: self.capacity,
            });
        }
        state.in_flight += 1;
        Ok(())
    }

    fn release(&self, raw: Vec<u8>) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.free.len() < self.capacity {
            state.free.push(raw);
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A grayscale buffer checked out of a [`BufferPool`].
pub struct WorkingBuffer<'p> {
    pool: &'p BufferPool,
    image: GrayImage,
}

impl Deref for WorkingBuffer<'_> {
    type Target = GrayImage;

    fn deref(&self) -> &GrayImage {
        &self.image
    }
}

impl DerefMut for WorkingBuffer<'_> {
    fn deref_mut(&mut self) -> &mut GrayImage {
        &mut self.image
    }
}

impl Drop for WorkingBuffer<'_> {
    fn drop(&mut self) {
        let image = std::mem::take(&mut self.image);
        self.pool.release(image.into_raw());
    }
}
