//! Reuse temporary byte buffers across chunks.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};


/// A shared collection of byte buffers.
/// Cloning the pool yields another handle to the same buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferPool {
    buffers: Arc<Mutex<Vec<Vec<u8>>>>,
}

/// A byte buffer that returns to its pool when dropped,
/// even if an error or a panic interrupts the work.
#[derive(Debug)]
pub struct PooledBuffer {
    bytes: Vec<u8>,
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
}


impl BufferPool {

    /// Never keeps more than this number of unused buffers.
    const MAX_IDLE_BUFFERS: usize = 16;

    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a zeroed buffer with the specified length,
    /// reusing a previously returned allocation if possible.
    pub fn take(&self, byte_count: usize) -> PooledBuffer {
        let reused = self.buffers.lock().ok().and_then(|mut buffers| buffers.pop());

        let mut bytes = reused.unwrap_or_default();
        bytes.clear();
        bytes.resize(byte_count, 0);

        PooledBuffer { bytes, pool: Arc::clone(&self.buffers) }
    }

    /// The number of buffers waiting to be reused.
    pub fn idle_count(&self) -> usize {
        self.buffers.lock().map(|buffers| buffers.len()).unwrap_or(0)
    }

    /// The allocated byte size of the largest buffer waiting to be reused.
    pub fn largest_idle_capacity(&self) -> usize {
        self.buffers.lock()
            .map(|buffers| buffers.iter().map(Vec::capacity).max().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // a poisoned pool simply forgets the buffer
        if let Ok(mut buffers) = self.pool.lock() {
            if buffers.len() < BufferPool::MAX_IDLE_BUFFERS {
                buffers.push(std::mem::take(&mut self.bytes));
            }
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] { &self.bytes }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] { &mut self.bytes }
}
