// Decoded-frame buffer pool
// Fixed set of frame slots partitioned into logical queues. The pool is
// shared between the decode (producer) thread and the render (consumer)
// thread; every queue mutation goes through one pool-wide lock so that
// multi-step sequences (drain pause queue, decide, re-enqueue) cannot
// interleave with the producer.

use crate::format::BufferPolicy;
use crate::frame::{FrameFormat, VideoFrame};
use crate::geom::Size;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),
    #[error("Invalid video dimensions {0}x{1}")]
    InvalidDimensions(u32, u32),
    #[error("Buffers have not been created")]
    NotCreated,
}

/// Logical queues a frame can sit in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueId {
    Free,
    Decoding,
    Used,
    Pause,
    Displayed,
}

impl QueueId {
    pub const ALL: [QueueId; 5] = [
        QueueId::Free,
        QueueId::Decoding,
        QueueId::Used,
        QueueId::Pause,
        QueueId::Displayed,
    ];

    fn index(self) -> usize {
        match self {
            QueueId::Free => 0,
            QueueId::Decoding => 1,
            QueueId::Used => 2,
            QueueId::Pause => 3,
            QueueId::Displayed => 4,
        }
    }

    fn tag(self) -> char {
        match self {
            QueueId::Free => 'f',
            QueueId::Decoding => 'd',
            QueueId::Used => 'u',
            QueueId::Pause => 'p',
            QueueId::Displayed => 'D',
        }
    }
}

#[derive(Default)]
struct PoolInner {
    queues: [VecDeque<VideoFrame>; 5],
    /// Number of frames allocated at create time; also the hard capacity
    capacity: usize,
    /// Bumped on every create; frames from older generations released after
    /// a recreation are dropped instead of re-queued
    generation: u64,
    created: bool,
    format: Option<FrameFormat>,
    dimensions: Size,
}

impl PoolInner {
    fn total_queued(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }
}

/// Pool of decoded-frame buffers
///
/// All slots are allocated up-front by `create` and recycled through the
/// free queue for the lifetime of the pool. Frames move between queues by
/// value, so a frame is owned by exactly one queue (or checked out by a
/// caller) at any time.
pub struct FrameBufferPool {
    inner: Mutex<PoolInner>,
}

impl Default for FrameBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBufferPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Allocate all frame slots for the given policy and dimensions.
    /// No-op if buffers already exist. For software formats every slot gets
    /// pixel storage now; device-format slots are empty shells that receive
    /// their interop handle from the decoder.
    pub fn create(&self, policy: &BufferPolicy, dimensions: Size) -> Result<(), BufferError> {
        let mut inner = self.inner.lock();
        if inner.created {
            return Ok(());
        }
        if dimensions.is_empty() {
            return Err(BufferError::InvalidDimensions(
                dimensions.width,
                dimensions.height,
            ));
        }

        let count = policy.total_buffers();
        let buffer_size = policy.format.buffer_size(dimensions).unwrap_or(0);
        inner.generation += 1;

        let mut free = VecDeque::with_capacity(count);
        for id in 0..count {
            let mut data = Vec::new();
            if buffer_size > 0 {
                data.try_reserve_exact(buffer_size).map_err(|e| {
                    BufferError::AllocationFailed(format!(
                        "{} bytes for frame {}: {}",
                        buffer_size, id, e
                    ))
                })?;
                data.resize(buffer_size, 0);
            }
            free.push_back(VideoFrame::new(id, inner.generation, policy.format, data));
        }

        inner.queues[QueueId::Free.index()] = free;
        inner.capacity = count;
        inner.created = true;
        inner.format = Some(policy.format);
        inner.dimensions = dimensions;
        log::info!(
            "Created {} {:?} buffers at {}x{}",
            count,
            policy.format,
            dimensions.width,
            dimensions.height
        );
        Ok(())
    }

    /// Discard every queued frame (releasing device surfaces) and free all
    /// storage. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if !inner.created {
            return;
        }
        let mut released = 0usize;
        for queue in inner.queues.iter_mut() {
            while let Some(mut frame) = queue.pop_front() {
                if frame.take_interop().is_some() {
                    released += 1;
                }
            }
        }
        if released > 0 {
            log::debug!("Released {} device surfaces on destroy", released);
        }
        inner.capacity = 0;
        inner.created = false;
        inner.format = None;
        inner.dimensions = Size::default();
    }

    /// Destroy and create as one operation; used on seek and input change
    pub fn discard_and_recreate(
        &self,
        policy: &BufferPolicy,
        dimensions: Size,
    ) -> Result<(), BufferError> {
        self.destroy();
        self.create(policy, dimensions)
    }

    pub fn is_created(&self) -> bool {
        self.inner.lock().created
    }

    pub fn format(&self) -> Option<FrameFormat> {
        self.inner.lock().format
    }

    /// Scoped exclusive access for multi-step queue mutation. The guard
    /// covers the whole queue set; dropping it ends the lock.
    pub fn begin_lock(&self, _queue: QueueId) -> QueueLock<'_> {
        QueueLock {
            inner: self.inner.lock(),
        }
    }

    pub fn enqueue(&self, queue: QueueId, frame: VideoFrame) {
        self.begin_lock(queue).enqueue(queue, frame);
    }

    pub fn dequeue(&self, queue: QueueId) -> Option<VideoFrame> {
        self.begin_lock(queue).dequeue(queue)
    }

    pub fn size(&self, queue: QueueId) -> usize {
        self.inner.lock().queues[queue.index()].len()
    }

    pub fn contains(&self, queue: QueueId, frame_id: usize) -> bool {
        self.begin_lock(queue).contains(queue, frame_id)
    }

    pub fn remove(&self, queue: QueueId, frame_id: usize) -> Option<VideoFrame> {
        self.begin_lock(queue).remove(queue, frame_id)
    }

    /// Total frames currently sitting in queues (checked-out frames are not
    /// counted; they still belong to the pool's capacity)
    pub fn total_queued(&self) -> usize {
        self.inner.lock().total_queued()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Return a frame to the free queue, releasing any device surface and
    /// clearing per-picture state so the decoder can reuse the slot
    pub fn release_frame(&self, mut frame: VideoFrame) {
        if let Some(interop) = frame.take_interop() {
            log::debug!(
                "Releasing device surface {} from frame {}",
                interop.surface_id(),
                frame.id()
            );
            drop(interop);
        }
        frame.clear();
        // Stale-generation frames are rejected by the enqueue guard
        self.enqueue(QueueId::Free, frame);
    }

    /// Forced release of every pause frame. Called when the decoder flushes
    /// so its hardware context can be torn down before a replacement exists.
    pub fn discard_pause_frames(&self) {
        let mut release = Vec::new();
        {
            let mut lock = self.begin_lock(QueueId::Pause);
            while let Some(frame) = lock.dequeue(QueueId::Pause) {
                release.push(frame);
            }
        }
        for frame in release {
            self.release_frame(frame);
        }
    }

    /// One-line queue occupancy summary for logs, e.g. "f3 d0 u1 p1 D0 (cap 6)"
    pub fn status(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        for queue in QueueId::ALL {
            out.push(queue.tag());
            out.push_str(&inner.queues[queue.index()].len().to_string());
            out.push(' ');
        }
        out.push_str(&format!("(cap {})", inner.capacity));
        out
    }
}

impl fmt::Debug for FrameBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameBufferPool {{ {} }}", self.status())
    }
}

/// RAII guard for a locked queue set
pub struct QueueLock<'a> {
    inner: MutexGuard<'a, PoolInner>,
}

impl QueueLock<'_> {
    /// Frames checked out before a recreation belong to a dead generation;
    /// accepting one would push the pool past its capacity, so they are
    /// dropped here (their device surface releases with them)
    pub fn enqueue(&mut self, queue: QueueId, frame: VideoFrame) {
        if frame.generation() != self.inner.generation || frame.id() >= self.inner.capacity {
            log::warn!("Dropping stale frame {} on enqueue", frame.id());
            return;
        }
        debug_assert!(
            self.inner.total_queued() < self.inner.capacity,
            "queue capacity exceeded"
        );
        self.inner.queues[queue.index()].push_back(frame);
    }

    pub fn dequeue(&mut self, queue: QueueId) -> Option<VideoFrame> {
        self.inner.queues[queue.index()].pop_front()
    }

    pub fn size(&self, queue: QueueId) -> usize {
        self.inner.queues[queue.index()].len()
    }

    pub fn contains(&self, queue: QueueId, frame_id: usize) -> bool {
        self.inner.queues[queue.index()]
            .iter()
            .any(|f| f.id() == frame_id)
    }

    pub fn remove(&mut self, queue: QueueId, frame_id: usize) -> Option<VideoFrame> {
        let q = &mut self.inner.queues[queue.index()];
        let pos = q.iter().position(|f| f.id() == frame_id)?;
        q.remove(pos)
    }

    pub fn head(&self, queue: QueueId) -> Option<&VideoFrame> {
        self.inner.queues[queue.index()].front()
    }

    pub fn head_mut(&mut self, queue: QueueId) -> Option<&mut VideoFrame> {
        self.inner.queues[queue.index()].front_mut()
    }

    pub fn tail(&self, queue: QueueId) -> Option<&VideoFrame> {
        self.inner.queues[queue.index()].back()
    }
}
