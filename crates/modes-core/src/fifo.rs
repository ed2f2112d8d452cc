//! Fixed-capacity magnitude buffer FIFO connecting the producer (sample
//! source + converter) to the consumer (demodulator).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Bit flags carried on a [`MagBuffer`].
pub const DISCONTINUOUS: u32 = 1 << 0;

/// One ring slot: a preallocated sample array plus the metadata the
/// converter and demodulator attach to it.
#[derive(Debug, Clone)]
pub struct MagBuffer {
    pub data: Vec<u16>,
    pub overlap: usize,
    pub valid_length: usize,
    pub sample_timestamp: u64,
    pub sys_timestamp_ms: u64,
    pub dropped: u64,
    pub flags: u32,
    pub mean_level: f64,
    pub mean_power: f64,
}

impl MagBuffer {
    fn new(total_length: usize) -> Self {
        MagBuffer {
            data: vec![0u16; total_length],
            overlap: 0,
            valid_length: 0,
            sample_timestamp: 0,
            sys_timestamp_ms: 0,
            dropped: 0,
            flags: 0,
            mean_level: 0.0,
            mean_power: 0.0,
        }
    }

    fn reset(&mut self) {
        self.valid_length = 0;
        self.dropped = 0;
        self.flags = 0;
        self.mean_level = 0.0;
        self.mean_power = 0.0;
        // overlap and the leading `overlap` samples are set by Fifo::acquire.
    }

    pub fn total_length(&self) -> usize {
        self.data.len()
    }
}

struct State {
    free: VecDeque<MagBuffer>,
    pending: VecDeque<MagBuffer>,
    overlap_carry: Option<Vec<u16>>,
    shut_down: bool,
    dropped_since_last_enqueue: u64,
}

/// Single-producer single-consumer ring of `N` magnitude buffers.
pub struct Fifo {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    overlap_len: usize,
}

impl Fifo {
    pub fn new(capacity: usize, total_length: usize, overlap_len: usize) -> Self {
        assert!(overlap_len <= total_length, "overlap cannot exceed buffer length");
        let mut free = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            free.push_back(MagBuffer::new(total_length));
        }
        Fifo {
            state: Mutex::new(State { free, pending: VecDeque::new(), overlap_carry: None, shut_down: false, dropped_since_last_enqueue: 0 }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            overlap_len,
        }
    }

    /// Returns an empty buffer for the producer, seeded with the previous
    /// buffer's overlap tail. `wait_millis`: `0` = non-blocking, negative =
    /// wait indefinitely, positive = wait up to that many milliseconds.
    pub fn acquire(&self, wait_millis: i64) -> Option<MagBuffer> {
        let mut guard = self.state.lock().unwrap();
        let deadline = (wait_millis > 0).then(|| Instant::now() + Duration::from_millis(wait_millis as u64));
        loop {
            if guard.shut_down {
                return None;
            }
            if let Some(mut buf) = guard.free.pop_front() {
                buf.reset();
                if let Some(carry) = guard.overlap_carry.take() {
                    buf.data[..carry.len()].copy_from_slice(&carry);
                    buf.overlap = carry.len();
                    buf.valid_length = carry.len();
                } else {
                    buf.overlap = 0;
                }
                buf.dropped = std::mem::take(&mut guard.dropped_since_last_enqueue);
                if buf.dropped > 0 {
                    buf.flags |= DISCONTINUOUS;
                }
                return Some(buf);
            }
            if wait_millis == 0 {
                return None;
            }
            match deadline {
                None => guard = self.not_full.wait(guard).unwrap(),
                Some(d) => {
                    let remaining = d.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    let (g, timeout) = self.not_full.wait_timeout(guard, remaining).unwrap();
                    guard = g;
                    if timeout.timed_out() && guard.free.is_empty() {
                        return None;
                    }
                }
            }
        }
    }

    /// Makes `buf` visible to the consumer in FIFO order.
    pub fn enqueue(&self, buf: MagBuffer) {
        let mut guard = self.state.lock().unwrap();
        guard.pending.push_back(buf);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Consumer side of [`Fifo::acquire`].
    pub fn dequeue(&self, wait_millis: i64) -> Option<MagBuffer> {
        let mut guard = self.state.lock().unwrap();
        let deadline = (wait_millis > 0).then(|| Instant::now() + Duration::from_millis(wait_millis as u64));
        loop {
            if let Some(buf) = guard.pending.pop_front() {
                return Some(buf);
            }
            if guard.shut_down {
                return None;
            }
            if wait_millis == 0 {
                return None;
            }
            match deadline {
                None => guard = self.not_empty.wait(guard).unwrap(),
                Some(d) => {
                    let remaining = d.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    let (g, timeout) = self.not_empty.wait_timeout(guard, remaining).unwrap();
                    guard = g;
                    if timeout.timed_out() && guard.pending.is_empty() {
                        return None;
                    }
                }
            }
        }
    }

    /// Returns `buf` to the free pool, carrying its tail `overlap_len`
    /// samples forward into the next buffer the producer acquires.
    pub fn release(&self, buf: MagBuffer) {
        let mut guard = self.state.lock().unwrap();
        if self.overlap_len > 0 && buf.valid_length >= self.overlap_len {
            let start = buf.valid_length - self.overlap_len;
            guard.overlap_carry = Some(buf.data[start..buf.valid_length].to_vec());
        }
        guard.free.push_back(buf);
        drop(guard);
        self.not_full.notify_one();
    }

    /// Called by the producer when `acquire(0)` returns `None`: accumulates
    /// the lost sample count so the next successful buffer is marked
    /// `DISCONTINUOUS`.
    pub fn record_dropped(&self, n_samples: u64) {
        let mut guard = self.state.lock().unwrap();
        guard.dropped_since_last_enqueue += n_samples;
    }

    /// Unblocks both ends; subsequent `acquire`/`dequeue` return `None`
    /// once in-flight buffers are drained.
    pub fn shutdown(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.shut_down = true;
        drop(guard);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_enqueue_dequeue_release_round_trips() {
        let fifo = Fifo::new(2, 16, 4);
        let mut buf = fifo.acquire(0).unwrap();
        buf.valid_length = 16;
        buf.data.iter_mut().enumerate().for_each(|(i, v)| *v = i as u16);
        fifo.enqueue(buf);
        let got = fifo.dequeue(0).unwrap();
        assert_eq!(got.valid_length, 16);
        fifo.release(got);
    }

    #[test]
    fn overlap_tail_carries_to_next_acquire() {
        let fifo = Fifo::new(2, 8, 3);
        let mut buf = fifo.acquire(0).unwrap();
        buf.valid_length = 8;
        buf.data.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        fifo.release(buf);
        let next = fifo.acquire(0).unwrap();
        assert_eq!(next.overlap, 3);
        assert_eq!(&next.data[..3], &[6, 7, 8]);
    }

    #[test]
    fn acquire_nonblocking_fails_when_empty() {
        let fifo = Fifo::new(1, 4, 0);
        let _buf = fifo.acquire(0).unwrap();
        assert!(fifo.acquire(0).is_none());
    }

    #[test]
    fn dropped_samples_set_discontinuous_flag_on_next_buffer() {
        let fifo = Fifo::new(1, 4, 0);
        let buf = fifo.acquire(0).unwrap();
        assert!(fifo.acquire(0).is_none()); // fifo full, would have failed in producer
        fifo.record_dropped(123);
        fifo.release(buf);
        let next = fifo.acquire(0).unwrap();
        assert_eq!(next.dropped, 123);
        assert_eq!(next.flags & DISCONTINUOUS, DISCONTINUOUS);
    }

    #[test]
    fn shutdown_unblocks_acquire_and_dequeue() {
        let fifo = Fifo::new(1, 4, 0);
        fifo.shutdown();
        assert!(fifo.acquire(-1).is_none());
        assert!(fifo.dequeue(-1).is_none());
    }
}
