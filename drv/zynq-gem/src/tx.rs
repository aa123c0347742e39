//! TX path (C6): `send()`'s fragment segmentation and the worker-side
//! TX-done reclaim that frees BDs back to the ring.

use crate::mac::Mac;
use crate::ring::TxRing;
use gem_err::{ControllerErrorBit, GemError};

/// A capability for blocking `send` until the worker has observed and
/// reclaimed the BDs it just queued, bounded by a timeout instead of the
/// unbounded wait a bare hardware description implies.
pub trait TxWaiter {
    /// Blocks until TX-done is signalled or `timeout_ms` elapses. Returns
    /// `true` if signalled, `false` on timeout.
    fn wait(&self, timeout_ms: u32) -> bool;
    fn signal(&self);
}

fn bds_needed(total_len: usize, tx_buffer_size: usize) -> usize {
    (total_len + tx_buffer_size - 1) / tx_buffer_size
}

/// Copies `fragments` across `needed` successive BDs starting at `start`,
/// writing each BD's `ctrl` word as it fills (spec.md section 4.6): every
/// BD but the last gets exactly `BUFSZ` bytes and no `LAST`; the last gets
/// however many bytes remain and `LAST`.
fn segment<const BUFSZ: usize>(
    ring: &TxRing<BUFSZ>,
    start: usize,
    needed: usize,
    fragments: &[&[u8]],
    total_len: usize,
) {
    let mut remaining = total_len;
    let mut frag_iter = fragments.iter();
    let mut frag = frag_iter.next().map(|f| &f[..]).unwrap_or(&[]);

    for step in 0..needed {
        let bd = ring.index(start + step);
        let this_bd_len = BUFSZ.min(remaining);
        let mut written = 0;
        let buf = unsafe { ring.buffer_mut(bd) };
        while written < this_bd_len {
            if frag.is_empty() {
                frag = frag_iter.next().map(|f| &f[..]).unwrap_or(&[]);
            }
            let take = (this_bd_len - written).min(frag.len());
            buf[written..written + take].copy_from_slice(&frag[..take]);
            frag = &frag[take..];
            written += take;
        }
        remaining -= this_bd_len;
        let last = step == needed - 1;
        ring.fill(bd, this_bd_len, last);
    }
}

pub struct Tx<'a, const BUFSZ: usize> {
    ring: &'a TxRing<BUFSZ>,
    mac: Mac<'a>,
    timeout_ms: u32,
}

impl<'a, const BUFSZ: usize> Tx<'a, BUFSZ> {
    pub fn new(ring: &'a TxRing<BUFSZ>, mac: Mac<'a>, timeout_ms: u32) -> Self {
        Self {
            ring,
            mac,
            timeout_ms,
        }
    }

    /// Queues `fragments` (a chain of byte slices forming one frame) for
    /// transmission and blocks until the worker reports TX-done for it.
    ///
    /// `link_up` is supplied by the caller (the device ties this to its
    /// link controller's current state) rather than read here, keeping
    /// this module's contract pure with respect to link state.
    pub fn send<W: TxWaiter>(
        &self,
        fragments: &[&[u8]],
        link_up: bool,
        waiter: &W,
    ) -> Result<(), GemError> {
        let total_len: usize = fragments.iter().map(|f| f.len()).sum();
        if total_len == 0 {
            return Err(GemError::InvalidArgument);
        }
        if !link_up {
            return Err(GemError::LinkDown);
        }

        let needed = bds_needed(total_len, BUFSZ);
        if needed > self.ring.count() {
            return Err(GemError::BufferTooLarge);
        }

        let start = self.ring.take(needed)?;
        segment(self.ring, start, needed, fragments, total_len);

        membar::dma_visibility_barrier();
        self.mac.kick_tx();

        if waiter.wait(self.timeout_ms) {
            Ok(())
        } else {
            Err(GemError::TxTimeout)
        }
    }
}

/// Called by the worker on a TX-done event. Reclaims every complete chain
/// currently at the head of the ring, invoking `on_error` for each sticky
/// error bit observed on a reclaimed BD, and signals `waiter` once per
/// reclaimed chain so a blocked `send` can wake.
pub fn on_tx_done<const BUFSZ: usize, W: TxWaiter>(
    ring: &TxRing<BUFSZ>,
    waiter: &W,
    mut on_error: impl FnMut(ControllerErrorBit),
) {
    loop {
        let mut errors_this_chain = [false; 4];
        let reclaimed = ring.reclaim_done(|_, ctrl| {
            for bit in TxRing::<BUFSZ>::error_bits(ctrl) {
                errors_this_chain[bit as usize] = true;
            }
        });
        match reclaimed {
            Some(_) => {
                for (i, hit) in errors_this_chain.iter().enumerate() {
                    if *hit {
                        on_error(controller_error_bit_from_index(i));
                    }
                }
                waiter.signal();
            }
            None => break,
        }
    }
}

fn controller_error_bit_from_index(i: usize) -> ControllerErrorBit {
    match i {
        0 => ControllerErrorBit::Retry,
        1 => ControllerErrorBit::Underrun,
        2 => ControllerErrorBit::BuffersExhausted,
        _ => ControllerErrorBit::LateCollision,
    }
}
