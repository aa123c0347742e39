//! ARMv7-A barrier operations.
//!
//! Memory accesses that don't impact the pipeline, page tables, or caches can
//! be handled with the Data Memory Barrier instruction, DMB. The DMA boundary
//! this crate exists to serve, however, needs more: a buffer descriptor built
//! by software must be *observably complete* to the GEM's DMA engine before
//! the register write that kicks it off retires, and on a core running with
//! caches and a write buffer enabled that requires the stronger Data
//! Synchronization Barrier, DSB, which additionally blocks the issuing core
//! until prior explicit memory accesses complete.
//!
//! We use the `sy` (full system) shareability domain for both; ARMv7-A cores
//! this small don't gain anything from the finer-grained inner/outer-shareable
//! variants, and getting the domain wrong is a much worse bug than leaving
//! performance on the table.

#[inline(always)]
fn dmb() {
    unsafe {
        core::arch::asm!("dmb sy", options(nostack, preserves_flags));
    }
    // Belt and suspenders: try to keep the compiler from moving accesses
    // across the barrier even if it doesn't model the asm as a fence.
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

#[inline(always)]
fn dsb() {
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

#[inline(always)]
pub fn arch_specific_load_load() {
    dmb();
}

#[inline(always)]
pub fn arch_specific_load_store() {
    dmb();
}

#[inline(always)]
pub fn arch_specific_store_load() {
    dmb();
}

#[inline(always)]
pub fn arch_specific_store_store() {
    dmb();
}

#[inline(always)]
pub fn arch_specific_dma_ready() {
    dsb();
}
