//! The steal request: a fixed 32-byte POD message that circulates among
//! workers seeking tasks.
//!
//! Grounded on the teacher's `StealResult`/`Buffer` POD handling in
//! `deque.rs` (trivially-copyable values moved by value through atomics) and
//! on `bytemuck` usage elsewhere in the pack for compile-time layout
//! guarantees.

use bytemuck::{Pod, Zeroable};

/// Tag for a [`StealRequest`]'s lifecycle state (§4.7 of the scheduler
/// design). Stored on the wire as a `u8`; this enum is the only thing code
/// outside this module ever matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Working = 0,
    Idle = 1,
    Failed = 2,
}

impl RequestState {
    #[inline]
    fn from_u8(v: u8) -> RequestState {
        match v {
            0 => RequestState::Working,
            1 => RequestState::Idle,
            2 => RequestState::Failed,
            other => panic!("corrupt StealRequest.state byte: {other}"),
        }
    }
}

/// A steal request, circulating by value through request-inbox channels.
///
/// `#[repr(C)]` + `Pod`/`Zeroable` make the 32-byte layout a property the
/// compiler checks (see the `const _` assertion below), not just a comment.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StealRequest {
    /// Handle of the SPSC task inbox the eventual victim should reply on.
    pub chan: u32,
    /// Requester's global worker ID.
    pub id: u32,
    /// Forwards so far, in `0..=MaxStealAttempts`.
    pub retry: u32,
    /// Origin partition.
    pub partition: u32,
    /// Origin intra-partition index.
    pub p_id: u32,
    /// Bitfield of still-eligible victims (bit `i` set => worker `i` is a
    /// candidate). Stored as a raw `u32`; use [`StealRequest::victims`] /
    /// [`StealRequest::set_victims`] to go through [`Bitfield32`].
    victims_bits: u32,
    state: u8,
    /// Adaptive mode only: nonzero => steal half the deque.
    stealhalf: u8,
    _pad: [u8; 6],
}

const _: () = assert!(std::mem::size_of::<StealRequest>() == 32);

use crate::scheduler::bitfield::Bitfield32;

impl StealRequest {
    pub fn new(
        chan: u32,
        id: u32,
        partition: u32,
        p_id: u32,
        victims: Bitfield32,
        state: RequestState,
        stealhalf: bool,
    ) -> StealRequest {
        StealRequest {
            chan,
            id,
            retry: 0,
            partition,
            p_id,
            victims_bits: victims.0,
            state: state as u8,
            stealhalf: stealhalf as u8,
            _pad: [0; 6],
        }
    }

    #[inline]
    pub fn victims(&self) -> Bitfield32 {
        Bitfield32(self.victims_bits)
    }

    #[inline]
    pub fn set_victims(&mut self, bf: Bitfield32) {
        self.victims_bits = bf.0;
    }

    #[inline]
    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state)
    }

    #[inline]
    pub fn set_state(&mut self, state: RequestState) {
        self.state = state as u8;
    }

    #[inline]
    pub fn stealhalf(&self) -> bool {
        self.stealhalf != 0
    }

    #[inline]
    pub fn set_stealhalf(&mut self, v: bool) {
        self.stealhalf = v as u8;
    }
}
