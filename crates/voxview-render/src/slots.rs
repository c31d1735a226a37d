// SPDX-License-Identifier: CEPL-1.0
//! Bookkeeping for frames in flight.
//!
//! Each slot cycles `Idle -> Acquiring -> Recording -> Submitted -> Idle`.
//! A slot only returns to `Idle` through a fence wait, and recording is only
//! reachable from `Acquiring`, so a command buffer is never reset while the
//! GPU may still read it.

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signalled; the slot's command buffer is free.
    Idle,
    Acquiring,
    Recording,
    /// Fence reset; it signals when the GPU finishes this slot's batch.
    Submitted,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("frame slot {slot}: cannot {action} while {state:?}")]
pub struct SlotError {
    pub slot: usize,
    pub state: SlotState,
    pub action: &'static str,
}

#[derive(Debug)]
pub struct FrameSlots {
    states: Vec<SlotState>,
    current: usize,
    submissions: u64,
}

impl FrameSlots {
    pub fn new(count: usize) -> Self {
        Self {
            states: vec![SlotState::Idle; count.max(1)],
            current: 0,
            submissions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Index of the slot the next frame uses.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    fn transition(
        &mut self,
        from: &[SlotState],
        to: SlotState,
        action: &'static str,
    ) -> Result<usize, SlotError> {
        let slot = self.current;
        let state = self.states[slot];
        if !from.contains(&state) {
            return Err(SlotError {
                slot,
                state,
                action,
            });
        }
        self.states[slot] = to;
        Ok(slot)
    }

    /// The current slot's fence has been waited on.
    pub fn fence_waited(&mut self) -> usize {
        let slot = self.current;
        if self.states[slot] == SlotState::Submitted {
            self.states[slot] = SlotState::Idle;
        }
        slot
    }

    /// Every fence has been waited on (teardown, swapchain recreation).
    pub fn all_fences_waited(&mut self) {
        for s in &mut self.states {
            if *s == SlotState::Submitted {
                *s = SlotState::Idle;
            }
        }
    }

    pub fn begin_acquire(&mut self) -> Result<usize, SlotError> {
        self.transition(&[SlotState::Idle], SlotState::Acquiring, "acquire")
    }

    /// Image acquired; the command buffer may now be reset and recorded.
    pub fn begin_recording(&mut self) -> Result<usize, SlotError> {
        self.transition(&[SlotState::Acquiring], SlotState::Recording, "record")
    }

    /// Stale swapchain or failed recording: drop back to `Idle` without
    /// submitting. The fence is still signalled.
    pub fn abandon(&mut self) -> Result<usize, SlotError> {
        self.transition(
            &[SlotState::Acquiring, SlotState::Recording],
            SlotState::Idle,
            "abandon",
        )
    }

    /// Batch submitted; advance to the next slot.
    pub fn submitted(&mut self) -> Result<usize, SlotError> {
        let slot = self.transition(&[SlotState::Recording], SlotState::Submitted, "submit")?;
        self.submissions += 1;
        self.current = (self.current + 1) % self.states.len();
        Ok(slot)
    }
}
