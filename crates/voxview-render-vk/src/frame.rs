// SPDX-License-Identifier: CEPL-1.0
//! Per in-flight slot command buffer and sync objects.
//!
//! Per-frame order: wait fence -> acquire -> reset + record -> reset fence ->
//! submit -> present. A stale acquire signals nothing and only drops the slot
//! back to `Idle`. A failure after a successful acquire goes through
//! `release_acquired`, which keeps the fence and semaphore pair usable.

use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use tracing::warn;
use voxview_render::{FrameSlots, SlotState};

use crate::device::GraphicsDevice;
use crate::resources::{Fence, Semaphore};

pub struct FrameResources {
    pub cmd: vk::CommandBuffer,
    pub in_flight: Fence,
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
}

pub struct FrameResourceSet {
    device: Arc<GraphicsDevice>,
    frames: Vec<FrameResources>,
    slots: FrameSlots,
}

impl FrameResourceSet {
    pub fn new(device: &Arc<GraphicsDevice>, count: usize) -> Result<Self> {
        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: device.command_pool(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let cmds = unsafe { device.raw().allocate_command_buffers(&ai) }
            .context("allocate_command_buffers")?;

        let mut frames = Vec::with_capacity(count);
        for &cmd in &cmds {
            let built = (|| -> Result<FrameResources> {
                Ok(FrameResources {
                    cmd,
                    in_flight: Fence::new(device, true)?,
                    image_available: Semaphore::new(device)?,
                    render_finished: Semaphore::new(device)?,
                })
            })();
            match built {
                Ok(f) => frames.push(f),
                Err(e) => {
                    unsafe {
                        device
                            .raw()
                            .free_command_buffers(device.command_pool(), &cmds)
                    };
                    return Err(e);
                }
            }
        }

        Ok(Self {
            device: device.clone(),
            frames,
            slots: FrameSlots::new(count),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Slot index the next frame records into.
    pub fn current_index(&self) -> usize {
        self.slots.current()
    }

    pub fn current(&self) -> &FrameResources {
        &self.frames[self.slots.current()]
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.slots.state(slot)
    }

    /// Blocks until the current slot's previous submission has finished.
    pub fn wait_current(&mut self) -> Result<()> {
        self.current().in_flight.wait()?;
        self.slots.fence_waited();
        Ok(())
    }

    /// Blocks on every slot (swapchain recreation, teardown).
    pub fn wait_all(&mut self) -> Result<()> {
        let fences: Vec<vk::Fence> = self.frames.iter().map(|f| f.in_flight.handle()).collect();
        unsafe { self.device.raw().wait_for_fences(&fences, true, u64::MAX) }
            .context("wait_for_fences(all slots)")?;
        self.slots.all_fences_waited();
        Ok(())
    }

    pub fn begin_acquire(&mut self) -> Result<&FrameResources> {
        let slot = self.slots.begin_acquire()?;
        Ok(&self.frames[slot])
    }

    /// Acquire reported a stale chain or failed outright, so nothing was
    /// signalled and the fence is untouched.
    pub fn abandon(&mut self) -> Result<()> {
        self.slots.abandon()?;
        Ok(())
    }

    /// A frame failed between a successful acquire and a successful submit.
    /// Submits an empty batch that consumes `image_available` and signals the
    /// fence, so the slot is `Idle` with a signalled fence and an unsignalled
    /// semaphore. If even that fails the slot's sync objects are rebuilt.
    pub fn release_acquired(&mut self) -> Result<()> {
        let slot = self.slots.abandon()?;
        let d = self.device.raw();
        let f = &mut self.frames[slot];

        let wait = f.image_available.handle();
        let stage = vk::PipelineStageFlags::ALL_COMMANDS;
        let drain = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: &stage,
            ..Default::default()
        };
        let drained = f.in_flight.reset().and_then(|()| {
            unsafe {
                d.queue_submit(
                    self.device.queue(),
                    std::slice::from_ref(&drain),
                    f.in_flight.handle(),
                )
            }
            .context("queue_submit(release)")
        });
        if let Err(e) = drained {
            warn!("vk: slot {slot}: {e:#}; rebuilding its sync objects");
            unsafe { d.device_wait_idle() }.ok();
            f.in_flight = Fence::new(&self.device, true)?;
            f.image_available = Semaphore::new(&self.device)?;
        }
        Ok(())
    }

    /// Resets and begins the current slot's command buffer.
    pub fn begin_recording(&mut self) -> Result<vk::CommandBuffer> {
        let slot = self.slots.begin_recording()?;
        let cmd = self.frames[slot].cmd;
        let d = self.device.raw();
        unsafe { d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
            .context("reset_command_buffer")?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe { d.begin_command_buffer(cmd, &begin) }.context("begin_command_buffer")?;
        Ok(cmd)
    }

    /// Ends and submits the current slot, then advances to the next one.
    /// Returns the semaphore presentation must wait on. On error the slot is
    /// left `Recording`; the caller hands it back with `release_acquired`.
    pub fn submit(&mut self) -> Result<vk::Semaphore> {
        let d = self.device.raw();
        let f = &self.frames[self.slots.current()];
        unsafe { d.end_command_buffer(f.cmd) }.context("end_command_buffer")?;

        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let wait = f.image_available.handle();
        let signal = f.render_finished.handle();
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &f.cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        f.in_flight.reset()?;
        unsafe {
            d.queue_submit(
                self.device.queue(),
                std::slice::from_ref(&submit),
                f.in_flight.handle(),
            )
        }
        .context("queue_submit")?;
        self.slots.submitted()?;
        Ok(signal)
    }
}

impl Drop for FrameResourceSet {
    fn drop(&mut self) {
        let d = self.device.raw();
        unsafe {
            d.device_wait_idle().ok();
            let cmds: Vec<vk::CommandBuffer> = self.frames.iter().map(|f| f.cmd).collect();
            d.free_command_buffers(self.device.command_pool(), &cmds);
        }
    }
}
