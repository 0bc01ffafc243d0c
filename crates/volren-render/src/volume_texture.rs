//! Staged upload of the density volume into a 3D texture.
//!
//! The upload is recorded and submitted once, then polled every frame. The
//! staging buffer stays alive until the fence reports completion.

use ash::vk;
use gpu_allocator::MemoryLocation;
use volren_gpu::command::{end_command_buffer, submit, CommandPool};
use volren_gpu::descriptors::{write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder};
use volren_gpu::error::{GpuError, Result};
use volren_gpu::memory::{full_subresource_range, GpuAllocator, GpuBuffer, GpuImage};
use volren_gpu::sync::{create_fence, fence_signaled, wait_for_fence};
use volren_gpu::GpuContext;
use volren_volume::VolumeData;

/// Format of the density texture, one byte per voxel.
pub const VOLUME_FORMAT: vk::Format = vk::Format::R8_UNORM;

/// Progress of a volume upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Commands recorded, not yet on the queue.
    Recorded,
    /// Submitted, fence not yet signaled.
    Submitted,
    /// Fence signaled, staging buffer still held.
    Complete,
    /// Staging released and texture handed out.
    Retired,
}

impl UploadPhase {
    /// Move to `next`, rejecting anything but the single forward step.
    pub fn advance(self, next: Self) -> Result<Self> {
        match (self, next) {
            (Self::Recorded, Self::Submitted)
            | (Self::Submitted, Self::Complete)
            | (Self::Complete, Self::Retired) => Ok(next),
            _ => Err(GpuError::InvalidState(format!(
                "Volume upload cannot go from {self:?} to {next:?}"
            ))),
        }
    }

    /// Whether the texture may be sampled.
    pub fn is_resident(self) -> bool {
        matches!(self, Self::Complete | Self::Retired)
    }
}

/// Device-resident density texture in `SHADER_READ_ONLY_OPTIMAL`.
pub struct VolumeTexture {
    image: GpuImage,
    view: vk::ImageView,
}

impl VolumeTexture {
    /// Record and submit the copy of `volume` into a new 3D image.
    ///
    /// Fails with [`GpuError::LimitExceeded`] when any edge exceeds the
    /// device's 3D image limit.
    ///
    /// # Safety
    /// The command pool must belong to the graphics queue family of `gpu`.
    pub unsafe fn begin_upload(
        gpu: &GpuContext,
        pool: &CommandPool,
        volume: &VolumeData,
    ) -> Result<VolumeUpload> {
        let extent = volume.extent();
        let limit = gpu.capabilities().max_image_dimension_3d;
        check_extent_limit(extent.max_dimension(), limit)?;

        let device = gpu.device();
        let mut allocator = gpu.allocator().lock();

        let mut staging = allocator.create_buffer(
            volume.byte_len(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "volume_staging",
        )?;
        if let Err(e) = staging.write_bytes(0, volume.voxels()) {
            allocator.free_buffer(&mut staging)?;
            return Err(e);
        }

        let image_extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_3D)
            .format(VOLUME_FORMAT)
            .extent(image_extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = match allocator.create_image(&image_info, MemoryLocation::GpuOnly, "volume")
        {
            Ok(image) => image,
            Err(e) => {
                allocator.free_buffer(&mut staging)?;
                return Err(e);
            }
        };

        let mut upload = VolumeUpload {
            phase: UploadPhase::Recorded,
            texture: None,
            staging: Some(staging),
            command_buffer: vk::CommandBuffer::null(),
            command_pool: pool.handle(),
            fence: vk::Fence::null(),
        };

        let view = match image.create_view(device, vk::ImageViewType::TYPE_3D, vk::ImageAspectFlags::COLOR) {
            Ok(view) => view,
            Err(e) => {
                if let Err(free_error) = allocator.free_image(&mut image) {
                    tracing::error!("Failed to free volume image: {free_error}");
                }
                drop(allocator);
                upload.destroy(gpu)?;
                return Err(e);
            }
        };
        upload.texture = Some(Self { image, view });
        drop(allocator);

        if let Err(e) = upload.record_and_submit(gpu, pool) {
            upload.destroy(gpu)?;
            return Err(e);
        }

        tracing::info!(
            "Uploading {}x{}x{} volume ({} bytes)",
            extent.width,
            extent.height,
            extent.depth,
            volume.byte_len()
        );

        Ok(upload)
    }

    /// View for sampling in shaders.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.image.extent
    }

    /// Destroy the view and free the image.
    ///
    /// # Safety
    /// The texture must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        device.destroy_image_view(self.view, None);
        self.view = vk::ImageView::null();
        allocator.free_image(&mut self.image)
    }
}

/// Fails with [`GpuError::LimitExceeded`] when a volume edge exceeds `limit`,
/// usually the device's `max_image_dimension_3d`.
pub fn check_extent_limit(max_dimension: u32, limit: u32) -> Result<()> {
    if max_dimension > limit {
        return Err(GpuError::LimitExceeded(format!(
            "volume edge {max_dimension} exceeds maxImageDimension3D {limit}"
        )));
    }
    Ok(())
}

/// In-flight upload of a [`VolumeTexture`].
pub struct VolumeUpload {
    phase: UploadPhase,
    texture: Option<VolumeTexture>,
    staging: Option<GpuBuffer>,
    command_buffer: vk::CommandBuffer,
    command_pool: vk::CommandPool,
    fence: vk::Fence,
}

impl VolumeUpload {
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Whether the staging buffer is still held.
    pub fn holds_staging(&self) -> bool {
        self.staging.is_some()
    }

    unsafe fn record_and_submit(&mut self, gpu: &GpuContext, pool: &CommandPool) -> Result<()> {
        let device = gpu.device();
        let (Some(texture), Some(staging)) = (&self.texture, &self.staging) else {
            return Err(GpuError::InvalidState("Upload has no resources".to_string()));
        };

        let cmd = pool.begin_one_time(device)?;
        self.command_buffer = cmd;

        let range = full_subresource_range(vk::ImageAspectFlags::COLOR);

        let to_transfer = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::COPY)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image(texture.image.image)
            .subresource_range(range);
        device.cmd_pipeline_barrier2(
            cmd,
            &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&to_transfer)),
        );

        // Tightly packed: x fastest, then y, then z
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(texture.image.extent);
        device.cmd_copy_buffer_to_image(
            cmd,
            staging.buffer,
            texture.image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        let to_shader_read = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COPY)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags2::SHADER_SAMPLED_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image(texture.image.image)
            .subresource_range(range);
        device.cmd_pipeline_barrier2(
            cmd,
            &vk::DependencyInfo::default()
                .image_memory_barriers(std::slice::from_ref(&to_shader_read)),
        );

        end_command_buffer(device, cmd)?;

        self.fence = create_fence(device, false)?;
        submit(device, gpu.graphics_queue(), &[cmd], &[], &[], self.fence)?;
        self.phase = self.phase.advance(UploadPhase::Submitted)?;

        Ok(())
    }

    /// Check the fence without blocking.
    ///
    /// # Safety
    /// The device must be the one the upload was submitted on.
    pub unsafe fn poll(&mut self, device: &ash::Device) -> Result<UploadPhase> {
        if self.phase == UploadPhase::Submitted && fence_signaled(device, self.fence)? {
            self.phase = self.phase.advance(UploadPhase::Complete)?;
            tracing::debug!("Volume upload complete");
        }
        Ok(self.phase)
    }

    /// Block for up to `timeout_ns` for the upload to complete.
    ///
    /// A timeout is not an error; the returned phase stays `Submitted`.
    ///
    /// # Safety
    /// The device must be the one the upload was submitted on.
    pub unsafe fn wait(&mut self, device: &ash::Device, timeout_ns: u64) -> Result<UploadPhase> {
        if self.phase != UploadPhase::Submitted {
            return Ok(self.phase);
        }
        if wait_for_fence(device, self.fence, timeout_ns)? {
            self.phase = self.phase.advance(UploadPhase::Complete)?;
        }
        Ok(self.phase)
    }

    /// Release the staging resources and hand out the texture.
    ///
    /// Errors unless the upload is [`UploadPhase::Complete`]; the staging
    /// buffer is kept in that case.
    ///
    /// # Safety
    /// The device must be the one the upload was submitted on.
    pub unsafe fn finish(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<VolumeTexture> {
        self.phase.advance(UploadPhase::Retired)?;

        self.release_submission(device, allocator)?;
        let texture = self
            .texture
            .take()
            .ok_or_else(|| GpuError::InvalidState("Volume texture already taken".to_string()))?;
        self.phase = UploadPhase::Retired;

        tracing::debug!("Volume staging buffer released");
        Ok(texture)
    }

    unsafe fn release_submission(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        if let Some(mut staging) = self.staging.take() {
            allocator.free_buffer(&mut staging)?;
        }
        if self.command_buffer != vk::CommandBuffer::null() {
            device.free_command_buffers(self.command_pool, &[self.command_buffer]);
            self.command_buffer = vk::CommandBuffer::null();
        }
        if self.fence != vk::Fence::null() {
            device.destroy_fence(self.fence, None);
            self.fence = vk::Fence::null();
        }
        Ok(())
    }

    /// Tear down an upload in any phase, waiting for the GPU if needed.
    ///
    /// # Safety
    /// The GPU context must be the one the upload was submitted on.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        if self.phase == UploadPhase::Submitted {
            wait_for_fence(device, self.fence, u64::MAX)?;
        }
        let mut allocator = gpu.allocator().lock();
        self.release_submission(device, &mut allocator)?;
        if let Some(mut texture) = self.texture.take() {
            texture.destroy(device, &mut allocator)?;
        }
        Ok(())
    }
}

/// Descriptor set through which the lighting pass samples the volume.
///
/// The set is only written once the upload is complete; until then
/// [`VolumeDescriptor::set`] is `None` and the volume must not be sampled.
pub struct VolumeDescriptor {
    layout: vk::DescriptorSetLayout,
    pool: DescriptorPool,
    set: Option<vk::DescriptorSet>,
}

impl VolumeDescriptor {
    /// Create the set layout (binding 0, 3D combined image sampler) and pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let layout = DescriptorSetLayoutBuilder::new()
            .sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;
        let pool = match DescriptorPool::for_sampled_images(device, 1, 1) {
            Ok(pool) => pool,
            Err(e) => {
                device.destroy_descriptor_set_layout(layout, None);
                return Err(e);
            }
        };
        Ok(Self {
            layout,
            pool,
            set: None,
        })
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// The written set, once the volume is resident.
    pub fn set(&self) -> Option<vk::DescriptorSet> {
        self.set
    }

    /// Point the set at a resident texture.
    ///
    /// # Safety
    /// The texture upload must be complete and the sampler valid.
    pub unsafe fn bind(
        &mut self,
        device: &ash::Device,
        texture: &VolumeTexture,
        sampler: vk::Sampler,
    ) -> Result<vk::DescriptorSet> {
        let set = match self.set {
            Some(set) => set,
            None => self
                .pool
                .allocate(device, &[self.layout])?
                .into_iter()
                .next()
                .ok_or_else(|| GpuError::InvalidState("No volume descriptor set".to_string()))?,
        };
        write_combined_image_sampler(
            device,
            set,
            0,
            sampler,
            texture.view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        self.set = Some(set);
        Ok(set)
    }

    /// Destroy the pool and layout.
    ///
    /// # Safety
    /// The set must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.pool.destroy(device);
        device.destroy_descriptor_set_layout(self.layout, None);
        self.set = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volren_volume::{CrossHair, VolumeExtent};

    #[test]
    fn phases_advance_in_order() {
        let phase = UploadPhase::Recorded;
        let phase = phase.advance(UploadPhase::Submitted).unwrap();
        let phase = phase.advance(UploadPhase::Complete).unwrap();
        assert!(phase.is_resident());
        let phase = phase.advance(UploadPhase::Retired).unwrap();
        assert_eq!(phase, UploadPhase::Retired);
    }

    #[test]
    fn cannot_retire_before_completion() {
        for phase in [UploadPhase::Recorded, UploadPhase::Submitted] {
            assert!(matches!(
                phase.advance(UploadPhase::Retired),
                Err(GpuError::InvalidState(_))
            ));
            assert!(!phase.is_resident());
        }
    }

    #[test]
    fn no_skipping_or_going_back() {
        assert!(UploadPhase::Recorded.advance(UploadPhase::Complete).is_err());
        assert!(UploadPhase::Complete.advance(UploadPhase::Submitted).is_err());
        assert!(UploadPhase::Retired.advance(UploadPhase::Retired).is_err());
    }

    /// Context without a surface, or `None` on machines without a Vulkan 1.3
    /// device.
    fn headless_gpu() -> Option<GpuContext> {
        match volren_gpu::GpuContextBuilder::new()
            .app_name("volren-render-tests")
            .validation(false)
            .build()
        {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn upload_keeps_staging_until_complete() {
        let Some(gpu) = headless_gpu() else {
            return;
        };
        let device = gpu.device();
        let extent = VolumeExtent::cube(16);
        let volume = VolumeData::generate(extent, &CrossHair::for_extent(extent)).unwrap();

        unsafe {
            let pool = CommandPool::new(
                device,
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::empty(),
            )
            .unwrap();
            let mut upload = VolumeTexture::begin_upload(&gpu, &pool, &volume).unwrap();
            assert_eq!(upload.phase(), UploadPhase::Submitted);

            let early = upload.finish(device, &mut gpu.allocator().lock());
            assert!(matches!(early, Err(GpuError::InvalidState(_))));
            assert!(upload.holds_staging());
            assert_eq!(upload.phase(), UploadPhase::Submitted);

            assert_eq!(upload.wait(device, u64::MAX).unwrap(), UploadPhase::Complete);
            assert_eq!(upload.poll(device).unwrap(), UploadPhase::Complete);

            let mut texture = upload.finish(device, &mut gpu.allocator().lock()).unwrap();
            assert!(!upload.holds_staging());
            assert_eq!(upload.phase(), UploadPhase::Retired);
            assert_eq!(texture.extent().depth, 16);

            texture.destroy(device, &mut gpu.allocator().lock()).unwrap();
            upload.destroy(&gpu).unwrap();
            pool.destroy(device);
        }
    }

    #[test]
    fn extent_limit() {
        assert!(check_extent_limit(256, 2048).is_ok());
        assert!(check_extent_limit(2048, 2048).is_ok());
        assert!(matches!(
            check_extent_limit(4096, 2048),
            Err(GpuError::LimitExceeded(_))
        ));
    }
}
