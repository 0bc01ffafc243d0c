//! Descriptor sets for sampled images.
//!
//! Every shader input here is a combined image sampler, so the layout builder
//! and pool only deal in that descriptor type.

use crate::error::Result;
use ash::vk;

const SAMPLED: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

/// Collects combined image sampler bindings for one set layout.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sampled_image(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(SAMPLED)
                .descriptor_count(1)
                .stage_flags(stages),
        );
        self
    }

    /// `count` bindings numbered from `first`.
    pub fn sampled_images(self, first: u32, count: u32, stages: vk::ShaderStageFlags) -> Self {
        (first..first + count).fold(self, |builder, binding| builder.sampled_image(binding, stages))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        Ok(device.create_descriptor_set_layout(
            &vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings),
            None,
        )?)
    }
}

/// Fixed-size pool of combined image sampler sets.
///
/// Sets are never freed individually; the pool is recreated instead.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Room for `sets` sets with `images_per_set` samplers each.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn for_sampled_images(
        device: &ash::Device,
        sets: u32,
        images_per_set: u32,
    ) -> Result<Self> {
        let sets = sets.max(1);
        let sizes = [vk::DescriptorPoolSize {
            ty: SAMPLED,
            descriptor_count: sets * images_per_set.max(1),
        }];
        let pool = device.create_descriptor_pool(
            &vk::DescriptorPoolCreateInfo::default()
                .max_sets(sets)
                .pool_sizes(&sizes),
            None,
        )?;
        Ok(Self { pool })
    }

    /// One set per entry of `layouts`.
    ///
    /// # Safety
    /// The layouts must belong to `device`.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        Ok(device.allocate_descriptor_sets(
            &vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.pool)
                .set_layouts(layouts),
        )?)
    }

    /// # Safety
    /// No set from the pool may be referenced by a pending command buffer.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// Point `binding` of `set` at an image view read through `sampler`.
///
/// # Safety
/// `set` must not be in use by a pending command buffer.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    sampler: vk::Sampler,
    view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let image = [vk::DescriptorImageInfo {
        sampler,
        image_view: view,
        image_layout: layout,
    }];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(SAMPLED)
        .image_info(&image);
    device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_images_numbers_bindings_consecutively() {
        let builder = DescriptorSetLayoutBuilder::new().sampled_images(2, 3, vk::ShaderStageFlags::FRAGMENT);
        let bindings: Vec<u32> = builder.bindings.iter().map(|b| b.binding).collect();
        assert_eq!(bindings, [2, 3, 4]);
        assert!(builder.bindings.iter().all(|b| b.descriptor_type == SAMPLED));
    }

    #[test]
    fn empty_builder() {
        assert!(DescriptorSetLayoutBuilder::new().is_empty());
    }
}
