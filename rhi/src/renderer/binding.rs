//! Shaders, root signatures, descriptor sets and pipelines.
//!
//! Shader reflection is supplied by the caller together with the code. The
//! root signature merges the reflection of its shaders by resource name and
//! is the layout every descriptor set and pipeline is checked against.

use std::collections::HashMap;

use crate::error::{RhiError, RhiResult};
use crate::handle::{DescriptorSetHandle, PipelineHandle, RootSignatureHandle, ShaderHandle};
use crate::types::{
    BinaryShaderDesc, DescriptorData, DescriptorResources, DescriptorSetDesc, DescriptorType,
    DescriptorUpdateFrequency, GraphicsPipelineDesc, ImageFormat, PipelineDesc, PipelineReflection,
    PipelineType, RootSignatureDesc, RootSignatureFlags, ShaderDesc, ShaderResource, ShaderStage,
    MAX_RENDER_TARGET_ATTACHMENTS, MAX_ROOT_CONSTANTS_PER_ROOTSIGNATURE, MAX_VERTEX_BINDINGS,
};

use super::objects::{
    DescriptorSetObject, Objects, PipelineObject, RootSignatureObject, ShaderObject,
};
use super::Device;

fn check_reflection(stages: ShaderStage, reflection: &PipelineReflection) -> RhiResult<PipelineReflection> {
    if !reflection.shader_stages.is_empty() && reflection.shader_stages != stages {
        return Err(RhiError::BindingMismatch(format!(
            "reflection covers {:?}, shader provides {:?}",
            reflection.shader_stages, stages
        )));
    }
    let mut reflection = reflection.clone();
    reflection.shader_stages = stages;
    for resource in &mut reflection.resources {
        if resource.used_stages.is_empty() {
            resource.used_stages = stages;
        } else if !stages.contains(resource.used_stages) {
            return Err(RhiError::BindingMismatch(format!(
                "resource '{}' is used by {:?} which the shader does not provide",
                resource.name, resource.used_stages
            )));
        }
        if resource.descriptor_type.contains(DescriptorType::ROOT_CONSTANT) {
            if resource.size == 0 {
                return Err(RhiError::InvalidParameter(format!(
                    "root constant '{}' has zero size",
                    resource.name
                )));
            }
        } else if DescriptorUpdateFrequency::from_set(resource.set).is_none() {
            return Err(RhiError::InvalidParameter(format!(
                "resource '{}' uses set {}, expected < {}",
                resource.name,
                resource.set,
                DescriptorUpdateFrequency::COUNT
            )));
        }
    }
    Ok(reflection)
}

fn check_stages(declared: ShaderStage, provided: ShaderStage) -> RhiResult<()> {
    if provided.is_empty() {
        return Err(RhiError::InvalidParameter("shader without stages".into()));
    }
    if declared != provided {
        return Err(RhiError::InvalidParameter(format!(
            "shader declares {declared:?} but provides {provided:?}"
        )));
    }
    if provided.contains(ShaderStage::COMP) && provided != ShaderStage::COMP {
        return Err(RhiError::InvalidParameter(
            "compute stage combined with graphics stages".into(),
        ));
    }
    Ok(())
}

fn entry_point(entry_point: &str) -> String {
    if entry_point.is_empty() {
        "main".to_string()
    } else {
        entry_point.to_string()
    }
}

/// Merge `resource` into `merged`, matching by name.
fn merge_resource(merged: &mut Vec<ShaderResource>, resource: &ShaderResource) -> RhiResult<()> {
    let Some(existing) = merged.iter_mut().find(|r| r.name == resource.name) else {
        merged.push(resource.clone());
        return Ok(());
    };
    if existing.descriptor_type != resource.descriptor_type
        || existing.set != resource.set
        || existing.reg != resource.reg
    {
        return Err(RhiError::BindingMismatch(format!(
            "resource '{}' declared as {:?} (set {}, reg {}) and {:?} (set {}, reg {})",
            resource.name,
            existing.descriptor_type,
            existing.set,
            existing.reg,
            resource.descriptor_type,
            resource.set,
            resource.reg
        )));
    }
    existing.used_stages |= resource.used_stages;
    existing.size = existing.size.max(resource.size);
    Ok(())
}

/// Returns true if resources of `kind` can be written to a binding of type `ty`.
fn kind_matches(resources: &DescriptorResources, ty: DescriptorType) -> bool {
    match resources {
        DescriptorResources::Textures(_) => ty.is_texture(),
        DescriptorResources::Samplers(_) => ty.contains(DescriptorType::SAMPLER),
        DescriptorResources::Buffers { .. } => ty.is_buffer(),
        DescriptorResources::Pipelines(_) => ty.contains(DescriptorType::INDIRECT_BUFFER),
        DescriptorResources::DescriptorSets(_) => ty.contains(DescriptorType::BUFFER),
        DescriptorResources::AccelerationStructures(_) => ty.contains(DescriptorType::RAY_TRACING),
    }
}

impl Objects {
    fn check_live_resources(&self, resources: &DescriptorResources) -> RhiResult<()> {
        match resources {
            DescriptorResources::Textures(textures) => {
                for &texture in textures {
                    self.textures.get(texture)?;
                }
            }
            DescriptorResources::Samplers(samplers) => {
                for &sampler in samplers {
                    self.samplers.get(sampler)?;
                }
            }
            DescriptorResources::Buffers { buffers, offsets, sizes } => {
                for list in [offsets, sizes].into_iter().flatten() {
                    if list.len() != buffers.len() {
                        return Err(RhiError::InvalidParameter(format!(
                            "{} offsets/sizes for {} buffers",
                            list.len(),
                            buffers.len()
                        )));
                    }
                }
                for (i, &buffer) in buffers.iter().enumerate() {
                    let size = self.buffers.get(buffer)?.desc.size;
                    let offset = offsets.as_ref().map_or(0, |o| o[i]);
                    let range = sizes.as_ref().map_or(0, |s| s[i]);
                    if offset.saturating_add(range) > size {
                        return Err(RhiError::InvalidParameter(format!(
                            "buffer range {offset}+{range} exceeds buffer size {size}"
                        )));
                    }
                }
            }
            DescriptorResources::Pipelines(pipelines) => {
                for &pipeline in pipelines {
                    self.pipelines.get(pipeline)?;
                }
            }
            DescriptorResources::DescriptorSets(sets) => {
                for &set in sets {
                    self.descriptor_sets.get(set)?;
                }
            }
            DescriptorResources::AccelerationStructures(_) => {
                return Err(RhiError::FeatureNotSupported(
                    "acceleration structure descriptors".into(),
                ));
            }
        }
        Ok(())
    }

    /// Check that every resource `shader` declares exists in `root` with the same layout.
    fn check_compatible(&self, shader: ShaderHandle, root: &RootSignatureObject) -> RhiResult<()> {
        // The layout was merged from these shaders
        if root.shaders.contains(&shader) {
            return Ok(());
        }
        let shader = self.shaders.get(shader)?;
        for resource in &shader.reflection.resources {
            let declared = if resource.descriptor_type.contains(DescriptorType::ROOT_CONSTANT) {
                root.root_constants.iter().find(|r| r.name == resource.name)
            } else {
                root.descriptor(&resource.name)
            };
            let compatible = declared.is_some_and(|d| {
                d.descriptor_type == resource.descriptor_type
                    && d.set == resource.set
                    && d.reg == resource.reg
                    && d.size >= resource.size
            });
            if !compatible {
                return Err(RhiError::BindingMismatch(format!(
                    "shader '{}' resource '{}' is not part of the root signature layout",
                    shader.name, resource.name
                )));
            }
        }
        Ok(())
    }
}

impl Device {
    /// Create a shader from source stages and their reflection.
    pub fn add_shader(&self, desc: &ShaderDesc) -> RhiResult<ShaderHandle> {
        check_stages(desc.stages, desc.provided_stages())?;
        let mut code_size = 0;
        let mut entry_points = Vec::new();
        let mut name = None;
        for (stage, stage_desc) in desc.stage_descs() {
            if stage_desc.code.trim().is_empty() {
                return Err(RhiError::InvalidParameter(format!("{stage:?} stage has no code")));
            }
            code_size += stage_desc.code.len();
            entry_points.push(entry_point(&stage_desc.entry_point));
            name.get_or_insert_with(|| stage_desc.name.clone());
        }
        let reflection = check_reflection(desc.stages, &desc.reflection)?;
        let handle = self.objects.write().shaders.insert(ShaderObject {
            name: name.unwrap_or_default(),
            stages: desc.stages,
            entry_points,
            reflection,
            code_size,
        });
        log::trace!("Added shader {:?} ({:?}, {} bytes of source)", handle, desc.stages, code_size);
        Ok(handle)
    }

    /// Create a shader from byte code stages and their reflection.
    pub fn add_shader_binary(&self, desc: &BinaryShaderDesc) -> RhiResult<ShaderHandle> {
        check_stages(desc.stages, desc.provided_stages())?;
        let mut code_size = 0;
        let mut entry_points = Vec::new();
        for (stage, stage_desc) in desc.stage_descs() {
            if stage_desc.byte_code.is_empty() {
                return Err(RhiError::InvalidParameter(format!("{stage:?} stage has no byte code")));
            }
            code_size += stage_desc.byte_code.len();
            entry_points.push(entry_point(&stage_desc.entry_point));
        }
        let reflection = check_reflection(desc.stages, &desc.reflection)?;
        let handle = self.objects.write().shaders.insert(ShaderObject {
            name: "binary shader".to_string(),
            stages: desc.stages,
            entry_points,
            reflection,
            code_size,
        });
        log::trace!("Added binary shader {:?} ({:?}, {} bytes)", handle, desc.stages, code_size);
        Ok(handle)
    }

    /// Destroy a shader no pipeline uses.
    pub fn remove_shader(&self, shader: ShaderHandle) -> RhiResult<()> {
        let removed = self.objects.write().shaders.remove(shader)?;
        log::trace!(
            "Removed shader '{}' ({} entry points, {} bytes)",
            removed.name,
            removed.entry_points.len(),
            removed.code_size
        );
        Ok(())
    }

    /// Reflection of a shader.
    pub fn shader_get_pipeline_reflection(&self, shader: ShaderHandle) -> RhiResult<PipelineReflection> {
        Ok(self.objects.read().shaders.get(shader)?.reflection.clone())
    }

    /// Create a root signature from the merged layout of `desc.shaders`.
    pub fn add_root_signature(&self, desc: &RootSignatureDesc) -> RhiResult<RootSignatureHandle> {
        if desc.shaders.is_empty() {
            return Err(RhiError::InvalidParameter("root signature without shaders".into()));
        }
        let mut guard = self.objects.write();
        let objects = &mut *guard;

        let mut descriptors = Vec::new();
        let mut root_constants = Vec::new();
        let mut stages = ShaderStage::empty();
        for &shader in &desc.shaders {
            let shader = objects.shaders.get(shader)?;
            stages |= shader.stages;
            for resource in &shader.reflection.resources {
                if resource.descriptor_type.contains(DescriptorType::ROOT_CONSTANT) {
                    merge_resource(&mut root_constants, resource)?;
                } else {
                    merge_resource(&mut descriptors, resource)?;
                }
            }
        }
        if root_constants.len() > MAX_ROOT_CONSTANTS_PER_ROOTSIGNATURE {
            return Err(RhiError::InvalidParameter(format!(
                "{} root constants, maximum is {MAX_ROOT_CONSTANTS_PER_ROOTSIGNATURE}",
                root_constants.len()
            )));
        }
        let pipeline_type = if stages.contains(ShaderStage::COMP) {
            if stages != ShaderStage::COMP {
                return Err(RhiError::InvalidParameter(
                    "root signature mixes compute and graphics shaders".into(),
                ));
            }
            PipelineType::Compute
        } else {
            PipelineType::Graphics
        };

        for (i, (name, sampler)) in desc.static_samplers.iter().enumerate() {
            objects.samplers.get(*sampler)?;
            if desc.static_samplers[..i].iter().any(|(n, _)| n == name) {
                return Err(RhiError::InvalidParameter(format!(
                    "static sampler '{name}' given twice"
                )));
            }
            let declared = descriptors.iter().find(|r| &r.name == name);
            if !declared.is_some_and(|r| r.descriptor_type.contains(DescriptorType::SAMPLER)) {
                return Err(RhiError::BindingMismatch(format!(
                    "static sampler '{name}' does not match a declared sampler"
                )));
            }
        }
        for (_, sampler) in &desc.static_samplers {
            objects.samplers.retain(*sampler)?;
        }

        let handle = objects.root_signatures.insert(RootSignatureObject {
            pipeline_type,
            shaders: desc.shaders.clone(),
            descriptors,
            root_constants,
            static_samplers: desc.static_samplers.clone(),
            max_bindless_textures: desc.max_bindless_textures,
            flags: desc.flags,
        });
        log::trace!(
            "Added root signature {:?} ({:?}, flags {:?})",
            handle,
            pipeline_type,
            desc.flags
        );
        Ok(handle)
    }

    /// Destroy a root signature no set, pipeline or command signature uses.
    pub fn remove_root_signature(&self, root_signature: RootSignatureHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let removed = objects.root_signatures.remove(root_signature)?;
        for (_, sampler) in removed.static_samplers {
            objects.samplers.release(sampler);
        }
        Ok(())
    }

    /// Pipeline type a root signature was derived for.
    pub fn root_signature_pipeline_type(&self, root_signature: RootSignatureHandle) -> RhiResult<PipelineType> {
        Ok(self.objects.read().root_signatures.get(root_signature)?.pipeline_type)
    }

    /// Allocate `desc.max_sets` binding tables at one update frequency.
    pub fn add_descriptor_set(&self, desc: &DescriptorSetDesc) -> RhiResult<DescriptorSetHandle> {
        if desc.max_sets == 0 {
            return Err(RhiError::InvalidParameter("descriptor set with zero tables".into()));
        }
        let mut objects = self.objects.write();
        let root = objects.root_signatures.get(desc.root_signature)?;
        if root.updatable(desc.update_frequency).next().is_none() {
            return Err(RhiError::BindingMismatch(format!(
                "root signature declares no descriptors at {:?}",
                desc.update_frequency
            )));
        }
        objects.root_signatures.retain(desc.root_signature)?;
        let handle = objects.descriptor_sets.insert(DescriptorSetObject {
            desc: *desc,
            tables: vec![HashMap::new(); desc.max_sets as usize],
        });
        log::trace!(
            "Added descriptor set {:?} ({:?}, {} tables)",
            handle,
            desc.update_frequency,
            desc.max_sets
        );
        Ok(handle)
    }

    /// Release a descriptor set pool.
    pub fn remove_descriptor_set(&self, set: DescriptorSetHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let removed = objects.descriptor_sets.remove(set)?;
        objects.root_signatures.release(removed.desc.root_signature);
        Ok(())
    }

    /// Write bindings of table `index` by name.
    ///
    /// The whole update is rejected if any entry does not match the layout.
    pub fn update_descriptor_set(&self, index: u32, set: DescriptorSetHandle, params: &[DescriptorData]) -> RhiResult<()> {
        let mut guard = self.objects.write();
        let objects = &mut *guard;
        let set_object = objects.descriptor_sets.get(set)?;
        let desc = set_object.desc;
        if index >= desc.max_sets {
            return Err(RhiError::InvalidParameter(format!(
                "descriptor table {index} out of range ({} tables)",
                desc.max_sets
            )));
        }
        let root = objects.root_signatures.get(desc.root_signature)?;
        for param in params {
            if root.is_static_sampler(&param.name) {
                return Err(RhiError::BindingMismatch(format!(
                    "'{}' is a static sampler and cannot be updated",
                    param.name
                )));
            }
            let Some(declared) = root
                .updatable(desc.update_frequency)
                .find(|r| r.name == param.name)
            else {
                return Err(RhiError::BindingMismatch(format!(
                    "no descriptor '{}' at {:?}",
                    param.name, desc.update_frequency
                )));
            };
            if !kind_matches(&param.resources, declared.descriptor_type) {
                return Err(RhiError::BindingMismatch(format!(
                    "'{}' is declared as {:?}, got {}",
                    param.name,
                    declared.descriptor_type,
                    param.resources.kind_name()
                )));
            }
            if param.resources.is_empty() {
                return Err(RhiError::InvalidParameter(format!(
                    "no resources written to '{}'",
                    param.name
                )));
            }
            let capacity = if declared.size == 0 {
                root.max_bindless_textures
            } else {
                declared.size
            };
            let end = u64::from(param.array_offset) + param.resources.len() as u64;
            if end > u64::from(capacity) {
                return Err(RhiError::BindingMismatch(format!(
                    "'{}' holds {capacity} descriptors, update writes up to {end}",
                    param.name
                )));
            }
            objects.check_live_resources(&param.resources)?;
        }

        let table = &mut objects.descriptor_sets.get_mut(set)?.tables[index as usize];
        for param in params {
            table.insert(param.name.clone(), param.resources.clone());
        }
        Ok(())
    }

    /// Create an immutable pipeline.
    pub fn add_pipeline(&self, desc: &PipelineDesc) -> RhiResult<PipelineHandle> {
        let shader = desc.shader();
        let root_signature = desc.root_signature();
        let mut guard = self.objects.write();
        let objects = &mut *guard;

        let stages = objects.shaders.get(shader)?.stages;
        let root = objects.root_signatures.get(root_signature)?;
        if root.flags.contains(RootSignatureFlags::LOCAL) {
            return Err(RhiError::FeatureNotSupported(
                "local root signatures only bind ray tracing shader records".into(),
            ));
        }
        if root.pipeline_type != desc.pipeline_type() {
            return Err(RhiError::BindingMismatch(format!(
                "{:?} pipeline with a {:?} root signature",
                desc.pipeline_type(),
                root.pipeline_type
            )));
        }
        objects.check_compatible(shader, root)?;
        match desc {
            PipelineDesc::Compute(_) => {
                if !stages.contains(ShaderStage::COMP) {
                    return Err(RhiError::InvalidParameter(
                        "compute pipeline shader has no compute stage".into(),
                    ));
                }
            }
            PipelineDesc::Graphics(graphics) => {
                if !stages.contains(ShaderStage::VERT | ShaderStage::FRAG) {
                    return Err(RhiError::InvalidParameter(
                        "graphics pipeline shader needs vertex and fragment stages".into(),
                    ));
                }
                self.check_graphics_state(graphics)?;
            }
        }

        objects.shaders.retain(shader)?;
        objects.root_signatures.retain(root_signature)?;
        let handle = objects.pipelines.insert(PipelineObject {
            desc: desc.clone(),
            pipeline_type: desc.pipeline_type(),
        });
        log::trace!("Added {:?} pipeline {:?}", desc.pipeline_type(), handle);
        Ok(handle)
    }

    fn check_graphics_state(&self, desc: &GraphicsPipelineDesc) -> RhiResult<()> {
        if desc.render_target_count() > MAX_RENDER_TARGET_ATTACHMENTS {
            return Err(RhiError::InvalidParameter(format!(
                "{} color attachments, maximum is {MAX_RENDER_TARGET_ATTACHMENTS}",
                desc.render_target_count()
            )));
        }
        for &format in &desc.color_formats {
            if !self.can_color_write_to(format) {
                return Err(RhiError::FeatureNotSupported(format!(
                    "{format:?} is not a color target format"
                )));
            }
        }
        if desc.depth_stencil_format != ImageFormat::Undefined && !desc.depth_stencil_format.is_depth() {
            return Err(RhiError::InvalidParameter(format!(
                "{:?} is not a depth format",
                desc.depth_stencil_format
            )));
        }
        if let Some(layout) = &desc.vertex_layout {
            if !layout.fits_limits() {
                return Err(RhiError::InvalidParameter(format!(
                    "{} vertex attributes exceed the limit",
                    layout.attribs.len()
                )));
            }
            if let Some(attrib) = layout
                .attribs
                .iter()
                .find(|a| a.binding as usize >= MAX_VERTEX_BINDINGS)
            {
                return Err(RhiError::InvalidParameter(format!(
                    "vertex attribute at location {} uses binding {}, maximum is {}",
                    attrib.location,
                    attrib.binding,
                    MAX_VERTEX_BINDINGS - 1
                )));
            }
        }
        Ok(())
    }

    /// Destroy a pipeline.
    pub fn remove_pipeline(&self, pipeline: PipelineHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let removed = objects.pipelines.remove(pipeline)?;
        objects.shaders.release(removed.desc.shader());
        objects.root_signatures.release(removed.root_signature());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::renderer::{Renderer, RendererDesc};
    use crate::types::{
        BufferDesc, ComputePipelineDesc, DescriptorData, DescriptorSetDesc, DescriptorType,
        DescriptorUpdateFrequency, GraphicsPipelineDesc, ImageFormat, PipelineDesc,
        PipelineReflection, RootSignatureDesc, RootSignatureFlags, SamplerDesc, ShaderDesc,
        ShaderResource, ShaderStage, ShaderStageDesc, TextureDesc,
    };
    use crate::RhiError;

    fn textured_shader() -> ShaderDesc {
        let stages = ShaderStage::VERT | ShaderStage::FRAG;
        ShaderDesc {
            stages,
            vert: Some(ShaderStageDesc::new("test.vert", "void main() {}")),
            frag: Some(ShaderStageDesc::new("test.frag", "void main() {}")),
            reflection: PipelineReflection {
                resources: vec![
                    ShaderResource::new("texture0", DescriptorType::TEXTURE, 0, 0, ShaderStage::FRAG),
                    ShaderResource::new("samplerState0", DescriptorType::SAMPLER, 0, 1, ShaderStage::FRAG),
                    ShaderResource::root_constant("UniformBlockRootConstant", 64, ShaderStage::VERT),
                ],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_shader_stage_mismatch_rejected() {
        let renderer = Renderer::new("binding-test", &RendererDesc::default()).unwrap();
        let mut desc = textured_shader();
        desc.stages = ShaderStage::VERT;
        assert!(renderer.add_shader(&desc).is_err());

        let mut desc = textured_shader();
        desc.frag = Some(ShaderStageDesc::new("empty.frag", "  "));
        assert!(renderer.add_shader(&desc).is_err());
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_root_signature_merge_conflict() {
        let renderer = Renderer::new("binding-test", &RendererDesc::default()).unwrap();
        let first = renderer.add_shader(&textured_shader()).unwrap();
        let mut conflicting = textured_shader();
        conflicting.reflection.resources[0].descriptor_type = DescriptorType::RW_TEXTURE;
        let second = renderer.add_shader(&conflicting).unwrap();

        assert!(matches!(
            renderer.add_root_signature(&RootSignatureDesc::new(vec![first, second])),
            Err(RhiError::BindingMismatch(_))
        ));

        renderer.remove_shader(second).unwrap();
        renderer.remove_shader(first).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_descriptor_update_validation() {
        let renderer = Renderer::new("binding-test", &RendererDesc::default()).unwrap();
        let shader = renderer.add_shader(&textured_shader()).unwrap();
        let sampler = renderer.add_sampler(&SamplerDesc::default()).unwrap();
        let root = renderer
            .add_root_signature(&RootSignatureDesc::new(vec![shader]).with_static_sampler("samplerState0", sampler))
            .unwrap();
        let texture = renderer
            .add_texture(&TextureDesc::new_2d(4, 4, ImageFormat::R8G8B8A8Unorm))
            .unwrap();
        let buffer = renderer
            .add_buffer(&BufferDesc::new(16, DescriptorType::UNIFORM_BUFFER))
            .unwrap();

        assert!(renderer
            .add_descriptor_set(&DescriptorSetDesc::new(root, DescriptorUpdateFrequency::PerDraw, 1))
            .is_err());
        let set = renderer
            .add_descriptor_set(&DescriptorSetDesc::new(root, DescriptorUpdateFrequency::None, 2))
            .unwrap();

        renderer
            .update_descriptor_set(1, set, &[DescriptorData::texture("texture0", texture)])
            .unwrap();
        assert!(renderer
            .update_descriptor_set(2, set, &[DescriptorData::texture("texture0", texture)])
            .is_err());
        assert!(matches!(
            renderer.update_descriptor_set(0, set, &[DescriptorData::buffer("texture0", buffer)]),
            Err(RhiError::BindingMismatch(_))
        ));
        assert!(matches!(
            renderer.update_descriptor_set(0, set, &[DescriptorData::sampler("samplerState0", sampler)]),
            Err(RhiError::BindingMismatch(_))
        ));
        assert!(matches!(
            renderer.update_descriptor_set(0, set, &[DescriptorData::texture("missing", texture)]),
            Err(RhiError::BindingMismatch(_))
        ));

        // Dependents pin the root signature and its static sampler
        assert!(renderer.remove_root_signature(root).is_err());
        assert!(renderer.remove_sampler(sampler).is_err());

        renderer.remove_descriptor_set(set).unwrap();
        renderer.remove_buffer(buffer).unwrap();
        renderer.remove_texture(texture).unwrap();
        renderer.remove_root_signature(root).unwrap();
        renderer.remove_sampler(sampler).unwrap();
        renderer.remove_shader(shader).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_pipeline_validation() {
        let renderer = Renderer::new("binding-test", &RendererDesc::default()).unwrap();
        let shader = renderer.add_shader(&textured_shader()).unwrap();
        let root = renderer
            .add_root_signature(&RootSignatureDesc::new(vec![shader]))
            .unwrap();

        let mut graphics = GraphicsPipelineDesc::new(shader, root);
        graphics.color_formats = vec![ImageFormat::D32Sfloat];
        assert!(renderer.add_pipeline(&PipelineDesc::Graphics(graphics.clone())).is_err());

        graphics.color_formats = vec![ImageFormat::B8G8R8A8Srgb];
        graphics.depth_stencil_format = ImageFormat::R8G8B8A8Unorm;
        assert!(renderer.add_pipeline(&PipelineDesc::Graphics(graphics.clone())).is_err());

        graphics.depth_stencil_format = ImageFormat::D32Sfloat;
        let pipeline = renderer.add_pipeline(&PipelineDesc::Graphics(graphics)).unwrap();

        assert!(matches!(
            renderer.add_pipeline(&PipelineDesc::Compute(ComputePipelineDesc {
                shader_program: shader,
                root_signature: root,
            })),
            Err(RhiError::BindingMismatch(_))
        ));
        assert!(renderer.remove_shader(shader).is_err());

        renderer.remove_pipeline(pipeline).unwrap();
        renderer.remove_root_signature(root).unwrap();
        renderer.remove_shader(shader).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_pipeline_root_signature_compatibility() {
        let renderer = Renderer::new("binding-test", &RendererDesc::default()).unwrap();
        let shader = renderer.add_shader(&textured_shader()).unwrap();
        // Same layout, separate program
        let twin = renderer.add_shader(&textured_shader()).unwrap();
        let mut extended = textured_shader();
        extended.reflection.resources.push(ShaderResource::new(
            "texture1",
            DescriptorType::TEXTURE,
            0,
            2,
            ShaderStage::FRAG,
        ));
        let extended = renderer.add_shader(&extended).unwrap();
        let root = renderer
            .add_root_signature(&RootSignatureDesc::new(vec![shader]))
            .unwrap();

        let mut graphics = GraphicsPipelineDesc::new(twin, root);
        graphics.color_formats = vec![ImageFormat::B8G8R8A8Srgb];
        graphics.depth_stencil_format = ImageFormat::D32Sfloat;
        let pipeline = renderer.add_pipeline(&PipelineDesc::Graphics(graphics.clone())).unwrap();
        graphics.shader_program = extended;
        assert!(matches!(
            renderer.add_pipeline(&PipelineDesc::Graphics(graphics.clone())),
            Err(RhiError::BindingMismatch(_))
        ));

        let mut local = RootSignatureDesc::new(vec![shader]);
        local.flags = RootSignatureFlags::LOCAL;
        let local = renderer.add_root_signature(&local).unwrap();
        graphics.shader_program = shader;
        graphics.root_signature = local;
        assert!(matches!(
            renderer.add_pipeline(&PipelineDesc::Graphics(graphics)),
            Err(RhiError::FeatureNotSupported(_))
        ));

        renderer.remove_pipeline(pipeline).unwrap();
        renderer.remove_root_signature(local).unwrap();
        renderer.remove_root_signature(root).unwrap();
        renderer.remove_shader(extended).unwrap();
        renderer.remove_shader(twin).unwrap();
        renderer.remove_shader(shader).unwrap();
        renderer.shutdown().unwrap();
    }
}
