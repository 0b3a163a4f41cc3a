//! Shader creation from source files.

use crate::config::ResourceDirectory;
use crate::error::{RhiError, RhiResult};
use crate::handle::ShaderHandle;
use crate::renderer::Device;
use crate::types::{ShaderDesc, ShaderStageDesc};

use super::desc::{ShaderLoadDesc, ShaderStageLoadDesc};

impl Device {
    /// Read every stage of `desc` from its resource directory and create
    /// the shader as [`Device::add_shader`] does.
    pub fn add_shader_resource(&self, desc: &ShaderLoadDesc) -> RhiResult<ShaderHandle> {
        if desc.target > self.capabilities().max_shader_target {
            return Err(RhiError::FeatureNotSupported(format!(
                "shader target {:?} above device maximum {:?}",
                desc.target,
                self.capabilities().max_shader_target
            )));
        }
        let read = |stage: &Option<ShaderStageLoadDesc>| -> RhiResult<Option<ShaderStageDesc>> {
            stage.as_ref().map(|stage| self.read_shader_stage(stage)).transpose()
        };
        let shader_desc = ShaderDesc {
            stages: Default::default(),
            vert: read(&desc.vert)?,
            frag: read(&desc.frag)?,
            geom: read(&desc.geom)?,
            hull: read(&desc.hull)?,
            domain: read(&desc.domain)?,
            comp: read(&desc.comp)?,
            reflection: desc.reflection.clone(),
        };
        let shader_desc = ShaderDesc {
            stages: shader_desc.provided_stages(),
            ..shader_desc
        };
        self.add_shader(&shader_desc)
    }

    fn read_shader_stage(&self, stage: &ShaderStageLoadDesc) -> RhiResult<ShaderStageDesc> {
        let directory = stage.directory.unwrap_or(ResourceDirectory::ShaderSources);
        let path = self.resource_directories().resolve(directory, &stage.file_name);
        let code = std::fs::read_to_string(&path).map_err(|err| {
            log::error!("Failed to read shader '{}': {err}", path.display());
            RhiError::Io(format!("{}: {err}", path.display()))
        })?;
        log::debug!("Read shader stage '{}' ({} bytes)", path.display(), code.len());
        Ok(ShaderStageDesc {
            name: stage.file_name.clone(),
            code,
            entry_point: stage.entry_point.clone(),
            macros: stage.macros.clone(),
        })
    }
}
