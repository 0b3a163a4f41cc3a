//! Resource directory configuration.
//!
//! Shader and texture loads name a [`ResourceDirectory`] instead of a full
//! path. [`ResourceDirectories`] maps each directory class to a path relative
//! to a root, and can be embedded in a TOML config file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Class of files an application loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResourceDirectory {
    /// Compiled shader binaries.
    ShaderBinaries = 0,
    /// Shader sources.
    ShaderSources,
    /// Textures.
    Textures,
    /// Meshes.
    Meshes,
    /// Fonts.
    BuiltinFonts,
    /// GPU capability configuration.
    GpuConfig,
    /// Animations.
    Animations,
    /// Audio.
    Audio,
    /// Everything else.
    OtherFiles,
    /// The root itself.
    Root = 306,
}

impl ResourceDirectory {
    /// Every directory class.
    pub const ALL: [Self; 10] = [
        Self::ShaderBinaries,
        Self::ShaderSources,
        Self::Textures,
        Self::Meshes,
        Self::BuiltinFonts,
        Self::GpuConfig,
        Self::Animations,
        Self::Audio,
        Self::OtherFiles,
        Self::Root,
    ];

    /// Config name of the class.
    pub fn name(self) -> &'static str {
        match self {
            Self::ShaderBinaries => "shader_binaries",
            Self::ShaderSources => "shader_sources",
            Self::Textures => "textures",
            Self::Meshes => "meshes",
            Self::BuiltinFonts => "builtin_fonts",
            Self::GpuConfig => "gpu_config",
            Self::Animations => "animations",
            Self::Audio => "audio",
            Self::OtherFiles => "other_files",
            Self::Root => "root",
        }
    }

    /// Class with the given config name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Default path of the class relative to the root.
    pub fn default_path(self) -> &'static str {
        match self {
            Self::ShaderBinaries => "shaders/binary",
            Self::ShaderSources => "shaders",
            Self::Textures => "textures",
            Self::Meshes => "meshes",
            Self::BuiltinFonts => "fonts",
            Self::GpuConfig => "gpu_config",
            Self::Animations => "animations",
            Self::Audio => "audio",
            Self::OtherFiles => "",
            Self::Root => "",
        }
    }
}

/// Paths of every [`ResourceDirectory`] class.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceDirectories {
    /// Directory every class is relative to.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Overrides of the default per-class paths.
    #[serde(default, deserialize_with = "deserialize_directories")]
    pub directories: HashMap<ResourceDirectory, PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

// Unknown class names are skipped with a warning instead of failing the
// whole config.
fn deserialize_directories<'de, D>(
    deserializer: D,
) -> Result<HashMap<ResourceDirectory, PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, PathBuf>::deserialize(deserializer)?;
    let mut directories = HashMap::with_capacity(raw.len());
    for (name, path) in raw {
        match ResourceDirectory::from_name(&name) {
            Some(directory) => {
                directories.insert(directory, path);
            }
            None => log::warn!("Unknown resource directory '{name}' ignored"),
        }
    }
    Ok(directories)
}

impl Default for ResourceDirectories {
    fn default() -> Self {
        Self::new(default_root())
    }
}

impl ResourceDirectories {
    /// Default layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            directories: HashMap::new(),
        }
    }

    /// Override the path of one class.
    pub fn with_directory(mut self, directory: ResourceDirectory, path: impl Into<PathBuf>) -> Self {
        self.directories.insert(directory, path.into());
        self
    }

    /// Directory a class resolves to.
    pub fn directory(&self, directory: ResourceDirectory) -> PathBuf {
        match self.directories.get(&directory) {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => self.root.join(directory.default_path()),
        }
    }

    /// Full path of `file` in `directory`.
    pub fn resolve(&self, directory: ResourceDirectory, file: impl AsRef<Path>) -> PathBuf {
        let file = file.as_ref();
        if file.is_absolute() {
            return file.to_path_buf();
        }
        self.directory(directory).join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let dirs = ResourceDirectories::new("assets");
        assert_eq!(
            dirs.resolve(ResourceDirectory::ShaderSources, "demo.vert"),
            PathBuf::from("assets/shaders/demo.vert")
        );
        assert_eq!(
            dirs.resolve(ResourceDirectory::Textures, "cube.png"),
            PathBuf::from("assets/textures/cube.png")
        );
    }

    #[test]
    fn test_override() {
        let dirs = ResourceDirectories::new("assets")
            .with_directory(ResourceDirectory::Textures, "images");
        assert_eq!(
            dirs.directory(ResourceDirectory::Textures),
            PathBuf::from("assets/images")
        );
    }

    #[test]
    fn test_deserialize_from_toml() {
        let dirs: ResourceDirectories = toml::from_str(
            r#"
            root = "data"
            [directories]
            shader_sources = "glsl"
            not_a_directory = "ignored"
            "#,
        )
        .unwrap();
        assert_eq!(
            dirs.resolve(ResourceDirectory::ShaderSources, "a.frag"),
            PathBuf::from("data/glsl/a.frag")
        );
        assert_eq!(dirs.directory(ResourceDirectory::Textures), PathBuf::from("data/textures"));
        assert_eq!(dirs.directories.len(), 1);
    }
}
