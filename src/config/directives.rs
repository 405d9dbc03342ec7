use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::command::options::{
    CompositeOptions, ConvertOptions, Geometry, Gravity, Rotation, parse_offset,
};
use crate::command::pipeline::{CommandPipeline, TransformCommand};
use crate::error::{MillError, MillResult};
use crate::sniff::ImageKind;

/// Default accumulation capacity: 4 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Default re-encode quality for lossy output formats.
pub const DEFAULT_QUALITY: u8 = 75;

/// Directives set by one configuration scope.
///
/// Every field is optional; unset fields inherit from broader scopes when
/// layers are merged by [`FilterDirectives::resolve`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterDirectives {
    /// Transform commands. A scope that sets this replaces any inherited
    /// list wholesale; command lists are never concatenated across scopes.
    #[serde(default)]
    pub commands: Option<Vec<CommandDirective>>,
    /// Maximum body accumulation size in bytes.
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Re-encode quality, 0 to 100.
    #[serde(default)]
    pub quality: Option<u8>,
}

/// Wire form of one transform command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandDirective {
    /// Re-render the working image.
    Convert {
        /// Resize geometry, e.g. `"640x480>"`.
        #[serde(default)]
        resize: Option<String>,
        /// Clockwise rotation in degrees, a multiple of 90.
        #[serde(default)]
        rotate: Option<i32>,
        /// Output format name: `jpeg`, `gif`, `png`, or `webp`.
        #[serde(default)]
        format: Option<String>,
    },
    /// Overlay a secondary image.
    Composite {
        /// Overlay image path, relative to the configuration root.
        image: String,
        /// Placement anchor, e.g. `"south_east"`.
        #[serde(default)]
        gravity: Option<String>,
        /// Inward pixel offset from the anchor, e.g. `"+10+10"`.
        #[serde(default)]
        geometry: Option<String>,
        /// Overlay opacity percent, 0 to 100.
        #[serde(default)]
        dissolve: Option<u8>,
    },
}

/// Effective configuration for one scope after merging and validation.
///
/// Built once by [`FilterDirectives::resolve`], then shared immutably by
/// every request in the scope. Overlay images are loaded and validated
/// here so sessions never touch the filesystem.
#[derive(Clone, Debug)]
pub struct ResolvedFilterConfig {
    /// Commands applied to each intercepted body. `None` disables the
    /// filter for the scope; an empty pipeline still re-encodes.
    pub commands: Option<CommandPipeline>,
    /// Body accumulation capacity in bytes.
    pub buffer_capacity: usize,
    /// Re-encode quality for lossy output formats.
    pub quality: u8,
}

impl ResolvedFilterConfig {
    /// The command pipeline, when the scope configures one.
    pub fn pipeline(&self) -> Option<&CommandPipeline> {
        self.commands.as_ref()
    }
}

impl FilterDirectives {
    /// Load one scope's directives from a JSON file.
    pub fn from_json_file(path: &Path) -> MillResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read directives from {}", path.display()))?;
        let directives = serde_json::from_str(&text)
            .with_context(|| format!("parse directives from {}", path.display()))?;
        Ok(directives)
    }

    /// Merge directive layers, broadest scope first, and build the
    /// effective configuration.
    ///
    /// Merging is per directive: a more specific layer wins for each field
    /// it sets, and the command list is taken wholesale from the most
    /// specific layer that sets one. Composite overlays are read from
    /// `assets_root` and checked against the supported formats.
    pub fn resolve(
        layers: &[FilterDirectives],
        assets_root: &Path,
    ) -> MillResult<ResolvedFilterConfig> {
        let mut merged = FilterDirectives::default();
        for layer in layers {
            if layer.commands.is_some() {
                merged.commands = layer.commands.clone();
            }
            if layer.buffer_size.is_some() {
                merged.buffer_size = layer.buffer_size;
            }
            if layer.quality.is_some() {
                merged.quality = layer.quality;
            }
        }

        let quality = merged.quality.unwrap_or(DEFAULT_QUALITY);
        if quality > 100 {
            return Err(MillError::config(format!(
                "quality must be between 0 and 100, got {quality}"
            )));
        }

        let commands = match &merged.commands {
            None => None,
            Some(directives) => Some(build_pipeline(directives, assets_root)?),
        };

        Ok(ResolvedFilterConfig {
            commands,
            buffer_capacity: merged.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            quality,
        })
    }
}

fn build_pipeline(
    directives: &[CommandDirective],
    assets_root: &Path,
) -> MillResult<CommandPipeline> {
    let mut commands = Vec::with_capacity(directives.len());
    for directive in directives {
        commands.push(build_command(directive, assets_root)?);
    }
    Ok(CommandPipeline::new(commands))
}

fn build_command(directive: &CommandDirective, assets_root: &Path) -> MillResult<TransformCommand> {
    match directive {
        CommandDirective::Convert { resize, rotate, format } => {
            let resize = resize.as_deref().map(Geometry::from_str).transpose()?;
            let rotate = match rotate {
                None => None,
                Some(degrees) => Rotation::from_degrees(*degrees)?,
            };
            let format = match format.as_deref() {
                None => None,
                Some(name) => Some(ImageKind::from_name(name).ok_or_else(|| {
                    MillError::config(format!("unknown output format '{name}'"))
                })?),
            };
            Ok(TransformCommand::Convert(ConvertOptions { resize, rotate, format }))
        }
        CommandDirective::Composite {
            image,
            gravity,
            geometry,
            dissolve,
        } => {
            let path = overlay_path(assets_root, image)?;
            let bytes = std::fs::read(&path)
                .with_context(|| format!("read overlay image {}", path.display()))?;
            if ImageKind::sniff(&bytes).is_none() {
                return Err(MillError::config(format!(
                    "overlay '{image}' is not a supported image format"
                )));
            }
            let gravity = gravity
                .as_deref()
                .map(Gravity::from_str)
                .transpose()?
                .unwrap_or_default();
            let offset = geometry.as_deref().map(parse_offset).transpose()?.unwrap_or((0, 0));
            if let Some(percent) = dissolve
                && *percent > 100
            {
                return Err(MillError::config(format!(
                    "dissolve must be between 0 and 100, got {percent}"
                )));
            }
            Ok(TransformCommand::Composite(CompositeOptions {
                overlay: Arc::new(bytes),
                gravity,
                offset,
                dissolve: *dissolve,
            }))
        }
    }
}

/// Overlay paths stay inside the configuration root: relative, no `..`.
fn overlay_path(assets_root: &Path, source: &str) -> MillResult<PathBuf> {
    let rel = Path::new(source);
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(MillError::config(format!(
            "overlay path '{source}' must be relative and must not contain '..'"
        )));
    }
    Ok(assets_root.join(rel))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::command::options::ResizeMode;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "imagemill_{name}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn write_overlay(dir: &Path, name: &str) {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(dir.join(name), &buf).unwrap();
    }

    fn convert_directive(resize: &str) -> CommandDirective {
        CommandDirective::Convert {
            resize: Some(resize.to_string()),
            rotate: None,
            format: None,
        }
    }

    #[test]
    fn unset_fields_fall_back_to_defaults() {
        let config =
            FilterDirectives::resolve(&[FilterDirectives::default()], Path::new(".")).unwrap();
        assert!(config.commands.is_none());
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn specific_layer_wins_per_directive() {
        let broad = FilterDirectives {
            commands: Some(vec![convert_directive("100x100")]),
            buffer_size: Some(1024),
            quality: Some(50),
        };
        let specific = FilterDirectives {
            commands: None,
            buffer_size: Some(2048),
            quality: None,
        };
        let config = FilterDirectives::resolve(&[broad, specific], Path::new(".")).unwrap();
        // Commands inherit; buffer_size is overridden; quality inherits.
        assert_eq!(config.commands.as_ref().map(CommandPipeline::len), Some(1));
        assert_eq!(config.buffer_capacity, 2048);
        assert_eq!(config.quality, 50);
    }

    #[test]
    fn command_lists_replace_wholesale() {
        let broad = FilterDirectives {
            commands: Some(vec![convert_directive("100x100"), convert_directive("200x200")]),
            ..Default::default()
        };
        let specific = FilterDirectives {
            commands: Some(vec![convert_directive("32x32!")]),
            ..Default::default()
        };
        let config = FilterDirectives::resolve(&[broad, specific], Path::new(".")).unwrap();
        let pipeline = config.pipeline().unwrap();
        assert_eq!(pipeline.len(), 1);
        let TransformCommand::Convert(opts) = &pipeline.commands()[0] else {
            panic!("expected a convert command");
        };
        assert_eq!(opts.resize.unwrap().mode, ResizeMode::Exact);
    }

    #[test]
    fn empty_command_list_enables_reencode_only() {
        let layer = FilterDirectives {
            commands: Some(vec![]),
            ..Default::default()
        };
        let config = FilterDirectives::resolve(&[layer], Path::new(".")).unwrap();
        assert!(config.pipeline().is_some_and(CommandPipeline::is_empty));
    }

    #[test]
    fn composite_overlay_loads_once_at_resolve_time() {
        let tmp = temp_dir("directives_overlay");
        std::fs::create_dir_all(&tmp).unwrap();
        write_overlay(&tmp, "logo.png");

        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Composite {
                image: "logo.png".to_string(),
                gravity: Some("se".to_string()),
                geometry: Some("+3+3".to_string()),
                dissolve: Some(40),
            }]),
            ..Default::default()
        };
        let config = FilterDirectives::resolve(&[layer], &tmp).unwrap();
        let pipeline = config.pipeline().unwrap();
        let TransformCommand::Composite(opts) = &pipeline.commands()[0] else {
            panic!("expected a composite command");
        };
        assert_eq!(opts.gravity, Gravity::SouthEast);
        assert_eq!(opts.offset, (3, 3));
        assert_eq!(opts.dissolve, Some(40));
        assert_eq!(ImageKind::sniff(&opts.overlay), Some(ImageKind::Png));

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn missing_overlay_fails_resolve() {
        let tmp = temp_dir("directives_missing_overlay");
        std::fs::create_dir_all(&tmp).unwrap();
        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Composite {
                image: "absent.png".to_string(),
                gravity: None,
                geometry: None,
                dissolve: None,
            }]),
            ..Default::default()
        };
        assert!(FilterDirectives::resolve(&[layer], &tmp).is_err());
        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn non_image_overlay_fails_resolve() {
        let tmp = temp_dir("directives_bad_overlay");
        std::fs::create_dir_all(&tmp).unwrap();
        std::fs::write(tmp.join("fake.png"), b"definitely not an image file").unwrap();
        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Composite {
                image: "fake.png".to_string(),
                gravity: None,
                geometry: None,
                dissolve: None,
            }]),
            ..Default::default()
        };
        let err = FilterDirectives::resolve(&[layer], &tmp).unwrap_err();
        assert!(matches!(err, MillError::Config(_)));
        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn overlay_paths_cannot_escape_the_root() {
        for source in ["../secret.png", "/etc/passwd"] {
            let layer = FilterDirectives {
                commands: Some(vec![CommandDirective::Composite {
                    image: source.to_string(),
                    gravity: None,
                    geometry: None,
                    dissolve: None,
                }]),
                ..Default::default()
            };
            let err = FilterDirectives::resolve(&[layer], Path::new(".")).unwrap_err();
            assert!(matches!(err, MillError::Config(_)), "source {source}");
        }
    }

    #[test]
    fn out_of_range_quality_and_dissolve_are_rejected() {
        let layer = FilterDirectives {
            quality: Some(101),
            ..Default::default()
        };
        assert!(FilterDirectives::resolve(&[layer], Path::new(".")).is_err());

        let tmp = temp_dir("directives_dissolve");
        std::fs::create_dir_all(&tmp).unwrap();
        write_overlay(&tmp, "logo.png");
        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Composite {
                image: "logo.png".to_string(),
                gravity: None,
                geometry: None,
                dissolve: Some(101),
            }]),
            ..Default::default()
        };
        assert!(FilterDirectives::resolve(&[layer], &tmp).is_err());
        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn directives_round_trip_through_json() {
        let json = r#"{
            "commands": [
                {"convert": {"resize": "640x480>", "rotate": 90}},
                {"composite": {"image": "logo.png", "gravity": "south_east",
                               "geometry": "+10+10", "dissolve": 50}}
            ],
            "buffer_size": 1048576,
            "quality": 80
        }"#;
        let directives: FilterDirectives = serde_json::from_str(json).unwrap();
        assert_eq!(directives.buffer_size, Some(1_048_576));
        assert_eq!(directives.quality, Some(80));
        let commands = directives.commands.as_ref().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], CommandDirective::Convert { .. }));

        let text = serde_json::to_string(&directives).unwrap();
        let reparsed: FilterDirectives = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, directives);
    }

    #[test]
    fn bad_directive_values_fail_resolve() {
        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Convert {
                resize: Some("banana".to_string()),
                rotate: None,
                format: None,
            }]),
            ..Default::default()
        };
        assert!(FilterDirectives::resolve(&[layer], Path::new(".")).is_err());

        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Convert {
                resize: None,
                rotate: Some(45),
                format: None,
            }]),
            ..Default::default()
        };
        assert!(FilterDirectives::resolve(&[layer], Path::new(".")).is_err());

        let layer = FilterDirectives {
            commands: Some(vec![CommandDirective::Convert {
                resize: None,
                rotate: None,
                format: Some("bmp".to_string()),
            }]),
            ..Default::default()
        };
        assert!(FilterDirectives::resolve(&[layer], Path::new(".")).is_err());
    }
}
