use std::sync::Arc;

use crate::command::options::{CompositeOptions, ConvertOptions};
use crate::engine::ImageHandle;
use crate::error::MillError;

/// One configured transformation, applied to the working image in list
/// order.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformCommand {
    /// Re-render the working image (resize, rotate, format change).
    Convert(ConvertOptions),
    /// Overlay a secondary image onto the working image.
    Composite(CompositeOptions),
}

impl TransformCommand {
    /// Directive name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Convert(_) => "convert",
            Self::Composite(_) => "composite",
        }
    }
}

/// First failure encountered while running a pipeline.
#[derive(Debug)]
pub struct CommandFailure {
    /// Zero-based position of the failing command.
    pub index: usize,
    /// Underlying engine failure.
    pub cause: MillError,
}

/// Ordered list of transformation commands, fixed at configuration time and
/// shared read-only by every session in the scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandPipeline {
    commands: Arc<[TransformCommand]>,
}

impl CommandPipeline {
    /// Build a pipeline from an ordered command list.
    pub fn new(commands: Vec<TransformCommand>) -> Self {
        Self {
            commands: commands.into(),
        }
    }

    /// Whether the pipeline carries no commands at all.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// The configured commands, in execution order.
    pub fn commands(&self) -> &[TransformCommand] {
        &self.commands
    }

    /// Apply every command to the handle, in order, stopping at the first
    /// failure.
    ///
    /// Commands are never reordered, retried, or skipped. On failure the
    /// handle is left partially transformed; the caller disposes of it by
    /// dropping.
    pub fn run(&self, handle: &mut dyn ImageHandle) -> Result<(), CommandFailure> {
        for (index, command) in self.commands.iter().enumerate() {
            let applied = match command {
                TransformCommand::Convert(opts) => handle.convert(opts),
                TransformCommand::Composite(opts) => handle.composite(opts),
            };
            if let Err(cause) = applied {
                return Err(CommandFailure { index, cause });
            }
        }
        Ok(())
    }
}
