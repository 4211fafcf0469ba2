//! Device-agnostic command recording.
//!
//! Passes record into a [`CommandEncoder`]; the device replays the whole list
//! as one submission. Commands reference device objects by id only.

use std::ops::Range;

use super::{
    BindGroupId, GpuBufferId, GpuComputePipelineId, GpuRenderPipelineId, GpuTextureViewId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GpuColorAttachment {
    pub view: GpuTextureViewId,
    pub resolve_target: Option<GpuTextureViewId>,
    /// `None` loads the existing contents.
    pub clear: Option<wgpu::Color>,
    pub store: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuDepthAttachment {
    pub view: GpuTextureViewId,
    /// `None` loads the existing depth.
    pub clear_depth: Option<f32>,
    pub store: bool,
}

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginRenderPass {
        label: String,
        color_attachments: Vec<GpuColorAttachment>,
        depth_attachment: Option<GpuDepthAttachment>,
    },
    BeginComputePass {
        label: String,
    },
    SetRenderPipeline(GpuRenderPipelineId),
    SetComputePipeline(GpuComputePipelineId),
    SetBindGroup {
        index: u32,
        group: BindGroupId,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: GpuBufferId,
    },
    SetIndexBuffer {
        buffer: GpuBufferId,
        format: wgpu::IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    DrawIndirect {
        buffer: GpuBufferId,
        offset: u64,
    },
    DrawIndexedIndirect {
        buffer: GpuBufferId,
        offset: u64,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: GpuBufferId,
        offset: u64,
    },
    EndPass,
}

/// Records the commands of one frame.
#[derive(Debug, Default)]
pub struct CommandEncoder {
    label: String,
    commands: Vec<Command>,
    open_pass: bool,
}

impl CommandEncoder {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            commands: Vec::with_capacity(64),
            open_pass: false,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn begin_render_pass(
        &mut self,
        label: &str,
        color_attachments: Vec<GpuColorAttachment>,
        depth_attachment: Option<GpuDepthAttachment>,
    ) {
        debug_assert!(!self.open_pass, "render pass begun while another pass is open");
        self.open_pass = true;
        self.commands.push(Command::BeginRenderPass {
            label: label.to_string(),
            color_attachments,
            depth_attachment,
        });
    }

    pub fn begin_compute_pass(&mut self, label: &str) {
        debug_assert!(!self.open_pass, "compute pass begun while another pass is open");
        self.open_pass = true;
        self.commands.push(Command::BeginComputePass {
            label: label.to_string(),
        });
    }

    pub fn end_pass(&mut self) {
        self.open_pass = false;
        self.commands.push(Command::EndPass);
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
