/// VulkanProgram - shader modules + SPIR-V reflection
///
/// Uniform blocks land in descriptor set 0 (vertex at binding 0, fragment at
/// binding 1) and combined image samplers in set 1; the reflection below
/// recovers block sizes, member offsets, and sampler bindings from the
/// SPIR-V so callers address uniforms by name.

use ash::vk;
use nebula_engine::nebula::rhi::{
    Program, SamplerBindingInfo, UniformBlockInfo, UniformLocation, UniformMemberInfo,
    UniformStage,
};
use nebula_engine::nebula::Result;
use nebula_engine::{engine_bail, engine_err};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Descriptor set 0 binding of the per-stage uniform blocks
pub const VS_UBO_BINDING_INDEX: u32 = 0;
pub const FS_UBO_BINDING_INDEX: u32 = 1;

pub struct VulkanProgram {
    ctx: Arc<GpuContext>,
    program_id: u64,
    vs_module: vk::ShaderModule,
    fs_module: vk::ShaderModule,
    uniform_blocks: Vec<UniformBlockInfo>,
    samplers: Vec<SamplerBindingInfo>,
}

/// Reflect one stage's SPIR-V: its uniform block (if any) and samplers
fn reflect_stage(
    code: &[u32],
    stage: UniformStage,
) -> Result<(Option<UniformBlockInfo>, Vec<SamplerBindingInfo>)> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| engine_err!("nebula::vulkan", "SPIR-V reflection failed: {:?}", e))?;

    let mut block: Option<UniformBlockInfo> = None;
    let mut samplers = Vec::new();

    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            if let spirq::var::Variable::Descriptor {
                name,
                desc_bind,
                desc_ty,
                ty,
                nbind,
            } = var
            {
                use spirq::ty::DescriptorType;
                match desc_ty {
                    DescriptorType::UniformBuffer() => {
                        let binding = match stage {
                            UniformStage::Vertex => VS_UBO_BINDING_INDEX,
                            UniformStage::Fragment => FS_UBO_BINDING_INDEX,
                        };
                        block = Some(UniformBlockInfo {
                            stage,
                            binding,
                            size: ty.nbyte().unwrap_or(0) as u32,
                            members: struct_members(ty),
                        });
                    }
                    DescriptorType::CombinedImageSampler()
                    | DescriptorType::SampledImage()
                    | DescriptorType::Sampler() => {
                        samplers.push(SamplerBindingInfo {
                            name: name.clone().unwrap_or_default(),
                            binding: desc_bind.bind(),
                            count: (*nbind).max(1),
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    Ok((block, samplers))
}

/// Flatten a reflected struct's top-level members
fn struct_members(ty: &spirq::ty::Type) -> Vec<UniformMemberInfo> {
    if let spirq::ty::Type::Struct(st) = ty {
        st.members
            .iter()
            .map(|member| UniformMemberInfo {
                name: member.name.clone().unwrap_or_default(),
                offset: member.offset.unwrap_or(0) as u32,
                size: member.ty.nbyte().unwrap_or(0) as u32,
            })
            .collect()
    } else {
        Vec::new()
    }
}

fn create_shader_module(ctx: &GpuContext, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe {
        ctx.device
            .create_shader_module(&create_info, None)
            .map_err(|e| engine_err!("nebula::vulkan", "vkCreateShaderModule failed: {:?}", e))
    }
}

impl VulkanProgram {
    pub fn new(ctx: Arc<GpuContext>, vertex_spirv: &[u32], fragment_spirv: &[u32]) -> Result<Self> {
        if vertex_spirv.is_empty() || fragment_spirv.is_empty() {
            engine_bail!("nebula::vulkan", "Program requires vertex and fragment SPIR-V");
        }

        let (vs_block, vs_samplers) = reflect_stage(vertex_spirv, UniformStage::Vertex)?;
        let (fs_block, mut samplers) = reflect_stage(fragment_spirv, UniformStage::Fragment)?;
        if !vs_samplers.is_empty() {
            // Vertex-stage sampling is rare; fold them into the same set
            samplers.extend(vs_samplers);
        }
        samplers.sort_by_key(|s| s.binding);
        samplers.dedup_by_key(|s| s.binding);

        let mut uniform_blocks = Vec::new();
        if let Some(block) = vs_block {
            uniform_blocks.push(block);
        }
        if let Some(block) = fs_block {
            uniform_blocks.push(block);
        }

        let vs_module = create_shader_module(&ctx, vertex_spirv)?;
        let fs_module = match create_shader_module(&ctx, fragment_spirv) {
            Ok(module) => module,
            Err(e) => {
                unsafe { ctx.device.destroy_shader_module(vs_module, None) };
                return Err(e);
            }
        };

        // Identity of the shader combination
        let mut hasher = FxHasher::default();
        vertex_spirv.hash(&mut hasher);
        fragment_spirv.hash(&mut hasher);
        let program_id = hasher.finish();

        Ok(Self {
            ctx,
            program_id,
            vs_module,
            fs_module,
            uniform_blocks,
            samplers,
        })
    }

    pub(crate) fn vs_module(&self) -> vk::ShaderModule {
        self.vs_module
    }

    pub(crate) fn fs_module(&self) -> vk::ShaderModule {
        self.fs_module
    }
}

impl Program for VulkanProgram {
    fn program_id(&self) -> u64 {
        self.program_id
    }

    fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        for block in &self.uniform_blocks {
            for member in &block.members {
                if member.name == name {
                    return Some(UniformLocation {
                        stage: block.stage,
                        offset: member.offset,
                        size: member.size,
                    });
                }
            }
        }
        None
    }

    fn uniform_block_size(&self, stage: UniformStage) -> usize {
        self.uniform_blocks
            .iter()
            .find(|b| b.stage == stage)
            .map(|b| b.size as usize)
            .unwrap_or(0)
    }

    fn active_uniform_blocks(&self) -> &[UniformBlockInfo] {
        &self.uniform_blocks
    }

    fn active_samplers(&self) -> &[SamplerBindingInfo] {
        &self.samplers
    }
}

impl Drop for VulkanProgram {
    fn drop(&mut self) {
        // Layouts and pipelines built from this program are now stale
        self.ctx.note_retired_program(self.program_id);
        unsafe {
            self.ctx.device.destroy_shader_module(self.vs_module, None);
            self.ctx.device.destroy_shader_module(self.fs_module, None);
        }
    }
}
