/// Texture trait - image + view + sampler with CPU upload paths

use crate::rhi::types::{SamplerDesc, TextureCubeFace, TextureDesc};

/// A GPU texture created by `Driver::create_texture`
///
/// Uploads are synchronous staging copies; backends track the image layout of
/// every (mip, layer) subresource internally and emit the required barriers.
pub trait Texture: Send + Sync {
    /// The description this texture was created with
    fn desc(&self) -> TextureDesc;

    /// Upload a full `width` x `height` subresource at (level, layer)
    fn update_data(&self, data: &[u8], width: u32, height: u32, level: u32, layer: u32);

    /// Upload a sub-rectangle of the subresource at (level, layer)
    fn update_sub_data(
        &self,
        xoffset: u32,
        yoffset: u32,
        width: u32,
        height: u32,
        level: u32,
        data: &[u8],
        layer: u32,
    );

    /// Upload pre-compressed data for one mip level
    ///
    /// Compressed mips must be pre-baked and supplied per level; runtime
    /// mipmap generation is not available for compressed formats.
    fn update_compressed_data(&self, data: &[u8], width: u32, height: u32, level: u32, layer: u32);

    /// Upload a block-aligned compressed sub-rectangle
    ///
    /// `xoffset`/`yoffset` must be multiples of the format's block size.
    fn update_compressed_sub_data(
        &self,
        xoffset: u32,
        yoffset: u32,
        width: u32,
        height: u32,
        level: u32,
        data: &[u8],
        layer: u32,
    );

    /// Upload one face of a cube texture (level 0)
    fn update_face_data(&self, face: TextureCubeFace, data: &[u8]);

    /// Replace the sampler used when this texture is bound
    fn update_sampler_desc(&self, desc: &SamplerDesc);
}
