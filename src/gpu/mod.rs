// ============================================================================
// GPU MODULE — hardware-accelerated render pipeline for the editor core
// ============================================================================
//
// Architecture:
//   context.rs  — wgpu Device, Queue, adapter init (software fallback)
//   shaders.rs  — all WGSL shader source (inline strings)
//   texture.rs  — render-target wrapper with upload + aligned readback
//   renderer.rs — GpuRenderer: the multi-pass pipeline coordinator
//
// The fragment shaders mirror the CPU operators in `crate::ops` constant for
// constant; preview (GPU) and export (CPU) must agree within rounding.

pub mod context;
pub mod renderer;
pub mod shaders;
pub mod texture;

pub use context::GpuContext;
pub use renderer::GpuRenderer;
