// ============================================================================
// CPU PIXEL OPERATIONS — scalar reference implementations of the pipeline
// ============================================================================
//
// The GPU pipeline in `crate::gpu` mirrors these stage-for-stage and
// constant-for-constant.  Any formula change here must be made in the WGSL
// sources as well.

pub mod adjustments;
pub mod blur;
pub mod grain;
