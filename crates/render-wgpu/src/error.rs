/// Errors from setting up the wgpu backend.
#[derive(Debug, thiserror::Error)]
pub enum WgpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}
