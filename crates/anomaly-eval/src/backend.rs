//! Backend selection for the evaluation binary.
//!
//! GPU backends label regions on the device; the CPU backend reads masks
//! back and labels them with union-find.

use anomaly_util::Connectivity;
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        use anomaly_util::PropagationLabeler;
        use burn::backend::cuda::{Cuda, CudaDevice};

        /// Selected backend type
        pub type SelectedBackend = Cuda;
        /// Selected device type
        pub type SelectedDevice = CudaDevice;
        /// Region labeler matching the backend
        pub type SelectedLabeler = PropagationLabeler;

        pub fn create_device() -> SelectedDevice {
            CudaDevice::default()
        }

        pub const fn create_labeler(connectivity: Connectivity) -> SelectedLabeler {
            PropagationLabeler::new(connectivity)
        }

        /// Gets the backend name for logging purposes
        pub const fn get_backend_name() -> &'static str {
            "CUDA (NVIDIA GPU)"
        }
    } else if #[cfg(feature = "wgpu")] {
        use anomaly_util::PropagationLabeler;
        use burn::backend::wgpu::{Wgpu, WgpuDevice};

        /// Selected backend type
        pub type SelectedBackend = Wgpu;
        /// Selected device type
        pub type SelectedDevice = WgpuDevice;
        /// Region labeler matching the backend
        pub type SelectedLabeler = PropagationLabeler;

        pub fn create_device() -> SelectedDevice {
            WgpuDevice::default()
        }

        pub const fn create_labeler(connectivity: Connectivity) -> SelectedLabeler {
            PropagationLabeler::new(connectivity)
        }

        /// Gets the backend name for logging purposes
        pub const fn get_backend_name() -> &'static str {
            "WGPU (GPU)"
        }
    } else {
        use anomaly_util::UnionFindLabeler;
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        /// Selected backend type
        pub type SelectedBackend = NdArray;
        /// Selected device type
        pub type SelectedDevice = NdArrayDevice;
        /// Region labeler matching the backend
        pub type SelectedLabeler = UnionFindLabeler;

        pub fn create_device() -> SelectedDevice {
            NdArrayDevice::default()
        }

        pub const fn create_labeler(connectivity: Connectivity) -> SelectedLabeler {
            UnionFindLabeler::new(connectivity)
        }

        /// Gets the backend name for logging purposes
        pub const fn get_backend_name() -> &'static str {
            "NdArray (CPU)"
        }
    }
}
