use anyhow::Result;

/// A loaded, ready-to-infer forecasting model.
pub trait Forecaster: Send + Sync {
    /// Maps a normalized observation vector to a raw (still normalized)
    /// forecast.
    fn infer(&self, input: &[f32]) -> Result<Vec<f32>>;
}

impl<F> Forecaster for F
where
    F: Fn(&[f32]) -> Result<Vec<f32>> + Send + Sync,
{
    fn infer(&self, input: &[f32]) -> Result<Vec<f32>> {
        self(input)
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchForecaster;

#[cfg(feature = "torch")]
mod torch {
    use anyhow::{bail, Context, Result};
    use std::path::{Path, PathBuf};
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::Forecaster;

    /// TorchScript model mapping `[1, in_dim]` to `[1, out_dim]`.
    pub struct TorchForecaster {
        model: CModule,
        device: Device,
        pub out_dim: i64,
    }

    impl TorchForecaster {
        /// Path of the artifact for vehicle `index`: `<model_dir>/<index>.pt`.
        pub fn artifact_path(model_dir: &Path, index: usize) -> PathBuf {
            model_dir.join(format!("{index}.pt"))
        }

        pub fn load(model_path: &Path, in_dim: usize) -> Result<Self> {
            let device = Device::Cpu;

            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

            // Probe output shape with a dummy forward, expect [B=1, N]
            let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            let sz = t.size();
            if sz.len() != 2 || sz[0] != 1 {
                bail!("unexpected model output size: {:?}", sz);
            }

            Ok(Self {
                model,
                device,
                out_dim: sz[1],
            })
        }
    }

    impl Forecaster for TorchForecaster {
        fn infer(&self, x: &[f32]) -> Result<Vec<f32>> {
            let input = Tensor::from_slice(x)
                .reshape([1, x.len() as i64])
                .to_device(self.device);

            let t = self.model.forward_ts(&[input])?;
            let sz = t.size();
            if sz.len() != 2 || sz[0] != 1 || sz[1] != self.out_dim {
                bail!("unexpected forecast shape: {:?}", sz);
            }

            let out = t.to_kind(Kind::Float).view([-1]);
            Vec::<f32>::try_from(&out).context("failed to read forecast tensor")
        }
    }
}
