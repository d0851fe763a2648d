//! Model adapter seam and the process-wide model slot.
//!
//! Tokenization, weight loading and sampling live outside this crate behind
//! [`Tokenizer`], [`ModelAdapter`] and [`ModelLoader`]. [`ModelManager`] owns
//! the one loaded model: generations hold a read guard for their whole run,
//! and switching models takes the write guard, drops the old model and loads
//! the new one.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

use crate::stopper::{first_stop, Stopper};
use crate::types::{DecodingConfig, FinishReason, ModelError};

/// Maximum sequence length (prompt plus generated tokens).
pub const CONTEXT_LIMIT: usize = 2048;

/// Literal end-of-text marker removed from decoded text.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// CPU memory limit in GiB when none is configured.
pub const DEFAULT_CPU_MEMORY_GIB: u32 = 99;

/// Text to token id conversion.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, ModelError>;

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, ModelError>;

    fn eos_token_id(&self) -> u32;

    /// Number of tokens in `text` as it would be encoded for generation.
    fn count_tokens(&self, text: &str) -> Result<usize, ModelError> {
        Ok(self.encode(text, true)?.len())
    }
}

/// One call into the model: extend `input` by at most `max_new_tokens`.
pub struct ModelCall<'a> {
    pub input: &'a [u32],
    pub max_new_tokens: usize,
    pub decoding: &'a DecodingConfig,
    /// Evaluated after every appended token; the first reason ends the call.
    pub stoppers: Vec<Box<dyn Stopper>>,
}

impl ModelCall<'_> {
    /// Check the running sequence against every stopper.
    pub fn check_stop(&mut self, sequence: &[u32]) -> Option<FinishReason> {
        first_stop(&mut self.stoppers, sequence)
    }
}

/// A loaded causal language model.
pub trait ModelAdapter: Tokenizer {
    fn name(&self) -> &str;

    /// Run generation and return the full sequence, input included.
    ///
    /// Adapters append tokens one at a time and consult
    /// [`ModelCall::check_stop`] after each one.
    fn generate(&self, call: ModelCall<'_>) -> Result<Vec<u32>, ModelError>;
}

/// Produces model adapters from a model name and a load plan.
pub trait ModelLoader: Send + Sync {
    fn load(&self, name: &str, plan: &LoadPlan) -> Result<Box<dyn ModelAdapter>, ModelError>;
}

/// Where the weights are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
    Bf16,
    Int8,
}

/// Where the weights come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// A `models/<name>` directory.
    Directory,
    /// A serialized `torch-dumps/<name>.pt` file.
    TorchDump,
}

/// Per-device memory ceilings in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    pub gpu_gib: u32,
    pub cpu_gib: u32,
}

/// Load flags as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    pub cpu: bool,
    pub load_in_8bit: bool,
    pub bf16: bool,
    pub auto_devices: bool,
    pub disk: bool,
    pub disk_cache_dir: Option<PathBuf>,
    pub gpu_memory: Option<u32>,
    pub cpu_memory: Option<u32>,
    pub deepspeed: bool,
    pub nvme_offload_dir: Option<PathBuf>,
    pub local_rank: u32,
}

impl LoadOptions {
    /// True when no flag asks for a custom placement.
    fn is_default_placement(&self) -> bool {
        !(self.cpu
            || self.load_in_8bit
            || self.auto_devices
            || self.disk
            || self.gpu_memory.is_some()
            || self.cpu_memory.is_some()
            || self.deepspeed)
    }

    fn half_precision(&self) -> Precision {
        if self.bf16 {
            Precision::Bf16
        } else {
            Precision::F16
        }
    }
}

/// Detected accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuInfo {
    pub total_memory_mib: u64,
}

/// Typed description of how a model should be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub source: WeightSource,
    pub device: Device,
    pub precision: Precision,
    /// Split layers across devices automatically.
    pub auto_device_map: bool,
    pub max_memory: Option<MemoryMap>,
    pub offload_folder: Option<PathBuf>,
    pub deepspeed: bool,
    pub nvme_offload_dir: Option<PathBuf>,
    pub local_rank: u32,
}

impl LoadPlan {
    fn new(device: Device, precision: Precision) -> Self {
        Self {
            source: WeightSource::Directory,
            device,
            precision,
            auto_device_map: false,
            max_memory: None,
            offload_folder: None,
            deepspeed: false,
            nvme_offload_dir: None,
            local_rank: 0,
        }
    }

    /// Resolve load flags into a plan for `name`.
    ///
    /// `gpu` is `None` when no accelerator is available; requests for GPU
    /// placement then fall back to the CPU with a warning.
    pub fn resolve(
        name: &str,
        options: &LoadOptions,
        gpu: Option<GpuInfo>,
        torch_dump_exists: bool,
    ) -> Self {
        let lower = name.to_lowercase();

        if options.is_default_placement() {
            if gpu.is_none() {
                warn!("No GPU has been detected. Falling back to CPU mode.");
                let mut plan = Self::new(Device::Cpu, Precision::F32);
                if torch_dump_exists {
                    plan.source = WeightSource::TorchDump;
                }
                return plan;
            }
            if torch_dump_exists {
                let mut plan = Self::new(Device::Gpu, options.half_precision());
                plan.source = WeightSource::TorchDump;
                return plan;
            }
            if is_large_int8_family(&lower) {
                let mut plan = Self::new(Device::Gpu, Precision::Int8);
                plan.auto_device_map = true;
                return plan;
            }
            return Self::new(Device::Gpu, options.half_precision());
        }

        if options.deepspeed {
            let mut plan = Self::new(Device::Gpu, options.half_precision());
            plan.deepspeed = true;
            plan.nvme_offload_dir = options.nvme_offload_dir.clone();
            plan.local_rank = options.local_rank;
            return plan;
        }

        let gpu = match gpu {
            Some(gpu) if !options.cpu => gpu,
            Some(_) => return Self::new(Device::Cpu, Precision::F32),
            None => {
                if !options.cpu {
                    warn!("No GPU has been detected. Falling back to CPU mode.");
                }
                return Self::new(Device::Cpu, Precision::F32);
            }
        };

        let precision = if options.load_in_8bit {
            Precision::Int8
        } else {
            options.half_precision()
        };
        let mut plan = Self::new(Device::Gpu, precision);
        plan.auto_device_map = true;

        let cpu_gib = options.cpu_memory.unwrap_or(DEFAULT_CPU_MEMORY_GIB);
        if let Some(gpu_gib) = options.gpu_memory.filter(|gib| *gib > 0) {
            plan.max_memory = Some(MemoryMap { gpu_gib, cpu_gib });
        } else if !options.load_in_8bit {
            let gpu_gib = suggest_gpu_memory_gib(gpu.total_memory_mib);
            info!(
                "Auto-assigning --gpu-memory {} for your GPU to try to prevent out-of-memory errors",
                gpu_gib
            );
            plan.max_memory = Some(MemoryMap { gpu_gib, cpu_gib });
        }

        if options.disk {
            plan.offload_folder = Some(
                options
                    .disk_cache_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("cache")),
            );
        }
        plan
    }
}

fn is_large_int8_family(lower: &str) -> bool {
    ["gpt-neo", "opt-", "galactica"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
        && ["13b", "20b", "30b"].iter().any(|size| lower.contains(size))
}

/// GPU memory ceiling that leaves headroom below the device total.
pub fn suggest_gpu_memory_gib(total_memory_mib: u64) -> u32 {
    let total = total_memory_mib as f64;
    let mut suggestion = ((total - 1000.0) / 1000.0).round_ties_even() * 1000.0;
    if total - suggestion < 800.0 {
        suggestion -= 1000.0;
    }
    (suggestion / 1000.0).round_ties_even().max(0.0) as u32
}

/// The model currently occupying the slot.
pub struct LoadedModel {
    pub name: String,
    pub plan: LoadPlan,
    pub adapter: Box<dyn ModelAdapter>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("plan", &self.plan)
            .finish()
    }
}

/// Read access to the loaded model, held for the duration of a generation.
pub type ModelHandle = OwnedRwLockReadGuard<Option<LoadedModel>, LoadedModel>;

pub struct ModelManager {
    slot: Arc<RwLock<Option<LoadedModel>>>,
    loader: Arc<dyn ModelLoader>,
    options: LoadOptions,
    gpu: Option<GpuInfo>,
    torch_dumps_dir: PathBuf,
}

impl ModelManager {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        options: LoadOptions,
        gpu: Option<GpuInfo>,
        torch_dumps_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            loader,
            options,
            gpu,
            torch_dumps_dir: torch_dumps_dir.into(),
        }
    }

    /// Load `name`, replacing any loaded model.
    ///
    /// Waits for in-flight generations to release their read guards. The old
    /// model is dropped before the new one is loaded; if loading fails the slot
    /// is left empty.
    pub async fn load(&self, name: &str) -> Result<(), ModelError> {
        let mut slot = self.slot.write().await;
        if let Some(previous) = slot.take() {
            info!("Unloading {}", previous.name);
        }

        let torch_dump = self.torch_dumps_dir.join(format!("{}.pt", name));
        let plan = LoadPlan::resolve(name, &self.options, self.gpu, torch_dump.exists());
        debug!("Load plan for {}: {:?}", name, plan);

        info!("Loading {}...", name);
        let started = Instant::now();
        let adapter = self.loader.load(name, &plan)?;
        info!(
            "Loaded the model in {:.2} seconds.",
            started.elapsed().as_secs_f64()
        );

        *slot = Some(LoadedModel {
            name: name.to_string(),
            plan,
            adapter,
        });
        Ok(())
    }

    /// Load `name` unless it is already the loaded model.
    pub async fn switch_to(&self, name: &str) -> Result<bool, ModelError> {
        if self.current_name().await.as_deref() == Some(name) {
            return Ok(false);
        }
        self.load(name).await?;
        Ok(true)
    }

    pub async fn current_name(&self) -> Option<String> {
        self.slot.read().await.as_ref().map(|model| model.name.clone())
    }

    pub async fn is_loaded(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Acquire read access to the loaded model.
    pub async fn acquire(&self) -> Result<ModelHandle, ModelError> {
        let guard = self.slot.clone().read_owned().await;
        OwnedRwLockReadGuard::try_map(guard, |slot| slot.as_ref()).map_err(|_| ModelError::NotLoaded)
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("options", &self.options)
            .field("gpu", &self.gpu)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(24576, 23)]
    #[case(8192, 7)]
    #[case(12288, 11)]
    #[case(16384, 15)]
    fn test_suggest_gpu_memory(#[case] total_mib: u64, #[case] expected: u32) {
        assert_eq!(suggest_gpu_memory_gib(total_mib), expected);
    }

    #[test]
    fn test_default_placement_uses_half_precision_on_gpu() {
        let gpu = Some(GpuInfo {
            total_memory_mib: 24576,
        });
        let plan = LoadPlan::resolve("opt-1.3b", &LoadOptions::default(), gpu, false);
        assert_eq!(plan.device, Device::Gpu);
        assert_eq!(plan.precision, Precision::F16);
        assert_eq!(plan.source, WeightSource::Directory);
        assert!(plan.max_memory.is_none());

        let plan = LoadPlan::resolve("galactica-30b", &LoadOptions::default(), gpu, false);
        assert_eq!(plan.precision, Precision::Int8);
        assert!(plan.auto_device_map);

        let plan = LoadPlan::resolve("opt-1.3b", &LoadOptions::default(), gpu, true);
        assert_eq!(plan.source, WeightSource::TorchDump);
    }

    #[test]
    fn test_gpu_request_without_gpu_falls_back_to_cpu() {
        let options = LoadOptions {
            auto_devices: true,
            ..Default::default()
        };
        let plan = LoadPlan::resolve("opt-1.3b", &options, None, false);
        assert_eq!(plan.device, Device::Cpu);
        assert_eq!(plan.precision, Precision::F32);
    }

    #[test]
    fn test_custom_placement_memory_map() {
        let gpu = Some(GpuInfo {
            total_memory_mib: 24576,
        });
        let options = LoadOptions {
            gpu_memory: Some(10),
            disk: true,
            ..Default::default()
        };
        let plan = LoadPlan::resolve("opt-1.3b", &options, gpu, false);
        assert_eq!(
            plan.max_memory,
            Some(MemoryMap {
                gpu_gib: 10,
                cpu_gib: DEFAULT_CPU_MEMORY_GIB
            })
        );
        assert_eq!(plan.offload_folder, Some(PathBuf::from("cache")));

        let options = LoadOptions {
            auto_devices: true,
            cpu_memory: Some(32),
            ..Default::default()
        };
        let plan = LoadPlan::resolve("opt-1.3b", &options, gpu, false);
        assert_eq!(
            plan.max_memory,
            Some(MemoryMap {
                gpu_gib: 23,
                cpu_gib: 32
            })
        );

        let options = LoadOptions {
            load_in_8bit: true,
            ..Default::default()
        };
        let plan = LoadPlan::resolve("opt-1.3b", &options, gpu, false);
        assert_eq!(plan.precision, Precision::Int8);
        assert!(plan.max_memory.is_none());
    }

    #[test]
    fn test_deepspeed_plan() {
        let options = LoadOptions {
            deepspeed: true,
            bf16: true,
            local_rank: 1,
            ..Default::default()
        };
        let plan = LoadPlan::resolve("opt-1.3b", &options, None, false);
        assert!(plan.deepspeed);
        assert_eq!(plan.precision, Precision::Bf16);
        assert_eq!(plan.local_rank, 1);
    }
}
