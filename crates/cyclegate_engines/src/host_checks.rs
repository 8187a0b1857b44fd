#![forbid(unsafe_code)]

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use cyclegate_contracts::probe::{fact_names, providers, ProbeFact};
use serde::Deserialize;

use crate::probe::CapabilityCheck;

const CUDNN_LIBRARIES: &[&str] = &[
    "cudnn64_9.dll",
    "cudnn64_8.dll",
    "cudnn.dll",
    "libcudnn.so.9",
    "libcudnn.so.8",
    "libcudnn.so",
];

const TENSORRT_LIBRARIES: &[&str] = &[
    "nvinfer.dll",
    "nvinfer_10.dll",
    "libnvinfer.so.10",
    "libnvinfer.so.8",
    "libnvinfer.so",
];

const SYSTEM_LIBRARY_DIRS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/local/cuda/lib64",
    "/usr/lib64",
];

const ORT_PROBE_SCRIPT: &str = "import json, onnxruntime as ort; \
print(json.dumps({'version': ort.__version__, 'providers': ort.get_available_providers()}))";

/// The default battery: driver, runtime toolchain, math library, accelerator
/// library and inference runtime.
pub fn default_checks() -> Vec<Arc<dyn CapabilityCheck>> {
    vec![
        Arc::new(NvidiaDriverCheck),
        Arc::new(CudaRuntimeCheck),
        Arc::new(CudnnCheck),
        Arc::new(TensorRtCheck),
        Arc::new(OnnxRuntimeCheck::from_env()),
    ]
}

#[derive(Debug, Clone, Copy)]
pub struct NvidiaDriverCheck;

impl CapabilityCheck for NvidiaDriverCheck {
    fn name(&self) -> &'static str {
        fact_names::DRIVER
    }

    fn run(&self) -> ProbeFact {
        let output = Command::new("nvidia-smi")
            .args(["--query-gpu=driver_version", "--format=csv,noheader"])
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                    Some(version) => ProbeFact::passed(self.name(), Some(version.to_string()))
                        .with_path("nvidia-smi"),
                    None => ProbeFact::failed(self.name(), "nvidia-smi reported no driver"),
                }
            }
            Ok(out) => ProbeFact::failed(
                self.name(),
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                ProbeFact::failed(self.name(), "nvidia-smi not found in PATH")
            }
            Err(err) => ProbeFact::failed(self.name(), err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CudaRuntimeCheck;

impl CapabilityCheck for CudaRuntimeCheck {
    fn name(&self) -> &'static str {
        fact_names::RUNTIME
    }

    fn run(&self) -> ProbeFact {
        let cuda_path = cuda_home();
        if let Ok(out) = Command::new("nvcc").arg("--version").output() {
            if out.status.success() {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let version = parse_nvcc_release(&stdout).unwrap_or_else(|| "unknown".to_string());
                let fact = ProbeFact::passed(self.name(), Some(version));
                return match &cuda_path {
                    Some(p) => fact.with_path(p.display().to_string()),
                    None => fact,
                };
            }
        }
        match cuda_path {
            Some(p) if p.exists() => {
                let version = version_from_cuda_dir(&p)
                    .unwrap_or_else(|| "unknown (nvcc not in PATH)".to_string());
                ProbeFact::passed(self.name(), Some(version)).with_path(p.display().to_string())
            }
            _ => ProbeFact::failed(self.name(), "CUDA_PATH not set or nvcc not found"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CudnnCheck;

impl CapabilityCheck for CudnnCheck {
    fn name(&self) -> &'static str {
        fact_names::MATH_LIBRARY
    }

    fn run(&self) -> ProbeFact {
        let mut dirs = Vec::new();
        if let Some(home) = cuda_home() {
            dirs.push(home.join("bin"));
            dirs.push(home.join("lib64"));
        }
        dirs.extend(path_entries_containing(&["cuda", "cudnn"]));
        dirs.extend(SYSTEM_LIBRARY_DIRS.iter().map(PathBuf::from));

        match find_library(&dirs, CUDNN_LIBRARIES) {
            Some(found) => {
                let version = library_major(&found, &["cudnn64_", "libcudnn.so."])
                    .map(|major| format!("{major}.x"))
                    .unwrap_or_else(|| "unknown".to_string());
                ProbeFact::passed(self.name(), Some(version)).with_path(found.display().to_string())
            }
            None => ProbeFact::failed(
                self.name(),
                "cuDNN library not found in CUDA path, PATH or system library dirs",
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TensorRtCheck;

impl CapabilityCheck for TensorRtCheck {
    fn name(&self) -> &'static str {
        fact_names::ACCELERATOR_LIBRARY
    }

    fn run(&self) -> ProbeFact {
        let mut dirs = Vec::new();
        if let Some(root) = env::var_os("TENSORRT_PATH").map(PathBuf::from) {
            dirs.push(root.join("lib"));
            dirs.push(root);
        }
        dirs.extend(path_entries_containing(&["tensorrt"]));
        dirs.extend(SYSTEM_LIBRARY_DIRS.iter().map(PathBuf::from));

        match find_library(&dirs, TENSORRT_LIBRARIES) {
            Some(found) => {
                let version = tensorrt_version_from_path(&found)
                    .or_else(|| {
                        library_major(&found, &["libnvinfer.so.", "nvinfer_"])
                            .map(|m| format!("{m}.x"))
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                ProbeFact::passed(self.name(), Some(version)).with_path(found.display().to_string())
            }
            None => ProbeFact::failed(
                self.name(),
                "nvinfer not found; set TENSORRT_PATH or add TensorRT/lib to PATH",
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OnnxRuntimeCheck {
    python: String,
}

#[derive(Debug, Deserialize)]
struct OrtProbeOutput {
    version: String,
    providers: Vec<String>,
}

impl OnnxRuntimeCheck {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var("CYCLEGATE_PYTHON").unwrap_or_else(|_| "python3".to_string()))
    }
}

impl CapabilityCheck for OnnxRuntimeCheck {
    fn name(&self) -> &'static str {
        fact_names::INFERENCE_RUNTIME
    }

    fn run(&self) -> ProbeFact {
        let out = match Command::new(&self.python)
            .args(["-c", ORT_PROBE_SCRIPT])
            .output()
        {
            Ok(out) => out,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return ProbeFact::failed(self.name(), format!("{} not found", self.python));
            }
            Err(err) => return ProbeFact::failed(self.name(), err.to_string()),
        };
        if !out.status.success() {
            return ProbeFact::failed(self.name(), "onnxruntime not installed");
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        let parsed: OrtProbeOutput = match serde_json::from_str(stdout.trim()) {
            Ok(parsed) => parsed,
            Err(err) => {
                return ProbeFact::failed(
                    self.name(),
                    format!("unparseable onnxruntime probe output: {err}"),
                );
            }
        };
        // The CUDA provider is the minimum requirement for an accelerated lane.
        let has_cuda = parsed.providers.iter().any(|p| p == providers::CUDA);
        let mut fact = if has_cuda {
            ProbeFact::passed(self.name(), Some(parsed.version))
        } else {
            let mut f = ProbeFact::failed(self.name(), "CUDAExecutionProvider not available");
            f.version = Some(parsed.version);
            f
        };
        fact.providers = Some(parsed.providers);
        fact.path = Some(self.python.clone());
        fact
    }
}

fn cuda_home() -> Option<PathBuf> {
    env::var_os("CUDA_PATH")
        .or_else(|| env::var_os("CUDA_HOME"))
        .map(PathBuf::from)
}

fn path_entries_containing(needles: &[&str]) -> Vec<PathBuf> {
    let Some(path) = env::var_os("PATH") else {
        return Vec::new();
    };
    env::split_paths(&path)
        .filter(|p| {
            let lower = p.to_string_lossy().to_ascii_lowercase();
            needles.iter().any(|needle| lower.contains(needle))
        })
        .collect()
}

fn find_library(dirs: &[PathBuf], names: &[&str]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// `release 12.4, V12.4.131` -> `12.4`.
pub fn parse_nvcc_release(output: &str) -> Option<String> {
    let idx = output.find("release ")?;
    let rest = &output[idx + "release ".len()..];
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let version = version.trim_end_matches('.');
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Toolkit directories are named like `v12.4` or `cuda-12.4`.
fn version_from_cuda_dir(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let rest = name
        .strip_prefix("cuda-")
        .or_else(|| name.strip_prefix('v'))?;
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    (!version.is_empty()).then_some(version)
}

fn library_major(path: &Path, prefixes: &[&str]) -> Option<u32> {
    let file = path.file_name()?.to_str()?;
    prefixes.iter().find_map(|prefix| {
        let rest = file.strip_prefix(prefix)?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    })
}

/// Install directories are named like `TensorRT-10.0.1`.
fn tensorrt_version_from_path(path: &Path) -> Option<String> {
    path.ancestors().find_map(|ancestor| {
        let name = ancestor.file_name()?.to_str()?;
        let rest = name.strip_prefix("TensorRT-")?;
        let version: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        (!version.is_empty()).then_some(version)
    })
}
