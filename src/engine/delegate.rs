use crate::error::{PipelineError, Result};

pub const DEFAULT_SOFTWARE_THREADS: usize = 4;

/// Settings a capability probe recommends for the acceleration delegate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateOptions {
    pub name: String,
    pub allow_precision_loss: bool,
}

/// Reports whether an acceleration delegate can be used on this device.
pub trait DelegateProbe: Send + Sync {
    fn probe(&self) -> Option<DelegateOptions>;
}

/// Probe for hosts without any accelerator.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAccelerator;

impl DelegateProbe for NoAccelerator {
    fn probe(&self) -> Option<DelegateOptions> {
        None
    }
}

/// Probe with a fixed answer, for hosts that detect capabilities up front.
#[derive(Clone, Debug, Default)]
pub struct StaticProbe(pub Option<DelegateOptions>);

impl DelegateProbe for StaticProbe {
    fn probe(&self) -> Option<DelegateOptions> {
        self.0.clone()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DelegatePolicy {
    /// Use the delegate when the probe offers one, else software threads.
    #[default]
    Auto,
    /// Never probe; always run on software threads.
    Software,
    /// Fail initialization when no delegate is available.
    Accelerator,
}

impl DelegatePolicy {
    pub fn parse(s: Option<&str>) -> Self {
        match s.unwrap_or("auto").trim().to_ascii_lowercase().as_str() {
            "software" | "cpu" => Self::Software,
            "accelerator" | "gpu" => Self::Accelerator,
            _ => Self::Auto,
        }
    }
}

/// Execution path chosen once at initialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Accelerated(DelegateOptions),
    MultiThreadedSoftware { threads: usize },
}

impl ExecutionStrategy {
    pub fn describe(&self) -> String {
        match self {
            ExecutionStrategy::Accelerated(opts) => {
                format!("{} acceleration enabled", opts.name)
            }
            ExecutionStrategy::MultiThreadedSoftware { threads } => {
                format!("Using CPU inference with {threads} threads")
            }
        }
    }
}

pub fn select_strategy(
    policy: DelegatePolicy,
    probe: &dyn DelegateProbe,
    threads: usize,
) -> Result<ExecutionStrategy> {
    let software = ExecutionStrategy::MultiThreadedSoftware {
        threads: threads.max(1),
    };
    match policy {
        DelegatePolicy::Software => Ok(software),
        DelegatePolicy::Auto => Ok(probe
            .probe()
            .map(ExecutionStrategy::Accelerated)
            .unwrap_or(software)),
        DelegatePolicy::Accelerator => probe
            .probe()
            .map(ExecutionStrategy::Accelerated)
            .ok_or_else(|| {
                PipelineError::Init("no acceleration delegate on this device".to_string())
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        select_strategy, DelegateOptions, DelegatePolicy, ExecutionStrategy, NoAccelerator,
        StaticProbe,
    };

    fn gpu() -> StaticProbe {
        StaticProbe(Some(DelegateOptions {
            name: "GPU".to_string(),
            allow_precision_loss: true,
        }))
    }

    #[test]
    fn auto_uses_delegate_when_offered() {
        let s = select_strategy(DelegatePolicy::Auto, &gpu(), 4).expect("strategy");
        assert!(matches!(s, ExecutionStrategy::Accelerated(ref o) if o.name == "GPU"));
        assert_eq!(s.describe(), "GPU acceleration enabled");
    }

    #[test]
    fn auto_falls_back_to_threads() {
        let s = select_strategy(DelegatePolicy::Auto, &NoAccelerator, 4).expect("strategy");
        assert_eq!(s, ExecutionStrategy::MultiThreadedSoftware { threads: 4 });
        assert_eq!(s.describe(), "Using CPU inference with 4 threads");
    }

    #[test]
    fn software_policy_ignores_probe() {
        let s = select_strategy(DelegatePolicy::Software, &gpu(), 0).expect("strategy");
        assert_eq!(s, ExecutionStrategy::MultiThreadedSoftware { threads: 1 });
    }

    #[test]
    fn accelerator_policy_requires_delegate() {
        assert!(select_strategy(DelegatePolicy::Accelerator, &NoAccelerator, 4).is_err());
        assert!(select_strategy(DelegatePolicy::Accelerator, &gpu(), 4).is_ok());
    }

    #[test]
    fn policy_parse_accepts_aliases() {
        assert_eq!(DelegatePolicy::parse(Some("CPU")), DelegatePolicy::Software);
        assert_eq!(DelegatePolicy::parse(Some("gpu")), DelegatePolicy::Accelerator);
        assert_eq!(DelegatePolicy::parse(None), DelegatePolicy::Auto);
    }
}
