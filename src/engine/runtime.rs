use super::delegate::ExecutionStrategy;
use crate::error::RuntimeError;

/// A loaded model that maps an id tensor to a score tensor.
pub trait TensorRuntime: Send {
    /// Number of `f32` scores one forward pass writes.
    fn output_len(&self) -> usize;

    /// Blocking forward pass. `input` holds native-endian `i32` ids.
    fn run(&mut self, input: &[u8], output: &mut [f32]) -> Result<(), RuntimeError>;

    /// Frees native resources. Called once by the engine on release.
    fn close(self: Box<Self>) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Builds a runtime from a serialized model for a chosen execution path.
pub trait RuntimeFactory: Send + Sync {
    fn name(&self) -> &str;

    fn load(
        &self,
        model: &[u8],
        strategy: &ExecutionStrategy,
    ) -> Result<Box<dyn TensorRuntime>, RuntimeError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::{RuntimeFactory, TensorRuntime};
    use crate::engine::delegate::ExecutionStrategy;
    use crate::error::RuntimeError;

    /// Everything a scripted runtime saw.
    #[derive(Debug, Default)]
    pub(crate) struct RunLog {
        pub inputs: Vec<Vec<u8>>,
        pub closes: usize,
    }

    /// Loads runtimes that fail the first `failures` runs, then write a one-hot row
    /// at `winner`. Every input buffer and close is recorded in a shared log.
    #[derive(Clone)]
    pub(crate) struct ScriptedFactory {
        pub output_len: usize,
        pub winner: usize,
        pub failures: usize,
        pub fail_close: bool,
        log: Arc<Mutex<RunLog>>,
    }

    impl ScriptedFactory {
        pub(crate) fn new(output_len: usize, winner: usize, failures: usize) -> Self {
            Self {
                output_len,
                winner,
                failures,
                fail_close: false,
                log: Arc::new(Mutex::new(RunLog::default())),
            }
        }

        pub(crate) fn log(&self) -> MutexGuard<'_, RunLog> {
            self.log.lock().expect("run log")
        }
    }

    struct ScriptedRuntime {
        output_len: usize,
        winner: usize,
        failures_left: usize,
        fail_close: bool,
        log: Arc<Mutex<RunLog>>,
    }

    impl TensorRuntime for ScriptedRuntime {
        fn output_len(&self) -> usize {
            self.output_len
        }

        fn run(&mut self, input: &[u8], output: &mut [f32]) -> Result<(), RuntimeError> {
            self.log.lock().expect("run log").inputs.push(input.to_vec());
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(RuntimeError::Execution("device lost".to_string()));
            }
            output.fill(0.0);
            if let Some(slot) = output.get_mut(self.winner) {
                *slot = 10.0;
            }
            Ok(())
        }

        fn close(self: Box<Self>) -> Result<(), RuntimeError> {
            self.log.lock().expect("run log").closes += 1;
            if self.fail_close {
                return Err(RuntimeError::Execution("close refused".to_string()));
            }
            Ok(())
        }
    }

    impl RuntimeFactory for ScriptedFactory {
        fn name(&self) -> &str {
            "scripted"
        }

        fn load(
            &self,
            _model: &[u8],
            _strategy: &ExecutionStrategy,
        ) -> Result<Box<dyn TensorRuntime>, RuntimeError> {
            Ok(Box::new(ScriptedRuntime {
                output_len: self.output_len,
                winner: self.winner,
                failures_left: self.failures,
                fail_close: self.fail_close,
                log: Arc::clone(&self.log),
            }))
        }
    }
}
