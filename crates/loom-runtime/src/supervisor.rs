use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::LoadError;
use crate::loader::ServiceLoop;

struct RunningLoop {
    component: String,
    handle: JoinHandle<()>,
}

/// Keeps the handles of component service loops.
///
/// Loops run on dedicated OS threads because a native loop blocks for the
/// life of the process. Handles are retained so the host can tell which
/// loops are still alive; nothing joins them at shutdown.
#[derive(Default)]
pub struct ServiceLoops {
    loops: Mutex<Vec<RunningLoop>>,
}

impl ServiceLoops {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `run` on a thread named after the component.
    ///
    /// A component has at most one live loop.
    pub fn spawn(&self, component: &str, run: ServiceLoop) -> Result<(), LoadError> {
        let mut loops = self.loops.lock();
        if loops
            .iter()
            .any(|l| l.component == component && !l.handle.is_finished())
        {
            return Err(LoadError::LoopRunning {
                name: component.to_string(),
            });
        }

        let handle = std::thread::Builder::new()
            .name(format!("loom-{component}"))
            .spawn(run)?;
        tracing::info!(component, "Service loop started");
        loops.push(RunningLoop {
            component: component.to_string(),
            handle,
        });
        Ok(())
    }

    /// Components whose loop has not returned yet.
    pub fn running(&self) -> Vec<String> {
        self.loops
            .lock()
            .iter()
            .filter(|l| !l.handle.is_finished())
            .map(|l| l.component.clone())
            .collect()
    }

    /// Number of loops ever started.
    pub fn len(&self) -> usize {
        self.loops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.lock().is_empty()
    }
}
