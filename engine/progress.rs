/// Observer for reporting incremental progress while a simulation batch runs.
///
/// Runs may complete on several threads at once, so callbacks take `&self` and
/// implementors must be `Sync`. `completed` comes from an atomic counter and is
/// unique per call, but calls may arrive out of order.
pub trait SimulationProgressObserver: Sync {
    fn on_start(&self, total_runs: usize) {
        let _ = total_runs;
    }
    fn on_run_complete(&self, completed: usize, total_runs: usize) {
        let _ = (completed, total_runs);
    }
    fn on_finish(&self) {}
}

#[derive(Default)]
pub struct NoopSimulationProgress;

impl SimulationProgressObserver for NoopSimulationProgress {}
