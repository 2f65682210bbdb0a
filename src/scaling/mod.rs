pub mod error;
pub mod plot;
pub mod status;
pub mod sweep;
pub mod thread_cap;
pub mod timing;

pub use error::HarnessError;
pub use plot::{mean_excluding_warmup, plot, ChartError, CurvePoint, OutputMode, PlotOutcome, ScalingCurve};
pub use status::{StepRecord, SweepState, SweepStatus};
pub use sweep::{mean_across_replicas, run_step, run_sweep, StepLauncher, StepReport, SweepOutcome};
pub use thread_cap::ThreadCap;
pub use timing::{TableError, TimingTable};
