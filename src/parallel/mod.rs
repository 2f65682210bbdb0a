pub mod batch;
pub mod error;
pub mod pool;
pub mod task;
pub mod worker;

pub use batch::{batch_ranges, effective_workers};
pub use error::DistributeError;
pub use pool::{
    distribute_tasks, DistributedConfig, DistributedPool, ExecutionMode, Executor, LocalPool,
    ParallelMap, DEFAULT_COORDINATOR_VAR, WORKER_RANK_VAR,
};
pub use task::{Task, TaskError};
pub use worker::{serve, TaskRegistry, WorkerReply, WorkerRequest};
