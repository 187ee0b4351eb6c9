//! Duration arithmetic, span timers and aggregate statistics

pub mod measure;
pub mod ping_stats;
pub mod running;
pub mod timer;

pub use measure::Measure;
pub use ping_stats::PingStats;
pub use running::{Observation, RunningStats, Summary};
pub use timer::{MeasuresCollection, SpanKind, Timer, TimerRegistry};
