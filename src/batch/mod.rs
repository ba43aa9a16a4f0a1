// Batch processing of TV show directories
//
// - detect: episode detection from file names
// - settings: per-batch answer cache
// - runner: the coordinator state machine
// - repack: stream-layout grouping for `media repack`

pub mod detect;
pub mod repack;
pub mod runner;
pub mod settings;

pub use detect::{candidate_files, episode_files, is_tv_show, is_tv_show_directory};
pub use repack::{RepackGroup, confirm_repack, run_repack};
pub use runner::{BatchCoordinator, BatchReport, BatchState, EpisodeHandler};
pub use settings::{BatchContext, BatchProcessingInfo, BatchProcessingSettings, Decision, Decisions};
