pub mod change_detection;
pub mod relevance;
pub mod update_service;
pub mod validation;

pub use change_detection::ChangeDetectionEngine;
pub use relevance::{score_and_rank_subreddits, score_and_rank_subreddits_concurrent};
pub use update_service::UpdateCheckService;
pub use validation::validate_input_string;
