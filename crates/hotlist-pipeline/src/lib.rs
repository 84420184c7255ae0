//! Daily trending-product analysis: category registry, scoring, ranking,
//! persistence and scheduling.

pub const CRATE_NAME: &str = "hotlist-pipeline";

mod gateway;
mod pipeline;
mod rank;
mod score;

pub use gateway::{PgRankingGateway, RankingGateway};
pub use pipeline::{
    maybe_build_scheduler, AnalysisPipeline, CategoryRegistry, ListingSource, PipelineConfig,
    ProviderListingSource, RetentionJob, RunOutcome,
};
pub use rank::rank_top_n;
pub use score::{heuristic_score, qualifies, HttpScoreGateway, ScoreGateway, ScoredProduct};
