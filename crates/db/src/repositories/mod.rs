//! Static-struct repositories, one per table.

pub mod media_asset_repo;
pub mod try_on_job_repo;
pub mod user_repo;

pub use media_asset_repo::MediaAssetRepo;
pub use try_on_job_repo::TryOnJobRepo;
pub use user_repo::UserRepo;
