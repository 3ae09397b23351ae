pub mod materialize;
pub mod optimize;
