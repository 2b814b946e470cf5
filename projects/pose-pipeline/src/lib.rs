pub mod live;
pub mod logging;
pub mod pipeline;
pub mod video;
