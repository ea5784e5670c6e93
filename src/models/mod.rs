pub mod approval;
pub mod media;
pub mod message;
pub mod pipeline;
