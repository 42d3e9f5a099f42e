pub mod batch;
pub mod extraction;
pub mod processor;
pub mod segmentation;
pub mod structuring;
