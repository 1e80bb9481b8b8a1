pub mod preprocessing;
pub mod circles;
pub mod router;
pub mod ensemble;
pub mod extraction;

pub use circles::{Circle, CircleSearch};
pub use ensemble::{EnsembleMerger, EnsemblePass, iou};
pub use extraction::{Extractor, MaskShape};
pub use preprocessing::{PreprocessedImage, preprocess, preprocess_with};
pub use router::route;
