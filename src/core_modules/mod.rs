pub mod background_model;
pub mod frame;
pub mod motion_classifier;
pub mod overlay;
