pub mod change_detector;
pub mod indexing_service;
pub mod normalize;
pub mod ocr_service;
pub mod query_service;
pub mod scanner;
