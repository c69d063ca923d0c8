pub mod condense;
pub mod error;
pub mod extraction;
pub mod fetcher;
pub mod result;
pub mod service;

pub use condense::condense_page;
pub use error::ScanError;
pub use extraction::{
    Extracted, ExtractionService, PagePurpose, ProductDetail, RawCategory, RawListing, RawProduct,
    RawTreeNode,
};
pub use fetcher::{FetchPolicy, Fetcher};
pub use result::FetchedPage;
pub use service::HttpExtractor;
