pub mod extract;
pub mod query;

pub use extract::{ExtractError, extract_company_name};
pub use query::company_collection_xml;
