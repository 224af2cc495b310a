mod case;
mod types;

pub use case::{fields, CaseRecord};
pub use types::{
    is_json_content_type, media_type, CaseOutcome, CaseStatus, DefaultValueRecord, HttpResponse,
    ReplaceRule, RunReport, COMPACT_TOKEN_CONTENT_TYPE,
};
