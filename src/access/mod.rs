// 访问控制模块
//
// 按用户维护配额/会员到期/封禁状态，是整条管线的准入闸门

pub mod store;
pub mod types;

pub use store::AccessStore;
pub use types::{parse_duration_spec, AccessTier, DurationSpecError, UserAccessRecord};
